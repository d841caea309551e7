//! Proxy Module
//!
//! Conditional revalidation between clients, the on-disk cache and the
//! upstream avatar service.

mod conditional;
mod response;
mod revalidate;
mod upstream;

pub use conditional::ConditionalHeaders;
pub use response::{Outcome, ServedResponse};
pub use revalidate::{ResourceRequest, Revalidator};
pub use upstream::{HttpUpstream, Upstream, UpstreamRequest, UpstreamResponse};
