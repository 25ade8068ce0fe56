//! Durable snapshot caches.
//!
//! Both adapters are advisory: they let a freshly started process serve data
//! before the first scrape completes, and every failure mode is logged and
//! ignored rather than blocking ingest.

mod local;
mod remote;

pub use local::LocalCache;
pub use remote::RemoteCache;
