//! # Agent Side
//!
//! What runs on the delivery agent's handset: a local copy of the orders
//! it carries, an offline redemption log, and the [`AgentDevice`] that
//! ties them together.
//!
//! The device works with no network at all. Connectivity is only needed
//! to refresh the cache and to submit the log.

pub mod cache;
pub mod device;
pub mod log;
pub mod store;

pub use cache::{CacheSnapshot, LocalOrderCache};
pub use device::{AgentDevice, AgentError, DeviceEvent};
pub use log::{LogBatch, RedemptionLog};
pub use store::AgentStore;
