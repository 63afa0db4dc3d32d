//! Batch job model and its in-memory store.
//!
//! Jobs live only for the lifetime of the process; there is no persistence.

mod store;
mod types;

pub use store::JobStore;
pub use types::*;
pub(crate) use types::unix_millis;
