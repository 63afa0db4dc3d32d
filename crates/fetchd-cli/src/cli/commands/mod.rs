//! CLI command handlers, one per file.

mod batch;
mod check;
mod config;
mod fetch;

pub use batch::run_batch;
pub use check::run_check;
pub use config::run_config;
pub use fetch::run_fetch;

#[cfg(test)]
pub(crate) use fetch::parse_header;
