pub mod config;
pub mod logging;

pub mod checksum;
pub mod error;
pub mod fetcher;
pub mod gate;
pub mod jobs;
pub mod orchestrator;
pub mod retry;
pub mod service;
pub mod shutdown;
pub mod ssrf;
pub mod webhook;

pub use error::{ServiceError, ServiceResult};
pub use service::Service;
