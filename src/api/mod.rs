pub mod client;
pub mod models;

pub use client::{ApiClient, ApiError, Result};
pub use models::ClientConfig;
