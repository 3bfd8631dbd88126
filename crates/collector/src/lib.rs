pub mod api;
pub mod auth;
pub mod error;
pub mod server;

pub use api::router;
pub use error::ApiError;
pub use server::{CollectorOptions, run_collector, run_collector_until};
