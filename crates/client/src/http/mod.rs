//! Authenticated HTTP request pipeline.

pub mod pipeline;

pub use pipeline::{ApiBody, RequestOptions, RequestPipeline, MAX_ATTEMPTS, RETRY_BASE_INTERVAL};
