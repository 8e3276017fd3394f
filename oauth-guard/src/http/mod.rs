//! HTTP client used to fetch provider key sets.

mod client;
mod retry;

pub use client::{HttpClient, HttpClientBuilder, HttpClientConfig};
pub use retry::KeyFetchBackoff;
