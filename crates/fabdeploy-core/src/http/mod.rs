//! REST boundary: transport seam, error type, and the resilient client.

pub mod client;
pub mod error;
pub mod transport;

pub use client::ResilientClient;
pub use error::ClientError;
pub use transport::{ApiRequest, ApiResponse, HttpTransport, ReqwestTransport};
pub use reqwest::Method;
