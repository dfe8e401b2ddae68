//! Concrete backend implementations of the producer/arbiter capabilities

pub mod http;

pub use http::{HttpBackend, HttpBackendConfig};
