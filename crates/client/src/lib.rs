//! HTTP implementation of the booking backend ports.

pub mod envelope;
pub mod http;

pub use http::{ClientSettings, HttpPortalClient};
