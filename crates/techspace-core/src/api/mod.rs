//! REST API access for TechSpace services.
//!
//! This module provides the network seams (`Transport`, `Renewer`), their
//! reqwest implementation `ApiClient`, and the `RequestDispatcher` that
//! attaches access credentials and classifies responses.
//!
//! The API uses bearer token authentication with short-lived access tokens
//! renewed through `/auth/refresh`.

pub mod client;
pub mod dispatcher;
pub mod error;
pub mod renewal;
pub mod transport;
mod types;

pub use client::ApiClient;
pub use dispatcher::{Dispatch, RequestDispatcher};
pub use error::ApiError;
pub use renewal::{RenewalError, Renewer};
pub use transport::{Operation, RawResponse, Transport};
