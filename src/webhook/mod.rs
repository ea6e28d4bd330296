//! Webhook ingestion: origin filtering, authenticity verification and the
//! `POST /webhook` endpoint.
//!
//! A request passes through [`origin_filter`] (403 on an untrusted origin),
//! then [`EventVerifier::verify`] (400 on a bad token, digest or payload),
//! and only then reaches [`crate::domain::Hub::publish`].

pub mod handler;
pub mod origin_filter;
pub mod verifier;

pub use handler::{routes, webhook_handler};
pub use origin_filter::{TrustList, origin_filter};
pub use verifier::{EventVerifier, TokenVerifier, VerifyError};
