//! Blocking client for the ENSEK energy-account API.
//!
//! # Overview
//! Translates calls such as `get_account(1507)` into authenticated HTTP
//! requests against a fixed table of endpoint templates, classifies the
//! response status into typed errors, and optionally retries transient
//! failures with a fixed delay.
//!
//! # Design
//! - `operation` resolves an `Operation` plus named `Args` into a concrete
//!   path and camelCase query parameters. Pure, no I/O.
//! - `dispatch` executes a request through a `Transport`, classifies the
//!   status and owns the retry loop.
//! - `client::EnsekClient` ties the two together and adds the hand-written
//!   write operations and the sign-up pagination helper.
//! - The client holds no mutable state, so one instance can be shared
//!   between threads.

pub mod client;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod http;
pub mod operation;
pub mod retry;
pub mod types;

#[cfg(test)]
mod testing;

pub use client::EnsekClient;
pub use config::ClientConfig;
pub use dispatch::Dispatcher;
pub use error::{ApiError, Result};
pub use http::{HttpMethod, HttpRequest, HttpResponse, Transport, TransportError, UreqTransport};
pub use operation::{resolve, ArgValue, Args, Operation, PathTemplate, Resolved};
pub use retry::RetryPolicy;
pub use types::{AccountAttribute, MeterReading};
