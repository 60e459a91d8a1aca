#![warn(warnings)]

//! Convenience HTTP client over hyper
//!
//! This crate provides a fluent request builder on top of a pooled
//! hyper/rustls transport with:
//! - Automatic TLS via rustls (HTTPS only by default)
//! - Header sugar (Content-Type, Accept, Host, User-Agent) plus free-form
//!   additive headers
//! - Body coercion from strings, bytes, byte streams, JSON and form values
//! - Query-string assembly from anything serde can serialize
//! - Request compression with symmetric response decompression
//!   (gzip, deflate, zlib)
//! - Per-client proxying (explicit or from `HTTP_PROXY`/`HTTPS_PROXY`),
//!   with CONNECT tunnels for https destinations
//! - Redirect following with a configurable ceiling; the hop that exceeds
//!   the ceiling is returned inside the error
//! - Whole-exchange timeouts that cancel the in-flight request
//!
//! # Example
//!
//! ```ignore
//! use courier_http::{Codec, HttpClient};
//! use std::time::Duration;
//!
//! let client = HttpClient::builder()
//!     .timeout(Duration::from_secs(10))
//!     .user_agent("my-app/1.0")
//!     .build()?;
//!
//! let data: MyData = client
//!     .post("https://example.com/api")
//!     .query(&[("verbose", "1")])
//!     .codec(Codec::Gzip)
//!     .json(&payload)?
//!     .send()
//!     .await?
//!     .json()
//!     .await?;
//! ```

mod builder;
mod client;
mod codec;
mod config;
mod error;
mod proxy;
mod request;
mod response;
mod tls;

pub use builder::HttpClientBuilder;
pub use client::HttpClient;
pub use codec::Codec;
pub use config::{
    DEFAULT_MAX_REDIRECTS, DEFAULT_USER_AGENT, HttpClientConfig, ProxySetting, RedirectConfig,
    TlsRootConfig, TransportSecurity,
};
pub use error::{HttpError, InvalidUriKind};
pub use request::RequestBuilder;
pub use response::{HttpResponse, RawBody, ResponseBody};
