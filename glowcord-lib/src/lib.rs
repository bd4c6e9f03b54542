//! `glowcord` is a rate limited client for the Discord REST API.
//!
//! Every request goes through a [`Dispatcher`], which learns the API's
//! per-route and global rate limits from the responses and holds requests
//! back until they may be sent:
//!
//! ```no_run
//! use glowcord_lib::{ClientBuilder, Request, Result};
//! use secrecy::SecretString;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!   let client = ClientBuilder::builder()
//!       .token(SecretString::from("my-bot-token".to_string()))
//!       .build()
//!       .client()?;
//!
//!   let response = client
//!       .send(Request::get("/channels/42/messages").channel(42))
//!       .await?;
//!   println!("{response}");
//!   Ok(())
//! }
//! ```
//!
//! Requests are sent through the [`Transport`] trait, so the dispatcher can
//! be driven by something other than `reqwest`:
//!
//! ```no_run
//! use std::sync::Arc;
//! use glowcord_lib::{Dispatcher, ReqwestTransport, Request, Result};
//! use glowcord_lib::ratelimit::RateLimitConfig;
//! use url::Url;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!   let transport = Arc::new(ReqwestTransport::new(reqwest::Client::new()));
//!   let api_root = Url::parse("https://discord.com/api/v10/").unwrap();
//!   let dispatcher = Dispatcher::new(transport, api_root, RateLimitConfig::default());
//!
//!   let response = dispatcher.send(Request::get("gateway")).await?;
//!   assert!(response.status().is_success());
//!   Ok(())
//! }
//! ```
// #![deny(missing_docs)]

mod client;
mod dispatcher;
mod transport;
mod types;

pub mod ratelimit;

pub use client::{Client, ClientBuilder, DEFAULT_API_ROOT, DEFAULT_USER_AGENT, send};
pub use dispatcher::Dispatcher;
pub use transport::{RawResponse, ReqwestTransport, Transport, TransportRequest};
pub use types::*;
