#![allow(unreachable_pub)]

mod error;
mod request;
mod response;

pub use error::ErrorKind;
pub use request::Request;
pub use response::{Body, Response};

/// The glowcord `Result` type
pub type Result<T> = std::result::Result<T, crate::ErrorKind>;
