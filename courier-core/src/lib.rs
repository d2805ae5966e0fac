#![warn(missing_docs)]
//! # courier-core
//!
//! Core types for the courier request/response engine.
//!
//! This crate holds the data model shared by every other courier crate:
//!
//! - **Verbs and formats** ([`RequestMethod`], [`RequestFormat`], [`ResponseFormat`], [`FormatTag`])
//! - **Body decoding targets** ([`Payload`], [`FromPayload`], [`Typed`])
//! - **Results** ([`ResponseData`], [`NetworkResponse`])
//! - **Errors** ([`ConfigurationError`], [`FormatError`], [`TransportError`], [`RequestError`])
//!
//! Nothing here performs I/O. Format handlers live in `courier-format`, the
//! envelope and dispatch queue in `courier`.

pub mod charset;
pub mod error;
pub mod format;
pub mod method;
pub mod payload;
pub mod response;
pub mod tag;

pub use charset::Charset;
pub use error::{ConfigurationError, FormatError, RequestError, TransportError, TransportErrorKind};
pub use format::{FormatTag, RequestFormat, ResponseFormat};
pub use method::RequestMethod;
pub use payload::{FromPayload, Payload, Typed};
pub use response::{Headers, NetworkResponse, ResponseData};
pub use tag::Tag;

#[doc(hidden)]
pub use smol_str::SmolStr;

/// Raw body bytes. `Bytes` clones by reference count.
pub type Raw = bytes::Bytes;
