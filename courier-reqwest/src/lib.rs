#![warn(missing_docs)]
//! [`Transport`](courier::Transport) implementation backed by
//! [reqwest](https://docs.rs/reqwest).
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use courier::{QueueConfig, RequestQueue};
//! use courier_reqwest::ReqwestTransport;
//!
//! # async fn run() -> Result<(), courier_reqwest::BuildError> {
//! let transport = ReqwestTransport::builder()
//!     .default_header("User-Agent", "courier-demo")
//!     .timeout(Duration::from_secs(20))
//!     .build()?;
//! let queue = RequestQueue::new(transport, QueueConfig::default());
//! # Ok(())
//! # }
//! ```

mod transport;

pub use transport::{BuildError, ReqwestTransport, ReqwestTransportBuilder};
