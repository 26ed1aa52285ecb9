//! Test doubles for exercising a
//! [`MeteredListener`](metered_listener::MeteredListener) without sockets or
//! a metrics backend.
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use metered_listener::MeteredListener;
//! use metered_listener_testing::{RecordingClient, ScriptedListener};
//!
//! # async fn example() {
//! let client = Arc::new(RecordingClient::default());
//! let listener = MeteredListener::new(ScriptedListener::endless(), Arc::clone(&client))
//!     .expect("wrap listener");
//! let _conn = listener.accept().await.expect("accept");
//! listener.close().await.expect("close");
//! assert_eq!(client.count_total("status:success"), 1);
//! # }
//! ```

pub mod client;
pub mod listener;
pub mod logging;

pub use client::{RecordingClient, Report};
pub use listener::{ScriptedError, ScriptedListener};
pub use logging::{LoggerHandle, logger};
