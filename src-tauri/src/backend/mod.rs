//! The video backend: an HTTP service the UI talks to through commands,
//! started by the app only in development mode.

pub mod client;
pub mod error;
pub mod process;

pub use client::BackendClient;
pub use error::BackendError;
pub use process::BackendProcess;
