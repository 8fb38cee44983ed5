//! Shared process plumbing for the ha-node binaries: logging setup and
//! shutdown signal handling.

pub mod logging;
pub mod shutdown;

pub use shutdown::shutdown_signal;
