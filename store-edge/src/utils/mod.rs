//! Utility module
//!
//! - [`logger`] - tracing bootstrap with optional rolling file output

pub mod logger;

pub use logger::{init_logger, init_logger_with_file};
