//! Utility functions and types

mod logging;

pub use logging::init_logging;
