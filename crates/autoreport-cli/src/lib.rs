//! Library side of the `autoreport` binary.

pub mod config;
pub mod logging;
pub mod pipeline;
