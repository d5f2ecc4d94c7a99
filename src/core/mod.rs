//! Core types: errors, configuration, localized messages, path helpers.

pub mod config;
pub mod errors;
pub mod messages;
pub mod paths;
