pub mod app;
pub mod cli;
pub mod config;
pub mod fetch;
pub mod logging;
pub mod scan;
pub mod vision;

// Re-export core types for convenience
pub use eggscan_core::{Confidence, Fetcher, Identification, Identifier};
