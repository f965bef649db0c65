//! Core types and traits for the eggscan storage core.
//!
//! This crate provides the types shared by the cache, the history store and
//! the application shell:
//! - Identification results (`Identification`, `Confidence`)
//! - Collaborator traits (`Fetcher`, `Identifier`)
//! - Parsing of the vision model's line-oriented reply

mod identification;
mod reply;
mod traits;

pub use identification::{Confidence, Identification, UNKNOWN_LABEL};
pub use reply::parse_reply;
pub use traits::{Fetcher, Identifier};
