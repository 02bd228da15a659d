//! Transport layer (HTTP scrape endpoint).
//!
//! The scrape handler answers 200 immediately and streams the assembled body;
//! nothing that happens after the headers are sent can change the status.

pub mod scrape;
