//! RSS/Atom ingestion into the triage collection.
//!
//! Parsing uses the `feed-rs` crate; storage goes through
//! [`Database::upsert_posts`](crate::storage::Database::upsert_posts), which
//! never overwrites an existing post's status.

mod parser;

pub use parser::parse_feed;
