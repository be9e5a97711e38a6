//! Swipe-to-triage blog reader core.
//!
//! Posts move between decks (`inbox`, `saved`, `favorites`, `twitter`,
//! `highlights`) through swipe gestures. Article bodies and AI summaries are
//! fetched on demand and cached on device; highlights and statuses are
//! mirrored to an optional cloud store.

pub mod app;
pub mod config;
pub mod content;
pub mod deck;
pub mod feed;
pub mod gesture;
pub mod highlights;
pub mod storage;
pub mod sync;
pub mod util;
