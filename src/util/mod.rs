//! Utility functions shared across components.
//!
//! - **URL validation**: article links, browser links and service endpoints
//! - **Clock**: injectable wall clock for cache expiry and sync timestamps
//! - **Task helpers**: panic capture for background tasks

mod clock;
mod task;
mod url_validator;

pub use clock::{Clock, ManualClock, SystemClock};
pub use task::catch_task_panic;
pub use url_validator::{
    validate_service_url, validate_url, validate_url_for_open, UrlValidationError,
};
