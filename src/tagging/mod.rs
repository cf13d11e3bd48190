//! Tag extraction from channel and category names.
//!
//! A rule pipeline turns raw provider names like
//! `"US: TELEMUNDO 51 MIAMI (WSCV)"` into a normalized tag set and a cleaned
//! display name.

pub mod engine;
pub mod normalize;

pub use engine::{Extraction, TagEngine};
pub use normalize::normalize_tag_name;
