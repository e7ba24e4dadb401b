//! Overlay compositing and case-state engine for X-ray explanation review.
//!
//! A backend analysis response is turned into an editable layer stack and a
//! resolved severity score; edits and derived artifacts (chart snapshots) are
//! merged into one shared [`context::CaseContext`] that later stages read.

pub mod analysis;
pub mod chart;
pub mod composite;
pub mod config;
pub mod context;
pub mod editor;
pub mod error;
pub mod events;
pub mod layers;
pub mod report;
pub mod scores;
pub mod service;
pub mod stage;

pub use error::{ReviewError, ReviewResult};
