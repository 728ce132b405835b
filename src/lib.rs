//! Question-level dropout early warning: event capture, seven-category
//! signal extraction, momentum and risk scoring, rule-based classification,
//! and role-scoped views for teachers and students.

pub mod analyzer;
pub mod classifier;
pub mod collector;
pub mod error;
pub mod features;
pub mod models;
pub mod scenarios;
pub mod scoring;
pub mod system;
pub mod views;

pub use error::{DetectionError, Result};
pub use system::{AnalysisOutcome, AnalysisView, DetectionSystem};
