//! Analysis modules.
//!
//! Each submodule is a pure function of the loaded tables; `main` runs them
//! in order and collects the results into a [`crate::models::Report`].

pub mod billable;
pub mod environment;
pub mod health;
pub mod investigation;
pub mod monthly;
pub mod patterns;

pub use billable::{
    billable_samples, live_runs, live_workflows, merge, overview, sensitivity, usage_samples,
    DataOverview, SensitivityReport,
};
pub use environment::infer_environment;
pub use health::{assess, CustomerHealth};
pub use investigation::{investigate, Investigation};
pub use monthly::{summarize_billing, BillingSummary};
pub use patterns::{processing_patterns, ProcessingPatterns};
