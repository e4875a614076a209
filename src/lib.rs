pub mod config;
pub mod detect;
pub mod error;
pub mod merge;
pub mod pipeline;
pub mod pivot;
pub mod plan;
pub mod source;
pub mod store;

pub use config::Config;
pub use detect::{detect_changes, AvailableSources, Delta};
pub use error::{MergeError, PlanError};
pub use merge::{add_category, add_months, MergeOutcome, MergeSummary};
pub use pivot::{MonthLabel, PivotTable};
pub use plan::{Decision, UpdatePlanner};
