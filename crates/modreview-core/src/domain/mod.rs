//! Domain models for ModReview.
//!
//! Canonical definitions for the core entities:
//! - `ReviewSubmission`: a reviewer's finalized classification and justification
//! - `ReviewResult`: the correction computed by the backend worker
//! - `ClassificationSet`: the closed enumeration a submission is checked against

pub mod classification;
pub mod error;
pub mod result;
pub mod submission;

pub use classification::{ClassificationOption, ClassificationSet};
pub use error::ValidationError;
pub use result::ReviewResult;
pub use submission::ReviewSubmission;
