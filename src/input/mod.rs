//! Input boundary: records, job postings and the resume document

pub mod file_detector;
pub mod postings;
pub mod record;
pub mod resume;

pub use postings::JobPosting;
pub use record::{RecordKind, TextRecord};
pub use resume::ResumeLoader;
