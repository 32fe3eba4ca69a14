//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that
//! accept `&dyn DocumentStore` as the first argument and translate between
//! typed records and stored documents.

pub mod job_repo;
pub mod result_repo;

pub use job_repo::{JobRepo, StatusChange};
pub use result_repo::ResultRepo;
