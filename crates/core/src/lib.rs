pub mod dispatch;
pub mod error;
pub mod job;
pub mod render;
pub mod result;
pub mod settings;
pub mod staging;
pub mod status;
pub mod types;
