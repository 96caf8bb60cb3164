pub mod core;
pub mod reports;
pub mod results;
pub mod scoring;
pub mod setup;
pub mod subjects;
