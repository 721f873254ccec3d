pub mod blueprints;
pub mod jobs;
pub mod ranges;
