pub mod collaborators;
pub mod config;
pub mod cues;
pub mod error;
pub mod paths;
pub mod style;
pub mod subtitle;
pub mod types;
