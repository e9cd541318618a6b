pub mod config;
pub mod console;
pub mod error;
pub mod fetch;
pub mod install;
pub mod installability;
pub mod lockfile;
pub mod manifest;
pub mod operations;
pub mod platform;
pub mod project;
pub mod registry;
pub mod resolution;
pub mod spec;
pub mod status;
pub mod store;
pub mod version;

pub use config::GraftConfig;
pub use error::GraftError;
pub use project::Project;

pub type Result<T> = std::result::Result<T, GraftError>;
