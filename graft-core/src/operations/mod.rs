pub mod install;

pub use install::{InstallOptions, InstallReport, ReportedPackage, install, install_with_fetcher};
