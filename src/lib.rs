pub mod app;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::{cli::LocalStorage, CliConfig, Command};

pub use app::pipelines::EtlSequence;
pub use config::toml_config::{EtlConfig, Secret};
pub use core::etl::EtlEngine;
pub use domain::model::{ColumnTable, ResourceKind, StageResult};
pub use utils::error::{EtlError, Result};
