pub mod config;
pub mod core;
pub mod domain;
pub mod ml;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::{cli::LocalStorage, CliConfig};

pub use config::RunConfig;
pub use core::{engine::TrainingEngine, pipeline::TrainingPipeline};
pub use utils::error::{Result, TrainError};
