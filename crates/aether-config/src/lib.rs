//! Configuration for the atmosphere tools.
//!
//! Settings persist to disk as RON and can be overridden from the command
//! line. Every section defaults independently, so older files keep loading
//! as fields are added.

mod cli;
mod config;
mod error;

pub use cli::CliArgs;
pub use config::{
    AtmosphereConfig, CONFIG_FILE_NAME, Config, DebugConfig, GpuConfig, PowerPreference,
    RenderConfig,
};
pub use error::ConfigError;
