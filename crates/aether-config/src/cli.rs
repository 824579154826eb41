//! Command-line arguments for the bake tool.

use std::path::PathBuf;

use clap::Parser;

use crate::Config;

/// Bake the atmosphere LUT file, or verify an existing one.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug, Default)]
#[command(name = "aether-bake", about = "Precompute atmospheric scattering LUTs")]
pub struct CliArgs {
    /// LUT file to write (or read with `--verify`).
    #[arg(long, short)]
    pub output: Option<PathBuf>,

    /// Highest scattering order to accumulate.
    #[arg(long)]
    pub scattering_orders: Option<u32>,

    /// Average ground albedo.
    #[arg(long)]
    pub ground_albedo: Option<f32>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Only import the existing file and report on it.
    #[arg(long)]
    pub verify: bool,

    /// Use a software adapter.
    #[arg(long)]
    pub force_fallback_adapter: bool,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(ref output) = args.output {
            self.atmosphere.lut_file = output.clone();
        }
        if let Some(orders) = args.scattering_orders {
            self.atmosphere.scattering_orders = orders;
        }
        if let Some(albedo) = args.ground_albedo {
            self.atmosphere.ground_albedo = albedo;
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
        if args.force_fallback_adapter {
            self.gpu.force_fallback_adapter = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_override() {
        let mut config = Config::default();
        let args = CliArgs {
            output: Some(PathBuf::from("out.lut")),
            scattering_orders: Some(8),
            force_fallback_adapter: true,
            ..CliArgs::default()
        };
        config.apply_cli_overrides(&args);
        assert_eq!(config.atmosphere.lut_file, PathBuf::from("out.lut"));
        assert_eq!(config.atmosphere.scattering_orders, 8);
        assert!(config.gpu.force_fallback_adapter);
        // Non-overridden fields retain defaults
        assert_eq!(config.atmosphere.ground_albedo, 0.5);
        assert_eq!(config.debug.log_level, "info");
    }

    #[test]
    fn test_cli_no_override() {
        let original = Config::default();
        let mut config = Config::default();
        config.apply_cli_overrides(&CliArgs::default());
        assert_eq!(config, original);
    }

    #[test]
    fn test_parse_flags() {
        let args = CliArgs::try_parse_from([
            "aether-bake",
            "--output",
            "sky.lut",
            "--scattering-orders",
            "2",
            "--ground-albedo",
            "0.3",
            "--verify",
        ])
        .unwrap();
        assert_eq!(args.output, Some(PathBuf::from("sky.lut")));
        assert_eq!(args.scattering_orders, Some(2));
        assert_eq!(args.ground_albedo, Some(0.3));
        assert!(args.verify);
        assert!(!args.force_fallback_adapter);
    }
}
