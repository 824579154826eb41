//! Offline bake of the atmosphere LUT file.
//!
//! Loads `config.ron`, applies command-line overrides, precomputes the
//! tables on the GPU and writes them to the LUT file, then re-imports the
//! file and checks it. With `--verify` it only imports and reports.

mod bake;
mod error;
mod platform;

use std::process::ExitCode;

use aether_atmosphere::AtmosphereInspector;
use aether_config::{CliArgs, Config};
use clap::Parser;
use tracing::{error, info};

use crate::error::BakeError;
use crate::platform::PlatformDirs;

fn main() -> ExitCode {
    let args = CliArgs::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            eprintln!("aether-bake: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &CliArgs) -> Result<(), BakeError> {
    let mut dirs = PlatformDirs::resolve()?;
    if let Some(config_dir) = &args.config {
        dirs = dirs.with_config_dir(config_dir.clone());
    }
    dirs.create_dirs()?;

    let mut config = Config::load_or_create(&dirs.config_dir)?;
    config.apply_cli_overrides(args);
    aether_log::init_logging(Some(&dirs.log_dir), cfg!(debug_assertions), Some(&config));

    let mut inspector = AtmosphereInspector::new();
    inspector.tunables = bake::tunables_from_config(&config);
    inspector.mark_stage("config");

    let ctx = aether_gpu::init_headless_blocking(&bake::gpu_options(&config.gpu))?;
    inspector.mark_stage("device");

    let path = config.lut_path(&dirs.data_dir);
    let stats = if args.verify {
        info!(path = %path.display(), "verifying LUT file");
        bake::verify(&ctx, &config, &path, &mut inspector)?
    } else {
        info!(
            path = %path.display(),
            orders = config.atmosphere.scattering_orders,
            ground_albedo = config.atmosphere.ground_albedo,
            "baking LUT file"
        );
        bake::bake(&ctx, &config, &path, &mut inspector)?
    };

    bake::refresh_tunables(&config, &dirs.config_dir, &mut inspector)?;
    bake::report(&inspector, &stats);
    Ok(())
}
