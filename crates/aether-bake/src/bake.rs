//! Bake and verify runs.

use std::path::Path;

use aether_atmosphere::{
    Atmosphere, AtmosphereError, AtmosphereInspector, AtmosphereParameters, AtmosphereTunables,
    LutImage, LutImages, LutMemoryReport, read_lut_file,
};
use aether_config::{Config, GpuConfig, PowerPreference};
use aether_gpu::{GpuContext, GpuOptions};
use glam::Vec3;
use tracing::{info, instrument};

use crate::error::BakeError;

/// Summary of a verified LUT set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LutStats {
    pub min_transmittance: f32,
    pub max_transmittance: f32,
    pub max_irradiance: f32,
    pub max_scattering: f32,
}

/// Device options for the configured adapter preference.
pub fn gpu_options(config: &GpuConfig) -> GpuOptions {
    let mut options = aether_atmosphere::gpu_options("aether-bake");
    options.power_preference = match config.power_preference {
        PowerPreference::None => wgpu::PowerPreference::None,
        PowerPreference::LowPower => wgpu::PowerPreference::LowPower,
        PowerPreference::HighPerformance => wgpu::PowerPreference::HighPerformance,
    };
    options.force_fallback_adapter = config.force_fallback_adapter;
    options
}

/// Runtime tunables seeded from the render section.
pub fn tunables_from_config(config: &Config) -> AtmosphereTunables {
    let render = &config.render;
    AtmosphereTunables {
        aerial_perspective_scale: render.aerial_perspective_scale,
        sun_illuminance_scale: render.sun_illuminance_scale,
        sun_illuminance_color: Vec3::from(render.sun_illuminance_color),
        sun_direction: Vec3::from(render.sun_direction)
            .try_normalize()
            .unwrap_or(Vec3::Y),
    }
}

/// Pick up render tunables edited in `config.ron` while a run was in
/// progress. Returns whether the inspector changed.
pub fn refresh_tunables(
    config: &Config,
    config_dir: &Path,
    inspector: &mut AtmosphereInspector,
) -> Result<bool, BakeError> {
    let Some(on_disk) = config.reload(config_dir)? else {
        return Ok(false);
    };
    let tunables = tunables_from_config(&on_disk);
    if tunables == inspector.tunables {
        return Ok(false);
    }
    info!(
        sun_illuminance_scale = tunables.sun_illuminance_scale,
        aerial_perspective_scale = tunables.aerial_perspective_scale,
        "render tunables reloaded"
    );
    inspector.tunables = tunables;
    Ok(true)
}

pub fn params_from_config(config: &Config) -> AtmosphereParameters {
    AtmosphereParameters::earth().with_ground_albedo(config.atmosphere.ground_albedo)
}

/// Precompute, export to `path`, then read the file back and check it
/// against the tables still on the GPU.
#[instrument(skip(ctx, config, inspector))]
pub fn bake(
    ctx: &GpuContext,
    config: &Config,
    path: &Path,
    inspector: &mut AtmosphereInspector,
) -> Result<LutStats, BakeError> {
    let orders = config.atmosphere.scattering_orders;
    let atmosphere = Atmosphere::precompute(ctx, params_from_config(config), orders)?;
    inspector.mark_stage("lut-precompute");

    atmosphere.export(ctx, path)?;
    inspector.mark_stage("lut-export");
    inspector.track_luts(atmosphere.luts());

    let on_gpu = atmosphere
        .luts()
        .read_back(ctx)
        .map_err(AtmosphereError::from)?;
    let (params, on_disk) = read_lut_file(path, &atmosphere.luts().dims)
        .map_err(AtmosphereError::from)?;
    if params != *atmosphere.params() {
        return Err(BakeError::Verification {
            table: "params",
            reason: "file parameters differ from the baked ones".to_string(),
        });
    }
    if on_disk != on_gpu {
        return Err(BakeError::Verification {
            table: "file",
            reason: "re-imported texels differ from the GPU tables".to_string(),
        });
    }
    let stats = verify_images(&on_disk)?;
    inspector.mark_stage("lut-verify");
    Ok(stats)
}

/// Import `path` and check its contents. With `precompute_if_missing`, a
/// missing file is baked first.
#[instrument(skip(ctx, config, inspector))]
pub fn verify(
    ctx: &GpuContext,
    config: &Config,
    path: &Path,
    inspector: &mut AtmosphereInspector,
) -> Result<LutStats, BakeError> {
    let atmosphere = if path.exists() {
        let atmosphere = Atmosphere::import(ctx, path)?;
        inspector.mark_stage("lut-import");
        inspector.track_luts(atmosphere.luts());
        atmosphere
    } else if config.atmosphere.precompute_if_missing {
        Atmosphere::load_or_precompute(
            ctx,
            path,
            params_from_config(config),
            config.atmosphere.scattering_orders,
            inspector,
        )?
    } else {
        return Err(BakeError::MissingLutFile {
            path: path.to_path_buf(),
        });
    };

    let images = atmosphere
        .luts()
        .read_back(ctx)
        .map_err(AtmosphereError::from)?;
    let stats = verify_images(&images)?;
    inspector.mark_stage("lut-verify");
    Ok(stats)
}

/// Check the physical bounds of every table: transmittance in [0, 1],
/// irradiance and scattering finite and non-negative.
pub fn verify_images(images: &LutImages) -> Result<LutStats, BakeError> {
    let (min_transmittance, max_transmittance) =
        channel_range("transmittance", &images.transmittance)?;
    if min_transmittance < 0.0 || max_transmittance > 1.0 {
        return Err(BakeError::Verification {
            table: "transmittance",
            reason: format!("values span [{min_transmittance}, {max_transmittance}]"),
        });
    }

    let (min_irradiance, max_irradiance) = channel_range("irradiance", &images.irradiance)?;
    let (min_scattering, max_scattering) = channel_range("scattering", &images.scattering)?;
    for (table, min) in [("irradiance", min_irradiance), ("scattering", min_scattering)] {
        if min < 0.0 {
            return Err(BakeError::Verification {
                table,
                reason: format!("negative value {min}"),
            });
        }
    }

    Ok(LutStats {
        min_transmittance,
        max_transmittance,
        max_irradiance,
        max_scattering,
    })
}

/// Min and max over the RGB channels.
fn channel_range(table: &'static str, image: &LutImage) -> Result<(f32, f32), BakeError> {
    let mut min = f32::INFINITY;
    let mut max = f32::NEG_INFINITY;
    for texel in image.texels() {
        for &v in &texel[..3] {
            if !v.is_finite() {
                return Err(BakeError::Verification {
                    table,
                    reason: format!("non-finite value {v}"),
                });
            }
            min = min.min(v);
            max = max.max(v);
        }
    }
    if min > max {
        return Err(BakeError::Verification {
            table,
            reason: "table is empty".to_string(),
        });
    }
    Ok((min, max))
}

/// Log the footprint, the stats and each startup stage.
pub fn report(inspector: &AtmosphereInspector, stats: &LutStats) {
    if let Some(memory) = inspector.memory() {
        log_memory(memory);
    }
    for texture in inspector.textures() {
        info!(
            name = %texture.name,
            width = texture.width,
            height = texture.height,
            depth = texture.depth,
            kind = ?texture.kind,
            "LUT"
        );
    }
    info!(
        min_transmittance = stats.min_transmittance,
        max_transmittance = stats.max_transmittance,
        max_irradiance = stats.max_irradiance,
        max_scattering = stats.max_scattering,
        "LUT ranges"
    );
    let tunables = &inspector.tunables;
    info!(
        aerial_perspective_scale = tunables.aerial_perspective_scale,
        sun_illuminance = ?tunables.sun_illuminance(),
        sun_direction = ?tunables.sun_direction,
        "render tunables"
    );
    for (stage, spent) in inspector.timeline().durations() {
        info!(stage, elapsed_ms = spent.as_secs_f64() * 1000.0, "startup stage");
    }
    info!(
        total_ms = inspector.timeline().total().as_secs_f64() * 1000.0,
        "startup finished"
    );
}

fn log_memory(memory: &LutMemoryReport) {
    info!(
        precompute_mib = memory.precompute_mib(),
        runtime_mib = memory.runtime_mib(),
        "LUT memory"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use aether_atmosphere::{LutDimensions, LutExtent};

    fn images_with(transmittance: f32, scattering: f32) -> LutImages {
        let dims = LutDimensions {
            transmittance_width: 4,
            transmittance_height: 2,
            irradiance_width: 2,
            irradiance_height: 2,
            scattering_r_size: 2,
            scattering_mu_size: 2,
            scattering_mu_s_size: 2,
            scattering_nu_size: 2,
        };
        let fill = |extent: LutExtent, v: f32| {
            LutImage::from_texels(extent, &vec![[v, v, v, 1.0]; extent.texel_count()])
        };
        LutImages {
            transmittance: fill(dims.transmittance(), transmittance),
            irradiance: fill(dims.irradiance(), 0.25),
            scattering: fill(dims.scattering(), scattering),
        }
    }

    #[test]
    fn test_verify_accepts_physical_tables() {
        let stats = verify_images(&images_with(0.8, 0.1)).unwrap();
        assert_eq!(stats.min_transmittance, 0.8);
        assert_eq!(stats.max_irradiance, 0.25);
        assert_eq!(stats.max_scattering, 0.1);
    }

    #[test]
    fn test_verify_rejects_transmittance_above_one() {
        let err = verify_images(&images_with(1.5, 0.1)).unwrap_err();
        assert!(matches!(
            err,
            BakeError::Verification {
                table: "transmittance",
                ..
            }
        ));
    }

    #[test]
    fn test_verify_rejects_negative_scattering() {
        let err = verify_images(&images_with(0.5, -0.1)).unwrap_err();
        assert!(matches!(err, BakeError::Verification { table: "scattering", .. }));
    }

    #[test]
    fn test_verify_rejects_nan() {
        let err = verify_images(&images_with(0.5, f32::NAN)).unwrap_err();
        assert!(err.to_string().contains("non-finite"));
    }

    #[test]
    fn test_gpu_options_follow_config() {
        let config = GpuConfig {
            power_preference: PowerPreference::LowPower,
            force_fallback_adapter: true,
        };
        let options = gpu_options(&config);
        assert_eq!(options.power_preference, wgpu::PowerPreference::LowPower);
        assert!(options.force_fallback_adapter);
        assert!(options.required_features.contains(wgpu::Features::FLOAT32_BLENDABLE));
    }

    #[test]
    fn test_tunables_from_config() {
        let mut config = Config::default();
        config.render.sun_direction = [0.0, 2.0, 0.0];
        config.render.sun_illuminance_scale = 3.0;
        let tunables = tunables_from_config(&config);
        assert_eq!(tunables.sun_direction, Vec3::Y);
        assert_eq!(tunables.sun_illuminance(), Vec3::splat(3.0));
    }

    #[test]
    fn test_refresh_tunables_follows_render_edits() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        config.save(dir.path()).unwrap();
        let mut inspector = AtmosphereInspector::new();
        inspector.tunables = tunables_from_config(&config);

        assert!(!refresh_tunables(&config, dir.path(), &mut inspector).unwrap());

        let mut edited = config.clone();
        edited.render.sun_illuminance_scale = 20.0;
        edited.save(dir.path()).unwrap();
        assert!(refresh_tunables(&config, dir.path(), &mut inspector).unwrap());
        assert_eq!(inspector.tunables.sun_illuminance_scale, 20.0);
    }

    #[test]
    fn test_refresh_tunables_ignores_atmosphere_edits() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        let mut edited = config.clone();
        edited.atmosphere.ground_albedo = 0.1;
        edited.save(dir.path()).unwrap();
        let mut inspector = AtmosphereInspector::new();
        inspector.tunables = tunables_from_config(&config);
        assert!(!refresh_tunables(&config, dir.path(), &mut inspector).unwrap());
    }

    #[test]
    fn test_params_use_configured_albedo() {
        let mut config = Config::default();
        config.atmosphere.ground_albedo = 0.2;
        assert_eq!(params_from_config(&config).ground_albedo, [0.2; 3]);
    }

    #[test]
    fn test_verify_missing_file_without_precompute() {
        let Ok(ctx) = aether_gpu::init_headless_blocking(&gpu_options(&GpuConfig::default()))
        else {
            return;
        };
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.atmosphere.precompute_if_missing = false;
        let mut inspector = AtmosphereInspector::new();
        let result = verify(&ctx, &config, &dir.path().join("none.lut"), &mut inspector);
        assert!(matches!(result, Err(BakeError::MissingLutFile { .. })));
    }
}
