//! Configuration structs with sensible defaults and RON persistence.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// File name of the persisted configuration inside a config directory.
pub const CONFIG_FILE_NAME: &str = "config.ron";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// LUT file and precompute settings.
    pub atmosphere: AtmosphereConfig,
    /// Runtime sky rendering settings.
    pub render: RenderConfig,
    /// Adapter selection.
    pub gpu: GpuConfig,
    /// Debug/development settings.
    pub debug: DebugConfig,
}

/// LUT precompute and storage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AtmosphereConfig {
    /// LUT file. Relative paths resolve against the data directory.
    pub lut_file: PathBuf,
    /// Highest scattering order accumulated.
    pub scattering_orders: u32,
    /// Average ground albedo used by the multiple-scattering passes.
    pub ground_albedo: f32,
    /// Precompute and write the LUT file when it does not exist.
    pub precompute_if_missing: bool,
}

/// Tunables read by the runtime renderer each frame.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RenderConfig {
    /// Multiplier applied to scene distances before aerial perspective.
    pub aerial_perspective_scale: f32,
    pub sun_illuminance_scale: f32,
    pub sun_illuminance_color: [f32; 3],
    /// Direction towards the sun, +Y up.
    pub sun_direction: [f32; 3],
}

/// Mirrors `wgpu::PowerPreference` so this crate stays GPU-agnostic.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum PowerPreference {
    None,
    LowPower,
    #[default]
    HighPerformance,
}

/// Adapter selection.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GpuConfig {
    pub power_preference: PowerPreference,
    /// Prefer a software adapter, e.g. on headless build machines.
    pub force_fallback_adapter: bool,
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level override (e.g., "debug", "info", "warn").
    pub log_level: String,
}

// --- Default implementations ---

impl Default for AtmosphereConfig {
    fn default() -> Self {
        Self {
            lut_file: PathBuf::from("atmosphere.lut"),
            scattering_orders: 4,
            ground_albedo: 0.5,
            precompute_if_missing: true,
        }
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        let d = 1.0 / 3.0_f32.sqrt();
        Self {
            aerial_perspective_scale: 1.0,
            sun_illuminance_scale: 10.0,
            sun_illuminance_color: [1.0, 1.0, 1.0],
            sun_direction: [-d, d, d],
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

// --- Load / Save / Reload ---

impl Config {
    /// Load config from the given directory, or create a default config file.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join(CONFIG_FILE_NAME);

        if config_path.exists() {
            let config = read_config(&config_path)?;
            log::info!("Loaded config from {}", config_path.display());
            Ok(config)
        } else {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Created default config at {}", config_path.display());
            Ok(config)
        }
    }

    /// Save config to the given directory as `config.ron`.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(|source| ConfigError::Write {
            path: config_dir.to_path_buf(),
            source,
        })?;

        let config_path = config_dir.join(CONFIG_FILE_NAME);
        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(3)
            .separate_tuple_members(true)
            .enumerate_arrays(false);

        let serialized =
            ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::Serialize)?;

        std::fs::write(&config_path, serialized).map_err(|source| ConfigError::Write {
            path: config_path.clone(),
            source,
        })?;
        Ok(())
    }

    /// Hot-reload: returns `Some(new_config)` if the file changed, `None` otherwise.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let config_path = config_dir.join(CONFIG_FILE_NAME);
        let new_config = read_config(&config_path)?;

        if &new_config != self {
            log::info!("Config reloaded with changes");
            Ok(Some(new_config))
        } else {
            Ok(None)
        }
    }

    /// The LUT file path, resolved against `data_dir` when relative.
    pub fn lut_path(&self, data_dir: &Path) -> PathBuf {
        if self.atmosphere.lut_file.is_absolute() {
            self.atmosphere.lut_file.clone()
        } else {
            data_dir.join(&self.atmosphere.lut_file)
        }
    }
}

fn read_config(path: &Path) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    ron::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_serializes() {
        let config = Config::default();
        let ron_str =
            ron::ser::to_string_pretty(&config, ron::ser::PrettyConfig::new().depth_limit(3))
                .unwrap();
        assert!(ron_str.contains("scattering_orders: 4"));
        assert!(ron_str.contains("HighPerformance"));
    }

    #[test]
    fn test_config_roundtrip() {
        let config = Config::default();
        let ron_str = ron::to_string(&config).unwrap();
        let deserialized: Config = ron::from_str(&ron_str).unwrap();
        assert_eq!(config, deserialized);
    }

    #[test]
    fn test_default_sun_is_unit_length() {
        let [x, y, z] = RenderConfig::default().sun_direction;
        assert!(((x * x + y * y + z * z).sqrt() - 1.0).abs() < 1e-6);
        assert!(y > 0.0);
    }

    #[test]
    fn test_missing_section_uses_default() {
        let ron_str = "(atmosphere: (scattering_orders: 6), debug: ())";
        let config: Config = ron::from_str(ron_str).unwrap();
        assert_eq!(config.atmosphere.scattering_orders, 6);
        assert_eq!(config.atmosphere.ground_albedo, 0.5);
        assert_eq!(config.render, RenderConfig::default());
        assert_eq!(config.gpu, GpuConfig::default());
    }

    #[test]
    fn test_extra_field_ignored() {
        let result: Result<Config, _> = ron::from_str("(future_setting: true)");
        assert!(result.is_ok());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.atmosphere.lut_file = PathBuf::from("earth.lut");
        config.gpu.force_fallback_adapter = true;
        config.render.aerial_perspective_scale = 8.0;

        config.save(dir.path()).unwrap();
        let loaded = Config::load_or_create(dir.path()).unwrap();
        assert_eq!(config, loaded);
    }

    #[test]
    fn test_load_or_create_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_or_create(dir.path()).unwrap();
        assert_eq!(config, Config::default());
        assert!(dir.path().join(CONFIG_FILE_NAME).exists());
    }

    #[test]
    fn test_reload_detects_changes() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        config.save(dir.path()).unwrap();

        let mut modified = config.clone();
        modified.atmosphere.ground_albedo = 0.1;
        modified.save(dir.path()).unwrap();

        let result = config.reload(dir.path()).unwrap();
        assert_eq!(result.map(|c| c.atmosphere.ground_albedo), Some(0.1));
    }

    #[test]
    fn test_reload_no_changes() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        config.save(dir.path()).unwrap();
        assert!(config.reload(dir.path()).unwrap().is_none());
    }

    #[test]
    fn test_invalid_ron_produces_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE_NAME), "{{not valid}}").unwrap();
        let result = Config::load_or_create(dir.path());
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_errors_name_the_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        match Config::default().reload(dir.path()) {
            Err(ConfigError::Read { path: reported, .. }) => assert_eq!(reported, path),
            other => panic!("unexpected result: {other:?}"),
        }

        std::fs::write(&path, "(atmosphere: (scattering_orders: \"four\"))").unwrap();
        let err = Config::load_or_create(dir.path()).unwrap_err();
        assert!(err.to_string().contains(CONFIG_FILE_NAME), "{err}");
    }

    #[test]
    fn test_lut_path_resolution() {
        let mut config = Config::default();
        let data = Path::new("data");
        assert_eq!(config.lut_path(data), data.join("atmosphere.lut"));

        let absolute = std::env::temp_dir().join("baked.lut");
        config.atmosphere.lut_file = absolute.clone();
        assert_eq!(config.lut_path(data), absolute);
    }
}
