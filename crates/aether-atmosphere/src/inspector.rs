//! Diagnostics context for the atmosphere subsystem.
//!
//! [`AtmosphereInspector`] is created at startup and handed by reference to
//! whatever reports into it: the loader records textures, memory and startup
//! stages, the frame loop reads the tunables.

use std::time::{Duration, Instant};

use glam::Vec3;
use tracing::debug;

use crate::lut::{BYTES_PER_TEXEL, LutDimensions, LutExtent, LutKind, LutTextures};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackedKind {
    Texture2d,
    Texture3d,
}

/// A texture registered for inspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedTexture {
    pub name: String,
    pub width: u32,
    pub height: u32,
    /// 1 for 2D textures.
    pub depth: u32,
    pub kind: TrackedKind,
}

impl TrackedTexture {
    pub fn byte_size(&self) -> usize {
        self.width as usize * self.height as usize * self.depth as usize * BYTES_PER_TEXEL
    }
}

/// Values that can be edited while the renderer runs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AtmosphereTunables {
    pub aerial_perspective_scale: f32,
    pub sun_illuminance_scale: f32,
    pub sun_illuminance_color: Vec3,
    /// Unit vector towards the sun.
    pub sun_direction: Vec3,
}

impl Default for AtmosphereTunables {
    fn default() -> Self {
        Self {
            aerial_perspective_scale: 1.0,
            sun_illuminance_scale: 10.0,
            sun_illuminance_color: Vec3::ONE,
            sun_direction: Vec3::new(-1.0, 1.0, 1.0).normalize(),
        }
    }
}

impl AtmosphereTunables {
    pub fn sun_illuminance(&self) -> Vec3 {
        self.sun_illuminance_color * self.sun_illuminance_scale
    }

    /// Sun direction as `(theta, phi)` in degrees. Theta is the angle from
    /// +Y; phi is measured in the XZ plane from +X towards +Z, in (-180, 180].
    pub fn sun_angles(&self) -> (f32, f32) {
        let d = self.sun_direction.normalize_or_zero();
        let theta = d.y.clamp(-1.0, 1.0).acos().to_degrees();
        let phi = d.z.atan2(d.x).to_degrees();
        (theta, phi)
    }

    pub fn set_sun_angles(&mut self, theta_degrees: f32, phi_degrees: f32) {
        self.sun_direction = sun_direction_from_angles(theta_degrees, phi_degrees);
    }
}

/// Unit vector for a zenith angle `theta` and azimuth `phi`, both in degrees.
pub fn sun_direction_from_angles(theta_degrees: f32, phi_degrees: f32) -> Vec3 {
    let (sin_theta, cos_theta) = theta_degrees.to_radians().sin_cos();
    let (sin_phi, cos_phi) = phi_degrees.to_radians().sin_cos();
    Vec3::new(sin_theta * cos_phi, cos_theta, sin_theta * sin_phi)
}

/// GPU memory held by the LUTs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LutMemoryReport {
    /// Scratch tables alive only while precomputing: delta irradiance plus
    /// three scattering-sized deltas.
    pub precompute_bytes: usize,
    /// The three persistent tables.
    pub runtime_bytes: usize,
}

impl LutMemoryReport {
    pub fn for_dimensions(dims: &LutDimensions) -> Self {
        let irradiance = dims.irradiance().byte_size();
        let scattering = dims.scattering().byte_size();
        Self {
            precompute_bytes: irradiance + 3 * scattering,
            runtime_bytes: dims.transmittance().byte_size() + irradiance + scattering,
        }
    }

    pub fn precompute_mib(&self) -> f64 {
        self.precompute_bytes as f64 / (1024.0 * 1024.0)
    }

    pub fn runtime_mib(&self) -> f64 {
        self.runtime_bytes as f64 / (1024.0 * 1024.0)
    }
}

/// Named startup stages with their offset from the timeline's creation.
#[derive(Debug, Clone)]
pub struct StartupTimeline {
    start: Instant,
    stages: Vec<(String, Duration)>,
}

impl Default for StartupTimeline {
    fn default() -> Self {
        Self::new()
    }
}

impl StartupTimeline {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            stages: Vec::new(),
        }
    }

    /// Record that `name` finished now.
    pub fn mark(&mut self, name: impl Into<String>) -> Duration {
        let at = self.start.elapsed();
        let name = name.into();
        debug!(stage = %name, elapsed_ms = at.as_secs_f64() * 1000.0, "startup stage");
        self.stages.push((name, at));
        at
    }

    pub fn stages(&self) -> &[(String, Duration)] {
        &self.stages
    }

    /// Offset of the last stage, or zero if nothing was marked.
    pub fn total(&self) -> Duration {
        self.stages.last().map(|(_, at)| *at).unwrap_or_default()
    }

    /// Time spent in each stage since the previous one.
    pub fn durations(&self) -> Vec<(&str, Duration)> {
        let mut previous = Duration::ZERO;
        self.stages
            .iter()
            .map(|(name, at)| {
                let spent = at.saturating_sub(previous);
                previous = *at;
                (name.as_str(), spent)
            })
            .collect()
    }
}

/// Diagnostics state for one running atmosphere.
#[derive(Debug, Clone, Default)]
pub struct AtmosphereInspector {
    pub tunables: AtmosphereTunables,
    textures: Vec<TrackedTexture>,
    memory: Option<LutMemoryReport>,
    timeline: StartupTimeline,
}

impl AtmosphereInspector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a texture. A texture with the same name is replaced.
    pub fn track_texture(&mut self, name: impl Into<String>, extent: LutExtent, kind: TrackedKind) {
        let tracked = TrackedTexture {
            name: name.into(),
            width: extent.width,
            height: extent.height,
            depth: extent.depth,
            kind,
        };
        debug!(name = %tracked.name, ?kind, "tracking texture");
        match self.textures.iter_mut().find(|t| t.name == tracked.name) {
            Some(existing) => *existing = tracked,
            None => self.textures.push(tracked),
        }
    }

    /// Register the three persistent tables and record their footprint.
    pub fn track_luts(&mut self, luts: &LutTextures) {
        for kind in LutKind::ALL {
            let tracked_kind = if kind.is_3d() {
                TrackedKind::Texture3d
            } else {
                TrackedKind::Texture2d
            };
            self.track_texture(kind.name(), luts.dims.extent(kind), tracked_kind);
        }
        self.memory = Some(LutMemoryReport::for_dimensions(&luts.dims));
    }

    pub fn textures(&self) -> &[TrackedTexture] {
        &self.textures
    }

    pub fn texture(&self, name: &str) -> Option<&TrackedTexture> {
        self.textures.iter().find(|t| t.name == name)
    }

    pub fn memory(&self) -> Option<&LutMemoryReport> {
        self.memory.as_ref()
    }

    pub fn record_memory(&mut self, report: LutMemoryReport) {
        self.memory = Some(report);
    }

    pub fn mark_stage(&mut self, name: impl Into<String>) -> Duration {
        self.timeline.mark(name)
    }

    pub fn timeline(&self) -> &StartupTimeline {
        &self.timeline
    }
}
