//! Physical description of the atmosphere, laid out for direct GPU upload.
//!
//! [`AtmosphereParameters`] is uploaded verbatim into a uniform buffer and is
//! also the first block of every LUT file, so its byte layout is a wire format.
//! All lengths are in kilometers and all coefficients in km⁻¹.

use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use static_assertions::const_assert_eq;

/// One analytic density layer:
/// `exp_term * exp(exp_scale * h) + linear_term * h + constant_term`,
/// clamped to [0, 1].
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct DensityLayer {
    pub exp_term: f32,
    pub exp_scale: f32,
    pub linear_term: f32,
    pub constant_term: f32,
}

impl DensityLayer {
    /// Pure exponential falloff with the given scale height.
    pub fn exponential(scale_height: f32) -> Self {
        Self {
            exp_term: 1.0,
            exp_scale: -1.0 / scale_height,
            linear_term: 0.0,
            constant_term: 0.0,
        }
    }

    /// Linear ramp `linear_term * h + constant_term`.
    pub fn linear(linear_term: f32, constant_term: f32) -> Self {
        Self {
            exp_term: 0.0,
            exp_scale: 0.0,
            linear_term,
            constant_term,
        }
    }

    /// Relative density at `altitude` km above the ground.
    pub fn density(&self, altitude: f32) -> f32 {
        let d = self.exp_term * (self.exp_scale * altitude).exp()
            + self.linear_term * altitude
            + self.constant_term;
        d.clamp(0.0, 1.0)
    }
}

/// GPU-visible atmosphere description. Matches `AtmosphereParameters` in
/// `shaders/common.wgsl` field for field.
///
/// WGSL aligns `vec3<f32>` to 16 bytes, so every RGB coefficient is followed
/// by either an explicit pad or a scalar occupying the fourth lane.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct AtmosphereParameters {
    /// Ground radius. (offset 0)
    pub rg: f32,
    /// Top-of-atmosphere radius. (offset 4)
    pub rt: f32,
    /// Rayleigh scale height. (offset 8)
    pub hr: f32,
    /// Mie scale height. (offset 12)
    pub hm: f32,
    /// Rayleigh scattering coefficient. (offset 16)
    pub rayleigh_scattering: [f32; 3],
    pub _pad0: f32,
    /// Rayleigh extinction coefficient. (offset 32)
    pub rayleigh_extinction: [f32; 3],
    pub _pad1: f32,
    /// (offset 48)
    pub rayleigh_layer: DensityLayer,
    /// Mie scattering coefficient. (offset 64)
    pub mie_scattering: [f32; 3],
    pub _pad2: f32,
    /// Mie extinction coefficient. (offset 80)
    pub mie_extinction: [f32; 3],
    /// Henyey-Greenstein asymmetry. (offset 92)
    pub mie_g: f32,
    /// (offset 96)
    pub mie_layer: DensityLayer,
    /// Ozone absorption extinction. (offset 112)
    pub ozone_extinction: [f32; 3],
    /// Altitude where the lower ozone layer hands over to the upper one. (offset 124)
    pub ozone_layer_height: f32,
    /// Lower and upper ozone layers. (offset 128)
    pub ozone_layers: [DensityLayer; 2],
    /// Normalized to 1 so the LUTs are a transfer function of the sun. (offset 160)
    pub solar_irradiance: [f32; 3],
    /// (offset 172)
    pub sun_angular_radius: f32,
    /// (offset 176)
    pub ground_albedo: [f32; 3],
    /// Cosine of the largest sun zenith angle stored in the scattering LUT. (offset 188)
    pub mu_s_min: f32,
}

const_assert_eq!(std::mem::size_of::<DensityLayer>(), 16);
const_assert_eq!(std::mem::size_of::<AtmosphereParameters>(), 192);

impl AtmosphereParameters {
    /// Earth-like defaults.
    pub fn earth() -> Self {
        let hr = 8.0;
        let hm = 1.2;
        let rayleigh = [5.8e-3, 1.35e-2, 3.31e-2];
        Self {
            rg: 6360.0,
            rt: 6460.0,
            hr,
            hm,
            rayleigh_scattering: rayleigh,
            _pad0: 0.0,
            rayleigh_extinction: rayleigh,
            _pad1: 0.0,
            rayleigh_layer: DensityLayer::exponential(hr),
            mie_scattering: [3.996e-3; 3],
            _pad2: 0.0,
            mie_extinction: [4.440e-3; 3],
            mie_g: 0.8,
            mie_layer: DensityLayer::exponential(hm),
            ozone_extinction: [6.5e-4, 1.881e-3, 8.5e-5],
            ozone_layer_height: 25.0,
            ozone_layers: [
                DensityLayer::linear(1.0 / 15.0, -2.0 / 3.0),
                DensityLayer::linear(-1.0 / 15.0, 8.0 / 3.0),
            ],
            solar_irradiance: [1.0; 3],
            sun_angular_radius: 0.004675,
            ground_albedo: [0.5; 3],
            mu_s_min: 120.0_f32.to_radians().cos(),
        }
    }

    /// Override the ground albedo on every channel.
    pub fn with_ground_albedo(mut self, albedo: f32) -> Self {
        self.ground_albedo = [albedo; 3];
        self
    }

    /// Same geometry with every scattering and extinction coefficient zeroed.
    pub fn without_scattering(mut self) -> Self {
        self.rayleigh_scattering = [0.0; 3];
        self.rayleigh_extinction = [0.0; 3];
        self.mie_scattering = [0.0; 3];
        self.mie_extinction = [0.0; 3];
        self.ozone_extinction = [0.0; 3];
        self
    }

    pub fn rayleigh_density(&self, altitude: f32) -> f32 {
        self.rayleigh_layer.density(altitude)
    }

    pub fn mie_density(&self, altitude: f32) -> f32 {
        self.mie_layer.density(altitude)
    }

    /// Two stacked layers switching at `ozone_layer_height`.
    pub fn ozone_density(&self, altitude: f32) -> f32 {
        if altitude < self.ozone_layer_height {
            self.ozone_layers[0].density(altitude)
        } else {
            self.ozone_layers[1].density(altitude)
        }
    }

    pub fn rayleigh_scattering(&self) -> Vec3 {
        Vec3::from(self.rayleigh_scattering)
    }

    pub fn rayleigh_extinction(&self) -> Vec3 {
        Vec3::from(self.rayleigh_extinction)
    }

    pub fn mie_scattering(&self) -> Vec3 {
        Vec3::from(self.mie_scattering)
    }

    pub fn mie_extinction(&self) -> Vec3 {
        Vec3::from(self.mie_extinction)
    }

    pub fn ozone_extinction(&self) -> Vec3 {
        Vec3::from(self.ozone_extinction)
    }

    pub fn solar_irradiance(&self) -> Vec3 {
        Vec3::from(self.solar_irradiance)
    }

    pub fn ground_albedo(&self) -> Vec3 {
        Vec3::from(self.ground_albedo)
    }

    /// Raw bytes exactly as uploaded to the GPU.
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }

    /// Size of the parameter block in a LUT file.
    pub const fn padded_size() -> usize {
        std::mem::size_of::<Self>().next_multiple_of(16)
    }
}

impl Default for AtmosphereParameters {
    fn default() -> Self {
        Self::earth()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::offset_of;

    #[test]
    fn test_earth_defaults() {
        let p = AtmosphereParameters::earth();
        assert_eq!(p.rg, 6360.0);
        assert_eq!(p.rt, 6460.0);
        assert_eq!(p.sun_angular_radius, 0.004675);
        assert!((p.mu_s_min + 0.5).abs() < 1e-6, "mu_s_min = {}", p.mu_s_min);
        assert_eq!(p.solar_irradiance, [1.0; 3]);
        assert_eq!(p.rayleigh_scattering, p.rayleigh_extinction);
        assert_eq!(p.ground_albedo, [0.5; 3]);
    }

    #[test]
    fn test_layout_matches_wgsl_offsets() {
        assert_eq!(offset_of!(AtmosphereParameters, rayleigh_scattering), 16);
        assert_eq!(offset_of!(AtmosphereParameters, rayleigh_extinction), 32);
        assert_eq!(offset_of!(AtmosphereParameters, rayleigh_layer), 48);
        assert_eq!(offset_of!(AtmosphereParameters, mie_scattering), 64);
        assert_eq!(offset_of!(AtmosphereParameters, mie_extinction), 80);
        assert_eq!(offset_of!(AtmosphereParameters, mie_g), 92);
        assert_eq!(offset_of!(AtmosphereParameters, mie_layer), 96);
        assert_eq!(offset_of!(AtmosphereParameters, ozone_extinction), 112);
        assert_eq!(offset_of!(AtmosphereParameters, ozone_layers), 128);
        assert_eq!(offset_of!(AtmosphereParameters, solar_irradiance), 160);
        assert_eq!(offset_of!(AtmosphereParameters, ground_albedo), 176);
        assert_eq!(offset_of!(AtmosphereParameters, mu_s_min), 188);
        assert_eq!(AtmosphereParameters::padded_size(), 192);
    }

    #[test]
    fn test_density_layer_clamped() {
        let p = AtmosphereParameters::earth();
        for h in [-50.0, -1.0, 0.0, 5.0, 10.0, 25.0, 40.0, 100.0, 1.0e4] {
            for d in [p.rayleigh_density(h), p.mie_density(h), p.ozone_density(h)] {
                assert!((0.0..=1.0).contains(&d), "density {d} at {h} km");
            }
        }
        // Exponential layers would exceed 1 below the ground without the clamp.
        assert_eq!(p.rayleigh_density(-10.0), 1.0);
        // Linear ozone ramps would go negative outside [10, 40] km.
        assert_eq!(p.ozone_density(0.0), 0.0);
        assert_eq!(p.ozone_density(60.0), 0.0);
    }

    #[test]
    fn test_ozone_peaks_at_layer_boundary() {
        let p = AtmosphereParameters::earth();
        assert!((p.ozone_density(25.0) - 1.0).abs() < 1e-5);
        assert!((p.ozone_density(17.5) - 0.5).abs() < 1e-5);
        assert!((p.ozone_density(32.5) - 0.5).abs() < 1e-5);
    }

    #[test]
    fn test_without_scattering_zeroes_coefficients() {
        let p = AtmosphereParameters::earth().without_scattering();
        assert_eq!(p.rayleigh_scattering(), Vec3::ZERO);
        assert_eq!(p.mie_extinction(), Vec3::ZERO);
        assert_eq!(p.ozone_extinction(), Vec3::ZERO);
        assert_eq!(p.rg, 6360.0);
    }
}
