//! CPU reference of the precomputation kernels.
//!
//! Mirrors `shaders/common.wgsl` function for function so the GPU pipeline
//! can be validated texel by texel and the pass schedule can be exercised
//! without a device. Distances are in km; `r` is the distance to the planet
//! center, `mu` the view zenith cosine, `mu_s` the sun zenith cosine and `nu`
//! the cosine between view and sun directions.

mod coords;
mod kernels;
mod texels;

pub use coords::ScatteringCoord;
pub use kernels::ScatteringSources;
pub use texels::Texels;

use std::f32::consts::PI;

use crate::lut::LutDimensions;
use crate::params::AtmosphereParameters;

/// Sample counts of the numerical integrals, shared with the shaders.
pub const TRANSMITTANCE_SAMPLE_COUNT: u32 = 500;
pub const SINGLE_SCATTERING_SAMPLE_COUNT: u32 = 50;
pub const SCATTERING_DENSITY_SAMPLE_COUNT: u32 = 16;
pub const INDIRECT_IRRADIANCE_SAMPLE_COUNT: u32 = 32;
pub const MULTIPLE_SCATTERING_SAMPLE_COUNT: u32 = 50;

/// Parameters and table sizes the kernels evaluate against.
#[derive(Debug, Clone, Copy)]
pub struct AtmosphereModel<'a> {
    pub params: &'a AtmosphereParameters,
    pub dims: &'a LutDimensions,
}

impl<'a> AtmosphereModel<'a> {
    pub fn new(params: &'a AtmosphereParameters, dims: &'a LutDimensions) -> Self {
        Self { params, dims }
    }

    pub fn clamp_radius(&self, r: f32) -> f32 {
        r.clamp(self.params.rg, self.params.rt)
    }

    pub fn distance_to_top_atmosphere_boundary(&self, r: f32, mu: f32) -> f32 {
        let rt = self.params.rt;
        let discriminant = r * r * (mu * mu - 1.0) + rt * rt;
        clamp_distance(-r * mu + safe_sqrt(discriminant))
    }

    pub fn distance_to_bottom_atmosphere_boundary(&self, r: f32, mu: f32) -> f32 {
        let rg = self.params.rg;
        let discriminant = r * r * (mu * mu - 1.0) + rg * rg;
        clamp_distance(-r * mu - safe_sqrt(discriminant))
    }

    pub fn ray_intersects_ground(&self, r: f32, mu: f32) -> bool {
        let rg = self.params.rg;
        mu < 0.0 && r * r * (mu * mu - 1.0) + rg * rg >= 0.0
    }

    pub fn distance_to_nearest_atmosphere_boundary(
        &self,
        r: f32,
        mu: f32,
        ray_r_mu_intersects_ground: bool,
    ) -> f32 {
        if ray_r_mu_intersects_ground {
            self.distance_to_bottom_atmosphere_boundary(r, mu)
        } else {
            self.distance_to_top_atmosphere_boundary(r, mu)
        }
    }

    /// Distance from the planet center after travelling `d` along `(r, mu)`.
    fn radius_at(&self, r: f32, mu: f32, d: f32) -> f32 {
        self.clamp_radius((d * d + 2.0 * r * mu * d + r * r).sqrt())
    }
}

pub fn rayleigh_phase(nu: f32) -> f32 {
    3.0 / (16.0 * PI) * (1.0 + nu * nu)
}

/// Cornette-Shanks phase function.
pub fn mie_phase(g: f32, nu: f32) -> f32 {
    let k = 3.0 / (8.0 * PI) * (1.0 - g * g) / (2.0 + g * g);
    k * (1.0 + nu * nu) / (1.0 + g * g - 2.0 * g * nu).powf(1.5)
}

pub(crate) fn clamp_cosine(mu: f32) -> f32 {
    mu.clamp(-1.0, 1.0)
}

pub(crate) fn clamp_distance(d: f32) -> f32 {
    d.max(0.0)
}

pub(crate) fn safe_sqrt(a: f32) -> f32 {
    a.max(0.0).sqrt()
}

/// Trapezoidal weight of sample `i` out of `0..=count`.
pub(crate) fn trapezoid_weight(i: u32, count: u32) -> f32 {
    if i == 0 || i == count { 0.5 } else { 1.0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn earth() -> (AtmosphereParameters, LutDimensions) {
        (AtmosphereParameters::earth(), LutDimensions::STANDARD)
    }

    #[test]
    fn test_distance_to_top_straight_up() {
        let (p, d) = earth();
        let m = AtmosphereModel::new(&p, &d);
        assert!((m.distance_to_top_atmosphere_boundary(p.rg, 1.0) - 100.0).abs() < 1e-2);
        assert!((m.distance_to_top_atmosphere_boundary(p.rt, 1.0)).abs() < 1e-2);
    }

    #[test]
    fn test_distance_to_bottom_straight_down() {
        let (p, d) = earth();
        let m = AtmosphereModel::new(&p, &d);
        let dist = m.distance_to_bottom_atmosphere_boundary(p.rg + 10.0, -1.0);
        assert!((dist - 10.0).abs() < 1e-2, "dist = {dist}");
    }

    #[test]
    fn test_ground_intersection() {
        let (p, d) = earth();
        let m = AtmosphereModel::new(&p, &d);
        assert!(m.ray_intersects_ground(p.rg + 1.0, -1.0));
        assert!(!m.ray_intersects_ground(p.rg + 1.0, 0.0));
        assert!(!m.ray_intersects_ground(p.rg + 1.0, 0.5));
        // Looking slightly down from high up still misses the ground.
        assert!(!m.ray_intersects_ground(p.rt, -0.01));
    }

    #[test]
    fn test_phase_functions_normalized() {
        // Integrate over the sphere: 2*pi * integral of p(nu) dnu over [-1, 1].
        let n = 20_000;
        let integrate = |f: &dyn Fn(f32) -> f32| {
            let mut sum = 0.0_f64;
            for i in 0..n {
                let nu = -1.0 + (i as f32 + 0.5) * 2.0 / n as f32;
                sum += f64::from(f(nu)) * 2.0 / f64::from(n);
            }
            sum * 2.0 * std::f64::consts::PI
        };
        assert!((integrate(&rayleigh_phase) - 1.0).abs() < 1e-3);
        assert!((integrate(&|nu| mie_phase(0.8, nu)) - 1.0).abs() < 1e-2);
    }

    #[test]
    fn test_mie_phase_forward_peaked() {
        assert!(mie_phase(0.8, 1.0) > 10.0 * mie_phase(0.8, -1.0));
    }
}
