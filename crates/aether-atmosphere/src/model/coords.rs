//! Mappings between physical coordinates and LUT texture coordinates.
//!
//! Texture coordinates address texel centers: a unit-range value `x` maps to
//! `0.5 / n + x * (1 - 1 / n)` so that both ends of the range land exactly on
//! the first and last texel.

use glam::{Vec2, Vec4};

use super::{AtmosphereModel, clamp_cosine, safe_sqrt};

/// Physical coordinates of a scattering texel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScatteringCoord {
    pub r: f32,
    pub mu: f32,
    pub mu_s: f32,
    pub nu: f32,
    pub ray_r_mu_intersects_ground: bool,
}

pub(crate) fn texture_coord_from_unit_range(x: f32, texture_size: f32) -> f32 {
    0.5 / texture_size + x * (1.0 - 1.0 / texture_size)
}

pub(crate) fn unit_range_from_texture_coord(u: f32, texture_size: f32) -> f32 {
    (u - 0.5 / texture_size) / (1.0 - 1.0 / texture_size)
}

impl AtmosphereModel<'_> {
    /// `sqrt(rt² - rg²)`: distance to the top boundary along a horizontal ray at ground level.
    fn horizon_distance(&self) -> f32 {
        let p = self.params;
        (p.rt * p.rt - p.rg * p.rg).sqrt()
    }

    pub fn transmittance_uv_from_r_mu(&self, r: f32, mu: f32) -> Vec2 {
        let rg = self.params.rg;
        let h = self.horizon_distance();
        let rho = safe_sqrt(r * r - rg * rg);
        let d = self.distance_to_top_atmosphere_boundary(r, mu);
        let d_min = self.params.rt - r;
        let d_max = rho + h;
        let x_mu = (d - d_min) / (d_max - d_min);
        let x_r = rho / h;
        Vec2::new(
            texture_coord_from_unit_range(x_mu, self.dims.transmittance_width as f32),
            texture_coord_from_unit_range(x_r, self.dims.transmittance_height as f32),
        )
    }

    pub fn r_mu_from_transmittance_uv(&self, uv: Vec2) -> (f32, f32) {
        let rg = self.params.rg;
        let x_mu = unit_range_from_texture_coord(uv.x, self.dims.transmittance_width as f32);
        let x_r = unit_range_from_texture_coord(uv.y, self.dims.transmittance_height as f32);
        let h = self.horizon_distance();
        let rho = h * x_r;
        let r = (rho * rho + rg * rg).sqrt();
        let d_min = self.params.rt - r;
        let d_max = rho + h;
        let d = d_min + x_mu * (d_max - d_min);
        let mu = if d == 0.0 {
            1.0
        } else {
            (h * h - rho * rho - d * d) / (2.0 * r * d)
        };
        (r, clamp_cosine(mu))
    }

    pub fn irradiance_uv_from_r_mu_s(&self, r: f32, mu_s: f32) -> Vec2 {
        let p = self.params;
        let x_r = (r - p.rg) / (p.rt - p.rg);
        let x_mu_s = mu_s * 0.5 + 0.5;
        Vec2::new(
            texture_coord_from_unit_range(x_mu_s, self.dims.irradiance_width as f32),
            texture_coord_from_unit_range(x_r, self.dims.irradiance_height as f32),
        )
    }

    pub fn r_mu_s_from_irradiance_uv(&self, uv: Vec2) -> (f32, f32) {
        let p = self.params;
        let x_mu_s = unit_range_from_texture_coord(uv.x, self.dims.irradiance_width as f32);
        let x_r = unit_range_from_texture_coord(uv.y, self.dims.irradiance_height as f32);
        let r = p.rg + x_r * (p.rt - p.rg);
        (r, clamp_cosine(2.0 * x_mu_s - 1.0))
    }

    /// 4D texture coordinate `(u_nu, u_mu_s, u_mu, u_r)`.
    ///
    /// `u_mu` uses the lower half of its range for rays hitting the ground and
    /// the upper half for rays escaping to space.
    pub fn scattering_uvwz(&self, c: &ScatteringCoord) -> Vec4 {
        let p = self.params;
        let dims = self.dims;
        let (r, mu) = (c.r, c.mu);
        let h = self.horizon_distance();
        let rho = safe_sqrt(r * r - p.rg * p.rg);
        let u_r = texture_coord_from_unit_range(rho / h, dims.scattering_r_size as f32);

        let r_mu = r * mu;
        let discriminant = r_mu * r_mu - r * r + p.rg * p.rg;
        let half_mu = dims.scattering_mu_size as f32 / 2.0;
        let u_mu = if c.ray_r_mu_intersects_ground {
            let d = -r_mu - safe_sqrt(discriminant);
            let d_min = r - p.rg;
            let d_max = rho;
            let x = if d_max == d_min {
                0.0
            } else {
                (d - d_min) / (d_max - d_min)
            };
            0.5 - 0.5 * texture_coord_from_unit_range(x, half_mu)
        } else {
            let d = -r_mu + safe_sqrt(discriminant + h * h);
            let d_min = p.rt - r;
            let d_max = rho + h;
            0.5 + 0.5 * texture_coord_from_unit_range((d - d_min) / (d_max - d_min), half_mu)
        };

        let d = self.distance_to_top_atmosphere_boundary(p.rg, c.mu_s);
        let d_min = p.rt - p.rg;
        let d_max = h;
        let a = (d - d_min) / (d_max - d_min);
        let big_d = self.distance_to_top_atmosphere_boundary(p.rg, p.mu_s_min);
        let big_a = (big_d - d_min) / (d_max - d_min);
        let u_mu_s = texture_coord_from_unit_range(
            (1.0 - a / big_a).max(0.0) / (1.0 + a),
            dims.scattering_mu_s_size as f32,
        );

        let u_nu = (c.nu + 1.0) / 2.0;
        Vec4::new(u_nu, u_mu_s, u_mu, u_r)
    }

    pub fn scattering_coord_from_uvwz(&self, uvwz: Vec4) -> ScatteringCoord {
        let p = self.params;
        let dims = self.dims;
        let h = self.horizon_distance();
        let rho = h * unit_range_from_texture_coord(uvwz.w, dims.scattering_r_size as f32);
        let r = (rho * rho + p.rg * p.rg).sqrt();
        let half_mu = dims.scattering_mu_size as f32 / 2.0;

        let (mu, ray_r_mu_intersects_ground) = if uvwz.z < 0.5 {
            let d_min = r - p.rg;
            let d_max = rho;
            let d = d_min
                + (d_max - d_min) * unit_range_from_texture_coord(1.0 - 2.0 * uvwz.z, half_mu);
            let mu = if d == 0.0 {
                -1.0
            } else {
                clamp_cosine(-(rho * rho + d * d) / (2.0 * r * d))
            };
            (mu, true)
        } else {
            let d_min = p.rt - r;
            let d_max = rho + h;
            let d = d_min
                + (d_max - d_min) * unit_range_from_texture_coord(2.0 * uvwz.z - 1.0, half_mu);
            let mu = if d == 0.0 {
                1.0
            } else {
                clamp_cosine((h * h - rho * rho - d * d) / (2.0 * r * d))
            };
            (mu, false)
        };

        let x_mu_s = unit_range_from_texture_coord(uvwz.y, dims.scattering_mu_s_size as f32);
        let d_min = p.rt - p.rg;
        let d_max = h;
        let big_d = self.distance_to_top_atmosphere_boundary(p.rg, p.mu_s_min);
        let big_a = (big_d - d_min) / (d_max - d_min);
        let a = (big_a - x_mu_s * big_a) / (1.0 + x_mu_s * big_a);
        let d = d_min + a.min(big_a) * (d_max - d_min);
        let mu_s = if d == 0.0 {
            1.0
        } else {
            clamp_cosine((h * h - d * d) / (2.0 * p.rg * d))
        };
        let nu = clamp_cosine(uvwz.x * 2.0 - 1.0);

        ScatteringCoord {
            r,
            mu,
            mu_s,
            nu,
            ray_r_mu_intersects_ground,
        }
    }

    /// Unfold a 3D fragment coordinate (texel center, slice center in `z`)
    /// into physical coordinates, clamping `nu` to the range reachable from
    /// `mu` and `mu_s`.
    pub fn scattering_coord_from_frag_coord(&self, frag: glam::Vec3) -> ScatteringCoord {
        let dims = self.dims;
        let mu_s_size = dims.scattering_mu_s_size as f32;
        let frag_nu = (frag.x / mu_s_size).floor();
        let frag_mu_s = frag.x % mu_s_size;
        let uvwz = Vec4::new(frag_nu, frag_mu_s, frag.y, frag.z)
            / Vec4::new(
                (dims.scattering_nu_size as f32 - 1.0).max(1.0),
                mu_s_size,
                dims.scattering_mu_size as f32,
                dims.scattering_r_size as f32,
            );
        let mut c = self.scattering_coord_from_uvwz(uvwz);
        let spread = ((1.0 - c.mu * c.mu) * (1.0 - c.mu_s * c.mu_s)).sqrt();
        c.nu = c.nu.clamp(c.mu * c.mu_s - spread, c.mu * c.mu_s + spread);
        c
    }
}
