//! The six precomputation kernels on the CPU.
//!
//! Transmittance, direct irradiance, single scattering, scattering density,
//! indirect irradiance and multiple scattering, each evaluated for one
//! texel from the tables produced by earlier passes. Integrals use fixed
//! sample counts with trapezoid weights.

use std::f32::consts::PI;

use glam::{Vec2, Vec3, Vec4};

use super::coords::ScatteringCoord;
use super::texels::Texels;
use super::{
    AtmosphereModel, INDIRECT_IRRADIANCE_SAMPLE_COUNT, MULTIPLE_SCATTERING_SAMPLE_COUNT,
    SCATTERING_DENSITY_SAMPLE_COUNT, SINGLE_SCATTERING_SAMPLE_COUNT, TRANSMITTANCE_SAMPLE_COUNT,
    clamp_cosine, mie_phase, rayleigh_phase, trapezoid_weight,
};
use crate::params::DensityLayer;

/// Scattering tables read by the order-dependent kernels.
///
/// Order 1 reads the separate Rayleigh and Mie single-scattering tables and
/// applies the phase functions; later orders read `multiple`, which already
/// has the phase folded in.
#[derive(Debug, Clone, Copy)]
pub struct ScatteringSources<'a> {
    pub single_rayleigh: &'a Texels,
    pub single_mie: &'a Texels,
    pub multiple: &'a Texels,
}

enum Profile<'a> {
    Single(&'a DensityLayer),
    Ozone,
}

impl AtmosphereModel<'_> {
    fn profile_density(&self, profile: &Profile<'_>, altitude: f32) -> f32 {
        match profile {
            Profile::Single(layer) => layer.density(altitude),
            Profile::Ozone => self.params.ozone_density(altitude),
        }
    }

    fn optical_length_to_top_atmosphere_boundary(
        &self,
        profile: &Profile<'_>,
        r: f32,
        mu: f32,
    ) -> f32 {
        let n = TRANSMITTANCE_SAMPLE_COUNT;
        let dx = self.distance_to_top_atmosphere_boundary(r, mu) / n as f32;
        let mut result = 0.0;
        for i in 0..=n {
            let d_i = i as f32 * dx;
            let r_i = (d_i * d_i + 2.0 * r * mu * d_i + r * r).sqrt();
            let y_i = self.profile_density(profile, r_i - self.params.rg);
            result += y_i * trapezoid_weight(i, n) * dx;
        }
        result
    }

    /// `exp(-optical depth)` from `(r, mu)` to the top of the atmosphere.
    pub fn compute_transmittance_to_top_atmosphere_boundary(&self, r: f32, mu: f32) -> Vec3 {
        let p = self.params;
        let rayleigh = self.optical_length_to_top_atmosphere_boundary(
            &Profile::Single(&p.rayleigh_layer),
            r,
            mu,
        );
        let mie =
            self.optical_length_to_top_atmosphere_boundary(&Profile::Single(&p.mie_layer), r, mu);
        let ozone = self.optical_length_to_top_atmosphere_boundary(&Profile::Ozone, r, mu);
        let depth = p.rayleigh_extinction() * rayleigh
            + p.mie_extinction() * mie
            + p.ozone_extinction() * ozone;
        exp3(-depth)
    }

    /// Transmittance kernel at a 2D fragment coordinate.
    pub fn transmittance_texel(&self, frag: Vec2) -> Vec3 {
        let size = Vec2::new(
            self.dims.transmittance_width as f32,
            self.dims.transmittance_height as f32,
        );
        let (r, mu) = self.r_mu_from_transmittance_uv(frag / size);
        self.compute_transmittance_to_top_atmosphere_boundary(r, mu)
    }

    pub fn transmittance_to_top_atmosphere_boundary(
        &self,
        transmittance: &Texels,
        r: f32,
        mu: f32,
    ) -> Vec3 {
        transmittance
            .sample_2d(self.transmittance_uv_from_r_mu(r, mu))
            .truncate()
    }

    /// Transmittance between `(r, mu)` and the point at distance `d` along the ray.
    pub fn transmittance(
        &self,
        transmittance: &Texels,
        r: f32,
        mu: f32,
        d: f32,
        ray_r_mu_intersects_ground: bool,
    ) -> Vec3 {
        let r_d = self.radius_at(r, mu, d);
        let mu_d = clamp_cosine((r * mu + d) / r_d);
        let t = if ray_r_mu_intersects_ground {
            self.transmittance_to_top_atmosphere_boundary(transmittance, r_d, -mu_d)
                / self.transmittance_to_top_atmosphere_boundary(transmittance, r, -mu)
        } else {
            self.transmittance_to_top_atmosphere_boundary(transmittance, r, mu)
                / self.transmittance_to_top_atmosphere_boundary(transmittance, r_d, mu_d)
        };
        t.min(Vec3::ONE)
    }

    /// Transmittance towards the sun, faded by the visible fraction of the
    /// sun disc above the horizon.
    pub fn transmittance_to_sun(&self, transmittance: &Texels, r: f32, mu_s: f32) -> Vec3 {
        let sin_theta_h = self.params.rg / r;
        let cos_theta_h = -(1.0 - sin_theta_h * sin_theta_h).max(0.0).sqrt();
        let alpha = sin_theta_h * self.params.sun_angular_radius;
        self.transmittance_to_top_atmosphere_boundary(transmittance, r, mu_s)
            * smoothstep(-alpha, alpha, mu_s - cos_theta_h)
    }

    fn single_scattering_integrand(
        &self,
        transmittance: &Texels,
        c: &ScatteringCoord,
        d: f32,
    ) -> (Vec3, Vec3) {
        let r_d = self.radius_at(c.r, c.mu, d);
        let mu_s_d = clamp_cosine((c.r * c.mu_s + d * c.nu) / r_d);
        let t = self.transmittance(transmittance, c.r, c.mu, d, c.ray_r_mu_intersects_ground)
            * self.transmittance_to_sun(transmittance, r_d, mu_s_d);
        let altitude = r_d - self.params.rg;
        (
            t * self.params.rayleigh_density(altitude),
            t * self.params.mie_density(altitude),
        )
    }

    /// Single-scattered Rayleigh and Mie radiance, without phase functions.
    pub fn compute_single_scattering(
        &self,
        transmittance: &Texels,
        c: &ScatteringCoord,
    ) -> (Vec3, Vec3) {
        let n = SINGLE_SCATTERING_SAMPLE_COUNT;
        let dx = self.distance_to_nearest_atmosphere_boundary(
            c.r,
            c.mu,
            c.ray_r_mu_intersects_ground,
        ) / n as f32;
        let mut rayleigh_sum = Vec3::ZERO;
        let mut mie_sum = Vec3::ZERO;
        for i in 0..=n {
            let (rayleigh, mie) = self.single_scattering_integrand(transmittance, c, i as f32 * dx);
            let w = trapezoid_weight(i, n);
            rayleigh_sum += rayleigh * w;
            mie_sum += mie * w;
        }
        let p = self.params;
        (
            rayleigh_sum * dx * p.solar_irradiance() * p.rayleigh_scattering(),
            mie_sum * dx * p.solar_irradiance() * p.mie_scattering(),
        )
    }

    pub fn single_scattering_texel(&self, transmittance: &Texels, frag: Vec3) -> (Vec3, Vec3) {
        let c = self.scattering_coord_from_frag_coord(frag);
        self.compute_single_scattering(transmittance, &c)
    }

    /// Sample a folded 4D table, interpolating manually between the two
    /// nearest `nu` blocks.
    pub fn sample_scattering(&self, table: &Texels, c: &ScatteringCoord) -> Vec4 {
        let uvwz = self.scattering_uvwz(c);
        let nu_size = self.dims.scattering_nu_size as f32;
        let tex_coord_x = uvwz.x * (nu_size - 1.0);
        let tex_x = tex_coord_x.floor();
        let lerp = tex_coord_x - tex_x;
        let uvw0 = Vec3::new((tex_x + uvwz.y) / nu_size, uvwz.z, uvwz.w);
        let uvw1 = Vec3::new((tex_x + 1.0 + uvwz.y) / nu_size, uvwz.z, uvwz.w);
        table.sample_3d(uvw0) * (1.0 - lerp) + table.sample_3d(uvw1) * lerp
    }

    /// Radiance of scattering order `order` arriving along `c`.
    pub fn scattering_for_order(
        &self,
        sources: &ScatteringSources<'_>,
        c: &ScatteringCoord,
        order: i32,
    ) -> Vec3 {
        if order == 1 {
            let rayleigh = self.sample_scattering(sources.single_rayleigh, c).truncate();
            let mie = self.sample_scattering(sources.single_mie, c).truncate();
            rayleigh * rayleigh_phase(c.nu) + mie * mie_phase(self.params.mie_g, c.nu)
        } else {
            self.sample_scattering(sources.multiple, c).truncate()
        }
    }

    pub fn irradiance(&self, irradiance: &Texels, r: f32, mu_s: f32) -> Vec3 {
        irradiance
            .sample_2d(self.irradiance_uv_from_r_mu_s(r, mu_s))
            .truncate()
    }

    /// Light of order `order - 1` scattered once more at `c`, including
    /// light reflected by the ground.
    pub fn compute_scattering_density(
        &self,
        transmittance: &Texels,
        sources: &ScatteringSources<'_>,
        irradiance: &Texels,
        c: &ScatteringCoord,
        order: i32,
    ) -> Vec3 {
        let p = self.params;
        let (r, mu, mu_s, nu) = (c.r, c.mu, c.mu_s, c.nu);
        let zenith = Vec3::Z;
        let omega = Vec3::new((1.0 - mu * mu).sqrt(), 0.0, mu);
        let sun_dir_x = if omega.x == 0.0 {
            0.0
        } else {
            (nu - mu * mu_s) / omega.x
        };
        let sun_dir_y = (1.0 - sun_dir_x * sun_dir_x - mu_s * mu_s).max(0.0).sqrt();
        let omega_s = Vec3::new(sun_dir_x, sun_dir_y, mu_s);

        let n = SCATTERING_DENSITY_SAMPLE_COUNT;
        let dphi = PI / n as f32;
        let dtheta = PI / n as f32;
        let altitude = r - p.rg;
        let rayleigh_density = p.rayleigh_density(altitude);
        let mie_density = p.mie_density(altitude);

        let mut rayleigh_mie = Vec3::ZERO;
        for l in 0..n {
            let theta = (l as f32 + 0.5) * dtheta;
            let (sin_theta, cos_theta) = theta.sin_cos();
            let ray_r_theta_intersects_ground = self.ray_intersects_ground(r, cos_theta);

            let (distance_to_ground, transmittance_to_ground, ground_albedo) =
                if ray_r_theta_intersects_ground {
                    let distance = self.distance_to_bottom_atmosphere_boundary(r, cos_theta);
                    (
                        distance,
                        self.transmittance(transmittance, r, cos_theta, distance, true),
                        p.ground_albedo(),
                    )
                } else {
                    (0.0, Vec3::ZERO, Vec3::ZERO)
                };

            for m in 0..2 * n {
                let phi = (m as f32 + 0.5) * dphi;
                let omega_i = Vec3::new(phi.cos() * sin_theta, phi.sin() * sin_theta, cos_theta);
                let domega_i = dtheta * dphi * sin_theta;

                let incident = ScatteringCoord {
                    r,
                    mu: omega_i.z,
                    mu_s,
                    nu: omega_s.dot(omega_i),
                    ray_r_mu_intersects_ground: ray_r_theta_intersects_ground,
                };
                let mut incident_radiance =
                    self.scattering_for_order(sources, &incident, order - 1);

                let ground_normal = (zenith * r + omega_i * distance_to_ground).normalize();
                let ground_irradiance =
                    self.irradiance(irradiance, p.rg, ground_normal.dot(omega_s));
                incident_radiance +=
                    transmittance_to_ground * ground_albedo * (1.0 / PI) * ground_irradiance;

                let nu2 = omega.dot(omega_i);
                rayleigh_mie += incident_radiance
                    * (p.rayleigh_scattering() * rayleigh_density * rayleigh_phase(nu2)
                        + p.mie_scattering() * mie_density * mie_phase(p.mie_g, nu2))
                    * domega_i;
            }
        }
        rayleigh_mie
    }

    pub fn scattering_density_texel(
        &self,
        transmittance: &Texels,
        sources: &ScatteringSources<'_>,
        irradiance: &Texels,
        frag: Vec3,
        order: i32,
    ) -> Vec3 {
        let c = self.scattering_coord_from_frag_coord(frag);
        self.compute_scattering_density(transmittance, sources, irradiance, &c, order)
    }

    /// Scattering of order `k` integrated along the view ray from the
    /// order-`k` density.
    pub fn compute_multiple_scattering(
        &self,
        transmittance: &Texels,
        scattering_density: &Texels,
        c: &ScatteringCoord,
    ) -> Vec3 {
        let n = MULTIPLE_SCATTERING_SAMPLE_COUNT;
        let dx = self.distance_to_nearest_atmosphere_boundary(
            c.r,
            c.mu,
            c.ray_r_mu_intersects_ground,
        ) / n as f32;
        let mut sum = Vec3::ZERO;
        for i in 0..=n {
            let d_i = i as f32 * dx;
            let r_i = self.radius_at(c.r, c.mu, d_i);
            let at = ScatteringCoord {
                r: r_i,
                mu: clamp_cosine((c.r * c.mu + d_i) / r_i),
                mu_s: clamp_cosine((c.r * c.mu_s + d_i * c.nu) / r_i),
                nu: c.nu,
                ray_r_mu_intersects_ground: c.ray_r_mu_intersects_ground,
            };
            let rayleigh_mie_i = self.sample_scattering(scattering_density, &at).truncate()
                * self.transmittance(transmittance, c.r, c.mu, d_i, c.ray_r_mu_intersects_ground)
                * dx;
            sum += rayleigh_mie_i * trapezoid_weight(i, n);
        }
        sum
    }

    /// Multiple-scattering kernel; also returns the clamped `nu` of the texel.
    pub fn multiple_scattering_texel(
        &self,
        transmittance: &Texels,
        scattering_density: &Texels,
        frag: Vec3,
    ) -> (Vec3, f32) {
        let c = self.scattering_coord_from_frag_coord(frag);
        (
            self.compute_multiple_scattering(transmittance, scattering_density, &c),
            c.nu,
        )
    }

    /// Irradiance from the sun alone, with the sun disc partially below the
    /// horizon approximated by its average cosine factor.
    pub fn compute_direct_irradiance(&self, transmittance: &Texels, r: f32, mu_s: f32) -> Vec3 {
        let alpha_s = self.params.sun_angular_radius;
        let average_cosine_factor = if mu_s < -alpha_s {
            0.0
        } else if mu_s > alpha_s {
            mu_s
        } else {
            (mu_s + alpha_s) * (mu_s + alpha_s) / (4.0 * alpha_s)
        };
        self.params.solar_irradiance()
            * self.transmittance_to_top_atmosphere_boundary(transmittance, r, mu_s)
            * average_cosine_factor
    }

    pub fn direct_irradiance_texel(&self, transmittance: &Texels, frag: Vec2) -> Vec3 {
        let size = Vec2::new(
            self.dims.irradiance_width as f32,
            self.dims.irradiance_height as f32,
        );
        let (r, mu_s) = self.r_mu_s_from_irradiance_uv(frag / size);
        self.compute_direct_irradiance(transmittance, r, mu_s)
    }

    /// Sky irradiance on a horizontal surface from scattering order `order`.
    pub fn compute_indirect_irradiance(
        &self,
        sources: &ScatteringSources<'_>,
        r: f32,
        mu_s: f32,
        order: i32,
    ) -> Vec3 {
        let n = INDIRECT_IRRADIANCE_SAMPLE_COUNT;
        let dphi = PI / n as f32;
        let dtheta = PI / n as f32;
        let omega_s = Vec3::new((1.0 - mu_s * mu_s).max(0.0).sqrt(), 0.0, mu_s);

        let mut result = Vec3::ZERO;
        for j in 0..n / 2 {
            let theta = (j as f32 + 0.5) * dtheta;
            let (sin_theta, cos_theta) = theta.sin_cos();
            for i in 0..2 * n {
                let phi = (i as f32 + 0.5) * dphi;
                let omega = Vec3::new(phi.cos() * sin_theta, phi.sin() * sin_theta, cos_theta);
                let domega = dtheta * dphi * sin_theta;
                let c = ScatteringCoord {
                    r,
                    mu: omega.z,
                    mu_s,
                    nu: omega.dot(omega_s),
                    ray_r_mu_intersects_ground: false,
                };
                result += self.scattering_for_order(sources, &c, order) * omega.z * domega;
            }
        }
        result
    }

    pub fn indirect_irradiance_texel(
        &self,
        sources: &ScatteringSources<'_>,
        frag: Vec2,
        order: i32,
    ) -> Vec3 {
        let size = Vec2::new(
            self.dims.irradiance_width as f32,
            self.dims.irradiance_height as f32,
        );
        let (r, mu_s) = self.r_mu_s_from_irradiance_uv(frag / size);
        self.compute_indirect_irradiance(sources, r, mu_s, order)
    }
}

fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

fn exp3(v: Vec3) -> Vec3 {
    Vec3::new(v.x.exp(), v.y.exp(), v.z.exp())
}
