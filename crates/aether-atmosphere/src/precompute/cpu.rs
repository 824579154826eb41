use std::collections::BTreeMap;

use glam::{Vec3, Vec4};

use super::{BlendMode, InputSlot, Kernel, LutTarget, PassDescriptor, PassExecutor, PrecomputeError};
use crate::lut::{LutDimensions, LutExtent, LutImage, LutImages};
use crate::model::{AtmosphereModel, ScatteringSources, Texels, rayleigh_phase};
use crate::params::AtmosphereParameters;

/// Up to three color outputs per texel, in attachment order.
type TexelOutputs = [Vec4; 3];

/// Executes the schedule on the CPU reference model.
///
/// Every target, scratch ones included, starts zeroed, matching the GPU
/// executor's cleared persistent tables.
pub struct CpuPrecompute {
    params: AtmosphereParameters,
    dims: LutDimensions,
    targets: BTreeMap<LutTarget, Texels>,
}

impl CpuPrecompute {
    pub fn new(params: AtmosphereParameters, dims: LutDimensions) -> Self {
        let targets = LutTarget::ALL
            .iter()
            .map(|&t| (t, Texels::zeroed(t.extent(&dims))))
            .collect();
        Self {
            params,
            dims,
            targets,
        }
    }

    pub fn dims(&self) -> &LutDimensions {
        &self.dims
    }

    pub fn texels(&self, target: LutTarget) -> Option<&Texels> {
        self.targets.get(&target)
    }

    /// The three persistent tables.
    pub fn into_images(self) -> LutImages {
        let image = |target: LutTarget| {
            self.targets
                .get(&target)
                .map(Texels::to_image)
                .unwrap_or_else(|| LutImage::zeroed(target.extent(&self.dims)))
        };
        LutImages {
            transmittance: image(LutTarget::Transmittance),
            irradiance: image(LutTarget::Irradiance),
            scattering: image(LutTarget::Scattering),
        }
    }

    fn input(&self, pass: &PassDescriptor, slot: InputSlot) -> Result<&Texels, PrecomputeError> {
        pass.source(slot)
            .and_then(|target| self.targets.get(&target))
            .ok_or_else(|| PrecomputeError::MissingInput {
                pass: pass.label.clone(),
                slot,
            })
    }

    fn sources(&self, pass: &PassDescriptor) -> Result<ScatteringSources<'_>, PrecomputeError> {
        Ok(ScatteringSources {
            single_rayleigh: self.input(pass, InputSlot::SingleRayleigh)?,
            single_mie: self.input(pass, InputSlot::SingleMie)?,
            multiple: self.input(pass, InputSlot::MultipleScattering)?,
        })
    }

    fn evaluate(
        &self,
        pass: &PassDescriptor,
        extent: LutExtent,
    ) -> Result<Vec<TexelOutputs>, PrecomputeError> {
        let model = AtmosphereModel::new(&self.params, &self.dims);
        let order = pass.scattering_order;
        let zero = Vec4::ZERO;

        let results = match pass.kernel {
            Kernel::Transmittance => for_each_texel(extent, |frag| {
                [model.transmittance_texel(frag.truncate()).extend(1.0), zero, zero]
            }),
            Kernel::DirectIrradiance => {
                let transmittance = self.input(pass, InputSlot::Transmittance)?;
                for_each_texel(extent, |frag| {
                    let e = model.direct_irradiance_texel(transmittance, frag.truncate());
                    [e.extend(0.0), zero, zero]
                })
            }
            Kernel::SingleScattering => {
                let transmittance = self.input(pass, InputSlot::Transmittance)?;
                for_each_texel(extent, |frag| {
                    let (rayleigh, mie) = model.single_scattering_texel(transmittance, frag);
                    [rayleigh.extend(0.0), mie.extend(0.0), rayleigh.extend(mie.x)]
                })
            }
            Kernel::ScatteringDensity => {
                let transmittance = self.input(pass, InputSlot::Transmittance)?;
                let irradiance = self.input(pass, InputSlot::Irradiance)?;
                let sources = self.sources(pass)?;
                for_each_texel(extent, |frag| {
                    let density = model.scattering_density_texel(
                        transmittance,
                        &sources,
                        irradiance,
                        frag,
                        order,
                    );
                    [density.extend(0.0), zero, zero]
                })
            }
            Kernel::IndirectIrradiance => {
                let sources = self.sources(pass)?;
                for_each_texel(extent, |frag| {
                    let e = model.indirect_irradiance_texel(&sources, frag.truncate(), order);
                    [e.extend(0.0), e.extend(0.0), zero]
                })
            }
            Kernel::MultipleScattering => {
                let transmittance = self.input(pass, InputSlot::Transmittance)?;
                let density = self.input(pass, InputSlot::ScatteringDensity)?;
                for_each_texel(extent, |frag| {
                    let (delta, nu) = model.multiple_scattering_texel(transmittance, density, frag);
                    [
                        delta.extend(0.0),
                        (delta / rayleigh_phase(nu)).extend(0.0),
                        zero,
                    ]
                })
            }
        };
        Ok(results)
    }
}

/// Evaluate `f` at every texel center, slice by slice. 2D extents get `z = 0.5`.
fn for_each_texel(extent: LutExtent, mut f: impl FnMut(Vec3) -> TexelOutputs) -> Vec<TexelOutputs> {
    let mut out = Vec::with_capacity(extent.texel_count());
    for z in 0..extent.depth {
        for y in 0..extent.height {
            for x in 0..extent.width {
                out.push(f(Vec3::new(
                    x as f32 + 0.5,
                    y as f32 + 0.5,
                    z as f32 + 0.5,
                )));
            }
        }
    }
    out
}

impl PassExecutor for CpuPrecompute {
    fn execute(&mut self, pass: &PassDescriptor) -> Result<(), PrecomputeError> {
        let Some(first) = pass.outputs.first() else {
            return Ok(());
        };
        let extent = first.target.extent(&self.dims);
        let results = self.evaluate(pass, extent)?;

        for (attachment, output) in pass.outputs.iter().enumerate() {
            let target = self
                .targets
                .get_mut(&output.target)
                .ok_or(PrecomputeError::NotAvailable(output.target))?;
            for (dst, texel) in target.data.iter_mut().zip(&results) {
                match output.blend {
                    BlendMode::Replace => *dst = texel[attachment],
                    BlendMode::Add => *dst += texel[attachment],
                }
            }
        }
        Ok(())
    }

    fn snapshot(&self, target: LutTarget) -> Result<LutImage, PrecomputeError> {
        self.texels(target)
            .map(Texels::to_image)
            .ok_or(PrecomputeError::NotAvailable(target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::precompute::{build_schedule, precompute_cpu, run_schedule};

    fn small_dims() -> LutDimensions {
        LutDimensions {
            transmittance_width: 32,
            transmittance_height: 8,
            irradiance_width: 8,
            irradiance_height: 4,
            scattering_r_size: 4,
            scattering_mu_size: 8,
            scattering_mu_s_size: 4,
            scattering_nu_size: 2,
        }
    }

    fn channels(image: &LutImage) -> Vec<f32> {
        image.texels().into_iter().flatten().collect()
    }

    #[test]
    fn test_degenerate_atmosphere() {
        let params = AtmosphereParameters::earth().without_scattering();
        let images = precompute_cpu(&params, small_dims(), 4).unwrap();
        for t in images.transmittance.texels() {
            assert_eq!(t, [1.0, 1.0, 1.0, 1.0]);
        }
        assert!(channels(&images.scattering).iter().all(|&v| v == 0.0));
        assert!(channels(&images.irradiance).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_transmittance_within_unit_range() {
        let images = precompute_cpu(&AtmosphereParameters::earth(), small_dims(), 1).unwrap();
        for v in channels(&images.transmittance) {
            assert!((0.0..=1.0).contains(&v), "transmittance {v}");
        }
    }

    #[test]
    fn test_ground_zenith_texel_is_nearly_clear() {
        let params = AtmosphereParameters::earth();
        let dims = small_dims();
        let images = precompute_cpu(&params, dims, 1).unwrap();

        let model = AtmosphereModel::new(&params, &dims);
        let uv = model.transmittance_uv_from_r_mu(params.rg, 1.0);
        let x = (uv.x * dims.transmittance_width as f32).floor() as u32;
        let y = (uv.y * dims.transmittance_height as f32).floor() as u32;
        assert_eq!((x, y), (0, 0));

        let t = images.transmittance.texel(x, y, 0).unwrap();
        for v in &t[..3] {
            assert!((0.0..=1.0).contains(v), "transmittance {v}");
        }
        assert!(t[0] > 0.9, "zenith transmittance {t:?}");
        // Rayleigh makes blue the most attenuated channel.
        assert!(t[0] > t[2]);
    }

    #[test]
    fn test_single_nu_block_rejected() {
        let mut dims = small_dims();
        dims.scattering_nu_size = 1;
        assert!(matches!(
            precompute_cpu(&AtmosphereParameters::earth(), dims, 1),
            Err(PrecomputeError::InvalidDimension {
                name: "scattering_nu_size",
                ..
            })
        ));
    }

    #[test]
    fn test_single_order_leaves_irradiance_empty() {
        let images = precompute_cpu(&AtmosphereParameters::earth(), small_dims(), 1).unwrap();
        assert!(channels(&images.irradiance).iter().all(|&v| v == 0.0));
        assert!(channels(&images.scattering).iter().any(|&v| v > 0.0));
    }

    #[test]
    fn test_single_scattering_packs_rayleigh_and_mie_red() {
        let params = AtmosphereParameters::earth();
        let dims = small_dims();
        let schedule = build_schedule(1).unwrap();
        let mut executor = CpuPrecompute::new(params, dims);
        run_schedule(&mut executor, &schedule, None).unwrap();

        let scattering = executor.texels(LutTarget::Scattering).unwrap();
        let rayleigh = executor.texels(LutTarget::DeltaRayleigh).unwrap();
        let mie = executor.texels(LutTarget::DeltaMie).unwrap();
        for ((s, r), m) in scattering.data.iter().zip(&rayleigh.data).zip(&mie.data) {
            assert_eq!(s.truncate(), r.truncate());
            assert_eq!(s.w, m.x);
        }
    }

    #[test]
    fn test_orders_accumulate_monotonically() {
        let params = AtmosphereParameters::earth();
        let dims = small_dims();
        let schedule = build_schedule(3).unwrap();
        let model_params = params;
        let mut executor = CpuPrecompute::new(params, dims);

        let mut previous: Option<Texels> = None;
        let mut checked = 0;
        let mut observer = |_: usize,
                            pass: &PassDescriptor,
                            executor: &CpuPrecompute|
         -> Result<(), PrecomputeError> {
            if !pass.writes(LutTarget::Scattering) {
                return Ok(());
            }
            let current = executor
                .texels(LutTarget::Scattering)
                .ok_or(PrecomputeError::NotAvailable(LutTarget::Scattering))?
                .clone();
            if let Some(before) = previous.as_ref() {
                let delta = executor
                    .texels(LutTarget::DeltaRayleigh)
                    .ok_or(PrecomputeError::NotAvailable(LutTarget::DeltaRayleigh))?;
                let model = AtmosphereModel::new(&model_params, executor.dims());
                let extent = current.extent;
                for z in 0..extent.depth {
                    for y in 0..extent.height {
                        for x in 0..extent.width {
                            let i = current.index(x, y, z);
                            let frag = Vec3::new(x as f32 + 0.5, y as f32 + 0.5, z as f32 + 0.5);
                            let nu = model.scattering_coord_from_frag_coord(frag).nu;
                            let expected = before.data[i].truncate()
                                + delta.data[i].truncate() / rayleigh_phase(nu);
                            let got = current.data[i].truncate();
                            assert!(
                                (got - expected).abs().max_element()
                                    <= 1e-5 * expected.abs().max_element().max(1e-6),
                                "texel {i}: {got} vs {expected}"
                            );
                            assert!((got - before.data[i].truncate()).min_element() >= 0.0);
                        }
                    }
                }
                checked += 1;
            }
            previous = Some(current);
            Ok(())
        };
        run_schedule(&mut executor, &schedule, Some(&mut observer)).unwrap();
        assert_eq!(checked, 2);
    }

    #[test]
    fn test_lower_order_run_is_a_prefix() {
        let params = AtmosphereParameters::earth();
        let dims = small_dims();
        let two = precompute_cpu(&params, dims, 2).unwrap();

        let schedule = build_schedule(3).unwrap();
        let mut executor = CpuPrecompute::new(params, dims);
        let mut at_order_two = None;
        let mut observer = |_: usize,
                            pass: &PassDescriptor,
                            executor: &CpuPrecompute|
         -> Result<(), PrecomputeError> {
            if pass.label == "multiple-scattering-2" {
                at_order_two = Some((
                    executor.snapshot(LutTarget::Scattering)?,
                    executor.snapshot(LutTarget::Irradiance)?,
                ));
            }
            Ok(())
        };
        run_schedule(&mut executor, &schedule, Some(&mut observer)).unwrap();
        let (scattering, irradiance) = at_order_two.unwrap();
        assert_eq!(scattering, two.scattering);
        assert_eq!(irradiance, two.irradiance);
    }

    #[test]
    fn test_missing_input_reported() {
        let mut executor = CpuPrecompute::new(AtmosphereParameters::earth(), small_dims());
        let mut pass = build_schedule(1).unwrap().remove(1);
        pass.inputs.clear();
        assert!(matches!(
            executor.execute(&pass),
            Err(PrecomputeError::MissingInput {
                slot: InputSlot::Transmittance,
                ..
            })
        ));
    }
}
