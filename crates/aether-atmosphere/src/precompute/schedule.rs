//! The precomputation pass list.
//!
//! Every pass is data: which kernel runs, which tables it samples, which
//! tables it writes and how. Executors interpret the list; nothing else
//! encodes the ordering.

use crate::lut::{LutDimensions, LutExtent, LutKind};

use super::PrecomputeError;

/// Every texture the pipeline reads or writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LutTarget {
    Transmittance,
    Irradiance,
    Scattering,
    DeltaIrradiance,
    DeltaRayleigh,
    DeltaMie,
    DeltaScatteringDensity,
}

impl LutTarget {
    pub const ALL: [LutTarget; 7] = [
        Self::Transmittance,
        Self::Irradiance,
        Self::Scattering,
        Self::DeltaIrradiance,
        Self::DeltaRayleigh,
        Self::DeltaMie,
        Self::DeltaScatteringDensity,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::Transmittance => "lut-transmittance",
            Self::Irradiance => "lut-irradiance",
            Self::Scattering => "lut-scattering",
            Self::DeltaIrradiance => "delta-irradiance",
            Self::DeltaRayleigh => "delta-rayleigh",
            Self::DeltaMie => "delta-mie",
            Self::DeltaScatteringDensity => "delta-scattering-density",
        }
    }

    /// The persistent table this target is, if any.
    pub fn persistent(self) -> Option<LutKind> {
        match self {
            Self::Transmittance => Some(LutKind::Transmittance),
            Self::Irradiance => Some(LutKind::Irradiance),
            Self::Scattering => Some(LutKind::Scattering),
            _ => None,
        }
    }

    pub fn is_scratch(self) -> bool {
        self.persistent().is_none()
    }

    /// Scattering-shaped targets are 3D and rendered slice by slice.
    pub fn is_3d(self) -> bool {
        matches!(
            self,
            Self::Scattering | Self::DeltaRayleigh | Self::DeltaMie | Self::DeltaScatteringDensity
        )
    }

    pub fn extent(self, dims: &LutDimensions) -> LutExtent {
        match self {
            Self::Transmittance => dims.transmittance(),
            Self::Irradiance | Self::DeltaIrradiance => dims.irradiance(),
            _ => dims.scattering(),
        }
    }
}

/// Numerical kernel evaluated per texel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kernel {
    Transmittance,
    DirectIrradiance,
    SingleScattering,
    ScatteringDensity,
    IndirectIrradiance,
    MultipleScattering,
}

impl Kernel {
    /// Fragment entry point in `shaders/precompute.wgsl`.
    pub fn entry_point(self) -> &'static str {
        match self {
            Self::Transmittance => "fs_transmittance",
            Self::DirectIrradiance => "fs_direct_irradiance",
            Self::SingleScattering => "fs_single_scattering",
            Self::ScatteringDensity => "fs_scattering_density",
            Self::IndirectIrradiance => "fs_indirect_irradiance",
            Self::MultipleScattering => "fs_multiple_scattering",
        }
    }
}

/// Role of a sampled input inside a kernel, fixed to a shader binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputSlot {
    Transmittance,
    Irradiance,
    SingleRayleigh,
    SingleMie,
    MultipleScattering,
    ScatteringDensity,
}

impl InputSlot {
    /// Binding index in group 0 of the precompute shader.
    pub fn binding(self) -> u32 {
        match self {
            Self::Transmittance => 3,
            Self::Irradiance => 4,
            Self::SingleRayleigh => 5,
            Self::SingleMie => 6,
            Self::MultipleScattering => 7,
            Self::ScatteringDensity => 8,
        }
    }

    pub fn is_3d(self) -> bool {
        !matches!(self, Self::Transmittance | Self::Irradiance)
    }
}

/// How a pass output combines with the target's previous contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendMode {
    Replace,
    Add,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassInput {
    pub slot: InputSlot,
    pub source: LutTarget,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassOutput {
    pub target: LutTarget,
    pub blend: BlendMode,
}

/// One full-screen pass of the precomputation.
#[derive(Debug, Clone, PartialEq)]
pub struct PassDescriptor {
    pub label: String,
    pub kernel: Kernel,
    pub inputs: Vec<PassInput>,
    /// Color attachments in shader location order.
    pub outputs: Vec<PassOutput>,
    /// Order uniform handed to the kernel; 0 where the kernel ignores it.
    pub scattering_order: i32,
    /// Drawn once per depth slice of the 3D outputs.
    pub layered: bool,
}

impl PassDescriptor {
    fn new(label: impl Into<String>, kernel: Kernel) -> Self {
        Self {
            label: label.into(),
            kernel,
            inputs: Vec::new(),
            outputs: Vec::new(),
            scattering_order: 0,
            layered: false,
        }
    }

    fn input(mut self, slot: InputSlot, source: LutTarget) -> Self {
        self.inputs.push(PassInput { slot, source });
        self
    }

    fn output(mut self, target: LutTarget, blend: BlendMode) -> Self {
        self.outputs.push(PassOutput { target, blend });
        self
    }

    fn order(mut self, order: i32) -> Self {
        self.scattering_order = order;
        self
    }

    fn layered(mut self) -> Self {
        self.layered = true;
        self
    }

    pub fn reads(&self, target: LutTarget) -> bool {
        self.inputs.iter().any(|i| i.source == target)
    }

    pub fn writes(&self, target: LutTarget) -> bool {
        self.outputs.iter().any(|o| o.target == target)
    }

    pub fn source(&self, slot: InputSlot) -> Option<LutTarget> {
        self.inputs.iter().find(|i| i.slot == slot).map(|i| i.source)
    }
}

/// Passes for scattering orders `1..=max_order`, in the only valid order:
/// transmittance, direct irradiance, single scattering, then for each
/// order `k >= 2` scattering density, indirect irradiance (order `k - 1`)
/// and multiple scattering.
pub fn build_schedule(max_order: u32) -> Result<Vec<PassDescriptor>, PrecomputeError> {
    use BlendMode::{Add, Replace};
    use InputSlot as S;
    use LutTarget as T;

    if max_order == 0 {
        return Err(PrecomputeError::InvalidScatteringOrder(max_order));
    }

    let mut passes = vec![
        PassDescriptor::new("transmittance", Kernel::Transmittance)
            .output(T::Transmittance, Replace),
        PassDescriptor::new("direct-irradiance", Kernel::DirectIrradiance)
            .input(S::Transmittance, T::Transmittance)
            .output(T::DeltaIrradiance, Replace),
        PassDescriptor::new("single-scattering", Kernel::SingleScattering)
            .input(S::Transmittance, T::Transmittance)
            .output(T::DeltaRayleigh, Replace)
            .output(T::DeltaMie, Replace)
            .output(T::Scattering, Add)
            .layered(),
    ];

    for order in 2..=max_order as i32 {
        passes.push(
            PassDescriptor::new(format!("scattering-density-{order}"), Kernel::ScatteringDensity)
                .input(S::Transmittance, T::Transmittance)
                .input(S::Irradiance, T::DeltaIrradiance)
                .input(S::SingleRayleigh, T::DeltaRayleigh)
                .input(S::SingleMie, T::DeltaMie)
                .input(S::MultipleScattering, T::DeltaRayleigh)
                .output(T::DeltaScatteringDensity, Replace)
                .order(order)
                .layered(),
        );
        passes.push(
            PassDescriptor::new(format!("indirect-irradiance-{order}"), Kernel::IndirectIrradiance)
                .input(S::SingleRayleigh, T::DeltaRayleigh)
                .input(S::SingleMie, T::DeltaMie)
                .input(S::MultipleScattering, T::DeltaRayleigh)
                .output(T::DeltaIrradiance, Replace)
                .output(T::Irradiance, Add)
                .order(order - 1),
        );
        passes.push(
            PassDescriptor::new(format!("multiple-scattering-{order}"), Kernel::MultipleScattering)
                .input(S::Transmittance, T::Transmittance)
                .input(S::ScatteringDensity, T::DeltaScatteringDensity)
                .output(T::DeltaRayleigh, Replace)
                .output(T::Scattering, Add)
                .order(order)
                .layered(),
        );
    }

    validate_schedule(&passes)?;
    Ok(passes)
}

/// Check data dependencies: every input was written by an earlier pass (the
/// persistent tables count as written, they start cleared), no pass samples
/// a texture it renders to, and layered passes write only 3D targets.
pub fn validate_schedule(passes: &[PassDescriptor]) -> Result<(), PrecomputeError> {
    let mut written: Vec<LutTarget> = LutTarget::ALL
        .iter()
        .copied()
        .filter(|t| !t.is_scratch())
        .collect();

    for pass in passes {
        for input in &pass.inputs {
            if input.source.is_scratch() && !written.contains(&input.source) {
                return Err(PrecomputeError::UnwrittenInput {
                    pass: pass.label.clone(),
                    target: input.source,
                });
            }
            if input.slot.is_3d() != input.source.is_3d() {
                return Err(PrecomputeError::DimensionMismatch {
                    pass: pass.label.clone(),
                    target: input.source,
                });
            }
            if pass.writes(input.source) {
                return Err(PrecomputeError::ReadWriteAlias {
                    pass: pass.label.clone(),
                    target: input.source,
                });
            }
        }
        for output in &pass.outputs {
            if output.target.is_3d() != pass.layered {
                return Err(PrecomputeError::DimensionMismatch {
                    pass: pass.label.clone(),
                    target: output.target,
                });
            }
            if !written.contains(&output.target) {
                written.push(output.target);
            }
        }
    }
    Ok(())
}
