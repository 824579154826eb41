//! LUT precomputation.
//!
//! [`build_schedule`] produces the ordered pass list; a [`PassExecutor`]
//! runs it, either on the GPU ([`GpuPrecompute`]) or on the CPU reference
//! model ([`CpuPrecompute`]).

mod cpu;
mod gpu;
mod schedule;

pub use cpu::CpuPrecompute;
pub use gpu::{GpuPrecompute, PRECOMPUTE_SHADER_NAME, precompute_shader_source};
pub use schedule::{
    BlendMode, InputSlot, Kernel, LutTarget, PassDescriptor, PassInput, PassOutput,
    build_schedule, validate_schedule,
};

pub use crate::error::PrecomputeError;

use std::time::Instant;

use aether_gpu::GpuContext;
use tracing::{debug, info, info_span, instrument};

use crate::lut::{LutDimensions, LutImage, LutImages, LutTextures};
use crate::params::AtmosphereParameters;

/// Something that can run precomputation passes in order.
pub trait PassExecutor {
    /// Run one pass. Passes arrive in schedule order.
    fn execute(&mut self, pass: &PassDescriptor) -> Result<(), PrecomputeError>;

    /// Current contents of a target, tightly packed.
    fn snapshot(&self, target: LutTarget) -> Result<LutImage, PrecomputeError>;
}

/// Callback invoked after every pass with the pass index and the executor,
/// so intermediate buffers can be inspected.
pub type PassObserver<'a, E> =
    &'a mut dyn FnMut(usize, &PassDescriptor, &E) -> Result<(), PrecomputeError>;

/// Run `schedule` on `executor`, one tracing span per pass.
pub fn run_schedule<E: PassExecutor>(
    executor: &mut E,
    schedule: &[PassDescriptor],
    mut observer: Option<PassObserver<'_, E>>,
) -> Result<(), PrecomputeError> {
    validate_schedule(schedule)?;
    for (index, pass) in schedule.iter().enumerate() {
        let span = info_span!("precompute_pass", pass = %pass.label, index);
        let _enter = span.enter();
        let start = Instant::now();
        executor.execute(pass)?;
        debug!(elapsed_ms = start.elapsed().as_secs_f64() * 1000.0, "pass recorded");
        if let Some(observer) = observer.as_mut() {
            observer(index, pass, &*executor)?;
        }
    }
    Ok(())
}

/// Fill the three persistent LUTs on the GPU, accumulating scattering
/// orders `1..=max_order`.
///
/// Returns once every pass is submitted; the first readback of the
/// returned textures waits for completion.
#[instrument(skip(ctx, params, dims))]
pub fn precompute_gpu(
    ctx: &GpuContext,
    params: &AtmosphereParameters,
    dims: LutDimensions,
    max_order: u32,
) -> Result<LutTextures, PrecomputeError> {
    dims.validate()?;
    let schedule = build_schedule(max_order)?;
    let start = Instant::now();
    let mut executor = GpuPrecompute::new(ctx, params, dims)?;
    run_schedule(&mut executor, &schedule, None)?;
    let luts = executor.finish();
    info!(
        passes = schedule.len(),
        elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
        "atmosphere LUT precompute submitted"
    );
    Ok(luts)
}

/// Reference precompute on the CPU. Practical only for reduced dimensions.
#[instrument(skip(params, dims))]
pub fn precompute_cpu(
    params: &AtmosphereParameters,
    dims: LutDimensions,
    max_order: u32,
) -> Result<LutImages, PrecomputeError> {
    dims.validate()?;
    let schedule = build_schedule(max_order)?;
    let mut executor = CpuPrecompute::new(*params, dims);
    run_schedule(&mut executor, &schedule, None)?;
    Ok(executor.into_images())
}
