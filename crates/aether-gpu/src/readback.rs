//! Synchronous texture readback with row-pitch repacking.
//!
//! `copy_texture_to_buffer` requires rows aligned to
//! [`wgpu::COPY_BYTES_PER_ROW_ALIGNMENT`]; [`read_texture`] strips that padding
//! so callers always see tightly packed rows.

use std::sync::mpsc;

/// Errors that can occur while reading a texture back to the CPU.
#[derive(Debug, thiserror::Error)]
pub enum ReadbackError {
    /// The format has no single-plane texel size.
    #[error("cannot read back texture with format {0:?}")]
    UnsupportedFormat(wgpu::TextureFormat),

    /// Mapping the staging buffer failed.
    #[error("failed to map readback buffer: {0}")]
    Map(#[from] wgpu::BufferAsyncError),

    /// Waiting for the GPU failed.
    #[error("failed to wait for GPU: {0}")]
    Poll(#[from] wgpu::PollError),

    /// The map callback never reported back.
    #[error("readback callback dropped before completion")]
    CallbackDropped,

    /// Mapped data is shorter than the copy layout implies.
    #[error("readback buffer holds {actual} bytes, layout needs {expected}")]
    ShortBuffer { expected: usize, actual: usize },
}

/// Row pitch accepted by buffer copies for `unpadded` bytes of texel data.
pub fn padded_bytes_per_row(unpadded: u32) -> u32 {
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    unpadded.div_ceil(align) * align
}

/// Drop per-row padding: keep the first `row_bytes` of every `pitch`-sized row.
pub fn repack_rows(
    padded: &[u8],
    row_bytes: usize,
    pitch: usize,
    rows: usize,
) -> Result<Vec<u8>, ReadbackError> {
    let expected = if rows == 0 {
        0
    } else {
        pitch * (rows - 1) + row_bytes
    };
    if padded.len() < expected {
        return Err(ReadbackError::ShortBuffer {
            expected,
            actual: padded.len(),
        });
    }
    if row_bytes == pitch {
        return Ok(padded[..row_bytes * rows].to_vec());
    }

    let mut tight = Vec::with_capacity(row_bytes * rows);
    for row in 0..rows {
        let start = row * pitch;
        tight.extend_from_slice(&padded[start..start + row_bytes]);
    }
    Ok(tight)
}

/// Copy mip 0 of `texture` to the CPU, blocking until the GPU has finished
/// every prior submission that writes it.
///
/// The result is tightly packed: row-major, then slice-major for 3D textures.
pub fn read_texture(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    texture: &wgpu::Texture,
) -> Result<Vec<u8>, ReadbackError> {
    let format = texture.format();
    let texel = format
        .block_copy_size(None)
        .ok_or(ReadbackError::UnsupportedFormat(format))?;
    let extent = texture.size();
    let row_bytes = extent.width * texel;
    let pitch = padded_bytes_per_row(row_bytes);
    let rows = extent.height * extent.depth_or_array_layers;

    let buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("texture-readback"),
        size: u64::from(pitch) * u64::from(rows),
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("texture-readback-encoder"),
    });
    encoder.copy_texture_to_buffer(
        wgpu::TexelCopyTextureInfo {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::TexelCopyBufferInfo {
            buffer: &buffer,
            layout: wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(pitch),
                rows_per_image: Some(extent.height),
            },
        },
        extent,
    );
    queue.submit(std::iter::once(encoder.finish()));

    let slice = buffer.slice(..);
    let (tx, rx) = mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = tx.send(result);
    });
    device.poll(wgpu::PollType::Wait {
        submission_index: None,
        timeout: None,
    })?;
    rx.recv().map_err(|_| ReadbackError::CallbackDropped)??;

    let tight = {
        let mapped = slice.get_mapped_range();
        repack_rows(&mapped, row_bytes as usize, pitch as usize, rows as usize)?
    };
    buffer.unmap();

    if pitch != row_bytes {
        log::debug!(
            "Repacked readback of {:?}: row pitch {} -> {}",
            extent,
            pitch,
            row_bytes
        );
    }
    Ok(tight)
}
