//! LUT file reading and writing.
//!
//! Layout, all integers little-endian:
//!
//! ```text
//! header        52 bytes  magic, version, texel size, params size, dimensions
//! params        AtmosphereParameters, padded to 16 bytes
//! transmittance width * height * texel
//! irradiance    width * height * texel
//! scattering    width * height * depth * texel
//! ```
//!
//! Every block is tightly packed. Decoding walks the data with a bounds
//! checked cursor and fails unless it lands exactly on the end.

use std::path::Path;

use crate::error::LutFileError;
use crate::lut::{BYTES_PER_TEXEL, LutDimensions, LutExtent, LutImage, LutImages, LutKind};
use crate::params::AtmosphereParameters;

pub const LUT_FILE_MAGIC: [u8; 8] = *b"ATMOLUT\0";
pub const LUT_FILE_VERSION: u32 = 2;
pub const HEADER_SIZE: usize = 52;

/// Sequential reader over a byte slice.
pub struct ByteReader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.offset
    }

    pub fn position(&self) -> usize {
        self.offset
    }

    /// Advance by `n` bytes, returning them.
    pub fn take(&mut self, n: usize) -> Result<&'a [u8], LutFileError> {
        let remaining = self.remaining();
        if n > remaining {
            return Err(LutFileError::Truncated {
                needed: n,
                remaining,
            });
        }
        let bytes = &self.data[self.offset..self.offset + n];
        self.offset += n;
        Ok(bytes)
    }

    pub fn read_u32(&mut self) -> Result<u32, LutFileError> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Succeeds only when every byte was consumed.
    pub fn finish(self) -> Result<(), LutFileError> {
        match self.remaining() {
            0 => Ok(()),
            n => Err(LutFileError::TrailingBytes(n)),
        }
    }
}

/// Exact size of a LUT file for `dims`.
pub fn expected_file_size(dims: &LutDimensions) -> usize {
    HEADER_SIZE
        + AtmosphereParameters::padded_size()
        + LutKind::ALL
            .iter()
            .map(|&k| dims.extent(k).byte_size())
            .sum::<usize>()
}

fn extent_array(e: LutExtent) -> [u32; 3] {
    [e.width, e.height, e.depth]
}

/// Serialize parameters and tables. Images must match `dims` exactly.
pub fn encode(
    params: &AtmosphereParameters,
    dims: &LutDimensions,
    images: &LutImages,
) -> Result<Vec<u8>, LutFileError> {
    for kind in LutKind::ALL {
        let image = images.get(kind);
        let expected = dims.extent(kind);
        if image.extent != expected {
            return Err(LutFileError::DimensionMismatch {
                kind: kind.name(),
                expected: extent_array(expected),
                found: extent_array(image.extent),
            });
        }
        if !image.is_well_sized() {
            return Err(LutFileError::ImageSizeMismatch {
                kind: kind.name(),
                expected: expected.byte_size(),
                actual: image.data.len(),
            });
        }
    }

    let mut out = Vec::with_capacity(expected_file_size(dims));
    out.extend_from_slice(&LUT_FILE_MAGIC);
    let transmittance = dims.transmittance();
    let irradiance = dims.irradiance();
    let words = [
        LUT_FILE_VERSION,
        BYTES_PER_TEXEL as u32,
        std::mem::size_of::<AtmosphereParameters>() as u32,
        transmittance.width,
        transmittance.height,
        irradiance.width,
        irradiance.height,
    ];
    for word in words.into_iter().chain(scattering_layout(dims)) {
        out.extend_from_slice(&word.to_le_bytes());
    }

    let params_start = out.len();
    out.extend_from_slice(params.as_bytes());
    out.resize(params_start + AtmosphereParameters::padded_size(), 0);

    for kind in LutKind::ALL {
        out.extend_from_slice(&images.get(kind).data);
    }
    Ok(out)
}

/// The four scattering sizes in header order: r, mu, mu_s, nu. The texture
/// extent folds nu and mu_s together, so it alone cannot tell two splits
/// with the same product apart.
fn scattering_layout(dims: &LutDimensions) -> [u32; 4] {
    [
        dims.scattering_r_size,
        dims.scattering_mu_size,
        dims.scattering_mu_s_size,
        dims.scattering_nu_size,
    ]
}

fn check_extent(
    reader: &mut ByteReader<'_>,
    kind: LutKind,
    expected: LutExtent,
) -> Result<(), LutFileError> {
    let found = [reader.read_u32()?, reader.read_u32()?, 1];
    if found != extent_array(expected) {
        return Err(LutFileError::DimensionMismatch {
            kind: kind.name(),
            expected: extent_array(expected),
            found,
        });
    }
    Ok(())
}

/// Parse a LUT file produced for `dims`.
pub fn decode(
    bytes: &[u8],
    dims: &LutDimensions,
) -> Result<(AtmosphereParameters, LutImages), LutFileError> {
    let mut reader = ByteReader::new(bytes);

    if reader.take(LUT_FILE_MAGIC.len())? != LUT_FILE_MAGIC {
        return Err(LutFileError::BadMagic);
    }
    let version = reader.read_u32()?;
    if version != LUT_FILE_VERSION {
        return Err(LutFileError::UnsupportedVersion(version));
    }
    let texel = reader.read_u32()?;
    if texel != BYTES_PER_TEXEL as u32 {
        return Err(LutFileError::TexelSizeMismatch {
            expected: BYTES_PER_TEXEL as u32,
            found: texel,
        });
    }
    let params_size = reader.read_u32()?;
    let expected_params = std::mem::size_of::<AtmosphereParameters>() as u32;
    if params_size != expected_params {
        return Err(LutFileError::ParamsSizeMismatch {
            expected: expected_params,
            found: params_size,
        });
    }
    check_extent(&mut reader, LutKind::Transmittance, dims.transmittance())?;
    check_extent(&mut reader, LutKind::Irradiance, dims.irradiance())?;
    let expected_layout = scattering_layout(dims);
    let found_layout = [
        reader.read_u32()?,
        reader.read_u32()?,
        reader.read_u32()?,
        reader.read_u32()?,
    ];
    if found_layout != expected_layout {
        return Err(LutFileError::ScatteringLayoutMismatch {
            expected: expected_layout,
            found: found_layout,
        });
    }

    let block = reader.take(AtmosphereParameters::padded_size())?;
    let params: AtmosphereParameters =
        bytemuck::pod_read_unaligned(&block[..std::mem::size_of::<AtmosphereParameters>()]);

    let mut read_image = |kind: LutKind| -> Result<LutImage, LutFileError> {
        let extent = dims.extent(kind);
        Ok(LutImage {
            extent,
            data: reader.take(extent.byte_size())?.to_vec(),
        })
    };
    let images = LutImages {
        transmittance: read_image(LutKind::Transmittance)?,
        irradiance: read_image(LutKind::Irradiance)?,
        scattering: read_image(LutKind::Scattering)?,
    };

    reader.finish()?;
    Ok((params, images))
}

/// Encode and write a LUT file.
pub fn write_lut_file(
    path: &Path,
    params: &AtmosphereParameters,
    dims: &LutDimensions,
    images: &LutImages,
) -> Result<(), LutFileError> {
    let bytes = encode(params, dims, images)?;
    std::fs::write(path, &bytes).map_err(|source| LutFileError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Read and decode a LUT file.
pub fn read_lut_file(
    path: &Path,
    dims: &LutDimensions,
) -> Result<(AtmosphereParameters, LutImages), LutFileError> {
    let bytes = std::fs::read(path).map_err(|source| LutFileError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    decode(&bytes, dims)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_dims() -> LutDimensions {
        LutDimensions {
            transmittance_width: 8,
            transmittance_height: 4,
            irradiance_width: 4,
            irradiance_height: 2,
            scattering_r_size: 2,
            scattering_mu_size: 4,
            scattering_mu_s_size: 2,
            scattering_nu_size: 2,
        }
    }

    fn synthetic_images(dims: &LutDimensions) -> LutImages {
        let fill = |kind: LutKind, seed: f32| {
            let extent = dims.extent(kind);
            let texels: Vec<[f32; 4]> = (0..extent.texel_count())
                .map(|i| {
                    let v = seed + i as f32 * 0.25;
                    [v, v + 1.0, v + 2.0, v + 3.0]
                })
                .collect();
            LutImage::from_texels(extent, &texels)
        };
        LutImages {
            transmittance: fill(LutKind::Transmittance, 0.5),
            irradiance: fill(LutKind::Irradiance, 100.0),
            scattering: fill(LutKind::Scattering, -7.0),
        }
    }

    fn sample_file() -> (AtmosphereParameters, LutDimensions, LutImages, Vec<u8>) {
        let params = AtmosphereParameters::earth().with_ground_albedo(0.3);
        let dims = small_dims();
        let images = synthetic_images(&dims);
        let bytes = encode(&params, &dims, &images).unwrap();
        (params, dims, images, bytes)
    }

    #[test]
    fn test_roundtrip_is_lossless() {
        let (params, dims, images, bytes) = sample_file();
        let (decoded_params, decoded_images) = decode(&bytes, &dims).unwrap();
        assert_eq!(decoded_params.as_bytes(), params.as_bytes());
        assert_eq!(decoded_images, images);
    }

    #[test]
    fn test_file_size_matches_layout() {
        let (_, dims, _, bytes) = sample_file();
        let texel = BYTES_PER_TEXEL;
        let expected = HEADER_SIZE
            + 192
            + 8 * 4 * texel
            + 4 * 2 * texel
            + (2 * 2) * 4 * 2 * texel;
        assert_eq!(bytes.len(), expected);
        assert_eq!(expected_file_size(&dims), expected);
    }

    #[test]
    fn test_standard_file_size() {
        let dims = LutDimensions::STANDARD;
        let expected = 52 + 192 + 256 * 64 * 16 + 64 * 16 * 16 + 256 * 128 * 32 * 16;
        assert_eq!(expected_file_size(&dims), expected);
    }

    #[test]
    fn test_truncation_detected_at_every_length() {
        let (_, dims, _, bytes) = sample_file();
        for cut in 1..=bytes.len() {
            let truncated = &bytes[..bytes.len() - cut];
            assert!(
                decode(truncated, &dims).is_err(),
                "truncating {cut} bytes went unnoticed"
            );
        }
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let (_, dims, _, mut bytes) = sample_file();
        bytes.extend_from_slice(&[0; 3]);
        assert!(matches!(
            decode(&bytes, &dims),
            Err(LutFileError::TrailingBytes(3))
        ));
    }

    #[test]
    fn test_bad_magic_rejected() {
        let (_, dims, _, mut bytes) = sample_file();
        bytes[0] = b'X';
        assert!(matches!(decode(&bytes, &dims), Err(LutFileError::BadMagic)));
    }

    #[test]
    fn test_other_version_rejected() {
        let (_, dims, _, mut bytes) = sample_file();
        bytes[8..12].copy_from_slice(&1u32.to_le_bytes());
        assert!(matches!(
            decode(&bytes, &dims),
            Err(LutFileError::UnsupportedVersion(1))
        ));
    }

    #[test]
    fn test_texel_size_drift_rejected() {
        let (_, dims, _, mut bytes) = sample_file();
        bytes[12..16].copy_from_slice(&8u32.to_le_bytes());
        assert!(matches!(
            decode(&bytes, &dims),
            Err(LutFileError::TexelSizeMismatch {
                expected: 16,
                found: 8
            })
        ));
    }

    #[test]
    fn test_dimension_drift_rejected() {
        let (_, _, _, bytes) = sample_file();
        let mut other = small_dims();
        other.scattering_mu_size = 8;
        match decode(&bytes, &other) {
            Err(LutFileError::ScatteringLayoutMismatch { expected, found }) => {
                assert_eq!(expected, [2, 8, 2, 2]);
                assert_eq!(found, [2, 4, 2, 2]);
            }
            other => panic!("unexpected result: {other:?}"),
        }

        let mut other = small_dims();
        other.transmittance_height = 8;
        match decode(&bytes, &other) {
            Err(LutFileError::DimensionMismatch { kind, found, .. }) => {
                assert_eq!(kind, "transmittance");
                assert_eq!(found, [8, 4, 1]);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_nu_mu_s_split_drift_rejected() {
        let (_, dims, _, bytes) = sample_file();
        let mut other = dims;
        other.scattering_nu_size = 4;
        other.scattering_mu_s_size = 1;
        // Same folded texture width, different parameterization.
        assert_eq!(other.scattering(), dims.scattering());
        assert!(matches!(
            decode(&bytes, &other),
            Err(LutFileError::ScatteringLayoutMismatch {
                expected: [2, 4, 1, 4],
                found: [2, 4, 2, 2],
            })
        ));
    }

    #[test]
    fn test_encode_rejects_wrong_image() {
        let params = AtmosphereParameters::earth();
        let dims = small_dims();
        let mut images = synthetic_images(&dims);
        images.irradiance.data.pop();
        assert!(matches!(
            encode(&params, &dims, &images),
            Err(LutFileError::ImageSizeMismatch { .. })
        ));
    }

    #[test]
    fn test_reader_cursor() {
        let data = [1, 0, 0, 0, 2, 0];
        let mut reader = ByteReader::new(&data);
        assert_eq!(reader.read_u32().unwrap(), 1);
        assert_eq!(reader.position(), 4);
        assert!(matches!(
            reader.read_u32(),
            Err(LutFileError::Truncated {
                needed: 4,
                remaining: 2
            })
        ));
        assert_eq!(reader.take(2).unwrap(), &[2, 0]);
        assert!(reader.finish().is_ok());
    }

    #[test]
    fn test_file_roundtrip_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("atmosphere.lut");
        let (params, dims, images, _) = sample_file();
        write_lut_file(&path, &params, &dims, &images).unwrap();
        assert_eq!(
            std::fs::metadata(&path).unwrap().len() as usize,
            expected_file_size(&dims)
        );
        let (p, i) = read_lut_file(&path, &dims).unwrap();
        assert_eq!(p, params);
        assert_eq!(i, images);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = read_lut_file(&dir.path().join("missing.lut"), &small_dims());
        assert!(matches!(result, Err(LutFileError::Io { .. })));
    }
}
