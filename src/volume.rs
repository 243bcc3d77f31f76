//! Integer-coded volumes used as histogram inputs
//!
//! Intensities are `i16` bin indices. Negative values mark voxels outside
//! the domain (mask). A padded volume carries a one-voxel border of
//! [`MASKED`] samples so that the 8-neighborhood of any point with
//! coordinates in `(-1, dim)` can be read without bounds checks.

use crate::error::{IconicError, Result};
use crate::Interpolate;
use ndarray::{s, Array3, ArrayView3};

/// Sentinel intensity for samples outside the defined domain.
pub const MASKED: i16 = -1;

/// Target volume with a one-voxel [`MASKED`] border on every side,
/// stored C-contiguous.
#[derive(Debug, Clone)]
pub struct PaddedVolume {
    data: Array3<i16>,
    max: Option<i16>,
}

impl PaddedVolume {
    /// Pad a volume with a one-voxel masked border
    pub fn from_volume(volume: &ArrayView3<i16>) -> Self {
        let (dx, dy, dz) = volume.dim();
        let mut data = Array3::from_elem((dx + 2, dy + 2, dz + 2), MASKED);
        data.slice_mut(s![1..dx + 1, 1..dy + 1, 1..dz + 1]).assign(volume);
        let max = max_intensity(volume);
        Self { data, max }
    }

    /// Wrap an already padded array.
    ///
    /// The border is not inspected; any negative value is treated as masked.
    pub fn from_padded(data: Array3<i16>) -> Result<Self> {
        let (px, py, pz) = data.dim();
        if px < 2 || py < 2 || pz < 2 {
            return Err(IconicError::invalid_volume(format!(
                "padded volume of shape {:?} has no room for a border",
                data.dim()
            )));
        }
        let data = if data.is_standard_layout() {
            data
        } else {
            data.as_standard_layout().into_owned()
        };
        let max = max_intensity(&data.view());
        Ok(Self { data, max })
    }

    /// Extent of the unpadded volume
    #[inline]
    pub fn dim(&self) -> (usize, usize, usize) {
        let (px, py, pz) = self.data.dim();
        (px - 2, py - 2, pz - 2)
    }

    /// Extent including the border
    #[inline]
    pub fn padded_dim(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    /// Flat C-order samples including the border
    #[inline]
    pub fn as_slice(&self) -> &[i16] {
        self.data
            .as_slice()
            .expect("padded volume is kept in standard layout")
    }

    pub fn view(&self) -> ArrayView3<'_, i16> {
        self.data.view()
    }

    /// Largest unmasked intensity, if any. Computed once at construction.
    #[inline]
    pub fn max_intensity(&self) -> Option<i16> {
        self.max
    }
}

/// Largest non-negative intensity of a volume, if any
pub(crate) fn max_intensity(volume: &ArrayView3<i16>) -> Option<i16> {
    volume.iter().copied().filter(|&v| v >= 0).max()
}

/// Rescale a real-valued volume linearly onto the bins `0..bins`.
///
/// The finite minimum maps to bin 0 and the finite maximum to `bins - 1`.
/// NaN samples become [`MASKED`]. A constant volume maps entirely to bin 0.
pub fn quantize<T: Interpolate>(volume: &ArrayView3<T>, bins: usize) -> Result<Array3<i16>> {
    if bins == 0 || bins > i16::MAX as usize + 1 {
        return Err(IconicError::InvalidBins(bins));
    }

    let (lo, hi) = volume
        .iter()
        .map(|v| v.to_f64())
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));

    let top = (bins - 1) as f64;
    let scale = if hi > lo { top / (hi - lo) } else { 0.0 };

    Ok(volume.mapv(|v| {
        let v = v.to_f64();
        if v.is_nan() {
            MASKED
        } else {
            ((v - lo) * scale).round().clamp(0.0, top) as i16
        }
    }))
}
