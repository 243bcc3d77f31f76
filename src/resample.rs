//! Cubic spline resampling of a volume under an affine transform
//!
//! Each output voxel is mapped through the transform into the input grid.
//! Points outside `[0, dim - 1]` on any axis are written as 0; all others
//! are evaluated on the input's spline coefficients.

use crate::error::{IconicError, Result};
use crate::spline::{CubicSplineVolume, SplineSampler};
use crate::{AffineMatrix, Interpolate};
use log::debug;
use ndarray::{ArrayView3, ArrayViewMut3};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Resample one x-slice of the output. `slice` holds `oh * ow` samples.
#[inline]
fn resample_slice<T: Interpolate, S: SplineSampler>(
    slice: &mut [T],
    ox: usize,
    oh: usize,
    ow: usize,
    sampler: &S,
    affine: &AffineMatrix,
) -> usize {
    let (dx, dy, dz) = sampler.dim();
    let (max_x, max_y, max_z) = (dx as f64 - 1.0, dy as f64 - 1.0, dz as f64 - 1.0);
    let mut inside = 0;

    for oy in 0..oh {
        for oz in 0..ow {
            let t = affine.apply(ox, oy, oz);
            let value = if t[0] < 0.0
                || t[0] > max_x
                || t[1] < 0.0
                || t[1] > max_y
                || t[2] < 0.0
                || t[2] > max_z
            {
                0.0
            } else {
                inside += 1;
                sampler.sample3d(t[0], t[1], t[2])
            };
            slice[oy * ow + oz] = T::from_f64(value);
        }
    }
    inside
}

/// Resample through any continuous sampler
///
/// # Arguments
///
/// * `output` - Output volume, C-contiguous; every sample is overwritten
/// * `sampler` - Continuous evaluator of the input volume
/// * `affine` - Output voxel to input voxel transform
pub fn resample_with_sampler<T, S>(output: &mut ArrayViewMut3<T>, sampler: &S, affine: &AffineMatrix) -> Result<()>
where
    T: Interpolate,
    S: SplineSampler + Sync,
{
    let (od, oh, ow) = output.dim();
    let output_slice = output
        .as_slice_mut()
        .ok_or_else(|| IconicError::invalid_volume("output must be C-contiguous"))?;

    let chunk_size = oh * ow;
    if chunk_size == 0 {
        return Ok(());
    }

    #[cfg(feature = "parallel")]
    let inside: usize = output_slice
        .par_chunks_mut(chunk_size)
        .enumerate()
        .map(|(ox, slice_x)| resample_slice(slice_x, ox, oh, ow, sampler, affine))
        .sum();

    #[cfg(not(feature = "parallel"))]
    let inside: usize = output_slice
        .chunks_mut(chunk_size)
        .enumerate()
        .map(|(ox, slice_x)| resample_slice(slice_x, ox, oh, ow, sampler, affine))
        .sum();

    debug!(
        "cubic spline resample to {:?}: {} of {} voxels inside input {:?}",
        (od, oh, ow),
        inside,
        od * chunk_size,
        sampler.dim()
    );
    Ok(())
}

/// Resample `input` into `output` with cubic spline interpolation.
///
/// Spline coefficients of `input` are computed once per call. Callers that
/// resample the same input repeatedly should build a [`CubicSplineVolume`]
/// and use [`resample_with_sampler`].
pub fn resample_cubic_spline<T, U>(
    output: &mut ArrayViewMut3<U>,
    input: &ArrayView3<T>,
    affine: &AffineMatrix,
) -> Result<()>
where
    T: Interpolate,
    U: Interpolate,
{
    let spline = CubicSplineVolume::from_volume(input);
    resample_with_sampler(output, &spline, affine)
}
