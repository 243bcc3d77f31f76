//! Cubic B-spline coefficients and continuous sampling of 3D volumes
//!
//! Coefficients are computed with the recursive causal/anti-causal filter
//! of M. Unser, "Splines: a perfect fit for signal and image processing",
//! IEEE Signal Processing Magazine, 1999, applied separably along each axis
//! with mirror-symmetric boundaries. Sampling the coefficients at integer
//! coordinates reproduces the input samples.

use crate::Interpolate;
use ndarray::{Array3, ArrayView3, Axis};

/// Pole of the cubic B-spline prefilter, `sqrt(3) - 2`.
const POLE: f64 = -0.267_949_192_431_122_8;

/// Overall prefilter gain `(1 - z)(1 - 1/z)`.
const GAIN: f64 = 6.0;

/// Relative precision at which the causal initialization is truncated.
const TOLERANCE: f64 = f64::EPSILON;

/// Cubic B-spline basis function
///
/// - `2/3 - |x|^2 + |x|^3 / 2`  for `|x| < 1`
/// - `(2 - |x|)^3 / 6`          for `1 <= |x| < 2`
/// - `0`                        otherwise
#[inline]
pub fn cubic_spline_basis(x: f64) -> f64 {
    let a = x.abs();
    if a < 1.0 {
        2.0 / 3.0 - a * a + 0.5 * a * a * a
    } else if a < 2.0 {
        let b = 2.0 - a;
        b * b * b / 6.0
    } else {
        0.0
    }
}

/// Causal initialization with mirror boundaries.
fn initial_causal(c: &[f64]) -> f64 {
    let n = c.len();
    let horizon = (TOLERANCE.ln() / POLE.abs().ln()).ceil() as usize;

    if horizon < n {
        // the pole's powers vanish before the mirrored tail matters
        let mut zn = POLE;
        let mut sum = c[0];
        for &v in &c[1..horizon] {
            sum += zn * v;
            zn *= POLE;
        }
        sum
    } else {
        let iz = 1.0 / POLE;
        let mut zn = POLE;
        let mut z2n = POLE.powi(n as i32 - 1);
        let mut sum = c[0] + z2n * c[n - 1];
        z2n *= z2n * iz;
        for &v in &c[1..n - 1] {
            sum += (zn + z2n) * v;
            zn *= POLE;
            z2n *= iz;
        }
        sum / (1.0 - zn * zn)
    }
}

/// Anti-causal initialization with mirror boundaries.
#[inline]
fn initial_anti_causal(c: &[f64]) -> f64 {
    let n = c.len();
    (POLE / (POLE * POLE - 1.0)) * (POLE * c[n - 2] + c[n - 1])
}

/// In-place cubic spline transform of one 1D signal.
pub fn cubic_spline_transform_1d(c: &mut [f64]) {
    let n = c.len();
    if n < 2 {
        return;
    }

    c.iter_mut().for_each(|v| *v *= GAIN);

    c[0] = initial_causal(c);
    for k in 1..n {
        c[k] += POLE * c[k - 1];
    }

    c[n - 1] = initial_anti_causal(c);
    for k in (0..n - 1).rev() {
        c[k] = POLE * (c[k + 1] - c[k]);
    }
}

/// Fold an integer index into `0..n` by mirror symmetry about 0 and `n - 1`.
#[inline]
fn mirror(k: isize, n: usize) -> usize {
    if n == 1 {
        return 0;
    }
    let period = 2 * (n as isize - 1);
    let k = k.rem_euclid(period);
    if k >= n as isize {
        (period - k) as usize
    } else {
        k as usize
    }
}

/// Support indices and basis weights along one axis.
#[inline]
fn axis_support(t: f64, n: usize) -> ([usize; 4], [f64; 4]) {
    let base = t.floor() as isize - 1;
    let mut idx = [0usize; 4];
    let mut w = [0.0; 4];
    for k in 0..4 {
        let p = base + k as isize;
        idx[k] = mirror(p, n);
        w[k] = cubic_spline_basis(t - p as f64);
    }
    (idx, w)
}

/// Continuous evaluation of a volume at arbitrary coordinates.
///
/// Implementors are only queried at points inside `[0, dim - 1]` on every axis.
pub trait SplineSampler {
    /// Extent of the sampled volume
    fn dim(&self) -> (usize, usize, usize);

    /// Value at continuous coordinates `(x, y, z)`
    fn sample3d(&self, x: f64, y: f64, z: f64) -> f64;
}

/// Cubic B-spline coefficients of a 3D volume.
#[derive(Debug, Clone)]
pub struct CubicSplineVolume {
    coef: Array3<f64>,
}

impl CubicSplineVolume {
    /// Compute the spline coefficients of a volume
    pub fn from_volume<T: Interpolate>(volume: &ArrayView3<T>) -> Self {
        let mut coef = volume.mapv(|v| v.to_f64());
        let mut line = Vec::new();

        for axis in 0..3 {
            for mut lane in coef.lanes_mut(Axis(axis)) {
                line.clear();
                line.extend(lane.iter().copied());
                cubic_spline_transform_1d(&mut line);
                lane.iter_mut().zip(&line).for_each(|(dst, &src)| *dst = src);
            }
        }

        Self { coef }
    }

    /// Use precomputed coefficients
    pub fn from_coefficients(coef: Array3<f64>) -> Self {
        Self { coef }
    }

    pub fn coefficients(&self) -> ArrayView3<'_, f64> {
        self.coef.view()
    }
}

impl SplineSampler for CubicSplineVolume {
    #[inline]
    fn dim(&self) -> (usize, usize, usize) {
        self.coef.dim()
    }

    fn sample3d(&self, x: f64, y: f64, z: f64) -> f64 {
        let (dx, dy, dz) = self.coef.dim();
        let (ix, wx) = axis_support(x, dx);
        let (iy, wy) = axis_support(y, dy);
        let (iz, wz) = axis_support(z, dz);

        let mut value = 0.0;
        for a in 0..4 {
            if wx[a] == 0.0 {
                continue;
            }
            let mut plane = 0.0;
            for b in 0..4 {
                if wy[b] == 0.0 {
                    continue;
                }
                let mut row = 0.0;
                for c in 0..4 {
                    row += wz[c] * self.coef[[ix[a], iy[b], iz[c]]];
                }
                plane += wy[b] * row;
            }
            value += wx[a] * plane;
        }
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::Array3;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_basis_values() {
        assert_relative_eq!(cubic_spline_basis(0.0), 2.0 / 3.0);
        assert_relative_eq!(cubic_spline_basis(1.0), 1.0 / 6.0);
        assert_relative_eq!(cubic_spline_basis(-1.0), 1.0 / 6.0);
        assert_eq!(cubic_spline_basis(2.0), 0.0);
        assert_eq!(cubic_spline_basis(-3.5), 0.0);

        // partition of unity
        for t in [0.0, 0.1, 0.5, 0.77] {
            let s: f64 = (-1..=2).map(|k| cubic_spline_basis(t - k as f64)).sum();
            assert_relative_eq!(s, 1.0, epsilon = 1e-14);
        }
    }

    #[test]
    fn test_pole_value() {
        assert_relative_eq!(POLE, 3.0f64.sqrt() - 2.0, epsilon = 1e-15);
    }

    #[test]
    fn test_mirror_indices() {
        let folded: Vec<usize> = (-3..9).map(|k| mirror(k, 4)).collect();
        assert_eq!(folded, vec![3, 2, 1, 0, 1, 2, 3, 2, 1, 0, 1, 2]);
        assert_eq!(mirror(-5, 1), 0);
    }

    fn interpolates_samples_1d(n: usize) {
        let mut rng = ChaCha8Rng::seed_from_u64(n as u64);
        let signal: Vec<f64> = (0..n).map(|_| rng.gen_range(-10.0..10.0)).collect();
        let mut coef = signal.clone();
        cubic_spline_transform_1d(&mut coef);

        for (k, &s) in signal.iter().enumerate() {
            let v: f64 = (k as isize - 1..=k as isize + 1)
                .map(|p| coef[mirror(p, n)] * cubic_spline_basis(k as f64 - p as f64))
                .sum();
            assert_relative_eq!(v, s, epsilon = 1e-10, max_relative = 1e-10);
        }
    }

    #[test]
    fn test_transform_interpolates_short_signals() {
        for n in [2, 3, 5, 17] {
            interpolates_samples_1d(n);
        }
    }

    #[test]
    fn test_transform_interpolates_long_signal() {
        // longer than the truncation horizon
        interpolates_samples_1d(100);
    }

    #[test]
    fn test_constant_volume() {
        let volume = Array3::from_elem((4, 5, 6), 3.5f32);
        let spline = CubicSplineVolume::from_volume(&volume.view());
        for c in spline.coefficients().iter() {
            assert_relative_eq!(*c, 3.5, epsilon = 1e-10);
        }
        assert_relative_eq!(spline.sample3d(1.3, 2.7, 4.9), 3.5, epsilon = 1e-10);
    }

    #[test]
    fn test_volume_interpolates_grid_points() {
        let volume = Array3::from_shape_fn((5, 6, 7), |(x, y, z)| ((x * 31 + y * 17 + z * 7) % 23) as f64);
        let spline = CubicSplineVolume::from_volume(&volume.view());
        assert_eq!(spline.dim(), (5, 6, 7));
        for ((x, y, z), &v) in volume.indexed_iter() {
            assert_relative_eq!(spline.sample3d(x as f64, y as f64, z as f64), v, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_linear_ramp_is_reproduced_between_samples() {
        let volume = Array3::from_shape_fn((16, 16, 16), |(x, y, z)| (2 * x + y + 3 * z) as f64);
        let spline = CubicSplineVolume::from_volume(&volume.view());
        // far from the mirrored boundaries the spline of a ramp is the ramp
        let v = spline.sample3d(7.25, 8.5, 7.75);
        assert_relative_eq!(v, 2.0 * 7.25 + 8.5 + 3.0 * 7.75, epsilon = 1e-3);
    }
}
