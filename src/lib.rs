//! Intensity similarity statistics and spline resampling for 3D affine registration
//!
//! This crate provides the numerical primitives an intensity-based affine
//! registration loop consumes: a joint histogram builder that maps a source
//! volume through an affine transform into a target volume, the similarity
//! measures derived from that histogram, and a cubic spline resampler.
//!
//! # Features
//!
//! - **Three histogram interpolation policies**: partial volume, trilinear
//!   and random (seeded, reproducible)
//! - **Similarity measures**: correlation coefficient, correlation ratio
//!   (L2 and L1), joint/conditional entropy, mutual information, normalized
//!   and supervised mutual information
//! - **Parallel execution**: Uses rayon for multi-threaded histogram builds
//!   and resampling (`parallel` feature, enabled by default)
//! - **ndarray integration**: Works directly with ndarray arrays
//!
//! Array axes 0, 1 and 2 are called x, y and z; the last axis varies fastest.
//!
//! # Example
//!
//! ```rust
//! use ndarray::Array3;
//! use iconic3d::{AffineMatrix, Interpolation, JointHistogram, PaddedVolume};
//!
//! // Two small volumes already binned into 0..16
//! let source = Array3::from_shape_fn((8, 8, 8), |(x, y, z)| ((x + y + z) % 16) as i16);
//! let target = PaddedVolume::from_volume(&source.view());
//!
//! let mut hist = JointHistogram::new(16, 16);
//! hist.build(&source.view(), &target, &AffineMatrix::identity(), Interpolation::PartialVolume)
//!     .unwrap();
//!
//! let mi = hist.mutual_information();
//! assert!(mi > 0.0);
//! ```

pub mod error;
pub mod histogram;
pub mod kernel;
pub mod measures;
pub mod resample;
pub mod spline;
pub mod volume;

pub use error::{IconicError, Result};
pub use half::f16;
pub use histogram::{build_joint_histogram, marginalize, Interpolation, JointHistogram, Marginal};
#[cfg(feature = "parallel")]
pub use histogram::build_joint_histogram_parallel;
pub use kernel::{CornerWeightKernel, NeighborSet};
pub use measures::{
    conditional_entropy, correlation_coefficient, correlation_ratio, correlation_ratio_l1, entropy,
    joint_entropy, l1_moments, mutual_information, normalized_mutual_information,
    supervised_mutual_information, L1Moments, Similarity,
};
pub use resample::{resample_cubic_spline, resample_with_sampler};
pub use spline::{cubic_spline_basis, CubicSplineVolume, SplineSampler};
pub use volume::{quantize, PaddedVolume, MASKED};

/// 3x4 affine transformation from source voxel indices to target voxel
/// coordinates (row-major)
///
/// The matrix transforms coordinates as:
/// ```text
/// [Tx]   [m00 m01 m02 m03] [x]
/// [Ty] = [m10 m11 m12 m13] [y]
/// [Tz]   [m20 m21 m22 m23] [z]
///                          [1]
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffineMatrix {
    pub m: [[f64; 4]; 3],
}

impl AffineMatrix {
    /// Create a new affine matrix from its three rows
    #[inline]
    pub fn new(m: [[f64; 4]; 3]) -> Self {
        Self { m }
    }

    /// Create an affine matrix from a 4x4 homogeneous matrix.
    /// The last row is ignored.
    #[inline]
    pub fn from_homogeneous(h: [[f64; 4]; 4]) -> Self {
        Self { m: [h[0], h[1], h[2]] }
    }

    /// Create an affine matrix from a 3x3 linear part and a translation
    #[inline]
    pub fn from_linear(linear: [[f64; 3]; 3], shift: [f64; 3]) -> Self {
        let mut m = [[0.0; 4]; 3];
        for r in 0..3 {
            m[r][..3].copy_from_slice(&linear[r]);
            m[r][3] = shift[r];
        }
        Self { m }
    }

    /// Create an identity transform
    #[inline]
    pub fn identity() -> Self {
        Self::translation(0.0, 0.0, 0.0)
    }

    /// Create a pure translation
    #[inline]
    pub fn translation(tx: f64, ty: f64, tz: f64) -> Self {
        Self {
            m: [
                [1.0, 0.0, 0.0, tx],
                [0.0, 1.0, 0.0, ty],
                [0.0, 0.0, 1.0, tz],
            ],
        }
    }

    /// Create a scaling transform
    #[inline]
    pub fn scale(sx: f64, sy: f64, sz: f64) -> Self {
        Self {
            m: [
                [sx, 0.0, 0.0, 0.0],
                [0.0, sy, 0.0, 0.0],
                [0.0, 0.0, sz, 0.0],
            ],
        }
    }

    /// Map a voxel index to continuous target coordinates
    #[inline]
    pub fn apply(&self, x: usize, y: usize, z: usize) -> [f64; 3] {
        self.apply_point([x as f64, y as f64, z as f64])
    }

    /// Map a continuous point to continuous target coordinates
    #[inline]
    pub fn apply_point(&self, p: [f64; 3]) -> [f64; 3] {
        let m = &self.m;
        [
            m[0][0] * p[0] + m[0][1] * p[1] + m[0][2] * p[2] + m[0][3],
            m[1][0] * p[0] + m[1][1] * p[1] + m[1][2] * p[2] + m[1][3],
            m[2][0] * p[0] + m[2][1] * p[1] + m[2][2] * p[2] + m[2][3],
        ]
    }

    /// Get the flat row-major representation
    #[inline]
    pub fn as_flat(&self) -> [f64; 12] {
        let mut flat = [0.0; 12];
        for (r, row) in self.m.iter().enumerate() {
            flat[r * 4..r * 4 + 4].copy_from_slice(row);
        }
        flat
    }
}

impl Default for AffineMatrix {
    fn default() -> Self {
        Self::identity()
    }
}

/// Trait for sample types that volumes can be read from and resampled into
pub trait Interpolate: Copy + Send + Sync + Default + 'static {
    fn from_f64(v: f64) -> Self;
    fn to_f64(self) -> f64;
}

impl Interpolate for f32 {
    #[inline]
    fn from_f64(v: f64) -> Self {
        v as f32
    }
    #[inline]
    fn to_f64(self) -> f64 {
        self as f64
    }
}

impl Interpolate for f64 {
    #[inline]
    fn from_f64(v: f64) -> Self {
        v
    }
    #[inline]
    fn to_f64(self) -> f64 {
        self
    }
}

impl Interpolate for f16 {
    #[inline]
    fn from_f64(v: f64) -> Self {
        f16::from_f64(v)
    }
    #[inline]
    fn to_f64(self) -> f64 {
        f16::to_f64(self)
    }
}

impl Interpolate for i16 {
    /// Rounds to nearest and saturates at the i16 range (NaN maps to 0).
    #[inline]
    fn from_f64(v: f64) -> Self {
        v.round() as i16
    }
    #[inline]
    fn to_f64(self) -> f64 {
        self as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_identity_apply() {
        let t = AffineMatrix::identity().apply(3, 4, 5);
        assert_eq!(t, [3.0, 4.0, 5.0]);
    }

    #[test]
    fn test_general_apply() {
        let a = AffineMatrix::new([
            [1.0, 2.0, 3.0, 4.0],
            [0.5, 0.0, -1.0, 2.0],
            [0.0, 0.25, 0.0, -1.5],
        ]);
        let t = a.apply(1, 2, 3);
        assert_relative_eq!(t[0], 1.0 + 4.0 + 9.0 + 4.0);
        assert_relative_eq!(t[1], 0.5 - 3.0 + 2.0);
        assert_relative_eq!(t[2], 0.5 - 1.5);
    }

    #[test]
    fn test_affine_constructors() {
        let scale = AffineMatrix::scale(2.0, 3.0, 4.0);
        assert_eq!(scale.apply(1, 1, 1), [2.0, 3.0, 4.0]);

        let shift = AffineMatrix::translation(0.5, -1.0, 2.0);
        assert_eq!(shift.apply(0, 0, 0), [0.5, -1.0, 2.0]);

        let linear = AffineMatrix::from_linear([[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]], [1.0, 2.0, 3.0]);
        assert_eq!(linear, AffineMatrix::translation(1.0, 2.0, 3.0));

        let homogeneous = AffineMatrix::from_homogeneous([
            [1.0, 0.0, 0.0, 1.0],
            [0.0, 1.0, 0.0, 2.0],
            [0.0, 0.0, 1.0, 3.0],
            [0.0, 0.0, 0.0, 1.0],
        ]);
        assert_eq!(homogeneous, linear);
        assert_eq!(homogeneous.as_flat()[3], 1.0);
        assert_eq!(homogeneous.as_flat()[11], 3.0);
    }

    #[test]
    fn test_i16_saturates() {
        assert_eq!(<i16 as Interpolate>::from_f64(1e9), i16::MAX);
        assert_eq!(<i16 as Interpolate>::from_f64(-1e9), i16::MIN);
        assert_eq!(<i16 as Interpolate>::from_f64(2.5), 3);
        assert_eq!(<i16 as Interpolate>::from_f64(f64::NAN), 0);
    }
}
