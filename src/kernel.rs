//! Trilinear corner weights and neighbor gathering in a padded target
//!
//! Corner indexing follows the padded C layout, with bit 2 selecting the
//! x neighbor, bit 1 the y neighbor and bit 0 the z neighbor:
//!
//! ```text
//!   floor z slice      ceil z slice
//!
//!     2----6             3----7              y
//!     |    |             |    |              ^
//!     |    |             |    |              |
//!     0----4             1----5              ---> x
//! ```

use crate::volume::PaddedVolume;

/// Maximum number of neighbors of a continuous point.
pub const MAX_NEIGHBORS: usize = 8;

/// Up to 8 `(bin, weight)` pairs gathered for one source voxel.
///
/// Masked neighbors are never stored. Weights of the remaining
/// neighbors are not renormalized.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeighborSet {
    bins: [i16; MAX_NEIGHBORS],
    weights: [f64; MAX_NEIGHBORS],
    len: usize,
}

impl NeighborSet {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn clear(&mut self) {
        self.len = 0;
    }

    /// Append a neighbor unless its intensity is masked (negative).
    #[inline]
    pub fn push(&mut self, bin: i16, weight: f64) {
        if bin >= 0 && self.len < MAX_NEIGHBORS {
            self.bins[self.len] = bin;
            self.weights[self.len] = weight;
            self.len += 1;
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn bins(&self) -> &[i16] {
        &self.bins[..self.len]
    }

    #[inline]
    pub fn weights(&self) -> &[f64] {
        &self.weights[..self.len]
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.bins()
            .iter()
            .zip(self.weights())
            .map(|(&b, &w)| (b as usize, w))
    }

    #[inline]
    pub fn total_weight(&self) -> f64 {
        self.weights().iter().sum()
    }
}

/// Eight trilinear weights from the lower-corner complements
/// `wx = nx - Tx`, `wy = ny - Ty`, `wz = nz - Tz`.
///
/// Only the three pairwise products and one triple product are formed;
/// every other corner follows by subtraction.
#[inline]
pub fn corner_weights(wx: f64, wy: f64, wz: f64) -> [f64; MAX_NEIGHBORS] {
    let wxwy = wx * wy;
    let wxwz = wx * wz;
    let wywz = wy * wz;

    let w0 = wxwy * wz;
    let w1 = wxwy - w0;
    let w2 = wxwz - w0;
    let w3 = wx - wxwy - w2;
    let w4 = wywz - w0;
    let w5 = wy - wxwy - w4;
    let w6 = wz - wxwz - w4;
    let w7 = 1.0 - w3 - wy - wz + wywz;

    [w0, w1, w2, w3, w4, w5, w6, w7]
}

/// Corner weight kernel bound to the strides of one padded target.
#[derive(Debug, Clone, Copy)]
pub struct CornerWeightKernel {
    stride_x: usize,
    stride_y: usize,
    offsets: [usize; MAX_NEIGHBORS],
}

impl CornerWeightKernel {
    pub fn new(target: &PaddedVolume) -> Self {
        let (_px, py, pz) = target.padded_dim();
        let u2 = pz;
        let u4 = py * pz;
        let u6 = u4 + u2;
        Self {
            stride_x: u4,
            stride_y: u2,
            offsets: [0, 1, u2, u2 + 1, u4, u4 + 1, u6, u6 + 1],
        }
    }

    /// Flat offsets of the 8 corners relative to the anchor
    #[inline]
    pub fn offsets(&self) -> &[usize; MAX_NEIGHBORS] {
        &self.offsets
    }

    /// Anchor offset and weights of a point known to satisfy
    /// `-1 < t < dim` on every axis (unpadded extents).
    #[inline]
    pub fn locate(&self, t: [f64; 3]) -> (usize, [f64; MAX_NEIGHBORS]) {
        // +1 accounts for the border
        let fx = t[0].floor() + 1.0;
        let fy = t[1].floor() + 1.0;
        let fz = t[2].floor() + 1.0;

        let off = fx as usize * self.stride_x + fy as usize * self.stride_y + fz as usize;
        (off, corner_weights(fx - t[0], fy - t[1], fz - t[2]))
    }

    /// Collect the unmasked neighbors of `t` in the padded samples.
    #[inline]
    pub fn gather(&self, target: &[i16], t: [f64; 3], out: &mut NeighborSet) {
        let (off, weights) = self.locate(t);
        out.clear();
        for (&u, &w) in self.offsets.iter().zip(weights.iter()) {
            out.push(target[off + u], w);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::Array3;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    fn brute_force(wx: f64, wy: f64, wz: f64) -> [f64; 8] {
        let mut w = [0.0; 8];
        for (k, slot) in w.iter_mut().enumerate() {
            let ax = if k & 4 == 0 { wx } else { 1.0 - wx };
            let ay = if k & 2 == 0 { wy } else { 1.0 - wy };
            let az = if k & 1 == 0 { wz } else { 1.0 - wz };
            *slot = ax * ay * az;
        }
        w
    }

    #[test]
    fn test_weights_partition_unity() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        for _ in 0..1000 {
            let (wx, wy, wz) = (rng.gen::<f64>(), rng.gen::<f64>(), rng.gen::<f64>());
            let w = corner_weights(wx, wy, wz);
            assert_relative_eq!(w.iter().sum::<f64>(), 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_weights_match_triple_products() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        for _ in 0..200 {
            let (wx, wy, wz) = (rng.gen::<f64>(), rng.gen::<f64>(), rng.gen::<f64>());
            let fast = corner_weights(wx, wy, wz);
            let slow = brute_force(wx, wy, wz);
            for k in 0..8 {
                assert_relative_eq!(fast[k], slow[k], epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_integer_point_puts_all_weight_on_anchor() {
        let w = corner_weights(1.0, 1.0, 1.0);
        assert_eq!(w[0], 1.0);
        assert!(w[1..].iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_offsets_follow_padded_strides() {
        let volume = Array3::<i16>::zeros((3, 4, 5));
        let padded = PaddedVolume::from_volume(&volume.view());
        let kernel = CornerWeightKernel::new(&padded);
        // padded shape (5, 6, 7)
        assert_eq!(kernel.offsets(), &[0, 1, 7, 8, 42, 43, 49, 50]);
    }

    #[test]
    fn test_gather_reads_corner_intensities() {
        let volume = Array3::from_shape_fn((4, 4, 4), |(x, y, z)| (x * 16 + y * 4 + z) as i16);
        let padded = PaddedVolume::from_volume(&volume.view());
        let kernel = CornerWeightKernel::new(&padded);

        let mut set = NeighborSet::new();
        kernel.gather(padded.as_slice(), [1.25, 2.5, 0.75], &mut set);

        assert_eq!(set.len(), 8);
        let expected: Vec<i16> = (0..8)
            .map(|k| {
                let x = 1 + (k >> 2 & 1);
                let y = 2 + (k >> 1 & 1);
                let z = k & 1;
                volume[[x, y, z]]
            })
            .collect();
        assert_eq!(set.bins(), expected.as_slice());
        assert_relative_eq!(set.total_weight(), 1.0, epsilon = 1e-12);
        // lower corner weight (1 - 0.25)(1 - 0.5)(1 - 0.75)
        assert_relative_eq!(set.weights()[0], 0.75 * 0.5 * 0.25, epsilon = 1e-12);
    }

    #[test]
    fn test_masked_neighbors_are_dropped_without_renormalizing() {
        let mut volume = Array3::from_elem((3, 3, 3), 2i16);
        volume[[1, 1, 1]] = -5;
        let padded = PaddedVolume::from_volume(&volume.view());
        let kernel = CornerWeightKernel::new(&padded);

        let mut set = NeighborSet::new();
        kernel.gather(padded.as_slice(), [0.5, 0.5, 0.5], &mut set);

        assert_eq!(set.len(), 7);
        assert_relative_eq!(set.total_weight(), 0.875, epsilon = 1e-12);
        assert!(set.bins().iter().all(|&b| b == 2));
    }

    #[test]
    fn test_border_neighbors_are_dropped() {
        let volume = Array3::from_elem((2, 2, 2), 1i16);
        let padded = PaddedVolume::from_volume(&volume.view());
        let kernel = CornerWeightKernel::new(&padded);

        let mut set = NeighborSet::new();
        // Between the pad (-1) and voxel 0 on x, inside elsewhere
        kernel.gather(padded.as_slice(), [-0.5, 0.0, 0.0], &mut set);
        assert_eq!(set.len(), 4);
        assert_relative_eq!(set.total_weight(), 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_neighbor_set_capacity() {
        let mut set = NeighborSet::new();
        for k in 0..10 {
            set.push(k, 0.1);
        }
        assert_eq!(set.len(), MAX_NEIGHBORS);
        set.push(-1, 1.0);
        assert_eq!(set.len(), MAX_NEIGHBORS);
        set.clear();
        assert!(set.is_empty());
    }
}
