//! Joint histogram construction
//!
//! Every unmasked source voxel is mapped through the affine transform into
//! the padded target. If the transformed point lies in `(-1, dim)` on every
//! axis, its unmasked target neighbors are passed to the interpolation
//! policy, which deposits mass in the source voxel's histogram row.

use crate::error::{IconicError, Result};
use crate::kernel::{CornerWeightKernel, NeighborSet};
use crate::measures::{self, Similarity};
use crate::volume::{max_intensity, PaddedVolume};
use crate::AffineMatrix;
use log::{debug, trace};
use ndarray::{Array2, ArrayView2, ArrayView3, ArrayViewMut1, ArrayViewMut2};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::fmt;
use std::str::FromStr;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Seed used when a random policy is parsed from a name without one.
pub const DEFAULT_SEED: u64 = 1;

/// How one source voxel's neighbor set is turned into histogram mass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interpolation {
    /// Add every neighbor weight to its own target bin (Maes et al.).
    PartialVolume,
    /// Add 1 to the bin nearest to the weighted mean neighbor intensity.
    Trilinear,
    /// Add 1 to a neighbor bin drawn with probability proportional to its weight.
    Random { seed: u64 },
}

impl Interpolation {
    /// Decode the integer convention: 0 is partial volume, positive is
    /// trilinear, negative is random seeded with `-code`.
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => Self::PartialVolume,
            c if c > 0 => Self::Trilinear,
            c => Self::Random {
                seed: c.unsigned_abs() as u64,
            },
        }
    }
}

impl Default for Interpolation {
    fn default() -> Self {
        Self::PartialVolume
    }
}

impl fmt::Display for Interpolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PartialVolume => write!(f, "pv"),
            Self::Trilinear => write!(f, "tri"),
            Self::Random { seed } => write!(f, "rand:{seed}"),
        }
    }
}

impl FromStr for Interpolation {
    type Err = IconicError;

    /// Accepts `pv`, `tri`, `rand` and `rand:<seed>` (long names too).
    fn from_str(s: &str) -> Result<Self> {
        let lower = s.trim().to_ascii_lowercase();
        let (name, seed) = match lower.split_once(':') {
            Some((name, seed)) => (name, Some(seed)),
            None => (lower.as_str(), None),
        };
        match (name, seed) {
            ("pv" | "partial_volume", None) => Ok(Self::PartialVolume),
            ("tri" | "trilinear", None) => Ok(Self::Trilinear),
            ("rand" | "random", None) => Ok(Self::Random { seed: DEFAULT_SEED }),
            ("rand" | "random", Some(seed)) => seed
                .parse()
                .map(|seed| Self::Random { seed })
                .map_err(|_| IconicError::UnknownMethod(s.to_string())),
            _ => Err(IconicError::UnknownMethod(s.to_string())),
        }
    }
}

/// Per-build state of an interpolation policy.
enum Strategy {
    PartialVolume,
    Trilinear,
    Random(ChaCha8Rng),
}

impl Strategy {
    fn new(interp: Interpolation) -> Self {
        match interp {
            Interpolation::PartialVolume => Self::PartialVolume,
            Interpolation::Trilinear => Self::Trilinear,
            Interpolation::Random { seed } => Self::Random(ChaCha8Rng::seed_from_u64(seed)),
        }
    }

    /// Independent generator for one slab of a partitioned build.
    #[cfg(feature = "parallel")]
    fn for_slab(interp: Interpolation, slab: usize) -> Self {
        match interp {
            Interpolation::Random { seed } => {
                let mut rng = ChaCha8Rng::seed_from_u64(seed);
                rng.set_stream(slab as u64);
                Self::Random(rng)
            }
            other => Self::new(other),
        }
    }

    #[inline]
    fn deposit(&mut self, row: &mut ArrayViewMut1<f64>, neighbors: &NeighborSet) {
        match self {
            Self::PartialVolume => {
                for (j, w) in neighbors.iter() {
                    row[j] += w;
                }
            }
            Self::Trilinear => {
                let (sum_w, jm) = neighbors
                    .iter()
                    .fold((0.0, 0.0), |(s, m), (j, w)| (s + w, m + w * j as f64));
                if sum_w > 0.0 {
                    row[(jm / sum_w + 0.5) as usize] += 1.0;
                }
            }
            Self::Random(rng) => {
                let sum_w = neighbors.total_weight();
                if neighbors.is_empty() || sum_w <= 0.0 {
                    return;
                }
                let draw = sum_w * rng.gen::<f64>();
                let mut cumulative = 0.0;
                let mut pick = neighbors.len() - 1;
                for (k, &w) in neighbors.weights().iter().enumerate() {
                    cumulative += w;
                    if cumulative > draw {
                        pick = k;
                        break;
                    }
                }
                row[neighbors.bins()[pick] as usize] += 1.0;
            }
        }
    }
}

/// Check histogram-compatible intensities before a build.
fn check_bins(hist: &ArrayViewMut2<f64>, source: &ArrayView3<i16>, target: &PaddedVolume) -> Result<()> {
    let (clamp_i, clamp_j) = hist.dim();
    if let Some(v) = max_intensity(source) {
        if v as usize >= clamp_i {
            return Err(IconicError::BinOutOfRange { axis: 0, value: v, clamp: clamp_i });
        }
    }
    if let Some(v) = target.max_intensity() {
        if v as usize >= clamp_j {
            return Err(IconicError::BinOutOfRange { axis: 1, value: v, clamp: clamp_j });
        }
    }
    Ok(())
}

/// Accumulate one block of source voxels whose first index starts at `x0`.
/// Returns the number of voxels that reached the interpolation policy.
fn accumulate(
    hist: &mut ArrayViewMut2<f64>,
    source: &ArrayView3<i16>,
    x0: usize,
    target: &PaddedVolume,
    affine: &AffineMatrix,
    strategy: &mut Strategy,
) -> usize {
    let (dx, dy, dz) = target.dim();
    let (dx, dy, dz) = (dx as f64, dy as f64, dz as f64);
    let kernel = CornerWeightKernel::new(target);
    let samples = target.as_slice();
    let mut neighbors = NeighborSet::new();
    let mut accepted = 0;

    for ((x, y, z), &i) in source.indexed_iter() {
        if i < 0 {
            continue;
        }
        let t = affine.apply(x0 + x, y, z);
        if t[0] > -1.0 && t[0] < dx && t[1] > -1.0 && t[1] < dy && t[2] > -1.0 && t[2] < dz {
            kernel.gather(samples, t, &mut neighbors);
            strategy.deposit(&mut hist.row_mut(i as usize), &neighbors);
            accepted += 1;
        }
    }
    accepted
}

/// Build the joint histogram of `source` against `target` under `affine`.
///
/// The histogram shape `(clamp_i, clamp_j)` fixes the number of source and
/// target bins. It is reset to zero before accumulation.
///
/// # Arguments
///
/// * `hist` - Histogram to overwrite, rows indexed by source intensity
/// * `source` - Source volume; negative intensities are skipped
/// * `target` - Padded target volume
/// * `affine` - Source voxel to target voxel transform
/// * `interp` - Interpolation policy
pub fn build_joint_histogram(
    hist: &mut ArrayViewMut2<f64>,
    source: &ArrayView3<i16>,
    target: &PaddedVolume,
    affine: &AffineMatrix,
    interp: Interpolation,
) -> Result<()> {
    check_bins(hist, source, target)?;
    trace!("joint histogram: {} interpolation", interp);

    hist.fill(0.0);
    let mut strategy = Strategy::new(interp);
    let accepted = accumulate(hist, source, 0, target, affine, &mut strategy);

    debug!(
        "joint histogram {:?}: {} of {} source voxels accumulated, mass {}",
        hist.dim(),
        accepted,
        source.len(),
        hist.sum()
    );
    Ok(())
}

/// Number of x-slices per worker-local histogram.
#[cfg(feature = "parallel")]
const SLAB_SIZE: usize = 4;

/// Parallel variant of [`build_joint_histogram`].
///
/// Source voxels are split into slabs along the first axis, each slab is
/// accumulated into its own histogram and the partial histograms are summed.
/// Random interpolation draws from a separate stream per slab, so results
/// are reproducible for a given seed but differ from the sequential build.
#[cfg(feature = "parallel")]
pub fn build_joint_histogram_parallel(
    hist: &mut ArrayViewMut2<f64>,
    source: &ArrayView3<i16>,
    target: &PaddedVolume,
    affine: &AffineMatrix,
    interp: Interpolation,
) -> Result<()> {
    check_bins(hist, source, target)?;
    trace!("parallel joint histogram: {} interpolation", interp);

    let shape = hist.dim();
    let dx = source.dim().0;
    let slabs = dx.div_ceil(SLAB_SIZE);

    let (total, accepted) = (0..slabs)
        .into_par_iter()
        .map(|slab| {
            let x0 = slab * SLAB_SIZE;
            let x1 = (x0 + SLAB_SIZE).min(dx);
            let block = source.slice(ndarray::s![x0..x1, .., ..]);
            let mut local = Array2::<f64>::zeros(shape);
            let mut strategy = Strategy::for_slab(interp, slab);
            let n = accumulate(&mut local.view_mut(), &block, x0, target, affine, &mut strategy);
            (local, n)
        })
        .reduce(
            || (Array2::<f64>::zeros(shape), 0),
            |(a, na), (b, nb)| (a + b, na + nb),
        );

    hist.assign(&total);
    debug!(
        "parallel joint histogram {:?}: {} slabs, {} of {} source voxels accumulated",
        shape,
        slabs,
        accepted,
        source.len()
    );
    Ok(())
}

/// Which marginal of a joint histogram to compute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marginal {
    /// Row sums, one entry per source bin.
    Source,
    /// Column sums, one entry per target bin.
    Target,
}

impl Marginal {
    /// Length of the marginal for a histogram of the given shape
    #[inline]
    pub fn len(self, shape: (usize, usize)) -> usize {
        match self {
            Self::Source => shape.0,
            Self::Target => shape.1,
        }
    }
}

/// Marginal into a buffer of the right length; returns the total mass.
pub(crate) fn marginalize_into(out: &mut [f64], hist: &ArrayView2<f64>, which: Marginal) -> f64 {
    out.iter_mut().for_each(|v| *v = 0.0);
    let mut total = 0.0;
    match which {
        Marginal::Source => {
            for (slot, row) in out.iter_mut().zip(hist.rows()) {
                for &h in row.iter() {
                    total += h;
                    *slot += h;
                }
            }
        }
        Marginal::Target => {
            for (slot, col) in out.iter_mut().zip(hist.columns()) {
                for &h in col.iter() {
                    total += h;
                    *slot += h;
                }
            }
        }
    }
    total
}

/// Reduce a joint histogram to one of its marginals.
///
/// `out` is overwritten and must have the marginal's length. Returns the
/// total histogram mass.
pub fn marginalize(out: &mut [f64], hist: &ArrayView2<f64>, which: Marginal) -> Result<f64> {
    let expected = which.len(hist.dim());
    if out.len() != expected {
        return Err(IconicError::shape_mismatch(&[expected], &[out.len()]));
    }
    Ok(marginalize_into(out, hist, which))
}

/// Joint histogram that owns its storage and marginal scratch buffers,
/// so repeated builds and evaluations do not allocate.
#[derive(Debug, Clone)]
pub struct JointHistogram {
    data: Array2<f64>,
    source_marginal: Vec<f64>,
    target_marginal: Vec<f64>,
}

impl JointHistogram {
    /// Create an empty histogram with `clamp_i` source and `clamp_j` target bins
    pub fn new(clamp_i: usize, clamp_j: usize) -> Self {
        Self {
            data: Array2::zeros((clamp_i, clamp_j)),
            source_marginal: vec![0.0; clamp_i],
            target_marginal: vec![0.0; clamp_j],
        }
    }

    /// Wrap existing histogram counts
    pub fn from_counts(data: Array2<f64>) -> Self {
        let (clamp_i, clamp_j) = data.dim();
        Self {
            data,
            source_marginal: vec![0.0; clamp_i],
            target_marginal: vec![0.0; clamp_j],
        }
    }

    #[inline]
    pub fn shape(&self) -> (usize, usize) {
        self.data.dim()
    }

    #[inline]
    pub fn view(&self) -> ArrayView2<'_, f64> {
        self.data.view()
    }

    pub fn total_mass(&self) -> f64 {
        self.data.sum()
    }

    /// See [`build_joint_histogram`].
    pub fn build(
        &mut self,
        source: &ArrayView3<i16>,
        target: &PaddedVolume,
        affine: &AffineMatrix,
        interp: Interpolation,
    ) -> Result<()> {
        build_joint_histogram(&mut self.data.view_mut(), source, target, affine, interp)
    }

    /// See [`build_joint_histogram_parallel`].
    #[cfg(feature = "parallel")]
    pub fn build_parallel(
        &mut self,
        source: &ArrayView3<i16>,
        target: &PaddedVolume,
        affine: &AffineMatrix,
        interp: Interpolation,
    ) -> Result<()> {
        build_joint_histogram_parallel(&mut self.data.view_mut(), source, target, affine, interp)
    }

    /// Row sums and the total mass
    pub fn source_marginal(&mut self) -> (&[f64], f64) {
        let total = marginalize_into(&mut self.source_marginal, &self.data.view(), Marginal::Source);
        (&self.source_marginal, total)
    }

    /// Column sums and the total mass
    pub fn target_marginal(&mut self) -> (&[f64], f64) {
        let total = marginalize_into(&mut self.target_marginal, &self.data.view(), Marginal::Target);
        (&self.target_marginal, total)
    }

    pub fn correlation_coefficient(&self) -> f64 {
        measures::correlation_coefficient(&self.data.view())
    }

    pub fn correlation_ratio(&self) -> f64 {
        measures::correlation_ratio(&self.data.view())
    }

    pub fn correlation_ratio_l1(&mut self) -> f64 {
        measures::correlation_ratio_l1_into(&self.data.view(), &mut self.source_marginal)
    }

    pub fn joint_entropy(&self) -> f64 {
        measures::joint_entropy(&self.data.view())
    }

    pub fn conditional_entropy(&mut self) -> f64 {
        measures::conditional_entropy_into(&self.data.view(), &mut self.target_marginal)
    }

    pub fn mutual_information(&mut self) -> f64 {
        measures::mutual_information_into(
            &self.data.view(),
            &mut self.source_marginal,
            &mut self.target_marginal,
        )
    }

    pub fn normalized_mutual_information(&mut self) -> f64 {
        measures::normalized_mutual_information_into(
            &self.data.view(),
            &mut self.source_marginal,
            &mut self.target_marginal,
        )
    }

    /// Supervised mutual information against a reference co-occurrence
    /// matrix of the same shape.
    pub fn supervised_mutual_information(&mut self, reference: &ArrayView2<f64>) -> Result<f64> {
        if reference.dim() != self.data.dim() {
            let (ri, rj) = reference.dim();
            let (hi, hj) = self.data.dim();
            return Err(IconicError::shape_mismatch(&[hi, hj], &[ri, rj]));
        }
        Ok(measures::supervised_mutual_information_into(
            &self.data.view(),
            reference,
            &mut self.source_marginal,
            &mut self.target_marginal,
        ))
    }

    /// Evaluate a measure selected at runtime.
    ///
    /// `reference` is only used, and then required, by
    /// [`Similarity::SupervisedMutualInformation`].
    pub fn evaluate(&mut self, similarity: Similarity, reference: Option<&ArrayView2<f64>>) -> Result<f64> {
        Ok(match similarity {
            Similarity::CorrelationCoefficient => self.correlation_coefficient(),
            Similarity::CorrelationRatio => self.correlation_ratio(),
            Similarity::CorrelationRatioL1 => self.correlation_ratio_l1(),
            Similarity::JointEntropy => self.joint_entropy(),
            Similarity::ConditionalEntropy => self.conditional_entropy(),
            Similarity::MutualInformation => self.mutual_information(),
            Similarity::NormalizedMutualInformation => self.normalized_mutual_information(),
            Similarity::SupervisedMutualInformation => {
                let reference = reference.ok_or(IconicError::MissingReference)?;
                self.supervised_mutual_information(reference)?
            }
        })
    }
}
