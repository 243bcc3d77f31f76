//! Histogram-based similarity measures
//!
//! All measures treat bin indices as the realizations of the source (row)
//! and target (column) intensity variables, weighted by the joint histogram.
//! Degenerate inputs (no mass, no variance) evaluate to 0.
//!
//! Logarithms are natural. Probabilities below [`TINY`] are clamped to it
//! before taking their logarithm.

use crate::error::{IconicError, Result};
use crate::histogram::{marginalize_into, Marginal};
use ndarray::{ArrayView1, ArrayView2};
use std::fmt;
use std::str::FromStr;

/// Floor applied to probabilities before taking a logarithm.
pub const TINY: f64 = 1e-30;

#[inline]
fn nice_log(x: f64) -> f64 {
    if x > TINY {
        x.ln()
    } else {
        TINY.ln()
    }
}

fn check_len(buf: &[f64], expected: usize) -> Result<()> {
    if buf.len() != expected {
        return Err(IconicError::shape_mismatch(&[expected], &[buf.len()]));
    }
    Ok(())
}

/// Entropy of any non-negative values, as `(entropy, total mass)`.
fn entropy_of<'a, I>(values: I) -> (f64, f64)
where
    I: IntoIterator<Item = &'a f64>,
    I::IntoIter: Clone,
{
    let values = values.into_iter();
    let sum: f64 = values.clone().sum();
    if sum <= 0.0 {
        return (0.0, 0.0);
    }
    let e = values.fold(0.0, |e, &h| {
        let p = h / sum;
        e - p * nice_log(p)
    });
    (e, sum)
}

/// Shannon entropy of a distribution buffer, returned with its total mass.
///
/// An empty or all-zero buffer has entropy 0.
pub fn entropy(dist: &[f64]) -> (f64, f64) {
    entropy_of(dist)
}

/// Median and mean absolute deviation of a 1D distribution.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct L1Moments {
    /// Smallest index where the cumulative mass reaches half the total.
    pub median: f64,
    /// Mean absolute deviation from the median.
    pub deviation: f64,
    /// Total mass.
    pub mass: f64,
}

/// Discrete median and L1 dispersion of a (possibly strided) distribution.
///
/// The deviation is assembled from partial sums collected while scanning for
/// the median, so the absolute value is never evaluated:
///
/// ```text
/// sum * E|X - m| = - sum_{i <= m} i h(i) + sum_{i > m} i h(i) + m (2 cdf(m) - sum)
/// ```
pub fn l1_moments(h: &ArrayView1<f64>) -> L1Moments {
    let sum = h.sum();
    if sum <= 0.0 {
        return L1Moments {
            mass: sum,
            ..L1Moments::default()
        };
    }

    let n = h.len();
    let lim = 0.5 * sum;
    let mut i = 0;
    let mut cdf = h[0];
    let mut acc = 0.0;
    while cdf < lim && i + 1 < n {
        i += 1;
        cdf += h[i];
        acc -= i as f64 * h[i];
    }

    let median = i as f64;
    acc += (2.0 * cdf - sum) * median;
    for k in i + 1..n {
        acc += k as f64 * h[k];
    }

    L1Moments {
        median,
        deviation: acc / sum,
        mass: sum,
    }
}

/// Squared Pearson correlation between row and column indices.
///
/// Lies in `[0, 1]`. Returns 0 when the histogram is empty or either
/// marginal has no variance.
pub fn correlation_coefficient(hist: &ArrayView2<f64>) -> f64 {
    let (mut n, mut mi, mut mj, mut mi2, mut mj2, mut mij) = (0.0, 0.0, 0.0, 0.0, 0.0, 0.0);

    for ((i, j), &h) in hist.indexed_iter() {
        let (i, j) = (i as f64, j as f64);
        let hi = i * h;
        let hj = j * h;
        n += h;
        mi += hi;
        mj += hj;
        mi2 += i * hi;
        mj2 += j * hj;
        mij += i * hj;
    }

    if n <= 0.0 {
        return 0.0;
    }

    mi /= n;
    mj /= n;
    mi2 /= n;
    mj2 /= n;
    mij /= n;

    let cov = mij - mi * mj;
    let var = (mi2 - mi * mi) * (mj2 - mj * mj);
    if var <= 0.0 {
        return 0.0;
    }
    cov * cov / var
}

/// Correlation ratio of the source intensity given the target intensity:
/// `1 - E[Var(I | J)] / Var(I)`.
pub fn correlation_ratio(hist: &ArrayView2<f64>) -> f64 {
    let (mut n, mut mean, mut var, mut cvar) = (0.0, 0.0, 0.0, 0.0);

    for col in hist.columns() {
        let (mut nj, mut mj, mut vj) = (0.0, 0.0, 0.0);
        for (i, &h) in col.iter().enumerate() {
            let hi = i as f64 * h;
            nj += h;
            mj += hi;
            vj += i as f64 * hi;
        }
        if nj > 0.0 {
            n += nj;
            mean += mj;
            var += vj;
            let m = mj / nj;
            cvar += nj * (vj / nj - m * m);
        }
    }

    if n <= 0.0 {
        return 0.0;
    }
    mean /= n;
    var = var / n - mean * mean;
    cvar /= n;

    if var <= 0.0 {
        return 0.0;
    }
    1.0 - cvar / var
}

pub(crate) fn correlation_ratio_l1_into(hist: &ArrayView2<f64>, source_marginal: &mut [f64]) -> f64 {
    let (mut n, mut cdev) = (0.0, 0.0);
    for col in hist.columns() {
        let m = l1_moments(&col);
        cdev += m.mass * m.deviation;
        n += m.mass;
    }
    if n <= 0.0 {
        return 0.0;
    }
    cdev /= n;

    marginalize_into(source_marginal, hist, Marginal::Source);
    let total = l1_moments(&ArrayView1::from(&*source_marginal));
    if total.deviation == 0.0 {
        return 0.0;
    }
    // squared to compare with the L2 ratio
    1.0 - (cdev * cdev) / (total.deviation * total.deviation)
}

/// Correlation ratio with the L1 dispersion around the median in place of
/// the variance, squared for comparability with [`correlation_ratio`].
///
/// `source_marginal` is scratch storage of length `clamp_i`.
pub fn correlation_ratio_l1(hist: &ArrayView2<f64>, source_marginal: &mut [f64]) -> Result<f64> {
    check_len(source_marginal, hist.nrows())?;
    Ok(correlation_ratio_l1_into(hist, source_marginal))
}

/// Entropy of the flattened joint histogram.
pub fn joint_entropy(hist: &ArrayView2<f64>) -> f64 {
    entropy_of(hist.iter()).0
}

pub(crate) fn conditional_entropy_into(hist: &ArrayView2<f64>, target_marginal: &mut [f64]) -> f64 {
    marginalize_into(target_marginal, hist, Marginal::Target);
    joint_entropy(hist) - entropy(target_marginal).0
}

/// Entropy of the source intensity given the target intensity.
///
/// `target_marginal` is scratch storage of length `clamp_j`.
pub fn conditional_entropy(hist: &ArrayView2<f64>, target_marginal: &mut [f64]) -> Result<f64> {
    check_len(target_marginal, hist.ncols())?;
    Ok(conditional_entropy_into(hist, target_marginal))
}

/// Marginal entropies and joint entropy `(H(I), H(J), H(I,J))`.
fn entropies(hist: &ArrayView2<f64>, source_marginal: &mut [f64], target_marginal: &mut [f64]) -> (f64, f64, f64) {
    marginalize_into(source_marginal, hist, Marginal::Source);
    marginalize_into(target_marginal, hist, Marginal::Target);
    (
        entropy(source_marginal).0,
        entropy(target_marginal).0,
        joint_entropy(hist),
    )
}

pub(crate) fn mutual_information_into(
    hist: &ArrayView2<f64>,
    source_marginal: &mut [f64],
    target_marginal: &mut [f64],
) -> f64 {
    let (ent_i, ent_j, ent_ij) = entropies(hist, source_marginal, target_marginal);
    ent_i + ent_j - ent_ij
}

/// Mutual information `H(I) + H(J) - H(I,J)`.
///
/// The marginal buffers are scratch storage of length `clamp_i` and `clamp_j`.
pub fn mutual_information(
    hist: &ArrayView2<f64>,
    source_marginal: &mut [f64],
    target_marginal: &mut [f64],
) -> Result<f64> {
    check_len(source_marginal, hist.nrows())?;
    check_len(target_marginal, hist.ncols())?;
    Ok(mutual_information_into(hist, source_marginal, target_marginal))
}

pub(crate) fn normalized_mutual_information_into(
    hist: &ArrayView2<f64>,
    source_marginal: &mut [f64],
    target_marginal: &mut [f64],
) -> f64 {
    let (ent_i, ent_j, ent_ij) = entropies(hist, source_marginal, target_marginal);
    let sum = ent_i + ent_j;
    if sum > 0.0 {
        2.0 * (1.0 - ent_ij / sum)
    } else {
        0.0
    }
}

/// Normalized mutual information `2 (1 - H(I,J) / (H(I) + H(J)))`
/// (Studholme, 1998). Returns 0 when both marginal entropies vanish.
pub fn normalized_mutual_information(
    hist: &ArrayView2<f64>,
    source_marginal: &mut [f64],
    target_marginal: &mut [f64],
) -> Result<f64> {
    check_len(source_marginal, hist.nrows())?;
    check_len(target_marginal, hist.ncols())?;
    Ok(normalized_mutual_information_into(hist, source_marginal, target_marginal))
}

pub(crate) fn supervised_mutual_information_into(
    hist: &ArrayView2<f64>,
    reference: &ArrayView2<f64>,
    ref_source: &mut [f64],
    ref_target: &mut [f64],
) -> f64 {
    marginalize_into(ref_source, reference, Marginal::Source);
    let sum_f = marginalize_into(ref_target, reference, Marginal::Target);

    let mut n = 0.0;
    let mut total = 0.0;
    for ((i, j), &h) in hist.indexed_iter() {
        n += h;
        // Dividing only fi by the reference mass normalizes the ratio below.
        let fi = if sum_f > 0.0 { ref_source[i] / sum_f } else { 0.0 };
        let expected = fi * ref_target[j];
        // A zero marginal implies a zero reference entry; the ratio is then
        // taken as 0, an approximation rather than a limit.
        let ratio = if expected > 0.0 { reference[[i, j]] / expected } else { 0.0 };
        total += h * nice_log(ratio);
    }

    if n > 0.0 {
        total / n
    } else {
        total
    }
}

/// Supervised mutual information (Roche, 2001): the expected log-ratio of
/// the reference co-occurrences `F` to the product of their marginals, under
/// the joint histogram `H`.
///
/// `ref_source` and `ref_target` are scratch storage of length `clamp_i` and
/// `clamp_j` that receive the marginals of `F`.
pub fn supervised_mutual_information(
    hist: &ArrayView2<f64>,
    reference: &ArrayView2<f64>,
    ref_source: &mut [f64],
    ref_target: &mut [f64],
) -> Result<f64> {
    if reference.dim() != hist.dim() {
        let (hi, hj) = hist.dim();
        let (ri, rj) = reference.dim();
        return Err(IconicError::shape_mismatch(&[hi, hj], &[ri, rj]));
    }
    check_len(ref_source, hist.nrows())?;
    check_len(ref_target, hist.ncols())?;
    Ok(supervised_mutual_information_into(hist, reference, ref_source, ref_target))
}

/// Similarity measure selected at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Similarity {
    CorrelationCoefficient,
    CorrelationRatio,
    CorrelationRatioL1,
    JointEntropy,
    ConditionalEntropy,
    MutualInformation,
    NormalizedMutualInformation,
    SupervisedMutualInformation,
}

impl Similarity {
    pub const ALL: [Similarity; 8] = [
        Self::CorrelationCoefficient,
        Self::CorrelationRatio,
        Self::CorrelationRatioL1,
        Self::JointEntropy,
        Self::ConditionalEntropy,
        Self::MutualInformation,
        Self::NormalizedMutualInformation,
        Self::SupervisedMutualInformation,
    ];

    /// Short name, as accepted by [`FromStr`]
    pub fn name(self) -> &'static str {
        match self {
            Self::CorrelationCoefficient => "cc",
            Self::CorrelationRatio => "cr",
            Self::CorrelationRatioL1 => "crl1",
            Self::JointEntropy => "je",
            Self::ConditionalEntropy => "ce",
            Self::MutualInformation => "mi",
            Self::NormalizedMutualInformation => "nmi",
            Self::SupervisedMutualInformation => "smi",
        }
    }

    /// Whether the measure needs a reference co-occurrence matrix
    pub fn requires_reference(self) -> bool {
        self == Self::SupervisedMutualInformation
    }
}

impl fmt::Display for Similarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Similarity {
    type Err = IconicError;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|m| m.name() == lower)
            .ok_or_else(|| IconicError::UnknownMethod(s.to_string()))
    }
}
