use shared::domain::{Distribution, PolydispersityConfig};

const N_SIGMAS: f64 = 3.0;

/// Quadrature points `(value, weight)` of a size distribution centred on
/// `center`, with the width relative to the centre. Degenerate inputs
/// collapse to the monodisperse point.
pub(crate) fn dispersion_points(center: f64, config: &PolydispersityConfig) -> Vec<(f64, f64)> {
    let monodisperse = vec![(center, 1.0)];
    if config.width <= 0.0 || config.n_points <= 1 || center <= 0.0 {
        return monodisperse;
    }
    let n = config.n_points as usize;
    let sigma = config.width * center;

    let (low, high) = match config.distribution {
        Distribution::Lognormal => (
            center * (-N_SIGMAS * config.width).exp(),
            center * (N_SIGMAS * config.width).exp(),
        ),
        Distribution::Rectangle => {
            let half = 3.0_f64.sqrt() * sigma;
            (center - half, center + half)
        }
        Distribution::Gaussian | Distribution::Schulz | Distribution::Boltzmann => {
            (center - N_SIGMAS * sigma, center + N_SIGMAS * sigma)
        }
    };
    let low = low.max(center * 1e-6);

    let xs: Vec<f64> = (0..n)
        .map(|i| low + (high - low) * i as f64 / (n - 1) as f64)
        .collect();

    let log_weights: Vec<f64> = xs
        .iter()
        .map(|&x| match config.distribution {
            Distribution::Gaussian => -(x - center).powi(2) / (2.0 * sigma * sigma),
            Distribution::Lognormal => {
                let s = config.width;
                -(x / center).ln().powi(2) / (2.0 * s * s) - x.ln()
            }
            Distribution::Schulz => {
                let z = (1.0 / (config.width * config.width) - 1.0).max(0.0);
                z * x.ln() - (z + 1.0) * x / center
            }
            Distribution::Rectangle => 0.0,
            Distribution::Boltzmann => -(x - center).abs() / sigma,
        })
        .collect();

    let peak = log_weights
        .iter()
        .copied()
        .filter(|w| w.is_finite())
        .fold(f64::NEG_INFINITY, f64::max);
    if !peak.is_finite() {
        return monodisperse;
    }

    let points: Vec<(f64, f64)> = xs
        .into_iter()
        .zip(log_weights)
        .map(|(x, lw)| (x, (lw - peak).exp()))
        .filter(|(x, w)| *x > 0.0 && w.is_finite() && *w > 0.0)
        .collect();

    if points.is_empty() {
        monodisperse
    } else {
        points
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(distribution: Distribution, width: f64, n_points: u32) -> PolydispersityConfig {
        PolydispersityConfig {
            parameter_name: "radius".to_string(),
            width,
            distribution,
            n_points,
            vary: false,
        }
    }

    #[test]
    fn zero_width_is_monodisperse() {
        let points = dispersion_points(50.0, &config(Distribution::Gaussian, 0.0, 35));
        assert_eq!(points, vec![(50.0, 1.0)]);
    }

    #[test]
    fn gaussian_points_are_symmetric_and_peak_at_center() {
        let points = dispersion_points(50.0, &config(Distribution::Gaussian, 0.1, 11));
        assert_eq!(points.len(), 11);
        let (center, peak) = points[5];
        assert!((center - 50.0).abs() < 1e-9);
        assert!((peak - 1.0).abs() < 1e-12);
        assert!((points[0].1 - points[10].1).abs() < 1e-12);
    }

    #[test]
    fn every_distribution_yields_positive_sizes() {
        for distribution in Distribution::ALL {
            let points = dispersion_points(20.0, &config(distribution, 0.5, 21));
            assert!(!points.is_empty(), "{distribution}");
            assert!(points.iter().all(|(x, w)| *x > 0.0 && *w > 0.0), "{distribution}");
        }
    }
}
