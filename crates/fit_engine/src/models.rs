//! Form factors and structure factors evaluated by the reference engine.
//!
//! Intensities follow the sasmodels convention: SLDs in 1e-6/A^2, lengths in
//! A, and `I(q) = scale * <F^2> / <V> * S(q) + background` in cm^-1.

use std::{
    collections::BTreeMap,
    f64::consts::{FRAC_PI_2, PI},
};

const ORIENTATION_POINTS: usize = 40;
const SLD_UNIT_SCALE: f64 = 1e-4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ModelKind {
    Sphere,
    Cylinder,
    Ellipsoid,
    CoreShellSphere,
}

impl ModelKind {
    pub(crate) const ALL: [ModelKind; 4] = [
        ModelKind::Sphere,
        ModelKind::Cylinder,
        ModelKind::Ellipsoid,
        ModelKind::CoreShellSphere,
    ];

    pub(crate) fn name(self) -> &'static str {
        match self {
            ModelKind::Sphere => "sphere",
            ModelKind::Cylinder => "cylinder",
            ModelKind::Ellipsoid => "ellipsoid",
            ModelKind::CoreShellSphere => "core_shell_sphere",
        }
    }

    pub(crate) fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StructureFactorKind {
    HardSphere,
}

impl StructureFactorKind {
    pub(crate) const ALL: [StructureFactorKind; 1] = [StructureFactorKind::HardSphere];

    pub(crate) fn name(self) -> &'static str {
        match self {
            StructureFactorKind::HardSphere => "hardsphere",
        }
    }

    pub(crate) fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }
}

pub(crate) type Values = BTreeMap<String, f64>;

/// Distribution of one polydisperse parameter as `(value, weight)` points.
pub(crate) struct Dispersion {
    pub(crate) parameter: String,
    pub(crate) points: Vec<(f64, f64)>,
}

fn value(values: &Values, name: &str) -> f64 {
    values.get(name).copied().unwrap_or(0.0)
}

fn sphere_volume(radius: f64) -> f64 {
    4.0 / 3.0 * PI * radius.powi(3)
}

/// Normalised sphere amplitude `3 (sin x - x cos x) / x^3`.
fn sph_j1c(x: f64) -> f64 {
    if x.abs() < 1e-3 {
        1.0 - x * x / 10.0
    } else {
        let (s, c) = x.sin_cos();
        3.0 * (s - x * c) / (x * x * x)
    }
}

fn sinc(x: f64) -> f64 {
    if x.abs() < 1e-8 {
        1.0
    } else {
        x.sin() / x
    }
}

/// Bessel function of the first kind, order one (rational approximation).
fn bessel_j1(x: f64) -> f64 {
    let ax = x.abs();
    if ax < 8.0 {
        let y = x * x;
        let num = x
            * (72362614232.0
                + y * (-7895059235.0
                    + y * (242396853.1
                        + y * (-2972611.439 + y * (15704.48260 + y * (-30.16036606))))));
        let den = 144725228442.0
            + y * (2300535178.0 + y * (18583304.74 + y * (99447.43394 + y * (376.9991397 + y))));
        num / den
    } else {
        let z = 8.0 / ax;
        let y = z * z;
        let xx = ax - 2.356194491;
        let p = 1.0
            + y * (0.183105e-2
                + y * (-0.3516396496e-4 + y * (0.2457520174e-5 + y * (-0.240337019e-6))));
        let q = 0.04687499995
            + y * (-0.2002690873e-3
                + y * (0.8449199096e-5 + y * (-0.88228987e-6 + y * 0.105787412e-6)));
        let ans = (0.636619772 / ax).sqrt() * (xx.cos() * p - z * xx.sin() * q);
        if x < 0.0 {
            -ans
        } else {
            ans
        }
    }
}

/// `2 J1(x) / x`, the normalised cross-section amplitude of a cylinder.
fn j1c(x: f64) -> f64 {
    if x.abs() < 1e-8 {
        1.0
    } else {
        2.0 * bessel_j1(x) / x
    }
}

/// Midpoint average of `f(alpha)` over orientations, weighted by `sin(alpha)`.
fn orientation_average(f: impl Fn(f64, f64) -> f64) -> f64 {
    let step = FRAC_PI_2 / ORIENTATION_POINTS as f64;
    let mut total = 0.0;
    let mut norm = 0.0;
    for i in 0..ORIENTATION_POINTS {
        let alpha = (i as f64 + 0.5) * step;
        let (sin_a, cos_a) = alpha.sin_cos();
        total += f(sin_a, cos_a) * sin_a;
        norm += sin_a;
    }
    total / norm
}

/// Returns `(F^2, V)` for a single particle at `q`.
fn form_factor(kind: ModelKind, values: &Values, q: f64) -> (f64, f64) {
    match kind {
        ModelKind::Sphere => {
            let radius = value(values, "radius");
            let volume = sphere_volume(radius);
            let contrast = value(values, "sld") - value(values, "sld_solvent");
            let amplitude = contrast * volume * sph_j1c(q * radius);
            (SLD_UNIT_SCALE * amplitude * amplitude, volume)
        }
        ModelKind::Cylinder => {
            let radius = value(values, "radius");
            let length = value(values, "length");
            let volume = PI * radius * radius * length;
            let contrast = value(values, "sld") - value(values, "sld_solvent");
            let average = orientation_average(|sin_a, cos_a| {
                let a = j1c(q * radius * sin_a) * sinc(0.5 * q * length * cos_a);
                a * a
            });
            (SLD_UNIT_SCALE * (contrast * volume).powi(2) * average, volume)
        }
        ModelKind::Ellipsoid => {
            let polar = value(values, "radius_polar");
            let equatorial = value(values, "radius_equatorial");
            let volume = 4.0 / 3.0 * PI * polar * equatorial * equatorial;
            let contrast = value(values, "sld") - value(values, "sld_solvent");
            let average = orientation_average(|sin_a, cos_a| {
                let r = (polar * polar * cos_a * cos_a + equatorial * equatorial * sin_a * sin_a)
                    .sqrt();
                let a = sph_j1c(q * r);
                a * a
            });
            (SLD_UNIT_SCALE * (contrast * volume).powi(2) * average, volume)
        }
        ModelKind::CoreShellSphere => {
            let core = value(values, "radius");
            let outer = core + value(values, "thickness");
            let core_volume = sphere_volume(core);
            let outer_volume = sphere_volume(outer);
            let amplitude = (value(values, "sld_core") - value(values, "sld_shell"))
                * core_volume
                * sph_j1c(q * core)
                + (value(values, "sld_shell") - value(values, "sld_solvent"))
                    * outer_volume
                    * sph_j1c(q * outer);
            (SLD_UNIT_SCALE * amplitude * amplitude, outer_volume)
        }
    }
}

/// Percus-Yevick hard-sphere structure factor.
fn hardsphere(q: f64, radius_effective: f64, volfraction: f64) -> f64 {
    if volfraction <= 0.0 || radius_effective <= 0.0 {
        return 1.0;
    }
    let phi = volfraction.min(0.74);
    let denom = (1.0 - phi).powi(4);
    let alpha = (1.0 + 2.0 * phi).powi(2) / denom;
    let beta = -6.0 * phi * (1.0 + 0.5 * phi).powi(2) / denom;
    let gamma = 0.5 * phi * alpha;
    let a = 2.0 * q * radius_effective;
    if a < 0.05 {
        return denom / (1.0 + 2.0 * phi).powi(2);
    }
    let (s, c) = a.sin_cos();
    let a2 = a * a;
    let g = alpha / a2 * (s - a * c)
        + beta / (a2 * a) * (2.0 * a * s + (2.0 - a2) * c - 2.0)
        + gamma / (a2 * a2 * a)
            * (-a2 * a2 * c + 4.0 * ((3.0 * a2 - 6.0) * c + (a2 * a - 6.0 * a) * s + 6.0));
    1.0 / (1.0 + 24.0 * phi * g / a)
}

fn structure_factor(kind: StructureFactorKind, values: &Values, q: f64) -> f64 {
    match kind {
        StructureFactorKind::HardSphere => hardsphere(
            q,
            value(values, "radius_effective"),
            value(values, "volfraction"),
        ),
    }
}

/// Intensity at every `q`, integrating over the cartesian product of the
/// supplied dispersions.
pub(crate) fn evaluate(
    kind: ModelKind,
    sf: Option<StructureFactorKind>,
    values: &Values,
    dispersions: &[Dispersion],
    q: &[f64],
) -> Vec<f64> {
    let mut weighted_f2 = vec![0.0; q.len()];
    let mut weighted_volume = 0.0;
    let mut indices = vec![0usize; dispersions.len()];
    let mut local = values.clone();

    loop {
        let mut weight = 1.0;
        for (dispersion, &index) in dispersions.iter().zip(&indices) {
            let (point, w) = dispersion.points[index];
            local.insert(dispersion.parameter.clone(), point);
            weight *= w;
        }

        let mut volume = 0.0;
        for (slot, &qi) in weighted_f2.iter_mut().zip(q) {
            let (f2, v) = form_factor(kind, &local, qi);
            *slot += weight * f2;
            volume = v;
        }
        weighted_volume += weight * volume;

        // advance the odometer over all dispersion points
        let mut axis = 0;
        loop {
            if axis == dispersions.len() {
                return finish(sf, values, q, &weighted_f2, weighted_volume);
            }
            indices[axis] += 1;
            if indices[axis] < dispersions[axis].points.len() {
                break;
            }
            indices[axis] = 0;
            axis += 1;
        }
    }
}

fn finish(
    sf: Option<StructureFactorKind>,
    values: &Values,
    q: &[f64],
    weighted_f2: &[f64],
    weighted_volume: f64,
) -> Vec<f64> {
    let scale = value(values, "scale");
    let background = value(values, "background");
    q.iter()
        .zip(weighted_f2)
        .map(|(&qi, &f2)| {
            let form = if weighted_volume > 0.0 {
                f2 / weighted_volume
            } else {
                0.0
            };
            let s = sf.map_or(1.0, |kind| structure_factor(kind, values, qi));
            scale * form * s + background
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sphere_values(radius: f64) -> Values {
        [
            ("scale", 1.0),
            ("background", 0.0),
            ("sld", 1.0),
            ("sld_solvent", 6.0),
            ("radius", radius),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
    }

    #[test]
    fn sphere_forward_scattering_matches_volume_times_contrast() {
        let values = sphere_values(50.0);
        let intensity = evaluate(ModelKind::Sphere, None, &values, &[], &[1e-6]);
        let expected = SLD_UNIT_SCALE * 25.0 * sphere_volume(50.0);
        assert!((intensity[0] - expected).abs() / expected < 1e-6);
    }

    #[test]
    fn sphere_has_first_minimum_near_qr_of_4_49() {
        let values = sphere_values(50.0);
        let q: Vec<f64> = (1..200).map(|i| i as f64 * 0.001).collect();
        let intensity = evaluate(ModelKind::Sphere, None, &values, &[], &q);
        let min_index = (1..q.len() - 1)
            .find(|&i| intensity[i] < intensity[i - 1] && intensity[i] < intensity[i + 1])
            .expect("a local minimum");
        assert!((q[min_index] * 50.0 - 4.493).abs() < 0.06);
    }

    #[test]
    fn bessel_j1_matches_reference_values() {
        assert!((bessel_j1(1.0) - 0.440_050_585_7).abs() < 1e-7);
        assert!((bessel_j1(10.0) - 0.043_472_746_2).abs() < 1e-6);
    }

    #[test]
    fn hardsphere_tends_to_one_at_high_q_and_is_suppressed_at_low_q() {
        assert!(hardsphere(0.001, 50.0, 0.2) < 1.0);
        assert!((hardsphere(5.0, 50.0, 0.2) - 1.0).abs() < 0.05);
        assert_eq!(hardsphere(0.1, 50.0, 0.0), 1.0);
    }

    #[test]
    fn dispersion_product_covers_every_combination() {
        let mut values = sphere_values(50.0);
        values.insert("thickness".to_string(), 10.0);
        values.insert("sld_core".to_string(), 1.0);
        values.insert("sld_shell".to_string(), 2.0);
        let dispersions = vec![
            Dispersion {
                parameter: "radius".to_string(),
                points: vec![(40.0, 1.0), (50.0, 2.0)],
            },
            Dispersion {
                parameter: "thickness".to_string(),
                points: vec![(5.0, 1.0), (10.0, 1.0), (15.0, 1.0)],
            },
        ];
        let intensity = evaluate(ModelKind::CoreShellSphere, None, &values, &dispersions, &[0.01]);
        assert!(intensity[0].is_finite() && intensity[0] > 0.0);
    }
}
