// Cubic smoothing spline in the Reinsch formulation: among all natural cubic
// splines g, minimise the roughness ∫g''² subject to Σ(g(x_i) − y_i)² ≤ s.
// The constrained problem is solved through its penalised form
//     Σ(y_i − g_i)² + α ∫g''²
// whose normal equations (R + α QᵀQ)γ = Qᵀy are pentadiagonal; α is then
// tuned until the residual sum of squares meets s.

use chrono::{DateTime, Duration, Utc};
use ndarray::Array1;

use crate::{DenseCurvePoint, GapBoundary, RateSample, VelocityConfig, VvError};

const MIN_FIT_POINTS: usize = 3;
const BRACKET_STEPS: usize = 40;
const BISECT_STEPS: usize = 200;
const RSS_REL_TOL: f64 = 1e-10;

#[derive(Clone, Debug)]
pub struct SmoothingSpline {
    knots: Array1<f64>,
    values: Array1<f64>,
    second: Array1<f64>,
    weight: f64,
    rss: f64,
}

impl SmoothingSpline {
    /// Fit through `(x, y)` with residual budget `s`. `x` must be strictly
    /// increasing and hold at least three points.
    pub fn fit(x: &[f64], y: &[f64], s: f64) -> Result<Self, VvError> {
        let n = x.len();
        if n != y.len() {
            return Err(VvError::InvalidParameter(format!(
                "x and y lengths differ ({} vs {})",
                n,
                y.len()
            )));
        }
        if n < MIN_FIT_POINTS {
            return Err(VvError::InsufficientData { usable: n });
        }
        if x.windows(2).any(|w| !(w[1] > w[0])) {
            return Err(VvError::InvalidParameter(
                "spline knots must be strictly increasing".into(),
            ));
        }
        if !s.is_finite() || s < 0.0 {
            return Err(VvError::InvalidParameter(format!(
                "smoothing budget must be >= 0, got {s}"
            )));
        }

        let system = PenaltySystem::new(x, y);
        let (line, line_rss) = least_squares_line(x, y);
        if s >= line_rss {
            let values = Array1::from_iter(x.iter().map(|&xi| line.0 + line.1 * xi));
            return Ok(Self {
                knots: Array1::from_vec(x.to_vec()),
                values,
                second: Array1::zeros(n),
                weight: f64::INFINITY,
                rss: line_rss,
            });
        }

        let weight = if s <= 0.0 { 0.0 } else { system.find_weight(s) };
        let solved = system.solve(weight);
        let mut second = Array1::zeros(n);
        for (j, g) in solved.gamma.iter().enumerate() {
            second[j + 1] = *g;
        }

        Ok(Self {
            knots: Array1::from_vec(x.to_vec()),
            values: solved.fitted,
            second,
            weight,
            rss: solved.rss,
        })
    }

    /// Penalty weight α the fit settled on; infinite when the fit is the
    /// least-squares line.
    pub fn weight(&self) -> f64 {
        self.weight
    }

    pub fn residual_sum_of_squares(&self) -> f64 {
        self.rss
    }

    /// Evaluate the spline, clamping `x` to the knot range.
    pub fn evaluate(&self, x: f64) -> f64 {
        let n = self.knots.len();
        let lo = self.knots[0];
        let hi = self.knots[n - 1];
        let x = x.clamp(lo, hi);
        let upper = self
            .knots
            .as_slice()
            .map(|k| k.partition_point(|&v| v <= x))
            .unwrap_or(n);
        let i = upper.saturating_sub(1).min(n - 2);

        let (x0, x1) = (self.knots[i], self.knots[i + 1]);
        let (g0, g1) = (self.values[i], self.values[i + 1]);
        let (m0, m1) = (self.second[i], self.second[i + 1]);
        let h = x1 - x0;
        let a = x - x0;
        let b = x1 - x;
        (b * g0 + a * g1) / h - a * b / 6.0 * ((1.0 + a / h) * m1 + (1.0 + b / h) * m0)
    }
}

struct Solved {
    gamma: Array1<f64>,
    fitted: Array1<f64>,
    rss: f64,
}

/// Band storage for R, QᵀQ and Qᵀy over the interior knots.
struct PenaltySystem {
    y: Array1<f64>,
    q0: Array1<f64>,
    q1: Array1<f64>,
    q2: Array1<f64>,
    r_diag: Array1<f64>,
    r_off: Array1<f64>,
    qty: Array1<f64>,
}

impl PenaltySystem {
    fn new(x: &[f64], y: &[f64]) -> Self {
        let n = x.len();
        let m = n - 2;
        let h: Vec<f64> = x.windows(2).map(|w| w[1] - w[0]).collect();

        let q0 = Array1::from_iter((0..m).map(|j| 1.0 / h[j]));
        let q2 = Array1::from_iter((0..m).map(|j| 1.0 / h[j + 1]));
        let q1 = Array1::from_iter((0..m).map(|j| -1.0 / h[j] - 1.0 / h[j + 1]));
        let r_diag = Array1::from_iter((0..m).map(|j| (h[j] + h[j + 1]) / 3.0));
        let r_off = Array1::from_iter((0..m.saturating_sub(1)).map(|j| h[j + 1] / 6.0));
        let qty = Array1::from_iter(
            (0..m).map(|j| q0[j] * y[j] + q1[j] * y[j + 1] + q2[j] * y[j + 2]),
        );

        Self {
            y: Array1::from_vec(y.to_vec()),
            q0,
            q1,
            q2,
            r_diag,
            r_off,
            qty,
        }
    }

    fn solve(&self, weight: f64) -> Solved {
        let m = self.qty.len();
        let a0 = Array1::from_iter((0..m).map(|j| {
            self.r_diag[j]
                + weight * (self.q0[j].powi(2) + self.q1[j].powi(2) + self.q2[j].powi(2))
        }));
        let a1 = Array1::from_iter((0..m.saturating_sub(1)).map(|j| {
            self.r_off[j] + weight * (self.q1[j] * self.q0[j + 1] + self.q2[j] * self.q1[j + 1])
        }));
        let a2 = Array1::from_iter(
            (0..m.saturating_sub(2)).map(|j| weight * self.q2[j] * self.q0[j + 2]),
        );
        let gamma = solve_pentadiagonal(&a0, &a1, &a2, &self.qty);

        let n = self.y.len();
        let mut q_gamma = Array1::<f64>::zeros(n);
        for j in 0..m {
            q_gamma[j] += self.q0[j] * gamma[j];
            q_gamma[j + 1] += self.q1[j] * gamma[j];
            q_gamma[j + 2] += self.q2[j] * gamma[j];
        }
        let residual = &q_gamma * weight;
        let fitted = &self.y - &residual;
        let rss = residual.iter().map(|r| r * r).sum();
        Solved { gamma, fitted, rss }
    }

    /// The residual sum of squares grows monotonically with α, from zero
    /// (interpolation) towards the least-squares line's. Bracket the target
    /// by decades, then bisect in log space.
    fn find_weight(&self, target: f64) -> f64 {
        let mut alpha = 1.0;
        let rss = self.solve(alpha).rss;
        let (mut lo, mut hi) = if rss < target {
            let mut lo = alpha;
            let mut found = None;
            for _ in 0..BRACKET_STEPS {
                alpha *= 10.0;
                if self.solve(alpha).rss >= target {
                    found = Some(alpha);
                    break;
                }
                lo = alpha;
            }
            match found {
                Some(hi) => (lo, hi),
                None => return alpha,
            }
        } else {
            let mut hi = alpha;
            let mut found = None;
            for _ in 0..BRACKET_STEPS {
                alpha /= 10.0;
                if self.solve(alpha).rss < target {
                    found = Some(alpha);
                    break;
                }
                hi = alpha;
            }
            match found {
                Some(lo) => (lo, hi),
                None => return alpha,
            }
        };

        for _ in 0..BISECT_STEPS {
            let mid = (lo * hi).sqrt();
            let rss = self.solve(mid).rss;
            if (rss - target).abs() <= RSS_REL_TOL * target {
                return mid;
            }
            if rss < target {
                lo = mid;
            } else {
                hi = mid;
            }
            if hi / lo - 1.0 < 1e-15 {
                break;
            }
        }
        (lo * hi).sqrt()
    }
}

/// LDLᵀ solve of a symmetric positive definite pentadiagonal system given
/// its main, first and second diagonals.
fn solve_pentadiagonal(
    a0: &Array1<f64>,
    a1: &Array1<f64>,
    a2: &Array1<f64>,
    rhs: &Array1<f64>,
) -> Array1<f64> {
    let m = a0.len();
    let mut d = Array1::<f64>::zeros(m);
    let mut l1 = Array1::<f64>::zeros(m);
    let mut l2 = Array1::<f64>::zeros(m);

    for i in 0..m {
        let mut di = a0[i];
        if i >= 1 {
            di -= d[i - 1] * l1[i - 1].powi(2);
        }
        if i >= 2 {
            di -= d[i - 2] * l2[i - 2].powi(2);
        }
        d[i] = di;
        if i + 1 < m {
            let mut off = a1[i];
            if i >= 1 {
                off -= d[i - 1] * l1[i - 1] * l2[i - 1];
            }
            l1[i] = off / di;
        }
        if i + 2 < m {
            l2[i] = a2[i] / di;
        }
    }

    let mut z = rhs.clone();
    for i in 0..m {
        if i >= 1 {
            z[i] -= l1[i - 1] * z[i - 1];
        }
        if i >= 2 {
            z[i] -= l2[i - 2] * z[i - 2];
        }
    }
    for i in 0..m {
        z[i] /= d[i];
    }
    for i in (0..m).rev() {
        if i + 1 < m {
            z[i] -= l1[i] * z[i + 1];
        }
        if i + 2 < m {
            z[i] -= l2[i] * z[i + 2];
        }
    }
    z
}

/// Returns `((intercept, slope), rss)`.
fn least_squares_line(x: &[f64], y: &[f64]) -> ((f64, f64), f64) {
    let n = x.len() as f64;
    let x_mean = x.iter().sum::<f64>() / n;
    let y_mean = y.iter().sum::<f64>() / n;
    let mut num = 0.0;
    let mut den = 0.0;
    for (&xi, &yi) in x.iter().zip(y.iter()) {
        num += (xi - x_mean) * (yi - y_mean);
        den += (xi - x_mean) * (xi - x_mean);
    }
    let slope = if den.abs() < 1e-12 { 0.0 } else { num / den };
    let intercept = y_mean - slope * x_mean;
    let rss = x
        .iter()
        .zip(y.iter())
        .map(|(&xi, &yi)| (yi - intercept - slope * xi).powi(2))
        .sum();
    ((intercept, slope), rss)
}

fn minutes_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_milliseconds() as f64 / 60_000.0
}

fn resample_grid(start: DateTime<Utc>, end: DateTime<Utc>, points: usize) -> Vec<DateTime<Utc>> {
    let span_ms = (end - start).num_milliseconds() as i128;
    let steps = (points.max(2) - 1) as i128;
    (0..=steps)
        .map(|j| start + Duration::milliseconds((span_ms * j / steps) as i64))
        .collect()
}

/// Fit the smoothing spline to `samples` and resample it onto
/// `config.resample_resolution` evenly spaced timestamps spanning the samples.
///
/// A point is flagged `is_gap` when the segment from it to the next grid
/// point overlaps a collection hole. Returns the points together with the
/// penalty weight of the fit.
pub fn fit_curve(
    samples: &[RateSample],
    gaps: &[GapBoundary],
    config: &VelocityConfig,
) -> Result<(Vec<DenseCurvePoint>, f64), VvError> {
    if samples.len() < MIN_FIT_POINTS {
        return Err(VvError::InsufficientData {
            usable: samples.len(),
        });
    }

    let start = samples[0].timestamp;
    let end = samples[samples.len() - 1].timestamp;
    let xs: Vec<f64> = samples
        .iter()
        .map(|s| minutes_between(start, s.timestamp))
        .collect();
    let ys: Vec<f64> = samples.iter().map(|s| s.rate_per_minute).collect();
    let budget = config.spline_smoothing_factor_per_point * samples.len() as f64;
    let spline = SmoothingSpline::fit(&xs, &ys, budget)?;

    let grid = resample_grid(start, end, config.resample_resolution);
    let points = grid
        .iter()
        .enumerate()
        .map(|(j, &t)| {
            let next = grid.get(j + 1).copied().unwrap_or(t);
            let is_gap = gaps.iter().any(|g| t < g.at && next > g.previous);
            DenseCurvePoint {
                timestamp: t,
                rate_per_minute: spline.evaluate(minutes_between(start, t)),
                is_gap,
            }
        })
        .collect();

    Ok((points, spline.weight()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn samples(points: &[(i64, f64)]) -> Vec<RateSample> {
        points
            .iter()
            .map(|&(m, r)| RateSample {
                timestamp: base() + Duration::minutes(m),
                rate_per_minute: r,
                rejection: None,
            })
            .collect()
    }

    fn noisy(n: usize) -> (Vec<f64>, Vec<f64>) {
        let x: Vec<f64> = (0..n).map(|i| i as f64 * 1.5).collect();
        let y: Vec<f64> = (0..n)
            .map(|i| 200.0 + 40.0 * (i as f64 * 0.4).sin() + if i % 2 == 0 { 25.0 } else { -25.0 })
            .collect();
        (x, y)
    }

    #[test]
    fn zero_budget_interpolates() {
        let (x, y) = noisy(12);
        let spline = SmoothingSpline::fit(&x, &y, 0.0).unwrap();
        for (xi, yi) in x.iter().zip(y.iter()) {
            assert!((spline.evaluate(*xi) - yi).abs() < 1e-6);
        }
    }

    #[test]
    fn residual_meets_budget() {
        let (x, y) = noisy(30);
        let budget = 4.0 * 30.0;
        let spline = SmoothingSpline::fit(&x, &y, budget).unwrap();
        assert!(spline.weight().is_finite());
        let rss = spline.residual_sum_of_squares();
        assert!((rss - budget).abs() / budget < 1e-6, "rss {rss}");
        let direct: f64 = x
            .iter()
            .zip(y.iter())
            .map(|(xi, yi)| (spline.evaluate(*xi) - yi).powi(2))
            .sum();
        assert!((direct - rss).abs() < 1e-6 * budget);
    }

    #[test]
    fn large_budget_collapses_to_line() {
        let x = vec![0.0, 1.0, 2.0, 3.0, 4.0];
        let y = vec![1.0, 3.2, 4.9, 7.1, 9.0];
        let spline = SmoothingSpline::fit(&x, &y, 1e6).unwrap();
        assert!(spline.weight().is_infinite());
        let mid = spline.evaluate(2.5);
        let left = spline.evaluate(2.0);
        let right = spline.evaluate(3.0);
        assert!(((left + right) / 2.0 - mid).abs() < 1e-9);
    }

    #[test]
    fn linear_data_is_reproduced() {
        let x: Vec<f64> = (0..8).map(|i| i as f64).collect();
        let y: Vec<f64> = x.iter().map(|v| 10.0 + 2.0 * v).collect();
        let spline = SmoothingSpline::fit(&x, &y, 0.5).unwrap();
        assert!((spline.evaluate(3.5) - 17.0).abs() < 1e-9);
    }

    #[test]
    fn unsorted_knots_are_rejected() {
        let result = SmoothingSpline::fit(&[0.0, 2.0, 1.0], &[1.0, 2.0, 3.0], 0.0);
        assert!(matches!(result, Err(VvError::InvalidParameter(_))));
    }

    #[test]
    fn pentadiagonal_solver_matches_known_system() {
        // [[4,1,1,0],[1,4,1,1],[1,1,4,1],[0,1,1,4]] x = [6,7,7,6] has x = 1.
        let a0 = Array1::from_vec(vec![4.0, 4.0, 4.0, 4.0]);
        let a1 = Array1::from_vec(vec![1.0, 1.0, 1.0]);
        let a2 = Array1::from_vec(vec![1.0, 1.0]);
        let rhs = Array1::from_vec(vec![6.0, 7.0, 7.0, 6.0]);
        let x = solve_pentadiagonal(&a0, &a1, &a2, &rhs);
        for v in x.iter() {
            assert!((v - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn resampled_range_and_count() {
        let s = samples(&[(1, 10.0), (2, 15.0), (4, 12.0), (7, 20.0), (9, 18.0)]);
        let config = VelocityConfig {
            resample_resolution: 350,
            ..VelocityConfig::default()
        };
        let (points, _) = fit_curve(&s, &[], &config).unwrap();
        assert_eq!(points.len(), 350);
        assert_eq!(points[0].timestamp, s[0].timestamp);
        assert_eq!(points[349].timestamp, s[4].timestamp);
        assert!(points.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
        assert!(points.iter().all(|p| !p.is_gap));
    }

    #[test]
    fn two_samples_are_insufficient() {
        let s = samples(&[(1, 10.0), (2, 15.0)]);
        let result = fit_curve(&s, &[], &VelocityConfig::default());
        assert!(matches!(
            result,
            Err(VvError::InsufficientData { usable: 2 })
        ));
    }

    #[test]
    fn points_across_hole_are_flagged() {
        let s = samples(&[(1, 10.0), (2, 10.0), (3, 10.0), (23, 10.0), (24, 10.0)]);
        let gap = GapBoundary {
            at: base() + Duration::minutes(23),
            previous: base() + Duration::minutes(3),
            elapsed_minutes: 20.0,
        };
        let config = VelocityConfig {
            resample_resolution: 24,
            ..VelocityConfig::default()
        };
        let (points, _) = fit_curve(&s, &[gap], &config).unwrap();
        // Grid step is one minute, from 00:01 to 00:24.
        for p in &points {
            let minute = (p.timestamp - base()).num_minutes();
            assert_eq!(p.is_gap, (3..23).contains(&minute), "minute {minute}");
            assert!((p.rate_per_minute - 10.0).abs() < 1e-9);
        }
    }

    #[test]
    fn coarse_grid_still_marks_straddling_segment() {
        let s = samples(&[(0, 5.0), (1, 6.0), (2, 5.0), (40, 6.0), (41, 5.0), (60, 6.0)]);
        let gap = GapBoundary {
            at: base() + Duration::minutes(40),
            previous: base() + Duration::minutes(2),
            elapsed_minutes: 38.0,
        };
        let config = VelocityConfig {
            resample_resolution: 2,
            ..VelocityConfig::default()
        };
        let (points, _) = fit_curve(&s, &[gap], &config).unwrap();
        assert_eq!(points.len(), 2);
        assert!(points[0].is_gap);
        assert!(!points[1].is_gap);
    }
}
