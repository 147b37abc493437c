//! Votes-per-minute velocity curves derived from cumulative vote snapshots.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, warn};

mod gaps;
mod normalize;
mod smooth;
pub mod snapshot;
mod spline;
mod top;
mod velocity;

pub use gaps::detect_gaps;
pub use normalize::{normalize_series, NormalizedSeries};
pub use smooth::{centered_moving_average, smooth_samples};
pub use snapshot::{
    parse_vote_count, DirectorySource, EntitySeries, FileSource, InMemorySource, InvalidEntity,
    Snapshot, SnapshotSource,
};
pub use spline::{fit_curve, SmoothingSpline};
pub use top::select_top;
pub use velocity::{compute_rates, usable_samples, RateTally};

#[derive(Error, Debug)]
pub enum VvError {
    #[error("series has {kept} distinct timestamps; at least 2 are required")]
    InvalidSeries { kept: usize },
    #[error("insufficient data for curve fitting ({usable} usable samples, need 3)")]
    InsufficientData { usable: usize },
    #[error("snapshot unavailable: {0}")]
    SnapshotUnavailable(String),
    #[error("failed to parse snapshot{}: {message}", entry_label(.entity))]
    SnapshotParse {
        entity: Option<String>,
        message: String,
    },
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

fn entry_label(entity: &Option<String>) -> String {
    entity
        .as_ref()
        .map(|e| format!(" entry '{e}'"))
        .unwrap_or_default()
}

/// One observation of an entity's cumulative vote count.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RawRecord {
    pub timestamp: DateTime<Utc>,
    pub count: u64,
}

impl RawRecord {
    pub fn new(timestamp: DateTime<Utc>, count: u64) -> Self {
        Self { timestamp, count }
    }
}

/// Why a rate sample is kept out of smoothing and fitting.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Rejection {
    NegativeDelta,
    AboveCeiling,
}

/// Rate over the interval ending at `timestamp`.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct RateSample {
    pub timestamp: DateTime<Utc>,
    pub rate_per_minute: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection: Option<Rejection>,
}

impl RateSample {
    pub fn is_usable(&self) -> bool {
        self.rejection.is_none()
    }
}

/// A collection hole: the interval `(previous, at)` exceeded the gap threshold.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct GapBoundary {
    pub at: DateTime<Utc>,
    pub previous: DateTime<Utc>,
    pub elapsed_minutes: f64,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct DenseCurvePoint {
    pub timestamp: DateTime<Utc>,
    pub rate_per_minute: f64,
    pub is_gap: bool,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NegativeDeltaPolicy {
    /// Decreasing counts are corrections; the interval contributes a rate of zero.
    ClampToZero,
    /// Decreasing counts drop the sample from smoothing and fitting.
    Reject,
}

impl Default for NegativeDeltaPolicy {
    fn default() -> Self {
        NegativeDeltaPolicy::ClampToZero
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VelocityConfig {
    pub smoothing_window: usize,
    pub gap_threshold_minutes: f64,
    pub spline_smoothing_factor_per_point: f64,
    pub resample_resolution: usize,
    pub rate_outlier_ceiling: Option<f64>,
    pub negative_delta_policy: NegativeDeltaPolicy,
    pub top_n: usize,
}

impl Default for VelocityConfig {
    fn default() -> Self {
        Self {
            smoothing_window: 3,
            gap_threshold_minutes: 15.0,
            spline_smoothing_factor_per_point: 4.0,
            resample_resolution: 400,
            rate_outlier_ceiling: Some(100_000.0),
            negative_delta_policy: NegativeDeltaPolicy::ClampToZero,
            top_n: 4,
        }
    }
}

impl VelocityConfig {
    pub fn validate(&self) -> Result<(), VvError> {
        if self.smoothing_window == 0 || self.smoothing_window % 2 == 0 {
            return Err(VvError::InvalidParameter(format!(
                "smoothing_window must be a positive odd number, got {}",
                self.smoothing_window
            )));
        }
        if !self.gap_threshold_minutes.is_finite() || self.gap_threshold_minutes <= 0.0 {
            return Err(VvError::InvalidParameter(format!(
                "gap_threshold_minutes must be positive, got {}",
                self.gap_threshold_minutes
            )));
        }
        if !self.spline_smoothing_factor_per_point.is_finite()
            || self.spline_smoothing_factor_per_point < 0.0
        {
            return Err(VvError::InvalidParameter(format!(
                "spline_smoothing_factor_per_point must be >= 0, got {}",
                self.spline_smoothing_factor_per_point
            )));
        }
        if self.resample_resolution < 2 {
            return Err(VvError::InvalidParameter(format!(
                "resample_resolution must be at least 2, got {}",
                self.resample_resolution
            )));
        }
        if let Some(ceiling) = self.rate_outlier_ceiling {
            if ceiling.is_nan() || ceiling <= 0.0 {
                return Err(VvError::InvalidParameter(format!(
                    "rate_outlier_ceiling must be positive, got {ceiling}"
                )));
            }
        }
        Ok(())
    }

    pub fn params_hash_sha256(&self) -> Result<String, VvError> {
        let bytes =
            serde_json::to_vec(self).map_err(|e| VvError::InvalidParameter(e.to_string()))?;
        let digest = Sha256::digest(&bytes);
        let mut out = String::with_capacity(digest.len() * 2);
        for b in digest {
            let _ = write!(&mut out, "{:02x}", b);
        }
        Ok(out)
    }
}

/// Output of the pipeline for one entity: a fitted dense curve, or the raw
/// usable rates when there were too few of them to fit.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", content = "points", rename_all = "snake_case")]
pub enum VelocityCurve {
    Fitted(Vec<DenseCurvePoint>),
    Raw(Vec<RateSample>),
}

impl VelocityCurve {
    pub fn is_fitted(&self) -> bool {
        matches!(self, VelocityCurve::Fitted(_))
    }

    pub fn len(&self) -> usize {
        match self {
            VelocityCurve::Fitted(points) => points.len(),
            VelocityCurve::Raw(samples) => samples.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct CurveDiagnostics {
    pub records_in: usize,
    pub duplicates_removed: usize,
    pub out_of_order_removed: usize,
    pub clamped_negative: usize,
    pub rejected_negative: usize,
    pub rejected_outliers: usize,
    pub zero_elapsed: usize,
    pub usable_samples: usize,
    pub smoothing_weight: Option<f64>,
    pub fallback_reason: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EntityCurve {
    pub entity: String,
    pub rates: Vec<RateSample>,
    pub smoothed: Vec<RateSample>,
    pub gaps: Vec<GapBoundary>,
    pub curve: VelocityCurve,
    pub diagnostics: CurveDiagnostics,
}

/// Run normalize → rates → smooth → gap scan → spline for one entity.
///
/// Fails only when the series cannot yield any rate at all; too few usable
/// rates for a spline fall back to [`VelocityCurve::Raw`].
pub fn compute_velocity_curve(
    entity: &str,
    records: &[RawRecord],
    config: &VelocityConfig,
) -> Result<EntityCurve, VvError> {
    config.validate()?;

    let normalized = normalize_series(records)?;
    let (rates, tally) = compute_rates(&normalized, config);
    let usable = usable_samples(&rates);
    let smoothed = smooth_samples(&usable, config.smoothing_window);
    let gaps = detect_gaps(normalized.timestamps(), config.gap_threshold_minutes);

    let mut diagnostics = CurveDiagnostics {
        records_in: records.len(),
        duplicates_removed: normalized.duplicates_removed(),
        out_of_order_removed: normalized.out_of_order_removed(),
        clamped_negative: tally.clamped_negative,
        rejected_negative: tally.rejected_negative,
        rejected_outliers: tally.rejected_outliers,
        zero_elapsed: tally.zero_elapsed,
        usable_samples: usable.len(),
        ..CurveDiagnostics::default()
    };

    let curve = match fit_curve(&smoothed, &gaps, config) {
        Ok((points, weight)) => {
            // An infinite weight means the fit collapsed to the least-squares line.
            diagnostics.smoothing_weight = Some(weight).filter(|w| w.is_finite());
            VelocityCurve::Fitted(points)
        }
        Err(err @ VvError::InsufficientData { .. }) => {
            warn!("{entity}: {err}; plotting raw rates");
            diagnostics.fallback_reason = Some(err.to_string());
            VelocityCurve::Raw(usable)
        }
        Err(err) => return Err(err),
    };

    debug!(
        "{entity}: {} records, {} rates, {} gaps, {} curve points",
        records.len(),
        rates.len(),
        gaps.len(),
        curve.len()
    );

    Ok(EntityCurve {
        entity: entity.to_string(),
        rates,
        smoothed,
        gaps,
        curve,
        diagnostics,
    })
}

/// Compute one named entity of a snapshot. Entries that failed to parse and
/// names the snapshot does not know come back as [`VvError::SnapshotParse`].
pub fn compute_entity_curve(
    snapshot: &Snapshot,
    entity: &str,
    config: &VelocityConfig,
) -> Result<EntityCurve, VvError> {
    let result = match snapshot.get(entity) {
        Some(series) => compute_velocity_curve(entity, &series.records, config),
        None => {
            let message = snapshot
                .invalid()
                .iter()
                .find(|i| i.entity == entity)
                .map(|i| i.message.clone())
                .unwrap_or_else(|| "entity not present in snapshot".into());
            Err(VvError::SnapshotParse {
                entity: Some(entity.to_string()),
                message,
            })
        }
    };
    if let Err(err) = &result {
        warn!("skipping {}: {}", entity, err);
    }
    result
}

/// Compute every entity of a snapshot independently. Entity order follows the
/// snapshot; entries that failed to parse come last.
pub fn compute_snapshot_curves(
    snapshot: &Snapshot,
    config: &VelocityConfig,
) -> Vec<(String, Result<EntityCurve, VvError>)> {
    snapshot
        .entity_names()
        .into_iter()
        .map(|name| {
            let result = compute_entity_curve(snapshot, &name, config);
            (name, result)
        })
        .collect()
}
