use crate::{NegativeDeltaPolicy, NormalizedSeries, RateSample, Rejection, VelocityConfig};

/// Counts of the edge-case policies applied while computing rates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RateTally {
    pub clamped_negative: usize,
    pub rejected_negative: usize,
    pub rejected_outliers: usize,
    pub zero_elapsed: usize,
}

/// One rate per consecutive pair of records, stamped with the later record's
/// time. Rejected samples stay in the output (flagged) so the result always
/// has `len - 1` entries.
pub fn compute_rates(
    series: &NormalizedSeries,
    config: &VelocityConfig,
) -> (Vec<RateSample>, RateTally) {
    let records = series.records();
    let mut tally = RateTally::default();
    let mut out = Vec::with_capacity(records.len().saturating_sub(1));

    for pair in records.windows(2) {
        let (prev, cur) = (pair[0], pair[1]);
        let elapsed_min = (cur.timestamp - prev.timestamp).num_milliseconds() as f64 / 60_000.0;
        let delta = cur.count as f64 - prev.count as f64;

        let mut rejection = None;
        let rate = if elapsed_min <= 0.0 {
            tally.zero_elapsed += 1;
            0.0
        } else if delta < 0.0 {
            match config.negative_delta_policy {
                NegativeDeltaPolicy::ClampToZero => {
                    tally.clamped_negative += 1;
                    0.0
                }
                NegativeDeltaPolicy::Reject => {
                    tally.rejected_negative += 1;
                    rejection = Some(Rejection::NegativeDelta);
                    delta / elapsed_min
                }
            }
        } else {
            delta / elapsed_min
        };

        if rejection.is_none() {
            if let Some(ceiling) = config.rate_outlier_ceiling {
                if rate > ceiling {
                    tally.rejected_outliers += 1;
                    rejection = Some(Rejection::AboveCeiling);
                }
            }
        }

        out.push(RateSample {
            timestamp: cur.timestamp,
            rate_per_minute: rate,
            rejection,
        });
    }

    (out, tally)
}

pub fn usable_samples(samples: &[RateSample]) -> Vec<RateSample> {
    samples.iter().copied().filter(RateSample::is_usable).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{normalize_series, RawRecord};
    use chrono::{Duration, TimeZone, Utc};

    fn series(points: &[(i64, u64)]) -> NormalizedSeries {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let records: Vec<RawRecord> = points
            .iter()
            .map(|&(s, c)| RawRecord::new(base + Duration::seconds(s), c))
            .collect();
        normalize_series(&records).unwrap()
    }

    #[test]
    fn one_sample_per_pair_in_order() {
        let s = series(&[(0, 100), (60, 110), (120, 125), (150, 130)]);
        let (rates, _) = compute_rates(&s, &VelocityConfig::default());
        assert_eq!(rates.len(), s.len() - 1);
        assert!(rates.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
        assert_eq!(rates[0].rate_per_minute, 10.0);
        assert_eq!(rates[1].rate_per_minute, 15.0);
        assert_eq!(rates[2].rate_per_minute, 10.0);
    }

    #[test]
    fn clamp_policy_never_goes_negative() {
        let s = series(&[(0, 100), (60, 90), (120, 150), (180, 140)]);
        let (rates, tally) = compute_rates(&s, &VelocityConfig::default());
        assert_eq!(rates.len(), 3);
        assert!(rates.iter().all(|r| r.rate_per_minute >= 0.0));
        assert!(rates.iter().all(RateSample::is_usable));
        assert_eq!(tally.clamped_negative, 2);
    }

    #[test]
    fn reject_policy_flags_decreases() {
        let config = VelocityConfig {
            negative_delta_policy: NegativeDeltaPolicy::Reject,
            ..VelocityConfig::default()
        };
        let s = series(&[(0, 100), (60, 90), (120, 150)]);
        let (rates, tally) = compute_rates(&s, &config);
        assert_eq!(rates.len(), 2);
        assert_eq!(rates[0].rejection, Some(Rejection::NegativeDelta));
        assert_eq!(tally.rejected_negative, 1);
        let usable = usable_samples(&rates);
        assert_eq!(usable.len(), 1);
        assert_eq!(usable[0].rate_per_minute, 60.0);
    }

    #[test]
    fn rates_above_ceiling_are_outliers() {
        let s = series(&[(0, 0), (60, 500_000), (120, 500_010)]);
        let (rates, tally) = compute_rates(&s, &VelocityConfig::default());
        assert_eq!(rates[0].rejection, Some(Rejection::AboveCeiling));
        assert!(rates[1].is_usable());
        assert_eq!(tally.rejected_outliers, 1);

        let no_ceiling = VelocityConfig {
            rate_outlier_ceiling: None,
            ..VelocityConfig::default()
        };
        let (rates, _) = compute_rates(&s, &no_ceiling);
        assert!(rates.iter().all(RateSample::is_usable));
    }

    #[test]
    fn sub_minute_intervals_scale_up() {
        let s = series(&[(0, 0), (30, 10)]);
        let (rates, _) = compute_rates(&s, &VelocityConfig::default());
        assert_eq!(rates[0].rate_per_minute, 20.0);
    }
}
