use crate::RateSample;

/// Centered moving average; windows are clipped at the ends, so every
/// position averages at least its own value.
pub fn centered_moving_average(data: &[f64], window: usize) -> Vec<f64> {
    if window <= 1 {
        return data.to_vec();
    }
    let radius = window / 2;
    let mut out = Vec::with_capacity(data.len());
    for i in 0..data.len() {
        let start = i.saturating_sub(radius);
        let end = (i + radius + 1).min(data.len());
        let slice = &data[start..end];
        out.push(slice.iter().sum::<f64>() / slice.len() as f64);
    }
    out
}

pub fn smooth_samples(samples: &[RateSample], window: usize) -> Vec<RateSample> {
    let rates: Vec<f64> = samples.iter().map(|s| s.rate_per_minute).collect();
    samples
        .iter()
        .zip(centered_moving_average(&rates, window))
        .map(|(sample, rate)| RateSample {
            rate_per_minute: rate,
            ..*sample
        })
        .collect()
}
