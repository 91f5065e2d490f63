//! Repair of cumulative series that decrease.
//!
//! Upstream counts are occasionally revised downward. A cumulative series
//! must never decrease, so each value is replaced by the running maximum
//! of everything before it (starting from zero).

use covid_map_series_models::TimeSeries;

/// Makes every county's sequence non-decreasing and non-negative.
///
/// Idempotent: validating an already valid series returns it unchanged.
#[must_use]
pub fn validate(mut series: TimeSeries) -> TimeSeries {
    for values in series.values_mut() {
        validate_sequence(values);
    }
    series
}

/// Applies the running-maximum repair to a single sequence in place.
///
/// A `NaN` poisons the running maximum from that point on.
pub fn validate_sequence(values: &mut [f64]) {
    let mut running_max = 0.0_f64;
    for value in values.iter_mut() {
        running_max = if value.is_nan() || running_max.is_nan() {
            f64::NAN
        } else {
            value.max(running_max)
        };
        *value = running_max;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use covid_map_series_models::CountyFips;

    fn single(values: Vec<f64>) -> TimeSeries {
        let mut series = TimeSeries::new();
        series.insert(CountyFips::parse("00001").unwrap(), values);
        series
    }

    /// Deterministic pseudo-random walk with frequent downward revisions.
    fn noisy_sequence(seed: u64, len: usize) -> Vec<f64> {
        let mut state = seed;
        let mut value = 0.0;
        (0..len)
            .map(|_| {
                state = state
                    .wrapping_mul(6_364_136_223_846_793_005)
                    .wrapping_add(1_442_695_040_888_963_407);
                #[allow(clippy::cast_precision_loss)]
                let step = ((state >> 33) % 21) as f64 - 8.0;
                value += step;
                value
            })
            .collect()
    }

    #[test]
    fn repairs_downward_revision() {
        let validated = validate(single(vec![10.0, 10.0, 15.0, 14.0]));
        assert_eq!(validated.values().next().unwrap(), &vec![10.0, 10.0, 15.0, 15.0]);
    }

    #[test]
    fn clamps_negative_values_to_zero() {
        let validated = validate(single(vec![-3.0, 2.0, -1.0]));
        assert_eq!(validated.values().next().unwrap(), &vec![0.0, 2.0, 2.0]);
    }

    #[test]
    fn output_is_non_decreasing() {
        for seed in 0..20 {
            let validated = validate(single(noisy_sequence(seed, 200)));
            let values = validated.values().next().unwrap();
            assert!(values[0] >= 0.0);
            assert!(values.windows(2).all(|w| w[1] >= w[0]), "seed {seed}");
        }
    }

    #[test]
    fn is_idempotent() {
        for seed in 0..20 {
            let once = validate(single(noisy_sequence(seed, 200)));
            let twice = validate(once.clone());
            assert_eq!(once, twice, "seed {seed}");
        }
    }

    #[test]
    fn counties_are_independent() {
        let mut series = single(vec![5.0, 1.0]);
        series.insert(CountyFips::parse("00002").unwrap(), vec![1.0, 5.0]);
        let validated = validate(series);
        let mut values = validated.values();
        assert_eq!(values.next().unwrap(), &vec![5.0, 5.0]);
        assert_eq!(values.next().unwrap(), &vec![1.0, 5.0]);
    }

    #[test]
    fn nan_propagates() {
        let validated = validate(single(vec![1.0, f64::NAN, 3.0]));
        let values = validated.values().next().unwrap();
        assert!((values[0] - 1.0).abs() < f64::EPSILON);
        assert!(values[1].is_nan());
        assert!(values[2].is_nan());
    }
}
