//! Pure transforms between series representations.
//!
//! Each transform works county by county over the full sequence and keeps
//! the date axis unchanged. None of them fetch or validate their input;
//! ordering the steps is the dataset store's job.

use std::borrow::Cow;

use covid_map_series_models::{PopulationTable, TimeSeries, TrailingWindow};

use crate::average::TrailingAverage;

/// Converts a cumulative series into day-over-day change.
///
/// The first element is the day-zero cumulative value itself, not zero.
#[must_use]
pub fn to_change(cumulative: &TimeSeries) -> TimeSeries {
    cumulative
        .iter()
        .map(|(fips, values)| {
            let change = values
                .iter()
                .enumerate()
                .map(|(i, value)| if i > 0 { value - values[i - 1] } else { *value })
                .collect();
            (fips.clone(), change)
        })
        .collect()
}

/// Divides each county's series by its population.
///
/// Counties with a population of zero, or missing from the table, are kept
/// and valued `0` throughout.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn to_per_capita(total: &TimeSeries, populations: &PopulationTable) -> TimeSeries {
    total
        .iter()
        .map(|(fips, values)| {
            let population = populations.get(fips).copied().unwrap_or(0);
            let per_capita = if population > 0 {
                let population = population as f64;
                values.iter().map(|value| value / population).collect()
            } else {
                vec![0.0; values.len()]
            };
            (fips.clone(), per_capita)
        })
        .collect()
}

/// Replaces each value with the mean of the last `window` values ending at
/// it, ramping up over the first `window - 1` dates.
///
/// A window of one is the identity and borrows the input unchanged.
#[must_use]
pub fn to_trailing_average(series: &TimeSeries, window: TrailingWindow) -> Cow<'_, TimeSeries> {
    if window.is_base() {
        return Cow::Borrowed(series);
    }

    Cow::Owned(
        series
            .iter()
            .map(|(fips, values)| {
                let mut buffer = TrailingAverage::with_len_hint(window, values.len());
                let averaged = values.iter().map(|value| buffer.update(*value)).collect();
                (fips.clone(), averaged)
            })
            .collect(),
    )
}
