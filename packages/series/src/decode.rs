//! Decoding of the upstream county CSV documents.
//!
//! The time-series files lay out one county per row:
//!
//! ```text
//! countyFIPS,County Name,State,StateFIPS,1/22/20,1/23/20,...
//! 1001,Autauga County,AL,1,0,0,...
//! ```
//!
//! and the population file is `countyFIPS,County Name,State,population`.
//! Rows whose identifier is not a four- or five-digit county code (the
//! statewide "unallocated" rows use `0`) are skipped.

use chrono::NaiveDate;
use covid_map_series_models::{CountyFips, DateAxis, PopulationTable, TimeSeries};

use crate::DecodeError;
use crate::validate::validate;

/// First column holding a date in the time-series files.
pub const DATA_START_COLUMN: usize = 4;

/// Column holding the population in the population file.
pub const POPULATION_COLUMN: usize = 3;

fn reader(text: &str) -> csv::Reader<&[u8]> {
    csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes())
}

/// Parses a date header cell (`1/22/20`, `1/22/2020` or `2020-01-22`).
#[must_use]
pub fn parse_header_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(date);
    }
    let year_len = s.rsplit('/').next().map_or(0, str::len);
    let format = if year_len == 2 { "%m/%d/%y" } else { "%m/%d/%Y" };
    NaiveDate::parse_from_str(s, format).ok()
}

/// Parses a value cell. Empty cells count as zero; anything else that is
/// not a number becomes `NaN` so the bad value stays visible downstream.
#[must_use]
pub fn parse_value(s: &str) -> f64 {
    let s = s.trim();
    if s.is_empty() {
        return 0.0;
    }
    s.parse().unwrap_or(f64::NAN)
}

/// Decodes a cumulative time-series document into its date axis and
/// validated per-county series.
///
/// Every series is exactly as long as the date axis: short rows are padded
/// with `NaN`, long rows truncated.
///
/// # Errors
///
/// Returns [`DecodeError`] if the CSV is unreadable, has no header, or the
/// date headers are unparseable or not strictly increasing.
pub fn decode_cumulative(text: &str) -> Result<(DateAxis, TimeSeries), DecodeError> {
    let mut reader = reader(text);

    let headers = reader.headers()?.clone();
    if headers.is_empty() {
        return Err(DecodeError::MissingHeader);
    }

    // Some exports end every line with a comma.
    let mut date_cells: Vec<&str> = headers.iter().skip(DATA_START_COLUMN).collect();
    while date_cells.last().is_some_and(|cell| cell.trim().is_empty()) {
        date_cells.pop();
    }

    let mut dates: DateAxis = Vec::with_capacity(date_cells.len());
    for (offset, cell) in date_cells.iter().enumerate() {
        let column = DATA_START_COLUMN + offset;
        let date = parse_header_date(cell).ok_or_else(|| DecodeError::InvalidDate {
            column,
            value: (*cell).to_string(),
        })?;
        if dates.last().is_some_and(|previous| *previous >= date) {
            return Err(DecodeError::NonIncreasingDates { column });
        }
        dates.push(date);
    }

    let mut series = TimeSeries::new();
    let mut skipped = 0usize;

    for record in reader.records() {
        let record = record?;
        let Some(fips) = record.get(0).and_then(CountyFips::parse) else {
            skipped += 1;
            continue;
        };

        let values: Vec<f64> = (0..dates.len())
            .map(|i| {
                record
                    .get(DATA_START_COLUMN + i)
                    .map_or(f64::NAN, parse_value)
            })
            .collect();

        series.insert(fips, values);
    }

    log::debug!(
        "Decoded {} counties over {} dates ({skipped} non-county rows skipped)",
        series.len(),
        dates.len()
    );

    Ok((dates, validate(series)))
}

/// Decodes the county population document.
///
/// Missing, non-numeric, or negative populations are recorded as `0`.
///
/// # Errors
///
/// Returns [`DecodeError`] if the CSV is unreadable or has no header.
pub fn decode_populations(text: &str) -> Result<PopulationTable, DecodeError> {
    let mut reader = reader(text);

    if reader.headers()?.is_empty() {
        return Err(DecodeError::MissingHeader);
    }

    let mut populations = PopulationTable::new();

    for record in reader.records() {
        let record = record?;
        let Some(fips) = record.get(0).and_then(CountyFips::parse) else {
            continue;
        };
        let population = record
            .get(POPULATION_COLUMN)
            .map_or(0, parse_population);
        populations.insert(fips, population);
    }

    log::debug!("Decoded populations for {} counties", populations.len());

    Ok(populations)
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn parse_population(s: &str) -> u64 {
    let s = s.trim();
    if let Ok(n) = s.parse::<u64>() {
        return n;
    }
    match s.parse::<f64>() {
        Ok(n) if n.is_finite() && n > 0.0 => n.round() as u64,
        _ => 0,
    }
}
