//! Terminal rendering: logger setup and `indicatif` progress bars.
//!
//! [`init_logger`] routes `log` output through `indicatif-log-bridge` so
//! that log lines and progress bars never fight for the terminal.

use std::time::Duration;

use covid_map_playback::{Frame, FrameSink, format_date};
use covid_map_series_models::{CountyFips, DatasetIdentity};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

/// Initializes the global logger wrapped in `indicatif-log-bridge` so that
/// `log::info!` and friends are suspended while progress bars redraw.
///
/// Returns the [`MultiProgress`] that all progress bars must be added to.
#[must_use]
pub fn init_logger() -> MultiProgress {
    let multi = MultiProgress::new();

    let logger = pretty_env_logger::formatted_builder()
        .parse_env("RUST_LOG")
        .build();
    let level = logger.filter();

    indicatif_log_bridge::LogWrapper::new(multi.clone(), logger)
        .try_init()
        .ok();

    log::set_max_level(level);

    multi
}

/// A spinner shown while a dataset is fetched and derived.
#[must_use]
pub fn loading_spinner(multi: &MultiProgress, message: &str) -> ProgressBar {
    let bar = multi.add(ProgressBar::new_spinner());
    bar.enable_steady_tick(Duration::from_millis(100));
    bar.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    bar.set_message(message.to_string());
    bar
}

/// Renders playback frames as a progress bar labelled with the current
/// date and the county with the highest value.
pub struct PlaybackBar {
    bar: ProgressBar,
}

impl PlaybackBar {
    /// Creates a bar with one step per frame.
    #[must_use]
    pub fn new(multi: &MultiProgress, identity: DatasetIdentity, frames: usize) -> Self {
        let bar = multi.add(ProgressBar::new(frames as u64));
        bar.set_style(
            ProgressStyle::with_template("{prefix} {wide_bar:.green/dim} {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("##-"),
        );
        bar.set_prefix(identity.to_string());
        Self { bar }
    }

    /// A handle to the underlying bar, for finishing it after playback.
    #[must_use]
    pub fn handle(&self) -> ProgressBar {
        self.bar.clone()
    }
}

impl FrameSink for PlaybackBar {
    fn show(&mut self, frame: Frame) {
        let date = format_date(frame.date);
        let message = match peak(&frame) {
            Some((fips, value)) => format!("{date}  peak {fips} = {value:.4}"),
            None => date,
        };
        self.bar.set_position(frame.index as u64 + 1);
        self.bar.set_message(message);
    }
}

/// The county with the highest value in `frame`, skipping `NaN`.
#[must_use]
pub fn peak(frame: &Frame) -> Option<(&CountyFips, f64)> {
    frame
        .values
        .iter()
        .filter(|(_, value)| !value.is_nan())
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(fips, value)| (fips, *value))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::NaiveDate;

    use super::*;

    fn frame(values: &[(&str, f64)]) -> Frame {
        Frame {
            index: 0,
            date: NaiveDate::from_ymd_opt(2020, 4, 1).unwrap(),
            values: values
                .iter()
                .map(|(fips, value)| (CountyFips::parse(fips).unwrap(), *value))
                .collect::<BTreeMap<_, _>>(),
        }
    }

    #[test]
    fn peak_skips_nan() {
        let frame = frame(&[("01001", 3.0), ("01003", f64::NAN), ("01005", 7.5)]);
        let (fips, value) = peak(&frame).unwrap();
        assert_eq!(fips.as_str(), "01005");
        assert!((value - 7.5).abs() < f64::EPSILON);
    }

    #[test]
    fn peak_of_empty_or_all_nan_frame() {
        assert!(peak(&frame(&[])).is_none());
        assert!(peak(&frame(&[("01001", f64::NAN)])).is_none());
    }
}
