#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Frame-by-frame playback of a dataset across its date axis.
//!
//! A [`PlaybackController`] hands out generation tokens. Starting a new
//! playback bumps the generation, and a running playback checks its token
//! before every frame, so the older one stops as soon as it notices.

use std::collections::BTreeMap;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::NaiveDate;
use covid_map_series_models::{CountyFips, Dataset};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Frames per second used when the caller has no preference.
pub const DEFAULT_FRAME_RATE: NonZeroU32 = match NonZeroU32::new(10) {
    Some(rate) => rate,
    None => NonZeroU32::MIN,
};

/// Every county's value on one date.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Position on the dataset's date axis.
    pub index: usize,
    /// The date shown.
    pub date: NaiveDate,
    /// Value per county on that date.
    pub values: BTreeMap<CountyFips, f64>,
}

/// Extracts the frame at `index`, or `None` past the end of the date axis.
#[must_use]
pub fn frame_at(dataset: &Dataset, index: usize) -> Option<Frame> {
    let date = *dataset.dates.get(index)?;
    let values = dataset
        .series
        .iter()
        .filter_map(|(fips, series)| series.get(index).map(|value| (fips.clone(), *value)))
        .collect();

    Some(Frame {
        index,
        date,
        values,
    })
}

/// Renders a date the way the map's date label shows it, e.g. `22 Jan 2020`.
#[must_use]
pub fn format_date(date: NaiveDate) -> String {
    date.format("%d %b %Y").to_string()
}

/// Receives frames from a running playback.
pub trait FrameSink: Send + 'static {
    /// Displays one frame.
    fn show(&mut self, frame: Frame);
}

impl<F> FrameSink for F
where
    F: FnMut(Frame) + Send + 'static,
{
    fn show(&mut self, frame: Frame) {
        self(frame);
    }
}

/// How a playback ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackOutcome {
    /// Every frame was shown.
    Completed {
        /// Number of frames shown.
        frames: usize,
    },
    /// A newer playback started (or the controller was stopped) first.
    Superseded {
        /// Number of frames shown before stopping.
        frames: usize,
    },
}

/// Ticket for one playback. Valid until a newer one is issued.
#[derive(Debug, Clone)]
pub struct PlaybackToken {
    current: Arc<AtomicU64>,
    generation: u64,
}

impl PlaybackToken {
    /// Whether no newer playback has started since this token was issued.
    #[must_use]
    pub fn is_current(&self) -> bool {
        self.current.load(Ordering::SeqCst) == self.generation
    }

    /// The generation this token belongs to.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }
}

/// Issues playback tokens and runs playbacks. Clones share one generation
/// counter.
#[derive(Debug, Clone, Default)]
pub struct PlaybackController {
    current: Arc<AtomicU64>,
}

impl PlaybackController {
    /// Creates a controller with no playback running.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a new generation, invalidating every earlier token.
    #[must_use]
    pub fn begin(&self) -> PlaybackToken {
        let generation = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        PlaybackToken {
            current: Arc::clone(&self.current),
            generation,
        }
    }

    /// Stops whatever playback is running without starting another.
    pub fn stop(&self) {
        self.current.fetch_add(1, Ordering::SeqCst);
    }

    /// Plays `dataset` into `sink` at `frame_rate` frames per second,
    /// superseding any earlier playback.
    ///
    /// The first frame is shown immediately. Must be called from within a
    /// tokio runtime.
    pub fn play<S: FrameSink>(
        &self,
        dataset: Arc<Dataset>,
        frame_rate: NonZeroU32,
        sink: S,
    ) -> JoinHandle<PlaybackOutcome> {
        let token = self.begin();
        log::debug!(
            "Starting playback {} of {} ({} frames at {frame_rate} fps)",
            token.generation(),
            dataset.identity,
            dataset.date_count()
        );
        tokio::spawn(run(token, dataset, frame_interval(frame_rate), sink))
    }
}

fn frame_interval(frame_rate: NonZeroU32) -> Duration {
    (Duration::from_secs(1) / frame_rate.get()).max(Duration::from_nanos(1))
}

async fn run<S: FrameSink>(
    token: PlaybackToken,
    dataset: Arc<Dataset>,
    interval: Duration,
    mut sink: S,
) -> PlaybackOutcome {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut shown = 0;
    for index in 0..dataset.date_count() {
        ticker.tick().await;

        if !token.is_current() {
            log::debug!(
                "Playback {} superseded after {shown} frames",
                token.generation()
            );
            return PlaybackOutcome::Superseded { frames: shown };
        }

        let Some(frame) = frame_at(&dataset, index) else {
            break;
        };
        sink.show(frame);
        shown += 1;
    }

    PlaybackOutcome::Completed { frames: shown }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use covid_map_series_models::{DatasetIdentity, Quantity, TimeSeries};

    use super::*;

    fn fips(s: &str) -> CountyFips {
        CountyFips::parse(s).unwrap()
    }

    fn dataset(days: u32) -> Arc<Dataset> {
        let start = NaiveDate::from_ymd_opt(2020, 1, 22).unwrap();
        let dates = (0..days)
            .map(|i| start + chrono::Days::new(u64::from(i)))
            .collect();
        let mut series = TimeSeries::new();
        series.insert(fips("01001"), (0..days).map(f64::from).collect());
        series.insert(fips("01003"), (0..days).map(|i| f64::from(i * 2)).collect());

        Arc::new(Dataset {
            identity: DatasetIdentity::base(Quantity::Cases),
            dates: Arc::new(dates),
            series,
        })
    }

    fn fast() -> NonZeroU32 {
        NonZeroU32::new(1000).unwrap()
    }

    #[test]
    fn frame_holds_one_date_across_counties() {
        let frame = frame_at(&dataset(5), 3).unwrap();
        assert_eq!(frame.index, 3);
        assert_eq!(frame.date, NaiveDate::from_ymd_opt(2020, 1, 25).unwrap());
        assert_eq!(frame.values[&fips("01001")], 3.0);
        assert_eq!(frame.values[&fips("01003")], 6.0);
    }

    #[test]
    fn frame_past_end_is_none() {
        assert!(frame_at(&dataset(5), 5).is_none());
    }

    #[test]
    fn date_label_format() {
        let date = NaiveDate::from_ymd_opt(2020, 3, 5).unwrap();
        assert_eq!(format_date(date), "05 Mar 2020");
    }

    #[test]
    fn newer_token_invalidates_older() {
        let controller = PlaybackController::new();
        let first = controller.begin();
        assert!(first.is_current());

        let second = controller.clone().begin();
        assert!(!first.is_current());
        assert!(second.is_current());

        controller.stop();
        assert!(!second.is_current());
    }

    #[tokio::test]
    async fn plays_every_frame_in_order() {
        let controller = PlaybackController::new();
        let shown = Arc::new(Mutex::new(Vec::new()));
        let sink = {
            let shown = Arc::clone(&shown);
            move |frame: Frame| shown.lock().unwrap().push(frame.index)
        };

        let outcome = controller.play(dataset(6), fast(), sink).await.unwrap();

        assert_eq!(outcome, PlaybackOutcome::Completed { frames: 6 });
        assert_eq!(*shown.lock().unwrap(), vec![0, 1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn empty_dataset_completes_immediately() {
        let controller = PlaybackController::new();
        let outcome = controller
            .play(dataset(0), fast(), |_frame: Frame| {})
            .await
            .unwrap();
        assert_eq!(outcome, PlaybackOutcome::Completed { frames: 0 });
    }

    #[tokio::test]
    async fn superseded_playback_emits_no_further_frames() {
        let controller = PlaybackController::new();
        let shown = Arc::new(Mutex::new(Vec::new()));

        // Start a newer playback from inside the sink once frame 1 is shown.
        let first = {
            let shown = Arc::clone(&shown);
            let newer = controller.clone();
            controller.play(dataset(10), fast(), move |frame: Frame| {
                shown.lock().unwrap().push(frame.index);
                if frame.index == 1 {
                    let _ = newer.begin();
                }
            })
        };

        assert_eq!(
            first.await.unwrap(),
            PlaybackOutcome::Superseded { frames: 2 }
        );
        assert_eq!(*shown.lock().unwrap(), vec![0, 1]);
    }

    #[tokio::test]
    async fn stop_ends_running_playback() {
        let controller = PlaybackController::new();
        let handle = controller.play(
            dataset(1000),
            NonZeroU32::new(20).unwrap(),
            |_frame: Frame| {},
        );
        tokio::time::sleep(Duration::from_millis(120)).await;
        controller.stop();

        match handle.await.unwrap() {
            PlaybackOutcome::Superseded { frames } => assert!(frames < 1000),
            PlaybackOutcome::Completed { .. } => panic!("playback should have been stopped"),
        }
    }
}
