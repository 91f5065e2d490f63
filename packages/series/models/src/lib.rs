#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! County time-series and dataset identity types.
//!
//! These types are shared by the CSV decoder, the transform pipeline, the
//! dataset store, and the mirror proxy. A dataset is addressed by a
//! [`DatasetIdentity`]: which quantity, which representation, which scale,
//! and which trailing-average window.

use std::collections::BTreeMap;
use std::num::NonZeroU32;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Per-county sequence of values, one per date on the dataset's
/// [`DateAxis`].
pub type TimeSeries = BTreeMap<CountyFips, Vec<f64>>;

/// Strictly increasing calendar dates shared by every series in a dataset.
pub type DateAxis = Vec<NaiveDate>;

/// Resident population per county.
pub type PopulationTable = BTreeMap<CountyFips, u64>;

/// A five-digit, zero-padded county FIPS code (e.g. `"01001"`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CountyFips(String);

impl CountyFips {
    /// Parses a county identifier of exactly four or five ASCII digits,
    /// left-padding it with `0` to five digits.
    ///
    /// Returns `None` for anything else, including the state-level
    /// aggregate rows (`"0"`) found in the upstream CSVs.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if !(4..=5).contains(&s.len()) || !s.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        Some(Self(format!("{s:0>5}")))
    }

    /// Returns the padded code.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CountyFips {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for CountyFips {
    type Error = InvalidFipsError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or(InvalidFipsError { value })
    }
}

impl From<CountyFips> for String {
    fn from(fips: CountyFips) -> Self {
        fips.0
    }
}

/// Error returned when a string is not a four- or five-digit county code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidFipsError {
    /// The rejected input.
    pub value: String,
}

impl std::fmt::Display for InvalidFipsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid county FIPS code {:?}: expected 4-5 digits", self.value)
    }
}

impl std::error::Error for InvalidFipsError {}

/// Which count a dataset tracks.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Quantity {
    /// Confirmed cases.
    Cases,
    /// Deaths.
    Deaths,
}

impl Quantity {
    /// All quantities, in flag order.
    pub const ALL: &[Self] = &[Self::Cases, Self::Deaths];

    /// Bit contributed to a dataset flag.
    #[must_use]
    pub const fn flag(self) -> u8 {
        match self {
            Self::Cases => 0,
            Self::Deaths => 1,
        }
    }
}

/// Whether values accumulate over time or are day-over-day deltas.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Representation {
    /// Running total.
    Cumulative,
    /// Day-over-day change.
    Change,
}

impl Representation {
    /// All representations, in flag order.
    pub const ALL: &[Self] = &[Self::Cumulative, Self::Change];

    /// Bit contributed to a dataset flag.
    #[must_use]
    pub const fn flag(self) -> u8 {
        match self {
            Self::Cumulative => 0,
            Self::Change => 2,
        }
    }
}

/// Whether values are raw totals or divided by county population.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Scale {
    /// Raw counts.
    Total,
    /// Counts divided by population.
    PerCapita,
}

impl Scale {
    /// All scales, in flag order.
    pub const ALL: &[Self] = &[Self::Total, Self::PerCapita];

    /// Bit contributed to a dataset flag.
    #[must_use]
    pub const fn flag(self) -> u8 {
        match self {
            Self::Total => 0,
            Self::PerCapita => 4,
        }
    }
}

/// Number of trailing observations averaged together. Always positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct TrailingWindow(NonZeroU32);

impl TrailingWindow {
    /// The un-smoothed window. Averaging over one value is the identity.
    pub const BASE: Self = Self(NonZeroU32::MIN);

    /// Creates a window of `size` observations.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidWindowError`] if `size` is zero.
    pub const fn new(size: u32) -> Result<Self, InvalidWindowError> {
        match NonZeroU32::new(size) {
            Some(size) => Ok(Self(size)),
            None => Err(InvalidWindowError { size }),
        }
    }

    /// Returns the window size.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0.get()
    }

    /// Whether this is the un-smoothed window of size 1.
    #[must_use]
    pub const fn is_base(self) -> bool {
        self.0.get() == 1
    }
}

impl Default for TrailingWindow {
    fn default() -> Self {
        Self::BASE
    }
}

impl TryFrom<u32> for TrailingWindow {
    type Error = InvalidWindowError;

    fn try_from(size: u32) -> Result<Self, Self::Error> {
        Self::new(size)
    }
}

impl From<TrailingWindow> for u32 {
    fn from(window: TrailingWindow) -> Self {
        window.get()
    }
}

impl std::fmt::Display for TrailingWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error returned when a trailing window of zero is requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidWindowError {
    /// The rejected window size.
    pub size: u32,
}

impl std::fmt::Display for InvalidWindowError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "invalid trailing window {}: expected a positive integer",
            self.size
        )
    }
}

impl std::error::Error for InvalidWindowError {}

/// Error returned when a dataset flag falls outside `0..=MAX_FLAG`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidFlagError {
    /// The rejected flag.
    pub flag: u8,
}

impl std::fmt::Display for InvalidFlagError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "unknown dataset flag {}: expected 0-{}",
            self.flag,
            DatasetIdentity::MAX_FLAG
        )
    }
}

impl std::error::Error for InvalidFlagError {}

/// The cache key for a derived dataset.
///
/// Two identities are equal iff all four fields are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetIdentity {
    /// Cases or deaths.
    pub quantity: Quantity,
    /// Cumulative or change.
    pub representation: Representation,
    /// Total or per-capita.
    pub scale: Scale,
    /// Trailing-average window.
    pub window: TrailingWindow,
}

impl DatasetIdentity {
    /// Largest flag produced by OR-ing one bit from each dimension.
    pub const MAX_FLAG: u8 = 1 | 2 | 4;

    /// Creates an identity from its four components.
    #[must_use]
    pub const fn new(
        quantity: Quantity,
        representation: Representation,
        scale: Scale,
        window: TrailingWindow,
    ) -> Self {
        Self {
            quantity,
            representation,
            scale,
            window,
        }
    }

    /// The raw decoded dataset for `quantity`: cumulative totals, no
    /// smoothing.
    #[must_use]
    pub const fn base(quantity: Quantity) -> Self {
        Self::new(
            quantity,
            Representation::Cumulative,
            Scale::Total,
            TrailingWindow::BASE,
        )
    }

    /// Decodes a bit flag (quantity | representation | scale) into an
    /// identity with the given window.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidFlagError`] if `flag > MAX_FLAG`.
    pub const fn from_flag(flag: u8, window: TrailingWindow) -> Result<Self, InvalidFlagError> {
        if flag > Self::MAX_FLAG {
            return Err(InvalidFlagError { flag });
        }
        let quantity = if flag & 1 == 0 {
            Quantity::Cases
        } else {
            Quantity::Deaths
        };
        let representation = if flag & 2 == 0 {
            Representation::Cumulative
        } else {
            Representation::Change
        };
        let scale = if flag & 4 == 0 {
            Scale::Total
        } else {
            Scale::PerCapita
        };
        Ok(Self::new(quantity, representation, scale, window))
    }

    /// Returns the bit flag for the quantity, representation and scale.
    #[must_use]
    pub const fn flag(&self) -> u8 {
        self.quantity.flag() | self.representation.flag() | self.scale.flag()
    }

    /// Returns a copy with a different scale.
    #[must_use]
    pub const fn with_scale(mut self, scale: Scale) -> Self {
        self.scale = scale;
        self
    }

    /// Returns a copy with a different representation.
    #[must_use]
    pub const fn with_representation(mut self, representation: Representation) -> Self {
        self.representation = representation;
        self
    }

    /// Returns a copy with a different window.
    #[must_use]
    pub const fn with_window(mut self, window: TrailingWindow) -> Self {
        self.window = window;
        self
    }
}

impl std::fmt::Display for DatasetIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.quantity, self.representation, self.scale, self.window
        )
    }
}

/// A materialized dataset: a date axis and one series per county.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    /// Which derived dataset this is.
    pub identity: DatasetIdentity,
    /// Date axis shared with every dataset derived from the same source.
    pub dates: Arc<DateAxis>,
    /// County series, each `dates.len()` long.
    pub series: TimeSeries,
}

impl Dataset {
    /// Returns the series for a county, if present.
    #[must_use]
    pub fn county(&self, fips: &CountyFips) -> Option<&[f64]> {
        self.series.get(fips).map(Vec::as_slice)
    }

    /// Number of counties in the dataset.
    #[must_use]
    pub fn county_count(&self) -> usize {
        self.series.len()
    }

    /// Number of dates on the axis.
    #[must_use]
    pub fn date_count(&self) -> usize {
        self.dates.len()
    }
}

/// One of the three upstream CSV documents.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Resource {
    /// Cumulative confirmed cases per county per day.
    Cases,
    /// Cumulative deaths per county per day.
    Deaths,
    /// County populations.
    Populations,
}

impl Resource {
    /// All tracked resources.
    pub const ALL: &[Self] = &[Self::Cases, Self::Deaths, Self::Populations];

    /// The time-series resource backing a quantity.
    #[must_use]
    pub const fn for_quantity(quantity: Quantity) -> Self {
        match quantity {
            Quantity::Cases => Self::Cases,
            Quantity::Deaths => Self::Deaths,
        }
    }
}
