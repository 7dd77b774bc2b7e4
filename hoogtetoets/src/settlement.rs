//! Background settlement series, the clip range applied to them and the
//! pending/committed range control.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::table::DataTable;
use crate::HtError;

/// Columns the settlement chart and the projection rely on.
pub const SETTLEMENT_COLUMNS: [&str; 4] = ["l", "agz34", "agz45", "agz35"];

/// Settlement rate between two survey epochs (m/year).
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SettlementColumn {
    Agz34,
    Agz45,
    Agz35,
}

impl SettlementColumn {
    pub const ALL: [SettlementColumn; 3] = [
        SettlementColumn::Agz34,
        SettlementColumn::Agz45,
        SettlementColumn::Agz35,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            SettlementColumn::Agz34 => "agz34",
            SettlementColumn::Agz45 => "agz45",
            SettlementColumn::Agz35 => "agz35",
        }
    }
}

impl fmt::Display for SettlementColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SettlementColumn {
    type Err = HtError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        SettlementColumn::ALL
            .into_iter()
            .find(|c| c.name() == normalized)
            .ok_or_else(|| {
                HtError::InvalidParameter(format!(
                    "unknown settlement series '{}' (expected agz34, agz45 or agz35)",
                    s.trim()
                ))
            })
    }
}

/// The settlement series the user has ticked.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SettlementSelection(BTreeSet<SettlementColumn>);

impl SettlementSelection {
    pub fn new<I: IntoIterator<Item = SettlementColumn>>(columns: I) -> Self {
        Self(columns.into_iter().collect())
    }

    pub fn all() -> Self {
        Self::new(SettlementColumn::ALL)
    }

    pub fn single(column: SettlementColumn) -> Self {
        Self::new([column])
    }

    /// Parse a comma separated list such as `agz34,agz45`. An empty list is an
    /// empty selection, not an error.
    pub fn parse_list(input: &str) -> Result<Self, HtError> {
        input
            .split(',')
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(SettlementColumn::from_str)
            .collect::<Result<BTreeSet<_>, _>>()
            .map(Self)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn columns(&self) -> impl Iterator<Item = SettlementColumn> + '_ {
        self.0.iter().copied()
    }

    /// The projection needs one unambiguous rate.
    pub fn require_single(&self) -> Result<SettlementColumn, HtError> {
        let mut columns = self.columns();
        match (columns.next(), columns.next()) {
            (Some(column), None) => Ok(column),
            _ => Err(HtError::Selection {
                selected: self.len(),
            }),
        }
    }
}

impl fmt::Display for SettlementSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.columns().map(|c| c.name()).collect();
        f.write_str(&names.join(","))
    }
}

/// Committed `[min, max]` bounds applied to the settlement rates.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct ClipRange {
    min: f64,
    max: f64,
}

impl ClipRange {
    pub const DEFAULT: ClipRange = ClipRange {
        min: -0.05,
        max: 0.05,
    };

    pub fn new(min: f64, max: f64) -> Result<Self, HtError> {
        if min.is_nan() || max.is_nan() {
            return Err(HtError::InvalidParameter(
                "clip bounds must be numbers".into(),
            ));
        }
        if min > max {
            return Err(HtError::InvalidParameter(format!(
                "clip minimum {} exceeds maximum {}",
                min, max
            )));
        }
        Ok(Self { min, max })
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    /// NaN passes through unchanged.
    pub fn clip(&self, value: f64) -> f64 {
        value.clamp(self.min, self.max)
    }
}

impl Default for ClipRange {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Domain and step of one range slider.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct SliderDomain {
    pub lower: f64,
    pub upper: f64,
    pub step: f64,
}

impl SliderDomain {
    /// Minimum slider: swell down to -5 cm/year.
    pub const SWELL: SliderDomain = SliderDomain {
        lower: -0.05,
        upper: 0.0,
        step: 0.005,
    };
    /// Maximum slider: settlement up to 5 cm/year.
    pub const SETTLEMENT: SliderDomain = SliderDomain {
        lower: 0.0,
        upper: 0.05,
        step: 0.005,
    };

    /// Clamp into the domain and snap to the step grid anchored at `lower`.
    pub fn snap(&self, value: f64) -> f64 {
        let clamped = value.max(self.lower).min(self.upper);
        if self.step <= 0.0 {
            return clamped;
        }
        let steps = ((clamped - self.lower) / self.step).round();
        let snapped = self.lower + steps * self.step;
        // Trim float noise so 0.015 stays 0.015 on output.
        let snapped = (snapped * 1e9).round() / 1e9;
        snapped.max(self.lower).min(self.upper)
    }
}

/// Slider state: `pending` follows every user edit, `committed` only moves on
/// [`RangeControl::commit`] and is the only value computation reads.
#[derive(Clone, Debug, PartialEq)]
pub struct RangeControl {
    min_domain: SliderDomain,
    max_domain: SliderDomain,
    pending_min: f64,
    pending_max: f64,
    committed: ClipRange,
}

impl RangeControl {
    pub fn new(committed: ClipRange, min_domain: SliderDomain, max_domain: SliderDomain) -> Self {
        Self {
            min_domain,
            max_domain,
            pending_min: committed.min(),
            pending_max: committed.max(),
            committed,
        }
    }

    pub fn set_pending_min(&mut self, value: f64) -> Result<f64, HtError> {
        self.pending_min = snap_input(&self.min_domain, value)?;
        Ok(self.pending_min)
    }

    pub fn set_pending_max(&mut self, value: f64) -> Result<f64, HtError> {
        self.pending_max = snap_input(&self.max_domain, value)?;
        Ok(self.pending_max)
    }

    pub fn pending(&self) -> (f64, f64) {
        (self.pending_min, self.pending_max)
    }

    pub fn committed(&self) -> ClipRange {
        self.committed
    }

    /// True when the sliders show values that have not been applied yet.
    pub fn is_dirty(&self) -> bool {
        self.pending_min != self.committed.min() || self.pending_max != self.committed.max()
    }

    /// Copy pending -> committed. An invalid pending pair leaves the
    /// committed range untouched.
    pub fn commit(&mut self) -> Result<ClipRange, HtError> {
        self.committed = ClipRange::new(self.pending_min, self.pending_max)?;
        Ok(self.committed)
    }
}

impl Default for RangeControl {
    fn default() -> Self {
        Self::new(
            ClipRange::DEFAULT,
            SliderDomain::SWELL,
            SliderDomain::SETTLEMENT,
        )
    }
}

fn snap_input(domain: &SliderDomain, value: f64) -> Result<f64, HtError> {
    if !(domain.lower <= domain.upper) {
        return Err(HtError::InvalidParameter(format!(
            "slider domain {}..{} is empty",
            domain.lower, domain.upper
        )));
    }
    if !value.is_finite() {
        return Err(HtError::InvalidParameter(format!(
            "slider value must be finite, got {}",
            value
        )));
    }
    Ok(domain.snap(value))
}

pub fn clip_series(values: &Array1<f64>, range: ClipRange) -> Array1<f64> {
    values.mapv(|v| range.clip(v))
}

/// Clip one settlement column of the table to `range`.
pub fn filter(
    table: &DataTable,
    column: SettlementColumn,
    range: ClipRange,
) -> Result<Array1<f64>, HtError> {
    table.require(&SETTLEMENT_COLUMNS)?;
    Ok(clip_series(table.column(column.name())?, range))
}

/// Clipped series for every selected column, as shown in the settlement chart.
#[derive(Clone, Debug, Serialize)]
pub struct FilteredSettlement {
    pub range: ClipRange,
    pub series: BTreeMap<SettlementColumn, Array1<f64>>,
}

impl FilteredSettlement {
    pub fn get(&self, column: SettlementColumn) -> Option<&Array1<f64>> {
        self.series.get(&column)
    }
}

pub fn filter_selection(
    table: &DataTable,
    selection: &SettlementSelection,
    range: ClipRange,
) -> Result<FilteredSettlement, HtError> {
    let mut series = BTreeMap::new();
    table.require(&SETTLEMENT_COLUMNS)?;
    for column in selection.columns() {
        series.insert(column, filter(table, column, range)?);
    }
    Ok(FilteredSettlement { range, series })
}
