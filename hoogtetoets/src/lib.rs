//! Settlement projection and fill requirement computation for dike elevation
//! assessment ("hoogtetoets").
//!
//! The pipeline runs survey table -> settlement filter -> projection -> fill
//! -> colour mapping. Every stage is a pure function over the previous
//! stage's output plus explicit parameters.

use chrono::{Datelike, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod assessment;
pub mod color;
pub mod fill;
pub mod geo;
pub mod projection;
pub mod settlement;
pub mod survey;
pub mod table;

pub use assessment::{
    assess, Assessment, AssessmentRequest, FillMap, MapPoint, Stage, StageWarning,
};
pub use color::{color_for, Rgb};
pub use fill::{fill_required, FillResult};
pub use geo::{CoordinateTransform, GeoPoint, RdNewApprox};
pub use projection::{project, PlanningHorizon, ProjectionResult, ProjectionSettings};
pub use settlement::{
    ClipRange, FilteredSettlement, RangeControl, SettlementColumn, SettlementSelection,
    SliderDomain,
};
pub use survey::{DatasetCache, FileIdentity, GeoStatus, Survey};
pub use table::{DataTable, ElevationProfile};

/// Epoch of the `z5` survey; settlement is projected forward from here.
pub const BASE_YEAR: i32 = 2023;
/// Default dike-table height (m) below which fill is required.
pub const DEFAULT_THRESHOLD_M: f64 = -0.4;
/// Planning periods the user may choose from.
pub const HORIZON_CATALOG: [u32; 6] = [5, 10, 15, 20, 25, 30];
pub const DEFAULT_HORIZONS: [u32; 4] = [5, 10, 15, 30];

#[derive(Error, Debug, Clone, PartialEq)]
pub enum HtError {
    #[error("missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),
    #[error("exactly one settlement series must be selected, got {selected}")]
    Selection { selected: usize },
    #[error("coordinate transform failed: {0}")]
    Transform(String),
    #[error("failed to parse CSV: {0}")]
    CsvParse(String),
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Params {
    pub threshold_m: f64,
    pub base_year: i32,
    /// `None` means the current calendar year.
    pub reference_year: Option<i32>,
    pub horizons: Vec<u32>,
    pub clip_min: f64,
    pub clip_max: f64,
    pub selection: Vec<SettlementColumn>,
    pub min_slider: SliderDomain,
    pub max_slider: SliderDomain,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            threshold_m: DEFAULT_THRESHOLD_M,
            base_year: BASE_YEAR,
            reference_year: None,
            horizons: DEFAULT_HORIZONS.to_vec(),
            clip_min: ClipRange::DEFAULT.min(),
            clip_max: ClipRange::DEFAULT.max(),
            selection: SettlementColumn::ALL.to_vec(),
            min_slider: SliderDomain::SWELL,
            max_slider: SliderDomain::SETTLEMENT,
        }
    }
}

impl Params {
    /// Parse a JSON parameter document; absent keys keep their defaults.
    pub fn from_json_str(text: &str) -> Result<Self, HtError> {
        serde_json::from_str(text).map_err(|e| HtError::InvalidParameter(e.to_string()))
    }

    pub fn reference_year(&self) -> i32 {
        self.reference_year.unwrap_or_else(|| Utc::now().year())
    }

    pub fn clip_range(&self) -> Result<ClipRange, HtError> {
        ClipRange::new(self.clip_min, self.clip_max)
    }

    pub fn planning_horizons(&self) -> Result<Vec<PlanningHorizon>, HtError> {
        PlanningHorizon::from_catalog_list(&self.horizons)
    }

    pub fn settlement_selection(&self) -> SettlementSelection {
        SettlementSelection::new(self.selection.iter().copied())
    }

    pub fn range_control(&self) -> Result<RangeControl, HtError> {
        Ok(RangeControl::new(
            self.clip_range()?,
            self.min_slider,
            self.max_slider,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_params() {
        let params = Params::default();
        assert_eq!(params.threshold_m, -0.4);
        assert_eq!(params.base_year, 2023);
        assert_eq!(params.horizons, vec![5, 10, 15, 30]);
        assert_eq!(params.clip_range().unwrap(), ClipRange::DEFAULT);
        assert_eq!(params.settlement_selection().len(), 3);
    }

    #[test]
    fn test_params_from_partial_json() {
        let params =
            Params::from_json_str(r#"{"threshold_m": 1.5, "selection": ["agz45"]}"#).unwrap();
        assert_eq!(params.threshold_m, 1.5);
        assert_eq!(params.base_year, BASE_YEAR);
        assert_eq!(
            params.settlement_selection().require_single().unwrap(),
            SettlementColumn::Agz45
        );
    }

    #[test]
    fn test_params_rejects_bad_json() {
        let err = Params::from_json_str("{not json").unwrap_err();
        assert!(matches!(err, HtError::InvalidParameter(_)));
    }

    #[test]
    fn test_explicit_reference_year() {
        let params = Params {
            reference_year: Some(2030),
            ..Params::default()
        };
        assert_eq!(params.reference_year(), 2030);
    }

    #[test]
    fn test_error_messages_name_columns() {
        let err = HtError::MissingColumns(vec!["agz34".into(), "z5".into()]);
        assert_eq!(err.to_string(), "missing required columns: agz34, z5");
    }
}
