//! Linear settlement projection from the `z5` survey epoch to the reference
//! year and on to each planning horizon.

use std::collections::BTreeMap;
use std::fmt;

use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::settlement::{
    clip_series, ClipRange, SettlementColumn, SettlementSelection, SETTLEMENT_COLUMNS,
};
use crate::table::DataTable;
use crate::{HtError, HORIZON_CATALOG};

/// Planning period in whole years.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(try_from = "u32", into = "u32")]
pub struct PlanningHorizon(u32);

impl PlanningHorizon {
    pub fn new(years: u32) -> Result<Self, HtError> {
        if years == 0 {
            return Err(HtError::InvalidParameter(
                "planning horizon must be at least one year".into(),
            ));
        }
        Ok(Self(years))
    }

    /// Only periods from [`HORIZON_CATALOG`] are offered to the user.
    pub fn from_catalog(years: u32) -> Result<Self, HtError> {
        if !HORIZON_CATALOG.contains(&years) {
            return Err(HtError::InvalidParameter(format!(
                "planning horizon {} is not one of {:?}",
                years, HORIZON_CATALOG
            )));
        }
        Self::new(years)
    }

    /// Validate against the catalog, drop duplicates and sort ascending.
    pub fn from_catalog_list(years: &[u32]) -> Result<Vec<Self>, HtError> {
        let mut horizons = years
            .iter()
            .map(|&y| Self::from_catalog(y))
            .collect::<Result<Vec<_>, _>>()?;
        horizons.sort();
        horizons.dedup();
        Ok(horizons)
    }

    pub fn years(&self) -> u32 {
        self.0
    }

    pub fn projection_column(&self) -> String {
        format!("z_planperiode_{}", self.0)
    }

    pub fn fill_column(&self) -> String {
        format!("ophoging_planperiode_{}", self.0)
    }
}

impl TryFrom<u32> for PlanningHorizon {
    type Error = HtError;

    fn try_from(years: u32) -> Result<Self, Self::Error> {
        Self::new(years)
    }
}

impl From<PlanningHorizon> for u32 {
    fn from(horizon: PlanningHorizon) -> Self {
        horizon.0
    }
}

impl fmt::Display for PlanningHorizon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} jaar", self.0)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ProjectionSettings {
    pub reference_year: i32,
    pub base_year: i32,
    pub horizons: Vec<PlanningHorizon>,
}

impl ProjectionSettings {
    /// Years between the `z5` survey and the reference year; negative when
    /// the reference lies before the survey.
    pub fn num_years(&self) -> Result<i32, HtError> {
        self.reference_year
            .checked_sub(self.base_year)
            .ok_or_else(|| {
                HtError::InvalidParameter(format!(
                    "reference year {} is out of range for base year {}",
                    self.reference_year, self.base_year
                ))
            })
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct ProjectionResult {
    pub column: SettlementColumn,
    pub range: ClipRange,
    pub reference_year: i32,
    pub num_years: i32,
    /// Clipped settlement rate used for every row.
    pub rate: Array1<f64>,
    /// Elevation at the reference year.
    pub reference: Array1<f64>,
    pub horizons: BTreeMap<PlanningHorizon, Array1<f64>>,
}

impl ProjectionResult {
    pub fn reference_column(&self) -> String {
        format!("z_{}", self.reference_year)
    }

    pub fn horizon(&self, horizon: PlanningHorizon) -> Option<&Array1<f64>> {
        self.horizons.get(&horizon)
    }
}

/// `z_ref = z5 - rate * num_years`, then `z_pp = z_ref - rate * pp` per horizon.
pub fn project_series(
    z5: &Array1<f64>,
    rate: &Array1<f64>,
    num_years: i32,
    horizons: &[PlanningHorizon],
) -> (Array1<f64>, BTreeMap<PlanningHorizon, Array1<f64>>) {
    let reference = z5 - &(rate * f64::from(num_years));
    let projected = horizons
        .iter()
        .map(|&h| (h, &reference - &(rate * f64::from(h.years()))))
        .collect();
    (reference, projected)
}

/// Project elevations using the single selected settlement series, clipped to
/// the committed `range`.
pub fn project(
    table: &DataTable,
    selection: &SettlementSelection,
    range: ClipRange,
    settings: &ProjectionSettings,
) -> Result<ProjectionResult, HtError> {
    let column = selection.require_single()?;
    let mut required: Vec<&str> = SETTLEMENT_COLUMNS.to_vec();
    required.push("z5");
    table.require(&required)?;

    let rate = clip_series(table.column(column.name())?, range);
    let num_years = settings.num_years()?;
    let (reference, horizons) =
        project_series(table.column("z5")?, &rate, num_years, &settings.horizons);

    Ok(ProjectionResult {
        column,
        range,
        reference_year: settings.reference_year,
        num_years,
        rate,
        reference,
        horizons,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn horizons(years: &[u32]) -> Vec<PlanningHorizon> {
        PlanningHorizon::from_catalog_list(years).unwrap()
    }

    fn settings(reference_year: i32, years: &[u32]) -> ProjectionSettings {
        ProjectionSettings {
            reference_year,
            base_year: 2023,
            horizons: horizons(years),
        }
    }

    fn table() -> DataTable {
        DataTable::from_columns([
            ("l", vec![0.0, 5.0]),
            ("z5", vec![10.0, 4.0]),
            ("agz34", vec![0.01, 0.2]),
            ("agz45", vec![0.0, 0.0]),
            ("agz35", vec![0.02, 0.02]),
        ])
        .unwrap()
    }

    #[test]
    fn test_reference_and_horizon_projection() {
        let result = project(
            &table(),
            &SettlementSelection::single(SettlementColumn::Agz34),
            ClipRange::DEFAULT,
            &settings(2024, &[10]),
        )
        .unwrap();
        assert_eq!(result.num_years, 1);
        assert_eq!(result.reference_column(), "z_2024");
        assert!((result.reference[0] - 9.99).abs() < 1e-12);
        let pp10 = result.horizon(PlanningHorizon::new(10).unwrap()).unwrap();
        assert!((pp10[0] - 9.89).abs() < 1e-12);
    }

    #[test]
    fn test_projection_uses_clipped_rate() {
        let result = project(
            &table(),
            &SettlementSelection::single(SettlementColumn::Agz34),
            ClipRange::DEFAULT,
            &settings(2023, &[5]),
        )
        .unwrap();
        assert_eq!(result.rate[1], 0.05);
        assert!((result.reference[1] - 4.0).abs() < 1e-12);
        let pp5 = result.horizon(PlanningHorizon::new(5).unwrap()).unwrap();
        assert!((pp5[1] - 3.75).abs() < 1e-12);
    }

    #[test]
    fn test_projection_linear_in_rate() {
        let z5 = Array1::from_vec(vec![3.0, 3.0]);
        let rate = Array1::from_vec(vec![0.01, 0.02]);
        let hs = horizons(&[20]);
        let (reference, projected) = project_series(&z5, &rate, 3, &hs);
        let drop_single = reference[0] - projected[&hs[0]][0];
        let drop_double = reference[1] - projected[&hs[0]][1];
        assert!((drop_double - 2.0 * drop_single).abs() < 1e-12);
        let ref_drop_single = z5[0] - reference[0];
        let ref_drop_double = z5[1] - reference[1];
        assert!((ref_drop_double - 2.0 * ref_drop_single).abs() < 1e-12);
    }

    #[test]
    fn test_reference_before_base_year_raises_elevation() {
        let z5 = Array1::from_vec(vec![1.0]);
        let rate = Array1::from_vec(vec![0.01]);
        let (reference, _) = project_series(&z5, &rate, -2, &[]);
        assert!((reference[0] - 1.02).abs() < 1e-12);
    }

    #[test]
    fn test_year_overflow_is_reported() {
        let mut settings = settings(2024, &[5]);
        settings.reference_year = i32::MIN;
        let err = project(
            &table(),
            &SettlementSelection::single(SettlementColumn::Agz34),
            ClipRange::DEFAULT,
            &settings,
        )
        .unwrap_err();
        assert!(matches!(err, HtError::InvalidParameter(_)));
        assert!(settings.num_years().is_err());
    }

    #[test]
    fn test_selection_guard() {
        for selection in [
            SettlementSelection::default(),
            SettlementSelection::new([SettlementColumn::Agz34, SettlementColumn::Agz35]),
        ] {
            let err = project(&table(), &selection, ClipRange::DEFAULT, &settings(2024, &[5]))
                .unwrap_err();
            assert!(matches!(err, HtError::Selection { .. }));
        }
    }

    #[test]
    fn test_missing_columns_withhold_projection() {
        let table = DataTable::from_columns([
            ("l", vec![0.0]),
            ("agz34", vec![0.01]),
            ("agz45", vec![0.01]),
            ("agz35", vec![0.01]),
        ])
        .unwrap();
        let err = project(
            &table,
            &SettlementSelection::single(SettlementColumn::Agz34),
            ClipRange::DEFAULT,
            &settings(2024, &[5]),
        )
        .unwrap_err();
        assert_eq!(err, HtError::MissingColumns(vec!["z5".into()]));
    }

    #[test]
    fn test_horizon_catalog() {
        assert!(PlanningHorizon::from_catalog(7).is_err());
        assert!(PlanningHorizon::new(0).is_err());
        let hs = horizons(&[30, 5, 10, 5]);
        let years: Vec<u32> = hs.iter().map(|h| h.years()).collect();
        assert_eq!(years, vec![5, 10, 30]);
        assert_eq!(hs[0].projection_column(), "z_planperiode_5");
        assert_eq!(hs[0].fill_column(), "ophoging_planperiode_5");
    }
}
