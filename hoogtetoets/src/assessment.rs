//! One full recomputation of the pipeline for a loaded survey.
//!
//! Stages that cannot run (missing columns, ambiguous selection, failed
//! coordinate transform) are skipped with a [`StageWarning`]; the remaining
//! stages still produce their output.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::color::{color_for, Rgb};
use crate::fill::FillResult;
use crate::projection::{project, PlanningHorizon, ProjectionResult, ProjectionSettings};
use crate::settlement::{filter_selection, ClipRange, FilteredSettlement, SettlementSelection};
use crate::survey::{GeoStatus, Survey};
use crate::table::{elevation_profile, DataTable, ElevationProfile};
use crate::{HtError, Params};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Elevation,
    Settlement,
    Projection,
    Map,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Elevation => "elevation profile",
            Stage::Settlement => "background settlement",
            Stage::Projection => "projection",
            Stage::Map => "map",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct StageWarning {
    pub stage: Stage,
    pub error: HtError,
}

impl fmt::Display for StageWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} skipped: {}", self.stage, self.error)
    }
}

#[derive(Clone, Debug)]
pub struct AssessmentRequest {
    pub selection: SettlementSelection,
    /// Committed clip range; pending slider values never reach the pipeline.
    pub range: ClipRange,
    pub projection: ProjectionSettings,
    pub threshold_m: f64,
    /// Projection and fill only run on an explicit compute trigger.
    pub run_projection: bool,
}

impl AssessmentRequest {
    pub fn from_params(params: &Params) -> Result<Self, HtError> {
        Ok(Self {
            selection: params.settlement_selection(),
            range: params.clip_range()?,
            projection: ProjectionSettings {
                reference_year: params.reference_year(),
                base_year: params.base_year,
                horizons: params.planning_horizons()?,
            },
            threshold_m: params.threshold_m,
            run_projection: true,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MapPoint {
    pub row: usize,
    pub l: f64,
    pub lat: f64,
    pub lon: f64,
    pub fill: f64,
    pub color: Rgb,
}

/// Coloured points per planning horizon.
#[derive(Clone, Debug, Default, Serialize)]
pub struct FillMap {
    pub layers: BTreeMap<PlanningHorizon, Vec<MapPoint>>,
}

#[derive(Clone, Debug, Default)]
pub struct Assessment {
    pub elevation: Option<ElevationProfile>,
    pub settlement: Option<FilteredSettlement>,
    pub projection: Option<ProjectionResult>,
    pub fill: Option<FillResult>,
    pub map: Option<FillMap>,
    pub warnings: Vec<StageWarning>,
}

impl Assessment {
    fn warn(&mut self, stage: Stage, error: HtError) {
        self.warnings.push(StageWarning { stage, error });
    }

    pub fn warning_for(&self, stage: Stage) -> Option<&StageWarning> {
        self.warnings.iter().find(|w| w.stage == stage)
    }
}

pub fn assess(survey: &Survey, request: &AssessmentRequest) -> Assessment {
    let table = &survey.table;
    let mut out = Assessment::default();

    match elevation_profile(table) {
        Ok(profile) => out.elevation = Some(profile),
        Err(err) => out.warn(Stage::Elevation, err),
    }

    match filter_selection(table, &request.selection, request.range) {
        Ok(filtered) => out.settlement = Some(filtered),
        Err(err) => out.warn(Stage::Settlement, err),
    }

    if !request.run_projection {
        return out;
    }

    let projection = match project(
        table,
        &request.selection,
        request.range,
        &request.projection,
    ) {
        Ok(projection) => projection,
        Err(err) => {
            out.warn(Stage::Projection, err);
            return out;
        }
    };
    let fill = FillResult::from_projection(&projection, request.threshold_m);

    match &survey.geo {
        GeoStatus::Available => match build_map(table, &fill) {
            Ok(map) => out.map = Some(map),
            Err(err) => out.warn(Stage::Map, err),
        },
        GeoStatus::Failed(err) => out.warn(Stage::Map, err.clone()),
        GeoStatus::NoCoordinates => {}
    }

    out.projection = Some(projection);
    out.fill = Some(fill);
    out
}

/// Rows without a geographic position are left off the map.
pub fn build_map(table: &DataTable, fill: &FillResult) -> Result<FillMap, HtError> {
    table.require(&["l", "lat", "lon"])?;
    let l = table.column("l")?;
    let lat = table.column("lat")?;
    let lon = table.column("lon")?;

    let mut layers = BTreeMap::new();
    for (&horizon, values) in &fill.horizons {
        let points = (0..table.len())
            .filter(|&row| lat[row].is_finite() && lon[row].is_finite())
            .map(|row| MapPoint {
                row,
                l: l[row],
                lat: lat[row],
                lon: lon[row],
                fill: values[row],
                color: color_for(values[row]),
            })
            .collect();
        layers.insert(horizon, points);
    }
    Ok(FillMap { layers })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::RdNewApprox;
    use crate::settlement::SettlementColumn;

    const FULL: &[u8] = b"l,x,y,z3,z4,z5,agz34,agz45,agz35\n\
        0,155000,463000,10.2,10.1,10.0,0.01,0.02,0.015\n\
        10,155010,463000,-0.2,-0.3,-0.35,0.01,0.02,0.015\n";

    fn request(selection: SettlementSelection) -> AssessmentRequest {
        AssessmentRequest {
            selection,
            range: ClipRange::DEFAULT,
            projection: ProjectionSettings {
                reference_year: 2024,
                base_year: 2023,
                horizons: PlanningHorizon::from_catalog_list(&[10]).unwrap(),
            },
            threshold_m: -0.4,
            run_projection: true,
        }
    }

    #[test]
    fn test_full_pipeline_with_map() {
        let survey = Survey::load(FULL, Some(&RdNewApprox)).unwrap();
        let out = assess(
            &survey,
            &request(SettlementSelection::single(SettlementColumn::Agz34)),
        );
        assert!(out.warnings.is_empty(), "{:?}", out.warnings);
        let h = PlanningHorizon::new(10).unwrap();
        let fill = out.fill.as_ref().unwrap().horizon(h).unwrap();
        assert_eq!(fill[0], 0.0);
        // -0.35 - 0.01 - 0.1 = -0.46 -> 0.06 below the table height
        assert!((fill[1] - 0.06).abs() < 1e-9);
        let layer = &out.map.as_ref().unwrap().layers[&h];
        assert_eq!(layer.len(), 2);
        assert_eq!(layer[0].color, color_for(0.0));
    }

    #[test]
    fn test_ambiguous_selection_withholds_projection_only() {
        let survey = Survey::load(FULL, None).unwrap();
        let out = assess(&survey, &request(SettlementSelection::all()));
        assert!(out.elevation.is_some());
        assert_eq!(out.settlement.as_ref().unwrap().series.len(), 3);
        assert!(out.projection.is_none());
        assert!(out.fill.is_none());
        assert_eq!(
            out.warning_for(Stage::Projection).unwrap().error,
            HtError::Selection { selected: 3 }
        );
    }

    #[test]
    fn test_projection_not_triggered() {
        let survey = Survey::load(FULL, None).unwrap();
        let mut req = request(SettlementSelection::single(SettlementColumn::Agz45));
        req.run_projection = false;
        let out = assess(&survey, &req);
        assert!(out.settlement.is_some());
        assert!(out.projection.is_none());
        assert!(out.warnings.is_empty());
    }

    #[test]
    fn test_transform_failure_reported_on_map_stage() {
        let survey = Survey::load(
            b"l,x,y,z5,agz34,agz45,agz35\n0,1e9,1e9,1,0,0,0\n",
            Some(&RdNewApprox),
        )
        .unwrap();
        let out = assess(
            &survey,
            &request(SettlementSelection::single(SettlementColumn::Agz34)),
        );
        assert!(out.fill.is_some());
        assert!(out.map.is_none());
        assert!(matches!(
            out.warning_for(Stage::Map).unwrap().error,
            HtError::Transform(_)
        ));
        assert_eq!(
            out.warning_for(Stage::Elevation).unwrap().error,
            HtError::MissingColumns(vec!["z3".into(), "z4".into()])
        );
    }

    #[test]
    fn test_extreme_reference_year_is_a_warning() {
        let survey = Survey::load(FULL, None).unwrap();
        let mut req = request(SettlementSelection::single(SettlementColumn::Agz34));
        req.projection.reference_year = i32::MIN;
        let out = assess(&survey, &req);
        assert!(out.elevation.is_some());
        assert!(out.projection.is_none());
        assert!(matches!(
            out.warning_for(Stage::Projection).unwrap().error,
            HtError::InvalidParameter(_)
        ));
    }

    #[test]
    fn test_request_from_default_params() {
        let req = AssessmentRequest::from_params(&Params::default()).unwrap();
        assert_eq!(req.range, ClipRange::DEFAULT);
        assert_eq!(req.projection.horizons.len(), 4);
        assert_eq!(req.selection.len(), 3);
    }

    #[test]
    fn test_request_rejects_unknown_horizon() {
        let params = Params {
            horizons: vec![7],
            ..Params::default()
        };
        assert!(AssessmentRequest::from_params(&params).is_err());
    }
}
