use hoogtetoets::{
    assess, color_for, AssessmentRequest, ClipRange, DatasetCache, HtError, PlanningHorizon,
    ProjectionSettings, RangeControl, Rgb, SettlementColumn, SettlementSelection, Stage,
};

const SURVEY: &[u8] = b"l,z3,z4,z5,agz34,agz45,agz35\n\
    0,10.1,10.05,10.0,0.01,0.012,0.011\n\
    25,9.5,9.45,9.4,0.06,-0.2,0.03\n\
    50,9.8,9.75,9.7,0.0,0.0,0.0\n";

fn request(
    selection: SettlementSelection,
    range: ClipRange,
    threshold_m: f64,
) -> AssessmentRequest {
    AssessmentRequest {
        selection,
        range,
        projection: ProjectionSettings {
            reference_year: 2024,
            base_year: 2023,
            horizons: PlanningHorizon::from_catalog_list(&[5, 10]).unwrap(),
        },
        threshold_m,
        run_projection: true,
    }
}

#[test]
fn reference_year_and_horizon_scenario() {
    let mut cache = DatasetCache::new();
    let survey = cache.load(SURVEY, None).unwrap().survey;
    let out = assess(
        &survey,
        &request(
            SettlementSelection::single(SettlementColumn::Agz34),
            ClipRange::DEFAULT,
            -0.4,
        ),
    );
    let projection = out.projection.expect("projection");
    assert_eq!(projection.num_years, 1);
    assert!((projection.reference[0] - 9.99).abs() < 1e-12);
    let pp10 = projection
        .horizon(PlanningHorizon::new(10).unwrap())
        .unwrap();
    assert!((pp10[0] - 9.89).abs() < 1e-12);

    let fill = out.fill.expect("fill");
    assert_eq!(fill.horizon(PlanningHorizon::new(10).unwrap()).unwrap()[0], 0.0);
}

#[test]
fn fill_only_below_threshold() {
    let mut cache = DatasetCache::new();
    let survey = cache.load(SURVEY, None).unwrap().survey;
    let out = assess(
        &survey,
        &request(
            SettlementSelection::single(SettlementColumn::Agz34),
            ClipRange::DEFAULT,
            10.0,
        ),
    );
    let fill = out.fill.expect("fill");
    let pp10 = fill.horizon(PlanningHorizon::new(10).unwrap()).unwrap();
    assert!((pp10[0] - 0.11).abs() < 1e-9);
    assert!(pp10.iter().all(|v| *v >= 0.0));
}

#[test]
fn committed_range_drives_projection() {
    let mut cache = DatasetCache::new();
    let survey = cache.load(SURVEY, None).unwrap().survey;
    let mut control = RangeControl::default();
    control.set_pending_min(0.0).unwrap();
    control.set_pending_max(0.03).unwrap();

    // Pending edits alone change nothing.
    let before = assess(
        &survey,
        &request(
            SettlementSelection::single(SettlementColumn::Agz34),
            control.committed(),
            -0.4,
        ),
    );
    assert_eq!(before.projection.unwrap().rate[1], 0.05);

    control.commit().unwrap();
    let after = assess(
        &survey,
        &request(
            SettlementSelection::single(SettlementColumn::Agz34),
            control.committed(),
            -0.4,
        ),
    );
    assert_eq!(after.projection.unwrap().rate[1], 0.03);
}

#[test]
fn selection_error_for_zero_or_two_series() {
    let mut cache = DatasetCache::new();
    let survey = cache.load(SURVEY, None).unwrap().survey;
    for (selection, selected) in [
        (SettlementSelection::default(), 0),
        (
            SettlementSelection::new([SettlementColumn::Agz34, SettlementColumn::Agz45]),
            2,
        ),
    ] {
        let out = assess(&survey, &request(selection, ClipRange::DEFAULT, -0.4));
        assert!(out.projection.is_none());
        assert_eq!(
            out.warning_for(Stage::Projection).unwrap().error,
            HtError::Selection { selected }
        );
    }
}

#[test]
fn missing_settlement_column_keeps_elevation_chart() {
    let csv = b"l,z3,z4,z5,agz45,agz35\n0,1,1,1,0.01,0.01\n";
    let mut cache = DatasetCache::new();
    let survey = cache.load(csv, None).unwrap().survey;
    let out = assess(
        &survey,
        &request(
            SettlementSelection::single(SettlementColumn::Agz45),
            ClipRange::DEFAULT,
            -0.4,
        ),
    );
    assert!(out.elevation.is_some());
    assert!(out.settlement.is_none());
    assert!(out.projection.is_none());
    let missing = HtError::MissingColumns(vec!["agz34".into()]);
    assert_eq!(out.warning_for(Stage::Settlement).unwrap().error, missing);
    assert_eq!(out.warning_for(Stage::Projection).unwrap().error, missing);
}

#[test]
fn color_mapper_contract() {
    assert_eq!(color_for(0.0), Rgb { r: 0.0, g: 1.0, b: 0.0 });
    assert_eq!(color_for(1.0), Rgb { r: 1.0, g: 0.0, b: 0.0 });
    assert_eq!(color_for(f64::NAN), Rgb { r: 0.5, g: 0.5, b: 0.5 });
}
