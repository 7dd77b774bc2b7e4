//! Required fill ("ophoging") per planning horizon.

use std::collections::BTreeMap;

use ndarray::Array1;
use serde::Serialize;

use crate::projection::{PlanningHorizon, ProjectionResult};

/// Fill needed to lift one projected elevation back to `threshold`. Never
/// negative; a missing elevation stays missing.
pub fn fill_value(projected: f64, threshold: f64) -> f64 {
    if projected.is_nan() || threshold.is_nan() {
        return f64::NAN;
    }
    let fill = threshold - projected;
    if fill.is_nan() {
        // inf - inf
        return f64::NAN;
    }
    fill.max(0.0)
}

pub fn fill_required(projected: &Array1<f64>, threshold: f64) -> Array1<f64> {
    projected.mapv(|z| fill_value(z, threshold))
}

#[derive(Clone, Debug, Serialize)]
pub struct FillResult {
    pub threshold_m: f64,
    pub horizons: BTreeMap<PlanningHorizon, Array1<f64>>,
}

impl FillResult {
    pub fn from_projection(projection: &ProjectionResult, threshold_m: f64) -> Self {
        let horizons = projection
            .horizons
            .iter()
            .map(|(&h, z)| (h, fill_required(z, threshold_m)))
            .collect();
        Self {
            threshold_m,
            horizons,
        }
    }

    pub fn horizon(&self, horizon: PlanningHorizon) -> Option<&Array1<f64>> {
        self.horizons.get(&horizon)
    }

    /// Largest fill over all rows for `horizon`, ignoring missing values.
    pub fn max_fill(&self, horizon: PlanningHorizon) -> Option<f64> {
        self.horizon(horizon)?
            .iter()
            .copied()
            .filter(|v| !v.is_nan())
            .fold(None, |acc, v| Some(acc.map_or(v, |m: f64| m.max(v))))
    }

    /// Number of rows that need any fill for `horizon`.
    pub fn rows_needing_fill(&self, horizon: PlanningHorizon) -> usize {
        self.horizon(horizon)
            .map_or(0, |fill| fill.iter().filter(|v| **v > 0.0).count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_fill_above_threshold() {
        assert_eq!(fill_value(9.89, -0.4), 0.0);
    }

    #[test]
    fn test_fill_below_threshold() {
        assert!((fill_value(9.89, 10.0) - 0.11).abs() < 1e-9);
    }

    #[test]
    fn test_fill_never_negative() {
        for z in [-1e6, -3.2, -0.4, 0.0, 1.0, 1e6, f64::INFINITY, f64::NEG_INFINITY] {
            for dth in [-0.4, 0.0, 2.5] {
                assert!(fill_value(z, dth) >= 0.0);
            }
        }
    }

    #[test]
    fn test_missing_elevation_stays_missing() {
        assert!(fill_value(f64::NAN, -0.4).is_nan());
        let fill = fill_required(&Array1::from_vec(vec![f64::NAN, -1.0]), -0.4);
        assert!(fill[0].is_nan());
        assert!((fill[1] - 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_summary_helpers() {
        let h = PlanningHorizon::new(10).unwrap();
        let result = FillResult {
            threshold_m: 0.0,
            horizons: BTreeMap::from([(h, Array1::from_vec(vec![0.0, 0.3, f64::NAN, 0.1]))]),
        };
        assert_eq!(result.max_fill(h), Some(0.3));
        assert_eq!(result.rows_needing_fill(h), 2);
        assert_eq!(result.max_fill(PlanningHorizon::new(5).unwrap()), None);
    }
}
