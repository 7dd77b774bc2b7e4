//! Planar -> geographic coordinate conversion seam.

use ndarray::Array1;
use serde::Serialize;

use crate::table::DataTable;
use crate::HtError;

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

/// Converts survey `(x, y)` into WGS84 degrees.
pub trait CoordinateTransform {
    fn to_geographic(&self, x: f64, y: f64) -> Result<GeoPoint, HtError>;
}

/// RD New (EPSG:28992) to WGS84 using the published polynomial
/// approximation; accurate to about a metre inside the Netherlands.
#[derive(Clone, Copy, Debug, Default)]
pub struct RdNewApprox;

const RD_X0: f64 = 155_000.0;
const RD_Y0: f64 = 463_000.0;
const LAT0: f64 = 52.155_174_40;
const LON0: f64 = 5.387_206_21;

// (p, q, K) with dX^p * dY^q
const LAT_TERMS: [(i32, i32, f64); 11] = [
    (0, 1, 3235.65389),
    (2, 0, -32.58297),
    (0, 2, -0.24750),
    (2, 1, -0.84978),
    (0, 3, -0.06550),
    (2, 2, -0.01709),
    (1, 0, -0.00738),
    (4, 0, 0.00530),
    (2, 3, -0.00039),
    (4, 1, 0.00033),
    (1, 1, -0.00012),
];

const LON_TERMS: [(i32, i32, f64); 12] = [
    (1, 0, 5260.52916),
    (1, 1, 105.94684),
    (1, 2, 2.45656),
    (3, 0, -0.81885),
    (1, 3, 0.05594),
    (3, 1, -0.05607),
    (0, 1, 0.01199),
    (3, 2, -0.00256),
    (1, 4, 0.00128),
    (0, 2, 0.00022),
    (2, 0, -0.00022),
    (5, 0, 0.00026),
];

// Validity box of the RD grid.
const RD_X_RANGE: (f64, f64) = (-7_000.0, 300_000.0);
const RD_Y_RANGE: (f64, f64) = (289_000.0, 629_000.0);

impl CoordinateTransform for RdNewApprox {
    fn to_geographic(&self, x: f64, y: f64) -> Result<GeoPoint, HtError> {
        let inside_x = (RD_X_RANGE.0..=RD_X_RANGE.1).contains(&x);
        let inside_y = (RD_Y_RANGE.0..=RD_Y_RANGE.1).contains(&y);
        if !inside_x || !inside_y {
            return Err(HtError::Transform(format!(
                "({}, {}) lies outside the RD New grid",
                x, y
            )));
        }
        let dx = (x - RD_X0) * 1e-5;
        let dy = (y - RD_Y0) * 1e-5;
        let sum = |terms: &[(i32, i32, f64)]| -> f64 {
            terms
                .iter()
                .map(|&(p, q, k)| k * dx.powi(p) * dy.powi(q))
                .sum()
        };
        Ok(GeoPoint {
            lat: LAT0 + sum(&LAT_TERMS) / 3600.0,
            lon: LON0 + sum(&LON_TERMS) / 3600.0,
        })
    }
}

/// Convert every row's `(x, y)`. Rows with a missing coordinate get NaN
/// lat/lon; any other failure aborts the whole conversion.
pub fn derive_geographic(
    table: &DataTable,
    transform: &dyn CoordinateTransform,
) -> Result<(Array1<f64>, Array1<f64>), HtError> {
    table.require(&["x", "y"])?;
    let xs = table.column("x")?;
    let ys = table.column("y")?;
    let mut lat = Vec::with_capacity(table.len());
    let mut lon = Vec::with_capacity(table.len());
    for (&x, &y) in xs.iter().zip(ys.iter()) {
        if !x.is_finite() || !y.is_finite() {
            lat.push(f64::NAN);
            lon.push(f64::NAN);
            continue;
        }
        let point = transform.to_geographic(x, y)?;
        lat.push(point.lat);
        lon.push(point.lon);
    }
    Ok((Array1::from_vec(lat), Array1::from_vec(lon)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rd_origin_is_amersfoort() {
        let p = RdNewApprox.to_geographic(RD_X0, RD_Y0).unwrap();
        assert!((p.lat - LAT0).abs() < 1e-12);
        assert!((p.lon - LON0).abs() < 1e-12);
    }

    #[test]
    fn test_rd_known_point() {
        // central Amsterdam
        let p = RdNewApprox.to_geographic(121_000.0, 487_500.0).unwrap();
        assert!((p.lat - 52.3743).abs() < 1e-3, "lat {}", p.lat);
        assert!((p.lon - 4.8879).abs() < 1e-3, "lon {}", p.lon);
    }

    #[test]
    fn test_rd_outside_grid_fails() {
        let err = RdNewApprox.to_geographic(1e7, 0.0).unwrap_err();
        assert!(matches!(err, HtError::Transform(_)));
    }

    #[test]
    fn test_derive_geographic_skips_missing_coordinates() {
        let table = DataTable::from_columns([
            ("x", vec![155_000.0, f64::NAN]),
            ("y", vec![463_000.0, 463_000.0]),
        ])
        .unwrap();
        let (lat, lon) = derive_geographic(&table, &RdNewApprox).unwrap();
        assert!((lat[0] - LAT0).abs() < 1e-9);
        assert!(lon[1].is_nan());
    }

    #[test]
    fn test_derive_geographic_needs_both_columns() {
        let table = DataTable::from_columns([("x", vec![1.0])]).unwrap();
        assert_eq!(
            derive_geographic(&table, &RdNewApprox),
            Err(HtError::MissingColumns(vec!["y".into()]))
        );
    }
}
