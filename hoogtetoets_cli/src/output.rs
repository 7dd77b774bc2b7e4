use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use hoogtetoets::{Assessment, DataTable, FillMap, GeoStatus, Survey};
use serde_json::{json, Value as JsonValue};
use tracing::{info, warn};

/// Destinations for one compute run; `None` skips that output.
#[derive(Clone, Debug, Default)]
pub struct OutputPaths {
    pub table: Option<PathBuf>,
    pub map: Option<PathBuf>,
    pub profile: Option<PathBuf>,
    pub settlement: Option<PathBuf>,
    pub projection: Option<PathBuf>,
    pub report: Option<PathBuf>,
}

pub fn write_outputs(survey: &Survey, assessment: &Assessment, paths: &OutputPaths) -> Result<()> {
    if let Some(path) = paths.table.as_ref() {
        if path.as_os_str() == "-" {
            let stdout = io::stdout();
            let mut writer = csv::Writer::from_writer(stdout.lock());
            write_result_rows(&survey.table, assessment, &mut writer)?;
        } else {
            let mut writer = csv_file(path)?;
            write_result_rows(&survey.table, assessment, &mut writer)?;
            info!("Wrote result table: {}", path.display());
        }
    }

    if let Some(path) = paths.map.as_ref() {
        match assessment.map.as_ref() {
            Some(map) => {
                let mut writer = csv_file(path)?;
                write_map_rows(map, &mut writer)?;
                info!("Wrote map layers: {}", path.display());
            }
            None => warn!("No geographic positions; skipping map {}", path.display()),
        }
    }

    if let Some(path) = paths.profile.as_ref() {
        match assessment.elevation.as_ref() {
            Some(_) => {
                let mut writer = csv_file(path)?;
                write_profile_rows(assessment, &mut writer)?;
                info!("Wrote elevation profile: {}", path.display());
            }
            None => warn!("Elevation profile unavailable; skipping {}", path.display()),
        }
    }

    if let Some(path) = paths.settlement.as_ref() {
        match assessment.settlement.as_ref() {
            Some(_) => {
                let mut writer = csv_file(path)?;
                write_settlement_rows(&survey.table, assessment, &mut writer)?;
                info!("Wrote filtered settlement: {}", path.display());
            }
            None => warn!("Settlement series unavailable; skipping {}", path.display()),
        }
    }

    if let Some(path) = paths.projection.as_ref() {
        match assessment.projection.as_ref() {
            Some(_) => {
                let mut writer = csv_file(path)?;
                write_projection_rows(&survey.table, assessment, &mut writer)?;
                info!("Wrote projection and fill series: {}", path.display());
            }
            None => warn!("Projection unavailable; skipping {}", path.display()),
        }
    }

    if let Some(path) = paths.report.as_ref() {
        let report = build_report(survey, assessment);
        let text = serde_json::to_string_pretty(&report)?;
        std::fs::write(path, text)
            .with_context(|| format!("failed to write {}", path.display()))?;
        info!("Wrote report: {}", path.display());
    }

    Ok(())
}

fn csv_file(path: &Path) -> Result<csv::Writer<File>> {
    let file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    Ok(csv::Writer::from_writer(file))
}

fn fmt_m(value: f64) -> String {
    if value.is_nan() {
        String::new()
    } else {
        format!("{:.3}", value)
    }
}

/// Input columns (selected settlement series clipped), then the reference
/// column, the projection columns and the fill columns.
pub fn write_result_rows<W: Write>(
    table: &DataTable,
    assessment: &Assessment,
    writer: &mut csv::Writer<W>,
) -> Result<()> {
    let mut header: Vec<String> = table.headers().to_vec();
    if let Some(projection) = assessment.projection.as_ref() {
        header.push(projection.reference_column());
        header.extend(projection.horizons.keys().map(|h| h.projection_column()));
    }
    if let Some(fill) = assessment.fill.as_ref() {
        header.extend(fill.horizons.keys().map(|h| h.fill_column()));
    }
    writer.write_record(&header)?;

    for row in 0..table.len() {
        let mut record: Vec<String> = Vec::with_capacity(header.len());
        for name in table.headers() {
            let clipped = assessment.settlement.as_ref().and_then(|s| {
                s.series
                    .iter()
                    .find(|(column, _)| column.name() == name.as_str())
                    .map(|(_, values)| values[row])
            });
            match clipped {
                Some(value) => record.push(fmt_m(value)),
                None => record.push(table.display_cell(name, row)),
            }
        }
        if let Some(projection) = assessment.projection.as_ref() {
            record.push(fmt_m(projection.reference[row]));
            record.extend(projection.horizons.values().map(|z| fmt_m(z[row])));
        }
        if let Some(fill) = assessment.fill.as_ref() {
            record.extend(fill.horizons.values().map(|f| fmt_m(f[row])));
        }
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_map_rows<W: Write>(map: &FillMap, writer: &mut csv::Writer<W>) -> Result<()> {
    writer.write_record([
        "planperiode", "row", "l", "lat", "lon", "ophoging_m", "r", "g", "b", "color",
    ])?;
    for (horizon, points) in &map.layers {
        for point in points {
            let [r, g, b] = point.color.to_rgb8();
            writer.write_record([
                horizon.years().to_string(),
                point.row.to_string(),
                fmt_m(point.l),
                format!("{:.6}", point.lat),
                format!("{:.6}", point.lon),
                fmt_m(point.fill),
                r.to_string(),
                g.to_string(),
                b.to_string(),
                point.color.to_hex(),
            ])?;
        }
    }
    writer.flush()?;
    Ok(())
}

pub fn write_profile_rows<W: Write>(
    assessment: &Assessment,
    writer: &mut csv::Writer<W>,
) -> Result<()> {
    let Some(profile) = assessment.elevation.as_ref() else {
        return Ok(());
    };
    writer.write_record(["l", "z3", "z4", "z5"])?;
    for i in 0..profile.l.len() {
        writer.write_record([
            fmt_m(profile.l[i]),
            fmt_m(profile.z3[i]),
            fmt_m(profile.z4[i]),
            fmt_m(profile.z5[i]),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

/// Distance plus every selected (clipped) series, ordered by `l`.
pub fn write_settlement_rows<W: Write>(
    table: &DataTable,
    assessment: &Assessment,
    writer: &mut csv::Writer<W>,
) -> Result<()> {
    let Some(settlement) = assessment.settlement.as_ref() else {
        return Ok(());
    };
    let order = table.order_by("l")?;
    let l = table.column("l")?;
    let mut header = vec!["l".to_string()];
    header.extend(settlement.series.keys().map(|c| c.name().to_string()));
    writer.write_record(&header)?;
    for row in order {
        let mut record = vec![fmt_m(l[row])];
        // rates are in m/year, keep sub-millimetre precision
        record.extend(settlement.series.values().map(|s| {
            if s[row].is_nan() {
                String::new()
            } else {
                format!("{:.4}", s[row])
            }
        }));
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

/// Reference and per-horizon elevations followed by the fill per horizon,
/// ordered by `l` for the distance charts.
pub fn write_projection_rows<W: Write>(
    table: &DataTable,
    assessment: &Assessment,
    writer: &mut csv::Writer<W>,
) -> Result<()> {
    let (Some(projection), Some(fill)) = (assessment.projection.as_ref(), assessment.fill.as_ref())
    else {
        return Ok(());
    };
    let order = table.order_by("l")?;
    let l = table.column("l")?;
    let mut header = vec!["l".to_string(), projection.reference_column()];
    header.extend(projection.horizons.keys().map(|h| h.projection_column()));
    header.extend(fill.horizons.keys().map(|h| h.fill_column()));
    writer.write_record(&header)?;
    for row in order {
        let mut record = vec![fmt_m(l[row]), fmt_m(projection.reference[row])];
        record.extend(projection.horizons.values().map(|z| fmt_m(z[row])));
        record.extend(fill.horizons.values().map(|f| fmt_m(f[row])));
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn build_report(survey: &Survey, assessment: &Assessment) -> JsonValue {
    let horizons: Vec<JsonValue> = match (assessment.projection.as_ref(), assessment.fill.as_ref())
    {
        (Some(projection), Some(fill)) => projection
            .horizons
            .keys()
            .map(|&h| {
                json!({
                    "years": h.years(),
                    "column": h.projection_column(),
                    "max_fill_m": fill.max_fill(h),
                    "rows_needing_fill": fill.rows_needing_fill(h),
                })
            })
            .collect(),
        _ => Vec::new(),
    };

    json!({
        "file": survey.identity.as_str(),
        "rows": survey.table.len(),
        "columns": survey.table.headers(),
        "geographic": matches!(survey.geo, GeoStatus::Available),
        "settlement": assessment.settlement.as_ref().map(|s| json!({
            "min": s.range.min(),
            "max": s.range.max(),
            "series": s.series.keys().map(|c| c.name()).collect::<Vec<_>>(),
        })),
        "projection": assessment.projection.as_ref().map(|p| json!({
            "series": p.column.name(),
            "reference_year": p.reference_year,
            "num_years": p.num_years,
        })),
        "threshold_m": assessment.fill.as_ref().map(|f| f.threshold_m),
        "horizons": horizons,
        "warnings": assessment
            .warnings
            .iter()
            .map(|w| w.to_string())
            .collect::<Vec<_>>(),
    })
}

/// One line per horizon for the terminal.
pub fn summary_lines(assessment: &Assessment) -> Vec<String> {
    let mut lines = Vec::new();
    if let Some(settlement) = assessment.settlement.as_ref() {
        for (column, values) in &settlement.series {
            let (lo, hi) = values
                .iter()
                .filter(|v| !v.is_nan())
                .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
                    (lo.min(v), hi.max(v))
                });
            if lo.is_finite() {
                lines.push(format!(
                    "{}: {:.4} .. {:.4} m/jaar (clipped to [{:.3}, {:.3}])",
                    column,
                    lo,
                    hi,
                    settlement.range.min(),
                    settlement.range.max()
                ));
            } else {
                lines.push(format!("{}: no values", column));
            }
        }
    }
    if let (Some(projection), Some(fill)) =
        (assessment.projection.as_ref(), assessment.fill.as_ref())
    {
        lines.push(format!(
            "{} from {} over {} year(s), threshold {:.3} m",
            projection.reference_column(),
            projection.column,
            projection.num_years,
            fill.threshold_m
        ));
        for &h in projection.horizons.keys() {
            let max_fill = fill
                .max_fill(h)
                .map_or_else(|| "n/a".to_string(), |v| format!("{:.3} m", v));
            lines.push(format!(
                "{}: {} row(s) need fill, max {}",
                h.projection_column(),
                fill.rows_needing_fill(h),
                max_fill
            ));
        }
    }
    lines
}
