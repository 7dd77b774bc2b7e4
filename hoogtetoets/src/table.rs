//! In-memory survey table built from the uploaded CSV.

use std::collections::BTreeMap;
use std::io::Read;

use ndarray::Array1;
use serde::Serialize;

use crate::HtError;

/// Columns needed for the elevation profile.
pub const ELEVATION_COLUMNS: [&str; 4] = ["l", "z3", "z4", "z5"];

/// Survey rows stored column-wise. Numeric columns feed the computation,
/// columns that do not parse as numbers are only carried for display.
#[derive(Clone, Debug, Default)]
pub struct DataTable {
    headers: Vec<String>,
    numeric: BTreeMap<String, Array1<f64>>,
    text: BTreeMap<String, Vec<String>>,
    rows: usize,
}

impl DataTable {
    pub fn from_csv_bytes(input: &[u8]) -> Result<Self, HtError> {
        Self::from_csv_reader(input)
    }

    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self, HtError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);
        let headers: Vec<String> = csv_reader
            .headers()
            .map_err(|e| HtError::CsvParse(e.to_string()))?
            .iter()
            .map(|h| h.to_string())
            .collect();
        if headers.is_empty() || headers.iter().all(|h| h.is_empty()) {
            return Err(HtError::CsvParse("no columns found".into()));
        }

        let mut cells: Vec<Vec<String>> = vec![Vec::new(); headers.len()];
        for record in csv_reader.records() {
            let record = record.map_err(|e| HtError::CsvParse(e.to_string()))?;
            for (idx, cell) in record.iter().enumerate() {
                cells[idx].push(cell.to_string());
            }
        }

        let mut table = DataTable {
            rows: cells.first().map_or(0, Vec::len),
            ..DataTable::default()
        };
        for (name, raw) in headers.into_iter().zip(cells) {
            if table.has_column(&name) {
                return Err(HtError::CsvParse(format!("duplicate column '{}'", name)));
            }
            match parse_numeric(&raw) {
                Some(values) => {
                    table.numeric.insert(name.clone(), values);
                }
                None => {
                    table.text.insert(name.clone(), raw);
                }
            }
            table.headers.push(name);
        }
        Ok(table)
    }

    /// Build a table from already numeric columns; all columns must be equally long.
    pub fn from_columns<I, S>(columns: I) -> Result<Self, HtError>
    where
        I: IntoIterator<Item = (S, Vec<f64>)>,
        S: Into<String>,
    {
        let mut table = DataTable::default();
        for (idx, (name, values)) in columns.into_iter().enumerate() {
            let name = name.into();
            if idx == 0 {
                table.rows = values.len();
            }
            table.insert_column(name, Array1::from_vec(values))?;
        }
        Ok(table)
    }

    pub fn len(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    /// Column names in file order, derived columns last.
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.numeric.contains_key(name) || self.text.contains_key(name)
    }

    pub fn is_numeric(&self, name: &str) -> bool {
        self.numeric.contains_key(name)
    }

    pub fn column(&self, name: &str) -> Result<&Array1<f64>, HtError> {
        self.numeric
            .get(name)
            .ok_or_else(|| HtError::MissingColumns(vec![name.to_string()]))
    }

    pub fn text_column(&self, name: &str) -> Option<&[String]> {
        self.text.get(name).map(Vec::as_slice)
    }

    /// Names from `required` that are absent or not numeric, in the order asked for.
    pub fn missing(&self, required: &[&str]) -> Vec<String> {
        required
            .iter()
            .filter(|name| !self.numeric.contains_key(**name))
            .map(|name| name.to_string())
            .collect()
    }

    pub fn require(&self, required: &[&str]) -> Result<(), HtError> {
        let missing = self.missing(required);
        if missing.is_empty() {
            Ok(())
        } else {
            Err(HtError::MissingColumns(missing))
        }
    }

    /// Add or replace a numeric column.
    pub fn insert_column(
        &mut self,
        name: impl Into<String>,
        values: Array1<f64>,
    ) -> Result<(), HtError> {
        let name = name.into();
        if values.len() != self.rows {
            return Err(HtError::InvalidParameter(format!(
                "column '{}' has {} values, table has {} rows",
                name,
                values.len(),
                self.rows
            )));
        }
        self.text.remove(&name);
        if self.numeric.insert(name.clone(), values).is_none() {
            self.headers.push(name);
        }
        Ok(())
    }

    /// Cell rendered for tabular output; NaN renders as an empty cell.
    pub fn display_cell(&self, name: &str, row: usize) -> String {
        if let Some(values) = self.numeric.get(name) {
            return values.get(row).map(|v| format_value(*v)).unwrap_or_default();
        }
        self.text
            .get(name)
            .and_then(|values| values.get(row).cloned())
            .unwrap_or_default()
    }

    /// Row indices ordered by the values of `key`; NaN keys sort last.
    pub fn order_by(&self, key: &str) -> Result<Vec<usize>, HtError> {
        let keys = self.column(key)?;
        let mut order: Vec<usize> = (0..self.rows).collect();
        order.sort_by(|&a, &b| keys[a].total_cmp(&keys[b]).then(a.cmp(&b)));
        order.sort_by_key(|&idx| keys[idx].is_nan());
        Ok(order)
    }
}

fn parse_numeric(raw: &[String]) -> Option<Array1<f64>> {
    let mut values = Vec::with_capacity(raw.len());
    for cell in raw {
        if cell.is_empty() {
            values.push(f64::NAN);
        } else {
            values.push(cell.parse::<f64>().ok()?);
        }
    }
    Some(Array1::from_vec(values))
}

pub(crate) fn format_value(value: f64) -> String {
    if value.is_nan() {
        String::new()
    } else {
        value.to_string()
    }
}

/// Elevation per survey epoch against distance along the section, sorted by `l`.
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct ElevationProfile {
    pub l: Vec<f64>,
    pub z3: Vec<f64>,
    pub z4: Vec<f64>,
    pub z5: Vec<f64>,
}

pub fn elevation_profile(table: &DataTable) -> Result<ElevationProfile, HtError> {
    table.require(&ELEVATION_COLUMNS)?;
    let order = table.order_by("l")?;
    let pick = |name: &str| -> Result<Vec<f64>, HtError> {
        let column = table.column(name)?;
        Ok(order.iter().map(|&idx| column[idx]).collect())
    };
    Ok(ElevationProfile {
        l: pick("l")?,
        z3: pick("z3")?,
        z4: pick("z4")?,
        z5: pick("z5")?,
    })
}
