//! A loaded survey file and the cache that keeps it across interactions.

use std::fmt;
use std::rc::Rc;

use sha2::{Digest, Sha256};

use crate::geo::{derive_geographic, CoordinateTransform};
use crate::table::DataTable;
use crate::HtError;

/// SHA-256 of the uploaded bytes.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FileIdentity(String);

impl FileIdentity {
    pub fn of(bytes: &[u8]) -> Self {
        let digest = Sha256::digest(bytes);
        Self(digest.iter().map(|b| format!("{:02x}", b)).collect())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FileIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0[..12.min(self.0.len())])
    }
}

/// Outcome of deriving `lat`/`lon` at load time.
#[derive(Clone, Debug, PartialEq)]
pub enum GeoStatus {
    /// `lat` and `lon` columns were added to the table.
    Available,
    /// The file has no `x`/`y` columns; no map is produced.
    NoCoordinates,
    /// Conversion failed; the map is omitted and the error reported.
    Failed(HtError),
}

#[derive(Clone, Debug)]
pub struct Survey {
    pub identity: FileIdentity,
    pub table: DataTable,
    pub geo: GeoStatus,
}

impl Survey {
    /// Parse the CSV and, when both `x` and `y` are present, derive `lat`/`lon`
    /// once through `transform`.
    pub fn load(
        bytes: &[u8],
        transform: Option<&dyn CoordinateTransform>,
    ) -> Result<Self, HtError> {
        let identity = FileIdentity::of(bytes);
        let mut table = DataTable::from_csv_bytes(bytes)?;
        let geo = match transform {
            Some(transform) if table.missing(&["x", "y"]).is_empty() => {
                match derive_geographic(&table, transform) {
                    Ok((lat, lon)) => {
                        table.insert_column("lat", lat)?;
                        table.insert_column("lon", lon)?;
                        GeoStatus::Available
                    }
                    Err(err) => GeoStatus::Failed(err),
                }
            }
            _ => GeoStatus::NoCoordinates,
        };
        Ok(Self {
            identity,
            table,
            geo,
        })
    }

    pub fn has_geographic(&self) -> bool {
        self.geo == GeoStatus::Available
    }
}

/// Result of a cache lookup.
#[derive(Clone, Debug)]
pub struct CacheLookup {
    pub survey: Rc<Survey>,
    pub hit: bool,
}

/// Single-entry cache keyed by file identity. Supplying a different file
/// replaces the entry.
#[derive(Default)]
pub struct DatasetCache {
    entry: Option<Rc<Survey>>,
}

impl DatasetCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(
        &mut self,
        bytes: &[u8],
        transform: Option<&dyn CoordinateTransform>,
    ) -> Result<CacheLookup, HtError> {
        let identity = FileIdentity::of(bytes);
        if let Some(survey) = self.entry.as_ref().filter(|s| s.identity == identity) {
            return Ok(CacheLookup {
                survey: Rc::clone(survey),
                hit: true,
            });
        }
        let survey = Rc::new(Survey::load(bytes, transform)?);
        self.entry = Some(Rc::clone(&survey));
        Ok(CacheLookup { survey, hit: false })
    }

    pub fn current(&self) -> Option<Rc<Survey>> {
        self.entry.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::{GeoPoint, RdNewApprox};

    struct AlwaysFails;

    impl CoordinateTransform for AlwaysFails {
        fn to_geographic(&self, _x: f64, _y: f64) -> Result<GeoPoint, HtError> {
            Err(HtError::Transform("projection service unavailable".into()))
        }
    }

    const WITH_XY: &[u8] = b"l,x,y,z5\n0,155000,463000,1.0\n";

    #[test]
    fn test_identity_is_content_hash() {
        assert_eq!(FileIdentity::of(b"a"), FileIdentity::of(b"a"));
        assert_ne!(FileIdentity::of(b"a"), FileIdentity::of(b"b"));
        assert_eq!(FileIdentity::of(b"").as_str().len(), 64);
    }

    #[test]
    fn test_cache_hit_and_invalidation() {
        let mut cache = DatasetCache::new();
        let first = cache.load(b"l\n1\n", None).unwrap();
        assert!(!first.hit);
        let again = cache.load(b"l\n1\n", None).unwrap();
        assert!(again.hit);
        assert!(Rc::ptr_eq(&first.survey, &again.survey));

        let other = cache.load(b"l\n2\n", None).unwrap();
        assert!(!other.hit);
        assert_eq!(other.survey.table.column("l").unwrap()[0], 2.0);
        assert!(!cache.load(b"l\n1\n", None).unwrap().hit);
    }

    #[test]
    fn test_parse_failure_keeps_previous_entry() {
        let mut cache = DatasetCache::new();
        cache.load(b"l\n1\n", None).unwrap();
        assert!(cache.load(b"l\n1,2\n", None).is_err());
        assert!(cache.current().is_some());
    }

    #[test]
    fn test_geographic_columns_derived_on_load() {
        let survey = Survey::load(WITH_XY, Some(&RdNewApprox)).unwrap();
        assert!(survey.has_geographic());
        assert!(survey.table.is_numeric("lat"));
        assert!(survey.table.is_numeric("lon"));
    }

    #[test]
    fn test_transform_failure_degrades() {
        let survey = Survey::load(WITH_XY, Some(&AlwaysFails)).unwrap();
        assert!(matches!(survey.geo, GeoStatus::Failed(HtError::Transform(_))));
        assert!(!survey.table.has_column("lat"));
    }

    #[test]
    fn test_no_coordinates() {
        let survey = Survey::load(b"l,z5\n0,1\n", Some(&RdNewApprox)).unwrap();
        assert_eq!(survey.geo, GeoStatus::NoCoordinates);
    }
}
