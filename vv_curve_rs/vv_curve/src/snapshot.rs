//! Vote-history snapshots and where to load them from.
//!
//! The on-disk format is the one the leaderboard recorder writes: a JSON
//! object keyed by entity name, each value a list of `[timestamp, count]`
//! pairs in recording order.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::{Map, Value as JsonValue};
use tracing::{debug, warn};

use crate::{RawRecord, VvError};

pub const DEFAULT_PATTERN: &str = "vote_history_*.json";

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

#[derive(Clone, Debug, PartialEq)]
pub struct EntitySeries {
    pub entity: String,
    pub records: Vec<RawRecord>,
}

/// An entry whose value could not be read; kept verbatim so rewriting the
/// snapshot does not lose it.
#[derive(Clone, Debug, PartialEq)]
pub struct InvalidEntity {
    pub entity: String,
    pub message: String,
    pub raw: JsonValue,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Snapshot {
    series: Vec<EntitySeries>,
    invalid: Vec<InvalidEntity>,
}

impl Snapshot {
    pub fn from_json_str(text: &str) -> Result<Self, VvError> {
        let value: JsonValue = serde_json::from_str(text).map_err(|e| VvError::SnapshotParse {
            entity: None,
            message: e.to_string(),
        })?;
        Self::from_json_value(value)
    }

    /// Malformed entries are collected in [`Snapshot::invalid`]; only a
    /// document that is not an object fails as a whole.
    pub fn from_json_value(value: JsonValue) -> Result<Self, VvError> {
        let JsonValue::Object(map) = value else {
            return Err(VvError::SnapshotParse {
                entity: None,
                message: "top level must be an object keyed by entity".into(),
            });
        };

        let mut snapshot = Snapshot::default();
        for (entity, raw) in map {
            match parse_entity_records(&raw) {
                Ok(records) => snapshot.series.push(EntitySeries { entity, records }),
                Err(message) => {
                    warn!("snapshot entry '{}' unreadable: {}", entity, message);
                    snapshot.invalid.push(InvalidEntity {
                        entity,
                        message,
                        raw,
                    });
                }
            }
        }
        Ok(snapshot)
    }

    pub fn series(&self) -> &[EntitySeries] {
        &self.series
    }

    pub fn invalid(&self) -> &[InvalidEntity] {
        &self.invalid
    }

    /// Readable entities first, then the unreadable ones, each in file order.
    pub fn entity_names(&self) -> Vec<String> {
        self.series
            .iter()
            .map(|s| s.entity.clone())
            .chain(self.invalid.iter().map(|i| i.entity.clone()))
            .collect()
    }

    pub fn get(&self, entity: &str) -> Option<&EntitySeries> {
        self.series.iter().find(|s| s.entity == entity)
    }

    /// Latest recorded count per entity, in snapshot order; empty series are
    /// left out.
    pub fn latest_counts(&self) -> Vec<(String, u64)> {
        self.series
            .iter()
            .filter_map(|s| s.records.last().map(|r| (s.entity.clone(), r.count)))
            .collect()
    }

    /// Append one leaderboard reading taken at `at`. Unknown entities start a
    /// new series at the end. A reading for an unreadable entry replaces that
    /// entry with a fresh series.
    pub fn record_observations(&mut self, at: DateTime<Utc>, readings: &[(String, u64)]) {
        for (entity, count) in readings {
            let record = RawRecord::new(at, *count);
            if let Some(pos) = self.invalid.iter().position(|i| &i.entity == entity) {
                let dropped = self.invalid.remove(pos);
                warn!(
                    "replacing unreadable history for '{}' ({}): {}",
                    entity, dropped.message, dropped.raw
                );
            }
            match self.series.iter_mut().find(|s| &s.entity == entity) {
                Some(series) => series.records.push(record),
                None => self.series.push(EntitySeries {
                    entity: entity.clone(),
                    records: vec![record],
                }),
            }
        }
    }

    pub fn to_json_value(&self) -> JsonValue {
        let mut map = Map::new();
        for series in &self.series {
            let rows = series
                .records
                .iter()
                .map(|r| {
                    JsonValue::Array(vec![
                        JsonValue::String(format_timestamp(r.timestamp)),
                        JsonValue::from(r.count),
                    ])
                })
                .collect();
            map.insert(series.entity.clone(), JsonValue::Array(rows));
        }
        for invalid in &self.invalid {
            map.insert(invalid.entity.clone(), invalid.raw.clone());
        }
        JsonValue::Object(map)
    }

    pub fn to_json_string(&self) -> Result<String, VvError> {
        serde_json::to_string_pretty(&self.to_json_value()).map_err(|e| VvError::SnapshotParse {
            entity: None,
            message: e.to_string(),
        })
    }
}

fn parse_entity_records(raw: &JsonValue) -> Result<Vec<RawRecord>, String> {
    let rows = raw
        .as_array()
        .ok_or_else(|| "expected a list of [timestamp, count] pairs".to_string())?;
    rows.iter()
        .enumerate()
        .map(|(idx, row)| {
            let pair = row
                .as_array()
                .filter(|p| p.len() == 2)
                .ok_or_else(|| format!("row {idx}: expected [timestamp, count]"))?;
            let timestamp = pair[0]
                .as_str()
                .and_then(parse_timestamp)
                .ok_or_else(|| format!("row {idx}: unreadable timestamp {}", pair[0]))?;
            let count = match &pair[1] {
                JsonValue::Number(n) => n.as_u64(),
                JsonValue::String(s) => parse_vote_count(s),
                _ => None,
            }
            .ok_or_else(|| format!("row {idx}: count must be a non-negative integer"))?;
            Ok(RawRecord::new(timestamp, count))
        })
        .collect()
}

/// RFC 3339, or a naive ISO timestamp read as UTC.
pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Some(ts.with_timezone(&Utc));
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .map(|naive| naive.and_utc())
}

pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.naive_utc().format("%Y-%m-%dT%H:%M:%S%.f").to_string()
}

/// Leaderboards print counts with grouping separators ("1,234,567" or
/// "1.234.567").
pub fn parse_vote_count(text: &str) -> Option<u64> {
    let digits: String = text
        .trim()
        .chars()
        .filter(|&c| !matches!(c, ',' | '.' | ' ' | '_'))
        .collect();
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Supplies the most recent snapshot to the pipeline.
pub trait SnapshotSource {
    fn load_latest(&self) -> Result<Snapshot, VvError>;
}

#[derive(Clone, Debug, Default)]
pub struct InMemorySource {
    snapshot: Snapshot,
}

impl InMemorySource {
    pub fn new(snapshot: Snapshot) -> Self {
        Self { snapshot }
    }
}

impl SnapshotSource for InMemorySource {
    fn load_latest(&self) -> Result<Snapshot, VvError> {
        Ok(self.snapshot.clone())
    }
}

/// A fixed snapshot file.
#[derive(Clone, Debug)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SnapshotSource for FileSource {
    fn load_latest(&self) -> Result<Snapshot, VvError> {
        load_snapshot_file(&self.path)
    }
}

/// Picks the most recently modified file in `dir` whose name matches a
/// single-wildcard pattern such as `vote_history_*.json`.
#[derive(Clone, Debug)]
pub struct DirectorySource {
    dir: PathBuf,
    prefix: String,
    suffix: String,
}

impl DirectorySource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let (prefix, suffix) = DEFAULT_PATTERN.split_once('*').unwrap_or((DEFAULT_PATTERN, ""));
        Self {
            dir: dir.into(),
            prefix: prefix.to_string(),
            suffix: suffix.to_string(),
        }
    }

    pub fn with_pattern(dir: impl Into<PathBuf>, pattern: &str) -> Result<Self, VvError> {
        let (prefix, suffix) = pattern.split_once('*').ok_or_else(|| {
            VvError::InvalidParameter(format!("pattern '{pattern}' needs one '*' wildcard"))
        })?;
        if suffix.contains('*') {
            return Err(VvError::InvalidParameter(format!(
                "pattern '{pattern}' has more than one '*' wildcard"
            )));
        }
        Ok(Self {
            dir: dir.into(),
            prefix: prefix.to_string(),
            suffix: suffix.to_string(),
        })
    }

    fn matches(&self, name: &str) -> bool {
        name.len() >= self.prefix.len() + self.suffix.len()
            && name.starts_with(&self.prefix)
            && name.ends_with(&self.suffix)
    }

    pub fn latest_path(&self) -> Result<PathBuf, VvError> {
        let entries = fs::read_dir(&self.dir).map_err(|e| {
            VvError::SnapshotUnavailable(format!("cannot list {}: {}", self.dir.display(), e))
        })?;

        let mut best: Option<(SystemTime, PathBuf)> = None;
        for entry in entries.flatten() {
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !self.matches(name) || !path.is_file() {
                continue;
            }
            let modified = entry
                .metadata()
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            let newer = match &best {
                Some((t, p)) => (modified, &path) > (*t, p),
                None => true,
            };
            if newer {
                best = Some((modified, path));
            }
        }

        best.map(|(_, p)| p).ok_or_else(|| {
            VvError::SnapshotUnavailable(format!(
                "no {}*{} files in {}",
                self.prefix,
                self.suffix,
                self.dir.display()
            ))
        })
    }
}

impl SnapshotSource for DirectorySource {
    fn load_latest(&self) -> Result<Snapshot, VvError> {
        let path = self.latest_path()?;
        debug!("loading snapshot {}", path.display());
        load_snapshot_file(&path)
    }
}

pub fn load_snapshot_file(path: &Path) -> Result<Snapshot, VvError> {
    let text = fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            VvError::SnapshotUnavailable(format!("{} does not exist", path.display()))
        } else {
            VvError::Io(e)
        }
    })?;
    Snapshot::from_json_str(&text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::time::Duration;

    const SAMPLE: &str = r#"{
        "LEE HYE RI": [["2024-01-01T00:00:00", 100], ["2024-01-01T00:01:00", 110]],
        "IU": [["2024-01-01 00:00:00", "1,000"], ["2024-01-01T00:01:00Z", 1020]],
        "EMPTY": []
    }"#;

    #[test]
    fn parses_and_keeps_entity_order() {
        let snapshot = Snapshot::from_json_str(SAMPLE).unwrap();
        let names: Vec<&str> = snapshot.series().iter().map(|s| s.entity.as_str()).collect();
        assert_eq!(names, vec!["LEE HYE RI", "IU", "EMPTY"]);
        let iu = snapshot.get("IU").unwrap();
        assert_eq!(iu.records[0].count, 1000);
        assert_eq!(
            iu.records[1].timestamp,
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 1, 0).unwrap()
        );
        assert_eq!(
            snapshot.latest_counts(),
            vec![("LEE HYE RI".to_string(), 110), ("IU".to_string(), 1020)]
        );
    }

    #[test]
    fn malformed_entity_is_isolated() {
        let json = r#"{"A": [["2024-01-01T00:00:00", 1]], "B": [["yesterday", 3]], "C": [[1, 2, 3]]}"#;
        let snapshot = Snapshot::from_json_str(json).unwrap();
        assert_eq!(snapshot.series().len(), 1);
        assert_eq!(snapshot.invalid().len(), 2);
        assert_eq!(snapshot.invalid()[0].entity, "B");
    }

    #[test]
    fn non_object_document_fails() {
        assert!(matches!(
            Snapshot::from_json_str("[1, 2]"),
            Err(VvError::SnapshotParse { entity: None, .. })
        ));
        assert!(matches!(
            Snapshot::from_json_str("{not json"),
            Err(VvError::SnapshotParse { .. })
        ));
    }

    #[test]
    fn vote_counts_with_separators() {
        assert_eq!(parse_vote_count("1,234,567"), Some(1_234_567));
        assert_eq!(parse_vote_count("1.234.567"), Some(1_234_567));
        assert_eq!(parse_vote_count(" 42 "), Some(42));
        assert_eq!(parse_vote_count("-5"), None);
        assert_eq!(parse_vote_count("n/a"), None);
        assert_eq!(parse_vote_count(""), None);
    }

    #[test]
    fn record_then_serialize_round_trip() {
        let mut snapshot = Snapshot::from_json_str(SAMPLE).unwrap();
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 2, 0).unwrap();
        snapshot.record_observations(
            at,
            &[("IU".to_string(), 1050), ("HAEWON".to_string(), 7)],
        );
        assert_eq!(snapshot.get("IU").unwrap().records.len(), 3);
        assert_eq!(snapshot.series().last().unwrap().entity, "HAEWON");

        let text = snapshot.to_json_string().unwrap();
        let reread = Snapshot::from_json_str(&text).unwrap();
        assert_eq!(reread, snapshot);
    }

    #[test]
    fn sub_second_timestamps_survive_rewrite() {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut snapshot = Snapshot::default();
        for (millis, count) in [(200, 10), (800, 12), (1_500, 15)] {
            snapshot.record_observations(
                base + chrono::Duration::milliseconds(millis),
                &[("IU".to_string(), count)],
            );
        }

        let text = snapshot.to_json_string().unwrap();
        assert!(text.contains("2024-01-01T00:00:00.200"));
        let reread = Snapshot::from_json_str(&text).unwrap();
        assert_eq!(reread, snapshot);
        assert_eq!(format_timestamp(base), "2024-01-01T00:00:00");
    }

    #[test]
    fn reading_replaces_unreadable_entry() {
        let json = r#"{"A": [["2024-01-01T00:00:00", 1]], "B": [["yesterday", 3]]}"#;
        let mut snapshot = Snapshot::from_json_str(json).unwrap();
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 5, 0).unwrap();
        snapshot.record_observations(at, &[("B".to_string(), 9)]);
        assert!(snapshot.invalid().is_empty());

        let reread = Snapshot::from_json_str(&snapshot.to_json_string().unwrap()).unwrap();
        let b = reread.get("B").unwrap();
        assert_eq!(b.records, vec![RawRecord::new(at, 9)]);
        assert!(reread.invalid().is_empty());
        assert_eq!(reread.entity_names(), vec!["A", "B"]);
    }

    #[test]
    fn untouched_unreadable_entry_is_written_back() {
        let json = r#"{"A": [["2024-01-01T00:00:00", 1]], "B": [["yesterday", 3]]}"#;
        let mut snapshot = Snapshot::from_json_str(json).unwrap();
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 5, 0).unwrap();
        snapshot.record_observations(at, &[("A".to_string(), 4)]);

        let value = snapshot.to_json_value();
        assert_eq!(value["B"], serde_json::json!([["yesterday", 3]]));
        assert_eq!(snapshot.entity_names(), vec!["A", "B"]);
    }

    #[test]
    fn in_memory_source_returns_snapshot() {
        let snapshot = Snapshot::from_json_str(SAMPLE).unwrap();
        let source = InMemorySource::new(snapshot.clone());
        assert_eq!(source.load_latest().unwrap(), snapshot);
    }

    #[test]
    fn directory_source_picks_newest_match() {
        let dir = tempfile::tempdir().unwrap();
        let old = dir.path().join("vote_history_a.json");
        let new = dir.path().join("vote_history_b.json");
        let other = dir.path().join("notes.json");
        fs::write(&old, r#"{"OLD": []}"#).unwrap();
        fs::write(&new, r#"{"NEW": []}"#).unwrap();
        fs::write(&other, r#"{"OTHER": []}"#).unwrap();

        let base = SystemTime::now() - Duration::from_secs(3600);
        for (path, offset) in [(&old, 0), (&new, 60), (&other, 120)] {
            let file = fs::File::options().write(true).open(path).unwrap();
            file.set_modified(base + Duration::from_secs(offset)).unwrap();
        }

        let source = DirectorySource::new(dir.path());
        assert_eq!(source.latest_path().unwrap(), new);
        let snapshot = source.load_latest().unwrap();
        assert!(snapshot.get("NEW").is_some());
    }

    #[test]
    fn file_source_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        let source = FileSource::new(&path);
        assert!(matches!(
            source.load_latest(),
            Err(VvError::SnapshotUnavailable(_))
        ));
        fs::write(&path, SAMPLE).unwrap();
        assert_eq!(source.load_latest().unwrap().series().len(), 3);
    }

    #[test]
    fn directory_without_matches_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let source = DirectorySource::new(dir.path());
        assert!(matches!(
            source.load_latest(),
            Err(VvError::SnapshotUnavailable(_))
        ));
        let missing = DirectorySource::new(dir.path().join("nope"));
        assert!(matches!(
            missing.load_latest(),
            Err(VvError::SnapshotUnavailable(_))
        ));
    }

    #[test]
    fn pattern_needs_single_wildcard() {
        assert!(DirectorySource::with_pattern(".", "history.json").is_err());
        assert!(DirectorySource::with_pattern(".", "a*b*c").is_err());
        let source = DirectorySource::with_pattern(".", "votes-*.json").unwrap();
        assert!(source.matches("votes-2024.json"));
        assert!(!source.matches("votes-2024.csv"));
    }
}
