//! Import and export of reorientations, segment scores and state snapshots.
//!
//! Reorientations and scores are kept in CSV tables with one row per input
//! file, snapshots are pretty-printed JSON.

use std::fs;
use std::path::Path;

use crate::polar::SegmentScores;

use log::info;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid segment scores `{0}`")]
    InvalidScores(String),
}

/// Reorientation of one input file. The center is a physical point in mm.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReorientationRecord {
    pub filename: String,
    pub angle_x: f64,
    pub angle_y: f64,
    pub angle_z: f64,
    pub center_x: f64,
    pub center_y: f64,
    pub center_z: f64,
}

#[derive(Serialize, Deserialize)]
struct ScoreRow {
    filename: String,
    segment_scores: String,
}

pub fn write_reorientations(
    path: impl AsRef<Path>,
    records: &[ReorientationRecord],
) -> Result<(), PersistError> {
    let mut writer = csv::Writer::from_path(path.as_ref())?;
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    info!(
        "wrote {} reorientation(s) to {}",
        records.len(),
        path.as_ref().display()
    );
    Ok(())
}

pub fn read_reorientations(path: impl AsRef<Path>) -> Result<Vec<ReorientationRecord>, PersistError> {
    let mut reader = csv::Reader::from_path(path)?;
    let records = reader.deserialize().collect::<Result<Vec<_>, _>>()?;
    Ok(records)
}

/// Row of `filename` in a reorientation table.
pub fn find_reorientation(
    path: impl AsRef<Path>,
    filename: &str,
) -> Result<Option<ReorientationRecord>, PersistError> {
    Ok(read_reorientations(path)?
        .into_iter()
        .find(|record| record.filename == filename))
}

/// Replace the row of `record.filename`, or append one.
pub fn upsert_reorientation(
    path: impl AsRef<Path>,
    record: &ReorientationRecord,
) -> Result<(), PersistError> {
    let path = path.as_ref();
    let mut records = if path.is_file() {
        read_reorientations(path)?
    } else {
        Vec::new()
    };
    records.retain(|r| r.filename != record.filename);
    records.push(record.clone());
    write_reorientations(path, &records)
}

pub fn read_segment_scores(
    path: impl AsRef<Path>,
) -> Result<Vec<(String, SegmentScores)>, PersistError> {
    let mut reader = csv::Reader::from_path(path)?;
    reader
        .deserialize::<ScoreRow>()
        .map(|row| {
            let row = row?;
            let scores = parse_scores(&row.segment_scores)?;
            Ok((row.filename, scores))
        })
        .collect()
}

/// Store `scores` for `filename`, replacing an existing row of that file.
pub fn upsert_segment_scores(
    path: impl AsRef<Path>,
    filename: &str,
    scores: &SegmentScores,
) -> Result<(), PersistError> {
    let path = path.as_ref();
    let mut rows = Vec::new();
    if path.is_file() {
        let mut reader = csv::Reader::from_path(path)?;
        for row in reader.deserialize::<ScoreRow>() {
            let row = row?;
            if row.filename != filename {
                rows.push(row);
            }
        }
    }
    rows.push(ScoreRow {
        filename: filename.to_owned(),
        segment_scores: scores.to_string(),
    });

    let mut writer = csv::Writer::from_path(path)?;
    for row in &rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    info!("wrote segment scores of {filename} to {}", path.display());
    Ok(())
}

fn parse_scores(text: &str) -> Result<SegmentScores, PersistError> {
    let invalid = || PersistError::InvalidScores(text.to_owned());
    let values = text
        .split(';')
        .map(|s| s.trim().parse::<u8>().map_err(|_| invalid()))
        .collect::<Result<Vec<_>, _>>()?;
    let values: [u8; 17] = values.try_into().map_err(|_| invalid())?;
    Ok(SegmentScores(values))
}

pub fn save_snapshot<T: Serialize>(path: impl AsRef<Path>, snapshot: &T) -> Result<(), PersistError> {
    let json = serde_json::to_string_pretty(snapshot)?;
    fs::write(path.as_ref(), json)?;
    info!("saved state to {}", path.as_ref().display());
    Ok(())
}

pub fn load_snapshot<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T, PersistError> {
    let data = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&data)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(filename: &str, angle: f64) -> ReorientationRecord {
        ReorientationRecord {
            filename: filename.to_owned(),
            angle_x: angle,
            angle_y: 0.0,
            angle_z: -angle,
            center_x: 1.5,
            center_y: -2.0,
            center_z: 100.25,
        }
    }

    #[test]
    fn reorientation_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reorientation.csv");
        write_reorientations(&path, &[record("a.dcm", 0.1), record("b.dcm", 0.2)]).unwrap();

        let header = fs::read_to_string(&path).unwrap();
        assert!(header.starts_with("filename,angle_x,angle_y,angle_z,center_x,center_y,center_z"));

        assert_eq!(find_reorientation(&path, "b.dcm").unwrap(), Some(record("b.dcm", 0.2)));
        assert_eq!(find_reorientation(&path, "c.dcm").unwrap(), None);

        upsert_reorientation(&path, &record("a.dcm", 0.7)).unwrap();
        let records = read_reorientations(&path).unwrap();
        assert_eq!(records, vec![record("b.dcm", 0.2), record("a.dcm", 0.7)]);
    }

    #[test]
    fn segment_scores_are_replaced_per_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scores.csv");
        let mut scores = SegmentScores([50; 17]);
        upsert_segment_scores(&path, "a.dcm", &scores).unwrap();
        upsert_segment_scores(&path, "b.dcm", &scores).unwrap();
        scores.0[3] = 7;
        upsert_segment_scores(&path, "a.dcm", &scores).unwrap();

        let rows = read_segment_scores(&path).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], ("b.dcm".to_owned(), SegmentScores([50; 17])));
        assert_eq!(rows[1], ("a.dcm".to_owned(), scores));
    }

    #[test]
    fn malformed_scores() {
        assert!(matches!(parse_scores("1;2;3"), Err(PersistError::InvalidScores(_))));
        assert!(parse_scores(&SegmentScores([9; 17]).to_string()).is_ok());
    }

    #[test]
    fn snapshot_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        save_snapshot(&path, &record("a.dcm", 0.3)).unwrap();
        let loaded: ReorientationRecord = load_snapshot(&path).unwrap();
        assert_eq!(loaded, record("a.dcm", 0.3));
        assert!(matches!(
            load_snapshot::<ReorientationRecord>(dir.path().join("missing.json")),
            Err(PersistError::Io(_))
        ));
    }
}
