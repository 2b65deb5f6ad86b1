use crate::model::EnrichedEvent;
use anyhow::{Context, Result};
use std::path::Path;

/// Write the consolidated dataset as CSV, one row per listening event,
/// headers taken from the `EnrichedEvent` field names.
pub fn write_csv(path: &Path, rows: &[EnrichedEvent]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create output directory {parent:?}"))?;
        }
    }

    let mut writer =
        csv::Writer::from_path(path).with_context(|| format!("Failed to open {path:?}"))?;
    for row in rows {
        writer
            .serialize(row)
            .context("Failed to serialize enriched event")?;
    }
    writer.flush().context("Failed to flush CSV output")?;
    Ok(())
}

/// Read a previously written dataset back in (used by the cache report).
pub fn read_csv(path: &Path) -> Result<Vec<EnrichedEvent>> {
    let mut reader =
        csv::Reader::from_path(path).with_context(|| format!("Failed to open {path:?}"))?;
    let mut rows = Vec::new();
    for record in reader.deserialize() {
        rows.push(record.context("Failed to parse enriched event row")?);
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{GeoInfo, RawEvent};
    use chrono::{TimeZone, Utc};

    fn sample_row() -> EnrichedEvent {
        let raw = RawEvent {
            timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
            platform: Some("ios".to_string()),
            ms_played: Some(60_000),
            country: Some("BR".to_string()),
            ip_addr: Some("1.2.3.4".to_string()),
            track: Some("Track, with comma".to_string()),
            artist: Some("Artist A".to_string()),
            album: Some("Album".to_string()),
            offline: Some(false),
            incognito: Some(false),
        };
        let genres = vec!["rock".to_string(), "pop".to_string()];
        let geo = GeoInfo {
            city: "Osasco".to_string(),
            region: "Sao Paulo".to_string(),
            isp: "Vivo".to_string(),
        };
        EnrichedEvent::build(&raw, Some(&genres), Some(&geo))
    }

    #[test]
    fn test_round_trip_preserves_rows_and_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");

        let rows = vec![sample_row()];
        write_csv(&path, &rows).unwrap();

        let back = read_csv(&path).unwrap();
        assert_eq!(back.len(), 1);
        // Timestamp column must stay a timezone-aware instant.
        assert_eq!(back[0].ts, rows[0].ts);
        assert_eq!(back[0].genres, "rock, pop");
        assert_eq!(back[0].track, "Track, with comma");
    }

    #[test]
    fn test_header_includes_enrichment_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        write_csv(&path, &[sample_row()]).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let header = content.lines().next().unwrap();
        for column in ["ts", "genres", "city", "region", "isp", "s_played", "min_played"] {
            assert!(header.split(',').any(|h| h == column), "missing {column}");
        }
    }
}
