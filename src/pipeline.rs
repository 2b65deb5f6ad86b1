//! Pipeline orchestrator: ingest raw exports, run the genre and geolocation
//! enrichers, merge, and write the consolidated CSV.

use crate::cache::{CacheEntry, CacheStore};
use crate::enricher::Enricher;
use crate::ingest;
use crate::ipinfo::IpinfoClient;
use crate::lookup::Lookup;
use crate::model::{EnrichedEvent, GeoInfo};
use crate::output;
use crate::spotify::SpotifyClient;
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const GENRE_CACHE_FILE: &str = "genre_cache.json";
pub const GEO_CACHE_FILE: &str = "geo_cache.json";

#[derive(Debug, Default)]
pub struct Credentials {
    pub spotify_client_id: Option<String>,
    pub spotify_client_secret: Option<String>,
    pub ipinfo_token: Option<String>,
}

pub struct PipelineConfig {
    pub input_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub output_file: PathBuf,
    pub credentials: Credentials,
    pub call_spacing: Duration,
    pub workers: usize,
}

pub async fn run(config: PipelineConfig) -> Result<()> {
    let events = ingest::read_all(&config.input_dir)?;
    println!("Consolidated {} events.", events.len());

    // Genre dimension, keyed by artist name.
    let genre_cache = CacheStore::load(&config.cache_dir.join(GENRE_CACHE_FILE))
        .context("Refusing to run with an unreadable genre cache")?;
    let spotify = SpotifyClient::new(
        config.credentials.spotify_client_id,
        config.credentials.spotify_client_secret,
        config.call_spacing,
    )?;
    if !spotify.is_configured() {
        println!("Spotify credentials absent; genre columns will be \"unknown\".");
    }
    let mut genre_enricher = Enricher::new(genre_cache, spotify).with_workers(config.workers);
    let genres = genre_enricher
        .enrich(&events, |e| e.artist.as_deref())
        .await?;
    println!(
        "Genre cache holds {} artists.",
        genre_enricher.cache().len()
    );

    // Geolocation dimension, keyed by network address.
    let geo_cache = CacheStore::load(&config.cache_dir.join(GEO_CACHE_FILE))
        .context("Refusing to run with an unreadable geo cache")?;
    let ipinfo = IpinfoClient::new(config.credentials.ipinfo_token, config.call_spacing)?;
    if !ipinfo.is_configured() {
        println!("ipinfo token absent; location columns will be \"unknown\".");
    }
    let mut geo_enricher = Enricher::new(geo_cache, ipinfo).with_workers(config.workers);
    let locations = geo_enricher
        .enrich(&events, |e| e.ip_addr.as_deref())
        .await?;
    println!(
        "Geo cache holds {} addresses.",
        geo_enricher.cache().len()
    );

    let rows: Vec<EnrichedEvent> = events
        .iter()
        .zip(genres.iter().zip(locations.iter()))
        .map(|(raw, (genre, geo))| EnrichedEvent::build(raw, genre.as_deref(), geo.as_ref()))
        .collect();

    output::write_csv(&config.output_file, &rows)?;
    println!("Wrote {} enriched rows to {:?}", rows.len(), config.output_file);
    Ok(())
}

/// Operator view of both caches: entry counts and the keys that hold error
/// markers, which are the ones worth clearing for a re-fetch. With a
/// dataset path, also prints the most-played artists.
pub fn cache_report(cache_dir: &Path, dataset: Option<&Path>) -> Result<()> {
    let genre_cache: CacheStore<Vec<String>> = CacheStore::load(&cache_dir.join(GENRE_CACHE_FILE))
        .context("Genre cache unreadable")?;
    let geo_cache: CacheStore<GeoInfo> =
        CacheStore::load(&cache_dir.join(GEO_CACHE_FILE)).context("Geo cache unreadable")?;

    print_cache_summary("Genre", &genre_cache);
    print_cache_summary("Geo", &geo_cache);

    if let Some(path) = dataset {
        let rows = output::read_csv(path)?;
        println!("\nTop artists by play time:");
        for (artist, ms_played) in top_artists(&rows, 10) {
            println!("  {:>8.1} min  {}", ms_played as f64 / 60_000.0, artist);
        }
    }
    Ok(())
}

fn print_cache_summary<V>(name: &str, cache: &CacheStore<V>)
where
    V: Serialize + DeserializeOwned + Clone,
{
    let failed: Vec<(&String, &String)> = cache
        .iter()
        .filter_map(|(key, entry)| match entry {
            CacheEntry::Failed { error } => Some((key, error)),
            CacheEntry::Resolved(_) => None,
        })
        .collect();

    println!(
        "{name} cache ({:?}): {} keys, {} error markers",
        cache.path(),
        cache.len(),
        failed.len()
    );
    for (key, cause) in failed {
        println!("  ! {key}: {cause}");
    }
}

/// Aggregate play time per artist, descending, ties broken by name.
fn top_artists(rows: &[EnrichedEvent], limit: usize) -> Vec<(String, u64)> {
    let mut played: HashMap<&str, u64> = HashMap::new();
    for row in rows {
        if !row.artist.is_empty() {
            *played.entry(row.artist.as_str()).or_default() += row.ms_played;
        }
    }
    let mut ranked: Vec<(String, u64)> = played
        .into_iter()
        .map(|(artist, ms)| (artist.to_string(), ms))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(limit);
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RawEvent;
    use chrono::{TimeZone, Utc};

    fn row(artist: &str, ms_played: u64) -> EnrichedEvent {
        let raw = RawEvent {
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            platform: None,
            ms_played: Some(ms_played),
            country: None,
            ip_addr: None,
            track: None,
            artist: if artist.is_empty() {
                None
            } else {
                Some(artist.to_string())
            },
            album: None,
            offline: None,
            incognito: None,
        };
        EnrichedEvent::build(&raw, None, None)
    }

    #[test]
    fn test_top_artists_sums_and_ranks_play_time() {
        let rows = vec![
            row("A", 1000),
            row("B", 5000),
            row("A", 3000),
            row("", 9000),
        ];
        let ranked = top_artists(&rows, 10);
        assert_eq!(
            ranked,
            vec![("B".to_string(), 5000), ("A".to_string(), 4000)]
        );
    }

    #[test]
    fn test_top_artists_respects_limit() {
        let rows = vec![row("A", 1), row("B", 2), row("C", 3)];
        assert_eq!(top_artists(&rows, 2).len(), 2);
    }
}
