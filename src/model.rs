use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sentinel written to enrichment columns when a key was absent, the lookup
/// failed, or the service had no match. Distinct from the empty string used
/// for absent raw fields.
pub const UNKNOWN: &str = "unknown";

/// One listening event as exported in a Spotify extended streaming history
/// file. Field names follow the export format; missing/null values become
/// `None` rather than rejecting the record. Never mutated by enrichment.
#[derive(Debug, Clone, Deserialize)]
pub struct RawEvent {
    #[serde(rename = "ts")]
    pub timestamp: DateTime<Utc>,
    pub platform: Option<String>,
    // Exports carry explicit nulls here as well as missing fields
    #[serde(default)]
    pub ms_played: Option<u64>,
    #[serde(rename = "conn_country")]
    pub country: Option<String>,
    // Older exports call this field ip_addr_decrypted
    #[serde(alias = "ip_addr_decrypted")]
    pub ip_addr: Option<String>,
    #[serde(rename = "master_metadata_track_name")]
    pub track: Option<String>,
    #[serde(rename = "master_metadata_album_artist_name")]
    pub artist: Option<String>,
    #[serde(rename = "master_metadata_album_album_name")]
    pub album: Option<String>,
    #[serde(default)]
    pub offline: Option<bool>,
    #[serde(rename = "incognito_mode")]
    pub incognito: Option<bool>,
}

/// Geographic origin of a network address, as cached and as emitted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeoInfo {
    pub city: String,
    pub region: String,
    pub isp: String,
}

/// One output row: every raw field plus the enrichment columns and the
/// derived play-duration columns. Timestamps serialize as RFC 3339 so the
/// column stays re-parseable as a timezone-aware instant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichedEvent {
    pub ts: DateTime<Utc>,
    pub platform: String,
    pub ms_played: u64,
    pub s_played: f64,
    pub min_played: f64,
    pub conn_country: String,
    pub ip_addr: String,
    pub track: String,
    pub artist: String,
    pub album: String,
    pub offline: bool,
    pub incognito: bool,
    pub genres: String,
    pub city: String,
    pub region: String,
    pub isp: String,
}

impl EnrichedEvent {
    /// Combine a raw event with the projections of both enrichment
    /// dimensions. `None` or an empty payload means the dimension could not
    /// be resolved and the columns get the "unknown" sentinel.
    pub fn build(raw: &RawEvent, genres: Option<&[String]>, geo: Option<&GeoInfo>) -> Self {
        let genres = match genres {
            Some(list) if !list.is_empty() => list.join(", "),
            _ => UNKNOWN.to_string(),
        };
        let (city, region, isp) = match geo {
            Some(g) => (
                non_empty_or_unknown(&g.city),
                non_empty_or_unknown(&g.region),
                non_empty_or_unknown(&g.isp),
            ),
            None => (
                UNKNOWN.to_string(),
                UNKNOWN.to_string(),
                UNKNOWN.to_string(),
            ),
        };

        let ms_played = raw.ms_played.unwrap_or(0);
        Self {
            ts: raw.timestamp,
            platform: raw.platform.clone().unwrap_or_default(),
            ms_played,
            s_played: ms_played as f64 / 1000.0,
            min_played: ms_played as f64 / 60_000.0,
            conn_country: raw.country.clone().unwrap_or_default(),
            ip_addr: raw.ip_addr.clone().unwrap_or_default(),
            track: raw.track.clone().unwrap_or_default(),
            artist: raw.artist.clone().unwrap_or_default(),
            album: raw.album.clone().unwrap_or_default(),
            offline: raw.offline.unwrap_or(false),
            incognito: raw.incognito.unwrap_or(false),
            genres,
            city,
            region,
            isp,
        }
    }
}

fn non_empty_or_unknown(value: &str) -> String {
    if value.is_empty() {
        UNKNOWN.to_string()
    } else {
        value.to_string()
    }
}
