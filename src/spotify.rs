//! Genre lookup against the Spotify Web API.
//!
//! Uses the client-credentials flow: the bearer token is fetched lazily,
//! cached in-process and refreshed shortly before it expires. Artist search
//! prefers an exact (case-insensitive) name match over the first hit.

use crate::lookup::{Lookup, LookupError, CALL_TIMEOUT_SECS};
use crate::ratelimit::RateLimiter;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
const SEARCH_URL: &str = "https://api.spotify.com/v1/search";

// Refresh this many seconds before the token actually expires.
const TOKEN_EXPIRY_MARGIN_SECS: u64 = 60;

pub struct SpotifyClient {
    http: reqwest::Client,
    credentials: Option<(String, String)>,
    token: Mutex<Option<BearerToken>>,
    limiter: RateLimiter,
    token_url: String,
    search_url: String,
}

struct BearerToken {
    value: String,
    expires_at: Instant,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    artists: ArtistPage,
}

#[derive(Debug, Deserialize)]
struct ArtistPage {
    items: Vec<ArtistItem>,
}

#[derive(Debug, Deserialize)]
struct ArtistItem {
    name: String,
    #[serde(default)]
    genres: Vec<String>,
}

impl SpotifyClient {
    /// Build the client. Missing credentials are not an error: the client
    /// comes up unconfigured and resolve() refuses to make calls.
    pub fn new(
        client_id: Option<String>,
        client_secret: Option<String>,
        call_spacing: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(CALL_TIMEOUT_SECS))
            .build()
            .context("Failed to build HTTP client for Spotify")?;

        let credentials = match (client_id, client_secret) {
            (Some(id), Some(secret)) if !id.is_empty() && !secret.is_empty() => {
                Some((id, secret))
            }
            _ => None,
        };

        Ok(Self {
            http,
            credentials,
            token: Mutex::new(None),
            limiter: RateLimiter::new(call_spacing),
            token_url: TOKEN_URL.to_string(),
            search_url: SEARCH_URL.to_string(),
        })
    }

    #[cfg(test)]
    fn with_endpoints(mut self, token_url: &str, search_url: &str) -> Self {
        self.token_url = token_url.to_string();
        self.search_url = search_url.to_string();
        self
    }

    async fn bearer_token(&self) -> Result<String, LookupError> {
        let (id, secret) = self
            .credentials
            .as_ref()
            .ok_or(LookupError::Unconfigured)?;

        let mut guard = self.token.lock().await;
        if let Some(token) = guard.as_ref() {
            if Instant::now() < token.expires_at {
                return Ok(token.value.clone());
            }
        }

        // The token endpoint counts against the same call budget as search.
        self.limiter.wait().await;
        let resp = self
            .http
            .post(&self.token_url)
            .basic_auth(id, Some(secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(LookupError::Transient(format!(
                "token endpoint returned {}",
                resp.status()
            )));
        }
        let token: TokenResponse = resp.json().await?;

        let expires_at = Instant::now()
            + Duration::from_secs(token.expires_in.saturating_sub(TOKEN_EXPIRY_MARGIN_SECS));
        *guard = Some(BearerToken {
            value: token.access_token.clone(),
            expires_at,
        });
        Ok(token.access_token)
    }
}

#[async_trait]
impl Lookup for SpotifyClient {
    type Payload = Vec<String>;

    fn is_configured(&self) -> bool {
        self.credentials.is_some()
    }

    async fn resolve(&self, key: &str) -> Result<Vec<String>, LookupError> {
        let token = self.bearer_token().await?;
        self.limiter.wait().await;

        let query = format!("artist:\"{key}\"");
        let resp = self
            .http
            .get(&self.search_url)
            .bearer_auth(&token)
            .query(&[("q", query.as_str()), ("type", "artist"), ("limit", "5")])
            .send()
            .await?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            // Token was revoked or expired early; drop it so the next key
            // fetches a fresh one.
            self.token.lock().await.take();
            return Err(LookupError::Transient("search returned 401".to_string()));
        }
        if !status.is_success() {
            return Err(LookupError::Transient(format!("search returned {status}")));
        }

        let parsed: SearchResponse = resp.json().await?;
        let items = parsed.artists.items;
        let best = items
            .iter()
            .find(|artist| artist.name.eq_ignore_ascii_case(key))
            .or_else(|| items.first());

        match best {
            Some(artist) => Ok(artist.genres.clone()),
            None => Err(LookupError::NotFound),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_credentials_means_unconfigured() {
        let client = SpotifyClient::new(None, None, Duration::from_millis(100)).unwrap();
        assert!(!client.is_configured());
    }

    #[test]
    fn test_empty_credentials_mean_unconfigured() {
        let client = SpotifyClient::new(
            Some(String::new()),
            Some("secret".to_string()),
            Duration::from_millis(100),
        )
        .unwrap();
        assert!(!client.is_configured());
    }

    #[tokio::test]
    async fn test_unconfigured_resolve_fails_without_network() {
        let client = SpotifyClient::new(None, None, Duration::from_millis(100)).unwrap();
        let result = client.resolve("Caetano Veloso").await;
        assert!(matches!(result, Err(LookupError::Unconfigured)));
    }

    #[tokio::test]
    async fn test_rate_limit_covers_token_and_search_calls() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        use tokio::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let server_hits = hits.clone();

        tokio::spawn(async move {
            loop {
                let (mut socket, _) = match listener.accept().await {
                    Ok(conn) => conn,
                    Err(_) => break,
                };
                server_hits.fetch_add(1, Ordering::SeqCst);
                let mut buf = vec![0u8; 4096];
                let n = socket.read(&mut buf).await.unwrap_or(0);
                let request = String::from_utf8_lossy(&buf[..n]);
                let body = if request.starts_with("POST /token") {
                    r#"{"access_token": "tok", "token_type": "Bearer", "expires_in": 3600}"#
                } else {
                    r#"{"artists": {"items": [{"name": "A", "genres": ["rock"]}]}}"#
                };
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\n\
                     Content-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        let client = SpotifyClient::new(
            Some("id".to_string()),
            Some("secret".to_string()),
            Duration::from_millis(100),
        )
        .unwrap()
        .with_endpoints(
            &format!("http://{addr}/token"),
            &format!("http://{addr}/search"),
        );

        let start = Instant::now();
        assert_eq!(client.resolve("A").await.unwrap(), vec!["rock"]);
        assert_eq!(client.resolve("A").await.unwrap(), vec!["rock"]);

        // Three spaced calls in total: token fetch, then a search per key;
        // the second resolution reuses the cached token.
        assert_eq!(hits.load(Ordering::SeqCst), 3);
        assert!(start.elapsed() >= Duration::from_millis(200));
    }

    #[test]
    fn test_search_response_parses_genres() {
        let json = r#"{"artists": {"items": [
            {"name": "Gilberto Gil", "genres": ["mpb", "tropicalia"]},
            {"name": "Gilberto Gil Cover Band"}
        ]}}"#;
        let parsed: SearchResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.artists.items.len(), 2);
        assert_eq!(parsed.artists.items[0].genres, vec!["mpb", "tropicalia"]);
        assert!(parsed.artists.items[1].genres.is_empty());
    }
}
