//! Unsplash image-fetch client
//!
//! Searches the photo API per city query, saves photo metadata, and
//! downloads the small rendition of each photo into the city's image
//! directory. A photo that cannot be fetched is logged and skipped; the
//! city simply ends up with fewer images.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{CityQuery, FetchConfig};

/// Environment variable holding the API access key
pub const ACCESS_KEY_ENV: &str = "UNSPLASH_ACCESS_KEY";

const USER_AGENT: &str = concat!("chromatic_geography/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("No API key found; set UNSPLASH_ACCESS_KEY")]
    MissingKey,

    #[error("Rate limit exceeded after {0} retries")]
    RateLimited(u32),

    #[error("Network error: {0}")]
    Network(String),

    #[error("API error {0}: {1}")]
    Api(u16, String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl FetchError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<ApiPhoto>,
}

#[derive(Debug, Deserialize)]
struct ApiPhoto {
    id: String,
    color: Option<String>,
    description: Option<String>,
    alt_description: Option<String>,
    urls: PhotoUrls,
    user: ApiUser,
}

#[derive(Debug, Deserialize)]
struct ApiUser {
    name: String,
    username: String,
    links: ApiUserLinks,
}

#[derive(Debug, Deserialize)]
struct ApiUserLinks {
    html: String,
}

/// Renditions of a photo
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhotoUrls {
    pub raw: String,
    pub regular: String,
    pub small: String,
    pub thumb: String,
}

/// Photographer credit kept for attribution on the page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Photographer {
    pub name: String,
    pub username: String,
    pub profile: String,
}

/// Saved metadata for one photo
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhotoRecord {
    pub id: String,
    /// Average color reported by the API
    pub color: Option<String>,
    pub description: Option<String>,
    pub urls: PhotoUrls,
    pub photographer: Photographer,
}

impl From<ApiPhoto> for PhotoRecord {
    fn from(photo: ApiPhoto) -> Self {
        Self {
            id: photo.id,
            color: photo.color,
            description: photo.description.or(photo.alt_description),
            urls: photo.urls,
            photographer: Photographer {
                name: photo.user.name,
                username: photo.user.username,
                profile: photo.user.links.html,
            },
        }
    }
}

/// Parse a `/search/photos` response body
pub fn parse_search(body: &str) -> Result<Vec<PhotoRecord>, FetchError> {
    let response: SearchResponse =
        serde_json::from_str(body).map_err(|e| FetchError::Parse(e.to_string()))?;
    Ok(response.results.into_iter().map(PhotoRecord::from).collect())
}

/// Append photos whose ids have not been seen yet
fn push_unique(all: &mut Vec<PhotoRecord>, seen: &mut HashSet<String>, photos: Vec<PhotoRecord>) {
    for photo in photos {
        if seen.insert(photo.id.clone()) {
            all.push(photo);
        }
    }
}

/// Minimum spacing between consecutive calls
struct RateLimiter {
    last_request: Mutex<Option<Instant>>,
    min_interval: Duration,
}

impl RateLimiter {
    fn new(min_interval: Duration) -> Self {
        Self {
            last_request: Mutex::new(None),
            min_interval,
        }
    }

    fn wait(&self) {
        let mut last = self
            .last_request
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(last_time) = *last {
            let elapsed = last_time.elapsed();
            if elapsed < self.min_interval {
                let wait_time = self.min_interval - elapsed;
                debug!("Rate limiting: waiting {:?}", wait_time);
                std::thread::sleep(wait_time);
            }
        }

        *last = Some(Instant::now());
    }
}

/// Outcome of scraping one city
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScrapeSummary {
    pub photos: usize,
    pub downloaded: usize,
    pub already_present: usize,
    pub failed: usize,
}

pub struct UnsplashClient {
    http: reqwest::blocking::Client,
    access_key: String,
    config: FetchConfig,
    search_limiter: RateLimiter,
    download_limiter: RateLimiter,
}

impl UnsplashClient {
    pub fn new(access_key: impl Into<String>, config: FetchConfig) -> Result<Self, FetchError> {
        let access_key = access_key.into();
        if access_key.trim().is_empty() {
            return Err(FetchError::MissingKey);
        }

        let http = reqwest::blocking::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| FetchError::Network(e.to_string()))?;

        Ok(Self {
            http,
            access_key,
            search_limiter: RateLimiter::new(Duration::from_millis(config.request_delay_ms)),
            download_limiter: RateLimiter::new(Duration::from_millis(config.download_delay_ms)),
            config,
        })
    }

    /// Build a client from the access key in the environment
    pub fn from_env(config: FetchConfig) -> Result<Self, FetchError> {
        let key = std::env::var(ACCESS_KEY_ENV).map_err(|_| FetchError::MissingKey)?;
        Self::new(key, config)
    }

    /// One page of landscape search results
    pub fn search_photos(
        &self,
        query: &str,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<PhotoRecord>, FetchError> {
        let url = format!("{}/search/photos", self.config.base_url.trim_end_matches('/'));
        let page = page.to_string();
        let per_page = per_page.to_string();
        let params = [
            ("query", query),
            ("page", page.as_str()),
            ("per_page", per_page.as_str()),
            ("orientation", "landscape"),
        ];

        let mut retries = 0;
        loop {
            self.search_limiter.wait();
            debug!(query, page = %page, "searching photos");

            let response = self
                .http
                .get(&url)
                .header("Authorization", format!("Client-ID {}", self.access_key))
                .query(&params)
                .send()
                .map_err(|e| FetchError::Network(e.to_string()))?;

            let status = response.status();
            if status.as_u16() == 429 {
                if retries >= self.config.max_retries {
                    return Err(FetchError::RateLimited(retries));
                }
                retries += 1;
                let wait = Duration::from_secs(self.config.rate_limit_wait_secs);
                warn!(query, retry = retries, "rate limited, waiting {:?}", wait);
                std::thread::sleep(wait);
                continue;
            }
            if !status.is_success() {
                let text = response.text().unwrap_or_default();
                return Err(FetchError::Api(status.as_u16(), text));
            }

            let body = response
                .text()
                .map_err(|e| FetchError::Network(e.to_string()))?;
            return parse_search(&body);
        }
    }

    /// Raw bytes behind a photo URL
    pub fn download_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.download_limiter.wait();
        let response = self
            .http
            .get(url)
            .send()
            .map_err(|e| FetchError::Network(e.to_string()))?;
        let status = response.status();
        if status.as_u16() == 429 {
            return Err(FetchError::RateLimited(0));
        }
        if !status.is_success() {
            return Err(FetchError::Api(status.as_u16(), url.to_string()));
        }
        let bytes = response
            .bytes()
            .map_err(|e| FetchError::Network(e.to_string()))?;
        Ok(bytes.to_vec())
    }

    /// Search `query` and return the small rendition of up to `count` photos.
    /// Photos that fail to download are left out.
    pub fn fetch_images(&self, query: &str, count: u32) -> Result<Vec<(String, Vec<u8>)>, FetchError> {
        let photos = self.search_photos(query, 1, count)?;
        let mut images = Vec::with_capacity(photos.len());
        for photo in photos {
            match self.download_bytes(&photo.urls.small) {
                Ok(bytes) => images.push((photo.id, bytes)),
                Err(e) => warn!(query, photo = %photo.id, error = %e, "image unavailable"),
            }
        }
        Ok(images)
    }

    /// Search every query of `city`, save its metadata, and download images
    /// that are not already on disk.
    ///
    /// Search failures, rate limits included, end the search early; whatever
    /// was found up to that point is still saved and downloaded. Only local
    /// I/O failures are returned as errors.
    pub fn scrape_city(
        &self,
        city: &CityQuery,
        images_dir: &Path,
        metadata_dir: &Path,
    ) -> Result<ScrapeSummary, FetchError> {
        info!(city = %city.name, "scraping city");

        let mut photos = Vec::new();
        let mut seen = HashSet::new();
        'queries: for query in &city.queries {
            for page in 1..=self.config.pages_per_query {
                let results = match self.search_photos(query, page, self.config.images_per_query) {
                    Ok(results) => results,
                    Err(e @ FetchError::RateLimited(_)) => {
                        warn!(
                            city = %city.name,
                            query = %query,
                            error = %e,
                            collected = photos.len(),
                            "rate limited, continuing with the photos found so far"
                        );
                        break 'queries;
                    }
                    Err(e) => {
                        warn!(city = %city.name, query = %query, error = %e, "search failed");
                        break;
                    }
                };
                if results.is_empty() {
                    break;
                }
                push_unique(&mut photos, &mut seen, results);
            }
        }

        std::fs::create_dir_all(metadata_dir).map_err(|e| FetchError::io(metadata_dir, e))?;
        let metadata_path = metadata_dir.join(format!("{}.json", city.name));
        let json = serde_json::to_string_pretty(&photos).map_err(|e| FetchError::Parse(e.to_string()))?;
        std::fs::write(&metadata_path, json).map_err(|e| FetchError::io(&metadata_path, e))?;

        let city_dir = images_dir.join(&city.name);
        std::fs::create_dir_all(&city_dir).map_err(|e| FetchError::io(&city_dir, e))?;

        let mut summary = ScrapeSummary {
            photos: photos.len(),
            ..ScrapeSummary::default()
        };
        for photo in &photos {
            let path = image_path(&city_dir, &photo.id);
            if path.exists() {
                summary.already_present += 1;
                continue;
            }
            match self
                .download_bytes(&photo.urls.small)
                .and_then(|bytes| std::fs::write(&path, bytes).map_err(|e| FetchError::io(&path, e)))
            {
                Ok(()) => summary.downloaded += 1,
                Err(e) => {
                    warn!(city = %city.name, photo = %photo.id, error = %e, "download failed");
                    summary.failed += 1;
                }
            }
        }

        info!(
            city = %city.name,
            photos = summary.photos,
            downloaded = summary.downloaded,
            failed = summary.failed,
            "city scraped"
        );
        Ok(summary)
    }
}

fn image_path(city_dir: &Path, photo_id: &str) -> PathBuf {
    city_dir.join(format!("{photo_id}.jpg"))
}
