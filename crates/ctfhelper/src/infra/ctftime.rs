use log::{debug, error};
use mime::Mime;
use rand::seq::IndexedRandom;
use reqwest::{header::USER_AGENT, Client, StatusCode, Url};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{collections::HashMap, time::Duration};
use thiserror::Error;

/// Browser agents rotated across requests; the index rejects library defaults.
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/13.0.5 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/103.0.5060.53 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Windows; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/103.0.5060.114 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_10_5) AppleWebKit/603.3.8 (KHTML, like Gecko) Version/10.1.2 Safari/603.3.8",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/14.0 Safari/605.1.15",
];

#[derive(Error, Debug)]
pub enum Error {
    #[error("item not found: {0}")]
    NotFound(String),
    #[error("problem sending request to event index: {0}")]
    Send(#[from] reqwest::Error),
    #[error("problem requesting event index: {0}")]
    Request(String),
    #[error("unexpected payload from event index: {0}")]
    Decode(String),
}

/// Event metadata as published by the index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Event {
    pub id: i64,
    pub title: String,
    pub start: String,
    pub finish: String,
    pub url: String,
    pub ctftime_url: String,
    pub description: String,
    pub format: String,
    pub location: String,
    pub weight: f64,
    pub prizes: String,
    pub logo: String,
    pub onsite: bool,
    pub duration: EventDuration,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventDuration {
    pub days: i64,
    pub hours: i64,
}

/// The configured team's line in an event's result roster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TeamResult {
    pub place: i64,
    pub score: i64,
    pub solves: i64,
}

#[derive(Debug, Clone)]
pub struct Logo {
    pub data: Vec<u8>,
    pub mime: Mime,
}

impl Logo {
    pub fn file_name(&self) -> String {
        format!("logo.{}", self.mime.subtype())
    }
}

#[derive(Debug, Deserialize)]
struct RosterEntry {
    team_id: i64,
    #[serde(default)]
    place: i64,
    #[serde(default)]
    points: String,
    #[serde(default)]
    solves: i64,
}

#[derive(Debug, Deserialize)]
struct EventResults {
    #[serde(default)]
    scores: Vec<RosterEntry>,
}

#[async_trait::async_trait]
pub trait EventIndex: Send + Sync {
    async fn get_event(&self, id: i64) -> Result<Event, Error>;
    async fn upcoming_events(&self, limit: usize) -> Result<Vec<Event>, Error>;
    /// `Ok(None)` when the event or the team is missing from the roster.
    async fn team_result(
        &self,
        year: i32,
        event_id: i64,
        team_id: i64,
    ) -> Result<Option<TeamResult>, Error>;
    async fn fetch_logo(&self, url: &str) -> Result<Logo, Error>;
}

#[derive(Clone)]
pub struct CtftimeClient {
    pub base_url: Url,
    client: Client,
    max_logo_bytes: usize,
}

impl CtftimeClient {
    pub fn new(base_url: &Url, timeout: Duration, max_logo_bytes: usize) -> Result<Self, Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.to_owned(),
            client,
            max_logo_bytes,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, Error> {
        self.base_url
            .join(path)
            .map_err(|e| Error::Request(e.to_string()))
    }

    async fn get(&self, url: Url, not_found_message: String) -> Result<reqwest::Response, Error> {
        let agent = USER_AGENTS
            .choose(&mut rand::rng())
            .copied()
            .unwrap_or(USER_AGENTS[0]);
        debug!("requesting {}", url);

        let response = self
            .client
            .get(url)
            .header(USER_AGENT, agent)
            .send()
            .await
            .map_err(|e| {
                error!("error sending to event index: {}", e);
                Error::Send(e)
            })?;

        match response.status() {
            status if status.is_success() => Ok(response),
            StatusCode::NOT_FOUND => Err(Error::NotFound(not_found_message)),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(Error::Request(format!(
                    "error response from event index with status {}: {:?}",
                    status, body
                )))
            }
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: Url,
        not_found_message: String,
    ) -> Result<T, Error> {
        let response = self.get(url, not_found_message).await?;
        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|e| Error::Decode(e.to_string()))
    }
}

#[async_trait::async_trait]
impl EventIndex for CtftimeClient {
    async fn get_event(&self, id: i64) -> Result<Event, Error> {
        let url = self.endpoint(&format!("events/{}/", id))?;
        self.get_json(url, format!("event with id {} not found", id))
            .await
    }

    async fn upcoming_events(&self, limit: usize) -> Result<Vec<Event>, Error> {
        let mut url = self.endpoint("events/")?;
        url.query_pairs_mut()
            .append_pair("limit", &limit.to_string());
        self.get_json(url, String::from("no upcoming events"))
            .await
    }

    async fn team_result(
        &self,
        year: i32,
        event_id: i64,
        team_id: i64,
    ) -> Result<Option<TeamResult>, Error> {
        let url = self.endpoint(&format!("results/{}/", year))?;
        let roster: HashMap<String, EventResults> = self
            .get_json(url, format!("no results for {}", year))
            .await?;
        team_result_from_roster(&roster, event_id, team_id)
    }

    async fn fetch_logo(&self, url: &str) -> Result<Logo, Error> {
        let url = Url::parse(url).map_err(|e| Error::Request(e.to_string()))?;
        let response = self.get(url, String::from("logo not found")).await?;
        let data = read_capped(response, self.max_logo_bytes).await?;
        let mime = sniff_image(&data)
            .ok_or_else(|| Error::Decode(String::from("logo is not a known image format")))?;
        Ok(Logo { data, mime })
    }
}

/// Reads the body, giving up as soon as it grows past `limit` bytes.
async fn read_capped(mut response: reqwest::Response, limit: usize) -> Result<Vec<u8>, Error> {
    let too_large = |size: u64| {
        Error::Decode(format!(
            "logo of {} bytes exceeds limit of {}",
            size, limit
        ))
    };
    if let Some(length) = response.content_length() {
        if length > limit as u64 {
            return Err(too_large(length));
        }
    }

    let mut data = Vec::new();
    while let Some(chunk) = response.chunk().await? {
        if data.len() + chunk.len() > limit {
            return Err(too_large((data.len() + chunk.len()) as u64));
        }
        data.extend_from_slice(&chunk);
    }
    Ok(data)
}

fn team_result_from_roster(
    roster: &HashMap<String, EventResults>,
    event_id: i64,
    team_id: i64,
) -> Result<Option<TeamResult>, Error> {
    let Some(results) = roster.get(&event_id.to_string()) else {
        debug!("event {} not in results roster", event_id);
        return Ok(None);
    };
    let Some(entry) = results.scores.iter().find(|entry| entry.team_id == team_id) else {
        debug!("team {} not in results for event {}", team_id, event_id);
        return Ok(None);
    };
    let points: f64 = entry
        .points
        .trim()
        .parse()
        .map_err(|e| Error::Decode(format!("points {:?}: {}", entry.points, e)))?;

    Ok(Some(TeamResult {
        place: entry.place,
        score: points as i64,
        solves: entry.solves,
    }))
}

/// Detects the image type from its leading bytes.
pub fn sniff_image(data: &[u8]) -> Option<Mime> {
    if data.starts_with(&[0x89, b'P', b'N', b'G']) {
        Some(mime::IMAGE_PNG)
    } else if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some(mime::IMAGE_JPEG)
    } else if data.starts_with(b"GIF8") {
        Some(mime::IMAGE_GIF)
    } else if data.len() >= 12 && &data[0..4] == b"RIFF" && &data[8..12] == b"WEBP" {
        "image/webp".parse().ok()
    } else {
        None
    }
}
