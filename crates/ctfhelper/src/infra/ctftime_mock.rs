use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        RwLock,
    },
};

use async_trait::async_trait;
use log::debug;

use super::ctftime::{sniff_image, Error, Event, EventIndex, Logo, TeamResult};

/// Smallest byte run that sniffs as png.
pub const PNG_MAGIC: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

/// Event index served from memory, for local runs and tests.
#[derive(Default)]
pub struct MockCtfTime {
    events: RwLock<HashMap<i64, Event>>,
    results: RwLock<HashMap<(i32, i64, i64), TeamResult>>,
    logos: RwLock<HashMap<String, Vec<u8>>>,
    fail_results: RwLock<bool>,
    get_event_calls: AtomicUsize,
    team_result_calls: AtomicUsize,
}

impl MockCtfTime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a handful of upcoming events so a fresh local bot has something to show.
    pub fn with_sample_events() -> Self {
        let mock = Self::new();
        let base = time::OffsetDateTime::now_utc() + time::Duration::days(2);
        for (offset, (id, title)) in [(90001, "Local Quals"), (90002, "Sample Jeopardy")]
            .into_iter()
            .enumerate()
        {
            let start = base + time::Duration::days(offset as i64);
            let finish = start + time::Duration::days(1);
            let format = &time::format_description::well_known::Rfc3339;
            mock.add_event(Event {
                id,
                title: title.to_string(),
                start: start.format(format).unwrap_or_default(),
                finish: finish.format(format).unwrap_or_default(),
                url: format!("https://ctf{}.example", id),
                ctftime_url: format!("https://ctftime.org/event/{}/", id),
                description: format!("{} description", title),
                format: String::from("Jeopardy"),
                ..Default::default()
            });
        }
        mock
    }

    pub fn add_event(&self, event: Event) {
        let mut events = self.events.write().unwrap_or_else(|e| e.into_inner());
        events.insert(event.id, event);
    }

    pub fn set_team_result(&self, year: i32, event_id: i64, team_id: i64, result: TeamResult) {
        let mut results = self.results.write().unwrap_or_else(|e| e.into_inner());
        results.insert((year, event_id, team_id), result);
    }

    pub fn set_logo(&self, url: &str, data: Vec<u8>) {
        let mut logos = self.logos.write().unwrap_or_else(|e| e.into_inner());
        logos.insert(url.to_string(), data);
    }

    /// Makes every results lookup fail with a request error.
    pub fn fail_results(&self, fail: bool) {
        *self.fail_results.write().unwrap_or_else(|e| e.into_inner()) = fail;
    }

    pub fn get_event_calls(&self) -> usize {
        self.get_event_calls.load(Ordering::SeqCst)
    }

    pub fn team_result_calls(&self) -> usize {
        self.team_result_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventIndex for MockCtfTime {
    async fn get_event(&self, id: i64) -> Result<Event, Error> {
        self.get_event_calls.fetch_add(1, Ordering::SeqCst);
        let events = self.events.read().unwrap_or_else(|e| e.into_inner());
        events
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("event {} not found", id)))
    }

    async fn upcoming_events(&self, limit: usize) -> Result<Vec<Event>, Error> {
        let events = self.events.read().unwrap_or_else(|e| e.into_inner());
        let mut upcoming: Vec<Event> = events.values().cloned().collect();
        upcoming.sort_by(|a, b| a.start.cmp(&b.start).then(a.id.cmp(&b.id)));
        upcoming.truncate(limit);
        Ok(upcoming)
    }

    async fn team_result(
        &self,
        year: i32,
        event_id: i64,
        team_id: i64,
    ) -> Result<Option<TeamResult>, Error> {
        self.team_result_calls.fetch_add(1, Ordering::SeqCst);
        if *self.fail_results.read().unwrap_or_else(|e| e.into_inner()) {
            return Err(Error::Request(String::from("results unavailable")));
        }
        let results = self.results.read().unwrap_or_else(|e| e.into_inner());
        debug!("mock results lookup {} {} {}", year, event_id, team_id);
        Ok(results.get(&(year, event_id, team_id)).cloned())
    }

    async fn fetch_logo(&self, url: &str) -> Result<Logo, Error> {
        let logos = self.logos.read().unwrap_or_else(|e| e.into_inner());
        let data = logos
            .get(url)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("logo {} not found", url)))?;
        let mime = sniff_image(&data)
            .ok_or_else(|| Error::Decode(format!("logo {} is not an image", url)))?;
        Ok(Logo { data, mime })
    }
}
