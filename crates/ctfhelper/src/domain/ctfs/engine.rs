use std::{
    collections::HashSet,
    sync::{Arc, Mutex},
};

use ctfhelper_core::{
    check_candidate_count, display_name, parse_event_time, parse_poll_option, poll_option,
    resolve_votes, truncate_description, truncate_with_ellipsis, year_from_name, EventStatus,
    Transition, VoteOutcome, VoteWindow, ARCHIVED_ROLE_COLOR, FEED_EMBED_COLOR,
    MAX_DESCRIPTION_LEN, MAX_EVENT_DESCRIPTION_LEN, MAX_ROLE_COLOR, POLL_DURATION_HOURS,
};
use itertools::Itertools;
use log::{debug, error, info, warn};
use rand::Rng;
use secrecy::{ExposeSecret, SecretString};
use time::OffsetDateTime;

use crate::{
    domain::{Error, ServerConfig, ServerStore},
    infra::{
        chat::{
            ChannelAccess, ChannelSpec, ChatError, ChatPlatform, Embed, ImageAttachment,
            OutgoingMessage, OverwriteTarget, PermissionOverwrite, PollSpec, RoleSpec, RoleUpdate,
            ScheduledEventSpec,
        },
        ctftime::{Error as EventIndexError, Event, EventIndex},
    },
};

use super::{
    CtfLookup, CtfStore, Credentials, Ctf, NewCtf, Report, StatusTracker, UNKNOWN_RANK,
};

pub type Clock = Arc<dyn Fn() -> OffsetDateTime + Send + Sync>;

pub const FEED_FOOTER: &str =
    "Add a reaction to get the ctf role (only if you want to participate). 🙃";
pub const ROLE_REACTION: char = '✅';
pub const FLAG_REACTION: char = '🔥';
pub const CREDS_MODAL_PREFIX: &str = "creds_modal_";
pub const VOTE_MESSAGE: &str = "It's time to vote for the next CTF! Cast your vote below: 🗳️";
pub const VOTE_QUESTION: &str = "Vote the next CTF to participate in! 🎉";
pub const NEXT_CTFS_DEFAULT_LIMIT: usize = 5;
pub const NEXT_CTFS_MAX_LIMIT: usize = 10;
/// Upcoming events scanned when collecting vote candidates.
const VOTE_LOOKAHEAD: usize = 100;
const CREDS_EMBED_COLOR: u32 = 0x57F287;
const CHALLENGE_EMBED_COLOR: u32 = 0x5865F2;
/// Role color the feed embed uses; never handed out to a ctf role.
const RESERVED_ROLE_COLOR: u32 = FEED_EMBED_COLOR;

/// Who invoked a command, and where.
#[derive(Debug, Clone, Default)]
pub struct Caller {
    pub user_id: u64,
    pub guild_id: Option<u64>,
    pub channel_id: u64,
    pub role_ids: Vec<u64>,
    pub is_admin: bool,
}

impl Caller {
    pub fn guild(&self) -> Result<u64, Error> {
        self.guild_id.ok_or(Error::GuildOnly)
    }

    fn require_role(&self, role_id: Option<u64>) -> Result<(), Error> {
        match role_id {
            Some(role_id) if self.role_ids.contains(&role_id) => Ok(()),
            _ => Err(Error::MissingPermission(self.user_id)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlagReceipt {
    pub ctf_id: i64,
    pub channel_id: u64,
    pub message_id: u64,
    pub solves: i64,
}

/// Which completion side effects went through.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompletionOutcome {
    pub moved: bool,
    pub role_neutralized: bool,
    pub announced: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusOutcome {
    Ignored,
    /// No ctf matches the scheduled event.
    Unresolved,
    Started { ctf_id: i64 },
    Completed { ctf_id: i64, outcome: CompletionOutcome },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollResolution {
    NoVotes,
    Created(Ctf),
    Tie(Vec<usize>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovalReport {
    pub ctf: Ctf,
    pub role_deleted: bool,
    pub event_deleted: bool,
    pub feed_message_deleted: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VotePosted {
    pub message_id: u64,
    pub candidates: Vec<Event>,
}

#[derive(Debug, Clone, Default)]
pub struct Challenge {
    pub name: String,
    pub category: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug)]
pub enum CredsLookup {
    Found(Embed),
    /// Nothing stored yet; the member should be asked through this modal.
    Missing { modal_id: String },
}

pub fn role_mention(role_id: u64) -> String {
    format!("<@&{}>", role_id)
}

pub fn user_mention(user_id: u64) -> String {
    format!("<@{}>", user_id)
}

fn channel_mention(channel_id: u64) -> String {
    format!("<#{}>", channel_id)
}

fn random_role_color() -> u32 {
    let mut rng = rand::rng();
    loop {
        let color = rng.random_range(0..MAX_ROLE_COLOR);
        if color != RESERVED_ROLE_COLOR {
            return color;
        }
    }
}

/// Removes its key from the in-flight set when dropped.
struct CreationGuard<'a> {
    in_flight: &'a Mutex<HashSet<(u64, i64)>>,
    key: (u64, i64),
}

impl Drop for CreationGuard<'_> {
    fn drop(&mut self) {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        in_flight.remove(&self.key);
    }
}

/// Drives every ctf through creation, play, archival and removal.
pub struct LifecycleEngine {
    chat: Arc<dyn ChatPlatform>,
    index: Arc<dyn EventIndex>,
    servers: ServerStore,
    ctfs: CtfStore,
    statuses: StatusTracker,
    in_flight: Mutex<HashSet<(u64, i64)>>,
    clock: Clock,
}

impl LifecycleEngine {
    pub fn new(
        chat: Arc<dyn ChatPlatform>,
        index: Arc<dyn EventIndex>,
        servers: ServerStore,
        ctfs: CtfStore,
    ) -> Self {
        Self {
            chat,
            index,
            servers,
            statuses: StatusTracker::new(ctfs.clone()),
            ctfs,
            in_flight: Mutex::new(HashSet::new()),
            clock: Arc::new(OffsetDateTime::now_utc),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn ctfs(&self) -> &CtfStore {
        &self.ctfs
    }

    pub fn servers(&self) -> &ServerStore {
        &self.servers
    }

    fn now(&self) -> OffsetDateTime {
        (self.clock)()
    }

    async fn server_config(&self, guild_id: u64) -> Result<ServerConfig, Error> {
        self.servers
            .get(guild_id)
            .await?
            .ok_or(Error::NotConfigured(guild_id))
    }

    async fn ctf_in_channel(&self, guild_id: u64, channel_id: u64) -> Result<Ctf, Error> {
        self.ctfs
            .find(guild_id, CtfLookup::Channel(channel_id))
            .await?
            .ok_or_else(|| Error::CtfNotFound(format!("channel {}", channel_id)))
    }

    fn begin_creation(&self, guild_id: u64, ctftime_id: i64) -> Result<CreationGuard<'_>, Error> {
        let key = (guild_id, ctftime_id);
        let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        if !in_flight.insert(key) {
            warn!(
                "creation of ctftime event {} already running in guild {}",
                ctftime_id, guild_id
            );
            return Err(Error::DuplicateCtf(format!("ctftime event {}", ctftime_id)));
        }
        Ok(CreationGuard {
            in_flight: &self.in_flight,
            key,
        })
    }

    pub async fn init_server(&self, caller: &Caller, config: ServerConfig) -> Result<ServerConfig, Error> {
        let guild_id = caller.guild()?;
        if !caller.is_admin {
            return Err(Error::MissingPermission(caller.user_id));
        }
        let config = ServerConfig { guild_id, ..config };
        info!("configuring guild {}: {:?}", guild_id, config);
        Ok(self.servers.upsert(config).await?)
    }

    /// Creates a ctf from a member command. Only the manager role may do this.
    pub async fn create_ctf(&self, caller: &Caller, ctftime_id: i64) -> Result<Ctf, Error> {
        let guild_id = caller.guild()?;
        let config = self.server_config(guild_id).await?;
        if !config.is_ready_for_creation() {
            return Err(Error::NotConfigured(guild_id));
        }
        caller.require_role(config.manager_role_id)?;
        self.create_in_guild(&config, ctftime_id, caller.channel_id)
            .await
    }

    /// Creates the ctf that won a poll, announcing it where the poll ran.
    pub async fn create_from_poll(
        &self,
        guild_id: u64,
        poll_channel_id: u64,
        ctftime_id: i64,
    ) -> Result<Ctf, Error> {
        let config = self.server_config(guild_id).await?;
        if !config.is_ready_for_creation() {
            return Err(Error::NotConfigured(guild_id));
        }
        self.create_in_guild(&config, ctftime_id, poll_channel_id)
            .await
    }

    async fn create_in_guild(
        &self,
        config: &ServerConfig,
        ctftime_id: i64,
        announce_channel_id: u64,
    ) -> Result<Ctf, Error> {
        let guild_id = config.guild_id;
        let (Some(category_id), Some(manager_role_id), Some(feed_channel_id)) = (
            config.active_category_id,
            config.manager_role_id,
            config.feed_channel_id,
        ) else {
            return Err(Error::NotConfigured(guild_id));
        };
        let _guard = self.begin_creation(guild_id, ctftime_id)?;

        let event = self.index.get_event(ctftime_id).await?;
        let (start, finish) = match (parse_event_time(&event.start), parse_event_time(&event.finish)) {
            (Ok(start), Ok(finish)) => (start, finish),
            (Err(e), _) | (_, Err(e)) => {
                error!("ctftime event {} has unusable times: {}", ctftime_id, e);
                return Err(EventIndexError::Decode(e.to_string()).into());
            }
        };
        let name = display_name(&event.title, start);

        if self.ctfs.exists(guild_id, &name, ctftime_id).await? {
            info!("ctf {} ({}) already present in guild {}", name, ctftime_id, guild_id);
            return Err(Error::DuplicateCtf(name));
        }

        let description = truncate_description(&event.description);
        info!("creating ctf {} ({}) in guild {}", name, ctftime_id, guild_id);

        let role_id = self
            .chat
            .create_role(
                guild_id,
                RoleSpec {
                    name: name.clone(),
                    color: random_role_color(),
                    hoist: true,
                    mentionable: true,
                },
            )
            .await?;
        debug!("created role {} for {}", role_id, name);

        let channel_id = self
            .chat
            .create_text_channel(
                guild_id,
                ChannelSpec {
                    name: name.clone(),
                    category_id,
                    topic: Some(event.url.clone()).filter(|url| !url.is_empty()),
                    overwrites: vec![
                        PermissionOverwrite {
                            target: OverwriteTarget::Everyone,
                            access: ChannelAccess::Hidden,
                        },
                        PermissionOverwrite {
                            target: OverwriteTarget::Role(role_id),
                            access: ChannelAccess::ReadWrite,
                        },
                        PermissionOverwrite {
                            target: OverwriteTarget::Role(manager_role_id),
                            access: ChannelAccess::Hidden,
                        },
                    ],
                },
            )
            .await?;
        debug!("created channel {} for {}", channel_id, name);

        self.chat
            .send_message(
                channel_id,
                OutgoingMessage::text(format!(
                    "{} Welcome to the CTF **{}**! 🎉",
                    role_mention(role_id),
                    name
                )),
            )
            .await?;
        let link_id = self
            .chat
            .send_message(
                channel_id,
                OutgoingMessage::text(format!("Link to ctf: {}", event.url)),
            )
            .await?;
        if let Err(e) = self.chat.pin_message(channel_id, link_id).await {
            error!("failed to pin link message in channel {}: {}", channel_id, e);
        }

        let feed_embed = self.feed_embed(&event, &description, start, finish);
        let message_id = self
            .chat
            .send_message(feed_channel_id, OutgoingMessage::embed(feed_embed))
            .await?;
        self.chat
            .add_reaction(feed_channel_id, message_id, ROLE_REACTION)
            .await?;

        let event_id = self
            .create_scheduled_event(guild_id, &event, &description, start, finish)
            .await?;

        let ctf = self
            .ctfs
            .insert(NewCtf {
                guild_id,
                name,
                description,
                text_channel_id: channel_id,
                event_id,
                role_id,
                message_id,
                ctftime_id,
            })
            .await?;

        let announcement = match config.team_role_id {
            Some(team_role_id) => format!(
                "{} New CTF published in {} 🎉",
                role_mention(team_role_id),
                channel_mention(feed_channel_id)
            ),
            None => format!("New CTF published in {} 🎉", channel_mention(feed_channel_id)),
        };
        if let Err(e) = self
            .chat
            .send_message(announce_channel_id, OutgoingMessage::text(announcement))
            .await
        {
            error!(
                "ctf {} created but announcing in channel {} failed: {}",
                ctf.id, announce_channel_id, e
            );
        }

        info!(
            "ctf {} ready: channel {} role {} event {} message {}",
            ctf.id, channel_id, role_id, event_id, message_id
        );
        Ok(ctf)
    }

    fn feed_embed(
        &self,
        event: &Event,
        description: &str,
        start: OffsetDateTime,
        finish: OffsetDateTime,
    ) -> Embed {
        let body = format!(
            "**Description:**\n\n{}\n\n- **Start Time:** <t:{}:f>\n- **End Time:** <t:{}:f>\n- **URL:** {}\n- **Format:** {}\n- **Location:** {}\n- **Weight:** {}\n- **Prizes:**\n{}\n",
            description,
            start.unix_timestamp(),
            finish.unix_timestamp(),
            event.url,
            event.format,
            event.location,
            event.weight,
            event.prizes
        );
        Embed {
            title: event.title.clone(),
            description: Some(truncate_with_ellipsis(&body, MAX_DESCRIPTION_LEN)),
            url: Some(event.url.clone()).filter(|url| !url.is_empty()),
            color: Some(FEED_EMBED_COLOR),
            thumbnail: Some(event.logo.clone()).filter(|logo| !logo.is_empty()),
            fields: Vec::new(),
            footer: Some(FEED_FOOTER.to_string()),
        }
    }

    async fn create_scheduled_event(
        &self,
        guild_id: u64,
        event: &Event,
        description: &str,
        start: OffsetDateTime,
        finish: OffsetDateTime,
    ) -> Result<u64, Error> {
        let image = if event.logo.is_empty() {
            None
        } else {
            match self.index.fetch_logo(&event.logo).await {
                Ok(logo) => Some(ImageAttachment {
                    file_name: logo.file_name(),
                    data: logo.data,
                }),
                Err(e) => {
                    warn!("no logo for ctftime event {}: {}", event.id, e);
                    None
                }
            }
        };
        let with_image = image.is_some();
        let mut spec = ScheduledEventSpec {
            name: event.title.clone(),
            description: truncate_with_ellipsis(description, MAX_EVENT_DESCRIPTION_LEN),
            location: event.url.clone(),
            start,
            end: finish,
            image,
        };

        match self.chat.create_scheduled_event(guild_id, spec.clone()).await {
            Ok(event_id) => Ok(event_id),
            Err(ChatError::UnsupportedImage) if with_image => {
                warn!(
                    "logo of ctftime event {} rejected, retrying without image",
                    event.id
                );
                spec.image = None;
                Ok(self.chat.create_scheduled_event(guild_id, spec).await?)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Counts a flag for the ctf owning the caller's channel or thread.
    pub async fn submit_flag(
        &self,
        caller: &Caller,
        flag: &str,
        teammate_id: Option<u64>,
        challenge: Option<&str>,
    ) -> Result<FlagReceipt, Error> {
        let guild_id = caller.guild()?;
        let info = self.chat.channel_info(caller.channel_id).await?;
        let (channel_id, thread_id) = match (info.is_thread, info.parent_id) {
            (true, Some(parent_id)) => (parent_id, Some(info.id)),
            _ => (info.id, None),
        };
        let ctf = self.ctf_in_channel(guild_id, channel_id).await?;
        let solves = self.ctfs.increment_solves(ctf.id).await?;

        let mut content = match ctf.role_id {
            Some(role_id) => format!(
                "{} NEW FLAG FOUND BY {}",
                role_mention(role_id),
                user_mention(caller.user_id)
            ),
            None => format!("NEW FLAG FOUND BY {}", user_mention(caller.user_id)),
        };
        if let Some(teammate_id) = teammate_id {
            content.push_str(&format!(" and {}", user_mention(teammate_id)));
        }
        if let Some(challenge) = challenge.filter(|c| !c.trim().is_empty()) {
            content.push_str(&format!(" for challenge: {}", challenge));
        }
        content.push_str(&format!(" 🎉\n> `{}`", flag));

        let message_id = self
            .chat
            .send_message(channel_id, OutgoingMessage::text(content))
            .await?;
        self.chat
            .add_reaction(channel_id, message_id, FLAG_REACTION)
            .await?;

        if let Some(thread_id) = thread_id {
            if let Err(e) = self.chat.lock_thread(thread_id).await {
                error!("failed to lock solved thread {}: {}", thread_id, e);
            }
        }

        info!("ctf {} flag registered, {} solves", ctf.id, solves);
        Ok(FlagReceipt {
            ctf_id: ctf.id,
            channel_id,
            message_id,
            solves,
        })
    }

    /// Takes back one solve. `None` when the ctf has no report yet.
    pub async fn delete_flag(&self, caller: &Caller) -> Result<Option<i64>, Error> {
        let guild_id = caller.guild()?;
        let config = self.server_config(guild_id).await?;
        let ctf = self.ctf_in_channel(guild_id, caller.channel_id).await?;
        caller.require_role(config.manager_role_id)?;

        let solves = self.ctfs.decrement_solves(ctf.id).await?;
        info!("ctf {} flag removed, solves now {:?}", ctf.id, solves);
        Ok(solves)
    }

    /// Returns the ctf report, refreshing it from the index when stale.
    pub async fn report(&self, caller: &Caller) -> Result<(Ctf, Report), Error> {
        let guild_id = caller.guild()?;
        let config = self.server_config(guild_id).await?;
        caller.require_role(config.manager_role_id)?;
        let ctf = self.ctf_in_channel(guild_id, caller.channel_id).await?;
        let report = self.refreshed_report(&ctf, &config).await?;
        Ok((ctf, report))
    }

    pub async fn refreshed_report(&self, ctf: &Ctf, config: &ServerConfig) -> Result<Report, Error> {
        let now = self.now();
        if let Some(report) = self.ctfs.get_report(ctf.id).await? {
            if !report.needs_refresh(now) {
                debug!("ctf {} report still fresh", ctf.id);
                return Ok(report);
            }
        }

        let team_id = config
            .team_id
            .ok_or_else(|| Error::InvalidInput(String::from("The team id is not configured.")))?;
        let year = year_from_name(&ctf.name, now.year());
        let result = self
            .index
            .team_result(year, ctf.ctftime_id, team_id)
            .await
            .map_err(|e| {
                error!("report refresh for ctf {} failed: {}", ctf.id, e);
                e
            })?;
        if result.is_none() {
            info!(
                "team {} not ranked yet for ctftime event {} ({})",
                team_id, ctf.ctftime_id, year
            );
        }
        Ok(self.ctfs.record_refresh(ctf.id, result, now).await?)
    }

    pub fn report_embed(ctf: &Ctf, report: &Report) -> Embed {
        let known = |value: i64| {
            if value == UNKNOWN_RANK {
                String::from("N/A")
            } else {
                value.to_string()
            }
        };
        Embed {
            title: format!("Report for {}", ctf.name),
            color: Some(FEED_EMBED_COLOR),
            ..Default::default()
        }
        .field("Place", known(report.place), true)
        .field("Score", known(report.score), true)
        .field("Solves", report.solves.to_string(), true)
    }

    /// Posts a poll over this week's events.
    pub async fn start_vote(&self, caller: &Caller) -> Result<VotePosted, Error> {
        caller.guild()?;
        let window = VoteWindow::for_day(self.now().date());
        let upcoming = self.index.upcoming_events(VOTE_LOOKAHEAD).await?;
        let candidates: Vec<Event> = upcoming
            .into_iter()
            .filter(|event| match parse_event_time(&event.start) {
                Ok(start) => window.contains(start),
                Err(e) => {
                    warn!("skipping ctftime event {} with bad start: {}", event.id, e);
                    false
                }
            })
            .collect();
        check_candidate_count(candidates.len())?;

        let poll = PollSpec {
            question: VOTE_QUESTION.to_string(),
            answers: candidates
                .iter()
                .map(|event| poll_option(&event.title, event.id))
                .collect(),
            duration_hours: POLL_DURATION_HOURS,
        };
        info!(
            "posting vote with {} candidates for week {} of {}",
            candidates.len(),
            window.week,
            window.year
        );
        let message_id = self
            .chat
            .send_message(
                caller.channel_id,
                OutgoingMessage {
                    content: Some(VOTE_MESSAGE.to_string()),
                    embeds: Vec::new(),
                    poll: Some(poll),
                },
            )
            .await?;
        Ok(VotePosted {
            message_id,
            candidates,
        })
    }

    /// Acts on a finished poll: creates the single winner or reports a tie.
    pub async fn resolve_poll(
        &self,
        guild_id: u64,
        channel_id: u64,
        poll_message_id: u64,
    ) -> Result<PollResolution, Error> {
        let tallies = self.chat.fetch_poll(channel_id, poll_message_id).await?;
        let counts: Vec<u64> = tallies.iter().map(|tally| tally.votes).collect();

        match resolve_votes(&counts) {
            VoteOutcome::NoVotes => {
                info!("poll {} closed without votes", poll_message_id);
                Ok(PollResolution::NoVotes)
            }
            VoteOutcome::Winner(index) => {
                let ctftime_id = parse_poll_option(&tallies[index].text).map_err(|e| {
                    error!("poll {} winner unreadable: {}", poll_message_id, e);
                    Error::from(e)
                })?;
                info!("poll {} won by ctftime event {}", poll_message_id, ctftime_id);
                let ctf = self
                    .create_from_poll(guild_id, channel_id, ctftime_id)
                    .await?;
                Ok(PollResolution::Created(ctf))
            }
            VoteOutcome::Tie(indexes) => {
                info!("poll {} tied between options {:?}", poll_message_id, indexes);
                let config = self.servers.get(guild_id).await?;
                let content = match config.and_then(|c| c.team_role_id) {
                    Some(team_role_id) => format!(
                        "{}, The last poll resulted in a tie.",
                        role_mention(team_role_id)
                    ),
                    None => String::from("The last poll resulted in a tie."),
                };
                self.chat
                    .send_message(channel_id, OutgoingMessage::text(content))
                    .await?;
                Ok(PollResolution::Tie(indexes))
            }
        }
    }

    /// Feeds a scheduled event update through the status tracker.
    pub async fn handle_status_update(
        &self,
        guild_id: u64,
        event_id: u64,
        event_name: &str,
        status: EventStatus,
    ) -> Result<StatusOutcome, Error> {
        let transition = self.statuses.observe(guild_id, event_id, status).await?;
        if transition == Transition::Ignored {
            return Ok(StatusOutcome::Ignored);
        }

        let ctf = match self.ctfs.find(guild_id, CtfLookup::Event(event_id)).await? {
            Some(ctf) => Some(ctf),
            None => self.ctfs.find_by_name_fragment(guild_id, event_name).await?,
        };
        let Some(ctf) = ctf else {
            warn!(
                "no ctf for scheduled event {} ({}) in guild {}",
                event_id, event_name, guild_id
            );
            return Ok(StatusOutcome::Unresolved);
        };

        match transition {
            Transition::Started => {
                let Some(channel_id) = ctf.text_channel_id else {
                    warn!("ctf {} has no channel to announce the start", ctf.id);
                    return Ok(StatusOutcome::Unresolved);
                };
                let mention = ctf.role_id.map(role_mention).unwrap_or_default();
                self.chat
                    .send_message(
                        channel_id,
                        OutgoingMessage::text(format!(
                            "{} The CTF has started! Good luck to all participants! 🎉",
                            mention
                        )),
                    )
                    .await?;
                info!("ctf {} started", ctf.id);
                Ok(StatusOutcome::Started { ctf_id: ctf.id })
            }
            Transition::Ended => {
                let outcome = self.complete(&ctf).await?;
                Ok(StatusOutcome::Completed {
                    ctf_id: ctf.id,
                    outcome,
                })
            }
            Transition::Ignored => Ok(StatusOutcome::Ignored),
        }
    }

    /// Archives a finished ctf. Every step runs even when an earlier one fails.
    async fn complete(&self, ctf: &Ctf) -> Result<CompletionOutcome, Error> {
        let config = self.servers.get(ctf.guild_id).await?;
        let mut outcome = CompletionOutcome::default();

        match (ctf.text_channel_id, config.and_then(|c| c.archive_category_id)) {
            (Some(channel_id), Some(archive_id)) => {
                match self.chat.move_channel(channel_id, archive_id).await {
                    Ok(()) => outcome.moved = true,
                    Err(e) => error!(
                        "failed to archive channel {} of ctf {}: {}",
                        channel_id, ctf.id, e
                    ),
                }
            }
            (_, None) => info!("guild {} has no archive category", ctf.guild_id),
            (None, _) => warn!("ctf {} has no channel to archive", ctf.id),
        }

        if let Some(role_id) = ctf.role_id {
            let update = RoleUpdate {
                color: Some(ARCHIVED_ROLE_COLOR),
                hoist: Some(false),
                mentionable: Some(false),
            };
            match self.chat.update_role(ctf.guild_id, role_id, update).await {
                Ok(()) => outcome.role_neutralized = true,
                Err(e) => error!("failed to neutralize role {} of ctf {}: {}", role_id, ctf.id, e),
            }
        }

        if let Some(channel_id) = ctf.text_channel_id {
            let mention = ctf.role_id.map(role_mention).unwrap_or_default();
            let content = format!(
                "{} The CTF **{}** has ended! The channel has been moved to the archived category.",
                mention, ctf.name
            );
            match self
                .chat
                .send_message(channel_id, OutgoingMessage::text(content))
                .await
            {
                Ok(_) => outcome.announced = true,
                Err(e) => error!("failed to announce end of ctf {}: {}", ctf.id, e),
            }
        }

        info!("ctf {} completed: {:?}", ctf.id, outcome);
        Ok(outcome)
    }

    /// Ctfs a manager may pick for removal.
    pub async fn list_ctfs(&self, caller: &Caller) -> Result<Vec<Ctf>, Error> {
        let guild_id = caller.guild()?;
        let config = self.server_config(guild_id).await?;
        caller.require_role(config.manager_role_id)?;
        Ok(self.ctfs.list(guild_id).await?)
    }

    /// Tears a ctf down. The record is only deleted once its channel is gone.
    pub async fn remove_ctf(&self, caller: &Caller, selector: &str) -> Result<RemovalReport, Error> {
        let guild_id = caller.guild()?;
        let config = self.server_config(guild_id).await?;
        caller.require_role(config.manager_role_id)?;
        let ctf_id: i64 = selector
            .trim()
            .parse()
            .map_err(|_| Error::InvalidInput(format!("Invalid CTF selection {:?}.", selector)))?;
        let ctf = self
            .ctfs
            .get(ctf_id)
            .await?
            .filter(|ctf| ctf.guild_id == guild_id)
            .ok_or_else(|| Error::CtfNotFound(format!("id {}", ctf_id)))?;

        info!("removing ctf {} ({}) from guild {}", ctf.id, ctf.name, guild_id);
        if let Some(channel_id) = ctf.text_channel_id {
            match self.chat.delete_channel(channel_id).await {
                Ok(()) => {}
                Err(ChatError::NotFound(_)) => {
                    warn!("channel {} of ctf {} already gone", channel_id, ctf.id)
                }
                Err(e) => {
                    error!("failed to delete channel {} of ctf {}: {}", channel_id, ctf.id, e);
                    return Err(e.into());
                }
            }
        }

        let mut report = RemovalReport {
            ctf: ctf.clone(),
            role_deleted: false,
            event_deleted: false,
            feed_message_deleted: false,
        };

        if let Some(role_id) = ctf.role_id {
            match self.chat.delete_role(guild_id, role_id).await {
                Ok(()) => report.role_deleted = true,
                Err(e) => error!("failed to delete role {} of ctf {}: {}", role_id, ctf.id, e),
            }
        }
        if let Some(event_id) = ctf.event_id {
            match self.chat.delete_scheduled_event(guild_id, event_id).await {
                Ok(()) => report.event_deleted = true,
                Err(e) => error!(
                    "failed to delete scheduled event {} of ctf {}: {}",
                    event_id, ctf.id, e
                ),
            }
        }
        match (config.feed_channel_id, ctf.message_id) {
            (Some(feed_channel_id), Some(message_id)) => {
                match self.chat.delete_message(feed_channel_id, message_id).await {
                    Ok(()) => report.feed_message_deleted = true,
                    Err(e) => error!(
                        "failed to delete feed message {} of ctf {}: {}",
                        message_id, ctf.id, e
                    ),
                }
            }
            _ => debug!("ctf {} has no feed message to delete", ctf.id),
        }

        self.ctfs.delete_with_children(ctf.id).await?;
        info!("ctf {} removed", ctf.id);
        Ok(report)
    }

    /// Grants the ctf role for a reaction on its feed message.
    pub async fn reaction_added(
        &self,
        guild_id: u64,
        message_id: u64,
        user_id: u64,
        is_bot: bool,
    ) -> Result<bool, Error> {
        if is_bot {
            return Ok(false);
        }
        let Some(role_id) = self.feed_role(guild_id, message_id).await? else {
            return Ok(false);
        };
        self.chat.grant_role(guild_id, user_id, role_id).await?;
        info!("granted role {} to {} in guild {}", role_id, user_id, guild_id);
        Ok(true)
    }

    pub async fn reaction_removed(
        &self,
        guild_id: u64,
        message_id: u64,
        user_id: u64,
        is_bot: bool,
    ) -> Result<bool, Error> {
        if is_bot {
            return Ok(false);
        }
        let Some(role_id) = self.feed_role(guild_id, message_id).await? else {
            return Ok(false);
        };
        self.chat.revoke_role(guild_id, user_id, role_id).await?;
        info!("revoked role {} from {} in guild {}", role_id, user_id, guild_id);
        Ok(true)
    }

    async fn feed_role(&self, guild_id: u64, message_id: u64) -> Result<Option<u64>, Error> {
        let ctf = self
            .ctfs
            .find(guild_id, CtfLookup::Message(message_id))
            .await?;
        Ok(ctf.and_then(|ctf| ctf.role_id))
    }

    /// Embed listing the next events on the index.
    pub async fn next_ctfs(&self, limit: Option<usize>) -> Result<Embed, Error> {
        let limit = limit
            .unwrap_or(NEXT_CTFS_DEFAULT_LIMIT)
            .clamp(1, NEXT_CTFS_MAX_LIMIT);
        let events = self.index.upcoming_events(limit).await?;
        if events.is_empty() {
            return Ok(Embed {
                title: String::from("📋 Next CTFs"),
                description: Some(String::from("No CTFs found.")),
                color: Some(FEED_EMBED_COLOR),
                ..Default::default()
            });
        }

        let lines = events
            .iter()
            .enumerate()
            .map(|(idx, event)| upcoming_line(idx + 1, event))
            .join("\n");
        Ok(Embed {
            title: String::from("📋 Next CTFs"),
            description: Some(truncate_with_ellipsis(&lines, MAX_DESCRIPTION_LEN)),
            color: Some(FEED_EMBED_COLOR),
            footer: Some(format!("Total: {} available CTFs", events.len())),
            ..Default::default()
        })
    }

    /// Posts a challenge card in the ctf channel and opens a thread on it.
    pub async fn chall(&self, caller: &Caller, challenge: Challenge) -> Result<u64, Error> {
        let guild_id = caller.guild()?;
        let name = challenge.name.trim().to_string();
        if name.is_empty() {
            return Err(Error::InvalidInput(String::from("The challenge name is empty.")));
        }
        let ctf = self.ctf_in_channel(guild_id, caller.channel_id).await?;

        let mut embed = Embed {
            title: format!("Challenge: {}", name),
            description: Some(String::from(
                "A new challenge discussion thread has been created!",
            )),
            color: Some(CHALLENGE_EMBED_COLOR),
            ..Default::default()
        };
        if let Some(category) = challenge.category.filter(|c| !c.is_empty()) {
            embed = embed.field("Category", category, true);
        }
        if let Some(description) = challenge.description.filter(|d| !d.is_empty()) {
            embed = embed.field("Description", description, false);
        }

        let message_id = self
            .chat
            .send_message(caller.channel_id, OutgoingMessage::embed(embed))
            .await?;
        let thread_id = self
            .chat
            .create_thread(caller.channel_id, message_id, &name)
            .await?;
        info!("ctf {} challenge {} thread {}", ctf.id, name, thread_id);
        Ok(thread_id)
    }

    pub async fn creds(&self, caller: &Caller) -> Result<CredsLookup, Error> {
        let guild_id = caller.guild()?;
        self.server_config(guild_id).await?;
        let ctf = self.ctf_in_channel(guild_id, caller.channel_id).await?;

        let Some(creds) = self.ctfs.get_creds(ctf.id).await? else {
            return Ok(CredsLookup::Missing {
                modal_id: format!("{}{}", CREDS_MODAL_PREFIX, ctf.id),
            });
        };
        let description = format!(
            "**Username:** `{}`\n**Password:** `{}`\n**Need personal:** {}\n\n",
            creds.username,
            creds.password.expose_secret(),
            if creds.personal { "Yes" } else { "No" }
        );
        Ok(CredsLookup::Found(Embed {
            title: format!("Credentials for {}", ctf.name),
            description: Some(description),
            color: Some(CREDS_EMBED_COLOR),
            ..Default::default()
        }))
    }

    /// Stores a credentials modal submission and returns the announcement for the ctf role.
    pub async fn submit_creds(
        &self,
        caller: &Caller,
        modal_id: &str,
        username: String,
        password: SecretString,
        personal: &str,
    ) -> Result<String, Error> {
        let guild_id = caller.guild()?;
        let modal_ctf_id: i64 = modal_id
            .strip_prefix(CREDS_MODAL_PREFIX)
            .and_then(|id| id.parse().ok())
            .ok_or_else(|| Error::InvalidInput(format!("Unknown form {:?}.", modal_id)))?;
        let ctf = self.ctf_in_channel(guild_id, caller.channel_id).await?;
        if ctf.id != modal_ctf_id {
            warn!(
                "credentials form for ctf {} submitted in channel of ctf {}",
                modal_ctf_id, ctf.id
            );
            return Err(Error::InvalidInput(String::from(
                "This form belongs to another CTF.",
            )));
        }

        let creds = Credentials {
            ctf_id: ctf.id,
            username,
            password,
            personal: personal.trim().eq_ignore_ascii_case("yes"),
        };
        self.ctfs.upsert_creds(&creds).await?;
        info!("credentials stored for ctf {}", ctf.id);

        let mention = ctf.role_id.map(role_mention).unwrap_or_default();
        Ok(format!("{}, Credentials submitted ✅.", mention))
    }

    pub async fn delete_creds(&self, caller: &Caller) -> Result<(), Error> {
        let guild_id = caller.guild()?;
        let config = self.server_config(guild_id).await?;
        caller.require_role(config.manager_role_id)?;
        let ctf = self.ctf_in_channel(guild_id, caller.channel_id).await?;
        if !self.ctfs.delete_creds(ctf.id).await? {
            return Err(Error::NotFound(format!("credentials for ctf {}", ctf.id)));
        }
        info!("credentials removed for ctf {}", ctf.id);
        Ok(())
    }
}

fn upcoming_line(idx: usize, event: &Event) -> String {
    let start = parse_event_time(&event.start)
        .map(|start| {
            format!(
                "<t:{}:F> (<t:{}:R>)",
                start.unix_timestamp(),
                start.unix_timestamp()
            )
        })
        .unwrap_or_else(|_| event.start.clone());
    let format_emoji = match event.format.as_str() {
        "Jeopardy" => "🎯",
        "Attack-Defense" => "⚔️",
        "Mixed" => "🔀",
        _ => "📋",
    };
    let location = if event.onsite {
        format!("Onsite {}", event.location)
    } else {
        String::from("Online")
    };
    format!(
        "### {} • {}\n🆔 `{}` • ⚖️ **Weight:** `{}` • 📍 **Location:** {}\n📅 **Start:** {} • ⏱️ **Duration:** `{}d {}h`\n{} **Format:** {} • 🔗 **Link:** [CTFtime]({})\n",
        idx,
        event.title,
        event.id,
        event.weight,
        location.trim(),
        start,
        event.duration.days,
        event.duration.hours,
        format_emoji,
        event.format,
        event.ctftime_url
    )
}
