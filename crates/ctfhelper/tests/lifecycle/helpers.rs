use std::sync::{Arc, Mutex, Once};

use async_trait::async_trait;
use ctfhelper::{
    domain::{Caller, Ctf, CtfStore, LifecycleEngine, NewCtf, ServerConfig, ServerStore},
    infra::{
        chat_mock::MockChat,
        ctftime::{Error, Event, EventIndex, Logo, TeamResult},
        ctftime_mock::MockCtfTime,
        db::DBConnection,
    },
};
use mockall::mock;
use time::{macros::datetime, OffsetDateTime};

pub const GUILD: u64 = 1;
pub const ACTIVE_CATEGORY: u64 = 10;
pub const ARCHIVE_CATEGORY: u64 = 11;
pub const MANAGER_ROLE: u64 = 20;
pub const TEAM_ROLE: u64 = 21;
pub const FEED_CHANNEL: u64 = 30;
pub const COMMAND_CHANNEL: u64 = 40;
pub const TEAM_ID: i64 = 777;
pub const MANAGER: u64 = 500;
pub const MEMBER: u64 = 501;

pub const EXAMPLE_ID: i64 = 12345;
pub const EXAMPLE_NAME: &str = "ExampleCTF - 2025";

/// Wednesday of ISO week 22 of 2025.
pub const WEDNESDAY: OffsetDateTime = datetime!(2025-05-28 12:00 UTC);

mock! {
    #[derive(Send, Sync)]
    pub Index { }

    #[async_trait]
    impl EventIndex for Index {
        async fn get_event(&self, id: i64) -> Result<Event, Error>;
        async fn upcoming_events(&self, limit: usize) -> Result<Vec<Event>, Error>;
        async fn team_result(
            &self,
            year: i32,
            event_id: i64,
            team_id: i64,
        ) -> Result<Option<TeamResult>, Error>;
        async fn fetch_logo(&self, url: &str) -> Result<Logo, Error>;
    }
}

pub struct TestBot {
    pub engine: LifecycleEngine,
    pub chat: Arc<MockChat>,
    pub index: Arc<MockCtfTime>,
    clock: Arc<Mutex<OffsetDateTime>>,
}

impl TestBot {
    pub fn set_now(&self, now: OffsetDateTime) {
        *self.clock.lock().unwrap() = now;
    }

    /// Creates the example ctf through the manager and clears the recorded calls.
    pub async fn with_example_ctf(&self) -> Ctf {
        let ctf = self
            .engine
            .create_ctf(&manager(), EXAMPLE_ID)
            .await
            .expect("example ctf created");
        self.chat.reset();
        ctf
    }

    /// Fresh engine over the same database, chat platform and index.
    pub fn restarted(&self) -> LifecycleEngine {
        let clock = self.clock.clone();
        LifecycleEngine::new(
            self.chat.clone(),
            self.index.clone(),
            self.engine.servers().clone(),
            self.engine.ctfs().clone(),
        )
        .with_clock(Arc::new(move || *clock.lock().unwrap()))
    }
}

pub fn example_event() -> Event {
    event(
        EXAMPLE_ID,
        "ExampleCTF",
        "2025-06-01T00:00:00Z",
        "2025-06-03T00:00:00Z",
    )
}

pub fn event(id: i64, title: &str, start: &str, finish: &str) -> Event {
    Event {
        id,
        title: title.to_string(),
        start: start.to_string(),
        finish: finish.to_string(),
        url: format!("https://{}.example", title.to_lowercase()),
        ctftime_url: format!("https://ctftime.org/event/{}/", id),
        description: format!("{} description", title),
        format: String::from("Jeopardy"),
        weight: 25.0,
        ..Default::default()
    }
}

pub fn server_config() -> ServerConfig {
    ServerConfig {
        guild_id: GUILD,
        active_category_id: Some(ACTIVE_CATEGORY),
        archive_category_id: Some(ARCHIVE_CATEGORY),
        manager_role_id: Some(MANAGER_ROLE),
        feed_channel_id: Some(FEED_CHANNEL),
        team_id: Some(TEAM_ID),
        team_role_id: Some(TEAM_ROLE),
    }
}

pub fn manager() -> Caller {
    Caller {
        user_id: MANAGER,
        guild_id: Some(GUILD),
        channel_id: COMMAND_CHANNEL,
        role_ids: vec![MANAGER_ROLE],
        is_admin: false,
    }
}

pub fn member() -> Caller {
    Caller {
        user_id: MEMBER,
        guild_id: Some(GUILD),
        channel_id: COMMAND_CHANNEL,
        role_ids: vec![TEAM_ROLE],
        is_admin: false,
    }
}

pub fn in_channel(caller: Caller, channel_id: u64) -> Caller {
    Caller {
        channel_id,
        ..caller
    }
}

static INIT_LOGGER: Once = Once::new();

async fn stores() -> (ServerStore, CtfStore) {
    INIT_LOGGER.call_once(|| {
        if std::env::var("RUST_LOG").is_ok() {
            env_logger::init();
        }
    });
    let db = DBConnection::in_memory().await.expect("in-memory db");
    (ServerStore::new(db.clone()), CtfStore::new(db))
}

fn fixed_clock(now: OffsetDateTime) -> Arc<Mutex<OffsetDateTime>> {
    Arc::new(Mutex::new(now))
}

/// Bot over the in-memory chat platform and event index, without a server config.
pub async fn unconfigured_bot() -> TestBot {
    let chat = Arc::new(MockChat::new());
    let index = Arc::new(MockCtfTime::new());
    index.add_event(example_event());
    let (servers, ctfs) = stores().await;
    let clock = fixed_clock(WEDNESDAY);
    let engine_clock = clock.clone();
    let engine = LifecycleEngine::new(chat.clone(), index.clone(), servers, ctfs)
        .with_clock(Arc::new(move || *engine_clock.lock().unwrap()));
    TestBot {
        engine,
        chat,
        index,
        clock,
    }
}

pub async fn configured_bot() -> TestBot {
    let bot = unconfigured_bot().await;
    bot.engine
        .servers()
        .upsert(server_config())
        .await
        .expect("server configured");
    bot
}

/// Engine over a scripted index, with the example ctf already stored.
pub async fn bot_with_index(index: MockIndex) -> (LifecycleEngine, Arc<MockChat>, Ctf) {
    let chat = Arc::new(MockChat::new());
    let (servers, ctfs) = stores().await;
    servers.upsert(server_config()).await.expect("server configured");
    let ctf = ctfs
        .insert(NewCtf {
            guild_id: GUILD,
            name: EXAMPLE_NAME.to_string(),
            description: String::from("ExampleCTF description"),
            text_channel_id: 5_000,
            event_id: 5_001,
            role_id: 5_002,
            message_id: 5_003,
            ctftime_id: EXAMPLE_ID,
        })
        .await
        .expect("ctf stored");
    let engine = LifecycleEngine::new(chat.clone(), Arc::new(index), servers, ctfs)
        .with_clock(Arc::new(|| WEDNESDAY));
    (engine, chat, ctf)
}
