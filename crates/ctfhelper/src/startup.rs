use crate::{
    api::routes::health,
    bot::{clean_commands, Handler},
    config::Settings,
    domain::{CtfStore, LifecycleEngine, ServerStore},
    infra::{
        chat::ChatPlatform,
        ctftime::{CtftimeClient, EventIndex},
        db::{DBConnection, DatabasePoolConfig},
        discord::DiscordChat,
    },
};

// Mock implementations only available with e2e-testing feature or debug builds
#[cfg(any(feature = "e2e-testing", debug_assertions))]
use crate::infra::{chat_mock::MockChat, ctftime_mock::MockCtfTime};
use anyhow::anyhow;
use axum::{
    body::Body,
    extract::{connect_info::IntoMakeServiceWithConnectInfo, ConnectInfo, Request},
    middleware::{self, AddExtension, Next},
    response::IntoResponse,
    routing::get,
    serve::Serve,
    Router,
};
use log::{error, info, warn};
use reqwest::Url;
use secrecy::{ExposeSecret, SecretString};
use serenity::{all::GatewayIntents, http::Http, Client};
use std::{collections::HashMap, fs, net::SocketAddr, str::FromStr};
use std::{sync::Arc, time::Duration};
use tokio::signal::unix::{signal, SignalKind};
use tokio::{net::TcpListener, select, task::JoinHandle};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tower_http::timeout::TimeoutLayer;

const DB_NAME: &str = "ctfhelper";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub struct Application {
    server: Serve<
        TcpListener,
        IntoMakeServiceWithConnectInfo<Router, SocketAddr>,
        AddExtension<Router, ConnectInfo<SocketAddr>>,
    >,
    cancellation_token: CancellationToken,
    background_tasks: TaskTracker,
}

impl Application {
    pub async fn build(config: Settings) -> Result<Self, anyhow::Error> {
        let address = format!(
            "{}:{}",
            config.api_settings.domain, config.api_settings.port
        );
        let listener = SocketAddr::from_str(&address)?;
        let (app_state, background_tasks, cancellation_token) = build_app(config).await?;
        let server = build_server(listener, app_state).await?;
        Ok(Self {
            server,
            cancellation_token,
            background_tasks,
        })
    }

    pub async fn run_until_stopped(self) -> Result<(), anyhow::Error> {
        info!("Starting server...");
        let shutdown = shutdown_signal(self.cancellation_token.clone());
        match self.server.with_graceful_shutdown(shutdown).await {
            Ok(_) => {
                info!("Server shutdown initiated");
                self.cancellation_token.cancel();

                let timeout = tokio::time::sleep(Duration::from_secs(10));
                select! {
                    _ = self.background_tasks.wait() => {
                        info!("Background tasks completed gracefully");
                    }
                    _ = timeout => {
                        warn!("Background tasks timed out during shutdown");
                    }
                }

                info!("Shutdown complete");
                Ok(())
            }
            Err(e) => {
                error!("Server shutdown error: {}", e);
                self.cancellation_token.cancel();

                let _ =
                    tokio::time::timeout(Duration::from_secs(5), self.background_tasks.wait())
                        .await;

                Err(anyhow!("Error during server shutdown: {}", e))
            }
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<LifecycleEngine>,
    pub background_threads: Arc<HashMap<String, JoinHandle<()>>>,
}

fn bot_token(config: &Settings) -> Option<SecretString> {
    config
        .bot_settings
        .token
        .as_ref()
        .filter(|token| !token.trim().is_empty())
        .map(|token| SecretString::from(token.clone()))
}

fn intents() -> GatewayIntents {
    GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::GUILD_MESSAGE_REACTIONS
        | GatewayIntents::GUILD_SCHEDULED_EVENTS
        | GatewayIntents::GUILD_MEMBERS
}

fn build_index(config: &Settings) -> Result<Arc<dyn EventIndex>, anyhow::Error> {
    #[cfg(any(feature = "e2e-testing", debug_assertions))]
    if config.ctftime_settings.mock_enabled {
        info!("Mock event index configured");
        return Ok(Arc::new(MockCtfTime::with_sample_events()));
    }

    #[cfg(not(any(feature = "e2e-testing", debug_assertions)))]
    if config.ctftime_settings.mock_enabled {
        return Err(anyhow!(
            "Mock event index requires e2e-testing feature or debug build"
        ));
    }

    let base_url = Url::parse(&config.ctftime_settings.base_url)
        .map_err(|e| anyhow!("Failed to parse ctftime url: {}", e))?;
    let client = CtftimeClient::new(
        &base_url,
        Duration::from_secs(config.ctftime_settings.request_timeout_secs),
        config.ctftime_settings.max_logo_bytes,
    )?;
    info!("CTFtime client configured");
    Ok(Arc::new(client))
}

fn build_chat(
    config: &Settings,
    token: Option<&SecretString>,
) -> Result<Arc<dyn ChatPlatform>, anyhow::Error> {
    #[cfg(any(feature = "e2e-testing", debug_assertions))]
    if config.bot_settings.mock_enabled {
        info!("Mock chat platform configured");
        return Ok(Arc::new(MockChat::new()));
    }

    #[cfg(not(any(feature = "e2e-testing", debug_assertions)))]
    if config.bot_settings.mock_enabled {
        return Err(anyhow!(
            "Mock chat platform requires e2e-testing feature or debug build"
        ));
    }

    let token = token.ok_or_else(|| anyhow!("A bot token is required to reach Discord"))?;
    info!("Discord chat platform configured");
    Ok(Arc::new(DiscordChat::new(Arc::new(Http::new(
        token.expose_secret(),
    )))))
}

pub async fn build_app(
    config: Settings,
) -> Result<(AppState, TaskTracker, CancellationToken), anyhow::Error> {
    let token = bot_token(&config);
    let index = build_index(&config)?;
    let chat = build_chat(&config, token.as_ref())?;

    fs::create_dir_all(&config.db_settings.data_folder)
        .map_err(|e| anyhow!("Failed to create data folder: {}", e))?;
    let pool_config: DatabasePoolConfig = config.db_settings.clone().into();
    let db = DBConnection::new(&config.db_settings.data_folder, DB_NAME, pool_config)
        .await
        .map_err(|e| anyhow!("Error setting up ctfhelper db: {}", e))?;

    let engine = Arc::new(LifecycleEngine::new(
        chat,
        index,
        ServerStore::new(db.clone()),
        CtfStore::new(db),
    ));
    info!("Lifecycle engine configured");

    let tracker = TaskTracker::new();
    let mut threads = HashMap::new();
    let cancel_token = CancellationToken::new();

    match token {
        Some(token) => {
            let handler = Handler::new(
                engine.clone(),
                config.sync_commands,
                config.bot_settings.dev_guilds.clone(),
            );
            let mut client = Client::builder(token.expose_secret(), intents())
                .event_handler(handler)
                .await
                .map_err(|e| anyhow!("Failed to build gateway client: {}", e))?;

            let shard_manager = client.shard_manager.clone();
            let gateway_cancel = cancel_token.clone();
            tracker.spawn(async move {
                gateway_cancel.cancelled().await;
                info!("Closing gateway connection");
                shard_manager.shutdown_all().await;
            });

            let gateway_task = tracker.spawn(async move {
                match client.start().await {
                    Ok(_) => info!("Successfully shutdown gateway"),
                    Err(e) => error!("Error in gateway connection: {}", e),
                }
            });
            threads.insert(String::from("gateway"), gateway_task);
        }
        None if config.bot_settings.mock_enabled => {
            warn!("No bot token configured, running without a gateway connection");
        }
        None => return Err(anyhow!("A bot token is required to connect to the gateway")),
    }
    tracker.close();

    let app_state = AppState {
        engine,
        background_threads: Arc::new(threads),
    };
    Ok((app_state, tracker, cancel_token))
}

/// Removes every registered slash command, then returns.
pub async fn run_clean_commands(config: &Settings) -> Result<(), anyhow::Error> {
    let token = bot_token(config).ok_or_else(|| anyhow!("A bot token is required"))?;
    let http = Http::new(token.expose_secret());
    clean_commands(&http, &config.bot_settings.dev_guilds).await?;
    info!("Slash commands removed");
    Ok(())
}

pub async fn build_server(
    socket_addr: SocketAddr,
    app_state: AppState,
) -> Result<
    Serve<
        TcpListener,
        IntoMakeServiceWithConnectInfo<Router, SocketAddr>,
        AddExtension<Router, ConnectInfo<SocketAddr>>,
    >,
    anyhow::Error,
> {
    let listener = TcpListener::bind(socket_addr).await?;

    info!("Setting up service");
    let app = app(app_state);
    let server = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    );
    info!(
        "Service running @: http://{}:{}",
        socket_addr.ip(),
        socket_addr.port()
    );
    Ok(server)
}

pub fn app(app_state: AppState) -> Router {
    Router::new()
        .route("/api/v1/health_check", get(health))
        .route("/health", get(health))
        .layer(middleware::from_fn(log_request))
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .with_state(Arc::new(app_state))
}

async fn log_request(request: Request<Body>, next: Next) -> impl IntoResponse {
    let now = time::OffsetDateTime::now_utc();
    let path = request
        .uri()
        .path_and_query()
        .map(|p| p.as_str())
        .unwrap_or_default();
    info!(target: "http_request","new request, {} {}", request.method().as_str(), path);

    let response = next.run(request).await;
    let response_time = time::OffsetDateTime::now_utc() - now;
    info!(target: "http_response", "response, code: {}, time: {}", response.status().as_str(), response_time);

    response
}

async fn shutdown_signal(cancel_token: CancellationToken) {
    let (mut sigint, mut sigterm) = match (
        signal(SignalKind::interrupt()),
        signal(SignalKind::terminate()),
    ) {
        (Ok(sigint), Ok(sigterm)) => (sigint, sigterm),
        (Err(e), _) | (_, Err(e)) => {
            error!("Failed to install signal handlers: {}", e);
            cancel_token.cancelled().await;
            return;
        }
    };

    select! {
        _ = sigint.recv() => info!("Received SIGINT signal"),
        _ = sigterm.recv() => info!("Received SIGTERM signal"),
        _ = cancel_token.cancelled() => info!("Cancellation requested"),
    }
}
