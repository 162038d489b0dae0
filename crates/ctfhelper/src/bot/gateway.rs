use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use ctfhelper_core::EventStatus;
use log::{debug, error, info, warn};
use serenity::all::{
    Context, EventHandler, Interaction, Message, MessageType, Reaction, Ready, ScheduledEvent,
    ScheduledEventStatus,
};

use crate::domain::{LifecycleEngine, StatusOutcome};

use super::{commands::register_commands, interactions::handle_interaction};

/// Message kind Discord posts when a poll closes.
const POLL_RESULT_MESSAGE_KIND: u8 = 46;
const WELCOME_REACTION: char = '🍪';

/// Gateway listener feeding every relevant event into the lifecycle engine.
pub struct Handler {
    engine: Arc<LifecycleEngine>,
    sync_commands: bool,
    dev_guilds: Vec<u64>,
    bot_id: OnceLock<u64>,
}

impl Handler {
    pub fn new(engine: Arc<LifecycleEngine>, sync_commands: bool, dev_guilds: Vec<u64>) -> Self {
        Self {
            engine,
            sync_commands,
            dev_guilds,
            bot_id: OnceLock::new(),
        }
    }

    fn is_self(&self, user_id: u64) -> bool {
        self.bot_id.get() == Some(&user_id)
    }

    async fn reacting_user(&self, ctx: &Context, reaction: &Reaction) -> Option<(u64, bool)> {
        let user_id = reaction.user_id?.get();
        if self.is_self(user_id) {
            return Some((user_id, true));
        }
        if let Some(member) = &reaction.member {
            return Some((user_id, member.user.bot));
        }
        match reaction.user(ctx).await {
            Ok(user) => Some((user_id, user.bot)),
            Err(e) => {
                warn!("failed to fetch user {} for reaction: {}", user_id, e);
                None
            }
        }
    }
}

pub fn map_event_status(status: ScheduledEventStatus) -> EventStatus {
    match status {
        ScheduledEventStatus::Scheduled => EventStatus::Scheduled,
        ScheduledEventStatus::Active => EventStatus::Active,
        ScheduledEventStatus::Completed => EventStatus::Completed,
        ScheduledEventStatus::Canceled => EventStatus::Canceled,
        _ => EventStatus::Unknown,
    }
}

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("connected as {} ({})", ready.user.name, ready.user.id);
        let _ = self.bot_id.set(ready.user.id.get());

        if self.sync_commands {
            match register_commands(&ctx.http, &self.dev_guilds).await {
                Ok(_) => info!("slash commands registered"),
                Err(e) => error!("failed to register slash commands: {}", e),
            }
        }
    }

    async fn message(&self, ctx: Context, message: Message) {
        if message.kind == MessageType::MemberJoin {
            if let Err(e) = message.react(&ctx.http, WELCOME_REACTION).await {
                warn!("failed to greet new member in {}: {}", message.channel_id, e);
            }
            return;
        }

        if u8::from(message.kind) != POLL_RESULT_MESSAGE_KIND || !self.is_self(message.author.id.get())
        {
            return;
        }
        let (Some(guild_id), Some(poll_message_id)) = (
            message.guild_id,
            message
                .message_reference
                .as_ref()
                .and_then(|reference| reference.message_id),
        ) else {
            warn!("poll result {} without a poll reference", message.id);
            return;
        };

        match self
            .engine
            .resolve_poll(guild_id.get(), message.channel_id.get(), poll_message_id.get())
            .await
        {
            Ok(resolution) => info!("poll {} resolved: {:?}", poll_message_id, resolution),
            Err(e) => error!("failed to resolve poll {}: {}", poll_message_id, e),
        }
    }

    async fn reaction_add(&self, ctx: Context, reaction: Reaction) {
        let Some(guild_id) = reaction.guild_id else {
            return;
        };
        let Some((user_id, is_bot)) = self.reacting_user(&ctx, &reaction).await else {
            return;
        };
        if let Err(e) = self
            .engine
            .reaction_added(guild_id.get(), reaction.message_id.get(), user_id, is_bot)
            .await
        {
            error!(
                "failed to grant role for reaction on {}: {}",
                reaction.message_id, e
            );
        }
    }

    async fn reaction_remove(&self, ctx: Context, reaction: Reaction) {
        let Some(guild_id) = reaction.guild_id else {
            return;
        };
        let Some((user_id, is_bot)) = self.reacting_user(&ctx, &reaction).await else {
            return;
        };
        if let Err(e) = self
            .engine
            .reaction_removed(guild_id.get(), reaction.message_id.get(), user_id, is_bot)
            .await
        {
            error!(
                "failed to revoke role for reaction on {}: {}",
                reaction.message_id, e
            );
        }
    }

    async fn guild_scheduled_event_update(&self, _ctx: Context, event: ScheduledEvent) {
        let status = map_event_status(event.status);
        debug!("scheduled event {} is now {}", event.id, status);

        match self
            .engine
            .handle_status_update(event.guild_id.get(), event.id.get(), &event.name, status)
            .await
        {
            Ok(StatusOutcome::Ignored) => {}
            Ok(outcome) => info!("scheduled event {} handled: {:?}", event.id, outcome),
            Err(e) => error!("failed to handle scheduled event {}: {}", event.id, e),
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        handle_interaction(&ctx, &self.engine, interaction).await;
    }
}
