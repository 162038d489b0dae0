use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use log::{debug, error};
use serenity::{
    all::{
        AutoArchiveDuration, ChannelId, ChannelType, Colour, CreateAttachment, CreateChannel,
        CreateEmbed, CreateEmbedFooter, CreateMessage, CreatePoll, CreatePollAnswer,
        CreateScheduledEvent, CreateThread, EditChannel, EditRole, EditThread, GuildId, MessageId,
        PermissionOverwriteType, Permissions, ReactionType, RoleId, ScheduledEventType, Timestamp,
        UserId,
    },
    http::{Http, HttpError},
    model::channel::PermissionOverwrite as DiscordOverwrite,
};
use time::OffsetDateTime;

use super::chat::{
    ChannelAccess, ChannelInfo, ChannelSpec, ChatError, ChatPlatform, Embed, OutgoingMessage,
    OverwriteTarget, PollSpec, PollTally, RoleSpec, RoleUpdate, ScheduledEventSpec,
};

const UNSUPPORTED_IMAGE: &str = "Unsupported image type";
const AUDIT_REASON: &str = "ctfhelper";

/// [`ChatPlatform`] over the Discord REST api.
#[derive(Clone)]
pub struct DiscordChat {
    http: Arc<Http>,
}

impl DiscordChat {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

fn map_error(error: serenity::Error) -> ChatError {
    if let serenity::Error::Http(HttpError::UnsuccessfulRequest(response)) = &error {
        let unsupported_image = std::iter::once(response.error.message.as_str())
            .chain(response.error.errors.iter().map(|e| e.message.as_str()))
            .any(|message| message.contains(UNSUPPORTED_IMAGE));
        if unsupported_image {
            return ChatError::UnsupportedImage;
        }
        if response.status_code.as_u16() == 404 {
            return ChatError::NotFound(response.url.clone());
        }
    }
    error!("chat platform error: {}", error);
    ChatError::Http(error.to_string())
}

fn timestamp(value: OffsetDateTime) -> Result<Timestamp, ChatError> {
    Timestamp::from_unix_timestamp(value.unix_timestamp())
        .map_err(|e| ChatError::Http(format!("invalid timestamp {}: {}", value, e)))
}

fn overwrite(guild_id: u64, spec: &super::chat::PermissionOverwrite) -> DiscordOverwrite {
    let role_id = match spec.target {
        // the @everyone role shares the guild id
        OverwriteTarget::Everyone => RoleId::new(guild_id),
        OverwriteTarget::Role(id) => RoleId::new(id),
    };
    let (allow, deny) = match spec.access {
        ChannelAccess::Hidden => (Permissions::empty(), Permissions::VIEW_CHANNEL),
        ChannelAccess::ReadWrite => (
            Permissions::VIEW_CHANNEL | Permissions::SEND_MESSAGES,
            Permissions::empty(),
        ),
    };
    DiscordOverwrite {
        allow,
        deny,
        kind: PermissionOverwriteType::Role(role_id),
    }
}

pub fn build_embed(embed: Embed) -> CreateEmbed {
    let mut builder = CreateEmbed::new().title(embed.title);
    if let Some(description) = embed.description {
        builder = builder.description(description);
    }
    if let Some(url) = embed.url {
        builder = builder.url(url);
    }
    if let Some(color) = embed.color {
        builder = builder.colour(Colour::new(color));
    }
    if let Some(thumbnail) = embed.thumbnail.filter(|t| !t.is_empty()) {
        builder = builder.thumbnail(thumbnail);
    }
    for field in embed.fields {
        builder = builder.field(field.name, field.value, field.inline);
    }
    if let Some(footer) = embed.footer {
        builder = builder.footer(CreateEmbedFooter::new(footer));
    }
    builder.timestamp(Timestamp::now())
}

fn build_poll(poll: PollSpec) -> CreatePoll<serenity::builder::create_poll::Ready> {
    let answers = poll
        .answers
        .into_iter()
        .map(|answer| CreatePollAnswer::new().text(answer))
        .collect::<Vec<_>>();
    CreatePoll::new()
        .question(poll.question)
        .answers(answers)
        .duration(Duration::from_secs(poll.duration_hours * 3600))
}

#[async_trait]
impl ChatPlatform for DiscordChat {
    async fn create_role(&self, guild_id: u64, role: RoleSpec) -> Result<u64, ChatError> {
        let builder = EditRole::new()
            .name(role.name)
            .colour(Colour::new(role.color))
            .hoist(role.hoist)
            .mentionable(role.mentionable)
            .audit_log_reason(AUDIT_REASON);
        let created = GuildId::new(guild_id)
            .create_role(&self.http, builder)
            .await
            .map_err(map_error)?;
        Ok(created.id.get())
    }

    async fn update_role(
        &self,
        guild_id: u64,
        role_id: u64,
        update: RoleUpdate,
    ) -> Result<(), ChatError> {
        let mut builder = EditRole::new();
        if let Some(color) = update.color {
            builder = builder.colour(Colour::new(color));
        }
        if let Some(hoist) = update.hoist {
            builder = builder.hoist(hoist);
        }
        if let Some(mentionable) = update.mentionable {
            builder = builder.mentionable(mentionable);
        }
        GuildId::new(guild_id)
            .edit_role(&self.http, RoleId::new(role_id), builder)
            .await
            .map_err(map_error)?;
        Ok(())
    }

    async fn delete_role(&self, guild_id: u64, role_id: u64) -> Result<(), ChatError> {
        GuildId::new(guild_id)
            .delete_role(&self.http, RoleId::new(role_id))
            .await
            .map_err(map_error)
    }

    async fn grant_role(
        &self,
        guild_id: u64,
        user_id: u64,
        role_id: u64,
    ) -> Result<(), ChatError> {
        self.http
            .add_member_role(
                GuildId::new(guild_id),
                UserId::new(user_id),
                RoleId::new(role_id),
                Some(AUDIT_REASON),
            )
            .await
            .map_err(map_error)
    }

    async fn revoke_role(
        &self,
        guild_id: u64,
        user_id: u64,
        role_id: u64,
    ) -> Result<(), ChatError> {
        self.http
            .remove_member_role(
                GuildId::new(guild_id),
                UserId::new(user_id),
                RoleId::new(role_id),
                Some(AUDIT_REASON),
            )
            .await
            .map_err(map_error)
    }

    async fn create_text_channel(
        &self,
        guild_id: u64,
        channel: ChannelSpec,
    ) -> Result<u64, ChatError> {
        let overwrites = channel
            .overwrites
            .iter()
            .map(|spec| overwrite(guild_id, spec))
            .collect::<Vec<_>>();
        let mut builder = CreateChannel::new(channel.name)
            .kind(ChannelType::Text)
            .category(ChannelId::new(channel.category_id))
            .permissions(overwrites);
        if let Some(topic) = channel.topic {
            builder = builder.topic(topic);
        }
        let created = GuildId::new(guild_id)
            .create_channel(&self.http, builder)
            .await
            .map_err(map_error)?;
        Ok(created.id.get())
    }

    async fn move_channel(&self, channel_id: u64, category_id: u64) -> Result<(), ChatError> {
        let builder = EditChannel::new()
            .category(Some(ChannelId::new(category_id)))
            .position(0);
        ChannelId::new(channel_id)
            .edit(&self.http, builder)
            .await
            .map_err(map_error)?;
        Ok(())
    }

    async fn delete_channel(&self, channel_id: u64) -> Result<(), ChatError> {
        ChannelId::new(channel_id)
            .delete(&self.http)
            .await
            .map_err(map_error)?;
        Ok(())
    }

    async fn channel_info(&self, channel_id: u64) -> Result<ChannelInfo, ChatError> {
        let channel = ChannelId::new(channel_id)
            .to_channel(&self.http)
            .await
            .map_err(map_error)?;
        let info = match channel.guild() {
            Some(guild_channel) => ChannelInfo {
                id: channel_id,
                is_thread: guild_channel.thread_metadata.is_some(),
                parent_id: guild_channel.parent_id.map(|id| id.get()),
            },
            None => ChannelInfo {
                id: channel_id,
                is_thread: false,
                parent_id: None,
            },
        };
        Ok(info)
    }

    async fn lock_thread(&self, thread_id: u64) -> Result<(), ChatError> {
        ChannelId::new(thread_id)
            .edit_thread(&self.http, EditThread::new().locked(true))
            .await
            .map_err(map_error)?;
        Ok(())
    }

    async fn create_thread(
        &self,
        channel_id: u64,
        message_id: u64,
        name: &str,
    ) -> Result<u64, ChatError> {
        let builder = CreateThread::new(name).auto_archive_duration(AutoArchiveDuration::ThreeDays);
        let thread = ChannelId::new(channel_id)
            .create_thread_from_message(&self.http, MessageId::new(message_id), builder)
            .await
            .map_err(map_error)?;
        Ok(thread.id.get())
    }

    async fn send_message(
        &self,
        channel_id: u64,
        message: OutgoingMessage,
    ) -> Result<u64, ChatError> {
        let mut builder = CreateMessage::new();
        if let Some(content) = message.content {
            builder = builder.content(content);
        }
        if !message.embeds.is_empty() {
            builder = builder.embeds(message.embeds.into_iter().map(build_embed).collect());
        }
        if let Some(poll) = message.poll {
            builder = builder.poll(build_poll(poll));
        }
        let sent = ChannelId::new(channel_id)
            .send_message(&self.http, builder)
            .await
            .map_err(map_error)?;
        Ok(sent.id.get())
    }

    async fn pin_message(&self, channel_id: u64, message_id: u64) -> Result<(), ChatError> {
        ChannelId::new(channel_id)
            .pin(&self.http, MessageId::new(message_id))
            .await
            .map_err(map_error)
    }

    async fn add_reaction(
        &self,
        channel_id: u64,
        message_id: u64,
        emoji: char,
    ) -> Result<(), ChatError> {
        ChannelId::new(channel_id)
            .create_reaction(
                &self.http,
                MessageId::new(message_id),
                ReactionType::Unicode(emoji.to_string()),
            )
            .await
            .map_err(map_error)
    }

    async fn delete_message(&self, channel_id: u64, message_id: u64) -> Result<(), ChatError> {
        ChannelId::new(channel_id)
            .delete_message(&self.http, MessageId::new(message_id))
            .await
            .map_err(map_error)
    }

    async fn fetch_poll(
        &self,
        channel_id: u64,
        message_id: u64,
    ) -> Result<Vec<PollTally>, ChatError> {
        let message = ChannelId::new(channel_id)
            .message(&self.http, MessageId::new(message_id))
            .await
            .map_err(map_error)?;
        let Some(poll) = message.poll.as_ref() else {
            return Err(ChatError::NotFound(format!(
                "message {} carries no poll",
                message_id
            )));
        };
        let counts = poll
            .results
            .as_ref()
            .map(|results| results.answer_counts.clone())
            .unwrap_or_default();

        let tallies = poll
            .answers
            .iter()
            .map(|answer| PollTally {
                text: answer.poll_media.text.clone().unwrap_or_default(),
                votes: counts
                    .iter()
                    .find(|count| count.id == answer.answer_id)
                    .map(|count| count.count)
                    .unwrap_or(0),
            })
            .collect::<Vec<_>>();
        debug!("poll {} tallies: {:?}", message_id, tallies);
        Ok(tallies)
    }

    async fn create_scheduled_event(
        &self,
        guild_id: u64,
        event: ScheduledEventSpec,
    ) -> Result<u64, ChatError> {
        let attachment = event
            .image
            .map(|image| CreateAttachment::bytes(image.data, image.file_name));
        let mut builder = CreateScheduledEvent::new(
            ScheduledEventType::External,
            event.name,
            timestamp(event.start)?,
        )
        .end_time(timestamp(event.end)?)
        .description(event.description)
        .location(event.location);
        if let Some(attachment) = attachment.as_ref() {
            builder = builder.image(attachment);
        }
        let created = GuildId::new(guild_id)
            .create_scheduled_event(&self.http, builder)
            .await
            .map_err(map_error)?;
        Ok(created.id.get())
    }

    async fn delete_scheduled_event(
        &self,
        guild_id: u64,
        event_id: u64,
    ) -> Result<(), ChatError> {
        GuildId::new(guild_id)
            .delete_scheduled_event(&self.http, event_id)
            .await
            .map_err(map_error)
    }
}
