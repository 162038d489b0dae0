//! Capability contract the lifecycle engine needs from the chat platform.
//!
//! Everything is expressed with plain snowflake ids so the engine never sees
//! gateway types; [`crate::infra::discord::DiscordChat`] maps these calls onto
//! the REST api and [`crate::infra::chat_mock::MockChat`] records them in memory.

use thiserror::Error;
use time::OffsetDateTime;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChatError {
    /// The platform refused the image attached to a scheduled event.
    #[error("unsupported image type given")]
    UnsupportedImage,
    #[error("not found: {0}")]
    NotFound(String),
    #[error("chat platform request failed: {0}")]
    Http(String),
    #[error("chat platform unavailable")]
    Unavailable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverwriteTarget {
    /// The guild-wide `@everyone` role.
    Everyone,
    Role(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelAccess {
    Hidden,
    ReadWrite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PermissionOverwrite {
    pub target: OverwriteTarget,
    pub access: ChannelAccess,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleSpec {
    pub name: String,
    pub color: u32,
    pub hoist: bool,
    pub mentionable: bool,
}

/// Visual attributes applied to an existing role; `None` leaves the attribute as is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleUpdate {
    pub color: Option<u32>,
    pub hoist: Option<bool>,
    pub mentionable: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSpec {
    pub name: String,
    pub category_id: u64,
    pub topic: Option<String>,
    pub overwrites: Vec<PermissionOverwrite>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelInfo {
    pub id: u64,
    pub is_thread: bool,
    pub parent_id: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Embed {
    pub title: String,
    pub description: Option<String>,
    pub url: Option<String>,
    pub color: Option<u32>,
    pub thumbnail: Option<String>,
    pub fields: Vec<EmbedField>,
    pub footer: Option<String>,
}

impl Embed {
    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>, inline: bool) -> Self {
        self.fields.push(EmbedField {
            name: name.into(),
            value: value.into(),
            inline,
        });
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollSpec {
    pub question: String,
    pub answers: Vec<String>,
    pub duration_hours: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub content: Option<String>,
    pub embeds: Vec<Embed>,
    pub poll: Option<PollSpec>,
}

impl OutgoingMessage {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Default::default()
        }
    }

    pub fn embed(embed: Embed) -> Self {
        Self {
            embeds: vec![embed],
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageAttachment {
    pub file_name: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledEventSpec {
    pub name: String,
    pub description: String,
    pub location: String,
    pub start: OffsetDateTime,
    pub end: OffsetDateTime,
    pub image: Option<ImageAttachment>,
}

/// One answer of a posted poll with its vote count (0 when nobody picked it).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollTally {
    pub text: String,
    pub votes: u64,
}

#[async_trait::async_trait]
pub trait ChatPlatform: Send + Sync {
    async fn create_role(&self, guild_id: u64, role: RoleSpec) -> Result<u64, ChatError>;
    async fn update_role(
        &self,
        guild_id: u64,
        role_id: u64,
        update: RoleUpdate,
    ) -> Result<(), ChatError>;
    async fn delete_role(&self, guild_id: u64, role_id: u64) -> Result<(), ChatError>;
    async fn grant_role(&self, guild_id: u64, user_id: u64, role_id: u64)
        -> Result<(), ChatError>;
    async fn revoke_role(
        &self,
        guild_id: u64,
        user_id: u64,
        role_id: u64,
    ) -> Result<(), ChatError>;

    async fn create_text_channel(
        &self,
        guild_id: u64,
        channel: ChannelSpec,
    ) -> Result<u64, ChatError>;
    /// Moves a channel under `category_id`, at the top of that category.
    async fn move_channel(&self, channel_id: u64, category_id: u64) -> Result<(), ChatError>;
    async fn delete_channel(&self, channel_id: u64) -> Result<(), ChatError>;
    async fn channel_info(&self, channel_id: u64) -> Result<ChannelInfo, ChatError>;
    async fn lock_thread(&self, thread_id: u64) -> Result<(), ChatError>;
    async fn create_thread(
        &self,
        channel_id: u64,
        message_id: u64,
        name: &str,
    ) -> Result<u64, ChatError>;

    async fn send_message(
        &self,
        channel_id: u64,
        message: OutgoingMessage,
    ) -> Result<u64, ChatError>;
    async fn pin_message(&self, channel_id: u64, message_id: u64) -> Result<(), ChatError>;
    async fn add_reaction(
        &self,
        channel_id: u64,
        message_id: u64,
        emoji: char,
    ) -> Result<(), ChatError>;
    async fn delete_message(&self, channel_id: u64, message_id: u64) -> Result<(), ChatError>;
    /// Answers of the poll carried by a message, in their posted order.
    async fn fetch_poll(
        &self,
        channel_id: u64,
        message_id: u64,
    ) -> Result<Vec<PollTally>, ChatError>;

    async fn create_scheduled_event(
        &self,
        guild_id: u64,
        event: ScheduledEventSpec,
    ) -> Result<u64, ChatError>;
    async fn delete_scheduled_event(&self, guild_id: u64, event_id: u64)
        -> Result<(), ChatError>;
}
