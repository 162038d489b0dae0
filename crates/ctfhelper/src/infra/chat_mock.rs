use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard, PoisonError},
};

use async_trait::async_trait;

use super::chat::{
    ChannelInfo, ChannelSpec, ChatError, ChatPlatform, OutgoingMessage, PollTally, RoleSpec,
    RoleUpdate, ScheduledEventSpec,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChatOp {
    CreateRole,
    UpdateRole,
    DeleteRole,
    GrantRole,
    RevokeRole,
    CreateChannel,
    MoveChannel,
    DeleteChannel,
    ChannelInfo,
    LockThread,
    CreateThread,
    SendMessage,
    PinMessage,
    AddReaction,
    DeleteMessage,
    FetchPoll,
    CreateScheduledEvent,
    DeleteScheduledEvent,
}

/// A call that went through, with the id handed back where there is one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCall {
    CreateRole { guild_id: u64, role: RoleSpec, role_id: u64 },
    UpdateRole { guild_id: u64, role_id: u64, update: RoleUpdate },
    DeleteRole { guild_id: u64, role_id: u64 },
    GrantRole { guild_id: u64, user_id: u64, role_id: u64 },
    RevokeRole { guild_id: u64, user_id: u64, role_id: u64 },
    CreateChannel { guild_id: u64, channel: ChannelSpec, channel_id: u64 },
    MoveChannel { channel_id: u64, category_id: u64 },
    DeleteChannel { channel_id: u64 },
    LockThread { thread_id: u64 },
    CreateThread { channel_id: u64, message_id: u64, name: String, thread_id: u64 },
    SendMessage { channel_id: u64, message: OutgoingMessage, message_id: u64 },
    PinMessage { channel_id: u64, message_id: u64 },
    AddReaction { channel_id: u64, message_id: u64, emoji: char },
    DeleteMessage { channel_id: u64, message_id: u64 },
    CreateScheduledEvent { guild_id: u64, event: ScheduledEventSpec, event_id: u64 },
    DeleteScheduledEvent { guild_id: u64, event_id: u64 },
}

struct Fault {
    error: ChatError,
    /// `None` fails forever.
    remaining: Option<usize>,
}

#[derive(Default)]
struct State {
    next_id: u64,
    attempts: Vec<ChatOp>,
    calls: Vec<ChatCall>,
    faults: HashMap<ChatOp, Fault>,
    channels: HashMap<u64, ChannelInfo>,
    polls: HashMap<(u64, u64), Vec<PollTally>>,
}

/// In-memory chat platform that records every call and fails on request.
pub struct MockChat {
    state: Mutex<State>,
}

impl Default for MockChat {
    fn default() -> Self {
        Self::new()
    }
}

impl MockChat {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                next_id: 1_000,
                ..Default::default()
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Every later `op` call fails with `error`.
    pub fn fail(&self, op: ChatOp, error: ChatError) {
        self.state().faults.insert(
            op,
            Fault {
                error,
                remaining: None,
            },
        );
    }

    /// The next `times` calls of `op` fail with `error`.
    pub fn fail_times(&self, op: ChatOp, error: ChatError, times: usize) {
        self.state().faults.insert(
            op,
            Fault {
                error,
                remaining: Some(times),
            },
        );
    }

    pub fn clear_faults(&self) {
        self.state().faults.clear();
    }

    pub fn add_thread(&self, thread_id: u64, parent_id: u64) {
        self.state().channels.insert(
            thread_id,
            ChannelInfo {
                id: thread_id,
                is_thread: true,
                parent_id: Some(parent_id),
            },
        );
    }

    pub fn set_poll(&self, channel_id: u64, message_id: u64, tallies: Vec<PollTally>) {
        self.state().polls.insert((channel_id, message_id), tallies);
    }

    pub fn attempts(&self) -> Vec<ChatOp> {
        self.state().attempts.clone()
    }

    pub fn calls(&self) -> Vec<ChatCall> {
        self.state().calls.clone()
    }

    pub fn attempt_count(&self, op: ChatOp) -> usize {
        self.state().attempts.iter().filter(|a| **a == op).count()
    }

    pub fn messages_in(&self, channel: u64) -> Vec<OutgoingMessage> {
        self.state()
            .calls
            .iter()
            .filter_map(|call| match call {
                ChatCall::SendMessage {
                    channel_id,
                    message,
                    ..
                } if *channel_id == channel => Some(message.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn reset(&self) {
        let mut state = self.state();
        state.attempts.clear();
        state.calls.clear();
        state.faults.clear();
    }

    fn begin(&self, op: ChatOp) -> Result<MutexGuard<'_, State>, ChatError> {
        let mut state = self.state();
        state.attempts.push(op);
        if let Some(fault) = state.faults.get_mut(&op) {
            let error = fault.error.clone();
            match fault.remaining.as_mut() {
                None => return Err(error),
                Some(0) => {}
                Some(remaining) => {
                    *remaining -= 1;
                    return Err(error);
                }
            }
        }
        Ok(state)
    }

    fn record(state: &mut State, call: ChatCall) {
        state.calls.push(call);
    }

    fn allocate(state: &mut State) -> u64 {
        state.next_id += 1;
        state.next_id
    }
}

#[async_trait]
impl ChatPlatform for MockChat {
    async fn create_role(&self, guild_id: u64, role: RoleSpec) -> Result<u64, ChatError> {
        let mut state = self.begin(ChatOp::CreateRole)?;
        let role_id = Self::allocate(&mut state);
        Self::record(
            &mut state,
            ChatCall::CreateRole {
                guild_id,
                role,
                role_id,
            },
        );
        Ok(role_id)
    }

    async fn update_role(
        &self,
        guild_id: u64,
        role_id: u64,
        update: RoleUpdate,
    ) -> Result<(), ChatError> {
        let mut state = self.begin(ChatOp::UpdateRole)?;
        Self::record(
            &mut state,
            ChatCall::UpdateRole {
                guild_id,
                role_id,
                update,
            },
        );
        Ok(())
    }

    async fn delete_role(&self, guild_id: u64, role_id: u64) -> Result<(), ChatError> {
        let mut state = self.begin(ChatOp::DeleteRole)?;
        Self::record(&mut state, ChatCall::DeleteRole { guild_id, role_id });
        Ok(())
    }

    async fn grant_role(
        &self,
        guild_id: u64,
        user_id: u64,
        role_id: u64,
    ) -> Result<(), ChatError> {
        let mut state = self.begin(ChatOp::GrantRole)?;
        Self::record(
            &mut state,
            ChatCall::GrantRole {
                guild_id,
                user_id,
                role_id,
            },
        );
        Ok(())
    }

    async fn revoke_role(
        &self,
        guild_id: u64,
        user_id: u64,
        role_id: u64,
    ) -> Result<(), ChatError> {
        let mut state = self.begin(ChatOp::RevokeRole)?;
        Self::record(
            &mut state,
            ChatCall::RevokeRole {
                guild_id,
                user_id,
                role_id,
            },
        );
        Ok(())
    }

    async fn create_text_channel(
        &self,
        guild_id: u64,
        channel: ChannelSpec,
    ) -> Result<u64, ChatError> {
        let mut state = self.begin(ChatOp::CreateChannel)?;
        let channel_id = Self::allocate(&mut state);
        state.channels.insert(
            channel_id,
            ChannelInfo {
                id: channel_id,
                is_thread: false,
                parent_id: Some(channel.category_id),
            },
        );
        Self::record(
            &mut state,
            ChatCall::CreateChannel {
                guild_id,
                channel,
                channel_id,
            },
        );
        Ok(channel_id)
    }

    async fn move_channel(&self, channel_id: u64, category_id: u64) -> Result<(), ChatError> {
        let mut state = self.begin(ChatOp::MoveChannel)?;
        Self::record(
            &mut state,
            ChatCall::MoveChannel {
                channel_id,
                category_id,
            },
        );
        Ok(())
    }

    async fn delete_channel(&self, channel_id: u64) -> Result<(), ChatError> {
        let mut state = self.begin(ChatOp::DeleteChannel)?;
        state.channels.remove(&channel_id);
        Self::record(&mut state, ChatCall::DeleteChannel { channel_id });
        Ok(())
    }

    async fn channel_info(&self, channel_id: u64) -> Result<ChannelInfo, ChatError> {
        let state = self.begin(ChatOp::ChannelInfo)?;
        Ok(state
            .channels
            .get(&channel_id)
            .copied()
            .unwrap_or(ChannelInfo {
                id: channel_id,
                is_thread: false,
                parent_id: None,
            }))
    }

    async fn lock_thread(&self, thread_id: u64) -> Result<(), ChatError> {
        let mut state = self.begin(ChatOp::LockThread)?;
        Self::record(&mut state, ChatCall::LockThread { thread_id });
        Ok(())
    }

    async fn create_thread(
        &self,
        channel_id: u64,
        message_id: u64,
        name: &str,
    ) -> Result<u64, ChatError> {
        let mut state = self.begin(ChatOp::CreateThread)?;
        let thread_id = Self::allocate(&mut state);
        state.channels.insert(
            thread_id,
            ChannelInfo {
                id: thread_id,
                is_thread: true,
                parent_id: Some(channel_id),
            },
        );
        Self::record(
            &mut state,
            ChatCall::CreateThread {
                channel_id,
                message_id,
                name: name.to_string(),
                thread_id,
            },
        );
        Ok(thread_id)
    }

    async fn send_message(
        &self,
        channel_id: u64,
        message: OutgoingMessage,
    ) -> Result<u64, ChatError> {
        let mut state = self.begin(ChatOp::SendMessage)?;
        let message_id = Self::allocate(&mut state);
        if let Some(poll) = &message.poll {
            let tallies = poll
                .answers
                .iter()
                .map(|text| PollTally {
                    text: text.clone(),
                    votes: 0,
                })
                .collect();
            state.polls.insert((channel_id, message_id), tallies);
        }
        Self::record(
            &mut state,
            ChatCall::SendMessage {
                channel_id,
                message,
                message_id,
            },
        );
        Ok(message_id)
    }

    async fn pin_message(&self, channel_id: u64, message_id: u64) -> Result<(), ChatError> {
        let mut state = self.begin(ChatOp::PinMessage)?;
        Self::record(
            &mut state,
            ChatCall::PinMessage {
                channel_id,
                message_id,
            },
        );
        Ok(())
    }

    async fn add_reaction(
        &self,
        channel_id: u64,
        message_id: u64,
        emoji: char,
    ) -> Result<(), ChatError> {
        let mut state = self.begin(ChatOp::AddReaction)?;
        Self::record(
            &mut state,
            ChatCall::AddReaction {
                channel_id,
                message_id,
                emoji,
            },
        );
        Ok(())
    }

    async fn delete_message(&self, channel_id: u64, message_id: u64) -> Result<(), ChatError> {
        let mut state = self.begin(ChatOp::DeleteMessage)?;
        Self::record(
            &mut state,
            ChatCall::DeleteMessage {
                channel_id,
                message_id,
            },
        );
        Ok(())
    }

    async fn fetch_poll(
        &self,
        channel_id: u64,
        message_id: u64,
    ) -> Result<Vec<PollTally>, ChatError> {
        let state = self.begin(ChatOp::FetchPoll)?;
        state
            .polls
            .get(&(channel_id, message_id))
            .cloned()
            .ok_or_else(|| ChatError::NotFound(format!("poll on message {}", message_id)))
    }

    async fn create_scheduled_event(
        &self,
        guild_id: u64,
        event: ScheduledEventSpec,
    ) -> Result<u64, ChatError> {
        let mut state = self.begin(ChatOp::CreateScheduledEvent)?;
        let event_id = Self::allocate(&mut state);
        Self::record(
            &mut state,
            ChatCall::CreateScheduledEvent {
                guild_id,
                event,
                event_id,
            },
        );
        Ok(event_id)
    }

    async fn delete_scheduled_event(
        &self,
        guild_id: u64,
        event_id: u64,
    ) -> Result<(), ChatError> {
        let mut state = self.begin(ChatOp::DeleteScheduledEvent)?;
        Self::record(&mut state, ChatCall::DeleteScheduledEvent { guild_id, event_id });
        Ok(())
    }
}
