mod ctfs;
mod servers;

pub use ctfs::*;
use ctfhelper_core::CoreError;
pub use servers::*;
use thiserror::Error;

use crate::infra::{chat::ChatError, ctftime::Error as EventIndexError};

#[derive(Error, Debug)]
pub enum Error {
    #[error("command used outside of a guild")]
    GuildOnly,
    #[error("guild {0} has no server config")]
    NotConfigured(u64),
    #[error("member {0} lacks the required role")]
    MissingPermission(u64),
    #[error("{0}")]
    InvalidInput(String),
    #[error("no ctf found: {0}")]
    CtfNotFound(String),
    #[error("item not found: {0}")]
    NotFound(String),
    #[error("ctf already present: {0}")]
    DuplicateCtf(String),
    #[error("event index failed: {0}")]
    EventIndex(#[from] EventIndexError),
    #[error("chat platform failed: {0}")]
    Chat(#[from] ChatError),
    #[error("problem querying db: {0}")]
    DbError(#[from] sqlx::Error),
    #[error("vote refused: {0}")]
    VoteRefused(String),
}

impl From<CoreError> for Error {
    fn from(value: CoreError) -> Self {
        match value {
            CoreError::CandidateCount { .. } => Error::VoteRefused(value.to_string()),
            other => Error::InvalidInput(other.to_string()),
        }
    }
}

impl Error {
    /// Short text safe to show a member; upstream details stay in the logs.
    pub fn user_message(&self) -> String {
        match self {
            Error::GuildOnly => String::from("This command can only be used inside a guild. ❌"),
            Error::NotConfigured(_) => {
                String::from("The server is not configured. ❌ Please run the /init command.")
            }
            Error::MissingPermission(_) => {
                String::from("You don't have the required role to run this command. ❌")
            }
            Error::InvalidInput(reason) => format!("{} ❌", reason),
            Error::CtfNotFound(_) => {
                String::from("This command can only be used inside a CTF channel. ❌")
            }
            Error::NotFound(_) => String::from("Nothing was found for this request. ❌"),
            Error::DuplicateCtf(_) => {
                String::from("The CTF is already present in the discord server. ❌")
            }
            Error::EventIndex(EventIndexError::NotFound(_)) => {
                String::from("The CTF was not found on CTFtime. ❌")
            }
            Error::EventIndex(_) => String::from("Failed to get the information of the CTF. ❌"),
            Error::Chat(_) => String::from("Failed to apply the changes in the discord server. ❌"),
            Error::DbError(_) => String::from("Failed to access the database. ❌"),
            Error::VoteRefused(_) => String::from(
                "There must be between 2 and 10 CTFs this week to create a vote. ❌",
            ),
        }
    }
}
