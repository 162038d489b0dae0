//! ctfhelper-core: pure rules of the CTF lifecycle
//!
//! Nothing in here talks to the chat platform, the event index or the database.
//! The bot crate feeds it plain values and acts on what it returns.

pub mod errors;
pub mod naming;
pub mod types;
pub mod vote;

pub use errors::*;
pub use naming::*;
pub use types::*;
pub use vote::*;
