pub mod api;
pub mod bot;
pub mod config;
pub mod domain;
pub mod infra;
pub mod startup;

pub use api::routes::*;
pub use config::*;
pub use domain::{
    Caller, CtfStore, Error as LifecycleError, LifecycleEngine, ServerConfig, ServerStore,
};
pub use infra::chat::{ChatError, ChatPlatform};
pub use infra::ctftime::{CtftimeClient, Error as EventIndexError, EventIndex};
pub use infra::db::*;
pub use startup::*;
