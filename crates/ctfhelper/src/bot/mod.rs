mod commands;
mod gateway;
mod interactions;

pub use commands::*;
pub use gateway::*;
pub use interactions::*;
