pub mod chat;
pub mod ctftime;
pub mod db;
pub mod discord;

// Mock implementations only available with e2e-testing feature or debug builds
#[cfg(any(feature = "e2e-testing", debug_assertions))]
pub mod chat_mock;
#[cfg(any(feature = "e2e-testing", debug_assertions))]
pub mod ctftime_mock;
