mod creation;
mod credentials;
mod flags_reports;
mod helpers;
mod removal;
mod status;
