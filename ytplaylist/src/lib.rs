//! Export YouTube playlists to PLS playlist files.
//!
//! A [`SessionManager`] logs in to YouTube (through OAuth, or as a guest with an API
//! key), lists playlists, and writes a chosen playlist to disk. Front ends drive it
//! either directly, as [`ConsoleAdapter`] does, or from a background task through
//! [`SessionWorker`].

pub mod config;
pub mod error;
pub mod oauth;
pub mod pls;
pub mod presenter;
pub mod session;
pub mod worker;
pub mod youtube_api;

#[cfg(test)]
mod test_support;

pub use config::Config;
pub use error::{MissingCredentialsFile, SessionError};
pub use presenter::{ConsoleAdapter, Flow, Presenter};
pub use session::{PlaylistSummary, Session, SessionManager, SessionState};
pub use worker::{SessionWorker, WorkerCommand, WorkerEvent, WorkerStopped};
