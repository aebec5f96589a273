//! Runs a [`SessionManager`] on a background task for event-driven front ends.
//!
//! The UI sends [`WorkerCommand`]s and keeps handling its own events; each
//! command's outcome comes back as a [`WorkerEvent`]. Commands run strictly one at a
//! time, in the order they were sent. The first failure is reported and then ends
//! the worker, so the front end's remaining flow stops with it.

use crate::error::{MissingCredentialsFile, SessionError};
use crate::session::{PlaylistSummary, SessionManager, SessionState};
use std::path::PathBuf;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerCommand {
    Authenticate,
    ContinueAsGuest,
    ListPlaylists { owner: Option<String> },
    ExportPlaylist { playlist_id: String, path: PathBuf },
    DestroyCredentials,
}

#[derive(Debug)]
pub enum WorkerEvent {
    /// Reported while a login command is still running.
    Warning(MissingCredentialsFile),
    /// `Authenticate` or `ContinueAsGuest` finished.
    LoggedIn(SessionState),
    /// `None` when the requested owner doesn't exist.
    Playlists(Option<Vec<PlaylistSummary>>),
    Exported { path: PathBuf, entries: usize },
    CredentialsDestroyed,
    /// The command failed; no further events follow.
    Failed(SessionError),
}

/// The worker has stopped, either after a failure or because it was shut down.
#[derive(Debug, thiserror::Error)]
#[error("session worker has stopped")]
pub struct WorkerStopped(pub WorkerCommand);

/// Handle to a running session worker.
#[derive(Debug)]
pub struct SessionWorker {
    commands: mpsc::Sender<WorkerCommand>,
    events: mpsc::UnboundedReceiver<WorkerEvent>,
    task: JoinHandle<SessionManager>,
}

impl SessionWorker {
    /// Moves `manager` onto a new background task.
    pub fn spawn(manager: SessionManager) -> Self {
        let (commands, command_rx) = mpsc::channel(1);
        let (event_tx, events) = mpsc::unbounded_channel();
        let task = tokio::spawn(run(manager, command_rx, event_tx));
        Self {
            commands,
            events,
            task,
        }
    }

    /// Queues a command, waiting while another command is still queued.
    pub async fn send(&self, command: WorkerCommand) -> Result<(), WorkerStopped> {
        self.commands
            .send(command)
            .await
            .map_err(|mpsc::error::SendError(command)| WorkerStopped(command))
    }

    /// Waits for the next event; `None` once the worker has stopped and every event
    /// has been received.
    pub async fn next_event(&mut self) -> Option<WorkerEvent> {
        self.events.recv().await
    }

    /// Waits for the event that completes the current command, passing any warnings
    /// that arrive first to `on_warning`.
    pub async fn completion(
        &mut self,
        mut on_warning: impl FnMut(MissingCredentialsFile),
    ) -> Option<WorkerEvent> {
        loop {
            match self.events.recv().await? {
                WorkerEvent::Warning(warning) => on_warning(warning),
                event => return Some(event),
            }
        }
    }

    /// Stops accepting commands, lets the current one finish, and hands back the
    /// manager. `None` if the worker task panicked.
    pub async fn shutdown(self) -> Option<SessionManager> {
        drop(self.commands);
        match self.task.await {
            Ok(manager) => Some(manager),
            Err(e) => {
                tracing::error!(error = %e, "session worker task failed");
                None
            }
        }
    }
}

async fn run(
    mut manager: SessionManager,
    mut commands: mpsc::Receiver<WorkerCommand>,
    events: mpsc::UnboundedSender<WorkerEvent>,
) -> SessionManager {
    while let Some(command) = commands.recv().await {
        tracing::debug!(?command, "running session command");
        let warn = |warning: MissingCredentialsFile| {
            let _ = events.send(WorkerEvent::Warning(warning));
        };
        let outcome = match command {
            WorkerCommand::Authenticate => manager
                .authenticate(warn)
                .await
                .map(|()| WorkerEvent::LoggedIn(manager.state())),
            WorkerCommand::ContinueAsGuest => manager
                .continue_as_guest(warn)
                .await
                .map(|()| WorkerEvent::LoggedIn(manager.state())),
            WorkerCommand::ListPlaylists { owner } => manager
                .list_playlists(owner.as_deref())
                .await
                .map(WorkerEvent::Playlists),
            WorkerCommand::ExportPlaylist { playlist_id, path } => manager
                .export_playlist(&playlist_id, &path)
                .await
                .map(|entries| WorkerEvent::Exported { path, entries }),
            WorkerCommand::DestroyCredentials => manager
                .destroy_credentials()
                .await
                .map(|()| WorkerEvent::CredentialsDestroyed),
        };

        match outcome {
            Ok(event) => {
                if events.send(event).is_err() {
                    tracing::debug!("front end went away, stopping session worker");
                    break;
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "session command failed, stopping session worker");
                let _ = events.send(WorkerEvent::Failed(e));
                break;
            }
        }
    }
    manager
}
