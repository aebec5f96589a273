//! Front ends that drive a [`SessionManager`](crate::SessionManager) for a human.

mod console;

pub use console::ConsoleAdapter;

/// Where a front end goes after a prompt has been dealt with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Back to the main screen.
    Restart,
    Exit,
}

/// A user interface for logging in, picking a playlist, and exporting it.
///
/// Implementations own their [`SessionManager`](crate::SessionManager). Any error
/// that reaches `start` is shown to the user with [`Presenter::show_error`] and ends
/// the session.
///
/// Event-driven front ends that can't block on a manager call should hand the
/// manager to a [`SessionWorker`](crate::SessionWorker) and react to its events.
#[allow(async_fn_in_trait)]
pub trait Presenter {
    /// Runs the front end until the user leaves or an error ends it.
    async fn start(&mut self) -> eyre::Result<()>;

    /// Logs in through OAuth and continues to playlist selection.
    async fn prompt_login(&mut self) -> eyre::Result<Flow>;

    /// Asks whose playlists to show, then continues to playlist selection as a guest.
    async fn prompt_guest(&mut self) -> eyre::Result<Flow>;

    fn show_error(&mut self, title: &str, message: &str);

    fn show_warning(&mut self, title: &str, message: &str);
}
