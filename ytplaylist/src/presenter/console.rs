use super::{Flow, Presenter};
use crate::error::MissingCredentialsFile;
use crate::session::{PlaylistSummary, SessionManager};
use eyre::Context;
use std::io::{BufRead, Write};
use std::path::Path;

/// A line-oriented terminal front end.
///
/// Everything happens in sequence: each prompt blocks on `input` and each manager
/// call is awaited before the next prompt is shown.
#[derive(Debug)]
pub struct ConsoleAdapter<R, W> {
    manager: SessionManager,
    input: R,
    output: W,
    /// Whose playlists to list; `None` lists the logged-in user's own.
    username: Option<String>,
}

impl<R: BufRead, W: Write> ConsoleAdapter<R, W> {
    pub fn new(manager: SessionManager, input: R, output: W) -> Self {
        Self {
            manager,
            input,
            output,
            username: None,
        }
    }

    pub fn into_parts(self) -> (SessionManager, W) {
        (self.manager, self.output)
    }

    fn read_line(&mut self, prompt: &str) -> eyre::Result<String> {
        write!(self.output, "{prompt}")?;
        self.output.flush()?;
        let mut line = String::new();
        let n = self.input.read_line(&mut line).context("read from terminal")?;
        if n == 0 {
            eyre::bail!("input closed");
        }
        Ok(line.trim().to_string())
    }

    async fn main_screen(&mut self) -> eyre::Result<Flow> {
        let choice = loop {
            writeln!(self.output, "Choose one of the following:")?;
            writeln!(
                self.output,
                "[1] Authenticate with OAuth 2.0 to access all your playlists *"
            )?;
            writeln!(self.output, "[2] Input username of playlist creator")?;
            writeln!(self.output, "[3] Exit application")?;
            writeln!(self.output)?;
            writeln!(
                self.output,
                "* - Google no longer allows signing in with a plain password, so"
            )?;
            writeln!(
                self.output,
                "    you'll be sent to Google to grant access instead. The OAuth"
            )?;
            writeln!(self.output, "    access token will be saved for reuse.")?;
            let choice = self.read_line("Your choice: ")?;
            if matches!(choice.as_str(), "1" | "2" | "3") {
                break choice;
            }
            writeln!(self.output, "Unknown choice. Repeating")?;
        };

        match choice.as_str() {
            "1" => self.prompt_login().await,
            "2" => self.prompt_guest().await,
            _ => Ok(Flow::Exit),
        }
    }

    async fn playlist_select(&mut self) -> eyre::Result<Flow> {
        writeln!(self.output, "Fetching playlists. Please wait...")?;
        let Some(playlists) = self
            .manager
            .list_playlists(self.username.as_deref())
            .await?
        else {
            self.show_error("Not found", "No such user or no public playlists.");
            return Ok(Flow::Exit);
        };
        writeln!(self.output, "Successfully fetched playlists.")?;

        let logged_in = self.manager.is_logged_in();
        let width = playlists.len().to_string().len();
        let index = loop {
            writeln!(self.output, "Please select a playlist to export:")?;
            writeln!(self.output, "[{:>width$}] Exit application", 0)?;
            if logged_in {
                writeln!(
                    self.output,
                    "[{:>width$}] Destroy the stored credentials (a.k.a. 'Logout')",
                    "d"
                )?;
            }
            for (i, playlist) in playlists.iter().enumerate() {
                writeln!(self.output, "[{:>width$}] \"{}\"", i + 1, playlist.title)?;
            }

            let choice = self.read_line("Which playlist do you want to export: ")?;
            if choice == "0" {
                return Ok(Flow::Exit);
            }
            if logged_in && choice.eq_ignore_ascii_case("d") {
                self.manager.destroy_credentials().await?;
                writeln!(self.output, "Stored credentials deleted.")?;
                return Ok(Flow::Exit);
            }
            match choice.parse::<usize>() {
                Ok(n) if (1..=playlists.len()).contains(&n) => break n - 1,
                _ => writeln!(self.output, "Unknown choice. Repeating")?,
            }
        };

        self.prompt_save_playlist(&playlists[index]).await
    }

    async fn prompt_save_playlist(&mut self, playlist: &PlaylistSummary) -> eyre::Result<Flow> {
        writeln!(self.output, "About to save playlist: {}", playlist.title)?;
        writeln!(
            self.output,
            "Filename can be relative. Output will be a PLS playlist"
        )?;
        writeln!(self.output, "Invalid filename will exit, so type carefully.")?;
        let filename = self.read_line("Type output filename: ")?;
        let path = Path::new(&filename);
        if !is_valid_output_path(path) {
            self.show_error("Invalid filename", &format!("cannot write to '{filename}'"));
            return Ok(Flow::Exit);
        }

        let entries = self.manager.export_playlist(&playlist.id, path).await?;
        writeln!(
            self.output,
            "Successful. Saved {entries} entries to {}.",
            path.display()
        )?;
        writeln!(self.output, "Return to main screen? [y/N]")?;
        let choice = self.read_line("Repeat? ")?;
        Ok(if choice.eq_ignore_ascii_case("y") {
            Flow::Restart
        } else {
            Flow::Exit
        })
    }
}

/// A path we can create a file at: non-empty, not a directory, in a directory that
/// exists.
fn is_valid_output_path(path: &Path) -> bool {
    if path.as_os_str().is_empty() || path.is_dir() {
        return false;
    }
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.is_dir(),
        _ => true,
    }
}

fn print_notice(output: &mut impl Write, label: &str, message: &str) {
    let _ = writeln!(output, "{label}");
    let _ = writeln!(output, "Message: {message}");
}

fn print_warning(output: &mut impl Write, warning: &MissingCredentialsFile) {
    print_notice(
        output,
        &format!("WARNING: {}", MissingCredentialsFile::TITLE),
        &warning.to_string(),
    );
}

impl<R: BufRead, W: Write> Presenter for ConsoleAdapter<R, W> {
    async fn start(&mut self) -> eyre::Result<()> {
        loop {
            match self.main_screen().await {
                Ok(Flow::Restart) => continue,
                Ok(Flow::Exit) => return Ok(()),
                Err(e) => {
                    self.show_error("Error", &format!("{e:#}"));
                    return Err(e);
                }
            }
        }
    }

    async fn prompt_login(&mut self) -> eyre::Result<Flow> {
        if self.manager.config().launch_browser {
            writeln!(self.output, "Please follow the instructions in your browser.")?;
        } else {
            writeln!(
                self.output,
                "Open the authorization URL shown in the terminal and follow the instructions there."
            )?;
        }
        let output = &mut self.output;
        self.manager
            .authenticate(|warning| print_warning(output, &warning))
            .await?;
        self.username = None;
        self.playlist_select().await
    }

    async fn prompt_guest(&mut self) -> eyre::Result<Flow> {
        let username = self.read_line("Enter username: ")?;
        let output = &mut self.output;
        self.manager
            .continue_as_guest(|warning| print_warning(output, &warning))
            .await?;
        self.username = Some(username);
        self.playlist_select().await
    }

    fn show_error(&mut self, title: &str, message: &str) {
        print_notice(&mut self.output, title, message);
    }

    fn show_warning(&mut self, title: &str, message: &str) {
        print_notice(&mut self.output, &format!("WARNING: {title}"), message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::test_support::StubYouTube;
    use reqwest::StatusCode;
    use serde_json::json;

    async fn run(
        stub: &StubYouTube,
        dir: &tempfile::TempDir,
        input: &str,
    ) -> (eyre::Result<()>, String) {
        let config = Config {
            api_endpoint: stub.endpoint(),
            launch_browser: false,
            ..Config::in_dir(dir.path())
        };
        let manager = SessionManager::with_http_client(config, stub.http_client());
        let mut console = ConsoleAdapter::new(manager, input.as_bytes(), Vec::new());
        let result = console.start().await;
        let (_, output) = console.into_parts();
        (result, String::from_utf8(output).unwrap())
    }

    fn routes(request: &crate::test_support::RecordedRequest) -> (StatusCode, serde_json::Value) {
        if request.path.ends_with("/channels") {
            match request.param("forUsername") {
                Some("someone") => (StatusCode::OK, json!({"items": [{"id": "UC1"}]})),
                _ => (StatusCode::OK, json!({"items": []})),
            }
        } else if request.path.ends_with("/playlists") {
            (
                StatusCode::OK,
                StubYouTube::playlists_page(&[("PLa", "Road trip"), ("PLb", "Focus")]),
            )
        } else {
            (
                StatusCode::OK,
                StubYouTube::playlist_items_page(&["one", "two", "three"], None),
            )
        }
    }

    #[tokio::test]
    async fn guest_exports_selected_playlist() {
        let stub = StubYouTube::serve(routes).await;
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("api_key.txt"), "k").unwrap();
        let out = dir.path().join("focus.pls");

        let input = format!("2\nsomeone\n2\n{}\nn\n", out.display());
        let (result, output) = run(&stub, &dir, &input).await;

        result.unwrap();
        assert!(output.contains("WARNING: Missing files"), "{output}");
        assert!(output.contains("[1] \"Road trip\""), "{output}");
        assert!(output.contains("About to save playlist: Focus"), "{output}");
        assert!(output.contains("Saved 3 entries"), "{output}");
        let contents = std::fs::read_to_string(&out).unwrap();
        assert!(contents.starts_with("[playlist]\nNumberOfEntries=3\nTitle1=one\n"));
        assert_eq!(stub.requests_to("playlistItems")[0].param("playlistId"), Some("PLb"));
    }

    #[tokio::test]
    async fn unknown_user_is_reported_as_not_found() {
        let stub = StubYouTube::serve(routes).await;
        let dir = tempfile::tempdir().unwrap();

        let (result, output) = run(&stub, &dir, "2\nnobody\n").await;

        result.unwrap();
        assert!(
            output.contains("Not found\nMessage: No such user or no public playlists."),
            "{output}"
        );
        assert!(stub.requests_to("playlists").is_empty());
    }

    #[tokio::test]
    async fn repeats_menu_until_choice_is_valid() {
        let stub = StubYouTube::serve(routes).await;
        let dir = tempfile::tempdir().unwrap();

        let (result, output) = run(&stub, &dir, "9\nhello\n3\n").await;

        result.unwrap();
        assert_eq!(output.matches("Unknown choice. Repeating").count(), 2);
        assert!(stub.requests().is_empty());
    }

    #[tokio::test]
    async fn can_return_to_main_screen_after_export() {
        let stub = StubYouTube::serve(routes).await;
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("api_key.txt"), "k").unwrap();
        let out = dir.path().join("trip.pls");

        let input = format!("2\nsomeone\n1\n{}\ny\n3\n", out.display());
        let (result, output) = run(&stub, &dir, &input).await;

        result.unwrap();
        assert_eq!(output.matches("Choose one of the following:").count(), 2);
        assert!(out.exists());
    }

    #[tokio::test]
    async fn invalid_filename_exits_without_export() {
        let stub = StubYouTube::serve(routes).await;
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("api_key.txt"), "k").unwrap();
        let missing_dir = dir.path().join("no-such-dir").join("out.pls");

        let input = format!("2\nsomeone\n1\n{}\n", missing_dir.display());
        let (result, output) = run(&stub, &dir, &input).await;

        result.unwrap();
        assert!(output.contains("Invalid filename"), "{output}");
        assert!(stub.requests_to("playlistItems").is_empty());
    }

    #[tokio::test]
    async fn remote_failure_is_shown_and_ends_the_session() {
        let stub = StubYouTube::serve(|_| {
            (
                StatusCode::FORBIDDEN,
                json!({"error": {"code": 403, "message": "The request is missing a valid API key."}}),
            )
        })
        .await;
        let dir = tempfile::tempdir().unwrap();

        let (result, output) = run(&stub, &dir, "2\nsomeone\n").await;

        assert!(result.is_err());
        assert!(output.contains("Error\nMessage: "), "{output}");
        assert_eq!(output.matches("missing a valid API key").count(), 1, "{output}");
        assert!(
            output.contains("Message: YouTube API request failed: YouTube API request to "),
            "{output}"
        );
    }

    #[tokio::test]
    async fn closed_input_ends_the_session() {
        let stub = StubYouTube::serve(routes).await;
        let dir = tempfile::tempdir().unwrap();

        let (result, output) = run(&stub, &dir, "").await;

        assert!(result.is_err());
        assert!(output.contains("input closed"), "{output}");
    }

    #[tokio::test]
    async fn login_without_browser_points_at_the_printed_url() {
        let stub = StubYouTube::serve(|_| {
            (StatusCode::OK, StubYouTube::playlists_page(&[("PLmine", "Liked")]))
        })
        .await;
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("client_secrets.json"),
            r#"{"installed": {"client_id": "id", "client_secret": "s"}}"#,
        )
        .unwrap();
        std::fs::write(dir.path().join("api_key.txt"), "k").unwrap();
        let token = serde_json::from_value(json!({
            "access_token": "stored-access-token",
            "token_type": "bearer",
            "expires_in": 3600,
        }))
        .unwrap();
        crate::oauth::TimeBoundAccessToken::new(token)
            .to_stored()
            .unwrap()
            .save(&dir.path().join("oauth2.json"))
            .await
            .unwrap();

        let (result, output) = run(&stub, &dir, "1
0
").await;

        result.unwrap();
        assert!(
            output.contains("Open the authorization URL shown in the terminal"),
            "{output}"
        );
        assert!(!output.contains("in your browser"), "{output}");
        assert!(output.contains("[d] Destroy the stored credentials"), "{output}");
        assert!(output.contains("[1] \"Liked\""), "{output}");
    }

    #[test]
    fn output_paths_need_an_existing_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(is_valid_output_path(Path::new("relative.pls")));
        assert!(is_valid_output_path(&dir.path().join("out.pls")));
        assert!(!is_valid_output_path(Path::new("")));
        assert!(!is_valid_output_path(dir.path()));
        assert!(!is_valid_output_path(&dir.path().join("missing").join("out.pls")));
    }
}
