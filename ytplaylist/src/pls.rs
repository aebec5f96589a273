//! Writer for the PLS playlist format.
//!
//! ```text
//! [playlist]
//! NumberOfEntries=2
//! Title1=First video
//! File1=http://youtube.com/watch?v=abc
//! Title2=Second video
//! File2=http://youtube.com/watch?v=def
//! ```
//!
//! Entries are numbered from 1, and every line ends with `\n`.

use std::path::Path;

const WATCH_URL: &str = "http://youtube.com/watch?v=";

/// One video of an exported playlist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistEntry {
    pub title: String,
    pub video_id: String,
}

/// Titles are written as they are; PLS has no escaping, so a line break in a title
/// ends up in the file.
pub fn render(entries: &[PlaylistEntry]) -> String {
    let mut out = format!("[playlist]\nNumberOfEntries={}\n", entries.len());
    for (i, entry) in entries.iter().enumerate() {
        let n = i + 1;
        out.push_str(&format!(
            "Title{n}={}\nFile{n}={WATCH_URL}{}\n",
            entry.title, entry.video_id
        ));
    }
    out
}

/// Renders `entries` and writes them to `path` as UTF-8, replacing any existing file.
pub async fn write(path: &Path, entries: &[PlaylistEntry]) -> std::io::Result<()> {
    tokio::fs::write(path, render(entries)).await
}
