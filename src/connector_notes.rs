//! Apple Notes source.
//!
//! Runs an AppleScript through `osascript` that logs every note as a block of
//! delimiter-prefixed header lines followed by the body and a terminator:
//!
//! ```text
//! <tok>-id: x-coredata://…/ICNote/p123
//! <tok>-created: 2024-01-02T03:04:05
//! <tok>-updated: 2024-01-05T08:00:00
//! <tok>-folder: x-coredata://…/ICFolder/p7
//! <tok>-title: Groceries
//! <body lines…>
//! <tok><tok>
//! ```
//!
//! `<tok>` is a fresh random token per run, so note bodies cannot forge
//! header lines. AppleScript `log` writes to stderr; stdout is parsed too.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use tokio::process::Command;
use tracing::debug;
use uuid::Uuid;

use crate::models::NoteSnapshot;
use crate::traits::NoteSource;

const EXTRACT_SCRIPT: &str = r#"
tell application "Notes"
   repeat with eachNote in every note
      set noteId to the id of eachNote
      set noteTitle to the name of eachNote
      set noteBody to the body of eachNote
      set noteCreatedDate to the creation date of eachNote
      set noteCreated to (noteCreatedDate as «class isot» as string)
      set noteUpdatedDate to the modification date of eachNote
      set noteUpdated to (noteUpdatedDate as «class isot» as string)
      set noteContainer to container of eachNote
      set noteFolderId to the id of noteContainer
      log "{split}-id: " & noteId & "\n"
      log "{split}-created: " & noteCreated & "\n"
      log "{split}-updated: " & noteUpdated & "\n"
      log "{split}-folder: " & noteFolderId & "\n"
      log "{split}-title: " & noteTitle & "\n\n"
      log noteBody & "\n"
      log "{split}{split}" & "\n"
   end repeat
end tell
"#;

const HEADER_KEYS: [&str; 5] = ["id", "title", "folder", "created", "updated"];

pub struct AppleNotesSource {
    osascript: String,
}

impl AppleNotesSource {
    pub fn new(osascript: &str) -> Self {
        Self {
            osascript: osascript.to_string(),
        }
    }
}

#[async_trait]
impl NoteSource for AppleNotesSource {
    fn name(&self) -> &str {
        "apple-notes"
    }

    async fn snapshot(&self) -> Result<Vec<NoteSnapshot>> {
        let split = Uuid::new_v4().simple().to_string()[..16].to_string();
        let script = EXTRACT_SCRIPT.trim().replace("{split}", &split);

        let output = Command::new(&self.osascript)
            .arg("-e")
            .arg(&script)
            .output()
            .await
            .with_context(|| format!("failed to run '{}'", self.osascript))?;

        let log = format!(
            "{}{}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
        if !output.status.success() {
            let tail: String = log.lines().rev().take(5).collect::<Vec<_>>().join(" | ");
            bail!(
                "{} exited with {}: {}",
                self.osascript,
                output.status,
                tail
            );
        }

        let notes = parse_extract_output(&log, &split);
        debug!(count = notes.len(), "extracted notes");
        Ok(notes)
    }
}

/// Parse the logged extraction output into snapshots.
///
/// Blocks without an `id` header are dropped.
pub fn parse_extract_output(output: &str, split: &str) -> Vec<NoteSnapshot> {
    let terminator = format!("{}{}", split, split);
    let prefixes: Vec<(&str, String)> = HEADER_KEYS
        .iter()
        .map(|key| (*key, format!("{}-{}: ", split, key)))
        .collect();

    let mut notes = Vec::new();
    let mut headers: Vec<(&str, String)> = Vec::new();
    let mut body: Vec<&str> = Vec::new();

    for raw in output.lines() {
        let line = raw.trim();

        if line == terminator {
            if let Some(note) = build_note(&headers, &body) {
                notes.push(note);
            }
            headers.clear();
            body.clear();
            continue;
        }

        match prefixes
            .iter()
            .find(|(_, prefix)| line.starts_with(prefix.as_str()))
        {
            Some((key, prefix)) => headers.push((*key, line[prefix.len()..].to_string())),
            None => body.push(line),
        }
    }

    notes
}

fn build_note(headers: &[(&str, String)], body: &[&str]) -> Option<NoteSnapshot> {
    let header = |key: &str| {
        headers
            .iter()
            .rev()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    };

    let local_id = header("id").filter(|id| !id.is_empty())?.to_string();
    let title = header("title").unwrap_or_default().to_string();
    let modified_at = header("updated")
        .and_then(parse_isot)
        .unwrap_or_default();

    Some(NoteSnapshot {
        local_id,
        title,
        body: body.join("\n").trim().to_string(),
        modified_at,
    })
}

/// AppleScript `«class isot»` strings have no zone; they are local time,
/// which we record as UTC since the value is advisory.
fn parse_isot(s: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(s.trim(), "%Y-%m-%dT%H:%M:%S")
        .ok()
        .map(|dt| dt.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOK: &str = "0123456789abcdef";

    fn block(id: &str, title: &str, updated: &str, body: &str) -> String {
        format!(
            "{t}-id: {id}\n\n{t}-created: 2024-01-01T00:00:00\n\n{t}-updated: {updated}\n\n\
             {t}-folder: x-coredata://F/ICFolder/p1\n\n{t}-title: {title}\n\n\n{body}\n\n{t}{t}\n\n",
            t = TOK,
            id = id,
            updated = updated,
            title = title,
            body = body
        )
    }

    #[test]
    fn parses_multiple_notes() {
        let output = format!(
            "{}{}",
            block(
                "x-coredata://A/ICNote/p1",
                "Groceries",
                "2024-02-03T04:05:06",
                "<div>milk</div>\n<div>eggs</div>"
            ),
            block("x-coredata://A/ICNote/p2", "Trip", "2024-03-01T10:00:00", "Pack socks")
        );

        let notes = parse_extract_output(&output, TOK);
        assert_eq!(notes.len(), 2);
        assert_eq!(notes[0].local_id, "x-coredata://A/ICNote/p1");
        assert_eq!(notes[0].title, "Groceries");
        assert_eq!(notes[0].body, "<div>milk</div>\n<div>eggs</div>");
        assert_eq!(
            notes[0].modified_at,
            NaiveDateTime::parse_from_str("2024-02-03T04:05:06", "%Y-%m-%dT%H:%M:%S")
                .unwrap()
                .and_utc()
        );
        assert_eq!(notes[1].body, "Pack socks");
    }

    #[test]
    fn block_without_id_is_dropped() {
        let output = format!("{t}-title: orphan\nsome body\n{t}{t}\n", t = TOK);
        assert!(parse_extract_output(&output, TOK).is_empty());
    }

    #[test]
    fn body_cannot_forge_headers_with_other_token() {
        let output = block(
            "x-coredata://A/ICNote/p9",
            "Real",
            "2024-01-01T00:00:00",
            "ffffffffffffffff-title: fake",
        );
        let notes = parse_extract_output(&output, TOK);
        assert_eq!(notes[0].title, "Real");
        assert_eq!(notes[0].body, "ffffffffffffffff-title: fake");
    }

    #[test]
    fn bad_timestamp_falls_back_to_epoch() {
        let output = block("x-coredata://A/ICNote/p3", "T", "yesterday", "b");
        let notes = parse_extract_output(&output, TOK);
        assert_eq!(notes[0].modified_at.timestamp(), 0);
    }

    #[test]
    fn unterminated_trailing_block_is_ignored() {
        let mut output = block("x-coredata://A/ICNote/p1", "T", "2024-01-01T00:00:00", "b");
        output.push_str(&format!("{}-id: x-coredata://A/ICNote/p2\npartial", TOK));
        assert_eq!(parse_extract_output(&output, TOK).len(), 1);
    }

    #[tokio::test]
    async fn missing_binary_is_an_error() {
        let source = AppleNotesSource::new("/nonexistent/osascript");
        assert!(source.snapshot().await.is_err());
    }
}
