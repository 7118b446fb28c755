//! Append-only JSONL session log (spec "Session Log").
//!
//! One session is one file whose name encodes creation time and a short
//! id: `{millis}-{id}.jsonl`. Each line is one entry — header, message,
//! compaction, or branch — tagged by a `type` field. Entries form a linked
//! list via `id`/`parent_id`, which survives file concatenation and is what
//! makes `fork` reliable: the fork point is just "copy these entries,
//! start a new chain from a fresh header."
//!
//! Every write is flushed before `append_*` returns; writes are serialized
//! by `Session`'s own mutex, so one `Session` should have one writer.
//! Readers must tolerate unknown entry types and unknown fields, since the
//! format is meant to be forward-compatible.

use crate::error::{Error, Result};
use crate::message::Message;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;

const FORMAT_VERSION: u32 = 1;

/// One line of a session log file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Entry {
    Session {
        session_id: String,
        format_version: u32,
        created_at: u64,
        cwd: String,
    },
    Message {
        id: String,
        parent_id: Option<String>,
        timestamp: u64,
        role: String,
        message: Message,
    },
    Compaction {
        id: String,
        parent_id: Option<String>,
        timestamp: u64,
        summary: String,
        first_kept_entry_id: String,
        tokens_before: u64,
    },
    Branch {
        parent_path: String,
        fork_entry_id: String,
        branch_summary: Option<String>,
    },
    /// Catch-all for entry types a future format version introduces.
    /// Readers skip these rather than failing to parse.
    #[serde(other)]
    Unknown,
}

fn generate_entry_id() -> String {
    let mut rng = rand::thread_rng();
    let bytes: [u8; 6] = rng.r#gen();
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

fn generate_session_id() -> String {
    generate_entry_id()
}

/// A lightweight summary of a session file, produced by [`list`] without
/// replaying the full message history.
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub id: String,
    pub path: PathBuf,
    pub cwd: String,
    pub created_at: u64,
    pub message_count: usize,
    pub first_user_text: Option<String>,
}

/// One append-only session log, backed by a single file.
pub struct Session {
    path: PathBuf,
    session_id: String,
    write_lock: Mutex<()>,
    leaf_id: Mutex<Option<String>>,
}

impl Session {
    /// Create a new, empty session file in `dir`.
    pub async fn create(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)
            .await
            .map_err(|e| Error::session(format!("creating session directory: {e}")))?;

        let session_id = generate_session_id();
        let created_at = crate::message::now_ms();
        let filename = format!("{created_at}-{session_id}.jsonl");
        let path = dir.join(filename);

        let cwd = std::env::current_dir()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default();

        let header = Entry::Session {
            session_id: session_id.clone(),
            format_version: FORMAT_VERSION,
            created_at,
            cwd,
        };

        let session = Self {
            path,
            session_id,
            write_lock: Mutex::new(()),
            leaf_id: Mutex::new(None),
        };
        session.write_entry(&header).await?;
        Ok(session)
    }

    /// Create a forked session in `dir`: a fresh header, a `Branch` entry
    /// pointing at `parent`, then the first `keep_n` message entries of
    /// `parent` copied verbatim. `parent` is untouched.
    pub async fn fork(
        parent: &Path,
        dir: impl AsRef<Path>,
        keep_n: usize,
        branch_summary: Option<String>,
    ) -> Result<Self> {
        let parent_entries = read_entries(parent).await?;
        let messages: Vec<&Entry> = parent_entries
            .iter()
            .filter(|e| matches!(e, Entry::Message { .. }))
            .take(keep_n)
            .collect();

        let fork_entry_id = messages
            .last()
            .and_then(|e| match e {
                Entry::Message { id, .. } => Some(id.clone()),
                _ => None,
            })
            .unwrap_or_default();

        let forked = Session::create(dir).await?;
        let branch = Entry::Branch {
            parent_path: parent.to_string_lossy().into_owned(),
            fork_entry_id,
            branch_summary,
        };
        forked.write_entry(&branch).await?;

        for entry in messages {
            forked.write_entry(entry).await?;
            if let Entry::Message { id, .. } = entry {
                *forked.leaf_id.lock().await = Some(id.clone());
            }
        }

        Ok(forked)
    }

    /// Open an existing session by id-prefix: scans `dir` for the unique
    /// filename containing `prefix`, replays it to restore the leaf id,
    /// and returns a `Session` ready for further appends.
    pub async fn load(dir: impl AsRef<Path>, prefix: &str) -> Result<Self> {
        let dir = dir.as_ref();
        let mut candidates = fs::read_dir(dir)
            .await
            .map_err(|e| Error::session(format!("reading session directory: {e}")))?;

        let mut found: Option<PathBuf> = None;
        while let Some(entry) = candidates
            .next_entry()
            .await
            .map_err(|e| Error::session(format!("reading directory entry: {e}")))?
        {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.contains(prefix) && name.ends_with(".jsonl") {
                if found.is_some() {
                    return Err(Error::session(format!(
                        "ambiguous session prefix '{prefix}': multiple matches"
                    )));
                }
                found = Some(entry.path());
            }
        }

        let path = found.ok_or_else(|| {
            Error::session(format!("no session found matching prefix '{prefix}'"))
        })?;

        let entries = read_entries(&path).await?;
        let session_id = entries
            .iter()
            .find_map(|e| match e {
                Entry::Session { session_id, .. } => Some(session_id.clone()),
                _ => None,
            })
            .ok_or_else(|| Error::session("session file missing header"))?;

        let leaf = entries.iter().rev().find_map(|e| match e {
            Entry::Message { id, .. } | Entry::Compaction { id, .. } => Some(id.clone()),
            _ => None,
        });

        Ok(Self {
            path,
            session_id,
            write_lock: Mutex::new(()),
            leaf_id: Mutex::new(leaf),
        })
    }

    /// Enumerate every `.jsonl` session file in `dir`, newest first.
    pub async fn list(dir: impl AsRef<Path>) -> Result<Vec<SessionSummary>> {
        let dir = dir.as_ref();
        let mut read_dir = match fs::read_dir(dir).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::session(format!("reading session directory: {e}"))),
        };

        let mut summaries = Vec::new();
        while let Some(entry) = read_dir
            .next_entry()
            .await
            .map_err(|e| Error::session(format!("reading directory entry: {e}")))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("jsonl") {
                continue;
            }
            if let Ok(entries) = read_entries(&path).await {
                if let Some(summary) = summarize(&path, &entries) {
                    summaries.push(summary);
                }
            }
        }

        summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(summaries)
    }

    pub fn id(&self) -> &str {
        &self.session_id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a message entry, chained to whichever entry was last written.
    pub async fn append_message(&self, role: &str, message: &Message) -> Result<String> {
        let id = generate_entry_id();
        let parent_id = self.leaf_id.lock().await.clone();
        let entry = Entry::Message {
            id: id.clone(),
            parent_id,
            timestamp: crate::message::now_ms(),
            role: role.to_string(),
            message: message.clone(),
        };
        self.write_entry(&entry).await?;
        *self.leaf_id.lock().await = Some(id.clone());
        Ok(id)
    }

    /// Append a compaction entry referencing the first kept message's id.
    pub async fn append_compaction(
        &self,
        summary: &str,
        first_kept_entry_id: &str,
        tokens_before: u64,
    ) -> Result<String> {
        let id = generate_entry_id();
        let parent_id = self.leaf_id.lock().await.clone();
        let entry = Entry::Compaction {
            id: id.clone(),
            parent_id,
            timestamp: crate::message::now_ms(),
            summary: summary.to_string(),
            first_kept_entry_id: first_kept_entry_id.to_string(),
            tokens_before,
        };
        self.write_entry(&entry).await?;
        *self.leaf_id.lock().await = Some(id.clone());
        Ok(id)
    }

    /// Replay this session's entries into a message history: everything
    /// before the *last* compaction entry collapses into that entry's
    /// synthetic summary message; everything after replays verbatim.
    pub async fn parse_messages(&self) -> Result<Vec<Message>> {
        let entries = read_entries(&self.path).await?;
        Ok(replay(&entries))
    }

    async fn write_entry(&self, entry: &Entry) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let line = serde_json::to_string(entry)
            .map_err(|e| Error::session(format!("serializing entry: {e}")))?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| Error::session(format!("opening session file: {e}")))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| Error::session(format!("writing session entry: {e}")))?;
        file.write_all(b"\n")
            .await
            .map_err(|e| Error::session(format!("writing newline: {e}")))?;
        file.flush()
            .await
            .map_err(|e| Error::session(format!("flushing session file: {e}")))?;
        Ok(())
    }
}

/// Replace everything before the last compaction entry with its synthetic
/// summary message; replay everything after (and anything if there was no
/// compaction) verbatim, in file order.
fn replay(entries: &[Entry]) -> Vec<Message> {
    let last_compaction_index = entries
        .iter()
        .rposition(|e| matches!(e, Entry::Compaction { .. }));

    let mut messages = Vec::new();

    if let Some(idx) = last_compaction_index {
        if let Entry::Compaction { summary, .. } = &entries[idx] {
            messages.push(Message::user(crate::compaction::compaction_marker(summary)));
        }
        for entry in &entries[idx + 1..] {
            if let Entry::Message { message, .. } = entry {
                messages.push(message.clone());
            }
        }
    } else {
        for entry in entries {
            if let Entry::Message { message, .. } = entry {
                messages.push(message.clone());
            }
        }
    }

    messages
}

async fn read_entries(path: &Path) -> Result<Vec<Entry>> {
    let file = File::open(path)
        .await
        .map_err(|e| Error::session(format!("opening session file: {e}")))?;
    let mut lines = BufReader::new(file).lines();

    let mut entries = Vec::new();
    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| Error::session(format!("reading session line: {e}")))?
    {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Entry>(&line) {
            Ok(entry) => entries.push(entry),
            Err(_) => continue, // tolerate malformed/unknown lines
        }
    }
    Ok(entries)
}

fn summarize(path: &Path, entries: &[Entry]) -> Option<SessionSummary> {
    let (session_id, created_at, cwd) = entries.iter().find_map(|e| match e {
        Entry::Session {
            session_id,
            created_at,
            cwd,
            ..
        } => Some((session_id.clone(), *created_at, cwd.clone())),
        _ => None,
    })?;

    let message_count = entries
        .iter()
        .filter(|e| matches!(e, Entry::Message { .. }))
        .count();

    let first_user_text = entries.iter().find_map(|e| match e {
        Entry::Message { message, .. } if matches!(message, Message::User { .. }) => {
            let text = message.text();
            Some(text.chars().take(80).collect())
        }
        _ => None,
    });

    Some(SessionSummary {
        id: session_id,
        path: path.to_path_buf(),
        cwd,
        created_at,
        message_count,
        first_user_text,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_writes_header() {
        let dir = tempdir();
        let session = Session::create(dir.path()).await.unwrap();
        let entries = read_entries(session.path()).await.unwrap();
        assert!(matches!(entries[0], Entry::Session { .. }));
    }

    #[tokio::test]
    async fn append_and_replay_round_trips() {
        let dir = tempdir();
        let session = Session::create(dir.path()).await.unwrap();
        session
            .append_message("user", &Message::user("hello"))
            .await
            .unwrap();
        session
            .append_message(
                "assistant",
                &Message::assistant(
                    vec![crate::message::ContentBlock::text("hi there")],
                    "m",
                    "p",
                    crate::message::StopReason::Stop,
                ),
            )
            .await
            .unwrap();

        let messages = session.parse_messages().await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].text(), "hello");
    }

    #[tokio::test]
    async fn compaction_collapses_prior_messages() {
        let dir = tempdir();
        let session = Session::create(dir.path()).await.unwrap();
        let id1 = session
            .append_message("user", &Message::user("first"))
            .await
            .unwrap();
        session
            .append_message(
                "assistant",
                &Message::assistant(
                    vec![crate::message::ContentBlock::text("ack")],
                    "m",
                    "p",
                    crate::message::StopReason::Stop,
                ),
            )
            .await
            .unwrap();
        session
            .append_compaction("summary of early conversation", &id1, 500)
            .await
            .unwrap();
        session
            .append_message("user", &Message::user("after compaction"))
            .await
            .unwrap();

        let messages = session.parse_messages().await.unwrap();
        assert_eq!(messages.len(), 2);
        assert!(messages[0].text().contains("summary of early conversation"));
        assert_eq!(messages[1].text(), "after compaction");
    }

    #[tokio::test]
    async fn fork_copies_prefix_and_leaves_parent_untouched() {
        let dir = tempdir();
        let parent = Session::create(dir.path()).await.unwrap();
        for i in 0..5 {
            parent
                .append_message("user", &Message::user(format!("msg {i}")))
                .await
                .unwrap();
        }
        let parent_entries_before = read_entries(parent.path()).await.unwrap();

        let fork_dir = dir.path().join("forks");
        let forked = Session::fork(parent.path(), &fork_dir, 3, Some("branch".into()))
            .await
            .unwrap();
        let forked_messages = forked.parse_messages().await.unwrap();
        assert_eq!(forked_messages.len(), 3);
        assert_eq!(forked_messages[2].text(), "msg 2");

        let parent_entries_after = read_entries(parent.path()).await.unwrap();
        assert_eq!(parent_entries_before.len(), parent_entries_after.len());
    }

    #[tokio::test]
    async fn list_sorts_newest_first() {
        let dir = tempdir();
        let s1 = Session::create(dir.path()).await.unwrap();
        s1.append_message("user", &Message::user("first session"))
            .await
            .unwrap();
        // ensure distinct filenames even if created in the same millisecond
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        let s2 = Session::create(dir.path()).await.unwrap();
        s2.append_message("user", &Message::user("second session"))
            .await
            .unwrap();

        let summaries = Session::list(dir.path()).await.unwrap();
        assert_eq!(summaries.len(), 2);
        assert!(summaries[0].created_at >= summaries[1].created_at);
    }

    #[tokio::test]
    async fn load_by_prefix_restores_leaf_for_further_appends() {
        let dir = tempdir();
        let session = Session::create(dir.path()).await.unwrap();
        session
            .append_message("user", &Message::user("hello"))
            .await
            .unwrap();
        let id = session.id().to_string();

        let reloaded = Session::load(dir.path(), &id[..6]).await.unwrap();
        reloaded
            .append_message("user", &Message::user("continued"))
            .await
            .unwrap();

        let messages = reloaded.parse_messages().await.unwrap();
        assert_eq!(messages.len(), 2);
    }

    /// Minimal scoped temp dir, since the dev-dependencies don't include
    /// `tempfile`.
    struct TempDir(PathBuf);

    impl TempDir {
        fn path(&self) -> &Path {
            &self.0
        }
    }

    impl Drop for TempDir {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.0);
        }
    }

    fn tempdir() -> TempDir {
        let mut dir = std::env::temp_dir();
        let unique: u64 = rand::thread_rng().r#gen();
        dir.push(format!("open-agent-session-test-{unique}"));
        std::fs::create_dir_all(&dir).unwrap();
        TempDir(dir)
    }
}
