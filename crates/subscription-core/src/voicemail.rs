//! Voicemail store access
//!
//! The subscription manager only needs message counts per mailbox. The
//! spool layout keeps one directory per mailbox; unread messages are files
//! named `nvm-*`, messages already listened to are named `vm-*`.

use std::fs;
use std::path::PathBuf;

use dashmap::DashMap;
use tracing::{debug, warn};

/// Message counts of a mailbox
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MessageStats {
    pub total: u32,
    pub unread: u32,
}

impl MessageStats {
    pub fn new(total: u32, unread: u32) -> Self {
        Self { total, unread }
    }
}

/// Source of mailbox message counts
pub trait VoicemailStore: Send + Sync {
    fn stat(&self, mailbox: &str) -> MessageStats;
}

/// Spool-directory backed store
#[derive(Debug, Clone)]
pub struct SpoolVoicemailStore {
    root: PathBuf,
}

impl SpoolVoicemailStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn mailbox_dir(&self, mailbox: &str) -> PathBuf {
        self.root.join(mailbox)
    }
}

impl VoicemailStore for SpoolVoicemailStore {
    fn stat(&self, mailbox: &str) -> MessageStats {
        // keys come from request URIs; never let one walk out of the spool
        if mailbox.is_empty() || mailbox.contains(['/', '\\']) || mailbox == ".." {
            warn!("Refusing suspicious mailbox name '{}'", mailbox);
            return MessageStats::default();
        }

        let dir = self.mailbox_dir(mailbox);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!("Cannot read voicemail dir {}: {}", dir.display(), e);
                }
                return MessageStats::default();
            }
        };

        let mut stats = MessageStats::default();
        for entry in entries.flatten() {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with("nvm-") {
                debug!("found new file '{}'", name);
                stats.unread += 1;
                stats.total += 1;
            } else if name.starts_with("vm-") {
                debug!("found old file '{}'", name);
                stats.total += 1;
            }
        }
        stats
    }
}

/// In-memory store, for embedding and tests
#[derive(Debug, Default)]
pub struct MemoryVoicemailStore {
    mailboxes: DashMap<String, MessageStats>,
}

impl MemoryVoicemailStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, mailbox: &str, stats: MessageStats) {
        self.mailboxes.insert(mailbox.to_string(), stats);
    }

    pub fn clear(&self, mailbox: &str) {
        self.mailboxes.remove(mailbox);
    }
}

impl VoicemailStore for MemoryVoicemailStore {
    fn stat(&self, mailbox: &str) -> MessageStats {
        self.mailboxes
            .get(mailbox)
            .map(|entry| *entry)
            .unwrap_or_default()
    }
}
