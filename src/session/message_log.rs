// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Ordered log of received messages.

use chrono::{DateTime, Local};
use parking_lot::RwLock;
use tokio::sync::watch;

/// A received text chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    text: String,
    received_at: DateTime<Local>,
}

impl Message {
    fn new(text: String) -> Self {
        Self {
            text,
            received_at: Local::now(),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn received_at(&self) -> DateTime<Local> {
        self.received_at
    }
}

#[derive(Debug, Default)]
struct LogInner {
    entries: Vec<Message>,
    epoch: u64,
}

/// Append-only message sequence, reset once per connection attempt.
///
/// Insertion order is arrival order. No deduplication and no size cap.
#[derive(Debug)]
pub struct MessageLog {
    inner: RwLock<LogInner>,
    len_tx: watch::Sender<usize>,
}

impl Default for MessageLog {
    fn default() -> Self {
        let (len_tx, _) = watch::channel(0);
        Self {
            inner: RwLock::new(LogInner::default()),
            len_tx,
        }
    }
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one entry at the end.
    pub fn append(&self, text: impl Into<String>) {
        let len = {
            let mut inner = self.inner.write();
            inner.entries.push(Message::new(text.into()));
            inner.entries.len()
        };
        self.len_tx.send_replace(len);
    }

    /// Add one entry only if `epoch` is still current.
    ///
    /// Returns `false` when the log was cleared since `epoch` was taken.
    pub fn append_in_epoch(&self, epoch: u64, text: impl Into<String>) -> bool {
        let len = {
            let mut inner = self.inner.write();
            if inner.epoch != epoch {
                return false;
            }
            inner.entries.push(Message::new(text.into()));
            inner.entries.len()
        };
        self.len_tx.send_replace(len);
        true
    }

    /// Empty the log and start a new epoch, which is returned.
    pub fn clear(&self) -> u64 {
        let epoch = {
            let mut inner = self.inner.write();
            inner.entries.clear();
            inner.epoch += 1;
            inner.epoch
        };
        self.len_tx.send_replace(0);
        epoch
    }

    pub fn epoch(&self) -> u64 {
        self.inner.read().epoch
    }

    /// Current contents, oldest first.
    pub fn all(&self) -> Vec<Message> {
        self.inner.read().entries.clone()
    }

    /// Entries from index `from` onwards.
    pub fn since(&self, from: usize) -> Vec<Message> {
        let inner = self.inner.read();
        inner.entries.get(from..).map(<[Message]>::to_vec).unwrap_or_default()
    }

    /// New entries for a reader that has seen `seen` entries of `epoch`.
    ///
    /// Returns the current epoch with the unseen tail. After a clear the tail
    /// is the whole new session, however many entries it already holds.
    pub fn unseen(&self, epoch: u64, seen: usize) -> (u64, Vec<Message>) {
        let inner = self.inner.read();
        let from = if inner.epoch == epoch { seen } else { 0 };
        let tail = inner.entries.get(from..).map(<[Message]>::to_vec).unwrap_or_default();
        (inner.epoch, tail)
    }

    pub fn texts(&self) -> Vec<String> {
        self.inner
            .read()
            .entries
            .iter()
            .map(|m| m.text.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Watch the entry count.
    pub fn subscribe(&self) -> watch::Receiver<usize> {
        self.len_tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_keeps_arrival_order() {
        let log = MessageLog::new();
        log.append("A");
        log.append("B");
        log.append("A");

        assert_eq!(log.texts(), vec!["A", "B", "A"]);
        assert_eq!(log.len(), 3);
    }

    #[test]
    fn test_clear_empties_and_bumps_epoch() {
        let log = MessageLog::new();
        log.append("A");
        log.append("B");

        let before = log.epoch();
        let epoch = log.clear();

        assert!(log.is_empty());
        assert_eq!(epoch, before + 1);
        assert_eq!(log.epoch(), epoch);
    }

    #[test]
    fn test_stale_epoch_append_is_rejected() {
        let log = MessageLog::new();
        let old = log.clear();
        assert!(log.append_in_epoch(old, "first session"));

        let new = log.clear();
        assert!(!log.append_in_epoch(old, "late chunk"));
        assert!(log.append_in_epoch(new, "second session"));

        assert_eq!(log.texts(), vec!["second session"]);
    }

    #[test]
    fn test_since_returns_tail() {
        let log = MessageLog::new();
        log.append("one");
        log.append("two");
        log.append("three");

        let tail: Vec<String> = log.since(1).iter().map(|m| m.text().to_string()).collect();
        assert_eq!(tail, vec!["two", "three"]);
        assert!(log.since(10).is_empty());
    }

    #[test]
    fn test_unseen_restarts_after_clear() {
        let log = MessageLog::new();
        let epoch = log.clear();
        for text in ["o1", "o2", "o3"] {
            log.append_in_epoch(epoch, text);
        }
        let (epoch, shown) = log.unseen(epoch, 0);
        assert_eq!(shown.len(), 3);

        // New session outgrows the old one before the reader looks again
        let next = log.clear();
        for text in ["n1", "n2", "n3", "n4", "n5"] {
            log.append_in_epoch(next, text);
        }

        let (current, tail) = log.unseen(epoch, shown.len());
        let texts: Vec<&str> = tail.iter().map(Message::text).collect();
        assert_eq!(current, next);
        assert_eq!(texts, vec!["n1", "n2", "n3", "n4", "n5"]);
        assert!(log.unseen(current, 5).1.is_empty());
    }

    #[test]
    fn test_subscribe_tracks_length() {
        let log = MessageLog::new();
        let rx = log.subscribe();

        log.append("x");
        log.append("y");
        assert_eq!(*rx.borrow(), 2);

        log.clear();
        assert_eq!(*rx.borrow(), 0);
    }
}
