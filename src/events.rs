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

//! Inbound event processing.
//!
//! The processor is the single consumer of a session's inbound channel and the
//! only writer to the message log.

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::bluetooth::InboundEvent;
use crate::session::MessageLog;

/// Why an event processor stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessorExit {
    /// The transport closed the inbound stream.
    StreamEnded,
    /// The log moved on to a newer session.
    Superseded,
}

/// Appends inbound chunks of one session to the message log.
pub struct EventProcessor {
    log: Arc<MessageLog>,
    epoch: u64,
    received: usize,
}

impl EventProcessor {
    /// Create a processor bound to the log epoch of the current session.
    pub fn new(log: Arc<MessageLog>, epoch: u64) -> Self {
        Self {
            log,
            epoch,
            received: 0,
        }
    }

    /// Process a single event. One event is exactly one log entry.
    pub fn process_event(&mut self, event: InboundEvent) -> bool {
        debug!("Data received: {}", event.data);
        if self.log.append_in_epoch(self.epoch, event.data) {
            self.received += 1;
            true
        } else {
            false
        }
    }

    /// Number of chunks appended so far.
    pub fn received(&self) -> usize {
        self.received
    }

    /// Drain the channel in order until it closes or the session is superseded.
    pub async fn run(mut self, mut rx: mpsc::UnboundedReceiver<InboundEvent>) -> ProcessorExit {
        while let Some(event) = rx.recv().await {
            if !self.process_event(event) {
                debug!("Dropping chunk for a finished session");
                return ProcessorExit::Superseded;
            }
        }
        info!("Inbound stream ended after {} message(s)", self.received);
        ProcessorExit::StreamEnded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_appends_in_order_until_closed() {
        let log = Arc::new(MessageLog::new());
        let epoch = log.clear();
        let (tx, rx) = mpsc::unbounded_channel();

        for chunk in ["hello", "", "world\r"] {
            tx.send(InboundEvent::new(chunk)).unwrap();
        }
        drop(tx);

        let exit = EventProcessor::new(log.clone(), epoch).run(rx).await;

        assert_eq!(exit, ProcessorExit::StreamEnded);
        assert_eq!(log.texts(), vec!["hello", "", "world\r"]);
    }

    #[tokio::test]
    async fn test_run_stops_when_superseded() {
        let log = Arc::new(MessageLog::new());
        let epoch = log.clear();
        let (tx, rx) = mpsc::unbounded_channel();

        tx.send(InboundEvent::new("old")).unwrap();
        log.clear();
        tx.send(InboundEvent::new("also old")).unwrap();

        let exit = EventProcessor::new(log.clone(), epoch).run(rx).await;

        assert_eq!(exit, ProcessorExit::Superseded);
        assert!(log.is_empty());
    }
}
