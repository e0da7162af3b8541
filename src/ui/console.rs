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

//! Interactive console front end.
//!
//! Reads intents from stdin, dispatches long-running work to tasks and
//! re-renders whenever the connection state or the message log changes.

use anyhow::Result;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use super::intent::{Intent, HELP};
use super::view::{message_line, ViewModel, CONNECT_FAILED, DISCOVERY_FAILED};
use crate::bluetooth::{Device, DeviceDiscovery};
use crate::config::ConsoleConfig;
use crate::error::{ConnectionError, DiscoveryError, PermissionError, SendError};
use crate::permissions::{PermissionGate, PermissionState};
use crate::session::ConnectionManager;
use crate::state::ConnectionSnapshot;

/// Completion of work started from the console.
#[derive(Debug)]
pub enum TaskOutcome {
    Permissions(Result<PermissionState, PermissionError>),
    ScanFinished(Result<Vec<Device>, DiscoveryError>),
    ConnectFinished(Result<Device, ConnectionError>),
    Sent(Result<(), SendError>),
}

/// The console screen.
pub struct Console {
    manager: ConnectionManager,
    discovery: DeviceDiscovery,
    permissions: Arc<PermissionGate>,
    config: ConsoleConfig,
    view: ViewModel,
    outcome_tx: mpsc::UnboundedSender<TaskOutcome>,
    outcome_rx: mpsc::UnboundedReceiver<TaskOutcome>,
    shown_epoch: u64,
    shown_messages: usize,
}

impl Console {
    pub fn new(
        manager: ConnectionManager,
        discovery: DeviceDiscovery,
        permissions: Arc<PermissionGate>,
        config: ConsoleConfig,
    ) -> Self {
        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();
        let view = ViewModel {
            permissions: permissions.state(),
            connection: manager.snapshot(),
            ..Default::default()
        };
        Self {
            manager,
            discovery,
            permissions,
            config,
            view,
            outcome_tx,
            outcome_rx,
            shown_epoch: 0,
            shown_messages: 0,
        }
    }

    pub fn view(&self) -> &ViewModel {
        &self.view
    }

    /// Run until the user quits, stdin closes or Ctrl-C.
    ///
    /// The connection manager is shut down on the way out.
    pub async fn run(mut self) -> Result<()> {
        println!("{}", HELP);
        self.check_permissions();
        self.print_status();

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut state_rx = self.manager.watch();
        let mut log_rx = self.manager.message_log().subscribe();

        loop {
            tokio::select! {
                line = lines.next_line() => match line? {
                    Some(line) => {
                        if !self.handle_line(&line) {
                            break;
                        }
                    }
                    None => break,
                },
                Some(outcome) = self.outcome_rx.recv() => self.apply(outcome),
                Ok(()) = state_rx.changed() => {
                    let snapshot = state_rx.borrow_and_update().clone();
                    self.on_state_changed(snapshot);
                }
                Ok(()) = log_rx.changed() => {
                    log_rx.borrow_and_update();
                    self.print_new_messages();
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        // Unmount: release the subscription whatever the state
        if let Some(subscription) = self.manager.subscription() {
            subscription.remove();
        }
        self.manager.shutdown().await;
        Ok(())
    }

    /// Handle one line of input. Returns `false` when the user quits.
    pub fn handle_line(&mut self, line: &str) -> bool {
        match Intent::parse(line) {
            Ok(Some(Intent::Quit)) => return false,
            Ok(Some(intent)) => self.dispatch(intent),
            Ok(None) => {}
            Err(e) => println!("{}", e),
        }
        true
    }

    fn dispatch(&mut self, intent: Intent) {
        match intent {
            Intent::RequestScan => self.request_scan(),
            Intent::RequestConnect(target) => match self.view.resolve(&target) {
                Some(address) => self.request_connect(address),
                None => println!("No device in row {:?}; run `scan` or `devices`", target),
            },
            Intent::RequestDisconnect => {
                let manager = self.manager.clone();
                tokio::spawn(async move { manager.disconnect().await });
            }
            Intent::TextChanged(text) => self.view.pending_text = text,
            Intent::RequestSend(text) => {
                if let Some(text) = text {
                    self.view.pending_text = text;
                }
                self.request_send();
            }
            Intent::ShowDevices => self.print_devices(),
            Intent::ShowMessages => {
                for message in self.manager.message_log().all() {
                    println!("{}", message_line(&message, self.config.show_timestamps));
                }
            }
            Intent::Help => println!("{}", HELP),
            Intent::Quit => {}
        }
    }

    fn check_permissions(&self) {
        let gate = self.permissions.clone();
        let tx = self.outcome_tx.clone();
        tokio::spawn(async move {
            let mut result = gate.check().await;
            if matches!(&result, Ok(state) if !state.all_granted()) {
                result = gate.request().await;
            }
            let _ = tx.send(TaskOutcome::Permissions(result));
        });
    }

    fn request_scan(&mut self) {
        if !self.view.can_scan() {
            println!("Scanning is unavailable while busy or connected");
            return;
        }
        self.view.scanning = true;
        self.view.error = None;
        self.print_status();

        let discovery = self.discovery.clone();
        let tx = self.outcome_tx.clone();
        tokio::spawn(async move {
            let result = discovery.scan().await;
            let _ = tx.send(TaskOutcome::ScanFinished(result));
        });
    }

    fn request_connect(&mut self, address: String) {
        if !self.view.can_connect() {
            println!("Connecting is unavailable while busy or connected");
            return;
        }
        self.view.error = None;

        let manager = self.manager.clone();
        let tx = self.outcome_tx.clone();
        tokio::spawn(async move {
            let result = manager.connect(&address).await;
            let _ = tx.send(TaskOutcome::ConnectFinished(result));
        });
    }

    fn request_send(&self) {
        if !self.view.can_send() {
            println!("Not connected");
            return;
        }
        let manager = self.manager.clone();
        let payload = self.view.pending_text.clone();
        let tx = self.outcome_tx.clone();
        tokio::spawn(async move {
            let result = manager.send(&payload).await;
            let _ = tx.send(TaskOutcome::Sent(result));
        });
    }

    /// Fold a task result into the view.
    pub fn apply(&mut self, outcome: TaskOutcome) {
        match outcome {
            TaskOutcome::Permissions(Ok(state)) => {
                self.view.permissions = state;
                if !state.all_granted() {
                    warn!("Missing permissions: {:?}", state);
                }
            }
            TaskOutcome::Permissions(Err(e)) => error!("Permission check failed: {}", e),
            TaskOutcome::ScanFinished(result) => {
                self.view.scanning = false;
                match result {
                    Ok(devices) => {
                        self.view.devices = devices;
                        self.print_devices();
                    }
                    Err(e) => {
                        error!("Error searching for devices: {}", e);
                        self.view.error = Some(DISCOVERY_FAILED.to_string());
                    }
                }
                self.print_status();
            }
            TaskOutcome::ConnectFinished(Ok(_)) => {}
            TaskOutcome::ConnectFinished(Err(ConnectionError::Busy)) => {
                self.view.error = Some(ConnectionError::Busy.to_string());
                self.print_status();
            }
            TaskOutcome::ConnectFinished(Err(_)) => {
                self.view.error = Some(CONNECT_FAILED.to_string());
                self.print_status();
            }
            // Write errors are logged by the manager and leave the state alone
            TaskOutcome::Sent(_) => {}
        }
    }

    fn on_state_changed(&mut self, snapshot: ConnectionSnapshot) {
        if snapshot.status != self.view.connection.status {
            if let Some(reason) = &snapshot.last_error {
                info!("Connection state: {} ({})", snapshot.status.as_str(), reason);
            }
        }
        self.view.connection = snapshot;
        self.print_status();
    }

    /// Print entries not shown yet. Returns how many were printed.
    fn print_new_messages(&mut self) -> usize {
        let (epoch, tail) = self
            .manager
            .message_log()
            .unseen(self.shown_epoch, self.shown_messages);
        if epoch != self.shown_epoch {
            // Cleared for a new session
            self.shown_epoch = epoch;
            self.shown_messages = 0;
        }
        for message in &tail {
            println!("{}", message_line(message, self.config.show_timestamps));
        }
        self.shown_messages += tail.len();
        tail.len()
    }

    fn print_devices(&self) {
        if self.view.devices.is_empty() {
            println!("No devices found");
            return;
        }
        for row in self.view.device_rows() {
            println!("{}", row);
        }
    }

    fn print_status(&self) {
        println!("{}", self.view.status_line());
        if let Some(line) = self.view.error_line() {
            println!("{}", line);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bluetooth::{BluetoothTransport, DeviceHandle};
    use crate::error::TransportError;
    use crate::permissions::{GrantResult, Permission, PermissionPlatform};
    use crate::session::MessageLog;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    /// Discovery never finishes; connects always fail.
    #[derive(Default)]
    struct StalledTransport {
        scans: AtomicUsize,
    }

    #[async_trait]
    impl BluetoothTransport for StalledTransport {
        async fn start_discovery(&self) -> Result<Vec<Device>, TransportError> {
            self.scans.fetch_add(1, Ordering::SeqCst);
            futures::future::pending().await
        }

        async fn connect_to_device(
            &self,
            _address: &str,
        ) -> Result<Arc<dyn DeviceHandle>, TransportError> {
            Err(TransportError::Other("host is down".to_string()))
        }
    }

    /// Modern platform that grants whatever is asked for.
    #[derive(Default)]
    struct GrantingPlatform {
        granted: AtomicBool,
    }

    #[async_trait]
    impl PermissionPlatform for GrantingPlatform {
        fn api_level(&self) -> u32 {
            33
        }

        async fn check(&self, _permission: Permission) -> Result<bool, PermissionError> {
            Ok(self.granted.load(Ordering::SeqCst))
        }

        async fn request_multiple(
            &self,
            permissions: &[Permission],
        ) -> Result<HashMap<Permission, GrantResult>, PermissionError> {
            self.granted.store(true, Ordering::SeqCst);
            Ok(permissions.iter().map(|p| (*p, GrantResult::Granted)).collect())
        }
    }

    fn console_with(
        transport: Arc<StalledTransport>,
        permissions: PermissionGate,
    ) -> Console {
        let manager = ConnectionManager::new(transport.clone(), Arc::new(MessageLog::new()));
        let discovery = DeviceDiscovery::new(transport);
        Console::new(
            manager,
            discovery,
            Arc::new(permissions),
            ConsoleConfig::default(),
        )
    }

    async fn next_outcome(console: &mut Console) -> TaskOutcome {
        tokio::time::timeout(Duration::from_secs(2), console.outcome_rx.recv())
            .await
            .expect("timed out waiting for task")
            .expect("outcome channel closed")
    }

    #[tokio::test]
    async fn test_failed_scan_resets_scanning_and_surfaces_error() {
        let mut console = console_with(Arc::default(), PermissionGate::unrestricted());
        console.view.scanning = true;

        console.apply(TaskOutcome::ScanFinished(Err(DiscoveryError::from(
            TransportError::Closed,
        ))));

        assert!(!console.view().scanning);
        assert_eq!(console.view().error.as_deref(), Some(DISCOVERY_FAILED));
        assert!(console.view().can_scan());
    }

    #[tokio::test]
    async fn test_failed_connect_surfaces_generic_error() {
        let mut console = console_with(Arc::default(), PermissionGate::unrestricted());

        assert!(console.handle_line("connect AA:BB:CC:DD:EE:FF"));
        let outcome = next_outcome(&mut console).await;
        assert!(matches!(
            outcome,
            TaskOutcome::ConnectFinished(Err(ConnectionError::Connect { .. }))
        ));
        console.apply(outcome);

        assert_eq!(console.view().error.as_deref(), Some(CONNECT_FAILED));
    }

    #[tokio::test]
    async fn test_scan_is_refused_while_scanning() {
        let transport = Arc::new(StalledTransport::default());
        let mut console = console_with(transport.clone(), PermissionGate::unrestricted());

        assert!(console.handle_line("scan"));
        assert!(console.view().scanning);
        assert!(console.handle_line("scan"));

        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(transport.scans.load(Ordering::SeqCst), 1);
        assert!(!console.view().can_connect());
    }

    #[tokio::test]
    async fn test_missing_permissions_are_requested() {
        let platform = Arc::new(GrantingPlatform::default());
        let mut console = console_with(Arc::default(), PermissionGate::new(platform));
        assert!(!console.view().permissions.all_granted());

        console.check_permissions();
        let outcome = next_outcome(&mut console).await;
        console.apply(outcome);

        assert!(console.view().permissions.all_granted());
    }

    #[tokio::test]
    async fn test_messages_of_a_new_session_are_all_printed() {
        let mut console = console_with(Arc::default(), PermissionGate::unrestricted());
        let log = console.manager.message_log().clone();

        let first = log.clear();
        for text in ["o1", "o2", "o3"] {
            log.append_in_epoch(first, text);
        }
        assert_eq!(console.print_new_messages(), 3);

        // The wake for the clear is coalesced with the new arrivals
        let second = log.clear();
        for text in ["n1", "n2", "n3", "n4", "n5"] {
            log.append_in_epoch(second, text);
        }
        assert_eq!(console.print_new_messages(), 5);
        assert_eq!(console.print_new_messages(), 0);
    }

    #[test]
    fn test_quit_stops_the_loop() {
        let mut console = console_with(Arc::default(), PermissionGate::unrestricted());

        assert!(!console.handle_line("quit"));
    }
}
