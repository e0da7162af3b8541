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

//! Connection manager.
//!
//! Owns the single active session. State machine:
//!
//! ```text
//! Idle --connect--> Connecting --ok--> Connected --disconnect / remote close--> Idle
//!                       \--error--> Idle (last_error set)
//! ```
//!
//! A connect is refused unless the manager is `Idle`, so at most one connect is
//! in flight and at most one session is active.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::message_log::MessageLog;
use crate::bluetooth::{BluetoothTransport, Device, DeviceHandle, InboundEvent, Subscription};
use crate::error::{ConnectionError, DisconnectError, SendError};
use crate::events::{EventProcessor, ProcessorExit};
use crate::state::{ConnectionSnapshot, ConnectionStatus};

/// Recorded as the last error when the device ends the session.
pub const REMOTE_CLOSED_MESSAGE: &str = "Connection closed by remote device";

/// A live session and everything it owns.
struct ActiveSession {
    id: u64,
    device: Device,
    handle: Arc<dyn DeviceHandle>,
    subscription: Subscription,
    processor: JoinHandle<()>,
}

enum Slot {
    Idle,
    Connecting,
    Connected(ActiveSession),
}

struct Inner {
    transport: Arc<dyn BluetoothTransport>,
    log: Arc<MessageLog>,
    slot: Mutex<Slot>,
    state_tx: watch::Sender<ConnectionSnapshot>,
    next_session_id: AtomicU64,
    shut_down: AtomicBool,
}

/// Coordinates connect, send and disconnect against the transport.
///
/// Cheap to clone; clones share the same session.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

/// Resets a `Connecting` slot if the connect future is dropped mid-flight.
struct ConnectAttempt<'a> {
    inner: &'a Inner,
    armed: bool,
}

impl Drop for ConnectAttempt<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut slot = self.inner.slot.lock();
        if matches!(*slot, Slot::Connecting) {
            warn!("Connect attempt abandoned before it settled");
            *slot = Slot::Idle;
            self.inner.publish(
                ConnectionStatus::Idle,
                None,
                Some("Connection attempt abandoned".to_string()),
            );
        }
    }
}

impl ConnectionManager {
    pub fn new(transport: Arc<dyn BluetoothTransport>, log: Arc<MessageLog>) -> Self {
        let (state_tx, _) = watch::channel(ConnectionSnapshot::default());
        Self {
            inner: Arc::new(Inner {
                transport,
                log,
                slot: Mutex::new(Slot::Idle),
                state_tx,
                next_session_id: AtomicU64::new(1),
                shut_down: AtomicBool::new(false),
            }),
        }
    }

    /// Connect to the device with the given address.
    ///
    /// Only valid from `Idle`. Clears the message log before anything else so
    /// no chunk from a previous session can appear in the new one. Settles in
    /// exactly one of `Connected` or `Idle` with `last_error` set.
    pub async fn connect(&self, address: &str) -> Result<Device, ConnectionError> {
        let inner = &self.inner;
        {
            let mut slot = inner.slot.lock();
            if inner.shut_down.load(Ordering::SeqCst) {
                return Err(ConnectionError::ShutDown);
            }
            if !matches!(*slot, Slot::Idle) {
                warn!("Refusing connect to {}: manager is busy", address);
                return Err(ConnectionError::Busy);
            }
            *slot = Slot::Connecting;
            inner.log.clear();
            inner.publish(
                ConnectionStatus::Connecting,
                Some(Device::new(address, None)),
                None,
            );
        }
        let mut attempt = ConnectAttempt { inner, armed: true };

        info!("Connecting to device: {}", address);
        let result = inner.establish(address).await;
        attempt.armed = false;

        let (orphan, subscription) = {
            let mut slot = inner.slot.lock();
            match result {
                Ok((handle, subscription, _)) if inner.shut_down.load(Ordering::SeqCst) => {
                    *slot = Slot::Idle;
                    inner.publish(ConnectionStatus::Idle, None, None);
                    (handle, subscription)
                }
                Ok((handle, subscription, rx)) => {
                    let device = Device::new(handle.address(), handle.name().map(String::from));
                    let id = inner.next_session_id.fetch_add(1, Ordering::SeqCst);
                    let epoch = inner.log.epoch();

                    // Spawned under the lock so a remote close always finds the session
                    let processor = tokio::spawn(Inner::pump(self.inner.clone(), id, epoch, rx));

                    *slot = Slot::Connected(ActiveSession {
                        id,
                        device: device.clone(),
                        handle,
                        subscription,
                        processor,
                    });
                    inner.publish(ConnectionStatus::Connected, Some(device.clone()), None);
                    info!("Connected to device: {}", device.label());
                    return Ok(device);
                }
                Err(e) => {
                    error!("Connection error: {}", e);
                    *slot = Slot::Idle;
                    inner.publish(ConnectionStatus::Idle, None, Some(e.to_string()));
                    return Err(e);
                }
            }
        };

        // Shut down while connecting: drop the fresh session
        subscription.remove();
        Inner::release_handle(orphan.as_ref()).await;
        Err(ConnectionError::ShutDown)
    }

    /// Tear down the active session.
    ///
    /// Local state is always cleared; a failing remote tear-down is only logged.
    /// Without an active device this is a logged no-op.
    pub async fn disconnect(&self) {
        let session = {
            let mut slot = self.inner.slot.lock();
            match &*slot {
                Slot::Connected(_) => {}
                Slot::Connecting => {
                    warn!("Disconnect ignored: connect still in progress");
                    return;
                }
                Slot::Idle => {
                    warn!("Disconnect ignored: no active device");
                    return;
                }
            }
            let Slot::Connected(session) = std::mem::replace(&mut *slot, Slot::Idle) else {
                unreachable!("slot checked above");
            };
            self.inner.publish(ConnectionStatus::Idle, None, None);
            session
        };

        session.processor.abort();
        Inner::teardown(session).await;
    }

    /// Write `payload` verbatim to the active session.
    pub async fn send(&self, payload: &str) -> Result<(), SendError> {
        let handle = {
            let slot = self.inner.slot.lock();
            match &*slot {
                Slot::Connected(session) => session.handle.clone(),
                _ => return Err(SendError::NoActiveConnection),
            }
        };

        match handle.write(payload).await {
            Ok(()) => {
                info!("Data sent: {}", payload);
                Ok(())
            }
            Err(e) => {
                error!("Error sending data: {}", e);
                Err(e.into())
            }
        }
    }

    /// Release everything held for the owning view.
    ///
    /// Removes the inbound subscription whatever the state, disconnects an
    /// active device and refuses further connects. Safe to call repeatedly.
    pub async fn shutdown(&self) {
        if self.inner.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Shutting down connection manager");

        // An in-flight connect notices the flag when it settles
        let session = {
            let mut slot = self.inner.slot.lock();
            if matches!(*slot, Slot::Connected(_)) {
                let Slot::Connected(session) = std::mem::replace(&mut *slot, Slot::Idle) else {
                    unreachable!("slot checked above");
                };
                self.inner.publish(ConnectionStatus::Idle, None, None);
                Some(session)
            } else {
                None
            }
        };

        if let Some(session) = session {
            session.processor.abort();
            Inner::teardown(session).await;
        }
    }

    /// Current state.
    pub fn snapshot(&self) -> ConnectionSnapshot {
        self.inner.state_tx.borrow().clone()
    }

    /// Observe state transitions.
    pub fn watch(&self) -> watch::Receiver<ConnectionSnapshot> {
        self.inner.state_tx.subscribe()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.inner.state_tx.borrow().status
    }

    pub fn active_device(&self) -> Option<Device> {
        match &*self.inner.slot.lock() {
            Slot::Connected(session) => Some(session.device.clone()),
            _ => None,
        }
    }

    /// A shared handle on the active inbound subscription, if any.
    pub fn subscription(&self) -> Option<Subscription> {
        match &*self.inner.slot.lock() {
            Slot::Connected(session) => Some(session.subscription.clone()),
            _ => None,
        }
    }

    pub fn message_log(&self) -> &Arc<MessageLog> {
        &self.inner.log
    }
}

impl Inner {
    fn publish(&self, status: ConnectionStatus, device: Option<Device>, last_error: Option<String>) {
        self.state_tx.send_replace(ConnectionSnapshot {
            status,
            device,
            last_error,
        });
    }

    /// Open, verify and subscribe. Any failure releases the transport session.
    async fn establish(
        &self,
        address: &str,
    ) -> Result<
        (
            Arc<dyn DeviceHandle>,
            Subscription,
            mpsc::UnboundedReceiver<InboundEvent>,
        ),
        ConnectionError,
    > {
        let handle = self
            .transport
            .connect_to_device(address)
            .await
            .map_err(|source| ConnectionError::Connect {
                address: address.to_string(),
                source,
            })?;

        match handle.is_connected().await {
            Ok(true) => {}
            Ok(false) => {
                Self::release_handle(handle.as_ref()).await;
                return Err(ConnectionError::Verification {
                    address: address.to_string(),
                });
            }
            Err(source) => {
                Self::release_handle(handle.as_ref()).await;
                return Err(ConnectionError::Connect {
                    address: address.to_string(),
                    source,
                });
            }
        }

        let (tx, rx) = mpsc::unbounded_channel();
        match handle.on_data_received(tx) {
            Ok(subscription) => Ok((handle, subscription, rx)),
            Err(source) => {
                Self::release_handle(handle.as_ref()).await;
                Err(ConnectionError::Subscribe {
                    address: address.to_string(),
                    source,
                })
            }
        }
    }

    /// Feed one session's inbound chunks into the log.
    async fn pump(
        inner: Arc<Inner>,
        id: u64,
        epoch: u64,
        rx: mpsc::UnboundedReceiver<InboundEvent>,
    ) {
        let exit = EventProcessor::new(inner.log.clone(), epoch).run(rx).await;
        if exit == ProcessorExit::StreamEnded {
            inner.on_remote_closed(id).await;
        }
    }

    async fn on_remote_closed(&self, id: u64) {
        let session = {
            let mut slot = self.slot.lock();
            match &*slot {
                Slot::Connected(session) if session.id == id => {}
                _ => return,
            }
            let Slot::Connected(session) = std::mem::replace(&mut *slot, Slot::Idle) else {
                unreachable!("slot checked above");
            };
            self.publish(
                ConnectionStatus::Idle,
                None,
                Some(REMOTE_CLOSED_MESSAGE.to_string()),
            );
            session
        };

        warn!("Device {} closed the connection", session.device.label());
        // Running inside the processor task, so it is detached rather than aborted
        Self::teardown(session).await;
    }

    async fn teardown(session: ActiveSession) {
        let ActiveSession {
            device,
            handle,
            subscription,
            ..
        } = session;

        subscription.remove();
        Self::release_handle(handle.as_ref()).await;
        info!("Disconnected from device: {}", device.label());
    }

    async fn release_handle(handle: &dyn DeviceHandle) {
        if let Err(source) = handle.disconnect().await {
            let e = DisconnectError {
                address: handle.address().to_string(),
                source,
            };
            error!("Error disconnecting: {}", e);
        }
    }
}
