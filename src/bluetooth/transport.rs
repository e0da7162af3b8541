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

//! Boundary with the Bluetooth Classic stack.
//!
//! The coordinator only talks to these traits. [`super::BluezTransport`] is the
//! production implementation; tests drive the coordinator with an in-memory one.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

use super::device::Device;
use crate::error::TransportError;

/// One chunk of text received over an open connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEvent {
    pub data: String,
}

impl InboundEvent {
    pub fn new(data: impl Into<String>) -> Self {
        Self { data: data.into() }
    }
}

/// Entry point into the Bluetooth stack.
#[async_trait]
pub trait BluetoothTransport: Send + Sync {
    /// Run one discovery pass and return every device found.
    async fn start_discovery(&self) -> Result<Vec<Device>, TransportError>;

    /// Open a session to the device with the given hardware address.
    async fn connect_to_device(&self, address: &str)
        -> Result<Arc<dyn DeviceHandle>, TransportError>;
}

/// A live transport session to one device.
#[async_trait]
pub trait DeviceHandle: Send + Sync {
    fn address(&self) -> &str;

    fn name(&self) -> Option<&str>;

    /// Ask the stack whether the session is still alive.
    async fn is_connected(&self) -> Result<bool, TransportError>;

    /// Start delivering inbound chunks to `sink`, in arrival order.
    ///
    /// Dropping the sender side (end of stream) signals that the remote closed
    /// the session.
    fn on_data_received(
        &self,
        sink: mpsc::UnboundedSender<InboundEvent>,
    ) -> Result<Subscription, TransportError>;

    async fn write(&self, data: &str) -> Result<(), TransportError>;

    async fn disconnect(&self) -> Result<(), TransportError>;
}

/// Handle for an inbound-data registration.
///
/// [`Subscription::remove`] may be called any number of times; only the first
/// call has an effect. Dropping the handle removes it as well.
pub struct Subscription {
    release: Arc<Mutex<Option<Box<dyn FnOnce() + Send>>>>,
}

impl Subscription {
    pub fn new<F>(release: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            release: Arc::new(Mutex::new(Some(Box::new(release)))),
        }
    }

    /// A subscription with nothing to release.
    pub fn empty() -> Self {
        Self {
            release: Arc::new(Mutex::new(None)),
        }
    }

    pub fn remove(&self) {
        // Take first so the callback never runs under the lock.
        let release = self.release.lock().take();
        if let Some(release) = release {
            release();
        }
    }

    pub fn is_active(&self) -> bool {
        self.release.lock().is_some()
    }
}

impl Clone for Subscription {
    fn clone(&self) -> Self {
        Self {
            release: Arc::clone(&self.release),
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        // Only the last clone releases on drop.
        if Arc::strong_count(&self.release) == 1 {
            self.remove();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_remove_twice_releases_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let subscription = Subscription::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        subscription.remove();
        subscription.remove();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!subscription.is_active());
    }

    #[test]
    fn test_drop_releases() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        {
            let _subscription = Subscription::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_clone_shares_release() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let subscription = Subscription::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let view_copy = subscription.clone();

        subscription.remove();
        drop(subscription);
        view_copy.remove();
        drop(view_copy);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
