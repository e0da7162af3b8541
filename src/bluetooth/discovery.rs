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

//! Device discovery.

use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info};

use super::device::Device;
use super::transport::BluetoothTransport;
use crate::error::DiscoveryError;

/// Runs discovery passes against the transport.
///
/// Concurrent scans are not prevented here; the view disables the trigger.
#[derive(Clone)]
pub struct DeviceDiscovery {
    transport: Arc<dyn BluetoothTransport>,
}

impl DeviceDiscovery {
    pub fn new(transport: Arc<dyn BluetoothTransport>) -> Self {
        Self { transport }
    }

    /// Scan once and resolve with the full batch of devices.
    pub async fn scan(&self) -> Result<Vec<Device>, DiscoveryError> {
        info!("Starting device discovery...");

        let found = match self.transport.start_discovery().await {
            Ok(found) => found,
            Err(e) => {
                error!("Device discovery failed: {}", e);
                return Err(e.into());
            }
        };

        // Addresses are unique within one batch
        let mut seen = HashSet::new();
        let devices: Vec<Device> = found
            .into_iter()
            .filter(|d| seen.insert(d.address().to_string()))
            .collect();

        info!("Discovery finished: {} device(s)", devices.len());
        if let Ok(json) = serde_json::to_string_pretty(&devices) {
            debug!("Discovered devices: {}", json);
        }

        Ok(devices)
    }
}
