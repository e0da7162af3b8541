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

//! Permission gate for location and Bluetooth grants.
//!
//! Hosts with a runtime permission model plug in a [`PermissionPlatform`].
//! Hosts without one (BlueZ on Linux) use [`PermissionGate::unrestricted`],
//! which reports everything as granted.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::PermissionError;

/// First platform API level with runtime Bluetooth permissions.
pub const BLUETOOTH_RUNTIME_PERMISSION_API: u32 = 31;

/// Platform permission identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    FineLocation,
    BluetoothScan,
    BluetoothConnect,
}

/// Outcome of a permission prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantResult {
    Granted,
    Denied,
    NeverAskAgain,
}

/// Current grants. Mutated only by the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PermissionState {
    pub location: bool,
    pub bluetooth: bool,
}

impl PermissionState {
    pub const GRANTED: PermissionState = PermissionState {
        location: true,
        bluetooth: true,
    };

    pub fn all_granted(&self) -> bool {
        self.location && self.bluetooth
    }
}

/// Host permission system.
#[async_trait]
pub trait PermissionPlatform: Send + Sync {
    /// Platform API level, used to decide whether Bluetooth grants exist.
    fn api_level(&self) -> u32;

    /// Query a grant without prompting.
    async fn check(&self, permission: Permission) -> Result<bool, PermissionError>;

    /// Prompt for several grants at once.
    async fn request_multiple(
        &self,
        permissions: &[Permission],
    ) -> Result<HashMap<Permission, GrantResult>, PermissionError>;
}

/// Queries and requests the grants needed for discovery and connection.
pub struct PermissionGate {
    platform: Option<Arc<dyn PermissionPlatform>>,
    state: RwLock<PermissionState>,
}

impl PermissionGate {
    pub fn new(platform: Arc<dyn PermissionPlatform>) -> Self {
        Self {
            platform: Some(platform),
            state: RwLock::new(PermissionState::default()),
        }
    }

    /// Gate for hosts without a permission model.
    pub fn unrestricted() -> Self {
        Self {
            platform: None,
            state: RwLock::new(PermissionState::GRANTED),
        }
    }

    /// Last known grants.
    pub fn state(&self) -> PermissionState {
        *self.state.read()
    }

    /// Whether the view should call [`PermissionGate::request`].
    pub fn needs_request(&self) -> bool {
        !self.state().all_granted()
    }

    /// Query current grants without prompting.
    pub async fn check(&self) -> Result<PermissionState, PermissionError> {
        let Some(platform) = &self.platform else {
            return Ok(self.store(PermissionState::GRANTED));
        };

        let location = platform.check(Permission::FineLocation).await?;

        let bluetooth = if platform.api_level() >= BLUETOOTH_RUNTIME_PERMISSION_API {
            let scan = platform.check(Permission::BluetoothScan).await?;
            let connect = platform.check(Permission::BluetoothConnect).await?;
            scan && connect
        } else {
            // Granted at install time below the runtime threshold
            true
        };

        let state = PermissionState {
            location,
            bluetooth,
        };
        debug!("Permission check: {:?}", state);
        Ok(self.store(state))
    }

    /// Prompt for missing grants, then re-check.
    pub async fn request(&self) -> Result<PermissionState, PermissionError> {
        if let Some(platform) = &self.platform {
            let wanted: &[Permission] = if platform.api_level() >= BLUETOOTH_RUNTIME_PERMISSION_API
            {
                &[
                    Permission::BluetoothScan,
                    Permission::BluetoothConnect,
                    Permission::FineLocation,
                ]
            } else {
                &[Permission::FineLocation]
            };

            info!("Requesting permissions: {:?}", wanted);
            let results = platform.request_multiple(wanted).await?;
            debug!("Permission results: {:?}", results);
        }

        self.check().await
    }

    fn store(&self, state: PermissionState) -> PermissionState {
        *self.state.write() = state;
        state
    }
}
