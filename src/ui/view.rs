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

//! View model and text rendering for the console.

use crate::bluetooth::Device;
use crate::permissions::PermissionState;
use crate::session::Message;
use crate::state::{ConnectionSnapshot, ConnectionStatus};

use super::intent::ConnectTarget;

/// Inline error shown when discovery fails.
pub const DISCOVERY_FAILED: &str = "Failed to search for devices";

/// Inline error shown when connecting fails.
pub const CONNECT_FAILED: &str = "Failed to connect to device";

/// Everything the console renders.
#[derive(Debug, Clone, Default)]
pub struct ViewModel {
    pub permissions: PermissionState,
    pub devices: Vec<Device>,
    pub scanning: bool,
    pub connection: ConnectionSnapshot,
    /// Inline error text for discovery and connection failures.
    pub error: Option<String>,
    /// Text that the next `send` writes.
    pub pending_text: String,
}

impl ViewModel {
    fn busy(&self) -> bool {
        self.scanning || self.connection.status != ConnectionStatus::Idle
    }

    pub fn can_scan(&self) -> bool {
        !self.busy()
    }

    pub fn can_connect(&self) -> bool {
        !self.busy()
    }

    pub fn can_send(&self) -> bool {
        self.connection.is_connected()
    }

    /// Resolve a connect target to an address.
    pub fn resolve(&self, target: &ConnectTarget) -> Option<String> {
        match target {
            ConnectTarget::Row(row) => row
                .checked_sub(1)
                .and_then(|i| self.devices.get(i))
                .map(|d| d.address().to_string()),
            ConnectTarget::Address(address) => Some(address.clone()),
        }
    }

    /// One row per discovered device.
    pub fn device_rows(&self) -> Vec<String> {
        self.devices
            .iter()
            .enumerate()
            .map(|(i, device)| {
                let spp = if device.supports_serial_port() { " [SPP]" } else { "" };
                format!("{:>2}. {} - {}{}", i + 1, device.label(), device.address(), spp)
            })
            .collect()
    }

    pub fn status_line(&self) -> String {
        let mut line = match (&self.connection.status, self.connection.device_label()) {
            (ConnectionStatus::Connected, Some(label)) => {
                format!("{} Connected: {}", ConnectionStatus::Connected.symbol(), label)
            }
            (ConnectionStatus::Connecting, Some(label)) => {
                format!("{} Connecting to {}...", ConnectionStatus::Connecting.symbol(), label)
            }
            (status, _) => format!("{} {}", status.symbol(), status.as_str()),
        };
        if self.scanning {
            line.push_str(" | scanning...");
        }
        if !self.permissions.all_granted() {
            line.push_str(" | permissions missing");
        }
        line
    }

    pub fn error_line(&self) -> Option<String> {
        self.error.as_ref().map(|e| format!("✕ {}", e))
    }
}

/// Render one received message.
pub fn message_line(message: &Message, show_timestamps: bool) -> String {
    if show_timestamps {
        format!(
            "[{}] {}",
            message.received_at().format("%H:%M:%S"),
            message.text()
        )
    } else {
        format!("> {}", message.text())
    }
}
