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

//! Observable connection state.

use crate::bluetooth::Device;

/// Connection lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Idle,
    Connecting,
    Connected,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Idle => "Disconnected",
            ConnectionStatus::Connecting => "Connecting...",
            ConnectionStatus::Connected => "Connected",
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            ConnectionStatus::Idle => "○",
            ConnectionStatus::Connecting => "◐",
            ConnectionStatus::Connected => "●",
        }
    }
}

/// Read-only view of the connection manager, published on every transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSnapshot {
    pub status: ConnectionStatus,

    /// Device being connected to, or the active device.
    pub device: Option<Device>,

    /// Cause of the last failed connect or of a remote closure.
    pub last_error: Option<String>,
}

impl Default for ConnectionSnapshot {
    fn default() -> Self {
        Self {
            status: ConnectionStatus::Idle,
            device: None,
            last_error: None,
        }
    }
}

impl ConnectionSnapshot {
    pub fn is_idle(&self) -> bool {
        self.status == ConnectionStatus::Idle
    }

    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }

    pub fn device_label(&self) -> Option<&str> {
        self.device.as_ref().map(|d| d.label())
    }
}
