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

//! Discovered Bluetooth Classic device.

use serde::Serialize;

/// Label shown for devices that did not report a name.
pub const UNKNOWN_DEVICE_LABEL: &str = "Unknown device";

/// A device returned by discovery. Immutable once discovered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Device {
    address: String,
    name: Option<String>,
    serial_port: bool,
}

impl Device {
    pub fn new(address: impl Into<String>, name: Option<String>) -> Self {
        Self {
            address: address.into(),
            name: name.filter(|n| !n.trim().is_empty()),
            serial_port: false,
        }
    }

    /// Mark the device as advertising the Serial Port Profile.
    pub fn with_serial_port(mut self, serial_port: bool) -> Self {
        self.serial_port = serial_port;
        self
    }

    /// Hardware address, e.g. `AA:BB:CC:DD:EE:FF`.
    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn supports_serial_port(&self) -> bool {
        self.serial_port
    }

    /// Name for display, falling back to [`UNKNOWN_DEVICE_LABEL`].
    pub fn label(&self) -> &str {
        self.name().unwrap_or(UNKNOWN_DEVICE_LABEL)
    }
}
