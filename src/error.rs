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

//! Error types for discovery, connection and permission handling.

use std::io;
use thiserror::Error;

/// Failure reported by the underlying Bluetooth stack.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("BlueZ error: {source}")]
    Bluez {
        #[from]
        source: bluer::Error,
    },

    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },

    #[error("Invalid Bluetooth address: {0}")]
    InvalidAddress(String),

    #[error("Session closed")]
    Closed,

    #[error("{0}")]
    Other(String),
}

/// Device discovery failed.
#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("Device discovery failed: {source}")]
    Scan {
        #[from]
        source: TransportError,
    },
}

/// Connecting to a device failed. The manager is back in `Idle` when this is returned.
#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("A connection is already active or in progress")]
    Busy,

    #[error("Connection manager has been shut down")]
    ShutDown,

    #[error("Failed to connect to {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: TransportError,
    },

    #[error("Device {address} is not connected after connect returned")]
    Verification { address: String },

    #[error("Failed to subscribe to data from {address}: {source}")]
    Subscribe {
        address: String,
        #[source]
        source: TransportError,
    },
}

/// Sending a payload failed. Never retried.
#[derive(Error, Debug)]
pub enum SendError {
    #[error("No device connected to send data to")]
    NoActiveConnection,

    #[error("Failed to send data: {source}")]
    Write {
        #[from]
        source: TransportError,
    },
}

/// Remote tear-down failed. Only ever logged.
#[derive(Error, Debug)]
#[error("Failed to disconnect from {address}: {source}")]
pub struct DisconnectError {
    pub address: String,
    #[source]
    pub source: TransportError,
}

/// Platform permission query failed.
#[derive(Error, Debug)]
#[error("Permission query failed: {0}")]
pub struct PermissionError(pub String);
