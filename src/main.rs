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

//! Bluetooth Classic serial console.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bt_classic_console::bluetooth::{BluetoothTransport, BluezTransport, DeviceDiscovery};
use bt_classic_console::config::Config;
use bt_classic_console::permissions::PermissionGate;
use bt_classic_console::session::{ConnectionManager, MessageLog};
use bt_classic_console::ui::Console;

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr, the console owns stdout
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("bt_classic_console=info".parse()?),
        )
        .init();

    info!(
        "Starting Bluetooth Classic console v{}...",
        env!("CARGO_PKG_VERSION")
    );

    let config = Config::load()?;
    info!("Configuration loaded from {}", Config::default_path().display());

    let bluez = BluezTransport::new(&config.bluetooth)
        .await
        .context("initializing Bluetooth")?;
    info!("Bluetooth adapter ready: {}", bluez.adapter_name());
    let transport: Arc<dyn BluetoothTransport> = Arc::new(bluez);

    // BlueZ has no runtime permission model
    let permissions = Arc::new(PermissionGate::unrestricted());

    let log = Arc::new(MessageLog::new());
    let manager = ConnectionManager::new(transport.clone(), log);
    let discovery = DeviceDiscovery::new(transport);

    Console::new(manager, discovery, permissions, config.console)
        .run()
        .await?;

    info!("Bluetooth Classic console stopped");
    Ok(())
}
