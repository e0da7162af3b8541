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

//! BlueZ transport: BR/EDR discovery and RFCOMM client sessions.

use async_trait::async_trait;
use bluer::rfcomm::stream::{OwnedReadHalf, OwnedWriteHalf};
use bluer::rfcomm::{Profile, ProfileHandle, ReqError, Role, SocketAddr, Stream};
use bluer::{Adapter, AdapterEvent, Address, DiscoveryFilter, DiscoveryTransport, Session};
use futures::{pin_mut, StreamExt};
use std::collections::BTreeSet;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::device::Device;
use super::transport::{BluetoothTransport, DeviceHandle, InboundEvent, Subscription};
use crate::config::BluetoothConfig;
use crate::error::TransportError;

/// Standard SPP UUID.
pub const SPP_UUID: Uuid = Uuid::from_u128(0x00001101_0000_1000_8000_00805F9B34FB);

/// Longest inbound line. Longer runs without a newline arrive in pieces.
const MAX_LINE_LEN: u64 = 4096;

/// Where an RFCOMM session is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RfcommTarget {
    /// A fixed channel from the configuration.
    Channel(u8),
    /// Whatever channel the device's SPP service record names.
    SerialPortService,
}

impl RfcommTarget {
    fn from_config(channel: Option<u8>) -> Self {
        match channel {
            Some(channel) => Self::Channel(channel),
            None => Self::SerialPortService,
        }
    }
}

/// Bluetooth Classic transport backed by the local BlueZ daemon.
pub struct BluezTransport {
    session: Session,
    adapter: Adapter,
    target: RfcommTarget,
    discovery_window: Duration,
}

impl BluezTransport {
    /// Open a BlueZ session and select the configured adapter.
    pub async fn new(config: &BluetoothConfig) -> Result<Self, TransportError> {
        info!("Initializing BlueZ transport...");

        let session = Session::new().await?;
        let adapter = match &config.adapter {
            Some(name) => session.adapter(name)?,
            None => session.default_adapter().await?,
        };
        info!("Using Bluetooth adapter: {}", adapter.name());

        if config.power_on && !adapter.is_powered().await? {
            info!("Powering on Bluetooth adapter...");
            adapter.set_powered(true).await?;
        }

        Ok(Self {
            session,
            adapter,
            target: RfcommTarget::from_config(config.rfcomm_channel),
            discovery_window: Duration::from_secs(config.discovery_secs),
        })
    }

    pub fn adapter_name(&self) -> &str {
        self.adapter.name()
    }

    async fn describe(&self, addr: Address) -> Device {
        let device = match self.adapter.device(addr) {
            Ok(device) => device,
            Err(e) => {
                warn!("Device {} vanished before it could be queried: {}", addr, e);
                return Device::new(addr.to_string(), None);
            }
        };

        let name = device.name().await.unwrap_or_else(|e| {
            debug!("No name for {}: {}", addr, e);
            None
        });
        let serial_port = device
            .uuids()
            .await
            .ok()
            .flatten()
            .map(|uuids| uuids.contains(&SPP_UUID))
            .unwrap_or(false);

        Device::new(addr.to_string(), name).with_serial_port(serial_port)
    }

    /// Let BlueZ resolve the SPP channel through SDP and hand over the socket.
    async fn connect_serial_port_service(
        &self,
        device: &bluer::Device,
    ) -> Result<Stream, TransportError> {
        let profile = Profile {
            uuid: SPP_UUID,
            role: Some(Role::Client),
            require_authentication: Some(false),
            require_authorization: Some(false),
            auto_connect: Some(false),
            ..Default::default()
        };
        // Unregistered when the handle is dropped
        let mut requests = self.session.register_profile(profile).await?;
        let addr = device.address();

        let connect = async {
            if let Err(e) = device.connect_profile(&SPP_UUID).await {
                return Err(TransportError::from(e));
            }
            // The socket may still be on its way
            futures::future::pending::<Result<Stream, TransportError>>().await
        };

        tokio::select! {
            result = connect => result,
            result = Self::accept_from(&mut requests, addr) => result,
        }
    }

    /// Take the connection BlueZ hands over for `addr`.
    async fn accept_from(
        requests: &mut ProfileHandle,
        addr: Address,
    ) -> Result<Stream, TransportError> {
        while let Some(request) = requests.next().await {
            if request.device() == addr {
                return Ok(request.accept()?);
            }
            debug!("Rejecting SPP request from {}", request.device());
            request.reject(ReqError::Rejected);
        }
        Err(TransportError::Closed)
    }
}

#[async_trait]
impl BluetoothTransport for BluezTransport {
    async fn start_discovery(&self) -> Result<Vec<Device>, TransportError> {
        let filter = DiscoveryFilter {
            transport: DiscoveryTransport::BrEdr,
            ..Default::default()
        };
        self.adapter.set_discovery_filter(filter).await?;

        // Ordered so repeated scans list devices consistently
        let mut found = BTreeSet::new();
        {
            let events = self.adapter.discover_devices().await?;
            pin_mut!(events);

            let deadline = tokio::time::sleep(self.discovery_window);
            tokio::pin!(deadline);

            loop {
                tokio::select! {
                    _ = &mut deadline => break,
                    event = events.next() => match event {
                        Some(AdapterEvent::DeviceAdded(addr)) => {
                            debug!("Device found: {}", addr);
                            found.insert(addr);
                        }
                        Some(_) => {}
                        None => break,
                    },
                }
            }
            // The inquiry stops when the event stream is dropped here
        }

        let mut devices = Vec::with_capacity(found.len());
        for addr in found {
            devices.push(self.describe(addr).await);
        }
        Ok(devices)
    }

    async fn connect_to_device(
        &self,
        address: &str,
    ) -> Result<Arc<dyn DeviceHandle>, TransportError> {
        let addr: Address = address
            .parse()
            .map_err(|_| TransportError::InvalidAddress(address.to_string()))?;

        let device = self.adapter.device(addr)?;
        let stream = match self.target {
            RfcommTarget::Channel(channel) => {
                info!("Opening RFCOMM channel {} to {}", channel, addr);
                Stream::connect(SocketAddr::new(addr, channel)).await?
            }
            RfcommTarget::SerialPortService => {
                info!("Connecting to the serial port service of {}", addr);
                self.connect_serial_port_service(&device).await?
            }
        };
        let (reader, writer) = stream.into_split();

        let name = device.name().await.unwrap_or(None);

        Ok(Arc::new(BluezDeviceHandle {
            address: addr.to_string(),
            name,
            device,
            reader: parking_lot::Mutex::new(Some(reader)),
            reader_task: parking_lot::Mutex::new(None),
            writer: tokio::sync::Mutex::new(Some(writer)),
        }))
    }
}

/// An open RFCOMM session.
struct BluezDeviceHandle {
    address: String,
    name: Option<String>,
    device: bluer::Device,
    reader: parking_lot::Mutex<Option<OwnedReadHalf>>,
    reader_task: parking_lot::Mutex<Option<AbortHandle>>,
    writer: tokio::sync::Mutex<Option<OwnedWriteHalf>>,
}

impl BluezDeviceHandle {
    async fn read_loop(
        address: String,
        reader: OwnedReadHalf,
        sink: mpsc::UnboundedSender<InboundEvent>,
    ) {
        match read_lines(BufReader::new(reader), &sink).await {
            Ok(()) => info!("Connection to {} closed by remote", address),
            Err(e) => error!("Read error on {}: {}", address, e),
        }
    }
}

/// Forward newline-delimited chunks until EOF or until the consumer is gone.
///
/// A line longer than [`MAX_LINE_LEN`] is forwarded in pieces.
async fn read_lines<R>(
    mut reader: R,
    sink: &mpsc::UnboundedSender<InboundEvent>,
) -> io::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    loop {
        buf.clear();
        let read = (&mut reader)
            .take(MAX_LINE_LEN)
            .read_until(b'\n', &mut buf)
            .await?;
        if read == 0 {
            return Ok(());
        }

        let line = String::from_utf8_lossy(&buf);
        let line = line.trim_end_matches('\n').trim_end_matches('\r');
        if sink.send(InboundEvent::new(line)).is_err() {
            // Consumer gone
            return Ok(());
        }
    }
}

#[async_trait]
impl DeviceHandle for BluezDeviceHandle {
    fn address(&self) -> &str {
        &self.address
    }

    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    async fn is_connected(&self) -> Result<bool, TransportError> {
        Ok(self.device.is_connected().await?)
    }

    fn on_data_received(
        &self,
        sink: mpsc::UnboundedSender<InboundEvent>,
    ) -> Result<Subscription, TransportError> {
        let reader = self
            .reader
            .lock()
            .take()
            .ok_or_else(|| TransportError::Other("inbound stream already subscribed".to_string()))?;

        let task = tokio::spawn(Self::read_loop(self.address.clone(), reader, sink));
        *self.reader_task.lock() = Some(task.abort_handle());

        Ok(Subscription::new(move || task.abort()))
    }

    async fn write(&self, data: &str) -> Result<(), TransportError> {
        let mut writer = self.writer.lock().await;
        let writer = writer.as_mut().ok_or(TransportError::Closed)?;
        writer.write_all(data.as_bytes()).await?;
        writer.flush().await?;
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        if let Some(task) = self.reader_task.lock().take() {
            task.abort();
        }
        self.reader.lock().take();

        let writer = self.writer.lock().await.take();
        match writer {
            Some(mut writer) => match writer.shutdown().await {
                Ok(()) => {
                    info!("RFCOMM session to {} closed", self.address);
                    Ok(())
                }
                Err(e) if is_already_closed(&e) => {
                    debug!("RFCOMM session to {} was already closed", self.address);
                    Ok(())
                }
                Err(e) => Err(e.into()),
            },
            None => Err(TransportError::Closed),
        }
    }
}

/// Errors meaning the remote end is gone already.
fn is_already_closed(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::NotConnected | io::ErrorKind::BrokenPipe | io::ErrorKind::ConnectionReset
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configured_channel_overrides_service_lookup() {
        assert_eq!(RfcommTarget::from_config(Some(3)), RfcommTarget::Channel(3));
        assert_eq!(
            RfcommTarget::from_config(None),
            RfcommTarget::SerialPortService
        );
    }

    #[test]
    fn test_default_config_resolves_through_spp() {
        let config = BluetoothConfig::default();
        assert_eq!(
            RfcommTarget::from_config(config.rfcomm_channel),
            RfcommTarget::SerialPortService
        );
    }

    #[test]
    fn test_dead_socket_errors_count_as_closed() {
        assert!(is_already_closed(&io::Error::from(io::ErrorKind::NotConnected)));
        assert!(is_already_closed(&io::Error::from(io::ErrorKind::BrokenPipe)));
        assert!(!is_already_closed(&io::Error::from(io::ErrorKind::TimedOut)));
    }

    #[tokio::test]
    async fn test_read_loop_splits_lines_and_caps_length() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let long = "x".repeat(MAX_LINE_LEN as usize + 10);
        let input = format!("hello\r\n\n{}\ntail", long);

        read_lines(input.as_bytes(), &tx).await.unwrap();
        drop(tx);

        let mut chunks = Vec::new();
        while let Some(event) = rx.recv().await {
            chunks.push(event.data);
        }
        assert_eq!(chunks[0], "hello");
        assert_eq!(chunks[1], "");
        assert_eq!(chunks[2].len(), MAX_LINE_LEN as usize);
        assert_eq!(chunks[3], "x".repeat(10));
        assert_eq!(chunks[4], "tail");
        assert_eq!(chunks.len(), 5);
    }
}
