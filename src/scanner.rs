use std::collections::HashSet;
use std::pin::Pin;

use async_stream::stream;
use btleplug::api::{
    BDAddr, Central, CentralEvent, Manager as _, Peripheral as _, ScanFilter,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::stream::{Stream, StreamExt};
use tokio::time::{timeout, Duration};
use tracing::{debug, info};

use crate::error::ScaleError;

/// A device whose advertised name matched one of the prefixes scanned for.
#[derive(Debug, Clone)]
pub struct FoundDevice {
    pub name: String,
    pub address: BDAddr,
    pub rssi: Option<i16>,
    /// The underlying peripheral handle a scale driver connects through.
    pub peripheral: Peripheral,
}

/// Discovers scales by their advertised name prefixes.
pub struct Scanner {
    adapter: Adapter,
}

impl Scanner {
    /// Brings up the first available bluetooth adapter. Repeated calls are
    /// harmless; the platform treats an adapter that is already enabled as
    /// enabled.
    pub async fn new() -> Result<Self, ScaleError> {
        let manager = Manager::new().await?;
        let adapter = manager
            .adapters()
            .await?
            .into_iter()
            .next()
            .ok_or(ScaleError::NoAdapter)?;
        Ok(Self { adapter })
    }

    /// Scans for `duration` and returns every matching device seen,
    /// deduplicated by address.
    pub async fn scan(
        &self,
        prefixes: &[&str],
        duration: Duration,
    ) -> Result<Vec<FoundDevice>, ScaleError> {
        let mut devices = self.device_stream(prefixes).await?;
        let mut seen = HashSet::new();
        let mut found = Vec::new();

        let _ = timeout(duration, async {
            while let Some(device) = devices.next().await {
                if seen.insert(device.address) {
                    info!(name = %device.name, address = %device.address, "found a matching scale");
                    found.push(device);
                }
            }
        })
        .await;

        self.adapter.stop_scan().await?;
        info!(count = found.len(), "scan finished");
        Ok(found)
    }

    /// Scans until the first matching device appears, or `duration` passes
    /// without one.
    pub async fn scan_for_one(
        &self,
        prefixes: &[&str],
        duration: Duration,
    ) -> Result<Option<FoundDevice>, ScaleError> {
        let mut devices = self.device_stream(prefixes).await?;
        let found = timeout(duration, devices.next()).await.unwrap_or(None);
        self.adapter.stop_scan().await?;
        Ok(found)
    }

    /// Starts a scan and yields matching devices as the radio sees them.
    /// The scan keeps running until [`stop`](Self::stop) is called.
    pub async fn device_stream(
        &self,
        prefixes: &[&str],
    ) -> Result<Pin<Box<dyn Stream<Item = FoundDevice> + Send>>, ScaleError> {
        if prefixes.is_empty() {
            return Err(ScaleError::NoPrefixes);
        }
        let prefixes: Vec<String> = prefixes.iter().map(|prefix| prefix.to_string()).collect();

        info!(?prefixes, "scanning for scales");
        self.adapter.start_scan(ScanFilter::default()).await?;
        let mut events = self.adapter.events().await?;
        let adapter = self.adapter.clone();

        let devices = stream! {
            while let Some(event) = events.next().await {
                let CentralEvent::DeviceDiscovered(id) = event else { continue };
                let Ok(peripheral) = adapter.peripheral(&id).await else { continue };
                let Some(properties) = peripheral.properties().await.ok().flatten() else {
                    continue;
                };
                // Ignore advertisements without a name.
                let Some(name) = properties.local_name else { continue };

                if prefixes.iter().any(|prefix| name.starts_with(prefix.as_str())) {
                    debug!(%name, "scan match");
                    yield FoundDevice {
                        name,
                        address: properties.address,
                        rssi: properties.rssi,
                        peripheral,
                    };
                }
            }
        };

        Ok(Box::pin(devices))
    }

    /// Stops a scan started by [`device_stream`](Self::device_stream).
    pub async fn stop(&self) -> Result<(), ScaleError> {
        self.adapter.stop_scan().await?;
        Ok(())
    }
}
