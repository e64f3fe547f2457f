//! Multi-vendor driver library for Bluetooth Low Energy weighing scales.
//!
//! Each supported vendor speaks its own undocumented binary protocol; this
//! crate decodes their notification frames into one uniform stream of weight
//! updates and encodes uniform commands (tare, sleep timeout, beep) back
//! into each vendor's byte format, checksums included. It also owns the
//! per-device connection lifecycle: characteristic discovery, notification
//! subscription, handshake sequencing and a liveness monitor that forces a
//! clean disconnect when the radio link silently drops.
//!
//! Supported families: Acaia Lunar ([`lunar`]), BOOKOO Themis ([`themis`])
//! and Varia AKU ([`aku`]).
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use rust_scales::{ScaleRegistry, Scanner};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = ScaleRegistry::with_defaults();
//!     let scanner = Scanner::new().await?;
//!
//!     let device = scanner
//!         .scan_for_one(&registry.prefixes(), Duration::from_secs(10))
//!         .await?
//!         .ok_or("no scale found")?;
//!     let scale = registry.scale_for(device)?;
//!
//!     let mut updates = scale.connect().await?;
//!     scale.tare(false).await?;
//!     while let Some(update) = updates.recv().await {
//!         println!("{:.2} {}", update.value, update.unit);
//!     }
//!     // The channel closing means the session is gone.
//!     scale.disconnect().await?;
//!     Ok(())
//! }
//! ```

pub mod aku;
pub mod cycler;
pub mod error;
pub mod lunar;
pub mod registry;
pub mod scanner;
pub mod themis;

mod session;
mod transport;

pub use cycler::SettingsCycler;
pub use error::{DecodeError, ScaleError};
pub use registry::{ScaleFactory, ScaleRegistry};
pub use scanner::{FoundDevice, Scanner};

use async_trait::async_trait;
use tokio::sync::mpsc;

/// A single reading from the scale. An error can travel through the channel
/// as well, flagging a problem on the update path without closing it.
#[derive(Debug)]
pub struct WeightUpdate {
    pub value: f64,
    pub unit: String,
    pub error: Option<ScaleError>,
}

/// Which operations a scale implementation actually supports, so a generic
/// consumer can decide what to render or call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScaleFeatures {
    pub tare: bool,
    pub battery_percent: bool,
    pub sleep_timeout: bool,
    pub beep: bool,
}

/// The generic interface for a Bluetooth scale. Implementations handle the
/// framing, checksums and connection lifecycle of one specific vendor
/// family.
///
/// Operations outside an implementation's [`features`](Scale::features) set
/// fail with [`ScaleError::Unsupported`]; the provided defaults do exactly
/// that.
#[async_trait]
pub trait Scale: Send + Sync {
    /// The operations this scale supports.
    fn features(&self) -> ScaleFeatures;

    /// The advertised device name this driver was built for.
    fn device_name(&self) -> &str;

    /// Human-friendly name of the device family.
    fn display_name(&self) -> &'static str;

    /// Establishes a connection to the scale and returns the receive end of
    /// its weight update channel. The channel closes, exactly once, when the
    /// session dies for any reason; a new connection needs a new call.
    async fn connect(&self) -> Result<mpsc::Receiver<WeightUpdate>, ScaleError>;

    /// Terminates the connection. Calling this on an already-disconnected
    /// scale is a no-op, not an error.
    async fn disconnect(&self) -> Result<(), ScaleError>;

    async fn is_connected(&self) -> bool;

    /// Zeros the scale. With `blocking` set, waits until the scale has
    /// acknowledged the tare where the protocol can express one, or for a
    /// short settling delay where it cannot.
    async fn tare(&self, blocking: bool) -> Result<(), ScaleError>;

    /// Advances the auto-off timer to the next legal setting above whatever
    /// the scale currently reports, wrapping around at the top.
    async fn advance_sleep_timeout(&self) -> Result<(), ScaleError> {
        Err(ScaleError::Unsupported("sleep timeout"))
    }

    /// The currently reported auto-off setting, as display text.
    async fn sleep_timeout(&self) -> String {
        "Unknown".to_string()
    }

    async fn set_beep(&self, _on: bool) -> Result<(), ScaleError> {
        Err(ScaleError::Unsupported("beep"))
    }

    async fn beep(&self) -> bool {
        false
    }

    /// The current battery level as a percentage (0-100).
    async fn battery_charge_percent(&self) -> Result<f64, ScaleError> {
        Err(ScaleError::Unsupported("battery percentage"))
    }
}
