//! Driver for Varia AKU scales.
//!
//! The smallest protocol surface of the supported families: the scale
//! streams weight records on its own as soon as notifications are enabled,
//! and the only command anyone has mapped is tare. Everything else reports
//! unsupported through the feature set.

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use btleplug::api::{Peripheral as _, ValueNotification, WriteType};
use btleplug::platform::Peripheral;
use futures::stream::Stream;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};

pub mod codec;

use crate::error::ScaleError;
use crate::scanner::FoundDevice;
use crate::session::{spawn_silence_watchdog, Session};
use crate::transport;
use crate::{Scale, ScaleFeatures, WeightUpdate};
use codec::AkuMessage;

/// Advertised name prefix the registry matches on.
pub const NAME_PREFIX: &str = "Varia AKU";

const NOTIFICATION_GRACE: Duration = Duration::from_secs(1);
const TARE_SETTLE_DELAY: Duration = Duration::from_millis(250);

const FEATURES: ScaleFeatures = ScaleFeatures {
    tare: true,
    battery_percent: false,
    sleep_timeout: false,
    beep: false,
};

type NotificationStream = Pin<Box<dyn Stream<Item = ValueNotification> + Send>>;

pub struct AkuScale {
    name: String,
    peripheral: Peripheral,
    session: tokio::sync::Mutex<Option<Arc<Session>>>,
}

/// Factory for the registry.
pub fn create(device: FoundDevice) -> Arc<dyn Scale> {
    Arc::new(AkuScale::new(device))
}

impl AkuScale {
    pub fn new(device: FoundDevice) -> Self {
        Self {
            name: device.name,
            peripheral: device.peripheral,
            session: tokio::sync::Mutex::new(None),
        }
    }

    async fn current_session(&self) -> Result<Arc<Session>, ScaleError> {
        self.session
            .lock()
            .await
            .as_ref()
            .filter(|session| session.is_open())
            .cloned()
            .ok_or(ScaleError::NotConnected)
    }
}

#[async_trait]
impl Scale for AkuScale {
    fn features(&self) -> ScaleFeatures {
        FEATURES
    }

    fn device_name(&self) -> &str {
        &self.name
    }

    fn display_name(&self) -> &'static str {
        "Varia AKU scale"
    }

    async fn connect(&self) -> Result<mpsc::Receiver<WeightUpdate>, ScaleError> {
        let mut guard = self.session.lock().await;
        if guard.as_ref().is_some_and(|session| session.is_open()) {
            return Err(ScaleError::AlreadyConnected);
        }

        info!(device = %self.name, "connecting");
        self.peripheral.connect().await?;

        let (write_char, notify_char) = match transport::find_scale_characteristics(
            &self.peripheral,
            codec::SERVICE_UUID,
            codec::COMMAND_CHAR_UUID,
            codec::NOTIFY_CHAR_UUID,
        )
        .await
        {
            Ok(pair) => pair,
            Err(e) => {
                let _ = self.peripheral.disconnect().await;
                return Err(e);
            }
        };

        let (session, receiver) = Session::new(self.peripheral.clone(), write_char, notify_char);

        let notifications = match self.peripheral.notifications().await {
            Ok(stream) => stream,
            Err(e) => {
                let _ = session.close().await;
                return Err(e.into());
            }
        };

        if let Err(e) = session.subscribe_notifications().await {
            let _ = session.close().await;
            return Err(e.into());
        }

        tokio::spawn(run_dispatch(Arc::clone(&session), notifications));
        spawn_silence_watchdog(Arc::clone(&session), NOTIFICATION_GRACE);

        *guard = Some(session);
        info!(device = %self.name, "connected");
        Ok(receiver)
    }

    async fn disconnect(&self) -> Result<(), ScaleError> {
        match self.session.lock().await.take() {
            Some(session) => session.close().await,
            None => Ok(()),
        }
    }

    async fn is_connected(&self) -> bool {
        match &*self.session.lock().await {
            Some(session) => session.is_open() && session.transport_connected().await,
            None => false,
        }
    }

    async fn tare(&self, blocking: bool) -> Result<(), ScaleError> {
        let session = self.current_session().await?;
        session
            .write(&codec::tare_command(), WriteType::WithoutResponse)
            .await?;

        if blocking {
            sleep(TARE_SETTLE_DELAY).await;
        }
        Ok(())
    }
}

/// Routes decoded weight records onto the update channel.
async fn run_dispatch(session: Arc<Session>, mut notifications: NotificationStream) {
    let mut cancel = session.cancelled();
    loop {
        tokio::select! {
            _ = cancel.changed() => break,
            notification = notifications.next() => {
                let Some(notification) = notification else { break };
                if notification.uuid != session.notify_uuid() {
                    continue;
                }
                handle_notification(&session, &notification.value);
            }
        }
    }
    debug!("notification dispatch stopped");
}

fn handle_notification(session: &Session, buf: &[u8]) {
    session.touch();

    match codec::decode(buf) {
        Ok(AkuMessage::Weight(grams)) => {
            session.send_update(WeightUpdate {
                value: grams,
                unit: "grams".to_string(),
                error: None,
            });
        }
        Ok(AkuMessage::Unhandled { record_type, frame }) => {
            debug!(record_type, frame = ?frame, "unhandled record");
        }
        Err(e) => {
            warn!(error = %e, data = ?buf, "failed to decode notification");
        }
    }
}
