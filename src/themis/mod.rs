//! Driver for BOOKOO Themis scales.
//!
//! The Themis needs no handshake: once notifications are enabled it streams
//! its 20-byte status record continuously. Liveness is therefore the passive
//! strategy, a watchdog that forces disconnect when the stream goes quiet.

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use btleplug::api::{Peripheral as _, ValueNotification, WriteType};
use btleplug::platform::Peripheral;
use futures::stream::Stream;
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};

pub mod codec;

use crate::cycler::SettingsCycler;
use crate::error::ScaleError;
use crate::scanner::FoundDevice;
use crate::session::{spawn_silence_watchdog, Session};
use crate::transport;
use crate::{Scale, ScaleFeatures, WeightUpdate};
use codec::StatusUpdate;

/// Advertised name prefix the registry matches on.
pub const NAME_PREFIX: &str = "BOOKOO";

const NOTIFICATION_GRACE: Duration = Duration::from_secs(1);
const TARE_SETTLE_DELAY: Duration = Duration::from_millis(250);

const FEATURES: ScaleFeatures = ScaleFeatures {
    tare: true,
    battery_percent: true,
    sleep_timeout: true,
    beep: true,
};

type NotificationStream = Pin<Box<dyn Stream<Item = ValueNotification> + Send>>;

struct ThemisState {
    status: Mutex<StatusUpdate>,
}

pub struct ThemisScale {
    name: String,
    peripheral: Peripheral,
    state: Arc<ThemisState>,
    auto_off: SettingsCycler<u16>,
    session: tokio::sync::Mutex<Option<Arc<Session>>>,
}

/// Factory for the registry.
pub fn create(device: FoundDevice) -> Arc<dyn Scale> {
    Arc::new(ThemisScale::new(device))
}

impl ThemisScale {
    pub fn new(device: FoundDevice) -> Self {
        Self {
            name: device.name,
            peripheral: device.peripheral,
            state: Arc::new(ThemisState {
                status: Mutex::new(StatusUpdate::default()),
            }),
            auto_off: SettingsCycler::new(codec::AUTO_OFF_MINUTES.to_vec()),
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
impl Scale for ThemisScale {
    fn features(&self) -> ScaleFeatures {
        FEATURES
    }

    fn device_name(&self) -> &str {
        &self.name
    }

    fn display_name(&self) -> &'static str {
        "BOOKOO Themis scale"
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

        *self.state.status.lock() = StatusUpdate::default();

        tokio::spawn(run_dispatch(
            Arc::clone(&self.state),
            Arc::clone(&session),
            notifications,
        ));
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
            .write(&codec::tare_command(), WriteType::WithResponse)
            .await?;

        if blocking {
            // The record carries no tare flag to wait on, so settling is
            // approximated with a short delay.
            sleep(TARE_SETTLE_DELAY).await;
        }
        Ok(())
    }

    async fn advance_sleep_timeout(&self) -> Result<(), ScaleError> {
        let session = self.current_session().await?;
        let current = self.state.status.lock().standby_minutes;
        let next = self.auto_off.next_greater(current);
        debug!(current, next, "advancing sleep timeout");
        session
            .write(&codec::auto_off_command(next), WriteType::WithResponse)
            .await?;
        Ok(())
    }

    async fn sleep_timeout(&self) -> String {
        format!("{} Minutes", self.state.status.lock().standby_minutes)
    }

    async fn set_beep(&self, on: bool) -> Result<(), ScaleError> {
        let session = self.current_session().await?;
        session
            .write(&codec::beep_command(on), WriteType::WithResponse)
            .await?;
        Ok(())
    }

    async fn beep(&self) -> bool {
        self.state.status.lock().buzzer_gear > 0
    }

    async fn battery_charge_percent(&self) -> Result<f64, ScaleError> {
        Ok(f64::from(self.state.status.lock().power_percentage))
    }
}

/// Routes each decoded record into the status cache and the weight channel.
async fn run_dispatch(
    state: Arc<ThemisState>,
    session: Arc<Session>,
    mut notifications: NotificationStream,
) {
    let mut cancel = session.cancelled();
    loop {
        tokio::select! {
            _ = cancel.changed() => break,
            notification = notifications.next() => {
                let Some(notification) = notification else { break };
                if notification.uuid != session.notify_uuid() {
                    continue;
                }
                handle_notification(&state, &session, &notification.value);
            }
        }
    }
    debug!("notification dispatch stopped");
}

fn handle_notification(state: &ThemisState, session: &Session, buf: &[u8]) {
    session.touch();

    let status = match codec::decode(buf) {
        Ok(status) => status,
        Err(e) => {
            warn!(error = %e, data = ?buf, "failed to decode notification");
            return;
        }
    };

    *state.status.lock() = status;
    session.send_update(WeightUpdate {
        value: status.grams_weight,
        unit: "grams".to_string(),
        error: None,
    });
}
