//! Driver for Acaia Lunar scales.
//!
//! The Lunar needs an identify plus event-subscription handshake before it
//! streams anything, and it stops talking unless it is polled: the liveness
//! strategy here is an active heartbeat that requests a status update on a
//! fixed period and re-issues the subscription when notifications go stale.

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use btleplug::api::{Peripheral as _, ValueNotification, WriteType};
use btleplug::platform::Peripheral;
use futures::stream::Stream;
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::{sleep, Duration, Instant};
use tracing::{debug, info, warn};

pub mod codec;
pub mod protocol;

use crate::cycler::SettingsCycler;
use crate::error::ScaleError;
use crate::scanner::FoundDevice;
use crate::session::Session;
use crate::transport;
use crate::{Scale, ScaleFeatures, WeightUpdate};
use protocol::{AutoOffSetting, LunarMessage, StatusMessage, Unit};

/// Advertised name prefix the registry matches on.
pub const NAME_PREFIX: &str = "LUNAR";

const HEARTBEAT_UNSYNCED: Duration = Duration::from_millis(500);
const HEARTBEAT_SYNCED: Duration = Duration::from_secs(1);
const NOTIFICATION_GRACE: Duration = Duration::from_secs(1);
const MAX_HEARTBEAT_FAILURES: u32 = 3;
const TARE_ACK_TIMEOUT: Duration = Duration::from_secs(2);
const TARE_ACK_POLL: Duration = Duration::from_millis(50);

const FEATURES: ScaleFeatures = ScaleFeatures {
    tare: true,
    battery_percent: true,
    sleep_timeout: true,
    beep: true,
};

type NotificationStream = Pin<Box<dyn Stream<Item = ValueNotification> + Send>>;

/// State shared between the scale handle and its background tasks.
struct LunarState {
    status: Mutex<StatusMessage>,
    /// Set once the first status message lands; heartbeats relax to the
    /// steady-state cadence afterwards.
    synced: AtomicBool,
}

impl LunarState {
    fn unit_label(&self) -> String {
        match self.status.lock().unit {
            Unit::Unknown(_) => Unit::Grams.to_string(),
            unit => unit.to_string(),
        }
    }
}

pub struct LunarScale {
    name: String,
    peripheral: Peripheral,
    state: Arc<LunarState>,
    auto_off: SettingsCycler<u8>,
    session: tokio::sync::Mutex<Option<Arc<Session>>>,
}

/// Factory for the registry.
pub fn create(device: FoundDevice) -> Arc<dyn Scale> {
    Arc::new(LunarScale::new(device))
}

impl LunarScale {
    pub fn new(device: FoundDevice) -> Self {
        Self {
            name: device.name,
            peripheral: device.peripheral,
            state: Arc::new(LunarState {
                status: Mutex::new(StatusMessage::default()),
                synced: AtomicBool::new(false),
            }),
            auto_off: SettingsCycler::new(vec![
                AutoOffSetting::Disabled.code(),
                AutoOffSetting::After5Min.code(),
                AutoOffSetting::After10Min.code(),
                AutoOffSetting::After20Min.code(),
                AutoOffSetting::After30Min.code(),
                AutoOffSetting::After60Min.code(),
            ]),
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

    async fn send_handshake(session: &Session) -> Result<(), btleplug::Error> {
        session
            .write(&codec::identify_command(), WriteType::WithoutResponse)
            .await?;
        session
            .write(
                &codec::event_subscription_command(),
                WriteType::WithoutResponse,
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Scale for LunarScale {
    fn features(&self) -> ScaleFeatures {
        FEATURES
    }

    fn device_name(&self) -> &str {
        &self.name
    }

    fn display_name(&self) -> &'static str {
        "Acaia Lunar Scale"
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

        info!("initiating handshake");
        if let Err(e) = Self::send_handshake(&session).await {
            let _ = session.close().await;
            return Err(e.into());
        }

        // Fresh session, fresh status: nothing reported yet.
        *self.state.status.lock() = StatusMessage::default();
        self.state.synced.store(false, Ordering::SeqCst);

        tokio::spawn(run_dispatch(
            Arc::clone(&self.state),
            Arc::clone(&session),
            notifications,
        ));
        tokio::spawn(run_heartbeat(Arc::clone(&self.state), Arc::clone(&session)));

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
            // The next status message reporting a tared scale is the
            // acknowledgement; give up quietly after the timeout.
            let deadline = Instant::now() + TARE_ACK_TIMEOUT;
            while !self.state.status.lock().is_tared {
                if Instant::now() >= deadline {
                    debug!("no tare acknowledgement within {:?}", TARE_ACK_TIMEOUT);
                    break;
                }
                sleep(TARE_ACK_POLL).await;
            }
        }
        Ok(())
    }

    async fn advance_sleep_timeout(&self) -> Result<(), ScaleError> {
        let session = self.current_session().await?;
        let current = self.state.status.lock().sleep_timer_setting;
        let next = AutoOffSetting::from_code(self.auto_off.next_greater(current.code()));
        debug!(%current, %next, "advancing sleep timeout");
        session
            .write(&codec::auto_off_command(next), WriteType::WithoutResponse)
            .await?;
        Ok(())
    }

    async fn sleep_timeout(&self) -> String {
        self.state.status.lock().sleep_timer_setting.to_string()
    }

    async fn set_beep(&self, on: bool) -> Result<(), ScaleError> {
        let session = self.current_session().await?;
        session
            .write(&codec::beep_command(on), WriteType::WithoutResponse)
            .await?;
        Ok(())
    }

    async fn beep(&self) -> bool {
        self.state.status.lock().sound_setting.is_on()
    }

    async fn battery_charge_percent(&self) -> Result<f64, ScaleError> {
        Ok(self.state.status.lock().battery)
    }
}

/// Consumes the notification stream and routes decoded messages: weight to
/// the update channel, status to the cache, everything else to the log.
async fn run_dispatch(
    state: Arc<LunarState>,
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

fn handle_notification(state: &LunarState, session: &Session, buf: &[u8]) {
    match codec::decode(buf) {
        Ok(LunarMessage::Weight(weight)) => {
            session.touch();
            session.send_update(WeightUpdate {
                value: weight.weight,
                unit: state.unit_label(),
                error: None,
            });
        }
        Ok(LunarMessage::Status(status)) => {
            debug!(?status, "status update");
            *state.status.lock() = status;
            state.synced.store(true, Ordering::SeqCst);
        }
        Ok(LunarMessage::DeviceInfo(info)) => {
            info!(firmware = %info.firmware, password_set = info.is_password_set, "device info");
        }
        Ok(LunarMessage::Timer(timer)) => {
            debug!(seconds = timer.seconds, "timer reading");
        }
        Ok(LunarMessage::Button(button)) => {
            debug!(?button, "button event");
        }
        Ok(LunarMessage::Unhandled(msg)) => match msg.event_type {
            Some(event_type) => {
                debug!(event_type, frame = ?msg.frame, "unhandled event message");
            }
            None => {
                debug!(command_id = msg.command_id, frame = ?msg.frame, "unhandled command");
            }
        },
        Err(e) => {
            warn!(error = %e, data = ?buf, "failed to decode notification");
        }
    }
}

/// Heartbeat loop: requests a status update every period, tightening the
/// cadence until the first status message lands. A small budget of failed
/// writes is tolerated before the session is forced down; stale
/// notifications trigger a re-subscription instead.
async fn run_heartbeat(state: Arc<LunarState>, session: Arc<Session>) {
    let mut cancel = session.cancelled();
    let mut failures: u32 = 0;

    loop {
        let period = if state.synced.load(Ordering::SeqCst) {
            HEARTBEAT_SYNCED
        } else {
            HEARTBEAT_UNSYNCED
        };

        tokio::select! {
            _ = cancel.changed() => break,
            _ = sleep(period) => {}
        }

        debug!("sending heartbeat");
        match session
            .write(&codec::status_request_command(), WriteType::WithResponse)
            .await
        {
            Ok(()) => failures = 0,
            Err(e) => {
                failures += 1;
                warn!(error = %e, failures, "heartbeat write failed");
                if failures >= MAX_HEARTBEAT_FAILURES {
                    if let Err(e) = session.close().await {
                        warn!(error = %e, "error during forced disconnect");
                    }
                    break;
                }
                continue;
            }
        }

        if session.silence() > NOTIFICATION_GRACE {
            debug!("notifications stale, re-requesting");
            if let Err(e) = resubscribe(&session).await {
                warn!(error = %e, "failed to re-establish notifications");
            }
        }
    }
    debug!("heartbeat stopped");
}

async fn resubscribe(session: &Session) -> Result<(), btleplug::Error> {
    session.subscribe_notifications().await?;
    LunarScale::send_handshake(session).await
}
