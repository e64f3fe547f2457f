use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use btleplug::api::{Characteristic, Peripheral as _, WriteType};
use btleplug::platform::Peripheral;
use parking_lot::Mutex;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep, timeout, Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::ScaleError;
use crate::WeightUpdate;

/// Number of weight updates buffered before the dispatch path starts
/// dropping them on a slow consumer.
pub(crate) const UPDATE_CHANNEL_CAPACITY: usize = 20;

/// Cadence of the silence watchdog.
const WATCHDOG_POLL: Duration = Duration::from_millis(100);

/// Sender half of the weight update channel.
///
/// The sender lives in a slot so the channel can be closed exactly once, from
/// either the caller's disconnect or the liveness monitor, whichever gets
/// there first. Sends after close are dropped, never a panic.
pub(crate) struct UpdateSender {
    slot: Mutex<Option<mpsc::Sender<WeightUpdate>>>,
}

impl UpdateSender {
    fn new(tx: mpsc::Sender<WeightUpdate>) -> Self {
        Self {
            slot: Mutex::new(Some(tx)),
        }
    }

    pub(crate) fn send(&self, update: WeightUpdate) {
        let guard = self.slot.lock();
        let Some(tx) = guard.as_ref() else {
            debug!("weight update channel closed, dropping update");
            return;
        };
        match tx.try_send(update) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => warn!("weight update channel full, dropping update"),
            Err(TrySendError::Closed(_)) => debug!("weight update receiver gone, dropping update"),
        }
    }

    /// Drops the sender, ending the receiver's stream. Idempotent.
    pub(crate) fn close(&self) {
        self.slot.lock().take();
    }
}

/// One live connection to a scale: the peripheral handle, its write and
/// notify characteristics, the weight update channel, the cancellation
/// signal shared with the background tasks, and the last-notification clock.
///
/// A session is created by `connect` and torn down exactly once, by whichever
/// of explicit disconnect or the liveness monitor comes first.
pub(crate) struct Session {
    peripheral: Peripheral,
    write_char: Characteristic,
    notify_char: Characteristic,
    updates: UpdateSender,
    cancel: watch::Sender<bool>,
    last_notified: Mutex<Instant>,
    open: AtomicBool,
}

impl Session {
    pub(crate) fn new(
        peripheral: Peripheral,
        write_char: Characteristic,
        notify_char: Characteristic,
    ) -> (Arc<Self>, mpsc::Receiver<WeightUpdate>) {
        let (tx, rx) = mpsc::channel(UPDATE_CHANNEL_CAPACITY);
        let (cancel, _) = watch::channel(false);

        let session = Arc::new(Self {
            peripheral,
            write_char,
            notify_char,
            updates: UpdateSender::new(tx),
            cancel,
            last_notified: Mutex::new(Instant::now()),
            open: AtomicBool::new(true),
        });

        (session, rx)
    }

    pub(crate) fn notify_uuid(&self) -> Uuid {
        self.notify_char.uuid
    }

    /// Refreshes the last-notification clock.
    pub(crate) fn touch(&self) {
        *self.last_notified.lock() = Instant::now();
    }

    /// Time elapsed since the last decoded notification.
    pub(crate) fn silence(&self) -> Duration {
        self.last_notified.lock().elapsed()
    }

    pub(crate) fn send_update(&self, update: WeightUpdate) {
        self.updates.send(update);
    }

    /// A fresh receiver for the cancellation signal. Tasks select on this
    /// alongside their own timers.
    pub(crate) fn cancelled(&self) -> watch::Receiver<bool> {
        self.cancel.subscribe()
    }

    pub(crate) async fn write(
        &self,
        bytes: &[u8],
        write_type: WriteType,
    ) -> Result<(), btleplug::Error> {
        self.peripheral
            .write(&self.write_char, bytes, write_type)
            .await
    }

    pub(crate) async fn subscribe_notifications(&self) -> Result<(), btleplug::Error> {
        self.peripheral.subscribe(&self.notify_char).await
    }

    pub(crate) fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Whether the radio link itself still reports connected. Bounded so a
    /// wedged adapter cannot hang the caller.
    pub(crate) async fn transport_connected(&self) -> bool {
        match timeout(Duration::from_millis(200), self.peripheral.is_connected()).await {
            Ok(Ok(connected)) => connected,
            Ok(Err(_)) => false,
            Err(_) => false,
        }
    }

    /// Tears the session down: cancels the background tasks, closes the
    /// update channel and releases the peripheral. Only the first call does
    /// any work; later calls (including concurrent ones) are no-ops.
    pub(crate) async fn close(&self) -> Result<(), ScaleError> {
        if !self.open.swap(false, Ordering::SeqCst) {
            return Ok(());
        }

        info!("closing scale session");
        let _ = self.cancel.send(true);
        self.updates.close();
        self.peripheral.disconnect().await?;
        Ok(())
    }
}

/// Watches for prolonged notification silence and runs `on_expired` once the
/// grace period passes without traffic. Checks on a fixed cadence rather
/// than spinning, and exits quietly when the cancellation signal fires
/// first.
pub(crate) async fn silence_watchdog<S, F, Fut>(
    mut cancel: watch::Receiver<bool>,
    grace: Duration,
    silence: S,
    on_expired: F,
) where
    S: Fn() -> Duration + Send,
    F: FnOnce() -> Fut + Send,
    Fut: Future<Output = ()> + Send,
{
    loop {
        tokio::select! {
            _ = cancel.changed() => return,
            _ = sleep(WATCHDOG_POLL) => {
                if silence() > grace {
                    on_expired().await;
                    return;
                }
            }
        }
    }
}

/// Spawns the passive liveness monitor used by families whose devices stream
/// notifications unprompted: silence beyond `grace` forces a disconnect.
pub(crate) fn spawn_silence_watchdog(
    session: Arc<Session>,
    grace: Duration,
) -> tokio::task::JoinHandle<()> {
    let cancel = session.cancelled();
    tokio::spawn(async move {
        let clock = Arc::clone(&session);
        silence_watchdog(
            cancel,
            grace,
            move || clock.silence(),
            move || async move {
                warn!(?grace, "no notifications within grace period, forcing disconnect");
                if let Err(e) = session.close().await {
                    warn!(error = %e, "error during forced disconnect");
                }
            },
        )
        .await;
    })
}
