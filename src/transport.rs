use btleplug::api::{Characteristic, Peripheral as _};
use btleplug::platform::Peripheral;
use tracing::debug;
use uuid::Uuid;

use crate::error::ScaleError;

/// Runs GATT discovery and locates the vendor service plus its write and
/// notify characteristics. Every supported family exposes exactly this pair;
/// anything else fails the connection attempt.
pub(crate) async fn find_scale_characteristics(
    peripheral: &Peripheral,
    service_uuid: Uuid,
    write_uuid: Uuid,
    notify_uuid: Uuid,
) -> Result<(Characteristic, Characteristic), ScaleError> {
    debug!("discovering services");
    peripheral.discover_services().await?;

    let service = peripheral
        .services()
        .into_iter()
        .find(|s| s.uuid == service_uuid)
        .ok_or(ScaleError::ServiceNotFound(service_uuid))?;

    debug!(service = %service.uuid, "found scale service, locating characteristics");

    let mut write_char = None;
    let mut notify_char = None;
    let mut found = 0usize;
    for characteristic in service.characteristics {
        if characteristic.uuid == write_uuid {
            write_char = Some(characteristic);
            found += 1;
        } else if characteristic.uuid == notify_uuid {
            notify_char = Some(characteristic);
            found += 1;
        }
    }

    match (write_char, notify_char) {
        (Some(write), Some(notify)) => Ok((write, notify)),
        _ => Err(ScaleError::CharacteristicMismatch { found }),
    }
}
