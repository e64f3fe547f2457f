//! Frame codec for the Themis protocol.
//!
//! Notifications are a flat 20-byte record with no header or length prefix;
//! multi-byte fields are big-endian. Outbound commands carry a single XOR
//! checksum over every preceding byte.

use btleplug::api::bleuuid::uuid_from_u16;
use uuid::Uuid;

use crate::error::DecodeError;

pub const SERVICE_UUID: Uuid = uuid_from_u16(0x0FFE);
pub const COMMAND_CHAR_UUID: Uuid = uuid_from_u16(0xFF12);
pub const NOTIFY_CHAR_UUID: Uuid = uuid_from_u16(0xFF11);

/// Every notification is exactly this long.
pub const RECORD_LEN: usize = 20;

/// Legal auto-off durations in minutes, in the order the device cycles
/// through them.
pub const AUTO_OFF_MINUTES: [u16; 5] = [5, 10, 15, 20, 30];

/// ASCII sign marker for a negative value.
const NEGATIVE_SIGN: u8 = b'-';

/// One decoded 20-byte status record. The scale multiplexes everything it
/// knows into this single message: timer, weight, flow rate, battery and
/// settings.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StatusUpdate {
    pub product_number: u8,
    pub record_type: u8,
    /// Timer reading, combined from three big-endian bytes.
    pub milliseconds: u32,
    /// Unit of weight. The device only reports grams.
    pub unit_of_weight: u8,
    /// ASCII sign marker for the weight ('+' or '-').
    pub weight_symbol: u8,
    /// Weight in grams; the wire carries grams * 100.
    pub grams_weight: f64,
    /// ASCII sign marker for the flow rate.
    pub flow_rate_symbol: u8,
    /// Flow rate; the wire carries the value * 100.
    pub flow_rate: f64,
    /// Remaining battery percentage.
    pub power_percentage: u8,
    /// Standby time in minutes.
    pub standby_minutes: u16,
    pub buzzer_gear: u8,
    pub smoothing_switch: u8,
    pub reserved1: u8,
    pub reserved2: u8,
}

/// Decodes a raw notification record.
pub fn decode(data: &[u8]) -> Result<StatusUpdate, DecodeError> {
    if data.len() != RECORD_LEN {
        return Err(DecodeError::LengthMismatch {
            expected: RECORD_LEN,
            actual: data.len(),
        });
    }

    let milliseconds = u32::from(data[2]) << 16 | u32::from(data[3]) << 8 | u32::from(data[4]);

    // Weight magnitude is an unsigned big-endian 24-bit value of grams * 100;
    // the sign travels separately as an ASCII marker byte.
    let grams_raw = u32::from(data[7]) << 16 | u32::from(data[8]) << 8 | u32::from(data[9]);
    let grams_weight = if data[6] == NEGATIVE_SIGN {
        -f64::from(grams_raw) / 100.0
    } else {
        f64::from(grams_raw) / 100.0
    };

    let flow_raw = u16::from(data[11]) << 8 | u16::from(data[12]);
    let flow_rate = f64::from(flow_raw) / 100.0;

    let standby_minutes = (u16::from(data[14]) << 8 | u16::from(data[15])) / 10;

    Ok(StatusUpdate {
        product_number: data[0],
        record_type: data[1],
        milliseconds,
        unit_of_weight: data[5],
        weight_symbol: data[6],
        grams_weight,
        flow_rate_symbol: data[10],
        flow_rate,
        power_percentage: data[13],
        standby_minutes,
        buzzer_gear: data[16],
        smoothing_switch: data[17],
        reserved1: data[18],
        reserved2: data[19],
    })
}

/// XOR of every byte in the slice, the trailer every outbound command ends
/// with.
pub fn xor_checksum(data: &[u8]) -> u8 {
    data.iter().fold(0, |checksum, byte| checksum ^ byte)
}

fn with_checksum(mut payload: Vec<u8>) -> Vec<u8> {
    let checksum = xor_checksum(&payload);
    payload.push(checksum);
    payload
}

pub fn tare_command() -> Vec<u8> {
    with_checksum(vec![0x03, 0x0A, 0x01, 0x00, 0x00])
}

pub fn auto_off_command(minutes: u16) -> Vec<u8> {
    with_checksum(vec![0x03, 0x0A, 0x03, 0x00, minutes as u8])
}

pub fn beep_command(beep: bool) -> Vec<u8> {
    let gear = if beep { 5 } else { 0 };
    with_checksum(vec![0x03, 0x0A, 0x02, 0x00, gear])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> [u8; RECORD_LEN] {
        [0; RECORD_LEN]
    }

    #[test]
    fn decodes_negative_weight_from_ascii_sign() {
        let mut data = record();
        data[6] = b'-';
        data[9] = 150;

        let status = decode(&data).unwrap();
        assert_eq!(status.grams_weight, -1.50);
    }

    #[test]
    fn decodes_positive_weight() {
        let mut data = record();
        data[6] = b'+';
        data[8] = 0x08;
        data[9] = 0x66;

        let status = decode(&data).unwrap();
        assert_eq!(status.grams_weight, 21.50);
    }

    #[test]
    fn decodes_big_endian_timer_milliseconds() {
        let mut data = record();
        data[2] = 0x01;

        let status = decode(&data).unwrap();
        assert_eq!(status.milliseconds, 65536);
    }

    #[test]
    fn decodes_settings_fields() {
        let mut data = record();
        data[11] = 0x01;
        data[12] = 0x2C;
        data[13] = 88;
        data[14] = 0x00;
        data[15] = 0x64;
        data[16] = 5;
        data[17] = 1;

        let status = decode(&data).unwrap();
        assert_eq!(status.flow_rate, 3.0);
        assert_eq!(status.power_percentage, 88);
        assert_eq!(status.standby_minutes, 10);
        assert_eq!(status.buzzer_gear, 5);
        assert_eq!(status.smoothing_switch, 1);
    }

    #[test]
    fn rejects_records_of_the_wrong_length() {
        assert_eq!(
            decode(&[]),
            Err(DecodeError::LengthMismatch {
                expected: RECORD_LEN,
                actual: 0,
            })
        );
        assert_eq!(
            decode(&[0u8; 19]),
            Err(DecodeError::LengthMismatch {
                expected: RECORD_LEN,
                actual: 19,
            })
        );
        assert_eq!(
            decode(&[0u8; 21]),
            Err(DecodeError::LengthMismatch {
                expected: RECORD_LEN,
                actual: 21,
            })
        );
    }

    #[test]
    fn tare_command_bytes() {
        assert_eq!(tare_command(), vec![0x03, 0x0A, 0x01, 0x00, 0x00, 0x08]);
    }

    #[test]
    fn auto_off_command_bytes() {
        assert_eq!(
            auto_off_command(15),
            vec![0x03, 0x0A, 0x03, 0x00, 0x0F, 0x05]
        );
    }

    #[test]
    fn beep_command_bytes() {
        assert_eq!(beep_command(true), vec![0x03, 0x0A, 0x02, 0x00, 0x05, 0x0E]);
        assert_eq!(beep_command(false), vec![0x03, 0x0A, 0x02, 0x00, 0x00, 0x0B]);
    }
}
