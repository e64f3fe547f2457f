//! Frame codec for the AKU protocol.
//!
//! The only reverse-engineered inbound record is the weight notification: a
//! type byte, then a 24-bit big-endian magnitude with the sign packed into
//! bit 4 of the top byte. Anything else stays unhandled until someone maps
//! it.

use btleplug::api::bleuuid::uuid_from_u16;
use uuid::Uuid;

use crate::error::DecodeError;

pub const SERVICE_UUID: Uuid = uuid_from_u16(0xFFF0);
pub const COMMAND_CHAR_UUID: Uuid = uuid_from_u16(0xFFF2);
pub const NOTIFY_CHAR_UUID: Uuid = uuid_from_u16(0xFFF1);

const MIN_RECORD_LEN: usize = 6;
const RECORD_TYPE_WEIGHT: u8 = 0x01;

/// Every message the AKU decoder can produce.
#[derive(Debug, Clone, PartialEq)]
pub enum AkuMessage {
    /// Weight in grams.
    Weight(f64),
    /// A record type nobody has decoded yet.
    Unhandled { record_type: u8, frame: Vec<u8> },
}

/// Decodes a raw notification record.
pub fn decode(data: &[u8]) -> Result<AkuMessage, DecodeError> {
    if data.len() < MIN_RECORD_LEN {
        return Err(DecodeError::FrameTooShort { len: data.len() });
    }

    if data[1] != RECORD_TYPE_WEIGHT {
        return Ok(AkuMessage::Unhandled {
            record_type: data[1],
            frame: data.to_vec(),
        });
    }

    // Bit 4 of the top magnitude byte is the sign; the remaining low nibble
    // joins the two following bytes as a 20-bit magnitude of grams * 100.
    let sign = if data[3] & 0x10 != 0 { -1.0 } else { 1.0 };
    let raw = u32::from(data[3] & 0x0F) << 16 | u32::from(data[4]) << 8 | u32::from(data[5]);

    Ok(AkuMessage::Weight(sign * f64::from(raw) / 100.0))
}

/// Builds the tare command: a fixed preamble with an XOR trailer over
/// everything after the leading magic byte.
pub fn tare_command() -> Vec<u8> {
    let mut command = vec![0xFA, 0x82, 0x01, 0x01];
    let checksum = command[1..]
        .iter()
        .fold(0u8, |checksum, byte| checksum ^ byte);
    command.push(checksum);
    command
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_positive_weight() {
        let data = [0x00, 0x01, 0x00, 0x00, 0x09, 0x29];
        assert_eq!(decode(&data), Ok(AkuMessage::Weight(23.45)));
    }

    #[test]
    fn decodes_negative_weight_from_sign_bit() {
        let data = [0x00, 0x01, 0x00, 0x10, 0x00, 150];
        assert_eq!(decode(&data), Ok(AkuMessage::Weight(-1.50)));
    }

    #[test]
    fn masks_sign_bit_out_of_the_magnitude() {
        // High nibble carries only the sign; low nibble is part of the value.
        let data = [0x00, 0x01, 0x00, 0x11, 0x00, 0x00];
        assert_eq!(decode(&data), Ok(AkuMessage::Weight(-655.36)));
    }

    #[test]
    fn unknown_record_type_is_unhandled() {
        let data = [0x00, 0x02, 0x00, 0x00, 0x00, 0x00];
        assert_eq!(
            decode(&data),
            Ok(AkuMessage::Unhandled {
                record_type: 0x02,
                frame: data.to_vec(),
            })
        );
    }

    #[test]
    fn short_records_are_an_error() {
        assert_eq!(decode(&[]), Err(DecodeError::FrameTooShort { len: 0 }));
        assert_eq!(
            decode(&[0x00, 0x01, 0x00]),
            Err(DecodeError::FrameTooShort { len: 3 })
        );
    }

    #[test]
    fn tare_command_bytes() {
        assert_eq!(tare_command(), vec![0xFA, 0x82, 0x01, 0x01, 0x82]);
    }
}
