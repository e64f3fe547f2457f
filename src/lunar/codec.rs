//! Frame codec for the Lunar protocol.
//!
//! Frames are `EF DD` magic, a command byte, a length-prefixed payload and a
//! two-byte trailer of wrapping sums over the even- and odd-indexed payload
//! bytes. Inbound checksums are not verified; the scale ignores them too.

use uuid::{uuid, Uuid};

use super::protocol::{
    AutoOffSetting, ButtonKind, ButtonMessage, CapacitySetting, DeviceInfoMessage,
    FirmwareVersion, KeyDisableSetting, LunarMessage, ResolutionSetting, ScaleMode, SoundSetting,
    StatusMessage, TimerMessage, Unit, UnhandledMessage, WeightMessage, WeightType,
};
use crate::error::DecodeError;

pub const SERVICE_UUID: Uuid = uuid!("49535343-fe7d-4ae5-8fa9-9fafd205e455");
pub const COMMAND_CHAR_UUID: Uuid = uuid!("49535343-8841-43f4-a8d4-ecbe34729bb3");
pub const NOTIFY_CHAR_UUID: Uuid = uuid!("49535343-1e4d-4bd9-ba61-23c647249616");

const HEADER: [u8; 2] = [0xEF, 0xDD];

const CMD_KEY_ACTION: u8 = 4;
const CMD_STATUS_REQUEST: u8 = 6;
const CMD_INFO: u8 = 7;
const CMD_STATUS: u8 = 8;
const CMD_SET_SETTING: u8 = 10;
const CMD_IDENTIFY: u8 = 11;
const CMD_EVENT: u8 = 12;

const EVENT_WEIGHT: u8 = 5;
const EVENT_TIMER: u8 = 7;
const EVENT_BUTTON: u8 = 8;

// Setting keys for CMD_SET_SETTING payloads.
const SETTING_AUTO_OFF: u8 = 1;
const SETTING_BEEP: u8 = 2;

/// Decodes one notification buffer into a message.
///
/// The transport may deliver extra leading bytes, so the frame start is
/// located by scanning for the magic sequence. Trailing bytes past the
/// declared frame length are ignored.
pub fn decode(data: &[u8]) -> Result<LunarMessage, DecodeError> {
    let start = data
        .windows(HEADER.len())
        .position(|window| window == HEADER)
        .ok_or(DecodeError::HeaderNotFound)?;
    let frame = &data[start..];

    if frame.len() < 4 {
        return Err(DecodeError::FrameTooShort { len: frame.len() });
    }

    // The length byte counts the payload; header, command, length byte and
    // the two checksum bytes make up the remaining five.
    let expected = frame[3] as usize + 5;
    if frame.len() < expected {
        return Err(DecodeError::LengthMismatch {
            expected,
            actual: frame.len(),
        });
    }
    let frame = &frame[..expected];
    let command_id = frame[2];

    match command_id {
        CMD_EVENT => {
            if frame.len() < 7 {
                return Err(DecodeError::FrameTooShort { len: frame.len() });
            }
            let event_type = frame[4];
            let payload = &frame[5..frame.len() - 2];
            decode_event(event_type, payload, frame)
        }

        CMD_STATUS => decode_status(&frame[3..frame.len() - 2]).map(LunarMessage::Status),

        CMD_INFO => decode_device_info(&frame[3..frame.len() - 2]).map(LunarMessage::DeviceInfo),

        _ => {
            let payload = if frame.len() >= 6 {
                frame[4..frame.len() - 2].to_vec()
            } else {
                Vec::new()
            };
            Ok(LunarMessage::Unhandled(UnhandledMessage {
                command_id,
                event_type: None,
                payload,
                frame: frame.to_vec(),
            }))
        }
    }
}

/// Second dispatch layer for event container frames.
fn decode_event(
    event_type: u8,
    payload: &[u8],
    frame: &[u8],
) -> Result<LunarMessage, DecodeError> {
    match event_type {
        EVENT_WEIGHT => decode_weight(payload).map(LunarMessage::Weight),
        EVENT_TIMER => decode_timer(payload).map(LunarMessage::Timer),
        EVENT_BUTTON => decode_button(payload).map(LunarMessage::Button),
        _ => Ok(LunarMessage::Unhandled(UnhandledMessage {
            command_id: CMD_EVENT,
            event_type: Some(event_type),
            payload: payload.to_vec(),
            frame: frame.to_vec(),
        })),
    }
}

/// Parses the 6-byte weight event payload.
fn decode_weight(payload: &[u8]) -> Result<WeightMessage, DecodeError> {
    if payload.len() < 6 {
        return Err(DecodeError::PayloadTooShort {
            what: "weight",
            len: payload.len(),
        });
    }

    // payload[4] selects the decimal-places divisor.
    let divisor = match payload[4] {
        1 => 10.0,
        2 => 100.0,
        3 => 1000.0,
        4 => 10000.0,
        _ => 10.0,
    };

    // payload[5] packs bitwise flags:
    // bit 0: stability (0 = stable, 1 = unstable)
    // bit 1: sign (1 = negative)
    // bits 2-7: weight type
    let flags = payload[5];
    let is_stable = flags & 0x01 == 0;
    let sign = if flags & 0x02 != 0 { -1.0 } else { 1.0 };
    let weight_type = WeightType::from_code(flags >> 2);

    let raw = u32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]);
    Ok(WeightMessage {
        weight: sign * (f64::from(raw) / divisor),
        weight_type,
        is_stable,
    })
}

/// Parses a timer payload of minutes, seconds and tenths.
fn decode_timer(payload: &[u8]) -> Result<TimerMessage, DecodeError> {
    if payload.len() < 3 {
        return Err(DecodeError::PayloadTooShort {
            what: "timer",
            len: payload.len(),
        });
    }
    let seconds =
        f64::from(payload[0]) * 60.0 + f64::from(payload[1]) + f64::from(payload[2]) / 10.0;
    Ok(TimerMessage { seconds })
}

/// Parses a button event payload. The two leading bytes identify the button;
/// weight and timer readings follow for some of them.
fn decode_button(payload: &[u8]) -> Result<ButtonMessage, DecodeError> {
    if payload.len() < 2 {
        return Err(DecodeError::PayloadTooShort {
            what: "button",
            len: payload.len(),
        });
    }

    let mut msg = ButtonMessage {
        button: ButtonKind::Unknown,
        weight: None,
        time: None,
    };

    match (payload[0], payload[1]) {
        (0, 5) => {
            msg.button = ButtonKind::Tare;
            msg.weight = decode_weight(&payload[2..]).ok().map(|w| w.weight);
        }
        (8, 5) => {
            msg.button = ButtonKind::Start;
            msg.weight = decode_weight(&payload[2..]).ok().map(|w| w.weight);
        }
        (10, 7) => {
            msg.button = ButtonKind::Stop;
            msg.time = decode_timer(&payload[2..]).ok().map(|t| t.seconds);
            if payload.len() > 6 {
                msg.weight = decode_weight(&payload[6..]).ok().map(|w| w.weight);
            }
        }
        (9, 7) => {
            msg.button = ButtonKind::Reset;
            msg.time = decode_timer(&payload[2..]).ok().map(|t| t.seconds);
            if payload.len() > 6 {
                msg.weight = decode_weight(&payload[6..]).ok().map(|w| w.weight);
            }
        }
        _ => {}
    }

    Ok(msg)
}

/// Parses the status payload. Nine bytes are mandatory; a longer payload
/// carries the current timer reading as well.
fn decode_status(payload: &[u8]) -> Result<StatusMessage, DecodeError> {
    if payload.len() < 9 {
        return Err(DecodeError::PayloadTooShort {
            what: "status",
            len: payload.len(),
        });
    }

    let mut msg = StatusMessage {
        status_length: payload[0],
        // Byte 1: battery level in the low 7 bits, timer-running in bit 7.
        battery: f64::from(payload[1] & 0x7F),
        is_timer_running: (payload[1] >> 7) & 0x01 == 1,
        // Byte 2: unit in the low 7 bits, countdown-running in bit 7.
        unit: Unit::from_code(payload[2] & 0x7F),
        is_countdown_running: (payload[2] >> 7) & 0x01 == 1,
        // Byte 3: scale mode in the low 7 bits, tared in bit 7.
        scale_mode: ScaleMode::from_code(payload[3] & 0x7F),
        is_tared: (payload[3] >> 7) & 0x01 == 1,
        sleep_timer_setting: AutoOffSetting::from_code(payload[4]),
        key_disable_setting: KeyDisableSetting::from_code(payload[5]),
        // The wire inverts the resolution flag.
        resolution_setting: ResolutionSetting::from_code(payload[7] ^ 1),
        sound_setting: SoundSetting::from_code(payload[6]),
        capacity_setting: CapacitySetting::from_code(payload[8]),
        timer_value: 0,
    };

    if payload.len() >= 12 {
        let minutes = u16::from(payload[9]);
        let seconds = u16::from(payload[10]);
        msg.timer_value = minutes * 60 + seconds;
    }

    Ok(msg)
}

/// Parses the 7-byte device info payload. Version components arrive in
/// Binary-Coded Decimal, one decimal digit per nibble.
fn decode_device_info(payload: &[u8]) -> Result<DeviceInfoMessage, DecodeError> {
    if payload.len() != 7 {
        return Err(DecodeError::LengthMismatch {
            expected: 7,
            actual: payload.len(),
        });
    }

    Ok(DeviceInfoMessage {
        firmware: FirmwareVersion {
            main: bcd_to_dec(payload[3]),
            sub: bcd_to_dec(payload[4]),
            add: bcd_to_dec(payload[2]),
        },
        is_password_set: payload[6] != 0,
    })
}

fn bcd_to_dec(bcd: u8) -> u8 {
    (bcd >> 4) * 10 + (bcd & 0x0F)
}

/// Wraps a command and payload in the frame format: header, command byte,
/// payload, then the split checksum over even- and odd-indexed payload
/// bytes.
pub fn encode(command: u8, payload: &[u8]) -> Vec<u8> {
    let mut message = Vec::with_capacity(payload.len() + 5);
    message.push(HEADER[0]);
    message.push(HEADER[1]);
    message.push(command);
    message.extend_from_slice(payload);

    let mut csum1: u8 = 0;
    let mut csum2: u8 = 0;
    for (i, &byte) in payload.iter().enumerate() {
        if i % 2 == 0 {
            csum1 = csum1.wrapping_add(byte);
        } else {
            csum2 = csum2.wrapping_add(byte);
        }
    }
    message.push(csum1);
    message.push(csum2);

    message
}

/// The identification command the scale expects before it will talk.
pub fn identify_command() -> Vec<u8> {
    let payload = [
        0x30, 0x31, 0x32, 0x33, 0x34, 0x35, 0x36, 0x37, 0x38, 0x39, 0x30, 0x31, 0x32, 0x33, 0x34,
    ];
    encode(CMD_IDENTIFY, &payload)
}

/// Subscribes to the weight, battery, timer and key event streams.
pub fn event_subscription_command() -> Vec<u8> {
    let event_data = [
        0x00, // weight
        0x01, // weight argument
        0x01, // battery
        0x02, // battery argument
        0x02, // timer
        0x05, // timer argument
        0x03, // key
        0x04, // setting
    ];

    // The event list is prefixed with its own length plus one.
    let mut payload = Vec::with_capacity(event_data.len() + 1);
    payload.push(event_data.len() as u8 + 1);
    payload.extend_from_slice(&event_data);

    encode(CMD_EVENT, &payload)
}

pub fn tare_command() -> Vec<u8> {
    encode(CMD_KEY_ACTION, &[0x00])
}

/// Requests a single status update. Doubles as the heartbeat.
pub fn status_request_command() -> Vec<u8> {
    encode(CMD_STATUS_REQUEST, &[0x00])
}

pub fn auto_off_command(setting: AutoOffSetting) -> Vec<u8> {
    encode(CMD_SET_SETTING, &[0x00, SETTING_AUTO_OFF, setting.code()])
}

pub fn beep_command(on: bool) -> Vec<u8> {
    encode(CMD_SET_SETTING, &[0x00, SETTING_BEEP, u8::from(on)])
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Builds an inbound event container frame around a nested payload.
    fn event_frame(event_type: u8, data: &[u8]) -> Vec<u8> {
        let mut payload = Vec::with_capacity(data.len() + 2);
        payload.push(data.len() as u8 + 2);
        payload.push(event_type);
        payload.extend_from_slice(data);
        encode(CMD_EVENT, &payload)
    }

    /// Builds an inbound frame whose payload starts with its own length
    /// byte, as status and info frames do.
    fn length_prefixed_frame(command: u8, rest: &[u8]) -> Vec<u8> {
        let mut payload = Vec::with_capacity(rest.len() + 1);
        payload.push(rest.len() as u8 + 1);
        payload.extend_from_slice(rest);
        encode(command, &payload)
    }

    #[test]
    fn decodes_stable_net_weight() {
        // 2150 raw at two decimal places: +21.50, net, stable.
        let frame = event_frame(EVENT_WEIGHT, &[0x66, 0x08, 0x00, 0x00, 0x02, 0x00]);

        let msg = decode(&frame).unwrap();
        assert_eq!(
            msg,
            LunarMessage::Weight(WeightMessage {
                weight: 21.50,
                weight_type: WeightType::Net,
                is_stable: true,
            })
        );
    }

    #[test]
    fn decodes_negative_unstable_gross_weight() {
        // 150 raw at one decimal place, sign bit and instability bit set,
        // weight type Gross in the high bits.
        let flags = 0x01 | 0x02 | (1 << 2);
        let frame = event_frame(EVENT_WEIGHT, &[150, 0x00, 0x00, 0x00, 0x01, flags]);

        let msg = decode(&frame).unwrap();
        assert_eq!(
            msg,
            LunarMessage::Weight(WeightMessage {
                weight: -15.0,
                weight_type: WeightType::Gross,
                is_stable: false,
            })
        );
    }

    #[test]
    fn scans_past_leading_garbage() {
        let mut buffer = vec![0x12, 0x34, 0x56];
        buffer.extend(event_frame(EVENT_WEIGHT, &[0x66, 0x08, 0x00, 0x00, 0x02, 0x00]));

        let msg = decode(&buffer).unwrap();
        assert!(matches!(msg, LunarMessage::Weight(w) if w.weight == 21.50));
    }

    #[test]
    fn ignores_trailing_bytes_from_next_frame() {
        let mut buffer = event_frame(EVENT_WEIGHT, &[0x66, 0x08, 0x00, 0x00, 0x02, 0x00]);
        buffer.extend_from_slice(&[0xEF, 0xDD, 0x0C]);

        let msg = decode(&buffer).unwrap();
        assert!(matches!(msg, LunarMessage::Weight(w) if w.weight == 21.50));
    }

    #[test]
    fn missing_header_is_an_error() {
        assert_eq!(decode(&[]), Err(DecodeError::HeaderNotFound));
        assert_eq!(decode(&[0xEF]), Err(DecodeError::HeaderNotFound));
        assert_eq!(decode(&[0x01, 0x02, 0x03]), Err(DecodeError::HeaderNotFound));
    }

    #[test]
    fn truncated_header_is_too_short() {
        assert_eq!(
            decode(&[0xEF, 0xDD, 0x0C]),
            Err(DecodeError::FrameTooShort { len: 3 })
        );
    }

    #[test]
    fn declared_length_beyond_buffer_is_a_mismatch() {
        let mut frame = event_frame(EVENT_WEIGHT, &[0x66, 0x08, 0x00, 0x00, 0x02, 0x00]);
        frame.truncate(frame.len() - 4);

        assert_eq!(
            decode(&frame),
            Err(DecodeError::LengthMismatch {
                expected: 13,
                actual: 9,
            })
        );
    }

    #[test]
    fn decodes_status_message() {
        // Battery 78 with the timer running, grams, weighing mode with the
        // tare bit set, 10 minute auto-off, sound on, high resolution,
        // 2000g capacity.
        let frame = length_prefixed_frame(
            CMD_STATUS,
            &[0x80 | 78, 0x02, 0x80, 0x02, 0x00, 0x01, 0x00, 0x01],
        );

        let msg = decode(&frame).unwrap();
        let LunarMessage::Status(status) = msg else {
            panic!("expected a status message, got {msg:?}");
        };
        assert_eq!(status.battery, 78.0);
        assert!(status.is_timer_running);
        assert_eq!(status.unit, Unit::Grams);
        assert!(!status.is_countdown_running);
        assert_eq!(status.scale_mode, ScaleMode::Weighing);
        assert!(status.is_tared);
        assert_eq!(status.sleep_timer_setting, AutoOffSetting::After10Min);
        assert_eq!(status.key_disable_setting, KeyDisableSetting::Off);
        assert_eq!(status.sound_setting, SoundSetting::On);
        assert_eq!(status.resolution_setting, ResolutionSetting::High);
        assert_eq!(status.capacity_setting, CapacitySetting::Grams2000);
    }

    #[test]
    fn decodes_status_message_with_timer_value() {
        let frame = length_prefixed_frame(
            CMD_STATUS,
            &[50, 0x02, 0x00, 0x01, 0x00, 0x00, 0x01, 0x00, 2, 30, 0x05],
        );

        let msg = decode(&frame).unwrap();
        let LunarMessage::Status(status) = msg else {
            panic!("expected a status message, got {msg:?}");
        };
        assert_eq!(status.battery, 50.0);
        assert_eq!(status.resolution_setting, ResolutionSetting::Low);
        assert_eq!(status.timer_value, 150);
    }

    #[test]
    fn decodes_device_info_with_bcd_firmware() {
        let frame = length_prefixed_frame(CMD_INFO, &[0x00, 0x18, 0x01, 0x00, 0x00, 0x01]);

        let msg = decode(&frame).unwrap();
        assert_eq!(
            msg,
            LunarMessage::DeviceInfo(DeviceInfoMessage {
                firmware: FirmwareVersion {
                    main: 1,
                    sub: 0,
                    add: 18,
                },
                is_password_set: true,
            })
        );
        if let LunarMessage::DeviceInfo(info) = msg {
            assert_eq!(info.firmware.to_string(), "1.0.18");
        }
    }

    #[test]
    fn decodes_timer_event() {
        let frame = event_frame(EVENT_TIMER, &[2, 30, 5]);

        let msg = decode(&frame).unwrap();
        assert_eq!(msg, LunarMessage::Timer(TimerMessage { seconds: 150.5 }));
    }

    #[test]
    fn decodes_tare_button_event() {
        let frame = event_frame(EVENT_BUTTON, &[0, 5, 0x66, 0x08, 0x00, 0x00, 0x02, 0x00]);

        let msg = decode(&frame).unwrap();
        assert_eq!(
            msg,
            LunarMessage::Button(ButtonMessage {
                button: ButtonKind::Tare,
                weight: Some(21.50),
                time: None,
            })
        );
    }

    #[test]
    fn unknown_top_level_command_is_unhandled() {
        let frame = length_prefixed_frame(0xFE, &[0xAA, 0xBB]);

        let msg = decode(&frame).unwrap();
        let LunarMessage::Unhandled(unhandled) = msg else {
            panic!("expected an unhandled message, got {msg:?}");
        };
        assert_eq!(unhandled.command_id, 0xFE);
        assert_eq!(unhandled.event_type, None);
        assert_eq!(unhandled.payload, vec![0xAA, 0xBB]);
    }

    #[test]
    fn unknown_event_type_is_unhandled() {
        let frame = event_frame(0x42, &[0xAA]);

        let msg = decode(&frame).unwrap();
        let LunarMessage::Unhandled(unhandled) = msg else {
            panic!("expected an unhandled message, got {msg:?}");
        };
        assert_eq!(unhandled.command_id, CMD_EVENT);
        assert_eq!(unhandled.event_type, Some(0x42));
        assert_eq!(unhandled.payload, vec![0xAA]);
    }

    #[test]
    fn short_weight_payload_is_an_error() {
        let frame = event_frame(EVENT_WEIGHT, &[0x66, 0x08]);
        assert_eq!(
            decode(&frame),
            Err(DecodeError::PayloadTooShort {
                what: "weight",
                len: 2,
            })
        );
    }

    #[test]
    fn tare_command_bytes() {
        assert_eq!(tare_command(), vec![0xEF, 0xDD, 0x04, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn status_request_command_bytes() {
        assert_eq!(
            status_request_command(),
            vec![0xEF, 0xDD, 0x06, 0x00, 0x00, 0x00]
        );
    }

    #[test]
    fn identify_command_bytes() {
        assert_eq!(
            identify_command(),
            vec![
                0xEF, 0xDD, 0x0B, 0x30, 0x31, 0x32, 0x33, 0x34, 0x35, 0x36, 0x37, 0x38, 0x39,
                0x30, 0x31, 0x32, 0x33, 0x34, 0x9A, 0x6D,
            ]
        );
    }

    #[test]
    fn event_subscription_command_bytes() {
        assert_eq!(
            event_subscription_command(),
            vec![
                0xEF, 0xDD, 0x0C, 0x09, 0x00, 0x01, 0x01, 0x02, 0x02, 0x05, 0x03, 0x04, 0x15,
                0x06,
            ]
        );
    }

    #[test]
    fn auto_off_command_bytes() {
        assert_eq!(
            auto_off_command(AutoOffSetting::After10Min),
            vec![0xEF, 0xDD, 0x0A, 0x00, 0x01, 0x02, 0x02, 0x01]
        );
    }

    #[test]
    fn beep_command_bytes() {
        assert_eq!(
            beep_command(true),
            vec![0xEF, 0xDD, 0x0A, 0x00, 0x02, 0x01, 0x01, 0x02]
        );
        assert_eq!(
            beep_command(false),
            vec![0xEF, 0xDD, 0x0A, 0x00, 0x02, 0x00, 0x00, 0x02]
        );
    }
}
