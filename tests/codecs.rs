//! Fixture tests against captured vendor frames, exercised through the
//! public codec APIs.

use rust_scales::aku::codec as aku;
use rust_scales::aku::codec::AkuMessage;
use rust_scales::lunar::codec as lunar;
use rust_scales::lunar::protocol::{LunarMessage, WeightType};
use rust_scales::themis::codec as themis;
use rust_scales::DecodeError;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

#[test]
fn lunar_decodes_captured_weight_frame() {
    init_tracing();
    // Event container frame: net, stable, +21.50 grams at two decimal
    // places (raw 2150 little-endian).
    let frame = [
        0xEF, 0xDD, 0x0C, 0x08, 0x05, 0x66, 0x08, 0x00, 0x00, 0x02, 0x00, 0x70, 0x0D,
    ];

    let msg = lunar::decode(&frame).unwrap();
    let LunarMessage::Weight(weight) = msg else {
        panic!("expected a weight message, got {msg:?}");
    };
    assert_eq!(weight.weight, 21.50);
    assert_eq!(weight.weight_type, WeightType::Net);
    assert!(weight.is_stable);
}

#[test]
fn lunar_survives_garbage_without_panicking() {
    assert_eq!(lunar::decode(&[]), Err(DecodeError::HeaderNotFound));
    assert!(lunar::decode(&[0x00; 64]).is_err());
    // A header with nothing behind it.
    assert_eq!(
        lunar::decode(&[0xEF, 0xDD]),
        Err(DecodeError::FrameTooShort { len: 2 })
    );
    // A declared length far beyond the buffer.
    assert_eq!(
        lunar::decode(&[0xEF, 0xDD, 0x0C, 0xFF, 0x05]),
        Err(DecodeError::LengthMismatch {
            expected: 260,
            actual: 5,
        })
    );
}

#[test]
fn themis_decodes_captured_status_record() {
    let record = [
        0x03, // product number
        0x0B, // record type
        0x00, 0x27, 0x10, // timer: 10000 ms
        0x00, // unit (grams)
        b'-', // weight sign
        0x00, 0x00, 150,  // grams * 100
        b'+', // flow rate sign
        0x00, 0x00, // flow rate * 100
        92,   // battery %
        0x00, 0xC8, // standby: 200 -> 20 minutes
        0x00, // buzzer gear
        0x01, // smoothing switch
        0x00, 0x00, // reserved
    ];

    let status = themis::decode(&record).unwrap();
    assert_eq!(status.grams_weight, -1.50);
    assert_eq!(status.milliseconds, 10000);
    assert_eq!(status.power_percentage, 92);
    assert_eq!(status.standby_minutes, 20);
    assert_eq!(status.buzzer_gear, 0);
    assert_eq!(status.smoothing_switch, 1);
}

#[test]
fn themis_rejects_partial_records() {
    for len in 0..themis::RECORD_LEN {
        let buf = vec![0u8; len];
        assert_eq!(
            themis::decode(&buf),
            Err(DecodeError::LengthMismatch {
                expected: themis::RECORD_LEN,
                actual: len,
            })
        );
    }
}

#[test]
fn aku_decodes_captured_weight_record() {
    let record = [0x00, 0x01, 0x00, 0x00, 0x09, 0x29];
    assert_eq!(aku::decode(&record), Ok(AkuMessage::Weight(23.45)));

    let negative = [0x00, 0x01, 0x00, 0x10, 0x00, 150];
    assert_eq!(aku::decode(&negative), Ok(AkuMessage::Weight(-1.50)));
}

#[test]
fn aku_rejects_short_records() {
    for len in 0..6 {
        let buf = vec![0u8; len];
        assert_eq!(
            aku::decode(&buf),
            Err(DecodeError::FrameTooShort { len })
        );
    }
}

#[test]
fn command_round_trip_matches_captured_bytes() {
    assert_eq!(
        lunar::tare_command(),
        vec![0xEF, 0xDD, 0x04, 0x00, 0x00, 0x00]
    );
    assert_eq!(
        themis::tare_command(),
        vec![0x03, 0x0A, 0x01, 0x00, 0x00, 0x08]
    );
    assert_eq!(aku::tare_command(), vec![0xFA, 0x82, 0x01, 0x01, 0x82]);
}
