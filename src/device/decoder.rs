//! Decoding of the 8-byte joystick wire records.
//!
//! Record layout (little-endian):
//!
//! ```text
//! bytes 0..4  timestamp (u32, device milliseconds)
//! bytes 4..6  value     (i16)
//! byte  6     type      bit 0 = button, bit 1 = axis, bit 7 = init
//! byte  7     control index (u8)
//! ```
//!
//! Decoding is total: any 8 bytes produce a [`RawEvent`]. Unrecognized type
//! bits leave the kind as [`EventKind::Unknown`], which the dispatch layer
//! drops instead of crashing on a handler lookup.

pub const RECORD_LEN: usize = 8;

const TYPE_BUTTON: u8 = 0x01;
const TYPE_AXIS: u8 = 0x02;
const TYPE_INIT: u8 = 0x80;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Button,
    Axis,
    Unknown,
}

/// One decoded device record. Ephemeral: produced per read, consumed
/// synchronously by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawEvent {
    pub timestamp: u32,
    pub value: i16,
    pub control_index: u8,
    pub kind: EventKind,
    pub is_init: bool,
}

/// Decodes one wire record. Never fails.
pub fn decode_record(record: [u8; RECORD_LEN]) -> RawEvent {
    let timestamp = u32::from_le_bytes([record[0], record[1], record[2], record[3]]);
    let value = i16::from_le_bytes([record[4], record[5]]);
    let kind_bits = record[6];

    let kind = if kind_bits & TYPE_BUTTON != 0 {
        EventKind::Button
    } else if kind_bits & TYPE_AXIS != 0 {
        EventKind::Axis
    } else {
        EventKind::Unknown
    };

    RawEvent {
        timestamp,
        value,
        control_index: record[7],
        kind,
        is_init: kind_bits & TYPE_INIT != 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_button_record() {
        let event = decode_record([0x10, 0x27, 0x00, 0x00, 0x01, 0x00, 0x01, 0x04]);
        assert_eq!(event.timestamp, 10000);
        assert_eq!(event.value, 1);
        assert_eq!(event.control_index, 4);
        assert_eq!(event.kind, EventKind::Button);
        assert!(!event.is_init);
    }

    #[test]
    fn decodes_negative_axis_value() {
        // -32767 = 0x8001
        let event = decode_record([0, 0, 0, 0, 0x01, 0x80, 0x02, 0x00]);
        assert_eq!(event.value, -32767);
        assert_eq!(event.kind, EventKind::Axis);
    }

    #[test]
    fn init_bit_is_independent_of_kind() {
        let event = decode_record([0, 0, 0, 0, 0, 0, 0x82, 0x06]);
        assert_eq!(event.kind, EventKind::Axis);
        assert!(event.is_init);
    }

    #[test]
    fn unclassified_type_bits_decode_as_unknown() {
        let event = decode_record([0, 0, 0, 0, 0, 0, 0x00, 0x09]);
        assert_eq!(event.kind, EventKind::Unknown);

        let event = decode_record([0, 0, 0, 0, 0, 0, 0x40, 0x09]);
        assert_eq!(event.kind, EventKind::Unknown);
    }
}
