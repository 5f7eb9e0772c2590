use crate::{ProtocolError, Result, MAX_SINGLE_BYTE_LEN};
use bytes::BufMut;

/// Wire types of the tag/length/value format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WireType {
    Varint = 0,
    Fixed64 = 1,
    LengthDelimited = 2,
    Fixed32 = 5,
}

impl WireType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(WireType::Varint),
            1 => Some(WireType::Fixed64),
            2 => Some(WireType::LengthDelimited),
            5 => Some(WireType::Fixed32),
            _ => None,
        }
    }

    pub fn as_u8(&self) -> u8 {
        *self as u8
    }
}

/// Field tag: `(field << 3) | wire_type`
pub fn field_tag(field: u32, wire_type: WireType) -> u64 {
    ((field as u64) << 3) | wire_type.as_u8() as u64
}

/// Append `value` as a base-128 varint, low groups first
pub fn encode_varint<B: BufMut>(mut value: u64, dst: &mut B) {
    while value >= 0x80 {
        dst.put_u8((value as u8 & 0x7F) | 0x80);
        value >>= 7;
    }
    dst.put_u8(value as u8);
}

/// Decode a varint from the start of `src`, returning the value and bytes consumed
pub fn decode_varint(src: &[u8]) -> Result<(u64, usize)> {
    let mut value = 0u64;
    for (i, byte) in src.iter().enumerate() {
        if i >= 10 {
            return Err(ProtocolError::VarintOverflow(0));
        }
        value |= ((byte & 0x7F) as u64) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
    }
    Err(ProtocolError::TruncatedVarint(src.len()))
}

pub(crate) fn put_varint_field<B: BufMut>(dst: &mut B, field: u32, value: u64) {
    encode_varint(field_tag(field, WireType::Varint), dst);
    encode_varint(value, dst);
}

pub(crate) fn put_bytes_field<B: BufMut>(dst: &mut B, field: u32, value: &[u8]) {
    encode_varint(field_tag(field, WireType::LengthDelimited), dst);
    encode_varint(value.len() as u64, dst);
    dst.put_slice(value);
}

pub(crate) fn put_string_field<B: BufMut>(dst: &mut B, field: u32, value: &str) {
    put_bytes_field(dst, field, value.as_bytes());
}

/// Length-delimited field whose length must fit one byte.
///
/// The task request format never carries multi-byte length prefixes.
pub(crate) fn put_short_bytes_field<B: BufMut>(dst: &mut B, field: u32, value: &[u8]) -> Result<()> {
    if value.len() > MAX_SINGLE_BYTE_LEN {
        return Err(ProtocolError::FieldTooLong {
            field,
            len: value.len(),
            max: MAX_SINGLE_BYTE_LEN,
        });
    }
    dst.put_u8(field_tag(field, WireType::LengthDelimited) as u8);
    dst.put_u8(value.len() as u8);
    dst.put_slice(value);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;
    use proptest::prelude::*;

    fn varint_bytes(value: u64) -> Vec<u8> {
        let mut buf = BytesMut::new();
        encode_varint(value, &mut buf);
        buf.to_vec()
    }

    #[test]
    fn test_varint_known_encodings() {
        assert_eq!(varint_bytes(0), vec![0x00]);
        assert_eq!(varint_bytes(1), vec![0x01]);
        assert_eq!(varint_bytes(127), vec![0x7F]);
        assert_eq!(varint_bytes(128), vec![0x80, 0x01]);
        assert_eq!(varint_bytes(300), vec![0xAC, 0x02]);
        assert_eq!(varint_bytes(u32::MAX as u64), vec![0xFF, 0xFF, 0xFF, 0xFF, 0x0F]);
    }

    #[test]
    fn test_decode_varint_reports_consumed() {
        assert_eq!(decode_varint(&[0xAC, 0x02, 0x55]).unwrap(), (300, 2));
    }

    #[test]
    fn test_decode_varint_truncated() {
        assert!(matches!(
            decode_varint(&[0x80, 0x80]),
            Err(ProtocolError::TruncatedVarint(_))
        ));
        assert!(decode_varint(&[]).is_err());
    }

    #[test]
    fn test_decode_varint_overflow() {
        let too_long = [0xFFu8; 11];
        assert!(matches!(
            decode_varint(&too_long),
            Err(ProtocolError::VarintOverflow(_))
        ));
    }

    #[test]
    fn test_field_tag() {
        assert_eq!(field_tag(1, WireType::LengthDelimited), 0x0A);
        assert_eq!(field_tag(2, WireType::Varint), 0x10);
        assert_eq!(field_tag(3, WireType::LengthDelimited), 0x1A);
        assert_eq!(WireType::from_u8(3), None);
    }

    #[test]
    fn test_short_field_rejects_long_values() {
        let mut buf = BytesMut::new();
        let err = put_short_bytes_field(&mut buf, 1, &[0u8; 128]).unwrap_err();
        assert_eq!(err, ProtocolError::FieldTooLong { field: 1, len: 128, max: 127 });
        assert!(buf.is_empty());

        put_short_bytes_field(&mut buf, 1, &[7u8; 127]).unwrap();
        assert_eq!(buf[1], 127);
    }

    proptest! {
        #[test]
        fn prop_varint_roundtrip(value in 0u64..(1u64 << 32)) {
            let bytes = varint_bytes(value);
            prop_assert_eq!(decode_varint(&bytes).unwrap(), (value, bytes.len()));
        }
    }
}
