use crate::wire::{decode_varint, WireType};
use crate::{ProtocolError, Result};
use prover_core::Task;

const FIELD_PROGRAM_ID: u32 = 1;
const FIELD_PUBLIC_INPUT: u32 = 2;
const FIELD_TASK_ID: u32 = 3;

/// Forward-only reader over a task response buffer
struct Scanner<'a> {
    buf: &'a [u8],
    offset: usize,
}

impl<'a> Scanner<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Scanner { buf, offset: 0 }
    }

    fn is_done(&self) -> bool {
        self.offset >= self.buf.len()
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.offset
    }

    fn read_varint(&mut self) -> Result<u64> {
        let start = self.offset;
        let (value, used) = decode_varint(&self.buf[start..]).map_err(|e| match e {
            ProtocolError::VarintOverflow(_) => ProtocolError::VarintOverflow(start),
            _ => ProtocolError::TruncatedVarint(start),
        })?;
        self.offset += used;
        Ok(value)
    }

    /// Single-byte length prefix followed by that many bytes
    fn read_length_delimited(&mut self) -> Result<&'a [u8]> {
        let len_offset = self.offset;
        let len = *self
            .buf
            .get(len_offset)
            .ok_or(ProtocolError::TruncatedLength(len_offset))?;
        if len & 0x80 != 0 {
            return Err(ProtocolError::MultiByteLength(len_offset));
        }
        self.offset += 1;
        self.take(len as usize, len_offset)
    }

    fn take(&mut self, len: usize, field_offset: usize) -> Result<&'a [u8]> {
        if len > self.remaining() {
            return Err(ProtocolError::LengthOverrun {
                offset: field_offset,
                declared: len,
                remaining: self.remaining(),
            });
        }
        let value = &self.buf[self.offset..self.offset + len];
        self.offset += len;
        Ok(value)
    }

    fn skip(&mut self, wire_type: WireType) -> Result<()> {
        let offset = self.offset;
        match wire_type {
            WireType::Varint => {
                self.read_varint()?;
            }
            WireType::Fixed64 => {
                self.take(8, offset)?;
            }
            WireType::LengthDelimited => {
                self.read_length_delimited()?;
            }
            WireType::Fixed32 => {
                self.take(4, offset)?;
            }
        }
        Ok(())
    }
}

fn utf8_field(field: u32, bytes: &[u8]) -> Result<String> {
    String::from_utf8(bytes.to_vec()).map_err(|_| ProtocolError::InvalidUtf8(field))
}

/// Decode a task response.
///
/// Fields 1 (program id), 2 (public input) and 3 (task id) are recognised in
/// any order; a repeated field keeps its last value. Anything else is skipped
/// according to its wire type. On error nothing is returned, so callers never
/// see a partially decoded task.
pub fn decode_task_response(buf: &[u8]) -> Result<Task> {
    let mut scanner = Scanner::new(buf);
    let mut task = Task::default();

    while !scanner.is_done() {
        let tag_offset = scanner.offset;
        let tag = scanner.read_varint()?;
        // Field numbers beyond u32 are never ours; treat them as unknown
        let field = u32::try_from(tag >> 3).ok();
        let raw_wire_type = (tag & 0x07) as u8;
        let wire_type = WireType::from_u8(raw_wire_type).ok_or(
            ProtocolError::UnsupportedWireType {
                wire_type: raw_wire_type,
                offset: tag_offset,
            },
        )?;

        match (field, wire_type) {
            (Some(FIELD_PROGRAM_ID), WireType::LengthDelimited) => {
                task.program_id = utf8_field(FIELD_PROGRAM_ID, scanner.read_length_delimited()?)?;
            }
            (Some(FIELD_PUBLIC_INPUT), WireType::LengthDelimited) => {
                task.public_input = scanner.read_length_delimited()?.to_vec();
            }
            (Some(FIELD_TASK_ID), WireType::LengthDelimited) => {
                task.task_id = utf8_field(FIELD_TASK_ID, scanner.read_length_delimited()?)?;
            }
            (_, other) => scanner.skip(other)?,
        }
    }

    Ok(task)
}
