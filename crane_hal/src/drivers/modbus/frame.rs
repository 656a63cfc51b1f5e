//! Modbus RTU framing.
//!
//! ```text
//! unit | function | data ... | crc16 (low byte first)
//! ```
//!
//! Only the functions the gateway needs are supported: 0x03 (read holding
//! registers), 0x06 (write single register) and 0x10 (write multiple
//! registers). Register values are big-endian on the wire.

use crane_common::consts::MODBUS_MAX_READ_REGISTERS;
use crane_common::hal::driver::HalError;
use crc::{CRC_16_MODBUS, Crc};
use thiserror::Error;

const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_MODBUS);

/// Read holding registers.
pub const FC_READ_HOLDING: u8 = 0x03;
/// Write single register.
pub const FC_WRITE_SINGLE: u8 = 0x06;
/// Write multiple registers.
pub const FC_WRITE_MULTIPLE: u8 = 0x10;

/// Exception: function not supported.
pub const EX_ILLEGAL_FUNCTION: u8 = 0x01;
/// Exception: register window out of range.
pub const EX_ILLEGAL_ADDRESS: u8 = 0x02;
/// Exception: malformed value or count.
pub const EX_ILLEGAL_VALUE: u8 = 0x03;

/// Largest register count in one 0x03 response.
pub const MAX_READ_COUNT: u16 = MODBUS_MAX_READ_REGISTERS;

/// Largest register count in one 0x10 request.
pub const MAX_WRITE_COUNT: u16 = 123;

const EXCEPTION_FRAME_LEN: usize = 5;

/// RTU framing errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RtuError {
    /// CRC trailer does not match the frame.
    #[error("bad CRC: frame carries {expected:#06x}, computed {actual:#06x}")]
    BadCrc {
        /// CRC carried in the frame.
        expected: u16,
        /// CRC computed over the frame.
        actual: u16,
    },

    /// Device answered with an exception response.
    #[error("exception {code:#04x} for function {function:#04x}")]
    Exception {
        /// Request function code.
        function: u8,
        /// Exception code.
        code: u8,
    },

    /// Response came from a different unit.
    #[error("unexpected unit {actual} (expected {expected})")]
    UnexpectedUnit {
        /// Unit addressed.
        expected: u8,
        /// Unit that answered.
        actual: u8,
    },

    /// Response carries a different function code.
    #[error("unexpected function {actual:#04x} (expected {expected:#04x})")]
    UnexpectedFunction {
        /// Function requested.
        expected: u8,
        /// Function answered.
        actual: u8,
    },

    /// Frame length or byte count inconsistent.
    #[error("malformed frame: {0}")]
    Malformed(String),
}

impl From<RtuError> for HalError {
    fn from(err: RtuError) -> Self {
        HalError::TransientRead(err.to_string())
    }
}

/// Append the CRC trailer.
pub fn seal(mut frame: Vec<u8>) -> Vec<u8> {
    let crc = CRC16.checksum(&frame);
    frame.extend_from_slice(&crc.to_le_bytes());
    frame
}

/// Verify the CRC trailer of a complete frame.
pub fn check_crc(frame: &[u8]) -> Result<(), RtuError> {
    if frame.len() < 4 {
        return Err(RtuError::Malformed(format!("{} bytes", frame.len())));
    }
    let split = frame.len() - 2;
    let expected = u16::from_le_bytes([frame[split], frame[split + 1]]);
    let actual = CRC16.checksum(&frame[..split]);
    if expected != actual {
        return Err(RtuError::BadCrc { expected, actual });
    }
    Ok(())
}

// ─── Master side ────────────────────────────────────────────────────

/// Build a 0x03 request.
pub fn read_holding_request(unit: u8, address: u16, count: u16) -> Vec<u8> {
    let mut frame = vec![unit, FC_READ_HOLDING];
    frame.extend_from_slice(&address.to_be_bytes());
    frame.extend_from_slice(&count.to_be_bytes());
    seal(frame)
}

/// Total length of the frame whose first bytes are `head`, once known.
///
/// Returns `None` until enough of the header has arrived.
pub fn response_len(head: &[u8]) -> Option<usize> {
    if head.len() < 3 {
        return None;
    }
    if head[1] & 0x80 != 0 {
        return Some(EXCEPTION_FRAME_LEN);
    }
    Some(3 + head[2] as usize + 2)
}

/// Decode a 0x03 response into `count` registers.
pub fn parse_read_response(unit: u8, count: u16, frame: &[u8]) -> Result<Vec<u16>, RtuError> {
    check_crc(frame)?;
    if frame[0] != unit {
        return Err(RtuError::UnexpectedUnit {
            expected: unit,
            actual: frame[0],
        });
    }
    if frame[1] == FC_READ_HOLDING | 0x80 {
        return Err(RtuError::Exception {
            function: FC_READ_HOLDING,
            code: frame[2],
        });
    }
    if frame[1] != FC_READ_HOLDING {
        return Err(RtuError::UnexpectedFunction {
            expected: FC_READ_HOLDING,
            actual: frame[1],
        });
    }

    let byte_count = frame[2] as usize;
    if byte_count != count as usize * 2 || frame.len() != 3 + byte_count + 2 {
        return Err(RtuError::Malformed(format!(
            "byte count {byte_count} for {count} registers in a {}-byte frame",
            frame.len()
        )));
    }
    Ok(frame[3..3 + byte_count]
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect())
}

// ─── Slave side ─────────────────────────────────────────────────────

/// Request received by the register server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// 0x03
    ReadHolding {
        /// First register.
        address: u16,
        /// Register count.
        count: u16,
    },
    /// 0x06
    WriteSingle {
        /// Register.
        address: u16,
        /// New value.
        value: u16,
    },
    /// 0x10
    WriteMultiple {
        /// First register.
        address: u16,
        /// New values.
        values: Vec<u16>,
    },
    /// Any other function code; answered with an exception.
    Unsupported {
        /// Function code received.
        function: u8,
    },
}

/// Request frame with its addressing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestFrame {
    /// Addressed unit.
    pub unit: u8,
    /// Decoded request.
    pub request: Request,
    /// Bytes the frame occupied in the buffer.
    pub len: usize,
}

/// Length of the request frame at the start of `buf`, once known.
fn request_len(buf: &[u8]) -> Option<usize> {
    let function = *buf.get(1)?;
    match function {
        FC_READ_HOLDING | FC_WRITE_SINGLE => Some(8),
        FC_WRITE_MULTIPLE => buf.get(6).map(|&n| 9 + n as usize),
        // Unknown function: assume the common 8-byte shape and let the CRC
        // check decide.
        _ => Some(8),
    }
}

/// Try to parse one request from the start of `buf`.
///
/// `Ok(None)` means more bytes are needed. On a CRC error the caller should
/// discard one byte and retry, which resynchronises on the next frame.
pub fn parse_request(buf: &[u8]) -> Result<Option<RequestFrame>, RtuError> {
    let Some(len) = request_len(buf) else {
        return Ok(None);
    };
    if buf.len() < len {
        return Ok(None);
    }
    let frame = &buf[..len];
    check_crc(frame)?;

    let unit = frame[0];
    let function = frame[1];
    let word = |at: usize| u16::from_be_bytes([frame[at], frame[at + 1]]);

    let request = match function {
        FC_READ_HOLDING => Request::ReadHolding {
            address: word(2),
            count: word(4),
        },
        FC_WRITE_SINGLE => Request::WriteSingle {
            address: word(2),
            value: word(4),
        },
        FC_WRITE_MULTIPLE => {
            let count = word(4) as usize;
            let byte_count = frame[6] as usize;
            if byte_count != count * 2 {
                return Err(RtuError::Malformed(format!(
                    "write of {count} registers carries {byte_count} bytes"
                )));
            }
            Request::WriteMultiple {
                address: word(2),
                values: (0..count).map(|i| word(7 + i * 2)).collect(),
            }
        }
        other => Request::Unsupported { function: other },
    };

    Ok(Some(RequestFrame { unit, request, len }))
}

/// 0x03 response carrying `regs`.
pub fn read_response(unit: u8, regs: &[u16]) -> Vec<u8> {
    let mut frame = vec![unit, FC_READ_HOLDING, (regs.len() * 2) as u8];
    for reg in regs {
        frame.extend_from_slice(&reg.to_be_bytes());
    }
    seal(frame)
}

/// 0x06 response (echo of the request).
pub fn write_single_response(unit: u8, address: u16, value: u16) -> Vec<u8> {
    let mut frame = vec![unit, FC_WRITE_SINGLE];
    frame.extend_from_slice(&address.to_be_bytes());
    frame.extend_from_slice(&value.to_be_bytes());
    seal(frame)
}

/// 0x10 response.
pub fn write_multiple_response(unit: u8, address: u16, count: u16) -> Vec<u8> {
    let mut frame = vec![unit, FC_WRITE_MULTIPLE];
    frame.extend_from_slice(&address.to_be_bytes());
    frame.extend_from_slice(&count.to_be_bytes());
    seal(frame)
}

/// Exception response.
pub fn exception_response(unit: u8, function: u8, code: u8) -> Vec<u8> {
    seal(vec![unit, function | 0x80, code])
}
