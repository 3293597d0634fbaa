//! MBAP framing and PDU codec.
//!
//! A Modbus TCP frame is a 7-byte MBAP header followed by the PDU:
//!
//! ```text
//! transaction id (u16) | protocol id (u16, always 0) | length (u16) | unit id (u8) | PDU
//! ```
//!
//! `length` counts the unit id plus the PDU. All fields are big-endian.

use super::registers::{DeviceIdentity, RegisterMap};
use crate::error::{ExchangeError, ExchangeResult};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use pc_runtime::ProcessState;

pub const MBAP_HEADER_LEN: usize = 7;

/// Largest PDU allowed by the protocol.
pub const MAX_PDU_LEN: usize = 253;

const FC_READ_HOLDING: u8 = 0x03;
const FC_READ_INPUT: u8 = 0x04;
const FC_WRITE_SINGLE: u8 = 0x06;
const FC_WRITE_MULTIPLE: u8 = 0x10;
const FC_ENCAPSULATED: u8 = 0x2B;
const MEI_DEVICE_ID: u8 = 0x0E;

const MAX_READ_COUNT: u16 = 125;
const MAX_WRITE_COUNT: u16 = 123;
const MAX_OBJECT_LEN: usize = 80;

/// Exception codes returned in place of a normal response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ExceptionCode {
    IllegalFunction = 0x01,
    IllegalDataAddress = 0x02,
    IllegalDataValue = 0x03,
    ServerDeviceFailure = 0x04,
}

impl ExceptionCode {
    pub fn from_u8(code: u8) -> Option<Self> {
        match code {
            0x01 => Some(Self::IllegalFunction),
            0x02 => Some(Self::IllegalDataAddress),
            0x03 => Some(Self::IllegalDataValue),
            0x04 => Some(Self::ServerDeviceFailure),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MbapHeader {
    pub transaction_id: u16,
    pub protocol_id: u16,
    /// Unit id plus PDU length in bytes.
    pub length: u16,
    pub unit_id: u8,
}

impl MbapHeader {
    /// Parse and sanity-check a header.
    ///
    /// # Errors
    ///
    /// [`ExchangeError::Frame`] for a non-Modbus protocol id or a length that
    /// cannot hold a PDU.
    pub fn parse(bytes: &[u8; MBAP_HEADER_LEN]) -> ExchangeResult<Self> {
        let mut buf = &bytes[..];
        let header = Self {
            transaction_id: buf.get_u16(),
            protocol_id: buf.get_u16(),
            length: buf.get_u16(),
            unit_id: buf.get_u8(),
        };
        if header.protocol_id != 0 {
            return Err(ExchangeError::Frame {
                what: format!("protocol id {} is not Modbus", header.protocol_id),
            });
        }
        if header.length < 2 || usize::from(header.length) > MAX_PDU_LEN + 1 {
            return Err(ExchangeError::Frame {
                what: format!("MBAP length {} out of range", header.length),
            });
        }
        Ok(header)
    }

    pub fn pdu_len(&self) -> usize {
        usize::from(self.length) - 1
    }
}

/// Split a complete frame into header and PDU.
pub fn decode_frame(frame: &[u8]) -> ExchangeResult<(MbapHeader, &[u8])> {
    let header_bytes: &[u8; MBAP_HEADER_LEN] = frame
        .get(..MBAP_HEADER_LEN)
        .and_then(|h| h.try_into().ok())
        .ok_or_else(|| ExchangeError::Frame {
            what: format!("frame of {} bytes is shorter than the MBAP header", frame.len()),
        })?;
    let header = MbapHeader::parse(header_bytes)?;
    let pdu = &frame[MBAP_HEADER_LEN..];
    if pdu.len() != header.pdu_len() {
        return Err(ExchangeError::Frame {
            what: format!(
                "MBAP length announces {} PDU bytes, got {}",
                header.pdu_len(),
                pdu.len()
            ),
        });
    }
    Ok((header, pdu))
}

/// Frame a response PDU, echoing the request's transaction and unit ids.
pub fn encode_frame(request: &MbapHeader, response: &Response) -> Bytes {
    let mut pdu = BytesMut::with_capacity(MAX_PDU_LEN);
    response.encode_pdu(&mut pdu);

    let mut frame = BytesMut::with_capacity(MBAP_HEADER_LEN + pdu.len());
    frame.put_u16(request.transaction_id);
    frame.put_u16(0);
    frame.put_u16((pdu.len() + 1) as u16);
    frame.put_u8(request.unit_id);
    frame.extend_from_slice(&pdu);
    frame.freeze()
}

/// Device identification access modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceIdRead {
    /// Stream every basic object.
    Basic,
    /// One object by id.
    Individual(u8),
}

/// Decoded request PDU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    ReadHolding { start: u16, count: u16 },
    ReadInput { start: u16, count: u16 },
    WriteSingle { address: u16, value: u16 },
    WriteMultiple { start: u16, values: Vec<u16> },
    ReadDeviceId(DeviceIdRead),
}

impl Request {
    pub fn function_code(&self) -> u8 {
        match self {
            Self::ReadHolding { .. } => FC_READ_HOLDING,
            Self::ReadInput { .. } => FC_READ_INPUT,
            Self::WriteSingle { .. } => FC_WRITE_SINGLE,
            Self::WriteMultiple { .. } => FC_WRITE_MULTIPLE,
            Self::ReadDeviceId(_) => FC_ENCAPSULATED,
        }
    }

    /// Decode a request PDU. Failures are the exception to answer with.
    pub fn decode(pdu: &[u8]) -> Result<Self, ExceptionCode> {
        let mut buf = pdu;
        if !buf.has_remaining() {
            return Err(ExceptionCode::IllegalFunction);
        }
        let function = buf.get_u8();
        match function {
            FC_READ_HOLDING | FC_READ_INPUT => {
                if buf.remaining() != 4 {
                    return Err(ExceptionCode::IllegalDataValue);
                }
                let start = buf.get_u16();
                let count = buf.get_u16();
                if !(1..=MAX_READ_COUNT).contains(&count) {
                    return Err(ExceptionCode::IllegalDataValue);
                }
                Ok(if function == FC_READ_HOLDING {
                    Self::ReadHolding { start, count }
                } else {
                    Self::ReadInput { start, count }
                })
            }
            FC_WRITE_SINGLE => {
                if buf.remaining() != 4 {
                    return Err(ExceptionCode::IllegalDataValue);
                }
                Ok(Self::WriteSingle {
                    address: buf.get_u16(),
                    value: buf.get_u16(),
                })
            }
            FC_WRITE_MULTIPLE => {
                if buf.remaining() < 5 {
                    return Err(ExceptionCode::IllegalDataValue);
                }
                let start = buf.get_u16();
                let count = buf.get_u16();
                let byte_count = usize::from(buf.get_u8());
                if !(1..=MAX_WRITE_COUNT).contains(&count)
                    || byte_count != usize::from(count) * 2
                    || buf.remaining() != byte_count
                {
                    return Err(ExceptionCode::IllegalDataValue);
                }
                let values = (0..count).map(|_| buf.get_u16()).collect();
                Ok(Self::WriteMultiple { start, values })
            }
            FC_ENCAPSULATED => {
                if buf.remaining() != 3 {
                    return Err(ExceptionCode::IllegalDataValue);
                }
                if buf.get_u8() != MEI_DEVICE_ID {
                    return Err(ExceptionCode::IllegalFunction);
                }
                let read_code = buf.get_u8();
                let object_id = buf.get_u8();
                match read_code {
                    0x01 => Ok(Self::ReadDeviceId(DeviceIdRead::Basic)),
                    0x04 => Ok(Self::ReadDeviceId(DeviceIdRead::Individual(object_id))),
                    _ => Err(ExceptionCode::IllegalDataValue),
                }
            }
            _ => Err(ExceptionCode::IllegalFunction),
        }
    }

    /// Client-side encoding.
    pub fn encode_pdu(&self, dst: &mut BytesMut) {
        dst.put_u8(self.function_code());
        match self {
            Self::ReadHolding { start, count } | Self::ReadInput { start, count } => {
                dst.put_u16(*start);
                dst.put_u16(*count);
            }
            Self::WriteSingle { address, value } => {
                dst.put_u16(*address);
                dst.put_u16(*value);
            }
            Self::WriteMultiple { start, values } => {
                dst.put_u16(*start);
                dst.put_u16(values.len() as u16);
                dst.put_u8((values.len() * 2) as u8);
                for v in values {
                    dst.put_u16(*v);
                }
            }
            Self::ReadDeviceId(read) => {
                dst.put_u8(MEI_DEVICE_ID);
                match read {
                    DeviceIdRead::Basic => {
                        dst.put_u8(0x01);
                        dst.put_u8(0x00);
                    }
                    DeviceIdRead::Individual(id) => {
                        dst.put_u8(0x04);
                        dst.put_u8(*id);
                    }
                }
            }
        }
    }
}

/// Response PDU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    ReadHolding(Vec<u16>),
    ReadInput(Vec<u16>),
    WriteSingle { address: u16, value: u16 },
    WriteMultiple { start: u16, count: u16 },
    DeviceId { read_code: u8, objects: Vec<(u8, String)> },
    Exception { function: u8, code: ExceptionCode },
}

impl Response {
    pub fn exception(function: u8, code: ExceptionCode) -> Self {
        Self::Exception {
            function: function & 0x7F,
            code,
        }
    }

    pub fn encode_pdu(&self, dst: &mut BytesMut) {
        match self {
            Self::ReadHolding(values) | Self::ReadInput(values) => {
                let function = if matches!(self, Self::ReadHolding(_)) {
                    FC_READ_HOLDING
                } else {
                    FC_READ_INPUT
                };
                dst.put_u8(function);
                dst.put_u8((values.len() * 2) as u8);
                for v in values {
                    dst.put_u16(*v);
                }
            }
            Self::WriteSingle { address, value } => {
                dst.put_u8(FC_WRITE_SINGLE);
                dst.put_u16(*address);
                dst.put_u16(*value);
            }
            Self::WriteMultiple { start, count } => {
                dst.put_u8(FC_WRITE_MULTIPLE);
                dst.put_u16(*start);
                dst.put_u16(*count);
            }
            Self::DeviceId { read_code, objects } => {
                dst.put_u8(FC_ENCAPSULATED);
                dst.put_u8(MEI_DEVICE_ID);
                dst.put_u8(*read_code);
                // Basic conformity, everything fits in one response
                dst.put_u8(0x01);
                dst.put_u8(0x00);
                dst.put_u8(0x00);
                dst.put_u8(objects.len() as u8);
                for (id, value) in objects {
                    let bytes = &value.as_bytes()[..value.len().min(MAX_OBJECT_LEN)];
                    dst.put_u8(*id);
                    dst.put_u8(bytes.len() as u8);
                    dst.extend_from_slice(bytes);
                }
            }
            Self::Exception { function, code } => {
                dst.put_u8(function | 0x80);
                dst.put_u8(*code as u8);
            }
        }
    }

    /// Client-side decoding of a response PDU.
    pub fn decode_pdu(pdu: &[u8]) -> ExchangeResult<Self> {
        let malformed = |what: &str| ExchangeError::Frame {
            what: what.to_string(),
        };
        let mut buf = pdu;
        if !buf.has_remaining() {
            return Err(malformed("empty response PDU"));
        }
        let function = buf.get_u8();
        if function & 0x80 != 0 {
            if buf.remaining() != 1 {
                return Err(malformed("exception response length"));
            }
            let code = ExceptionCode::from_u8(buf.get_u8())
                .ok_or_else(|| malformed("unknown exception code"))?;
            return Ok(Self::exception(function, code));
        }
        match function {
            FC_READ_HOLDING | FC_READ_INPUT => {
                if !buf.has_remaining() {
                    return Err(malformed("missing byte count"));
                }
                let byte_count = usize::from(buf.get_u8());
                if byte_count % 2 != 0 || buf.remaining() != byte_count {
                    return Err(malformed("register byte count"));
                }
                let values = (0..byte_count / 2).map(|_| buf.get_u16()).collect();
                Ok(if function == FC_READ_HOLDING {
                    Self::ReadHolding(values)
                } else {
                    Self::ReadInput(values)
                })
            }
            FC_WRITE_SINGLE | FC_WRITE_MULTIPLE => {
                if buf.remaining() != 4 {
                    return Err(malformed("write echo length"));
                }
                let first = buf.get_u16();
                let second = buf.get_u16();
                Ok(if function == FC_WRITE_SINGLE {
                    Self::WriteSingle {
                        address: first,
                        value: second,
                    }
                } else {
                    Self::WriteMultiple {
                        start: first,
                        count: second,
                    }
                })
            }
            FC_ENCAPSULATED => {
                if buf.remaining() < 6 || buf.get_u8() != MEI_DEVICE_ID {
                    return Err(malformed("device identification header"));
                }
                let read_code = buf.get_u8();
                buf.advance(3);
                let count = buf.get_u8();
                let mut objects = Vec::with_capacity(usize::from(count));
                for _ in 0..count {
                    if buf.remaining() < 2 {
                        return Err(malformed("device identification object"));
                    }
                    let id = buf.get_u8();
                    let len = usize::from(buf.get_u8());
                    if buf.remaining() < len {
                        return Err(malformed("device identification object"));
                    }
                    let value = String::from_utf8_lossy(&buf[..len]).into_owned();
                    buf.advance(len);
                    objects.push((id, value));
                }
                Ok(Self::DeviceId { read_code, objects })
            }
            other => Err(ExchangeError::Frame {
                what: format!("unsupported function code {other:#04x}"),
            }),
        }
    }
}

/// Serve one request PDU against the shared state.
///
/// Every outcome, including malformed requests, produces a response.
pub fn handle_pdu(
    map: &RegisterMap,
    identity: &DeviceIdentity,
    state: &ProcessState,
    pdu: &[u8],
) -> Response {
    let function = pdu.first().copied().unwrap_or(0);
    let request = match Request::decode(pdu) {
        Ok(request) => request,
        Err(code) => return Response::exception(function, code),
    };

    let result = match &request {
        Request::ReadHolding { start, count } => map
            .read(&state.snapshot(), *start, *count)
            .map(Response::ReadHolding),
        Request::ReadInput { start, count } => map
            .read(&state.snapshot(), *start, *count)
            .map(Response::ReadInput),
        Request::WriteSingle { address, value } => map
            .write(state, *address, &[*value])
            .map(|()| Response::WriteSingle {
                address: *address,
                value: *value,
            }),
        Request::WriteMultiple { start, values } => {
            map.write(state, *start, values)
                .map(|()| Response::WriteMultiple {
                    start: *start,
                    count: values.len() as u16,
                })
        }
        Request::ReadDeviceId(read) => {
            let objects = identity.objects();
            match read {
                DeviceIdRead::Basic => Ok(Response::DeviceId {
                    read_code: 0x01,
                    objects: objects
                        .iter()
                        .map(|(id, v)| (*id, v.to_string()))
                        .collect(),
                }),
                DeviceIdRead::Individual(wanted) => objects
                    .iter()
                    .find(|(id, _)| id == wanted)
                    .map(|(id, v)| Response::DeviceId {
                        read_code: 0x04,
                        objects: vec![(*id, v.to_string())],
                    })
                    .ok_or(ExceptionCode::IllegalDataAddress),
            }
        }
    };

    result.unwrap_or_else(|code| {
        tracing::debug!(function, ?code, "modbus exception");
        Response::exception(function, code)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pc_runtime::{ProcessSnapshot, SetpointRange};

    fn state() -> ProcessState {
        ProcessState::new(
            ProcessSnapshot::initial(50.0, 20.0, 3.0),
            SetpointRange::new(0.0, 100.0).unwrap(),
        )
        .unwrap()
    }

    fn serve(s: &ProcessState, pdu: &[u8]) -> Response {
        handle_pdu(&RegisterMap::default(), &DeviceIdentity::default(), s, pdu)
    }

    #[test]
    fn header_rejects_foreign_protocol() {
        let err = MbapHeader::parse(&[0, 1, 0, 7, 0, 6, 1]).unwrap_err();
        assert!(matches!(err, ExchangeError::Frame { .. }));
        let ok = MbapHeader::parse(&[0, 1, 0, 0, 0, 6, 9]).unwrap();
        assert_eq!(ok.transaction_id, 1);
        assert_eq!(ok.unit_id, 9);
        assert_eq!(ok.pdu_len(), 5);
    }

    #[test]
    fn header_rejects_bad_lengths() {
        assert!(MbapHeader::parse(&[0, 1, 0, 0, 0, 1, 1]).is_err());
        assert!(MbapHeader::parse(&[0, 1, 0, 0, 1, 0, 1]).is_err());
    }

    #[test]
    fn response_frame_echoes_ids() {
        let header = MbapHeader {
            transaction_id: 0xBEEF,
            protocol_id: 0,
            length: 6,
            unit_id: 17,
        };
        let frame = encode_frame(&header, &Response::ReadHolding(vec![5000, 2000]));
        assert_eq!(
            &frame[..],
            &[0xBE, 0xEF, 0, 0, 0, 7, 17, 0x03, 4, 0x13, 0x88, 0x07, 0xD0]
        );
        let (decoded, pdu) = decode_frame(&frame).unwrap();
        assert_eq!(decoded.transaction_id, 0xBEEF);
        assert_eq!(
            Response::decode_pdu(pdu).unwrap(),
            Response::ReadHolding(vec![5000, 2000])
        );
    }

    #[test]
    fn truncated_frame_is_malformed() {
        assert!(decode_frame(&[0, 1, 0, 0]).is_err());
        assert!(decode_frame(&[0, 1, 0, 0, 0, 6, 1, 0x03, 0, 0]).is_err());
    }

    #[test]
    fn reads_holding_and_input_blocks() {
        let s = state();
        assert_eq!(
            serve(&s, &[0x03, 0, 0, 0, 3]),
            Response::ReadHolding(vec![5000, 2000, 300])
        );
        assert_eq!(
            serve(&s, &[0x04, 0, 1, 0, 1]),
            Response::ReadInput(vec![2000])
        );
    }

    #[test]
    fn single_write_updates_setpoint() {
        let s = state();
        // 0x1D4C = 7500 -> 75.00
        assert_eq!(
            serve(&s, &[0x06, 0, 0, 0x1D, 0x4C]),
            Response::WriteSingle {
                address: 0,
                value: 7500
            }
        );
        assert_eq!(s.setpoint(), 75.0);
    }

    #[test]
    fn multiple_write_updates_setpoint() {
        let s = state();
        assert_eq!(
            serve(&s, &[0x10, 0, 0, 0, 1, 2, 0x03, 0xE8]),
            Response::WriteMultiple { start: 0, count: 1 }
        );
        assert_eq!(s.setpoint(), 10.0);
    }

    #[test]
    fn exceptions() {
        let s = state();
        let exc = |function, code| Response::Exception { function, code };

        assert_eq!(
            serve(&s, &[0x05, 0, 0, 0xFF, 0]),
            exc(0x05, ExceptionCode::IllegalFunction)
        );
        assert_eq!(
            serve(&s, &[0x03, 0, 7, 0, 1]),
            exc(0x03, ExceptionCode::IllegalDataAddress)
        );
        assert_eq!(
            serve(&s, &[0x03, 0, 0, 0, 0]),
            exc(0x03, ExceptionCode::IllegalDataValue)
        );
        assert_eq!(
            serve(&s, &[0x03, 0, 0, 0, 200]),
            exc(0x03, ExceptionCode::IllegalDataValue)
        );
        assert_eq!(
            serve(&s, &[0x06, 0, 2, 0, 1]),
            exc(0x06, ExceptionCode::IllegalDataAddress)
        );
        // 20000 -> 200.00, outside the setpoint range
        assert_eq!(
            serve(&s, &[0x06, 0, 0, 0x4E, 0x20]),
            exc(0x06, ExceptionCode::IllegalDataValue)
        );
        // Byte count disagrees with register count
        assert_eq!(
            serve(&s, &[0x10, 0, 0, 0, 1, 4, 0, 1]),
            exc(0x10, ExceptionCode::IllegalDataValue)
        );
        assert_eq!(s.setpoint(), 50.0);
    }

    #[test]
    fn exception_pdu_sets_high_bit() {
        let mut buf = BytesMut::new();
        Response::exception(0x06, ExceptionCode::IllegalDataValue).encode_pdu(&mut buf);
        assert_eq!(&buf[..], &[0x86, 0x03]);
    }

    #[test]
    fn device_identification() {
        let s = state();
        let identity = DeviceIdentity {
            vendor_name: "Acme".to_string(),
            product_code: "PID-1".to_string(),
            revision: "2.1".to_string(),
        };
        let basic = handle_pdu(
            &RegisterMap::default(),
            &identity,
            &s,
            &[0x2B, 0x0E, 0x01, 0x00],
        );
        let Response::DeviceId { read_code, objects } = basic else {
            panic!("expected a device identification response");
        };
        assert_eq!(read_code, 0x01);
        assert_eq!(objects[0], (0x00, "Acme".to_string()));
        assert_eq!(objects[2], (0x02, "2.1".to_string()));

        let mut buf = BytesMut::new();
        Request::ReadDeviceId(DeviceIdRead::Individual(0x01)).encode_pdu(&mut buf);
        let single = handle_pdu(&RegisterMap::default(), &identity, &s, &buf);
        let mut encoded = BytesMut::new();
        single.encode_pdu(&mut encoded);
        assert_eq!(
            Response::decode_pdu(&encoded).unwrap(),
            Response::DeviceId {
                read_code: 0x04,
                objects: vec![(0x01, "PID-1".to_string())]
            }
        );

        assert_eq!(
            handle_pdu(
                &RegisterMap::default(),
                &identity,
                &s,
                &[0x2B, 0x0E, 0x04, 0x07]
            ),
            Response::exception(0x2B, ExceptionCode::IllegalDataAddress)
        );
    }
}
