//! S7 protocol adapter.
//!
//! Talks the controller's native protocol over ISO-on-TCP (port 102): a
//! COTP connection request, an S7 "setup communication" exchange that
//! negotiates the PDU length, then Write Var / Read Var jobs against a
//! configured data block. Booleans are written as single bits; integers,
//! reals and duration literals as 8-byte big-endian payloads.
//!
//! Unlike the symbolic protocols, S7 addresses raw data-block offsets. The
//! adapter takes the DB layout (DB number, scalar offset, bulk offset) from
//! its construction parameters; the symbolic variable path only tags
//! responses.
//!
//! Bulk batches larger than the negotiated PDU are split into whole-element
//! chunks and written back to back; the reported latency spans all chunks.

use super::{elapsed_ms, AdapterConfig, AdapterError, AdapterResponse, ProtocolAdapter};
use crate::cli::Protocol;
use crate::value::{PlcValue, BULK_ELEMENT_BYTES};
use anyhow::anyhow;
use async_trait::async_trait;
use serde_json::json;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::debug;

pub struct S7Adapter {
    host: String,
    port: u16,
    rack: u16,
    slot: u16,
    db_number: u16,
    scalar_offset: u32,
    bulk_offset: u32,
    request_timeout: Duration,
    session: Option<S7Session>,
}

/// One established ISO-on-TCP session with a negotiated PDU length.
struct S7Session {
    stream: TcpStream,
    pdu_length: u16,
    pdu_ref: u16,
}

impl S7Session {
    fn next_ref(&mut self) -> u16 {
        self.pdu_ref = self.pdu_ref.wrapping_add(1);
        self.pdu_ref
    }

    /// Send one request frame and read the matching reply frame.
    async fn exchange(&mut self, request: &[u8], limit: Duration) -> anyhow::Result<Vec<u8>> {
        tokio::time::timeout(limit, async {
            self.stream.write_all(request).await?;
            frame::read_frame(&mut self.stream).await
        })
        .await
        .map_err(|_| anyhow!("S7 request timed out after {limit:?}"))?
    }
}

impl S7Adapter {
    pub fn new(config: &AdapterConfig) -> Self {
        Self {
            host: config.s7_host.clone(),
            port: config.s7_port,
            rack: config.s7_rack,
            slot: config.s7_slot,
            db_number: config.s7_db_number,
            scalar_offset: config.s7_scalar_offset,
            bulk_offset: config.s7_bulk_offset,
            request_timeout: config.request_timeout,
            session: None,
        }
    }
}

#[async_trait]
impl ProtocolAdapter for S7Adapter {
    async fn connect(&mut self) -> Result<(), AdapterError> {
        let rack = self.rack;
        let slot = self.slot;
        let address = (self.host.as_str(), self.port);

        let handshake = async {
            let mut stream = TcpStream::connect(address).await?;
            stream.set_nodelay(true)?;

            stream
                .write_all(&frame::connection_request(rack, slot))
                .await?;
            let reply = frame::read_frame(&mut stream).await?;
            anyhow::ensure!(
                reply.len() > 5 && reply[5] == frame::COTP_CONNECTION_CONFIRM,
                "COTP connection refused"
            );

            stream
                .write_all(&frame::setup_request(1, frame::REQUESTED_PDU_LENGTH))
                .await?;
            let reply = frame::read_frame(&mut stream).await?;
            let pdu_length = frame::negotiated_pdu_length(&reply)?;

            Ok::<_, anyhow::Error>(S7Session {
                stream,
                pdu_length,
                pdu_ref: 1,
            })
        };

        let session = tokio::time::timeout(self.request_timeout, handshake)
            .await
            .map_err(|_| AdapterError::Connection(anyhow!("S7 handshake timed out")))?
            .map_err(AdapterError::Connection)?;

        debug!(
            "S7 session up at {}:{} (rack {rack}, slot {slot}, PDU {})",
            self.host, self.port, session.pdu_length
        );
        self.session = Some(session);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), AdapterError> {
        // Dropping the stream closes the TCP connection; there is no
        // dedicated S7 teardown exchange.
        if self.session.take().is_some() {
            debug!("S7 session closed");
        }
        Ok(())
    }

    async fn write(
        &mut self,
        variable: &str,
        value: &PlcValue,
    ) -> Result<AdapterResponse, AdapterError> {
        let db = self.db_number;
        let offset = self.scalar_offset;
        let limit = self.request_timeout;
        let session = self.session.as_mut().ok_or(AdapterError::NotConnected)?;

        let item = match value {
            PlcValue::Bool(flag) => frame::WriteItem::Bit {
                byte: offset,
                bit: 0,
                value: *flag,
            },
            PlcValue::Real(real) => frame::WriteItem::Bytes {
                offset,
                payload: real.to_be_bytes().to_vec(),
            },
            other => {
                let nanoseconds = other.as_nanoseconds().ok_or_else(|| {
                    AdapterError::Protocol(anyhow!("unsupported value for S7 write: {other:?}"))
                })?;
                frame::WriteItem::Bytes {
                    offset,
                    payload: nanoseconds.to_be_bytes().to_vec(),
                }
            }
        };

        let request = frame::write_request(session.next_ref(), db, &item);
        let started = Instant::now();
        let reply = session
            .exchange(&request, limit)
            .await
            .map_err(AdapterError::Protocol)?;
        let latency_ms = elapsed_ms(started);
        frame::check_write_ack(&reply).map_err(AdapterError::Protocol)?;

        Ok(AdapterResponse {
            detail: json!({
                "success": true,
                "var": variable,
                "value": serde_json::to_value(value).unwrap_or(serde_json::Value::Null),
            }),
            latency_ms,
        })
    }

    async fn read(&mut self, variable: &str) -> Result<AdapterResponse, AdapterError> {
        let db = self.db_number;
        let offset = self.scalar_offset;
        let limit = self.request_timeout;
        let session = self.session.as_mut().ok_or(AdapterError::NotConnected)?;

        let request = frame::read_request(session.next_ref(), db, offset, 1);
        let started = Instant::now();
        let reply = session
            .exchange(&request, limit)
            .await
            .map_err(AdapterError::Protocol)?;
        let latency_ms = elapsed_ms(started);

        let payload = frame::read_payload(&reply).map_err(AdapterError::Protocol)?;
        let bit = payload
            .first()
            .map(|byte| byte & 0x01 != 0)
            .ok_or_else(|| AdapterError::Protocol(anyhow!("empty read payload")))?;

        Ok(AdapterResponse {
            detail: json!({"success": true, "var": variable, "value": bit}),
            latency_ms,
        })
    }

    async fn write_bulk(&mut self, values: &[PlcValue]) -> Result<AdapterResponse, AdapterError> {
        let db = self.db_number;
        let bulk_offset = self.bulk_offset;
        let limit = self.request_timeout;
        let session = self.session.as_mut().ok_or(AdapterError::NotConnected)?;

        // Encode the entire batch before any transport activity so a bad
        // element fails the call without touching the wire.
        let mut buffer = Vec::with_capacity(values.len() * BULK_ELEMENT_BYTES);
        for value in values {
            let nanoseconds = value.as_nanoseconds().ok_or_else(|| {
                AdapterError::Protocol(anyhow!("bulk element is not a duration: {value:?}"))
            })?;
            buffer.extend_from_slice(&nanoseconds.to_be_bytes());
        }

        let chunk_len = frame::max_write_payload(session.pdu_length);
        let started = Instant::now();
        let mut written = 0usize;
        for chunk in buffer.chunks(chunk_len) {
            let item = frame::WriteItem::Bytes {
                offset: bulk_offset + written as u32,
                payload: chunk.to_vec(),
            };
            let request = frame::write_request(session.next_ref(), db, &item);
            let reply = session
                .exchange(&request, limit)
                .await
                .map_err(AdapterError::Protocol)?;
            frame::check_write_ack(&reply).map_err(AdapterError::Protocol)?;
            written += chunk.len();
        }
        let latency_ms = elapsed_ms(started);

        Ok(AdapterResponse {
            detail: json!({"success": true, "elements_written": values.len()}),
            latency_ms,
        })
    }

    fn protocol(&self) -> Protocol {
        Protocol::S7
    }
}

/// ISO-on-TCP / S7 PDU construction and parsing.
///
/// Frames are TPKT (4 bytes) + COTP + S7 header + parameters + data. Reply
/// offsets below are absolute within a full frame: the S7 header starts at
/// byte 7, error class/code sit at 17/18, parameters start at 19.
mod frame {
    use anyhow::anyhow;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpStream;

    pub(super) const COTP_CONNECTION_CONFIRM: u8 = 0xD0;

    /// PDU length requested during setup communication.
    pub(super) const REQUESTED_PDU_LENGTH: u16 = 960;

    /// TPKT + COTP + job header + one write item + data header.
    const WRITE_OVERHEAD_BYTES: usize = 35;

    const COTP_DATA_HEADER: [u8; 3] = [0x02, 0xF0, 0x80];

    const AREA_DATA_BLOCK: u8 = 0x84;
    const TRANSPORT_BIT: u8 = 0x01;
    const TRANSPORT_BYTE: u8 = 0x02;
    const DATA_TRANSPORT_BIT: u8 = 0x03;
    const DATA_TRANSPORT_BYTE: u8 = 0x04;
    const RETURN_OK: u8 = 0xFF;

    const FN_READ: u8 = 0x04;
    const FN_WRITE: u8 = 0x05;

    const BIT_SET: &[u8] = &[0x01];
    const BIT_CLEAR: &[u8] = &[0x00];

    /// One addressable write target inside the configured data block.
    pub(super) enum WriteItem {
        Bit { byte: u32, bit: u8, value: bool },
        Bytes { offset: u32, payload: Vec<u8> },
    }

    /// Largest write payload that fits one negotiated PDU, rounded down to
    /// whole bulk elements.
    pub(super) fn max_write_payload(pdu_length: u16) -> usize {
        let headroom = usize::from(pdu_length).saturating_sub(WRITE_OVERHEAD_BYTES);
        (headroom / super::BULK_ELEMENT_BYTES).max(1) * super::BULK_ELEMENT_BYTES
    }

    /// COTP connection request. The remote TSAP encodes the connection type
    /// (PG) plus the rack/slot position of the CPU.
    pub(super) fn connection_request(rack: u16, slot: u16) -> Vec<u8> {
        let remote_tsap = (rack * 0x20 + slot) as u8;
        vec![
            0x03, 0x00, 0x00, 0x16, // TPKT, 22 bytes total
            0x11, 0xE0, // COTP: LI 17, connection request
            0x00, 0x00, // destination reference
            0x00, 0x01, // source reference
            0x00, // class 0
            0xC0, 0x01, 0x0A, // TPDU size 1024
            0xC1, 0x02, 0x01, 0x00, // source TSAP
            0xC2, 0x02, 0x01, remote_tsap, // destination TSAP
        ]
    }

    /// S7 setup-communication job negotiating the PDU length.
    pub(super) fn setup_request(pdu_ref: u16, pdu_length: u16) -> Vec<u8> {
        let mut request = Vec::with_capacity(25);
        request.extend_from_slice(&[0x03, 0x00, 0x00, 0x19]);
        request.extend_from_slice(&COTP_DATA_HEADER);
        request.extend_from_slice(&[0x32, 0x01, 0x00, 0x00]);
        request.extend_from_slice(&pdu_ref.to_be_bytes());
        request.extend_from_slice(&8u16.to_be_bytes()); // parameter length
        request.extend_from_slice(&0u16.to_be_bytes()); // data length
        request.extend_from_slice(&[0xF0, 0x00]); // setup communication
        request.extend_from_slice(&1u16.to_be_bytes()); // max AMQ calling
        request.extend_from_slice(&1u16.to_be_bytes()); // max AMQ called
        request.extend_from_slice(&pdu_length.to_be_bytes());
        request
    }

    /// Write Var job with a single item.
    pub(super) fn write_request(pdu_ref: u16, db_number: u16, item: &WriteItem) -> Vec<u8> {
        let (transport, count, bit_address, data_transport, data_length, payload): (
            u8,
            u16,
            u32,
            u8,
            u16,
            &[u8],
        ) = match item {
            WriteItem::Bit { byte, bit, value } => (
                TRANSPORT_BIT,
                1,
                byte * 8 + u32::from(*bit),
                DATA_TRANSPORT_BIT,
                1, // length in bits
                if *value { BIT_SET } else { BIT_CLEAR },
            ),
            WriteItem::Bytes { offset, payload } => (
                TRANSPORT_BYTE,
                payload.len() as u16,
                offset * 8,
                DATA_TRANSPORT_BYTE,
                (payload.len() * 8) as u16, // length in bits
                payload.as_slice(),
            ),
        };

        let data_len = 4 + payload.len();
        let total = WRITE_OVERHEAD_BYTES + payload.len();
        let mut request = Vec::with_capacity(total);
        request.extend_from_slice(&[0x03, 0x00]);
        request.extend_from_slice(&(total as u16).to_be_bytes());
        request.extend_from_slice(&COTP_DATA_HEADER);
        // job header
        request.extend_from_slice(&[0x32, 0x01, 0x00, 0x00]);
        request.extend_from_slice(&pdu_ref.to_be_bytes());
        request.extend_from_slice(&14u16.to_be_bytes());
        request.extend_from_slice(&(data_len as u16).to_be_bytes());
        // parameter: one write item
        request.extend_from_slice(&[FN_WRITE, 0x01, 0x12, 0x0A, 0x10, transport]);
        request.extend_from_slice(&count.to_be_bytes());
        request.extend_from_slice(&db_number.to_be_bytes());
        request.push(AREA_DATA_BLOCK);
        request.extend_from_slice(&bit_address.to_be_bytes()[1..4]);
        // data
        request.push(0x00); // reserved return code
        request.push(data_transport);
        request.extend_from_slice(&data_length.to_be_bytes());
        request.extend_from_slice(payload);
        request
    }

    /// Read Var job for `count` bytes at `offset` in the data block.
    pub(super) fn read_request(pdu_ref: u16, db_number: u16, offset: u32, count: u16) -> Vec<u8> {
        let mut request = Vec::with_capacity(31);
        request.extend_from_slice(&[0x03, 0x00, 0x00, 0x1F]);
        request.extend_from_slice(&COTP_DATA_HEADER);
        request.extend_from_slice(&[0x32, 0x01, 0x00, 0x00]);
        request.extend_from_slice(&pdu_ref.to_be_bytes());
        request.extend_from_slice(&14u16.to_be_bytes());
        request.extend_from_slice(&0u16.to_be_bytes());
        request.extend_from_slice(&[FN_READ, 0x01, 0x12, 0x0A, 0x10, TRANSPORT_BYTE]);
        request.extend_from_slice(&count.to_be_bytes());
        request.extend_from_slice(&db_number.to_be_bytes());
        request.push(AREA_DATA_BLOCK);
        request.extend_from_slice(&(offset * 8).to_be_bytes()[1..4]);
        request
    }

    /// Read one full TPKT-framed reply from the stream.
    pub(super) async fn read_frame(stream: &mut TcpStream) -> anyhow::Result<Vec<u8>> {
        let mut header = [0u8; 4];
        stream.read_exact(&mut header).await?;
        anyhow::ensure!(header[0] == 0x03, "unexpected TPKT version {:#04x}", header[0]);
        let total = usize::from(u16::from_be_bytes([header[2], header[3]]));
        anyhow::ensure!(
            (7..=8192).contains(&total),
            "implausible TPKT length {total}"
        );
        let mut reply = vec![0u8; total];
        reply[..4].copy_from_slice(&header);
        stream.read_exact(&mut reply[4..]).await?;
        Ok(reply)
    }

    /// Validate the common ack-data header of a reply frame.
    fn check_ack(reply: &[u8]) -> anyhow::Result<()> {
        anyhow::ensure!(reply.len() >= 19, "short S7 reply: {} bytes", reply.len());
        anyhow::ensure!(reply[7] == 0x32, "not an S7 frame");
        anyhow::ensure!(reply[8] == 0x03, "unexpected message type {:#04x}", reply[8]);
        let (class, code) = (reply[17], reply[18]);
        anyhow::ensure!(
            class == 0 && code == 0,
            "S7 error class {class:#04x} code {code:#04x}"
        );
        Ok(())
    }

    /// Validate a Write Var ack and its per-item return code.
    pub(super) fn check_write_ack(reply: &[u8]) -> anyhow::Result<()> {
        check_ack(reply)?;
        let code = *reply
            .get(21)
            .ok_or_else(|| anyhow!("write ack missing item return code"))?;
        anyhow::ensure!(code == RETURN_OK, "write rejected with code {code:#04x}");
        Ok(())
    }

    /// Validate a Read Var ack and return its payload bytes.
    pub(super) fn read_payload(reply: &[u8]) -> anyhow::Result<&[u8]> {
        check_ack(reply)?;
        let code = *reply
            .get(21)
            .ok_or_else(|| anyhow!("read ack missing item return code"))?;
        anyhow::ensure!(code == RETURN_OK, "read rejected with code {code:#04x}");
        anyhow::ensure!(reply.len() >= 25, "read ack missing payload");
        Ok(&reply[25..])
    }

    /// Extract the negotiated PDU length from a setup-communication ack.
    pub(super) fn negotiated_pdu_length(reply: &[u8]) -> anyhow::Result<u16> {
        check_ack(reply)?;
        anyhow::ensure!(reply.len() >= 27, "setup ack too short");
        anyhow::ensure!(reply[19] == 0xF0, "not a setup-communication ack");
        let pdu = u16::from_be_bytes([reply[25], reply[26]]);
        anyhow::ensure!(pdu > 0, "controller negotiated a zero PDU length");
        Ok(pdu)
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn operations_before_connect_are_rejected() {
        let mut adapter = S7Adapter::new(&AdapterConfig::default());
        let result = adapter.write("x", &PlcValue::Bool(true)).await;
        assert!(matches!(result, Err(AdapterError::NotConnected)));

        let result = adapter.write_bulk(&[PlcValue::Int(1)]).await;
        assert!(matches!(result, Err(AdapterError::NotConnected)));
    }

    #[tokio::test]
    async fn disconnect_without_session_is_a_no_op() {
        let mut adapter = S7Adapter::new(&AdapterConfig::default());
        assert!(adapter.disconnect().await.is_ok());
        assert!(adapter.disconnect().await.is_ok());
    }
}
