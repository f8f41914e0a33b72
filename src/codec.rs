//! Packet framing over a blocking byte-stream transport.
//!
//! A packet travels as two sequential writes: the fixed header, then the
//! payload (skipped when empty). Reading mirrors that: exactly `HEADER_LEN`
//! bytes, then exactly `payload_size` bytes. Any short read or failed write is
//! reported as [`NetError::Disconnected`]; no partial frame is ever retained.
//!
//! Hardening gap: there is no payload ceiling, checksum or timeout. A peer
//! announcing a huge `payload_size` makes the reader reserve that much and
//! block until it arrives. The trust model accepts this. A size the allocator
//! refuses is reported as [`NetError::PayloadTooLarge`], which is terminal for
//! that connection only.

use std::io::{Read, Write};

use crate::error::{NetError, Result};
use crate::packet::{Frame, Packet, PacketHeader, PacketType};
use crate::protocol::HEADER_LEN;

/// Build the wire header: TYPE (1) | PAYLOAD_SIZE (8, LE)
pub fn encode_header(header: PacketHeader) -> [u8; HEADER_LEN] {
    let mut raw = [0u8; HEADER_LEN];
    raw[0] = header.kind.as_u8();
    raw[1..].copy_from_slice(&header.payload_size.to_le_bytes());
    raw
}

/// Parse a wire header into (type byte, payload size)
pub fn decode_header(raw: &[u8; HEADER_LEN]) -> (u8, u64) {
    let mut size = [0u8; 8];
    size.copy_from_slice(&raw[1..]);
    (raw[0], u64::from_le_bytes(size))
}

pub fn write_packet<W: Write + ?Sized>(transport: &mut W, packet: &Packet) -> Result<()> {
    transport
        .write_all(&encode_header(packet.header()))
        .map_err(NetError::Disconnected)?;
    if !packet.payload().is_empty() {
        transport
            .write_all(packet.payload())
            .map_err(NetError::Disconnected)?;
    }
    transport.flush().map_err(NetError::Disconnected)
}

pub fn write_frame<W: Write + ?Sized>(transport: &mut W, frame: Frame) -> Result<()> {
    write_packet(transport, &Packet::from(frame))
}

/// Read one packet, blocking until header and payload are complete.
///
/// The payload is consumed even when the type byte is unknown, so an
/// `UnknownPacketType` error leaves the stream aligned on the next header.
pub fn read_packet<R: Read + ?Sized>(transport: &mut R) -> Result<Packet> {
    let mut raw = [0u8; HEADER_LEN];
    transport
        .read_exact(&mut raw)
        .map_err(NetError::Disconnected)?;
    let (type_byte, payload_size) = decode_header(&raw);

    let mut payload = Vec::new();
    if payload_size > 0 {
        let len = usize::try_from(payload_size).map_err(|_| NetError::PayloadTooLarge(payload_size))?;
        payload
            .try_reserve_exact(len)
            .map_err(|_| NetError::PayloadTooLarge(payload_size))?;
        payload.resize(len, 0);
        transport
            .read_exact(&mut payload)
            .map_err(NetError::Disconnected)?;
    }

    let kind = PacketType::try_from(type_byte)?;
    Ok(Packet::from_parts(kind, payload))
}

pub fn read_frame<R: Read + ?Sized>(transport: &mut R) -> Result<Frame> {
    Frame::try_from(read_packet(transport)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{self, Cursor};

    /// Records every `write` call so tests can count data-flow operations.
    #[derive(Default)]
    struct RecordingWriter {
        writes: Vec<Vec<u8>>,
    }

    impl Write for RecordingWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.writes.push(buf.to_vec());
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "gone"))
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn packet_survives_the_wire() {
        let original = Packet::new(PacketType::FileDownloadData, &[7u8; 300]);
        let mut wire = Vec::new();
        write_packet(&mut wire, &original).unwrap();
        assert_eq!(wire.len(), HEADER_LEN + 300);

        let decoded = read_packet(&mut Cursor::new(wire)).unwrap();
        assert_eq!(decoded.kind(), PacketType::FileDownloadData);
        assert_eq!(decoded.header().payload_size, 300);
        assert_eq!(decoded.payload(), original.payload());
    }

    #[test]
    fn header_and_payload_are_separate_writes() {
        let mut writer = RecordingWriter::default();
        write_packet(&mut writer, &Packet::with_text(PacketType::Message, "hi")).unwrap();
        assert_eq!(writer.writes.len(), 2);
        assert_eq!(writer.writes[0].len(), HEADER_LEN);
        assert_eq!(writer.writes[1], b"hi\0");

        let mut writer = RecordingWriter::default();
        write_packet(&mut writer, &Packet::empty(PacketType::ListEntries)).unwrap();
        assert_eq!(writer.writes.len(), 1);
    }

    #[test]
    fn header_is_fixed_width_little_endian() {
        let raw = encode_header(PacketHeader {
            kind: PacketType::FileInfo,
            payload_size: 0x0102,
        });
        assert_eq!(raw, [4, 0x02, 0x01, 0, 0, 0, 0, 0, 0]);
        assert_eq!(decode_header(&raw), (4, 0x0102));
    }

    #[test]
    fn failed_write_reports_disconnect() {
        let err = write_packet(&mut BrokenPipe, &Packet::with_text(PacketType::Message, "x")).unwrap_err();
        assert!(err.is_disconnect());
    }

    #[test]
    fn truncated_header_reports_disconnect() {
        let err = read_packet(&mut Cursor::new(vec![0u8, 1, 2])).unwrap_err();
        assert!(err.is_disconnect());
    }

    #[test]
    fn truncated_payload_reports_disconnect() {
        let mut wire = Vec::new();
        write_packet(&mut wire, &Packet::new(PacketType::Message, &[1u8; 32])).unwrap();
        wire.truncate(HEADER_LEN + 10);
        let err = read_packet(&mut Cursor::new(wire)).unwrap_err();
        assert!(err.is_disconnect());
    }

    #[test]
    fn unallocatable_payload_size_is_an_error_not_an_abort() {
        let mut wire = vec![PacketType::Message.as_u8()];
        wire.extend_from_slice(&(1u64 << 46).to_le_bytes());
        assert!(matches!(
            read_packet(&mut Cursor::new(wire)),
            Err(NetError::PayloadTooLarge(size)) if size == 1u64 << 46
        ));
    }

    #[test]
    fn unknown_type_keeps_stream_aligned() {
        let mut wire = vec![99u8];
        wire.extend_from_slice(&3u64.to_le_bytes());
        wire.extend_from_slice(b"abc");
        write_frame(&mut wire, Frame::ListEntries).unwrap();

        let mut cursor = Cursor::new(wire);
        assert!(matches!(
            read_packet(&mut cursor),
            Err(NetError::UnknownPacketType(99))
        ));
        assert_eq!(read_frame(&mut cursor).unwrap(), Frame::ListEntries);
    }

    #[test]
    fn back_to_back_frames_decode_in_order() {
        let mut wire = Vec::new();
        write_frame(&mut wire, Frame::FileInfo { size: 5 }).unwrap();
        write_frame(&mut wire, Frame::FileDownloadData(b"hello".to_vec())).unwrap();

        let mut cursor = Cursor::new(wire);
        assert_eq!(read_frame(&mut cursor).unwrap(), Frame::FileInfo { size: 5 });
        assert_eq!(
            read_frame(&mut cursor).unwrap(),
            Frame::FileDownloadData(b"hello".to_vec())
        );
        assert!(read_frame(&mut cursor).unwrap_err().is_disconnect());
    }
}
