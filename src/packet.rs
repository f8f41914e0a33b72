//! Packet model: raw header + payload framing unit, and the decoded `Frame`
//! view that callers dispatch on.

use std::fmt;

use crate::error::NetError;
use crate::protocol::{packet_type, SIZE_FIELD_LEN};

/// Closed set of packet kinds carried in the header type byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketType {
    Message,
    Error,
    ListEntries,
    RemoveEntry,
    FileInfo,
    FileDownloadRequest,
    FileUploadRequest,
    FileDownloadData,
    FileUploadData,
    /// Sentinel; never a legitimate packet on the wire.
    None,
}

impl PacketType {
    pub fn as_u8(self) -> u8 {
        match self {
            PacketType::Message => packet_type::MESSAGE,
            PacketType::Error => packet_type::ERROR,
            PacketType::ListEntries => packet_type::LIST_ENTRIES,
            PacketType::RemoveEntry => packet_type::REMOVE_ENTRY,
            PacketType::FileInfo => packet_type::FILE_INFO,
            PacketType::FileDownloadRequest => packet_type::FILE_DOWNLOAD_REQUEST,
            PacketType::FileUploadRequest => packet_type::FILE_UPLOAD_REQUEST,
            PacketType::FileDownloadData => packet_type::FILE_DOWNLOAD_DATA,
            PacketType::FileUploadData => packet_type::FILE_UPLOAD_DATA,
            PacketType::None => packet_type::NONE,
        }
    }
}

impl TryFrom<u8> for PacketType {
    type Error = NetError;

    fn try_from(value: u8) -> Result<Self, NetError> {
        let kind = match value {
            packet_type::MESSAGE => PacketType::Message,
            packet_type::ERROR => PacketType::Error,
            packet_type::LIST_ENTRIES => PacketType::ListEntries,
            packet_type::REMOVE_ENTRY => PacketType::RemoveEntry,
            packet_type::FILE_INFO => PacketType::FileInfo,
            packet_type::FILE_DOWNLOAD_REQUEST => PacketType::FileDownloadRequest,
            packet_type::FILE_UPLOAD_REQUEST => PacketType::FileUploadRequest,
            packet_type::FILE_DOWNLOAD_DATA => PacketType::FileDownloadData,
            packet_type::FILE_UPLOAD_DATA => PacketType::FileUploadData,
            packet_type::NONE => PacketType::None,
            other => return Err(NetError::UnknownPacketType(other)),
        };
        Ok(kind)
    }
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Fixed-size packet header. `payload_size` always equals the payload length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub kind: PacketType,
    pub payload_size: u64,
}

/// A typed, length-prefixed message unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    header: PacketHeader,
    payload: Vec<u8>,
}

impl Packet {
    /// Build a packet owning a copy of `payload`.
    pub fn new(kind: PacketType, payload: &[u8]) -> Self {
        Self::from_parts(kind, payload.to_vec())
    }

    pub fn empty(kind: PacketType) -> Self {
        Self::from_parts(kind, Vec::new())
    }

    /// Packet whose payload is `text` followed by a NUL terminator.
    pub fn with_text(kind: PacketType, text: &str) -> Self {
        let mut payload = Vec::with_capacity(text.len() + 1);
        payload.extend_from_slice(text.as_bytes());
        payload.push(0);
        Self::from_parts(kind, payload)
    }

    pub(crate) fn from_parts(kind: PacketType, payload: Vec<u8>) -> Self {
        Self {
            header: PacketHeader {
                kind,
                payload_size: payload.len() as u64,
            },
            payload,
        }
    }

    /// Extend the payload in place, keeping the header size in step.
    pub fn append(&mut self, bytes: &[u8]) {
        self.payload.extend_from_slice(bytes);
        self.header.payload_size = self.payload.len() as u64;
    }

    pub fn header(&self) -> PacketHeader {
        self.header
    }

    pub fn kind(&self) -> PacketType {
        self.header.kind
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }
}

/// Decoded view of a packet; each variant carries only what its type needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Message(String),
    Error(String),
    ListEntries,
    RemoveEntry,
    FileInfo { size: u64 },
    FileDownloadRequest { name: String },
    FileUploadRequest { name: String, size: u64 },
    FileDownloadData(Vec<u8>),
    FileUploadData(Vec<u8>),
}

impl Frame {
    pub fn kind(&self) -> PacketType {
        match self {
            Frame::Message(_) => PacketType::Message,
            Frame::Error(_) => PacketType::Error,
            Frame::ListEntries => PacketType::ListEntries,
            Frame::RemoveEntry => PacketType::RemoveEntry,
            Frame::FileInfo { .. } => PacketType::FileInfo,
            Frame::FileDownloadRequest { .. } => PacketType::FileDownloadRequest,
            Frame::FileUploadRequest { .. } => PacketType::FileUploadRequest,
            Frame::FileDownloadData(_) => PacketType::FileDownloadData,
            Frame::FileUploadData(_) => PacketType::FileUploadData,
        }
    }
}

impl From<Frame> for Packet {
    fn from(frame: Frame) -> Packet {
        match frame {
            Frame::Message(text) => Packet::with_text(PacketType::Message, &text),
            Frame::Error(text) => Packet::with_text(PacketType::Error, &text),
            Frame::ListEntries => Packet::empty(PacketType::ListEntries),
            Frame::RemoveEntry => Packet::empty(PacketType::RemoveEntry),
            Frame::FileInfo { size } => Packet::new(PacketType::FileInfo, &size.to_le_bytes()),
            Frame::FileDownloadRequest { name } => {
                Packet::with_text(PacketType::FileDownloadRequest, &name)
            }
            Frame::FileUploadRequest { name, size } => {
                let mut packet = Packet::with_text(PacketType::FileUploadRequest, &name);
                packet.append(&size.to_le_bytes());
                packet
            }
            Frame::FileDownloadData(data) => Packet::from_parts(PacketType::FileDownloadData, data),
            Frame::FileUploadData(data) => Packet::from_parts(PacketType::FileUploadData, data),
        }
    }
}

impl TryFrom<Packet> for Frame {
    type Error = NetError;

    fn try_from(packet: Packet) -> Result<Self, NetError> {
        let kind = packet.kind();
        let payload = packet.into_payload();
        let frame = match kind {
            PacketType::Message => Frame::Message(nul_terminated_text(&payload).0),
            PacketType::Error => Frame::Error(nul_terminated_text(&payload).0),
            PacketType::ListEntries => Frame::ListEntries,
            PacketType::RemoveEntry => Frame::RemoveEntry,
            PacketType::FileInfo => Frame::FileInfo {
                size: size_field(&payload).ok_or(NetError::Malformed("FileInfo needs an 8-byte size"))?,
            },
            PacketType::FileDownloadRequest => Frame::FileDownloadRequest {
                name: file_name(&payload)?.0,
            },
            PacketType::FileUploadRequest => {
                let (name, rest) = file_name(&payload)?;
                let size = size_field(rest)
                    .ok_or(NetError::Malformed("FileUploadRequest needs a trailing 8-byte size"))?;
                Frame::FileUploadRequest { name, size }
            }
            PacketType::FileDownloadData => Frame::FileDownloadData(payload),
            PacketType::FileUploadData => Frame::FileUploadData(payload),
            PacketType::None => return Err(NetError::Malformed("sentinel packet type on the wire")),
        };
        Ok(frame)
    }
}

/// Split at the first NUL; a missing terminator takes the whole buffer.
fn nul_terminated_text(bytes: &[u8]) -> (String, &[u8]) {
    match bytes.iter().position(|&b| b == 0) {
        Some(end) => (
            String::from_utf8_lossy(&bytes[..end]).into_owned(),
            &bytes[end + 1..],
        ),
        None => (String::from_utf8_lossy(bytes).into_owned(), &[]),
    }
}

fn file_name(bytes: &[u8]) -> Result<(String, &[u8]), NetError> {
    let (name, rest) = nul_terminated_text(bytes);
    if name.is_empty() {
        return Err(NetError::Malformed("empty file name"));
    }
    Ok((name, rest))
}

fn size_field(bytes: &[u8]) -> Option<u64> {
    let raw: [u8; SIZE_FIELD_LEN] = bytes.try_into().ok()?;
    Some(u64::from_le_bytes(raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_keeps_header_size_in_step() {
        let mut packet = Packet::with_text(PacketType::FileUploadRequest, "a.bin");
        assert_eq!(packet.header().payload_size, 6);
        packet.append(&42u64.to_le_bytes());
        assert_eq!(packet.header().payload_size, 14);
        assert_eq!(packet.payload().len(), 14);
        packet.append(&[]);
        assert_eq!(packet.header().payload_size, 14);
    }

    #[test]
    fn empty_packet_has_no_payload() {
        let packet = Packet::empty(PacketType::ListEntries);
        assert_eq!(packet.header().payload_size, 0);
        assert!(packet.payload().is_empty());
    }

    #[test]
    fn type_byte_mapping_is_stable() {
        for value in 0..=packet_type::NONE {
            let kind = PacketType::try_from(value).unwrap();
            assert_eq!(kind.as_u8(), value);
        }
        assert!(matches!(
            PacketType::try_from(200),
            Err(NetError::UnknownPacketType(200))
        ));
    }

    #[test]
    fn upload_request_layout_is_name_nul_then_size() {
        let packet = Packet::from(Frame::FileUploadRequest {
            name: "report.pdf".into(),
            size: 1234,
        });
        let payload = packet.payload();
        assert_eq!(&payload[..10], b"report.pdf");
        assert_eq!(payload[10], 0);
        assert_eq!(&payload[11..], &1234u64.to_le_bytes());

        match Frame::try_from(packet).unwrap() {
            Frame::FileUploadRequest { name, size } => {
                assert_eq!(name, "report.pdf");
                assert_eq!(size, 1234);
            }
            other => panic!("unexpected frame {:?}", other),
        }
    }

    #[test]
    fn file_info_requires_exact_size_field() {
        let short = Packet::new(PacketType::FileInfo, &[1, 2, 3]);
        assert!(matches!(Frame::try_from(short), Err(NetError::Malformed(_))));
    }

    #[test]
    fn download_request_rejects_empty_name() {
        let packet = Packet::new(PacketType::FileDownloadRequest, &[0]);
        assert!(Frame::try_from(packet).is_err());
    }

    #[test]
    fn sentinel_type_never_decodes() {
        assert!(Frame::try_from(Packet::empty(PacketType::None)).is_err());
    }

    #[test]
    fn message_without_terminator_is_accepted() {
        let packet = Packet::new(PacketType::Message, b"hello");
        assert_eq!(Frame::try_from(packet).unwrap(), Frame::Message("hello".into()));
    }
}
