//! Shared protocol constants for the NetFS packet transport

// Header layout: TYPE (1) | PAYLOAD_SIZE (8, little-endian)
pub const HEADER_LEN: usize = 1 + 8;

// Width of the trailing size field in FileInfo / FileUploadRequest payloads
pub const SIZE_FIELD_LEN: usize = 8;

// Default number of connection slots on the server
pub const DEFAULT_MAX_CONNECTIONS: usize = 256;

// Default FileDownloadData payload size (64KiB)
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

// PacketQueue starts with room for this many packets and doubles on demand
pub const QUEUE_INITIAL_CAPACITY: usize = 8;

// Packet type IDs (keep numeric stable for wire compat)
pub mod packet_type {
    pub const MESSAGE: u8 = 0;
    pub const ERROR: u8 = 1;
    pub const LIST_ENTRIES: u8 = 2;
    pub const REMOVE_ENTRY: u8 = 3; // reserved, never handled
    pub const FILE_INFO: u8 = 4;
    pub const FILE_DOWNLOAD_REQUEST: u8 = 5;
    pub const FILE_UPLOAD_REQUEST: u8 = 6;
    pub const FILE_DOWNLOAD_DATA: u8 = 7;
    pub const FILE_UPLOAD_DATA: u8 = 8;
    pub const NONE: u8 = 9;
}

// Human-readable texts carried in Error packets
pub mod messages {
    pub const FILE_NOT_FOUND: &str = "File not found";
    pub const CAPACITY_EXCEEDED: &str = "Server capacity exceeded";
}
