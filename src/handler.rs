//! Per-connection protocol loop.
//!
//! One handler thread owns one accepted stream until the peer goes away. It
//! processes each request to completion before reading the next, so replies
//! on a connection are never interleaved.

use std::fs::File;
use std::io::{ErrorKind, Read, Write};
use std::net::TcpStream;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::codec::{read_packet, write_frame, write_packet};
use crate::error::NetError;
use crate::listing::{format_listing, list_directory};
use crate::packet::{Frame, Packet, PacketType};
use crate::paths::resolve_under_root;
use crate::pool::SlotLease;
use crate::protocol::messages;
use crate::server::ServerContext;

pub struct ConnectionHandler {
    // Field order matters: the stream is closed before the lease posts the
    // slot back to the pool.
    stream: TcpStream,
    lease: SlotLease,
    ctx: Arc<ServerContext>,
}

impl ConnectionHandler {
    pub fn new(stream: TcpStream, lease: SlotLease, ctx: Arc<ServerContext>) -> Self {
        Self { stream, lease, ctx }
    }

    /// Serve until the transport fails, then release the slot.
    pub fn run(mut self) {
        let id = self.lease.id();
        let reason = match self.serve() {
            Ok(()) => "peer closed".to_string(),
            Err(NetError::Disconnected(e)) if e.kind() == ErrorKind::UnexpectedEof => {
                "peer closed".to_string()
            }
            Err(e) => e.to_string(),
        };
        info!(id, slot = self.lease.slot(), %reason, "connection closed");
        self.ctx.logger.disconnected(id, &reason);
    }

    fn serve(&mut self) -> Result<(), NetError> {
        let id = self.lease.id();
        loop {
            let packet = match read_packet(&mut self.stream) {
                Ok(packet) => packet,
                Err(NetError::UnknownPacketType(t)) => {
                    warn!(id, type_byte = t, "unknown packet type");
                    write_frame(
                        &mut self.stream,
                        Frame::Error(format!("Unsupported packet type: {}", t)),
                    )?;
                    continue;
                }
                Err(e) => return Err(e),
            };
            respond(&self.ctx, id, packet, &mut self.stream)?;
        }
    }
}

/// Dispatch one request and write its replies (zero, one or many packets).
/// Only transport failures are returned; everything else is reported to the
/// peer as an `Error` packet.
pub fn respond<W: Write + ?Sized>(
    ctx: &ServerContext,
    id: u64,
    packet: Packet,
    out: &mut W,
) -> Result<(), NetError> {
    let kind = packet.kind();
    debug!(id, %kind, size = packet.header().payload_size, "request");

    if matches!(
        kind,
        PacketType::RemoveEntry
            | PacketType::FileInfo
            | PacketType::FileDownloadData
            | PacketType::Error
            | PacketType::None
    ) {
        warn!(id, %kind, "client sent a packet type it must not send");
        return write_frame(out, Frame::Error(format!("Unsupported packet type: {}", kind)));
    }

    let frame = match Frame::try_from(packet) {
        Ok(frame) => frame,
        Err(e) => {
            warn!(id, %kind, error = %e, "rejecting request");
            return write_frame(out, Frame::Error(e.to_string()));
        }
    };

    match frame {
        Frame::ListEntries => {
            ctx.logger.request(id, "ListEntries", "");
            send_listing(ctx, id, out)
        }
        Frame::FileDownloadRequest { name } => {
            ctx.logger.request(id, "FileDownloadRequest", &name);
            send_file(ctx, id, &name, out)
        }
        Frame::FileUploadRequest { name, size } => {
            // Announcement only; the data phase has no receiving side yet.
            info!(id, %name, size, "upload announced");
            ctx.logger
                .request(id, "FileUploadRequest", &format!("{} size={}", name, size));
            Ok(())
        }
        Frame::FileUploadData(data) => {
            warn!(id, bytes = data.len(), "dropping upload data; no upload in progress");
            Ok(())
        }
        Frame::Message(text) => {
            info!(id, "message: {}", text);
            ctx.logger.request(id, "Message", &text);
            Ok(())
        }
        other => write_frame(
            out,
            Frame::Error(format!("Unsupported packet type: {}", other.kind())),
        ),
    }
}

fn send_listing<W: Write + ?Sized>(ctx: &ServerContext, id: u64, out: &mut W) -> Result<(), NetError> {
    match list_directory(&ctx.root) {
        Ok(entries) => {
            debug!(id, entries = entries.len(), "listing");
            write_frame(out, Frame::Message(format_listing(&entries)))
        }
        Err(e) => {
            warn!(id, error = %e, "listing failed");
            write_frame(out, Frame::Error(format!("{:#}", e)))
        }
    }
}

fn send_file<W: Write + ?Sized>(
    ctx: &ServerContext,
    id: u64,
    name: &str,
    out: &mut W,
) -> Result<(), NetError> {
    let opened = resolve_under_root(&ctx.root, name)
        .ok()
        .filter(|p| p.is_file())
        .and_then(|p| {
            let file = File::open(&p).ok()?;
            let size = file.metadata().ok()?.len();
            Some((p, file, size))
        });
    let Some((path, mut file, size)) = opened else {
        info!(id, %name, "download of missing file");
        return write_frame(out, Frame::Error(messages::FILE_NOT_FOUND.to_string()));
    };

    write_frame(out, Frame::FileInfo { size })?;

    if stream_body(id, &mut file, size, ctx.chunk_size, out)? {
        info!(id, path = %path.display(), bytes = size, "download complete");
        ctx.logger.download_done(id, &path, size);
    }
    Ok(())
}

/// Send exactly `size` bytes of `source` as FileDownloadData packets.
/// A read failure or early EOF ends the stream with an `Error` packet and
/// returns `Ok(false)`; the connection stays aligned on packet boundaries.
fn stream_body<R: Read + ?Sized, W: Write + ?Sized>(
    id: u64,
    source: &mut R,
    size: u64,
    chunk_size: usize,
    out: &mut W,
) -> Result<bool, NetError> {
    let mut buf = vec![0u8; chunk_size.max(1)];
    let mut sent: u64 = 0;
    while sent < size {
        let want = (size - sent).min(buf.len() as u64) as usize;
        let n = match source.read(&mut buf[..want]) {
            Ok(0) => {
                warn!(id, sent, size, "file shrank during download");
                write_frame(
                    out,
                    Frame::Error("File read failed: unexpected end of file".to_string()),
                )?;
                return Ok(false);
            }
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                warn!(id, sent, error = %e, "file read failed");
                write_frame(out, Frame::Error(format!("File read failed: {}", e)))?;
                return Ok(false);
            }
        };
        write_packet(out, &Packet::new(PacketType::FileDownloadData, &buf[..n]))?;
        sent += n as u64;
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::read_frame;
    use crate::logger::NoopLogger;
    use std::fs;
    use std::io::Cursor;
    use tempfile::TempDir;

    fn context(root: &TempDir, chunk_size: usize) -> ServerContext {
        ServerContext {
            root: root.path().canonicalize().unwrap(),
            chunk_size,
            logger: Arc::new(NoopLogger),
        }
    }

    fn replies(ctx: &ServerContext, frame: Frame) -> Vec<Frame> {
        let mut out = Vec::new();
        respond(ctx, 0, Packet::from(frame), &mut out).unwrap();
        let mut cursor = Cursor::new(out);
        let mut frames = Vec::new();
        while let Ok(frame) = read_frame(&mut cursor) {
            frames.push(frame);
        }
        frames
    }

    #[test]
    fn missing_file_yields_single_error() {
        let root = TempDir::new().unwrap();
        let ctx = context(&root, 4);
        let frames = replies(
            &ctx,
            Frame::FileDownloadRequest {
                name: "ghost.txt".into(),
            },
        );
        assert_eq!(frames, vec![Frame::Error("File not found".into())]);
    }

    #[test]
    fn download_streams_exactly_the_file_size() {
        let root = TempDir::new().unwrap();
        let content: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
        fs::write(root.path().join("data.bin"), &content).unwrap();
        let ctx = context(&root, 300);

        let frames = replies(
            &ctx,
            Frame::FileDownloadRequest {
                name: "data.bin".into(),
            },
        );
        assert_eq!(frames[0], Frame::FileInfo { size: 1000 });
        let mut received = Vec::new();
        for frame in &frames[1..] {
            match frame {
                Frame::FileDownloadData(chunk) => {
                    assert!(chunk.len() <= 300);
                    received.extend_from_slice(chunk);
                }
                other => panic!("unexpected frame {:?}", other),
            }
        }
        assert_eq!(frames.len(), 1 + 4);
        assert_eq!(received, content);
    }

    #[test]
    fn empty_file_sends_info_only() {
        let root = TempDir::new().unwrap();
        fs::write(root.path().join("empty"), b"").unwrap();
        let ctx = context(&root, 16);
        let frames = replies(
            &ctx,
            Frame::FileDownloadRequest {
                name: "empty".into(),
            },
        );
        assert_eq!(frames, vec![Frame::FileInfo { size: 0 }]);
    }

    /// Yields `good` bytes, then fails every read.
    struct FailingReader {
        good: usize,
    }

    impl Read for FailingReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.good == 0 {
                return Err(std::io::Error::new(ErrorKind::Other, "disk on fire"));
            }
            let n = self.good.min(buf.len());
            buf[..n].fill(b'x');
            self.good -= n;
            Ok(n)
        }
    }

    fn frames_of(wire: Vec<u8>) -> Vec<Frame> {
        let mut cursor = Cursor::new(wire);
        let mut frames = Vec::new();
        while let Ok(frame) = read_frame(&mut cursor) {
            frames.push(frame);
        }
        frames
    }

    #[test]
    fn read_error_mid_stream_ends_with_error_packet() {
        let mut out = Vec::new();
        let complete =
            stream_body(0, &mut FailingReader { good: 6 }, 100, 4, &mut out).unwrap();
        assert!(!complete);

        let frames = frames_of(out);
        assert_eq!(
            frames[..2],
            [
                Frame::FileDownloadData(b"xxxx".to_vec()),
                Frame::FileDownloadData(b"xx".to_vec()),
            ]
        );
        assert_eq!(frames.len(), 3);
        assert!(matches!(&frames[2], Frame::Error(text) if text.contains("disk on fire")));
    }

    #[test]
    fn file_shrinking_after_info_ends_with_error_packet() {
        let mut out = Vec::new();
        let mut shrunk = Cursor::new(vec![7u8; 5]);
        assert!(!stream_body(0, &mut shrunk, 12, 4, &mut out).unwrap());

        let frames = frames_of(out);
        assert_eq!(
            frames,
            vec![
                Frame::FileDownloadData(vec![7; 4]),
                Frame::FileDownloadData(vec![7; 1]),
                Frame::Error("File read failed: unexpected end of file".into()),
            ]
        );
    }

    #[test]
    fn directories_and_escapes_are_not_found() {
        let root = TempDir::new().unwrap();
        fs::create_dir(root.path().join("sub")).unwrap();
        let ctx = context(&root, 16);
        for name in ["sub", "../outside", "/etc/passwd"] {
            let frames = replies(&ctx, Frame::FileDownloadRequest { name: name.into() });
            assert_eq!(frames, vec![Frame::Error("File not found".into())], "{}", name);
        }
    }

    #[test]
    fn listing_reports_files_and_directories() {
        let root = TempDir::new().unwrap();
        fs::write(root.path().join("a.txt"), b"0123456789").unwrap();
        fs::create_dir(root.path().join("sub")).unwrap();
        let ctx = context(&root, 16);

        let frames = replies(&ctx, Frame::ListEntries);
        assert_eq!(frames.len(), 1);
        let Frame::Message(text) = &frames[0] else {
            panic!("expected Message, got {:?}", frames[0]);
        };
        let lines: Vec<&str> = text.split('\n').collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "0, f, 10, a.txt");
        assert!(lines[1].starts_with("1, d, "));
        assert!(lines[1].ends_with(", sub"));
    }

    #[test]
    fn upload_announcement_and_messages_get_no_reply() {
        let root = TempDir::new().unwrap();
        let ctx = context(&root, 16);
        assert!(replies(
            &ctx,
            Frame::FileUploadRequest {
                name: "up.bin".into(),
                size: 10
            }
        )
        .is_empty());
        assert!(replies(&ctx, Frame::Message("hello".into())).is_empty());
        assert!(replies(&ctx, Frame::FileUploadData(vec![1, 2, 3])).is_empty());
    }

    #[test]
    fn server_only_types_are_refused() {
        let root = TempDir::new().unwrap();
        let ctx = context(&root, 16);
        let frames = replies(&ctx, Frame::RemoveEntry);
        assert_eq!(
            frames,
            vec![Frame::Error("Unsupported packet type: RemoveEntry".into())]
        );
        let frames = replies(&ctx, Frame::FileInfo { size: 3 });
        assert_eq!(frames.len(), 1);
        assert!(matches!(frames[0], Frame::Error(_)));
    }

    #[test]
    fn malformed_request_is_reported_not_fatal() {
        let root = TempDir::new().unwrap();
        let ctx = context(&root, 16);
        let mut out = Vec::new();
        let bad = Packet::new(PacketType::FileUploadRequest, b"name\0short");
        respond(&ctx, 0, bad, &mut out).unwrap();
        let frame = read_frame(&mut Cursor::new(out)).unwrap();
        assert!(matches!(frame, Frame::Error(text) if text.starts_with("malformed packet")));
    }
}
