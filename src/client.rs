//! Client side: a background reader thread feeds a [`PacketQueue`] that the
//! foreground command operations pop responses from.
//!
//! Only one request is ever outstanding, and the reader waits for the queue to
//! drain before handing over the next packet, so LIFO popping still observes
//! download chunks in arrival order.

use anyhow::{anyhow, bail, Context, Result};
use indicatif::ProgressBar;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, warn};

use crate::codec::{read_packet, write_frame};
use crate::error::NetError;
use crate::listing::{parse_listing, DirEntry};
use crate::packet::Frame;
use crate::queue::PacketQueue;

const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(30);

/// Result of a finished download
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Download {
    pub path: PathBuf,
    pub bytes: u64,
}

pub struct Client {
    stream: TcpStream,
    queue: Arc<PacketQueue>,
    connected: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
    response_timeout: Duration,
}

impl Client {
    pub fn connect(addr: SocketAddr) -> Result<Self> {
        let stream = TcpStream::connect(addr).with_context(|| format!("connect {}", addr))?;
        let _ = stream.set_nodelay(true);
        let read_half = stream.try_clone().context("clone socket for reader")?;

        let queue = Arc::new(PacketQueue::new());
        let connected = Arc::new(AtomicBool::new(true));
        let reader = {
            let queue = Arc::clone(&queue);
            let connected = Arc::clone(&connected);
            thread::Builder::new()
                .name("netfs-reader".into())
                .spawn(move || reader_loop(read_half, &queue, &connected))
                .context("spawn reader thread")?
        };

        Ok(Self {
            stream,
            queue,
            connected,
            reader: Some(reader),
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
        })
    }

    pub fn set_response_timeout(&mut self, timeout: Duration) {
        self.response_timeout = timeout;
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Fail if the server turns the connection away within `grace`.
    /// A server at capacity sends one Error packet and closes.
    pub fn check_admission(&self, grace: Duration) -> Result<()> {
        match self.queue.pop_timeout(grace)? {
            Some(packet) => match Frame::try_from(packet)? {
                Frame::Error(text) => bail!("server refused connection: {}", text),
                other => bail!("unexpected {} before any request", other.kind()),
            },
            None if !self.is_connected() => bail!("server closed the connection"),
            None => Ok(()),
        }
    }

    fn send(&mut self, frame: Frame) -> Result<()> {
        if !self.is_connected() {
            bail!("not connected to server");
        }
        write_frame(&mut self.stream, frame).context("send request")
    }

    /// Next response frame, waiting up to the response timeout.
    ///
    /// A timeout tears the session down: a late reply would otherwise be
    /// taken as the answer to the next request.
    fn next_frame(&self) -> Result<Frame> {
        match self.queue.pop_timeout(self.response_timeout)? {
            Some(packet) => Ok(Frame::try_from(packet)?),
            None if !self.is_connected() => bail!("connection to server lost"),
            None => {
                self.abandon_session();
                bail!(
                    "no reply from server within {}s; connection closed",
                    self.response_timeout.as_secs()
                )
            }
        }
    }

    /// Drop the connection when the reply stream can no longer be followed.
    fn abandon_session(&self) {
        warn!("closing connection; reply stream out of sync");
        let _ = self.stream.shutdown(Shutdown::Both);
    }

    pub fn list(&mut self) -> Result<Vec<DirEntry>> {
        self.send(Frame::ListEntries)?;
        match self.next_frame()? {
            Frame::Message(text) => Ok(parse_listing(&text)),
            Frame::Error(text) => bail!("server: {}", text),
            other => bail!("unexpected {} in reply to ls", other.kind()),
        }
    }

    /// Fetch `name` into `dest_dir/<basename>`. A partial file is removed on failure.
    pub fn download(&mut self, name: &str, dest_dir: &Path, progress: &ProgressBar) -> Result<Download> {
        let file_name = Path::new(name)
            .file_name()
            .ok_or_else(|| anyhow!("invalid file name: {}", name))?;
        self.send(Frame::FileDownloadRequest {
            name: name.to_string(),
        })?;

        let size = match self.next_frame()? {
            Frame::FileInfo { size } => size,
            Frame::Error(text) => bail!("server: {}", text),
            other => bail!("unexpected {} in reply to fget", other.kind()),
        };

        let dest = dest_dir.join(file_name);
        match self.receive_body(size, &dest, progress) {
            Ok(()) => Ok(Download {
                path: dest,
                bytes: size,
            }),
            Err(e) => {
                let _ = fs::remove_file(&dest);
                progress.abandon();
                Err(e)
            }
        }
    }

    /// Consume exactly `size` bytes of FileDownloadData. A local failure
    /// (create or write) stops writing but keeps draining the announced
    /// bytes, so the next request sees its own reply.
    fn receive_body(&self, size: u64, dest: &Path, progress: &ProgressBar) -> Result<()> {
        let mut local_err: Option<anyhow::Error> = None;
        let mut out = match File::create(dest) {
            Ok(file) => Some(BufWriter::new(file)),
            Err(e) => {
                local_err = Some(anyhow::Error::new(e).context(format!("create {}", dest.display())));
                None
            }
        };
        progress.set_length(size);

        let mut received: u64 = 0;
        while received < size {
            match self.next_frame()? {
                Frame::FileDownloadData(chunk) => {
                    let len = chunk.len() as u64;
                    if received + len > size {
                        self.abandon_session();
                        bail!("server sent {} bytes beyond the announced {}", received + len - size, size);
                    }
                    if let Some(w) = out.as_mut() {
                        if let Err(e) = w.write_all(&chunk) {
                            local_err = Some(anyhow::Error::new(e).context(format!("write {}", dest.display())));
                            out = None;
                        }
                    }
                    received += len;
                    progress.set_position(received);
                }
                Frame::Error(text) => bail!("server aborted download: {}", text),
                other => {
                    self.abandon_session();
                    bail!("unexpected {} during download", other.kind());
                }
            }
        }
        if let Some(e) = local_err {
            return Err(e);
        }
        if let Some(mut w) = out {
            w.flush().with_context(|| format!("flush {}", dest.display()))?;
        }
        progress.finish();
        Ok(())
    }

    /// Announce an upload of `local` (name + size). The server does not
    /// accept the data phase, so nothing further is sent.
    pub fn announce_upload(&mut self, local: &Path) -> Result<u64> {
        let size = fs::metadata(local)
            .with_context(|| format!("stat {}", local.display()))?
            .len();
        let name = local
            .file_name()
            .ok_or_else(|| anyhow!("invalid file name: {}", local.display()))?
            .to_string_lossy()
            .into_owned();
        self.send(Frame::FileUploadRequest { name, size })?;
        Ok(size)
    }

    pub fn send_message(&mut self, text: &str) -> Result<()> {
        self.send(Frame::Message(text.to_string()))
    }

    /// Frames that arrived without a pending request.
    pub fn drain_pending(&self) -> Vec<Frame> {
        let mut frames = Vec::new();
        while let Ok(Some(packet)) = self.queue.try_pop() {
            match Frame::try_from(packet) {
                Ok(frame) => frames.push(frame),
                Err(e) => warn!(error = %e, "dropping undecodable packet"),
            }
        }
        frames
    }

    /// Half-close, then tear down the connection and join the reader.
    pub fn close(self) {
        drop(self);
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        let _ = self.stream.shutdown(Shutdown::Write);
        let _ = self.stream.shutdown(Shutdown::Both);
        self.queue.close();
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
    }
}

fn reader_loop(mut stream: TcpStream, queue: &PacketQueue, connected: &AtomicBool) {
    loop {
        let packet = match read_packet(&mut stream) {
            Ok(packet) => packet,
            Err(NetError::UnknownPacketType(t)) => {
                warn!(type_byte = t, "skipping packet of unknown type");
                continue;
            }
            Err(e) => {
                debug!(error = %e, "reader stopping");
                break;
            }
        };
        // One undelivered packet at a time keeps LIFO popping in arrival order
        if queue.wait_until_empty().is_err() || queue.is_closed() {
            break;
        }
        if let Err(e) = queue.try_add(packet) {
            warn!(error = %e, "reader cannot hand off packet");
            break;
        }
    }
    connected.store(false, Ordering::Release);
    queue.close();
}
