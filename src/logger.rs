use anyhow::Result;
use chrono::Utc;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::net::SocketAddr;
use parking_lot::Mutex;
use std::path::Path;

/// Connection event sink shared by the accept loop and every handler.
pub trait Logger: Send + Sync {
    fn accepted(&self, _id: u64, _slot: usize, _peer: Option<SocketAddr>) {}
    fn rejected(&self, _peer: Option<SocketAddr>) {}
    fn request(&self, _id: u64, _kind: &str, _detail: &str) {}
    fn download_done(&self, _id: u64, _path: &Path, _bytes: u64) {}
    fn disconnected(&self, _id: u64, _reason: &str) {}
}

pub struct NoopLogger;
impl Logger for NoopLogger {}

pub struct TextLogger {
    file: Mutex<File>,
}

impl TextLogger {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let f = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(f),
        })
    }

    fn line(&self, s: &str) {
        let mut f = self.file.lock();
        let _ = writeln!(f, "[{}] {}", Utc::now().to_rfc3339(), s);
    }
}

fn peer_str(peer: Option<SocketAddr>) -> String {
    peer.map(|p| p.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

impl Logger for TextLogger {
    fn accepted(&self, id: u64, slot: usize, peer: Option<SocketAddr>) {
        self.line(&format!("ACCEPT id={} slot={} peer={}", id, slot, peer_str(peer)));
    }
    fn rejected(&self, peer: Option<SocketAddr>) {
        self.line(&format!("REJECT peer={} reason=capacity", peer_str(peer)));
    }
    fn request(&self, id: u64, kind: &str, detail: &str) {
        self.line(&format!("REQUEST id={} kind={} detail={}", id, kind, detail));
    }
    fn download_done(&self, id: u64, path: &Path, bytes: u64) {
        self.line(&format!(
            "DOWNLOAD id={} path={} bytes={}",
            id,
            path.display(),
            bytes
        ));
    }
    fn disconnected(&self, id: u64, reason: &str) {
        self.line(&format!("CLOSE id={id} reason={reason}"));
    }
}
