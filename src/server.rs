//! Accept loop: admits each connection into the slot pool or rejects it.

use anyhow::{Context, Result};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::path::PathBuf;
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use std::thread;

use tracing::{error, info, warn};

use crate::codec::write_frame;
use crate::config::ServerConfig;
use crate::handler::ConnectionHandler;
use crate::logger::Logger;
use crate::packet::Frame;
use crate::pool::SlotPool;
use crate::protocol::messages;

/// Read-only state shared with every handler at spawn time.
pub struct ServerContext {
    /// Canonical served directory
    pub root: PathBuf,
    pub chunk_size: usize,
    pub logger: Arc<dyn Logger>,
}

pub struct Server {
    listener: TcpListener,
    pool: SlotPool,
    ctx: Arc<ServerContext>,
}

impl Server {
    pub fn bind(config: &ServerConfig, logger: Arc<dyn Logger>) -> Result<Self> {
        config.validate()?;
        let addr = config.bind_addr()?;
        let root = std::fs::canonicalize(&config.root)
            .with_context(|| format!("Failed to canonicalize root path: {}", config.root.display()))?;
        let listener = TcpListener::bind(&addr).with_context(|| format!("bind {}", addr))?;
        Ok(Self {
            listener,
            pool: SlotPool::new(config.max_connections),
            ctx: Arc::new(ServerContext {
                root,
                chunk_size: config.chunk_size,
                logger,
            }),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Live connection count for observers on other threads.
    pub fn active_connections(&self) -> Arc<AtomicUsize> {
        self.pool.active_counter()
    }

    pub fn root(&self) -> &std::path::Path {
        &self.ctx.root
    }

    /// Run the accept loop. Only returns if the listener itself fails.
    pub fn run(mut self) -> Result<()> {
        info!(
            addr = %self.local_addr()?,
            root = %self.ctx.root.display(),
            slots = self.pool.capacity(),
            "netfsd listening"
        );
        loop {
            match self.listener.accept() {
                Ok((stream, peer)) => self.admit(stream, peer),
                Err(e) => {
                    // Transient (e.g. EMFILE, aborted handshake); keep serving
                    warn!(error = %e, "accept error");
                }
            }
        }
    }

    fn admit(&mut self, stream: TcpStream, peer: SocketAddr) {
        let Some(lease) = self.pool.acquire() else {
            warn!(%peer, active = self.pool.active(), "capacity exceeded, rejecting");
            self.ctx.logger.rejected(Some(peer));
            reject(stream);
            return;
        };
        let _ = stream.set_nodelay(true);

        let id = lease.id();
        let slot = lease.slot();
        info!(id, slot, %peer, "connection accepted");
        self.ctx.logger.accepted(id, slot, Some(peer));

        let handler = ConnectionHandler::new(stream, lease, Arc::clone(&self.ctx));
        let spawned = thread::Builder::new()
            .name(format!("netfs-conn-{}", id))
            .spawn(move || handler.run());
        match spawned {
            Ok(handle) => self.pool.attach(slot, handle),
            // The closure (and its lease) was dropped, so the slot is already posted back
            Err(e) => error!(id, error = %e, "failed to spawn connection handler"),
        }
    }
}

/// Tell the peer why it is being turned away, then close.
fn reject(mut stream: TcpStream) {
    if let Err(e) = write_frame(
        &mut stream,
        Frame::Error(messages::CAPACITY_EXCEEDED.to_string()),
    ) {
        warn!(error = %e, "could not deliver capacity notice");
    }
    let _ = stream.shutdown(Shutdown::Both);
}
