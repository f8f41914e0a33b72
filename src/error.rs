use std::io;

/// Convenience result for the framing layer.
pub type Result<T> = std::result::Result<T, NetError>;

/// Failures at the packet framing boundary.
#[derive(thiserror::Error, Debug)]
pub enum NetError {
    /// A read or write on the transport failed or hit EOF; the peer is gone.
    #[error("peer disconnected: {0}")]
    Disconnected(#[source] io::Error),
    /// Header carried a type byte outside the known vocabulary.
    #[error("unknown packet type {0}")]
    UnknownPacketType(u8),
    /// Announced payload does not fit in this host's address space.
    #[error("payload of {0} bytes cannot be buffered on this host")]
    PayloadTooLarge(u64),
    /// Payload does not match the layout its type requires.
    #[error("malformed packet: {0}")]
    Malformed(&'static str),
}

impl NetError {
    /// True when the connection must be torn down.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, NetError::Disconnected(_))
    }
}

/// PacketQueue failures.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    /// Another thread panicked while holding the queue lock.
    #[error("packet queue lock is poisoned")]
    Poisoned,
}

/// Rejections raised while turning an input line into a command.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("`{0}` requires a file name")]
    MissingArgument(&'static str),
    #[error("`{0}` takes a single file name")]
    TooManyArguments(&'static str),
}
