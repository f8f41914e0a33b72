//! Client-side hand-off buffer between the background socket reader and the
//! interactive command loop.
//!
//! Ordering is LIFO: `try_pop` returns the most recently added packet. Callers
//! that correlate responses must keep at most one packet in flight, which the
//! client's reader guarantees by waiting in [`PacketQueue::wait_until_empty`]
//! before each hand-off.

use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::Duration;

use crate::error::QueueError;
use crate::packet::Packet;
use crate::protocol::QUEUE_INITIAL_CAPACITY;

struct Inner {
    packets: Vec<Packet>,
    // Tracked separately so growth follows an exact doubling policy.
    capacity: usize,
    closed: bool,
}

pub struct PacketQueue {
    inner: Mutex<Inner>,
    changed: Condvar,
}

impl PacketQueue {
    pub fn new() -> Self {
        Self::with_capacity(QUEUE_INITIAL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(Inner {
                packets: Vec::with_capacity(capacity),
                capacity,
                closed: false,
            }),
            changed: Condvar::new(),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, QueueError> {
        self.inner.lock().map_err(|_| QueueError::Poisoned)
    }

    /// Append a packet, doubling the backing capacity when full. Never waits for space.
    pub fn try_add(&self, packet: Packet) -> Result<(), QueueError> {
        let mut inner = self.lock()?;
        if inner.packets.len() == inner.capacity {
            inner.capacity *= 2;
            let additional = inner.capacity - inner.packets.len();
            inner.packets.reserve_exact(additional);
        }
        inner.packets.push(packet);
        drop(inner);
        self.changed.notify_all();
        Ok(())
    }

    /// Remove the most recently added packet, or `None` when empty.
    pub fn try_pop(&self) -> Result<Option<Packet>, QueueError> {
        let mut inner = self.lock()?;
        let packet = inner.packets.pop();
        drop(inner);
        if packet.is_some() {
            self.changed.notify_all();
        }
        Ok(packet)
    }

    /// Like `try_pop`, but waits up to `timeout` for a packet to arrive.
    pub fn pop_timeout(&self, timeout: Duration) -> Result<Option<Packet>, QueueError> {
        let inner = self.lock()?;
        let (mut inner, _) = self
            .changed
            .wait_timeout_while(inner, timeout, |i| i.packets.is_empty() && !i.closed)
            .map_err(|_| QueueError::Poisoned)?;
        let packet = inner.packets.pop();
        drop(inner);
        if packet.is_some() {
            self.changed.notify_all();
        }
        Ok(packet)
    }

    /// Block until every queued packet has been popped or the queue is closed.
    pub fn wait_until_empty(&self) -> Result<(), QueueError> {
        let inner = self.lock()?;
        let _inner = self
            .changed
            .wait_while(inner, |i| !i.packets.is_empty() && !i.closed)
            .map_err(|_| QueueError::Poisoned)?;
        Ok(())
    }

    /// Wake every waiter; subsequent waits return immediately.
    pub fn close(&self) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.closed = true;
        }
        self.changed.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().map(|i| i.closed).unwrap_or(true)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|i| i.packets.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current slot capacity; grows by doubling and never shrinks.
    pub fn capacity(&self) -> usize {
        self.inner.lock().map(|i| i.capacity).unwrap_or(0)
    }
}

impl Default for PacketQueue {
    fn default() -> Self {
        Self::new()
    }
}
