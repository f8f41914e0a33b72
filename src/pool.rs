//! Fixed-capacity connection slot pool.
//!
//! The accept loop is the only writer of slot state. A handler holds a
//! [`SlotLease`]; dropping the lease (normal exit, error or panic) posts the
//! slot index back over a channel, and the pool reclaims every posted slot
//! before it scans for a free one.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;

use tracing::warn;

enum Slot {
    Free,
    Busy {
        id: u64,
        handle: Option<JoinHandle<()>>,
    },
}

/// Proof of slot ownership handed to a connection handler.
#[derive(Debug)]
pub struct SlotLease {
    slot: usize,
    id: u64,
    released: Sender<usize>,
    active: Arc<AtomicUsize>,
}

impl SlotLease {
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Connection id, assigned monotonically at acceptance.
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for SlotLease {
    fn drop(&mut self) {
        // Post before decrementing so a reader of the counter never sees a
        // freed slot that the pool cannot reclaim yet.
        let _ = self.released.send(self.slot);
        self.active.fetch_sub(1, Ordering::AcqRel);
    }
}

pub struct SlotPool {
    slots: Vec<Slot>,
    next_id: u64,
    active: Arc<AtomicUsize>,
    released_tx: Sender<usize>,
    released_rx: Receiver<usize>,
}

impl SlotPool {
    pub fn new(capacity: usize) -> Self {
        let (released_tx, released_rx) = mpsc::channel();
        Self {
            slots: (0..capacity).map(|_| Slot::Free).collect(),
            next_id: 0,
            active: Arc::new(AtomicUsize::new(0)),
            released_tx,
            released_rx,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Live connection count, readable from any thread.
    pub fn active_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.active)
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    /// Free every slot whose lease has been dropped. Returns how many were reclaimed.
    pub fn reclaim(&mut self) -> usize {
        let mut reclaimed = 0;
        while let Ok(index) = self.released_rx.try_recv() {
            let Some(slot) = self.slots.get_mut(index) else {
                continue;
            };
            if let Slot::Busy { id, handle } = std::mem::replace(slot, Slot::Free) {
                if let Some(handle) = handle {
                    if handle.join().is_err() {
                        warn!(id, slot = index, "connection handler panicked");
                    }
                }
                reclaimed += 1;
            }
        }
        reclaimed
    }

    /// Reclaim released slots, then claim the first free one.
    /// Returns `None` when every slot is busy.
    pub fn acquire(&mut self) -> Option<SlotLease> {
        self.reclaim();
        let index = self.slots.iter().position(|s| matches!(s, Slot::Free))?;
        let id = self.next_id;
        self.next_id += 1;
        self.slots[index] = Slot::Busy { id, handle: None };
        self.active.fetch_add(1, Ordering::AcqRel);
        Some(SlotLease {
            slot: index,
            id,
            released: self.released_tx.clone(),
            active: Arc::clone(&self.active),
        })
    }

    /// Record the handler thread serving `slot` so it is joined on reclaim.
    pub fn attach(&mut self, slot: usize, thread: JoinHandle<()>) {
        if let Some(Slot::Busy { handle, .. }) = self.slots.get_mut(slot) {
            *handle = Some(thread);
        }
    }

    pub fn is_busy(&self, slot: usize) -> bool {
        matches!(self.slots.get(slot), Some(Slot::Busy { .. }))
    }
}
