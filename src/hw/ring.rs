// Lock-free single-producer ring standing in for a DMA receive buffer
//
// The producer (a serial reader thread) writes bytes and advances the write
// index with wraparound. The consumer polls the write index and never writes
// it, except through the explicit `restart_fill` corrective action.

use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};

use super::HardwareRing;
use crate::config::SYNC_BYTE;

pub struct DmaRing {
    data: Box<[AtomicU8]>,
    write: AtomicUsize,
    wrap_sync: AtomicBool,
    cycles: AtomicUsize,
}

impl DmaRing {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ring capacity must be non-zero");
        Self {
            data: (0..capacity).map(|_| AtomicU8::new(0)).collect(),
            write: AtomicUsize::new(0),
            wrap_sync: AtomicBool::new(false),
            cycles: AtomicUsize::new(0),
        }
    }

    /// Producer side: store one byte and advance the write index
    pub fn push(&self, byte: u8) {
        let w = self.write.load(Ordering::Acquire);
        self.commit(w, byte);
    }

    /// Store `byte` at `w` and advance the cursor only if it still reads `w`
    ///
    /// A `restart_fill` that lands between the producer's load and this
    /// advance keeps the cursor at 0; the byte written at the old slot is
    /// dropped with the rest of the abandoned fill. Returns whether the
    /// cursor advanced.
    fn commit(&self, w: usize, byte: u8) -> bool {
        let n = self.data.len();
        let w = w % n;
        self.data[w].store(byte, Ordering::Relaxed);
        let next = (w + 1) % n;
        if self
            .write
            .compare_exchange(w, next, Ordering::Release, Ordering::Relaxed)
            .is_err()
        {
            return false;
        }

        if next == 0 {
            // Fill cycle complete
            self.cycles.fetch_add(1, Ordering::Relaxed);
            if self.data[0].load(Ordering::Relaxed) == SYNC_BYTE {
                self.wrap_sync.store(true, Ordering::Release);
            }
        }
        true
    }

    pub fn extend(&self, bytes: &[u8]) {
        for &b in bytes {
            self.push(b);
        }
    }

    /// Number of completed fill cycles
    pub fn cycles(&self) -> usize {
        self.cycles.load(Ordering::Relaxed)
    }
}

impl HardwareRing for DmaRing {
    fn capacity(&self) -> usize {
        self.data.len()
    }

    fn write_index(&self) -> usize {
        self.write.load(Ordering::Acquire)
    }

    fn byte_at(&self, index: usize) -> u8 {
        self.data[index % self.data.len()].load(Ordering::Relaxed)
    }

    fn take_wrap_sync(&self) -> bool {
        self.wrap_sync.swap(false, Ordering::AcqRel)
    }

    fn restart_fill(&self) {
        self.write.store(0, Ordering::Release);
    }
}
