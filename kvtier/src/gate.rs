//! Write-side backpressure: a counting semaphore around the write path.

use std::sync::{Condvar, Mutex};

/// Bounds how many write-backs are admitted to the write path at once.
///
/// Holders are write workers on the blocking thread pool and the admission
/// loop probes synchronously, so waiting happens on a condition variable,
/// never on the async runtime.
pub struct WriteGate {
    capacity: usize,
    available: Mutex<usize>,
    released: Condvar,
}

/// Permission for one write-back to pass the gate. Dropping it frees the
/// slot and wakes one waiter.
pub struct WritePermit<'a> {
    gate: &'a WriteGate,
}

impl WriteGate {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            available: Mutex::new(capacity),
            released: Condvar::new(),
        }
    }

    /// Blocks until a slot is free, then takes it.
    pub fn acquire(&self) -> WritePermit<'_> {
        let mut available = self.available.lock().unwrap();
        while *available == 0 {
            available = self.released.wait(available).unwrap();
        }
        *available -= 1;
        WritePermit { gate: self }
    }

    /// Blocks until a slot is free, without taking it.
    ///
    /// The freedom observed here is instantaneous; another caller may take
    /// the slot right after this returns.
    pub fn probe(&self) {
        drop(self.acquire());
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots free at this instant.
    pub fn available(&self) -> usize {
        *self.available.lock().unwrap()
    }
}

impl Drop for WritePermit<'_> {
    fn drop(&mut self) {
        let mut available = self.gate.available.lock().unwrap();
        *available += 1;
        debug_assert!(*available <= self.gate.capacity);
        self.gate.released.notify_one();
    }
}
