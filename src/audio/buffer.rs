//! Lock-free sample ring buffer for handing captured audio between threads
//!
//! The audio backend invokes its capture callback on a real-time thread. That
//! thread must never wait on the thread draining the recording, so the two
//! sides communicate through a fixed-capacity SPSC ring:
//! - The capture callback is the single producer (writes samples)
//! - The recording loop is the single consumer (reads samples in FIFO order)
//!
//! ## Overflow and underflow
//!
//! Neither side ever blocks. A write that offers more samples than there is
//! free space copies the leading samples that fit and drops the rest; unread
//! data is never overwritten. A read that asks for more than is buffered
//! returns what is there, possibly nothing. Both outcomes are reported through
//! return values only.
//!
//! ## Layout
//!
//! Slots hold `f32` bit patterns in `AtomicU32`s, so a slot is never torn and
//! no `unsafe` is needed. The read and write cursors run over `[0, 2 * capacity)`
//! which distinguishes a full ring from an empty one without a spare slot.
//! The writer publishes its cursor with `Release` and the reader observes it
//! with `Acquire` (and vice versa for freed space).

use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use thiserror::Error;

/// Largest capacity accepted by [`RingBuffer::new`].
///
/// Cursor arithmetic needs `3 * capacity` to fit in a `usize`.
pub const MAX_CAPACITY: usize = usize::MAX / 4;

/// Errors that can occur when constructing a ring buffer
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RingBufferError {
    #[error("Invalid ring buffer capacity: {0} (expected 1..={max})", max = MAX_CAPACITY)]
    InvalidCapacity(usize),
}

/// Storage and cursors shared by the buffer and its split handles
struct Shared {
    slots: Box<[AtomicU32]>,
    capacity: usize,
    /// Write cursor, in `[0, 2 * capacity)`
    head: AtomicUsize,
    /// Read cursor, in `[0, 2 * capacity)`
    tail: AtomicUsize,
    samples_written: AtomicU64,
    samples_dropped: AtomicU64,
}

impl Shared {
    fn new(capacity: usize) -> Result<Self, RingBufferError> {
        if capacity == 0 || capacity > MAX_CAPACITY {
            return Err(RingBufferError::InvalidCapacity(capacity));
        }

        let mut slots = Vec::new();
        slots
            .try_reserve_exact(capacity)
            .map_err(|_| RingBufferError::InvalidCapacity(capacity))?;
        slots.extend((0..capacity).map(|_| AtomicU32::new(0.0_f32.to_bits())));
        let slots = slots.into_boxed_slice();

        Ok(Self {
            slots,
            capacity,
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
            samples_written: AtomicU64::new(0),
            samples_dropped: AtomicU64::new(0),
        })
    }

    /// Number of samples between two cursors
    #[inline]
    fn distance(&self, from: usize, to: usize) -> usize {
        if to >= from {
            to - from
        } else {
            2 * self.capacity - from + to
        }
    }

    #[inline]
    fn advance(&self, pos: usize, n: usize) -> usize {
        let next = pos + n;
        if next >= 2 * self.capacity {
            next - 2 * self.capacity
        } else {
            next
        }
    }

    #[inline]
    fn slot_index(&self, pos: usize) -> usize {
        if pos >= self.capacity {
            pos - self.capacity
        } else {
            pos
        }
    }

    fn len(&self) -> usize {
        let tail = self.tail.load(Ordering::Acquire);
        let head = self.head.load(Ordering::Acquire);
        // An observer outside the producer/consumer pair may see a stale tail
        self.distance(tail, head).min(self.capacity)
    }

    /// Copy as many leading samples as fit. Producer side only.
    fn push_slice(&self, samples: &[f32]) -> usize {
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Acquire);
        let free = self.capacity - self.distance(tail, head);
        let n = samples.len().min(free);

        if n > 0 {
            let start = self.slot_index(head);
            let first = n.min(self.capacity - start);
            let (front, back) = samples[..n].split_at(first);

            for (slot, sample) in self.slots[start..start + first].iter().zip(front) {
                slot.store(sample.to_bits(), Ordering::Relaxed);
            }
            for (slot, sample) in self.slots[..back.len()].iter().zip(back) {
                slot.store(sample.to_bits(), Ordering::Relaxed);
            }

            self.head.store(self.advance(head, n), Ordering::Release);
            self.samples_written.fetch_add(n as u64, Ordering::Relaxed);
        }

        self.record_dropped(samples.len() - n);
        n
    }

    /// Move up to `out.len()` samples into `out`. Consumer side only.
    fn pop_into(&self, out: &mut [f32]) -> usize {
        let tail = self.tail.load(Ordering::Relaxed);
        let head = self.head.load(Ordering::Acquire);
        let n = out.len().min(self.distance(tail, head));

        if n == 0 {
            return 0;
        }

        let start = self.slot_index(tail);
        let first = n.min(self.capacity - start);
        let (front, back) = out[..n].split_at_mut(first);

        for (dst, slot) in front.iter_mut().zip(&self.slots[start..start + first]) {
            *dst = f32::from_bits(slot.load(Ordering::Relaxed));
        }
        for (dst, slot) in back.iter_mut().zip(&self.slots[..]) {
            *dst = f32::from_bits(slot.load(Ordering::Relaxed));
        }

        self.tail.store(self.advance(tail, n), Ordering::Release);
        n
    }

    fn pop_vec(&self, n: usize) -> Vec<f32> {
        let mut out = vec![0.0; n.min(self.len())];
        let read = self.pop_into(&mut out);
        out.truncate(read);
        out
    }

    #[inline]
    fn record_dropped(&self, n: usize) {
        if n > 0 {
            self.samples_dropped.fetch_add(n as u64, Ordering::Relaxed);
        }
    }
}

/// Fixed-capacity circular buffer of `f32` samples
///
/// Owned by one recording session. Use it directly when writes and reads
/// happen on the same thread, or [`split`](Self::split) it into a
/// [`RingProducer`] and [`RingConsumer`] to run the two sides concurrently.
pub struct RingBuffer {
    shared: Shared,
}

impl RingBuffer {
    /// Create a ring buffer holding `capacity` samples, all initialized to silence
    pub fn new(capacity: usize) -> Result<Self, RingBufferError> {
        Ok(Self {
            shared: Shared::new(capacity)?,
        })
    }

    /// Copy as many leading samples as fit in the free space
    ///
    /// Returns the number of samples accepted. Anything past that count is
    /// dropped and counted in [`samples_dropped`](Self::samples_dropped).
    pub fn write(&mut self, samples: &[f32]) -> usize {
        self.shared.push_slice(samples)
    }

    /// Remove and return up to `n` samples in write order
    pub fn read(&mut self, n: usize) -> Vec<f32> {
        self.shared.pop_vec(n)
    }

    /// Remove up to `out.len()` samples into `out`, returning how many were read
    pub fn read_into(&mut self, out: &mut [f32]) -> usize {
        self.shared.pop_into(out)
    }

    /// Number of buffered, unread samples
    pub fn available(&self) -> usize {
        self.shared.len()
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    pub fn free_space(&self) -> usize {
        self.shared.capacity - self.shared.len()
    }

    pub fn is_empty(&self) -> bool {
        self.available() == 0
    }

    pub fn is_full(&self) -> bool {
        self.available() == self.shared.capacity
    }

    /// Total samples accepted by `write` since construction
    pub fn samples_written(&self) -> u64 {
        self.shared.samples_written.load(Ordering::Relaxed)
    }

    /// Total samples dropped because the buffer was full
    pub fn samples_dropped(&self) -> u64 {
        self.shared.samples_dropped.load(Ordering::Relaxed)
    }

    /// Split into producer and consumer handles for use on separate threads
    pub fn split(self) -> (RingProducer, RingConsumer) {
        let shared = Arc::new(self.shared);
        (
            RingProducer {
                shared: Arc::clone(&shared),
            },
            RingConsumer { shared },
        )
    }
}

/// Writing half of a split ring buffer (owned by the capture callback)
pub struct RingProducer {
    shared: Arc<Shared>,
}

impl RingProducer {
    /// Copy as many leading samples as fit, returning the number accepted
    ///
    /// Lock-free and allocation-free; safe to call from audio callbacks.
    #[inline]
    pub fn write(&mut self, samples: &[f32]) -> usize {
        self.shared.push_slice(samples)
    }

    /// Count samples the caller gave up on without offering them to `write`
    #[inline]
    pub(crate) fn record_dropped(&mut self, n: usize) {
        self.shared.record_dropped(n);
    }

    pub fn free_space(&self) -> usize {
        self.shared.capacity - self.shared.len()
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }
}

/// Reading half of a split ring buffer (owned by the recording loop)
pub struct RingConsumer {
    shared: Arc<Shared>,
}

impl RingConsumer {
    /// Remove and return up to `n` samples in write order
    pub fn read(&mut self, n: usize) -> Vec<f32> {
        self.shared.pop_vec(n)
    }

    /// Remove up to `out.len()` samples into `out`, returning how many were read
    pub fn read_into(&mut self, out: &mut [f32]) -> usize {
        self.shared.pop_into(out)
    }

    pub fn available(&self) -> usize {
        self.shared.len()
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    pub fn samples_written(&self) -> u64 {
        self.shared.samples_written.load(Ordering::Relaxed)
    }

    pub fn samples_dropped(&self) -> u64 {
        self.shared.samples_dropped.load(Ordering::Relaxed)
    }
}
