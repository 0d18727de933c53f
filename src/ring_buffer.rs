//! Single-producer/single-consumer byte FIFO.
//!
//! Used by the test harness to wire a capture flux to a playback flux, and
//! available to backends that need to decouple a host callback from the
//! user callback. Splitting into producer and consumer halves enforces the
//! one-reader/one-writer contract at the type level; the occupancy counter
//! is maintained atomically by the underlying queue, so progress on either
//! side is visible to the other without locks.
//!
//! Writes that do not fit are truncated; the buffer never overwrites.
//! Wrap-around is invisible to callers.

use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};

/// Creates the two halves of a byte FIFO with the given capacity.
pub struct RingBuffer;

impl RingBuffer {
    /// Allocates a buffer of `capacity` bytes and splits it.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> (RingProducer, RingConsumer) {
        let (producer, consumer) = HeapRb::<u8>::new(capacity).split();
        (RingProducer { inner: producer }, RingConsumer { inner: consumer })
    }
}

/// Write half of a [`RingBuffer`].
pub struct RingProducer {
    inner: HeapProd<u8>,
}

impl RingProducer {
    /// Total capacity in bytes.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.inner.capacity().get()
    }

    /// Bytes that can currently be written.
    ///
    /// Eventually consistent: the consumer may free more space while this
    /// snapshot is used to size the next transfer.
    #[must_use]
    pub fn writable(&self) -> usize {
        self.inner.vacant_len()
    }

    /// Writes as much of `src` as fits, returning the number of bytes
    /// actually written.
    pub fn write(&mut self, src: &[u8]) -> usize {
        self.inner.push_slice(src)
    }

    /// Writes up to `len` zero bytes, returning the number actually
    /// written. This is the silence-span variant of [`write`](Self::write).
    pub fn write_silence(&mut self, len: usize) -> usize {
        const ZEROS: [u8; 256] = [0; 256];

        let mut written = 0;
        while written < len {
            let chunk = (len - written).min(ZEROS.len());
            let pushed = self.inner.push_slice(&ZEROS[..chunk]);
            written += pushed;
            if pushed < chunk {
                break;
            }
        }
        written
    }
}

/// Read half of a [`RingBuffer`].
pub struct RingConsumer {
    inner: HeapCons<u8>,
}

impl RingConsumer {
    /// Total capacity in bytes.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.inner.capacity().get()
    }

    /// Bytes that can currently be read.
    #[must_use]
    pub fn readable(&self) -> usize {
        self.inner.occupied_len()
    }

    /// Reads up to `dst.len()` bytes, returning the number actually read.
    pub fn read(&mut self, dst: &mut [u8]) -> usize {
        self.inner.pop_slice(dst)
    }

    /// Discards all buffered bytes.
    pub fn clear(&mut self) {
        let _ = self.inner.clear();
    }
}
