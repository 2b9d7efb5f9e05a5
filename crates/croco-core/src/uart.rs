use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::config::UART_TX_BUFFER_SIZE;

const MASK: usize = UART_TX_BUFFER_SIZE - 1;

/// Byte ring feeding the debug UART.
///
/// Any thread may send or drain. One sender and one drainer run at a time;
/// a caller that finds its side busy gives up instead of waiting. Records
/// that do not fit are dropped whole. One slot stays unused so `head == tail` means empty.
pub struct TxRing {
    buf: UnsafeCell<[u8; UART_TX_BUFFER_SIZE]>,
    head: AtomicUsize,
    tail: AtomicUsize,
    sending: AtomicBool,
    draining: AtomicBool,
}

// `sending` and `draining` admit one writer of the free region and one
// reader of the published region; the regions are split by `head`/`tail`.
unsafe impl Sync for TxRing {}

/// Holds one side of the ring until dropped.
struct SideGuard<'a>(&'a AtomicBool);

impl<'a> SideGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| SideGuard(flag))
    }
}

impl Drop for SideGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Default for TxRing {
    fn default() -> Self {
        Self::new()
    }
}

impl TxRing {
    pub const fn new() -> Self {
        Self {
            buf: UnsafeCell::new([0; UART_TX_BUFFER_SIZE]),
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
            sending: AtomicBool::new(false),
            draining: AtomicBool::new(false),
        }
    }

    pub fn len(&self) -> usize {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        head.wrapping_sub(tail) & MASK
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn free(&self) -> usize {
        UART_TX_BUFFER_SIZE - 1 - self.len()
    }

    /// Queues `data` as one record. Returns false, queueing nothing, when it
    /// does not fit or another thread is sending.
    pub fn send(&self, data: &[u8]) -> bool {
        let Some(_guard) = SideGuard::acquire(&self.sending) else {
            return false;
        };
        if data.len() > self.free() {
            return false;
        }

        let head = self.head.load(Ordering::Relaxed);
        let first = (UART_TX_BUFFER_SIZE - head).min(data.len());
        let base = self.buf.get() as *mut u8;
        // SAFETY: both ranges lie in the free part of the buffer, which the
        // consumer does not read until `head` is published below.
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), base.add(head), first);
            std::ptr::copy_nonoverlapping(data[first..].as_ptr(), base, data.len() - first);
        }
        self.head
            .store((head + data.len()) & MASK, Ordering::Release);
        true
    }

    /// Hands queued bytes to `sink` until it refuses one or the ring is
    /// empty. Returns the number of bytes consumed, zero when another thread
    /// is draining.
    pub fn drain(&self, mut sink: impl FnMut(u8) -> bool) -> usize {
        let Some(_guard) = SideGuard::acquire(&self.draining) else {
            return 0;
        };
        let head = self.head.load(Ordering::Acquire);
        let mut tail = self.tail.load(Ordering::Relaxed);
        let base = self.buf.get() as *const u8;
        let mut sent = 0;
        while tail != head {
            // SAFETY: `tail` is in the published, not yet consumed range.
            let byte = unsafe { base.add(tail).read() };
            if !sink(byte) {
                break;
            }
            tail = (tail + 1) & MASK;
            sent += 1;
        }
        self.tail.store(tail, Ordering::Release);
        sent
    }

    /// Drops everything queued.
    pub fn discard_pending(&self) {
        let Some(_guard) = SideGuard::acquire(&self.draining) else {
            return;
        };
        let head = self.head.load(Ordering::Acquire);
        self.tail.store(head, Ordering::Release);
    }
}
