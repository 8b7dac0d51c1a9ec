//! Scrolling byte buffer over a memory-mapped temporary file.
//!
//! A [`ScrollBuffer`] lets a single writer append a live byte stream while
//! any number of readers tail or scan it, with a bounded on-disk footprint.
//! The mapping is divided into fixed-size slots; each slot backs one entry
//! of a ring. The writer fills the tail entry and, when every slot is in
//! use, recycles the oldest entry, blocking while a reader still holds it.
//! Readers pin exactly one entry at a time and advance monotonically.
//!
//! One mutex guards the entire ring; one condvar carries every wake-up.
//! Writer progress, reader progress, cancellation, and shutdown all
//! broadcast, because eviction depends on waking writer, readers, and the
//! shutdown coordinator together.

mod segment;

use crate::error::{Result, WeirError};
use parking_lot::{Condvar, Mutex, MutexGuard};
use segment::Segment;
use std::path::Path;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Reader lifecycle, shared between a [`Reader`] and its
/// [`ReadCanceller`]s. Cancellation only applies to an active reader: once
/// the reader reached end-of-stream it keeps reporting end-of-stream, so
/// both cancel paths guard on this state. Mutated under the ring mutex.
const READER_ACTIVE: u8 = 0;
const READER_AT_EOF: u8 = 1;
const READER_CANCELED: u8 = 2;

/// Life cycle of a ring entry.
///
/// `Idle` and `Writing` only ever apply to the tail. `Filled` entries are
/// read-only and always have a successor. `Discarded` is terminal: the
/// entry's slot has been handed to a new tail successor (eviction) or the
/// buffer is shutting down.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum EntryState {
    Idle,
    Writing,
    Filled,
    Discarded,
}

/// Successor link of an entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Link {
    /// Not allocated yet; only valid on the tail.
    None,
    /// The entry at this arena index.
    Entry(usize),
    /// End of the stream; set by `close`.
    Eof,
}

/// A position in the ring: a live entry or the end-of-stream marker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Pos {
    Entry(usize),
    Eof,
}

impl Link {
    fn to_pos(self) -> Pos {
        match self {
            Link::Entry(idx) => Pos::Entry(idx),
            Link::Eof => Pos::Eof,
            Link::None => unreachable!("following an unallocated link"),
        }
    }
}

struct Entry {
    /// Write cursor within the slot; readers observe `[0, pos)`.
    pos: usize,
    state: EntryState,
    next: Link,
    /// Number of readers currently pinning this entry.
    refs: usize,
}

impl Entry {
    fn fresh(next: Link) -> Entry {
        Entry {
            pos: 0,
            state: EntryState::Idle,
            next,
            refs: 0,
        }
    }
}

/// Everything the mutex guards: the arena, the head/tail cursors, and the
/// teardown state. Entry `i` is permanently backed by slot `i`.
struct Ring {
    segment: Option<Segment>,
    entries: Vec<Entry>,
    slot_size: usize,
    head: Pos,
    tail: Pos,
    drained: bool,
}

impl Ring {
    fn copy_into_tail(&mut self, idx: usize, b: &[u8]) -> usize {
        let slot_size = self.slot_size;
        let entry = &mut self.entries[idx];
        let n = (slot_size - entry.pos).min(b.len());
        let segment = self.segment.as_mut().expect("segment already released");
        segment.slot_mut(idx)[entry.pos..entry.pos + n].copy_from_slice(&b[..n]);
        entry.pos += n;
        entry.state = EntryState::Writing;
        n
    }

    fn copy_from(&self, idx: usize, from: usize, dst: &mut [u8]) -> usize {
        let entry = &self.entries[idx];
        let n = (entry.pos - from).min(dst.len());
        if n > 0 {
            let segment = self.segment.as_ref().expect("segment already released");
            dst[..n].copy_from_slice(&segment.slot(idx)[from..from + n]);
        }
        n
    }

    /// Mark every entry still reachable from the head as discarded.
    ///
    /// Only called after close, so the chain terminates at EOF. Readers
    /// pinned to a discarded entry observe it on their next read; their
    /// stale refcounts are inert because discarded entries are never
    /// recycled.
    fn discard_all(&mut self) {
        debug_assert_eq!(self.tail, Pos::Eof, "discard before close");
        while let Pos::Entry(idx) = self.head {
            self.entries[idx].state = EntryState::Discarded;
            self.head = self.entries[idx].next.to_pos();
        }
    }
}

struct Shared {
    ring: Mutex<Ring>,
    cond: Condvar,
}

impl Shared {
    /// One writer step: copy what fits into the tail, or advance the tail,
    /// or recycle the head. Returns the number of bytes consumed (possibly
    /// after blocking on a pinned head).
    fn write_step(&self, ring: &mut MutexGuard<'_, Ring>, b: &[u8]) -> Result<usize> {
        loop {
            let tail = match ring.tail {
                Pos::Eof => return Err(WeirError::Closed),
                Pos::Entry(idx) => idx,
            };
            debug_assert!(
                matches!(
                    ring.entries[tail].state,
                    EntryState::Idle | EntryState::Writing
                ),
                "tail entry in state {:?}",
                ring.entries[tail].state
            );

            if ring.entries[tail].pos < ring.slot_size {
                let n = ring.copy_into_tail(tail, b);
                self.cond.notify_all();
                return Ok(n);
            }

            // The tail slot is full; a successor linked earlier (either at
            // construction or by a previous eviction) becomes the new tail.
            if ring.entries[tail].next != Link::None {
                ring.entries[tail].state = EntryState::Filled;
                ring.tail = ring.entries[tail].next.to_pos();
                continue;
            }

            // No successor left: recycle the oldest slot. `evict` may block
            // and may lose to a concurrent evictor; in both cases the state
            // is re-read from scratch.
            let (head, tail_pos) = (ring.head, ring.tail);
            let Some(evicted) = self.evict(ring, head, tail_pos) else {
                continue;
            };
            ring.entries[evicted] = Entry::fresh(Link::None);
            ring.entries[tail].next = Link::Entry(evicted);
        }
    }

    /// Discard the head entry once no reader holds it, and advance the head.
    ///
    /// `head`/`tail` are the caller's snapshot; if the ring moved while
    /// waiting (another evictor won, or shutdown discarded everything) the
    /// eviction is abandoned and `None` is returned. The returned index is
    /// safe to recycle: refcount zero means no reader points at it, and no
    /// reader can reach it again.
    fn evict(&self, ring: &mut MutexGuard<'_, Ring>, head: Pos, tail: Pos) -> Option<usize> {
        if ring.head != head || ring.tail != tail {
            return None;
        }
        let Pos::Entry(idx) = head else {
            unreachable!("evicting eof");
        };

        while ring.entries[idx].refs != 0 && ring.entries[idx].state != EntryState::Discarded {
            self.cond.wait(ring);
        }

        if ring.head != head || ring.tail != tail {
            // Updated by others while waiting.
            return None;
        }

        ring.entries[idx].state = EntryState::Discarded;
        ring.head = ring.entries[idx].next.to_pos();
        self.cond.notify_all();
        Some(idx)
    }

    /// Close the writer side: link EOF after the tail. Idempotent.
    fn close(&self, ring: &mut MutexGuard<'_, Ring>) {
        let Pos::Entry(tail) = ring.tail else {
            return;
        };
        ring.entries[tail].next = Link::Eof;
        ring.entries[tail].state = EntryState::Filled;
        ring.tail = Pos::Eof;
        self.cond.notify_all();
    }
}

/// A bounded scrolling byte buffer backed by a memory-mapped temporary file.
///
/// Cloning is cheap and shares the same buffer. The backing file lives until
/// [`ScrollBuffer::shutdown`] unlinks it.
#[derive(Clone)]
pub struct ScrollBuffer {
    shared: Arc<Shared>,
}

impl ScrollBuffer {
    /// Create a buffer of `slot_count` slots of `slot_size` bytes each,
    /// backed by a fresh temporary file in `dir`.
    ///
    /// # Panics
    ///
    /// Panics if `slot_size == 0` or `slot_count < 2`. The ring needs at
    /// least one free slot to accept writes while another is pinned by a
    /// reader.
    pub fn new(dir: impl AsRef<Path>, slot_size: usize, slot_count: usize) -> Result<ScrollBuffer> {
        assert!(slot_size > 0, "slot_size must be > 0");
        assert!(slot_count >= 2, "slot_count must be >= 2");

        let segment = Segment::create(dir.as_ref(), slot_size, slot_count)?;

        let mut entries = Vec::with_capacity(slot_count);
        for i in 0..slot_count {
            let next = if i + 1 < slot_count {
                Link::Entry(i + 1)
            } else {
                Link::None
            };
            entries.push(Entry::fresh(next));
        }

        let ring = Ring {
            segment: Some(segment),
            entries,
            slot_size,
            head: Pos::Entry(0),
            tail: Pos::Entry(0),
            drained: false,
        };

        Ok(ScrollBuffer {
            shared: Arc::new(Shared {
                ring: Mutex::new(ring),
                cond: Condvar::new(),
            }),
        })
    }

    /// Create the writer handle. A buffer supports exactly one writer;
    /// creating more than one is not checked but gives no ordering
    /// guarantees between them.
    pub fn writer(&self) -> Writer {
        Writer {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Create a reader.
    ///
    /// With `follow` the reader starts at the current tail and blocks for
    /// more data until the writer closes; otherwise it starts at the oldest
    /// retained entry and reports end-of-stream once it catches up.
    pub fn reader(&self, follow: bool) -> Reader {
        let mut ring = self.shared.ring.lock();

        let start = if follow { ring.tail } else { ring.head };
        if let Pos::Entry(idx) = start {
            ring.entries[idx].refs += 1;
            self.shared.cond.notify_all();
        }

        let status = match start {
            Pos::Entry(_) => READER_ACTIVE,
            Pos::Eof => READER_AT_EOF,
        };

        Reader {
            shared: Arc::clone(&self.shared),
            follow,
            pinned: start,
            pos: 0,
            status: Arc::new(AtomicU8::new(status)),
        }
    }

    /// Close the buffer, drain readers, and release the backing file.
    ///
    /// The writer side is closed first. Readers that keep up drain
    /// naturally; readers that never release their entry are forcibly
    /// invalidated once `deadline` elapses and observe
    /// [`WeirError::Discarded`]. Idempotent: repeated calls return `Ok`
    /// without touching the released mapping.
    pub fn shutdown(&self, deadline: Duration) -> Result<()> {
        let mut ring = self.shared.ring.lock();
        if ring.segment.is_none() {
            return Ok(());
        }

        self.shared.close(&mut ring);
        drop(ring);

        let deadline_at = Instant::now() + deadline;
        let watchdog = {
            let shared = Arc::clone(&self.shared);
            std::thread::spawn(move || {
                let mut ring = shared.ring.lock();
                while !ring.drained {
                    if shared
                        .cond
                        .wait_until(&mut ring, deadline_at)
                        .timed_out()
                    {
                        if !ring.drained {
                            ring.discard_all();
                            shared.cond.notify_all();
                        }
                        return;
                    }
                }
            })
        };

        let mut ring = self.shared.ring.lock();
        while let Pos::Entry(_) = ring.head {
            let (head, tail) = (ring.head, ring.tail);
            self.shared.evict(&mut ring, head, tail);
        }
        ring.drained = true;
        self.shared.cond.notify_all();
        let segment = ring.segment.take();
        drop(ring);

        let _ = watchdog.join();

        match segment {
            Some(segment) => segment.remove(),
            // Lost the race with a concurrent shutdown; the winner removed it.
            None => Ok(()),
        }
    }
}

fn io_error(e: WeirError) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::Other, e)
}

/// The append handle of a [`ScrollBuffer`].
pub struct Writer {
    shared: Arc<Shared>,
}

impl Writer {
    /// Append all of `b`, blocking while every slot is full and the oldest
    /// is pinned by a reader. Returns `b.len()` on success.
    pub fn write(&mut self, b: &[u8]) -> Result<usize> {
        let mut ring = self.shared.ring.lock();

        let mut written = 0;
        while written < b.len() {
            written += self.shared.write_step(&mut ring, &b[written..])?;
        }

        Ok(written)
    }

    /// Close the buffer for writing. Readers drain the remaining bytes and
    /// then observe end-of-stream. Idempotent.
    pub fn close(&mut self) -> Result<()> {
        let mut ring = self.shared.ring.lock();
        self.shared.close(&mut ring);
        Ok(())
    }
}

impl std::io::Write for Writer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        Writer::write(self, buf).map_err(io_error)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// A read handle over a [`ScrollBuffer`].
///
/// Each reader pins one entry at a time and advances monotonically through
/// the ring; a pinned entry cannot be recycled by the writer. The
/// `std::io::Read` implementation maps [`WeirError::EndOfStream`] to
/// `Ok(0)` so the reader composes with `BufReader` and friends.
pub struct Reader {
    shared: Arc<Shared>,
    follow: bool,
    pinned: Pos,
    pos: usize,
    status: Arc<AtomicU8>,
}

impl Reader {
    /// Read up to `buf.len()` bytes.
    ///
    /// In follow mode this blocks until the writer appends, closes, or the
    /// reader is cancelled. Returns [`WeirError::EndOfStream`] at the end of
    /// a closed buffer, [`WeirError::Closed`] after [`Reader::close`] or a
    /// [`ReadCanceller`] fired, and [`WeirError::Discarded`] if a forced
    /// shutdown invalidated the pinned entry.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let shared = Arc::clone(&self.shared);
        let mut ring = shared.ring.lock();

        loop {
            if self.status.load(Ordering::Relaxed) == READER_CANCELED {
                self.unpin(&mut ring);
                return Err(WeirError::Closed);
            }

            let idx = match self.pinned {
                Pos::Eof => return Err(WeirError::EndOfStream),
                Pos::Entry(idx) => idx,
            };

            if ring.entries[idx].state == EntryState::Discarded {
                return Err(WeirError::Discarded);
            }

            let avail = ring.entries[idx].pos - self.pos;
            if avail > 0 {
                let n = ring.copy_from(idx, self.pos, buf);
                self.pos += n;
                return Ok(n);
            }

            if ring.entries[idx].state == EntryState::Filled {
                let next = ring.entries[idx].next;
                ring.entries[idx].refs -= 1;
                if let Link::Entry(nidx) = next {
                    ring.entries[nidx].refs += 1;
                }
                self.shared.cond.notify_all();
                self.pinned = next.to_pos();
                if self.pinned == Pos::Eof {
                    self.mark_eof();
                }
                self.pos = 0;
                continue;
            }

            if !self.follow {
                // Caught up with the writer; scan readers stop here.
                self.unpin(&mut ring);
                continue;
            }

            self.shared.cond.wait(&mut ring);
        }
    }

    /// Release the pinned entry and mark the reader cancelled. Subsequent
    /// reads return [`WeirError::Closed`]. No-op once the reader reached
    /// end-of-stream.
    pub fn close(&mut self) {
        if self.pinned == Pos::Eof {
            return;
        }

        let shared = Arc::clone(&self.shared);
        let mut ring = shared.ring.lock();
        self.status.store(READER_CANCELED, Ordering::Relaxed);
        self.unpin(&mut ring);
        shared.cond.notify_all();
    }

    /// A handle that cancels this reader from another thread, waking it if
    /// it is blocked in [`Reader::read`].
    pub fn canceller(&self) -> ReadCanceller {
        ReadCanceller {
            shared: Arc::clone(&self.shared),
            status: Arc::clone(&self.status),
        }
    }

    fn unpin(&mut self, ring: &mut MutexGuard<'_, Ring>) {
        if let Pos::Entry(idx) = self.pinned {
            ring.entries[idx].refs -= 1;
            self.pinned = Pos::Eof;
            self.mark_eof();
            self.shared.cond.notify_all();
        }
    }

    /// Record that the reader reached end-of-stream, unless it was already
    /// cancelled. Keeps a later cancel from overriding the EOF state.
    fn mark_eof(&self) {
        let _ = self.status.compare_exchange(
            READER_ACTIVE,
            READER_AT_EOF,
            Ordering::Relaxed,
            Ordering::Relaxed,
        );
    }
}

impl Drop for Reader {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::io::Read for Reader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match Reader::read(self, buf) {
            Ok(n) => Ok(n),
            Err(WeirError::EndOfStream) => Ok(0),
            Err(e) => Err(io_error(e)),
        }
    }
}

/// Cross-thread cancellation handle for a [`Reader`].
///
/// The cancel path takes the ring mutex and broadcasts, so a reader blocked
/// in [`Reader::read`] is guaranteed to wake and observe the cancellation.
#[derive(Clone)]
pub struct ReadCanceller {
    shared: Arc<Shared>,
    status: Arc<AtomicU8>,
}

impl ReadCanceller {
    /// Cancel the reader. The reader's next (or pending) read returns
    /// [`WeirError::Closed`]. Like [`Reader::close`], a no-op once the
    /// reader already reached end-of-stream: it keeps reporting
    /// [`WeirError::EndOfStream`].
    pub fn cancel(&self) {
        let _ring = self.shared.ring.lock();
        if self
            .status
            .compare_exchange(
                READER_ACTIVE,
                READER_CANCELED,
                Ordering::Relaxed,
                Ordering::Relaxed,
            )
            .is_ok()
        {
            self.shared.cond.notify_all();
        }
    }
}
