use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crossbeam_channel::{Receiver, Sender, TryRecvError, unbounded};

use crate::buffer::chunk::Chunk;
use crate::error::PipeBufError;
use crate::sync::lock_unpoisoned;
use crate::types::{ChunkRole, Result};

/// Queue name used for the queue of empty chunks waiting to be refilled.
pub const FREE_QUEUE: &str = "free";
/// Queue name used for the queue of filled chunks waiting for the writer.
pub const PENDING_QUEUE: &str = "pending";

/// One link of a [`ChunkQueue`].
///
/// The per-node lock guards role, successor link and the chunk stored in the
/// node. It is never held across I/O.
#[derive(Debug)]
pub(crate) struct Node {
    slot: Mutex<Slot>,
}

#[derive(Debug)]
struct Slot {
    role: ChunkRole,
    chunk: Option<Chunk>,
    next: Option<Arc<Node>>,
}

impl Node {
    fn sentinel(role: ChunkRole) -> Self {
        Self {
            slot: Mutex::new(Slot {
                role,
                chunk: None,
                next: None,
            }),
        }
    }
}

/// Counting signal: one token per payload-bearing node linked into the queue.
#[derive(Debug)]
struct Signal {
    queue: &'static str,
    poster: Mutex<Option<Sender<()>>>,
    waiter: Receiver<()>,
}

impl Signal {
    fn new(queue: &'static str) -> Self {
        let (tx, rx) = unbounded();
        Self {
            queue,
            poster: Mutex::new(Some(tx)),
            waiter: rx,
        }
    }

    fn post(&self) {
        if let Some(poster) = lock_unpoisoned(&self.poster).as_ref() {
            // The receiver lives as long as `self`, so sending cannot fail.
            let _ = poster.send(());
        }
    }

    fn wait(&self) -> Result<()> {
        self.waiter
            .recv()
            .map_err(|_| PipeBufError::QueueClosed { queue: self.queue })
    }

    fn try_wait(&self) -> Result<bool> {
        match self.waiter.try_recv() {
            Ok(()) => Ok(true),
            Err(TryRecvError::Empty) => Ok(false),
            Err(TryRecvError::Disconnected) => Err(PipeBufError::QueueClosed { queue: self.queue }),
        }
    }

    fn close(&self) {
        lock_unpoisoned(&self.poster).take();
    }

    fn is_closed(&self) -> bool {
        lock_unpoisoned(&self.poster).is_none()
    }

    fn available(&self) -> usize {
        self.waiter.len()
    }
}

/// Snapshot of node bookkeeping for a [`ChunkQueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueueMetricsSnapshot {
    /// Chunks appended at the tail.
    pub enqueued: usize,
    /// Chunks detached from the head.
    pub dequeued: usize,
    /// Tail sentinels that had to be freshly allocated.
    pub nodes_allocated: usize,
    /// Tail sentinels built from a node shell carried in by the chunk.
    pub nodes_reused: usize,
}

#[derive(Debug, Default)]
struct QueueMetricsInner {
    enqueued: AtomicUsize,
    dequeued: AtomicUsize,
    nodes_allocated: AtomicUsize,
    nodes_reused: AtomicUsize,
}

/// FIFO of chunks with lock-coupled append at the tail and removal at the head.
///
/// The list starts at a permanent head sentinel and ends at a tail sentinel
/// cached behind its own lock, so one thread can enqueue while another
/// dequeues without sharing a lock. Appending writes the chunk into the
/// current tail sentinel and links a new sentinel after it. The node shell
/// detached by a dequeue travels with the chunk and is reused as that new
/// sentinel the next time the chunk is enqueued anywhere.
///
/// # Example
/// ```
/// use pipebuf_core::{Chunk, ChunkQueue};
///
/// # fn main() -> pipebuf_core::Result<()> {
/// let queue = ChunkQueue::new("demo");
/// let mut chunk = Chunk::in_memory(4)?;
/// chunk.fill_from(&mut &b"ABCD"[..])?;
/// queue.enqueue(chunk);
///
/// let chunk = queue.dequeue_blocking()?;
/// assert_eq!(chunk.as_bytes(), Some(&b"ABCD"[..]));
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ChunkQueue {
    name: &'static str,
    head: Arc<Node>,
    tail: Mutex<Arc<Node>>,
    signal: Signal,
    metrics: QueueMetricsInner,
}

impl ChunkQueue {
    /// Creates an empty queue: a head sentinel linked to a tail sentinel.
    pub fn new(name: &'static str) -> Self {
        let tail = Arc::new(Node::sentinel(ChunkRole::TailSentinel));
        let head = Node::sentinel(ChunkRole::HeadSentinel);
        lock_unpoisoned(&head.slot).next = Some(Arc::clone(&tail));
        Self {
            name,
            head: Arc::new(head),
            tail: Mutex::new(tail),
            signal: Signal::new(name),
            metrics: QueueMetricsInner::default(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Appends `chunk` at the tail and wakes one waiting dequeuer.
    ///
    /// The current tail sentinel is converted in place into the chunk's node
    /// and a new sentinel is linked after it. The signal is posted only once
    /// the node is fully linked.
    pub fn enqueue(&self, mut chunk: Chunk) {
        debug_assert!(chunk.role().carries_payload());
        let fresh = self.reclaim(chunk.take_shell());
        let role = chunk.role();

        let mut tail = lock_unpoisoned(&self.tail);
        {
            let mut slot = lock_unpoisoned(&tail.slot);
            slot.role = role;
            slot.chunk = Some(chunk);
            slot.next = Some(Arc::clone(&fresh));
        }
        *tail = fresh;
        drop(tail);

        self.metrics.enqueued.fetch_add(1, Ordering::Relaxed);
        self.signal.post();
    }

    /// Blocks until a chunk is queued, then detaches and returns it.
    ///
    /// Fails only with [`PipeBufError::QueueClosed`] once the queue has been
    /// closed and every chunk queued before that has been handed out.
    pub fn dequeue_blocking(&self) -> Result<Chunk> {
        self.signal.wait()?;
        self.unlink_front()
    }

    /// Detaches the front chunk if one is ready, without blocking.
    pub fn try_dequeue(&self) -> Result<Option<Chunk>> {
        if !self.signal.try_wait()? {
            return Ok(None);
        }
        self.unlink_front().map(Some)
    }

    /// Number of chunks currently queued and not yet claimed by a dequeuer.
    pub fn len(&self) -> usize {
        self.signal.available()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stops posting availability and wakes blocked dequeuers with an error
    /// once the chunks already queued are drained.
    ///
    /// Only used to tear the pipeline down after a fatal failure on the other
    /// side. Enqueue keeps linking chunks so ownership is never lost.
    pub fn close(&self) {
        self.signal.close();
    }

    pub fn is_closed(&self) -> bool {
        self.signal.is_closed()
    }

    pub fn metrics(&self) -> QueueMetricsSnapshot {
        QueueMetricsSnapshot {
            enqueued: self.metrics.enqueued.load(Ordering::Relaxed),
            dequeued: self.metrics.dequeued.load(Ordering::Relaxed),
            nodes_allocated: self.metrics.nodes_allocated.load(Ordering::Relaxed),
            nodes_reused: self.metrics.nodes_reused.load(Ordering::Relaxed),
        }
    }

    fn corrupted(&self, detail: &'static str) -> PipeBufError {
        PipeBufError::QueueCorrupted {
            queue: self.name,
            detail,
        }
    }

    /// Turns a detached shell into a clean tail sentinel, or allocates one.
    fn reclaim(&self, shell: Option<Arc<Node>>) -> Arc<Node> {
        if let Some(mut shell) = shell {
            if let Some(node) = Arc::get_mut(&mut shell) {
                let slot = node.slot.get_mut().unwrap_or_else(PoisonError::into_inner);
                slot.role = ChunkRole::TailSentinel;
                slot.chunk = None;
                slot.next = None;
                self.metrics.nodes_reused.fetch_add(1, Ordering::Relaxed);
                return shell;
            }
        }
        self.metrics.nodes_allocated.fetch_add(1, Ordering::Relaxed);
        Arc::new(Node::sentinel(ChunkRole::TailSentinel))
    }

    fn unlink_front(&self) -> Result<Chunk> {
        let mut head = lock_unpoisoned(&self.head.slot);
        let node = head
            .next
            .take()
            .ok_or_else(|| self.corrupted("head sentinel lost its successor"))?;
        let mut slot = lock_unpoisoned(&node.slot);
        if !slot.role.carries_payload() {
            drop(slot);
            head.next = Some(node);
            return Err(self.corrupted("availability signalled without a queued chunk"));
        }

        head.next = slot.next.take();
        drop(head);

        let chunk = slot.chunk.take();
        slot.role = ChunkRole::TailSentinel;
        drop(slot);

        let mut chunk = chunk.ok_or_else(|| self.corrupted("payload node without a chunk"))?;
        chunk.attach_shell(node);
        self.metrics.dequeued.fetch_add(1, Ordering::Relaxed);
        Ok(chunk)
    }
}

impl Drop for ChunkQueue {
    fn drop(&mut self) {
        // Unlink iteratively; a long spill backlog would otherwise drop recursively.
        let mut next = lock_unpoisoned(&self.head.slot).next.take();
        while let Some(node) = next {
            next = lock_unpoisoned(&node.slot).next.take();
        }
    }
}
