use std::sync::Arc;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use pipebuf_core::{Chunk, ChunkQueue, ChunkRole, PipeBufError};

fn chunk_with(bytes: &[u8]) -> Result<Chunk, Box<dyn std::error::Error>> {
    let mut chunk = Chunk::in_memory(bytes.len().max(1))?;
    chunk.fill_from(&mut &bytes[..])?;
    Ok(chunk)
}

#[test]
fn dequeues_in_enqueue_order() -> Result<(), Box<dyn std::error::Error>> {
    let queue = ChunkQueue::new("fifo");
    for byte in b"abc" {
        queue.enqueue(chunk_with(&[*byte])?);
    }
    assert_eq!(queue.len(), 3);

    for byte in b"abc" {
        let chunk = queue.dequeue_blocking()?;
        assert_eq!(chunk.as_bytes(), Some(&[*byte][..]));
    }
    assert!(queue.is_empty());
    assert!(queue.try_dequeue()?.is_none());
    Ok(())
}

#[test]
fn end_of_stream_role_survives_the_queue() -> Result<(), Box<dyn std::error::Error>> {
    let queue = ChunkQueue::new("eos");
    let mut last = Chunk::in_memory(4)?;
    last.seal(true);
    queue.enqueue(chunk_with(b"x")?);
    queue.enqueue(last);

    assert_eq!(queue.dequeue_blocking()?.role(), ChunkRole::Data);
    let last = queue.dequeue_blocking()?;
    assert!(last.is_end_of_stream());
    assert!(last.is_empty());
    Ok(())
}

#[test]
fn dequeue_blocks_until_another_thread_enqueues() -> Result<(), Box<dyn std::error::Error>> {
    let queue = Arc::new(ChunkQueue::new("blocking"));
    let (tx, rx) = mpsc::channel();

    let consumer = {
        let queue = Arc::clone(&queue);
        thread::spawn(move || {
            let chunk = queue.dequeue_blocking();
            let _ = tx.send(());
            chunk
        })
    };

    assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
    queue.enqueue(chunk_with(b"late")?);

    let chunk = consumer.join().expect("consumer panicked")?;
    assert_eq!(chunk.as_bytes(), Some(&b"late"[..]));
    Ok(())
}

#[test]
fn concurrent_producer_and_consumer_preserve_order() -> Result<(), Box<dyn std::error::Error>> {
    const COUNT: u32 = 2_000;
    let queue = Arc::new(ChunkQueue::new("concurrent"));

    let producer = {
        let queue = Arc::clone(&queue);
        thread::spawn(move || -> pipebuf_core::Result<()> {
            for index in 0..COUNT {
                let mut chunk = Chunk::in_memory(4)?;
                chunk.fill_from(&mut &index.to_le_bytes()[..])?;
                queue.enqueue(chunk);
            }
            Ok(())
        })
    };

    for expected in 0..COUNT {
        let chunk = queue.dequeue_blocking()?;
        let bytes = chunk.as_bytes().expect("memory chunk");
        assert_eq!(u32::from_le_bytes(bytes.try_into()?), expected);
    }
    producer.join().expect("producer panicked")?;

    let metrics = queue.metrics();
    assert_eq!(metrics.enqueued, COUNT as usize);
    assert_eq!(metrics.dequeued, COUNT as usize);
    Ok(())
}

#[test]
fn chunks_moving_between_queues_reuse_node_shells() -> Result<(), Box<dyn std::error::Error>> {
    let pending = ChunkQueue::new("pending");
    let free = ChunkQueue::new("free");
    pending.enqueue(chunk_with(b"a")?);

    for _ in 0..10 {
        let chunk = pending.dequeue_blocking()?;
        free.enqueue(chunk);
        let chunk = free.dequeue_blocking()?;
        pending.enqueue(chunk);
    }

    assert_eq!(free.metrics().nodes_allocated, 0);
    assert_eq!(free.metrics().nodes_reused, 10);
    assert_eq!(pending.metrics().nodes_allocated, 1);
    assert_eq!(pending.metrics().nodes_reused, 10);
    Ok(())
}

#[test]
fn close_wakes_a_blocked_dequeuer() -> Result<(), Box<dyn std::error::Error>> {
    let queue = Arc::new(ChunkQueue::new("closing"));
    let consumer = {
        let queue = Arc::clone(&queue);
        thread::spawn(move || queue.dequeue_blocking())
    };

    thread::sleep(Duration::from_millis(20));
    queue.close();

    match consumer.join().expect("consumer panicked") {
        Err(PipeBufError::QueueClosed { queue: name }) => assert_eq!(name, "closing"),
        other => panic!("unexpected result: {other:?}"),
    }
    assert!(queue.is_closed());
    Ok(())
}
