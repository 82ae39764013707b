use std::sync::Arc;
use std::time::Instant;

use pipebuf_core::core::{WRITER_THREAD_NAME, spawn_writer};
use pipebuf_core::{ChunkPool, ChunkQueue, NoopSink, PENDING_QUEUE, TelemetryEvent, WriterState};

fn queue_chunks(
    pool: &ChunkPool,
    pending: &ChunkQueue,
    input: &[u8],
) -> Result<(), Box<dyn std::error::Error>> {
    let mut input = input;
    loop {
        let mut chunk = pool.acquire()?;
        let end_of_stream = pool.fill(&mut chunk, &mut input)?;
        chunk.seal(end_of_stream);
        pending.enqueue(chunk);
        if end_of_stream {
            return Ok(());
        }
    }
}

#[test]
fn writer_terminates_once_after_end_of_stream() -> Result<(), Box<dyn std::error::Error>> {
    let pool = Arc::new(ChunkPool::memory(4, 4));
    let pending = Arc::new(ChunkQueue::new(PENDING_QUEUE));
    queue_chunks(&pool, &pending, b"ABCDEFGHIJ")?;

    let handle = spawn_writer(
        Arc::clone(&pool),
        Arc::clone(&pending),
        Vec::new(),
        NoopSink,
        Instant::now(),
    )?;
    let finished = handle.join()?;

    assert_eq!(finished.output, b"ABCDEFGHIJ");
    assert_eq!(finished.stats.state, WriterState::Terminated);
    assert_eq!(finished.stats.chunks_written, 3);
    assert_eq!(finished.stats.data_chunks, 2);
    assert_eq!(finished.stats.final_chunk_len, 2);
    assert!(pending.is_empty());
    assert_eq!(pool.allocated(), 2);
    Ok(())
}

#[test]
fn writer_runs_on_a_named_thread() -> Result<(), Box<dyn std::error::Error>> {
    let pool = Arc::new(ChunkPool::memory(4, 2));
    let pending = Arc::new(ChunkQueue::new(PENDING_QUEUE));
    queue_chunks(&pool, &pending, b"ABCDE")?;

    let mut seen = Vec::new();
    let sink = move |_event: TelemetryEvent| {
        seen.push(std::thread::current().name().map(str::to_owned));
        assert_eq!(seen.last(), Some(&Some(WRITER_THREAD_NAME.to_owned())));
    };
    let handle = spawn_writer(pool, pending, Vec::new(), sink, Instant::now())?;
    assert_eq!(handle.join()?.output, b"ABCDE");
    Ok(())
}

#[test]
fn closed_pending_queue_stops_the_writer_without_failure_event()
-> Result<(), Box<dyn std::error::Error>> {
    let pool = Arc::new(ChunkPool::memory(4, 2));
    let pending = Arc::new(ChunkQueue::new(PENDING_QUEUE));
    let mut chunk = pool.acquire()?;
    pool.fill(&mut chunk, &mut &b"ABCD"[..])?;
    pending.enqueue(chunk);
    pending.close();

    let (tx, rx) = std::sync::mpsc::channel();
    let sink = move |event: TelemetryEvent| {
        let _ = tx.send(event);
    };
    let handle = spawn_writer(pool, pending, Vec::new(), sink, Instant::now())?;

    let error = handle.join().err().expect("closed queue must end the writer");
    assert!(error.is_queue_closed());
    assert!(
        rx.try_iter()
            .all(|event| !matches!(event, TelemetryEvent::WriterFailed { .. }))
    );
    Ok(())
}
