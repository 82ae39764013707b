use pipebuf_core::PipeBufError;

#[test]
fn converts_io_error() {
    let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
    let error: PipeBufError = io_error.into();

    match error {
        PipeBufError::Io(err) => assert_eq!(err.kind(), std::io::ErrorKind::NotFound),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn converts_anyhow_error() {
    let error: PipeBufError = anyhow::anyhow!("boom").into();

    match error {
        PipeBufError::Other(err) => assert_eq!(err.to_string(), "boom"),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn context_wraps_and_renders_the_source() {
    let err = PipeBufError::PayloadMismatch("spill chunk").with_context("while draining");

    assert_eq!(
        err.to_string(),
        "while draining: chunk payload mismatch: spill chunk"
    );
    match err {
        PipeBufError::Context { context, source } => {
            assert_eq!(context, "while draining");
            assert!(matches!(*source, PipeBufError::PayloadMismatch("spill chunk")));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn queue_closed_is_recognised_through_context() {
    let closed = PipeBufError::QueueClosed { queue: "pending" };
    assert_eq!(closed.to_string(), "pending queue closed");
    assert!(closed.with_context("writer exiting").is_queue_closed());

    let root_cause: PipeBufError =
        std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone").into();
    assert!(!root_cause.is_queue_closed());
}
