#[cfg(feature = "telemetry")]
mod telemetry_enabled_tests {
    use std::sync::Mutex;

    use pipebuf_core::telemetry::{self, tags};
    use pipebuf_core::{NoopSink, PipeBuffer, PipeBufferConfig};
    use tempfile::TempDir;

    static TELEMETRY_TEST_MUTEX: Mutex<()> = Mutex::new(());

    #[test]
    fn memory_run_records_pool_and_transfer_metrics() -> Result<(), Box<dyn std::error::Error>> {
        let _guard = TELEMETRY_TEST_MUTEX
            .lock()
            .expect("telemetry test lock poisoned");
        telemetry::reset();

        let buffer = PipeBuffer::new(PipeBufferConfig::memory_with(4, 2))?;
        let (output, _report) = buffer.run(&b"ABCDEFGHIJ"[..], Vec::new(), NoopSink)?;
        assert_eq!(output, b"ABCDEFGHIJ");

        let snapshot = telemetry::snapshot();
        assert_eq!(snapshot.counter(tags::METRIC_PRODUCER_CHUNK_COUNT), Some(3));
        assert_eq!(snapshot.counter(tags::METRIC_WRITER_CHUNK_COUNT), Some(3));
        assert_eq!(snapshot.counter(tags::METRIC_PRODUCER_BYTES_READ), Some(10));
        assert_eq!(snapshot.counter(tags::METRIC_WRITER_BYTES_WRITTEN), Some(10));
        assert!(snapshot.counter(tags::METRIC_POOL_ACQUIRE_CREATED_COUNT).unwrap_or(0) >= 1);
        assert_eq!(snapshot.counter(tags::METRIC_POOL_RELEASE_RECYCLED_COUNT), Some(2));
        assert!(
            snapshot
                .histogram(tags::METRIC_WRITER_DRAIN_LATENCY_US)
                .map(|histogram| histogram.count)
                .unwrap_or(0)
                == 3
        );
        Ok(())
    }

    #[test]
    fn spill_run_records_file_round_trips() -> Result<(), Box<dyn std::error::Error>> {
        let _guard = TELEMETRY_TEST_MUTEX
            .lock()
            .expect("telemetry test lock poisoned");
        telemetry::reset();

        let dir = TempDir::new()?;
        let buffer = PipeBuffer::new(PipeBufferConfig::spill_with(4, dir.path()))?;
        buffer.run(&b"ABCDEF"[..], Vec::new(), NoopSink)?;

        let snapshot = telemetry::snapshot();
        assert_eq!(snapshot.counter(tags::METRIC_SPILL_WRITE_COUNT), Some(2));
        assert_eq!(snapshot.counter(tags::METRIC_SPILL_READ_COUNT), Some(2));
        assert_eq!(snapshot.counter(tags::METRIC_POOL_RELEASE_RETIRED_COUNT), Some(2));
        assert_eq!(snapshot.gauge(tags::METRIC_POOL_BUFFERED_BYTES), Some(0));
        Ok(())
    }

    #[test]
    fn gauges_saturate_at_zero() {
        let _guard = TELEMETRY_TEST_MUTEX
            .lock()
            .expect("telemetry test lock poisoned");
        telemetry::reset();

        telemetry::add_gauge(tags::METRIC_PENDING_QUEUE_DEPTH, 2, &[]);
        telemetry::sub_gauge_saturating(tags::METRIC_PENDING_QUEUE_DEPTH, 5, &[]);
        assert_eq!(
            telemetry::snapshot().gauge(tags::METRIC_PENDING_QUEUE_DEPTH),
            Some(0)
        );
    }
}

#[cfg(not(feature = "telemetry"))]
mod telemetry_disabled_tests {
    use pipebuf_core::telemetry::{self, tags};

    #[test]
    fn recording_is_a_noop() {
        telemetry::increment_counter(tags::METRIC_WRITER_CHUNK_COUNT, 1, &[]);
        telemetry::set_gauge(tags::METRIC_PENDING_QUEUE_DEPTH, 3, &[]);
        let snapshot = telemetry::snapshot();
        assert!(snapshot.counters.is_empty());
        assert!(snapshot.gauges.is_empty());
    }
}
