use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use sql_templates::prelude::*;

const COUNT_TO: &str = "WITH RECURSIVE n(i) AS (SELECT 1 UNION ALL SELECT i + 1 FROM n WHERE i < ?) \
                         SELECT i FROM n";

fn unique_db_path(prefix: &str) -> PathBuf {
    let dir = tempfile::tempdir().expect("create temp dir");
    let path = dir.path().join(format!("{prefix}.db"));
    std::mem::forget(dir);
    path
}

async fn engine(prefix: &str) -> Result<SqlEngine, SqlTemplateError> {
    let path = unique_db_path(prefix);
    SqlEngine::open(EngineConfig::new(SqliteOptions::new(path.to_string_lossy()))).await
}

/// Acknowledges every row from a spawned task after a delay, tracking how many rows are
/// outstanding at once.
struct SlowAcker {
    seen: Vec<i64>,
    outstanding: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    acked: Arc<AtomicUsize>,
    ended_after_acks: Option<usize>,
    delay: Duration,
}

impl SlowAcker {
    fn new(delay: Duration) -> Self {
        Self {
            seen: Vec::new(),
            outstanding: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
            acked: Arc::new(AtomicUsize::new(0)),
            ended_after_acks: None,
            delay,
        }
    }
}

impl RowHandler for SlowAcker {
    fn on_row(&mut self, row: CustomDbRow, ack: RowAck) {
        if let Some(RowValues::Int(i)) = row.get("i") {
            self.seen.push(*i);
        }
        let now = self.outstanding.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        let outstanding = Arc::clone(&self.outstanding);
        let acked = Arc::clone(&self.acked);
        let delay = self.delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            outstanding.fetch_sub(1, Ordering::SeqCst);
            acked.fetch_add(1, Ordering::SeqCst);
            ack.ack();
        });
    }

    fn on_end(&mut self) {
        self.ended_after_acks = Some(self.acked.load(Ordering::SeqCst));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrency_limit_is_never_exceeded() -> Result<(), Box<dyn std::error::Error>> {
    let engine = engine("backpressure").await?;
    let mut handler = SlowAcker::new(Duration::from_millis(20));

    let summary = engine
        .execute_streaming(
            COUNT_TO,
            &[5.into()],
            &mut handler,
            StreamOptions::default().with_max_concurrency(2),
        )
        .await?;

    assert_eq!(handler.seen, vec![1, 2, 3, 4, 5]);
    assert!(handler.peak.load(Ordering::SeqCst) <= 2);
    assert_eq!(summary.rows_delivered, 5);
    assert!(summary.pauses > 0);
    assert_eq!(handler.ended_after_acks, Some(5));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn unbounded_stream_delivers_without_acks() -> Result<(), Box<dyn std::error::Error>> {
    let engine = engine("unbounded").await?;
    let mut held = Vec::new();
    let mut values = Vec::new();
    let mut collect = |row: CustomDbRow, ack: RowAck| {
        values.push(row.get_by_index(0).cloned());
        held.push(ack);
    };

    let summary = engine
        .execute_streaming(
            COUNT_TO,
            &[50.into()],
            &mut collect,
            StreamOptions::default().with_ack_timeout(Duration::from_millis(100)),
        )
        .await;

    // Everything was delivered without a single acknowledgment; draining times out at the end.
    assert!(matches!(summary, Err(SqlTemplateError::AckTimeout(_))));
    assert_eq!(values.len(), 50);
    assert_eq!(values[49], Some(RowValues::Int(50)));
    drop(held);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn immediate_acks_finish_with_on_end() -> Result<(), Box<dyn std::error::Error>> {
    struct Count {
        rows: usize,
        ended: bool,
    }
    impl RowHandler for Count {
        fn on_row(&mut self, _row: CustomDbRow, ack: RowAck) {
            self.rows += 1;
            ack.ack();
        }
        fn on_end(&mut self) {
            self.ended = true;
        }
    }

    let engine = engine("immediate").await?;
    let mut count = Count {
        rows: 0,
        ended: false,
    };
    let summary = engine
        .execute_streaming(
            COUNT_TO,
            &[100.into()],
            &mut count,
            StreamOptions::default().with_max_concurrency(1),
        )
        .await?;
    assert_eq!(count.rows, 100);
    assert!(count.ended);
    assert_eq!(summary.rows_delivered, 100);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn empty_stream_still_ends() -> Result<(), Box<dyn std::error::Error>> {
    let engine = engine("empty_stream").await?;
    engine
        .execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY)")
        .await?;
    let mut rows = 0;
    let summary = engine
        .execute_streaming(
            "SELECT id FROM t WHERE ?",
            &[ParamObject::new().with("id", 1).into()],
            &mut |_row: CustomDbRow, _ack: RowAck| rows += 1,
            StreamOptions::default(),
        )
        .await?;
    assert_eq!(rows, 0);
    assert_eq!(summary, StreamSummary::default());
    Ok(())
}
