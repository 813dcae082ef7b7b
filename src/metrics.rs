use std::fmt::Write as _;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};

pub struct Metrics {
    pub rows_read_total: AtomicU64,
    pub rows_inserted_total: AtomicU64,
    pub rows_dropped_total: AtomicU64,
    pub batches_committed_total: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self {
            rows_read_total: AtomicU64::new(0),
            rows_inserted_total: AtomicU64::new(0),
            rows_dropped_total: AtomicU64::new(0),
            batches_committed_total: AtomicU64::new(0),
        }
    }
}

static METRICS: OnceLock<Metrics> = OnceLock::new();

pub fn metrics() -> &'static Metrics {
    METRICS.get_or_init(Metrics::default)
}

pub fn render_prometheus() -> String {
    let m = metrics();
    let mut s = String::new();
    let _ = writeln!(
        s,
        "# TYPE rows_read_total counter\nrows_read_total {}",
        m.rows_read_total.load(Ordering::Relaxed)
    );
    let _ = writeln!(
        s,
        "# TYPE rows_inserted_total counter\nrows_inserted_total {}",
        m.rows_inserted_total.load(Ordering::Relaxed)
    );
    let _ = writeln!(
        s,
        "# TYPE rows_dropped_total counter\nrows_dropped_total {}",
        m.rows_dropped_total.load(Ordering::Relaxed)
    );
    let _ = writeln!(
        s,
        "# TYPE batches_committed_total counter\nbatches_committed_total {}",
        m.batches_committed_total.load(Ordering::Relaxed)
    );
    s
}
