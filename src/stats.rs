//! Per-template invocation timing and plain-text reports.
//!
//! Queries are grouped by the source they were registered from (a template file, or
//! [`ADHOC_SOURCE`] for raw SQL). A report lists every registered query with its invocation count
//! and average connection-acquisition, connection-release, and query times in milliseconds.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

use crate::error::SqlTemplateError;

/// Source name used for statements executed without a registered template.
pub const ADHOC_SOURCE: &str = "adhoc";

/// Timing of one engine invocation. Offsets are measured from `started`.
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationStat {
    pub started: DateTime<Utc>,
    pub got_connection: Option<Duration>,
    pub released_connection: Option<Duration>,
    /// From connection acquired to the last row produced.
    pub query_time: Option<Duration>,
    /// The fully resolved SQL, when resolution succeeded.
    pub sql: Option<String>,
}

#[derive(Debug)]
struct QueryStats {
    name: String,
    template: String,
    invocations: Vec<InvocationStat>,
}

#[derive(Debug, Default)]
struct StatsInner {
    /// Source names in registration order, each with its queries in registration order.
    sources: Vec<(String, Vec<QueryStats>)>,
    index: HashMap<(String, String), (usize, usize)>,
}

impl StatsInner {
    fn slot(&mut self, source: &str, name: &str, template: &str) -> (usize, usize) {
        let key = (source.to_string(), name.to_string());
        if let Some(&slot) = self.index.get(&key) {
            return slot;
        }
        let s = match self.sources.iter().position(|(src, _)| src == source) {
            Some(s) => s,
            None => {
                self.sources.push((source.to_string(), Vec::new()));
                self.sources.len() - 1
            }
        };
        let queries = &mut self.sources[s].1;
        queries.push(QueryStats {
            name: name.to_string(),
            template: template.to_string(),
            invocations: Vec::new(),
        });
        let slot = (s, queries.len() - 1);
        self.index.insert(key, slot);
        slot
    }
}

/// Collects [`InvocationStat`]s, shared by every in-flight request of one engine.
#[derive(Debug, Default)]
pub struct StatsCollector {
    inner: Mutex<StatsInner>,
}

impl StatsCollector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, StatsInner> {
        // Clear the poison and continue with the recovered data
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Register a query so it appears in reports even if it is never invoked.
    pub fn register(&self, source: &str, name: &str, template: &str) {
        self.lock().slot(source, name, template);
    }

    /// Start timing one invocation. Registers the query on first use.
    #[must_use]
    pub fn begin(self: &Arc<Self>, source: &str, name: &str, template: &str) -> InvocationTimer {
        let slot = self.lock().slot(source, name, template);
        InvocationTimer {
            collector: Arc::clone(self),
            slot,
            clock: Instant::now(),
            stat: InvocationStat {
                started: Utc::now(),
                got_connection: None,
                released_connection: None,
                query_time: None,
                sql: None,
            },
        }
    }

    /// Recorded invocations of one query, oldest first.
    #[must_use]
    pub fn invocations(&self, source: &str, name: &str) -> Vec<InvocationStat> {
        let inner = self.lock();
        inner
            .index
            .get(&(source.to_string(), name.to_string()))
            .map(|&(s, q)| inner.sources[s].1[q].invocations.clone())
            .unwrap_or_default()
    }

    /// Template text a query was registered with.
    #[must_use]
    pub fn template(&self, source: &str, name: &str) -> Option<String> {
        let inner = self.lock();
        inner
            .index
            .get(&(source.to_string(), name.to_string()))
            .map(|&(s, q)| inner.sources[s].1[q].template.clone())
    }

    #[must_use]
    pub fn sources(&self) -> Vec<String> {
        self.lock().sources.iter().map(|(s, _)| s.clone()).collect()
    }

    /// Render the report for one source, or `None` if nothing was registered under it.
    #[must_use]
    pub fn render_report(&self, source: &str) -> Option<String> {
        let inner = self.lock();
        let (_, queries) = inner.sources.iter().find(|(s, _)| s == source)?;

        let mut out = format!("{source} Statistics\n\n");
        for query in queries {
            let _ = write!(out, " \n{}\n", query.name);
            if query.invocations.is_empty() {
                out.push_str("(N/A)\n");
                continue;
            }
            let calls = &query.invocations;
            let _ = writeln!(out, "Invocations: {}", calls.len());
            let _ = writeln!(
                out,
                "Average getConnection: {}",
                average_ms(calls.iter().map(|c| c.got_connection))
            );
            let _ = writeln!(
                out,
                "Average releaseConnection: {}",
                average_ms(calls.iter().map(|c| c.released_connection))
            );
            let _ = writeln!(
                out,
                "Average queryTime: {}",
                average_ms(calls.iter().map(|c| c.query_time))
            );
        }
        Some(out)
    }

    /// Write one `<source>.stats` file per source into `dir`, with `/` in source names replaced
    /// by `-`. Returns the written paths.
    ///
    /// # Errors
    /// Returns [`SqlTemplateError::Io`] if the directory cannot be created or a file cannot be
    /// written.
    pub fn write_reports(&self, dir: &Path) -> Result<Vec<PathBuf>, SqlTemplateError> {
        std::fs::create_dir_all(dir)?;
        let mut written = Vec::new();
        for source in self.sources() {
            let Some(report) = self.render_report(&source) else {
                continue;
            };
            let path = dir.join(format!("{}.stats", source.replace('/', "-")));
            std::fs::write(&path, report)?;
            tracing::debug!(path = %path.display(), "wrote statistics report");
            written.push(path);
        }
        Ok(written)
    }
}

fn average_ms(samples: impl Iterator<Item = Option<Duration>>) -> String {
    let (sum, count) = samples
        .flatten()
        .fold((Duration::ZERO, 0u32), |(sum, n), d| (sum + d, n + 1));
    if count == 0 {
        "N/A".to_string()
    } else {
        format!("{:.3} ms", (sum / count).as_secs_f64() * 1000.0)
    }
}

/// Timing handle for one invocation; recorded into the collector when dropped.
#[derive(Debug)]
pub struct InvocationTimer {
    collector: Arc<StatsCollector>,
    slot: (usize, usize),
    clock: Instant,
    stat: InvocationStat,
}

impl InvocationTimer {
    pub fn resolved(&mut self, sql: &str) {
        self.stat.sql = Some(sql.to_string());
    }

    pub fn connection_acquired(&mut self) {
        self.stat.got_connection = Some(self.clock.elapsed());
    }

    pub fn query_finished(&mut self) {
        if let Some(got) = self.stat.got_connection {
            self.stat.query_time = Some(self.clock.elapsed().saturating_sub(got));
        }
    }

    pub fn connection_released(&mut self) {
        self.stat.released_connection = Some(self.clock.elapsed());
    }
}

impl Drop for InvocationTimer {
    fn drop(&mut self) {
        let stat = self.stat.clone();
        let (s, q) = self.slot;
        self.collector.lock().sources[s].1[q].invocations.push(stat);
    }
}
