use std::ops::AddAssign;
use std::time::Duration;

use beacon_core::config::Config;
use beacon_store::Store;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::otlp::decode::{CounterIncrement, ServiceSpan};

/// Producer side of the write pipeline. Cheap to clone.
#[derive(Clone)]
pub struct Pipeline {
    spans_tx: mpsc::Sender<Vec<ServiceSpan>>,
    counters_tx: mpsc::Sender<Vec<CounterIncrement>>,
}

/// Background writer tasks; `join` resolves once every `Pipeline` clone is
/// dropped and the remaining buffers are flushed.
pub struct PipelineWorkers {
    spans: JoinHandle<WriteStats>,
    counters: JoinHandle<WriteStats>,
}

pub struct PipelineConfig {
    pub channel_capacity: usize,
    pub flush_interval: Duration,
    pub batch_size: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 256,
            flush_interval: Duration::from_millis(200),
            batch_size: 256,
        }
    }
}

impl From<&Config> for PipelineConfig {
    fn from(cfg: &Config) -> Self {
        Self {
            batch_size: cfg.write_batch_size.max(1),
            flush_interval: Duration::from_millis(cfg.write_flush_ms.max(1)),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WriteStats {
    pub spans: usize,
    pub errors: usize,
    pub counters: usize,
    pub failed: usize,
}

impl AddAssign for WriteStats {
    fn add_assign(&mut self, rhs: Self) {
        self.spans += rhs.spans;
        self.errors += rhs.errors;
        self.counters += rhs.counters;
        self.failed += rhs.failed;
    }
}

impl Pipeline {
    pub fn new(store: Store, cfg: PipelineConfig) -> (Self, PipelineWorkers) {
        let (spans_tx, spans_rx) = mpsc::channel(cfg.channel_capacity);
        let (counters_tx, counters_rx) = mpsc::channel(cfg.channel_capacity);

        let spans = tokio::spawn(run_writer(
            store.clone(),
            spans_rx,
            cfg.batch_size,
            cfg.flush_interval,
            write_spans,
        ));
        let counters = tokio::spawn(run_writer(
            store,
            counters_rx,
            cfg.batch_size,
            cfg.flush_interval,
            write_counters,
        ));

        (
            Self {
                spans_tx,
                counters_tx,
            },
            PipelineWorkers { spans, counters },
        )
    }

    pub async fn submit_spans(&self, spans: Vec<ServiceSpan>) {
        if self.spans_tx.send(spans).await.is_err() {
            warn!("span pipeline dropped batch: receiver closed");
        }
    }

    pub async fn submit_counters(&self, counters: Vec<CounterIncrement>) {
        if self.counters_tx.send(counters).await.is_err() {
            warn!("counter pipeline dropped batch: receiver closed");
        }
    }
}

impl PipelineWorkers {
    pub async fn join(self) -> WriteStats {
        let mut total = WriteStats::default();
        for handle in [self.spans, self.counters] {
            match handle.await {
                Ok(stats) => total += stats,
                Err(e) => warn!(error = %e, "pipeline writer task failed"),
            }
        }
        total
    }
}

async fn run_writer<T>(
    store: Store,
    mut rx: mpsc::Receiver<Vec<T>>,
    batch_size: usize,
    flush_interval: Duration,
    write: fn(&Store, &[T]) -> WriteStats,
) -> WriteStats {
    let mut ticker = tokio::time::interval(flush_interval);
    let mut buffer = Vec::new();
    let mut total = WriteStats::default();
    loop {
        tokio::select! {
            batch = rx.recv() => {
                let Some(batch) = batch else {
                    break;
                };
                buffer.extend(batch);
                if buffer.len() >= batch_size {
                    total += flush(&store, &mut buffer, write);
                }
            }
            _ = ticker.tick() => {
                if !buffer.is_empty() {
                    total += flush(&store, &mut buffer, write);
                }
            }
        }
    }
    if !buffer.is_empty() {
        total += flush(&store, &mut buffer, write);
    }
    total
}

fn flush<T>(store: &Store, buffer: &mut Vec<T>, write: fn(&Store, &[T]) -> WriteStats) -> WriteStats {
    let stats = write(store, buffer);
    if stats.failed > 0 {
        warn!(failed = stats.failed, batch = buffer.len(), "write batch had failures");
    }
    buffer.clear();
    stats
}

/// Stores each span and records every exception event on it.
pub fn write_spans(store: &Store, spans: &[ServiceSpan]) -> WriteStats {
    let mut stats = WriteStats::default();
    for ServiceSpan { service, span } in spans {
        match store.store_span(service, span) {
            Ok(_) => stats.spans += 1,
            Err(e) => {
                warn!(service = %service, span_id = %span.span_id, error = %e, "failed to store span");
                stats.failed += 1;
            }
        }
        for exception in span.exceptions() {
            match store.store_error(service, span, &exception) {
                Ok(_) => stats.errors += 1,
                Err(e) => {
                    warn!(service = %service, error_type = %exception.error_type, error = %e, "failed to store error");
                    stats.failed += 1;
                }
            }
        }
    }
    debug!(spans = stats.spans, errors = stats.errors, "span batch written");
    stats
}

pub fn write_counters(store: &Store, counters: &[CounterIncrement]) -> WriteStats {
    let mut stats = WriteStats::default();
    for inc in counters {
        match store.increment_counter(&inc.service, &inc.counter, &inc.dimension, inc.ts_ms, inc.delta) {
            Ok(_) => stats.counters += 1,
            Err(e) => {
                warn!(service = %inc.service, counter = %inc.counter, error = %e, "failed to increment counter");
                stats.failed += 1;
            }
        }
    }
    debug!(counters = stats.counters, "counter batch written");
    stats
}
