//! Partitioned parallel consumption
//!
//! Reports are keyed by asset: every report of one asset lands on the same
//! worker and is processed in input order, while different assets run on
//! different threads. This is the per-asset ordering the geofence engine
//! relies on.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::thread;

use tracing::debug;

use super::publisher::EventSink;
use super::{IngestOutcome, PositionPipeline, RawPositionMessage};
use crate::error::ProcessingError;

/// Worker index for an asset, stable for a given worker count
pub fn partition_for(asset_id: &str, workers: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    asset_id.hash(&mut hasher);

    (hasher.finish() % workers.max(1) as u64) as usize
}

/// Process a batch of payloads on `workers` threads.
///
/// Results come back in input order. Payloads that do not deserialise are
/// reported as errors in their slot without stopping the batch.
pub fn consume_partitioned<S: EventSink>(
    pipeline: &PositionPipeline<S>,
    payloads: &[String],
    workers: usize,
) -> Vec<Result<IngestOutcome, ProcessingError>> {
    let workers = workers.max(1);
    let mut results: Vec<Option<Result<IngestOutcome, ProcessingError>>> =
        (0..payloads.len()).map(|_| None).collect();
    let mut partitions: Vec<Vec<(usize, RawPositionMessage)>> = (0..workers).map(|_| vec![]).collect();

    for (idx, payload) in payloads.iter().enumerate() {
        match serde_json::from_str::<RawPositionMessage>(payload) {
            Ok(raw) => partitions[partition_for(&raw.asset_id, workers)].push((idx, raw)),
            Err(e) => results[idx] = Some(Err(e.into())),
        }
    }

    let processed: Vec<Vec<(usize, IngestOutcome)>> = thread::scope(|s| {
        let handles: Vec<_> = partitions
            .into_iter()
            .enumerate()
            .map(|(worker, batch)| {
                s.spawn(move || {
                    debug!(worker, reports = batch.len(), "Partition started");
                    batch
                        .into_iter()
                        .map(|(idx, raw)| (idx, pipeline.process(raw)))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|h| match h.join() {
                Ok(done) => done,
                Err(panic) => std::panic::resume_unwind(panic),
            })
            .collect()
    });

    for (idx, outcome) in processed.into_iter().flatten() {
        results[idx] = Some(Ok(outcome));
    }

    results.into_iter().flatten().collect()
}
