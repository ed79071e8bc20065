//! Sink stage - hands routed records to sinks and settles their leases
//!
//! Every sink receiving records in a batch gets its own task so a slow sink
//! does not serialise the others. For sinks that do not manage
//! acknowledgements themselves, the stage takes the records' leases before
//! the call and releases them with the call's outcome.

use std::sync::Arc;

use conduit_acks::EventHandle;
use conduit_protocol::Record;
use conduit_routing::{RoutedBatch, SinkId};
use conduit_sinks::{Sink, SinkResult};
use tokio::task::JoinHandle;

use crate::metrics::PipelineMetrics;

struct PendingWrite {
    sink: SinkId,
    records: usize,
    task: JoinHandle<SinkResult<()>>,
    leases: Vec<EventHandle>,
}

/// Sinks of one pipeline, indexed by [`SinkId`]
pub(crate) struct SinkStage {
    pipeline: Arc<str>,
    sinks: Vec<Arc<dyn Sink>>,
    metrics: Arc<PipelineMetrics>,
}

impl SinkStage {
    pub(crate) fn new(
        pipeline: Arc<str>,
        sinks: Vec<Arc<dyn Sink>>,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        Self {
            pipeline,
            sinks,
            metrics,
        }
    }

    #[inline]
    pub(crate) fn sinks(&self) -> &[Arc<dyn Sink>] {
        &self.sinks
    }

    /// Write every sub-batch and wait for all of them
    pub(crate) async fn dispatch(&self, routed: RoutedBatch) {
        let mut pending = Vec::with_capacity(self.sinks.len());

        for (sink_id, mut records) in routed.into_sinks() {
            let Some(sink) = self.sinks.get(sink_id.as_usize()) else {
                tracing::warn!(pipeline = %self.pipeline, sink_id = %sink_id, "records routed to unknown sink");
                release_all(&mut records, false);
                continue;
            };

            let leases = if sink.manages_acknowledgements() {
                Vec::new()
            } else {
                records.iter_mut().filter_map(Record::take_handle).collect()
            };
            let count = records.len();
            let sink = Arc::clone(sink);
            pending.push(PendingWrite {
                sink: sink_id,
                records: count,
                task: tokio::spawn(async move { sink.output(records).await }),
                leases,
            });
        }

        for write in pending {
            let name = self.sink_name(write.sink);
            let success = match write.task.await {
                Ok(Ok(())) => true,
                Ok(Err(e)) => {
                    tracing::warn!(
                        pipeline = %self.pipeline,
                        sink = %name,
                        records = write.records,
                        error = %e,
                        "sink write failed"
                    );
                    false
                }
                Err(e) => {
                    tracing::warn!(
                        pipeline = %self.pipeline,
                        sink = %name,
                        records = write.records,
                        error = %e,
                        "sink task aborted"
                    );
                    false
                }
            };

            for lease in &write.leases {
                lease.release(success);
            }
            self.metrics.record_sink_write(write.records, success);
        }
    }

    fn sink_name(&self, id: SinkId) -> &str {
        self.sinks
            .get(id.as_usize())
            .map_or("unknown", |s| s.name())
    }
}

fn release_all(records: &mut [Record], positive: bool) {
    for record in records {
        if let Some(handle) = record.take_handle() {
            handle.release(positive);
        }
    }
}
