use crate::{
    bus::EventBus,
    data::{Extracted, Measurements, Metadata},
    descriptor::{MeasurementSource, MetricDescriptor, Unit},
    error::MetricError,
    helper::panic_message,
    name::EventName,
};
use crossbeam_channel::{unbounded, Sender};
use fnv::FnvBuildHasher;
use hashbrown::HashMap;
use log::{debug, warn};
use std::{
    panic::{catch_unwind, AssertUnwindSafe},
    sync::atomic::{AtomicUsize, Ordering},
    sync::mpsc,
    thread,
};

static REPORTER_ID: AtomicUsize = AtomicUsize::new(0);

fn next_reporter_id() -> usize {
    REPORTER_ID.fetch_add(1, Ordering::SeqCst)
}

/// What a descriptor recorded for one delivered event.
#[derive(Clone, Debug, PartialEq)]
pub enum Outcome {
    /// Extraction succeeded; the measurement/unit/tags triple.
    Record(SuccessRecord),

    /// The measurement source produced no value.
    Missing,

    /// The keep policy rejected the event.
    Dropped,

    /// Extraction faulted; the fault was caught and isolated to this
    /// descriptor.
    Invalid,
}

/// A successfully extracted measurement with its unit and tags.
#[derive(Clone, Debug, PartialEq)]
pub struct SuccessRecord {
    pub measurement: Extracted,
    pub unit: Unit,
    pub tags: Metadata,
}

impl SuccessRecord {
    /// Folds `incoming` into this record.
    ///
    /// Map-shaped measurements union key-wise with incoming keys winning;
    /// the incoming unit and tags replace the previous ones either way.
    fn merged_with(self, incoming: SuccessRecord) -> SuccessRecord {
        let measurement = match (self.measurement, incoming.measurement) {
            (Extracted::Map(mut merged), Extracted::Map(update)) => {
                merged.extend(update);
                Extracted::Map(merged)
            }
            (_, measurement) => measurement,
        };

        SuccessRecord {
            measurement,
            unit: incoming.unit,
            tags: incoming.tags,
        }
    }
}

/// Recorded state for one event name.
///
/// An event that has only ever produced map-shaped success records stays a
/// single `Merged` record; the first non-mergeable outcome degrades it to a
/// most-recent-first `Sequence`, and it never merges again.  Callers must be
/// prepared for either shape.
#[derive(Clone, Debug, PartialEq)]
pub enum Recorded {
    /// One success record, measurement maps unioned across deliveries.
    Merged(SuccessRecord),

    /// Most-recent-first outcomes, kept once merging became impossible.
    Sequence(Vec<Outcome>),
}

impl Recorded {
    /// The single merged record, if that is the current shape.
    pub fn as_merged(&self) -> Option<&SuccessRecord> {
        match self {
            Recorded::Merged(record) => Some(record),
            Recorded::Sequence(_) => None,
        }
    }

    /// The outcome sequence, if that is the current shape.
    pub fn as_sequence(&self) -> Option<&[Outcome]> {
        match self {
            Recorded::Merged(_) => None,
            Recorded::Sequence(outcomes) => Some(outcomes),
        }
    }
}

enum ReporterMessage {
    Deliver { event: String, outcomes: Vec<Outcome> },
    Query {
        event: String,
        reply: mpsc::SyncSender<Option<Recorded>>,
    },
    Shutdown,
}

/// Captures events for a fixed set of metric descriptors so tests can assert
/// on what was published.
///
/// One bus subscription is registered per distinct event name; every
/// delivered event is applied to each descriptor sharing that name
/// independently, and the outcomes are folded into recorded state owned by a
/// dedicated reporter thread.  Queries travel the same mailbox as
/// deliveries, so a query observes everything the querying thread published
/// before it.  Dropping the reporter unsubscribes everything it registered.
pub struct CaptureReporter {
    mailbox: Sender<ReporterMessage>,
    bus: EventBus,
    handler_ids: Vec<String>,
    handle: Option<thread::JoinHandle<()>>,
}

impl CaptureReporter {
    /// Starts a reporter capturing `metrics` from `bus`.
    ///
    /// Fails if `metrics` is empty.
    pub fn start(bus: &EventBus, metrics: Vec<MetricDescriptor>) -> Result<CaptureReporter, MetricError> {
        if metrics.is_empty() {
            return Err(MetricError::NoMetrics);
        }

        // Group by event name, preserving registration order within and
        // across groups.
        let mut groups: Vec<(EventName, Vec<MetricDescriptor>)> = Vec::new();
        for metric in metrics {
            match groups.iter().position(|(name, _)| *name == metric.event_name) {
                Some(index) => groups[index].1.push(metric),
                None => groups.push((metric.event_name.clone(), vec![metric])),
            }
        }

        let reporter_id = next_reporter_id();
        let (mailbox, queue) = unbounded();
        let handle = thread::spawn(move || run(queue));
        let mut reporter = CaptureReporter {
            mailbox,
            bus: bus.clone(),
            handler_ids: Vec::new(),
            handle: Some(handle),
        };

        for (event_name, descriptors) in groups {
            let display = event_name.to_string();
            let id = format!("capture-{}-{}", reporter_id, display);
            let deliveries = reporter.mailbox.clone();
            let event = display.clone();

            bus.subscribe(&id, event_name, move |_, measurements, metadata| {
                let outcomes = descriptors
                    .iter()
                    .map(|descriptor| apply_descriptor(descriptor, measurements, metadata))
                    .collect();
                let _ = deliveries.send(ReporterMessage::Deliver {
                    event: event.clone(),
                    outcomes,
                });
            })?;
            reporter.handler_ids.push(id);
            debug!("capture reporter {} subscribed to {}", reporter_id, display);
        }

        Ok(reporter)
    }

    /// Queries the recorded state for a dot-joined event name.
    ///
    /// Returns `None` for an event that was never recorded.  Querying has no
    /// side effects; two queries with no publication in between return the
    /// same value.
    pub fn recorded(&self, event: &str) -> Option<Recorded> {
        let (reply, response) = mpsc::sync_channel(1);
        let query = ReporterMessage::Query {
            event: event.to_string(),
            reply,
        };
        if self.mailbox.send(query).is_err() {
            return None;
        }

        response.recv().ok().flatten()
    }
}

impl Drop for CaptureReporter {
    fn drop(&mut self) {
        for id in &self.handler_ids {
            self.bus.unsubscribe(id);
        }
        let _ = self.mailbox.send(ReporterMessage::Shutdown);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Applies one descriptor to one delivered event.
///
/// Faults anywhere in extraction, keep policy, or tagging are caught here and
/// recorded as `Invalid`; they never reach sibling descriptors or the
/// reporter thread.
fn apply_descriptor(
    descriptor: &MetricDescriptor,
    measurements: &Measurements,
    metadata: &Metadata,
) -> Outcome {
    let applied = catch_unwind(AssertUnwindSafe(|| {
        let extracted = match &descriptor.measurement {
            MeasurementSource::Key(key) => measurements
                .get(key)
                .map(|value| Extracted::single(key.clone(), *value)),
            MeasurementSource::FromMetadata(extract) => extract(metadata),
            MeasurementSource::FromEvent(extract) => extract(measurements, metadata),
        };
        let Some(measurement) = extracted else {
            return Outcome::Missing;
        };

        if let Some(keep) = &descriptor.keep {
            if !keep(metadata) {
                return Outcome::Dropped;
            }
        }

        let mut tags = (descriptor.tag_values)(metadata);
        tags.retain(|key, _| descriptor.tags.iter().any(|declared| declared == key));

        Outcome::Record(SuccessRecord {
            measurement,
            unit: descriptor.unit,
            tags,
        })
    }));

    match applied {
        Ok(outcome) => outcome,
        Err(fault) => {
            warn!(
                "extraction for {} faulted: {}",
                descriptor.event_name,
                panic_message(&*fault)
            );
            Outcome::Invalid
        }
    }
}

fn run(queue: crossbeam_channel::Receiver<ReporterMessage>) {
    let mut state: HashMap<String, Recorded, FnvBuildHasher> = HashMap::default();
    while let Ok(message) = queue.recv() {
        match message {
            ReporterMessage::Deliver { event, outcomes } => {
                for outcome in outcomes {
                    fold(&mut state, &event, outcome);
                }
            }
            ReporterMessage::Query { event, reply } => {
                let _ = reply.send(state.get(&event).cloned());
            }
            ReporterMessage::Shutdown => break,
        }
    }
}

fn fold(state: &mut HashMap<String, Recorded, FnvBuildHasher>, event: &str, outcome: Outcome) {
    let next = match (state.remove(event), outcome) {
        (None, Outcome::Record(record)) if record.measurement.is_map() => Recorded::Merged(record),
        (None, outcome) => Recorded::Sequence(vec![outcome]),
        (Some(Recorded::Merged(previous)), Outcome::Record(record))
            if record.measurement.is_map() =>
        {
            Recorded::Merged(previous.merged_with(record))
        }
        (Some(Recorded::Merged(previous)), outcome) => {
            Recorded::Sequence(vec![outcome, Outcome::Record(previous)])
        }
        (Some(Recorded::Sequence(mut outcomes)), outcome) => {
            outcomes.insert(0, outcome);
            Recorded::Sequence(outcomes)
        }
    };
    state.insert(event.to_string(), next);
}
