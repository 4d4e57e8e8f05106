//! Structured metric event emission with a synchronous capture harness.
//!
//! `soundcheck` has two halves.  The [`Emitter`] turns convenience calls like
//! `increment` and `gauge` into publications on an in-process [`EventBus`],
//! splitting the final name segment off as the measurement key.  The
//! [`CaptureReporter`] subscribes to the event names referenced by a set of
//! [`MetricDescriptor`]s and folds every delivery into queryable recorded
//! state, so tests can assert on exactly what was published.
//!
//! ```
//! use soundcheck::{CaptureReporter, Emitter, EventBus, Metadata, MetricDescriptor};
//!
//! let bus = EventBus::new();
//! let reporter = CaptureReporter::start(
//!     &bus,
//!     vec![MetricDescriptor::new("db.query", "count").tags(["table"])],
//! )
//! .unwrap();
//!
//! let mut metadata = Metadata::default();
//! metadata.insert("table".to_string(), "users".to_string());
//!
//! let emitter = Emitter::new(bus);
//! emitter.increment("db.query.count", metadata).unwrap();
//!
//! let recorded = reporter.recorded("db.query").unwrap();
//! let record = recorded.as_merged().unwrap();
//! assert_eq!(record.measurement.get("count"), Some(1i64.into()));
//! ```

mod bus;
mod capture;
mod data;
mod descriptor;
mod emitter;
mod error;
mod helper;
mod name;
mod span;

pub use self::{
    bus::EventBus,
    capture::{CaptureReporter, Outcome, Recorded, SuccessRecord},
    data::{measurements, metadata, Extracted, Measurements, Metadata, MetricValue},
    descriptor::{MeasurementSource, MetricDescriptor, Unit},
    emitter::Emitter,
    error::MetricError,
    name::EventName,
    span::span,
};
