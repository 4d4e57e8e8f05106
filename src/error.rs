use thiserror::Error;

/// Errors surfaced by the emitter, the bus, and the capture reporter.
///
/// All of these are usage errors: they signal a malformed call, not a
/// recoverable runtime condition.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MetricError {
    /// The metric name cannot be split into an event name and a measurement
    /// key, i.e. it has fewer than two segments.
    #[error("metric name {name:?} needs an event name and a measurement key")]
    NameTooShort { name: String },

    /// The capture reporter was started without any metric descriptors.
    #[error("capture reporter needs at least one metric descriptor")]
    NoMetrics,

    /// A bus handler with this id is already subscribed.
    #[error("handler {id:?} is already subscribed")]
    DuplicateHandler { id: String },
}
