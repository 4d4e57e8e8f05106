use crate::{
    data::{Extracted, Measurements, Metadata},
    name::EventName,
};
use std::{fmt, sync::Arc};

type MetadataFn = Arc<dyn Fn(&Metadata) -> Option<Extracted> + Send + Sync>;
type EventFn = Arc<dyn Fn(&Measurements, &Metadata) -> Option<Extracted> + Send + Sync>;
type TagValuesFn = Arc<dyn Fn(&Metadata) -> Metadata + Send + Sync>;
type KeepFn = Arc<dyn Fn(&Metadata) -> bool + Send + Sync>;

/// How a descriptor computes its measurement from a delivered event.
///
/// The shape is resolved once, when the descriptor is built, so delivery only
/// has to match on the variant.
#[derive(Clone)]
pub enum MeasurementSource {
    /// Look a fixed key up in the published measurements.
    Key(String),

    /// Compute the measurement from the published metadata alone.
    FromMetadata(MetadataFn),

    /// Compute the measurement from the published measurements and metadata.
    FromEvent(EventFn),
}

impl MeasurementSource {
    /// A fixed-key lookup into the published measurements.
    pub fn key<K: Into<String>>(key: K) -> MeasurementSource {
        MeasurementSource::Key(key.into())
    }

    /// A measurement computed from the published metadata alone.
    ///
    /// Returning `None` records the `missing` outcome.
    pub fn from_metadata<F>(extract: F) -> MeasurementSource
    where
        F: Fn(&Metadata) -> Option<Extracted> + Send + Sync + 'static,
    {
        MeasurementSource::FromMetadata(Arc::new(extract))
    }

    /// A measurement computed from the published measurements and metadata.
    ///
    /// Returning `None` records the `missing` outcome.
    pub fn from_event<F>(extract: F) -> MeasurementSource
    where
        F: Fn(&Measurements, &Metadata) -> Option<Extracted> + Send + Sync + 'static,
    {
        MeasurementSource::FromEvent(Arc::new(extract))
    }
}

impl From<&str> for MeasurementSource {
    fn from(key: &str) -> MeasurementSource {
        MeasurementSource::key(key)
    }
}

impl fmt::Debug for MeasurementSource {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            MeasurementSource::Key(key) => f.debug_tuple("Key").field(key).finish(),
            MeasurementSource::FromMetadata(_) => f.write_str("FromMetadata(..)"),
            MeasurementSource::FromEvent(_) => f.write_str("FromEvent(..)"),
        }
    }
}

/// The unit attached to a recorded measurement.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Unit {
    #[default]
    Unitless,
    Nanosecond,
    Microsecond,
    Millisecond,
    Second,
    Byte,
    Kilobyte,
    Megabyte,
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let label = match self {
            Unit::Unitless => "unitless",
            Unit::Nanosecond => "nanosecond",
            Unit::Microsecond => "microsecond",
            Unit::Millisecond => "millisecond",
            Unit::Second => "second",
            Unit::Byte => "byte",
            Unit::Kilobyte => "kilobyte",
            Unit::Megabyte => "megabyte",
        };
        f.write_str(label)
    }
}

/// A declarative specification of how to derive a measurement/tag/unit triple
/// from events published under one event name.
///
/// Descriptors are built with chained setters:
///
/// ```
/// use soundcheck::{MeasurementSource, MetricDescriptor, Unit};
///
/// let descriptor = MetricDescriptor::new("db.query", MeasurementSource::key("duration"))
///     .unit(Unit::Nanosecond)
///     .tags(["table"])
///     .keep(|metadata| metadata.get("table").is_some_and(|table| table != "schema_migrations"));
/// ```
#[derive(Clone)]
pub struct MetricDescriptor {
    pub(crate) event_name: EventName,
    pub(crate) measurement: MeasurementSource,
    pub(crate) unit: Unit,
    pub(crate) tags: Vec<String>,
    pub(crate) tag_values: TagValuesFn,
    pub(crate) keep: Option<KeepFn>,
}

impl MetricDescriptor {
    /// Creates a descriptor listening on `event_name`, with no tags, a
    /// unitless unit, an identity tag-value function, and no keep policy.
    pub fn new<N, M>(event_name: N, measurement: M) -> MetricDescriptor
    where
        N: Into<EventName>,
        M: Into<MeasurementSource>,
    {
        MetricDescriptor {
            event_name: event_name.into(),
            measurement: measurement.into(),
            unit: Unit::default(),
            tags: Vec::new(),
            tag_values: Arc::new(Metadata::clone),
            keep: None,
        }
    }

    /// Sets the unit recorded with this descriptor's measurements.
    pub fn unit(mut self, unit: Unit) -> Self {
        self.unit = unit;
        self
    }

    /// Declares the metadata keys to surface as tags.
    ///
    /// Recorded tags are restricted to exactly this key set, even if the
    /// tag-value function returns more.
    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Replaces the identity tag-value function.
    pub fn tag_values<F>(mut self, tag_values: F) -> Self
    where
        F: Fn(&Metadata) -> Metadata + Send + Sync + 'static,
    {
        self.tag_values = Arc::new(tag_values);
        self
    }

    /// Sets a keep policy; events whose metadata fails it are recorded as
    /// dropped for this descriptor.
    pub fn keep<F>(mut self, keep: F) -> Self
    where
        F: Fn(&Metadata) -> bool + Send + Sync + 'static,
    {
        self.keep = Some(Arc::new(keep));
        self
    }

    /// The event name this descriptor listens on.
    pub fn event_name(&self) -> &EventName {
        &self.event_name
    }
}

impl fmt::Debug for MetricDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("MetricDescriptor")
            .field("event_name", &self.event_name)
            .field("measurement", &self.measurement)
            .field("unit", &self.unit)
            .field("tags", &self.tags)
            .field("keep", &self.keep.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::{MeasurementSource, MetricDescriptor, Unit};
    use crate::data::metadata;

    #[test]
    fn test_builder_defaults() {
        let descriptor = MetricDescriptor::new("db.query", "duration");
        assert_eq!(descriptor.event_name().to_string(), "db.query");
        assert_eq!(descriptor.unit, Unit::Unitless);
        assert!(descriptor.tags.is_empty());
        assert!(descriptor.keep.is_none());
        assert!(matches!(descriptor.measurement, MeasurementSource::Key(ref key) if key == "duration"));

        let tags = metadata([("table", "users"), ("shard", "eu-1")]);
        assert_eq!((descriptor.tag_values)(&tags), tags);
    }

    #[test]
    fn test_builder_setters() {
        let descriptor = MetricDescriptor::new("db.query", "duration")
            .unit(Unit::Millisecond)
            .tags(["table"])
            .keep(|metadata| metadata.contains_key("table"));

        assert_eq!(descriptor.unit, Unit::Millisecond);
        assert_eq!(descriptor.tags, vec!["table".to_string()]);

        let keep = descriptor.keep.as_ref().unwrap();
        assert!(keep(&metadata([("table", "users")])));
        assert!(!keep(&metadata([("shard", "eu-1")])));
    }
}
