use crate::{
    bus::EventBus,
    data::{Measurements, Metadata, MetricValue},
    error::MetricError,
    name::EventName,
    span::span,
};

/// Stateless convenience layer that turns metric-name calls into bus
/// publications.
///
/// For `increment`/`increment_by`/`gauge` the final name segment is the
/// measurement key and the prefix is the event name, so
/// `increment_by("db.query.count", 3, ..)` publishes `db.query` with
/// `{count: 3}`.  `emit` skips the split and publishes the full name with an
/// explicit measurement map.  `Emitter` is cheap to clone; clones publish to
/// the same bus.
#[derive(Clone)]
pub struct Emitter {
    bus: EventBus,
}

impl Emitter {
    /// Creates an emitter publishing to `bus`.
    pub fn new(bus: EventBus) -> Emitter {
        Emitter { bus }
    }

    /// The bus this emitter publishes to.
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Increments the named metric by one.
    pub fn increment<N>(&self, metric: N, metadata: Metadata) -> Result<(), MetricError>
    where
        N: Into<EventName>,
    {
        self.increment_by(metric, 1, metadata)
    }

    /// Increments the named metric by `count`.
    ///
    /// Fails, before anything is published, if the name has no event-name
    /// prefix ahead of the measurement key.
    pub fn increment_by<N>(&self, metric: N, count: i64, metadata: Metadata) -> Result<(), MetricError>
    where
        N: Into<EventName>,
    {
        self.publish_split(metric.into(), MetricValue::Signed(count), metadata)
    }

    /// Publishes a point-in-time reading for the named metric.
    ///
    /// `value` may be integral or fractional.  The name-split rule and its
    /// usage error are the same as for [`Emitter::increment_by`].
    pub fn gauge<N, V>(&self, metric: N, value: V, metadata: Metadata) -> Result<(), MetricError>
    where
        N: Into<EventName>,
        V: Into<MetricValue>,
    {
        self.publish_split(metric.into(), value.into(), metadata)
    }

    /// Publishes an explicit measurement map under the full metric name.
    ///
    /// No trailing segment is stripped; this is the escape hatch for
    /// multi-key publications.
    pub fn emit<N>(&self, metric: N, measurements: Measurements, metadata: Metadata)
    where
        N: Into<EventName>,
    {
        self.bus.publish(&metric.into(), &measurements, &metadata);
    }

    /// Times `f` with the span event triple under the named metric.
    ///
    /// The name may be the bare span prefix or the fully-qualified
    /// `<prefix>.stop.duration` form; a trailing `stop.duration` pair is
    /// stripped before dispatch.  `f` must return the call result together
    /// with the metadata for the stop event.  A panic in `f` propagates
    /// after the exception event is published.
    pub fn measure<N, F, R>(&self, metric: N, start_metadata: Metadata, f: F) -> R
    where
        N: Into<EventName>,
        F: FnOnce() -> (R, Metadata),
    {
        let prefix = metric.into().into_span_prefix();
        span(&self.bus, &prefix, start_metadata, f)
    }

    fn publish_split(
        &self,
        metric: EventName,
        value: MetricValue,
        metadata: Metadata,
    ) -> Result<(), MetricError> {
        let (event_name, key) = metric.split_measurement()?;
        let mut measurements = Measurements::default();
        measurements.insert(key, value);
        self.bus.publish(&event_name, &measurements, &metadata);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::Emitter;
    use crate::{
        bus::EventBus,
        data::{measurements, metadata, Measurements, Metadata, MetricValue},
        error::MetricError,
    };
    use std::sync::{Arc, Mutex};

    fn capture(bus: &EventBus, event: &str) -> Arc<Mutex<Vec<(String, Measurements, Metadata)>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        bus.subscribe(event, event, move |name, measurements, metadata| {
            sink.lock()
                .unwrap()
                .push((name.to_string(), measurements.clone(), metadata.clone()));
        })
        .unwrap();
        seen
    }

    #[test]
    fn test_increment_splits_name() {
        let bus = EventBus::new();
        let seen = capture(&bus, "db.query");
        let emitter = Emitter::new(bus);

        emitter
            .increment("db.query.count", metadata([("table", "users")]))
            .unwrap();
        emitter.increment_by("db.query.count", 3, Metadata::default()).unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].0, "db.query");
        assert_eq!(seen[0].1, measurements([("count", 1)]));
        assert_eq!(seen[0].2, metadata([("table", "users")]));
        assert_eq!(seen[1].1, measurements([("count", 3)]));
    }

    #[test]
    fn test_gauge_takes_fractional_values() {
        let bus = EventBus::new();
        let seen = capture(&bus, "vm.memory");
        let emitter = Emitter::new(bus);

        emitter.gauge("vm.memory.used", 0.75, Metadata::default()).unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0].1.get("used"), Some(&MetricValue::Float(0.75)));
    }

    #[test]
    fn test_single_segment_name_fails_before_publishing() {
        let bus = EventBus::new();
        let seen = capture(&bus, "lonely");
        let emitter = Emitter::new(bus);

        let result = emitter.increment("lonely", Metadata::default());
        assert_eq!(
            result,
            Err(MetricError::NameTooShort {
                name: "lonely".to_string()
            })
        );
        assert_eq!(
            emitter.gauge("lonely", 1.0, Metadata::default()),
            Err(MetricError::NameTooShort {
                name: "lonely".to_string()
            })
        );
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_emit_uses_full_name() {
        let bus = EventBus::new();
        let stripped = capture(&bus, "http.request");
        let full = capture(&bus, "http.request.count");
        let emitter = Emitter::new(bus);

        emitter.emit(
            "http.request.count",
            measurements([("count", 3), ("bytes", 512)]),
            Metadata::default(),
        );

        assert!(stripped.lock().unwrap().is_empty());
        let full = full.lock().unwrap();
        assert_eq!(full.len(), 1);
        assert_eq!(full[0].1, measurements([("count", 3), ("bytes", 512)]));
    }

    #[test]
    fn test_measure_returns_result() {
        let bus = EventBus::new();
        let start = capture(&bus, "service.call.start");
        let stop = capture(&bus, "service.call.stop");
        let emitter = Emitter::new(bus);

        let result = emitter.measure("service.call.stop.duration", Metadata::default(), || {
            ("done", metadata([("status", "200")]))
        });

        assert_eq!(result, "done");
        assert_eq!(start.lock().unwrap().len(), 1);
        let stop = stop.lock().unwrap();
        assert_eq!(stop.len(), 1);
        assert!(stop[0].1.contains_key("duration"));
        assert_eq!(stop[0].2.get("status").map(String::as_str), Some("200"));
    }
}
