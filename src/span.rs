use crate::{
    bus::EventBus,
    data::{Measurements, Metadata, MetricValue},
    helper::panic_message,
    name::EventName,
};
use std::{
    panic::{catch_unwind, resume_unwind, AssertUnwindSafe},
    time::{Duration, Instant, SystemTime, UNIX_EPOCH},
};

/// Instruments `f` with the start/stop/exception event triple.
///
/// Publishes `prefix.start` with a wall-clock `system_time` measurement and
/// `start_metadata`, then runs `f`.  On a normal `(result, stop_metadata)`
/// return, publishes `prefix.stop` with the elapsed `duration` and
/// `stop_metadata`, then hands back `result`.  If `f` panics, publishes
/// `prefix.exception` with the elapsed `duration` and the start metadata
/// extended with the panic kind and reason, then resumes the unwind; the
/// panic is never swallowed.
pub fn span<F, R>(bus: &EventBus, prefix: &EventName, start_metadata: Metadata, f: F) -> R
where
    F: FnOnce() -> (R, Metadata),
{
    let started = Instant::now();
    bus.publish(
        &prefix.child("start"),
        &start_measurements(),
        &start_metadata,
    );

    match catch_unwind(AssertUnwindSafe(f)) {
        Ok((result, stop_metadata)) => {
            bus.publish(
                &prefix.child("stop"),
                &duration_measurements(started.elapsed()),
                &stop_metadata,
            );
            result
        }
        Err(fault) => {
            let mut exception_metadata = start_metadata;
            exception_metadata.insert("kind".to_string(), "panic".to_string());
            exception_metadata.insert("reason".to_string(), panic_message(&*fault).to_string());
            bus.publish(
                &prefix.child("exception"),
                &duration_measurements(started.elapsed()),
                &exception_metadata,
            );
            resume_unwind(fault)
        }
    }
}

fn start_measurements() -> Measurements {
    let system_time = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos() as i64)
        .unwrap_or(0);

    let mut measurements = Measurements::default();
    measurements.insert("system_time".to_string(), MetricValue::Signed(system_time));
    measurements
}

fn duration_measurements(elapsed: Duration) -> Measurements {
    let mut measurements = Measurements::default();
    measurements.insert("duration".to_string(), MetricValue::from(elapsed));
    measurements
}

#[cfg(test)]
mod tests {
    use super::span;
    use crate::{
        bus::EventBus,
        data::{metadata, Measurements, Metadata},
        name::EventName,
    };
    use std::{
        panic::{catch_unwind, AssertUnwindSafe},
        sync::{Arc, Mutex},
    };

    fn record_all(bus: &EventBus, events: &[&str]) -> Arc<Mutex<Vec<(String, Measurements, Metadata)>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        for &event in events {
            let seen = seen.clone();
            bus.subscribe(event, event, move |name, measurements, metadata| {
                seen.lock()
                    .unwrap()
                    .push((name.to_string(), measurements.clone(), metadata.clone()));
            })
            .unwrap();
        }
        seen
    }

    #[test]
    fn test_span_publishes_start_and_stop() {
        let bus = EventBus::new();
        let seen = record_all(&bus, &["job.run.start", "job.run.stop"]);

        let result = span(&bus, &EventName::from("job.run"), metadata([("id", "1")]), || {
            (42, metadata([("outcome", "ok")]))
        });
        assert_eq!(result, 42);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);

        let (start_name, start_measurements, start_metadata) = &seen[0];
        assert_eq!(start_name, "job.run.start");
        assert!(start_measurements.contains_key("system_time"));
        assert_eq!(start_metadata.get("id").map(String::as_str), Some("1"));

        let (stop_name, stop_measurements, stop_metadata) = &seen[1];
        assert_eq!(stop_name, "job.run.stop");
        assert!(stop_measurements.contains_key("duration"));
        assert_eq!(stop_metadata.get("outcome").map(String::as_str), Some("ok"));
    }

    #[test]
    fn test_span_publishes_exception_and_propagates() {
        let bus = EventBus::new();
        let seen = record_all(&bus, &["job.run.exception"]);

        let fault = catch_unwind(AssertUnwindSafe(|| {
            span::<_, ()>(&bus, &EventName::from("job.run"), metadata([("id", "1")]), || {
                panic!("boom")
            })
        }));
        assert!(fault.is_err());

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);

        let (name, measurements, metadata) = &seen[0];
        assert_eq!(name, "job.run.exception");
        assert!(measurements.contains_key("duration"));
        assert_eq!(metadata.get("kind").map(String::as_str), Some("panic"));
        assert_eq!(metadata.get("reason").map(String::as_str), Some("boom"));
        assert_eq!(metadata.get("id").map(String::as_str), Some("1"));
    }
}
