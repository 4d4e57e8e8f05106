use crate::error::MetricError;
use std::fmt;

/// A hierarchical event name.
///
/// Names are ordered segment sequences, displayed dot-joined.  They can be
/// built from a dot-joined string (`"db.query.count"`) or from a pre-split
/// sequence of segments; both forms are interchangeable everywhere a name is
/// accepted.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct EventName {
    segments: Vec<String>,
}

impl EventName {
    /// Creates an `EventName` from an ordered sequence of segments.
    pub fn new<I, S>(segments: I) -> EventName
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        EventName {
            segments: segments.into_iter().map(Into::into).collect(),
        }
    }

    /// The ordered segments of this name.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Extends this name with one trailing segment.
    pub(crate) fn child(&self, segment: &str) -> EventName {
        let mut segments = self.segments.clone();
        segments.push(segment.to_string());
        EventName { segments }
    }

    /// Splits off the final segment as the measurement key, leaving the
    /// event name prefix.
    ///
    /// A name needs at least two segments for the split to be meaningful;
    /// anything shorter is a usage error.
    pub(crate) fn split_measurement(mut self) -> Result<(EventName, String), MetricError> {
        if self.segments.len() < 2 {
            return Err(MetricError::NameTooShort {
                name: self.to_string(),
            });
        }

        // Guarded above, pop cannot come up empty.
        let key = self.segments.pop().unwrap_or_default();
        Ok((self, key))
    }

    /// Strips a trailing `stop.duration` pair, if present.
    ///
    /// This lets callers pass either the bare span prefix (`"service.call"`)
    /// or the fully-qualified stop-metric form (`"service.call.stop.duration"`)
    /// to a timed measurement; both resolve to the same span prefix.
    pub(crate) fn into_span_prefix(mut self) -> EventName {
        if let [.., next_to_last, last] = self.segments.as_slice() {
            if next_to_last == "stop" && last == "duration" {
                self.segments.truncate(self.segments.len() - 2);
            }
        }
        self
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.segments.join("."))
    }
}

impl From<&str> for EventName {
    fn from(name: &str) -> EventName {
        EventName {
            segments: name.split('.').map(str::to_string).collect(),
        }
    }
}

impl From<String> for EventName {
    fn from(name: String) -> EventName {
        EventName::from(name.as_str())
    }
}

impl From<Vec<String>> for EventName {
    fn from(segments: Vec<String>) -> EventName {
        EventName { segments }
    }
}

impl From<&[&str]> for EventName {
    fn from(segments: &[&str]) -> EventName {
        EventName::new(segments.iter().copied())
    }
}

impl<const N: usize> From<[&str; N]> for EventName {
    fn from(segments: [&str; N]) -> EventName {
        EventName::new(segments)
    }
}

#[cfg(test)]
mod tests {
    use super::EventName;
    use crate::error::MetricError;

    #[test]
    fn test_display_joins_segments() {
        let name = EventName::from("db.query.count");
        assert_eq!(name.segments().len(), 3);
        assert_eq!(name.to_string(), "db.query.count");

        let presplit = EventName::from(["db", "query", "count"]);
        assert_eq!(presplit, name);
    }

    #[test]
    fn test_split_measurement() {
        let (event_name, key) = EventName::from("db.query.count").split_measurement().unwrap();
        assert_eq!(event_name, EventName::from("db.query"));
        assert_eq!(key, "count");
    }

    #[test]
    fn test_split_measurement_needs_two_segments() {
        let result = EventName::from("lonely").split_measurement();
        assert_eq!(
            result,
            Err(MetricError::NameTooShort {
                name: "lonely".to_string()
            })
        );
    }

    #[test]
    fn test_span_prefix_normalization() {
        let bare = EventName::from("service.call").into_span_prefix();
        assert_eq!(bare, EventName::from("service.call"));

        let qualified = EventName::from("service.call.stop.duration").into_span_prefix();
        assert_eq!(qualified, EventName::from("service.call"));

        // Only the exact trailing pair is stripped.
        let other = EventName::from("service.call.stop.count").into_span_prefix();
        assert_eq!(other, EventName::from("service.call.stop.count"));
    }

    #[test]
    fn test_child() {
        let name = EventName::from("service.call").child("start");
        assert_eq!(name.to_string(), "service.call.start");
    }
}
