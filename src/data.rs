use fnv::FnvBuildHasher;
use hashbrown::HashMap;
use std::{fmt, time::Duration};

/// Measurements published alongside an event, keyed by measurement name.
pub type Measurements = HashMap<String, MetricValue, FnvBuildHasher>;

/// Free-form metadata published alongside an event.
///
/// Metadata feeds tag extraction and keep/drop policy; tag values are plain
/// strings.
pub type Metadata = HashMap<String, String, FnvBuildHasher>;

/// A single measured value.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MetricValue {
    /// A signed integer value, e.g. a counter delta or a duration in
    /// nanoseconds.
    Signed(i64),

    /// A floating-point value, e.g. a fractional gauge reading.
    Float(f64),
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            MetricValue::Signed(value) => write!(f, "{}", value),
            MetricValue::Float(value) => write!(f, "{}", value),
        }
    }
}

impl From<i64> for MetricValue {
    fn from(value: i64) -> MetricValue {
        MetricValue::Signed(value)
    }
}

impl From<i32> for MetricValue {
    fn from(value: i32) -> MetricValue {
        MetricValue::Signed(i64::from(value))
    }
}

impl From<f64> for MetricValue {
    fn from(value: f64) -> MetricValue {
        MetricValue::Float(value)
    }
}

impl From<Duration> for MetricValue {
    fn from(value: Duration) -> MetricValue {
        MetricValue::Signed(value.as_nanos() as i64)
    }
}

/// The value a measurement source computed from a delivered event.
///
/// Key sources always produce the `Map` shape.  Function sources may produce
/// either shape; only `Map`-shaped success records participate in merging
/// when the capture reporter folds repeated deliveries.
#[derive(Clone, Debug, PartialEq)]
pub enum Extracted {
    /// A measurement map, merged key-wise across repeated deliveries.
    Map(Measurements),

    /// A bare value, stacked rather than merged.
    Value(MetricValue),
}

impl Extracted {
    /// A one-entry measurement map.
    pub fn single<K, V>(key: K, value: V) -> Extracted
    where
        K: Into<String>,
        V: Into<MetricValue>,
    {
        let mut map = Measurements::default();
        map.insert(key.into(), value.into());
        Extracted::Map(map)
    }

    /// The map shape, if this is one.
    pub fn as_map(&self) -> Option<&Measurements> {
        match self {
            Extracted::Map(map) => Some(map),
            Extracted::Value(_) => None,
        }
    }

    /// Looks a measurement up by key, if this is the map shape.
    pub fn get(&self, key: &str) -> Option<MetricValue> {
        self.as_map().and_then(|map| map.get(key)).copied()
    }

    pub(crate) fn is_map(&self) -> bool {
        matches!(self, Extracted::Map(_))
    }
}

impl From<Measurements> for Extracted {
    fn from(map: Measurements) -> Extracted {
        Extracted::Map(map)
    }
}

impl From<MetricValue> for Extracted {
    fn from(value: MetricValue) -> Extracted {
        Extracted::Value(value)
    }
}

/// Builds a `Measurements` map from key/value pairs.
pub fn measurements<I, K, V>(entries: I) -> Measurements
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<MetricValue>,
{
    entries
        .into_iter()
        .map(|(key, value)| (key.into(), value.into()))
        .collect()
}

/// Builds a `Metadata` map from key/value pairs.
pub fn metadata<I, K, V>(entries: I) -> Metadata
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    entries
        .into_iter()
        .map(|(key, value)| (key.into(), value.into()))
        .collect()
}
