//! The sample record that travels through siphon.

use chrono::{DateTime, TimeZone, Utc};
use std::fmt;
use crate::time;

/// One timestamped, named, integer-valued observation with up to three tags.
///
/// A `Metric` is built once, by the wire decoder or by a poller, pushed into
/// the ingestion queue and consumed by the sink. It carries no identity
/// beyond its fields.
#[derive(Clone, PartialEq, Eq)]
pub struct Metric {
    /// When the sample was taken, to the second.
    pub timestamp: DateTime<Utc>,
    /// The measured quantity.
    pub name: String,
    /// The measurement.
    pub value: i64,
    /// First label, empty when absent.
    pub tag1: String,
    /// Second label, empty when absent.
    pub tag2: String,
    /// Third label, empty when absent.
    pub tag3: String,
}

impl Metric {
    /// Create a new Metric stamped with the current second and no tags.
    ///
    /// # Examples
    ///
    /// ```
    /// use siphon::metric::Metric;
    ///
    /// let m = Metric::new("cpu", 42);
    ///
    /// assert_eq!("cpu", m.name);
    /// assert_eq!(42, m.value);
    /// assert!(m.tag1.is_empty());
    /// ```
    pub fn new<S>(name: S, value: i64) -> Metric
    where
        S: Into<String>,
    {
        Metric {
            timestamp: time::now(),
            name: name.into(),
            value,
            tag1: String::new(),
            tag2: String::new(),
            tag3: String::new(),
        }
    }

    /// Adjust Metric time
    ///
    /// Sub-second precision is dropped.
    pub fn timestamp(mut self, time: DateTime<Utc>) -> Metric {
        self.timestamp = Utc.timestamp(time.timestamp(), 0);
        self
    }

    /// Adjust Metric time from seconds since the Unix epoch, as carried on
    /// the wire.
    ///
    /// # Examples
    ///
    /// ```
    /// use siphon::metric::Metric;
    ///
    /// let m = Metric::new("cpu", 42).timestamp_secs(1_700_000_000);
    ///
    /// assert_eq!("2023-11-14T22:13:20+00:00", m.timestamp.to_rfc3339());
    /// ```
    pub fn timestamp_secs(mut self, secs: u32) -> Metric {
        self.timestamp = Utc.timestamp(i64::from(secs), 0);
        self
    }

    /// Set tags positionally, `tag1` first. Anything past the third is
    /// discarded, missing ones are left empty.
    pub fn tags<I, S>(mut self, tags: I) -> Metric
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut iter = tags.into_iter();
        self.tag1 = iter.next().map(Into::into).unwrap_or_default();
        self.tag2 = iter.next().map(Into::into).unwrap_or_default();
        self.tag3 = iter.next().map(Into::into).unwrap_or_default();
        self
    }
}

impl fmt::Debug for Metric {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Metric {{ name: {}, value: {}, timestamp: {}, tags: [{:?}, {:?}, {:?}] }}",
            self.name,
            self.value,
            self.timestamp.timestamp(),
            self.tag1,
            self.tag2,
            self.tag3
        )
    }
}
