//! Serde helpers for durations expressed as integer milliseconds.
//!
//! ```ignore
//! #[derive(Serialize, Deserialize)]
//! struct Policy {
//!     #[serde(with = "braid_core::duration::millis")]
//!     timeout: Duration,
//! }
//! ```

/// `Duration` <-> `u64` milliseconds.
pub mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    /// Serialize a duration as whole milliseconds.
    ///
    /// # Errors
    ///
    /// Propagates the serializer's error.
    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let millis = u64::try_from(value.as_millis()).unwrap_or(u64::MAX);
        serializer.serialize_u64(millis)
    }

    /// Deserialize whole milliseconds into a duration.
    ///
    /// # Errors
    ///
    /// Propagates the deserializer's error.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Policy {
        #[serde(with = "super::millis")]
        timeout: Duration,
    }

    #[test]
    fn should_read_milliseconds() {
        let policy: Policy = serde_json::from_str(r#"{"timeout":1500}"#).unwrap();
        assert_eq!(policy.timeout, Duration::from_millis(1500));
    }

    #[test]
    fn should_write_milliseconds() {
        let text = serde_json::to_string(&Policy {
            timeout: Duration::from_secs(2),
        })
        .unwrap();
        assert_eq!(text, r#"{"timeout":2000}"#);
    }
}
