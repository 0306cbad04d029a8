use chrono::Duration;
use de::Visitor;
use serde::de;
use serde::{Deserializer, Serializer};

pub fn bool_from_str_or_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer.deserialize_any(BoolOrStringVisitor)
}

struct BoolOrStringVisitor;

impl<'de> Visitor<'de> for BoolOrStringVisitor {
    type Value = bool;

    fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
        formatter.write_str("a boolean or string of \"true\", \"false\".")
    }

    fn visit_bool<E>(self, value: bool) -> Result<bool, E>
    where
        E: de::Error,
    {
        Ok(value)
    }

    fn visit_str<E>(self, value: &str) -> Result<bool, E>
    where
        E: de::Error,
    {
        match value {
            "true" => Ok(true),
            "false" => Ok(false),
            _s => Err(E::custom(format!("Unknown string value: {}", _s))),
        }
    }
}

/// A [`Duration`] written as whole seconds.
pub mod seconds {
    use super::*;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_i64(duration.num_seconds())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(SecondsVisitor)
    }

    struct SecondsVisitor;

    impl<'de> Visitor<'de> for SecondsVisitor {
        type Value = Duration;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("a number of seconds, as an integer or a string")
        }

        fn visit_i64<E>(self, value: i64) -> Result<Duration, E>
        where
            E: de::Error,
        {
            seconds(value)
        }

        fn visit_u64<E>(self, value: u64) -> Result<Duration, E>
        where
            E: de::Error,
        {
            i64::try_from(value)
                .map_err(|_| E::custom(format!("too many seconds: {}", value)))
                .and_then(seconds)
        }

        fn visit_str<E>(self, value: &str) -> Result<Duration, E>
        where
            E: de::Error,
        {
            value
                .trim()
                .parse::<i64>()
                .map_err(|_| E::custom(format!("Unknown seconds value: {}", value)))
                .and_then(seconds)
        }
    }

    fn seconds<E: de::Error>(value: i64) -> Result<Duration, E> {
        Duration::try_seconds(value).ok_or_else(|| E::custom(format!("too many seconds: {}", value)))
    }
}
