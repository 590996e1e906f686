use crate::error::ParseError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// Identifier of an idea: a numeric base plus an optional session tag.
///
/// Ids generated by different sessions carry the generating session as a
/// suffix (`"72.alice"`), so two sessions allocating the same base never
/// produce the same identity. Untagged ids serialize as plain numbers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IdeaId {
    base: i64,
    session: Option<String>,
}

impl IdeaId {
    pub fn new(base: i64) -> Self {
        Self {
            base,
            session: None,
        }
    }

    pub fn tagged(base: i64, session: impl Into<String>) -> Self {
        Self {
            base,
            session: Some(session.into()),
        }
    }

    /// Tag `base` with `session` when one is given
    pub fn with_session(base: i64, session: Option<&str>) -> Self {
        match session {
            Some(session) => Self::tagged(base, session),
            None => Self::new(base),
        }
    }

    pub fn base(&self) -> i64 {
        self.base
    }

    pub fn session(&self) -> Option<&str> {
        self.session.as_deref()
    }

    /// Read an id from a raw JSON value.
    ///
    /// Numbers and strings are both accepted; `71.5` and `"71.5"` are the
    /// same identity (base 71, tag `5`).
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(number) => match number.as_i64() {
                Some(base) => Some(Self::new(base)),
                None => match number.as_f64() {
                    Some(float) if float.fract() == 0.0 => Some(Self::new(float as i64)),
                    _ => number.to_string().parse().ok(),
                },
            },
            Value::String(text) => text.parse().ok(),
            _ => None,
        }
    }

    pub fn to_value(&self) -> Value {
        match &self.session {
            Some(_) => Value::String(self.to_string()),
            None => Value::from(self.base),
        }
    }
}

impl From<i64> for IdeaId {
    fn from(base: i64) -> Self {
        Self::new(base)
    }
}

impl From<i32> for IdeaId {
    fn from(base: i32) -> Self {
        Self::new(i64::from(base))
    }
}

impl FromStr for IdeaId {
    type Err = ParseError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseError::invalid_id("", text);
        match text.split_once('.') {
            Some((base, session)) if !session.is_empty() => {
                let base = base.trim().parse().map_err(|_| invalid())?;
                Ok(Self::tagged(base, session))
            }
            Some(_) => Err(invalid()),
            None => text.trim().parse().map(Self::new).map_err(|_| invalid()),
        }
    }
}

impl fmt::Display for IdeaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.session {
            Some(session) => write!(f, "{}.{}", self.base, session),
            None => write!(f, "{}", self.base),
        }
    }
}

impl Serialize for IdeaId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match &self.session {
            Some(_) => serializer.collect_str(self),
            None => serializer.serialize_i64(self.base),
        }
    }
}

impl<'de> Deserialize<'de> for IdeaId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_value(&value)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid idea id: {value}")))
    }
}

/// Sequential id allocator for new ideas within a document
///
/// Bases in `reserved` are skipped, so ids handed out never collide with
/// ideas already present. Once the base passes `i64::MAX` the allocator is
/// exhausted and hands out nothing.
#[derive(Debug, Clone)]
pub struct IdAllocator {
    next: Option<i64>,
    session: Option<String>,
    reserved: HashSet<i64>,
}

impl IdAllocator {
    /// Allocate from `max_base + 1` upwards
    pub fn after(max_base: i64, session: Option<&str>) -> Self {
        Self {
            next: max_base.checked_add(1),
            session: session.map(str::to_string),
            reserved: HashSet::new(),
        }
    }

    pub fn starting_at(base: i64, session: Option<&str>, reserved: HashSet<i64>) -> Self {
        Self {
            next: Some(base),
            session: session.map(str::to_string),
            reserved,
        }
    }

    /// Generate next available id, `None` when no base is left
    pub fn next_id(&mut self) -> Option<IdeaId> {
        let mut base = self.next?;
        while self.reserved.contains(&base) {
            base = match base.checked_add(1) {
                Some(next) => next,
                None => {
                    self.next = None;
                    return None;
                }
            };
        }
        self.next = base.checked_add(1);
        Some(IdeaId::with_session(base, self.session.as_deref()))
    }

    pub fn session(&self) -> Option<&str> {
        self.session.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_plain_and_tagged_ids() {
        assert_eq!("10".parse::<IdeaId>().unwrap(), IdeaId::new(10));
        assert_eq!("2.b".parse::<IdeaId>().unwrap(), IdeaId::tagged(2, "b"));
        assert_eq!("-3".parse::<IdeaId>().unwrap(), IdeaId::new(-3));
        assert!("xxx".parse::<IdeaId>().is_err());
        assert!("5.".parse::<IdeaId>().is_err());
    }

    #[test]
    fn test_numeric_and_string_forms_are_the_same_identity() {
        let from_number = IdeaId::from_value(&json!(71.5)).unwrap();
        let from_string = IdeaId::from_value(&json!("71.5")).unwrap();
        assert_eq!(from_number, from_string);
        assert_eq!(from_number.base(), 71);
        assert_eq!(from_number.session(), Some("5"));
    }

    #[test]
    fn test_serialization_shape() {
        assert_eq!(serde_json::to_value(IdeaId::new(4)).unwrap(), json!(4));
        assert_eq!(
            serde_json::to_value(IdeaId::tagged(4, "sess")).unwrap(),
            json!("4.sess")
        );
        let back: IdeaId = serde_json::from_value(json!("4.sess")).unwrap();
        assert_eq!(back, IdeaId::tagged(4, "sess"));
    }

    #[test]
    fn test_sequential_ids() {
        let mut gen = IdAllocator::after(55, None);
        assert_eq!(gen.next_id(), Some(IdeaId::new(56)));
        assert_eq!(gen.next_id(), Some(IdeaId::new(57)));
    }

    #[test]
    fn test_allocator_tags_and_skips_reserved() {
        let reserved: HashSet<i64> = [780, 781].into_iter().collect();
        let mut gen = IdAllocator::starting_at(779, Some("abc"), reserved);
        assert_eq!(gen.next_id(), Some(IdeaId::tagged(779, "abc")));
        assert_eq!(gen.next_id(), Some(IdeaId::tagged(782, "abc")));
    }

    #[test]
    fn test_allocator_stops_at_largest_base() {
        let mut gen = IdAllocator::after(i64::MAX - 1, None);
        assert_eq!(gen.next_id(), Some(IdeaId::new(i64::MAX)));
        assert_eq!(gen.next_id(), None);
        assert_eq!(IdAllocator::after(i64::MAX, None).next_id(), None);

        let reserved: HashSet<i64> = [i64::MAX].into_iter().collect();
        assert_eq!(IdAllocator::starting_at(i64::MAX, None, reserved).next_id(), None);
    }
}
