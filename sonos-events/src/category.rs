//! Event categories and category argument validation.
//!
//! Categories form a small closed set: the wildcard [`EventCategory::All`],
//! which matches every notification, plus the concrete categories a
//! notification can be classified under. Callers usually name categories by
//! string; matching is case-insensitive.

use std::fmt;
use std::str::FromStr;

use crate::error::EventsError;

/// A tag classifying a notification's subject.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventCategory {
    /// Wildcard: listeners here receive every notification
    #[default]
    All,
    /// The current track changed
    TrackChanged,
}

impl EventCategory {
    /// Every category, wildcard first.
    pub const VALID: [EventCategory; 2] = [EventCategory::All, EventCategory::TrackChanged];

    /// Canonical upper-case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventCategory::All => "ALL",
            EventCategory::TrackChanged => "TRACK_CHANGED",
        }
    }

    pub fn is_wildcard(&self) -> bool {
        matches!(self, EventCategory::All)
    }

    /// Comma-separated canonical names, for error messages.
    pub fn valid_names() -> String {
        Self::VALID
            .iter()
            .map(EventCategory::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for EventCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventCategory {
    type Err = EventsError;

    /// Case-insensitive match against the closed set.
    ///
    /// ```
    /// use sonos_events::EventCategory;
    ///
    /// assert_eq!("all".parse::<EventCategory>().unwrap(), EventCategory::All);
    /// assert_eq!("Track_Changed".parse::<EventCategory>().unwrap(), EventCategory::TrackChanged);
    /// assert!("volume".parse::<EventCategory>().is_err());
    /// ```
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::VALID
            .into_iter()
            .find(|category| category.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| EventsError::InvalidCategory {
                category: s.to_string(),
            })
    }
}

/// A category as supplied by a caller, before validation.
///
/// Built from strings, from an [`EventCategory`], or from a
/// `serde_json::Value` when categories come from dynamic input such as a
/// config file. Non-string JSON values are kept so validation can reject them
/// with [`EventsError::InvalidArgumentType`].
#[derive(Debug, Clone, PartialEq)]
pub enum CategoryArg {
    Text(String),
    Category(EventCategory),
    /// A non-string value; holds the kind of value found
    NotText(&'static str),
}

impl CategoryArg {
    /// Validate and normalize into an [`EventCategory`].
    pub fn resolve(self) -> crate::Result<EventCategory> {
        match self {
            CategoryArg::Text(text) => text.parse(),
            CategoryArg::Category(category) => Ok(category),
            CategoryArg::NotText(kind) => Err(EventsError::InvalidArgumentType {
                found: kind.to_string(),
            }),
        }
    }
}

impl From<&str> for CategoryArg {
    fn from(s: &str) -> Self {
        CategoryArg::Text(s.to_string())
    }
}

impl From<String> for CategoryArg {
    fn from(s: String) -> Self {
        CategoryArg::Text(s)
    }
}

impl From<&String> for CategoryArg {
    fn from(s: &String) -> Self {
        CategoryArg::Text(s.clone())
    }
}

impl From<EventCategory> for CategoryArg {
    fn from(category: EventCategory) -> Self {
        CategoryArg::Category(category)
    }
}

impl From<serde_json::Value> for CategoryArg {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;

        match value {
            Value::String(s) => CategoryArg::Text(s),
            Value::Null => CategoryArg::NotText("null"),
            Value::Bool(_) => CategoryArg::NotText("boolean"),
            Value::Number(_) => CategoryArg::NotText("number"),
            Value::Array(_) => CategoryArg::NotText("array"),
            Value::Object(_) => CategoryArg::NotText("object"),
        }
    }
}

impl From<&serde_json::Value> for CategoryArg {
    fn from(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::String(s) => CategoryArg::Text(s.clone()),
            other => CategoryArg::from(other.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_is_case_insensitive() {
        for input in ["ALL", "all", "All", "aLl"] {
            assert_eq!(input.parse::<EventCategory>().unwrap(), EventCategory::All);
        }
        for input in ["TRACK_CHANGED", "track_changed", "Track_Changed"] {
            assert_eq!(
                input.parse::<EventCategory>().unwrap(),
                EventCategory::TrackChanged
            );
        }
    }

    #[test]
    fn test_parse_rejects_unknown_names() {
        for input in ["", "any", "TRACK-CHANGED", " all", "VOLUME"] {
            match input.parse::<EventCategory>() {
                Err(EventsError::InvalidCategory { category }) => assert_eq!(category, input),
                other => panic!("Expected InvalidCategory for {input:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_display_round_trips_canonical_name() {
        for category in EventCategory::VALID {
            assert_eq!(category.to_string().parse::<EventCategory>().unwrap(), category);
        }
        assert_eq!(EventCategory::valid_names(), "ALL, TRACK_CHANGED");
    }

    #[test]
    fn test_wildcard_is_default() {
        assert_eq!(EventCategory::default(), EventCategory::All);
        assert!(EventCategory::All.is_wildcard());
        assert!(!EventCategory::TrackChanged.is_wildcard());
    }

    #[test]
    fn test_category_arg_from_strings() {
        assert_eq!(
            CategoryArg::from("track_changed").resolve().unwrap(),
            EventCategory::TrackChanged
        );
        assert_eq!(
            CategoryArg::from(String::from("ALL")).resolve().unwrap(),
            EventCategory::All
        );
        assert_eq!(
            CategoryArg::from(EventCategory::TrackChanged).resolve().unwrap(),
            EventCategory::TrackChanged
        );
    }

    #[test]
    fn test_category_arg_from_json() {
        assert_eq!(
            CategoryArg::from(json!("all")).resolve().unwrap(),
            EventCategory::All
        );
        assert!(matches!(
            CategoryArg::from(&json!("nope")).resolve(),
            Err(EventsError::InvalidCategory { .. })
        ));

        for (value, kind) in [
            (json!(42), "number"),
            (json!(null), "null"),
            (json!(true), "boolean"),
            (json!(["ALL"]), "array"),
            (json!({"category": "ALL"}), "object"),
        ] {
            match CategoryArg::from(&value).resolve() {
                Err(EventsError::InvalidArgumentType { found }) => assert_eq!(found, kind),
                other => panic!("Expected InvalidArgumentType for {value}, got {other:?}"),
            }
        }
    }
}
