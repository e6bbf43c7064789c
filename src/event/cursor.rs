//! Keyset pagination over the public catalog.

use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};

use super::Event;
use crate::error::ServerError;

pub const DEFAULT_LIMIT: i64 = 20;
pub const MAX_LIMIT: i64 = 100;

/// Catalog ordering.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SortKey {
    /// `start_at ASC, id ASC`.
    #[default]
    StartAt,
    /// `created_at DESC, id DESC`.
    CreatedAt,
}

impl SortKey {
    /// Unknown values fall back on [`SortKey::StartAt`].
    pub fn parse(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_lowercase()).as_deref() {
            Some("createdat" | "created_at") => SortKey::CreatedAt,
            _ => SortKey::StartAt,
        }
    }

    /// Sort value of an event under this ordering.
    pub fn value(&self, event: &Event) -> DateTime<Utc> {
        match self {
            SortKey::StartAt => event.start_at,
            SortKey::CreatedAt => event.created_at,
        }
    }
}

/// Last seen `(sort value, id)` pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Cursor {
    pub value: DateTime<Utc>,
    pub id: i64,
}

impl Cursor {
    pub fn of(sort: SortKey, event: &Event) -> Self {
        Self {
            value: sort.value(event),
            id: event.id,
        }
    }

    /// `<RFC 3339 UTC with microseconds>|<id>`.
    pub fn encode(&self) -> String {
        format!(
            "{}|{}",
            self.value.to_rfc3339_opts(SecondsFormat::Micros, true),
            self.id
        )
    }

    /// Whether `event` sorts strictly after this cursor.
    pub fn admits(&self, sort: SortKey, event: &Event) -> bool {
        let key = (sort.value(event), event.id);
        match sort {
            SortKey::StartAt => key > (self.value, self.id),
            SortKey::CreatedAt => key < (self.value, self.id),
        }
    }
}

impl FromStr for Cursor {
    type Err = ServerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || ServerError::InvalidInput("malformed cursor".into());
        let (value, id) = s.rsplit_once('|').ok_or_else(malformed)?;

        Ok(Self {
            value: DateTime::parse_from_rfc3339(value)
                .map_err(|_| malformed())?
                .with_timezone(&Utc),
            id: id.parse().map_err(|_| malformed())?,
        })
    }
}

/// Clamp a requested page size into `[1, MAX_LIMIT]`.
pub fn clamp_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
}

/// Comma separated IDs, unparsable entries are ignored.
pub fn parse_ids(value: Option<&str>) -> Vec<i64> {
    value
        .unwrap_or_default()
        .split(',')
        .filter_map(|id| id.trim().parse().ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_cursor_text() {
        let cursor = Cursor {
            value: Utc.with_ymd_and_hms(2025, 3, 1, 18, 30, 0).unwrap(),
            id: 17,
        };
        let text = cursor.encode();

        assert_eq!(text, "2025-03-01T18:30:00.000000Z|17");
        assert_eq!(text.parse::<Cursor>().unwrap(), cursor);
    }

    #[test]
    fn test_malformed_cursor() {
        for bad in ["", "17", "yesterday|17", "2025-03-01T18:30:00Z|", "2025-03-01T18:30:00Z|x"] {
            assert!(
                matches!(bad.parse::<Cursor>(), Err(ServerError::InvalidInput(_))),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_query_helpers() {
        assert_eq!(clamp_limit(None), 20);
        assert_eq!(clamp_limit(Some(0)), 1);
        assert_eq!(clamp_limit(Some(-4)), 1);
        assert_eq!(clamp_limit(Some(1000)), 100);

        assert_eq!(parse_ids(Some("1, 2,x,,3")), vec![1, 2, 3]);
        assert!(parse_ids(None).is_empty());

        assert_eq!(SortKey::parse(Some("createdAt")), SortKey::CreatedAt);
        assert_eq!(SortKey::parse(Some("created_at")), SortKey::CreatedAt);
        assert_eq!(SortKey::parse(Some("title")), SortKey::StartAt);
        assert_eq!(SortKey::parse(None), SortKey::StartAt);
    }
}
