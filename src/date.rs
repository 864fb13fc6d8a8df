use anyhow::{anyhow, Result};
use serde_json::Value;
use std::fmt;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime, PrimitiveDateTime, UtcOffset};

/// A point in time as the legacy datastore recorded it.
///
/// Some models only keep a calendar date, most keep a naive wall-clock time in the
/// site's local zone, and a few (or re-imported dumps) carry an explicit offset.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Moment {
    Date(Date),
    Local(PrimitiveDateTime),
    Zoned(OffsetDateTime),
}

impl Moment {
    /// Parse `YYYY-MM-DD`, `YYYY-MM-DD[T ]HH:MM:SS[.fff]` or RFC3339.
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if let Ok(dt) = OffsetDateTime::parse(s, &Rfc3339) {
            return Ok(Moment::Zoned(dt));
        }
        if s.len() == 10 {
            let d = Date::parse(s, format_description!("[year]-[month]-[day]"))
                .map_err(|e| anyhow!("invalid date {s:?}: {e}"))?;
            return Ok(Moment::Date(d));
        }
        let naive = s.replacen(' ', "T", 1);
        PrimitiveDateTime::parse(
            &naive,
            format_description!("[year]-[month]-[day]T[hour]:[minute]:[second][optional [.[subsecond]]]"),
        )
        .map(Moment::Local)
        .map_err(|e| anyhow!("invalid timestamp {s:?}: {e}"))
    }

    /// Read a JSON field: strings are parsed, integers are unix seconds (UTC).
    pub fn from_value(v: &Value) -> Option<Self> {
        match v {
            Value::String(s) => Moment::parse(s).ok(),
            Value::Number(n) => n
                .as_i64()
                .and_then(|secs| OffsetDateTime::from_unix_timestamp(secs).ok())
                .map(Moment::Zoned),
            _ => None,
        }
    }

    /// Dates gain a midnight time; anything with a time passes through.
    pub fn at_midnight(self) -> Self {
        match self {
            Moment::Date(d) => Moment::Local(d.midnight()),
            other => other,
        }
    }

    pub fn is_date_only(&self) -> bool {
        matches!(self, Moment::Date(_))
    }

    /// Convert to UTC, reading naive values as wall-clock time at `local`.
    /// `None` when the shifted instant falls outside the supported year range.
    pub fn to_utc(self, local: UtcOffset) -> Option<OffsetDateTime> {
        let zoned = match self {
            Moment::Date(d) => d.midnight().assume_offset(local),
            Moment::Local(dt) => dt.assume_offset(local),
            Moment::Zoned(dt) => dt,
        };
        zoned.checked_to_offset(UtcOffset::UTC)
    }
}

impl fmt::Display for Moment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Moment::Date(d) => d.format(format_description!("[year]-[month]-[day]")),
            Moment::Local(dt) => {
                dt.format(format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"))
            }
            Moment::Zoned(dt) => dt.format(&Rfc3339),
        }
        .map_err(|_| fmt::Error)?;
        f.write_str(&s)
    }
}

/// Parse a fixed UTC offset: `+HH:MM`, `-HH:MM`, `Z` or `UTC`.
pub fn parse_utc_offset(s: &str) -> Result<UtcOffset> {
    let s = s.trim();
    if s.eq_ignore_ascii_case("z") || s.eq_ignore_ascii_case("utc") {
        return Ok(UtcOffset::UTC);
    }
    UtcOffset::parse(s, format_description!("[offset_hour sign:mandatory]:[offset_minute]"))
        .map_err(|e| anyhow!("invalid UTC offset {s:?} (expected +HH:MM): {e}"))
}

/// `YYYY-MM-DD HH:MM:SS`, the layout WXR importers expect for GMT dates.
pub fn format_wxr(dt: OffsetDateTime) -> String {
    dt.to_offset(UtcOffset::UTC)
        .format(format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"))
        .unwrap_or_default()
}
