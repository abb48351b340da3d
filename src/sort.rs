//! Sortable Call attributes and the comparator built from them
//!
//! Represented as a tagged variant with a total-order comparator over each
//! variant, rather than dynamic dispatch through a boxed closure.

use std::cmp::Ordering;

use strum_macros::{Display, EnumString};

use crate::call::Call;

/// A sortable Call attribute, addressed by the `sort.by` configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum SortField {
    Index,
    From,
    To,
    CallId,
    StartTime,
    State,
    Duration,
}

impl SortField {
    /// Parse a `call-list.sort-field` setting value, accepting both the
    /// kebab-case display form and a couple of common aliases.
    pub fn from_setting(value: &str) -> Option<Self> {
        match value {
            "callindex" | "call-index" => Some(SortField::Index),
            other => other.parse().ok(),
        }
    }

    fn key(self, call: &Call) -> SortKey<'_> {
        match self {
            SortField::Index => SortKey::Index(call.index),
            SortField::From => SortKey::Text(&call.from),
            SortField::To => SortKey::Text(&call.to),
            SortField::CallId => SortKey::Text(&call.callid),
            SortField::StartTime => SortKey::Time(call.start_time()),
            SortField::State => SortKey::State(call.state),
            SortField::Duration => SortKey::Duration(call.duration()),
        }
    }
}

enum SortKey<'a> {
    Index(u64),
    Text(&'a str),
    Time(Option<u64>),
    State(crate::call::CallState),
    Duration(u64),
}

impl<'a> SortKey<'a> {
    fn cmp(&self, other: &SortKey<'a>) -> Ordering {
        match (self, other) {
            (SortKey::Index(a), SortKey::Index(b)) => a.cmp(b),
            (SortKey::Text(a), SortKey::Text(b)) => a.cmp(b),
            (SortKey::Time(a), SortKey::Time(b)) => a.cmp(b),
            (SortKey::State(a), SortKey::State(b)) => (*a as u8).cmp(&(*b as u8)),
            (SortKey::Duration(a), SortKey::Duration(b)) => a.cmp(b),
            _ => Ordering::Equal,
        }
    }
}

/// Total-order comparator for two calls under the given sort configuration.
///
/// Ties are always broken by `index`, ascending, regardless of `asc`, so
/// insertion order remains a stable tiebreaker.
pub fn compare(a: &Call, b: &Call, by: SortField, asc: bool) -> Ordering {
    let ordering = by.key(a).cmp(&by.key(b));
    let ordering = if asc { ordering } else { ordering.reverse() };
    ordering.then_with(|| a.index.cmp(&b.index))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call::Call;

    fn call(index: u64, callid: &str, from: &str) -> Call {
        let mut c = Call::new(index, callid.to_string());
        c.from = from.to_string();
        c
    }

    #[test]
    fn compares_by_index_ascending() {
        let a = call(1, "a", "alice");
        let b = call(2, "b", "bob");
        assert_eq!(compare(&a, &b, SortField::Index, true), Ordering::Less);
        assert_eq!(compare(&a, &b, SortField::Index, false), Ordering::Greater);
    }

    #[test]
    fn ties_break_by_index() {
        let a = call(1, "a", "same");
        let b = call(2, "b", "same");
        assert_eq!(compare(&a, &b, SortField::From, true), Ordering::Less);
        assert_eq!(compare(&a, &b, SortField::From, false), Ordering::Less);
    }

    #[test]
    fn from_setting_accepts_kebab_case_and_aliases() {
        assert_eq!(SortField::from_setting("from"), Some(SortField::From));
        assert_eq!(SortField::from_setting("start-time"), Some(SortField::StartTime));
        assert_eq!(SortField::from_setting("call-index"), Some(SortField::Index));
        assert_eq!(SortField::from_setting("nonsense"), None);
    }
}
