//! Typed configuration for capture, matching, and sort behavior
//!
//! The store never loads configuration itself; a surrounding config system
//! is expected to populate these structs, or to answer the two named
//! settings through a [`SettingLookup`].

use std::collections::HashMap;

use crate::sort::SortField;

/// Bounds and rotation behavior for the Call Store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureOptions {
    /// Maximum retained calls. `0` means unbounded (rotation disabled).
    pub limit: usize,
    /// Enables FIFO eviction of the oldest unlocked call once `limit` is hit.
    pub rotate: bool,
    /// When false, RTP/RTCP ingress is skipped entirely.
    pub rtp_capture: bool,
    /// Controls whether raw packet payload is retained per message.
    pub storage_mode: StorageMode,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        CaptureOptions {
            limit: 0,
            rotate: false,
            rtp_capture: true,
            storage_mode: StorageMode::Full,
        }
    }
}

/// Whether a `Message` keeps its originating packet's raw payload around.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageMode {
    /// Keep the raw payload bytes on every message.
    Full,
    /// Drop the raw payload after admission; headers remain available.
    HeadersOnly,
}

/// Match-expression and admission-filter configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchOptions {
    /// Extended regex; `None` accepts everything.
    pub mexpr: Option<String>,
    /// Case-insensitive matching.
    pub micase: bool,
    /// Negate the regex verdict.
    pub minvert: bool,
    /// Require the first message of a new call to be an INVITE.
    pub invite: bool,
    /// Require the first message of a new call to be dialog-initiating.
    pub complete: bool,
}

/// Display ordering for the Call Store's sorted list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortOptions {
    pub by: SortField,
    pub asc: bool,
}

impl Default for SortOptions {
    fn default() -> Self {
        SortOptions {
            by: SortField::Index,
            asc: true,
        }
    }
}

/// External setting-lookup collaborator: string key to string value.
///
/// Matches the two config-module settings: `call-list.sort-field` and
/// `call-list.sort-order`.
pub trait SettingLookup {
    fn get(&self, key: &str) -> Option<&str>;
}

/// A trivial in-memory [`SettingLookup`], useful for tests and the demo.
#[derive(Debug, Clone, Default)]
pub struct MapSettings(pub HashMap<String, String>);

impl MapSettings {
    pub fn new() -> Self {
        MapSettings(HashMap::new())
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }
}

impl SettingLookup for MapSettings {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }
}

/// Resolve `call-list.sort-field` / `call-list.sort-order` into a
/// [`SortOptions`], falling back to defaults for unset or unrecognized
/// values.
pub fn sort_options_from_lookup(lookup: &dyn SettingLookup) -> SortOptions {
    let by = lookup
        .get("call-list.sort-field")
        .and_then(SortField::from_setting)
        .unwrap_or(SortField::Index);
    let asc = match lookup.get("call-list.sort-order") {
        Some("desc") | Some("descending") => false,
        _ => true,
    };
    SortOptions { by, asc }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_options_default_disables_rotation() {
        let opts = CaptureOptions::default();
        assert_eq!(opts.limit, 0);
        assert!(!opts.rotate);
    }

    #[test]
    fn sort_options_from_lookup_uses_defaults_when_unset() {
        let lookup = MapSettings::new();
        let opts = sort_options_from_lookup(&lookup);
        assert_eq!(opts.by, SortField::Index);
        assert!(opts.asc);
    }

    #[test]
    fn sort_options_from_lookup_reads_known_settings() {
        let lookup = MapSettings::new()
            .with("call-list.sort-field", "from")
            .with("call-list.sort-order", "desc");
        let opts = sort_options_from_lookup(&lookup);
        assert_eq!(opts.by, SortField::From);
        assert!(!opts.asc);
    }

    #[test]
    fn sort_options_from_lookup_ignores_unknown_field() {
        let lookup = MapSettings::new().with("call-list.sort-field", "bogus");
        let opts = sort_options_from_lookup(&lookup);
        assert_eq!(opts.by, SortField::Index);
    }
}
