//! Replication modes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How a stream's rows are moved into the target object.
///
/// The empty-string value is a deliberate blank: a stream that declares
/// `mode: ""` keeps it through default merging and serialisation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Mode {
    /// No mode declared.
    #[default]
    #[serde(rename = "")]
    Unspecified,
    /// Drop and reload the whole object.
    FullRefresh,
    /// Move only rows newer than the stored watermark.
    Incremental,
    /// Truncate the object, keep its DDL, then load.
    Truncate,
    /// Point-in-time copy keyed by the update column.
    Snapshot,
    /// Re-read a historical range into an existing object.
    Backfill,
}

impl Mode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unspecified => "",
            Self::FullRefresh => "full-refresh",
            Self::Incremental => "incremental",
            Self::Truncate => "truncate",
            Self::Snapshot => "snapshot",
            Self::Backfill => "backfill",
        }
    }

    #[must_use]
    pub fn is_unspecified(&self) -> bool {
        matches!(self, Self::Unspecified)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kebab_case_wire_format() {
        let m: Mode = serde_yaml::from_str("full-refresh").unwrap();
        assert_eq!(m, Mode::FullRefresh);
        assert_eq!(serde_yaml::to_string(&m).unwrap().trim(), "full-refresh");
    }

    #[test]
    fn empty_string_round_trips() {
        let m: Mode = serde_yaml::from_str("\"\"").unwrap();
        assert_eq!(m, Mode::Unspecified);
        assert!(m.is_unspecified());
        let back = serde_yaml::to_string(&m).unwrap();
        let reparsed: Mode = serde_yaml::from_str(&back).unwrap();
        assert_eq!(reparsed, Mode::Unspecified);
    }

    #[test]
    fn unknown_mode_rejected() {
        let res: Result<Mode, _> = serde_yaml::from_str("upsert");
        assert!(res.is_err());
    }
}
