use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::DexError;

/// Catalog entry identifier, unique within a namespace.
pub type EntryId = u32;

/// (namespace, entry) pair identifying one tracked entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntryKey {
    pub namespace: String,
    pub entry: EntryId,
}

impl EntryKey {
    pub fn new(namespace: impl Into<String>, entry: EntryId) -> Self {
        Self {
            namespace: namespace.into(),
            entry,
        }
    }
}

/// The fixed set of completion flags attached to one entry.
///
/// Absence of a record is equivalent to all-false; there is no
/// "unknown" state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CatchFlags {
    pub normal: bool,
    pub shiny: bool,
    pub alpha: bool,
    pub alpha_shiny: bool,
}

impl CatchFlags {
    pub fn get(&self, field: FlagField) -> bool {
        match field {
            FlagField::Normal => self.normal,
            FlagField::Shiny => self.shiny,
            FlagField::Alpha => self.alpha,
            FlagField::AlphaShiny => self.alpha_shiny,
        }
    }

    pub fn set(&mut self, field: FlagField, value: bool) {
        match field {
            FlagField::Normal => self.normal = value,
            FlagField::Shiny => self.shiny = value,
            FlagField::Alpha => self.alpha = value,
            FlagField::AlphaShiny => self.alpha_shiny = value,
        }
    }

    /// Convenience constructor for a record with one field set.
    pub fn with(field: FlagField, value: bool) -> Self {
        let mut flags = Self::default();
        flags.set(field, value);
        flags
    }

    /// True when at least one flag is set.
    pub fn any(&self) -> bool {
        self.normal || self.shiny || self.alpha || self.alpha_shiny
    }
}

/// Closed set of flag field identifiers.
///
/// Field names arriving as strings are validated here, at the boundary,
/// before they can reach the store or the pending queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FlagField {
    Normal,
    Shiny,
    Alpha,
    AlphaShiny,
}

impl FlagField {
    pub const ALL: [FlagField; 4] = [
        FlagField::Normal,
        FlagField::Shiny,
        FlagField::Alpha,
        FlagField::AlphaShiny,
    ];

    /// Wire name for this field.
    pub fn as_str(&self) -> &'static str {
        match self {
            FlagField::Normal => "normal",
            FlagField::Shiny => "shiny",
            FlagField::Alpha => "alpha",
            FlagField::AlphaShiny => "alphaShiny",
        }
    }
}

impl std::fmt::Display for FlagField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for FlagField {
    type Err = DexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "normal" => Ok(FlagField::Normal),
            "shiny" => Ok(FlagField::Shiny),
            "alpha" => Ok(FlagField::Alpha),
            "alphaShiny" => Ok(FlagField::AlphaShiny),
            other => Err(DexError::UnknownField { name: other.into() }),
        }
    }
}

/// One unsynced flag mutation.
///
/// Ops are append-only; a queued op is never edited in place, only
/// superseded by a later op during consolidation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingOp {
    pub namespace: String,
    pub entry: EntryId,
    pub field: FlagField,
    pub value: bool,
    pub timestamp: DateTime<Utc>,
}

impl PendingOp {
    pub fn key(&self) -> EntryKey {
        EntryKey::new(self.namespace.clone(), self.entry)
    }
}

/// Observable snapshot of the tracker's sync state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncStatus {
    pub is_online: bool,
    pub is_syncing: bool,
    pub last_sync_time: Option<DateTime<Utc>>,
    pub pending_ops: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catch_flags_wire_names() {
        let flags = CatchFlags {
            normal: false,
            shiny: true,
            alpha: false,
            alpha_shiny: true,
        };
        let json = serde_json::to_value(flags).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "normal": false,
                "shiny": true,
                "alpha": false,
                "alphaShiny": true
            })
        );
    }

    #[test]
    fn catch_flags_missing_fields_default_false() {
        let flags: CatchFlags = serde_json::from_str(r#"{"shiny": true}"#).unwrap();
        assert!(flags.shiny);
        assert!(!flags.normal);
        assert!(!flags.alpha);
        assert!(!flags.alpha_shiny);

        let empty: CatchFlags = serde_json::from_str("{}").unwrap();
        assert_eq!(empty, CatchFlags::default());
    }

    #[test]
    fn flag_field_parse_round_trip() {
        for field in FlagField::ALL {
            let parsed: FlagField = field.as_str().parse().unwrap();
            assert_eq!(parsed, field);
        }
    }

    #[test]
    fn flag_field_rejects_unknown_names() {
        let err = "sparkly".parse::<FlagField>().unwrap_err();
        assert!(matches!(err, DexError::UnknownField { name } if name == "sparkly"));
    }

    #[test]
    fn get_set_cover_every_field() {
        let mut flags = CatchFlags::default();
        for field in FlagField::ALL {
            assert!(!flags.get(field));
            flags.set(field, true);
            assert!(flags.get(field));
        }
        assert!(flags.any());
    }

    #[test]
    fn pending_op_serde_round_trip() {
        let op = PendingOp {
            namespace: "default".into(),
            entry: 25,
            field: FlagField::AlphaShiny,
            value: true,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_string(&op).unwrap();
        let back: PendingOp = serde_json::from_str(&json).unwrap();
        assert_eq!(op, back);
        assert_eq!(back.key(), EntryKey::new("default", 25));
    }
}
