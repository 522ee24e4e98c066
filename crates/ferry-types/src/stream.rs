//! Per-stream configuration: the stream config itself, its option bags,
//! and the polymorphic pieces (`primary_key`, `columns`) whose YAML shape
//! must survive a round-trip.

use serde::de::{MapAccess, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use serde_yaml::Value as YamlValue;
use std::fmt;

use crate::mode::Mode;

/// Placeholders in `object` that vary per discovered stream. A wildcard
/// whose object template carries none of these cannot address its
/// expansions individually and is read as a single stream instead.
pub const STREAM_VARS: &[&str] = &[
    "stream_table",
    "stream_name",
    "stream_file_path",
    "stream_file_name",
];

/// A primary or update key reference: either one column or a list.
///
/// The input shape is kept so re-serialisation matches the source YAML.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeyRef {
    One(String),
    Many(Vec<String>),
}

impl KeyRef {
    /// The key columns as a list, whatever the input shape was.
    #[must_use]
    pub fn as_list(&self) -> Vec<String> {
        match self {
            Self::One(k) => vec![k.clone()],
            Self::Many(ks) => ks.clone(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::One(k) => k.is_empty(),
            Self::Many(ks) => ks.is_empty(),
        }
    }
}

/// One typed column.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    #[serde(rename = "type", default)]
    pub data_type: String,
}

/// An ordered column list.
///
/// Deserialises from either the mapping form (`name: type`, document order
/// preserved) or the sequence-of-entries form; always serialises as the
/// sequence form. Never sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Columns(pub Vec<ColumnSpec>);

impl Columns {
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.0.iter().map(|c| c.name.clone()).collect()
    }
}

impl<'de> Deserialize<'de> for Columns {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct ColumnsVisitor;

        impl<'de> Visitor<'de> for ColumnsVisitor {
            type Value = Columns;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a `name: type` mapping or a sequence of column entries")
            }

            fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut cols = Vec::new();
                while let Some((name, data_type)) = map.next_entry::<String, Option<String>>()? {
                    cols.push(ColumnSpec {
                        name,
                        data_type: data_type.unwrap_or_default(),
                    });
                }
                Ok(Columns(cols))
            }

            fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
            where
                A: SeqAccess<'de>,
            {
                let mut cols = Vec::new();
                while let Some(col) = seq.next_element::<ColumnSpec>()? {
                    cols.push(col);
                }
                Ok(Columns(cols))
            }
        }

        deserializer.deserialize_any(ColumnsVisitor)
    }
}

/// Ordered hook descriptor lists, by stage. Replication-level configs use
/// `start`/`end`; stream-level configs use `pre`/`post`. Descriptors stay
/// opaque here; parsing them is the hook layer's job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HookMap {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<Vec<YamlValue>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<Vec<YamlValue>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre: Option<Vec<YamlValue>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post: Option<Vec<YamlValue>>,
}

impl HookMap {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.start.is_none() && self.end.is_none() && self.pre.is_none() && self.post.is_none()
    }
}

/// Source-side option bag.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_select: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub empty_as_null: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delimiter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flatten: Option<bool>,
    /// Legacy placement of the column list; the stream-level `columns`
    /// key is the preferred surface.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columns: Option<Columns>,
}

impl SourceOptions {
    /// Fill unset fields from `defaults`, one level deep.
    pub fn merge_defaults(&mut self, defaults: &SourceOptions) {
        if self.limit.is_none() {
            self.limit = defaults.limit;
        }
        if self.offset.is_none() {
            self.offset = defaults.offset;
        }
        if self.range.is_none() {
            self.range = defaults.range.clone();
        }
        if self.file_select.is_none() {
            self.file_select = defaults.file_select.clone();
        }
        if self.empty_as_null.is_none() {
            self.empty_as_null = defaults.empty_as_null;
        }
        if self.header.is_none() {
            self.header = defaults.header;
        }
        if self.delimiter.is_none() {
            self.delimiter = defaults.delimiter.clone();
        }
        if self.flatten.is_none() {
            self.flatten = defaults.flatten;
        }
        if self.columns.is_none() {
            self.columns = defaults.columns.clone();
        }
    }
}

/// Target-side option bag.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TargetOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_max_bytes: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_max_rows: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adjust_column_types: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub add_new_columns: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_ddl: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_tmp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delimiter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columns: Option<Columns>,
}

impl TargetOptions {
    /// Fill unset fields from `defaults`, one level deep.
    pub fn merge_defaults(&mut self, defaults: &TargetOptions) {
        if self.file_max_bytes.is_none() {
            self.file_max_bytes = defaults.file_max_bytes;
        }
        if self.file_max_rows.is_none() {
            self.file_max_rows = defaults.file_max_rows;
        }
        if self.adjust_column_types.is_none() {
            self.adjust_column_types = defaults.adjust_column_types;
        }
        if self.add_new_columns.is_none() {
            self.add_new_columns = defaults.add_new_columns;
        }
        if self.table_ddl.is_none() {
            self.table_ddl = defaults.table_ddl.clone();
        }
        if self.table_tmp.is_none() {
            self.table_tmp = defaults.table_tmp.clone();
        }
        if self.delimiter.is_none() {
            self.delimiter = defaults.delimiter.clone();
        }
        if self.columns.is_none() {
            self.columns = defaults.columns.clone();
        }
    }
}

/// Configuration for one stream. The same type doubles as the `defaults`
/// block, where every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamConfig {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "Mode::is_unspecified")]
    pub mode: Mode,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub object: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub select: Vec<String>,
    #[serde(rename = "where", default, skip_serializing_if = "String::is_empty")]
    pub where_: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_key: Option<KeyRef>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub update_key: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub sql: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_options: Option<SourceOptions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_options: Option<TargetOptions>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub schedule: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub disabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub single: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transforms: Option<YamlValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columns: Option<Columns>,
    #[serde(default, skip_serializing_if = "HookMap::is_empty")]
    pub hooks: HookMap,
}

impl StreamConfig {
    /// Primary key columns as a list, whatever the declared shape.
    #[must_use]
    pub fn primary_key_list(&self) -> Vec<String> {
        self.primary_key
            .as_ref()
            .map(KeyRef::as_list)
            .unwrap_or_default()
    }

    /// Whether the `object` template references any per-stream variable.
    #[must_use]
    pub fn object_has_stream_vars(&self) -> bool {
        STREAM_VARS
            .iter()
            .any(|v| self.object.contains(&format!("{{{v}}}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primary_key_scalar_shape_round_trips() {
        let cfg: StreamConfig = serde_yaml::from_str("primary_key: id").unwrap();
        assert_eq!(cfg.primary_key, Some(KeyRef::One("id".into())));
        assert_eq!(cfg.primary_key_list(), vec!["id".to_string()]);

        let out = serde_yaml::to_string(&cfg).unwrap();
        assert!(out.contains("primary_key: id"));
    }

    #[test]
    fn primary_key_list_shape_round_trips() {
        let cfg: StreamConfig = serde_yaml::from_str("primary_key: [id, ts]").unwrap();
        assert_eq!(
            cfg.primary_key_list(),
            vec!["id".to_string(), "ts".to_string()]
        );
        let out = serde_yaml::to_string(&cfg).unwrap();
        let back: StreamConfig = serde_yaml::from_str(&out).unwrap();
        assert_eq!(back.primary_key, cfg.primary_key);
    }

    #[test]
    fn columns_mapping_preserves_document_order() {
        let yaml = "columns:\n  zeta: bigint\n  alpha: text\n  mid: 'decimal(10,2)'\n";
        let cfg: StreamConfig = serde_yaml::from_str(yaml).unwrap();
        let cols = cfg.columns.unwrap();
        assert_eq!(cols.names(), vec!["zeta", "alpha", "mid"]);
        assert_eq!(cols.0[2].data_type, "decimal(10,2)");
    }

    #[test]
    fn columns_sequence_form_accepted() {
        let yaml = "columns:\n  - {name: a, type: int}\n  - {name: b, type: text}\n";
        let cfg: StreamConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.columns.unwrap().names(), vec!["a", "b"]);
    }

    #[test]
    fn object_stream_vars_detection() {
        let mut cfg = StreamConfig {
            object: "{target_schema}.{stream_table}".into(),
            ..StreamConfig::default()
        };
        assert!(cfg.object_has_stream_vars());

        cfg.object = "{target_schema}.fixed_table".into();
        assert!(!cfg.object_has_stream_vars());
    }

    #[test]
    fn mode_blank_is_kept_distinct_from_absent() {
        let with_blank: StreamConfig = serde_yaml::from_str("mode: \"\"").unwrap();
        assert!(with_blank.mode.is_unspecified());

        let absent: StreamConfig = serde_yaml::from_str("object: x").unwrap();
        assert!(absent.mode.is_unspecified());
        // presence is tracked by the parser's raw maps, not by the value
    }

    #[test]
    fn source_options_merge_is_one_level() {
        let mut opts = SourceOptions {
            limit: Some(0),
            ..SourceOptions::default()
        };
        let defaults = SourceOptions {
            limit: Some(100),
            header: Some(true),
            ..SourceOptions::default()
        };
        opts.merge_defaults(&defaults);
        assert_eq!(opts.limit, Some(0), "set field survives merging");
        assert_eq!(opts.header, Some(true), "unset field inherits");
    }
}
