//! Compiled tasks: the fully resolved unit-of-work descriptors the planner
//! hands to the runner. Tasks are immutable once built; selection may drop
//! them but never edits them.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_yaml::Value as YamlValue;

use crate::connection::{self, ConnKind};
use crate::mode::Mode;
use crate::stream::{Columns, SourceOptions, StreamConfig, TargetOptions};

/// Where and how to read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    pub conn: String,
    pub stream: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub query: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub select: Vec<String>,
    #[serde(rename = "where", default, skip_serializing_if = "String::is_empty")]
    pub where_: String,
    /// Always the list form; the declared shape lives on the stream config.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub primary_key: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub update_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<SourceOptions>,
}

/// Where and how to write.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TargetDescriptor {
    pub conn: String,
    pub object: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columns: Option<Columns>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<TargetOptions>,
}

/// One executable replication task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub source: SourceDescriptor,
    pub target: TargetDescriptor,
    #[serde(default, skip_serializing_if = "Mode::is_unspecified")]
    pub mode: Mode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transforms: Option<YamlValue>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub env: IndexMap<String, String>,
    /// The stream key as written in the YAML document.
    pub stream_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub incremental_value_str: String,
    /// The defaulted stream config this task was built from.
    pub stream: StreamConfig,
}

impl Task {
    /// Template variables derivable from this task: stream components,
    /// object components, and connection buckets. Values the task cannot
    /// resolve are absent; placeholders relying on them stay literal for
    /// the runner.
    #[must_use]
    pub fn format_map(&self) -> IndexMap<String, String> {
        let mut map = IndexMap::new();
        let mut put = |k: &str, v: String| {
            if !v.is_empty() {
                map.insert(k.to_string(), v);
            }
        };

        put("stream_name", self.stream_name.clone());

        let file_like = self.stream_name.contains("://")
            || connection::conn_kind(&self.source.conn) == ConnKind::File;
        if file_like {
            let (_, bucket, path) = connection::parse_url(&self.stream_name);
            let (folder, name, ext) = connection::split_file_path(&path);
            put("source_bucket", bucket);
            put("stream_file_path", path);
            put("stream_file_folder", folder);
            put("stream_file_name", name);
            put("stream_file_ext", ext);
        } else {
            let table = connection::parse_table_name(&self.stream_name);
            put("stream_schema", table.schema.clone());
            put("stream_table", table.name.clone());
            if !table.schema.is_empty() {
                put("stream_full_name", table.full_name());
            }
        }

        let object = connection::parse_table_name(&self.target.object);
        put("object_schema", object.schema.clone());
        put("object_table", object.name.clone());
        put("object_name", object.name.clone());
        if !object.schema.is_empty() {
            put("object_full_name", object.full_name());
        }

        let (_, target_bucket, _) = connection::parse_url(&self.target.conn);
        put("target_bucket", target_bucket);

        if !self.stream.id.is_empty() {
            put("stream_run_id", self.stream.id.clone());
        }

        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db_task() -> Task {
        Task {
            source: SourceDescriptor {
                conn: "my_pg".into(),
                stream: "public.users".into(),
                ..SourceDescriptor::default()
            },
            target: TargetDescriptor {
                conn: "my_snowflake".into(),
                object: "analytics.users".into(),
                ..TargetDescriptor::default()
            },
            stream_name: "public.users".into(),
            ..Task::default()
        }
    }

    #[test]
    fn format_map_db_stream() {
        let map = db_task().format_map();
        assert_eq!(map["stream_schema"], "public");
        assert_eq!(map["stream_table"], "users");
        assert_eq!(map["stream_full_name"], "public.users");
        assert_eq!(map["object_schema"], "analytics");
        assert_eq!(map["object_full_name"], "analytics.users");
        assert!(!map.contains_key("stream_file_path"));
    }

    #[test]
    fn format_map_file_stream() {
        let task = Task {
            source: SourceDescriptor {
                conn: "s3://warehouse".into(),
                stream: "s3://warehouse/in/2024/orders.csv".into(),
                ..SourceDescriptor::default()
            },
            target: TargetDescriptor {
                conn: "my_pg".into(),
                object: "raw.orders".into(),
                ..TargetDescriptor::default()
            },
            stream_name: "s3://warehouse/in/2024/orders.csv".into(),
            ..Task::default()
        };
        let map = task.format_map();
        assert_eq!(map["source_bucket"], "warehouse");
        assert_eq!(map["stream_file_path"], "in/2024/orders.csv");
        assert_eq!(map["stream_file_folder"], "in/2024");
        assert_eq!(map["stream_file_name"], "orders.csv");
        assert_eq!(map["stream_file_ext"], "csv");
    }

    #[test]
    fn format_map_exposes_explicit_run_id() {
        let mut task = db_task();
        task.stream.id = "nightly_users".into();
        assert_eq!(task.format_map()["stream_run_id"], "nightly_users");
    }

    #[test]
    fn task_json_round_trip() {
        let task = db_task();
        let json = serde_json::to_string(&task).unwrap();
        let back: Task = serde_json::from_str(&json).unwrap();
        assert_eq!(task, back);
    }
}
