//! Connection identifiers, the stream-key URI grammar, and the discovery
//! descriptors (`Table`, `FileNode`) returned by source systems.

use serde::{Deserialize, Serialize};

/// URI schemes that denote a file-based connection.
pub const FILE_SCHEMES: &[&str] = &[
    "s3", "gs", "az", "file", "local", "sftp", "ftp", "http", "https",
];

/// Broad classification of a connection endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnKind {
    Database,
    File,
}

impl ConnKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Database => "database",
            Self::File => "file",
        }
    }
}

impl std::fmt::Display for ConnKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Extract the URI scheme of a connection identifier, if it has one.
#[must_use]
pub fn conn_scheme(conn: &str) -> Option<&str> {
    conn.split_once("://").map(|(scheme, _)| scheme)
}

/// Guess the connection kind from its identifier alone.
///
/// A URL with a file scheme is a file connection; everything else (named
/// connections, database URLs) is treated as a database. The planner's
/// `Discoverer` remains the authority where one is available.
#[must_use]
pub fn conn_kind(conn: &str) -> ConnKind {
    match conn_scheme(conn) {
        Some(scheme) if FILE_SCHEMES.contains(&scheme.to_ascii_lowercase().as_str()) => {
            ConnKind::File
        }
        _ => ConnKind::Database,
    }
}

/// Split a stream-key URI into `(scheme, bucket, path)`.
///
/// `s3://bucket/a/b.csv` yields `("s3", "bucket", "a/b.csv")`; local and
/// `file` URIs have no bucket component, so the whole remainder is the
/// path. A bare path (no `://`) is returned as-is with empty scheme and
/// bucket.
#[must_use]
pub fn parse_url(uri: &str) -> (String, String, String) {
    let Some((scheme, rest)) = uri.split_once("://") else {
        return (String::new(), String::new(), uri.to_string());
    };

    let scheme = scheme.to_ascii_lowercase();
    if scheme == "file" || scheme == "local" {
        return (scheme, String::new(), rest.to_string());
    }

    match rest.split_once('/') {
        Some((bucket, path)) => (scheme, bucket.to_string(), path.to_string()),
        None => (scheme, rest.to_string(), String::new()),
    }
}

/// A database table discovered under a schema pattern.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub database: String,
    pub schema: String,
    pub name: String,
}

impl Table {
    #[must_use]
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            database: String::new(),
            schema: schema.into(),
            name: name.into(),
        }
    }

    /// `schema.name`, prefixed with the database when known.
    #[must_use]
    pub fn full_name(&self) -> String {
        if self.database.is_empty() {
            format!("{}.{}", self.schema, self.name)
        } else {
            format!("{}.{}.{}", self.database, self.schema, self.name)
        }
    }
}

/// Split a `schema.table` stream key into a [`Table`].
///
/// Backticks and double quotes around components are stripped. Keys with a
/// database component (`db.schema.table`) keep it; a key without a dot has
/// no schema and yields `None` on the schema side.
#[must_use]
pub fn parse_table_name(key: &str) -> Table {
    let parts: Vec<String> = key
        .split('.')
        .map(|p| p.trim_matches(|c| c == '`' || c == '"').to_string())
        .collect();

    match parts.as_slice() {
        [name] => Table {
            database: String::new(),
            schema: String::new(),
            name: name.clone(),
        },
        [schema, name] => Table {
            database: String::new(),
            schema: schema.clone(),
            name: name.clone(),
        },
        [database, schema, name] => Table {
            database: database.clone(),
            schema: schema.clone(),
            name: name.clone(),
        },
        _ => Table {
            database: String::new(),
            schema: String::new(),
            name: key.to_string(),
        },
    }
}

/// A file (or prefix) discovered under a path pattern.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileNode {
    /// Full URI, including scheme and bucket.
    pub uri: String,
    /// Path component relative to the connection root.
    pub path: String,
}

impl FileNode {
    #[must_use]
    pub fn new(uri: impl Into<String>) -> Self {
        let uri = uri.into();
        let (_, _, path) = parse_url(&uri);
        Self { uri, path }
    }

    /// `(folder, file_name, extension)` components of the path.
    #[must_use]
    pub fn split_path(&self) -> (String, String, String) {
        split_file_path(&self.path)
    }
}

/// Split a file path into `(folder, name, extension)`.
#[must_use]
pub fn split_file_path(path: &str) -> (String, String, String) {
    let (folder, name) = match path.rsplit_once('/') {
        Some((folder, name)) => (folder.to_string(), name.to_string()),
        None => (String::new(), path.to_string()),
    };
    let ext = name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_string())
        .unwrap_or_default();
    (folder, name, ext)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_schemes_detected() {
        assert_eq!(conn_kind("s3://bucket/path"), ConnKind::File);
        assert_eq!(conn_kind("file://./data"), ConnKind::File);
        assert_eq!(conn_kind("postgres://host/db"), ConnKind::Database);
        assert_eq!(conn_kind("my_pg_conn"), ConnKind::Database);
    }

    #[test]
    fn parse_url_splits_bucket_and_path() {
        assert_eq!(
            parse_url("s3://bucket/a/b.csv"),
            ("s3".into(), "bucket".into(), "a/b.csv".into())
        );
        assert_eq!(
            parse_url("file://./folder/*.csv"),
            ("file".into(), String::new(), "./folder/*.csv".into())
        );
        assert_eq!(
            parse_url("plain/local/path.csv"),
            (String::new(), String::new(), "plain/local/path.csv".into())
        );
    }

    #[test]
    fn table_full_name() {
        assert_eq!(Table::new("public", "users").full_name(), "public.users");
        let t = Table {
            database: "analytics".into(),
            schema: "public".into(),
            name: "users".into(),
        };
        assert_eq!(t.full_name(), "analytics.public.users");
    }

    #[test]
    fn parse_table_name_strips_quoting() {
        let t = parse_table_name("`public`.\"users\"");
        assert_eq!(t.schema, "public");
        assert_eq!(t.name, "users");

        let bare = parse_table_name("users_*");
        assert!(bare.schema.is_empty());
        assert_eq!(bare.name, "users_*");
    }

    #[test]
    fn file_node_path_components() {
        let node = FileNode::new("s3://bucket/exports/2024/orders.csv");
        assert_eq!(node.path, "exports/2024/orders.csv");
        let (folder, name, ext) = node.split_path();
        assert_eq!(folder, "exports/2024");
        assert_eq!(name, "orders.csv");
        assert_eq!(ext, "csv");
    }
}
