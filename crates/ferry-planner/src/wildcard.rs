//! Wildcard stream expansion.
//!
//! A stream key containing `*` or `?` is expanded against the source by
//! querying the [`Discoverer`]. Discovery happens before any mutation of
//! the stream map, so a cancelled compile leaves the config untouched.

use indexmap::IndexMap;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use ferry_types::connection::{parse_table_name, parse_url};
use ferry_types::{ConnKind, FileNode, StreamConfig, Table};

use crate::config::defaults::set_stream_defaults;
use crate::error::PlanError;
use crate::replication::ReplicationConfig;

/// Lists what a stream pattern matches on the source system.
///
/// `discover_tables` and `discover_files` return an `ok` flag that is
/// false when the call succeeded but nothing matched; callers treat that
/// as a failure distinct from an error.
pub trait Discoverer {
    /// Whether the source is a database or a file system.
    fn kind(&self) -> ConnKind;

    fn discover_tables(&self, pattern: &str) -> anyhow::Result<(bool, Vec<Table>)>;

    fn discover_files(&self, path: &str) -> anyhow::Result<(bool, Vec<FileNode>)>;
}

/// One expanded pattern: the names it matched, in discovery order, and the
/// descriptors behind them.
#[derive(Debug, Clone, Default)]
pub struct Wildcard {
    pub pattern: String,
    pub stream_names: Vec<String>,
    pub table_map: IndexMap<String, Table>,
    pub node_map: IndexMap<String, FileNode>,
}

pub(crate) fn has_wildcard(name: &str) -> bool {
    name.contains('*') || name.contains('?')
}

/// Expand wildcard stream keys in place, preserving the original order of
/// non-wildcard entries and splicing discoveries at each pattern's
/// position.
pub(crate) fn process_wildcards(
    rd: &mut ReplicationConfig,
    discoverer: &dyn Discoverer,
    cancel: &CancellationToken,
) -> Result<(), PlanError> {
    let mut patterns: Vec<String> = Vec::new();

    for name in rd.streams_ordered.clone() {
        // single streams keep their pattern and are expanded while reading
        let explicit_single = rd
            .streams
            .get(&name)
            .and_then(|s| s.as_ref())
            .and_then(|s| s.single);
        match explicit_single {
            Some(true) => continue,
            Some(false) => {}
            None => {
                if rd.defaults.single == Some(true) {
                    continue;
                }
            }
        }

        if name == "*" {
            return Err(PlanError::InvalidWildcard { pattern: name });
        }
        if !has_wildcard(&name) {
            continue;
        }

        let mut defaulted = rd.streams.get(&name).cloned().flatten().unwrap_or_default();
        set_stream_defaults(&name, &mut defaulted, rd);

        // a target object without per-stream variables cannot address
        // expansions individually; read the pattern as a single stream
        if !defaulted.object_has_stream_vars() {
            let opts = defaulted.target_options.as_ref();
            let single = opts.and_then(|o| o.file_max_bytes).unwrap_or(0) == 0
                && opts.and_then(|o| o.file_max_rows).unwrap_or(0) == 0;

            let entry = rd.streams.entry(name.clone()).or_insert(None);
            entry.get_or_insert_with(StreamConfig::default).single = Some(single);
            // record presence so default merging keeps the computed flag
            rd.maps
                .streams
                .entry(name.clone())
                .or_default()
                .insert("single".into(), single.into());
            continue;
        }

        patterns.push(name);
    }

    if patterns.is_empty() {
        return Ok(());
    }

    debug!(source = %rd.source, ?patterns, "processing wildcards");

    let kind = discoverer.kind();
    let mut wildcards: Vec<Wildcard> = Vec::new();
    for pattern in &patterns {
        if cancel.is_cancelled() {
            return Err(PlanError::Cancelled);
        }
        let wildcard = match kind {
            ConnKind::Database => discover_tables_for(discoverer, pattern)?,
            ConnKind::File => discover_files_for(discoverer, pattern)?,
        };
        if let Some(wildcard) = wildcard {
            wildcards.push(wildcard);
        }
    }

    // splice discoveries into the original order
    let original = rd.streams_ordered.clone();
    let mut new_order: Vec<String> = Vec::with_capacity(original.len());
    for orig_name in &original {
        let Some(wildcard) = wildcards.iter().find(|w| &w.pattern == orig_name).cloned() else {
            new_order.push(orig_name.clone());
            continue;
        };

        for stream_name in &wildcard.stream_names {
            // an existing entry is authoritative and keeps its position
            let exists = match kind {
                ConnKind::Database => rd.get_stream(stream_name).is_some(),
                ConnKind::File => {
                    let node = &wildcard.node_map[stream_name.as_str()];
                    rd.get_stream(&node.path).is_some() || rd.get_stream(&node.uri).is_some()
                }
            };
            if exists {
                continue;
            }

            let cfg = rd.streams.get(&wildcard.pattern).cloned().flatten();
            rd.add_stream(stream_name, cfg.as_ref());
            new_order.push(stream_name.clone());
        }

        rd.delete_stream(&wildcard.pattern);
    }
    rd.streams_ordered = new_order;

    Ok(())
}

fn discover_tables_for(
    discoverer: &dyn Discoverer,
    pattern: &str,
) -> Result<Option<Wildcard>, PlanError> {
    let table_pattern = parse_table_name(pattern);
    if table_pattern.schema.is_empty() {
        // no schema component; leave the entry alone
        return Ok(None);
    }

    debug!(pattern, "getting tables");
    let (ok, tables) =
        discoverer
            .discover_tables(pattern)
            .map_err(|e| PlanError::Discovery {
                pattern: pattern.to_string(),
                reason: e.to_string(),
            })?;
    if !ok {
        return Err(PlanError::Discovery {
            pattern: pattern.to_string(),
            reason: "no matching tables".to_string(),
        });
    }

    let mut wildcard = Wildcard {
        pattern: pattern.to_string(),
        ..Wildcard::default()
    };
    for table in tables {
        let full_name = table.full_name();
        wildcard.stream_names.push(full_name.clone());
        wildcard.table_map.insert(full_name, table);
    }

    debug!(
        pattern,
        matched = wildcard.stream_names.len(),
        streams = ?wildcard.stream_names,
        "wildcard matched streams"
    );
    Ok(Some(wildcard))
}

fn discover_files_for(
    discoverer: &dyn Discoverer,
    pattern: &str,
) -> Result<Option<Wildcard>, PlanError> {
    let path = if pattern.contains("://") {
        parse_url(pattern).2
    } else {
        pattern.to_string()
    };

    let (ok, nodes) = discoverer
        .discover_files(&path)
        .map_err(|e| PlanError::Discovery {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;
    if !ok {
        return Err(PlanError::Discovery {
            pattern: pattern.to_string(),
            reason: "no matching files".to_string(),
        });
    }

    let mut wildcard = Wildcard {
        pattern: pattern.to_string(),
        ..Wildcard::default()
    };
    for node in nodes {
        wildcard.stream_names.push(node.path.clone());
        wildcard.node_map.insert(node.path.clone(), node);
    }

    debug!(
        pattern,
        matched = wildcard.stream_names.len(),
        streams = ?wildcard.stream_names,
        "wildcard matched streams"
    );
    Ok(Some(wildcard))
}
