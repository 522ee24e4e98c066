//! Compilation: turn the (expanded, defaulted, selected) stream set into
//! an ordered task list.

use std::collections::HashSet;

use indexmap::IndexMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use ferry_types::{KeyRef, Mode, SourceDescriptor, StreamConfig, TargetDescriptor, TargetOptions, Task};

use crate::config::defaults::set_stream_defaults;
use crate::config::parser::value_to_string;
use crate::error::PlanError;
use crate::replication::ReplicationConfig;
use crate::select::{self, Selection};
use crate::wildcard::{process_wildcards, Discoverer};

/// Normalises and validates one assembled task. External capability: the
/// planner only requires that preparation is idempotent.
pub trait TaskPreparer {
    fn prepare(&self, task: &mut Task) -> anyhow::Result<()>;
}

/// Caller-supplied overrides (CLI flags, runner re-invocations). A field
/// overwrites the stream value only when set and different.
#[derive(Debug, Clone, Default)]
pub struct TaskOverrides {
    pub mode: Option<Mode>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub range: Option<String>,
    pub file_select: Option<Vec<String>>,
    pub update_key: Option<String>,
    pub primary_key: Option<KeyRef>,
    pub incremental_value_str: Option<String>,
    pub env: IndexMap<String, String>,
}

impl ReplicationConfig {
    /// Compile the replication into tasks.
    ///
    /// On an already-compiled config a non-empty selection re-filters the
    /// existing task list by exact stream name, without re-running
    /// discovery; an empty selection leaves it untouched. The full
    /// selection algebra (globs, tags) applies to fresh compiles only.
    ///
    /// # Errors
    ///
    /// Any [`PlanError`]; the first error aborts compilation and discards
    /// partial results.
    pub fn compile(
        &mut self,
        discoverer: &dyn Discoverer,
        preparer: &dyn TaskPreparer,
        overwrite: Option<&TaskOverrides>,
        select_streams: &[String],
        cancel: &CancellationToken,
    ) -> Result<(), PlanError> {
        if self.compiled {
            if !select_streams.is_empty() {
                let names: HashSet<&str> =
                    select_streams.iter().map(String::as_str).collect();
                self.tasks
                    .retain(|task| names.contains(task.stream_name.as_str()));
            }
            return Ok(());
        }

        process_wildcards(self, discoverer, cancel)?;

        let mut selection = Selection::resolve(self, select_streams)?;
        let mut tasks: Vec<Task> = Vec::new();

        for name in self.streams_ordered.clone() {
            let mut stream = self.streams.get(&name).cloned().flatten().unwrap_or_default();
            set_stream_defaults(&name, &mut stream, self);

            if stream.object.is_empty() {
                return Err(PlanError::MissingTarget { stream: name });
            }

            let normalized = Self::normalize(&name);
            selection.adjust_for_tags(&normalized, &stream);

            if !selection.is_selected(&normalized) {
                trace!(stream = %name, "skipping stream, not selected");
                continue;
            }

            let mut task_env = env_to_strings(&self.env);
            let mut incremental_value_str = String::new();
            if let Some(overwrite) = overwrite {
                apply_overrides(
                    &name,
                    &mut stream,
                    overwrite,
                    &mut task_env,
                    &mut incremental_value_str,
                );
            }

            let mut task = Task {
                source: SourceDescriptor {
                    conn: self.source.clone(),
                    stream: name.clone(),
                    query: stream.sql.clone(),
                    select: stream.select.clone(),
                    where_: stream.where_.clone(),
                    primary_key: stream.primary_key_list(),
                    update_key: stream.update_key.clone(),
                    options: stream.source_options.clone(),
                },
                target: TargetDescriptor {
                    conn: self.target.clone(),
                    object: stream.object.clone(),
                    columns: stream.columns.clone(),
                    options: stream.target_options.clone(),
                },
                mode: stream.mode,
                transforms: stream.transforms.clone(),
                env: task_env,
                stream_name: name.clone(),
                incremental_value_str,
                stream: stream.clone(),
            };

            // a single file target must not be split
            if stream.single == Some(true) {
                let opts = task.target.options.get_or_insert_with(TargetOptions::default);
                opts.file_max_bytes = Some(0);
                opts.file_max_rows = Some(0);
            }

            preparer.prepare(&mut task).map_err(|cause| PlanError::Prepare {
                stream: name.clone(),
                cause,
            })?;

            tasks.push(task);
        }

        self.tasks = tasks;
        self.compiled = true;
        self.runtime_state();

        trace!(
            select = select_streams.len(),
            matched = selection.matched.len(),
            streams = self.streams.len(),
            "selection resolved"
        );
        let stream_cnt = if select_streams.is_empty() {
            self.streams.len()
        } else {
            selection.matched.len()
        };
        let matched: Vec<String> = selection.matched.iter().cloned().collect();
        let candidates: Vec<String> = self.streams.keys().cloned().collect();
        select::assert_stream_count(stream_cnt, &matched, &candidates)?;

        Ok(())
    }
}

fn env_to_strings(
    env: &IndexMap<String, serde_yaml::Value>,
) -> IndexMap<String, String> {
    env.iter()
        .map(|(k, v)| {
            let s = value_to_string(v)
                .or_else(|| serde_json::to_string(v).ok())
                .unwrap_or_default();
            (k.clone(), s)
        })
        .collect()
}

fn apply_overrides(
    name: &str,
    stream: &mut StreamConfig,
    overwrite: &TaskOverrides,
    task_env: &mut IndexMap<String, String>,
    incremental_value_str: &mut String,
) {
    if let Some(mode) = overwrite.mode {
        if stream.mode != mode {
            debug!(stream = %name, from = %stream.mode, to = %mode, "stream mode overwritten");
            stream.mode = mode;
        }
    }

    if overwrite.limit.is_some() || overwrite.offset.is_some() || overwrite.range.is_some() {
        let opts = stream.source_options.get_or_insert_with(Default::default);
        if let Some(limit) = overwrite.limit {
            if opts.limit != Some(limit) {
                if let Some(old) = opts.limit {
                    debug!(stream = %name, from = old, to = limit, "stream limit overwritten");
                }
                opts.limit = Some(limit);
            }
        }
        if let Some(offset) = overwrite.offset {
            if opts.offset != Some(offset) {
                if let Some(old) = opts.offset {
                    debug!(stream = %name, from = old, to = offset, "stream offset overwritten");
                }
                opts.offset = Some(offset);
            }
        }
        if let Some(range) = &overwrite.range {
            if opts.range.as_ref() != Some(range) {
                if let Some(old) = opts.range.as_deref().filter(|r| !r.is_empty()) {
                    debug!(stream = %name, from = old, to = %range, "stream range overwritten");
                }
                opts.range = Some(range.clone());
            }
        }
    }

    if let Some(file_select) = &overwrite.file_select {
        let opts = stream.source_options.get_or_insert_with(Default::default);
        opts.file_select = Some(file_select.clone());
    }

    if let Some(update_key) = &overwrite.update_key {
        if !update_key.is_empty() && &stream.update_key != update_key {
            if !stream.update_key.is_empty() {
                debug!(
                    stream = %name,
                    from = %stream.update_key,
                    to = %update_key,
                    "stream update_key overwritten"
                );
            }
            stream.update_key = update_key.clone();
        }
    }

    if let Some(primary_key) = &overwrite.primary_key {
        if stream.primary_key.as_ref() != Some(primary_key) {
            if stream.primary_key.is_some() {
                debug!(stream = %name, "stream primary_key overwritten");
            }
            stream.primary_key = Some(primary_key.clone());
        }
    }

    if let Some(value) = &overwrite.incremental_value_str {
        *incremental_value_str = value.clone();
    }

    // merge into the replication env, overwriting existing keys
    for (key, value) in &overwrite.env {
        task_env.insert(key.clone(), value.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_apply_only_when_set_and_different() {
        let mut stream = StreamConfig {
            mode: Mode::FullRefresh,
            update_key: "updated_at".into(),
            ..StreamConfig::default()
        };
        let overwrite = TaskOverrides {
            mode: Some(Mode::Incremental),
            limit: Some(100),
            update_key: Some("modified_at".into()),
            ..TaskOverrides::default()
        };
        let mut env = IndexMap::new();
        let mut incr = String::new();

        apply_overrides("a.b", &mut stream, &overwrite, &mut env, &mut incr);
        assert_eq!(stream.mode, Mode::Incremental);
        assert_eq!(stream.source_options.unwrap().limit, Some(100));
        assert_eq!(stream.update_key, "modified_at");
        assert!(incr.is_empty());
    }

    #[test]
    fn override_env_wins_over_replication_env() {
        let mut stream = StreamConfig::default();
        let mut env: IndexMap<String, String> =
            [("region".to_string(), "us".to_string())].into_iter().collect();
        let overwrite = TaskOverrides {
            env: [("region".to_string(), "eu".to_string())].into_iter().collect(),
            ..TaskOverrides::default()
        };
        let mut incr = String::new();

        apply_overrides("a.b", &mut stream, &overwrite, &mut env, &mut incr);
        assert_eq!(env["region"], "eu");
    }

    #[test]
    fn env_values_are_stringified() {
        let env: IndexMap<String, serde_yaml::Value> = [
            ("name".to_string(), serde_yaml::Value::from("prod")),
            ("batch".to_string(), serde_yaml::Value::from(500)),
            ("dry".to_string(), serde_yaml::Value::from(false)),
        ]
        .into_iter()
        .collect();
        let strings = env_to_strings(&env);
        assert_eq!(strings["name"], "prod");
        assert_eq!(strings["batch"], "500");
        assert_eq!(strings["dry"], "false");
    }
}
