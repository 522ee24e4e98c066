//! Runtime state tracking and hook parsing dispatch.

use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use serde_yaml::Value as YamlValue;

use ferry_types::connection::{conn_kind, conn_scheme};
use ferry_types::state::clean_name;
use ferry_types::{ExecStatus, ObjectState, RunState, RuntimeState, StreamConfig, StreamState};

use crate::error::PlanError;
use crate::hooks::{HookParser, HookStage, ParseOptions};
use crate::replication::ReplicationConfig;

impl ReplicationConfig {
    /// The live runtime state, created on first use.
    ///
    /// Refreshing is idempotent: the timestamp advances, and each compiled
    /// task populates the source/target summaries and its run entry
    /// without overwriting anything already present. Readers share the
    /// lock; mutating a run is the owning runner thread's right.
    pub fn runtime_state(&mut self) -> Arc<RwLock<RuntimeState>> {
        let state = match &self.state {
            Some(state) => state.clone(),
            None => {
                let mut fresh = RuntimeState::new(self.source.clone(), self.target.clone());
                fresh.env = self.env.clone();
                let state = Arc::new(RwLock::new(fresh));
                self.state = Some(state.clone());
                state
            }
        };

        let mut st = state.write();
        st.timestamp = Utc::now();

        if self.compiled {
            for task in &self.tasks {
                let fmap = task.format_map();
                let get = |key: &str| fmap.get(key).cloned().unwrap_or_default();

                if st.source.type_.is_empty() {
                    if let Some(scheme) = conn_scheme(&self.source) {
                        st.source.type_ = scheme.to_string();
                    }
                }
                if st.source.kind.is_none() {
                    st.source.kind = Some(conn_kind(&self.source));
                }
                if st.source.bucket.is_empty() {
                    st.source.bucket = get("source_bucket");
                }
                if st.source.schema.is_empty() {
                    st.source.schema = get("stream_schema");
                }

                if st.target.type_.is_empty() {
                    if let Some(scheme) = conn_scheme(&self.target) {
                        st.target.type_ = scheme.to_string();
                    }
                }
                if st.target.kind.is_none() {
                    st.target.kind = Some(conn_kind(&self.target));
                }
                if st.target.bucket.is_empty() {
                    st.target.bucket = get("target_bucket");
                }
                if st.target.schema.is_empty() {
                    st.target.schema = get("object_schema");
                }

                let run_id = match fmap.get("stream_run_id") {
                    Some(explicit) => explicit.clone(),
                    None => clean_name(&Self::normalize(&task.stream_name)),
                };

                if !st.runs.contains_key(&run_id) {
                    st.runs.insert(
                        run_id.clone(),
                        RunState {
                            id: run_id.clone(),
                            status: ExecStatus::Created,
                            stream: Some(StreamState {
                                file_folder: get("stream_file_folder"),
                                file_name: get("stream_file_name"),
                                file_ext: get("stream_file_ext"),
                                file_path: get("stream_file_path"),
                                name: get("stream_name"),
                                schema: get("stream_schema"),
                                table: get("stream_table"),
                                full_name: get("stream_full_name"),
                            }),
                            object: Some(ObjectState {
                                name: get("object_name"),
                                schema: get("object_schema"),
                                table: get("object_table"),
                                full_name: get("object_full_name"),
                            }),
                        },
                    );
                }
            }
        }
        drop(st);

        state
    }

    /// Parse the replication-level hooks for `start` or `end`.
    ///
    /// # Errors
    ///
    /// `InvalidHookStage` for stream stages; parse failures are annotated
    /// with the stage.
    pub fn parse_replication_hooks<P: HookParser>(
        &mut self,
        stage: HookStage,
        parser: &P,
    ) -> Result<Vec<P::Hook>, PlanError> {
        let raw = match stage {
            HookStage::Start => self.hooks.start.clone(),
            HookStage::End => self.hooks.end.clone(),
            HookStage::Pre | HookStage::Post => {
                return Err(PlanError::InvalidHookStage { stage })
            }
        };
        let Some(raw) = raw else {
            return Ok(Vec::new());
        };
        let state = self.runtime_state();
        parse_hook_list(&raw, stage, &state, parser)
    }

    /// Parse one stream's hooks for `pre` or `post`.
    ///
    /// # Errors
    ///
    /// `InvalidHookStage` for replication stages; parse failures are
    /// annotated with the stage.
    pub fn parse_stream_hooks<P: HookParser>(
        &mut self,
        stage: HookStage,
        stream: &StreamConfig,
        parser: &P,
    ) -> Result<Vec<P::Hook>, PlanError> {
        let raw = match stage {
            HookStage::Pre => stream.hooks.pre.clone(),
            HookStage::Post => stream.hooks.post.clone(),
            HookStage::Start | HookStage::End => {
                return Err(PlanError::InvalidHookStage { stage })
            }
        };
        let Some(raw) = raw else {
            return Ok(Vec::new());
        };
        let state = self.runtime_state();
        parse_hook_list(&raw, stage, &state, parser)
    }
}

fn parse_hook_list<P: HookParser>(
    raw: &[YamlValue],
    stage: HookStage,
    state: &Arc<RwLock<RuntimeState>>,
    parser: &P,
) -> Result<Vec<P::Hook>, PlanError> {
    let mut hooks = Vec::new();
    for (index, descriptor) in raw.iter().enumerate() {
        let opts = ParseOptions {
            stage,
            index,
            state,
        };
        match parser.parse(descriptor, opts) {
            Ok(Some(hook)) => hooks.push(hook),
            Ok(None) => {}
            Err(cause) => return Err(PlanError::Hook { stage, cause }),
        }
    }
    Ok(hooks)
}
