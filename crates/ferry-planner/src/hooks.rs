//! Hook parsing seam.
//!
//! The planner only dispatches raw hook descriptors; resolving them into
//! executable hooks is the hook engine's job, reached through
//! [`HookParser`].

use std::sync::Arc;

use parking_lot::RwLock;
use serde_yaml::Value as YamlValue;

use ferry_types::RuntimeState;

/// Where a hook runs relative to the replication or stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookStage {
    /// Before the first task of the replication.
    Start,
    /// After the last task of the replication.
    End,
    /// Before one stream's task.
    Pre,
    /// After one stream's task.
    Post,
}

impl HookStage {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::End => "end",
            Self::Pre => "pre",
            Self::Post => "post",
        }
    }
}

impl std::fmt::Display for HookStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Context handed to [`HookParser::parse`] for each descriptor.
pub struct ParseOptions<'a> {
    pub stage: HookStage,
    pub index: usize,
    pub state: &'a Arc<RwLock<RuntimeState>>,
}

/// Resolves one opaque hook descriptor.
///
/// Returning `Ok(None)` drops the descriptor (e.g. a hook disabled by its
/// own condition); errors are annotated with the stage by the caller.
pub trait HookParser {
    type Hook;

    fn parse(&self, raw: &YamlValue, opts: ParseOptions<'_>) -> anyhow::Result<Option<Self::Hook>>;
}
