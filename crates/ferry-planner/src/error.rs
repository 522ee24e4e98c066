//! Planner error model.
//!
//! Every failure names the stream, pattern, or key in play. The first error
//! aborts compilation; the planner performs no local recovery.

use crate::hooks::HookStage;

#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("error parsing yaml content: {source}")]
    Parse {
        #[source]
        source: serde_yaml::Error,
    },

    #[error("did not find '{key}' key")]
    MissingKey { key: &'static str },

    #[error(
        "must specify schema or path when using wildcard: \
         'my_schema.*', 'file://./my_folder/*', not '{pattern}'"
    )]
    InvalidWildcard { pattern: String },

    #[error("could not discover streams for pattern '{pattern}': {reason}")]
    Discovery { pattern: String, reason: String },

    #[error("need to specify `object` for stream `{stream}`")]
    MissingTarget { stream: String },

    #[error("cannot include and exclude tags; either include or exclude")]
    ConflictingTags,

    #[error("expected {expected} streams, got {got} => {candidates}")]
    Assertion {
        expected: String,
        got: usize,
        candidates: String,
    },

    #[error("could not prepare stream task: {stream}: {cause}")]
    Prepare { stream: String, cause: anyhow::Error },

    #[error("compilation cancelled")]
    Cancelled,

    #[error("error parsing {stage}-hook: {cause}")]
    Hook {
        stage: HookStage,
        cause: anyhow::Error,
    },

    #[error("invalid hook stage: {stage}")]
    InvalidHookStage { stage: HookStage },

    #[error("could not read replication path {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("could not parse compiled tasks payload: {source}")]
    TaskPayload {
        #[source]
        source: serde_json::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_offender() {
        let err = PlanError::MissingTarget {
            stream: "public.users".into(),
        };
        assert!(err.to_string().contains("public.users"));

        let err = PlanError::InvalidWildcard {
            pattern: "*".into(),
        };
        assert!(err.to_string().contains("'*'"));

        let err = PlanError::Discovery {
            pattern: "public.*".into(),
            reason: "connection refused".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("public.*") && msg.contains("connection refused"));
    }
}
