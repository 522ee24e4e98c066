//! Replication planner: compiles a declarative YAML replication config into
//! an ordered list of executable tasks plus a live runtime state object.
//!
//! Byte moving, connection drivers, and hook execution live elsewhere; the
//! planner reaches them through the [`Discoverer`], [`TaskPreparer`], and
//! [`HookParser`] seams.

pub mod compile;
pub mod config;
pub mod error;
pub mod hooks;
pub mod replication;
mod select;
mod state;
pub mod wildcard;

pub use compile::{TaskOverrides, TaskPreparer};
pub use config::parser::{is_json_or_yaml, load, load_from_file, unmarshal_replication};
pub use error::PlanError;
pub use hooks::{HookParser, HookStage, ParseOptions};
pub use replication::ReplicationConfig;
pub use wildcard::{Discoverer, Wildcard};

/// Serialised task list that bypasses compilation when set.
pub const ENV_REPLICATION_TASKS: &str = "FERRY_REPLICATION_TASKS";
/// Stream-count assertion checked after selection (`N` or `>N`).
pub const ENV_STREAM_COUNT: &str = "FERRY_STREAM_CNT";
/// Written into the config env after loading from disk.
pub const ENV_CONFIG_PATH: &str = "FERRY_CONFIG_PATH";
