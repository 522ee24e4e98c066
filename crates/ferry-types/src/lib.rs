//! Shared data model for the ferry replication planner.
//!
//! Pure data types used by the planner and its collaborators. Kept in a
//! separate crate so the planner, runner, and connector layers can share
//! them without circular dependencies.

pub mod connection;
pub mod mode;
pub mod state;
pub mod stream;
pub mod task;

pub use connection::{ConnKind, FileNode, Table};
pub use mode::Mode;
pub use state::{ConnState, ExecStatus, ObjectState, RunState, RuntimeState, StreamState};
pub use stream::{ColumnSpec, Columns, HookMap, KeyRef, SourceOptions, StreamConfig, TargetOptions};
pub use task::{SourceDescriptor, TargetDescriptor, Task};
