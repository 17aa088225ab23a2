pub mod action;
pub mod cli;
pub mod config;
pub mod directory;
pub mod dispatch;
pub mod model;
pub mod tool;

pub use config::Settings;
pub use directory::ClusterDirectory;
pub use dispatch::{CancelHandle, DispatchError, Dispatcher, ExecutionEvent, ExecutionHandle};
pub use model::{
    Cluster, ClusterResult, CommandTool, ExecutionRequest, ExecutionSession, ResultStatus,
    SessionStatus,
};
