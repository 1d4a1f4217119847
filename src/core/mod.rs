//! 核心层：错误与恢复、运行状态、装配

pub mod error;
pub mod orchestrator;
pub mod recovery;
pub mod state;

pub use error::{FailureKind, RecoveryAction, WorkerError};
pub use orchestrator::{
    build_engine, build_registry, build_service, create_llm_from_config, create_search_backend,
    create_source_host,
};
pub use recovery::RecoveryEngine;
pub use state::{RunPhase, RunState};
