//! 编排核心：意图分类、Supervisor 状态机、聚合与执行引擎

pub mod aggregator;
pub mod engine;
pub mod intent;
pub mod router;
pub mod types;

pub use aggregator::{aggregate, AggregateError};
pub use engine::{EngineSettings, ExecutionEngine};
pub use intent::{Classification, IntentClassifier, KEYWORD_PRIORITY};
pub use router::{next_stage, quality_gate, verdict_target, Supervisor, QUALITY_GATES};
pub use types::*;
