//! 编排层：计划生成、人工确认、步骤执行、结果校验与有界重试

pub mod datasets;
pub mod events;
pub mod executor;
pub mod loop_;
pub mod planner;
pub mod repair;
pub mod verifier;

pub use datasets::DatasetAccumulator;
pub use events::{EventKind, EventSink, StreamEvent};
pub use executor::{combined_responses, AgentResponse, ExecutionOutcome, PlanExecutor};
pub use loop_::{SessionOrchestrator, SessionState, TurnOutcome};
pub use planner::{parse_plan, PlanGenerator, PlanOutcome, PlanStep, BUILDER_AGENT};
pub use repair::{extract_and_fix_json, extract_and_merge_json, get_json_key, Repaired};
pub use verifier::{parse_verdict, Verdict, Verifier};
