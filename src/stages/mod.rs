//! 阶段函数：Planner（需求 -> Plan）、Architect（Plan -> TaskPlan）、Coder（逐步实现）

pub mod architect;
pub mod coder;
pub mod planner;
pub mod prompts;

pub use architect::architect;
pub use coder::{Coder, CoderOutcome, DEFAULT_MAX_TURNS_PER_STEP};
pub use planner::plan_project;
