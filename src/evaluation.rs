mod ap_evaluator;
mod orchestrator;

pub use ap_evaluator::*;
pub use orchestrator::*;
