mod engine;
mod error;
mod solver;
mod types;

pub use engine::{
    adjust_for_inflation, contribution_schedule, future_value_of_existing_corpus,
    future_value_with_step_up, required_corpus, run_plan, run_plan_detailed,
    run_plan_with_config, validate_inputs,
};
pub use error::PlanError;
pub use solver::{SolveIteration, SolveResult, find_initial_investment, solve_initial_investment};
pub use types::{
    ContributionYear, InputLimits, PlanInputs, PlanResult, SolverConfig, ZeroTargetPolicy,
};
