use serde::Serialize;
use tracing::{debug, warn};

use super::engine::future_value_with_step_up;
use super::{PlanError, SolverConfig, ZeroTargetPolicy};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SolveIteration {
    pub iteration: u32,
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub candidate_value: f64,
    pub future_value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SolveResult {
    pub target_future_value: f64,
    pub search_min: f64,
    pub search_max: f64,
    pub tolerance: f64,
    pub max_iterations: u32,
    pub zero_target: ZeroTargetPolicy,
    pub solved_value: f64,
    pub iterations: Vec<SolveIteration>,
    pub converged: bool,
    pub short_circuited: bool,
    pub saturated: bool,
    pub message: String,
}

/// Bisects for the first-year contribution whose escalating series grows to
/// `target` after `years` years.
pub fn solve_initial_investment(
    target: f64,
    years: u32,
    return_rate: f64,
    step_up_rate: f64,
    config: &SolverConfig,
) -> Result<SolveResult, PlanError> {
    validate_config(config)?;
    validate_search_args(target, return_rate, step_up_rate)?;

    let mut result = SolveResult {
        target_future_value: target,
        search_min: config.search_lower_bound,
        search_max: config.search_upper_bound,
        tolerance: config.tolerance,
        max_iterations: config.max_iterations,
        zero_target: config.zero_target,
        solved_value: 0.0,
        iterations: Vec::new(),
        converged: true,
        short_circuited: false,
        saturated: false,
        message: String::new(),
    };

    if target <= 0.0 && config.zero_target == ZeroTargetPolicy::ShortCircuit {
        result.short_circuited = true;
        result.message = "Nothing left to accumulate; no contribution required.".to_string();
        debug!(target, "solver short-circuited on non-positive target");
        return Ok(result);
    }

    let high_value = future_value_with_step_up(
        config.search_upper_bound,
        years,
        return_rate,
        step_up_rate,
    );
    if !high_value.is_finite() {
        return Err(PlanError::input(
            "years",
            "contribution series overflows at the upper search bound; shorten the horizon or lower the rates",
        ));
    }
    result.saturated = high_value < target;

    let mut lo = config.search_lower_bound;
    let mut hi = config.search_upper_bound;
    let mut it = 0;
    while hi - lo > config.tolerance {
        if it >= config.max_iterations {
            break;
        }
        it += 1;
        let mid = (lo + hi) * 0.5;
        let value = future_value_with_step_up(mid, years, return_rate, step_up_rate);
        result.iterations.push(SolveIteration {
            iteration: it,
            lower_bound: lo,
            upper_bound: hi,
            candidate_value: mid,
            future_value: value,
        });

        if value < target {
            lo = mid;
        } else {
            hi = mid;
        }
    }

    result.converged = hi - lo <= config.tolerance;
    result.solved_value = (lo + hi) * 0.5;
    result.message = if result.saturated {
        "Target exceeds what the upper search bound can reach; returning best estimate."
            .to_string()
    } else if !result.converged {
        "Reached max iterations before tolerance was met; returning best estimate.".to_string()
    } else {
        "Solved required contribution.".to_string()
    };

    if result.saturated {
        warn!(
            target,
            search_max = config.search_upper_bound,
            reachable = high_value,
            "contribution search saturated at upper bound"
        );
    }
    debug!(
        target,
        solved = result.solved_value,
        iterations = it,
        converged = result.converged,
        "solved initial contribution"
    );

    Ok(result)
}

pub fn find_initial_investment(
    target: f64,
    years: u32,
    return_rate: f64,
    step_up_rate: f64,
    config: &SolverConfig,
) -> Result<f64, PlanError> {
    solve_initial_investment(target, years, return_rate, step_up_rate, config)
        .map(|result| result.solved_value)
}

fn validate_config(config: &SolverConfig) -> Result<(), PlanError> {
    if !config.search_lower_bound.is_finite() || !config.search_upper_bound.is_finite() {
        return Err(PlanError::solver("search bounds must be finite"));
    }
    if config.search_upper_bound <= config.search_lower_bound {
        return Err(PlanError::solver(
            "search_max must be greater than search_min",
        ));
    }
    if !config.tolerance.is_finite() || config.tolerance <= 0.0 {
        return Err(PlanError::solver("tolerance must be > 0"));
    }
    if config.max_iterations == 0 {
        return Err(PlanError::solver("max_iterations must be > 0"));
    }
    Ok(())
}

fn validate_search_args(target: f64, return_rate: f64, step_up_rate: f64) -> Result<(), PlanError> {
    if !target.is_finite() {
        return Err(PlanError::input("target", "must be finite"));
    }
    if !return_rate.is_finite() || return_rate <= -100.0 {
        return Err(PlanError::input("return_rate", "must be > -100"));
    }
    if !step_up_rate.is_finite() || step_up_rate <= -100.0 {
        return Err(PlanError::input("step_up_rate", "must be > -100"));
    }
    Ok(())
}
