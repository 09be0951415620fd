use tracing::debug;

use super::solver::{SolveResult, solve_initial_investment};
use super::types::{ContributionYear, MAX_HORIZON_YEARS, PlanInputs, PlanResult, SolverConfig};
use super::PlanError;

pub fn adjust_for_inflation(value: f64, years: u32, rate: f64) -> f64 {
    value * compound(rate, years)
}

/// Corpus whose annual withdrawal at `withdrawal_rate` percent funds
/// `monthly_income` indefinitely.
pub fn required_corpus(monthly_income: f64, withdrawal_rate: f64) -> Result<f64, PlanError> {
    if !withdrawal_rate.is_finite() || withdrawal_rate <= 0.0 {
        return Err(PlanError::input("withdrawal_rate", "must be > 0"));
    }
    Ok((monthly_income * 12.0) / (withdrawal_rate / 100.0))
}

pub fn future_value_of_existing_corpus(corpus: f64, years: u32, return_rate: f64) -> f64 {
    corpus * compound(return_rate, years)
}

/// Contributions are made at the start of each year, so the contribution in
/// year `y` compounds for `years - y` periods.
pub fn future_value_with_step_up(
    initial_contribution: f64,
    years: u32,
    return_rate: f64,
    step_up_rate: f64,
) -> f64 {
    let step_up = growth_factor(step_up_rate);
    let mut total = 0.0;
    let mut contribution = initial_contribution;
    for year in 0..years {
        total += contribution * compound(return_rate, years - year);
        contribution *= step_up;
    }
    total
}

pub fn contribution_schedule(
    initial_contribution: f64,
    years: u32,
    return_rate: f64,
    step_up_rate: f64,
) -> Vec<ContributionYear> {
    let step_up = growth_factor(step_up_rate);
    let mut schedule = Vec::with_capacity(years.min(MAX_HORIZON_YEARS) as usize);
    let mut running = 0.0;
    let mut cumulative = 0.0;
    let mut contribution = initial_contribution;
    for year in 0..years {
        let compounding_years = years - year;
        let future_value = contribution * compound(return_rate, compounding_years);
        running += future_value;
        cumulative += contribution;
        schedule.push(ContributionYear {
            year: year + 1,
            contribution,
            cumulative_contributed: cumulative,
            compounding_years,
            future_value,
            running_future_value: running,
        });
        contribution *= step_up;
    }
    schedule
}

pub fn validate_inputs(inputs: &PlanInputs) -> Result<(), PlanError> {
    for (field, value) in [
        ("monthly_income", inputs.monthly_income),
        ("inflation_rate", inputs.inflation_rate),
        ("withdrawal_rate", inputs.withdrawal_rate),
        ("return_rate", inputs.return_rate),
        ("step_up_rate", inputs.step_up_rate),
        ("existing_corpus", inputs.existing_corpus),
    ] {
        if !value.is_finite() {
            return Err(PlanError::input(field, "must be a finite number"));
        }
    }

    if inputs.monthly_income <= 0.0 {
        return Err(PlanError::input("monthly_income", "must be > 0"));
    }
    if inputs.years == 0 {
        return Err(PlanError::input("years", "must be >= 1"));
    }
    if inputs.years > MAX_HORIZON_YEARS {
        return Err(PlanError::input(
            "years",
            format!("must be <= {MAX_HORIZON_YEARS}"),
        ));
    }
    if inputs.inflation_rate < 0.0 {
        return Err(PlanError::input("inflation_rate", "must be >= 0"));
    }
    if inputs.withdrawal_rate <= 0.0 {
        return Err(PlanError::input("withdrawal_rate", "must be > 0"));
    }
    if inputs.return_rate <= 0.0 {
        return Err(PlanError::input("return_rate", "must be > 0"));
    }
    if inputs.step_up_rate < 0.0 {
        return Err(PlanError::input("step_up_rate", "must be >= 0"));
    }
    if inputs.existing_corpus < 0.0 {
        return Err(PlanError::input("existing_corpus", "must be >= 0"));
    }
    Ok(())
}

pub fn run_plan(inputs: &PlanInputs) -> Result<PlanResult, PlanError> {
    run_plan_with_config(inputs, &SolverConfig::default())
}

pub fn run_plan_with_config(
    inputs: &PlanInputs,
    config: &SolverConfig,
) -> Result<PlanResult, PlanError> {
    run_plan_detailed(inputs, config).map(|(plan, _)| plan)
}

/// Runs the pipeline and also hands back the solver's iteration report.
pub fn run_plan_detailed(
    inputs: &PlanInputs,
    config: &SolverConfig,
) -> Result<(PlanResult, SolveResult), PlanError> {
    validate_inputs(inputs)?;

    let future_monthly_income =
        adjust_for_inflation(inputs.monthly_income, inputs.years, inputs.inflation_rate);
    let required = required_corpus(future_monthly_income, inputs.withdrawal_rate)?;
    let projected_existing = if inputs.existing_corpus > 0.0 {
        future_value_of_existing_corpus(inputs.existing_corpus, inputs.years, inputs.return_rate)
    } else {
        0.0
    };
    ensure_finite("monthly_income", future_monthly_income)?;
    ensure_finite("monthly_income", required)?;
    ensure_finite("existing_corpus", projected_existing)?;
    let remaining = (required - projected_existing).max(0.0);
    debug!(
        future_monthly_income,
        required_corpus = required,
        projected_existing_corpus = projected_existing,
        remaining_corpus = remaining,
        "sized retirement corpus"
    );

    let solve = solve_initial_investment(
        remaining,
        inputs.years,
        inputs.return_rate,
        inputs.step_up_rate,
        config,
    )?;

    let plan = PlanResult {
        future_monthly_income,
        required_corpus: required,
        existing_corpus: inputs.existing_corpus,
        projected_existing_corpus: projected_existing,
        remaining_corpus: remaining,
        required_annual_contribution: solve.solved_value,
        search_saturated: solve.saturated,
    };
    Ok((plan, solve))
}

fn growth_factor(rate: f64) -> f64 {
    1.0 + rate / 100.0
}

fn compound(rate: f64, periods: u32) -> f64 {
    growth_factor(rate).powf(f64::from(periods))
}

fn ensure_finite(field: &'static str, value: f64) -> Result<(), PlanError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(PlanError::input(
            field,
            "overflows when projected over the horizon",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ZeroTargetPolicy;
    use proptest::prelude::{prop_assert, prop_assert_eq, proptest};

    const EPS: f64 = 1e-6;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    fn assert_approx_tol(actual: f64, expected: f64, tol: f64) {
        assert!(
            (actual - expected).abs() <= tol,
            "expected {expected}, got {actual}, tolerance {tol}"
        );
    }

    fn sample_inputs() -> PlanInputs {
        PlanInputs {
            monthly_income: 50_000.0,
            years: 30,
            inflation_rate: 7.0,
            withdrawal_rate: 4.0,
            return_rate: 11.0,
            step_up_rate: 7.0,
            existing_corpus: 0.0,
        }
    }

    #[test]
    fn inflation_compounds_annually() {
        assert_approx(adjust_for_inflation(100.0, 2, 10.0), 121.0);
        assert_approx(adjust_for_inflation(100.0, 0, 10.0), 100.0);
        assert_approx(adjust_for_inflation(100.0, 5, 0.0), 100.0);
    }

    #[test]
    fn required_corpus_uses_withdrawal_rule() {
        let corpus = required_corpus(1_000.0, 4.0).expect("valid rate");
        assert_approx(corpus, 300_000.0);
    }

    #[test]
    fn required_corpus_rejects_zero_withdrawal_rate() {
        let err = required_corpus(1_000.0, 0.0).expect_err("zero rate");
        assert!(matches!(
            err,
            PlanError::InvalidInput {
                field: "withdrawal_rate",
                ..
            }
        ));
    }

    #[test]
    fn step_up_series_matches_hand_calculation() {
        // 100 * 1.1^2 + 110 * 1.1
        assert_approx(future_value_with_step_up(100.0, 2, 10.0, 10.0), 242.0);
        assert_approx(future_value_with_step_up(100.0, 1, 10.0, 0.0), 110.0);
        assert_approx(future_value_with_step_up(100.0, 0, 10.0, 10.0), 0.0);
    }

    #[test]
    fn step_up_series_without_escalation_matches_annuity_due() {
        let r: f64 = 0.10;
        let n = 10;
        let closed_form = 1_000.0 * ((1.0 + r).powi(n) - 1.0) / r * (1.0 + r);
        assert_approx_tol(
            future_value_with_step_up(1_000.0, n as u32, 10.0, 0.0),
            closed_form,
            1e-6,
        );
    }

    #[test]
    fn step_up_series_matches_growing_annuity_closed_form() {
        let (r, g) = (0.11_f64, 0.07_f64);
        let n = 30;
        let closed_form =
            (1.0 + r) * ((1.0 + r).powi(n) - (1.0 + g).powi(n)) / (r - g);
        assert_approx_tol(
            future_value_with_step_up(1.0, n as u32, 11.0, 7.0),
            closed_form,
            1e-6,
        );
    }

    #[test]
    fn schedule_agrees_with_series_total() {
        let schedule = contribution_schedule(269_471.0, 30, 11.0, 7.0);
        assert_eq!(schedule.len(), 30);

        let first = schedule[0];
        assert_eq!(first.year, 1);
        assert_eq!(first.compounding_years, 30);
        assert_approx(first.contribution, 269_471.0);

        let last = schedule[29];
        assert_eq!(last.year, 30);
        assert_eq!(last.compounding_years, 1);
        assert_eq!(
            last.running_future_value,
            future_value_with_step_up(269_471.0, 30, 11.0, 7.0)
        );

        let contributed: f64 = schedule.iter().map(|row| row.contribution).sum();
        assert_approx_tol(last.cumulative_contributed, contributed, 1e-3);
    }

    #[test]
    fn scenario_without_existing_corpus() {
        let inputs = sample_inputs();
        let config = SolverConfig::default();
        let result = run_plan_with_config(&inputs, &config).expect("valid plan");

        assert_approx_tol(result.future_monthly_income, 380_612.75, 0.01);
        assert_approx_tol(result.required_corpus, 114_183_825.64, 0.01);
        assert_approx_tol(result.required_corpus, 114_183_978.0, 1_000.0);
        assert_eq!(result.projected_existing_corpus, 0.0);
        assert_eq!(result.remaining_corpus, result.required_corpus);
        assert!(!result.search_saturated);

        let contribution = result.required_annual_contribution;
        assert!(contribution > 0.0 && contribution.is_finite());
        assert_approx_tol(contribution, 269_471.19, 1.0);

        let per_unit = future_value_with_step_up(1.0, 30, 11.0, 7.0);
        let achieved = future_value_with_step_up(contribution, 30, 11.0, 7.0);
        assert_approx_tol(achieved, result.required_corpus, per_unit * config.tolerance);
    }

    #[test]
    fn scenario_with_large_existing_corpus() {
        let baseline = run_plan(&sample_inputs()).expect("valid plan");

        let mut inputs = sample_inputs();
        inputs.existing_corpus = 50_000_000.0;
        let result = run_plan(&inputs).expect("valid plan");

        assert_approx_tol(
            result.projected_existing_corpus,
            50_000_000.0 * 1.11_f64.powi(30),
            1e-3,
        );
        assert_approx_tol(
            result.remaining_corpus,
            (result.required_corpus - result.projected_existing_corpus).max(0.0),
            1e-9,
        );
        assert!(result.remaining_corpus < baseline.remaining_corpus);
        assert_eq!(result.remaining_corpus, 0.0);
        assert_eq!(result.required_annual_contribution, 0.0);
        assert_eq!(result.existing_corpus, 50_000_000.0);
    }

    #[test]
    fn covered_goal_with_search_policy_still_returns_small_positive_contribution() {
        let mut inputs = sample_inputs();
        inputs.existing_corpus = 50_000_000.0;
        let config = SolverConfig {
            zero_target: ZeroTargetPolicy::Search,
            ..SolverConfig::default()
        };
        let result = run_plan_with_config(&inputs, &config).expect("valid plan");
        assert_eq!(result.remaining_corpus, 0.0);
        assert!(result.required_annual_contribution > 0.0);
        assert!(result.required_annual_contribution <= config.search_lower_bound + config.tolerance);
    }

    #[test]
    fn partial_existing_corpus_reduces_gap() {
        let mut inputs = sample_inputs();
        inputs.existing_corpus = 1_000_000.0;
        let result = run_plan(&inputs).expect("valid plan");
        assert_approx_tol(
            result.remaining_corpus,
            result.required_corpus - 1_000_000.0 * 1.11_f64.powi(30),
            1e-3,
        );
        assert!(result.remaining_corpus > 0.0);
        assert!(result.required_annual_contribution > 0.0);
    }

    #[test]
    fn zero_withdrawal_rate_is_a_validation_error() {
        let mut inputs = sample_inputs();
        inputs.withdrawal_rate = 0.0;
        let err = run_plan(&inputs).expect_err("zero withdrawal must fail");
        assert_eq!(err, PlanError::input("withdrawal_rate", "must be > 0"));
    }

    #[test]
    fn invalid_domain_inputs_are_rejected() {
        let cases: [(&str, fn(&mut PlanInputs)); 7] = [
            ("monthly_income", |i| i.monthly_income = 0.0),
            ("years", |i| i.years = 0),
            ("inflation_rate", |i| i.inflation_rate = -1.0),
            ("return_rate", |i| i.return_rate = 0.0),
            ("step_up_rate", |i| i.step_up_rate = -0.5),
            ("existing_corpus", |i| i.existing_corpus = -10.0),
            ("monthly_income", |i| i.monthly_income = f64::NAN),
        ];
        for (expected_field, mutate) in cases {
            let mut inputs = sample_inputs();
            mutate(&mut inputs);
            match run_plan(&inputs) {
                Err(PlanError::InvalidInput { field, .. }) => assert_eq!(field, expected_field),
                other => panic!("expected {expected_field} rejection, got {other:?}"),
            }
        }
    }

    #[test]
    fn detailed_run_reports_solver_trace() {
        let (plan, solve) =
            run_plan_detailed(&sample_inputs(), &SolverConfig::default()).expect("valid plan");
        assert_eq!(plan.required_annual_contribution, solve.solved_value);
        assert_eq!(solve.target_future_value, plan.remaining_corpus);
        assert_eq!(solve.iterations.len(), 14);
        assert!(solve.converged);
    }

    #[test]
    fn horizon_beyond_cap_is_rejected() {
        let mut inputs = sample_inputs();
        inputs.years = 5_000;
        inputs.inflation_rate = 0.0;
        inputs.return_rate = 30.0;
        let err = run_plan(&inputs).expect_err("horizon above cap");
        assert_eq!(
            err,
            PlanError::input("years", format!("must be <= {MAX_HORIZON_YEARS}"))
        );

        inputs.years = u32::MAX;
        assert!(run_plan(&inputs).is_err());
    }

    #[test]
    fn overflowing_income_projection_is_rejected() {
        let mut inputs = sample_inputs();
        inputs.monthly_income = 1e300;
        inputs.inflation_rate = 100.0;
        let err = run_plan(&inputs).expect_err("income overflows");
        assert!(matches!(
            err,
            PlanError::InvalidInput {
                field: "monthly_income",
                ..
            }
        ));
    }

    #[test]
    fn overflowing_existing_corpus_projection_is_rejected() {
        let mut inputs = sample_inputs();
        inputs.years = MAX_HORIZON_YEARS;
        inputs.inflation_rate = 0.0;
        inputs.return_rate = 300.0;
        inputs.existing_corpus = 1.0;
        let err = run_plan(&inputs).expect_err("existing corpus overflows");
        assert!(matches!(
            err,
            PlanError::InvalidInput {
                field: "existing_corpus",
                ..
            }
        ));
    }

    #[test]
    fn overflowing_contribution_series_is_rejected() {
        let mut inputs = sample_inputs();
        inputs.years = MAX_HORIZON_YEARS;
        inputs.inflation_rate = 0.0;
        inputs.return_rate = 200.0;
        let err = run_plan(&inputs).expect_err("series overflows");
        assert!(matches!(err, PlanError::InvalidInput { field: "years", .. }));
    }

    #[test]
    fn plan_is_referentially_transparent() {
        let inputs = sample_inputs();
        assert_eq!(run_plan(&inputs), run_plan(&inputs));
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(48))]

        #[test]
        fn prop_inflation_never_shrinks_value(
            value in 1u32..2_000_000,
            years in 0u32..51,
            rate_bp in 0u32..1_501
        ) {
            let value = value as f64;
            prop_assert!(adjust_for_inflation(value, years, rate_bp as f64 / 100.0) >= value);
        }

        #[test]
        fn prop_zero_years_is_identity(
            value in 0u32..50_000_000,
            rate_bp in 0u32..3_001
        ) {
            let value = value as f64;
            let rate = rate_bp as f64 / 100.0;
            prop_assert_eq!(adjust_for_inflation(value, 0, rate), value);
            prop_assert_eq!(future_value_of_existing_corpus(value, 0, rate), value);
        }

        #[test]
        fn prop_series_increases_with_return_and_step_up(
            contribution in 1u32..1_000_000,
            years in 1u32..51,
            return_bp in 100u32..3_000,
            step_up_bp in 0u32..1_500
        ) {
            let contribution = contribution as f64;
            let return_rate = return_bp as f64 / 100.0;
            let step_up_rate = step_up_bp as f64 / 100.0;
            let base = future_value_with_step_up(contribution, years, return_rate, step_up_rate);

            let higher_return =
                future_value_with_step_up(contribution, years, return_rate + 0.5, step_up_rate);
            prop_assert!(higher_return > base);

            if years >= 2 {
                let higher_step_up =
                    future_value_with_step_up(contribution, years, return_rate, step_up_rate + 0.5);
                prop_assert!(higher_step_up > base);
            }
        }

        #[test]
        fn prop_remaining_corpus_is_never_negative(
            monthly_income in 1_000u32..2_000_000,
            years in 1u32..51,
            inflation_bp in 0u32..1_501,
            withdrawal_bp in 100u32..1_001,
            return_bp in 100u32..3_001,
            step_up_bp in 0u32..1_501,
            existing_corpus in 0u32..50_000_001
        ) {
            let inputs = PlanInputs {
                monthly_income: monthly_income as f64,
                years,
                inflation_rate: inflation_bp as f64 / 100.0,
                withdrawal_rate: withdrawal_bp as f64 / 100.0,
                return_rate: return_bp as f64 / 100.0,
                step_up_rate: step_up_bp as f64 / 100.0,
                existing_corpus: existing_corpus as f64,
            };
            let result = run_plan(&inputs).expect("inputs within domain");
            prop_assert!(result.remaining_corpus >= 0.0);
            prop_assert!(result.required_annual_contribution >= 0.0);
            prop_assert!(result.required_annual_contribution.is_finite());
            if result.remaining_corpus > 0.0 {
                prop_assert!(result.required_annual_contribution > 0.0);
            }
        }
    }
}
