use serde::Serialize;

use super::PlanError;

pub const DEFAULT_SEARCH_LOWER_BOUND: f64 = 1.0;
pub const DEFAULT_SEARCH_UPPER_BOUND: f64 = 10_000_000.0;
pub const DEFAULT_TOLERANCE: f64 = 1_000.0;
pub const DEFAULT_MAX_ITERATIONS: u32 = 64;
/// Longest horizon the engine accepts, limits or not.
pub const MAX_HORIZON_YEARS: u32 = 1_000;

/// What the solver does when there is nothing left to accumulate.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ZeroTargetPolicy {
    /// Return exactly zero without evaluating the series.
    #[default]
    ShortCircuit,
    /// Bisect anyway; the bracket collapses towards the lower bound.
    Search,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlanInputs {
    pub monthly_income: f64,
    pub years: u32,
    /// Percent per year.
    pub inflation_rate: f64,
    pub withdrawal_rate: f64,
    pub return_rate: f64,
    pub step_up_rate: f64,
    pub existing_corpus: f64,
}

impl Default for PlanInputs {
    fn default() -> Self {
        Self {
            monthly_income: 50_000.0,
            years: 30,
            inflation_rate: 7.0,
            withdrawal_rate: 4.0,
            return_rate: 11.0,
            step_up_rate: 7.0,
            existing_corpus: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanResult {
    pub future_monthly_income: f64,
    pub required_corpus: f64,
    pub existing_corpus: f64,
    pub projected_existing_corpus: f64,
    pub remaining_corpus: f64,
    pub required_annual_contribution: f64,
    pub search_saturated: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolverConfig {
    pub search_lower_bound: f64,
    pub search_upper_bound: f64,
    pub tolerance: f64,
    pub max_iterations: u32,
    pub zero_target: ZeroTargetPolicy,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            search_lower_bound: DEFAULT_SEARCH_LOWER_BOUND,
            search_upper_bound: DEFAULT_SEARCH_UPPER_BOUND,
            tolerance: DEFAULT_TOLERANCE,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            zero_target: ZeroTargetPolicy::ShortCircuit,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContributionYear {
    pub year: u32,
    pub contribution: f64,
    pub cumulative_contributed: f64,
    pub compounding_years: u32,
    pub future_value: f64,
    pub running_future_value: f64,
}

/// Accepted input ranges for interactive hosts. The engine itself only
/// enforces the domain constraints in `validate_inputs`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InputLimits {
    pub monthly_income: (f64, f64),
    pub years: (u32, u32),
    pub inflation_rate: (f64, f64),
    pub withdrawal_rate: (f64, f64),
    pub return_rate: (f64, f64),
    pub step_up_rate: (f64, f64),
    pub existing_corpus: (f64, f64),
}

impl Default for InputLimits {
    fn default() -> Self {
        Self {
            monthly_income: (1_000.0, 2_000_000.0),
            years: (1, 50),
            inflation_rate: (0.0, 15.0),
            withdrawal_rate: (1.0, 10.0),
            return_rate: (1.0, 30.0),
            step_up_rate: (0.0, 15.0),
            existing_corpus: (0.0, 50_000_000.0),
        }
    }
}

impl InputLimits {
    pub fn check(&self, inputs: &PlanInputs) -> Result<(), PlanError> {
        for (field, value, (min, max)) in [
            ("monthly_income", inputs.monthly_income, self.monthly_income),
            ("inflation_rate", inputs.inflation_rate, self.inflation_rate),
            (
                "withdrawal_rate",
                inputs.withdrawal_rate,
                self.withdrawal_rate,
            ),
            ("return_rate", inputs.return_rate, self.return_rate),
            ("step_up_rate", inputs.step_up_rate, self.step_up_rate),
            (
                "existing_corpus",
                inputs.existing_corpus,
                self.existing_corpus,
            ),
        ] {
            if !(min..=max).contains(&value) {
                return Err(PlanError::input(
                    field,
                    format!("must be between {min} and {max}"),
                ));
            }
        }

        let (min_years, max_years) = self.years;
        if !(min_years..=max_years).contains(&inputs.years) {
            return Err(PlanError::input(
                "years",
                format!("must be between {min_years} and {max_years}"),
            ));
        }
        Ok(())
    }
}
