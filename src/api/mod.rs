use axum::{
    Router,
    extract::{
        Json, Query,
        rejection::{JsonRejection, QueryRejection},
    },
    http::{StatusCode, header},
    response::{Html, IntoResponse, Response},
    routing::get,
};
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::core::{
    ContributionYear, InputLimits, PlanInputs, PlanResult, SolveResult, SolverConfig,
    ZeroTargetPolicy, contribution_schedule, run_plan_detailed, validate_inputs,
};

const INDEX_HTML: &str = include_str!("../../web/index.html");
const APP_JS: &str = include_str!("../../web/app.js");

const DISCLAIMER: &str = "Disclaimer: The calculations provided are estimates based on the inputs given. \
Actual investment returns, inflation rates, and financial conditions may vary. \
This tool is for informational purposes only and does not constitute financial advice. \
Please consult a financial advisor before making investment decisions.";

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliZeroTargetPolicy {
    ShortCircuit,
    Search,
}

impl From<CliZeroTargetPolicy> for ZeroTargetPolicy {
    fn from(value: CliZeroTargetPolicy) -> Self {
        match value {
            CliZeroTargetPolicy::ShortCircuit => ZeroTargetPolicy::ShortCircuit,
            CliZeroTargetPolicy::Search => ZeroTargetPolicy::Search,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum ApiZeroTargetPolicy {
    #[serde(alias = "shortCircuit", alias = "short_circuit", alias = "zero")]
    ShortCircuit,
    Search,
}

impl From<ApiZeroTargetPolicy> for CliZeroTargetPolicy {
    fn from(value: ApiZeroTargetPolicy) -> Self {
        match value {
            ApiZeroTargetPolicy::ShortCircuit => CliZeroTargetPolicy::ShortCircuit,
            ApiZeroTargetPolicy::Search => CliZeroTargetPolicy::Search,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct PlanPayload {
    monthly_income: Option<f64>,
    years: Option<u32>,
    inflation_rate: Option<f64>,
    withdrawal_rate: Option<f64>,
    return_rate: Option<f64>,
    step_up_rate: Option<f64>,
    existing_corpus: Option<f64>,

    search_min: Option<f64>,
    search_max: Option<f64>,
    tolerance: Option<f64>,
    max_iterations: Option<u32>,
    zero_target: Option<ApiZeroTargetPolicy>,

    enforce_limits: Option<bool>,
}

#[derive(Parser, Debug)]
#[command(
    name = "retire",
    about = "Retirement corpus planner (inflation-adjusted income, withdrawal-rate corpus, step-up contributions)",
    after_help = "Run `retire serve [port]` to start the HTTP API instead."
)]
pub struct Cli {
    #[arg(
        long,
        default_value_t = 50_000.0,
        help = "Desired monthly income in today's money"
    )]
    monthly_income: f64,
    #[arg(long, default_value_t = 30, help = "Years until retirement")]
    years: u32,
    #[arg(
        long,
        default_value_t = 7.0,
        help = "Expected annual inflation in percent"
    )]
    inflation_rate: f64,
    #[arg(
        long,
        default_value_t = 4.0,
        help = "Sustainable annual withdrawal rate in percent"
    )]
    withdrawal_rate: f64,
    #[arg(
        long,
        default_value_t = 11.0,
        help = "Expected annual investment return in percent"
    )]
    return_rate: f64,
    #[arg(
        long,
        default_value_t = 7.0,
        help = "Annual increase of the contribution in percent"
    )]
    step_up_rate: f64,
    #[arg(
        long,
        default_value_t = 0.0,
        help = "Retirement savings already invested today"
    )]
    existing_corpus: f64,
    #[arg(
        long,
        default_value_t = 1.0,
        help = "Lower bound of the contribution search"
    )]
    search_min: f64,
    #[arg(
        long,
        default_value_t = 10_000_000.0,
        help = "Upper bound of the contribution search"
    )]
    search_max: f64,
    #[arg(
        long,
        default_value_t = 1_000.0,
        help = "Stop searching once the bracket is this narrow"
    )]
    tolerance: f64,
    #[arg(long, default_value_t = 64, help = "Hard cap on bisection steps")]
    max_iterations: u32,
    #[arg(
        long,
        value_enum,
        default_value_t = CliZeroTargetPolicy::ShortCircuit,
        help = "Behaviour when existing savings already cover the goal"
    )]
    zero_target: CliZeroTargetPolicy,
    #[arg(long, help = "Skip the interactive input range checks")]
    no_limits: bool,
    #[arg(long, help = "Print the plan as JSON")]
    json: bool,
    #[arg(long, help = "Include the year-by-year contribution schedule")]
    schedule: bool,
    #[arg(long, default_value = "₹", help = "Currency symbol for the summary")]
    currency_symbol: String,
}

#[derive(Debug)]
struct PlanRequest {
    inputs: PlanInputs,
    config: SolverConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PlanResponse {
    plan: PlanResult,
    schedule: Vec<ContributionYear>,
    solver: SolveResult,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

fn build_request(cli: &Cli) -> Result<PlanRequest, String> {
    let inputs = PlanInputs {
        monthly_income: cli.monthly_income,
        years: cli.years,
        inflation_rate: cli.inflation_rate,
        withdrawal_rate: cli.withdrawal_rate,
        return_rate: cli.return_rate,
        step_up_rate: cli.step_up_rate,
        existing_corpus: cli.existing_corpus,
    };
    validate_inputs(&inputs).map_err(|e| e.to_string())?;
    if !cli.no_limits {
        InputLimits::default()
            .check(&inputs)
            .map_err(|e| e.to_string())?;
    }

    let config = SolverConfig {
        search_lower_bound: cli.search_min,
        search_upper_bound: cli.search_max,
        tolerance: cli.tolerance,
        max_iterations: cli.max_iterations,
        zero_target: cli.zero_target.into(),
    };

    Ok(PlanRequest { inputs, config })
}

fn compute_response(request: &PlanRequest) -> Result<PlanResponse, String> {
    let (plan, solver) =
        run_plan_detailed(&request.inputs, &request.config).map_err(|e| e.to_string())?;
    let schedule = contribution_schedule(
        plan.required_annual_contribution,
        request.inputs.years,
        request.inputs.return_rate,
        request.inputs.step_up_rate,
    );
    Ok(PlanResponse {
        plan,
        schedule,
        solver,
    })
}

/// Runs one calculation for the command line and returns the text to print.
pub fn run_cli(cli: Cli) -> Result<String, String> {
    let request = build_request(&cli)?;
    let response = compute_response(&request)?;
    debug!(
        contribution = response.plan.required_annual_contribution,
        "cli plan computed"
    );

    if cli.json {
        return serde_json::to_string_pretty(&response)
            .map_err(|e| format!("Failed to encode plan as JSON: {e}"));
    }

    let mut out = render_summary(&request.inputs, &response.plan, &cli.currency_symbol);
    if cli.schedule {
        out.push('\n');
        out.push_str(&render_schedule(&response.schedule, &cli.currency_symbol));
    }
    Ok(out)
}

pub fn render_summary(inputs: &PlanInputs, plan: &PlanResult, currency: &str) -> String {
    let note = if plan.search_saturated {
        "Note: the goal is beyond the contribution search range; the figure above is a lower estimate.\n"
    } else {
        ""
    };
    format!(
        "Retirement Plan Summary\n\
         Assumptions: {years} years, inflation {inflation}, withdrawal {withdrawal}, return {ret}, step-up {step_up}\n\
         Future Monthly Income Needed: {currency}{future_income}/month\n\
         Required Retirement Corpus: {currency}{required}\n\
         Existing Corpus: {currency}{existing}\n\
         Future Value of Existing Corpus: {currency}{projected}\n\
         Remaining Corpus to be Accumulated: {currency}{remaining}\n\
         Starting Annual Investment: {currency}{contribution}\n\
         {note}{DISCLAIMER}",
        years = inputs.years,
        inflation = format_percent(inputs.inflation_rate),
        withdrawal = format_percent(inputs.withdrawal_rate),
        ret = format_percent(inputs.return_rate),
        step_up = format_percent(inputs.step_up_rate),
        future_income = format_currency(plan.future_monthly_income),
        required = format_currency(plan.required_corpus),
        existing = format_currency(plan.existing_corpus),
        projected = format_currency(plan.projected_existing_corpus),
        remaining = format_currency(plan.remaining_corpus),
        contribution = format_currency(plan.required_annual_contribution),
    )
}

pub fn render_schedule(schedule: &[ContributionYear], currency: &str) -> String {
    let header = format!(
        "{:>4}  {:>18}  {:>20}  {:>20}\n",
        "Year", "Contribution", "Total Contributed", "Value at Retirement"
    );
    schedule.iter().fold(header, |mut out, row| {
        out.push_str(&format!(
            "{:>4}  {:>18}  {:>20}  {:>20}\n",
            row.year,
            format!("{currency}{}", format_currency(row.contribution)),
            format!("{currency}{}", format_currency(row.cumulative_contributed)),
            format!("{currency}{}", format_currency(row.running_future_value)),
        ));
        out
    })
}

/// Rounds to whole currency units and groups thousands.
pub fn format_currency(value: f64) -> String {
    let rounded = value.round();
    let digits = format!("{:.0}", rounded.abs());
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if rounded < 0.0 {
        format!("-{grouped}")
    } else {
        grouped
    }
}

pub fn format_percent(value: f64) -> String {
    format!("{value:.1}%")
}

fn router() -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/index.html", get(index_handler))
        .route("/app.js", get(app_js_handler))
        .route("/api/plan", get(plan_get_handler).post(plan_post_handler))
        .fallback(not_found_handler)
}

pub async fn run_http_server(port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = router();

    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "retirement planner HTTP API listening");
    info!("local access: http://127.0.0.1:{port}/");

    axum::serve(listener, app).await
}

async fn index_handler() -> impl IntoResponse {
    with_cache_control(Html(INDEX_HTML))
}

async fn app_js_handler() -> impl IntoResponse {
    with_cache_control((
        [(
            header::CONTENT_TYPE,
            "application/javascript; charset=utf-8",
        )],
        APP_JS,
    ))
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn plan_get_handler(payload: Result<Query<PlanPayload>, QueryRejection>) -> Response {
    match payload {
        Ok(Query(payload)) => plan_handler_impl(payload),
        Err(rejection) => rejected_payload(rejection.body_text()),
    }
}

async fn plan_post_handler(payload: Result<Json<PlanPayload>, JsonRejection>) -> Response {
    match payload {
        Ok(Json(payload)) => plan_handler_impl(payload),
        Err(rejection) => rejected_payload(rejection.body_text()),
    }
}

fn rejected_payload(msg: String) -> Response {
    warn!(error = %msg, "malformed plan payload");
    error_response(StatusCode::BAD_REQUEST, &msg)
}

fn plan_handler_impl(payload: PlanPayload) -> Response {
    let request = match plan_request_from_payload(payload) {
        Ok(request) => request,
        Err(msg) => {
            warn!(error = %msg, "rejected plan request");
            return error_response(StatusCode::BAD_REQUEST, &msg);
        }
    };

    match compute_response(&request) {
        Ok(response) => {
            debug!(
                contribution = response.plan.required_annual_contribution,
                saturated = response.plan.search_saturated,
                "plan computed"
            );
            json_response(StatusCode::OK, response)
        }
        Err(msg) => {
            warn!(error = %msg, "plan calculation failed");
            error_response(StatusCode::BAD_REQUEST, &msg)
        }
    }
}

fn with_cache_control<R: IntoResponse>(response: R) -> Response {
    let mut response = response.into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        header::HeaderValue::from_static("no-store"),
    );
    response
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    with_cache_control((status, Json(body)))
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
        },
    )
}

#[cfg(test)]
fn plan_request_from_json(json: &str) -> Result<PlanRequest, String> {
    let payload = serde_json::from_str::<PlanPayload>(json)
        .map_err(|e| format!("Invalid API JSON payload: {e}"))?;
    plan_request_from_payload(payload)
}

fn plan_request_from_payload(payload: PlanPayload) -> Result<PlanRequest, String> {
    let mut cli = default_cli_for_api();

    if let Some(v) = payload.monthly_income {
        cli.monthly_income = v;
    }
    if let Some(v) = payload.years {
        cli.years = v;
    }
    if let Some(v) = payload.inflation_rate {
        cli.inflation_rate = v;
    }
    if let Some(v) = payload.withdrawal_rate {
        cli.withdrawal_rate = v;
    }
    if let Some(v) = payload.return_rate {
        cli.return_rate = v;
    }
    if let Some(v) = payload.step_up_rate {
        cli.step_up_rate = v;
    }
    if let Some(v) = payload.existing_corpus {
        cli.existing_corpus = v;
    }

    if let Some(v) = payload.search_min {
        cli.search_min = v;
    }
    if let Some(v) = payload.search_max {
        cli.search_max = v;
    }
    if let Some(v) = payload.tolerance {
        cli.tolerance = v;
    }
    if let Some(v) = payload.max_iterations {
        cli.max_iterations = v;
    }
    if let Some(v) = payload.zero_target {
        cli.zero_target = v.into();
    }
    if let Some(v) = payload.enforce_limits {
        cli.no_limits = !v;
    }

    build_request(&cli)
}

fn default_cli_for_api() -> Cli {
    let inputs = PlanInputs::default();
    let config = SolverConfig::default();
    Cli {
        monthly_income: inputs.monthly_income,
        years: inputs.years,
        inflation_rate: inputs.inflation_rate,
        withdrawal_rate: inputs.withdrawal_rate,
        return_rate: inputs.return_rate,
        step_up_rate: inputs.step_up_rate,
        existing_corpus: inputs.existing_corpus,
        search_min: config.search_lower_bound,
        search_max: config.search_upper_bound,
        tolerance: config.tolerance,
        max_iterations: config.max_iterations,
        zero_target: CliZeroTargetPolicy::ShortCircuit,
        no_limits: false,
        json: false,
        schedule: false,
        currency_symbol: "₹".to_string(),
    }
}
