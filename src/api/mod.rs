use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    extract::{Json, Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::Utc;
use clap::Parser;
use serde::{Deserialize, Deserializer, Serialize};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::core::{
    AggregateResults, CashflowEvent, EventKind, HeadlineStats, Recommendation, SimulationError,
    SimulationInputs, fire, headline_stats, networth, recommend, run_monte_carlo,
};
use crate::store::{ScenarioConfig, ScenarioRecord, ScenarioStore, next_scenario_id};

#[derive(Parser, Debug)]
#[command(
    name = "nestegg simulate",
    about = "Monte Carlo retirement simulation (capped normal returns, income/expense events)"
)]
pub struct Cli {
    #[arg(long, default_value_t = 1_000_000.0, help = "Starting portfolio value")]
    portfolio_value: f64,
    #[arg(long, default_value_t = 60_000.0, help = "Annual expenses in today's money")]
    annual_expenses: f64,
    #[arg(long, default_value_t = 30, help = "Retirement horizon in years")]
    retirement_years: u32,
    #[arg(
        long,
        default_value_t = 4.0,
        help = "Planned withdrawal rate in percent, e.g. 4"
    )]
    withdrawal_rate: f64,
    #[arg(
        long,
        default_value_t = 7.0,
        help = "Expected mean annual market return in percent"
    )]
    market_return: f64,
    #[arg(
        long,
        default_value_t = 2.5,
        help = "Expected annual inflation in percent"
    )]
    inflation_rate: f64,
    #[arg(long, default_value_t = 1_000, help = "Number of Monte Carlo trials")]
    simulations: u32,
    #[arg(long, default_value_t = 42)]
    seed: u64,
}

/// The parser's `default_value_t` table doubles as the API defaults:
/// absent or unusable payload fields fall back to these values.
fn default_cli() -> Cli {
    Cli::parse_from(["nestegg-simulate"])
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SimulatePayload {
    #[serde(deserialize_with = "lenient_f64")]
    portfolio_value: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    annual_expenses: Option<f64>,
    #[serde(deserialize_with = "lenient_u32")]
    retirement_years: Option<u32>,
    #[serde(deserialize_with = "lenient_f64")]
    withdrawal_rate: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    market_return: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    inflation_rate: Option<f64>,
    #[serde(deserialize_with = "lenient_u32")]
    num_simulations: Option<u32>,
    #[serde(deserialize_with = "lenient_u64")]
    seed: Option<u64>,
    income_events: Option<Vec<EventPayload>>,
    expense_events: Option<Vec<EventPayload>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EventPayload {
    name: Option<String>,
    #[serde(deserialize_with = "lenient_f64")]
    amount: Option<f64>,
    #[serde(alias = "type", deserialize_with = "lenient_kind")]
    kind: Option<EventKind>,
    #[serde(deserialize_with = "lenient_u32")]
    start_year: Option<u32>,
    #[serde(deserialize_with = "lenient_u32")]
    end_year: Option<u32>,
    #[serde(deserialize_with = "lenient_bool")]
    inflation_adjusted: Option<bool>,
}

/// Accepts a JSON number, a numeric string, or garbage; garbage reads as
/// absent so the field falls back to its default instead of erroring.
#[derive(Deserialize)]
#[serde(untagged)]
enum MaybeNumber {
    Num(f64),
    Text(String),
}

impl MaybeNumber {
    fn as_f64(&self) -> Option<f64> {
        match self {
            MaybeNumber::Num(n) => Some(*n),
            MaybeNumber::Text(s) => s.trim().parse().ok(),
        }
    }
}

fn lenient_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    let value = Option::<MaybeNumber>::deserialize(deserializer)?;
    Ok(value.and_then(|v| v.as_f64()))
}

fn lenient_u32<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u32>, D::Error> {
    let value = Option::<MaybeNumber>::deserialize(deserializer)?;
    Ok(value
        .and_then(|v| v.as_f64())
        .filter(|v| v.is_finite() && *v >= 0.0 && *v <= u32::MAX as f64)
        .map(|v| v.trunc() as u32))
}

fn lenient_u64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
    let value = Option::<MaybeNumber>::deserialize(deserializer)?;
    Ok(value
        .and_then(|v| v.as_f64())
        .filter(|v| v.is_finite() && *v >= 0.0)
        .map(|v| v.trunc() as u64))
}

/// Accepts a JSON bool or the form-value strings "true"/"false".
#[derive(Deserialize)]
#[serde(untagged)]
enum MaybeBool {
    Flag(bool),
    Text(String),
}

fn lenient_bool<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<bool>, D::Error> {
    Ok(match Option::<MaybeBool>::deserialize(deserializer)? {
        Some(MaybeBool::Flag(flag)) => Some(flag),
        Some(MaybeBool::Text(s)) => s.trim().parse().ok(),
        None => None,
    })
}

/// An unrecognized event type reads as absent (the form's one-time
/// default) rather than failing the payload.
fn lenient_kind<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<EventKind>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum MaybeKind {
        Kind(EventKind),
        Other(serde::de::IgnoredAny),
    }

    Ok(match Option::<MaybeKind>::deserialize(deserializer)? {
        Some(MaybeKind::Kind(kind)) => Some(kind),
        _ => None,
    })
}

/// Merges a payload over the defaults. Unusable numerics (non-finite,
/// out of bounds for the field) are silently replaced, never rejected.
fn resolve_simulation(payload: SimulatePayload) -> ResolvedSimulation {
    let mut cli = default_cli();

    if let Some(v) = payload.portfolio_value.filter(|v| v.is_finite() && *v > 0.0) {
        cli.portfolio_value = v;
    }
    if let Some(v) = payload.annual_expenses.filter(|v| v.is_finite() && *v >= 0.0) {
        cli.annual_expenses = v;
    }
    if let Some(v) = payload.retirement_years.filter(|v| *v > 0) {
        cli.retirement_years = v;
    }
    if let Some(v) = payload.withdrawal_rate.filter(|v| v.is_finite() && *v > 0.0) {
        cli.withdrawal_rate = v;
    }
    if let Some(v) = payload.market_return.filter(|v| v.is_finite()) {
        cli.market_return = v;
    }
    if let Some(v) = payload.inflation_rate.filter(|v| v.is_finite()) {
        cli.inflation_rate = v;
    }
    if let Some(v) = payload.num_simulations.filter(|v| *v > 0) {
        cli.simulations = v;
    }
    if let Some(v) = payload.seed {
        cli.seed = v;
    }

    let income_events = sanitize_events(payload.income_events.unwrap_or_default());
    let expense_events = sanitize_events(payload.expense_events.unwrap_or_default());

    ResolvedSimulation {
        inputs: build_inputs(&cli),
        income_events,
        expense_events,
    }
}

#[derive(Debug)]
struct ResolvedSimulation {
    inputs: SimulationInputs,
    income_events: Vec<CashflowEvent>,
    expense_events: Vec<CashflowEvent>,
}

fn build_inputs(cli: &Cli) -> SimulationInputs {
    SimulationInputs {
        portfolio_value: cli.portfolio_value,
        annual_expenses: cli.annual_expenses,
        retirement_years: cli.retirement_years,
        withdrawal_rate: cli.withdrawal_rate / 100.0,
        market_return: cli.market_return / 100.0,
        inflation_rate: cli.inflation_rate / 100.0,
        num_simulations: cli.simulations,
        seed: cli.seed,
    }
}

fn sanitize_events(entries: Vec<EventPayload>) -> Vec<CashflowEvent> {
    entries.into_iter().filter_map(sanitize_event).collect()
}

/// Entries missing a name, a usable non-zero amount, or a start year are
/// dropped, not errored. One-time events end the year they start.
fn sanitize_event(entry: EventPayload) -> Option<CashflowEvent> {
    let name = entry.name.map(|n| n.trim().to_string())?;
    if name.is_empty() {
        return None;
    }
    let amount = entry.amount.filter(|a| a.is_finite() && *a != 0.0)?;
    let start_year = entry.start_year.filter(|y| *y >= 1)?;

    let kind = entry.kind.unwrap_or(EventKind::OneTime);
    let end_year = match kind {
        EventKind::OneTime => start_year,
        EventKind::Recurring => entry.end_year.unwrap_or(start_year).max(start_year),
    };

    Some(CashflowEvent {
        name,
        amount,
        kind,
        start_year,
        end_year,
        inflation_adjusted: entry.inflation_adjusted.unwrap_or(false),
    })
}

fn sanitize_stored_events(events: &[CashflowEvent]) -> Vec<CashflowEvent> {
    events
        .iter()
        .filter(|e| !e.name.trim().is_empty() && e.amount.is_finite() && e.amount != 0.0)
        .map(|e| {
            let mut event = e.clone();
            event.end_year = match event.kind {
                EventKind::OneTime => event.start_year,
                EventKind::Recurring => event.end_year.max(event.start_year),
            };
            event
        })
        .collect()
}

fn inputs_from_config(config: &ScenarioConfig, seed: u64) -> ResolvedSimulation {
    let payload = SimulatePayload {
        portfolio_value: Some(config.portfolio_value),
        annual_expenses: Some(config.annual_expenses),
        retirement_years: Some(config.retirement_years),
        withdrawal_rate: Some(config.withdrawal_rate),
        market_return: Some(config.market_return),
        inflation_rate: Some(config.inflation_rate),
        num_simulations: Some(config.num_simulations),
        seed: Some(seed),
        income_events: None,
        expense_events: None,
    };
    let mut resolved = resolve_simulation(payload);
    resolved.income_events = sanitize_stored_events(&config.income_events);
    resolved.expense_events = sanitize_stored_events(&config.expense_events);
    resolved
}

fn config_from_resolved(resolved: &ResolvedSimulation) -> ScenarioConfig {
    let inputs = &resolved.inputs;
    ScenarioConfig {
        portfolio_value: inputs.portfolio_value,
        annual_expenses: inputs.annual_expenses,
        retirement_years: inputs.retirement_years,
        withdrawal_rate: inputs.withdrawal_rate * 100.0,
        market_return: inputs.market_return * 100.0,
        inflation_rate: inputs.inflation_rate * 100.0,
        num_simulations: inputs.num_simulations,
        income_events: resolved.income_events.clone(),
        expense_events: resolved.expense_events.clone(),
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ResolvedInputsEcho {
    portfolio_value: f64,
    annual_expenses: f64,
    retirement_years: u32,
    withdrawal_rate: f64,
    market_return: f64,
    inflation_rate: f64,
    num_simulations: u32,
    seed: u64,
}

impl From<&SimulationInputs> for ResolvedInputsEcho {
    fn from(inputs: &SimulationInputs) -> Self {
        Self {
            portfolio_value: inputs.portfolio_value,
            annual_expenses: inputs.annual_expenses,
            retirement_years: inputs.retirement_years,
            withdrawal_rate: inputs.withdrawal_rate * 100.0,
            market_return: inputs.market_return * 100.0,
            inflation_rate: inputs.inflation_rate * 100.0,
            num_simulations: inputs.num_simulations,
            seed: inputs.seed,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulateResponse {
    inputs: ResolvedInputsEcho,
    results: AggregateResults,
    stats: Option<HeadlineStats>,
    recommendations: Vec<Recommendation>,
}

async fn run_report(resolved: &ResolvedSimulation) -> Result<SimulateResponse, SimulationError> {
    let cancel = CancellationToken::new();
    let results = run_monte_carlo(
        &resolved.inputs,
        &resolved.income_events,
        &resolved.expense_events,
        &cancel,
        |p| tracing::debug!(completed = p.completed, total = p.total, "simulation batch"),
    )
    .await?;

    tracing::info!(
        trials = results.trials.len(),
        success_rate = results.success_rate,
        "simulation complete"
    );

    let stats = headline_stats(&results, &resolved.inputs);
    let recommendations = recommend(Some(&results), &resolved.inputs, &resolved.income_events);

    Ok(SimulateResponse {
        inputs: (&resolved.inputs).into(),
        results,
        stats,
        recommendations,
    })
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Clone)]
struct AppState {
    store: Arc<dyn ScenarioStore>,
}

pub async fn run_http_server(port: u16, store: Arc<dyn ScenarioStore>) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = router(store);

    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "nestegg HTTP API listening");

    axum::serve(listener, app).await
}

fn router(store: Arc<dyn ScenarioStore>) -> Router {
    Router::new()
        .route(
            "/api/simulate",
            get(simulate_get_handler).post(simulate_post_handler),
        )
        .route("/api/fire", get(fire_get_handler).post(fire_post_handler))
        .route(
            "/api/networth",
            get(networth_get_handler).post(networth_post_handler),
        )
        .route(
            "/api/recommendations",
            get(recommendations_get_handler).post(recommendations_post_handler),
        )
        .route(
            "/api/scenarios",
            get(list_scenarios_handler).post(create_scenario_handler),
        )
        .route(
            "/api/scenarios/:id",
            get(get_scenario_handler)
                .put(update_scenario_handler)
                .delete(delete_scenario_handler),
        )
        .route(
            "/api/scenarios/:id/duplicate",
            post(duplicate_scenario_handler),
        )
        .route("/api/scenarios/:id/run", post(run_scenario_handler))
        .fallback(not_found_handler)
        .with_state(AppState { store })
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn simulate_get_handler(Query(payload): Query<SimulatePayload>) -> Response {
    simulate_handler_impl(payload).await
}

async fn simulate_post_handler(Json(payload): Json<SimulatePayload>) -> Response {
    simulate_handler_impl(payload).await
}

async fn simulate_handler_impl(payload: SimulatePayload) -> Response {
    let resolved = resolve_simulation(payload);
    match run_report(&resolved).await {
        Ok(response) => json_response(StatusCode::OK, response),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RecommendationsResponse {
    recommendations: Vec<Recommendation>,
}

async fn recommendations_get_handler(Query(payload): Query<SimulatePayload>) -> Response {
    recommendations_handler_impl(payload)
}

async fn recommendations_post_handler(Json(payload): Json<SimulatePayload>) -> Response {
    recommendations_handler_impl(payload)
}

/// Pre-run advice: evaluates the bootstrap list from inputs and events
/// alone, before any simulation results exist.
fn recommendations_handler_impl(payload: SimulatePayload) -> Response {
    let resolved = resolve_simulation(payload);
    let recommendations = recommend(None, &resolved.inputs, &resolved.income_events);
    json_response(StatusCode::OK, RecommendationsResponse { recommendations })
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FirePayload {
    #[serde(deserialize_with = "lenient_u32")]
    current_age: Option<u32>,
    #[serde(deserialize_with = "lenient_u32")]
    target_age: Option<u32>,
    #[serde(deserialize_with = "lenient_f64")]
    current_savings: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    monthly_contribution: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    annual_expenses: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    expected_return: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    withdrawal_rate: Option<f64>,
}

fn resolve_fire(payload: FirePayload) -> fire::FireInputs {
    fire::FireInputs {
        current_age: payload.current_age.unwrap_or(30),
        target_age: payload.target_age.unwrap_or(50),
        current_savings: payload
            .current_savings
            .filter(|v| v.is_finite() && *v >= 0.0)
            .unwrap_or(0.0),
        monthly_contribution: payload
            .monthly_contribution
            .filter(|v| v.is_finite() && *v >= 0.0)
            .unwrap_or(0.0),
        annual_expenses: payload
            .annual_expenses
            .filter(|v| v.is_finite() && *v > 0.0)
            .unwrap_or(40_000.0),
        expected_return: payload
            .expected_return
            .filter(|v| v.is_finite())
            .unwrap_or(7.0)
            / 100.0,
        withdrawal_rate: payload
            .withdrawal_rate
            .filter(|v| v.is_finite() && *v > 0.0)
            .unwrap_or(4.0)
            / 100.0,
    }
}

async fn fire_get_handler(Query(payload): Query<FirePayload>) -> Response {
    fire_handler_impl(payload)
}

async fn fire_post_handler(Json(payload): Json<FirePayload>) -> Response {
    fire_handler_impl(payload)
}

fn fire_handler_impl(payload: FirePayload) -> Response {
    let inputs = resolve_fire(payload);
    match fire::evaluate(&inputs) {
        Ok(outlook) => json_response(StatusCode::OK, outlook),
        Err(errors) => error_response(StatusCode::BAD_REQUEST, &errors.join(". ")),
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NetWorthPayload {
    #[serde(deserialize_with = "lenient_f64")]
    current_net_worth: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    annual_income: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    annual_savings: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    investment_return: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    income_growth: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    inflation_rate: Option<f64>,
    #[serde(deserialize_with = "lenient_u32")]
    years: Option<u32>,
}

fn resolve_networth(payload: &NetWorthPayload) -> (networth::NetWorthInputs, u32) {
    let inputs = networth::NetWorthInputs {
        current_net_worth: payload
            .current_net_worth
            .filter(|v| v.is_finite())
            .unwrap_or(0.0),
        annual_income: payload
            .annual_income
            .filter(|v| v.is_finite() && *v >= 0.0)
            .unwrap_or(75_000.0),
        annual_savings: payload
            .annual_savings
            .filter(|v| v.is_finite())
            .unwrap_or(25_000.0),
        investment_return: payload
            .investment_return
            .filter(|v| v.is_finite())
            .unwrap_or(7.0)
            / 100.0,
        income_growth: payload
            .income_growth
            .filter(|v| v.is_finite())
            .unwrap_or(3.0)
            / 100.0,
        inflation_rate: payload
            .inflation_rate
            .filter(|v| v.is_finite())
            .unwrap_or(2.5)
            / 100.0,
    };
    let years = payload.years.filter(|y| *y >= 1).unwrap_or(10).min(50);
    (inputs, years)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct NetWorthResponse {
    projection: Vec<networth::NetWorthPoint>,
    summary: networth::NetWorthSummary,
}

async fn networth_get_handler(Query(payload): Query<NetWorthPayload>) -> Response {
    networth_handler_impl(payload)
}

async fn networth_post_handler(Json(payload): Json<NetWorthPayload>) -> Response {
    networth_handler_impl(payload)
}

fn networth_handler_impl(payload: NetWorthPayload) -> Response {
    let (inputs, years) = resolve_networth(&payload);
    let response = NetWorthResponse {
        projection: networth::project(&inputs, years),
        summary: networth::summarize(&inputs),
    };
    json_response(StatusCode::OK, response)
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct CreateScenarioPayload {
    name: Option<String>,
    config: Option<SimulatePayload>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct UpdateScenarioPayload {
    name: Option<String>,
    config: Option<SimulatePayload>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct DuplicateScenarioPayload {
    name: Option<String>,
}

async fn list_scenarios_handler(State(state): State<AppState>) -> Response {
    json_response(StatusCode::OK, state.store.list())
}

async fn create_scenario_handler(
    State(state): State<AppState>,
    payload: Option<Json<CreateScenarioPayload>>,
) -> Response {
    let payload = payload.map(|Json(p)| p).unwrap_or_default();
    let resolved = resolve_simulation(payload.config.unwrap_or_default());
    let name = payload
        .name
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| format!("Scenario {}", state.store.list().len() + 1));

    let now = Utc::now();
    let record = ScenarioRecord {
        id: next_scenario_id(now),
        name,
        config: config_from_resolved(&resolved),
        results: None,
        created_at: now,
        updated_at: now,
    };
    state.store.put(record.clone());
    json_response(StatusCode::CREATED, record)
}

async fn get_scenario_handler(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.store.get(&id) {
        Some(record) => json_response(StatusCode::OK, record),
        None => error_response(StatusCode::NOT_FOUND, "Scenario not found"),
    }
}

async fn update_scenario_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<UpdateScenarioPayload>,
) -> Response {
    let Some(mut record) = state.store.get(&id) else {
        return error_response(StatusCode::NOT_FOUND, "Scenario not found");
    };

    if let Some(name) = payload.name.filter(|n| !n.trim().is_empty()) {
        record.name = name;
    }
    if let Some(config) = payload.config {
        // A config change invalidates previously stored results.
        record.config = config_from_resolved(&resolve_simulation(config));
        record.results = None;
    }
    record.updated_at = Utc::now();

    state.store.put(record.clone());
    json_response(StatusCode::OK, record)
}

async fn delete_scenario_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Response {
    if state.store.delete(&id) {
        StatusCode::NO_CONTENT.into_response()
    } else {
        error_response(StatusCode::NOT_FOUND, "Scenario not found")
    }
}

async fn duplicate_scenario_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Option<Json<DuplicateScenarioPayload>>,
) -> Response {
    let Some(source) = state.store.get(&id) else {
        return error_response(StatusCode::NOT_FOUND, "Scenario not found");
    };

    let payload = payload.map(|Json(p)| p).unwrap_or_default();
    let name = payload
        .name
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| format!("{} (Copy)", source.name));

    let now = Utc::now();
    let record = ScenarioRecord {
        id: next_scenario_id(now),
        name,
        config: source.config.clone(),
        results: None,
        created_at: now,
        updated_at: now,
    };
    state.store.put(record.clone());
    json_response(StatusCode::CREATED, record)
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct RunScenarioPayload {
    #[serde(deserialize_with = "lenient_u64")]
    seed: Option<u64>,
}

async fn run_scenario_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Option<Json<RunScenarioPayload>>,
) -> Response {
    let Some(mut record) = state.store.get(&id) else {
        return error_response(StatusCode::NOT_FOUND, "Scenario not found");
    };

    let payload = payload.map(|Json(p)| p).unwrap_or_default();
    let seed = payload.seed.unwrap_or(default_cli().seed);
    let resolved = inputs_from_config(&record.config, seed);

    match run_report(&resolved).await {
        Ok(response) => {
            record.results = Some(response.results.clone());
            record.updated_at = Utc::now();
            state.store.put(record);
            json_response(StatusCode::OK, response)
        }
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
    }
}

pub async fn run_simulate_command(args: &[String]) -> Result<(), String> {
    let cli = Cli::try_parse_from(args).map_err(|e| e.to_string())?;
    let resolved = ResolvedSimulation {
        inputs: build_inputs(&cli),
        income_events: Vec::new(),
        expense_events: Vec::new(),
    };

    let report = run_report(&resolved).await.map_err(|e| e.to_string())?;
    let json = serde_json::to_string_pretty(&report).map_err(|e| e.to_string())?;
    println!("{json}");
    Ok(())
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        "no-store".parse().expect("valid header"),
    );
    response
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
        },
    )
}
