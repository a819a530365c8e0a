use std::f64::consts::PI;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use super::types::{
    AggregateResults, CashflowEvent, HeadlineStats, MarketParams, SimulationInputs, TrialResult,
};

/// Trials per cooperative scheduling slice.
pub const BATCH_SIZE: u32 = 100;

#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("simulation run cancelled")]
    Cancelled,
    #[error("invalid simulation inputs: {0}")]
    InvalidInputs(String),
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct RunProgress {
    pub completed: u32,
    pub total: u32,
}

/// Source of one annual market return per call. The production source is
/// [`MarketSampler`]; tests feed a fixed sequence through [`FixedReturns`].
pub trait ReturnSource {
    fn annual_return(&mut self) -> f64;
}

pub struct MarketSampler {
    rng: Rng,
    params: MarketParams,
}

impl MarketSampler {
    pub fn new(params: MarketParams, seed: u64) -> Self {
        Self {
            rng: Rng::new(seed),
            params,
        }
    }
}

impl ReturnSource for MarketSampler {
    fn annual_return(&mut self) -> f64 {
        let z = self.rng.standard_normal();
        (z * self.params.std_dev + self.params.mean_return)
            .clamp(self.params.min_return, self.params.max_return)
    }
}

/// Replays a pre-supplied return sequence, cycling if exhausted.
pub struct FixedReturns<'a> {
    returns: &'a [f64],
    next: usize,
}

impl<'a> FixedReturns<'a> {
    pub fn new(returns: &'a [f64]) -> Self {
        Self { returns, next: 0 }
    }
}

impl ReturnSource for FixedReturns<'_> {
    fn annual_return(&mut self) -> f64 {
        let r = self.returns[self.next % self.returns.len()];
        self.next += 1;
        r
    }
}

/// Walks one retirement horizon year by year. Growth is applied before the
/// year's withdrawal and is not gated on the balance being positive; once
/// the running balance reaches zero it is pinned there for the remaining
/// years, so a depleted portfolio cannot recover.
pub fn simulate_trial(
    inputs: &SimulationInputs,
    income_events: &[CashflowEvent],
    expense_events: &[CashflowEvent],
    returns: &mut impl ReturnSource,
) -> TrialResult {
    let years = inputs.retirement_years;
    let mut portfolio = inputs.portfolio_value;
    let mut base_expenses = inputs.annual_expenses;
    let mut total_withdrawn = 0.0;
    let mut total_income = 0.0;

    let mut path = Vec::with_capacity(years as usize + 1);
    path.push(portfolio);

    for year in 1..=years {
        let annual_return = returns.annual_return();
        portfolio *= 1.0 + annual_return;

        base_expenses *= 1.0 + inputs.inflation_rate;

        let year_income: f64 = income_events
            .iter()
            .map(|e| e.amount_in(year, inputs.inflation_rate))
            .sum();
        let year_event_expenses: f64 = expense_events
            .iter()
            .map(|e| e.amount_in(year, inputs.inflation_rate))
            .sum();

        let total_expenses = base_expenses + year_event_expenses;
        let net_withdrawal = (total_expenses - year_income).max(0.0);

        portfolio -= net_withdrawal;
        total_withdrawn += net_withdrawal;
        total_income += year_income;

        path.push(portfolio.max(0.0));

        // Depletion is sticky.
        if portfolio <= 0.0 {
            portfolio = 0.0;
        }
    }

    let success = portfolio > 0.0;
    let years_lasted = if success {
        years
    } else {
        path.iter()
            .position(|v| *v <= 0.0)
            .map(|idx| idx as u32)
            .unwrap_or(years)
    };

    TrialResult {
        success,
        final_value: portfolio.max(0.0),
        path,
        total_withdrawn,
        total_income,
        years_lasted,
    }
}

/// Runs `num_simulations` independent trials in batches of [`BATCH_SIZE`],
/// yielding to the scheduler between batches so a host event loop is never
/// blocked for the full run. Cancellation is honored at batch boundaries
/// and discards all partial results. `on_batch` fires after every batch.
///
/// Each trial owns its RNG, seeded from `inputs.seed` and the trial index,
/// so the aggregate output is identical however the run is batched.
pub async fn run_monte_carlo(
    inputs: &SimulationInputs,
    income_events: &[CashflowEvent],
    expense_events: &[CashflowEvent],
    cancel: &CancellationToken,
    mut on_batch: impl FnMut(RunProgress),
) -> Result<AggregateResults, SimulationError> {
    if inputs.num_simulations == 0 {
        return Err(SimulationError::InvalidInputs(
            "numSimulations must be > 0".to_string(),
        ));
    }
    if inputs.retirement_years == 0 {
        return Err(SimulationError::InvalidInputs(
            "retirementYears must be > 0".to_string(),
        ));
    }

    let total = inputs.num_simulations;
    let params = MarketParams::with_mean(inputs.market_return);
    let mut trials = Vec::with_capacity(total as usize);
    let mut completed = 0;

    while completed < total {
        if cancel.is_cancelled() {
            return Err(SimulationError::Cancelled);
        }

        let batch_end = (completed + BATCH_SIZE).min(total);
        for trial_id in completed..batch_end {
            let mut sampler = MarketSampler::new(params, derive_seed(inputs.seed, trial_id));
            trials.push(simulate_trial(
                inputs,
                income_events,
                expense_events,
                &mut sampler,
            ));
        }
        completed = batch_end;
        on_batch(RunProgress { completed, total });

        if completed < total {
            tokio::task::yield_now().await;
        }
    }

    Ok(aggregate(trials))
}

/// Reduces trial results to aggregate statistics. Sorts the trial sequence
/// in place by final value; `all_paths` keeps submission order so the
/// per-year envelope is reproducible.
pub fn aggregate(mut trials: Vec<TrialResult>) -> AggregateResults {
    let total = trials.len();
    let success_count = trials.iter().filter(|t| t.success).count();
    let success_rate = if total == 0 {
        0.0
    } else {
        100.0 * success_count as f64 / total as f64
    };

    let all_paths: Vec<Vec<f64>> = trials.iter().map(|t| t.path.clone()).collect();

    trials.sort_by(|a, b| a.final_value.total_cmp(&b.final_value));
    let sorted_final_values: Vec<f64> = trials.iter().map(|t| t.final_value).collect();

    let percentile10 = percentile_value(&sorted_final_values, 0.10);
    let percentile50 = percentile_value(&sorted_final_values, 0.50);
    let percentile90 = percentile_value(&sorted_final_values, 0.90);

    let (median_path, band_low_path, band_high_path) = percentile_paths(&all_paths);

    AggregateResults {
        trials,
        success_rate,
        sorted_final_values,
        percentile10,
        percentile50,
        percentile90,
        all_paths,
        median_path,
        band_low_path,
        band_high_path,
    }
}

/// Index-truncation percentile over an ascending slice: `floor(p * n)`.
fn percentile_value(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = ((p * sorted.len() as f64).floor() as usize).min(sorted.len() - 1);
    sorted[idx]
}

/// Per-year envelope over all trial paths: for each year index the values
/// across trials are sorted and the median / 10th / 90th entries taken.
/// The result is not any single trial's trajectory.
fn percentile_paths(all_paths: &[Vec<f64>]) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
    let Some(first) = all_paths.first() else {
        return (Vec::new(), Vec::new(), Vec::new());
    };

    let path_len = first.len();
    let mut median = Vec::with_capacity(path_len);
    let mut low = Vec::with_capacity(path_len);
    let mut high = Vec::with_capacity(path_len);

    for year in 0..path_len {
        let mut column: Vec<f64> = all_paths.iter().map(|path| path[year]).collect();
        column.sort_by(|a, b| a.total_cmp(b));
        median.push(percentile_value(&column, 0.50));
        low.push(percentile_value(&column, 0.10));
        high.push(percentile_value(&column, 0.90));
    }

    (median, low, high)
}

/// Summary figures for the median-by-final-value trial. The inflation
/// impact is clamped to 0 unless finite, positive, and below 1e15.
pub fn headline_stats(
    results: &AggregateResults,
    inputs: &SimulationInputs,
) -> Option<HeadlineStats> {
    if results.trials.is_empty() || inputs.retirement_years == 0 {
        return None;
    }

    let median = &results.trials[results.trials.len() / 2];
    let initial = inputs.portfolio_value;

    let annual_withdrawal = median.total_withdrawn / inputs.retirement_years as f64;
    let portfolio_growth_pct = if initial > 0.0 {
        (median.final_value + median.total_withdrawn - initial) / initial * 100.0
    } else {
        0.0
    };

    let inflation_multiplier = (1.0 + inputs.inflation_rate).powi(inputs.retirement_years as i32);
    let raw_inflation_impact = (inflation_multiplier - 1.0) * inputs.annual_expenses;
    let inflation_impact = if raw_inflation_impact.is_finite()
        && raw_inflation_impact > 0.0
        && raw_inflation_impact < 1e15
    {
        raw_inflation_impact
    } else {
        0.0
    };

    Some(HeadlineStats {
        final_net_worth: median.final_value,
        annual_withdrawal,
        total_withdrawn: median.total_withdrawn,
        portfolio_growth_pct,
        inflation_impact,
        years_sustained: median.years_lasted,
    })
}

fn derive_seed(base_seed: u64, trial_id: u32) -> u64 {
    splitmix64(base_seed ^ ((trial_id as u64) << 32) ^ trial_id as u64)
}

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E3779B97F4A7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

struct Rng {
    state: u64,
}

impl Rng {
    fn new(seed: u64) -> Self {
        let state = if seed == 0 {
            0xA5A5_A5A5_A5A5_A5A5
        } else {
            seed
        };
        Self { state }
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545F4914F6CDD1D)
    }

    /// Uniform sample strictly inside (0, 1); the +0.5 offset keeps 0 out
    /// of range so `ln(u1)` below is always defined.
    fn next_f64(&mut self) -> f64 {
        const DENOM: f64 = (1_u64 << 53) as f64;
        let v = self.next_u64() >> 11;
        ((v as f64) + 0.5) / DENOM
    }

    /// Box-Muller, cosine branch. Two fresh uniform draws per sample; the
    /// sine counterpart is discarded rather than cached so consecutive
    /// samples never share a draw.
    fn standard_normal(&mut self) -> f64 {
        let u1 = self.next_f64();
        let u2 = self.next_f64();
        (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::EventKind;
    use proptest::prelude::{prop_assert, proptest};

    const EPS: f64 = 1e-9;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= 1e-6,
            "expected {expected}, got {actual}"
        );
    }

    fn base_inputs() -> SimulationInputs {
        SimulationInputs {
            portfolio_value: 1_000_000.0,
            annual_expenses: 60_000.0,
            retirement_years: 30,
            withdrawal_rate: 0.04,
            market_return: 0.07,
            inflation_rate: 0.025,
            num_simulations: 1_000,
            seed: 42,
        }
    }

    fn recurring_event(name: &str, amount: f64, start: u32, end: u32) -> CashflowEvent {
        CashflowEvent {
            name: name.to_string(),
            amount,
            kind: EventKind::Recurring,
            start_year: start,
            end_year: end,
            inflation_adjusted: false,
        }
    }

    fn flat_trial(final_value: f64, success: bool) -> TrialResult {
        TrialResult {
            success,
            final_value,
            path: vec![final_value.max(1.0), final_value],
            total_withdrawn: 0.0,
            total_income: 0.0,
            years_lasted: 1,
        }
    }

    #[test]
    fn zero_growth_zero_inflation_withdraws_flat_expenses() {
        let mut inputs = base_inputs();
        inputs.retirement_years = 10;
        inputs.inflation_rate = 0.0;

        let zeros = vec![0.0; 10];
        let mut returns = FixedReturns::new(&zeros);
        let trial = simulate_trial(&inputs, &[], &[], &mut returns);

        assert!(trial.success);
        assert_eq!(trial.path.len(), 11);
        for (year, value) in trial.path.iter().enumerate() {
            assert_approx(*value, 1_000_000.0 - year as f64 * 60_000.0);
        }
        assert_approx(trial.final_value, 400_000.0);
        assert_approx(trial.total_withdrawn, 600_000.0);
        assert_approx(trial.total_income, 0.0);
        assert_eq!(trial.years_lasted, 10);
    }

    #[test]
    fn fixed_return_sequence_is_deterministic() {
        let mut inputs = base_inputs();
        inputs.retirement_years = 12;

        let sequence = vec![
            0.08, -0.12, 0.03, 0.15, -0.02, 0.07, 0.0, 0.11, -0.25, 0.19, 0.04, 0.06,
        ];
        let first = simulate_trial(&inputs, &[], &[], &mut FixedReturns::new(&sequence));
        let second = simulate_trial(&inputs, &[], &[], &mut FixedReturns::new(&sequence));

        assert_eq!(first.final_value, second.final_value);
        assert_eq!(first.total_withdrawn, second.total_withdrawn);
        assert_eq!(first.path, second.path);
    }

    #[test]
    fn same_seed_sampler_replays_identical_returns() {
        let params = MarketParams::with_mean(0.07);
        let mut a = MarketSampler::new(params, 1234);
        let mut b = MarketSampler::new(params, 1234);
        for _ in 0..100 {
            assert_eq!(a.annual_return(), b.annual_return());
        }
    }

    #[test]
    fn sampled_returns_stay_within_caps() {
        let params = MarketParams::with_mean(0.07);
        let mut sampler = MarketSampler::new(params, 7);
        for _ in 0..10_000 {
            let r = sampler.annual_return();
            assert!(r >= params.min_return - EPS && r <= params.max_return + EPS);
        }
    }

    #[test]
    fn depletion_is_sticky_and_growth_cannot_revive_a_dead_portfolio() {
        let mut inputs = base_inputs();
        inputs.portfolio_value = 10.0;
        inputs.annual_expenses = 20.0;
        inputs.retirement_years = 4;
        inputs.inflation_rate = 0.0;

        // 50% growth every year; the portfolio still dies in year 1 and a
        // zero balance times any return stays zero thereafter.
        let boom = vec![0.5; 4];
        let trial = simulate_trial(&inputs, &[], &[], &mut FixedReturns::new(&boom));

        assert!(!trial.success);
        assert_approx(trial.path[0], 10.0);
        for value in &trial.path[1..] {
            assert_approx(*value, 0.0);
        }
        assert_approx(trial.final_value, 0.0);
        assert_eq!(trial.years_lasted, 1);
    }

    #[test]
    fn income_events_offset_withdrawals_but_never_add_to_portfolio() {
        let mut inputs = base_inputs();
        inputs.portfolio_value = 100.0;
        inputs.annual_expenses = 10.0;
        inputs.retirement_years = 5;
        inputs.inflation_rate = 0.0;

        let income = vec![recurring_event("Rental income", 50.0, 1, 5)];
        let zeros = vec![0.0; 5];
        let trial = simulate_trial(&inputs, &income, &[], &mut FixedReturns::new(&zeros));

        // Income exceeds expenses every year: net withdrawal floors at 0
        // and the surplus is not reinvested.
        assert_approx(trial.final_value, 100.0);
        assert_approx(trial.total_withdrawn, 0.0);
        assert_approx(trial.total_income, 250.0);
        assert!(trial.success);
    }

    #[test]
    fn expense_events_add_to_the_yearly_withdrawal() {
        let mut inputs = base_inputs();
        inputs.portfolio_value = 1_000.0;
        inputs.annual_expenses = 0.0;
        inputs.retirement_years = 3;
        inputs.inflation_rate = 0.0;

        let expenses = vec![recurring_event("Travel", 100.0, 1, 3)];
        let zeros = vec![0.0; 3];
        let trial = simulate_trial(&inputs, &[], &expenses, &mut FixedReturns::new(&zeros));

        assert_approx(trial.final_value, 700.0);
        assert_approx(trial.total_withdrawn, 300.0);
    }

    #[test]
    fn one_time_event_applies_only_in_its_start_year() {
        let mut inputs = base_inputs();
        inputs.portfolio_value = 1_000.0;
        inputs.annual_expenses = 0.0;
        inputs.retirement_years = 4;
        inputs.inflation_rate = 0.0;

        let windfall_spend = vec![CashflowEvent {
            name: "New roof".to_string(),
            amount: 250.0,
            kind: EventKind::OneTime,
            start_year: 2,
            end_year: 2,
            inflation_adjusted: false,
        }];
        let zeros = vec![0.0; 4];
        let trial = simulate_trial(&inputs, &[], &windfall_spend, &mut FixedReturns::new(&zeros));

        assert_approx(trial.path[1], 1_000.0);
        assert_approx(trial.path[2], 750.0);
        assert_approx(trial.path[3], 750.0);
        assert_approx(trial.final_value, 750.0);
    }

    #[test]
    fn inflation_adjusted_events_compound_from_year_one() {
        let event = CashflowEvent {
            name: "Pension".to_string(),
            amount: 100.0,
            kind: EventKind::Recurring,
            start_year: 1,
            end_year: 3,
            inflation_adjusted: true,
        };

        assert_approx(event.amount_in(1, 0.10), 100.0);
        assert_approx(event.amount_in(2, 0.10), 110.0);
        assert_approx(event.amount_in(3, 0.10), 121.0);
        assert_approx(event.amount_in(4, 0.10), 0.0);
    }

    #[test]
    fn base_expenses_compound_rather_than_recompute() {
        let mut inputs = base_inputs();
        inputs.portfolio_value = 1_000_000.0;
        inputs.annual_expenses = 100.0;
        inputs.retirement_years = 3;
        inputs.inflation_rate = 0.10;

        let zeros = vec![0.0; 3];
        let trial = simulate_trial(&inputs, &[], &[], &mut FixedReturns::new(&zeros));

        // Withdrawals: 110, 121, 133.1. The running expense figure keeps
        // its compounded state across years.
        assert_approx(trial.total_withdrawn, 110.0 + 121.0 + 133.1);
    }

    #[test]
    fn aggregate_percentiles_use_index_truncation() {
        let trials: Vec<TrialResult> = (0..1000).map(|i| flat_trial(i as f64, true)).collect();
        let results = aggregate(trials);

        assert_approx(results.percentile10, 100.0);
        assert_approx(results.percentile50, 500.0);
        assert_approx(results.percentile90, 900.0);
        assert_approx(results.success_rate, 100.0);
        assert_eq!(results.sorted_final_values.len(), 1000);
    }

    #[test]
    fn aggregate_sorts_trials_by_final_value_and_keeps_path_order() {
        let trials = vec![
            flat_trial(300.0, true),
            flat_trial(100.0, true),
            flat_trial(200.0, true),
        ];
        let results = aggregate(trials);

        let finals: Vec<f64> = results.trials.iter().map(|t| t.final_value).collect();
        assert_eq!(finals, vec![100.0, 200.0, 300.0]);
        // all_paths keeps submission order.
        assert_approx(results.all_paths[0][1], 300.0);
        assert_approx(results.all_paths[1][1], 100.0);
        assert_approx(results.all_paths[2][1], 200.0);
    }

    #[test]
    fn envelope_paths_are_per_year_columns_not_single_trials() {
        let trials = vec![
            TrialResult {
                success: true,
                final_value: 30.0,
                path: vec![10.0, 0.0, 30.0],
                total_withdrawn: 0.0,
                total_income: 0.0,
                years_lasted: 2,
            },
            TrialResult {
                success: true,
                final_value: 10.0,
                path: vec![10.0, 20.0, 10.0],
                total_withdrawn: 0.0,
                total_income: 0.0,
                years_lasted: 2,
            },
            TrialResult {
                success: true,
                final_value: 20.0,
                path: vec![10.0, 40.0, 20.0],
                total_withdrawn: 0.0,
                total_income: 0.0,
                years_lasted: 2,
            },
        ];
        let results = aggregate(trials);

        // n = 3: low index floor(0.3) = 0, median floor(1.5) = 1, high
        // floor(2.7) = 2 over each sorted year column.
        assert_eq!(results.band_low_path, vec![10.0, 0.0, 10.0]);
        assert_eq!(results.median_path, vec![10.0, 20.0, 20.0]);
        assert_eq!(results.band_high_path, vec![10.0, 40.0, 30.0]);
    }

    #[test]
    fn percentiles_are_monotonic_for_mixed_outcomes() {
        let finals = [0.0, 0.0, 12.5, 3.0, 990.0, 55.0, 7.0, 0.0, 120.0, 44.0];
        let trials: Vec<TrialResult> = finals
            .iter()
            .map(|v| flat_trial(*v, *v > 0.0))
            .collect();
        let results = aggregate(trials);

        assert!(results.percentile10 <= results.percentile50);
        assert!(results.percentile50 <= results.percentile90);
        assert_approx(results.success_rate, 70.0);
    }

    #[test]
    fn headline_stats_describe_the_median_trial() {
        let mut inputs = base_inputs();
        inputs.portfolio_value = 1_000.0;
        inputs.annual_expenses = 100.0;
        inputs.retirement_years = 2;
        inputs.inflation_rate = 0.0;

        let zeros = vec![0.0; 2];
        let trials: Vec<TrialResult> = (0..3)
            .map(|_| simulate_trial(&inputs, &[], &[], &mut FixedReturns::new(&zeros)))
            .collect();
        let results = aggregate(trials);
        let stats = headline_stats(&results, &inputs).expect("stats for non-empty run");

        assert_approx(stats.final_net_worth, 800.0);
        assert_approx(stats.annual_withdrawal, 100.0);
        assert_approx(stats.total_withdrawn, 200.0);
        assert_approx(stats.portfolio_growth_pct, 0.0);
        assert_approx(stats.inflation_impact, 0.0);
        assert_eq!(stats.years_sustained, 2);
    }

    #[test]
    fn non_finite_inflation_impact_clamps_to_zero() {
        let mut inputs = base_inputs();
        inputs.inflation_rate = 1.0e12;
        inputs.retirement_years = 30;

        let trials = vec![flat_trial(10.0, true)];
        let results = aggregate(trials);
        let stats = headline_stats(&results, &inputs).expect("stats");

        assert_approx(stats.inflation_impact, 0.0);
    }

    #[tokio::test]
    async fn driver_runs_exactly_n_trials_and_reports_progress() {
        let mut inputs = base_inputs();
        inputs.num_simulations = 250;
        inputs.retirement_years = 15;

        let cancel = CancellationToken::new();
        let mut progress = Vec::new();
        let results = run_monte_carlo(&inputs, &[], &[], &cancel, |p| progress.push(p))
            .await
            .expect("run completes");

        assert_eq!(results.trials.len(), 250);
        assert_eq!(results.all_paths.len(), 250);
        assert!(results.success_rate >= 0.0 && results.success_rate <= 100.0);
        assert_eq!(
            progress,
            vec![
                RunProgress {
                    completed: 100,
                    total: 250
                },
                RunProgress {
                    completed: 200,
                    total: 250
                },
                RunProgress {
                    completed: 250,
                    total: 250
                },
            ]
        );
    }

    #[tokio::test]
    async fn driver_output_matches_a_sequential_loop() {
        let mut inputs = base_inputs();
        inputs.num_simulations = 230;
        inputs.retirement_years = 10;

        let cancel = CancellationToken::new();
        let driven = run_monte_carlo(&inputs, &[], &[], &cancel, |_| {})
            .await
            .expect("run completes");

        let params = MarketParams::with_mean(inputs.market_return);
        let manual: Vec<TrialResult> = (0..inputs.num_simulations)
            .map(|trial_id| {
                let mut sampler = MarketSampler::new(params, derive_seed(inputs.seed, trial_id));
                simulate_trial(&inputs, &[], &[], &mut sampler)
            })
            .collect();
        let expected = aggregate(manual);

        assert_eq!(driven.success_rate, expected.success_rate);
        assert_eq!(driven.sorted_final_values, expected.sorted_final_values);
        assert_eq!(driven.median_path, expected.median_path);
        assert_eq!(driven.band_low_path, expected.band_low_path);
        assert_eq!(driven.band_high_path, expected.band_high_path);
    }

    #[tokio::test]
    async fn rerunning_with_the_same_seed_is_reproducible() {
        let mut inputs = base_inputs();
        inputs.num_simulations = 120;
        inputs.retirement_years = 20;

        let cancel = CancellationToken::new();
        let first = run_monte_carlo(&inputs, &[], &[], &cancel, |_| {})
            .await
            .expect("first run");
        let second = run_monte_carlo(&inputs, &[], &[], &cancel, |_| {})
            .await
            .expect("second run");

        assert_eq!(first.sorted_final_values, second.sorted_final_values);
        assert_eq!(first.success_rate, second.success_rate);
    }

    #[tokio::test]
    async fn cancellation_between_batches_discards_the_run() {
        let mut inputs = base_inputs();
        inputs.num_simulations = 500;
        inputs.retirement_years = 10;

        let cancel = CancellationToken::new();
        let cancel_after_first = cancel.clone();
        let mut batches_seen = 0;
        let outcome = run_monte_carlo(&inputs, &[], &[], &cancel, |_| {
            batches_seen += 1;
            cancel_after_first.cancel();
        })
        .await;

        assert!(matches!(outcome, Err(SimulationError::Cancelled)));
        assert_eq!(batches_seen, 1);
    }

    #[tokio::test]
    async fn pre_cancelled_token_aborts_before_any_trial() {
        let inputs = base_inputs();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let mut batches_seen = 0;
        let outcome = run_monte_carlo(&inputs, &[], &[], &cancel, |_| batches_seen += 1).await;

        assert!(matches!(outcome, Err(SimulationError::Cancelled)));
        assert_eq!(batches_seen, 0);
    }

    #[tokio::test]
    async fn zero_trials_is_a_run_failure_not_a_result() {
        let mut inputs = base_inputs();
        inputs.num_simulations = 0;

        let cancel = CancellationToken::new();
        let outcome = run_monte_carlo(&inputs, &[], &[], &cancel, |_| {}).await;
        assert!(matches!(outcome, Err(SimulationError::InvalidInputs(_))));
    }

    #[tokio::test]
    async fn example_scenario_produces_well_formed_aggregates() {
        let inputs = base_inputs();
        let cancel = CancellationToken::new();
        let results = run_monte_carlo(&inputs, &[], &[], &cancel, |_| {})
            .await
            .expect("run completes");

        assert_eq!(results.trials.len(), 1_000);
        assert!(results.success_rate > 0.0 && results.success_rate <= 100.0);
        assert!(results.percentile10 >= 0.0);
        assert!(results.percentile10 <= results.percentile50);
        assert!(results.percentile50 <= results.percentile90);
        assert!(results.percentile90 > 0.0);
        for trial in &results.trials {
            assert_eq!(trial.path.len(), 31);
        }
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(48))]

        #[test]
        fn prop_trial_invariants_hold(
            seed in 0u64..u64::MAX,
            portfolio in 1u32..5_000_000,
            expenses in 0u32..200_000,
            years in 1u32..50,
            mean_bp in -1000i32..1500,
            inflation_bp in 0u32..900
        ) {
            let inputs = SimulationInputs {
                portfolio_value: portfolio as f64,
                annual_expenses: expenses as f64,
                retirement_years: years,
                withdrawal_rate: 0.04,
                market_return: mean_bp as f64 / 10_000.0,
                inflation_rate: inflation_bp as f64 / 10_000.0,
                num_simulations: 1,
                seed,
            };

            let params = MarketParams::with_mean(inputs.market_return);
            let mut sampler = MarketSampler::new(params, seed);
            let trial = simulate_trial(&inputs, &[], &[], &mut sampler);

            prop_assert!(trial.path.len() as u32 == years + 1);
            prop_assert!(trial.path.iter().all(|v| *v >= 0.0 && v.is_finite()));
            prop_assert!(trial.years_lasted <= years);
            prop_assert!(trial.final_value >= 0.0);
            prop_assert!(trial.total_withdrawn >= 0.0);
            prop_assert!(trial.success == (trial.final_value > 0.0));
        }

        #[test]
        fn prop_aggregate_percentiles_are_ordered(
            finals in proptest::collection::vec(0.0f64..5_000_000.0, 1..300)
        ) {
            let trials: Vec<TrialResult> = finals
                .iter()
                .map(|v| flat_trial(*v, *v > 0.0))
                .collect();
            let results = aggregate(trials);

            prop_assert!(results.percentile10 <= results.percentile50);
            prop_assert!(results.percentile50 <= results.percentile90);
            prop_assert!(results.success_rate >= 0.0 && results.success_rate <= 100.0);
        }
    }
}
