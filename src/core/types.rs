use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    #[serde(alias = "oneTime", alias = "one_time")]
    OneTime,
    Recurring,
}

#[derive(Copy, Clone, Debug)]
pub struct MarketParams {
    pub mean_return: f64,
    pub std_dev: f64,
    pub min_return: f64,
    pub max_return: f64,
}

impl MarketParams {
    pub const DEFAULT_STD_DEV: f64 = 0.15;
    pub const MIN_RETURN: f64 = -0.40;
    pub const MAX_RETURN: f64 = 0.40;

    pub fn with_mean(mean_return: f64) -> Self {
        Self {
            mean_return,
            std_dev: Self::DEFAULT_STD_DEV,
            min_return: Self::MIN_RETURN,
            max_return: Self::MAX_RETURN,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SimulationInputs {
    pub portfolio_value: f64,
    pub annual_expenses: f64,
    pub retirement_years: u32,
    pub withdrawal_rate: f64,
    pub market_return: f64,
    pub inflation_rate: f64,
    pub num_simulations: u32,
    pub seed: u64,
}

/// A user-defined cash-flow event applied uniformly to every trial.
/// One-time events carry `end_year == start_year`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CashflowEvent {
    pub name: String,
    pub amount: f64,
    pub kind: EventKind,
    pub start_year: u32,
    pub end_year: u32,
    pub inflation_adjusted: bool,
}

impl CashflowEvent {
    pub fn active_in(&self, year: u32) -> bool {
        self.start_year <= year && year <= self.end_year
    }

    /// Amount contributed in `year`; inflation-adjusted events compound
    /// from year 1.
    pub fn amount_in(&self, year: u32, inflation_rate: f64) -> f64 {
        if !self.active_in(year) {
            return 0.0;
        }
        if self.inflation_adjusted {
            self.amount * (1.0 + inflation_rate).powi(year as i32 - 1)
        } else {
            self.amount
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrialResult {
    pub success: bool,
    pub final_value: f64,
    pub path: Vec<f64>,
    pub total_withdrawn: f64,
    pub total_income: f64,
    pub years_lasted: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateResults {
    pub trials: Vec<TrialResult>,
    pub success_rate: f64,
    pub sorted_final_values: Vec<f64>,
    pub percentile10: f64,
    pub percentile50: f64,
    pub percentile90: f64,
    pub all_paths: Vec<Vec<f64>>,
    pub median_path: Vec<f64>,
    pub band_low_path: Vec<f64>,
    pub band_high_path: Vec<f64>,
}

/// Summary statistics drawn from the median-by-final-value trial.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HeadlineStats {
    pub final_net_worth: f64,
    pub annual_withdrawal: f64,
    pub total_withdrawn: f64,
    pub portfolio_growth_pct: f64,
    pub inflation_impact: f64,
    pub years_sustained: u32,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl Priority {
    pub fn rank(self) -> u8 {
        match self {
            Priority::Critical => 4,
            Priority::High => 3,
            Priority::Medium => 2,
            Priority::Low => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    pub title: String,
    pub description: String,
    pub action: String,
    pub priority: Priority,
    pub category: String,
    pub impact: String,
}
