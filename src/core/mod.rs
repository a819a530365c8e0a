mod advisor;
mod engine;
pub mod fire;
pub mod networth;
mod types;

pub use advisor::{MAX_RECOMMENDATIONS, recommend};
pub use engine::{
    BATCH_SIZE, FixedReturns, MarketSampler, ReturnSource, RunProgress, SimulationError,
    aggregate, headline_stats, run_monte_carlo, simulate_trial,
};
pub use types::{
    AggregateResults, CashflowEvent, EventKind, HeadlineStats, MarketParams, Priority,
    Recommendation, SimulationInputs, TrialResult,
};
