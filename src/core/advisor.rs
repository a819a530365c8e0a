use super::types::{
    AggregateResults, CashflowEvent, Priority, Recommendation, SimulationInputs,
};

pub const MAX_RECOMMENDATIONS: usize = 8;

const SAFE_WITHDRAWAL_RATE: f64 = 0.035;
const FOUR_PERCENT_RULE: f64 = 0.04;

/// Derives a ranked list of findings from a simulation outcome. Pure: the
/// same results, inputs, and events always produce the same list. With no
/// results yet, a fixed bootstrap list is returned instead of evaluating
/// the outcome-dependent rules.
pub fn recommend(
    results: Option<&AggregateResults>,
    inputs: &SimulationInputs,
    income_events: &[CashflowEvent],
) -> Vec<Recommendation> {
    let mut items = match results {
        None => bootstrap_recommendations(inputs, income_events),
        Some(results) => {
            // Independent checks; none observes another's output. Each
            // appends at most one item.
            let checks = [
                success_rate_check(results, inputs),
                withdrawal_rate_check(inputs),
                portfolio_target_check(inputs),
                income_coverage_check(results, inputs, income_events),
                assumption_check(inputs),
                downside_risk_check(results, inputs),
                horizon_check(inputs),
            ];
            checks.into_iter().flatten().collect()
        }
    };

    // Stable sort: ties keep rule-evaluation order.
    items.sort_by(|a, b| b.priority.rank().cmp(&a.priority.rank()));
    items.truncate(MAX_RECOMMENDATIONS);
    items
}

fn bootstrap_recommendations(
    inputs: &SimulationInputs,
    income_events: &[CashflowEvent],
) -> Vec<Recommendation> {
    let mut items = vec![Recommendation {
        title: "Run your first simulation".to_string(),
        description: "No simulation results yet. The plan below is based on your \
                      inputs alone; a Monte Carlo run tests it against thousands \
                      of market sequences."
            .to_string(),
        action: "Run the simulation to see your plan's probability of success."
            .to_string(),
        priority: Priority::High,
        category: "getting-started".to_string(),
        impact: "Turns assumptions into tested outcomes.".to_string(),
    }];

    if inputs.withdrawal_rate > 0.045 {
        items.push(Recommendation {
            title: "Withdrawal rate looks aggressive".to_string(),
            description: format!(
                "A {:.1}% withdrawal rate is above the range most plans sustain \
                 over a long retirement.",
                inputs.withdrawal_rate * 100.0
            ),
            action: "Consider planning around a 4% withdrawal rate before running \
                     the simulation."
                .to_string(),
            priority: Priority::High,
            category: "withdrawal".to_string(),
            impact: "Lower withdrawal rates materially improve survival odds."
                .to_string(),
        });
    }

    if income_events.is_empty() {
        items.push(Recommendation {
            title: "No retirement income sources listed".to_string(),
            description: "The plan assumes every dollar of spending comes from the \
                          portfolio. Pensions, Social Security, rental or part-time \
                          income all reduce what the portfolio must cover."
                .to_string(),
            action: "Add expected income events so the simulation reflects your \
                     real cash flow."
                .to_string(),
            priority: Priority::Medium,
            category: "income".to_string(),
            impact: "Even partial income coverage can add years of portfolio life."
                .to_string(),
        });
    }

    items
}

fn success_rate_check(
    results: &AggregateResults,
    inputs: &SimulationInputs,
) -> Option<Recommendation> {
    let rate = results.success_rate;

    if rate < 60.0 {
        let effective_rate = if inputs.portfolio_value > 0.0 {
            inputs.annual_expenses / inputs.portfolio_value
        } else {
            0.0
        };
        let reduction_pct = if effective_rate > 0.0 {
            (((effective_rate - SAFE_WITHDRAWAL_RATE) / effective_rate) * 100.0)
                .round()
                .max(0.0)
        } else {
            0.0
        };
        return Some(Recommendation {
            title: "High risk of running out of money".to_string(),
            description: format!(
                "Only {rate:.0}% of simulated retirements stayed funded for the \
                 full {} years.",
                inputs.retirement_years
            ),
            action: format!(
                "Reduce annual spending by roughly {reduction_pct:.0}% (toward a \
                 3.5% effective withdrawal rate), increase the starting portfolio, \
                 or shorten the plan."
            ),
            priority: Priority::Critical,
            category: "success-rate".to_string(),
            impact: "The single biggest lever on whether this plan works at all."
                .to_string(),
        });
    }

    if rate < 75.0 {
        return Some(Recommendation {
            title: "Success rate is below a comfortable margin".to_string(),
            description: format!(
                "{rate:.0}% of simulations succeed; most planners target 75% or \
                 better before relying on a plan."
            ),
            action: "Trim expenses, delay the start of withdrawals, or add income \
                     sources to lift the success rate."
                .to_string(),
            priority: Priority::High,
            category: "success-rate".to_string(),
            impact: "Moves the plan out of coin-flip territory.".to_string(),
        });
    }

    if rate < 90.0 {
        return Some(Recommendation {
            title: "Plan for sequence-of-returns risk".to_string(),
            description: format!(
                "{rate:.0}% of simulations succeed. The failures cluster around \
                 poor markets in the first retirement years."
            ),
            action: "Hold one to two years of spending in cash or have a fallback \
                     budget for early bear markets."
                .to_string(),
            priority: Priority::Medium,
            category: "risk".to_string(),
            impact: "Protects the plan in the decile of outcomes where it fails."
                .to_string(),
        });
    }

    None
}

fn withdrawal_rate_check(inputs: &SimulationInputs) -> Option<Recommendation> {
    let rate = inputs.withdrawal_rate;
    let annual_gap = (rate - FOUR_PERCENT_RULE) * inputs.portfolio_value;

    if rate > 0.05 {
        return Some(Recommendation {
            title: "Withdrawal rate exceeds 5%".to_string(),
            description: format!(
                "A {:.1}% withdrawal rate is well above the 4% rule and rarely \
                 survives a multi-decade retirement.",
                rate * 100.0
            ),
            action: format!(
                "Target the 4% rule: that means reducing planned withdrawals by \
                 about {} per year.",
                format_dollars(annual_gap)
            ),
            priority: Priority::High,
            category: "withdrawal".to_string(),
            impact: "Historically the difference between plans that last and plans \
                     that don't."
                .to_string(),
        });
    }

    if rate > 0.045 {
        return Some(Recommendation {
            title: "Withdrawal rate is slightly elevated".to_string(),
            description: format!(
                "{:.1}% sits above the classic 4% guideline.",
                rate * 100.0
            ),
            action: format!(
                "Trimming toward 4% would lower annual withdrawals by about {}.",
                format_dollars(annual_gap)
            ),
            priority: Priority::Medium,
            category: "withdrawal".to_string(),
            impact: "A modest cut buys a meaningful safety margin.".to_string(),
        });
    }

    None
}

fn portfolio_target_check(inputs: &SimulationInputs) -> Option<Recommendation> {
    if inputs.withdrawal_rate <= 0.0 || inputs.annual_expenses <= 0.0 {
        return None;
    }

    let target = inputs.annual_expenses / inputs.withdrawal_rate;
    let ratio = inputs.portfolio_value / target;
    if ratio >= 1.0 {
        return None;
    }

    let multiple = (1.0 / inputs.withdrawal_rate).round();
    let shortfall = target - inputs.portfolio_value;
    let priority = if ratio < 0.8 {
        Priority::High
    } else {
        Priority::Medium
    };

    Some(Recommendation {
        title: "Portfolio is below its target multiple".to_string(),
        description: format!(
            "At a {:.1}% withdrawal rate the target is {multiple:.0}x annual \
             expenses ({}); the current portfolio covers {:.0}% of that.",
            inputs.withdrawal_rate * 100.0,
            format_dollars(target),
            ratio * 100.0
        ),
        action: format!(
            "Close the {} gap before retiring, or plan for lower spending.",
            format_dollars(shortfall)
        ),
        priority,
        category: "portfolio".to_string(),
        impact: "Starting below target compounds every other risk in the plan."
            .to_string(),
    })
}

fn income_coverage_check(
    results: &AggregateResults,
    inputs: &SimulationInputs,
    income_events: &[CashflowEvent],
) -> Option<Recommendation> {
    if inputs.annual_expenses <= 0.0 || inputs.retirement_years == 0 {
        return None;
    }

    let total_income: f64 = (1..=inputs.retirement_years)
        .map(|year| {
            income_events
                .iter()
                .map(|e| e.amount_in(year, inputs.inflation_rate))
                .sum::<f64>()
        })
        .sum();
    let coverage = total_income / inputs.retirement_years as f64 / inputs.annual_expenses;

    if coverage < 0.30 && results.success_rate < 75.0 {
        return Some(Recommendation {
            title: "Income covers too little of your spending".to_string(),
            description: format!(
                "Income events cover about {:.0}% of annual expenses on average, \
                 leaving the portfolio to fund the rest in a plan that succeeds \
                 {:.0}% of the time.",
                coverage * 100.0,
                results.success_rate
            ),
            action: "Raise income coverage toward 40-50% of expenses: part-time \
                     work, rental income, or delaying to a larger pension all \
                     qualify."
                .to_string(),
            priority: Priority::High,
            category: "income".to_string(),
            impact: "Recurring income directly reduces withdrawals in the worst \
                     market years."
                .to_string(),
        });
    }

    None
}

fn assumption_check(inputs: &SimulationInputs) -> Option<Recommendation> {
    if inputs.market_return > 0.10 {
        return Some(Recommendation {
            title: "Return assumption is optimistic".to_string(),
            description: format!(
                "A {:.1}% average annual return is above the roughly 7% long-run \
                 historical average for a diversified portfolio.",
                inputs.market_return * 100.0
            ),
            action: "Re-run with a 7% return to see whether the plan still holds."
                .to_string(),
            priority: Priority::Medium,
            category: "assumptions".to_string(),
            impact: "Plans built on above-market returns fail quietly.".to_string(),
        });
    }

    if inputs.inflation_rate < 0.015 {
        return Some(Recommendation {
            title: "Inflation assumption may be understated".to_string(),
            description: format!(
                "{:.1}% is below the roughly 2.5% long-run average; expenses \
                 compound against the plan every year.",
                inputs.inflation_rate * 100.0
            ),
            action: "Test the plan at 2.5% inflation.".to_string(),
            priority: Priority::Low,
            category: "assumptions".to_string(),
            impact: "Understated inflation overstates late-retirement spending \
                     power."
                .to_string(),
        });
    }

    None
}

fn downside_risk_check(
    results: &AggregateResults,
    inputs: &SimulationInputs,
) -> Option<Recommendation> {
    if results.percentile10 > 0.0 {
        return None;
    }

    Some(Recommendation {
        title: "Worst-decile outcomes run out of money".to_string(),
        description: format!(
            "In the bottom 10% of market sequences the portfolio is fully \
             depleted before year {}.",
            inputs.retirement_years
        ),
        action: "Build a cash buffer or a spending floor you can drop to when \
                 markets fall early in retirement."
            .to_string(),
        priority: Priority::High,
        category: "risk".to_string(),
        impact: "Addresses the scenarios behind most real-world plan failures."
            .to_string(),
    })
}

fn horizon_check(inputs: &SimulationInputs) -> Option<Recommendation> {
    let years = inputs.retirement_years;

    if years > 40 {
        return Some(Recommendation {
            title: "Very long retirement horizon".to_string(),
            description: format!(
                "A {years}-year horizon leaves decades of inflation and market \
                 risk between you and the end of the plan."
            ),
            action: "Consider income that lasts for life (annuities, pensions) or \
                     part-time work in the early years."
                .to_string(),
            priority: Priority::Medium,
            category: "horizon".to_string(),
            impact: "Long horizons amplify small annual shortfalls into large \
                     terminal ones."
                .to_string(),
        });
    }

    if years < 15 {
        return Some(Recommendation {
            title: "Short planning horizon".to_string(),
            description: format!(
                "The simulation stops after {years} years; spending needs rarely \
                 do."
            ),
            action: "Extend the horizon to your full life expectancy to avoid \
                     planning a cliff."
                .to_string(),
            priority: Priority::Low,
            category: "horizon".to_string(),
            impact: "Prevents a plan that only looks safe because it ends early."
                .to_string(),
        });
    }

    None
}

fn format_dollars(amount: f64) -> String {
    let rounded = amount.abs().round() as u64;
    let digits = rounded.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if amount < 0.0 {
        format!("-${grouped}")
    } else {
        format!("${grouped}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::EventKind;

    fn base_inputs() -> SimulationInputs {
        SimulationInputs {
            portfolio_value: 1_500_000.0,
            annual_expenses: 60_000.0,
            retirement_years: 30,
            withdrawal_rate: 0.04,
            market_return: 0.07,
            inflation_rate: 0.025,
            num_simulations: 1_000,
            seed: 42,
        }
    }

    fn fake_results(success_rate: f64, percentile10: f64) -> AggregateResults {
        AggregateResults {
            trials: Vec::new(),
            success_rate,
            sorted_final_values: Vec::new(),
            percentile10,
            percentile50: percentile10 + 100_000.0,
            percentile90: percentile10 + 500_000.0,
            all_paths: Vec::new(),
            median_path: Vec::new(),
            band_low_path: Vec::new(),
            band_high_path: Vec::new(),
        }
    }

    fn pension(amount: f64) -> CashflowEvent {
        CashflowEvent {
            name: "Pension".to_string(),
            amount,
            kind: EventKind::Recurring,
            start_year: 1,
            end_year: 30,
            inflation_adjusted: false,
        }
    }

    #[test]
    fn bootstrap_list_prompts_for_a_run_first() {
        let inputs = base_inputs();
        let items = recommend(None, &inputs, &[]);

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].category, "getting-started");
        assert_eq!(items[0].priority, Priority::High);
        assert_eq!(items[1].category, "income");
        assert_eq!(items[1].priority, Priority::Medium);
    }

    #[test]
    fn bootstrap_flags_aggressive_withdrawal_rate() {
        let mut inputs = base_inputs();
        inputs.withdrawal_rate = 0.05;
        let items = recommend(None, &inputs, &[]);

        assert_eq!(items.len(), 3);
        assert!(items.iter().any(|r| r.category == "withdrawal"));
    }

    #[test]
    fn bootstrap_skips_income_flag_when_events_exist() {
        let inputs = base_inputs();
        let events = vec![pension(20_000.0)];
        let items = recommend(None, &inputs, &events);

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].category, "getting-started");
    }

    #[test]
    fn low_success_rate_is_critical_and_ranked_first() {
        let inputs = base_inputs();
        let results = fake_results(45.0, 0.0);
        let items = recommend(Some(&results), &inputs, &[]);

        assert_eq!(items[0].priority, Priority::Critical);
        assert_eq!(items[0].category, "success-rate");
    }

    #[test]
    fn success_rate_tiers_map_to_priorities() {
        let inputs = base_inputs();

        let critical = success_rate_check(&fake_results(59.9, 1.0), &inputs).unwrap();
        assert_eq!(critical.priority, Priority::Critical);

        let high = success_rate_check(&fake_results(70.0, 1.0), &inputs).unwrap();
        assert_eq!(high.priority, Priority::High);

        let medium = success_rate_check(&fake_results(85.0, 1.0), &inputs).unwrap();
        assert_eq!(medium.priority, Priority::Medium);

        assert!(success_rate_check(&fake_results(92.0, 1.0), &inputs).is_none());
    }

    #[test]
    fn withdrawal_above_five_percent_targets_the_four_percent_rule() {
        let mut inputs = base_inputs();
        inputs.withdrawal_rate = 0.06;
        inputs.portfolio_value = 1_000_000.0;

        let item = withdrawal_rate_check(&inputs).unwrap();
        assert_eq!(item.priority, Priority::High);
        // (6% - 4%) of $1,000,000.
        assert!(item.action.contains("$20,000"));
    }

    #[test]
    fn withdrawal_between_bounds_is_medium() {
        let mut inputs = base_inputs();
        inputs.withdrawal_rate = 0.048;
        let item = withdrawal_rate_check(&inputs).unwrap();
        assert_eq!(item.priority, Priority::Medium);

        inputs.withdrawal_rate = 0.04;
        assert!(withdrawal_rate_check(&inputs).is_none());
    }

    #[test]
    fn portfolio_shortfall_tiers_on_eighty_percent_of_target() {
        let mut inputs = base_inputs();
        inputs.annual_expenses = 60_000.0;
        inputs.withdrawal_rate = 0.04; // target $1.5M

        inputs.portfolio_value = 1_000_000.0; // 66% of target
        let high = portfolio_target_check(&inputs).unwrap();
        assert_eq!(high.priority, Priority::High);

        inputs.portfolio_value = 1_350_000.0; // 90% of target
        let medium = portfolio_target_check(&inputs).unwrap();
        assert_eq!(medium.priority, Priority::Medium);

        inputs.portfolio_value = 1_500_000.0;
        assert!(portfolio_target_check(&inputs).is_none());
    }

    #[test]
    fn income_coverage_rule_needs_both_low_coverage_and_low_success() {
        let inputs = base_inputs();
        let thin = vec![pension(6_000.0)]; // 10% coverage

        let triggered =
            income_coverage_check(&fake_results(70.0, 1.0), &inputs, &thin).unwrap();
        assert_eq!(triggered.priority, Priority::High);
        assert!(triggered.action.contains("40-50%"));

        // Healthy success rate: no item even with thin coverage.
        assert!(income_coverage_check(&fake_results(80.0, 1.0), &inputs, &thin).is_none());

        // Strong coverage: no item even with weak success.
        let strong = vec![pension(30_000.0)]; // 50% coverage
        assert!(income_coverage_check(&fake_results(70.0, 1.0), &inputs, &strong).is_none());
    }

    #[test]
    fn assumption_rule_prefers_the_return_flag() {
        let mut inputs = base_inputs();
        inputs.market_return = 0.12;
        inputs.inflation_rate = 0.01;

        let item = assumption_check(&inputs).unwrap();
        assert_eq!(item.priority, Priority::Medium);
        assert_eq!(item.category, "assumptions");

        inputs.market_return = 0.07;
        let item = assumption_check(&inputs).unwrap();
        assert_eq!(item.priority, Priority::Low);

        inputs.inflation_rate = 0.025;
        assert!(assumption_check(&inputs).is_none());
    }

    #[test]
    fn depleted_tenth_percentile_flags_downside_risk() {
        let inputs = base_inputs();
        assert!(downside_risk_check(&fake_results(80.0, 0.0), &inputs).is_some());
        assert!(downside_risk_check(&fake_results(80.0, 50_000.0), &inputs).is_none());
    }

    #[test]
    fn horizon_rule_flags_both_extremes() {
        let mut inputs = base_inputs();
        inputs.retirement_years = 45;
        assert_eq!(horizon_check(&inputs).unwrap().priority, Priority::Medium);

        inputs.retirement_years = 10;
        assert_eq!(horizon_check(&inputs).unwrap().priority, Priority::Low);

        inputs.retirement_years = 30;
        assert!(horizon_check(&inputs).is_none());
    }

    #[test]
    fn healthy_plan_yields_no_recommendations() {
        let inputs = base_inputs();
        let results = fake_results(95.0, 200_000.0);
        let items = recommend(Some(&results), &inputs, &[pension(20_000.0)]);
        assert!(items.is_empty());
    }

    #[test]
    fn list_is_capped_and_sorted_descending_by_priority() {
        let mut inputs = base_inputs();
        inputs.portfolio_value = 500_000.0;
        inputs.annual_expenses = 60_000.0;
        inputs.withdrawal_rate = 0.06;
        inputs.market_return = 0.12;
        inputs.retirement_years = 45;

        let results = fake_results(40.0, 0.0);
        let items = recommend(Some(&results), &inputs, &[]);

        assert!(items.len() <= MAX_RECOMMENDATIONS);
        assert!(!items.is_empty());
        for pair in items.windows(2) {
            assert!(pair[0].priority.rank() >= pair[1].priority.rank());
        }
        assert_eq!(items[0].priority, Priority::Critical);
    }

    #[test]
    fn ties_keep_rule_evaluation_order() {
        let mut inputs = base_inputs();
        inputs.withdrawal_rate = 0.06;
        inputs.portfolio_value = 500_000.0;

        // Both rules emit High; withdrawal is evaluated before portfolio.
        let results = fake_results(80.0, 50_000.0);
        let items = recommend(Some(&results), &inputs, &[pension(30_000.0)]);

        let highs: Vec<&str> = items
            .iter()
            .filter(|r| r.priority == Priority::High)
            .map(|r| r.category.as_str())
            .collect();
        assert_eq!(highs, vec!["withdrawal", "portfolio"]);
    }

    #[test]
    fn engine_is_idempotent() {
        let mut inputs = base_inputs();
        inputs.withdrawal_rate = 0.055;
        let results = fake_results(65.0, 0.0);
        let events = vec![pension(5_000.0)];

        let first = recommend(Some(&results), &inputs, &events);
        let second = recommend(Some(&results), &inputs, &events);
        assert_eq!(first, second);
    }

    #[test]
    fn dollar_formatting_groups_thousands() {
        assert_eq!(format_dollars(0.0), "$0");
        assert_eq!(format_dollars(999.4), "$999");
        assert_eq!(format_dollars(20_000.0), "$20,000");
        assert_eq!(format_dollars(1_234_567.0), "$1,234,567");
        assert_eq!(format_dollars(-4_500.0), "-$4,500");
    }
}
