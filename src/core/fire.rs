use serde::Serialize;

/// Months the iterative years-to-target search will examine.
const MAX_SEARCH_MONTHS: u32 = 50 * 12;

#[derive(Debug, Clone)]
pub struct FireInputs {
    pub current_age: u32,
    pub target_age: u32,
    pub current_savings: f64,
    pub monthly_contribution: f64,
    pub annual_expenses: f64,
    pub expected_return: f64,
    pub withdrawal_rate: f64,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WealthPoint {
    pub year: u32,
    pub wealth: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FireOutlook {
    pub fire_number: f64,
    pub years_to_retirement: u32,
    pub projected_savings: f64,
    pub required_monthly: f64,
    pub progress_pct: f64,
    pub will_reach_fire: bool,
    /// `None` when the target is unreachable within the 50-year search.
    pub years_to_fire: Option<f64>,
    pub projection: Vec<WealthPoint>,
}

pub fn validate(inputs: &FireInputs) -> Vec<String> {
    let mut errors = Vec::new();

    if inputs.current_age >= inputs.target_age {
        errors.push("Target retirement age must be greater than current age".to_string());
    }
    if !(18..=100).contains(&inputs.current_age) {
        errors.push("Current age must be between 18 and 100".to_string());
    }
    if !(25..=100).contains(&inputs.target_age) {
        errors.push("Target retirement age must be between 25 and 100".to_string());
    }
    if !(0.0..=0.20).contains(&inputs.expected_return) {
        errors.push("Expected return must be between 0% and 20%".to_string());
    }
    if !(0.01..=0.10).contains(&inputs.withdrawal_rate) {
        errors.push("Withdrawal rate must be between 1% and 10%".to_string());
    }

    errors
}

pub fn evaluate(inputs: &FireInputs) -> Result<FireOutlook, Vec<String>> {
    let errors = validate(inputs);
    if !errors.is_empty() {
        return Err(errors);
    }

    let fire_number = inputs.annual_expenses / inputs.withdrawal_rate;
    let years_to_retirement = inputs.target_age - inputs.current_age;

    let projected_savings = future_value(
        inputs.current_savings,
        inputs.monthly_contribution,
        inputs.expected_return,
        years_to_retirement,
    );
    let required_monthly = required_monthly_contribution(
        fire_number,
        inputs.current_savings,
        inputs.expected_return,
        years_to_retirement,
    );
    let progress_pct = if fire_number > 0.0 {
        inputs.current_savings / fire_number * 100.0
    } else {
        0.0
    };
    let years_to_fire = years_to_target(
        inputs.current_savings,
        inputs.monthly_contribution,
        fire_number,
        inputs.expected_return,
    );

    let reach_years = years_to_fire.map(|y| y.ceil() as u32).unwrap_or(0);
    let horizon = reach_years.max(years_to_retirement).min(50) + 5;
    let projection = wealth_projection(inputs, horizon);

    Ok(FireOutlook {
        fire_number,
        years_to_retirement,
        projected_savings,
        required_monthly,
        progress_pct,
        will_reach_fire: projected_savings >= fire_number,
        years_to_fire,
        projection,
    })
}

/// Future value of the current balance plus a monthly-contribution
/// annuity, compounded monthly.
pub fn future_value(principal: f64, monthly_contribution: f64, annual_rate: f64, years: u32) -> f64 {
    let fv_principal = principal * (1.0 + annual_rate).powi(years as i32);

    let monthly_rate = annual_rate / 12.0;
    let payments = (years * 12) as f64;
    let fv_annuity = if monthly_rate > 0.0 {
        monthly_contribution * ((1.0 + monthly_rate).powf(payments) - 1.0) / monthly_rate
    } else {
        monthly_contribution * payments
    };

    fv_principal + fv_annuity
}

/// Monthly contribution needed to hit `target` in `years`, assuming the
/// current balance compounds untouched. Zero when already on track.
pub fn required_monthly_contribution(
    target: f64,
    current_savings: f64,
    annual_rate: f64,
    years: u32,
) -> f64 {
    let fv_current = current_savings * (1.0 + annual_rate).powi(years as i32);
    let remaining = target - fv_current;
    if remaining <= 0.0 || years == 0 {
        return 0.0;
    }

    let monthly_rate = annual_rate / 12.0;
    let payments = (years * 12) as f64;
    if monthly_rate > 0.0 {
        remaining * monthly_rate / ((1.0 + monthly_rate).powf(payments) - 1.0)
    } else {
        remaining / payments
    }
}

/// Months to the target at the current contribution pace, in years.
/// `None` when the target is unreachable within the search window.
pub fn years_to_target(
    current_savings: f64,
    monthly_contribution: f64,
    target: f64,
    annual_rate: f64,
) -> Option<f64> {
    if current_savings >= target {
        return Some(0.0);
    }
    if monthly_contribution <= 0.0 {
        return None;
    }

    let monthly_rate = annual_rate / 12.0;
    let mut balance = current_savings;
    let mut months = 0u32;
    while balance < target && months < MAX_SEARCH_MONTHS {
        balance = balance * (1.0 + monthly_rate) + monthly_contribution;
        months += 1;
    }

    if balance >= target {
        Some(months as f64 / 12.0)
    } else {
        None
    }
}

pub fn wealth_projection(inputs: &FireInputs, total_years: u32) -> Vec<WealthPoint> {
    let monthly_rate = inputs.expected_return / 12.0;
    let mut wealth = inputs.current_savings;

    let mut projection = Vec::with_capacity(total_years as usize + 1);
    projection.push(WealthPoint { year: 0, wealth });

    for year in 1..=total_years {
        for _ in 0..12 {
            wealth = wealth * (1.0 + monthly_rate) + inputs.monthly_contribution;
        }
        projection.push(WealthPoint { year, wealth });
    }

    projection
}
