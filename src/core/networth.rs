use serde::Serialize;

#[derive(Debug, Clone)]
pub struct NetWorthInputs {
    pub current_net_worth: f64,
    pub annual_income: f64,
    pub annual_savings: f64,
    pub investment_return: f64,
    pub income_growth: f64,
    pub inflation_rate: f64,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetWorthPoint {
    pub year: u32,
    /// Inflation-adjusted value.
    pub net_worth: f64,
    pub nominal_net_worth: f64,
    pub annual_savings: f64,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetWorthSummary {
    pub ten_year_nominal: f64,
    pub annual_savings: f64,
    pub monthly_savings: f64,
    pub savings_rate_pct: Option<f64>,
    pub doubling_years: Option<f64>,
}

/// Year-by-year projection. Savings grow at the income-growth rate;
/// investment returns apply only while net worth is positive (debt does
/// not compound at the portfolio rate in this calculator, unlike the
/// retirement trial loop). Real values deflate by `(1+inflation)^year`.
pub fn project(inputs: &NetWorthInputs, years: u32) -> Vec<NetWorthPoint> {
    let mut net_worth = inputs.current_net_worth;

    let mut projection = Vec::with_capacity(years as usize + 1);
    projection.push(NetWorthPoint {
        year: 0,
        net_worth,
        nominal_net_worth: net_worth,
        annual_savings: inputs.annual_savings,
    });

    for year in 1..=years {
        let annual_savings =
            inputs.annual_savings * (1.0 + inputs.income_growth).powi(year as i32);

        if net_worth > 0.0 {
            net_worth *= 1.0 + inputs.investment_return;
        }
        net_worth += annual_savings;

        let real_net_worth = net_worth / (1.0 + inputs.inflation_rate).powi(year as i32);
        projection.push(NetWorthPoint {
            year,
            net_worth: real_net_worth,
            nominal_net_worth: net_worth,
            annual_savings,
        });
    }

    projection
}

pub fn summarize(inputs: &NetWorthInputs) -> NetWorthSummary {
    let ten_year = project(inputs, 10);
    NetWorthSummary {
        ten_year_nominal: ten_year.last().map(|p| p.nominal_net_worth).unwrap_or(0.0),
        annual_savings: inputs.annual_savings,
        monthly_savings: inputs.annual_savings / 12.0,
        savings_rate_pct: if inputs.annual_income > 0.0 {
            Some(inputs.annual_savings / inputs.annual_income * 100.0)
        } else {
            None
        },
        doubling_years: doubling_time(inputs),
    }
}

/// Rule-of-72 doubling estimate adjusted for contributions. `None` when
/// net worth or savings is non-positive.
pub fn doubling_time(inputs: &NetWorthInputs) -> Option<f64> {
    if inputs.current_net_worth <= 0.0 || inputs.annual_savings <= 0.0 {
        return None;
    }

    let effective_rate =
        inputs.investment_return + inputs.annual_savings / inputs.current_net_worth;
    Some(0.72 / effective_rate)
}
