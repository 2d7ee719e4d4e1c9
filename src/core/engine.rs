use std::collections::BTreeMap;

use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::amortize::{LoanInputs, LoanResult, amortize};
use super::format::{format_money, format_percent, format_periods, format_years};
use super::growth::{GrowthResult, project_growth};
use super::inputs::{
    InputMap, InputReader, UnitMap, read_contribution_goal, read_growth, read_loan, read_payoff,
    read_payoff_goal, read_retirement,
};
use super::payoff::{PayoffInputs, PayoffResult, PayoffRun, allocate};
use super::retirement::{Longevity, RetirementInputs, RetirementResult, project_retirement};
use super::solver::{GoalSolveResult, solve_contribution, solve_extra_payment};
use super::types::{
    CalculationResult, Frequency, PayoffStatus, ResultMetadata, SeriesPoint, TableRow,
};
use super::units::{CurrencyTable, Normalizer, UnitError};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Calculator {
    Loan,
    Growth,
    #[serde(alias = "debtPayoff", alias = "debt_payoff")]
    DebtPayoff,
    Retirement,
    #[serde(alias = "contributionGoal", alias = "contribution_goal")]
    ContributionGoal,
    #[serde(alias = "payoffGoal", alias = "payoff_goal")]
    PayoffGoal,
}

impl Calculator {
    pub const ALL: [Calculator; 6] = [
        Calculator::Loan,
        Calculator::Growth,
        Calculator::DebtPayoff,
        Calculator::Retirement,
        Calculator::ContributionGoal,
        Calculator::PayoffGoal,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Calculator::Loan => "loan",
            Calculator::Growth => "growth",
            Calculator::DebtPayoff => "debt-payoff",
            Calculator::Retirement => "retirement",
            Calculator::ContributionGoal => "contribution-goal",
            Calculator::PayoffGoal => "payoff-goal",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let key = raw.trim().to_ascii_lowercase().replace('_', "-");
        let key = match key.as_str() {
            "debtpayoff" => "debt-payoff",
            "contributiongoal" => "contribution-goal",
            "payoffgoal" => "payoff-goal",
            other => other,
        };
        Self::ALL.into_iter().find(|c| c.name() == key)
    }
}

/// Flat input map plus the optional unit tags and currency table that qualify it.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CalculationRequest {
    pub inputs: InputMap,
    pub units: UnitMap,
    pub currency: CurrencyTable,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Unit(#[from] UnitError),
    #[error("unknown calculator '{0}'")]
    UnknownCalculator(String),
}

pub fn calculate_named(
    name: &str,
    request: &CalculationRequest,
) -> Result<CalculationResult, EngineError> {
    let calculator =
        Calculator::parse(name).ok_or_else(|| EngineError::UnknownCalculator(name.to_string()))?;
    calculate(calculator, request)
}

pub fn calculate(
    calculator: Calculator,
    request: &CalculationRequest,
) -> Result<CalculationResult, EngineError> {
    debug!(
        "calculating {} from {} inputs",
        calculator.name(),
        request.inputs.len()
    );
    let normalizer = Normalizer::new(request.currency.clone());
    let reader = InputReader::new(&request.inputs, &request.units, &normalizer);

    let result = match calculator {
        Calculator::Loan => run(reader, read_loan, |inputs| {
            loan_result(inputs, &amortize(inputs))
        })?,
        Calculator::Growth => run(reader, read_growth, |inputs| {
            growth_result(&project_growth(inputs))
        })?,
        Calculator::DebtPayoff => run(reader, read_payoff, |inputs| {
            payoff_result(inputs, &allocate(inputs))
        })?,
        Calculator::Retirement => run(reader, read_retirement, |inputs| {
            retirement_result(inputs, &project_retirement(inputs))
        })?,
        Calculator::ContributionGoal => run(reader, read_contribution_goal, |goal| {
            goal_result(
                solve_contribution(goal),
                "requiredContribution",
                |v, out| {
                    out.money("achievedBalance", v);
                },
                |value| {
                    format!("Contribute {} per period to reach the target.", format_money(value))
                },
            )
        })?,
        Calculator::PayoffGoal => run(reader, read_payoff_goal, |goal| {
            goal_result(
                solve_extra_payment(goal),
                "requiredExtraPayment",
                |v, out| {
                    out.periods("achievedPeriods", v as u32, Frequency::Monthly);
                },
                |value| {
                    format!(
                        "An extra {} per month clears every balance within {}.",
                        format_money(value),
                        format_periods(goal.target_periods, Frequency::Monthly)
                    )
                },
            )
        })?,
    };
    Ok(result)
}

fn run<T>(
    mut reader: InputReader<'_>,
    read: fn(&mut InputReader<'_>) -> Result<T, UnitError>,
    render: impl FnOnce(&T) -> CalculationResult,
) -> Result<CalculationResult, UnitError> {
    let inputs = read(&mut reader)?;
    if let Err(errors) = reader.finish() {
        debug!("rejected {} invalid inputs", errors.len());
        return Ok(CalculationResult::invalid(
            errors.iter().map(ToString::to_string).collect(),
        ));
    }
    Ok(render(&inputs))
}

#[derive(Default)]
struct ResultBuilder {
    values: BTreeMap<String, Value>,
    formatted: BTreeMap<String, String>,
}

impl ResultBuilder {
    fn put(&mut self, key: &str, value: Value, display: String) -> &mut Self {
        self.values.insert(key.to_string(), value);
        self.formatted.insert(key.to_string(), display);
        self
    }

    fn money(&mut self, key: &str, value: f64) -> &mut Self {
        self.put(key, Value::from(value), format_money(value))
    }

    fn percent(&mut self, key: &str, fraction: f64) -> &mut Self {
        self.put(key, Value::from(fraction), format_percent(fraction))
    }

    fn periods(&mut self, key: &str, periods: u32, frequency: Frequency) -> &mut Self {
        self.put(key, Value::from(periods), format_periods(periods, frequency))
    }

    fn text(&mut self, key: &str, text: &str) -> &mut Self {
        self.put(key, Value::from(text), text.to_string())
    }

    fn flag(&mut self, key: &str, flag: bool) -> &mut Self {
        self.put(key, Value::from(flag), if flag { "Yes" } else { "No" }.to_string())
    }

    fn none(&mut self, key: &str, display: &str) -> &mut Self {
        self.put(key, Value::Null, display.to_string())
    }

    fn build(self, summary: String, metadata: Option<ResultMetadata>) -> CalculationResult {
        CalculationResult {
            is_valid: true,
            values: self.values,
            formatted: self.formatted,
            summary,
            errors: Vec::new(),
            metadata,
        }
    }
}

fn point(x: f64, ys: &[(&str, f64)]) -> SeriesPoint {
    let mut point = SeriesPoint::new();
    point.insert("x".to_string(), x);
    for (key, y) in ys {
        point.insert((*key).to_string(), *y);
    }
    point
}

fn row(cells: &[(&str, String)]) -> TableRow {
    cells
        .iter()
        .map(|(key, cell)| ((*key).to_string(), cell.clone()))
        .collect()
}

fn loan_result(inputs: &LoanInputs, result: &LoanResult) -> CalculationResult {
    let frequency = inputs.frequency;
    let mut out = ResultBuilder::default();
    out.text("status", result.status.as_str())
        .money("financedPrincipal", result.financed_principal)
        .money("scheduledPayment", result.scheduled_payment)
        .periods("periodsToPayoff", result.periods_to_payoff, frequency)
        .money("totalInterest", result.total_interest)
        .money("totalPaid", result.total_paid)
        .money("capitalizedInterest", result.capitalized_interest)
        .money("interestSaved", result.interest_saved)
        .periods("periodsSaved", result.periods_saved, frequency);

    let summary = match result.status {
        PayoffStatus::PaidOff => format!(
            "Paying {} per period clears {} in {} with {} of interest.",
            format_money(result.scheduled_payment + inputs.extra_payment),
            format_money(result.financed_principal),
            format_periods(result.periods_to_payoff, frequency),
            format_money(result.total_interest)
        ),
        PayoffStatus::NonAmortizing => format!(
            "A payment of {} never pays down the balance; the loan does not amortize.",
            format_money(result.scheduled_payment + inputs.extra_payment)
        ),
    };

    let mut cumulative_interest = 0.0;
    let mut metadata = ResultMetadata::default();
    for period in &result.schedule {
        cumulative_interest += period.interest_accrued;
        metadata.series.push(point(
            period.index as f64,
            &[
                ("balance", period.ending_balance),
                ("cumulativeInterest", cumulative_interest),
            ],
        ));
        metadata.table.push(row(&[
            ("period", period.index.to_string()),
            ("payment", format_money(period.payment)),
            ("interest", format_money(period.interest_accrued)),
            ("principal", format_money(period.principal_paid())),
            ("balance", format_money(period.ending_balance)),
        ]));
    }
    out.build(summary, Some(metadata))
}

fn growth_result(result: &GrowthResult) -> CalculationResult {
    let mut out = ResultBuilder::default();
    out.money("finalBalance", result.final_balance)
        .money("totalContributions", result.total_contributions)
        .money("totalInterest", result.total_interest)
        .percent("effectiveAnnualYield", result.effective_annual_yield)
        .money("taxOnInterest", result.tax_on_interest)
        .money("afterTaxBalance", result.after_tax_balance)
        .money("realBalance", result.real_balance);
    match (result.periods_to_target, result.years_to_target) {
        (Some(periods), Some(years)) => {
            out.put("periodsToTarget", Value::from(periods), periods.to_string())
                .put("yearsToTarget", Value::from(years), format_years(years));
        }
        _ => {
            out.none("periodsToTarget", "Not reached")
                .none("yearsToTarget", "Not reached");
        }
    }

    let summary = format!(
        "Balance grows to {} after {} years ({} contributed, {} interest).",
        format_money(result.final_balance),
        result.years.len(),
        format_money(result.total_contributions),
        format_money(result.total_interest)
    );

    let mut metadata = ResultMetadata::default();
    for year in &result.years {
        metadata.series.push(point(
            year.year as f64,
            &[
                ("balance", year.balance),
                ("contributions", year.total_contributions),
                ("interest", year.total_interest),
                ("realBalance", year.real_balance),
            ],
        ));
        metadata.table.push(row(&[
            ("year", year.year.to_string()),
            ("contributions", format_money(year.contributions)),
            ("interest", format_money(year.interest)),
            ("balance", format_money(year.balance)),
        ]));
    }
    out.build(summary, Some(metadata))
}

fn payoff_result(inputs: &PayoffInputs, result: &PayoffResult) -> CalculationResult {
    let plan = &result.plan;
    let monthly = Frequency::Monthly;
    let order: Vec<&str> = plan
        .priority
        .iter()
        .map(|&idx| inputs.liabilities[idx].id.as_str())
        .collect();

    let mut out = ResultBuilder::default();
    out.text("status", plan.status.as_str())
        .text("strategy", inputs.strategy.as_str())
        .text("payoffOrder", &order.join(", "))
        .periods("periodsToPayoff", plan.periods, monthly)
        .money("totalInterest", plan.total_interest)
        .money("totalPaid", plan.total_paid)
        .text("baselineStatus", result.baseline.status.as_str())
        .periods("baselinePeriods", result.baseline.periods, monthly)
        .money("baselineInterest", result.baseline.total_interest);
    match (result.periods_saved, result.interest_saved) {
        (Some(periods), Some(interest)) => {
            out.periods("periodsSaved", periods, monthly)
                .money("interestSaved", interest);
        }
        _ => {
            out.none("periodsSaved", "n/a").none("interestSaved", "n/a");
        }
    }
    for (idx, (liability, payoff_period)) in
        inputs.liabilities.iter().zip(&plan.payoff_periods).enumerate()
    {
        out.text(&format!("debt{}Name", idx + 1), &liability.id);
        let key = format!("debt{}PayoffPeriod", idx + 1);
        match payoff_period {
            Some(period) => out.periods(&key, *period, monthly),
            None => out.none(&key, "Never"),
        };
    }

    let summary = payoff_summary(inputs, plan, result);
    let mut metadata = ResultMetadata::default();
    for period in &plan.schedule {
        let breakdown = period.breakdown.as_deref().unwrap_or_default();
        let mut ys: Vec<(String, f64)> = breakdown
            .iter()
            .enumerate()
            .map(|(idx, line)| (format!("debt{}", idx + 1), line.ending_balance))
            .collect();
        ys.push(("total".to_string(), period.ending_balance));
        let ys: Vec<(&str, f64)> = ys.iter().map(|(k, v)| (k.as_str(), *v)).collect();
        metadata.series.push(point(period.index as f64, &ys));

        // Names are free text and may repeat, so columns use the same keys as the series.
        let mut cells = vec![("period".to_string(), period.index.to_string())];
        for (idx, line) in breakdown.iter().enumerate() {
            cells.push((format!("debt{}", idx + 1), format_money(line.ending_balance)));
        }
        cells.push(("interest".to_string(), format_money(period.interest_accrued)));
        cells.push(("total".to_string(), format_money(period.ending_balance)));
        metadata.table.push(cells.into_iter().collect());
    }
    out.build(summary, Some(metadata))
}

fn payoff_summary(inputs: &PayoffInputs, plan: &PayoffRun, result: &PayoffResult) -> String {
    if plan.status == PayoffStatus::NonAmortizing {
        return format!(
            "The {} plan does not clear every balance; minimum payments never outpace interest.",
            inputs.strategy.as_str()
        );
    }
    let mut summary = format!(
        "The {} plan is debt-free in {}, paying {} of interest.",
        inputs.strategy.as_str(),
        format_periods(plan.periods, Frequency::Monthly),
        format_money(plan.total_interest)
    );
    if let (Some(periods), Some(interest)) = (result.periods_saved, result.interest_saved) {
        summary.push_str(&format!(
            " That is {} sooner and {} cheaper than minimums alone.",
            format_periods(periods, Frequency::Monthly),
            format_money(interest)
        ));
    }
    summary
}

fn retirement_result(inputs: &RetirementInputs, result: &RetirementResult) -> CalculationResult {
    let mut out = ResultBuilder::default();
    out.put(
        "yearsToRetirement",
        Value::from(result.years_to_retirement),
        result.years_to_retirement.to_string(),
    )
    .money("finalBalance", result.final_balance)
    .money("vestedBalance", result.vested_balance)
    .money("realVestedBalance", result.real_vested_balance)
    .money("totalEmployeeContributions", result.total_employee_contributions)
    .money("totalEmployerMatch", result.total_employer_match)
    .money("forfeitedMatch", result.forfeited_match)
    .money("investmentGrowth", result.investment_growth)
    .percent("vestedFraction", result.vested_fraction)
    .money("annualWithdrawal", result.annual_withdrawal)
    .money("monthlyIncome", result.monthly_income);

    let lasts = match result.longevity {
        Longevity::Years(years) => {
            out.put("fundsLastYears", Value::from(years), format_years(years))
                .flag("fundsLastIndefinitely", false);
            format_years(years)
        }
        Longevity::Indefinite => {
            out.none("fundsLastYears", "Indefinitely")
                .flag("fundsLastIndefinitely", true);
            "indefinitely".to_string()
        }
    };

    let summary = format!(
        "At {} you would have {} vested, paying {} a month that lasts {}.",
        inputs.retirement_age,
        format_money(result.vested_balance),
        format_money(result.monthly_income),
        lasts
    );

    let mut metadata = ResultMetadata::default();
    for year in &result.years {
        metadata.series.push(point(
            year.age as f64,
            &[
                ("balance", year.balance),
                ("vestedBalance", year.vested_balance),
            ],
        ));
        metadata.table.push(row(&[
            ("age", year.age.to_string()),
            ("salary", format_money(year.salary)),
            ("ceiling", format_money(year.contribution_ceiling)),
            ("employee", format_money(year.employee_contribution)),
            ("match", format_money(year.employer_match)),
            ("capped", if year.capped { "Yes" } else { "No" }.to_string()),
            ("vested", format_percent(year.vested_fraction)),
            ("balance", format_money(year.balance)),
        ]));
    }
    out.build(summary, Some(metadata))
}

fn goal_result(
    solved: Result<GoalSolveResult, String>,
    value_key: &str,
    achieved: impl FnOnce(f64, &mut ResultBuilder),
    describe: impl FnOnce(f64) -> String,
) -> CalculationResult {
    let result = match solved {
        Ok(result) => result,
        Err(message) => return CalculationResult::invalid(vec![message]),
    };

    let mut out = ResultBuilder::default();
    out.flag("feasible", result.feasible)
        .flag("converged", result.converged)
        .put(
            "iterations",
            Value::from(result.iterations.len() as u32),
            result.iterations.len().to_string(),
        )
        .text("message", &result.message);
    match result.solved_value {
        Some(value) => {
            out.money(value_key, value);
        }
        None => {
            out.none(value_key, "Not feasible");
        }
    }
    if let Some(value) = result.achieved {
        achieved(value, &mut out);
    }

    let summary = match result.solved_value {
        Some(value) => describe(value),
        None => result.message.clone(),
    };

    let mut metadata = ResultMetadata::default();
    for step in &result.iterations {
        metadata.series.push(point(
            step.iteration as f64,
            &[
                ("candidate", step.candidate_value),
                ("achieved", step.achieved),
            ],
        ));
        metadata.table.push(row(&[
            ("iteration", step.iteration.to_string()),
            ("candidate", format_money(step.candidate_value)),
            ("meetsGoal", if step.meets_goal { "Yes" } else { "No" }.to_string()),
        ]));
    }
    out.build(summary, Some(metadata))
}
