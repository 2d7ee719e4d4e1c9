use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::amortize::{LoanInputs, PaymentBasis};
use super::growth::{ContributionTiming, GrowthInputs};
use super::payoff::{Liability, MAX_PAYOFF_PERIODS, PayoffInputs, Strategy};
use super::retirement::{DEFERRAL_LIMITS_2025, RetirementInputs};
use super::solver::{
    ContributionGoal, GoalSolveConfig, GoalType, MAX_SOLVE_ITERATIONS, PayoffGoal,
};
use super::types::{ContributionPlan, Frequency, RateSpec, VestingSchedule};
use super::units::{Dimension, Normalizer, UnitError};

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum InputValue {
    Number(f64),
    Flag(bool),
    Text(String),
    Null,
}

pub type InputMap = BTreeMap<String, InputValue>;

/// Field name to unit or currency tag.
pub type UnitMap = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("{field} is required")]
    Missing { field: String },
    #[error("{field} must be a number, got '{raw}'")]
    NotANumber { field: String, raw: String },
    #[error("{field} must be {rule}")]
    OutOfRange { field: String, rule: String },
    #[error("{field}: {message}")]
    Invalid { field: String, message: String },
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Rule {
    AtLeast(f64),
    Above(f64),
    Between(f64, f64),
}

impl Rule {
    fn accepts(self, value: f64) -> bool {
        match self {
            Rule::AtLeast(min) => value >= min,
            Rule::Above(min) => value > min,
            Rule::Between(min, max) => (min..=max).contains(&value),
        }
    }

    fn describe(self) -> String {
        match self {
            Rule::AtLeast(min) => format!(">= {min}"),
            Rule::Above(min) => format!("> {min}"),
            Rule::Between(min, max) => format!("between {min} and {max}"),
        }
    }
}

/// Reads typed values out of a flat input map, collecting every validation
/// problem instead of stopping at the first.
pub struct InputReader<'a> {
    inputs: &'a InputMap,
    units: &'a UnitMap,
    normalizer: &'a Normalizer,
    errors: Vec<ValidationError>,
}

impl<'a> InputReader<'a> {
    pub fn new(inputs: &'a InputMap, units: &'a UnitMap, normalizer: &'a Normalizer) -> Self {
        Self {
            inputs,
            units,
            normalizer,
            errors: Vec::new(),
        }
    }

    pub fn finish(self) -> Result<(), Vec<ValidationError>> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self.errors)
        }
    }

    pub fn is_present(&self, key: &str) -> bool {
        match self.inputs.get(key) {
            None | Some(InputValue::Null) => false,
            Some(InputValue::Text(raw)) => !raw.trim().is_empty(),
            Some(_) => true,
        }
    }

    pub fn money(&mut self, key: &str, rule: Rule) -> Result<Option<f64>, UnitError> {
        let Some(value) = self.number(key) else {
            return Ok(None);
        };
        let value = match self.units.get(key) {
            Some(tag) => self.normalizer.to_base(value, tag, Dimension::Currency)?,
            None => value,
        };
        Ok(self.checked(key, value, rule))
    }

    pub fn required_money(&mut self, key: &str, rule: Rule) -> Result<f64, UnitError> {
        let value = self.money(key, rule)?;
        Ok(self.require(key, value))
    }

    /// Entered as a percent, returned as a fraction.
    pub fn percent(&mut self, key: &str, rule: Rule) -> Result<Option<f64>, UnitError> {
        self.reject_unit_tag(key)?;
        let value = self.number(key);
        Ok(value
            .and_then(|v| self.checked(key, v, rule))
            .map(|v| v / 100.0))
    }

    pub fn required_percent(&mut self, key: &str, rule: Rule) -> Result<f64, UnitError> {
        let value = self.percent(key, rule)?;
        Ok(self.require(key, value))
    }

    /// Whole number within `min..=max`; anything else is `OutOfRange`.
    pub fn count(&mut self, key: &str, min: u32, max: u32) -> Result<Option<u32>, UnitError> {
        self.reject_unit_tag(key)?;
        let Some(value) = self.number(key) else {
            return Ok(None);
        };
        let rule = Rule::Between(min as f64, max as f64);
        if value.fract() != 0.0 || !rule.accepts(value) {
            self.errors.push(ValidationError::OutOfRange {
                field: key.to_string(),
                rule: format!("a whole number {}", rule.describe()),
            });
            return Ok(None);
        }
        Ok(Some(value as u32))
    }

    pub fn required_count(&mut self, key: &str, min: u32, max: u32) -> Result<u32, UnitError> {
        let value = self.count(key, min, max)?;
        Ok(self.require(key, value))
    }

    pub fn flag(&mut self, key: &str) -> Result<Option<bool>, UnitError> {
        self.reject_unit_tag(key)?;
        let parsed = match self.inputs.get(key) {
            None | Some(InputValue::Null) => None,
            Some(InputValue::Flag(flag)) => Some(*flag),
            Some(InputValue::Number(n)) => Some(*n != 0.0),
            Some(InputValue::Text(raw)) => match raw.trim().to_ascii_lowercase().as_str() {
                "" => None,
                "true" | "yes" | "on" | "1" => Some(true),
                "false" | "no" | "off" | "0" => Some(false),
                _ => {
                    self.invalid(key, format!("expected true or false, got '{raw}'"));
                    None
                }
            },
        };
        Ok(parsed)
    }

    pub fn text(&mut self, key: &str) -> Result<Option<String>, UnitError> {
        self.reject_unit_tag(key)?;
        let text = match self.inputs.get(key) {
            Some(InputValue::Text(raw)) if !raw.trim().is_empty() => Some(raw.trim().to_string()),
            Some(InputValue::Number(n)) => Some(n.to_string()),
            _ => None,
        };
        Ok(text)
    }

    pub fn frequency(&mut self, key: &str, default: Frequency) -> Result<Frequency, UnitError> {
        let Some(raw) = self.text(key)? else {
            return Ok(default);
        };
        Ok(Frequency::parse(&raw).unwrap_or_else(|| {
            self.invalid(key, format!("unknown frequency '{raw}'"));
            default
        }))
    }

    pub fn invalid(&mut self, key: &str, message: String) {
        self.errors.push(ValidationError::Invalid {
            field: key.to_string(),
            message,
        });
    }

    fn number(&mut self, key: &str) -> Option<f64> {
        let parsed = match self.inputs.get(key)? {
            InputValue::Null => None,
            InputValue::Number(n) => Some(*n),
            InputValue::Flag(flag) => {
                self.not_a_number(key, &flag.to_string());
                None
            }
            InputValue::Text(raw) => {
                let cleaned = raw.trim().replace(',', "");
                if cleaned.is_empty() {
                    return None;
                }
                match cleaned.parse::<f64>() {
                    Ok(n) => Some(n),
                    Err(_) => {
                        self.not_a_number(key, raw);
                        None
                    }
                }
            }
        };
        match parsed {
            Some(n) if !n.is_finite() => {
                self.not_a_number(key, &n.to_string());
                None
            }
            other => other,
        }
    }

    fn checked(&mut self, key: &str, value: f64, rule: Rule) -> Option<f64> {
        if rule.accepts(value) {
            Some(value)
        } else {
            self.errors.push(ValidationError::OutOfRange {
                field: key.to_string(),
                rule: rule.describe(),
            });
            None
        }
    }

    fn require<T: Default>(&mut self, key: &str, value: Option<T>) -> T {
        if value.is_none() && !self.has_error_for(key) {
            self.errors.push(ValidationError::Missing {
                field: key.to_string(),
            });
        }
        value.unwrap_or_default()
    }

    fn has_error_for(&self, key: &str) -> bool {
        self.errors.iter().any(|err| match err {
            ValidationError::Missing { field }
            | ValidationError::NotANumber { field, .. }
            | ValidationError::OutOfRange { field, .. }
            | ValidationError::Invalid { field, .. } => field == key,
        })
    }

    fn not_a_number(&mut self, key: &str, raw: &str) {
        self.errors.push(ValidationError::NotANumber {
            field: key.to_string(),
            raw: raw.to_string(),
        });
    }

    fn reject_unit_tag(&self, key: &str) -> Result<(), UnitError> {
        match self.units.get(key) {
            Some(tag) => Err(UnitError::NotConvertible {
                field: key.to_string(),
                unit: tag.clone(),
            }),
            None => Ok(()),
        }
    }
}

const NON_NEGATIVE: Rule = Rule::AtLeast(0.0);
const POSITIVE: Rule = Rule::Above(0.0);
const PERCENT: Rule = Rule::Between(0.0, 100.0);
const GROWTH_PERCENT: Rule = Rule::Above(-100.0);

const MAX_TERM_PERIODS: u32 = 1_200;
const MAX_YEARS: u32 = 200;
const MAX_AGE: u32 = 150;
const MAX_SERVICE_YEARS: u32 = 100;

pub fn read_loan(reader: &mut InputReader) -> Result<LoanInputs, UnitError> {
    let principal = reader.required_money("principal", NON_NEGATIVE)?;
    let annual_rate = reader.required_percent("annualRate", NON_NEGATIVE)?;
    let frequency = reader.frequency("paymentFrequency", Frequency::Monthly)?;

    let basis = match (reader.is_present("termPeriods"), reader.is_present("payment")) {
        (true, true) => {
            reader.invalid("payment", "give either termPeriods or payment, not both".to_string());
            PaymentBasis::Term(1)
        }
        (false, true) => PaymentBasis::FixedPayment(reader.required_money("payment", POSITIVE)?),
        _ => PaymentBasis::Term(reader.required_count("termPeriods", 1, MAX_TERM_PERIODS)?),
    };
    let grace_periods = reader
        .count("gracePeriods", 0, MAX_TERM_PERIODS)?
        .unwrap_or(0);
    let term_read = reader.is_present("termPeriods")
        && !reader.is_present("payment")
        && !reader.has_error_for("termPeriods");
    if term_read && matches!(basis, PaymentBasis::Term(term) if grace_periods > term) {
        reader.invalid("gracePeriods", "must be <= termPeriods".to_string());
    }

    Ok(LoanInputs {
        principal,
        annual_rate,
        frequency,
        basis,
        extra_payment: reader.money("extraPayment", NON_NEGATIVE)?.unwrap_or(0.0),
        upfront_reduction: reader.money("upfrontReduction", NON_NEGATIVE)?.unwrap_or(0.0),
        grace_periods,
        pay_interest_during_grace: reader.flag("payInterestDuringGrace")?.unwrap_or(false),
    })
}

pub fn read_growth(reader: &mut InputReader) -> Result<GrowthInputs, UnitError> {
    let mut inputs = read_growth_shared(reader)?;
    inputs.contribution.amount_per_period =
        reader.money("contribution", NON_NEGATIVE)?.unwrap_or(0.0);
    inputs.target_balance = reader.money("targetBalance", POSITIVE)?;
    Ok(inputs)
}

pub fn read_contribution_goal(reader: &mut InputReader) -> Result<ContributionGoal, UnitError> {
    let growth = read_growth_shared(reader)?;
    let target_balance = reader.required_money("targetBalance", POSITIVE)?;
    let config = read_solve_config(
        reader,
        GoalType::RequiredContribution,
        target_balance.max(1.0),
    )?;
    Ok(ContributionGoal {
        growth,
        target_balance,
        config,
    })
}

fn read_growth_shared(reader: &mut InputReader) -> Result<GrowthInputs, UnitError> {
    let initial_balance = reader.money("initialBalance", NON_NEGATIVE)?.unwrap_or(0.0);
    let annual_rate = reader.required_percent("annualRate", GROWTH_PERCENT)?;
    let compounding = reader.frequency("compoundingFrequency", Frequency::Monthly)?;
    let rate = match RateSpec::compounding(annual_rate, compounding) {
        Some(rate) => rate,
        None => {
            reader.invalid(
                "compoundingFrequency",
                "must be annually, quarterly, monthly or daily".to_string(),
            );
            RateSpec::monthly(annual_rate)
        }
    };
    let contribution_frequency = reader.frequency("contributionFrequency", compounding)?;
    let annual_growth_rate = reader
        .percent("contributionGrowthRate", GROWTH_PERCENT)?
        .unwrap_or(0.0);
    let timing = match reader.text("contributionTiming")?.as_deref() {
        None => ContributionTiming::End,
        Some(raw) => match raw.to_ascii_lowercase().as_str() {
            "end" => ContributionTiming::End,
            "beginning" | "start" => ContributionTiming::Beginning,
            _ => {
                reader.invalid(
                    "contributionTiming",
                    format!("expected end or beginning, got '{raw}'"),
                );
                ContributionTiming::End
            }
        },
    };

    Ok(GrowthInputs {
        initial_balance,
        rate,
        contribution: ContributionPlan {
            amount_per_period: 0.0,
            frequency: contribution_frequency,
            annual_growth_rate,
        },
        timing,
        years: reader.required_count("years", 1, MAX_YEARS)?,
        tax_rate: reader.percent("taxRate", PERCENT)?.unwrap_or(0.0),
        inflation_rate: reader.percent("inflationRate", GROWTH_PERCENT)?.unwrap_or(0.0),
        target_balance: None,
    })
}

pub fn read_payoff(reader: &mut InputReader) -> Result<PayoffInputs, UnitError> {
    let liabilities = read_liabilities(reader)?;
    let strategy = match reader.text("strategy")? {
        None => Strategy::Avalanche,
        Some(raw) => Strategy::parse(&raw).unwrap_or_else(|| {
            reader.invalid("strategy", format!("expected avalanche or snowball, got '{raw}'"));
            Strategy::Avalanche
        }),
    };
    Ok(PayoffInputs {
        liabilities,
        strategy,
        extra_payment: reader.money("extraPayment", NON_NEGATIVE)?.unwrap_or(0.0),
        roll_over_minimums: reader.flag("rollOverMinimums")?.unwrap_or(true),
    })
}

pub fn read_payoff_goal(reader: &mut InputReader) -> Result<PayoffGoal, UnitError> {
    let payoff = read_payoff(reader)?;
    let target_periods = reader.required_count("targetPeriods", 1, MAX_PAYOFF_PERIODS)?;
    let total_balance: f64 = payoff.liabilities.iter().map(|l| l.principal).sum();
    let config = read_solve_config(
        reader,
        GoalType::MinimumExtraPayment,
        (2.0 * total_balance).max(1.0),
    )?;
    Ok(PayoffGoal {
        payoff,
        target_periods,
        config,
    })
}

/// Liabilities arrive as `debt1Balance`, `debt1Rate`, `debt1MinPayment`, ... up to the first gap.
fn read_liabilities(reader: &mut InputReader) -> Result<Vec<Liability>, UnitError> {
    let mut liabilities = Vec::new();
    for n in 1.. {
        let balance_key = format!("debt{n}Balance");
        if !reader.is_present(&balance_key) {
            break;
        }
        let principal = reader.required_money(&balance_key, NON_NEGATIVE)?;
        let annual_rate = reader.required_percent(&format!("debt{n}Rate"), NON_NEGATIVE)?;
        let minimum_payment = reader.required_money(&format!("debt{n}MinPayment"), NON_NEGATIVE)?;
        let id = reader
            .text(&format!("debt{n}Name"))?
            .unwrap_or_else(|| format!("Debt {n}"));
        liabilities.push(Liability {
            id,
            principal,
            annual_rate,
            minimum_payment,
        });
    }
    if liabilities.is_empty() {
        reader.require::<f64>("debt1Balance", None);
    }
    Ok(liabilities)
}

fn read_solve_config(
    reader: &mut InputReader,
    goal_type: GoalType,
    default_max: f64,
) -> Result<GoalSolveConfig, UnitError> {
    let mut config = GoalSolveConfig::new(goal_type, default_max);
    if let Some(search_max) = reader.money("searchMax", POSITIVE)? {
        config.search_max = search_max;
    }
    if let Some(tolerance) = reader.money("tolerance", POSITIVE)? {
        config.tolerance = tolerance;
    }
    if let Some(max_iterations) = reader.count("maxIterations", 1, MAX_SOLVE_ITERATIONS)? {
        config.max_iterations = max_iterations;
    }
    Ok(config)
}

pub fn read_retirement(reader: &mut InputReader) -> Result<RetirementInputs, UnitError> {
    let current_age = reader.required_count("currentAge", 0, MAX_AGE)?;
    let retirement_age = reader.required_count("retirementAge", 0, MAX_AGE)?;
    let ages_read = !reader.has_error_for("currentAge") && !reader.has_error_for("retirementAge");
    if ages_read && retirement_age < current_age {
        reader.invalid("retirementAge", "must be >= currentAge".to_string());
    }
    let vesting = VestingSchedule {
        vesting_years: reader
            .count("vestingYears", 0, MAX_SERVICE_YEARS)?
            .unwrap_or(0),
        is_cliff: reader.flag("cliffVesting")?.unwrap_or(false),
    };

    Ok(RetirementInputs {
        current_age,
        retirement_age,
        current_balance: reader.money("currentBalance", NON_NEGATIVE)?.unwrap_or(0.0),
        salary: reader.required_money("salary", POSITIVE)?,
        salary_growth_rate: reader.percent("salaryGrowthRate", GROWTH_PERCENT)?.unwrap_or(0.0),
        employee_contribution_rate: reader.required_percent("contributionRate", PERCENT)?,
        match_rate: reader.percent("matchRate", NON_NEGATIVE)?.unwrap_or(0.0),
        match_limit_rate: reader.percent("matchLimit", PERCENT)?.unwrap_or(0.0),
        vesting,
        years_of_service: reader
            .count("yearsOfService", 0, MAX_SERVICE_YEARS)?
            .unwrap_or(0),
        annual_return: reader.required_percent("annualReturn", GROWTH_PERCENT)?,
        post_retirement_return: reader
            .percent("postRetirementReturn", GROWTH_PERCENT)?
            .unwrap_or(0.03),
        withdrawal_rate: reader.percent("withdrawalRate", PERCENT)?.unwrap_or(0.04),
        inflation_rate: reader.percent("inflationRate", GROWTH_PERCENT)?.unwrap_or(0.0),
        limits: DEFERRAL_LIMITS_2025,
    })
}
