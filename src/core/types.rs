use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Balances at or below this are treated as fully repaid.
pub const MONEY_EPSILON: f64 = 0.01;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Frequency {
    #[serde(alias = "annual", alias = "yearly")]
    Annually,
    Quarterly,
    Monthly,
    #[serde(alias = "semiMonthly", alias = "semi_monthly")]
    SemiMonthly,
    Biweekly,
    Weekly,
    Daily,
}

impl Frequency {
    pub fn periods_per_year(self) -> u32 {
        match self {
            Frequency::Annually => 1,
            Frequency::Quarterly => 4,
            Frequency::Monthly => 12,
            Frequency::SemiMonthly => 24,
            Frequency::Biweekly => 26,
            Frequency::Weekly => 52,
            Frequency::Daily => 365,
        }
    }

    pub fn is_compounding(self) -> bool {
        matches!(
            self,
            Frequency::Annually | Frequency::Quarterly | Frequency::Monthly | Frequency::Daily
        )
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let key = raw.trim().to_ascii_lowercase().replace(['_', ' '], "-");
        let frequency = match key.as_str() {
            "annually" | "annual" | "yearly" | "1" => Frequency::Annually,
            "quarterly" | "4" => Frequency::Quarterly,
            "monthly" | "12" => Frequency::Monthly,
            "semi-monthly" | "semimonthly" | "24" => Frequency::SemiMonthly,
            "biweekly" | "bi-weekly" | "26" => Frequency::Biweekly,
            "weekly" | "52" => Frequency::Weekly,
            "daily" | "365" => Frequency::Daily,
            _ => return None,
        };
        Some(frequency)
    }
}

/// Nominal annual rate with the frequency it compounds at.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct RateSpec {
    annual_rate: f64,
    frequency: Frequency,
}

impl RateSpec {
    /// Returns `None` unless the frequency is one of annual, quarterly, monthly or daily.
    pub fn compounding(annual_rate: f64, frequency: Frequency) -> Option<Self> {
        frequency.is_compounding().then_some(Self {
            annual_rate,
            frequency,
        })
    }

    pub fn monthly(annual_rate: f64) -> Self {
        Self {
            annual_rate,
            frequency: Frequency::Monthly,
        }
    }

    pub fn annual_rate(self) -> f64 {
        self.annual_rate
    }

    pub fn frequency(self) -> Frequency {
        self.frequency
    }

    pub fn periods_per_year(self) -> u32 {
        self.frequency.periods_per_year()
    }

    pub fn periodic_rate(self) -> f64 {
        self.annual_rate / self.periods_per_year() as f64
    }

    pub fn effective_annual_yield(self) -> f64 {
        (1.0 + self.periodic_rate()).powi(self.periods_per_year() as i32) - 1.0
    }
}

/// A recurring deposit that steps up once per year.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ContributionPlan {
    pub amount_per_period: f64,
    pub frequency: Frequency,
    pub annual_growth_rate: f64,
}

impl ContributionPlan {
    pub fn none() -> Self {
        Self {
            amount_per_period: 0.0,
            frequency: Frequency::Monthly,
            annual_growth_rate: 0.0,
        }
    }

    pub fn annual_total(self, year_index: u32) -> f64 {
        let multiplier = (1.0 + self.annual_growth_rate).powi(year_index as i32);
        self.amount_per_period * self.frequency.periods_per_year() as f64 * multiplier
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct VestingSchedule {
    pub vesting_years: u32,
    pub is_cliff: bool,
}

impl VestingSchedule {
    pub fn immediate() -> Self {
        Self {
            vesting_years: 0,
            is_cliff: false,
        }
    }

    /// Owned share of employer money after `tenure_years` completed years of service.
    pub fn vested_fraction(self, tenure_years: u32) -> f64 {
        if self.vesting_years == 0 || tenure_years >= self.vesting_years {
            return 1.0;
        }
        if self.is_cliff {
            0.0
        } else {
            tenure_years as f64 / self.vesting_years as f64
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PayoffStatus {
    PaidOff,
    NonAmortizing,
}

impl PayoffStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PayoffStatus::PaidOff => "paid-off",
            PayoffStatus::NonAmortizing => "non-amortizing",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LiabilityPeriod {
    pub id: String,
    pub starting_balance: f64,
    pub interest_accrued: f64,
    pub payment: f64,
    pub ending_balance: f64,
    pub received_pool: bool,
}

/// One row of a schedule. `payment` is everything applied against the balance, so
/// `ending_balance == starting_balance + interest_accrued - payment`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Period {
    pub index: u32,
    pub starting_balance: f64,
    pub interest_accrued: f64,
    pub payment: f64,
    pub ending_balance: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub breakdown: Option<Vec<LiabilityPeriod>>,
}

impl Period {
    pub fn principal_paid(&self) -> f64 {
        self.payment - self.interest_accrued
    }
}

pub type Schedule = Vec<Period>;

/// One `{x, y...}` point of a chart series.
pub type SeriesPoint = BTreeMap<String, f64>;

/// One row of a display table, already formatted.
pub type TableRow = BTreeMap<String, String>;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultMetadata {
    pub series: Vec<SeriesPoint>,
    pub table: Vec<TableRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculationResult {
    pub is_valid: bool,
    pub values: BTreeMap<String, serde_json::Value>,
    pub formatted: BTreeMap<String, String>,
    pub summary: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ResultMetadata>,
}

impl CalculationResult {
    pub fn invalid(errors: Vec<String>) -> Self {
        Self {
            is_valid: false,
            values: BTreeMap::new(),
            formatted: BTreeMap::new(),
            summary: String::new(),
            errors,
            metadata: None,
        }
    }
}
