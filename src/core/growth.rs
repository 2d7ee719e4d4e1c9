use log::debug;
use serde::Serialize;

use super::types::{ContributionPlan, RateSpec};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContributionTiming {
    End,
    Beginning,
}

#[derive(Debug, Clone)]
pub struct GrowthInputs {
    pub initial_balance: f64,
    pub rate: RateSpec,
    pub contribution: ContributionPlan,
    pub timing: ContributionTiming,
    pub years: u32,
    pub tax_rate: f64,
    pub inflation_rate: f64,
    pub target_balance: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YearSnapshot {
    pub year: u32,
    pub contributions: f64,
    pub interest: f64,
    pub balance: f64,
    pub total_contributions: f64,
    pub total_interest: f64,
    pub real_balance: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GrowthResult {
    pub final_balance: f64,
    pub total_contributions: f64,
    pub total_interest: f64,
    pub effective_annual_yield: f64,
    pub tax_on_interest: f64,
    pub after_tax_balance: f64,
    pub real_balance: f64,
    pub periods_to_target: Option<u32>,
    pub years_to_target: Option<f64>,
    pub years: Vec<YearSnapshot>,
}

pub fn project_growth(inputs: &GrowthInputs) -> GrowthResult {
    let periods_per_year = inputs.rate.periods_per_year();
    let periodic_rate = inputs.rate.periodic_rate();

    let mut balance = inputs.initial_balance;
    let mut total_contributions = 0.0;
    let mut total_interest = 0.0;
    let mut periods_to_target = inputs
        .target_balance
        .filter(|target| balance >= *target)
        .map(|_| 0);
    let mut years = Vec::with_capacity(inputs.years as usize);

    for year in 0..inputs.years {
        // Contribution growth steps once per year boundary.
        let per_period = inputs.contribution.annual_total(year) / periods_per_year as f64;
        let mut year_contributions = 0.0;
        let mut year_interest = 0.0;

        for period in 0..periods_per_year {
            let interest = match inputs.timing {
                ContributionTiming::End => {
                    let interest = balance * periodic_rate;
                    balance += interest + per_period;
                    interest
                }
                ContributionTiming::Beginning => {
                    let interest = (balance + per_period) * periodic_rate;
                    balance += per_period + interest;
                    interest
                }
            };
            year_contributions += per_period;
            year_interest += interest;

            if periods_to_target.is_none()
                && inputs.target_balance.is_some_and(|target| balance >= target)
            {
                periods_to_target = Some(year * periods_per_year + period + 1);
            }
        }

        total_contributions += year_contributions;
        total_interest += year_interest;
        years.push(YearSnapshot {
            year: year + 1,
            contributions: year_contributions,
            interest: year_interest,
            balance,
            total_contributions,
            total_interest,
            real_balance: deflate(balance, inputs.inflation_rate, year + 1),
        });
    }

    let tax_on_interest = total_interest.max(0.0) * inputs.tax_rate;
    debug!(
        "projected {} years at {:.4} compounded {:?}, final balance {balance:.2}",
        inputs.years,
        inputs.rate.annual_rate(),
        inputs.rate.frequency()
    );

    GrowthResult {
        final_balance: balance,
        total_contributions,
        total_interest,
        effective_annual_yield: inputs.rate.effective_annual_yield(),
        tax_on_interest,
        after_tax_balance: balance - tax_on_interest,
        real_balance: deflate(balance, inputs.inflation_rate, inputs.years),
        periods_to_target,
        years_to_target: periods_to_target.map(|p| p as f64 / periods_per_year as f64),
        years,
    }
}

pub fn deflate(nominal: f64, inflation_rate: f64, years: u32) -> f64 {
    nominal / (1.0 + inflation_rate).powi(years as i32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Frequency;
    use proptest::prelude::{prop_assert, proptest};

    fn assert_approx_tol(actual: f64, expected: f64, tol: f64) {
        assert!(
            (actual - expected).abs() <= tol,
            "expected {expected}, got {actual}, tolerance {tol}"
        );
    }

    fn monthly(annual_rate: f64) -> RateSpec {
        RateSpec::compounding(annual_rate, Frequency::Monthly).expect("monthly compounds")
    }

    fn sample_inputs() -> GrowthInputs {
        GrowthInputs {
            initial_balance: 0.0,
            rate: monthly(0.07),
            contribution: ContributionPlan {
                amount_per_period: 500.0,
                frequency: Frequency::Monthly,
                annual_growth_rate: 0.0,
            },
            timing: ContributionTiming::End,
            years: 10,
            tax_rate: 0.0,
            inflation_rate: 0.0,
            target_balance: None,
        }
    }

    fn annuity_future_value(payment: f64, periodic_rate: f64, periods: u32) -> f64 {
        payment * ((1.0 + periodic_rate).powi(periods as i32) - 1.0) / periodic_rate
    }

    #[test]
    fn monthly_contributions_match_closed_form_annuity() {
        let result = project_growth(&sample_inputs());
        let expected = annuity_future_value(500.0, 0.07 / 12.0, 120);
        assert_approx_tol(result.final_balance, expected, 1e-6);
        assert_approx_tol(result.final_balance, 86_542.40, 0.01);
        assert_approx_tol(result.total_contributions, 60_000.0, 1e-6);
        assert_approx_tol(result.total_interest, expected - 60_000.0, 1e-6);
        assert_eq!(result.years.len(), 10);
    }

    #[test]
    fn beginning_timing_earns_one_extra_period_of_interest() {
        let inputs = GrowthInputs {
            timing: ContributionTiming::Beginning,
            ..sample_inputs()
        };
        let result = project_growth(&inputs);
        let expected = annuity_future_value(500.0, 0.07 / 12.0, 120) * (1.0 + 0.07 / 12.0);
        assert_approx_tol(result.final_balance, expected, 1e-6);
    }

    #[test]
    fn effective_yield_is_independent_of_simulation() {
        let result = project_growth(&sample_inputs());
        let expected = (1.0 + 0.07 / 12.0_f64).powi(12) - 1.0;
        assert_approx_tol(result.effective_annual_yield, expected, 1e-12);
        let daily = RateSpec::compounding(0.05, Frequency::Daily).unwrap();
        assert_approx_tol(daily.effective_annual_yield(), 0.051_267_496, 1e-8);
    }

    #[test]
    fn quarterly_contributions_are_spread_over_compounding_periods() {
        let inputs = GrowthInputs {
            contribution: ContributionPlan {
                amount_per_period: 1_500.0,
                frequency: Frequency::Quarterly,
                annual_growth_rate: 0.0,
            },
            ..sample_inputs()
        };
        let result = project_growth(&inputs);
        let expected = annuity_future_value(500.0, 0.07 / 12.0, 120);
        assert_approx_tol(result.final_balance, expected, 1e-6);
    }

    #[test]
    fn contribution_growth_steps_at_year_boundaries() {
        let inputs = GrowthInputs {
            rate: monthly(0.0),
            contribution: ContributionPlan {
                amount_per_period: 100.0,
                frequency: Frequency::Monthly,
                annual_growth_rate: 0.10,
            },
            years: 3,
            ..sample_inputs()
        };
        let result = project_growth(&inputs);
        assert_approx_tol(result.years[0].contributions, 1_200.0, 1e-9);
        assert_approx_tol(result.years[1].contributions, 1_320.0, 1e-9);
        assert_approx_tol(result.years[2].contributions, 1_452.0, 1e-9);
        assert_approx_tol(result.final_balance, 3_972.0, 1e-9);
    }

    #[test]
    fn tax_applies_to_interest_only_and_inflation_deflates_nominal() {
        let inputs = GrowthInputs {
            initial_balance: 10_000.0,
            rate: RateSpec::compounding(0.10, Frequency::Annually).unwrap(),
            contribution: ContributionPlan::none(),
            years: 2,
            tax_rate: 0.25,
            inflation_rate: 0.05,
            ..sample_inputs()
        };
        let result = project_growth(&inputs);
        assert_approx_tol(result.final_balance, 12_100.0, 1e-9);
        assert_approx_tol(result.tax_on_interest, 525.0, 1e-9);
        assert_approx_tol(result.after_tax_balance, 11_575.0, 1e-9);
        assert_approx_tol(result.real_balance, 12_100.0 / 1.1025, 1e-9);
    }

    #[test]
    fn time_to_target_reports_first_period_reaching_it() {
        let inputs = GrowthInputs {
            initial_balance: 1_000.0,
            rate: monthly(0.0),
            contribution: ContributionPlan {
                amount_per_period: 100.0,
                frequency: Frequency::Monthly,
                annual_growth_rate: 0.0,
            },
            years: 2,
            target_balance: Some(2_500.0),
            ..sample_inputs()
        };
        let result = project_growth(&inputs);
        assert_eq!(result.periods_to_target, Some(15));
        assert_approx_tol(result.years_to_target.unwrap(), 1.25, 1e-12);

        let unreachable = GrowthInputs {
            target_balance: Some(1_000_000.0),
            ..inputs
        };
        assert_eq!(project_growth(&unreachable).periods_to_target, None);
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(48))]

        #[test]
        fn prop_iterative_loop_matches_closed_form(
            initial in 0u32..100_000,
            contribution in 0u32..5_000,
            rate_bp in 1u32..1_500,
            years in 1u32..40,
            frequency_index in 0usize..4
        ) {
            let frequency = [Frequency::Annually, Frequency::Quarterly, Frequency::Monthly, Frequency::Daily][frequency_index];
            let rate = RateSpec::compounding(rate_bp as f64 / 10_000.0, frequency).unwrap();
            let inputs = GrowthInputs {
                initial_balance: initial as f64,
                rate,
                contribution: ContributionPlan {
                    amount_per_period: contribution as f64,
                    frequency,
                    annual_growth_rate: 0.0,
                },
                years,
                ..sample_inputs()
            };
            let result = project_growth(&inputs);
            let periods = years * rate.periods_per_year();
            let i = rate.periodic_rate();
            let expected = initial as f64 * (1.0 + i).powi(periods as i32)
                + annuity_future_value(contribution as f64, i, periods);
            prop_assert!((result.final_balance - expected).abs() <= 1e-7 * expected.max(1.0));
            let accounted = initial as f64 + result.total_contributions + result.total_interest;
            prop_assert!((result.final_balance - accounted).abs() <= 1e-6 * expected.max(1.0));
        }
    }
}
