use log::debug;
use serde::Serialize;

use super::growth::deflate;
use super::types::{MONEY_EPSILON, VestingSchedule};

/// Annual employee deferral ceilings, stepped by age.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ContributionLimits {
    pub base: f64,
    pub catch_up: f64,
    pub super_catch_up: f64,
    pub catch_up_age: u32,
    pub super_catch_up_start: u32,
    pub super_catch_up_end: u32,
}

pub const DEFERRAL_LIMITS_2025: ContributionLimits = ContributionLimits {
    base: 23_500.0,
    catch_up: 31_000.0,
    super_catch_up: 34_750.0,
    catch_up_age: 50,
    super_catch_up_start: 60,
    super_catch_up_end: 63,
};

impl ContributionLimits {
    pub fn ceiling_for_age(&self, age: u32) -> f64 {
        if (self.super_catch_up_start..=self.super_catch_up_end).contains(&age) {
            self.super_catch_up
        } else if age >= self.catch_up_age {
            self.catch_up
        } else {
            self.base
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetirementInputs {
    pub current_age: u32,
    pub retirement_age: u32,
    pub current_balance: f64,
    pub salary: f64,
    pub salary_growth_rate: f64,
    pub employee_contribution_rate: f64,
    pub match_rate: f64,
    pub match_limit_rate: f64,
    pub vesting: VestingSchedule,
    pub years_of_service: u32,
    pub annual_return: f64,
    pub post_retirement_return: f64,
    pub withdrawal_rate: f64,
    pub inflation_rate: f64,
    pub limits: ContributionLimits,
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", content = "years", rename_all = "kebab-case")]
pub enum Longevity {
    Years(f64),
    Indefinite,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetirementYear {
    pub age: u32,
    pub salary: f64,
    pub contribution_ceiling: f64,
    pub employee_contribution: f64,
    pub employer_match: f64,
    pub capped: bool,
    pub vested_fraction: f64,
    pub balance: f64,
    pub vested_balance: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetirementResult {
    pub years_to_retirement: u32,
    pub final_balance: f64,
    pub vested_balance: f64,
    pub real_vested_balance: f64,
    pub total_employee_contributions: f64,
    pub total_employer_match: f64,
    pub forfeited_match: f64,
    pub investment_growth: f64,
    pub vested_fraction: f64,
    pub annual_withdrawal: f64,
    pub monthly_income: f64,
    pub longevity: Longevity,
    pub years: Vec<RetirementYear>,
}

pub fn project_retirement(inputs: &RetirementInputs) -> RetirementResult {
    let years_to_retirement = inputs.retirement_age.saturating_sub(inputs.current_age);
    let monthly_return = inputs.annual_return / 12.0;

    // Employee money is always owned; employer money is tracked apart for vesting.
    let mut employee_balance = inputs.current_balance;
    let mut employer_balance = 0.0;
    let mut total_employee = 0.0;
    let mut total_match = 0.0;
    let mut vested_fraction = inputs.vesting.vested_fraction(inputs.years_of_service);
    let mut years = Vec::with_capacity(years_to_retirement as usize);

    for year in 0..years_to_retirement {
        let age = inputs.current_age + year;
        let salary = inputs.salary * (1.0 + inputs.salary_growth_rate).powi(year as i32);
        let requested = salary * inputs.employee_contribution_rate;
        let ceiling = inputs.limits.ceiling_for_age(age);
        let employee_contribution = requested.min(ceiling);
        let employer_match =
            employee_contribution.min(salary * inputs.match_limit_rate) * inputs.match_rate;

        for _ in 0..12 {
            employee_balance =
                employee_balance * (1.0 + monthly_return) + employee_contribution / 12.0;
            employer_balance = employer_balance * (1.0 + monthly_return) + employer_match / 12.0;
        }

        total_employee += employee_contribution;
        total_match += employer_match;
        let tenure = inputs.years_of_service.saturating_add(year + 1);
        vested_fraction = inputs.vesting.vested_fraction(tenure);

        years.push(RetirementYear {
            age,
            salary,
            contribution_ceiling: ceiling,
            employee_contribution,
            employer_match,
            capped: requested > ceiling,
            vested_fraction,
            balance: employee_balance + employer_balance,
            vested_balance: employee_balance + employer_balance * vested_fraction,
        });
    }

    let final_balance = employee_balance + employer_balance;
    let vested_balance = employee_balance + employer_balance * vested_fraction;
    let annual_withdrawal = vested_balance * inputs.withdrawal_rate;
    let longevity = funds_longevity(
        vested_balance,
        annual_withdrawal,
        inputs.post_retirement_return,
    );
    debug!(
        "retirement projection over {years_to_retirement} years: balance {final_balance:.2}, vested {vested_fraction:.2}"
    );

    RetirementResult {
        years_to_retirement,
        final_balance,
        vested_balance,
        real_vested_balance: deflate(vested_balance, inputs.inflation_rate, years_to_retirement),
        total_employee_contributions: total_employee,
        total_employer_match: total_match,
        forfeited_match: employer_balance * (1.0 - vested_fraction),
        investment_growth: final_balance - inputs.current_balance - total_employee - total_match,
        vested_fraction,
        annual_withdrawal,
        monthly_income: annual_withdrawal / 12.0,
        longevity,
        years,
    }
}

/// Years a balance sustains a level end-of-year withdrawal, from the annuity
/// present-value identity `B = W(1 - (1+r)^-n) / r`.
pub fn funds_longevity(balance: f64, annual_withdrawal: f64, annual_return: f64) -> Longevity {
    if balance <= MONEY_EPSILON {
        return Longevity::Years(0.0);
    }
    if annual_withdrawal <= MONEY_EPSILON {
        return Longevity::Indefinite;
    }
    if annual_return.abs() < 1e-9 {
        return Longevity::Years(balance / annual_withdrawal);
    }
    let steady_state = balance * annual_return;
    if annual_withdrawal <= steady_state {
        return Longevity::Indefinite;
    }
    let years = -(1.0 - steady_state / annual_withdrawal).ln() / (1.0 + annual_return).ln();
    Longevity::Years(years)
}
