use log::{debug, warn};
use serde::Serialize;

use super::types::{Frequency, MONEY_EPSILON, PayoffStatus, Period, Schedule};

/// Hard cap for fixed-payment payoff, matching the multi-liability allocator.
pub const MAX_FIXED_PAYMENT_PERIODS: u32 = 720;

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum PaymentBasis {
    /// Level payment derived from a term in payment periods.
    Term(u32),
    /// Payment given, term derived.
    FixedPayment(f64),
}

#[derive(Debug, Clone)]
pub struct LoanInputs {
    pub principal: f64,
    pub annual_rate: f64,
    pub frequency: Frequency,
    pub basis: PaymentBasis,
    pub extra_payment: f64,
    pub upfront_reduction: f64,
    pub grace_periods: u32,
    pub pay_interest_during_grace: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoanResult {
    pub status: PayoffStatus,
    pub financed_principal: f64,
    pub scheduled_payment: f64,
    pub periods_to_payoff: u32,
    pub total_interest: f64,
    pub total_paid: f64,
    pub capitalized_interest: f64,
    pub interest_saved: f64,
    pub periods_saved: u32,
    pub schedule: Schedule,
}

struct ScheduleRun {
    status: PayoffStatus,
    scheduled_payment: f64,
    capitalized_interest: f64,
    schedule: Schedule,
}

impl ScheduleRun {
    fn total_interest(&self) -> f64 {
        self.schedule.iter().map(|p| p.interest_accrued).sum()
    }

    fn total_paid(&self) -> f64 {
        self.schedule.iter().map(|p| p.payment).sum()
    }
}

pub fn amortize(inputs: &LoanInputs) -> LoanResult {
    let run = run_schedule(inputs, inputs.extra_payment);
    let total_interest = run.total_interest();
    let total_paid = run.total_paid();

    let (interest_saved, periods_saved) = if inputs.extra_payment > 0.0 {
        let baseline = run_schedule(inputs, 0.0);
        if baseline.status == PayoffStatus::PaidOff && run.status == PayoffStatus::PaidOff {
            (
                (baseline.total_interest() - total_interest).max(0.0),
                (baseline.schedule.len() as u32).saturating_sub(run.schedule.len() as u32),
            )
        } else {
            (0.0, 0)
        }
    } else {
        (0.0, 0)
    };

    LoanResult {
        status: run.status,
        financed_principal: financed_principal(inputs),
        scheduled_payment: run.scheduled_payment,
        periods_to_payoff: run.schedule.len() as u32,
        total_interest,
        total_paid,
        capitalized_interest: run.capitalized_interest,
        interest_saved,
        periods_saved,
        schedule: run.schedule,
    }
}

/// Level payment that retires `principal` over `periods` at `periodic_rate`.
pub fn level_payment(principal: f64, periodic_rate: f64, periods: u32) -> f64 {
    if periods == 0 {
        return principal;
    }
    if periodic_rate.abs() < 1e-12 {
        return principal / periods as f64;
    }
    let growth = (1.0 + periodic_rate).powi(periods as i32);
    principal * periodic_rate * growth / (growth - 1.0)
}

fn financed_principal(inputs: &LoanInputs) -> f64 {
    (inputs.principal - inputs.upfront_reduction).max(0.0)
}

fn run_schedule(inputs: &LoanInputs, extra_payment: f64) -> ScheduleRun {
    let periodic_rate = inputs.annual_rate / inputs.frequency.periods_per_year() as f64;
    let mut balance = financed_principal(inputs);
    let mut schedule = Vec::new();

    if balance <= MONEY_EPSILON {
        return ScheduleRun {
            status: PayoffStatus::PaidOff,
            scheduled_payment: 0.0,
            capitalized_interest: 0.0,
            schedule,
        };
    }

    // Grace interest is simple interest on the pre-grace principal.
    let grace_base = balance;
    let mut capitalized_interest = 0.0;
    for _ in 0..inputs.grace_periods {
        let interest = grace_base * periodic_rate;
        let payment = if inputs.pay_interest_during_grace {
            interest
        } else {
            capitalized_interest += interest;
            0.0
        };
        let ending_balance = balance + interest - payment;
        schedule.push(Period {
            index: schedule.len() as u32 + 1,
            starting_balance: balance,
            interest_accrued: interest,
            payment,
            ending_balance,
            breakdown: None,
        });
        balance = ending_balance;
    }

    let (scheduled_payment, cap) = match inputs.basis {
        PaymentBasis::Term(periods) => (
            level_payment(balance, periodic_rate, periods),
            periods.saturating_mul(2),
        ),
        PaymentBasis::FixedPayment(payment) => (payment, MAX_FIXED_PAYMENT_PERIODS),
    };

    let payment_target = scheduled_payment + extra_payment;
    if payment_target - balance * periodic_rate <= 0.0 {
        warn!(
            "payment {payment_target:.2} never covers periodic interest {:.2}; loan does not amortize",
            balance * periodic_rate
        );
        return ScheduleRun {
            status: PayoffStatus::NonAmortizing,
            scheduled_payment,
            capitalized_interest,
            schedule,
        };
    }

    let mut repayment_periods = 0_u32;
    while balance > MONEY_EPSILON && repayment_periods < cap {
        repayment_periods += 1;
        let interest = balance * periodic_rate;
        let due = balance + interest;
        let mut payment = payment_target.min(due);
        let mut ending_balance = due - payment;
        if ending_balance < MONEY_EPSILON {
            payment = due;
            ending_balance = 0.0;
        }
        schedule.push(Period {
            index: schedule.len() as u32 + 1,
            starting_balance: balance,
            interest_accrued: interest,
            payment,
            ending_balance,
            breakdown: None,
        });
        balance = ending_balance;
    }

    let status = if balance > MONEY_EPSILON {
        warn!("amortization stopped at its {cap}-period cap with {balance:.2} outstanding");
        PayoffStatus::NonAmortizing
    } else {
        PayoffStatus::PaidOff
    };
    debug!(
        "amortized over {} periods ({} grace), payment {scheduled_payment:.2}",
        schedule.len(),
        inputs.grace_periods
    );

    ScheduleRun {
        status,
        scheduled_payment,
        capitalized_interest,
        schedule,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::{prop_assert, prop_assume, proptest};

    fn assert_approx_tol(actual: f64, expected: f64, tol: f64) {
        assert!(
            (actual - expected).abs() <= tol,
            "expected {expected}, got {actual}, tolerance {tol}"
        );
    }

    fn sample_inputs() -> LoanInputs {
        LoanInputs {
            principal: 200_000.0,
            annual_rate: 0.06,
            frequency: Frequency::Monthly,
            basis: PaymentBasis::Term(360),
            extra_payment: 0.0,
            upfront_reduction: 0.0,
            grace_periods: 0,
            pay_interest_during_grace: false,
        }
    }

    fn card_inputs(extra_payment: f64) -> LoanInputs {
        LoanInputs {
            principal: 10_000.0,
            annual_rate: 0.20,
            basis: PaymentBasis::FixedPayment(300.0),
            extra_payment,
            ..sample_inputs()
        }
    }

    fn assert_schedule_balances(schedule: &[Period]) {
        for period in schedule {
            assert_approx_tol(
                period.ending_balance,
                period.starting_balance + period.interest_accrued - period.payment,
                1e-6,
            );
            assert!(period.ending_balance >= 0.0);
        }
    }

    #[test]
    fn level_payment_matches_standard_mortgage() {
        let result = amortize(&sample_inputs());
        assert_eq!(result.status, PayoffStatus::PaidOff);
        assert_approx_tol(result.scheduled_payment, 1_199.101_050_3, 1e-6);
        assert_eq!(result.periods_to_payoff, 360);
        assert_approx_tol(result.total_interest, 231_676.378, 0.05);
        assert_schedule_balances(&result.schedule);
    }

    #[test]
    fn zero_rate_divides_straight_line() {
        let inputs = LoanInputs {
            principal: 12_000.0,
            annual_rate: 0.0,
            basis: PaymentBasis::Term(24),
            ..sample_inputs()
        };
        let result = amortize(&inputs);
        assert_approx_tol(result.scheduled_payment, 500.0, 1e-9);
        assert_eq!(result.periods_to_payoff, 24);
        assert_approx_tol(result.total_interest, 0.0, 1e-9);
    }

    #[test]
    fn zero_principal_yields_empty_schedule() {
        let inputs = LoanInputs {
            principal: 0.0,
            ..sample_inputs()
        };
        let result = amortize(&inputs);
        assert_eq!(result.status, PayoffStatus::PaidOff);
        assert!(result.schedule.is_empty());
        assert_eq!(result.periods_to_payoff, 0);
    }

    #[test]
    fn upfront_reduction_covering_principal_yields_empty_schedule() {
        let inputs = LoanInputs {
            upfront_reduction: 250_000.0,
            ..sample_inputs()
        };
        let result = amortize(&inputs);
        assert!(result.schedule.is_empty());
        assert_approx_tol(result.financed_principal, 0.0, 1e-9);
    }

    #[test]
    fn credit_card_fixed_payment_scenario() {
        let result = amortize(&card_inputs(0.0));
        assert_eq!(result.status, PayoffStatus::PaidOff);
        assert_eq!(result.periods_to_payoff, 50);
        assert_approx_tol(result.total_interest, 4_718.19, 0.01);
        assert_approx_tol(result.total_paid, 14_718.19, 0.01);

        let faster = amortize(&card_inputs(200.0));
        assert_eq!(faster.periods_to_payoff, 25);
        assert_approx_tol(faster.total_interest, 2_266.07, 0.01);
        assert!(faster.total_interest < result.total_interest);
        assert_eq!(faster.periods_saved, 25);
        assert_approx_tol(faster.interest_saved, 4_718.19 - 2_266.07, 0.02);
    }

    #[test]
    fn extra_payment_larger_than_balance_shortens_final_period() {
        let inputs = LoanInputs {
            principal: 1_000.0,
            annual_rate: 0.12,
            basis: PaymentBasis::Term(12),
            extra_payment: 5_000.0,
            ..sample_inputs()
        };
        let result = amortize(&inputs);
        assert_eq!(result.periods_to_payoff, 1);
        let only = &result.schedule[0];
        assert_approx_tol(only.payment, 1_010.0, 1e-9);
        assert_approx_tol(only.ending_balance, 0.0, 0.0);
    }

    #[test]
    fn payment_below_interest_reports_non_amortizing() {
        let inputs = LoanInputs {
            principal: 10_000.0,
            annual_rate: 0.24,
            basis: PaymentBasis::FixedPayment(150.0),
            ..sample_inputs()
        };
        let result = amortize(&inputs);
        assert_eq!(result.status, PayoffStatus::NonAmortizing);
        assert!(result.schedule.is_empty());
    }

    #[test]
    fn unpaid_grace_interest_capitalizes_before_repayment() {
        let inputs = LoanInputs {
            principal: 10_000.0,
            annual_rate: 0.06,
            basis: PaymentBasis::Term(120),
            grace_periods: 6,
            ..sample_inputs()
        };
        let result = amortize(&inputs);
        assert_approx_tol(result.capitalized_interest, 300.0, 1e-9);
        let last_grace = &result.schedule[5];
        assert_approx_tol(last_grace.ending_balance, 10_300.0, 1e-9);
        assert_approx_tol(
            result.scheduled_payment,
            level_payment(10_300.0, 0.005, 120),
            1e-9,
        );
        assert_eq!(result.periods_to_payoff, 126);
        assert_schedule_balances(&result.schedule);
    }

    #[test]
    fn paid_grace_interest_leaves_balance_unchanged() {
        let inputs = LoanInputs {
            principal: 10_000.0,
            annual_rate: 0.06,
            basis: PaymentBasis::Term(120),
            grace_periods: 3,
            pay_interest_during_grace: true,
            ..sample_inputs()
        };
        let result = amortize(&inputs);
        assert_approx_tol(result.capitalized_interest, 0.0, 1e-12);
        for period in &result.schedule[..3] {
            assert_approx_tol(period.payment, 50.0, 1e-9);
            assert_approx_tol(period.ending_balance, 10_000.0, 1e-9);
        }
    }

    #[test]
    fn biweekly_frequency_uses_per_period_rate() {
        let inputs = LoanInputs {
            principal: 26_000.0,
            annual_rate: 0.052,
            frequency: Frequency::Biweekly,
            basis: PaymentBasis::Term(26),
            ..sample_inputs()
        };
        let result = amortize(&inputs);
        let first = &result.schedule[0];
        assert_approx_tol(first.interest_accrued, 52.0, 1e-9);
        assert_eq!(result.periods_to_payoff, 26);
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(48))]

        #[test]
        fn prop_interest_plus_principal_equals_payments(
            principal in 1_000u32..500_000,
            rate_bp in 0u32..2_500,
            term in 1u32..480,
            extra in 0u32..2_000,
            grace in 0u32..12,
            pay_grace_interest in proptest::bool::ANY
        ) {
            let inputs = LoanInputs {
                principal: principal as f64,
                annual_rate: rate_bp as f64 / 10_000.0,
                basis: PaymentBasis::Term(term),
                extra_payment: extra as f64,
                grace_periods: grace,
                pay_interest_during_grace: pay_grace_interest,
                ..sample_inputs()
            };
            let result = amortize(&inputs);
            prop_assert!(result.status == PayoffStatus::PaidOff);
            let conserved = result.total_interest + inputs.principal;
            prop_assert!((conserved - result.total_paid).abs() <= 1e-6 * conserved.max(1.0));
            prop_assert!(result.schedule.iter().all(|p| p.ending_balance >= 0.0));
            prop_assert!(result.periods_to_payoff <= term + grace);
        }

        #[test]
        fn prop_more_extra_never_costs_more(
            principal in 1_000u32..100_000,
            rate_bp in 1u32..3_000,
            payment_over_interest in 5u32..1_000,
            extra_low in 0u32..500,
            extra_step in 0u32..500
        ) {
            let annual_rate = rate_bp as f64 / 10_000.0;
            let payment = principal as f64 * annual_rate / 12.0 + payment_over_interest as f64;
            let base = LoanInputs {
                principal: principal as f64,
                annual_rate,
                basis: PaymentBasis::FixedPayment(payment),
                ..sample_inputs()
            };
            let low = amortize(&LoanInputs { extra_payment: extra_low as f64, ..base.clone() });
            let high = amortize(&LoanInputs {
                extra_payment: (extra_low + extra_step) as f64,
                ..base
            });
            prop_assume!(low.status == PayoffStatus::PaidOff);
            prop_assert!(high.status == PayoffStatus::PaidOff);
            prop_assert!(high.periods_to_payoff <= low.periods_to_payoff);
            prop_assert!(high.total_interest <= low.total_interest + 1e-6);
        }
    }
}
