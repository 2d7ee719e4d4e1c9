use log::{debug, warn};
use serde::{Deserialize, Serialize};

use super::types::{LiabilityPeriod, MONEY_EPSILON, PayoffStatus, Period, Schedule};

/// 360 × 2 monthly periods.
pub const MAX_PAYOFF_PERIODS: u32 = 720;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// Highest rate first.
    Avalanche,
    /// Lowest balance first.
    Snowball,
}

impl Strategy {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "avalanche" | "highest-rate" | "highest_rate" => Some(Strategy::Avalanche),
            "snowball" | "lowest-balance" | "lowest_balance" => Some(Strategy::Snowball),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Strategy::Avalanche => "avalanche",
            Strategy::Snowball => "snowball",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Liability {
    pub id: String,
    pub principal: f64,
    pub annual_rate: f64,
    pub minimum_payment: f64,
}

impl Liability {
    fn monthly_rate(&self) -> f64 {
        self.annual_rate / 12.0
    }
}

#[derive(Debug, Clone)]
pub struct PayoffInputs {
    pub liabilities: Vec<Liability>,
    pub strategy: Strategy,
    pub extra_payment: f64,
    pub roll_over_minimums: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PayoffRun {
    pub status: PayoffStatus,
    pub periods: u32,
    pub total_interest: f64,
    pub total_paid: f64,
    /// Input indices in the order they are targeted.
    pub priority: Vec<usize>,
    /// Period each liability reached zero, by input index.
    pub payoff_periods: Vec<Option<u32>>,
    pub schedule: Schedule,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PayoffResult {
    pub plan: PayoffRun,
    pub baseline: PayoffRun,
    pub periods_saved: Option<u32>,
    pub interest_saved: Option<f64>,
}

/// Runs the requested plan and, independently, the minimum-payments-only baseline.
pub fn allocate(inputs: &PayoffInputs) -> PayoffResult {
    let plan = simulate_payoff(
        &inputs.liabilities,
        inputs.strategy,
        inputs.extra_payment,
        inputs.roll_over_minimums,
    );
    let baseline = simulate_payoff(&inputs.liabilities, inputs.strategy, 0.0, false);

    let both_paid =
        plan.status == PayoffStatus::PaidOff && baseline.status == PayoffStatus::PaidOff;
    let periods_saved = both_paid.then(|| baseline.periods.saturating_sub(plan.periods));
    let interest_saved =
        both_paid.then(|| (baseline.total_interest - plan.total_interest).max(0.0));

    PayoffResult {
        plan,
        baseline,
        periods_saved,
        interest_saved,
    }
}

/// Priority is fixed from the starting balances and rates; ties fall back to input order.
pub fn priority_order(liabilities: &[Liability], strategy: Strategy) -> Vec<usize> {
    let mut order: Vec<usize> = (0..liabilities.len()).collect();
    order.sort_by(|&a, &b| {
        let (la, lb) = (&liabilities[a], &liabilities[b]);
        let primary = match strategy {
            Strategy::Avalanche => lb
                .annual_rate
                .total_cmp(&la.annual_rate)
                .then(la.principal.total_cmp(&lb.principal)),
            Strategy::Snowball => la
                .principal
                .total_cmp(&lb.principal)
                .then(lb.annual_rate.total_cmp(&la.annual_rate)),
        };
        primary.then(a.cmp(&b))
    });
    order
}

pub fn simulate_payoff(
    liabilities: &[Liability],
    strategy: Strategy,
    extra_payment: f64,
    roll_over_minimums: bool,
) -> PayoffRun {
    let priority = priority_order(liabilities, strategy);
    let mut balances: Vec<f64> = liabilities.iter().map(|l| l.principal.max(0.0)).collect();
    let mut open: Vec<bool> = balances.iter().map(|b| *b > MONEY_EPSILON).collect();
    let mut payoff_periods: Vec<Option<u32>> = open.iter().map(|o| (!o).then_some(0)).collect();
    for (idx, is_open) in open.iter().enumerate() {
        if !is_open {
            balances[idx] = 0.0;
        }
    }

    let mut pool = extra_payment.max(0.0);
    let mut schedule = Vec::new();
    let mut total_interest = 0.0;
    let mut total_paid = 0.0;
    let mut period = 0_u32;

    while open.iter().any(|o| *o) && period < MAX_PAYOFF_PERIODS {
        period += 1;
        let target = priority.iter().copied().find(|&idx| open[idx]);
        let mut freed_minimums = 0.0;
        let mut breakdown: Vec<LiabilityPeriod> = liabilities
            .iter()
            .map(|l| LiabilityPeriod {
                id: l.id.clone(),
                starting_balance: 0.0,
                interest_accrued: 0.0,
                payment: 0.0,
                ending_balance: 0.0,
                received_pool: false,
            })
            .collect();

        for &idx in &priority {
            if !open[idx] {
                continue;
            }
            let liability = &liabilities[idx];
            let starting_balance = balances[idx];
            let interest = starting_balance * liability.monthly_rate();
            let due = starting_balance + interest;
            let receives_pool = Some(idx) == target;

            let mut payment = liability.minimum_payment;
            if receives_pool {
                payment += pool;
            }
            payment = payment.min(due);
            let mut ending_balance = due - payment;
            if ending_balance < MONEY_EPSILON {
                payment = due;
                ending_balance = 0.0;
                open[idx] = false;
                payoff_periods[idx] = Some(period);
                if roll_over_minimums {
                    freed_minimums += liability.minimum_payment;
                }
            }

            balances[idx] = ending_balance;
            total_interest += interest;
            total_paid += payment;
            breakdown[idx] = LiabilityPeriod {
                id: liability.id.clone(),
                starting_balance,
                interest_accrued: interest,
                payment,
                ending_balance,
                received_pool: receives_pool && pool > 0.0,
            };
        }

        // Freed minimums reach the next target from the following period on.
        pool += freed_minimums;

        let period_row = Period {
            index: period,
            starting_balance: breakdown.iter().map(|b| b.starting_balance).sum(),
            interest_accrued: breakdown.iter().map(|b| b.interest_accrued).sum(),
            payment: breakdown.iter().map(|b| b.payment).sum(),
            ending_balance: breakdown.iter().map(|b| b.ending_balance).sum(),
            breakdown: Some(breakdown),
        };
        schedule.push(period_row);
    }

    let status = if open.iter().any(|o| *o) {
        let stuck: Vec<&str> = liabilities
            .iter()
            .zip(&open)
            .filter(|(_, o)| **o)
            .map(|(l, _)| l.id.as_str())
            .collect();
        warn!(
            "{} payoff hit the {MAX_PAYOFF_PERIODS}-period cap; still open: {}",
            strategy.as_str(),
            stuck.join(", ")
        );
        PayoffStatus::NonAmortizing
    } else {
        PayoffStatus::PaidOff
    };
    debug!(
        "{} payoff with pool {extra_payment:.2} finished after {period} periods",
        strategy.as_str()
    );

    PayoffRun {
        status,
        periods: period,
        total_interest,
        total_paid,
        priority,
        payoff_periods,
        schedule,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::{prop_assert, prop_assert_eq, proptest};

    fn assert_approx_tol(actual: f64, expected: f64, tol: f64) {
        assert!(
            (actual - expected).abs() <= tol,
            "expected {expected}, got {actual}, tolerance {tol}"
        );
    }

    fn liability(id: &str, principal: f64, annual_rate: f64, minimum_payment: f64) -> Liability {
        Liability {
            id: id.to_string(),
            principal,
            annual_rate,
            minimum_payment,
        }
    }

    fn two_cards() -> Vec<Liability> {
        vec![
            liability("card-a", 5_000.0, 0.22, 50.0),
            liability("card-b", 3_000.0, 0.15, 40.0),
        ]
    }

    fn pool_recipient(period: &Period) -> Option<String> {
        period
            .breakdown
            .as_ref()?
            .iter()
            .find(|b| b.received_pool)
            .map(|b| b.id.clone())
    }

    #[test]
    fn priority_order_follows_strategy() {
        let liabilities = vec![
            liability("a", 9_000.0, 0.10, 100.0),
            liability("b", 1_000.0, 0.05, 30.0),
            liability("c", 4_000.0, 0.25, 80.0),
        ];
        assert_eq!(priority_order(&liabilities, Strategy::Avalanche), vec![2, 0, 1]);
        assert_eq!(priority_order(&liabilities, Strategy::Snowball), vec![1, 2, 0]);
    }

    #[test]
    fn avalanche_pool_hands_off_the_period_after_payoff() {
        let run = simulate_payoff(&two_cards(), Strategy::Avalanche, 200.0, false);
        assert_eq!(run.status, PayoffStatus::PaidOff);
        assert_eq!(run.payoff_periods, vec![Some(26), Some(40)]);
        assert_eq!(run.periods, 40);

        for period in &run.schedule[..26] {
            assert_eq!(pool_recipient(period).as_deref(), Some("card-a"));
            let card_a = &period.breakdown.as_ref().unwrap()[0];
            if period.index < 26 {
                assert_approx_tol(card_a.payment, 250.0, 1e-9);
            }
        }
        // Period 26 retires card-a; card-b still only pays its minimum.
        let handoff = run.schedule[25].breakdown.as_ref().unwrap();
        assert_approx_tol(handoff[1].payment, 40.0, 1e-9);
        for period in &run.schedule[26..] {
            assert_eq!(pool_recipient(period).as_deref(), Some("card-b"));
        }
        assert_approx_tol(run.total_interest, 2_517.72, 0.01);
    }

    #[test]
    fn rolled_over_minimums_finish_sooner() {
        let run = simulate_payoff(&two_cards(), Strategy::Avalanche, 200.0, true);
        assert_eq!(run.payoff_periods, vec![Some(26), Some(37)]);
        assert_approx_tol(run.total_interest, 2_470.54, 0.01);
        let after = run.schedule[26].breakdown.as_ref().unwrap();
        assert!(after[1].payment > 289.99);
    }

    #[test]
    fn baseline_runs_without_pool_and_reports_savings() {
        let result = allocate(&PayoffInputs {
            liabilities: two_cards(),
            strategy: Strategy::Avalanche,
            extra_payment: 200.0,
            roll_over_minimums: true,
        });
        assert_eq!(result.plan.status, PayoffStatus::PaidOff);
        assert_eq!(result.baseline.status, PayoffStatus::NonAmortizing);
        assert_eq!(result.baseline.periods, MAX_PAYOFF_PERIODS);
        assert_eq!(result.periods_saved, None);
        assert_eq!(result.interest_saved, None);
    }

    #[test]
    fn savings_are_reported_when_baseline_amortizes() {
        let result = allocate(&PayoffInputs {
            liabilities: vec![
                liability("car", 12_000.0, 0.07, 350.0),
                liability("card", 2_500.0, 0.24, 120.0),
            ],
            strategy: Strategy::Avalanche,
            extra_payment: 300.0,
            roll_over_minimums: true,
        });
        assert_eq!(result.baseline.status, PayoffStatus::PaidOff);
        assert!(result.periods_saved.unwrap() > 0);
        assert!(result.interest_saved.unwrap() > 0.0);
    }

    #[test]
    fn minimum_below_interest_without_pool_is_non_amortizing() {
        let run = simulate_payoff(
            &[liability("stuck", 10_000.0, 0.30, 200.0)],
            Strategy::Avalanche,
            0.0,
            true,
        );
        assert_eq!(run.status, PayoffStatus::NonAmortizing);
        assert_eq!(run.periods, MAX_PAYOFF_PERIODS);
        assert_eq!(run.payoff_periods, vec![None]);
    }

    #[test]
    fn pool_rescues_a_liability_whose_minimum_trails_interest() {
        let run = simulate_payoff(
            &[liability("stuck", 10_000.0, 0.30, 200.0)],
            Strategy::Avalanche,
            150.0,
            true,
        );
        assert_eq!(run.status, PayoffStatus::PaidOff);
    }

    #[test]
    fn zero_balances_are_closed_from_the_start() {
        let run = simulate_payoff(
            &[liability("done", 0.0, 0.20, 50.0), liability("open", 100.0, 0.0, 50.0)],
            Strategy::Snowball,
            0.0,
            true,
        );
        assert_eq!(run.payoff_periods, vec![Some(0), Some(2)]);
        assert!(run.schedule.iter().all(|p| !p.breakdown.as_ref().unwrap()[0].received_pool));
    }

    #[test]
    fn avalanche_beats_snowball_on_typical_cards() {
        let liabilities = vec![
            liability("store", 1_200.0, 0.12, 40.0),
            liability("visa", 6_500.0, 0.24, 160.0),
            liability("loan", 4_000.0, 0.08, 120.0),
        ];
        let avalanche = simulate_payoff(&liabilities, Strategy::Avalanche, 250.0, true);
        let snowball = simulate_payoff(&liabilities, Strategy::Snowball, 250.0, true);
        assert!(avalanche.total_interest < snowball.total_interest);
    }

    #[test]
    fn snowball_can_win_when_an_early_payoff_frees_a_large_minimum() {
        // Retiring the small, high-minimum balance first frees cash sooner than the
        // rate advantage of the other liability is worth.
        let liabilities = vec![
            liability("a", 7_361.35, 0.0887, 217.01),
            liability("b", 2_374.89, 0.2690, 90.02),
            liability("c", 1_010.46, 0.0887, 193.51),
        ];
        let avalanche = simulate_payoff(&liabilities, Strategy::Avalanche, 14.55, true);
        let snowball = simulate_payoff(&liabilities, Strategy::Snowball, 14.55, true);
        assert!(snowball.total_interest < avalanche.total_interest);
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(32))]

        #[test]
        fn prop_balances_never_increase_and_close_at_zero(
            count in 1usize..6,
            seed_balances in proptest::collection::vec(100u32..25_000, 6),
            seed_rates in proptest::collection::vec(0u32..3_000, 6),
            seed_margins in proptest::collection::vec(5u32..300, 6),
            extra in 0u32..1_000,
            snowball in proptest::bool::ANY,
            roll_over in proptest::bool::ANY
        ) {
            let liabilities: Vec<Liability> = (0..count)
                .map(|i| {
                    let principal = seed_balances[i] as f64;
                    let annual_rate = seed_rates[i] as f64 / 10_000.0;
                    let minimum = principal * (annual_rate / 12.0 + 0.01) + seed_margins[i] as f64;
                    liability(&format!("d{i}"), principal, annual_rate, minimum)
                })
                .collect();
            let strategy = if snowball { Strategy::Snowball } else { Strategy::Avalanche };
            let run = simulate_payoff(&liabilities, strategy, extra as f64, roll_over);
            prop_assert!(run.status == PayoffStatus::PaidOff);
            let mut previous: Vec<f64> = liabilities.iter().map(|l| l.principal).collect();
            for period in &run.schedule {
                for (idx, row) in period.breakdown.as_ref().unwrap().iter().enumerate() {
                    prop_assert!(row.ending_balance >= 0.0);
                    prop_assert!(row.ending_balance <= previous[idx] + 1e-9);
                    previous[idx] = row.ending_balance;
                }
            }
            prop_assert!(previous.iter().all(|b| *b == 0.0));
            let principal: f64 = liabilities.iter().map(|l| l.principal).sum();
            prop_assert!((run.total_paid - run.total_interest - principal).abs() <= 1e-6 * principal);
        }

        #[test]
        fn prop_pool_follows_strategy_priority(
            count in 1usize..6,
            seed_balances in proptest::collection::vec(100u32..25_000, 6),
            seed_rates in proptest::collection::vec(0u32..3_000, 6),
            seed_margins in proptest::collection::vec(5u32..300, 6),
            extra in 1u32..1_000,
            snowball in proptest::bool::ANY,
            roll_over in proptest::bool::ANY
        ) {
            let liabilities: Vec<Liability> = (0..count)
                .map(|i| {
                    let principal = seed_balances[i] as f64;
                    let annual_rate = seed_rates[i] as f64 / 10_000.0;
                    let minimum = principal * (annual_rate / 12.0 + 0.01) + seed_margins[i] as f64;
                    liability(&format!("d{i}"), principal, annual_rate, minimum)
                })
                .collect();
            let strategy = if snowball { Strategy::Snowball } else { Strategy::Avalanche };
            let run = simulate_payoff(&liabilities, strategy, extra as f64, roll_over);

            let mut indices = run.priority.clone();
            indices.sort_unstable();
            prop_assert_eq!(indices, (0..count).collect::<Vec<_>>());
            for pair in run.priority.windows(2) {
                let (a, b) = (&liabilities[pair[0]], &liabilities[pair[1]]);
                let ordered = match strategy {
                    Strategy::Avalanche => {
                        a.annual_rate > b.annual_rate
                            || (a.annual_rate == b.annual_rate && a.principal <= b.principal)
                    }
                    Strategy::Snowball => {
                        a.principal < b.principal
                            || (a.principal == b.principal && a.annual_rate >= b.annual_rate)
                    }
                };
                prop_assert!(ordered);
            }

            for period in &run.schedule {
                let rows = period.breakdown.as_ref().unwrap();
                let first_open = run
                    .priority
                    .iter()
                    .copied()
                    .find(|&idx| rows[idx].starting_balance > 0.0);
                let recipients: Vec<usize> = rows
                    .iter()
                    .enumerate()
                    .filter(|(_, row)| row.received_pool)
                    .map(|(idx, _)| idx)
                    .collect();
                prop_assert_eq!(recipients, first_open.into_iter().collect::<Vec<_>>());
            }
        }

        #[test]
        fn prop_larger_pool_never_slows_payoff(
            count in 1usize..5,
            seed_balances in proptest::collection::vec(100u32..20_000, 5),
            seed_rates in proptest::collection::vec(0u32..3_000, 5),
            seed_margins in proptest::collection::vec(5u32..300, 5),
            extra_low in 0u32..800,
            extra_step in 0u32..800,
            snowball in proptest::bool::ANY,
            roll_over in proptest::bool::ANY
        ) {
            let liabilities: Vec<Liability> = (0..count)
                .map(|i| {
                    let principal = seed_balances[i] as f64;
                    let annual_rate = seed_rates[i] as f64 / 10_000.0;
                    let minimum = principal * (annual_rate / 12.0 + 0.01) + seed_margins[i] as f64;
                    liability(&format!("d{i}"), principal, annual_rate, minimum)
                })
                .collect();
            let strategy = if snowball { Strategy::Snowball } else { Strategy::Avalanche };
            let low = simulate_payoff(&liabilities, strategy, extra_low as f64, roll_over);
            let high = simulate_payoff(&liabilities, strategy, (extra_low + extra_step) as f64, roll_over);
            prop_assert!(high.periods <= low.periods);
            prop_assert!(high.total_interest <= low.total_interest + 1e-6);
        }
    }
}
