use log::debug;
use serde::Serialize;

use super::growth::{GrowthInputs, project_growth};
use super::payoff::{PayoffInputs, simulate_payoff};
use super::types::{ContributionPlan, PayoffStatus};

/// Bisection halves the bracket each step; past this the bracket is below f64 resolution.
pub const MAX_SOLVE_ITERATIONS: u32 = 200;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum GoalType {
    RequiredContribution,
    MinimumExtraPayment,
}

#[derive(Debug, Clone, Copy)]
pub struct GoalSolveConfig {
    pub goal_type: GoalType,
    pub search_min: f64,
    pub search_max: f64,
    pub tolerance: f64,
    pub max_iterations: u32,
}

impl GoalSolveConfig {
    pub fn new(goal_type: GoalType, search_max: f64) -> Self {
        Self {
            goal_type,
            search_min: 0.0,
            search_max,
            tolerance: 0.01,
            max_iterations: 60,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalSolveIteration {
    pub iteration: u32,
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub candidate_value: f64,
    /// Balance reached, or periods taken, at the candidate.
    pub achieved: f64,
    pub meets_goal: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalSolveResult {
    pub goal_type: GoalType,
    pub search_min: f64,
    pub search_max: f64,
    pub tolerance: f64,
    pub max_iterations: u32,
    pub solved_value: Option<f64>,
    pub achieved: Option<f64>,
    pub iterations: Vec<GoalSolveIteration>,
    pub converged: bool,
    pub feasible: bool,
    pub message: String,
}

/// Level contribution per period needed for the projection to reach `target_balance`.
#[derive(Debug, Clone)]
pub struct ContributionGoal {
    pub growth: GrowthInputs,
    pub target_balance: f64,
    pub config: GoalSolveConfig,
}

/// Smallest pooled extra payment that clears every liability within `target_periods`.
#[derive(Debug, Clone)]
pub struct PayoffGoal {
    pub payoff: PayoffInputs,
    pub target_periods: u32,
    pub config: GoalSolveConfig,
}

#[derive(Debug, Clone, Copy)]
struct CandidateEval {
    achieved: f64,
    meets_goal: bool,
}

pub fn solve_contribution(goal: &ContributionGoal) -> Result<GoalSolveResult, String> {
    validate_config(goal.config)?;
    if !goal.target_balance.is_finite() || goal.target_balance <= 0.0 {
        return Err("target balance must be > 0".to_string());
    }

    let evaluate = |candidate: f64| {
        let inputs = GrowthInputs {
            contribution: ContributionPlan {
                amount_per_period: candidate.max(0.0),
                ..goal.growth.contribution
            },
            target_balance: None,
            ..goal.growth.clone()
        };
        let balance = project_growth(&inputs).final_balance;
        CandidateEval {
            achieved: balance,
            meets_goal: balance + 1e-9 >= goal.target_balance,
        }
    };
    Ok(solve_goal(goal.config, evaluate))
}

pub fn solve_extra_payment(goal: &PayoffGoal) -> Result<GoalSolveResult, String> {
    validate_config(goal.config)?;
    if goal.target_periods == 0 {
        return Err("target periods must be > 0".to_string());
    }

    let evaluate = |candidate: f64| {
        let run = simulate_payoff(
            &goal.payoff.liabilities,
            goal.payoff.strategy,
            candidate.max(0.0),
            goal.payoff.roll_over_minimums,
        );
        CandidateEval {
            achieved: run.periods as f64,
            meets_goal: run.status == PayoffStatus::PaidOff && run.periods <= goal.target_periods,
        }
    };
    Ok(solve_goal(goal.config, evaluate))
}

/// Bisection for the smallest value that meets a goal; `evaluate` must be monotone in it.
fn solve_goal(config: GoalSolveConfig, evaluate: impl Fn(f64) -> CandidateEval) -> GoalSolveResult {
    let mut iterations = Vec::with_capacity(config.max_iterations as usize);
    let low_eval = evaluate(config.search_min);
    let high_eval = evaluate(config.search_max);

    let mut solved_value = None;
    let mut achieved = None;
    let mut converged = false;
    let feasible;
    let message;

    if low_eval.meets_goal {
        solved_value = Some(config.search_min);
        achieved = Some(low_eval.achieved);
        converged = true;
        feasible = true;
        message = "Already meets target at lower search bound.".to_string();
    } else if !high_eval.meets_goal {
        feasible = false;
        message = "No feasible value found within the search bounds.".to_string();
    } else {
        let mut lo = config.search_min;
        let mut hi = config.search_max;
        let mut hi_achieved = high_eval.achieved;
        let mut it = 0;
        while it < config.max_iterations {
            it += 1;
            let mid = (lo + hi) * 0.5;
            let eval = evaluate(mid);
            iterations.push(GoalSolveIteration {
                iteration: it,
                lower_bound: lo,
                upper_bound: hi,
                candidate_value: mid,
                achieved: eval.achieved,
                meets_goal: eval.meets_goal,
            });

            if eval.meets_goal {
                hi = mid;
                hi_achieved = eval.achieved;
            } else {
                lo = mid;
            }

            if (hi - lo).abs() <= config.tolerance {
                converged = true;
                break;
            }
        }
        solved_value = Some(hi);
        achieved = Some(hi_achieved);
        feasible = true;
        message = match (config.goal_type, converged) {
            (GoalType::RequiredContribution, true) => "Solved required contribution.".to_string(),
            (GoalType::MinimumExtraPayment, true) => "Solved minimum extra payment.".to_string(),
            (_, false) => {
                "Reached max iterations before tolerance was met; returning best estimate."
                    .to_string()
            }
        };
    }

    debug!(
        "{:?} goal solve: {} iterations, feasible {feasible}, value {solved_value:?}",
        config.goal_type,
        iterations.len()
    );

    GoalSolveResult {
        goal_type: config.goal_type,
        search_min: config.search_min,
        search_max: config.search_max,
        tolerance: config.tolerance,
        max_iterations: config.max_iterations,
        solved_value,
        achieved,
        iterations,
        converged,
        feasible,
        message,
    }
}

fn validate_config(config: GoalSolveConfig) -> Result<(), String> {
    if !config.search_min.is_finite() || !config.search_max.is_finite() {
        return Err("search bounds must be finite".to_string());
    }
    if config.search_min < 0.0 {
        return Err("search_min must be >= 0".to_string());
    }
    if config.search_max <= config.search_min {
        return Err("search_max must be greater than search_min".to_string());
    }
    if !config.tolerance.is_finite() || config.tolerance <= 0.0 {
        return Err("tolerance must be > 0".to_string());
    }
    if config.max_iterations == 0 || config.max_iterations > MAX_SOLVE_ITERATIONS {
        return Err(format!("max_iterations must be between 1 and {MAX_SOLVE_ITERATIONS}"));
    }
    Ok(())
}
