mod amortize;
mod engine;
mod format;
mod growth;
mod inputs;
mod payoff;
mod retirement;
mod solver;
mod types;
mod units;

pub use amortize::{LoanInputs, LoanResult, PaymentBasis, amortize, level_payment};
pub use engine::{CalculationRequest, Calculator, EngineError, calculate, calculate_named};
pub use format::{format_money, format_percent, format_periods, format_years};
pub use growth::{ContributionTiming, GrowthInputs, GrowthResult, YearSnapshot, project_growth};
pub use inputs::{InputMap, InputValue, UnitMap, ValidationError};
pub use payoff::{
    Liability, MAX_PAYOFF_PERIODS, PayoffInputs, PayoffResult, PayoffRun, Strategy, allocate,
    priority_order, simulate_payoff,
};
pub use retirement::{
    ContributionLimits, DEFERRAL_LIMITS_2025, Longevity, RetirementInputs, RetirementResult,
    RetirementYear, funds_longevity, project_retirement,
};
pub use solver::{
    ContributionGoal, GoalSolveConfig, GoalSolveIteration, GoalSolveResult, GoalType,
    MAX_SOLVE_ITERATIONS, PayoffGoal, solve_contribution, solve_extra_payment,
};
pub use types::{
    CalculationResult, ContributionPlan, Frequency, LiabilityPeriod, MONEY_EPSILON, PayoffStatus,
    Period, RateSpec, ResultMetadata, Schedule, VestingSchedule,
};
pub use units::{CurrencyTable, Dimension, Normalizer, UnitError};
