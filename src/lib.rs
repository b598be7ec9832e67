#![forbid(unsafe_code)]
//! Permanence — moteur de planification de gardes multi-postes (sans BD).
//!
//! - Phase obligatoire verrouillée, jamais remise en cause.
//! - Distribution initiale multi-tentatives en régime strict.
//! - Optimisation itérative en régime relâché, relaxation bornée.
//! - Rapport final : balance, tolérances, violations, métadonnées.
//! - Entrées/sorties JSON et CSV ; point de reprise optionnel.

pub mod calendar;
pub mod io;
pub mod model;
pub mod report;
pub mod scheduler;
pub mod storage;

pub use calendar::Calendar;
pub use model::{RosterConfig, SolvePolicy, WorkPeriod, Worker, WorkerId};
pub use report::{
    AttemptSummary, SolveReport, TerminationMeta, ToleranceReport, ViolationsReport, WorkerStats,
};
pub use scheduler::{
    BalanceBand, BalanceSummary, BalanceValidator, ConfigIssue, Deny, IterationPlan,
    IterativeOptimizer, Mode, OrderStrategy, ScheduleBuilder, Scheduler, SolveError, Snapshot,
    TolerancePhase, TransformOutcome, Violation, ViolationKind,
};
pub use storage::Checkpoint;
