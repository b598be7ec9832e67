mod adaptive;
mod advanced;
mod balance;
mod builder;
mod constraints;
mod optimizer;
mod rebalance;
mod score;
mod types;

pub use adaptive::IterationPlan;
pub use balance::{
    BalanceBand, BalanceSummary, BalanceValidator, TransferRecommendation, WorkerBalance,
};
pub use builder::{ScheduleBuilder, Snapshot};
pub use optimizer::{IterativeOptimizer, OptimizeOutcome};
pub use types::{
    Check, ConfigIssue, Deny, Mode, OrderStrategy, SolveError, TolerancePhase, TransformOutcome,
    Violation, ViolationKind,
};

use crate::model::RosterConfig;
use crate::report::{
    violations_report, AttemptSummary, SolveReport, TerminationMeta, ToleranceReport, WorkerStats,
};
use std::time::{Duration, Instant};

/// Plafond de la boucle finale d'équilibrage strict.
const FINAL_BALANCE_LOOPS: u32 = 50;

/// Orchestrateur : enchaîne les phases, garde les sauvegardes des
/// obligatoires, agrège le rapport. Seul composant à basculer le régime.
#[derive(Debug)]
pub struct Scheduler {
    config: RosterConfig,
    builder: ScheduleBuilder,
}

/// Clé de comparaison lexicographique des tentatives initiales.
#[derive(Debug, Clone, Copy)]
struct AttemptKey {
    overall: f64,
    empty: usize,
    work_imbalance: f64,
    weekend_imbalance: f64,
}

impl AttemptKey {
    fn better_than(&self, other: &AttemptKey) -> bool {
        self.overall
            .total_cmp(&other.overall)
            .then(other.empty.cmp(&self.empty))
            .then(other.work_imbalance.total_cmp(&self.work_imbalance))
            .then(other.weekend_imbalance.total_cmp(&self.weekend_imbalance))
            .is_gt()
    }
}

impl Scheduler {
    pub fn new(config: RosterConfig) -> Result<Self, SolveError> {
        let builder = ScheduleBuilder::new(&config)?;
        Ok(Self { config, builder })
    }

    pub fn builder(&self) -> &ScheduleBuilder {
        &self.builder
    }

    /// Déroule la séquence complète et fige le planning dans le rapport.
    pub fn solve(&mut self) -> Result<SolveReport, SolveError> {
        let started = Instant::now();
        let deadline = self
            .config
            .policy
            .max_solve_millis
            .map(|ms| started + Duration::from_millis(ms));
        let mut mode_history = vec!["strict".to_string()];

        // Phase 2 : verrouillage des obligatoires, prédicats souples exclus.
        let config_issues = self.builder.assign_mandatory_guards();
        self.builder
            .verify_invariants()
            .map_err(|detail| SolveError::InvariantBroken {
                op: "assign_mandatory_guards",
                detail,
            })?;
        self.builder.log_summary("after mandatory assignment");

        // Phase 2.5 : distribution initiale multi-tentatives en Strict.
        let plan = IterationPlan::for_problem(
            self.config.workers.len(),
            self.config.num_posts,
            self.config.num_days(),
            &self.config.workers,
        );
        let attempts = self.initial_distribution(plan.initial_attempts);
        self.builder.log_summary("after initial distribution");

        // Phase 3 : optimisation itérative en Relaxed.
        self.builder.enable_relaxed();
        mode_history.push("relaxed_phase1".to_string());
        let mut optimizer =
            IterativeOptimizer::new(plan.max_iterations, self.config.policy.seed);
        let mut outcome = optimizer.optimize(&mut self.builder, deadline);

        // Escalade de tolérance : une seule passe supplémentaire en Phase2.
        if self.builder.coverage_percent() < 95.0 && outcome.final_violations > 0 {
            self.builder.escalate_phase2();
            mode_history.push("relaxed_phase2".to_string());
            let mut second_pass = IterativeOptimizer::new(
                plan.max_iterations,
                self.config.policy.seed.wrapping_add(0x9e37_79b9),
            );
            let second = second_pass.optimize(&mut self.builder, deadline);
            outcome.iterations_run += second.iterations_run;
            outcome.final_violations = second.final_violations;
            outcome.converged = second.converged;
            outcome.stagnation = second.stagnation;
            outcome.budget_exhausted |= second.budget_exhausted;
        }

        // Phase 3.5 : poussée finale si des créneaux restent vides.
        if !self.builder.empty_slots().is_empty() {
            let gained = advanced::final_push(&mut self.builder, plan.fill_attempts, deadline);
            tracing::info!(gained, "advanced distribution engine finished");
        }

        // Finalisation : boucle d'équilibrage strict, repli sur le meilleur
        // état connu si la boucle dégrade le score.
        let pre_finalization = self.builder.snapshot("pre-finalization");
        for _ in 0..FINAL_BALANCE_LOOPS {
            let changed = self.builder.balance_workloads(10)
                + self.builder.adjust_last_post_distribution(10)
                + self.builder.balance_weekday_distribution(10);
            if changed == 0 {
                break;
            }
        }
        self.builder.redistribute_excess_shifts();
        if self.builder.overall_score() < pre_finalization.score {
            tracing::warn!("finalization degraded the schedule, falling back to best state");
            self.builder.restore(&pre_finalization);
        }
        self.builder.log_summary("final schedule");

        // Phase 4 : validation et rapport.
        if self.builder.tolerance_phase() == TolerancePhase::Phase2
            && !mode_history.iter().any(|m| m == "relaxed_phase2")
        {
            mode_history.push("relaxed_phase2".to_string());
        }
        Ok(self.build_report(
            started,
            mode_history,
            attempts,
            outcome,
            config_issues,
        ))
    }

    /// Tentatives initiales : restauration de la sauvegarde (obligatoires
    /// compris) avant chaque essai, rotation des stratégies d'ordre,
    /// sélection lexicographique.
    fn initial_distribution(&mut self, initial_attempts: u32) -> Vec<AttemptSummary> {
        let base = self.builder.snapshot("post-mandatory");
        let mut attempts = Vec::new();
        let mut best: Option<(AttemptKey, Snapshot, usize)> = None;

        for attempt in 0..initial_attempts {
            // La restauration ramène aussi le régime Strict et les verrous.
            self.builder.restore(&base);

            let strategy = OrderStrategy::rotation(attempt);
            let order = self.builder.worker_order(strategy);
            let filled = self.builder.fill_empty_shifts(&order);

            let key = AttemptKey {
                overall: self.builder.overall_score(),
                empty: self.builder.empty_slots().len(),
                work_imbalance: self.builder.workload_imbalance(),
                weekend_imbalance: self.builder.weekend_imbalance(),
            };
            tracing::info!(
                attempt,
                strategy = %strategy.label(),
                filled,
                empty = key.empty,
                score = %format!("{:.1}", key.overall),
                "initial distribution attempt"
            );
            attempts.push(AttemptSummary {
                attempt,
                strategy: strategy.label(),
                score: key.overall,
                empty_slots: key.empty,
                work_imbalance: key.work_imbalance,
                weekend_imbalance: key.weekend_imbalance,
                selected: false,
            });

            let is_better = best
                .as_ref()
                .map(|(bk, _, _)| key.better_than(bk))
                .unwrap_or(true);
            if is_better {
                best = Some((
                    key,
                    self.builder.snapshot("best-attempt"),
                    attempt as usize,
                ));
            }
        }

        if let Some((_, snapshot, index)) = best {
            self.builder.restore(&snapshot);
            if let Some(summary) = attempts.get_mut(index) {
                summary.selected = true;
            }
        }
        attempts
    }

    fn build_report(
        &self,
        started: Instant,
        mode_history: Vec<String>,
        attempts: Vec<AttemptSummary>,
        outcome: OptimizeOutcome,
        config_issues: Vec<ConfigIssue>,
    ) -> SolveReport {
        let validator = BalanceValidator::new(
            self.config.policy.tolerance_percent,
            self.config.policy.emergency_tolerance,
        );

        let worker_stats: Vec<WorkerStats> = self
            .config
            .workers
            .iter()
            .map(|w| {
                let assigned = self.builder.shift_count(&w.id);
                let deviation = BalanceValidator::deviation_percent(assigned, w.target_shifts);
                WorkerStats {
                    worker: w.id.clone(),
                    target: w.target_shifts,
                    assigned,
                    weekend_count: self.builder.weekend_count(&w.id),
                    last_post_count: self.builder.last_post_count(&w.id),
                    deviation_percent: deviation,
                    band: validator.classify(deviation.abs()),
                }
            })
            .collect();

        let phase2 = self.builder.tolerance_phase() == TolerancePhase::Phase2;
        let tolerance = ToleranceReport::from_stats(
            &worker_stats,
            self.builder.tolerance_phase().tolerance_percent(),
            phase2,
        );

        let schedule = self
            .builder
            .schedule()
            .iter()
            .map(|(&date, posts)| {
                let row = posts
                    .iter()
                    .map(|slot| {
                        slot.as_ref()
                            .map(|id| id.as_str().to_string())
                            .unwrap_or_else(|| crate::report::EMPTY_SENTINEL.to_string())
                    })
                    .collect();
                (date, row)
            })
            .collect();

        SolveReport {
            schedule,
            worker_stats,
            violations: violations_report(self.builder.violation_census()),
            tolerance,
            termination: TerminationMeta {
                mode_history,
                attempts,
                iterations_run: outcome.iterations_run,
                converged: outcome.converged,
                stagnation: outcome.stagnation,
                coverage_percent: self.builder.coverage_percent(),
                blocked_attempts: self.builder.blocked_attempts(),
                budget_exhausted: outcome.budget_exhausted,
                elapsed_millis: started.elapsed().as_millis() as u64,
            },
            config_issues,
        }
    }
}
