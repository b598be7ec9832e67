use super::builder::ScheduleBuilder;
use super::types::{Violation, ViolationKind};
use crate::model::WorkerId;
use chrono::NaiveDate;
use rand::{rngs::SmallRng, Rng, SeedableRng};
use std::collections::BTreeMap;
use std::time::Instant;

/// Issue d'une passe d'optimisation.
#[derive(Debug, Clone)]
pub struct OptimizeOutcome {
    pub iterations_run: u32,
    pub final_violations: usize,
    pub converged: bool,
    pub stagnation: u32,
    pub budget_exhausted: bool,
}

#[derive(Debug, Clone)]
struct IterationRecord {
    violations: usize,
}

/// Optimiseur itératif : redistributions guidées par les violations,
/// perturbations bornées, détection de stagnation.
#[derive(Debug)]
pub struct IterativeOptimizer {
    max_iterations: u32,
    rng: SmallRng,
    stagnation: u32,
    history: Vec<IterationRecord>,
}

impl IterativeOptimizer {
    pub fn new(max_iterations: u32, seed: u64) -> Self {
        Self {
            max_iterations,
            rng: SmallRng::seed_from_u64(seed),
            stagnation: 0,
            history: Vec::new(),
        }
    }

    /// Boucle principale. `deadline` : coupe-circuit budget, contrôlé entre
    /// itérations uniquement ; l'arrêt rend toujours le meilleur état connu.
    pub fn optimize(
        &mut self,
        builder: &mut ScheduleBuilder,
        deadline: Option<Instant>,
    ) -> OptimizeOutcome {
        let mut best = builder.snapshot("optimizer-best");
        let mut best_violations = builder.violation_census().len();
        let mut budget_exhausted = false;
        let mut iterations_run = 0u32;

        for iteration in 1..=self.max_iterations {
            if let Some(limit) = deadline {
                if Instant::now() >= limit {
                    tracing::warn!(iteration, "optimizer budget exceeded, keeping best known state");
                    budget_exhausted = true;
                    break;
                }
            }
            iterations_run = iteration;

            let violations = builder.violation_census();
            let total = violations.len();
            tracing::debug!(iteration, violations = total, "optimizer iteration");

            if total == 0 {
                self.record(total);
                break;
            }
            if self.should_stop(total) {
                break;
            }

            let intensity = (0.3 + f64::from(self.stagnation) * 0.2).min(1.0);
            let before = builder.snapshot("optimizer-iteration");
            let assigned_before = builder.assigned_slots();

            let by_kind = count_by_kind(&violations);
            let transfer_budget = (total * 5).min(100);
            let mut moved = 0usize;
            if by_kind.get(&ViolationKind::Target).copied().unwrap_or(0) > 0
                || by_kind.get(&ViolationKind::Monthly).copied().unwrap_or(0) > 0
            {
                moved += builder.balance_workloads(transfer_budget);
            }
            if by_kind.get(&ViolationKind::Weekend).copied().unwrap_or(0) > 0 {
                moved += builder.rebalance_weekend_shifts(transfer_budget);
            }
            moved += self.perturb(builder, intensity);

            // Bilan net nul : les déplacements ne créent ni ne détruisent de
            // gardes (seuls les remplissages de créneaux vides le font).
            let assigned_after = builder.assigned_slots();
            if assigned_after != assigned_before {
                tracing::error!(
                    before = assigned_before,
                    after = assigned_after,
                    "move balance broken, reverting iteration"
                );
                builder.restore(&before);
                self.stagnation += 1;
                self.record(total);
                continue;
            }

            let after = builder.violation_census().len();
            if after < total {
                self.stagnation = 0;
                self.record(after);
                tracing::debug!(iteration, moved, before = total, after, "iteration accepted");
            } else {
                builder.restore(&before);
                self.stagnation += 1;
                self.record(total);
                tracing::debug!(iteration, stagnation = self.stagnation, "iteration reverted");
            }

            let current = builder.violation_census().len();
            if current < best_violations {
                best_violations = current;
                best = builder.snapshot("optimizer-best");
            }
        }

        let final_violations = builder.violation_census().len();
        if final_violations > best_violations {
            builder.restore(&best);
        }
        let final_violations = builder.violation_census().len();

        OptimizeOutcome {
            iterations_run,
            final_violations,
            converged: final_violations == 0,
            stagnation: self.stagnation,
            budget_exhausted,
        }
    }

    /// Critères d'arrêt : convergence, stagnation sur petit reliquat,
    /// amélioration moyenne insuffisante, plateau de trois itérations.
    fn should_stop(&self, current: usize) -> bool {
        if current <= 5 && self.stagnation >= 5 {
            tracing::debug!(current, "stopping: acceptable residual with stagnation");
            return true;
        }
        if self.history.len() >= 10 {
            let window = &self.history[self.history.len() - 10..];
            let first = window[0].violations as f64;
            let last = window[window.len() - 1].violations as f64;
            if (first - last) / 10.0 < 0.3 {
                tracing::debug!("stopping: average improvement below threshold");
                return true;
            }
        }
        if self.history.len() >= 3 {
            let tail = &self.history[self.history.len() - 3..];
            if tail.windows(2).all(|w| w[1].violations >= w[0].violations) {
                tracing::debug!("stopping: violations non-decreasing for 3 iterations");
                return true;
            }
        }
        false
    }

    /// Perturbations aléatoires bornées : échanges de paires validés,
    /// proportionnels à l'intensité.
    fn perturb(&mut self, builder: &mut ScheduleBuilder, intensity: f64) -> usize {
        let occupied: Vec<(NaiveDate, usize, WorkerId)> = builder
            .schedule()
            .iter()
            .flat_map(|(&date, posts)| {
                posts
                    .iter()
                    .enumerate()
                    .filter_map(move |(post, occ)| occ.clone().map(|id| (date, post, id)))
            })
            .collect();
        if occupied.len() < 2 {
            return 0;
        }

        let swaps = ((occupied.len() as f64 * intensity * 0.05).ceil() as usize).clamp(1, 20);
        let mut applied = 0usize;
        for _ in 0..swaps {
            let i = self.rng.gen_range(0..occupied.len());
            let j = self.rng.gen_range(0..occupied.len());
            let (d1, p1, w1) = occupied[i].clone();
            let (d2, p2, w2) = occupied[j].clone();
            if w1 == w2 {
                continue;
            }
            if builder.swap_assignments(d1, p1, d2, p2).is_accepted() {
                applied += 1;
            }
        }
        applied
    }

    fn record(&mut self, violations: usize) {
        self.history.push(IterationRecord { violations });
    }

    pub fn stagnation(&self) -> u32 {
        self.stagnation
    }
}

pub fn count_by_kind(violations: &[Violation]) -> BTreeMap<ViolationKind, usize> {
    let mut out = BTreeMap::new();
    for v in violations {
        *out.entry(v.kind).or_insert(0) += 1;
    }
    out
}
