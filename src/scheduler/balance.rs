use crate::model::{Worker, WorkerId};
use serde::Serialize;
use std::collections::BTreeMap;

/// Bande de classement d'un écart à l'objectif.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BalanceBand {
    Within,
    Emergency,
    Critical,
    Extreme,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkerBalance {
    pub worker: WorkerId,
    pub target: u32,
    pub assigned: u32,
    pub deviation_percent: f64,
    pub band: BalanceBand,
}

#[derive(Debug, Clone, Serialize)]
pub struct BalanceSummary {
    pub per_worker: Vec<WorkerBalance>,
    pub max_deviation: f64,
    pub avg_deviation: f64,
    pub is_balanced: bool,
}

/// Recommandation de transfert (sur-affecté → sous-affecté), classée par
/// somme des écarts absolus puis par réduction L¹ attendue.
#[derive(Debug, Clone, Serialize)]
pub struct TransferRecommendation {
    pub from: WorkerId,
    pub to: WorkerId,
    pub shifts: u32,
    pub priority: f64,
    pub l1_reduction: i64,
}

/// Validateur d'équilibre : écarts, bandes, oracle de transfert.
#[derive(Debug, Clone)]
pub struct BalanceValidator {
    tolerance: f64,
    emergency: f64,
    critical: f64,
}

impl Default for BalanceValidator {
    fn default() -> Self {
        Self {
            tolerance: 8.0,
            emergency: 10.0,
            critical: 15.0,
        }
    }
}

impl BalanceValidator {
    pub fn new(tolerance: f64, emergency: f64) -> Self {
        Self {
            tolerance,
            emergency,
            critical: 15.0,
        }
    }

    pub fn deviation_percent(assigned: u32, target: u32) -> f64 {
        (f64::from(assigned) - f64::from(target)) / f64::from(target.max(1)) * 100.0
    }

    pub fn classify(&self, deviation_abs: f64) -> BalanceBand {
        if deviation_abs <= self.tolerance {
            BalanceBand::Within
        } else if deviation_abs <= self.emergency {
            BalanceBand::Emergency
        } else if deviation_abs <= self.critical {
            BalanceBand::Critical
        } else {
            BalanceBand::Extreme
        }
    }

    /// Valide l'équilibre global ; les objectifs nuls sont ignorés.
    pub fn validate(
        &self,
        counts: &BTreeMap<WorkerId, u32>,
        workers: &[Worker],
    ) -> BalanceSummary {
        let mut per_worker = Vec::new();
        let mut total = 0.0;
        let mut max = 0.0f64;

        for worker in workers {
            if worker.target_shifts == 0 {
                continue;
            }
            let assigned = counts.get(&worker.id).copied().unwrap_or(0);
            let deviation = Self::deviation_percent(assigned, worker.target_shifts);
            let band = self.classify(deviation.abs());
            total += deviation.abs();
            max = max.max(deviation.abs());
            per_worker.push(WorkerBalance {
                worker: worker.id.clone(),
                target: worker.target_shifts,
                assigned,
                deviation_percent: deviation,
                band,
            });
        }

        let considered = per_worker.len().max(1) as f64;
        let is_balanced = per_worker
            .iter()
            .all(|b| matches!(b.band, BalanceBand::Within | BalanceBand::Emergency));

        let summary = BalanceSummary {
            avg_deviation: total / considered,
            max_deviation: max,
            per_worker,
            is_balanced,
        };
        tracing::debug!(
            max = %format!("{:.1}%", summary.max_deviation),
            avg = %format!("{:.1}%", summary.avg_deviation),
            balanced = summary.is_balanced,
            "balance validation"
        );
        summary
    }

    /// Oracle de transfert : déplacer une garde de `from` vers `to` est
    /// valide ssi le côté le moins dévié ne se dégrade pas et que la
    /// déviation L¹ globale diminue.
    pub fn transfer_validity(
        &self,
        from_assigned: u32,
        from_target: u32,
        to_assigned: u32,
        to_target: u32,
    ) -> Result<(), String> {
        if from_assigned == 0 {
            return Err("source has no shift to give".to_string());
        }
        let from_dev = Self::deviation_percent(from_assigned, from_target).abs();
        let to_dev_after = Self::deviation_percent(to_assigned + 1, to_target).abs();
        if to_dev_after > from_dev + 1e-9 {
            return Err(format!(
                "destination would end at {to_dev_after:.1}%, above source's {from_dev:.1}%"
            ));
        }

        let l1_before = (i64::from(from_assigned) - i64::from(from_target)).abs()
            + (i64::from(to_assigned) - i64::from(to_target)).abs();
        let l1_after = (i64::from(from_assigned) - 1 - i64::from(from_target)).abs()
            + (i64::from(to_assigned) + 1 - i64::from(to_target)).abs();
        if l1_after >= l1_before {
            return Err(format!(
                "transfer would not reduce global deviation ({l1_before} -> {l1_after})"
            ));
        }
        Ok(())
    }

    /// Paires (sur-affecté, sous-affecté) classées par priorité décroissante.
    pub fn recommendations(
        &self,
        counts: &BTreeMap<WorkerId, u32>,
        workers: &[Worker],
    ) -> Vec<TransferRecommendation> {
        let summary = self.validate(counts, workers);
        let over: Vec<&WorkerBalance> = summary
            .per_worker
            .iter()
            .filter(|b| b.assigned > b.target)
            .collect();
        let under: Vec<&WorkerBalance> = summary
            .per_worker
            .iter()
            .filter(|b| b.assigned < b.target)
            .collect();

        let mut out = Vec::new();
        for o in &over {
            for u in &under {
                let excess = o.assigned - o.target;
                let shortage = u.target - u.assigned;
                let shifts = excess.min(shortage);
                if shifts == 0 {
                    continue;
                }
                let l1_before = i64::from(excess) + i64::from(shortage);
                let l1_after = i64::from(excess - 1) + i64::from(shortage - 1);
                out.push(TransferRecommendation {
                    from: o.worker.clone(),
                    to: u.worker.clone(),
                    shifts,
                    priority: o.deviation_percent.abs() + u.deviation_percent.abs(),
                    l1_reduction: l1_before - l1_after,
                });
            }
        }
        out.sort_by(|a, b| {
            b.priority
                .total_cmp(&a.priority)
                .then(b.l1_reduction.cmp(&a.l1_reduction))
                .then(a.from.cmp(&b.from))
                .then(a.to.cmp(&b.to))
        });
        out
    }
}
