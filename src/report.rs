use crate::model::WorkerId;
use crate::scheduler::{BalanceBand, ConfigIssue, Violation};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;

/// Sentinelle émise pour un créneau resté vide.
pub const EMPTY_SENTINEL: &str = "empty";

/// Statistiques finales par travailleur.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerStats {
    pub worker: WorkerId,
    pub target: u32,
    pub assigned: u32,
    pub weekend_count: u32,
    pub last_post_count: u32,
    pub deviation_percent: f64,
    pub band: BalanceBand,
}

/// Recensement des violations, par famille et en détail.
#[derive(Debug, Clone, Serialize, Default)]
pub struct ViolationsReport {
    pub total: usize,
    pub by_kind: BTreeMap<String, usize>,
    pub details: Vec<Violation>,
}

/// Verdict de conformité aux tolérances, émis en fin de résolution.
#[derive(Debug, Clone, Serialize)]
pub struct ToleranceReport {
    pub tolerance_percent: f64,
    pub within_count: usize,
    pub outside: Vec<WorkerId>,
    pub all_within: bool,
    pub phase2_activated: bool,
}

impl ToleranceReport {
    pub fn from_stats(stats: &[WorkerStats], tolerance_percent: f64, phase2: bool) -> Self {
        let outside: Vec<WorkerId> = stats
            .iter()
            .filter(|s| s.deviation_percent.abs() > tolerance_percent + 1e-9)
            .map(|s| s.worker.clone())
            .collect();
        Self {
            tolerance_percent,
            within_count: stats.len() - outside.len(),
            all_within: outside.is_empty(),
            outside,
            phase2_activated: phase2,
        }
    }
}

/// Résumé d'une tentative de distribution initiale.
#[derive(Debug, Clone, Serialize)]
pub struct AttemptSummary {
    pub attempt: u32,
    pub strategy: String,
    pub score: f64,
    pub empty_slots: usize,
    pub work_imbalance: f64,
    pub weekend_imbalance: f64,
    pub selected: bool,
}

/// Métadonnées de terminaison de l'orchestrateur.
#[derive(Debug, Clone, Serialize)]
pub struct TerminationMeta {
    pub mode_history: Vec<String>,
    pub attempts: Vec<AttemptSummary>,
    pub iterations_run: u32,
    pub converged: bool,
    pub stagnation: u32,
    pub coverage_percent: f64,
    pub blocked_attempts: u64,
    pub budget_exhausted: bool,
    pub elapsed_millis: u64,
}

/// Document de sortie complet d'une résolution.
#[derive(Debug, Clone, Serialize)]
pub struct SolveReport {
    pub schedule: BTreeMap<NaiveDate, Vec<String>>,
    pub worker_stats: Vec<WorkerStats>,
    pub violations: ViolationsReport,
    pub tolerance: ToleranceReport,
    pub termination: TerminationMeta,
    pub config_issues: Vec<ConfigIssue>,
}

impl SolveReport {
    /// Code de sortie du processus :
    /// 0 couverture ≥ 95 % sans violation, 1 avec violations,
    /// 2 couverture < 95 %, 3 erreur de configuration.
    pub fn exit_code(&self) -> i32 {
        if !self.config_issues.is_empty() {
            return 3;
        }
        if self.termination.coverage_percent < 95.0 {
            return 2;
        }
        if self.violations.total > 0 {
            return 1;
        }
        0
    }

    pub fn coverage_percent(&self) -> f64 {
        self.termination.coverage_percent
    }
}

pub fn violations_report(details: Vec<Violation>) -> ViolationsReport {
    let mut by_kind = BTreeMap::new();
    for v in &details {
        *by_kind.entry(v.kind.to_string()).or_insert(0) += 1;
    }
    ViolationsReport {
        total: details.len(),
        by_kind,
        details,
    }
}
