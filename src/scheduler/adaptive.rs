use crate::model::Worker;

/// Compteurs d'itérations dérivés de la complexité du problème.
/// Ce sont des indications ; l'orchestrateur peut les ajuster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IterationPlan {
    pub initial_attempts: u32,
    pub max_iterations: u32,
    pub fill_attempts: u32,
}

impl IterationPlan {
    pub fn for_problem(num_workers: usize, num_posts: usize, num_days: u32, workers: &[Worker]) -> Self {
        let complexity = num_workers as f64
            * num_posts as f64
            * f64::from(num_days)
            * (1.0 + restriction_factor(workers));

        let (initial_attempts, max_iterations, fill_attempts) = if complexity < 1_000.0 {
            (3, 20, 8)
        } else if complexity < 5_000.0 {
            (5, 30, 10)
        } else if complexity < 15_000.0 {
            (7, 40, 12)
        } else {
            (10, 50, 16)
        };

        tracing::debug!(
            complexity = %format!("{complexity:.0}"),
            initial_attempts,
            max_iterations,
            fill_attempts,
            "iteration plan"
        );
        Self {
            initial_attempts,
            max_iterations,
            fill_attempts,
        }
    }
}

/// Petite pénalité par classe de contrainte active dans l'effectif.
fn restriction_factor(workers: &[Worker]) -> f64 {
    let mut factor = 0.0;
    if workers.iter().any(|w| !w.incompatible_with.is_empty()) {
        factor += 0.1;
    }
    if workers.iter().any(|w| !w.days_off.is_empty()) {
        factor += 0.1;
    }
    if workers.iter().any(|w| !w.mandatory_days.is_empty()) {
        factor += 0.1;
    }
    if workers.iter().any(|w| !w.work_periods.is_empty()) {
        factor += 0.1;
    }
    if workers.iter().any(|w| w.gap_between_shifts > 1) {
        factor += 0.1;
    }
    if workers.iter().any(|w| w.work_percentage < 100) {
        factor += 0.1;
    }
    factor
}
