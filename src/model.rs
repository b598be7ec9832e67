use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// Identifiant fort pour Worker
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WorkerId(String);

impl WorkerId {
    pub fn new<S: AsRef<str>>(s: S) -> Self {
        Self(s.as_ref().to_owned())
    }
    pub fn random() -> Self {
        Self(Uuid::new_v4().to_string())
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for WorkerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Intervalle de dates travaillables [start, end] inclus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkPeriod {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl WorkPeriod {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, String> {
        if end < start {
            return Err("work period end must not precede start".to_string());
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// Travailleur : immuable pendant une résolution.
///
/// `work_periods` vide signifie disponible sur toute la plage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Worker {
    pub id: WorkerId,
    #[serde(default = "default_work_percentage")]
    pub work_percentage: u8,
    pub target_shifts: u32,
    #[serde(default)]
    pub work_periods: Vec<WorkPeriod>,
    #[serde(default)]
    pub days_off: BTreeSet<NaiveDate>,
    #[serde(default)]
    pub mandatory_days: BTreeSet<NaiveDate>,
    #[serde(default)]
    pub incompatible_with: BTreeSet<WorkerId>,
    #[serde(default = "default_gap")]
    pub gap_between_shifts: u32,
    #[serde(default = "default_max_consecutive_weekends")]
    pub max_consecutive_weekends: u32,
}

fn default_work_percentage() -> u8 {
    100
}
fn default_gap() -> u32 {
    2
}
fn default_max_consecutive_weekends() -> u32 {
    3
}

impl Worker {
    pub fn new<S: Into<String>>(id: S, target_shifts: u32) -> Self {
        Self {
            id: WorkerId::new(id.into()),
            work_percentage: 100,
            target_shifts,
            work_periods: Vec::new(),
            days_off: BTreeSet::new(),
            mandatory_days: BTreeSet::new(),
            incompatible_with: BTreeSet::new(),
            gap_between_shifts: default_gap(),
            max_consecutive_weekends: default_max_consecutive_weekends(),
        }
    }

    pub fn with_work_percentage(mut self, percentage: u8) -> Self {
        self.work_percentage = percentage.clamp(1, 100);
        self
    }

    pub fn with_work_period(mut self, period: WorkPeriod) -> Self {
        self.work_periods.push(period);
        self
    }

    pub fn with_day_off(mut self, date: NaiveDate) -> Self {
        self.days_off.insert(date);
        self
    }

    pub fn with_mandatory_day(mut self, date: NaiveDate) -> Self {
        self.mandatory_days.insert(date);
        self
    }

    pub fn with_incompatible(mut self, other: &WorkerId) -> Self {
        self.incompatible_with.insert(other.clone());
        self
    }

    pub fn with_gap(mut self, gap: u32) -> Self {
        self.gap_between_shifts = gap;
        self
    }

    pub fn with_max_consecutive_weekends(mut self, cap: u32) -> Self {
        self.max_consecutive_weekends = cap;
        self
    }

    /// Disponible : dans une période de travail et hors jours d'absence.
    pub fn is_available(&self, date: NaiveDate) -> bool {
        if self.days_off.contains(&date) {
            return false;
        }
        self.work_periods.is_empty() || self.work_periods.iter().any(|p| p.contains(date))
    }

    pub fn is_mandatory(&self, date: NaiveDate) -> bool {
        self.mandatory_days.contains(&date)
    }

    /// Plafond dur : ceil(target × 1,10), arrondi vers le haut.
    pub fn max_allowed_shifts(&self) -> u32 {
        (self.target_shifts * 11).div_ceil(10)
    }
}

/// Réglages de résolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolvePolicy {
    #[serde(default = "default_tolerance")]
    pub tolerance_percent: f64,
    #[serde(default = "default_emergency_tolerance")]
    pub emergency_tolerance: f64,
    #[serde(default)]
    pub seed: u64,
    /// Budget mur d'horloge ; `None` = illimité.
    #[serde(default)]
    pub max_solve_millis: Option<u64>,
}

fn default_tolerance() -> f64 {
    8.0
}
fn default_emergency_tolerance() -> f64 {
    12.0
}

impl Default for SolvePolicy {
    fn default() -> Self {
        Self {
            tolerance_percent: default_tolerance(),
            emergency_tolerance: default_emergency_tolerance(),
            seed: 0,
            max_solve_millis: None,
        }
    }
}

/// Problème complet : plage, postes, fériés, effectif, réglages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RosterConfig {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub num_posts: usize,
    #[serde(default)]
    pub holidays: BTreeSet<NaiveDate>,
    pub workers: Vec<Worker>,
    #[serde(default)]
    pub policy: SolvePolicy,
}

impl RosterConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.end < self.start {
            return Err("end date must not precede start date".to_string());
        }
        if self.num_posts == 0 {
            return Err("num_posts must be at least 1".to_string());
        }
        if self.workers.is_empty() {
            return Err("at least one worker is required".to_string());
        }
        let mut seen = BTreeSet::new();
        for worker in &self.workers {
            if worker.id.as_str().is_empty() {
                return Err("worker id cannot be empty".to_string());
            }
            if !seen.insert(worker.id.clone()) {
                return Err(format!("duplicate worker id: {}", worker.id));
            }
            for period in &worker.work_periods {
                if period.end < period.start {
                    return Err(format!("invalid work period for worker {}", worker.id));
                }
            }
        }
        for worker in &self.workers {
            for other in &worker.incompatible_with {
                if !seen.contains(other) {
                    return Err(format!(
                        "worker {} declared incompatible with unknown worker {}",
                        worker.id, other
                    ));
                }
            }
        }
        Ok(())
    }

    pub fn num_days(&self) -> u32 {
        (self.end.signed_duration_since(self.start).num_days() + 1) as u32
    }
}
