use crate::model::WorkerId;
use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;

/// Régime de contraintes courant.
///
/// En `Strict`, les prédicats souples sont appliqués comme des prédicats
/// durs ; en `Relaxed` ils sont conditionnés au déficit du travailleur.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Mode {
    Strict,
    Relaxed,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Strict => f.write_str("strict"),
            Mode::Relaxed => f.write_str("relaxed"),
        }
    }
}

/// Palier de tolérance au sein du mode Relaxed. Transition à sens unique.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TolerancePhase {
    Phase1,
    Phase2,
}

impl TolerancePhase {
    /// Écart cible autorisé, en pourcentage.
    pub fn tolerance_percent(self) -> f64 {
        match self {
            TolerancePhase::Phase1 => 8.0,
            TolerancePhase::Phase2 => 12.0,
        }
    }
}

/// Raison de refus d'une affectation candidate. Chaque prédicat du vérificateur
/// renvoie `Err(Deny)` pour rester auditable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Deny {
    Unavailable,
    AlreadyAssignedThatDay,
    Incompatible(WorkerId),
    OverCap { cap: u32 },
    GapTooSmall { required: u32, actual: i64 },
    SameWeekdayPattern { days: i64 },
    MonthlyImbalance,
    WeekendImbalance,
    TooManyConsecutiveWeekends { cap: u32 },
    LastPostImbalance,
    UnknownWorker,
}

impl std::fmt::Display for Deny {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Deny::Unavailable => write!(f, "worker unavailable on that date"),
            Deny::AlreadyAssignedThatDay => write!(f, "worker already holds a post on that date"),
            Deny::Incompatible(other) => write!(f, "incompatible with assigned worker {other}"),
            Deny::OverCap { cap } => write!(f, "assignment would exceed hard cap of {cap}"),
            Deny::GapTooSmall { required, actual } => {
                write!(f, "gap of {actual} day(s) below required {required}")
            }
            Deny::SameWeekdayPattern { days } => {
                write!(f, "same-weekday pattern at {days} day(s)")
            }
            Deny::MonthlyImbalance => write!(f, "monthly load outside envelope"),
            Deny::WeekendImbalance => write!(f, "weekend load outside envelope"),
            Deny::TooManyConsecutiveWeekends { cap } => {
                write!(f, "more than {cap} consecutive weekends")
            }
            Deny::LastPostImbalance => write!(f, "last-post load outside envelope"),
            Deny::UnknownWorker => write!(f, "unknown worker id"),
        }
    }
}

/// Résultat d'un prédicat de contrainte.
pub type Check = Result<(), Deny>;

/// Issue typée d'une transformation. Jamais un succès silencieux :
/// `Blocked` trace les tentatives sur créneau obligatoire verrouillé.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransformOutcome {
    Accepted,
    Rejected(Deny),
    Blocked,
}

impl TransformOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, TransformOutcome::Accepted)
    }
}

/// Familles de violations recensées par l'optimiseur.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum ViolationKind {
    Target,
    Gap,
    Pattern,
    Monthly,
    Weekend,
}

impl std::fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ViolationKind::Target => f.write_str("target"),
            ViolationKind::Gap => f.write_str("gap"),
            ViolationKind::Pattern => f.write_str("pattern"),
            ViolationKind::Monthly => f.write_str("monthly"),
            ViolationKind::Weekend => f.write_str("weekend"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Violation {
    pub kind: ViolationKind,
    pub worker: WorkerId,
    pub date: Option<NaiveDate>,
    pub detail: String,
}

/// Problème de configuration signalé, jamais récupéré : le créneau
/// correspondant reste vide et le rapport final le mentionne.
/// `date` est absente pour les problèmes qui portent sur le travailleur
/// entier plutôt que sur un jour précis.
#[derive(Debug, Clone, Serialize)]
pub struct ConfigIssue {
    pub worker: WorkerId,
    pub date: Option<NaiveDate>,
    pub detail: String,
}

/// Stratégie d'ordonnancement des travailleurs pour la distribution initiale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderStrategy {
    Balanced,
    Seeded(u64),
    ByIdAsc,
    ByIdDesc,
    WorkloadPriority,
    Alternating,
}

impl OrderStrategy {
    /// Rotation des stratégies pour la tentative `attempt` (base 0).
    pub fn rotation(attempt: u32) -> Self {
        let i = u64::from(attempt);
        match attempt % 10 {
            0 => OrderStrategy::Balanced,
            1 => OrderStrategy::Seeded(42 + i),
            2 => OrderStrategy::ByIdAsc,
            3 => OrderStrategy::Seeded(100 + 7 * i),
            4 => OrderStrategy::ByIdDesc,
            5 => OrderStrategy::Seeded(200 + 13 * i),
            6 => OrderStrategy::WorkloadPriority,
            7 => OrderStrategy::Seeded(300 + 17 * i),
            8 => OrderStrategy::Alternating,
            _ => OrderStrategy::Seeded(400 + 23 * i),
        }
    }

    pub fn label(&self) -> String {
        match self {
            OrderStrategy::Balanced => "balanced".to_string(),
            OrderStrategy::Seeded(s) => format!("seed({s})"),
            OrderStrategy::ByIdAsc => "by_id_asc".to_string(),
            OrderStrategy::ByIdDesc => "by_id_desc".to_string(),
            OrderStrategy::WorkloadPriority => "workload_priority".to_string(),
            OrderStrategy::Alternating => "alternating".to_string(),
        }
    }
}

#[derive(Error, Debug)]
pub enum SolveError {
    #[error("invalid configuration: {0}")]
    Configuration(String),
    #[error("mode switch rejected: {0}")]
    ModeSwitch(&'static str),
    #[error("invariant broken during {op}: {detail}")]
    InvariantBroken { op: &'static str, detail: String },
    #[error("checkpoint does not match this problem: {0}")]
    CheckpointMismatch(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
