use super::types::{ConfigIssue, Mode, SolveError, TolerancePhase};
use crate::calendar::{days_inclusive, Calendar};
use crate::model::{RosterConfig, SolvePolicy, Worker, WorkerId};
use chrono::{Datelike, NaiveDate};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

/// Constructeur de planning : propriétaire exclusif du planning, des
/// compteurs dérivés et de l'ensemble verrouillé des obligatoires.
///
/// Toute mutation passe par ses transformations ; les appelants externes
/// n'obtiennent que des instantanés immuables.
#[derive(Debug, Clone)]
pub struct ScheduleBuilder {
    pub(super) calendar: Calendar,
    pub(super) start: NaiveDate,
    pub(super) end: NaiveDate,
    pub(super) num_posts: usize,
    pub(super) workers: Vec<Worker>,
    pub(super) index: BTreeMap<WorkerId, usize>,
    pub(super) incompat: BTreeMap<WorkerId, BTreeSet<WorkerId>>,
    pub(super) policy: SolvePolicy,
    pub(super) month_days: BTreeMap<(i32, u32), u32>,
    pub(super) total_days: u32,
    pub(super) special_days: u32,

    pub(super) schedule: BTreeMap<NaiveDate, Vec<Option<WorkerId>>>,
    pub(super) assignments: BTreeMap<WorkerId, BTreeSet<NaiveDate>>,
    pub(super) shift_counts: BTreeMap<WorkerId, u32>,
    pub(super) weekend_counts: BTreeMap<WorkerId, u32>,
    pub(super) last_post_counts: BTreeMap<WorkerId, u32>,
    pub(super) monthly_counts: BTreeMap<WorkerId, BTreeMap<(i32, u32), u32>>,
    pub(super) locked_mandatory: BTreeSet<(WorkerId, NaiveDate)>,

    pub(super) mode: Mode,
    pub(super) phase: TolerancePhase,
    pub(super) relaxed_transformed: bool,
    pub(super) blocked_attempts: u64,
}

/// Photographie restaurable de l'état du constructeur.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub id: String,
    pub label: String,
    pub score: f64,
    pub empty_slots: usize,
    schedule: BTreeMap<NaiveDate, Vec<Option<WorkerId>>>,
    assignments: BTreeMap<WorkerId, BTreeSet<NaiveDate>>,
    shift_counts: BTreeMap<WorkerId, u32>,
    weekend_counts: BTreeMap<WorkerId, u32>,
    last_post_counts: BTreeMap<WorkerId, u32>,
    monthly_counts: BTreeMap<WorkerId, BTreeMap<(i32, u32), u32>>,
    locked_mandatory: BTreeSet<(WorkerId, NaiveDate)>,
    mode: Mode,
    phase: TolerancePhase,
    relaxed_transformed: bool,
}

impl ScheduleBuilder {
    pub fn new(config: &RosterConfig) -> Result<Self, SolveError> {
        config.validate().map_err(SolveError::Configuration)?;

        let calendar = Calendar::new(config.holidays.clone());
        let days = days_inclusive(config.start, config.end);

        let mut month_days: BTreeMap<(i32, u32), u32> = BTreeMap::new();
        let mut special_days = 0u32;
        for &day in &days {
            *month_days.entry(Calendar::month_key(day)).or_insert(0) += 1;
            if calendar.is_special(day) {
                special_days += 1;
            }
        }

        let mut index = BTreeMap::new();
        for (i, worker) in config.workers.iter().enumerate() {
            index.insert(worker.id.clone(), i);
        }

        // Clôture symétrique des incompatibilités.
        let mut incompat: BTreeMap<WorkerId, BTreeSet<WorkerId>> = BTreeMap::new();
        for worker in &config.workers {
            for other in &worker.incompatible_with {
                incompat
                    .entry(worker.id.clone())
                    .or_default()
                    .insert(other.clone());
                incompat
                    .entry(other.clone())
                    .or_default()
                    .insert(worker.id.clone());
            }
        }

        let schedule = days
            .iter()
            .map(|&d| (d, vec![None; config.num_posts]))
            .collect();

        let mut assignments = BTreeMap::new();
        let mut shift_counts = BTreeMap::new();
        let mut weekend_counts = BTreeMap::new();
        let mut last_post_counts = BTreeMap::new();
        let mut monthly_counts = BTreeMap::new();
        for worker in &config.workers {
            assignments.insert(worker.id.clone(), BTreeSet::new());
            shift_counts.insert(worker.id.clone(), 0);
            weekend_counts.insert(worker.id.clone(), 0);
            last_post_counts.insert(worker.id.clone(), 0);
            monthly_counts.insert(worker.id.clone(), BTreeMap::new());
        }

        Ok(Self {
            calendar,
            start: config.start,
            end: config.end,
            num_posts: config.num_posts,
            workers: config.workers.clone(),
            index,
            incompat,
            policy: config.policy.clone(),
            month_days,
            total_days: days.len() as u32,
            special_days,
            schedule,
            assignments,
            shift_counts,
            weekend_counts,
            last_post_counts,
            monthly_counts,
            locked_mandatory: BTreeSet::new(),
            mode: Mode::Strict,
            phase: TolerancePhase::Phase1,
            relaxed_transformed: false,
            blocked_attempts: 0,
        })
    }

    // ----- accès -----

    pub fn schedule(&self) -> &BTreeMap<NaiveDate, Vec<Option<WorkerId>>> {
        &self.schedule
    }

    pub fn workers(&self) -> &[Worker] {
        &self.workers
    }

    pub fn num_posts(&self) -> usize {
        self.num_posts
    }

    pub fn locked_mandatory(&self) -> &BTreeSet<(WorkerId, NaiveDate)> {
        &self.locked_mandatory
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn tolerance_phase(&self) -> TolerancePhase {
        self.phase
    }

    pub fn policy(&self) -> &SolvePolicy {
        &self.policy
    }

    pub fn blocked_attempts(&self) -> u64 {
        self.blocked_attempts
    }

    pub(super) fn worker(&self, id: &WorkerId) -> Option<&Worker> {
        self.index.get(id).map(|&i| &self.workers[i])
    }

    pub fn shift_count(&self, id: &WorkerId) -> u32 {
        self.shift_counts.get(id).copied().unwrap_or(0)
    }

    pub fn weekend_count(&self, id: &WorkerId) -> u32 {
        self.weekend_counts.get(id).copied().unwrap_or(0)
    }

    pub fn last_post_count(&self, id: &WorkerId) -> u32 {
        self.last_post_counts.get(id).copied().unwrap_or(0)
    }

    pub fn assignments_of(&self, id: &WorkerId) -> Option<&BTreeSet<NaiveDate>> {
        self.assignments.get(id)
    }

    /// target − count ; positif = sous l'objectif.
    pub fn deficit(&self, id: &WorkerId) -> i64 {
        let target = self.worker(id).map(|w| w.target_shifts).unwrap_or(0);
        i64::from(target) - i64::from(self.shift_count(id))
    }

    pub fn total_slots(&self) -> usize {
        self.schedule.len() * self.num_posts
    }

    pub fn assigned_slots(&self) -> usize {
        self.schedule
            .values()
            .map(|posts| posts.iter().filter(|p| p.is_some()).count())
            .sum()
    }

    pub fn empty_slots(&self) -> Vec<(NaiveDate, usize)> {
        let mut out = Vec::new();
        for (&date, posts) in &self.schedule {
            for (post, slot) in posts.iter().enumerate() {
                if slot.is_none() {
                    out.push((date, post));
                }
            }
        }
        out
    }

    pub fn coverage_percent(&self) -> f64 {
        let total = self.total_slots();
        if total == 0 {
            return 100.0;
        }
        self.assigned_slots() as f64 / total as f64 * 100.0
    }

    /// Charge mensuelle attendue pour un travailleur.
    pub(super) fn expected_month_load(&self, worker: &Worker, month: (i32, u32)) -> f64 {
        let days = self.month_days.get(&month).copied().unwrap_or(0);
        f64::from(worker.target_shifts) * f64::from(days) / f64::from(self.total_days.max(1))
    }

    /// Part attendue de jours spéciaux pour un travailleur.
    pub(super) fn expected_weekend_load(&self, worker: &Worker) -> f64 {
        f64::from(worker.target_shifts) * f64::from(self.special_days)
            / f64::from(self.total_days.max(1))
    }

    pub(super) fn post_of(&self, id: &WorkerId, date: NaiveDate) -> Option<usize> {
        self.schedule
            .get(&date)
            .and_then(|posts| posts.iter().position(|p| p.as_ref() == Some(id)))
    }

    // ----- bascule de régime -----

    pub fn enable_relaxed(&mut self) {
        if self.mode != Mode::Relaxed {
            tracing::info!("constraint regime switched to relaxed");
            self.mode = Mode::Relaxed;
        }
    }

    /// Retour en Strict : interdit après la première transformation Relaxed.
    pub fn enable_strict(&mut self) -> Result<(), SolveError> {
        if self.mode == Mode::Relaxed && self.relaxed_transformed {
            return Err(SolveError::ModeSwitch(
                "strict regime cannot be restored after relaxed transforms",
            ));
        }
        self.mode = Mode::Strict;
        Ok(())
    }

    /// Escalade Phase1 → Phase2 ; sens unique.
    pub fn escalate_phase2(&mut self) {
        if self.phase == TolerancePhase::Phase1 {
            tracing::warn!("tolerance escalated to phase 2 (±12%)");
            self.phase = TolerancePhase::Phase2;
        }
    }

    pub(super) fn note_transform(&mut self) {
        if self.mode == Mode::Relaxed {
            self.relaxed_transformed = true;
        }
    }

    // ----- écritures élémentaires -----

    /// Écrit `worker` dans un créneau vide et met à jour tous les compteurs.
    /// Transactionnel : soit l'écriture et les compteurs, soit rien.
    pub(super) fn place(&mut self, id: &WorkerId, date: NaiveDate, post: usize) {
        let slot = self
            .schedule
            .get_mut(&date)
            .and_then(|posts| posts.get_mut(post))
            .expect("slot out of range");
        debug_assert!(slot.is_none(), "place over occupied slot");
        *slot = Some(id.clone());

        self.assignments.entry(id.clone()).or_default().insert(date);
        *self.shift_counts.entry(id.clone()).or_insert(0) += 1;
        if self.calendar.is_special(date) {
            *self.weekend_counts.entry(id.clone()).or_insert(0) += 1;
        }
        if post == self.num_posts - 1 {
            *self.last_post_counts.entry(id.clone()).or_insert(0) += 1;
        }
        *self
            .monthly_counts
            .entry(id.clone())
            .or_default()
            .entry(Calendar::month_key(date))
            .or_insert(0) += 1;
    }

    /// Vide un créneau et rend l'occupant. Ne consulte PAS l'oracle de
    /// protection : l'appelant doit l'avoir fait.
    pub(super) fn clear_slot(&mut self, date: NaiveDate, post: usize) -> Option<WorkerId> {
        let slot = self
            .schedule
            .get_mut(&date)
            .and_then(|posts| posts.get_mut(post))?;
        let id = slot.take()?;

        if let Some(dates) = self.assignments.get_mut(&id) {
            dates.remove(&date);
        }
        if let Some(count) = self.shift_counts.get_mut(&id) {
            *count = count.saturating_sub(1);
        }
        if self.calendar.is_special(date) {
            if let Some(count) = self.weekend_counts.get_mut(&id) {
                *count = count.saturating_sub(1);
            }
        }
        if post == self.num_posts - 1 {
            if let Some(count) = self.last_post_counts.get_mut(&id) {
                *count = count.saturating_sub(1);
            }
        }
        if let Some(months) = self.monthly_counts.get_mut(&id) {
            if let Some(count) = months.get_mut(&Calendar::month_key(date)) {
                *count = count.saturating_sub(1);
            }
        }
        Some(id)
    }

    // ----- oracle de protection -----

    /// Point de passage obligé de toute mutation : refuse de toucher une
    /// affectation obligatoire verrouillée et trace la tentative bloquée.
    pub fn can_modify(&mut self, id: &WorkerId, date: NaiveDate, op: &'static str) -> bool {
        let locked = self.locked_mandatory.contains(&(id.clone(), date))
            || self.worker(id).map(|w| w.is_mandatory(date)).unwrap_or(false);
        if locked {
            self.blocked_attempts += 1;
            tracing::warn!(op, worker = %id, date = %date, "blocked: protected mandatory assignment");
        }
        !locked
    }

    // ----- phase obligatoire -----

    /// Place les gardes obligatoires et les verrouille. Les prédicats souples
    /// ne s'appliquent pas ici : l'obligatoire domine.
    pub fn assign_mandatory_guards(&mut self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();

        // Un espacement plus grand que la plage rend tout second créneau
        // inatteignable : erreur de configuration, pas de récupération.
        for worker in &self.workers {
            if worker.target_shifts > 1
                && worker.gap_between_shifts >= self.total_days
            {
                issues.push(ConfigIssue {
                    worker: worker.id.clone(),
                    date: None,
                    detail: format!(
                        "gap of {} day(s) cannot fit {} shifts in a {}-day range",
                        worker.gap_between_shifts, worker.target_shifts, self.total_days
                    ),
                });
            }
        }

        let mut pairs: Vec<(WorkerId, NaiveDate)> = self
            .workers
            .iter()
            .flat_map(|w| {
                w.mandatory_days
                    .iter()
                    .map(move |&d| (w.id.clone(), d))
            })
            .filter(|(_, d)| *d >= self.start && *d <= self.end)
            .collect();
        pairs.sort();

        for (id, date) in pairs {
            let worker = match self.worker(&id) {
                Some(w) => w.clone(),
                None => continue,
            };

            if !worker.is_available(date) {
                issues.push(ConfigIssue {
                    worker: id.clone(),
                    date: Some(date),
                    detail: "mandatory day falls on a day off or outside work periods"
                        .to_string(),
                });
                continue;
            }

            if self.assignments.get(&id).map(|d| d.contains(&date)) == Some(true) {
                continue;
            }

            // Incompatibilité stricte par date, même entre obligatoires :
            // le premier placé reste, le second est signalé.
            let occupants: Vec<WorkerId> = self
                .schedule
                .get(&date)
                .map(|posts| posts.iter().flatten().cloned().collect())
                .unwrap_or_default();
            let conflict = occupants.iter().find(|other| {
                self.incompat
                    .get(&id)
                    .map(|set| set.contains(other))
                    .unwrap_or(false)
            });
            if let Some(other) = conflict {
                issues.push(ConfigIssue {
                    worker: id.clone(),
                    date: Some(date),
                    detail: format!(
                        "mandatory day clashes with incompatible worker {other} already placed"
                    ),
                });
                continue;
            }

            let free_post = self
                .schedule
                .get(&date)
                .and_then(|posts| posts.iter().position(|p| p.is_none()));
            match free_post {
                Some(post) => {
                    self.place(&id, date, post);
                    self.locked_mandatory.insert((id.clone(), date));
                    tracing::debug!(worker = %id, date = %date, post, "mandatory guard locked");
                }
                None => {
                    issues.push(ConfigIssue {
                        worker: id.clone(),
                        date: Some(date),
                        detail: "no free post left for mandatory day".to_string(),
                    });
                }
            }
        }

        debug_assert!(self
            .locked_mandatory
            .iter()
            .all(|(id, date)| self.post_of(id, *date).is_some()));

        if !issues.is_empty() {
            tracing::warn!(count = issues.len(), "mandatory phase reported configuration issues");
        }
        issues
    }

    // ----- instantanés -----

    pub fn snapshot(&self, label: &str) -> Snapshot {
        Snapshot {
            id: Uuid::new_v4().to_string(),
            label: label.to_string(),
            score: self.overall_score(),
            empty_slots: self.empty_slots().len(),
            schedule: self.schedule.clone(),
            assignments: self.assignments.clone(),
            shift_counts: self.shift_counts.clone(),
            weekend_counts: self.weekend_counts.clone(),
            last_post_counts: self.last_post_counts.clone(),
            monthly_counts: self.monthly_counts.clone(),
            locked_mandatory: self.locked_mandatory.clone(),
            mode: self.mode,
            phase: self.phase,
            relaxed_transformed: self.relaxed_transformed,
        }
    }

    pub fn restore(&mut self, snapshot: &Snapshot) {
        self.schedule = snapshot.schedule.clone();
        self.assignments = snapshot.assignments.clone();
        self.shift_counts = snapshot.shift_counts.clone();
        self.weekend_counts = snapshot.weekend_counts.clone();
        self.last_post_counts = snapshot.last_post_counts.clone();
        self.monthly_counts = snapshot.monthly_counts.clone();
        self.locked_mandatory = snapshot.locked_mandatory.clone();
        self.mode = snapshot.mode;
        self.phase = snapshot.phase;
        self.relaxed_transformed = snapshot.relaxed_transformed;
    }

    // ----- métriques -----

    /// Somme des écarts absolus à l'objectif, en nombre de gardes.
    pub fn workload_imbalance(&self) -> f64 {
        self.workers
            .iter()
            .map(|w| (i64::from(self.shift_count(&w.id)) - i64::from(w.target_shifts)).abs())
            .sum::<i64>() as f64
    }

    /// Étendue max−min des compteurs de jours spéciaux.
    pub fn weekend_imbalance(&self) -> f64 {
        let counts: Vec<u32> = self
            .workers
            .iter()
            .filter(|w| w.target_shifts > 0)
            .map(|w| self.weekend_count(&w.id))
            .collect();
        match (counts.iter().min(), counts.iter().max()) {
            (Some(&min), Some(&max)) => f64::from(max - min),
            _ => 0.0,
        }
    }

    pub fn overall_score(&self) -> f64 {
        self.coverage_percent() * 100.0
            - self.workload_imbalance() * 50.0
            - self.weekend_imbalance() * 30.0
    }

    // ----- vérification d'invariants -----

    /// Vérifie I1 à I7 ; les paires touchant une date obligatoire verrouillée
    /// sont exemptées de la vérification d'espacement et de motif 7/14.
    pub fn verify_invariants(&self) -> Result<(), String> {
        // I1 : cohérence planning ↔ affectations dérivées.
        for (&date, posts) in &self.schedule {
            if posts.len() != self.num_posts {
                return Err(format!("I1: post vector length mismatch on {date}"));
            }
            let mut seen_today: BTreeSet<&WorkerId> = BTreeSet::new();
            for id in posts.iter().flatten() {
                if !seen_today.insert(id) {
                    return Err(format!("I1: worker {id} holds two posts on {date}"));
                }
                if self.assignments.get(id).map(|d| d.contains(&date)) != Some(true) {
                    return Err(format!("I1: {id}@{date} missing from derived assignments"));
                }
            }
        }
        for (id, dates) in &self.assignments {
            for &date in dates {
                if self.post_of(id, date).is_none() {
                    return Err(format!("I1: derived assignment {id}@{date} not in schedule"));
                }
            }
            if self.shift_count(id) as usize != dates.len() {
                return Err(format!("I1: shift counter out of sync for {id}"));
            }
        }

        // I2 : tout verrou obligatoire reste matérialisé.
        for (id, date) in &self.locked_mandatory {
            if self.post_of(id, *date).is_none() {
                return Err(format!("I2: locked mandatory {id}@{date} missing"));
            }
        }

        for (&date, posts) in &self.schedule {
            let present: Vec<&WorkerId> = posts.iter().flatten().collect();
            for (i, a) in present.iter().enumerate() {
                // I3 : jamais deux incompatibles le même jour.
                for b in present.iter().skip(i + 1) {
                    if self
                        .incompat
                        .get(*a)
                        .map(|set| set.contains(*b))
                        .unwrap_or(false)
                    {
                        return Err(format!("I3: {a} and {b} share {date}"));
                    }
                }
                // I4 : disponibilité (sauf créneau obligatoire verrouillé).
                if !self.locked_mandatory.contains(&((*a).clone(), date)) {
                    if let Some(worker) = self.worker(a) {
                        if !worker.is_available(date) {
                            return Err(format!("I4: {a} assigned on unavailable {date}"));
                        }
                    }
                }
            }
        }

        for worker in &self.workers {
            let count = self.shift_count(&worker.id);
            let locked = self
                .locked_mandatory
                .iter()
                .filter(|(id, _)| *id == worker.id)
                .count() as u32;
            // I5 : plafond dur, l'obligatoire seul peut le dépasser.
            if count > worker.max_allowed_shifts().max(locked) {
                return Err(format!(
                    "I5: {} at {count} exceeds cap {}",
                    worker.id,
                    worker.max_allowed_shifts()
                ));
            }

            let dates: Vec<NaiveDate> = self
                .assignments
                .get(&worker.id)
                .map(|d| d.iter().copied().collect())
                .unwrap_or_default();
            let deficit = self.deficit(&worker.id);
            let allowed_gap = if self.mode == Mode::Relaxed && deficit >= 3 {
                worker.gap_between_shifts.saturating_sub(1)
            } else {
                worker.gap_between_shifts
            };
            let pattern_allowed = self.mode == Mode::Relaxed
                && deficit as f64 > 0.10 * f64::from(worker.target_shifts.max(1));

            for window in dates.windows(2) {
                let (d1, d2) = (window[0], window[1]);
                if self.pair_is_locked(&worker.id, d1, d2) {
                    continue;
                }
                let diff = d2.signed_duration_since(d1).num_days();
                // I6 : espacement minimal.
                if diff < i64::from(allowed_gap) {
                    return Err(format!(
                        "I6: {} gap {diff} < {allowed_gap} ({d1}..{d2})",
                        worker.id
                    ));
                }
            }
            // I7 : motif 7/14 même jour de semaine.
            if !pattern_allowed {
                for (i, &d1) in dates.iter().enumerate() {
                    for &d2 in dates.iter().skip(i + 1) {
                        if self.pair_is_locked(&worker.id, d1, d2) {
                            continue;
                        }
                        let diff = d2.signed_duration_since(d1).num_days();
                        if (diff == 7 || diff == 14)
                            && d1.weekday() == d2.weekday()
                        {
                            return Err(format!(
                                "I7: {} pattern {diff}d ({d1}..{d2})",
                                worker.id
                            ));
                        }
                    }
                }
            }
        }

        Ok(())
    }

    fn pair_is_locked(&self, id: &WorkerId, d1: NaiveDate, d2: NaiveDate) -> bool {
        self.locked_mandatory.contains(&(id.clone(), d1))
            || self.locked_mandatory.contains(&(id.clone(), d2))
    }

    // ----- point de reprise -----

    /// Capture un point de reprise persistable (planning + verrous).
    pub fn checkpoint(&self) -> crate::storage::Checkpoint {
        crate::storage::Checkpoint::new(self.schedule.clone(), self.locked_mandatory.clone())
    }

    /// Recharge un point de reprise : les compteurs dérivés sont reconstruits
    /// depuis le planning, puis les invariants revérifiés.
    pub fn restore_checkpoint(
        &mut self,
        checkpoint: &crate::storage::Checkpoint,
    ) -> Result<(), SolveError> {
        for (date, posts) in &checkpoint.schedule {
            if *date < self.start || *date > self.end {
                return Err(SolveError::CheckpointMismatch(format!(
                    "date {date} outside the configured range"
                )));
            }
            if posts.len() != self.num_posts {
                return Err(SolveError::CheckpointMismatch(format!(
                    "post count mismatch on {date}"
                )));
            }
            for id in posts.iter().flatten() {
                if self.worker(id).is_none() {
                    return Err(SolveError::CheckpointMismatch(format!(
                        "unknown worker {id}"
                    )));
                }
            }
        }

        for (&date, _) in &self.schedule.clone() {
            for post in 0..self.num_posts {
                self.clear_slot(date, post);
            }
        }
        self.locked_mandatory.clear();

        for (date, posts) in &checkpoint.schedule {
            for (post, slot) in posts.iter().enumerate() {
                if let Some(id) = slot {
                    self.place(&id.clone(), *date, post);
                }
            }
        }
        self.locked_mandatory = checkpoint.locked_mandatory.clone();

        self.verify_invariants()
            .map_err(|detail| SolveError::InvariantBroken {
                op: "restore_checkpoint",
                detail,
            })
    }

    /// Résumé structuré du planning courant.
    pub fn log_summary(&self, stage: &str) {
        tracing::info!(
            stage,
            coverage = %format!("{:.1}%", self.coverage_percent()),
            empty = self.empty_slots().len(),
            locked = self.locked_mandatory.len(),
            workload_imbalance = self.workload_imbalance(),
            weekend_imbalance = self.weekend_imbalance(),
            "schedule summary"
        );
    }
}
