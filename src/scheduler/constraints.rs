use super::builder::ScheduleBuilder;
use super::types::{Check, Deny, Mode, Violation, ViolationKind};
use crate::calendar::Calendar;
use crate::model::{Worker, WorkerId};
use chrono::{Datelike, NaiveDate};

/// Vérificateur de contraintes : prédicats durs (toujours) et souples
/// (durs en Strict, conditionnés au déficit en Relaxed).
impl ScheduleBuilder {
    /// Conjonction complète des prédicats pour une affectation candidate.
    pub fn can_assign(&self, id: &WorkerId, date: NaiveDate, post: usize) -> Check {
        let worker = self.worker(id).ok_or(Deny::UnknownWorker)?.clone();

        self.check_availability(&worker, date)?;
        self.check_single_post_per_day(id, date)?;
        self.check_incompatibility(id, date)?;
        self.check_target_cap(&worker)?;

        self.check_min_gap(&worker, date)?;
        self.check_pattern_7_14(&worker, date)?;
        self.check_monthly_balance(&worker, date)?;
        self.check_weekend_balance(&worker, date)?;
        self.check_last_post(&worker, date, post)?;
        Ok(())
    }

    // ----- prédicats durs -----

    /// H1 : période de travail et jours d'absence.
    pub(super) fn check_availability(&self, worker: &Worker, date: NaiveDate) -> Check {
        if worker.is_available(date) {
            Ok(())
        } else {
            Err(Deny::Unavailable)
        }
    }

    /// Un seul poste par jour et par travailleur.
    pub(super) fn check_single_post_per_day(&self, id: &WorkerId, date: NaiveDate) -> Check {
        match self.assignments_of(id) {
            Some(dates) if dates.contains(&date) => Err(Deny::AlreadyAssignedThatDay),
            _ => Ok(()),
        }
    }

    /// H2 : aucun incompatible déjà présent ce jour-là.
    pub(super) fn check_incompatibility(&self, id: &WorkerId, date: NaiveDate) -> Check {
        let Some(pairs) = self.incompat.get(id) else {
            return Ok(());
        };
        if let Some(posts) = self.schedule.get(&date) {
            for occupant in posts.iter().flatten() {
                if pairs.contains(occupant) {
                    return Err(Deny::Incompatible(occupant.clone()));
                }
            }
        }
        Ok(())
    }

    /// H3 : plafond dur ceil(target × 1,10), identique dans les deux modes.
    pub(super) fn check_target_cap(&self, worker: &Worker) -> Check {
        let cap = worker.max_allowed_shifts();
        if self.shift_count(&worker.id) + 1 > cap {
            Err(Deny::OverCap { cap })
        } else {
            Ok(())
        }
    }

    // ----- prédicats souples -----

    /// S1 : espacement minimal ; en Relaxed l'espacement peut perdre un jour
    /// ssi le déficit du travailleur est ≥ 3.
    pub(super) fn check_min_gap(&self, worker: &Worker, date: NaiveDate) -> Check {
        let required = if self.mode == Mode::Relaxed && self.deficit(&worker.id) >= 3 {
            worker.gap_between_shifts.saturating_sub(1)
        } else {
            worker.gap_between_shifts
        };
        if let Some(dates) = self.assignments_of(&worker.id) {
            for &other in dates {
                let diff = (date.signed_duration_since(other)).num_days().abs();
                if diff < i64::from(required) {
                    return Err(Deny::GapTooSmall {
                        required,
                        actual: diff,
                    });
                }
            }
        }
        Ok(())
    }

    /// S2 : motif 7/14 jours même jour de semaine ; toléré en Relaxed
    /// uniquement quand le déficit dépasse 10 % de l'objectif.
    pub(super) fn check_pattern_7_14(&self, worker: &Worker, date: NaiveDate) -> Check {
        if self.mode == Mode::Relaxed {
            let deficit = self.deficit(&worker.id) as f64;
            if deficit > 0.10 * f64::from(worker.target_shifts.max(1)) {
                return Ok(());
            }
        }
        if let Some(dates) = self.assignments_of(&worker.id) {
            for &other in dates {
                let diff = (date.signed_duration_since(other)).num_days().abs();
                if (diff == 7 || diff == 14) && date.weekday() == other.weekday() {
                    return Err(Deny::SameWeekdayPattern { days: diff });
                }
            }
        }
        Ok(())
    }

    /// S3 : enveloppe mensuelle. L'enveloppe relâchée n'est jamais plus
    /// serrée que la stricte.
    pub(super) fn check_monthly_balance(&self, worker: &Worker, date: NaiveDate) -> Check {
        let month = Calendar::month_key(date);
        let current = self
            .monthly_counts
            .get(&worker.id)
            .and_then(|m| m.get(&month).copied())
            .unwrap_or(0);
        let expected = self.expected_month_load(worker, month);
        let bound = match self.mode {
            Mode::Strict => expected + 1.0,
            Mode::Relaxed => (expected + 1.0).max(expected * 1.10),
        };
        if f64::from(current + 1) > bound + 1e-9 {
            Err(Deny::MonthlyImbalance)
        } else {
            Ok(())
        }
    }

    /// S4 : enveloppe de jours spéciaux + plafond de week-ends consécutifs.
    pub(super) fn check_weekend_balance(&self, worker: &Worker, date: NaiveDate) -> Check {
        if !self.calendar.is_special(date) {
            return Ok(());
        }
        let expected = self.expected_weekend_load(worker);
        let bound = match self.mode {
            Mode::Strict => expected + 1.0,
            Mode::Relaxed => (expected + 1.0).max(expected * 1.10),
        };
        if f64::from(self.weekend_count(&worker.id) + 1) > bound + 1e-9 {
            return Err(Deny::WeekendImbalance);
        }

        // Fenêtre glissante de week-ends travaillés.
        let cap = worker.max_consecutive_weekends;
        if cap > 0 {
            let mut weeks: Vec<i64> = self
                .assignments_of(&worker.id)
                .map(|dates| {
                    dates
                        .iter()
                        .filter(|&&d| self.calendar.is_special(d))
                        .map(|&d| Calendar::week_index(self.start, d))
                        .collect()
                })
                .unwrap_or_default();
            weeks.push(Calendar::week_index(self.start, date));
            weeks.sort_unstable();
            weeks.dedup();

            let mut run = 1u32;
            let mut longest = 1u32;
            for pair in weeks.windows(2) {
                if pair[1] == pair[0] + 1 {
                    run += 1;
                    longest = longest.max(run);
                } else {
                    run = 1;
                }
            }
            if longest > cap {
                return Err(Deny::TooManyConsecutiveWeekends { cap });
            }
        }
        Ok(())
    }

    /// S5 : équilibre du dernier poste.
    pub(super) fn check_last_post(&self, worker: &Worker, _date: NaiveDate, post: usize) -> Check {
        if post != self.num_posts - 1 || self.num_posts == 1 {
            return Ok(());
        }
        let count_after = f64::from(self.shift_count(&worker.id) + 1);
        let expected = count_after / self.num_posts as f64;
        let slack = match self.mode {
            Mode::Strict => 1.0,
            Mode::Relaxed => 2.0,
        };
        if f64::from(self.last_post_count(&worker.id) + 1) > expected + slack + 1e-9 {
            Err(Deny::LastPostImbalance)
        } else {
            Ok(())
        }
    }

    // ----- recensement des violations -----

    /// Recense les violations du planning courant, par famille. Les paires
    /// couvertes par un verrou obligatoire ne comptent pas.
    pub fn violation_census(&self) -> Vec<Violation> {
        let mut out = Vec::new();
        let tolerance = self.tolerance_phase().tolerance_percent();

        for worker in self.workers() {
            if worker.target_shifts == 0 {
                continue;
            }
            let id = &worker.id;
            let count = self.shift_count(id);
            let deviation = (f64::from(count) - f64::from(worker.target_shifts))
                / f64::from(worker.target_shifts)
                * 100.0;
            if deviation.abs() > tolerance + 1e-9 {
                out.push(Violation {
                    kind: ViolationKind::Target,
                    worker: id.clone(),
                    date: None,
                    detail: format!(
                        "{count}/{} shifts ({deviation:+.1}%)",
                        worker.target_shifts
                    ),
                });
            }

            let dates: Vec<NaiveDate> = self
                .assignments_of(id)
                .map(|d| d.iter().copied().collect())
                .unwrap_or_default();
            let deficit = self.deficit(id);
            let allowed_gap = if self.mode() == Mode::Relaxed && deficit >= 3 {
                worker.gap_between_shifts.saturating_sub(1)
            } else {
                worker.gap_between_shifts
            };
            let pattern_allowed = self.mode() == Mode::Relaxed
                && deficit as f64 > 0.10 * f64::from(worker.target_shifts.max(1));

            for window in dates.windows(2) {
                let (d1, d2) = (window[0], window[1]);
                if self.locked_mandatory().contains(&(id.clone(), d1))
                    || self.locked_mandatory().contains(&(id.clone(), d2))
                {
                    continue;
                }
                let diff = d2.signed_duration_since(d1).num_days();
                if diff < i64::from(allowed_gap) {
                    out.push(Violation {
                        kind: ViolationKind::Gap,
                        worker: id.clone(),
                        date: Some(d2),
                        detail: format!("gap {diff} < {allowed_gap} from {d1}"),
                    });
                }
            }
            if !pattern_allowed {
                for (i, &d1) in dates.iter().enumerate() {
                    for &d2 in dates.iter().skip(i + 1) {
                        if self.locked_mandatory().contains(&(id.clone(), d1))
                            || self.locked_mandatory().contains(&(id.clone(), d2))
                        {
                            continue;
                        }
                        let diff = d2.signed_duration_since(d1).num_days();
                        if (diff == 7 || diff == 14) && d1.weekday() == d2.weekday() {
                            out.push(Violation {
                                kind: ViolationKind::Pattern,
                                worker: id.clone(),
                                date: Some(d2),
                                detail: format!("{diff}d same-weekday pair with {d1}"),
                            });
                        }
                    }
                }
            }

            for (&month, &month_count) in
                self.monthly_counts.get(id).into_iter().flatten()
            {
                let expected = self.expected_month_load(worker, month);
                let bound = match self.mode() {
                    Mode::Strict => expected + 1.0,
                    Mode::Relaxed => (expected + 1.0).max(expected * 1.10),
                };
                if f64::from(month_count) > bound + 1e-9 {
                    out.push(Violation {
                        kind: ViolationKind::Monthly,
                        worker: id.clone(),
                        date: None,
                        detail: format!(
                            "{month_count} shifts in {}-{:02} (expected {expected:.1})",
                            month.0, month.1
                        ),
                    });
                }
            }

            let expected_weekend = self.expected_weekend_load(worker);
            let weekend_bound = match self.mode() {
                Mode::Strict => expected_weekend + 1.0,
                Mode::Relaxed => (expected_weekend + 1.0).max(expected_weekend * 1.10),
            };
            let weekend_count = self.weekend_count(id);
            if f64::from(weekend_count) > weekend_bound + 1e-9 {
                out.push(Violation {
                    kind: ViolationKind::Weekend,
                    worker: id.clone(),
                    date: None,
                    detail: format!(
                        "{weekend_count} special-day shifts (expected {expected_weekend:.1})"
                    ),
                });
            }
        }

        out
    }
}
