use super::balance::BalanceValidator;
use super::builder::ScheduleBuilder;
use super::types::{Deny, TransformOutcome};
use crate::calendar::Calendar;
use crate::model::WorkerId;
use chrono::NaiveDate;
use std::collections::BTreeMap;

impl ScheduleBuilder {
    fn validator(&self) -> BalanceValidator {
        BalanceValidator::new(
            self.tolerance_phase().tolerance_percent(),
            self.policy.emergency_tolerance,
        )
    }

    /// Déplace la garde de `from` en (date, post) vers `to`, même créneau.
    /// Atomique : l'état d'origine est rétabli sur refus.
    pub(super) fn transfer_slot(
        &mut self,
        from: &WorkerId,
        date: NaiveDate,
        post: usize,
        to: &WorkerId,
    ) -> TransformOutcome {
        if !self.can_modify(from, date, "transfer_slot") {
            return TransformOutcome::Blocked;
        }
        let removed = self.clear_slot(date, post);
        debug_assert_eq!(removed.as_ref(), Some(from));

        match self.can_assign(to, date, post) {
            Ok(()) => {
                self.place(to, date, post);
                self.note_transform();
                TransformOutcome::Accepted
            }
            Err(deny) => {
                self.place(from, date, post);
                TransformOutcome::Rejected(deny)
            }
        }
    }

    /// Échange deux affectations entre deux travailleurs distincts.
    pub(super) fn swap_assignments(
        &mut self,
        d1: NaiveDate,
        p1: usize,
        d2: NaiveDate,
        p2: usize,
    ) -> TransformOutcome {
        let (Some(a), Some(b)) = (
            self.schedule.get(&d1).and_then(|s| s.get(p1)).cloned().flatten(),
            self.schedule.get(&d2).and_then(|s| s.get(p2)).cloned().flatten(),
        ) else {
            return TransformOutcome::Rejected(Deny::UnknownWorker);
        };
        if a == b {
            return TransformOutcome::Rejected(Deny::AlreadyAssignedThatDay);
        }
        if !self.can_modify(&a, d1, "swap_assignments") || !self.can_modify(&b, d2, "swap_assignments")
        {
            return TransformOutcome::Blocked;
        }

        self.clear_slot(d1, p1);
        self.clear_slot(d2, p2);

        let a_ok = self.can_assign(&a, d2, p2);
        let b_ok = self.can_assign(&b, d1, p1);
        match (a_ok, b_ok) {
            (Ok(()), Ok(())) => {
                self.place(&a, d2, p2);
                self.place(&b, d1, p1);
                self.note_transform();
                TransformOutcome::Accepted
            }
            (a_res, b_res) => {
                self.place(&a, d1, p1);
                self.place(&b, d2, p2);
                let deny = a_res.err().or(b_res.err()).expect("one side denied");
                TransformOutcome::Rejected(deny)
            }
        }
    }

    /// Transfère des gardes des sur-affectés vers les sous-affectés, dans
    /// l'ordre des recommandations du validateur d'équilibre.
    pub fn balance_workloads(&mut self, max_moves: usize) -> usize {
        let before = self.snapshot("pre-balance_workloads");
        let mut moves = 0usize;

        let recommendations = self.validator().recommendations(&self.shift_counts, &self.workers);
        'outer: for rec in recommendations {
            let dates: Vec<NaiveDate> = self
                .assignments_of(&rec.from)
                .map(|d| d.iter().copied().collect())
                .unwrap_or_default();
            for date in dates {
                if moves >= max_moves {
                    break 'outer;
                }
                let from_count = self.shift_count(&rec.from);
                let to_count = self.shift_count(&rec.to);
                let from_target = self.worker(&rec.from).map(|w| w.target_shifts).unwrap_or(0);
                let to_target = self.worker(&rec.to).map(|w| w.target_shifts).unwrap_or(0);
                if self
                    .validator()
                    .transfer_validity(from_count, from_target, to_count, to_target)
                    .is_err()
                {
                    continue 'outer;
                }
                let Some(post) = self.post_of(&rec.from, date) else {
                    continue;
                };
                if self.transfer_slot(&rec.from, date, post, &rec.to).is_accepted() {
                    moves += 1;
                    tracing::debug!(from = %rec.from, to = %rec.to, date = %date, "workload transfer");
                }
            }
        }

        if moves > 0 {
            if let Err(detail) = self.verify_invariants() {
                tracing::warn!(op = "balance_workloads", %detail, "transform rolled back");
                self.restore(&before);
                return 0;
            }
        }
        moves
    }

    /// Resserre la répartition par jour de semaine de chaque travailleur.
    pub fn balance_weekday_distribution(&mut self, max_swaps: usize) -> usize {
        let before = self.snapshot("pre-balance_weekday");
        let mut swaps = 0usize;

        let ids: Vec<WorkerId> = self.workers.iter().map(|w| w.id.clone()).collect();
        for id in &ids {
            if swaps >= max_swaps {
                break;
            }
            let dates: Vec<NaiveDate> = self
                .assignments_of(id)
                .map(|d| d.iter().copied().collect())
                .unwrap_or_default();
            if dates.len() < 3 {
                continue;
            }
            let mut buckets = [0u32; 7];
            for &d in &dates {
                buckets[Calendar::weekday_index(d) as usize] += 1;
            }
            let max_bucket = buckets.iter().copied().max().unwrap_or(0);
            let min_bucket = buckets.iter().copied().min().unwrap_or(0);
            if max_bucket - min_bucket <= 2 {
                continue;
            }
            let crowded = buckets
                .iter()
                .position(|&c| c == max_bucket)
                .unwrap_or(0) as u32;

            // Échange une garde du jour chargé contre celle d'un autre
            // travailleur sur un jour plus léger.
            'search: for &d1 in dates.iter().filter(|&&d| Calendar::weekday_index(d) == crowded) {
                let Some(p1) = self.post_of(id, d1) else { continue };
                let others: Vec<(NaiveDate, usize)> = self
                    .schedule
                    .iter()
                    .flat_map(|(&d2, posts)| {
                        posts
                            .iter()
                            .enumerate()
                            .filter(|(_, occ)| {
                                occ.as_ref().map(|o| o != id).unwrap_or(false)
                            })
                            .map(move |(p2, _)| (d2, p2))
                    })
                    .filter(|&(d2, _)| {
                        let wd = Calendar::weekday_index(d2) as usize;
                        buckets[wd] < max_bucket - 1
                    })
                    .collect();
                for (d2, p2) in others {
                    if self.swap_assignments(d1, p1, d2, p2).is_accepted() {
                        swaps += 1;
                        break 'search;
                    }
                }
            }
        }

        if swaps > 0 {
            if let Err(detail) = self.verify_invariants() {
                tracing::warn!(op = "balance_weekday_distribution", %detail, "transform rolled back");
                self.restore(&before);
                return 0;
            }
        }
        swaps
    }

    /// Rapproche chaque compteur de jours spéciaux de sa part attendue par
    /// des transferts sur jours spéciaux.
    pub fn rebalance_weekend_shifts(&mut self, max_moves: usize) -> usize {
        let before = self.snapshot("pre-rebalance_weekend");
        let mut moves = 0usize;

        let mut over: Vec<(WorkerId, f64)> = Vec::new();
        let mut under: Vec<(WorkerId, f64)> = Vec::new();
        for worker in self.workers.clone() {
            if worker.target_shifts == 0 {
                continue;
            }
            let expected = self.expected_weekend_load(&worker);
            let dev = f64::from(self.weekend_count(&worker.id)) - expected;
            if dev > 1.0 {
                over.push((worker.id.clone(), dev));
            } else if dev < -1.0 {
                under.push((worker.id.clone(), dev));
            }
        }
        over.sort_by(|a, b| b.1.total_cmp(&a.1));
        under.sort_by(|a, b| a.1.total_cmp(&b.1));

        'outer: for (from, _) in &over {
            let special_dates: Vec<NaiveDate> = self
                .assignments_of(from)
                .map(|dates| {
                    dates
                        .iter()
                        .copied()
                        .filter(|&d| self.calendar.is_special(d))
                        .collect()
                })
                .unwrap_or_default();
            for date in special_dates {
                if moves >= max_moves {
                    break 'outer;
                }
                let Some(post) = self.post_of(from, date) else { continue };
                for (to, _) in &under {
                    let from_count = self.shift_count(from);
                    let to_count = self.shift_count(to);
                    let from_target = self.worker(from).map(|w| w.target_shifts).unwrap_or(0);
                    let to_target = self.worker(to).map(|w| w.target_shifts).unwrap_or(0);
                    if self
                        .validator()
                        .transfer_validity(from_count, from_target, to_count, to_target)
                        .is_err()
                    {
                        continue;
                    }
                    if self.transfer_slot(from, date, post, to).is_accepted() {
                        moves += 1;
                        tracing::debug!(from = %from, to = %to, date = %date, "weekend transfer");
                        break;
                    }
                }
            }
        }

        if moves > 0 {
            if let Err(detail) = self.verify_invariants() {
                tracing::warn!(op = "rebalance_weekend_shifts", %detail, "transform rolled back");
                self.restore(&before);
                return 0;
            }
        }
        moves
    }

    /// Garde-fou : un travailleur au-dessus du plafond dur après une
    /// transformation se voit retirer des gardes de force.
    pub fn redistribute_excess_shifts(&mut self) -> usize {
        let before = self.snapshot("pre-redistribute_excess");
        let mut moves = 0usize;

        let ids: Vec<WorkerId> = self.workers.iter().map(|w| w.id.clone()).collect();
        for id in &ids {
            let cap = self.worker(id).map(|w| w.max_allowed_shifts()).unwrap_or(0);
            while self.shift_count(id) > cap {
                let locked_only = self
                    .assignments_of(id)
                    .map(|dates| {
                        dates
                            .iter()
                            .all(|&d| self.locked_mandatory.contains(&(id.clone(), d)))
                    })
                    .unwrap_or(true);
                if locked_only {
                    break;
                }
                let dates: Vec<NaiveDate> = self
                    .assignments_of(id)
                    .map(|d| d.iter().copied().collect())
                    .unwrap_or_default();
                let mut moved = false;
                'date: for date in dates {
                    let Some(post) = self.post_of(id, date) else { continue };
                    let mut receivers: Vec<WorkerId> =
                        ids.iter().filter(|o| *o != id).cloned().collect();
                    receivers.sort_by_key(|o| -self.deficit(o));
                    for to in receivers {
                        if self.transfer_slot(id, date, post, &to).is_accepted() {
                            moves += 1;
                            moved = true;
                            break 'date;
                        }
                    }
                }
                if !moved {
                    break;
                }
            }
        }

        if moves > 0 {
            if let Err(detail) = self.verify_invariants() {
                tracing::warn!(op = "redistribute_excess_shifts", %detail, "transform rolled back");
                self.restore(&before);
                return 0;
            }
        }
        moves
    }

    /// Échange une garde de jour spécial contre une garde ordinaire pour
    /// corriger deux balances de week-end à la fois, sans toucher aux totaux.
    pub fn swap_special_day_shifts(&mut self, max_swaps: usize) -> usize {
        let before = self.snapshot("pre-swap_special");
        let mut swaps = 0usize;

        let workers = self.workers.clone();
        'outer: for a in &workers {
            if a.target_shifts == 0 {
                continue;
            }
            let a_expected = self.expected_weekend_load(a);
            if f64::from(self.weekend_count(&a.id)) <= a_expected + 1.0 {
                continue;
            }
            for b in &workers {
                if swaps >= max_swaps {
                    break 'outer;
                }
                if a.id == b.id || b.target_shifts == 0 {
                    continue;
                }
                let b_expected = self.expected_weekend_load(b);
                if f64::from(self.weekend_count(&b.id)) >= b_expected - 1.0 {
                    continue;
                }

                let a_special: Vec<NaiveDate> = self
                    .assignments_of(&a.id)
                    .map(|dates| {
                        dates
                            .iter()
                            .copied()
                            .filter(|&d| self.calendar.is_special(d))
                            .collect()
                    })
                    .unwrap_or_default();
                let b_plain: Vec<NaiveDate> = self
                    .assignments_of(&b.id)
                    .map(|dates| {
                        dates
                            .iter()
                            .copied()
                            .filter(|&d| !self.calendar.is_special(d))
                            .collect()
                    })
                    .unwrap_or_default();
                for &d1 in &a_special {
                    let Some(p1) = self.post_of(&a.id, d1) else { continue };
                    for &d2 in &b_plain {
                        let Some(p2) = self.post_of(&b.id, d2) else { continue };
                        if self.swap_assignments(d1, p1, d2, p2).is_accepted() {
                            swaps += 1;
                            tracing::debug!(over = %a.id, under = %b.id, "special-day swap");
                            continue 'outer;
                        }
                    }
                }
            }
        }

        if swaps > 0 {
            if let Err(detail) = self.verify_invariants() {
                tracing::warn!(op = "swap_special_day_shifts", %detail, "transform rolled back");
                self.restore(&before);
                return 0;
            }
        }
        swaps
    }

    /// Au sein d'une même date, permute les indices de poste de deux
    /// travailleurs déjà affectés pour équilibrer les derniers postes.
    pub fn adjust_last_post_distribution(&mut self, max_swaps: usize) -> usize {
        if self.num_posts < 2 {
            return 0;
        }
        let before = self.snapshot("pre-adjust_last_post");
        let last = self.num_posts - 1;
        let mut swaps = 0usize;

        let dates: Vec<NaiveDate> = self.schedule.keys().copied().collect();
        for date in dates {
            if swaps >= max_swaps {
                break;
            }
            let Some(holder) = self.schedule[&date][last].clone() else {
                continue;
            };
            let holder_fair =
                f64::from(self.shift_count(&holder)) / self.num_posts as f64;
            if f64::from(self.last_post_count(&holder)) <= holder_fair + 1.0 {
                continue;
            }
            for post in 0..last {
                let Some(other) = self.schedule[&date][post].clone() else {
                    continue;
                };
                let other_fair =
                    f64::from(self.shift_count(&other)) / self.num_posts as f64;
                if f64::from(self.last_post_count(&other)) >= other_fair {
                    continue;
                }
                if !self.can_modify(&holder, date, "adjust_last_post")
                    || !self.can_modify(&other, date, "adjust_last_post")
                {
                    continue;
                }
                // Permutation interne à la date : seuls les compteurs de
                // dernier poste bougent.
                let posts = self.schedule.get_mut(&date).expect("date in range");
                posts[last] = Some(other.clone());
                posts[post] = Some(holder.clone());
                if let Some(c) = self.last_post_counts.get_mut(&holder) {
                    *c = c.saturating_sub(1);
                }
                *self.last_post_counts.entry(other.clone()).or_insert(0) += 1;
                self.note_transform();
                swaps += 1;
                break;
            }
        }

        if swaps > 0 {
            if let Err(detail) = self.verify_invariants() {
                tracing::warn!(op = "adjust_last_post_distribution", %detail, "transform rolled back");
                self.restore(&before);
                return 0;
            }
        }
        swaps
    }

    /// Répartition par jour de semaine de chaque travailleur (diagnostic).
    pub fn weekday_histogram(&self) -> BTreeMap<WorkerId, [u32; 7]> {
        let mut out = BTreeMap::new();
        for worker in &self.workers {
            let mut buckets = [0u32; 7];
            if let Some(dates) = self.assignments_of(&worker.id) {
                for &d in dates {
                    buckets[Calendar::weekday_index(d) as usize] += 1;
                }
            }
            out.insert(worker.id.clone(), buckets);
        }
        out
    }
}
