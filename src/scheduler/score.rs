use super::builder::ScheduleBuilder;
use super::types::OrderStrategy;
use crate::calendar::Calendar;
use crate::model::WorkerId;
use chrono::{Datelike, NaiveDate};
use rand::{rngs::SmallRng, seq::SliceRandom, SeedableRng};

/// Borne du bonus exponentiel d'espacement.
const GAP_BONUS_SPAN: i64 = 14;

impl ScheduleBuilder {
    /// Score d'une affectation candidate. Fonction pure de l'état courant ;
    /// l'ordre total est complété par (compteur croissant, id) à la sélection.
    pub fn score(&self, id: &WorkerId, date: NaiveDate, post: usize) -> f64 {
        let Some(worker) = self.worker(id) else {
            return f64::MIN;
        };
        let mut score = 0.0f64;

        // Priorité au déficit, par paliers.
        let deficit = self.deficit(id);
        match deficit {
            d if d >= 5 => score += 25_000.0 + 5_000.0 * d as f64,
            3 | 4 => score += 18_000.0 + 3_000.0 * deficit as f64,
            2 => score += 14_000.0,
            1 => score += 10_000.0,
            _ => {}
        }

        // Bonus exponentiel d'espacement.
        let min_distance = self
            .assignments_of(id)
            .into_iter()
            .flatten()
            .map(|&d| (date.signed_duration_since(d)).num_days().abs())
            .min()
            .unwrap_or(i64::from(self.total_days));
        let gap = i64::from(worker.gap_between_shifts);
        if min_distance >= gap {
            let excess = (min_distance - gap).clamp(0, GAP_BONUS_SPAN) as f64;
            score += 500.0 + 200.0 * excess.powf(1.5);
        }

        // Équilibre des jours spéciaux.
        if self.calendar.is_special(date)
            && f64::from(self.weekend_count(id)) < self.expected_weekend_load(worker)
        {
            score += 2_000.0;
        }

        // Équilibre mensuel.
        let month = Calendar::month_key(date);
        let month_count = self
            .monthly_counts
            .get(id)
            .and_then(|m| m.get(&month).copied())
            .unwrap_or(0);
        if f64::from(month_count) < self.expected_month_load(worker, month) {
            score += 1_000.0;
        }

        // Dernier poste sous la part équitable.
        if post == self.num_posts - 1 && self.num_posts > 1 {
            let fair = f64::from(self.shift_count(id)) / self.num_posts as f64;
            if f64::from(self.last_post_count(id)) < fair {
                score += 500.0;
            }
        }

        // Au-dessus de l'objectif mais sous le plafond : pénalité.
        let over = i64::from(self.shift_count(id)) - i64::from(worker.target_shifts);
        if over > 0 {
            score -= 8_000.0 + 2_000.0 * (over - 1) as f64;
        }

        // Réutilisation de motif (jour de semaine, poste) déjà réussi.
        let reuse = self
            .assignments_of(id)
            .into_iter()
            .flatten()
            .any(|&d| d.weekday() == date.weekday() && self.post_of(id, d) == Some(post));
        if reuse {
            score += 250.0;
        }

        score
    }

    /// Meilleur candidat pour un créneau, dans l'ordre fourni. Égalité de
    /// score départagée par compteur le plus bas puis position dans l'ordre
    /// (déterministe et stable).
    pub fn select_worker(
        &self,
        date: NaiveDate,
        post: usize,
        order: &[WorkerId],
    ) -> Option<WorkerId> {
        let mut best: Option<(f64, u32, WorkerId)> = None;
        for id in order {
            if self.can_assign(id, date, post).is_err() {
                continue;
            }
            let score = self.score(id, date, post);
            let count = self.shift_count(id);
            let better = match &best {
                None => true,
                Some((bs, bc, _)) => {
                    score > *bs + f64::EPSILON
                        || ((score - *bs).abs() <= f64::EPSILON && count < *bc)
                }
            };
            if better {
                best = Some((score, count, id.clone()));
            }
        }
        best.map(|(_, _, id)| id)
    }

    /// Nombre de candidats valides d'un créneau (heuristique MRV).
    pub fn candidate_count(&self, date: NaiveDate, post: usize) -> usize {
        self.workers
            .iter()
            .filter(|w| self.can_assign(&w.id, date, post).is_ok())
            .count()
    }

    /// Ordonnancement des travailleurs selon la stratégie demandée.
    /// Les graines sont combinées à celle de la politique.
    pub fn worker_order(&self, strategy: OrderStrategy) -> Vec<WorkerId> {
        let mut ids: Vec<WorkerId> = self.workers.iter().map(|w| w.id.clone()).collect();
        match strategy {
            OrderStrategy::Balanced => {
                ids.sort_by_key(|id| (-self.deficit(id), id.clone()));
            }
            OrderStrategy::Seeded(seed) => {
                ids.sort();
                let mut rng = SmallRng::seed_from_u64(self.policy.seed ^ seed);
                ids.shuffle(&mut rng);
            }
            OrderStrategy::ByIdAsc => ids.sort(),
            OrderStrategy::ByIdDesc => {
                ids.sort();
                ids.reverse();
            }
            OrderStrategy::WorkloadPriority => {
                ids.sort_by_key(|id| {
                    let pct = self
                        .worker(id)
                        .map(|w| w.work_percentage)
                        .unwrap_or(100);
                    (-self.deficit(id), std::cmp::Reverse(pct), id.clone())
                });
            }
            OrderStrategy::Alternating => {
                ids.sort();
                let mut out = Vec::with_capacity(ids.len());
                let mut front = 0usize;
                let mut back = ids.len();
                while front < back {
                    out.push(ids[front].clone());
                    front += 1;
                    if front < back {
                        back -= 1;
                        out.push(ids[back].clone());
                    }
                }
                ids = out;
            }
        }
        ids
    }

    /// Remplit les créneaux vides en deux passes : sélection directe
    /// (créneau le plus contraint d'abord), puis remplissage par échange.
    /// Ne touche jamais aux verrous obligatoires. S'arrête quand une passe
    /// complète ne produit plus aucun remplissage.
    pub fn fill_empty_shifts(&mut self, order: &[WorkerId]) -> usize {
        let before = self.snapshot("pre-fill");
        let mut filled = 0usize;

        // Passe 1 : remplissage direct.
        loop {
            let mut empties = self.empty_slots();
            if empties.is_empty() {
                break;
            }
            empties.sort_by_key(|&(date, post)| (self.candidate_count(date, post), date, post));

            let mut pass_fills = 0usize;
            for (date, post) in empties {
                if self.schedule[&date][post].is_some() {
                    continue;
                }
                if let Some(id) = self.select_worker(date, post, order) {
                    self.place(&id, date, post);
                    pass_fills += 1;
                }
            }
            filled += pass_fills;
            if pass_fills == 0 {
                break;
            }
        }

        // Passe 2 : remplissage par échange.
        for (date, post) in self.empty_slots() {
            if self.try_swap_fill(date, post, order) {
                filled += 1;
            }
        }

        if filled > 0 {
            self.note_transform();
        }
        if let Err(detail) = self.verify_invariants() {
            tracing::warn!(op = "fill_empty_shifts", %detail, "transform rolled back");
            self.restore(&before);
            return 0;
        }
        filled
    }

    /// Libère une affectation d'un travailleur A pour qu'il couvre le
    /// créneau vide, puis redonne l'ancien créneau de A à un travailleur B.
    fn try_swap_fill(&mut self, date: NaiveDate, post: usize, order: &[WorkerId]) -> bool {
        for a in order {
            let held: Vec<NaiveDate> = self
                .assignments_of(a)
                .map(|d| d.iter().copied().collect())
                .unwrap_or_default();
            for prior in held {
                if !self.can_modify(a, prior, "swap_fill") {
                    continue;
                }
                let Some(prior_post) = self.post_of(a, prior) else {
                    continue;
                };

                let removed = self.clear_slot(prior, prior_post);
                debug_assert_eq!(removed.as_ref(), Some(a));

                if self.can_assign(a, date, post).is_ok() {
                    self.place(a, date, post);
                    for b in order {
                        if b == a {
                            continue;
                        }
                        if self.can_assign(b, prior, prior_post).is_ok() {
                            self.place(b, prior, prior_post);
                            tracing::debug!(
                                filler = %a, backfill = %b,
                                slot = %date, vacated = %prior,
                                "swap fill applied"
                            );
                            return true;
                        }
                    }
                    // Pas de relève pour l'ancien créneau : on défait tout.
                    let undone = self.clear_slot(date, post);
                    debug_assert_eq!(undone.as_ref(), Some(a));
                }
                self.place(a, prior, prior_post);
            }
        }
        false
    }
}
