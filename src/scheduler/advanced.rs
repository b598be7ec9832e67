use super::builder::ScheduleBuilder;
use super::types::{Mode, OrderStrategy};
use crate::model::WorkerId;
use chrono::NaiveDate;
use std::collections::BTreeSet;
use std::time::Instant;

/// Profondeur de retour arrière du remplissage MRV.
const BACKTRACK_DEPTH: usize = 3;

/// Moteur de distribution avancée : dernières stratégies de remplissage,
/// appliquées dans l'ordre tant qu'il reste des créneaux vides.
pub fn final_push(
    builder: &mut ScheduleBuilder,
    fill_attempts: u32,
    deadline: Option<Instant>,
) -> usize {
    let mut filled = 0usize;
    let strategies: [(&str, fn(&mut ScheduleBuilder, u32) -> usize); 4] = [
        ("chunk_fill", chunk_fill),
        ("backtracking_fill", backtracking_fill),
        ("multi_worker_swaps", multi_worker_swaps),
        ("progressive_relaxation", progressive_relaxation),
    ];

    for (name, strategy) in strategies {
        if builder.empty_slots().is_empty() {
            break;
        }
        if let Some(limit) = deadline {
            if Instant::now() >= limit {
                tracing::warn!(strategy = name, "final push stopped by budget");
                break;
            }
        }
        let gained = strategy(builder, fill_attempts);
        tracing::info!(strategy = name, gained, "final push strategy applied");
        filled += gained;
    }
    filled
}

/// Remplissage par fenêtres de 7 jours, travailleurs classés par déficit.
fn chunk_fill(builder: &mut ScheduleBuilder, _attempts: u32) -> usize {
    let before = builder.snapshot("pre-chunk_fill");
    let mut filled = 0usize;

    let dates: Vec<NaiveDate> = builder.schedule().keys().copied().collect();
    for window in dates.chunks(7) {
        let mut empties: Vec<(NaiveDate, usize)> = builder
            .empty_slots()
            .into_iter()
            .filter(|(d, _)| window.contains(d))
            .collect();
        empties.sort_by_key(|&(d, p)| (builder.candidate_count(d, p), d, p));

        for (date, post) in empties {
            let mut order: Vec<WorkerId> =
                builder.workers().iter().map(|w| w.id.clone()).collect();
            order.sort_by_key(|id| (-builder.deficit(id), id.clone()));
            if let Some(id) = builder.select_worker(date, post, &order) {
                builder.place(&id, date, post);
                filled += 1;
            }
        }
    }

    if filled > 0 {
        if let Err(detail) = builder.verify_invariants() {
            tracing::warn!(op = "chunk_fill", %detail, "strategy rolled back");
            builder.restore(&before);
            return 0;
        }
    }
    filled
}

/// Retour arrière adaptatif : créneau au plus petit nombre de candidats
/// d'abord (MRV), mémorisation des paires (créneau, travailleur) en échec,
/// profondeur de retour bornée.
fn backtracking_fill(builder: &mut ScheduleBuilder, attempts: u32) -> usize {
    let before = builder.snapshot("pre-backtracking_fill");
    let mut failed: BTreeSet<(NaiveDate, usize, WorkerId)> = BTreeSet::new();
    let mut trail: Vec<(NaiveDate, usize, WorkerId)> = Vec::new();
    let mut dead: BTreeSet<(NaiveDate, usize)> = BTreeSet::new();
    let node_cap = (attempts as usize) * 50;
    let mut nodes = 0usize;

    loop {
        nodes += 1;
        if nodes > node_cap {
            break;
        }
        let mut empties: Vec<(NaiveDate, usize)> = builder
            .empty_slots()
            .into_iter()
            .filter(|slot| !dead.contains(slot))
            .collect();
        if empties.is_empty() {
            break;
        }
        empties.sort_by_key(|&(d, p)| (builder.candidate_count(d, p), d, p));
        let (date, post) = empties[0];

        let mut candidates: Vec<(f64, WorkerId)> = builder
            .workers()
            .iter()
            .filter(|w| !failed.contains(&(date, post, w.id.clone())))
            .filter(|w| builder.can_assign(&w.id, date, post).is_ok())
            .map(|w| (builder.score(&w.id, date, post), w.id.clone()))
            .collect();
        candidates.sort_by(|a, b| b.0.total_cmp(&a.0).then(a.1.cmp(&b.1)));

        match candidates.first() {
            Some((_, id)) => {
                builder.place(id, date, post);
                trail.push((date, post, id.clone()));
            }
            None => {
                // Impasse : on défait les derniers placements (borné) et on
                // mémorise l'échec pour élaguer.
                let depth = trail.len().min(BACKTRACK_DEPTH);
                if depth == 0 {
                    dead.insert((date, post));
                    continue;
                }
                for _ in 0..depth {
                    let (d, p, id) = trail.pop().expect("trail non-empty");
                    let removed = builder.clear_slot(d, p);
                    debug_assert_eq!(removed.as_ref(), Some(&id));
                    failed.insert((d, p, id));
                }
            }
        }
    }

    let filled = trail.len();
    if filled > 0 {
        if let Err(detail) = builder.verify_invariants() {
            tracing::warn!(op = "backtracking_fill", %detail, "strategy rolled back");
            builder.restore(&before);
            return 0;
        }
    }
    filled
}

/// Chaînes à deux ou trois travailleurs pour couvrir un créneau vide.
fn multi_worker_swaps(builder: &mut ScheduleBuilder, _attempts: u32) -> usize {
    let before = builder.snapshot("pre-multi_worker_swaps");
    let mut filled = 0usize;

    let order: Vec<WorkerId> = {
        let mut ids: Vec<WorkerId> = builder.workers().iter().map(|w| w.id.clone()).collect();
        ids.sort_by_key(|id| (-builder.deficit(id), id.clone()));
        ids
    };

    for (date, post) in builder.empty_slots() {
        if try_chain(builder, date, post, &order) {
            filled += 1;
        }
    }

    if filled > 0 {
        if let Err(detail) = builder.verify_invariants() {
            tracing::warn!(op = "multi_worker_swaps", %detail, "strategy rolled back");
            builder.restore(&before);
            return 0;
        }
    }
    filled
}

/// A couvre le trou en libérant un de ses créneaux, repris par B ; si B doit
/// lui-même libérer, C reprend derrière lui.
fn try_chain(
    builder: &mut ScheduleBuilder,
    date: NaiveDate,
    post: usize,
    order: &[WorkerId],
) -> bool {
    for a in order {
        let held: Vec<NaiveDate> = builder
            .assignments_of(a)
            .map(|d| d.iter().copied().collect())
            .unwrap_or_default();
        for d1 in held {
            if !builder.can_modify(a, d1, "multi_worker_swaps") {
                continue;
            }
            let Some(p1) = builder.post_of(a, d1) else { continue };

            let a_removed = builder.clear_slot(d1, p1);
            debug_assert_eq!(a_removed.as_ref(), Some(a));
            if builder.can_assign(a, date, post).is_err() {
                builder.place(a, d1, p1);
                continue;
            }
            builder.place(a, date, post);

            // Relève directe (chaîne à deux).
            for b in order {
                if b == a {
                    continue;
                }
                if builder.can_assign(b, d1, p1).is_ok() {
                    builder.place(b, d1, p1);
                    return true;
                }
            }

            // Chaîne à trois : B libère un créneau repris par C.
            for b in order {
                if b == a {
                    continue;
                }
                let b_held: Vec<NaiveDate> = builder
                    .assignments_of(b)
                    .map(|d| d.iter().copied().collect())
                    .unwrap_or_default();
                for d2 in b_held {
                    if !builder.can_modify(b, d2, "multi_worker_swaps") {
                        continue;
                    }
                    let Some(p2) = builder.post_of(b, d2) else { continue };
                    let b_removed = builder.clear_slot(d2, p2);
                    debug_assert_eq!(b_removed.as_ref(), Some(b));

                    if builder.can_assign(b, d1, p1).is_ok() {
                        builder.place(b, d1, p1);
                        for c in order {
                            if c == a || c == b {
                                continue;
                            }
                            if builder.can_assign(c, d2, p2).is_ok() {
                                builder.place(c, d2, p2);
                                return true;
                            }
                        }
                        let undone = builder.clear_slot(d1, p1);
                        debug_assert_eq!(undone.as_ref(), Some(b));
                    }
                    builder.place(b, d2, p2);
                }
            }

            // Échec complet : on remet A à sa place.
            let undone = builder.clear_slot(date, post);
            debug_assert_eq!(undone.as_ref(), Some(a));
            builder.place(a, d1, p1);
        }
    }
    false
}

/// Escalade temporaire du régime : Relaxed puis Phase2, en ne gardant que
/// les améliorations.
fn progressive_relaxation(builder: &mut ScheduleBuilder, _attempts: u32) -> usize {
    let before = builder.snapshot("pre-progressive_relaxation");

    if builder.mode() == Mode::Strict {
        builder.enable_relaxed();
    } else {
        builder.escalate_phase2();
    }

    let order = builder.worker_order(OrderStrategy::Balanced);
    let filled = builder.fill_empty_shifts(&order);
    if filled == 0 {
        builder.restore(&before);
        return 0;
    }
    if let Err(detail) = builder.verify_invariants() {
        tracing::warn!(op = "progressive_relaxation", %detail, "strategy rolled back");
        builder.restore(&before);
        return 0;
    }
    filled
}
