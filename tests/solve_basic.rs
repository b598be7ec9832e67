#![forbid(unsafe_code)]
use chrono::{Datelike, NaiveDate};
use permanence::{
    OrderStrategy, RosterConfig, ScheduleBuilder, Scheduler, SolvePolicy, Worker,
};
use std::collections::BTreeSet;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn config(
    start: NaiveDate,
    end: NaiveDate,
    num_posts: usize,
    workers: Vec<Worker>,
) -> RosterConfig {
    RosterConfig {
        start,
        end,
        num_posts,
        holidays: BTreeSet::new(),
        workers,
        policy: SolvePolicy::default(),
    }
}

#[test]
fn feasible_week_reaches_full_coverage() {
    // 7 jours, 7 travailleurs, un poste : une garde chacun.
    let workers: Vec<Worker> = (0..7)
        .map(|i| Worker::new(format!("w{i}"), 1).with_gap(1))
        .collect();
    let cfg = config(date(2026, 3, 2), date(2026, 3, 8), 1, workers);

    let mut scheduler = Scheduler::new(cfg).unwrap();
    let report = scheduler.solve().unwrap();

    assert_eq!(report.termination.coverage_percent, 100.0);
    assert_eq!(report.violations.total, 0);
    assert_eq!(report.exit_code(), 0);
    for row in report.schedule.values() {
        assert_eq!(row.len(), 1);
        assert_ne!(row[0], "empty");
    }
    // Chacun exactement une garde.
    for stats in &report.worker_stats {
        assert_eq!(stats.assigned, 1);
    }
}

#[test]
fn strict_fill_avoids_7_14_same_weekday_pattern() {
    let workers = vec![
        Worker::new("alice", 5).with_gap(1),
        Worker::new("bob", 5).with_gap(1),
    ];
    let cfg = config(date(2026, 1, 5), date(2026, 1, 14), 1, workers);

    let mut builder = ScheduleBuilder::new(&cfg).unwrap();
    let order = builder.worker_order(OrderStrategy::ByIdAsc);
    builder.fill_empty_shifts(&order);

    for worker in ["alice", "bob"] {
        let id = permanence::WorkerId::new(worker);
        let dates: Vec<NaiveDate> = builder
            .assignments_of(&id)
            .map(|d| d.iter().copied().collect())
            .unwrap_or_default();
        for (i, &d1) in dates.iter().enumerate() {
            for &d2 in dates.iter().skip(i + 1) {
                let diff = d2.signed_duration_since(d1).num_days();
                if diff == 7 || diff == 14 {
                    assert_ne!(
                        d1.weekday(),
                        d2.weekday(),
                        "{worker} holds a same-weekday pair at {diff} days"
                    );
                }
            }
        }
    }
}

#[test]
fn fill_is_a_noop_on_complete_schedule() {
    let workers: Vec<Worker> = (0..3)
        .map(|i| Worker::new(format!("w{i}"), 2).with_gap(1))
        .collect();
    let cfg = config(date(2026, 3, 2), date(2026, 3, 7), 1, workers);

    let mut builder = ScheduleBuilder::new(&cfg).unwrap();
    let order = builder.worker_order(OrderStrategy::Balanced);
    builder.fill_empty_shifts(&order);
    assert!(builder.empty_slots().is_empty());

    let before = builder.schedule().clone();
    let filled = builder.fill_empty_shifts(&order);
    assert_eq!(filled, 0);
    assert_eq!(builder.schedule(), &before);
}

#[test]
fn equal_seeds_give_identical_schedules() {
    let make = || {
        let workers: Vec<Worker> = (0..4)
            .map(|i| Worker::new(format!("w{i}"), 5).with_gap(2))
            .collect();
        let mut cfg = config(date(2026, 4, 1), date(2026, 4, 20), 1, workers);
        cfg.policy.seed = 1234;
        cfg
    };

    let report_a = Scheduler::new(make()).unwrap().solve().unwrap();
    let report_b = Scheduler::new(make()).unwrap().solve().unwrap();
    assert_eq!(report_a.schedule, report_b.schedule);
}

#[test]
fn single_day_range_runs_mandatory_phase_only() {
    let day = date(2026, 5, 11);
    let workers = vec![
        Worker::new("on-call", 1).with_mandatory_day(day),
        Worker::new("idle", 0),
    ];
    let cfg = config(day, day, 1, workers);

    let mut scheduler = Scheduler::new(cfg).unwrap();
    let report = scheduler.solve().unwrap();

    assert_eq!(report.schedule[&day], vec!["on-call".to_string()]);
    assert!(report.config_issues.is_empty());
    assert_eq!(report.termination.coverage_percent, 100.0);
}

#[test]
fn zero_target_worker_is_never_selected_without_mandatory() {
    let workers = vec![
        Worker::new("busy", 10).with_gap(1),
        Worker::new("spare", 0),
    ];
    let cfg = config(date(2026, 6, 1), date(2026, 6, 10), 1, workers);

    let mut scheduler = Scheduler::new(cfg).unwrap();
    let report = scheduler.solve().unwrap();

    let spare = report
        .worker_stats
        .iter()
        .find(|s| s.worker.as_str() == "spare")
        .unwrap();
    assert_eq!(spare.assigned, 0);
}
