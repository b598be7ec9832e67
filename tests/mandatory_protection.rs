#![forbid(unsafe_code)]
use chrono::NaiveDate;
use permanence::{RosterConfig, ScheduleBuilder, Scheduler, SolvePolicy, Worker, WorkerId};
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
fn mandatory_days_survive_the_whole_pipeline_even_with_violated_gap() {
    // Deux obligatoires à 2 jours d'écart pour un espacement exigé de 3 :
    // l'obligatoire domine, les deux dates restent couvertes.
    let d1 = date(2026, 1, 15);
    let d2 = date(2026, 1, 17);
    let worker = Worker::new("solo", 2)
        .with_gap(3)
        .with_mandatory_day(d1)
        .with_mandatory_day(d2);
    let cfg = config(date(2026, 1, 10), date(2026, 1, 20), 1, vec![worker]);

    let mut scheduler = Scheduler::new(cfg).unwrap();
    let report = scheduler.solve().unwrap();

    assert!(report.config_issues.is_empty());
    assert_eq!(report.schedule[&d1], vec!["solo".to_string()]);
    assert_eq!(report.schedule[&d2], vec!["solo".to_string()]);
    // La paire obligatoire n'est pas recensée comme violation d'espacement.
    assert!(report
        .violations
        .details
        .iter()
        .all(|v| v.kind != permanence::ViolationKind::Gap));
}

#[test]
fn incompatible_mandatory_clash_places_one_and_reports_the_other() {
    let day = date(2026, 2, 10);
    let a_id = WorkerId::new("a");
    let b_id = WorkerId::new("b");
    let a = Worker::new("a", 5).with_mandatory_day(day).with_incompatible(&b_id);
    let b = Worker::new("b", 5).with_mandatory_day(day).with_incompatible(&a_id);
    let cfg = config(date(2026, 2, 9), date(2026, 2, 12), 2, vec![a, b]);

    let mut scheduler = Scheduler::new(cfg).unwrap();
    let report = scheduler.solve().unwrap();

    assert_eq!(report.config_issues.len(), 1);
    let row = &report.schedule[&day];
    let placed = row.iter().filter(|w| *w == "a" || *w == "b").count();
    assert_eq!(placed, 1, "exactly one of the clashing workers is placed");
    assert_eq!(report.exit_code(), 3);
}

#[test]
fn mandatory_on_day_off_is_a_configuration_error() {
    let day = date(2026, 3, 10);
    let worker = Worker::new("torn", 3)
        .with_mandatory_day(day)
        .with_day_off(day);
    let other = Worker::new("other", 3);
    let cfg = config(date(2026, 3, 9), date(2026, 3, 12), 1, vec![worker, other]);

    let mut scheduler = Scheduler::new(cfg).unwrap();
    let report = scheduler.solve().unwrap();

    assert_eq!(report.config_issues.len(), 1);
    assert_eq!(report.config_issues[0].worker.as_str(), "torn");
    // Jamais affecté ce jour-là.
    assert!(report.schedule[&day].iter().all(|w| w != "torn"));
    assert_eq!(report.exit_code(), 3);
}

#[test]
fn gap_larger_than_range_is_a_configuration_error() {
    // Espacement de 10 jours sur une plage de 5 : une deuxième garde est
    // impossible, la configuration est signalée et non récupérée.
    let workers = vec![
        Worker::new("wide", 3).with_gap(10),
        Worker::new("ok", 3).with_gap(2),
    ];
    let cfg = config(date(2026, 6, 1), date(2026, 6, 5), 1, workers);

    let mut scheduler = Scheduler::new(cfg).unwrap();
    let report = scheduler.solve().unwrap();

    assert_eq!(report.config_issues.len(), 1);
    assert_eq!(report.config_issues[0].worker.as_str(), "wide");
    assert!(report.config_issues[0].date.is_none());
    assert_eq!(report.exit_code(), 3);
    // L'espacement reste appliqué : "wide" obtient au plus une garde.
    let wide = report
        .worker_stats
        .iter()
        .find(|s| s.worker.as_str() == "wide")
        .unwrap();
    assert!(wide.assigned <= 1);
}

#[test]
fn protection_oracle_blocks_locked_slots() {
    let day = date(2026, 4, 15);
    let worker = Worker::new("fixed", 2).with_mandatory_day(day);
    let cfg = config(date(2026, 4, 13), date(2026, 4, 18), 1, vec![worker]);

    let mut builder = ScheduleBuilder::new(&cfg).unwrap();
    let issues = builder.assign_mandatory_guards();
    assert!(issues.is_empty());

    let id = WorkerId::new("fixed");
    assert!(builder.locked_mandatory().contains(&(id.clone(), day)));
    assert!(!builder.can_modify(&id, day, "test"));
    assert!(builder.can_modify(&id, date(2026, 4, 14), "test"));
    assert_eq!(builder.blocked_attempts(), 1);
}

#[test]
fn locked_set_is_restored_across_initial_attempts() {
    // La phase multi-tentatives restaure la sauvegarde avant chaque essai ;
    // les verrous doivent tous survivre jusqu'au rapport final.
    let d1 = date(2026, 5, 6);
    let d2 = date(2026, 5, 20);
    let workers = vec![
        Worker::new("w0", 6).with_mandatory_day(d1),
        Worker::new("w1", 6).with_mandatory_day(d2),
        Worker::new("w2", 6),
    ];
    let cfg = config(date(2026, 5, 1), date(2026, 5, 28), 1, workers);

    let mut scheduler = Scheduler::new(cfg).unwrap();
    let report = scheduler.solve().unwrap();

    assert!(report.config_issues.is_empty());
    assert_eq!(report.schedule[&d1][0], "w0");
    assert_eq!(report.schedule[&d2][0], "w1");
    let locked = scheduler.builder().locked_mandatory();
    assert!(locked.contains(&(WorkerId::new("w0"), d1)));
    assert!(locked.contains(&(WorkerId::new("w1"), d2)));
}
