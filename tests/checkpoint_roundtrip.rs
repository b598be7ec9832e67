#![forbid(unsafe_code)]
use chrono::NaiveDate;
use permanence::{
    Checkpoint, OrderStrategy, RosterConfig, ScheduleBuilder, SolvePolicy, Worker, WorkerId,
};
use std::collections::{BTreeMap, BTreeSet};
use tempfile::tempdir;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn sample_config() -> RosterConfig {
    RosterConfig {
        start: date(2026, 7, 6),
        end: date(2026, 7, 19),
        num_posts: 2,
        holidays: BTreeSet::new(),
        workers: vec![
            Worker::new("ana", 5).with_mandatory_day(date(2026, 7, 8)),
            Worker::new("bruno", 5),
            Worker::new("carla", 5),
            Worker::new("dani", 5),
        ],
        policy: SolvePolicy::default(),
    }
}

#[test]
fn checkpoint_roundtrips_through_json_file() {
    let cfg = sample_config();
    let mut builder = ScheduleBuilder::new(&cfg).unwrap();
    builder.assign_mandatory_guards();
    let order = builder.worker_order(OrderStrategy::Balanced);
    builder.fill_empty_shifts(&order);

    let dir = tempdir().unwrap();
    let path = dir.path().join("checkpoint.json");
    builder.checkpoint().save_to(&path).unwrap();

    let loaded = Checkpoint::load_from(&path).unwrap();
    let mut restored = ScheduleBuilder::new(&cfg).unwrap();
    restored.restore_checkpoint(&loaded).unwrap();

    assert_eq!(restored.schedule(), builder.schedule());
    assert_eq!(restored.locked_mandatory(), builder.locked_mandatory());
    // Les compteurs dérivés sont reconstruits à l'identique.
    for worker in ["ana", "bruno", "carla", "dani"] {
        let id = WorkerId::new(worker);
        assert_eq!(restored.shift_count(&id), builder.shift_count(&id));
        assert_eq!(restored.weekend_count(&id), builder.weekend_count(&id));
        assert_eq!(restored.last_post_count(&id), builder.last_post_count(&id));
    }
    assert!(restored.verify_invariants().is_ok());
}

#[test]
fn save_overwrites_atomically() {
    let cfg = sample_config();
    let mut builder = ScheduleBuilder::new(&cfg).unwrap();
    builder.assign_mandatory_guards();

    let dir = tempdir().unwrap();
    let path = dir.path().join("checkpoint.json");

    builder.checkpoint().save_to(&path).unwrap();
    let order = builder.worker_order(OrderStrategy::ByIdAsc);
    builder.fill_empty_shifts(&order);
    builder.checkpoint().save_to(&path).unwrap();

    // Le fichier final est la dernière version, toujours parsable, et
    // aucun fichier de travail ne traîne dans le répertoire.
    let loaded = Checkpoint::load_from(&path).unwrap();
    assert_eq!(loaded.schedule, *builder.schedule());
    let entries: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert_eq!(entries, vec![std::ffi::OsString::from("checkpoint.json")]);
}

#[test]
fn inconsistent_checkpoint_is_rejected_on_save() {
    // Verrou pointant vers un créneau que le planning ne matérialise pas.
    let day = date(2026, 7, 6);
    let mut schedule: BTreeMap<NaiveDate, Vec<Option<WorkerId>>> = BTreeMap::new();
    schedule.insert(day, vec![None]);
    let mut locked = BTreeSet::new();
    locked.insert((WorkerId::new("ghost"), day));

    let checkpoint = Checkpoint::new(schedule, locked);
    let dir = tempdir().unwrap();
    assert!(checkpoint.save_to(dir.path().join("bad.json")).is_err());
}

#[test]
fn checkpoint_from_another_problem_is_rejected() {
    let cfg = sample_config();
    let mut builder = ScheduleBuilder::new(&cfg).unwrap();
    builder.assign_mandatory_guards();
    let checkpoint = builder.checkpoint();

    let mut other_cfg = sample_config();
    other_cfg.start = date(2026, 8, 3);
    other_cfg.end = date(2026, 8, 16);
    let mut other = ScheduleBuilder::new(&other_cfg).unwrap();
    assert!(other.restore_checkpoint(&checkpoint).is_err());
}
