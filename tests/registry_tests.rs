use etl_coordinator::error::CoordinatorError;
use etl_coordinator::scheduler::{EntityKind, EntityRegistry, Job, Registry, Report};
use etl_coordinator::time::Time;

#[test]
fn test_add_find_and_list_order() {
    let mut jobs: EntityRegistry<Job> = EntityRegistry::new();
    for id in ["extract", "transform", "load"] {
        jobs.add(Job::new(id, format!("{}.kjb", id), "/etl")).unwrap();
    }

    assert_eq!(jobs.count(), 3);
    assert_eq!(jobs.list(), vec!["extract", "transform", "load"]);
    assert_eq!(jobs.find("transform").unwrap().filename, "transform.kjb");
    assert!(jobs.find("missing").is_none());
}

#[test]
fn test_duplicate_id_is_rejected() {
    let mut jobs: EntityRegistry<Job> = EntityRegistry::new();
    jobs.add(Job::new("a", "first.kjb", "/etl")).unwrap();

    let err = jobs.add(Job::new("a", "second.kjb", "/etl")).unwrap_err();
    assert!(matches!(err, CoordinatorError::DuplicateId { kind: EntityKind::Job, .. }));
    assert_eq!(err.to_string(), "job [a] already existing");

    // The original entry is kept
    assert_eq!(jobs.count(), 1);
    assert_eq!(jobs.find("a").unwrap().filename, "first.kjb");
}

#[test]
fn test_remove() {
    let mut jobs: EntityRegistry<Job> = EntityRegistry::new();
    jobs.add(Job::new("a", "a.kjb", "/etl")).unwrap();
    jobs.add(Job::new("b", "b.kjb", "/etl")).unwrap();

    assert!(jobs.remove("a").is_some());
    assert!(jobs.remove("a").is_none());
    assert_eq!(jobs.list(), vec!["b"]);

    // Removed ids can be added again
    jobs.add(Job::new("a", "a.kjb", "/etl")).unwrap();
    assert_eq!(jobs.list(), vec!["b", "a"]);
}

#[test]
fn test_clear() {
    let mut reports: EntityRegistry<Report> = EntityRegistry::new();
    reports.add(Report::new("r", "r.prpt", "/r")).unwrap();
    reports.clear();
    assert!(reports.is_empty());
    assert!(reports.list().is_empty());
}

#[test]
fn test_replace_all_skips_duplicates() {
    let mut jobs: EntityRegistry<Job> = EntityRegistry::new();
    jobs.add(Job::new("old", "old.kjb", "/etl")).unwrap();

    let summary = jobs.replace_all(vec![
        Job::new("a", "a.kjb", "/etl"),
        Job::new("b", "b.kjb", "/etl"),
        Job::new("a", "again.kjb", "/etl"),
    ]);

    assert_eq!(summary.loaded, 2);
    assert_eq!(summary.skipped, 1);
    assert_eq!(jobs.list(), vec!["a", "b"]);
    assert_eq!(jobs.find("a").unwrap().filename, "a.kjb");
}

#[test]
fn test_reset_is_idempotent_and_reanchors() {
    let mut registry = Registry::new();
    let yesterday = Time::now().plus_seconds(-86_400);
    registry
        .jobs
        .add(Job::new("a", "a.kjb", "/etl").scheduled_at(yesterday))
        .unwrap();
    {
        let run = registry.run_state_mut(EntityKind::Job, "a").unwrap();
        run.request_start();
        run.mark_started(Time::now());
        run.mark_finished(3, Time::now());
    }

    assert!(registry.reset(EntityKind::Job, "a"));
    let once = registry.jobs.find("a").unwrap().run.clone();
    assert!(registry.reset(EntityKind::Job, "a"));
    let twice = &registry.jobs.find("a").unwrap().run;

    assert!(twice.is_idle());
    assert_eq!(twice.exit_code, 0);
    assert_eq!(once.scheduled_start_time, twice.scheduled_start_time);
    assert_eq!(
        twice.scheduled_start_time.time_of_day(),
        yesterday.reanchored_today().time_of_day()
    );
    assert_eq!(
        twice.scheduled_start_time.naive().date(),
        chrono::Local::now().date_naive()
    );

    assert!(!registry.reset(EntityKind::Job, "missing"));
}

#[test]
fn test_reset_all() {
    let mut registry = Registry::new();
    for id in ["a", "b"] {
        let mut job = Job::new(id, "x.kjb", "/etl");
        job.run.mark_finished(1, Time::now());
        registry.jobs.add(job).unwrap();
    }

    registry.reset_all(EntityKind::Job);
    assert!(registry.jobs.iter().all(|job| job.run.is_idle()));
}

#[test]
fn test_next_jobs_with_ties() {
    let mut registry = Registry::new();
    let soon = Time::now().plus_seconds(600);
    registry
        .jobs
        .add(Job::new("later", "l.kjb", "/etl").scheduled_at(soon.plus_seconds(60)))
        .unwrap();
    registry
        .jobs
        .add(Job::new("a", "a.kjb", "/etl").scheduled_at(soon))
        .unwrap();
    registry
        .jobs
        .add(Job::new("past", "p.kjb", "/etl").scheduled_at(Time::now().plus_seconds(-60)))
        .unwrap();
    registry
        .jobs
        .add(Job::new("b", "b.kjb", "/etl").scheduled_at(soon))
        .unwrap();

    assert_eq!(registry.next_jobs(&Time::now()), vec!["a", "b"]);
}

#[test]
fn test_next_jobs_empty_when_all_passed() {
    let mut registry = Registry::new();
    registry
        .jobs
        .add(Job::new("past", "p.kjb", "/etl").scheduled_at(Time::now().plus_seconds(-1)))
        .unwrap();
    assert!(registry.next_jobs(&Time::now()).is_empty());
    assert!(Registry::new().next_jobs(&Time::now()).is_empty());
}

#[test]
fn test_group_reports() {
    let mut registry = Registry::new();
    registry.reports.add(Report::new("r1", "1.prpt", "/r").in_group(1)).unwrap();
    registry.reports.add(Report::new("r2", "2.prpt", "/r")).unwrap();
    registry.reports.add(Report::new("r3", "3.prpt", "/r").in_group(1)).unwrap();

    assert_eq!(registry.group_reports(1), vec!["r1", "r3"]);
    assert!(registry.group_reports(2).is_empty());
}

#[test]
fn test_kind_dispatch() {
    let mut registry = Registry::new();
    registry.jobs.add(Job::new("x", "x.kjb", "/etl")).unwrap();
    registry.reports.add(Report::new("y", "y.prpt", "/r")).unwrap();

    assert!(registry.contains(EntityKind::Job, "x"));
    assert!(!registry.contains(EntityKind::Report, "x"));
    assert_eq!(registry.count(EntityKind::Report), 1);
    assert_eq!(registry.list(EntityKind::Report), vec!["y"]);
    assert!(registry.remove(EntityKind::Report, "y"));
    assert!(!registry.remove(EntityKind::Report, "y"));
}
