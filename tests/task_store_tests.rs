use chrono::{Duration, TimeZone, Utc};
use studyhub::countdown::{remaining, Countdown};
use studyhub::models::{Filter, NewTask, Priority, TaskId, TaskPatch, TaskStore};

#[test]
fn test_tasks_are_listed_newest_first() {
    let store = TaskStore::new();
    let (store, first) = store.add(NewTask::new("First"));
    let (store, second) = store.add(NewTask::new("Second"));

    let titles: Vec<_> = store.iter().map(|t| t.title()).collect();
    assert_eq!(titles, vec!["Second", "First"]);
    assert!(second.unwrap() > first.unwrap());
}

#[test]
fn test_ids_stay_unique_within_one_millisecond_and_after_deletion() {
    let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
    let (store, a) = TaskStore::new().add_at(NewTask::new("a"), now);
    let (store, b) = store.add_at(NewTask::new("b"), now);
    let store = store.remove(b.unwrap());
    let (store, c) = store.add_at(NewTask::new("c"), now);

    let (a, b, c) = (a.unwrap(), b.unwrap(), c.unwrap());
    assert_eq!(a.value(), now.timestamp_millis() as u64);
    assert!(b > a);
    assert!(c > b);
    assert_eq!(store.len(), 2);
}

#[test]
fn test_delete_discards_subtasks() {
    let (store, id) = TaskStore::new().add(NewTask::new("With subtasks"));
    let id = id.unwrap();
    let store = store.add_subtask(id, "one").add_subtask(id, "two");
    assert_eq!(store.get(id).unwrap().subtasks().len(), 2);

    let store = store.remove(id);
    assert!(store.get(id).is_none());
    assert!(store.is_empty());
}

#[test]
fn test_unknown_ids_are_no_ops() {
    let (store, _) = TaskStore::new().add(NewTask::new("Only"));
    let unknown = TaskId::new(42);

    for next in [
        store.remove(unknown),
        store.toggle_complete(unknown),
        store.add_subtask(unknown, "x"),
        store.toggle_subtask(unknown, 0),
        store.update(
            unknown,
            &TaskPatch {
                title: Some("changed".to_string()),
                ..Default::default()
            },
        ),
    ] {
        assert!(!next.changed_from(&store));
    }
}

#[test]
fn test_filter_search_and_progress() {
    let store = TaskStore::new();
    let (store, _) = store.add(NewTask::new("Rust ownership").with_priority(Priority::High));
    let (store, done) = store.add(NewTask::new("Rust lifetimes"));
    let (store, _) = store.add(NewTask::new("Go channels"));
    let store = store.toggle_complete(done.unwrap());

    assert_eq!(store.filtered(Filter::All, "rust").len(), 2);
    assert_eq!(store.filtered(Filter::Completed, "").len(), 1);
    assert_eq!(store.filtered(Filter::Pending, "").len(), 2);
    assert_eq!(store.filtered(Filter::HighPriority, "").len(), 1);

    let progress = store.progress();
    assert_eq!((progress.completed, progress.total), (1, 3));

    let store = store.clear_completed();
    assert_eq!(store.len(), 2);
    assert_eq!(store.progress().completed, 0);
}

#[test]
fn test_countdown_for_task_due_tomorrow() {
    let now = Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap();
    let (store, id) = TaskStore::new().add(
        NewTask::new("Read Ch.1")
            .with_query("Explain chapter 1")
            .with_due_date(now + Duration::days(1)),
    );
    let task = store.get(id.unwrap()).unwrap();

    assert_eq!(
        remaining(task, now),
        Countdown::Remaining {
            days: 1,
            hours: 0,
            minutes: 0
        }
    );
    assert_eq!(remaining(task, now + Duration::days(2)), Countdown::Overdue);
}
