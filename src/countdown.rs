//! Remaining-time labels for task due dates
//!
//! Everything here is a pure function of a task and an injected `now`; the
//! controller's ticker decides when to recompute.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::Task;

/// Deadline state of a task at a given instant
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeadlineState {
    /// No due date; terminal
    Unset,
    Pending,
    Overdue,
}

/// Time left until a task is due
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Countdown {
    NoDeadline,
    Overdue,
    Remaining { days: i64, hours: i64, minutes: i64 },
}

impl Countdown {
    pub fn state(&self) -> DeadlineState {
        match self {
            Countdown::NoDeadline => DeadlineState::Unset,
            Countdown::Overdue => DeadlineState::Overdue,
            Countdown::Remaining { .. } => DeadlineState::Pending,
        }
    }
}

impl fmt::Display for Countdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Countdown::NoDeadline => f.write_str("No deadline"),
            Countdown::Overdue => f.write_str("Overdue"),
            Countdown::Remaining {
                days,
                hours,
                minutes,
            } => write!(f, "{}d {}h {}m", days, hours, minutes),
        }
    }
}

/// Breaks the time between `now` and the task's due date into whole days,
/// hours and minutes. A task becomes overdue once `now` is past the due date.
pub fn remaining(task: &Task, now: DateTime<Utc>) -> Countdown {
    let Some(due) = task.due_date() else {
        return Countdown::NoDeadline;
    };
    if now > due {
        return Countdown::Overdue;
    }

    let left = due - now;
    let total_minutes = left.num_minutes();
    Countdown::Remaining {
        days: total_minutes / (24 * 60),
        hours: (total_minutes / 60) % 24,
        minutes: total_minutes % 60,
    }
}

pub fn deadline_state(task: &Task, now: DateTime<Utc>) -> DeadlineState {
    remaining(task, now).state()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewTask, TaskStore};
    use chrono::{Duration, TimeZone};

    fn task_due(due: Option<DateTime<Utc>>) -> Task {
        let new_task = match due {
            Some(due) => NewTask::new("task").with_due_date(due),
            None => NewTask::new("task"),
        };
        let (store, id) = TaskStore::new().add(new_task);
        store.get(id.unwrap()).unwrap().clone()
    }

    #[test]
    fn test_no_deadline() {
        let task = task_due(None);
        assert_eq!(remaining(&task, Utc::now()), Countdown::NoDeadline);
        assert_eq!(deadline_state(&task, Utc::now()), DeadlineState::Unset);
        assert_eq!(remaining(&task, Utc::now()).to_string(), "No deadline");
    }

    #[test]
    fn test_breakdown() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap();
        let due = now + Duration::days(2) + Duration::hours(3) + Duration::minutes(15);
        let task = task_due(Some(due));

        let countdown = remaining(&task, now);
        assert_eq!(
            countdown,
            Countdown::Remaining {
                days: 2,
                hours: 3,
                minutes: 15
            }
        );
        assert_eq!(countdown.to_string(), "2d 3h 15m");
        assert_eq!(countdown.state(), DeadlineState::Pending);
    }

    #[test]
    fn test_partial_minutes_round_down() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap();
        let task = task_due(Some(now + Duration::seconds(59)));
        assert_eq!(
            remaining(&task, now),
            Countdown::Remaining {
                days: 0,
                hours: 0,
                minutes: 0
            }
        );
    }

    #[test]
    fn test_overdue_transition() {
        let due = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let task = task_due(Some(due));

        assert_eq!(deadline_state(&task, due), DeadlineState::Pending);
        assert_eq!(
            remaining(&task, due + Duration::milliseconds(1)),
            Countdown::Overdue
        );
        assert_eq!(remaining(&task, due + Duration::days(3)).to_string(), "Overdue");
    }
}
