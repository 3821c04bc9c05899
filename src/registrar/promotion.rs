//! Waitlist promotion planning.
//!
//! Pure functions over an in-memory snapshot of a course's waitlist. The data
//! layer ([`crate::data::waitlist`]) loads the snapshot under a course row lock,
//! asks [`plan_promotion`] what to do, and applies the plan in the same
//! transaction.

use chrono::{DateTime, Utc};
use std::cmp::Ordering;

/// A `waiting` entry as seen by the planner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitingCandidate {
    pub entry_id: i32,
    pub student_id: i32,
    pub position: i32,
    pub added_at: DateTime<Utc>,
    /// The student's status is `active`.
    pub student_active: bool,
    /// The student already holds an `enrolled` row for this course.
    pub already_enrolled: bool,
}

/// What a promotion pass should write back.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PromotionPlan {
    /// Seats free before promotion.
    pub available: u32,
    /// Entries that receive a seat, in queue order.
    pub promoted: Vec<WaitingCandidate>,
    /// Entries resolved as `left` because the student is already enrolled.
    pub withdrawn: Vec<WaitingCandidate>,
    /// `(entry_id, new_position)` for every entry that stays `waiting`.
    pub renumbered: Vec<(i32, i32)>,
}

impl PromotionPlan {
    /// Whether applying the plan changes anything besides positions.
    pub fn is_noop(&self) -> bool {
        self.promoted.is_empty() && self.withdrawn.is_empty()
    }
}

/// Free seats for a course, clamped at zero.
pub fn available_seats(capacity: i32, enrolled: i64) -> u32 {
    let free = i64::from(capacity) - enrolled;
    u32::try_from(free.max(0)).unwrap_or(u32::MAX)
}

/// Queue order: position, then arrival time, then row id.
pub fn queue_order(a: &WaitingCandidate, b: &WaitingCandidate) -> Ordering {
    a.position
        .cmp(&b.position)
        .then(a.added_at.cmp(&b.added_at))
        .then(a.entry_id.cmp(&b.entry_id))
}

/// Decide which waiting students get the free seats of a course.
///
/// Candidates already enrolled are withdrawn without consuming a seat.
/// Inactive students keep their place in line but are passed over. The
/// remaining entries are renumbered densely from 1 in queue order.
pub fn plan_promotion(
    capacity: i32,
    enrolled: i64,
    mut waiting: Vec<WaitingCandidate>,
) -> PromotionPlan {
    waiting.sort_by(queue_order);

    let available = available_seats(capacity, enrolled);
    let mut seats = available;
    let mut plan = PromotionPlan {
        available,
        ..Default::default()
    };
    let mut staying = Vec::with_capacity(waiting.len());

    for candidate in waiting {
        if candidate.already_enrolled {
            plan.withdrawn.push(candidate);
        } else if seats > 0 && candidate.student_active {
            seats -= 1;
            plan.promoted.push(candidate);
        } else {
            staying.push(candidate);
        }
    }

    plan.renumbered = renumber(&staying);
    plan
}

/// Dense 1-based positions for entries that are already in queue order.
pub fn renumber(ordered: &[WaitingCandidate]) -> Vec<(i32, i32)> {
    ordered
        .iter()
        .zip(1..)
        .map(|(candidate, position)| (candidate.entry_id, position))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 20, 9, minute, 0).unwrap()
    }

    fn candidate(entry_id: i32, position: i32, minute: u32) -> WaitingCandidate {
        WaitingCandidate {
            entry_id,
            student_id: entry_id * 10,
            position,
            added_at: at(minute),
            student_active: true,
            already_enrolled: false,
        }
    }

    fn promoted_ids(plan: &PromotionPlan) -> Vec<i32> {
        plan.promoted.iter().map(|c| c.entry_id).collect()
    }

    #[test]
    fn test_available_seats() {
        assert_eq!(available_seats(30, 28), 2);
        assert_eq!(available_seats(30, 30), 0);
        assert_eq!(available_seats(30, 35), 0);
        assert_eq!(available_seats(0, 0), 0);
    }

    #[test]
    fn test_full_course_promotes_nobody() {
        let waiting = vec![candidate(1, 1, 0), candidate(2, 2, 1)];
        let plan = plan_promotion(10, 10, waiting);
        assert!(plan.is_noop());
        assert_eq!(plan.available, 0);
        assert_eq!(plan.renumbered, vec![(1, 1), (2, 2)]);
    }

    #[test]
    fn test_promotes_up_to_free_seats_in_position_order() {
        let waiting = vec![
            candidate(3, 3, 2),
            candidate(1, 1, 0),
            candidate(4, 4, 3),
            candidate(2, 2, 1),
        ];
        let plan = plan_promotion(10, 8, waiting);
        assert_eq!(promoted_ids(&plan), vec![1, 2]);
        assert_eq!(plan.renumbered, vec![(3, 1), (4, 2)]);
    }

    #[test]
    fn test_never_promotes_more_than_waiting() {
        let plan = plan_promotion(50, 0, vec![candidate(1, 1, 0)]);
        assert_eq!(plan.available, 50);
        assert_eq!(promoted_ids(&plan), vec![1]);
        assert!(plan.renumbered.is_empty());
    }

    #[test]
    fn test_position_tie_broken_by_arrival() {
        let waiting = vec![candidate(7, 1, 5), candidate(8, 1, 2)];
        let plan = plan_promotion(1, 0, waiting);
        assert_eq!(promoted_ids(&plan), vec![8]);
        assert_eq!(plan.renumbered, vec![(7, 1)]);
    }

    #[test]
    fn test_inactive_student_keeps_place() {
        let mut suspended = candidate(1, 1, 0);
        suspended.student_active = false;
        let waiting = vec![suspended, candidate(2, 2, 1), candidate(3, 3, 2)];
        let plan = plan_promotion(5, 4, waiting);
        assert_eq!(promoted_ids(&plan), vec![2]);
        assert_eq!(plan.renumbered, vec![(1, 1), (3, 2)]);
    }

    #[test]
    fn test_already_enrolled_is_withdrawn_without_seat() {
        let mut enrolled = candidate(1, 1, 0);
        enrolled.already_enrolled = true;
        let waiting = vec![enrolled, candidate(2, 2, 1), candidate(3, 3, 2)];
        let plan = plan_promotion(5, 4, waiting);
        assert_eq!(
            plan.withdrawn.iter().map(|c| c.entry_id).collect::<Vec<_>>(),
            vec![1]
        );
        assert_eq!(promoted_ids(&plan), vec![2]);
        assert_eq!(plan.renumbered, vec![(3, 1)]);
    }

    #[test]
    fn test_renumber_closes_gaps() {
        let waiting = vec![candidate(4, 2, 0), candidate(9, 5, 1), candidate(6, 9, 2)];
        let plan = plan_promotion(0, 0, waiting);
        assert_eq!(plan.renumbered, vec![(4, 1), (9, 2), (6, 3)]);
    }

    #[test]
    fn test_plan_invariants_hold_for_mixed_queues() {
        for capacity in 0..6 {
            for enrolled in 0..6i64 {
                let waiting: Vec<_> = (1..=5)
                    .map(|i| {
                        let mut c = candidate(i, i, i as u32);
                        c.student_active = i % 3 != 0;
                        c.already_enrolled = i == 4;
                        c
                    })
                    .collect();
                let plan = plan_promotion(capacity, enrolled, waiting);

                let promoted = plan.promoted.len() as i64;
                assert!(promoted <= i64::from(plan.available));
                if enrolled <= i64::from(capacity) {
                    assert!(enrolled + promoted <= i64::from(capacity));
                }

                let positions: Vec<i32> = plan.renumbered.iter().map(|(_, p)| *p).collect();
                let expected: Vec<i32> = (1..=positions.len() as i32).collect();
                assert_eq!(positions, expected);

                let total = plan.promoted.len() + plan.withdrawn.len() + plan.renumbered.len();
                assert_eq!(total, 5);
            }
        }
    }
}
