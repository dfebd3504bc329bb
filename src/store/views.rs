//! Derived views over the current snapshot.
//!
//! Recomputed on every call; nothing here is cached or persisted. Lookups are
//! linear scans, which is fine at the size of one school's records.

use serde::Serialize;

use super::StoreState;
use crate::models::{EnrollmentRecord, EnrollmentStatus, Payment, PaymentStatus, StudentRecord};

/// A student listed in a class roster, alongside the enrollment that put them there.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassRosterEntry<'a> {
    pub student: &'a StudentRecord,
    pub enrollment: &'a EnrollmentRecord,
}

/// Aggregate payment figures.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentStats {
    pub total: usize,
    pub completed: usize,
    pub pending: usize,
    /// Sum of completed payments only
    pub total_amount: f64,
}

/// Seats taken in a class, counting every enrollment that is not rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassOccupancy {
    pub capacity: i32,
    pub enrolled: usize,
    pub remaining: i32,
}

impl ClassOccupancy {
    pub fn is_full(&self) -> bool {
        self.remaining == 0
    }
}

impl StoreState {
    /// Students enrolled in `class_id`. Enrollments whose student is not in the
    /// snapshot are skipped.
    pub fn students_by_class(&self, class_id: &str) -> Vec<ClassRosterEntry<'_>> {
        self.enrollments
            .iter()
            .filter(|e| e.enrollment.class_id == class_id)
            .filter_map(|enrollment| {
                self.students
                    .iter()
                    .find(|s| s.student.id == enrollment.enrollment.student_id)
                    .map(|student| ClassRosterEntry {
                        student,
                        enrollment,
                    })
            })
            .collect()
    }

    pub fn enrollments_by_status(&self, status: EnrollmentStatus) -> Vec<&EnrollmentRecord> {
        self.enrollments
            .iter()
            .filter(|e| e.enrollment.status == status)
            .collect()
    }

    pub fn payment_stats(&self) -> PaymentStats {
        self.payments
            .iter()
            .fold(PaymentStats::default(), |mut stats, payment| {
                stats.total += 1;
                match payment.status {
                    PaymentStatus::Completed => {
                        stats.completed += 1;
                        stats.total_amount += payment.amount;
                    }
                    PaymentStatus::Pending => stats.pending += 1,
                    PaymentStatus::Failed | PaymentStatus::Refunded => {}
                }
                stats
            })
    }

    /// `None` when the class is not in the snapshot.
    pub fn class_occupancy(&self, class_id: &str) -> Option<ClassOccupancy> {
        let class = self.classes.iter().find(|c| c.id == class_id)?;
        let enrolled = self
            .enrollments
            .iter()
            .filter(|e| {
                e.enrollment.class_id == class_id
                    && e.enrollment.status != EnrollmentStatus::Rejected
            })
            .count();

        let taken = i32::try_from(enrolled).unwrap_or(i32::MAX);
        Some(ClassOccupancy {
            capacity: class.capacity,
            enrolled,
            remaining: class.capacity.saturating_sub(taken).max(0),
        })
    }

    pub fn payments_for_enrollment(&self, enrollment_id: &str) -> Vec<&Payment> {
        self.payments
            .iter()
            .filter(|p| p.enrollment_id == enrollment_id)
            .collect()
    }
}
