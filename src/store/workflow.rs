//! Cross-entity business rules between payments and enrollments.

use crate::models::{EnrollmentStatus, PaymentStatus};

/// Enrollment status a payment in `status` moves its enrollment to, if any.
///
/// Only a completed payment has an effect, and it approves the enrollment.
/// Approval can also be set directly, so the status is not payment-gated.
pub fn enrollment_status_after_payment(status: PaymentStatus) -> Option<EnrollmentStatus> {
    match status {
        PaymentStatus::Completed => Some(EnrollmentStatus::Approved),
        PaymentStatus::Pending | PaymentStatus::Failed | PaymentStatus::Refunded => None,
    }
}
