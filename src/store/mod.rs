//! Enrollment store: the in-memory snapshot the UI reads from.
//!
//! The store owns one snapshot per collection and replaces it wholesale after
//! every successful mutation by re-issuing the matching fetch. Actions take
//! `&mut self`, so there is exactly one writer at a time.
//!
//! Fetch actions record failures in the error field and return normally.
//! Mutating actions record the failure and also return it to the caller.

mod loading;
mod views;
pub mod workflow;

pub use views::*;

use std::sync::Arc;

use chrono::Utc;

use self::loading::LoadingFlag;
use crate::errors::AppError;
use crate::gateway::{Filter, Gateway, ImageFile};
use crate::models::{
    Class, ClassUpdate, Enrollment, EnrollmentRecord, EnrollmentStatus, EnrollmentUpdate,
    NewClass, NewEnrollment, NewGuardian, NewPayment, NewStudent, Payment, PaymentStatus,
    PaymentUpdate, Student, StudentRecord, StudentUpdate,
};

/// Snapshot of every collection plus the shared loading/error flags.
#[derive(Debug, Clone, Default)]
pub struct StoreState {
    pub(crate) classes: Vec<Class>,
    pub(crate) students: Vec<StudentRecord>,
    pub(crate) enrollments: Vec<EnrollmentRecord>,
    pub(crate) payments: Vec<Payment>,
    pub(crate) loading: LoadingFlag,
    pub(crate) error: Option<String>,
}

impl StoreState {
    pub fn classes(&self) -> &[Class] {
        &self.classes
    }

    pub fn students(&self) -> &[StudentRecord] {
        &self.students
    }

    pub fn enrollments(&self) -> &[EnrollmentRecord] {
        &self.enrollments
    }

    pub fn payments(&self) -> &[Payment] {
        &self.payments
    }

    /// True while any action is in flight. Shared across all collections.
    pub fn is_loading(&self) -> bool {
        self.loading.get()
    }

    /// Message of the most recent failure, cleared by the next success.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

/// State container owned by the application shell.
pub struct EnrollmentStore {
    gateway: Arc<Gateway>,
    state: StoreState,
}

impl EnrollmentStore {
    pub fn new(gateway: Arc<Gateway>) -> Self {
        Self {
            gateway,
            state: StoreState::default(),
        }
    }

    /// Read-only view of the current snapshot.
    pub fn state(&self) -> &StoreState {
        &self.state
    }

    pub fn clear_error(&mut self) {
        self.state.error = None;
    }

    // ==================== FETCH ACTIONS ====================

    /// Reload classes ordered by level, then name.
    pub async fn fetch_classes(&mut self) {
        let _loading = self.state.loading.begin();
        let result = self.gateway.list_classes(None).await;
        match result {
            Ok(classes) => {
                self.state.classes = classes;
                self.state.error = None;
            }
            Err(err) => self.record_failure("fetching classes", &err),
        }
    }

    /// Reload students with their guardians and enrollments.
    pub async fn fetch_students(&mut self) {
        let _loading = self.state.loading.begin();
        let result = self.gateway.list_students(None).await;
        match result {
            Ok(students) => {
                self.state.students = students;
                self.state.error = None;
            }
            Err(err) => self.record_failure("fetching students", &err),
        }
    }

    /// Reload enrollments with student, class and payments, newest first.
    pub async fn fetch_enrollments(&mut self) {
        let _loading = self.state.loading.begin();
        let result = self.gateway.list_enrollments(None).await;
        match result {
            Ok(enrollments) => {
                self.state.enrollments = enrollments;
                self.state.error = None;
            }
            Err(err) => self.record_failure("fetching enrollments", &err),
        }
    }

    pub async fn fetch_payments(&mut self) {
        let _loading = self.state.loading.begin();
        let result = self.gateway.list_payments(None).await;
        match result {
            Ok(payments) => {
                self.state.payments = payments;
                self.state.error = None;
            }
            Err(err) => self.record_failure("fetching payments", &err),
        }
    }

    /// Reload every collection, one after another.
    ///
    /// Each fetch clears the error on success, so only a failure in a later
    /// fetch is guaranteed to survive.
    pub async fn fetch_all(&mut self) {
        self.fetch_classes().await;
        self.fetch_students().await;
        self.fetch_enrollments().await;
        self.fetch_payments().await;
    }

    // ==================== STUDENT ACTIONS ====================

    /// Create a student and its first guardian, then reload students.
    ///
    /// The two inserts are not atomic. If the guardian insert fails the student
    /// row stays persisted and the action still reports the failure.
    pub async fn create_student(
        &mut self,
        student: NewStudent,
        guardian: NewGuardian,
    ) -> Result<Student, AppError> {
        let _loading = self.state.loading.begin();
        let result = self.insert_student_with_guardian(&student, &guardian).await;
        self.settle("creating student", result)
    }

    async fn insert_student_with_guardian(
        &mut self,
        student: &NewStudent,
        guardian: &NewGuardian,
    ) -> Result<Student, AppError> {
        let created = self.gateway.insert_student(student).await?;
        self.gateway.insert_guardian(&created.id, guardian).await?;
        self.fetch_students().await;
        Ok(created)
    }

    pub async fn update_student(
        &mut self,
        id: &str,
        changes: StudentUpdate,
    ) -> Result<(), AppError> {
        let _loading = self.state.loading.begin();
        let changes = StudentUpdate {
            updated_at: Some(Utc::now()),
            ..changes
        };
        let result = self.gateway.update_student(id, &changes).await;
        if result.is_ok() {
            self.fetch_students().await;
        }
        self.settle("updating student", result)
    }

    /// Delete a student. Guardians and enrollments follow the backend's own
    /// referential rules.
    pub async fn delete_student(&mut self, id: &str) -> Result<(), AppError> {
        let _loading = self.state.loading.begin();
        let result = self.gateway.delete_student(id).await;
        if result.is_ok() {
            self.fetch_students().await;
        }
        self.settle("deleting student", result)
    }

    /// Upload a profile image and point the student at its public URL.
    pub async fn upload_student_image(
        &mut self,
        id: &str,
        file: ImageFile,
    ) -> Result<String, AppError> {
        let _loading = self.state.loading.begin();
        let result = self.gateway.upload_profile_image(&file, id).await;
        let url = self.settle("uploading profile image", result)?;
        self.update_student(
            id,
            StudentUpdate {
                profile_image: Some(Some(url.clone())),
                ..Default::default()
            },
        )
        .await?;
        Ok(url)
    }

    /// Delete the student's stored profile image and clear the reference.
    pub async fn remove_student_image(&mut self, id: &str) -> Result<(), AppError> {
        let current = self
            .state
            .students
            .iter()
            .find(|s| s.student.id == id)
            .map(|s| s.student.profile_image.clone());

        let url = match current {
            Some(Some(url)) => url,
            Some(None) => return Ok(()),
            None => {
                let err = AppError::Validation(format!("Student {} is not loaded", id));
                self.record_failure("removing profile image", &err);
                return Err(err);
            }
        };

        let path = match self.gateway.profile_image_path_from_url(&url) {
            Some(path) => path,
            None => {
                let err = AppError::Delete(format!("{} is not a stored profile image", url));
                self.record_failure("removing profile image", &err);
                return Err(err);
            }
        };

        let _loading = self.state.loading.begin();
        let result = self.gateway.delete_profile_image(&path).await;
        self.settle("removing profile image", result)?;

        self.update_student(
            id,
            StudentUpdate {
                profile_image: Some(None),
                ..Default::default()
            },
        )
        .await
    }

    // ==================== CLASS ACTIONS ====================

    pub async fn create_class(&mut self, class: NewClass) -> Result<Class, AppError> {
        let _loading = self.state.loading.begin();
        let result = self.gateway.insert_class(&class).await;
        if result.is_ok() {
            self.fetch_classes().await;
        }
        self.settle("creating class", result)
    }

    pub async fn update_class(&mut self, id: &str, changes: ClassUpdate) -> Result<(), AppError> {
        let _loading = self.state.loading.begin();
        let changes = ClassUpdate {
            updated_at: Some(Utc::now()),
            ..changes
        };
        let result = self.gateway.update_class(id, &changes).await;
        if result.is_ok() {
            self.fetch_classes().await;
        }
        self.settle("updating class", result)
    }

    pub async fn delete_class(&mut self, id: &str) -> Result<(), AppError> {
        let _loading = self.state.loading.begin();
        let result = self.gateway.delete_class(id).await;
        if result.is_ok() {
            self.fetch_classes().await;
        }
        self.settle("deleting class", result)
    }

    // ==================== ENROLLMENT ACTIONS ====================

    pub async fn create_enrollment(
        &mut self,
        enrollment: NewEnrollment,
    ) -> Result<Enrollment, AppError> {
        let _loading = self.state.loading.begin();
        let result = self.gateway.insert_enrollment(&enrollment).await;
        if result.is_ok() {
            self.fetch_enrollments().await;
        }
        self.settle("creating enrollment", result)
    }

    /// Set an enrollment's status; notes are only sent when non-empty.
    pub async fn update_enrollment_status(
        &mut self,
        id: &str,
        status: EnrollmentStatus,
        notes: Option<String>,
    ) -> Result<(), AppError> {
        let _loading = self.state.loading.begin();
        let changes = EnrollmentUpdate {
            status: Some(status),
            notes: notes.filter(|n| !n.is_empty()),
            updated_at: Some(Utc::now()),
            ..Default::default()
        };
        let result = self.gateway.update_enrollment(id, &changes).await;
        if result.is_ok() {
            self.fetch_enrollments().await;
        }
        self.settle("updating enrollment status", result)
    }

    pub async fn delete_enrollment(&mut self, id: &str) -> Result<(), AppError> {
        let _loading = self.state.loading.begin();
        let result = self.gateway.delete_enrollment(id).await;
        if result.is_ok() {
            self.fetch_enrollments().await;
        }
        self.settle("deleting enrollment", result)
    }

    // ==================== PAYMENT ACTIONS ====================

    /// Record a payment. A completed payment approves its enrollment.
    pub async fn create_payment(&mut self, payment: NewPayment) -> Result<Payment, AppError> {
        let _loading = self.state.loading.begin();
        let result = self.insert_payment_and_apply(&payment).await;
        self.settle("creating payment", result)
    }

    async fn insert_payment_and_apply(
        &mut self,
        payment: &NewPayment,
    ) -> Result<Payment, AppError> {
        let created = self.gateway.insert_payment(payment).await?;
        self.apply_payment_workflow(&created.enrollment_id, created.status).await?;
        self.fetch_payments().await;
        Ok(created)
    }

    /// Change a payment's status, running the approval rule on completion.
    pub async fn update_payment_status(
        &mut self,
        id: &str,
        status: PaymentStatus,
    ) -> Result<(), AppError> {
        let _loading = self.state.loading.begin();
        let result = self.update_payment_and_apply(id, status).await;
        self.settle("updating payment status", result)
    }

    async fn update_payment_and_apply(
        &mut self,
        id: &str,
        status: PaymentStatus,
    ) -> Result<(), AppError> {
        let changes = PaymentUpdate {
            status: Some(status),
            ..Default::default()
        };
        self.gateway.update_payment(id, &changes).await?;

        if workflow::enrollment_status_after_payment(status).is_some() {
            let rows = self
                .gateway
                .list_payments(Some(Filter::eq("id", id)))
                .await?;
            let payment = rows.first().ok_or_else(|| {
                AppError::Fetch(format!("Payment {} not found after status update", id))
            })?;
            self.apply_payment_workflow(&payment.enrollment_id, status).await?;
        }

        self.fetch_payments().await;
        Ok(())
    }

    async fn apply_payment_workflow(
        &mut self,
        enrollment_id: &str,
        status: PaymentStatus,
    ) -> Result<(), AppError> {
        if let Some(next) = workflow::enrollment_status_after_payment(status) {
            tracing::info!(
                "Payment {} for enrollment {}, moving it to {}",
                status.as_str(),
                enrollment_id,
                next.as_str()
            );
            self.update_enrollment_status(enrollment_id, next, None).await?;
        }
        Ok(())
    }

    // ==================== ERROR BOOKKEEPING ====================

    fn record_failure(&mut self, action: &str, err: &AppError) {
        tracing::error!("Error {}: {}", action, err);
        self.state.error = Some(err.message());
    }

    /// Record the outcome of a mutating action and hand it back to the caller.
    fn settle<T>(&mut self, action: &str, result: Result<T, AppError>) -> Result<T, AppError> {
        match result {
            Ok(value) => {
                self.state.error = None;
                Ok(value)
            }
            Err(err) => {
                self.record_failure(action, &err);
                Err(err)
            }
        }
    }
}
