//! Remote data gateway for the hosted backend.
//!
//! The backend is the source of truth for all records. Every method here is a
//! single remote call; nothing is cached at this layer.

mod query;
mod storage;

pub use query::*;
pub use storage::*;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::Config;
use crate::errors::{AppError, BackendError};
use crate::models::{
    Class, ClassUpdate, Enrollment, EnrollmentRecord, EnrollmentUpdate, Guardian,
    GuardianInsert, GuardianUpdate, NewClass, NewEnrollment, NewGuardian, NewPayment,
    NewProfile, NewStudent, Payment, PaymentUpdate, Profile, ProfileUpdate, Student,
    StudentRecord, StudentUpdate,
};

pub const CLASSES: &str = "classes";
pub const STUDENTS: &str = "students";
pub const GUARDIANS: &str = "guardians";
pub const ENROLLMENTS: &str = "enrollments";
pub const PAYMENTS: &str = "payments";
pub const PROFILES: &str = "profiles";

/// Select list for student rows: guardians plus enrollments with their class.
pub const STUDENT_SELECT: &str = "*,guardians(*),enrollments(*,classes(*))";
/// Select list for enrollment rows: student, class and payments.
pub const ENROLLMENT_SELECT: &str = "*,students(*),classes(*),payments(*)";

/// Typed access to the hosted data and storage APIs.
#[derive(Clone)]
pub struct Gateway {
    client: Client,
    base_url: String,
    bucket: String,
}

impl Gateway {
    /// Build a gateway from validated configuration.
    pub fn new(config: &Config) -> Result<Self, AppError> {
        if config.anon_key.trim().is_empty() {
            return Err(AppError::Configuration(
                "Backend API key must not be empty".to_string(),
            ));
        }

        let key = HeaderValue::from_str(&config.anon_key)
            .map_err(|e| AppError::Configuration(format!("Invalid API key: {}", e)))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", config.anon_key))
            .map_err(|e| AppError::Configuration(format!("Invalid API key: {}", e)))?;

        let mut headers = HeaderMap::new();
        headers.insert("apikey", key);
        headers.insert(AUTHORIZATION, bearer);

        let client = Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| AppError::Configuration(format!("Cannot build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.backend_url.as_str().trim_end_matches('/').to_string(),
            bucket: config.profile_bucket.clone(),
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    // ==================== CLASS OPERATIONS ====================

    /// List classes ordered by level, then name.
    pub async fn list_classes(&self, filter: Option<Filter>) -> Result<Vec<Class>, AppError> {
        let query = Query::new()
            .order("level", Direction::Asc)
            .order("name", Direction::Asc)
            .filter(filter);
        self.select(CLASSES, &query).await
    }

    pub async fn insert_class(&self, class: &NewClass) -> Result<Class, AppError> {
        self.insert(CLASSES, class).await
    }

    pub async fn update_class(&self, id: &str, changes: &ClassUpdate) -> Result<(), AppError> {
        self.update(CLASSES, id, changes).await
    }

    pub async fn delete_class(&self, id: &str) -> Result<(), AppError> {
        self.delete(CLASSES, id).await
    }

    // ==================== STUDENT OPERATIONS ====================

    /// List students with guardians and enrollments, ordered by last name.
    pub async fn list_students(
        &self,
        filter: Option<Filter>,
    ) -> Result<Vec<StudentRecord>, AppError> {
        let query = Query::new()
            .select(STUDENT_SELECT)
            .order("last_name", Direction::Asc)
            .filter(filter);
        self.select(STUDENTS, &query).await
    }

    pub async fn insert_student(&self, student: &NewStudent) -> Result<Student, AppError> {
        self.insert(STUDENTS, student).await
    }

    pub async fn update_student(&self, id: &str, changes: &StudentUpdate) -> Result<(), AppError> {
        self.update(STUDENTS, id, changes).await
    }

    pub async fn delete_student(&self, id: &str) -> Result<(), AppError> {
        self.delete(STUDENTS, id).await
    }

    // ==================== GUARDIAN OPERATIONS ====================

    pub async fn list_guardians(&self, filter: Option<Filter>) -> Result<Vec<Guardian>, AppError> {
        let query = Query::new().order("name", Direction::Asc).filter(filter);
        self.select(GUARDIANS, &query).await
    }

    /// Insert a guardian owned by `student_id`.
    pub async fn insert_guardian(
        &self,
        student_id: &str,
        guardian: &NewGuardian,
    ) -> Result<Guardian, AppError> {
        if student_id.trim().is_empty() {
            return Err(AppError::Validation(
                "Guardian must belong to a student".to_string(),
            ));
        }
        let row = GuardianInsert {
            student_id,
            guardian,
        };
        self.insert(GUARDIANS, &row).await
    }

    pub async fn update_guardian(
        &self,
        id: &str,
        changes: &GuardianUpdate,
    ) -> Result<(), AppError> {
        self.update(GUARDIANS, id, changes).await
    }

    pub async fn delete_guardian(&self, id: &str) -> Result<(), AppError> {
        self.delete(GUARDIANS, id).await
    }

    // ==================== ENROLLMENT OPERATIONS ====================

    /// List enrollments with student, class and payments, newest first.
    pub async fn list_enrollments(
        &self,
        filter: Option<Filter>,
    ) -> Result<Vec<EnrollmentRecord>, AppError> {
        let query = Query::new()
            .select(ENROLLMENT_SELECT)
            .order("created_at", Direction::Desc)
            .filter(filter);
        self.select(ENROLLMENTS, &query).await
    }

    pub async fn insert_enrollment(
        &self,
        enrollment: &NewEnrollment,
    ) -> Result<Enrollment, AppError> {
        self.insert(ENROLLMENTS, enrollment).await
    }

    pub async fn update_enrollment(
        &self,
        id: &str,
        changes: &EnrollmentUpdate,
    ) -> Result<(), AppError> {
        self.update(ENROLLMENTS, id, changes).await
    }

    pub async fn delete_enrollment(&self, id: &str) -> Result<(), AppError> {
        self.delete(ENROLLMENTS, id).await
    }

    // ==================== PAYMENT OPERATIONS ====================

    /// List payments, newest first.
    pub async fn list_payments(&self, filter: Option<Filter>) -> Result<Vec<Payment>, AppError> {
        let query = Query::new()
            .order("created_at", Direction::Desc)
            .filter(filter);
        self.select(PAYMENTS, &query).await
    }

    pub async fn insert_payment(&self, payment: &NewPayment) -> Result<Payment, AppError> {
        payment.validate()?;
        self.insert(PAYMENTS, payment).await
    }

    pub async fn update_payment(&self, id: &str, changes: &PaymentUpdate) -> Result<(), AppError> {
        changes.validate()?;
        self.update(PAYMENTS, id, changes).await
    }

    pub async fn delete_payment(&self, id: &str) -> Result<(), AppError> {
        self.delete(PAYMENTS, id).await
    }

    // ==================== PROFILE OPERATIONS ====================

    pub async fn list_profiles(&self, filter: Option<Filter>) -> Result<Vec<Profile>, AppError> {
        let query = Query::new().order("email", Direction::Asc).filter(filter);
        self.select(PROFILES, &query).await
    }

    pub async fn insert_profile(&self, profile: &NewProfile) -> Result<Profile, AppError> {
        self.insert(PROFILES, profile).await
    }

    pub async fn update_profile(&self, id: &str, changes: &ProfileUpdate) -> Result<(), AppError> {
        self.update(PROFILES, id, changes).await
    }

    pub async fn delete_profile(&self, id: &str) -> Result<(), AppError> {
        self.delete(PROFILES, id).await
    }

    // ==================== TABLE PRIMITIVES ====================

    async fn select<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &Query,
    ) -> Result<Vec<T>, AppError> {
        tracing::debug!("select from {}", table);

        let response = self
            .client
            .get(self.table_url(table))
            .query(&query.to_pairs())
            .send()
            .await
            .map_err(|e| AppError::Fetch(transport_message(table, &e)))?;

        let response = ensure_success(response).await.map_err(|msg| {
            tracing::warn!("Select from {} failed: {}", table, msg);
            AppError::Fetch(msg)
        })?;

        response
            .json::<Vec<T>>()
            .await
            .map_err(|e| AppError::Fetch(format!("Unreadable {} response: {}", table, e)))
    }

    async fn insert<B, T>(&self, table: &str, row: &B) -> Result<T, AppError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        tracing::debug!("insert into {}", table);

        let response = self
            .client
            .post(self.table_url(table))
            .header("Prefer", "return=representation")
            .json(row)
            .send()
            .await
            .map_err(|e| AppError::Mutation(transport_message(table, &e)))?;

        let response = ensure_success(response).await.map_err(|msg| {
            tracing::warn!("Insert into {} failed: {}", table, msg);
            AppError::Mutation(msg)
        })?;

        let rows = response
            .json::<Vec<T>>()
            .await
            .map_err(|e| AppError::Mutation(format!("Unreadable {} response: {}", table, e)))?;

        rows.into_iter()
            .next()
            .ok_or_else(|| AppError::Mutation(format!("Insert into {} returned no rows", table)))
    }

    async fn update<B>(&self, table: &str, id: &str, changes: &B) -> Result<(), AppError>
    where
        B: Serialize + ?Sized,
    {
        require_id(table, id)?;
        tracing::debug!("update {} {}", table, id);

        let response = self
            .client
            .patch(self.table_url(table))
            .query(&[("id", format!("eq.{}", id))])
            .header("Prefer", "return=minimal")
            .json(changes)
            .send()
            .await
            .map_err(|e| AppError::Mutation(transport_message(table, &e)))?;

        ensure_success(response).await.map_err(|msg| {
            tracing::warn!("Update of {} {} failed: {}", table, id, msg);
            AppError::Mutation(msg)
        })?;
        Ok(())
    }

    async fn delete(&self, table: &str, id: &str) -> Result<(), AppError> {
        require_id(table, id)?;
        tracing::debug!("delete {} {}", table, id);

        let response = self
            .client
            .delete(self.table_url(table))
            .query(&[("id", format!("eq.{}", id))])
            .send()
            .await
            .map_err(|e| AppError::Mutation(transport_message(table, &e)))?;

        ensure_success(response).await.map_err(|msg| {
            tracing::warn!("Delete of {} {} failed: {}", table, id, msg);
            AppError::Mutation(msg)
        })?;
        Ok(())
    }
}

fn require_id(table: &str, id: &str) -> Result<(), AppError> {
    if id.trim().is_empty() {
        return Err(AppError::Validation(format!("Missing {} id", table)));
    }
    Ok(())
}

fn transport_message(target: &str, err: &reqwest::Error) -> String {
    format!("Request to {} failed: {}", target, err)
}

/// Pass successful responses through; turn failures into the backend's message.
pub(crate) async fn ensure_success(response: Response) -> Result<Response, String> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(BackendError::from_body(status, &body).into_message())
}
