//! Integration tests for the enrollment data layer.
//!
//! Each fixture runs an in-process backend on a random port and points a real
//! gateway at it over HTTP.


use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use reqwest::Client;
use serde_json::json;
use tempfile::TempDir;
use tokio::time::timeout;

use self::backend::{MockBackend, API_KEY, BUCKET};
use crate::config::{parse_backend_url, Config};
use crate::errors::AppError;
use crate::gateway::{Filter, Gateway, ImageFile};
use crate::models::{
    ClassUpdate, EnrollmentStatus, Gender, GuardianUpdate, NewClass, NewEnrollment,
    NewGuardian, NewPayment, NewProfile, NewStudent, PaymentStatus, ProfileRole, ProfileUpdate,
    StudentUpdate,
};
use crate::store::{EnrollmentStore, PaymentStats};

static TRACING: Lazy<()> = Lazy::new(|| {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new("warn"))
        .with_test_writer()
        .try_init()
        .ok();
});

/// Test fixture for integration tests.
struct TestFixture {
    backend: MockBackend,
    gateway: Arc<Gateway>,
    client: Client,
    base_url: String,
}

impl TestFixture {
    async fn new() -> Self {
        Self::with_key(API_KEY).await
    }

    async fn with_key(key: &str) -> Self {
        Lazy::force(&TRACING);

        let backend = MockBackend::new();
        let app = backend.router();

        // Bind to random port
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind");
        let addr = listener.local_addr().expect("Failed to get addr");
        let base_url = format!("http://{}", addr);

        // Spawn server
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let config = config_for(&base_url, key);
        let gateway = Arc::new(Gateway::new(&config).expect("Failed to build gateway"));

        TestFixture {
            backend,
            gateway,
            client: Client::new(),
            base_url,
        }
    }

    fn store(&self) -> EnrollmentStore {
        EnrollmentStore::new(self.gateway.clone())
    }

    fn seed_class(&self, name: &str, level: &str) -> String {
        self.backend.seed_id(
            "classes",
            json!({
                "name": name,
                "level": level,
                "capacity": 24,
                "academic_year": "2024-2025",
                "teacher_name": "Mme Diallo"
            }),
        )
    }

    fn seed_student(&self, first_name: &str, last_name: &str) -> String {
        self.backend.seed_id(
            "students",
            json!({
                "first_name": first_name,
                "last_name": last_name,
                "date_of_birth": "2016-04-02",
                "gender": "F"
            }),
        )
    }

    fn seed_enrollment(&self, student_id: &str, class_id: &str) -> String {
        self.backend.seed_id(
            "enrollments",
            json!({
                "student_id": student_id,
                "class_id": class_id,
                "academic_year": "2024-2025"
            }),
        )
    }

    fn seed_payment(&self, enrollment_id: &str, amount: f64, status: &str) -> String {
        self.backend.seed_id(
            "payments",
            json!({
                "enrollment_id": enrollment_id,
                "amount": amount,
                "payment_method": "mobile_money",
                "transaction_id": format!("TX-{}", amount),
                "status": status
            }),
        )
    }
}

fn config_for(base_url: &str, key: &str) -> Config {
    Config {
        backend_url: parse_backend_url(base_url).unwrap(),
        anon_key: key.to_string(),
        profile_bucket: BUCKET.to_string(),
        log_level: "warn".to_string(),
    }
}

/// Gateway aimed at a listener that accepts connections and never answers.
async fn stalled_gateway() -> Arc<Gateway> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind");
    let addr = listener.local_addr().expect("Failed to get addr");

    tokio::spawn(async move {
        let mut open = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            open.push(socket);
        }
    });

    let config = config_for(&format!("http://{}", addr), API_KEY);
    Arc::new(Gateway::new(&config).expect("Failed to build gateway"))
}

fn new_student(first_name: &str, last_name: &str) -> NewStudent {
    NewStudent {
        first_name: first_name.to_string(),
        last_name: last_name.to_string(),
        date_of_birth: NaiveDate::from_ymd_opt(2015, 9, 21).unwrap(),
        gender: Gender::M,
        profile_image: None,
        address: Some("12 rue des Manguiers".to_string()),
        medical_notes: None,
    }
}

fn new_guardian(name: &str, phone: &str) -> NewGuardian {
    NewGuardian {
        name: name.to_string(),
        relationship: "mother".to_string(),
        phone: phone.to_string(),
        email: Some("parent@example.org".to_string()),
        address: None,
        is_primary: true,
    }
}

fn new_class(name: &str, level: &str) -> NewClass {
    NewClass {
        name: name.to_string(),
        level: level.to_string(),
        capacity: 30,
        academic_year: "2024-2025".to_string(),
        teacher_name: None,
        description: None,
    }
}

fn new_payment(enrollment_id: &str, amount: f64, status: PaymentStatus) -> NewPayment {
    NewPayment {
        enrollment_id: enrollment_id.to_string(),
        amount,
        payment_method: "card".to_string(),
        transaction_id: "TX-0001".to_string(),
        status,
        payment_date: None,
    }
}

// ==================== FETCH TESTS ====================

#[tokio::test]
async fn test_fetch_classes_orders_by_level_then_name() {
    let fixture = TestFixture::new().await;
    fixture.seed_class("CM1 B", "CM1");
    fixture.seed_class("CE2 A", "CE2");
    fixture.seed_class("CM1 A", "CM1");

    let mut store = fixture.store();
    store.fetch_classes().await;

    let names: Vec<&str> = store
        .state()
        .classes()
        .iter()
        .map(|c| c.name.as_str())
        .collect();
    assert_eq!(names, vec!["CE2 A", "CM1 A", "CM1 B"]);
    assert!(store.state().error().is_none());
    assert!(!store.state().is_loading());
    assert!(fixture
        .backend
        .requests()
        .contains(&"GET classes select=*&order=level.asc,name.asc".to_string()));
}

#[tokio::test]
async fn test_fetch_students_embeds_guardians_and_classes() {
    let fixture = TestFixture::new().await;
    let class_id = fixture.seed_class("CP A", "CP");
    let zola = fixture.seed_student("Awa", "Zola");
    let ba = fixture.seed_student("Moussa", "Ba");
    fixture.backend.seed(
        "guardians",
        json!({
            "student_id": ba,
            "name": "Fatou Ba",
            "relationship": "mother",
            "phone": "+221 77 000 00 00",
            "is_primary": true
        }),
    );
    fixture.seed_enrollment(&ba, &class_id);

    let mut store = fixture.store();
    store.fetch_students().await;

    let students = store.state().students();
    assert_eq!(students.len(), 2);
    assert_eq!(students[0].student.id, ba);
    assert_eq!(students[1].student.id, zola);

    let record = &students[0];
    assert_eq!(record.primary_guardian().unwrap().name, "Fatou Ba");
    assert_eq!(record.enrollments.len(), 1);
    assert_eq!(
        record.enrollments[0].class.as_ref().unwrap().name,
        "CP A"
    );
    assert!(students[1].guardians.is_empty());
    assert!(students[1].enrollments.is_empty());
}

#[tokio::test]
async fn test_fetch_enrollments_newest_first_with_relations() {
    let fixture = TestFixture::new().await;
    let class_id = fixture.seed_class("CE1 A", "CE1");
    let first_student = fixture.seed_student("Ines", "Diop");
    let second_student = fixture.seed_student("Omar", "Sy");
    let older = fixture.seed_enrollment(&first_student, &class_id);
    let newer = fixture.seed_enrollment(&second_student, &class_id);
    fixture.seed_payment(&older, 120.0, "completed");

    let mut store = fixture.store();
    store.fetch_enrollments().await;

    let enrollments = store.state().enrollments();
    assert_eq!(enrollments.len(), 2);
    assert_eq!(enrollments[0].enrollment.id, newer);
    assert_eq!(enrollments[1].enrollment.id, older);

    let older_record = &enrollments[1];
    assert_eq!(older_record.student.as_ref().unwrap().last_name, "Diop");
    assert_eq!(older_record.class.as_ref().unwrap().level, "CE1");
    assert_eq!(older_record.payments.len(), 1);
    assert!(enrollments[0].payments.is_empty());
}

#[tokio::test]
async fn test_fetch_all_loads_every_collection() {
    let fixture = TestFixture::new().await;
    let class_id = fixture.seed_class("CM2 A", "CM2");
    let student_id = fixture.seed_student("Lina", "Kane");
    let enrollment_id = fixture.seed_enrollment(&student_id, &class_id);
    fixture.seed_payment(&enrollment_id, 75.0, "pending");

    let mut store = fixture.store();
    store.fetch_all().await;

    let state = store.state();
    assert_eq!(state.classes().len(), 1);
    assert_eq!(state.students().len(), 1);
    assert_eq!(state.enrollments().len(), 1);
    assert_eq!(state.payments().len(), 1);
    assert!(state.error().is_none());
}

#[tokio::test]
async fn test_fetch_failure_is_recorded_not_returned() {
    let fixture = TestFixture::new().await;
    fixture.seed_class("CP B", "CP");

    let mut store = fixture.store();
    store.fetch_classes().await;
    assert_eq!(store.state().classes().len(), 1);

    fixture.backend.fail("classes");
    store.fetch_classes().await;

    let error = store.state().error().expect("error recorded");
    assert!(error.contains("temporarily unavailable"));
    // Previous snapshot is kept
    assert_eq!(store.state().classes().len(), 1);
    assert!(!store.state().is_loading());

    fixture.backend.recover("classes");
    store.fetch_classes().await;
    assert!(store.state().error().is_none());
}

#[tokio::test]
async fn test_cancelled_actions_clear_loading() {
    Lazy::force(&TRACING);
    let mut store = EnrollmentStore::new(stalled_gateway().await);

    let outcome = timeout(Duration::from_millis(200), store.fetch_classes()).await;
    assert!(outcome.is_err());
    assert!(!store.state().is_loading());

    // Nested actions unwind too
    let outcome = timeout(
        Duration::from_millis(200),
        store.create_payment(new_payment("enr-1", 40.0, PaymentStatus::Completed)),
    )
    .await;
    assert!(outcome.is_err());
    assert!(!store.state().is_loading());
}

#[tokio::test]
async fn test_invalid_api_key_surfaces_as_fetch_error() {
    let fixture = TestFixture::with_key("wrong-key").await;

    let result = fixture.gateway.list_classes(None).await;
    assert_eq!(
        result.unwrap_err(),
        AppError::Fetch("Invalid API key".to_string())
    );

    let mut store = fixture.store();
    store.fetch_students().await;
    assert_eq!(store.state().error(), Some("Invalid API key"));
    assert!(store.state().students().is_empty());
}

// ==================== STUDENT TESTS ====================

#[tokio::test]
async fn test_create_student_reloads_full_snapshot() {
    let fixture = TestFixture::new().await;
    // Written by someone else, not yet in the snapshot
    fixture.seed_student("Aminata", "Sow");

    let mut store = fixture.store();
    let created = store
        .create_student(
            new_student("Ibrahima", "Ndiaye"),
            new_guardian("Khady Ndiaye", "+221 70 111 22 33"),
        )
        .await
        .unwrap();

    assert!(!created.id.is_empty());
    assert!(created.created_at.is_some());

    let state = store.state();
    assert!(state.error().is_none());
    assert!(!state.is_loading());
    assert_eq!(state.students().len(), 2);

    let record = state
        .students()
        .iter()
        .find(|s| s.student.id == created.id)
        .unwrap();
    assert_eq!(record.guardians.len(), 1);
    assert_eq!(record.guardians[0].student_id, created.id);

    let fresh = fixture.gateway.list_students(None).await.unwrap();
    assert_eq!(state.students(), fresh.as_slice());
}

#[tokio::test]
async fn test_guardian_failure_keeps_student_and_reports_error() {
    let fixture = TestFixture::new().await;
    let mut store = fixture.store();

    let result = store
        .create_student(new_student("Cheikh", "Faye"), new_guardian("Awa Faye", ""))
        .await;

    match result {
        Err(AppError::Mutation(msg)) => assert!(msg.contains("check constraint")),
        other => panic!("expected mutation error, got {:?}", other),
    }
    assert!(store.state().error().unwrap().contains("check constraint"));
    assert!(!store.state().is_loading());

    // The student insert is not rolled back
    assert_eq!(fixture.backend.rows("students").len(), 1);
    assert!(fixture.backend.rows("guardians").is_empty());
    assert_eq!(fixture.gateway.list_students(None).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_update_student_stamps_and_reloads() {
    let fixture = TestFixture::new().await;
    let mut store = fixture.store();
    let created = store
        .create_student(new_student("Mariama", "Ba"), new_guardian("Ousmane Ba", "770000000"))
        .await
        .unwrap();

    store
        .update_student(
            &created.id,
            StudentUpdate {
                medical_notes: Some("Asthma".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let record = &store.state().students()[0];
    assert_eq!(record.student.medical_notes.as_deref(), Some("Asthma"));
    assert!(record.student.updated_at.is_some());
    assert_eq!(record.student.first_name, "Mariama");
}

#[tokio::test]
async fn test_update_without_id_is_rejected() {
    let fixture = TestFixture::new().await;
    let mut store = fixture.store();

    let result = store.update_student("", StudentUpdate::default()).await;
    assert!(matches!(result, Err(AppError::Validation(_))));
    assert_eq!(store.state().error(), Some("Missing students id"));
}

#[tokio::test]
async fn test_delete_student_cascades_and_reloads() {
    let fixture = TestFixture::new().await;
    let mut store = fixture.store();
    let created = store
        .create_student(new_student("Seydou", "Camara"), new_guardian("Nafi Camara", "761234567"))
        .await
        .unwrap();
    assert_eq!(store.state().students().len(), 1);

    store.delete_student(&created.id).await.unwrap();

    assert!(store.state().students().is_empty());
    assert!(fixture.backend.rows("guardians").is_empty());
}

// ==================== CLASS TESTS ====================

#[tokio::test]
async fn test_class_lifecycle_through_store() {
    let fixture = TestFixture::new().await;
    let mut store = fixture.store();

    let class = store.create_class(new_class("6e A", "6e")).await.unwrap();
    assert_eq!(store.state().classes().len(), 1);

    store
        .update_class(
            &class.id,
            ClassUpdate {
                capacity: Some(25),
                teacher_name: Some("M. Sarr".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let updated = &store.state().classes()[0];
    assert_eq!(updated.capacity, 25);
    assert_eq!(updated.teacher_name.as_deref(), Some("M. Sarr"));
    assert!(updated.updated_at.is_some());

    store.delete_class(&class.id).await.unwrap();
    assert!(store.state().classes().is_empty());
}

#[tokio::test]
async fn test_success_clears_previous_error() {
    let fixture = TestFixture::new().await;
    let mut store = fixture.store();

    fixture.backend.fail("classes");
    assert!(store.create_class(new_class("CP A", "CP")).await.is_err());
    assert!(store.state().error().is_some());

    fixture.backend.recover("classes");
    store.create_class(new_class("CP A", "CP")).await.unwrap();
    assert!(store.state().error().is_none());
}

// ==================== ENROLLMENT TESTS ====================

#[tokio::test]
async fn test_create_enrollment_defaults_to_pending() {
    let fixture = TestFixture::new().await;
    let class_id = fixture.seed_class("CE2 B", "CE2");
    let student_id = fixture.seed_student("Rokhaya", "Gueye");

    let mut store = fixture.store();
    let created = store
        .create_enrollment(NewEnrollment {
            student_id: student_id.clone(),
            class_id,
            enrollment_date: None,
            status: None,
            academic_year: "2024-2025".to_string(),
            notes: None,
        })
        .await
        .unwrap();

    assert_eq!(created.status, EnrollmentStatus::Pending);
    let enrollments = store.state().enrollments();
    assert_eq!(enrollments.len(), 1);
    assert_eq!(enrollments[0].student.as_ref().unwrap().id, student_id);
}

#[tokio::test]
async fn test_create_enrollment_for_unknown_student_fails() {
    let fixture = TestFixture::new().await;
    let class_id = fixture.seed_class("CE2 B", "CE2");

    let mut store = fixture.store();
    let result = store
        .create_enrollment(NewEnrollment {
            student_id: "no-such-student".to_string(),
            class_id,
            enrollment_date: None,
            status: None,
            academic_year: "2024-2025".to_string(),
            notes: None,
        })
        .await;

    match result {
        Err(AppError::Mutation(msg)) => assert!(msg.contains("foreign key constraint")),
        other => panic!("expected mutation error, got {:?}", other),
    }
    assert!(store.state().error().is_some());
    assert!(store.state().enrollments().is_empty());
}

#[tokio::test]
async fn test_update_enrollment_status_keeps_notes_when_empty() {
    let fixture = TestFixture::new().await;
    let class_id = fixture.seed_class("CM1 A", "CM1");
    let student_id = fixture.seed_student("Adama", "Fall");
    let enrollment_id = fixture.seed_enrollment(&student_id, &class_id);

    let mut store = fixture.store();
    store
        .update_enrollment_status(
            &enrollment_id,
            EnrollmentStatus::Rejected,
            Some("Missing birth certificate".to_string()),
        )
        .await
        .unwrap();

    let record = &store.state().enrollments()[0];
    assert_eq!(record.enrollment.status, EnrollmentStatus::Rejected);
    assert_eq!(
        record.enrollment.notes.as_deref(),
        Some("Missing birth certificate")
    );

    store
        .update_enrollment_status(&enrollment_id, EnrollmentStatus::Incomplete, Some(String::new()))
        .await
        .unwrap();

    let record = &store.state().enrollments()[0];
    assert_eq!(record.enrollment.status, EnrollmentStatus::Incomplete);
    assert_eq!(
        record.enrollment.notes.as_deref(),
        Some("Missing birth certificate")
    );
}

#[tokio::test]
async fn test_students_by_class_skips_students_missing_from_snapshot() {
    let fixture = TestFixture::new().await;
    let class_id = fixture.seed_class("CP A", "CP");
    let kept = fixture.seed_student("Yacine", "Diatta");
    let dropped = fixture.seed_student("Bineta", "Mendy");
    fixture.seed_enrollment(&kept, &class_id);
    fixture.seed_enrollment(&dropped, &class_id);

    let mut store = fixture.store();
    store.fetch_classes().await;
    store.fetch_enrollments().await;
    fixture.backend.remove("students", &dropped);
    store.fetch_students().await;

    let roster = store.state().students_by_class(&class_id);
    assert_eq!(roster.len(), 1);
    assert_eq!(roster[0].student.student.id, kept);

    let occupancy = store.state().class_occupancy(&class_id).unwrap();
    assert_eq!(occupancy.enrolled, 2);
}

// ==================== PAYMENT TESTS ====================

#[tokio::test]
async fn test_completed_payment_approves_enrollment() {
    let fixture = TestFixture::new().await;
    let class_id = fixture.seed_class("CE1 B", "CE1");
    let student_id = fixture.seed_student("Khadim", "Mbaye");
    let enrollment_id = fixture.seed_enrollment(&student_id, &class_id);

    let mut store = fixture.store();
    store.fetch_enrollments().await;
    assert_eq!(
        store.state().enrollments()[0].enrollment.status,
        EnrollmentStatus::Pending
    );

    let payment = store
        .create_payment(new_payment(&enrollment_id, 150.0, PaymentStatus::Completed))
        .await
        .unwrap();
    assert_eq!(payment.status, PaymentStatus::Completed);

    let record = &store.state().enrollments()[0];
    assert_eq!(record.enrollment.status, EnrollmentStatus::Approved);
    assert_eq!(record.payments.len(), 1);
    assert_eq!(store.state().payments().len(), 1);
    assert_eq!(
        fixture.backend.row("enrollments", &enrollment_id).unwrap()["status"],
        "approved"
    );
    assert!(store.state().error().is_none());
    assert!(!store.state().is_loading());
}

#[tokio::test]
async fn test_pending_payment_leaves_enrollment_pending() {
    let fixture = TestFixture::new().await;
    let class_id = fixture.seed_class("CE1 B", "CE1");
    let student_id = fixture.seed_student("Khadim", "Mbaye");
    let enrollment_id = fixture.seed_enrollment(&student_id, &class_id);

    let mut store = fixture.store();
    store
        .create_payment(new_payment(&enrollment_id, 80.0, PaymentStatus::Pending))
        .await
        .unwrap();

    assert_eq!(
        fixture.backend.row("enrollments", &enrollment_id).unwrap()["status"],
        "pending"
    );
    assert!(!fixture
        .backend
        .requests()
        .iter()
        .any(|r| r.starts_with("PATCH enrollments")));
}

#[tokio::test]
async fn test_update_payment_status_to_completed_approves() {
    let fixture = TestFixture::new().await;
    let class_id = fixture.seed_class("CM2 B", "CM2");
    let student_id = fixture.seed_student("Astou", "Niang");
    let enrollment_id = fixture.seed_enrollment(&student_id, &class_id);
    let payment_id = fixture.seed_payment(&enrollment_id, 200.0, "pending");

    let mut store = fixture.store();
    store
        .update_payment_status(&payment_id, PaymentStatus::Completed)
        .await
        .unwrap();

    assert_eq!(
        fixture.backend.row("enrollments", &enrollment_id).unwrap()["status"],
        "approved"
    );
    assert_eq!(store.state().payments()[0].status, PaymentStatus::Completed);
    assert_eq!(
        store.state().enrollments()[0].enrollment.status,
        EnrollmentStatus::Approved
    );
}

#[tokio::test]
async fn test_completing_missing_payment_is_reported() {
    let fixture = TestFixture::new().await;
    let mut store = fixture.store();

    let result = store
        .update_payment_status("no-such-payment", PaymentStatus::Completed)
        .await;

    match result {
        Err(AppError::Fetch(msg)) => assert!(msg.contains("no-such-payment")),
        other => panic!("expected fetch error, got {:?}", other),
    }
    assert!(store.state().error().unwrap().contains("no-such-payment"));
    assert!(!store.state().is_loading());
    assert!(!fixture
        .backend
        .requests()
        .iter()
        .any(|r| r.starts_with("PATCH enrollments")));
}

#[tokio::test]
async fn test_negative_payment_rejected_before_insert() {
    let fixture = TestFixture::new().await;
    let class_id = fixture.seed_class("CP A", "CP");
    let student_id = fixture.seed_student("Pape", "Diouf");
    let enrollment_id = fixture.seed_enrollment(&student_id, &class_id);

    let mut store = fixture.store();
    let result = store
        .create_payment(new_payment(&enrollment_id, -10.0, PaymentStatus::Completed))
        .await;

    assert!(matches!(result, Err(AppError::Validation(_))));
    assert!(store.state().error().is_some());
    assert!(fixture.backend.rows("payments").is_empty());
    assert_eq!(
        fixture.backend.row("enrollments", &enrollment_id).unwrap()["status"],
        "pending"
    );
}

#[tokio::test]
async fn test_payment_stats_over_fetched_payments() {
    let fixture = TestFixture::new().await;
    let class_id = fixture.seed_class("CP A", "CP");
    let student_id = fixture.seed_student("Ndeye", "Thiam");
    let enrollment_id = fixture.seed_enrollment(&student_id, &class_id);
    fixture.seed_payment(&enrollment_id, 100.0, "completed");
    fixture.seed_payment(&enrollment_id, 50.0, "pending");
    fixture.seed_payment(&enrollment_id, 200.0, "completed");

    let mut store = fixture.store();
    store.fetch_payments().await;

    assert_eq!(
        store.state().payment_stats(),
        PaymentStats {
            total: 3,
            completed: 2,
            pending: 1,
            total_amount: 300.0,
        }
    );
    assert_eq!(store.state().payments_for_enrollment(&enrollment_id).len(), 3);
}

// ==================== GATEWAY TESTS ====================

#[tokio::test]
async fn test_guardian_filter_and_updates() {
    let fixture = TestFixture::new().await;
    let first = fixture.seed_student("Alioune", "Sene");
    let second = fixture.seed_student("Coumba", "Ka");

    let guardian = fixture
        .gateway
        .insert_guardian(&first, &new_guardian("Marie Sene", "775551111"))
        .await
        .unwrap();
    fixture
        .gateway
        .insert_guardian(&second, &new_guardian("Abdou Ka", "775552222"))
        .await
        .unwrap();

    let listed = fixture
        .gateway
        .list_guardians(Some(Filter::eq("student_id", first.as_str())))
        .await
        .unwrap();
    assert_eq!(listed, vec![guardian.clone()]);

    fixture
        .gateway
        .update_guardian(
            &guardian.id,
            &GuardianUpdate {
                is_primary: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let row = fixture.backend.row("guardians", &guardian.id).unwrap();
    assert_eq!(row["is_primary"], false);

    fixture.gateway.delete_guardian(&guardian.id).await.unwrap();
    assert_eq!(fixture.gateway.list_guardians(None).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_profile_crud() {
    let fixture = TestFixture::new().await;
    let id = uuid::Uuid::new_v4().to_string();

    let created = fixture
        .gateway
        .insert_profile(&NewProfile {
            id: id.clone(),
            email: "secretariat@ecole.example".to_string(),
            full_name: Some("Awa Secretariat".to_string()),
            role: ProfileRole::Secretary,
            avatar_url: None,
        })
        .await
        .unwrap();
    assert_eq!(created.id, id);

    fixture
        .gateway
        .update_profile(
            &id,
            &ProfileUpdate {
                role: Some(ProfileRole::Admin),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let admins = fixture
        .gateway
        .list_profiles(Some(Filter::eq("role", "admin")))
        .await
        .unwrap();
    assert_eq!(admins.len(), 1);
    assert_eq!(admins[0].email, "secretariat@ecole.example");

    fixture.gateway.delete_profile(&id).await.unwrap();
    assert!(fixture.gateway.list_profiles(None).await.unwrap().is_empty());
}

#[test]
fn test_blank_key_is_a_configuration_error() {
    let config = config_for("http://127.0.0.1:1", "  ");
    assert!(matches!(
        Gateway::new(&config),
        Err(AppError::Configuration(_))
    ));
}

// ==================== STORAGE TESTS ====================

#[tokio::test]
async fn test_upload_returns_resolvable_url_and_overwrites() {
    let fixture = TestFixture::new().await;
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("portrait.png");
    tokio::fs::write(&path, b"first").await.unwrap();

    let file = ImageFile::from_path(&path).await.unwrap();
    let url = fixture
        .gateway
        .upload_profile_image(&file, "stu-42")
        .await
        .unwrap();
    assert_eq!(
        url,
        format!(
            "{}/storage/v1/object/public/{}/profiles/stu-42.png",
            fixture.base_url, BUCKET
        )
    );

    let resp = fixture.client.get(&url).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["content-type"], "image/png");
    assert_eq!(resp.bytes().await.unwrap().as_ref(), b"first");

    let replacement = ImageFile::new("retake.png", b"second".to_vec());
    let again = fixture
        .gateway
        .upload_profile_image(&replacement, "stu-42")
        .await
        .unwrap();
    assert_eq!(again, url);
    assert_eq!(
        fixture.backend.object("profiles/stu-42.png"),
        Some(b"second".to_vec())
    );
}

#[tokio::test]
async fn test_storage_failures_map_to_upload_and_delete() {
    let fixture = TestFixture::new().await;
    let file = ImageFile::new("kid.jpg", vec![0xff, 0xd8]);
    fixture
        .gateway
        .upload_profile_image(&file, "stu-7")
        .await
        .unwrap();

    fixture.backend.fail(BUCKET);

    let upload = fixture.gateway.upload_profile_image(&file, "stu-7").await;
    match upload {
        Err(err @ AppError::Upload(_)) => {
            assert!(err.message().starts_with("Upload failed: "))
        }
        other => panic!("expected upload error, got {:?}", other),
    }

    let delete = fixture
        .gateway
        .delete_profile_image("profiles/stu-7.jpg")
        .await;
    match delete {
        Err(err @ AppError::Delete(_)) => {
            assert!(err.message().starts_with("Delete failed: "))
        }
        other => panic!("expected delete error, got {:?}", other),
    }

    fixture.backend.recover(BUCKET);
    fixture
        .gateway
        .delete_profile_image("profiles/stu-7.jpg")
        .await
        .unwrap();
    assert!(fixture.backend.object("profiles/stu-7.jpg").is_none());
}

#[tokio::test]
async fn test_student_image_lifecycle() {
    let fixture = TestFixture::new().await;
    let mut store = fixture.store();
    let student = store
        .create_student(
            new_student("Fatoumata", "Cisse"),
            new_guardian("Lamine Cisse", "781112233"),
        )
        .await
        .unwrap();

    let url = store
        .upload_student_image(&student.id, ImageFile::new("photo.webp", b"img".to_vec()))
        .await
        .unwrap();

    let record = &store.state().students()[0];
    assert_eq!(record.student.profile_image.as_deref(), Some(url.as_str()));
    let object_path = format!("profiles/{}.webp", student.id);
    assert!(fixture.backend.object(&object_path).is_some());

    store.remove_student_image(&student.id).await.unwrap();

    assert!(fixture.backend.object(&object_path).is_none());
    assert!(store.state().students()[0].student.profile_image.is_none());
    assert!(fixture.backend.row("students", &student.id).unwrap()["profile_image"].is_null());
}

#[tokio::test]
async fn test_remove_image_for_unloaded_student_is_rejected() {
    let fixture = TestFixture::new().await;
    let mut store = fixture.store();

    let result = store.remove_student_image("ghost").await;
    assert!(matches!(result, Err(AppError::Validation(_))));
    assert!(store.state().error().is_some());
}
