//! Guardian model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A guardian attached to exactly one student.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Guardian {
    pub id: String,
    pub student_id: String,
    pub name: String,
    pub relationship: String,
    pub phone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default)]
    pub is_primary: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Guardian fields supplied by the caller; the owning student id is added at insert time.
#[derive(Debug, Clone, Serialize)]
pub struct NewGuardian {
    pub name: String,
    pub relationship: String,
    pub phone: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    pub is_primary: bool,
}

/// Insert row for the guardians table.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct GuardianInsert<'a> {
    pub student_id: &'a str,
    #[serde(flatten)]
    pub guardian: &'a NewGuardian,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct GuardianUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relationship: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_primary: Option<bool>,
}
