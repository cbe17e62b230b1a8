//! Persisted record types, one struct per table. Wire shaping lives in
//! `api::shape`; these map 1:1 onto the schema in `migrations/`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub external_id: String,
    pub display_name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Course {
    pub id: Uuid,
    pub code: String,
    pub title: String,
    pub semester: String,
    pub created_by_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "enrollment_role", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum EnrollmentRole {
    Student,
    Instructor,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Enrollment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub course_id: Uuid,
    pub role: EnrollmentRole,
    pub created_at: DateTime<Utc>,
}

/// Closed set of assignment types. `Reflection` assignments may carry a
/// template and accept reflection responses on their submissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "assignment_kind", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum AssignmentKind {
    File,
    Text,
    Reflection,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Assignment {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub kind: AssignmentKind,
    pub max_points: f64,
    pub due_date: DateTime<Utc>,
    pub is_published: bool,
    pub course_id: Uuid,
    pub created_by_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Submission {
    pub id: Uuid,
    pub assignment_id: Uuid,
    pub student_id: Uuid,
    pub content: Option<String>,
    pub file_url: Option<String>,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Grade {
    pub id: Uuid,
    pub submission_id: Uuid,
    pub score: f64,
    pub max_score: f64,
    pub feedback: Option<String>,
    pub graded_by_id: Uuid,
    pub graded_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct GradeChange {
    pub id: Uuid,
    pub grade_id: Uuid,
    pub previous_score: f64,
    pub new_score: f64,
    pub reason: Option<String>,
    pub changed_by_id: Uuid,
    pub changed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Comment {
    pub id: Uuid,
    pub submission_id: Uuid,
    pub author_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ReflectionTemplate {
    pub id: Uuid,
    pub assignment_id: Uuid,
    /// jsonb array of prompt strings.
    pub prompts: Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SkillTag {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ReflectionResponse {
    pub id: Uuid,
    pub submission_id: Uuid,
    pub template_id: Uuid,
    /// jsonb array of answer strings, parallel to the template prompts.
    pub answers: Value,
    pub submitted_at: DateTime<Utc>,
}
