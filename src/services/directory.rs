//! User directory: maps external subject ids to internal user rows.
//!
//! Users are created lazily ("sync-on-first-use"): a valid credential alone
//! does not imply a row exists until sync has run at least once.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::api::shape::{AssignmentRef, CourseRef, GradeRef, SubmissionRef};
use crate::auth::Claims;
use crate::database::models::{AssignmentKind, Enrollment, EnrollmentRole, ReflectionResponse, User};
use crate::error::ServiceError;
use crate::services::activity;

#[derive(Clone)]
pub struct DirectoryService {
    pool: PgPool,
}

/// Detail view bundle for one user.
pub struct UserDetail {
    pub user: User,
    pub enrollments: Vec<(Enrollment, CourseRef)>,
    pub submissions: Vec<(SubmissionRef, AssignmentRef, Option<GradeRef>)>,
    pub grades_given: Vec<GradeRef>,
    pub reflections: Vec<ReflectionResponse>,
}

impl DirectoryService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Look up the user for a verified claim, creating the row on first
    /// sight. Idempotent and race-safe: the insert relies on the store's
    /// unique constraint on external_id rather than a pre-check.
    pub async fn sync_from_identity(&self, claims: &Claims) -> Result<User, ServiceError> {
        let inserted = sqlx::query(
            "INSERT INTO users (external_id, display_name, email) VALUES ($1, $2, $3) \
             ON CONFLICT (external_id) DO NOTHING",
        )
        .bind(&claims.sub)
        .bind(claims.display_name())
        .bind(claims.email_or_empty())
        .execute(&self.pool)
        .await?;

        let user = self.lookup_by_external_id(&claims.sub).await?;

        if inserted.rows_affected() > 0 {
            tracing::info!("synced new user {} from identity provider", user.id);
            activity::record(&self.pool, user.id, "user.synced", "User", Some(user.id), None)
                .await;
        }

        Ok(user)
    }

    /// Fails with NotFound when no user has been synced for the external id.
    pub async fn lookup_by_external_id(&self, external_id: &str) -> Result<User, ServiceError> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE external_id = $1")
            .bind(external_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ServiceError::not_found("User", external_id))
    }

    pub async fn find_all(&self) -> Result<Vec<User>, ServiceError> {
        Ok(sqlx::query_as::<_, User>("SELECT * FROM users")
            .fetch_all(&self.pool)
            .await?)
    }

    pub async fn find_one(&self, id: Uuid) -> Result<UserDetail, ServiceError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ServiceError::not_found("User", id))?;

        let enrollments = sqlx::query_as::<_, EnrollmentCourseRow>(
            "SELECT e.id, e.user_id, e.course_id, e.role, e.created_at, \
                    c.code, c.title, c.semester \
             FROM enrollments e JOIN courses c ON c.id = e.course_id \
             WHERE e.user_id = $1",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(EnrollmentCourseRow::split)
        .collect();

        let submissions = sqlx::query_as::<_, SubmissionAssignmentRow>(
            "SELECT s.id, s.assignment_id, s.student_id, s.submitted_at, \
                    a.title AS assignment_title, a.kind AS assignment_kind, \
                    a.due_date, a.max_points, \
                    g.id AS grade_id, g.score, g.max_score, g.graded_at \
             FROM submissions s \
             JOIN assignments a ON a.id = s.assignment_id \
             LEFT JOIN grades g ON g.submission_id = s.id \
             WHERE s.student_id = $1",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(SubmissionAssignmentRow::split)
        .collect();

        let grades_given = sqlx::query_as::<_, GradeRef>(
            "SELECT id, score, max_score, graded_at FROM grades WHERE graded_by_id = $1",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        let reflections = sqlx::query_as::<_, ReflectionResponse>(
            "SELECT r.* FROM reflection_responses r \
             JOIN submissions s ON s.id = r.submission_id \
             WHERE s.student_id = $1",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        Ok(UserDetail {
            user,
            enrollments,
            submissions,
            grades_given,
            reflections,
        })
    }
}

#[derive(sqlx::FromRow)]
struct EnrollmentCourseRow {
    id: Uuid,
    user_id: Uuid,
    course_id: Uuid,
    role: EnrollmentRole,
    created_at: DateTime<Utc>,
    code: String,
    title: String,
    semester: String,
}

impl EnrollmentCourseRow {
    fn split(self) -> (Enrollment, CourseRef) {
        (
            Enrollment {
                id: self.id,
                user_id: self.user_id,
                course_id: self.course_id,
                role: self.role,
                created_at: self.created_at,
            },
            CourseRef {
                id: self.course_id,
                code: self.code,
                title: self.title,
                semester: self.semester,
            },
        )
    }
}

#[derive(sqlx::FromRow)]
struct SubmissionAssignmentRow {
    id: Uuid,
    assignment_id: Uuid,
    student_id: Uuid,
    submitted_at: DateTime<Utc>,
    assignment_title: String,
    assignment_kind: AssignmentKind,
    due_date: DateTime<Utc>,
    max_points: f64,
    grade_id: Option<Uuid>,
    score: Option<f64>,
    max_score: Option<f64>,
    graded_at: Option<DateTime<Utc>>,
}

impl SubmissionAssignmentRow {
    fn split(self) -> (SubmissionRef, AssignmentRef, Option<GradeRef>) {
        let grade = match (self.grade_id, self.score, self.max_score, self.graded_at) {
            (Some(id), Some(score), Some(max_score), Some(graded_at)) => Some(GradeRef {
                id,
                score,
                max_score,
                graded_at,
            }),
            _ => None,
        };
        (
            SubmissionRef {
                id: self.id,
                assignment_id: self.assignment_id,
                student_id: self.student_id,
                submitted_at: self.submitted_at,
            },
            AssignmentRef {
                id: self.assignment_id,
                title: self.assignment_title,
                kind: self.assignment_kind,
                due_date: self.due_date,
                max_points: self.max_points,
            },
            grade,
        )
    }
}
