use serde::Deserialize;
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::database::models::{Enrollment, EnrollmentRole, User};
use crate::error::ServiceError;
use crate::services::activity;
use crate::services::assignments::parse_uuid;

#[derive(Clone)]
pub struct EnrollmentService {
    pool: PgPool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEnrollmentDto {
    pub user_id: Option<String>,
    pub course_id: Option<String>,
    pub role: Option<String>,
}

impl EnrollmentService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Enroll a user in a course. A duplicate (user, course) pair is
    /// rejected by the store's unique constraint -- no racy pre-check.
    pub async fn create(
        &self,
        dto: CreateEnrollmentDto,
        acting_user: &User,
    ) -> Result<Enrollment, ServiceError> {
        let user_id = match dto.user_id.as_deref() {
            Some(raw) => parse_uuid("userId", raw)?,
            None => return Err(ServiceError::invalid("missing required fields: userId")),
        };
        let course_id = match dto.course_id.as_deref() {
            Some(raw) => parse_uuid("courseId", raw)?,
            None => return Err(ServiceError::invalid("missing required fields: courseId")),
        };
        let role = match dto.role.as_deref() {
            None | Some("STUDENT") => EnrollmentRole::Student,
            Some("INSTRUCTOR") => EnrollmentRole::Instructor,
            Some(other) => {
                return Err(ServiceError::invalid(format!(
                    "role must be STUDENT or INSTRUCTOR (got \"{}\")",
                    other
                )))
            }
        };

        let user_exists =
            sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM users WHERE id = $1)")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?;
        if !user_exists {
            return Err(ServiceError::not_found("User", user_id));
        }
        let course_exists =
            sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM courses WHERE id = $1)")
                .bind(course_id)
                .fetch_one(&self.pool)
                .await?;
        if !course_exists {
            return Err(ServiceError::not_found("Course", course_id));
        }

        let enrollment = sqlx::query_as::<_, Enrollment>(
            "INSERT INTO enrollments (user_id, course_id, role) \
             VALUES ($1, $2, $3) RETURNING *",
        )
        .bind(user_id)
        .bind(course_id)
        .bind(role)
        .fetch_one(&self.pool)
        .await
        .map_err(duplicate_enrollment)?;

        activity::record(
            &self.pool,
            acting_user.id,
            "enrollment.created",
            "Enrollment",
            Some(enrollment.id),
            Some(json!({ "courseId": course_id, "userId": user_id })),
        )
        .await;

        Ok(enrollment)
    }
}

/// Give the unique-constraint collision a friendlier message than the
/// generic sanitized one.
fn duplicate_enrollment(err: sqlx::Error) -> ServiceError {
    if let Some(db_err) = err.as_database_error() {
        if db_err.code().as_deref() == Some("23505") {
            return ServiceError::Conflict("user is already enrolled in this course".into());
        }
    }
    ServiceError::Database(err)
}
