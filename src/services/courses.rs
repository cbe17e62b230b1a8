use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::api::shape::{AssignmentRef, UserRef};
use crate::database::models::{Course, Enrollment, EnrollmentRole};
use crate::error::ServiceError;

#[derive(Clone)]
pub struct CourseService {
    pool: PgPool,
}

pub struct CourseDetail {
    pub course: Course,
    pub creator: UserRef,
    pub enrollments: Vec<(Enrollment, UserRef)>,
    pub assignments: Vec<AssignmentRef>,
}

impl CourseService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// List view: every course with its creator reference.
    pub async fn find_all(&self) -> Result<Vec<(Course, UserRef)>, ServiceError> {
        let rows = sqlx::query_as::<_, CourseCreatorRow>(
            "SELECT c.*, u.display_name AS creator_name, u.email AS creator_email \
             FROM courses c JOIN users u ON u.id = c.created_by_id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(CourseCreatorRow::split).collect())
    }

    /// Detail view: the list shape plus enrollments (with user references)
    /// and assignment references.
    pub async fn find_one(&self, id: Uuid) -> Result<CourseDetail, ServiceError> {
        let (course, creator) = sqlx::query_as::<_, CourseCreatorRow>(
            "SELECT c.*, u.display_name AS creator_name, u.email AS creator_email \
             FROM courses c JOIN users u ON u.id = c.created_by_id WHERE c.id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| ServiceError::not_found("Course", id))?
        .split();

        let enrollments = sqlx::query_as::<_, EnrollmentUserRow>(
            "SELECT e.id, e.user_id, e.course_id, e.role, e.created_at, \
                    u.display_name, u.email \
             FROM enrollments e JOIN users u ON u.id = e.user_id \
             WHERE e.course_id = $1",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(EnrollmentUserRow::split)
        .collect();

        let assignments = sqlx::query_as::<_, AssignmentRef>(
            "SELECT id, title, kind, due_date, max_points FROM assignments WHERE course_id = $1",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        Ok(CourseDetail {
            course,
            creator,
            enrollments,
            assignments,
        })
    }
}

#[derive(sqlx::FromRow)]
struct CourseCreatorRow {
    id: Uuid,
    code: String,
    title: String,
    semester: String,
    created_by_id: Uuid,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    creator_name: String,
    creator_email: String,
}

impl CourseCreatorRow {
    fn split(self) -> (Course, UserRef) {
        (
            Course {
                id: self.id,
                code: self.code,
                title: self.title,
                semester: self.semester,
                created_by_id: self.created_by_id,
                created_at: self.created_at,
                updated_at: self.updated_at,
            },
            UserRef {
                id: self.created_by_id,
                display_name: self.creator_name,
                email: self.creator_email,
            },
        )
    }
}

#[derive(sqlx::FromRow)]
struct EnrollmentUserRow {
    id: Uuid,
    user_id: Uuid,
    course_id: Uuid,
    role: EnrollmentRole,
    created_at: DateTime<Utc>,
    display_name: String,
    email: String,
}

impl EnrollmentUserRow {
    fn split(self) -> (Enrollment, UserRef) {
        (
            Enrollment {
                id: self.id,
                user_id: self.user_id,
                course_id: self.course_id,
                role: self.role,
                created_at: self.created_at,
            },
            UserRef {
                id: self.user_id,
                display_name: self.display_name,
                email: self.email,
            },
        )
    }
}
