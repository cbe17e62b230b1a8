use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::api::shape::{CourseRef, GradeRef, SubmissionRef, UserRef};
use crate::database::models::{
    Assignment, AssignmentKind, ReflectionTemplate, SkillTag, User,
};
use crate::error::ServiceError;
use crate::services::activity;

#[derive(Clone)]
pub struct AssignmentService {
    pool: PgPool,
}

pub struct AssignmentDetail {
    pub assignment: Assignment,
    pub course: CourseRef,
    pub creator: UserRef,
    pub template: Option<(ReflectionTemplate, Vec<SkillTag>)>,
    pub submissions: Vec<(SubmissionRef, UserRef, Option<GradeRef>)>,
}

/// Creation payload. Ids and dates arrive as strings so malformed input is
/// reported as a validation failure rather than a deserialization error.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAssignmentDto {
    pub title: Option<String>,
    pub description: Option<String>,
    pub kind: Option<String>,
    pub max_points: Option<f64>,
    pub due_date: Option<String>,
    pub course_id: Option<String>,
    pub is_published: Option<bool>,
    pub reflection_template: Option<ReflectionTemplateDto>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReflectionTemplateDto {
    pub prompts: Vec<String>,
    #[serde(default)]
    pub skill_tag_ids: Vec<String>,
}

/// Partial update; absent fields are left untouched.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAssignmentDto {
    pub title: Option<String>,
    pub description: Option<String>,
    pub kind: Option<String>,
    pub max_points: Option<f64>,
    pub due_date: Option<String>,
    pub is_published: Option<bool>,
}

impl AssignmentService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_all(&self) -> Result<Vec<(Assignment, CourseRef, UserRef)>, ServiceError> {
        let rows = sqlx::query_as::<_, AssignmentJoinedRow>(
            "SELECT a.*, c.code, c.title AS course_title, c.semester, \
                    u.display_name AS creator_name, u.email AS creator_email \
             FROM assignments a \
             JOIN courses c ON c.id = a.course_id \
             JOIN users u ON u.id = a.created_by_id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(AssignmentJoinedRow::split).collect())
    }

    pub async fn find_one(&self, id: Uuid) -> Result<AssignmentDetail, ServiceError> {
        let (assignment, course, creator) = sqlx::query_as::<_, AssignmentJoinedRow>(
            "SELECT a.*, c.code, c.title AS course_title, c.semester, \
                    u.display_name AS creator_name, u.email AS creator_email \
             FROM assignments a \
             JOIN courses c ON c.id = a.course_id \
             JOIN users u ON u.id = a.created_by_id \
             WHERE a.id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| ServiceError::not_found("Assignment", id))?
        .split();

        let template = self.load_template(assignment.id).await?;

        let submissions = sqlx::query_as::<_, SubmissionStudentRow>(
            "SELECT s.id, s.assignment_id, s.student_id, s.submitted_at, \
                    u.display_name, u.email, \
                    g.id AS grade_id, g.score, g.max_score, g.graded_at \
             FROM submissions s \
             JOIN users u ON u.id = s.student_id \
             LEFT JOIN grades g ON g.submission_id = s.id \
             WHERE s.assignment_id = $1",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(SubmissionStudentRow::split)
        .collect();

        Ok(AssignmentDetail {
            assignment,
            course,
            creator,
            template,
            submissions,
        })
    }

    /// Create an assignment, stamping `created_by_id` from the acting user
    /// (never from client input). An embedded reflection template is only
    /// accepted when the assignment kind is REFLECTION.
    pub async fn create(
        &self,
        dto: CreateAssignmentDto,
        acting_user: &User,
    ) -> Result<AssignmentDetail, ServiceError> {
        let mut missing = Vec::new();
        if dto.title.as_deref().map_or(true, str::is_empty) {
            missing.push("title");
        }
        if dto.kind.is_none() {
            missing.push("kind");
        }
        if dto.max_points.is_none() {
            missing.push("maxPoints");
        }
        if dto.due_date.is_none() {
            missing.push("dueDate");
        }
        if dto.course_id.is_none() {
            missing.push("courseId");
        }
        if !missing.is_empty() {
            return Err(ServiceError::invalid(format!(
                "missing required fields: {}",
                missing.join(", ")
            )));
        }

        let title = dto.title.unwrap_or_default();
        let kind = parse_kind(dto.kind.as_deref().unwrap_or_default())?;
        let due_date = parse_instant("dueDate", dto.due_date.as_deref().unwrap_or_default())?;
        let course_id = parse_uuid("courseId", dto.course_id.as_deref().unwrap_or_default())?;

        if dto.reflection_template.is_some() && kind != AssignmentKind::Reflection {
            return Err(ServiceError::invalid(
                "reflectionTemplate is only valid for REFLECTION assignments",
            ));
        }

        let course_exists =
            sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM courses WHERE id = $1)")
                .bind(course_id)
                .fetch_one(&self.pool)
                .await?;
        if !course_exists {
            return Err(ServiceError::not_found("Course", course_id));
        }

        let mut tx = self.pool.begin().await?;

        let assignment = sqlx::query_as::<_, Assignment>(
            "INSERT INTO assignments \
                 (title, description, kind, max_points, due_date, is_published, course_id, created_by_id) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             RETURNING *",
        )
        .bind(&title)
        .bind(&dto.description)
        .bind(kind)
        .bind(dto.max_points.unwrap_or_default())
        .bind(due_date)
        .bind(dto.is_published.unwrap_or(false))
        .bind(course_id)
        .bind(acting_user.id)
        .fetch_one(&mut *tx)
        .await?;

        if let Some(template) = dto.reflection_template {
            let tag_ids = template
                .skill_tag_ids
                .iter()
                .map(|raw| parse_uuid("skillTagIds", raw))
                .collect::<Result<Vec<_>, _>>()?;

            let known = sqlx::query_scalar::<_, i64>(
                "SELECT count(*) FROM skill_tags WHERE id = ANY($1)",
            )
            .bind(&tag_ids)
            .fetch_one(&mut *tx)
            .await?;
            if known != tag_ids.len() as i64 {
                return Err(ServiceError::invalid("unknown skill tag id"));
            }

            let template_id = sqlx::query_scalar::<_, Uuid>(
                "INSERT INTO reflection_templates (assignment_id, prompts) \
                 VALUES ($1, $2) RETURNING id",
            )
            .bind(assignment.id)
            .bind(json!(template.prompts))
            .fetch_one(&mut *tx)
            .await?;

            for tag_id in &tag_ids {
                sqlx::query(
                    "INSERT INTO reflection_template_tags (template_id, tag_id) VALUES ($1, $2)",
                )
                .bind(template_id)
                .bind(tag_id)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;

        activity::record(
            &self.pool,
            acting_user.id,
            "assignment.created",
            "Assignment",
            Some(assignment.id),
            Some(json!({ "title": title })),
        )
        .await;

        self.find_one(assignment.id).await
    }

    /// Partial update: only supplied fields are re-validated and applied.
    pub async fn update(
        &self,
        id: Uuid,
        dto: UpdateAssignmentDto,
        acting_user: &User,
    ) -> Result<AssignmentDetail, ServiceError> {
        let existing = sqlx::query_as::<_, Assignment>("SELECT * FROM assignments WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ServiceError::not_found("Assignment", id))?;

        let kind = match dto.kind.as_deref() {
            Some(raw) => parse_kind(raw)?,
            None => existing.kind,
        };
        let due_date = match dto.due_date.as_deref() {
            Some(raw) => parse_instant("dueDate", raw)?,
            None => existing.due_date,
        };

        sqlx::query(
            "UPDATE assignments SET title = $2, description = $3, kind = $4, \
                 max_points = $5, due_date = $6, is_published = $7, updated_at = now() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(dto.title.unwrap_or(existing.title))
        .bind(dto.description.or(existing.description))
        .bind(kind)
        .bind(dto.max_points.unwrap_or(existing.max_points))
        .bind(due_date)
        .bind(dto.is_published.unwrap_or(existing.is_published))
        .execute(&self.pool)
        .await?;

        activity::record(
            &self.pool,
            acting_user.id,
            "assignment.updated",
            "Assignment",
            Some(id),
            None,
        )
        .await;

        self.find_one(id).await
    }

    /// Hard delete. The store cascades to submissions, grades, comments and
    /// reflection responses; the title is captured first for the
    /// confirmation message.
    pub async fn delete(&self, id: Uuid, acting_user: &User) -> Result<String, ServiceError> {
        let title =
            sqlx::query_scalar::<_, String>("DELETE FROM assignments WHERE id = $1 RETURNING title")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?
                .ok_or_else(|| ServiceError::not_found("Assignment", id))?;

        activity::record(
            &self.pool,
            acting_user.id,
            "assignment.deleted",
            "Assignment",
            Some(id),
            Some(json!({ "title": title })),
        )
        .await;

        Ok(format!("Assignment \"{}\" deleted", title))
    }

    async fn load_template(
        &self,
        assignment_id: Uuid,
    ) -> Result<Option<(ReflectionTemplate, Vec<SkillTag>)>, ServiceError> {
        let template = sqlx::query_as::<_, ReflectionTemplate>(
            "SELECT * FROM reflection_templates WHERE assignment_id = $1",
        )
        .bind(assignment_id)
        .fetch_optional(&self.pool)
        .await?;

        match template {
            None => Ok(None),
            Some(template) => {
                let tags = sqlx::query_as::<_, SkillTag>(
                    "SELECT t.* FROM skill_tags t \
                     JOIN reflection_template_tags j ON j.tag_id = t.id \
                     WHERE j.template_id = $1",
                )
                .bind(template.id)
                .fetch_all(&self.pool)
                .await?;
                Ok(Some((template, tags)))
            }
        }
    }
}

pub(crate) fn parse_kind(raw: &str) -> Result<AssignmentKind, ServiceError> {
    match raw {
        "FILE" => Ok(AssignmentKind::File),
        "TEXT" => Ok(AssignmentKind::Text),
        "REFLECTION" => Ok(AssignmentKind::Reflection),
        other => Err(ServiceError::invalid(format!(
            "kind must be one of FILE, TEXT, REFLECTION (got \"{}\")",
            other
        ))),
    }
}

pub(crate) fn parse_instant(field: &str, raw: &str) -> Result<DateTime<Utc>, ServiceError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| ServiceError::invalid(format!("{} must be an ISO-8601 date string", field)))
}

pub(crate) fn parse_uuid(field: &str, raw: &str) -> Result<Uuid, ServiceError> {
    Uuid::parse_str(raw).map_err(|_| ServiceError::invalid(format!("{} must be a uuid", field)))
}

#[derive(sqlx::FromRow)]
struct AssignmentJoinedRow {
    id: Uuid,
    title: String,
    description: Option<String>,
    kind: AssignmentKind,
    max_points: f64,
    due_date: DateTime<Utc>,
    is_published: bool,
    course_id: Uuid,
    created_by_id: Uuid,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    code: String,
    course_title: String,
    semester: String,
    creator_name: String,
    creator_email: String,
}

impl AssignmentJoinedRow {
    fn split(self) -> (Assignment, CourseRef, UserRef) {
        (
            Assignment {
                id: self.id,
                title: self.title,
                description: self.description,
                kind: self.kind,
                max_points: self.max_points,
                due_date: self.due_date,
                is_published: self.is_published,
                course_id: self.course_id,
                created_by_id: self.created_by_id,
                created_at: self.created_at,
                updated_at: self.updated_at,
            },
            CourseRef {
                id: self.course_id,
                code: self.code,
                title: self.course_title,
                semester: self.semester,
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
struct SubmissionStudentRow {
    id: Uuid,
    assignment_id: Uuid,
    student_id: Uuid,
    submitted_at: DateTime<Utc>,
    display_name: String,
    email: String,
    grade_id: Option<Uuid>,
    score: Option<f64>,
    max_score: Option<f64>,
    graded_at: Option<DateTime<Utc>>,
}

impl SubmissionStudentRow {
    fn split(self) -> (SubmissionRef, UserRef, Option<GradeRef>) {
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
            UserRef {
                id: self.student_id,
                display_name: self.display_name,
                email: self.email,
            },
            grade,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_parsing_is_a_closed_set() {
        assert_eq!(parse_kind("TEXT").unwrap(), AssignmentKind::Text);
        assert!(parse_kind("text").is_err());
        assert!(parse_kind("ESSAY").is_err());
    }

    #[test]
    fn instant_parsing_round_trips_iso_strings() {
        let parsed = parse_instant("dueDate", "2025-12-01T00:00:00.000Z").unwrap();
        assert_eq!(
            crate::api::shape::iso8601(parsed),
            "2025-12-01T00:00:00.000Z"
        );
        assert!(parse_instant("dueDate", "next tuesday").is_err());
    }
}
