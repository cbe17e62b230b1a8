use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::api::shape::{AssignmentRef, GradeRef, UserRef};
use crate::database::models::{
    AssignmentKind, Comment, ReflectionResponse, SkillTag, Submission, User,
};
use crate::error::ServiceError;
use crate::services::activity;
use crate::services::assignments::parse_uuid;

#[derive(Clone)]
pub struct SubmissionService {
    pool: PgPool,
}

pub struct SubmissionDetail {
    pub submission: Submission,
    pub assignment: AssignmentRef,
    pub student: UserRef,
    pub grade: Option<GradeRef>,
    pub comments: Vec<(Comment, UserRef)>,
    pub reflection: Option<(ReflectionResponse, Vec<SkillTag>)>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSubmissionDto {
    pub assignment_id: Option<String>,
    pub content: Option<String>,
    pub file_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCommentDto {
    pub body: Option<String>,
    pub parent_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateReflectionDto {
    pub answers: Vec<String>,
    #[serde(default)]
    pub skill_tag_ids: Vec<String>,
}

impl SubmissionService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_all(
        &self,
    ) -> Result<Vec<(Submission, AssignmentRef, UserRef, Option<GradeRef>)>, ServiceError> {
        let rows = sqlx::query_as::<_, SubmissionJoinedRow>(SUBMISSION_JOIN_SQL)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(SubmissionJoinedRow::split).collect())
    }

    pub async fn find_one(&self, id: Uuid) -> Result<SubmissionDetail, ServiceError> {
        let sql = format!("{} WHERE s.id = $1", SUBMISSION_JOIN_SQL);
        let (submission, assignment, student, grade) =
            sqlx::query_as::<_, SubmissionJoinedRow>(&sql)
                .bind(id)
                .fetch_optional(&self.pool)
                .await?
                .ok_or_else(|| ServiceError::not_found("Submission", id))?
                .split();

        // Comments come back in store order; callers treat the thread tree
        // as unordered.
        let comments = sqlx::query_as::<_, CommentAuthorRow>(
            "SELECT c.id, c.submission_id, c.author_id, c.parent_id, c.body, c.created_at, \
                    u.display_name, u.email \
             FROM comments c JOIN users u ON u.id = c.author_id \
             WHERE c.submission_id = $1",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(CommentAuthorRow::split)
        .collect();

        let reflection = self.load_reflection(id).await?;

        Ok(SubmissionDetail {
            submission,
            assignment,
            student,
            grade,
            comments,
            reflection,
        })
    }

    /// Create a submission for the acting user. The student id is always
    /// the synced directory user, never client input.
    pub async fn create(
        &self,
        dto: CreateSubmissionDto,
        acting_user: &User,
    ) -> Result<SubmissionDetail, ServiceError> {
        let assignment_id = match dto.assignment_id.as_deref() {
            Some(raw) => parse_uuid("assignmentId", raw)?,
            None => return Err(ServiceError::invalid("missing required fields: assignmentId")),
        };

        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM assignments WHERE id = $1)",
        )
        .bind(assignment_id)
        .fetch_one(&self.pool)
        .await?;
        if !exists {
            return Err(ServiceError::not_found("Assignment", assignment_id));
        }

        let submission = sqlx::query_as::<_, Submission>(
            "INSERT INTO submissions (assignment_id, student_id, content, file_url) \
             VALUES ($1, $2, $3, $4) RETURNING *",
        )
        .bind(assignment_id)
        .bind(acting_user.id)
        .bind(&dto.content)
        .bind(&dto.file_url)
        .fetch_one(&self.pool)
        .await?;

        activity::record(
            &self.pool,
            acting_user.id,
            "submission.created",
            "Submission",
            Some(submission.id),
            None,
        )
        .await;

        self.find_one(submission.id).await
    }

    /// Add a comment. A parent comment, when given, must exist and belong
    /// to the same submission -- the thread tree is kept consistent by
    /// construction, not by the store.
    pub async fn add_comment(
        &self,
        submission_id: Uuid,
        dto: CreateCommentDto,
        acting_user: &User,
    ) -> Result<(Comment, UserRef), ServiceError> {
        let body = match dto.body {
            Some(body) if !body.is_empty() => body,
            _ => return Err(ServiceError::invalid("missing required fields: body")),
        };

        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM submissions WHERE id = $1)",
        )
        .bind(submission_id)
        .fetch_one(&self.pool)
        .await?;
        if !exists {
            return Err(ServiceError::not_found("Submission", submission_id));
        }

        let parent_id = match dto.parent_id.as_deref() {
            Some(raw) => {
                let parent_id = parse_uuid("parentId", raw)?;
                let parent_submission = sqlx::query_scalar::<_, Uuid>(
                    "SELECT submission_id FROM comments WHERE id = $1",
                )
                .bind(parent_id)
                .fetch_optional(&self.pool)
                .await?
                .ok_or_else(|| ServiceError::not_found("Comment", parent_id))?;
                if parent_submission != submission_id {
                    return Err(ServiceError::invalid(
                        "parent comment belongs to a different submission",
                    ));
                }
                Some(parent_id)
            }
            None => None,
        };

        let comment = sqlx::query_as::<_, Comment>(
            "INSERT INTO comments (submission_id, author_id, parent_id, body) \
             VALUES ($1, $2, $3, $4) RETURNING *",
        )
        .bind(submission_id)
        .bind(acting_user.id)
        .bind(parent_id)
        .bind(&body)
        .fetch_one(&self.pool)
        .await?;

        activity::record(
            &self.pool,
            acting_user.id,
            "comment.created",
            "Comment",
            Some(comment.id),
            None,
        )
        .await;

        Ok((comment, UserRef::from(acting_user)))
    }

    /// Record a reflection response. Only valid when the submission's
    /// assignment is REFLECTION-typed and carries a template; selected tags
    /// must be a subset of the template's tag set. A second response hits
    /// the store's unique constraint and surfaces as a conflict.
    pub async fn submit_reflection(
        &self,
        submission_id: Uuid,
        dto: CreateReflectionDto,
        acting_user: &User,
    ) -> Result<(ReflectionResponse, Vec<SkillTag>), ServiceError> {
        let assignment = sqlx::query_as::<_, SubmissionAssignmentKindRow>(
            "SELECT a.id, a.kind FROM submissions s \
             JOIN assignments a ON a.id = s.assignment_id WHERE s.id = $1",
        )
        .bind(submission_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| ServiceError::not_found("Submission", submission_id))?;

        if assignment.kind != AssignmentKind::Reflection {
            return Err(ServiceError::invalid(
                "submission's assignment is not a REFLECTION assignment",
            ));
        }

        let template_id = sqlx::query_scalar::<_, Uuid>(
            "SELECT id FROM reflection_templates WHERE assignment_id = $1",
        )
        .bind(assignment.id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| {
            ServiceError::invalid("assignment has no reflection template")
        })?;

        let tag_ids = dto
            .skill_tag_ids
            .iter()
            .map(|raw| parse_uuid("skillTagIds", raw))
            .collect::<Result<Vec<_>, _>>()?;

        if !tag_ids.is_empty() {
            let allowed = sqlx::query_scalar::<_, i64>(
                "SELECT count(*) FROM reflection_template_tags \
                 WHERE template_id = $1 AND tag_id = ANY($2)",
            )
            .bind(template_id)
            .bind(&tag_ids)
            .fetch_one(&self.pool)
            .await?;
            if allowed != tag_ids.len() as i64 {
                return Err(ServiceError::invalid(
                    "selected skill tags must come from the assignment's template",
                ));
            }
        }

        let mut tx = self.pool.begin().await?;

        let response = sqlx::query_as::<_, ReflectionResponse>(
            "INSERT INTO reflection_responses (submission_id, template_id, answers) \
             VALUES ($1, $2, $3) RETURNING *",
        )
        .bind(submission_id)
        .bind(template_id)
        .bind(json!(dto.answers))
        .fetch_one(&mut *tx)
        .await?;

        for tag_id in &tag_ids {
            sqlx::query(
                "INSERT INTO reflection_response_tags (response_id, tag_id) VALUES ($1, $2)",
            )
            .bind(response.id)
            .bind(tag_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        activity::record(
            &self.pool,
            acting_user.id,
            "reflection.submitted",
            "ReflectionResponse",
            Some(response.id),
            None,
        )
        .await;

        let tags = sqlx::query_as::<_, SkillTag>(
            "SELECT t.* FROM skill_tags t \
             JOIN reflection_response_tags j ON j.tag_id = t.id \
             WHERE j.response_id = $1",
        )
        .bind(response.id)
        .fetch_all(&self.pool)
        .await?;

        Ok((response, tags))
    }

    async fn load_reflection(
        &self,
        submission_id: Uuid,
    ) -> Result<Option<(ReflectionResponse, Vec<SkillTag>)>, ServiceError> {
        let response = sqlx::query_as::<_, ReflectionResponse>(
            "SELECT * FROM reflection_responses WHERE submission_id = $1",
        )
        .bind(submission_id)
        .fetch_optional(&self.pool)
        .await?;

        match response {
            None => Ok(None),
            Some(response) => {
                let tags = sqlx::query_as::<_, SkillTag>(
                    "SELECT t.* FROM skill_tags t \
                     JOIN reflection_response_tags j ON j.tag_id = t.id \
                     WHERE j.response_id = $1",
                )
                .bind(response.id)
                .fetch_all(&self.pool)
                .await?;
                Ok(Some((response, tags)))
            }
        }
    }
}

const SUBMISSION_JOIN_SQL: &str =
    "SELECT s.*, a.title, a.kind, a.due_date, a.max_points, \
            u.display_name, u.email, \
            g.id AS grade_id, g.score, g.max_score, g.graded_at \
     FROM submissions s \
     JOIN assignments a ON a.id = s.assignment_id \
     JOIN users u ON u.id = s.student_id \
     LEFT JOIN grades g ON g.submission_id = s.id";

#[derive(sqlx::FromRow)]
struct SubmissionJoinedRow {
    id: Uuid,
    assignment_id: Uuid,
    student_id: Uuid,
    content: Option<String>,
    file_url: Option<String>,
    submitted_at: DateTime<Utc>,
    title: String,
    kind: AssignmentKind,
    due_date: DateTime<Utc>,
    max_points: f64,
    display_name: String,
    email: String,
    grade_id: Option<Uuid>,
    score: Option<f64>,
    max_score: Option<f64>,
    graded_at: Option<DateTime<Utc>>,
}

impl SubmissionJoinedRow {
    fn split(self) -> (Submission, AssignmentRef, UserRef, Option<GradeRef>) {
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
            Submission {
                id: self.id,
                assignment_id: self.assignment_id,
                student_id: self.student_id,
                content: self.content,
                file_url: self.file_url,
                submitted_at: self.submitted_at,
            },
            AssignmentRef {
                id: self.assignment_id,
                title: self.title,
                kind: self.kind,
                due_date: self.due_date,
                max_points: self.max_points,
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

#[derive(sqlx::FromRow)]
struct SubmissionAssignmentKindRow {
    id: Uuid,
    kind: AssignmentKind,
}

#[derive(sqlx::FromRow)]
struct CommentAuthorRow {
    id: Uuid,
    submission_id: Uuid,
    author_id: Uuid,
    parent_id: Option<Uuid>,
    body: String,
    created_at: DateTime<Utc>,
    display_name: String,
    email: String,
}

impl CommentAuthorRow {
    fn split(self) -> (Comment, UserRef) {
        (
            Comment {
                id: self.id,
                submission_id: self.submission_id,
                author_id: self.author_id,
                parent_id: self.parent_id,
                body: self.body,
                created_at: self.created_at,
            },
            UserRef {
                id: self.author_id,
                display_name: self.display_name,
                email: self.email,
            },
        )
    }
}
