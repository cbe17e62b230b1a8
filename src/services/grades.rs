use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::api::shape::{SubmissionRef, UserRef};
use crate::database::models::{Grade, GradeChange, User};
use crate::error::ServiceError;
use crate::services::activity;
use crate::services::assignments::parse_uuid;

#[derive(Clone)]
pub struct GradeService {
    pool: PgPool,
}

pub struct GradeDetail {
    pub grade: Grade,
    pub submission: SubmissionRef,
    pub grader: UserRef,
    /// Change history, newest first.
    pub changes: Vec<(GradeChange, UserRef)>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateGradeDto {
    pub submission_id: Option<String>,
    pub score: Option<f64>,
    /// Defaults to the assignment's max points when omitted.
    pub max_score: Option<f64>,
    pub feedback: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateGradeDto {
    pub score: Option<f64>,
    pub max_score: Option<f64>,
    pub feedback: Option<String>,
    /// Reason recorded in the change history when the score moves.
    pub reason: Option<String>,
}

impl GradeService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_all(
        &self,
    ) -> Result<Vec<(Grade, SubmissionRef, UserRef)>, ServiceError> {
        let rows = sqlx::query_as::<_, GradeJoinedRow>(GRADE_JOIN_SQL)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(GradeJoinedRow::split).collect())
    }

    pub async fn find_one(&self, id: Uuid) -> Result<GradeDetail, ServiceError> {
        let sql = format!("{} WHERE g.id = $1", GRADE_JOIN_SQL);
        let (grade, submission, grader) = sqlx::query_as::<_, GradeJoinedRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ServiceError::not_found("Grade", id))?
            .split();

        let changes = sqlx::query_as::<_, GradeChangeRow>(
            "SELECT gc.id, gc.grade_id, gc.previous_score, gc.new_score, gc.reason, \
                    gc.changed_by_id, gc.changed_at, u.display_name, u.email \
             FROM grade_changes gc JOIN users u ON u.id = gc.changed_by_id \
             WHERE gc.grade_id = $1 \
             ORDER BY gc.changed_at DESC",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(GradeChangeRow::split)
        .collect();

        Ok(GradeDetail {
            grade,
            submission,
            grader,
            changes,
        })
    }

    /// Grade a submission. A duplicate grade is rejected by the store's
    /// unique constraint on submission_id, not by a racy pre-check.
    pub async fn create(
        &self,
        dto: CreateGradeDto,
        acting_user: &User,
    ) -> Result<GradeDetail, ServiceError> {
        let submission_id = match dto.submission_id.as_deref() {
            Some(raw) => parse_uuid("submissionId", raw)?,
            None => {
                return Err(ServiceError::invalid(
                    "missing required fields: submissionId",
                ))
            }
        };
        let score = dto
            .score
            .ok_or_else(|| ServiceError::invalid("missing required fields: score"))?;

        let assignment_max = sqlx::query_scalar::<_, f64>(
            "SELECT a.max_points FROM submissions s \
             JOIN assignments a ON a.id = s.assignment_id WHERE s.id = $1",
        )
        .bind(submission_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| ServiceError::not_found("Submission", submission_id))?;

        let grade = sqlx::query_as::<_, Grade>(
            "INSERT INTO grades (submission_id, score, max_score, feedback, graded_by_id) \
             VALUES ($1, $2, $3, $4, $5) RETURNING *",
        )
        .bind(submission_id)
        .bind(score)
        .bind(dto.max_score.unwrap_or(assignment_max))
        .bind(&dto.feedback)
        .bind(acting_user.id)
        .fetch_one(&self.pool)
        .await?;

        activity::record(
            &self.pool,
            acting_user.id,
            "grade.created",
            "Grade",
            Some(grade.id),
            Some(json!({ "score": score })),
        )
        .await;

        self.find_one(grade.id).await
    }

    /// Partial update. A score change appends a GradeChange row in the same
    /// transaction. Concurrent edits are last-write-wins at the store layer;
    /// the history is the audit compensation.
    pub async fn update(
        &self,
        id: Uuid,
        dto: UpdateGradeDto,
        acting_user: &User,
    ) -> Result<GradeDetail, ServiceError> {
        let mut tx = self.pool.begin().await?;

        let existing = sqlx::query_as::<_, Grade>("SELECT * FROM grades WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| ServiceError::not_found("Grade", id))?;

        let new_score = dto.score.unwrap_or(existing.score);

        sqlx::query(
            "UPDATE grades SET score = $2, max_score = $3, feedback = $4, updated_at = now() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(new_score)
        .bind(dto.max_score.unwrap_or(existing.max_score))
        .bind(dto.feedback.or(existing.feedback))
        .execute(&mut *tx)
        .await?;

        if new_score != existing.score {
            sqlx::query(
                "INSERT INTO grade_changes (grade_id, previous_score, new_score, reason, changed_by_id) \
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(id)
            .bind(existing.score)
            .bind(new_score)
            .bind(&dto.reason)
            .bind(acting_user.id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        activity::record(
            &self.pool,
            acting_user.id,
            "grade.updated",
            "Grade",
            Some(id),
            None,
        )
        .await;

        self.find_one(id).await
    }
}

const GRADE_JOIN_SQL: &str =
    "SELECT g.*, s.assignment_id, s.student_id, s.submitted_at, \
            u.display_name, u.email \
     FROM grades g \
     JOIN submissions s ON s.id = g.submission_id \
     JOIN users u ON u.id = g.graded_by_id";

#[derive(sqlx::FromRow)]
struct GradeJoinedRow {
    id: Uuid,
    submission_id: Uuid,
    score: f64,
    max_score: f64,
    feedback: Option<String>,
    graded_by_id: Uuid,
    graded_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    assignment_id: Uuid,
    student_id: Uuid,
    submitted_at: DateTime<Utc>,
    display_name: String,
    email: String,
}

impl GradeJoinedRow {
    fn split(self) -> (Grade, SubmissionRef, UserRef) {
        (
            Grade {
                id: self.id,
                submission_id: self.submission_id,
                score: self.score,
                max_score: self.max_score,
                feedback: self.feedback,
                graded_by_id: self.graded_by_id,
                graded_at: self.graded_at,
                updated_at: self.updated_at,
            },
            SubmissionRef {
                id: self.submission_id,
                assignment_id: self.assignment_id,
                student_id: self.student_id,
                submitted_at: self.submitted_at,
            },
            UserRef {
                id: self.graded_by_id,
                display_name: self.display_name,
                email: self.email,
            },
        )
    }
}

#[derive(sqlx::FromRow)]
struct GradeChangeRow {
    id: Uuid,
    grade_id: Uuid,
    previous_score: f64,
    new_score: f64,
    reason: Option<String>,
    changed_by_id: Uuid,
    changed_at: DateTime<Utc>,
    display_name: String,
    email: String,
}

impl GradeChangeRow {
    fn split(self) -> (GradeChange, UserRef) {
        (
            GradeChange {
                id: self.id,
                grade_id: self.grade_id,
                previous_score: self.previous_score,
                new_score: self.new_score,
                reason: self.reason,
                changed_by_id: self.changed_by_id,
                changed_at: self.changed_at,
            },
            UserRef {
                id: self.changed_by_id,
                display_name: self.display_name,
                email: self.email,
            },
        )
    }
}
