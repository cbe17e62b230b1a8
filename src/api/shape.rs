//! Wire shaping: internal records in, JSON out.
//!
//! Every function here is pure -- no pool, no clock, no hidden state -- so
//! shaping the same record twice produces byte-identical output. Rules:
//! timestamps become ISO-8601 strings with millisecond precision, nested
//! relations are reduced to reference shapes (id + a few display fields),
//! absent relations serialize as explicit `null`, and collections keep the
//! order the store returned them in.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::database::models::{
    Assignment, AssignmentKind, Comment, Course, Enrollment, Grade, GradeChange,
    ReflectionResponse, ReflectionTemplate, SkillTag, Submission, User,
};

/// `2025-12-01T00:00:00.000Z` -- RFC 3339 with milliseconds and `Z`.
pub fn iso8601(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

// ---------------------------------------------------------------------------
// Reference shapes. These are the minimal field subsets used when one entity
// is embedded inside another's response. A user reference never exposes the
// external subject id.
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRef {
    pub id: Uuid,
    pub display_name: String,
    pub email: String,
}

impl From<&User> for UserRef {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            display_name: user.display_name.clone(),
            email: user.email.clone(),
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CourseRef {
    pub id: Uuid,
    pub code: String,
    pub title: String,
    pub semester: String,
}

impl From<&Course> for CourseRef {
    fn from(course: &Course) -> Self {
        Self {
            id: course.id,
            code: course.code.clone(),
            title: course.title.clone(),
            semester: course.semester.clone(),
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AssignmentRef {
    pub id: Uuid,
    pub title: String,
    pub kind: AssignmentKind,
    pub due_date: DateTime<Utc>,
    pub max_points: f64,
}

impl From<&Assignment> for AssignmentRef {
    fn from(a: &Assignment) -> Self {
        Self {
            id: a.id,
            title: a.title.clone(),
            kind: a.kind,
            due_date: a.due_date,
            max_points: a.max_points,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SubmissionRef {
    pub id: Uuid,
    pub assignment_id: Uuid,
    pub student_id: Uuid,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct GradeRef {
    pub id: Uuid,
    pub score: f64,
    pub max_score: f64,
    pub graded_at: DateTime<Utc>,
}

impl From<&Grade> for GradeRef {
    fn from(g: &Grade) -> Self {
        Self {
            id: g.id,
            score: g.score,
            max_score: g.max_score,
            graded_at: g.graded_at,
        }
    }
}

pub fn user_ref(user: &UserRef) -> Value {
    json!({
        "id": user.id,
        "displayName": user.display_name,
        "email": user.email,
    })
}

pub fn course_ref(course: &CourseRef) -> Value {
    json!({
        "id": course.id,
        "code": course.code,
        "title": course.title,
        "semester": course.semester,
    })
}

pub fn assignment_ref(a: &AssignmentRef) -> Value {
    json!({
        "id": a.id,
        "title": a.title,
        "kind": a.kind,
        "dueDate": iso8601(a.due_date),
        "maxPoints": a.max_points,
    })
}

pub fn submission_ref(s: &SubmissionRef) -> Value {
    json!({
        "id": s.id,
        "assignmentId": s.assignment_id,
        "studentId": s.student_id,
        "submittedAt": iso8601(s.submitted_at),
    })
}

pub fn grade_ref(g: &GradeRef) -> Value {
    json!({
        "id": g.id,
        "score": g.score,
        "maxScore": g.max_score,
        "gradedAt": iso8601(g.graded_at),
    })
}

pub fn skill_tag_ref(tag: &SkillTag) -> Value {
    json!({
        "id": tag.id,
        "name": tag.name,
    })
}

// ---------------------------------------------------------------------------
// Full entity shapes.
// ---------------------------------------------------------------------------

pub fn user(u: &User) -> Value {
    json!({
        "id": u.id,
        "displayName": u.display_name,
        "email": u.email,
        "createdAt": iso8601(u.created_at),
        "updatedAt": iso8601(u.updated_at),
    })
}

/// Directory detail view: the user plus everything hanging off them.
pub fn user_detail(
    u: &User,
    enrollments: &[(Enrollment, CourseRef)],
    submissions: &[(SubmissionRef, AssignmentRef, Option<GradeRef>)],
    grades_given: &[GradeRef],
    reflections: &[ReflectionResponse],
) -> Value {
    let mut value = user(u);
    value["enrollments"] = enrollments
        .iter()
        .map(|(e, course)| {
            json!({
                "id": e.id,
                "role": e.role,
                "createdAt": iso8601(e.created_at),
                "course": course_ref(course),
            })
        })
        .collect();
    value["submissions"] = submissions
        .iter()
        .map(|(s, assignment, grade)| {
            let mut v = submission_ref(s);
            v["assignment"] = assignment_ref(assignment);
            v["grade"] = grade.as_ref().map(grade_ref).unwrap_or(Value::Null);
            v
        })
        .collect();
    value["gradesGiven"] = grades_given.iter().map(grade_ref).collect();
    value["reflectionResponses"] = reflections
        .iter()
        .map(|r| {
            json!({
                "id": r.id,
                "submissionId": r.submission_id,
                "submittedAt": iso8601(r.submitted_at),
            })
        })
        .collect();
    value
}

pub fn course_item(course: &Course, creator: &UserRef) -> Value {
    json!({
        "id": course.id,
        "code": course.code,
        "title": course.title,
        "semester": course.semester,
        "createdById": course.created_by_id,
        "createdAt": iso8601(course.created_at),
        "updatedAt": iso8601(course.updated_at),
        "creator": user_ref(creator),
    })
}

pub fn course_detail(
    course: &Course,
    creator: &UserRef,
    enrollments: &[(Enrollment, UserRef)],
    assignments: &[AssignmentRef],
) -> Value {
    let mut value = course_item(course, creator);
    value["enrollments"] = enrollments
        .iter()
        .map(|(e, user)| {
            json!({
                "id": e.id,
                "role": e.role,
                "createdAt": iso8601(e.created_at),
                "user": user_ref(user),
            })
        })
        .collect();
    value["assignments"] = assignments.iter().map(assignment_ref).collect();
    value
}

pub fn assignment_item(a: &Assignment, course: &CourseRef, creator: &UserRef) -> Value {
    json!({
        "id": a.id,
        "title": a.title,
        "description": a.description,
        "kind": a.kind,
        "maxPoints": a.max_points,
        "dueDate": iso8601(a.due_date),
        "isPublished": a.is_published,
        "createdById": a.created_by_id,
        "createdAt": iso8601(a.created_at),
        "updatedAt": iso8601(a.updated_at),
        "course": course_ref(course),
        "creator": user_ref(creator),
    })
}

pub fn assignment_detail(
    a: &Assignment,
    course: &CourseRef,
    creator: &UserRef,
    template: Option<&(ReflectionTemplate, Vec<SkillTag>)>,
    submissions: &[(SubmissionRef, UserRef, Option<GradeRef>)],
) -> Value {
    let mut value = assignment_item(a, course, creator);
    value["reflectionTemplate"] = template
        .map(|(t, tags)| reflection_template(t, tags))
        .unwrap_or(Value::Null);
    value["submissions"] = submissions
        .iter()
        .map(|(s, student, grade)| {
            let mut v = submission_ref(s);
            v["student"] = user_ref(student);
            v["grade"] = grade.as_ref().map(grade_ref).unwrap_or(Value::Null);
            v
        })
        .collect();
    value
}

pub fn reflection_template(template: &ReflectionTemplate, tags: &[SkillTag]) -> Value {
    json!({
        "id": template.id,
        "assignmentId": template.assignment_id,
        "prompts": template.prompts,
        "createdAt": iso8601(template.created_at),
        "skillTags": tags.iter().map(skill_tag_ref).collect::<Vec<_>>(),
    })
}

pub fn submission_item(
    s: &Submission,
    assignment: &AssignmentRef,
    student: &UserRef,
    grade: Option<&GradeRef>,
) -> Value {
    json!({
        "id": s.id,
        "content": s.content,
        "fileUrl": s.file_url,
        "submittedAt": iso8601(s.submitted_at),
        "assignment": assignment_ref(assignment),
        "student": user_ref(student),
        "grade": grade.map(grade_ref).unwrap_or(Value::Null),
    })
}

pub fn submission_detail(
    s: &Submission,
    assignment: &AssignmentRef,
    student: &UserRef,
    grade: Option<&GradeRef>,
    comments: &[(Comment, UserRef)],
    reflection: Option<&(ReflectionResponse, Vec<SkillTag>)>,
) -> Value {
    let mut value = submission_item(s, assignment, student, grade);
    value["comments"] = comments
        .iter()
        .map(|(c, author)| comment(c, author))
        .collect();
    value["reflectionResponse"] = reflection
        .map(|(r, tags)| reflection_response(r, tags))
        .unwrap_or(Value::Null);
    value
}

pub fn comment(c: &Comment, author: &UserRef) -> Value {
    json!({
        "id": c.id,
        "submissionId": c.submission_id,
        "parentId": c.parent_id,
        "body": c.body,
        "createdAt": iso8601(c.created_at),
        "author": user_ref(author),
    })
}

pub fn reflection_response(r: &ReflectionResponse, tags: &[SkillTag]) -> Value {
    json!({
        "id": r.id,
        "submissionId": r.submission_id,
        "templateId": r.template_id,
        "answers": r.answers,
        "submittedAt": iso8601(r.submitted_at),
        "skillTags": tags.iter().map(skill_tag_ref).collect::<Vec<_>>(),
    })
}

pub fn grade_item(g: &Grade, submission: &SubmissionRef, grader: &UserRef) -> Value {
    json!({
        "id": g.id,
        "score": g.score,
        "maxScore": g.max_score,
        "feedback": g.feedback,
        "gradedAt": iso8601(g.graded_at),
        "updatedAt": iso8601(g.updated_at),
        "submission": submission_ref(submission),
        "grader": user_ref(grader),
    })
}

/// Grade detail: change history is the one collection with an explicit
/// order, newest first (applied by the query, preserved here).
pub fn grade_detail(
    g: &Grade,
    submission: &SubmissionRef,
    grader: &UserRef,
    changes: &[(GradeChange, UserRef)],
) -> Value {
    let mut value = grade_item(g, submission, grader);
    value["changes"] = changes
        .iter()
        .map(|(change, changed_by)| {
            json!({
                "id": change.id,
                "previousScore": change.previous_score,
                "newScore": change.new_score,
                "reason": change.reason,
                "changedAt": iso8601(change.changed_at),
                "changedBy": user_ref(changed_by),
            })
        })
        .collect();
    value
}

pub fn enrollment(e: &Enrollment) -> Value {
    json!({
        "id": e.id,
        "userId": e.user_id,
        "courseId": e.course_id,
        "role": e.role,
        "createdAt": iso8601(e.created_at),
    })
}

pub fn skill_tag(tag: &SkillTag) -> Value {
    json!({
        "id": tag.id,
        "name": tag.name,
        "description": tag.description,
    })
}

/// Confirmation payload for destructive deletes.
pub fn delete_confirmation(id: Uuid, message: String) -> Value {
    json!({
        "id": id,
        "deleted": true,
        "message": message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_user() -> User {
        let at = Utc.with_ymd_and_hms(2025, 12, 1, 0, 0, 0).unwrap();
        User {
            id: Uuid::nil(),
            external_id: "auth0|abc".into(),
            display_name: "Ada".into(),
            email: "ada@example.com".into(),
            created_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn iso8601_uses_millisecond_z_format() {
        let at = Utc.with_ymd_and_hms(2025, 12, 1, 0, 0, 0).unwrap();
        assert_eq!(iso8601(at), "2025-12-01T00:00:00.000Z");
    }

    #[test]
    fn user_shape_never_exposes_external_id() {
        let u = sample_user();
        let full = user(&u);
        let reference = user_ref(&UserRef::from(&u));
        assert!(full.get("externalId").is_none());
        assert!(full.get("external_id").is_none());
        assert!(reference.get("externalId").is_none());
    }

    #[test]
    fn absent_grade_serializes_as_null() {
        let at = Utc.with_ymd_and_hms(2025, 12, 1, 0, 0, 0).unwrap();
        let s = Submission {
            id: Uuid::nil(),
            assignment_id: Uuid::nil(),
            student_id: Uuid::nil(),
            content: None,
            file_url: None,
            submitted_at: at,
        };
        let a = AssignmentRef {
            id: Uuid::nil(),
            title: "Essay 1".into(),
            kind: AssignmentKind::Text,
            due_date: at,
            max_points: 100.0,
        };
        let value = submission_item(&s, &a, &UserRef::from(&sample_user()), None);
        assert_eq!(value["grade"], Value::Null);
        assert_eq!(value["content"], Value::Null);
        assert!(value.as_object().unwrap().contains_key("grade"));
    }

    #[test]
    fn shaping_is_deterministic() {
        let u = sample_user();
        let first = serde_json::to_vec(&user(&u)).unwrap();
        let second = serde_json::to_vec(&user(&u)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn assignment_kind_serializes_upper_case() {
        let at = Utc.with_ymd_and_hms(2025, 12, 1, 0, 0, 0).unwrap();
        let a = AssignmentRef {
            id: Uuid::nil(),
            title: "Essay 1".into(),
            kind: AssignmentKind::Reflection,
            due_date: at,
            max_points: 10.0,
        };
        assert_eq!(assignment_ref(&a)["kind"], "REFLECTION");
    }
}
