mod common;

use anyhow::Result;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};

/// Seed an assignment and a submission over the API; returns their ids.
async fn seed_submission(
    server: &common::TestServer,
    client: &Client,
    grader_sub: &str,
    student_sub: &str,
    max_points: f64,
) -> Result<(String, String)> {
    let pool = server.pool.as_ref().unwrap();
    let course_id = common::seed_course(pool, "Graded Course").await?;

    let assignment: Value = client
        .post(format!("{}/assignments", server.base_url))
        .bearer_auth(common::token(grader_sub))
        .json(&json!({
            "title": "Problem set",
            "kind": "FILE",
            "maxPoints": max_points,
            "dueDate": "2025-12-01T00:00:00.000Z",
            "courseId": course_id,
        }))
        .send()
        .await?
        .json()
        .await?;
    let assignment_id = assignment["id"].as_str().unwrap().to_string();

    let submission: Value = client
        .post(format!("{}/submissions", server.base_url))
        .bearer_auth(common::token(student_sub))
        .json(&json!({ "assignmentId": assignment_id, "fileUrl": "s3://bucket/ps.pdf" }))
        .send()
        .await?
        .json()
        .await?;
    Ok((assignment_id, submission["id"].as_str().unwrap().to_string()))
}

#[tokio::test]
async fn create_defaults_max_score_to_assignment_max_points() -> Result<()> {
    let Some(server) = common::ensure_db_server().await else {
        return Ok(());
    };
    let client = Client::new();
    let grader = common::unique_sub();
    let student = common::unique_sub();

    let (_, submission_id) = seed_submission(server, &client, &grader, &student, 75.0).await?;

    let res = client
        .post(format!("{}/grades", server.base_url))
        .bearer_auth(common::token(&grader))
        .json(&json!({ "submissionId": submission_id, "score": 60 }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::CREATED);
    let body: Value = res.json().await?;
    assert_eq!(body["score"], 60.0);
    assert_eq!(body["maxScore"], 75.0);
    assert_eq!(body["submission"]["id"].as_str().unwrap(), submission_id);
    assert!(body["changes"].as_array().unwrap().is_empty());
    Ok(())
}

#[tokio::test]
async fn duplicate_grade_is_a_conflict() -> Result<()> {
    let Some(server) = common::ensure_db_server().await else {
        return Ok(());
    };
    let client = Client::new();
    let grader = common::unique_sub();
    let student = common::unique_sub();

    let (_, submission_id) = seed_submission(server, &client, &grader, &student, 10.0).await?;

    let body = json!({ "submissionId": submission_id, "score": 8 });
    let first = client
        .post(format!("{}/grades", server.base_url))
        .bearer_auth(common::token(&grader))
        .json(&body)
        .send()
        .await?;
    assert_eq!(first.status(), StatusCode::CREATED);

    // One grade per submission, enforced by the store's unique constraint.
    let second = client
        .post(format!("{}/grades", server.base_url))
        .bearer_auth(common::token(&grader))
        .json(&body)
        .send()
        .await?;
    assert_eq!(second.status(), StatusCode::CONFLICT);
    Ok(())
}

#[tokio::test]
async fn score_changes_append_history_newest_first() -> Result<()> {
    let Some(server) = common::ensure_db_server().await else {
        return Ok(());
    };
    let client = Client::new();
    let grader = common::unique_sub();
    let student = common::unique_sub();

    let (_, submission_id) = seed_submission(server, &client, &grader, &student, 100.0).await?;

    let created: Value = client
        .post(format!("{}/grades", server.base_url))
        .bearer_auth(common::token(&grader))
        .json(&json!({ "submissionId": submission_id, "score": 70 }))
        .send()
        .await?
        .json()
        .await?;
    let grade_id = created["id"].as_str().unwrap().to_string();

    // Feedback-only update: no history entry.
    let after_feedback: Value = client
        .patch(format!("{}/grades/{}", server.base_url, grade_id))
        .bearer_auth(common::token(&grader))
        .json(&json!({ "feedback": "solid" }))
        .send()
        .await?
        .json()
        .await?;
    assert!(after_feedback["changes"].as_array().unwrap().is_empty());

    let _first_bump: Value = client
        .patch(format!("{}/grades/{}", server.base_url, grade_id))
        .bearer_auth(common::token(&grader))
        .json(&json!({ "score": 80, "reason": "regrade request" }))
        .send()
        .await?
        .json()
        .await?;

    let second_bump: Value = client
        .patch(format!("{}/grades/{}", server.base_url, grade_id))
        .bearer_auth(common::token(&grader))
        .json(&json!({ "score": 85, "reason": "rubric correction" }))
        .send()
        .await?
        .json()
        .await?;

    let changes = second_bump["changes"].as_array().unwrap();
    assert_eq!(changes.len(), 2);
    // Newest first.
    assert_eq!(changes[0]["previousScore"], 80.0);
    assert_eq!(changes[0]["newScore"], 85.0);
    assert_eq!(changes[0]["reason"], "rubric correction");
    assert_eq!(changes[1]["previousScore"], 70.0);
    assert_eq!(changes[1]["newScore"], 80.0);
    assert!(changes[0]["changedBy"]["displayName"].is_string());

    // The detail endpoint agrees.
    let detail: Value = client
        .get(format!("{}/grades/{}", server.base_url, grade_id))
        .bearer_auth(common::token(&grader))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(detail["score"], 85.0);
    assert_eq!(detail["changes"].as_array().unwrap().len(), 2);
    Ok(())
}

#[tokio::test]
async fn grading_a_missing_submission_is_not_found() -> Result<()> {
    let Some(server) = common::ensure_db_server().await else {
        return Ok(());
    };
    let client = Client::new();
    let grader = common::unique_sub();

    let res = client
        .post(format!("{}/grades", server.base_url))
        .bearer_auth(common::token(&grader))
        .json(&json!({
            "submissionId": "00000000-0000-0000-0000-000000000000",
            "score": 1,
        }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let body: Value = res.json().await?;
    assert!(body["message"].as_str().unwrap().contains("Submission"));
    Ok(())
}
