mod common;

use anyhow::Result;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};

#[tokio::test]
async fn sync_from_identity_is_idempotent() -> Result<()> {
    let Some(server) = common::ensure_db_server().await else {
        return Ok(());
    };
    let client = Client::new();
    let sub = common::unique_sub();

    let first = client
        .get(format!("{}/users/me", server.base_url))
        .bearer_auth(common::token(&sub))
        .send()
        .await?;
    assert_eq!(first.status(), StatusCode::OK);
    let first: Value = first.json().await?;

    let second = client
        .get(format!("{}/users/me", server.base_url))
        .bearer_auth(common::token(&sub))
        .send()
        .await?
        .json::<Value>()
        .await?;

    assert_eq!(first["id"], second["id"], "same external id, same user");

    let rows = sqlx::query_scalar::<_, i64>("SELECT count(*) FROM users WHERE external_id = $1")
        .bind(&sub)
        .fetch_one(server.pool.as_ref().unwrap())
        .await?;
    assert_eq!(rows, 1, "exactly one row per external id");

    // Profile claims flowed into the directory row; the external id did not
    // flow out.
    assert!(first["displayName"].as_str().unwrap_or("").starts_with("User "));
    assert!(first.get("externalId").is_none());
    assert!(first.get("external_id").is_none());
    Ok(())
}

#[tokio::test]
async fn user_detail_carries_fixed_include_graph() -> Result<()> {
    let Some(server) = common::ensure_db_server().await else {
        return Ok(());
    };
    let client = Client::new();
    let sub = common::unique_sub();

    let me: Value = client
        .get(format!("{}/users/me", server.base_url))
        .bearer_auth(common::token(&sub))
        .send()
        .await?
        .json()
        .await?;

    for key in ["enrollments", "submissions", "gradesGiven", "reflectionResponses"] {
        assert!(me[key].is_array(), "missing {} in detail view", key);
    }

    // Same shape from the public directory read.
    let shown: Value = client
        .get(format!("{}/users/{}", server.base_url, me["id"].as_str().unwrap()))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(shown["id"], me["id"]);
    assert!(shown["enrollments"].is_array());
    Ok(())
}

#[tokio::test]
async fn unknown_user_id_is_not_found() -> Result<()> {
    let Some(server) = common::ensure_db_server().await else {
        return Ok(());
    };
    let client = Client::new();

    let res = client
        .get(format!(
            "{}/users/00000000-0000-0000-0000-000000000000",
            server.base_url
        ))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let body: Value = res.json().await?;
    assert!(body["message"].as_str().unwrap().contains("User"));
    assert!(body["message"]
        .as_str()
        .unwrap()
        .contains("00000000-0000-0000-0000-000000000000"));
    Ok(())
}

#[tokio::test]
async fn duplicate_enrollment_is_a_conflict() -> Result<()> {
    let Some(server) = common::ensure_db_server().await else {
        return Ok(());
    };
    let pool = server.pool.as_ref().unwrap();
    let client = Client::new();
    let sub = common::unique_sub();

    let course_id = common::seed_course(pool, "Databases").await?;
    let student_id = common::seed_user(pool, "Student").await?;

    let body = json!({
        "userId": student_id,
        "courseId": course_id,
        "role": "STUDENT",
    });

    let first = client
        .post(format!("{}/enrollments", server.base_url))
        .bearer_auth(common::token(&sub))
        .json(&body)
        .send()
        .await?;
    assert_eq!(first.status(), StatusCode::CREATED);

    // The store's unique constraint rejects the duplicate; no pre-check.
    let second = client
        .post(format!("{}/enrollments", server.base_url))
        .bearer_auth(common::token(&sub))
        .json(&body)
        .send()
        .await?;
    assert_eq!(second.status(), StatusCode::CONFLICT);
    let body: Value = second.json().await?;
    assert_eq!(body["statusCode"], 409);
    Ok(())
}
