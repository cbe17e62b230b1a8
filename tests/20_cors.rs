mod common;

use anyhow::Result;
use reqwest::Client;

#[tokio::test]
async fn preflight_from_allow_listed_origin_echoes_it() -> Result<()> {
    let server = common::ensure_server().await;
    let client = Client::new();

    let res = client
        .request(
            reqwest::Method::OPTIONS,
            format!("{}/courses", server.base_url),
        )
        .header("Origin", common::ALLOWED_ORIGIN)
        .header("Access-Control-Request-Method", "GET")
        .header("Access-Control-Request-Headers", "authorization")
        .send()
        .await?;

    assert_eq!(
        res.status(),
        reqwest::StatusCode::NO_CONTENT,
        "preflight must be 204"
    );
    let allow_origin = res
        .headers()
        .get("access-control-allow-origin")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    assert_eq!(allow_origin, common::ALLOWED_ORIGIN);
    assert_eq!(
        res.headers()
            .get("access-control-allow-credentials")
            .and_then(|v| v.to_str().ok()),
        Some("true")
    );
    Ok(())
}

#[tokio::test]
async fn preflight_from_unlisted_origin_gets_no_allow_header() -> Result<()> {
    let server = common::ensure_server().await;
    let client = Client::new();

    let res = client
        .request(
            reqwest::Method::OPTIONS,
            format!("{}/courses", server.base_url),
        )
        .header("Origin", "http://not-allowed.test")
        .header("Access-Control-Request-Method", "GET")
        .send()
        .await?;

    assert!(res.headers().get("access-control-allow-origin").is_none());
    Ok(())
}

#[tokio::test]
async fn no_wildcard_in_allow_origin() -> Result<()> {
    let server = common::ensure_server().await;
    let client = Client::new();

    let res = client
        .get(format!("{}/health", server.base_url))
        .header("Origin", common::ALLOWED_ORIGIN)
        .send()
        .await?;

    let allow_origin = res
        .headers()
        .get("access-control-allow-origin")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    assert_ne!(allow_origin, "*");
    assert_eq!(allow_origin, common::ALLOWED_ORIGIN);
    Ok(())
}
