//! Staff login against a live database.

#![allow(clippy::unwrap_used)]

use dreampos_integration_tests::TestContext;

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_wrong_password_sets_no_cookies() {
    let ctx = TestContext::new().await;
    let (username, _) = ctx.employee("cashier", &["CASHIER"]).await;

    let response = ctx
        .client
        .post(ctx.url("/auth/login"))
        .json(&serde_json::json!({ "username": username, "password": "not the password" }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 401);
    assert!(response.headers().get_all("set-cookie").iter().next().is_none());
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_login_sets_session_and_csrf_cookies() {
    let ctx = TestContext::new().await;
    let (username, _) = ctx.employee("cashier", &["CASHIER"]).await;

    let response = ctx
        .client
        .post(ctx.url("/auth/login"))
        .json(&serde_json::json!({ "username": username, "password": dreampos_integration_tests::PASSWORD }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let cookies: Vec<String> = response
        .headers()
        .get_all("set-cookie")
        .iter()
        .map(|v| v.to_str().unwrap().to_owned())
        .collect();
    let session = cookies.iter().find(|c| c.starts_with("SESSION-TOKEN=")).unwrap();
    let csrf = cookies.iter().find(|c| c.starts_with("X-XSRF-TOKEN=")).unwrap();
    assert!(session.contains("HttpOnly"));
    assert!(!csrf.contains("HttpOnly"));

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["redirectPath"], "/newOrder");
    assert_eq!(body["currency"], "USD");
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_api_requires_matching_csrf_header() {
    let ctx = TestContext::new().await;
    let (username, _) = ctx.employee("manager", &["MANAGER"]).await;
    let csrf = ctx.login(&username).await;

    let without = ctx.client.get(ctx.url("/api/me")).send().await.unwrap();
    assert_eq!(without.status(), 404);

    let with = ctx
        .client
        .get(ctx.url("/api/me"))
        .header("X-XSRF-TOKEN", &csrf)
        .send()
        .await
        .unwrap();
    assert_eq!(with.status(), 200);
    let me: serde_json::Value = with.json().await.unwrap();
    assert_eq!(me["username"], username);
}
