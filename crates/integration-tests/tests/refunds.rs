//! Refund lifecycle for orders and reservations against a live database.

#![allow(clippy::unwrap_used)]

use dreampos_core::{OrderId, ReservationId};
use dreampos_integration_tests::TestContext;
use dreampos_server::db::{OrderRepository, ReservationRepository};

fn contact() -> serde_json::Value {
    serde_json::json!({
        "name": "Pat Customer",
        "phone": "+15551234567",
        "email": "pat@example.org",
        "reason": "damaged"
    })
}

/// A closed order with a pending refund request.
async fn refund_pending_order(ctx: &TestContext, csrf: &str) -> i64 {
    let coffee = ctx.item("Coffee", "350").await;
    let id = ctx
        .create_order(csrf, serde_json::json!([{ "productId": coffee, "quantity": 1 }]))
        .await;
    assert!(
        OrderRepository::new(&ctx.pool)
            .mark_closed(OrderId::new(id))
            .await
            .unwrap()
    );
    let requested = ctx
        .client
        .post(ctx.url(&format!("/api/order/{id}/refund")))
        .header("X-XSRF-TOKEN", csrf)
        .json(&contact())
        .send()
        .await
        .unwrap();
    assert_eq!(requested.status(), 204);
    assert_eq!(ctx.order_status(id).await, "REFUND_PENDING");
    id
}

/// A completed reservation with a pending refund request.
async fn refund_pending_reservation(ctx: &TestContext, csrf: &str) -> i64 {
    let (_, stylist) = ctx.employee("stylist", &["CASHIER"]).await;
    let service = ctx.service("Haircut", &[stylist]).await;
    let id = ctx.create_reservation(csrf, service).await;
    assert!(
        ReservationRepository::new(&ctx.pool)
            .mark_completed(ReservationId::new(id))
            .await
            .unwrap()
    );
    let requested = ctx
        .client
        .post(ctx.url(&format!("/api/reservation/{id}/refund")))
        .header("X-XSRF-TOKEN", csrf)
        .json(&contact())
        .send()
        .await
        .unwrap();
    assert_eq!(requested.status(), 204);
    assert_eq!(ctx.reservation_status(id).await, "REFUND_PENDING");
    id
}

async fn decide(ctx: &TestContext, csrf: &str, id: i64, action: &str, kind: &str) -> u16 {
    ctx.client
        .post(ctx.url(&format!("/api/refund/{id}/action")))
        .header("X-XSRF-TOKEN", csrf)
        .json(&serde_json::json!({ "action": action, "refundType": kind }))
        .send()
        .await
        .unwrap()
        .status()
        .as_u16()
}

async fn has_order_request(ctx: &TestContext, id: i64) -> bool {
    sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM refund_data WHERE order_id = $1)")
        .bind(id)
        .fetch_one(&ctx.pool)
        .await
        .unwrap()
}

async fn has_reservation_request(ctx: &TestContext, id: i64) -> bool {
    sqlx::query_scalar(
        "SELECT EXISTS (SELECT 1 FROM reservation_refund_data WHERE appointment_id = $1)",
    )
    .bind(id)
    .fetch_one(&ctx.pool)
    .await
    .unwrap()
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_order_refund_approved_offline() {
    let ctx = TestContext::new().await;
    let (username, _) = ctx.employee("cashier", &["CASHIER", "MANAGER"]).await;
    let csrf = ctx.login(&username).await;

    let coffee = ctx.item("Coffee", "350").await;
    let bagel = ctx.item("Bagel", "200").await;

    let created = ctx
        .client
        .post(ctx.url("/api/order"))
        .header("X-XSRF-TOKEN", &csrf)
        .json(&serde_json::json!({
            "items": [
                { "productId": coffee, "quantity": 2 },
                { "productId": bagel, "quantity": 1 }
            ]
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(created.status(), 201);
    let id = created.json::<serde_json::Value>().await.unwrap()["id"]
        .as_i64()
        .unwrap();

    assert!(
        OrderRepository::new(&ctx.pool)
            .mark_closed(OrderId::new(id))
            .await
            .unwrap()
    );

    let requested = ctx
        .client
        .post(ctx.url(&format!("/api/order/{id}/refund")))
        .header("X-XSRF-TOKEN", &csrf)
        .json(&serde_json::json!({
            "name": "Pat Customer",
            "phone": "+15551234567",
            "email": "pat@example.org",
            "reason": "damaged"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(requested.status(), 204);

    let pending: Vec<serde_json::Value> = ctx
        .client
        .get(ctx.url("/api/refund"))
        .header("X-XSRF-TOKEN", &csrf)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let entry = pending
        .iter()
        .find(|r| r["orderId"].as_i64() == Some(id))
        .unwrap();
    assert_eq!(entry["refundType"], "order");
    assert_eq!(entry["reason"], "damaged");

    let approved = ctx
        .client
        .post(ctx.url(&format!("/api/refund/{id}/action")))
        .header("X-XSRF-TOKEN", &csrf)
        .json(&serde_json::json!({ "action": "approve", "refundType": "order" }))
        .send()
        .await
        .unwrap();
    assert_eq!(approved.status(), 200);

    let status: String =
        sqlx::query_scalar("SELECT status::TEXT FROM order_data WHERE id = $1")
            .bind(id)
            .fetch_one(&ctx.pool)
            .await
            .unwrap();
    assert_eq!(status, "REFUNDED");

    let metadata: bool =
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM refund_data WHERE order_id = $1)")
            .bind(id)
            .fetch_one(&ctx.pool)
            .await
            .unwrap();
    assert!(!metadata);

    let pending: Vec<serde_json::Value> = ctx
        .client
        .get(ctx.url("/api/refund"))
        .header("X-XSRF-TOKEN", &csrf)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(pending.iter().all(|r| r["orderId"].as_i64() != Some(id)));

    // A second decision finds nothing open.
    let again = ctx
        .client
        .post(ctx.url(&format!("/api/refund/{id}/action")))
        .header("X-XSRF-TOKEN", &csrf)
        .json(&serde_json::json!({ "action": "approve", "refundType": "order" }))
        .send()
        .await
        .unwrap();
    assert_eq!(again.status(), 409);
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_order_refund_disapproved_restores_closed() {
    let ctx = TestContext::new().await;
    let (username, _) = ctx.employee("manager", &["MANAGER"]).await;
    let csrf = ctx.login(&username).await;
    let id = refund_pending_order(&ctx, &csrf).await;

    assert_eq!(decide(&ctx, &csrf, id, "disapprove", "order").await, 200);
    assert_eq!(ctx.order_status(id).await, "CLOSED");
    assert!(!has_order_request(&ctx, id).await);

    // A fresh request is possible again after a disapproval.
    let requested = ctx
        .client
        .post(ctx.url(&format!("/api/order/{id}/refund")))
        .header("X-XSRF-TOKEN", &csrf)
        .json(&contact())
        .send()
        .await
        .unwrap();
    assert_eq!(requested.status(), 204);
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_order_refund_withdrawn() {
    let ctx = TestContext::new().await;
    let (username, _) = ctx.employee("cashier", &["CASHIER"]).await;
    let csrf = ctx.login(&username).await;
    let id = refund_pending_order(&ctx, &csrf).await;

    let withdrawn = ctx
        .client
        .delete(ctx.url(&format!("/api/order/{id}/refund")))
        .header("X-XSRF-TOKEN", &csrf)
        .send()
        .await
        .unwrap();
    assert_eq!(withdrawn.status(), 204);
    assert_eq!(ctx.order_status(id).await, "CLOSED");
    assert!(!has_order_request(&ctx, id).await);

    let again = ctx
        .client
        .delete(ctx.url(&format!("/api/order/{id}/refund")))
        .header("X-XSRF-TOKEN", &csrf)
        .send()
        .await
        .unwrap();
    assert_eq!(again.status(), 409);
    assert_eq!(decide(&ctx, &csrf, id, "approve", "order").await, 409);
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_reservation_refund_approved_offline() {
    let ctx = TestContext::new().await;
    let (username, _) = ctx.employee("manager", &["MANAGER", "RECEPTIONIST"]).await;
    let csrf = ctx.login(&username).await;
    let id = refund_pending_reservation(&ctx, &csrf).await;

    let pending: Vec<serde_json::Value> = ctx
        .client
        .get(ctx.url("/api/refund"))
        .header("X-XSRF-TOKEN", &csrf)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(
        pending
            .iter()
            .any(|r| r["refundType"] == "reservation" && r["reservationId"].as_i64() == Some(id))
    );

    assert_eq!(decide(&ctx, &csrf, id, "approve", "reservation").await, 200);
    assert_eq!(ctx.reservation_status(id).await, "REFUNDED");
    assert!(!has_reservation_request(&ctx, id).await);

    assert_eq!(decide(&ctx, &csrf, id, "approve", "reservation").await, 409);
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_reservation_refund_disapproved_restores_completed() {
    let ctx = TestContext::new().await;
    let (username, _) = ctx.employee("manager", &["MANAGER", "RECEPTIONIST"]).await;
    let csrf = ctx.login(&username).await;
    let id = refund_pending_reservation(&ctx, &csrf).await;

    assert_eq!(decide(&ctx, &csrf, id, "disapprove", "reservation").await, 200);
    assert_eq!(ctx.reservation_status(id).await, "COMPLETED");
    assert!(!has_reservation_request(&ctx, id).await);
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_reservation_refund_withdrawn() {
    let ctx = TestContext::new().await;
    let (username, _) = ctx.employee("desk", &["RECEPTIONIST"]).await;
    let csrf = ctx.login(&username).await;
    let id = refund_pending_reservation(&ctx, &csrf).await;

    let withdrawn = ctx
        .client
        .delete(ctx.url(&format!("/api/reservation/{id}/refund")))
        .header("X-XSRF-TOKEN", &csrf)
        .send()
        .await
        .unwrap();
    assert_eq!(withdrawn.status(), 204);
    assert_eq!(ctx.reservation_status(id).await, "COMPLETED");
    assert!(!has_reservation_request(&ctx, id).await);
    assert_eq!(decide(&ctx, &csrf, id, "disapprove", "reservation").await, 409);
}
