//! Reminder deduplication.
//!
//! Run with: TEST_DATABASE_URL=... cargo test --test reminders_integration -- --ignored

mod common;

use axum::http::{Method, StatusCode};
use chrono::{Duration, Utc};
use common::{anonymous_registration, create_event, json_request, parse_response_body, setup};
use domain::models::{ReminderType, TrySendOutcome};
use domain::services::NotificationType;
use serde_json::json;
use tower::ServiceExt;

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn test_try_send_records_once() {
    let ctx = setup().await;
    let event_id = create_event(&ctx.pool, None, Utc::now() + Duration::days(3)).await;
    let created = ctx
        .state
        .registrations
        .create(
            event_id,
            &serde_json::from_value(anonymous_registration()).unwrap(),
        )
        .await
        .unwrap();

    let request = json!({
        "event_id": event_id,
        "registration_id": created.registration.id,
        "reminder_type": "2day",
        "recipient": "guest@example.com"
    });

    let first = ctx
        .app
        .clone()
        .oneshot(json_request(Method::POST, "/api/v1/reminders", &request))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    let body = parse_response_body(first).await;
    assert_eq!(body["outcome"], "sent");
    assert_eq!(body["should_dispatch"], true);

    let second = ctx
        .app
        .clone()
        .oneshot(json_request(Method::POST, "/api/v1/reminders", &request))
        .await
        .unwrap();
    let body = parse_response_body(second).await;
    assert_eq!(body["outcome"], "already_sent");
    assert_eq!(body["should_dispatch"], false);
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn test_concurrent_try_send_has_one_winner() {
    let ctx = setup().await;
    let event_id = create_event(&ctx.pool, None, Utc::now() + Duration::days(8)).await;
    let created = ctx
        .state
        .registrations
        .create(
            event_id,
            &serde_json::from_value(anonymous_registration()).unwrap(),
        )
        .await
        .unwrap();
    let id = created.registration.id;

    let reminders = &ctx.state.reminders;
    let (a, b) = tokio::join!(
        reminders.try_send(event_id, id, ReminderType::OneWeek, "a@example.com"),
        reminders.try_send(event_id, id, ReminderType::OneWeek, "a@example.com"),
    );
    let mut outcomes = [a.unwrap(), b.unwrap()];
    outcomes.sort_by_key(|o| o.label());
    assert_eq!(outcomes, [TrySendOutcome::AlreadySent, TrySendOutcome::Sent]);
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn test_reminder_run_sends_each_reminder_once() {
    let ctx = setup().await;
    let event_id = create_event(&ctx.pool, None, Utc::now() + Duration::hours(24)).await;
    let created = ctx
        .state
        .registrations
        .create(
            event_id,
            &serde_json::from_value(anonymous_registration()).unwrap(),
        )
        .await
        .unwrap();

    let reminders = &ctx.state.reminders;
    let first = reminders
        .run_due(ReminderType::OneDay, Utc::now(), 500)
        .await
        .unwrap();
    assert!(first.sent >= 1);

    let second = reminders
        .run_due(ReminderType::OneDay, Utc::now(), 500)
        .await
        .unwrap();
    assert_eq!(second.sent, 0);

    let recorded: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM event_reminders_sent WHERE registration_id = $1",
    )
    .bind(created.registration.id)
    .fetch_one(&ctx.pool)
    .await
    .unwrap();
    assert_eq!(recorded, 1);
    assert!(ctx.dispatcher.count_of(NotificationType::EventReminder) >= 1);
}
