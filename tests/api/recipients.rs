use quota_mailer::domain::RecipientState;
use quota_mailer::store::RecipientStore;

use crate::helpers::{spawn_app, spreadsheet_base64};

#[tokio::test]
async fn upload_without_backend_secret_is_rejected() {
    let app = spawn_app().await;

    let response = app
        .api_client
        .post(format!("{}/recipients/upload", &app.address))
        .json(&serde_json::json!({ "spreadsheet_base64": "aGVsbG8=" }))
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(response.status().as_u16(), 401);
}

#[tokio::test]
async fn requests_with_a_wrong_backend_secret_are_rejected() {
    let app = spawn_app().await;

    let response = app
        .api_client
        .get(format!("{}/recipients", &app.address))
        .header("X-Backend-Secret", "definitely-not-the-secret")
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(response.status().as_u16(), 401);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Unauthorized");
}

#[tokio::test]
async fn upload_returns_400_for_unreadable_payloads() {
    let app = spawn_app().await;
    let test_cases = vec![
        (serde_json::json!({}), "missing the spreadsheet"),
        (
            serde_json::json!({ "spreadsheet_base64": "%%% not base64 %%%" }),
            "invalid base64",
        ),
        (
            serde_json::json!({ "spreadsheet_base64": "aGVsbG8gd29ybGQ=" }),
            "bytes that are not a workbook",
        ),
    ];

    for (body, description) in test_cases {
        let response = app.post_upload(&body).await;

        assert_eq!(
            400,
            response.status().as_u16(),
            "The API did not return a 400 Bad Request when the payload was {description}."
        );
    }
}

#[tokio::test]
async fn listing_returns_recipients_in_insertion_order() {
    let app = spawn_app().await;
    let emails = app.seed_recipients(3).await;

    let response = app.get_recipients().await;

    assert_eq!(response.status().as_u16(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    let listed: Vec<&str> = body["recipients"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["email"].as_str().unwrap())
        .collect();
    assert_eq!(listed, emails);
    assert_eq!(body["recipients"][0]["state"], "pending");
    assert!(body["recipients"][0]["sent_at"].is_null());
}

#[tokio::test]
async fn upload_stores_the_valid_addresses_of_a_workbook() {
    let app = spawn_app().await;
    let body = serde_json::json!({
        "spreadsheet_base64": spreadsheet_base64(&["a@x.com", " ", "not-an-email"])
    });

    let response = app.post_upload(&body).await;

    assert_eq!(response.status().as_u16(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["accepted"], 1);
    assert_eq!(body["skipped_duplicates"], 0);

    let pending = app.store.select_pending(10).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].email().as_ref(), "a@x.com");
}

#[tokio::test]
async fn upload_reports_addresses_that_were_already_stored() {
    let app = spawn_app().await;
    app.seed_recipients(1).await;
    let body = serde_json::json!({
        "spreadsheet_base64": spreadsheet_base64(&["READER0@example.com", "new@example.com"])
    });

    let response = app.post_upload(&body).await;

    assert_eq!(response.status().as_u16(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["accepted"], 1);
    assert_eq!(body["skipped_duplicates"], 1);
    assert_eq!(
        app.store.count_by_state(RecipientState::Pending).await.unwrap(),
        2
    );
}

#[tokio::test]
async fn upload_of_a_workbook_without_valid_addresses_returns_400() {
    let app = spawn_app().await;
    let body = serde_json::json!({
        "spreadsheet_base64": spreadsheet_base64(&[" ", "not-an-email"])
    });

    let response = app.post_upload(&body).await;

    assert_eq!(response.status().as_u16(), 400);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(
        body["error"],
        "No valid email addresses were found in the spreadsheet."
    );
    assert_eq!(
        app.store.count_by_state(RecipientState::Pending).await.unwrap(),
        0
    );
}
