//! Telegram notifier against a mock Bot API server.

use mockito::{Matcher, Server};
use tenant_warden::adapters::notify::TelegramNotifier;
use tenant_warden::domain::models::{NotifierConfig, WardenEvent};
use tenant_warden::domain::ports::{NotifyError, Notifier};

fn config(api_base: String) -> NotifierConfig {
    NotifierConfig {
        telegram_bot_token: Some("test-token".to_string()),
        telegram_chat_id: Some("-1001234".to_string()),
        api_base,
        timeout_secs: 5,
    }
}

#[tokio::test]
async fn test_posts_plain_text_form() {
    let mut server = Server::new_async().await;
    let message = WardenEvent::WorkloadEvicted {
        tenant: "acme".to_string(),
        namespace: "tenant-acme".to_string(),
        workload: "miner".to_string(),
        image: "registry.local/miner:6".to_string(),
        reason: "no matching signatures".to_string(),
    }
    .to_message();

    let mock = server
        .mock("POST", "/bottest-token/sendMessage")
        .match_header("content-type", "application/x-www-form-urlencoded")
        .match_body(Matcher::AllOf(vec![
            Matcher::UrlEncoded("chat_id".to_string(), "-1001234".to_string()),
            Matcher::UrlEncoded("text".to_string(), message.clone()),
        ]))
        .with_status(200)
        .with_body(r#"{"ok":true}"#)
        .create_async()
        .await;

    let notifier = TelegramNotifier::from_config(&config(server.url())).unwrap();
    notifier.notify(&message).await.unwrap();

    mock.assert_async().await;
}

#[tokio::test]
async fn test_non_success_status_is_rejected() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/bottest-token/sendMessage")
        .with_status(400)
        .with_body(r#"{"ok":false,"description":"Bad Request: chat not found"}"#)
        .create_async()
        .await;

    let notifier = TelegramNotifier::from_config(&config(server.url())).unwrap();
    let err = notifier.notify("hello").await.unwrap_err();

    match err {
        NotifyError::Rejected { status, body } => {
            assert_eq!(status, 400);
            assert!(body.contains("chat not found"));
        }
        other => panic!("unexpected error {other:?}"),
    }
    mock.assert_async().await;
}

#[tokio::test]
async fn test_unreachable_endpoint_is_a_request_failure() {
    let notifier = TelegramNotifier::from_config(&config("http://127.0.0.1:9".to_string())).unwrap();
    let err = notifier.notify("hello").await.unwrap_err();
    assert!(matches!(err, NotifyError::RequestFailed(_)));
}
