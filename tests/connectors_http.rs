//! HTTP client contract tests against a local mock server

use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use campaign_engine::config::{ChatConfig, MailerConfig, ModelConfig};
use campaign_engine::connectors::chat::ChatClient;
use campaign_engine::connectors::mailer::MailPlatformClient;
use campaign_engine::connectors::model::ModelClient;
use campaign_engine::connectors::{ChatPoster, LanguageModel, MailPlatform};

fn mailer_for(server: &MockServer) -> MailPlatformClient {
    MailPlatformClient::new(&MailerConfig {
        base_url: server.uri(),
        api_key: "test-key".into(),
    })
    .unwrap()
}

#[tokio::test]
async fn list_statistics_decode() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v3/contacts/lists/7/statistics"))
        .and(header("api-key", "test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "total": 1200,
            "subscribed": 1150,
            "unsubscribed": 40,
            "blocked": 10,
            "recentBounces": 3
        })))
        .mount(&server)
        .await;

    let stats = mailer_for(&server).get_list_statistics(7).await.unwrap();
    assert_eq!(stats.total, 1200);
    assert_eq!(stats.recent_bounces, 3);
}

#[tokio::test]
async fn server_errors_are_retryable_client_errors_are_not() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v3/emailCampaigns/1"))
        .respond_with(ResponseTemplate::new(502).set_body_string("upstream down"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v3/emailCampaigns/2"))
        .respond_with(ResponseTemplate::new(404).set_body_string("no such draft"))
        .mount(&server)
        .await;

    let mailer = mailer_for(&server);
    let transient = mailer.get_draft(1).await.unwrap_err();
    assert!(transient.is_retryable());

    let permanent = mailer.get_draft(2).await.unwrap_err();
    assert!(!permanent.is_retryable());
}

#[tokio::test]
async fn send_now_returns_receipt() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v3/emailCampaigns/501/sendNow"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "messageId": "send-501",
            "queuedCount": 1177,
            "sendStartAt": "2025-10-02T09:15:03Z"
        })))
        .mount(&server)
        .await;

    let receipt = mailer_for(&server).send_campaign_now(501).await.unwrap();
    assert_eq!(receipt.message_id, "send-501");
    assert_eq!(receipt.queued_count, 1177);
}

#[tokio::test]
async fn chat_post_sends_channel_and_blocks() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat.postMessage"))
        .and(body_partial_json(json!({
            "channel": "#campaigns",
            "text": "fallback line"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "messageId": "msg-77",
            "ts": "1759395300.000100"
        })))
        .mount(&server)
        .await;

    let chat = ChatClient::new(&ChatConfig {
        base_url: server.uri(),
        token: "bot-token".into(),
        channel: "#campaigns".into(),
    })
    .unwrap();

    let blocks = json!([{ "type": "section" }]);
    let receipt = chat
        .post_message("#campaigns", &blocks, "fallback line")
        .await
        .unwrap();
    assert_eq!(receipt.message_id, "msg-77");
}

#[tokio::test]
async fn chat_validation_failure_is_fatal() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat.postMessage"))
        .respond_with(ResponseTemplate::new(422).set_body_string("invalid blocks"))
        .mount(&server)
        .await;

    let chat = ChatClient::new(&ChatConfig {
        base_url: server.uri(),
        token: "bot-token".into(),
        channel: "#campaigns".into(),
    })
    .unwrap();

    let err = chat
        .post_message("#campaigns", &json!([]), "fallback")
        .await
        .unwrap_err();
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn model_generate_returns_text() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/generate"))
        .and(body_partial_json(json!({ "prompt": "assess this list" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "text": "{\"healthScore\": 90}"
        })))
        .mount(&server)
        .await;

    let model = ModelClient::new(&ModelConfig {
        base_url: server.uri(),
        api_key: "model-key".into(),
    })
    .unwrap();

    let text = model.generate("assess this list").await.unwrap();
    assert!(text.contains("healthScore"));
}
