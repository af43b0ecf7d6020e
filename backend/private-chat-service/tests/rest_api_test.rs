mod common;

use common::spawn_app;
use reqwest::StatusCode;
use serde_json::{json, Value};

#[tokio::test]
async fn health_and_metrics_are_public() {
    let app = spawn_app().await;
    let health = reqwest::get(format!("{}/health", app.base)).await.unwrap();
    assert_eq!(health.status(), StatusCode::OK);
    assert_eq!(health.text().await.unwrap(), "OK");

    let metrics = reqwest::get(format!("{}/metrics", app.base)).await.unwrap();
    assert_eq!(metrics.status(), StatusCode::OK);
}

#[tokio::test]
async fn api_requires_a_valid_bearer_token() {
    let app = spawn_app().await;
    let resp = reqwest::get(format!("{}/unread-count", app.base)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "TOKEN_INVALID");

    let resp = reqwest::Client::new()
        .get(format!("{}/unread-count", app.base))
        .bearer_auth("not-a-jwt")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn append_is_idempotent_and_validated() {
    let app = spawn_app().await;
    let body = json!({"messageId": "r-1", "recipientId": "bob", "text": "hello"});

    let first = app.post("alice", "/messages").json(&body).send().await.unwrap();
    assert_eq!(first.status(), StatusCode::CREATED);
    let first: Value = first.json().await.unwrap();
    assert_eq!(first["data"]["roomId"], "alice_bob");
    assert_eq!(first["data"]["isRead"], false);

    let again = app.post("alice", "/messages").json(&body).send().await.unwrap();
    assert_eq!(again.status(), StatusCode::OK);

    let history = app.data(app.get("bob", "/messages/room/alice_bob")).await;
    assert_eq!(history.as_array().unwrap().len(), 1);

    let resp = app
        .post("alice", "/messages")
        .json(&json!({"recipientId": "alice", "text": "me"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let err: Value = resp.json().await.unwrap();
    assert_eq!(err["code"], "SELF_CONVERSATION_NOT_ALLOWED");

    let resp = app
        .post("alice", "/messages")
        .json(&json!({"recipientId": "bob"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let err: Value = resp.json().await.unwrap();
    assert_eq!(err["code"], "MISSING_FIELDS");
}

#[tokio::test]
async fn history_pages_from_the_newest_message() {
    let app = spawn_app().await;
    for i in 0..5 {
        let resp = app
            .post("alice", "/messages")
            .json(&json!({"recipientId": "bob", "message": format!("m{i}")}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
    }

    let texts = |page: Value| -> Vec<String> {
        page.as_array()
            .unwrap()
            .iter()
            .map(|m| m["text"].as_str().unwrap().to_string())
            .collect()
    };

    let latest = app
        .data(app.get("bob", "/messages/room/alice_bob?limit=2"))
        .await;
    assert_eq!(texts(latest), ["m3", "m4"]);

    let older = app
        .data(app.get("bob", "/messages/room/alice_bob?limit=2&offset=2"))
        .await;
    assert_eq!(texts(older), ["m1", "m2"]);

    let resp = app
        .get("carol", "/messages/room/alice_bob")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let resp = app
        .get("alice", "/messages/room/alice_bob?offset=-1")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = app.get("alice", "/messages/room/bob_alice").send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn read_state_flows_through_unread_endpoints() {
    let app = spawn_app().await;
    let mut ids = Vec::new();
    for text in ["a", "b", "c"] {
        let data = app
            .data(
                app.post("alice", "/messages")
                    .json(&json!({"recipientId": "bob", "text": text})),
            )
            .await;
        ids.push(data["messageId"].as_str().unwrap().to_string());
    }
    app.data(
        app.post("carol", "/messages")
            .json(&json!({"recipientId": "bob", "text": "yo"})),
    )
    .await;

    let count = app.data(app.get("bob", "/unread-count")).await;
    assert_eq!(count["unreadCount"], 4);

    let groups = app.data(app.get("bob", "/unread-messages")).await;
    let groups = groups.as_array().unwrap();
    assert_eq!(groups.len(), 2);
    let from_alice = groups.iter().find(|g| g["senderId"] == "alice").unwrap();
    assert_eq!(from_alice["count"], 3);
    assert_eq!(from_alice["latestMessage"], "c");

    // Alice cannot flip read state on Bob's behalf.
    let updated = app
        .data(
            app.put("alice", "/messages/mark-read")
                .json(&json!({"roomId": "alice_bob", "messageIds": ids})),
        )
        .await;
    assert_eq!(updated["updated"], 0);

    let updated = app
        .data(
            app.put("bob", "/messages/mark-read")
                .json(&json!({"roomId": "alice_bob", "messageIds": [ids[0]]})),
        )
        .await;
    assert_eq!(updated["updated"], 1);

    let updated = app.data(app.put("bob", "/mark-sender-read/alice")).await;
    assert_eq!(updated["updated"], 2);
    let count = app.data(app.get("bob", "/unread-count")).await;
    assert_eq!(count["unreadCount"], 1);

    let resp = app.put("bob", "/mark-sender-read/bob").send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn contacts_summarise_each_conversation() {
    let app = spawn_app().await;
    app.data(
        app.post("alice", "/messages")
            .json(&json!({"recipientId": "bob", "text": "first"})),
    )
    .await;
    app.data(
        app.post("bob", "/messages")
            .json(&json!({"recipientId": "alice", "text": "reply"})),
    )
    .await;
    app.data(
        app.post("carol", "/messages")
            .json(&json!({"recipientId": "bob", "text": "hey bob"})),
    )
    .await;

    let _carol = app.connect("carol").await;
    let contacts = app.data(app.get("bob", "/contacts")).await;
    let contacts = contacts.as_array().unwrap();
    assert_eq!(contacts.len(), 2);

    let alice = contacts.iter().find(|c| c["counterpartId"] == "alice").unwrap();
    assert_eq!(alice["lastMessage"], "reply");
    assert_eq!(alice["unreadCount"], 1);
    assert_eq!(alice["isOnline"], false);

    let carol = contacts.iter().find(|c| c["counterpartId"] == "carol").unwrap();
    assert_eq!(carol["unreadCount"], 1);
    assert_eq!(carol["isOnline"], true);

    let online = app.data(app.get("bob", "/users/carol/online")).await;
    assert_eq!(online, json!({"userId": "carol", "isOnline": true}));
}
