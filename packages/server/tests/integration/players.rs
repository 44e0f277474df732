use crate::common::TestApp;
use serde_json::json;

#[tokio::test]
async fn player_creation_returns_the_player_without_credentials() {
    let app = TestApp::spawn().await;

    let res = app
        .post("/players", &json!({"name": "Zoe", "password": "pw123"}))
        .await;

    assert_eq!(res.status, 201);
    assert_eq!(res.body["error"], json!(false));
    assert_eq!(res.body["data"]["name"], json!("Zoe"));
    assert_eq!(res.body["data"]["id"], json!(6));
    assert!(res.body["data"].get("password_hash").is_none());
}

#[tokio::test]
async fn duplicate_player_names_conflict() {
    let app = TestApp::spawn().await;

    let first = app
        .post("/players", &json!({"name": "Zoe", "password": "pw123"}))
        .await;
    assert_eq!(first.status, 201);

    let second = app
        .post("/players", &json!({"name": "Zoe", "password": "other"}))
        .await;
    assert_eq!(second.status, 409);
    assert_eq!(second.body["error"], json!(true));
}

#[tokio::test]
async fn empty_credentials_fail_validation() {
    let app = TestApp::spawn().await;

    let res = app
        .post("/players", &json!({"name": "  ", "password": ""}))
        .await;
    assert_eq!(res.status, 400);
}

#[tokio::test]
async fn login_succeeds_with_the_right_password() {
    let app = TestApp::spawn().await;

    app.post("/players", &json!({"name": "Zoe", "password": "pw123"}))
        .await;

    let res = app
        .post("/players/login", &json!({"name": "Zoe", "password": "pw123"}))
        .await;
    assert_eq!(res.status, 200);
    assert_eq!(res.body["data"]["name"], json!("Zoe"));
}

#[tokio::test]
async fn login_rejects_a_wrong_password() {
    let app = TestApp::spawn().await;

    app.post("/players", &json!({"name": "Zoe", "password": "pw123"}))
        .await;

    let res = app
        .post("/players/login", &json!({"name": "Zoe", "password": "nope"}))
        .await;
    assert_eq!(res.status, 401);
    assert_eq!(res.body["error"], json!(true));
}

#[tokio::test]
async fn login_of_an_unknown_player_is_not_found() {
    let app = TestApp::spawn().await;

    let res = app
        .post("/players/login", &json!({"name": "Ghost", "password": "x"}))
        .await;
    assert_eq!(res.status, 404);
}

#[tokio::test]
async fn seeded_players_can_log_in() {
    let app = TestApp::spawn().await;

    let res = app
        .post("/players/login", &json!({"name": "Alice", "password": "password"}))
        .await;
    assert_eq!(res.status, 200);
    assert_eq!(res.body["data"]["id"], json!(1));
}
