use crate::common::TestApp;
use serde_json::json;

#[tokio::test]
async fn seeded_rooms_are_listed() {
    let app = TestApp::spawn().await;

    let res = app.get("/rooms").await;
    assert_eq!(res.status, 200);
    assert_eq!(res.body["error"], json!(false));

    let rooms = res.body["data"].as_array().unwrap();
    assert_eq!(rooms.len(), 3);
    assert_eq!(rooms[0]["name"], json!("Nerd's room"));
}

#[tokio::test]
async fn created_room_gets_a_live_manager() {
    let app = TestApp::spawn().await;

    let res = app
        .post("/rooms", &json!({"name": "Semis", "description": "bracket B"}))
        .await;
    assert_eq!(res.status, 201);
    let room_id = res.body["data"]["id"].as_i64().unwrap();
    assert_eq!(room_id, 4);

    // The new room immediately serves SSE subscriptions.
    let mut stream = app.open_events(room_id, 1).await;
    stream.wait_for("PLAYER_JOINED").await;
}

#[tokio::test]
async fn creating_a_room_without_a_name_fails() {
    let app = TestApp::spawn().await;

    let res = app.post("/rooms", &json!({"name": "  "})).await;
    assert_eq!(res.status, 400);
    assert_eq!(res.body["error"], json!(true));
}

#[tokio::test]
async fn deleting_an_unknown_room_is_not_found() {
    let app = TestApp::spawn().await;

    let res = app.delete("/rooms/999").await;
    assert_eq!(res.status, 404);
}

#[tokio::test]
async fn seeded_leaderboard_is_ranked() {
    let app = TestApp::spawn().await;

    let res = app.get("/rooms/1/leaderboard").await;
    assert_eq!(res.status, 200);

    let entries = res.body["data"]["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 5);
    assert_eq!(entries[0]["player_name"], json!("Alice"));
    assert_eq!(entries[0]["score"], json!(100));
    assert_eq!(entries[0]["place"], json!(1));
    assert_eq!(entries[4]["player_name"], json!("Phuc"));
    assert_eq!(entries[4]["place"], json!(5));
}

#[tokio::test]
async fn leaving_a_room_shrinks_the_leaderboard() {
    let app = TestApp::spawn().await;

    let res = app.delete("/rooms/1/players/5").await;
    assert_eq!(res.status, 200);

    // Processing is asynchronous; poll until the membership is gone.
    app.wait_until(|| async {
        let leaderboard = app.get("/rooms/1/leaderboard").await;
        leaderboard.body["data"]["entries"]
            .as_array()
            .is_some_and(|entries| entries.len() == 4)
    })
    .await;

    let leaderboard = app.get("/rooms/1/leaderboard").await;
    let entries = leaderboard.body["data"]["entries"].as_array().unwrap();
    let places: Vec<i64> = entries
        .iter()
        .map(|e| e["place"].as_i64().unwrap())
        .collect();
    assert_eq!(places, vec![1, 2, 3, 4]);
}

#[tokio::test]
async fn leaving_with_an_unknown_player_is_not_found() {
    let app = TestApp::spawn().await;

    let res = app.delete("/rooms/1/players/999").await;
    assert_eq!(res.status, 404);
}

#[tokio::test]
async fn questions_are_listed() {
    let app = TestApp::spawn().await;

    let res = app.get("/questions").await;
    assert_eq!(res.status, 200);

    let questions = res.body["data"].as_array().unwrap();
    assert_eq!(questions.len(), 5);
    assert_eq!(questions[0]["title"], json!("Two Sum"));
    assert_eq!(questions[0]["difficulty"], json!(1));
}
