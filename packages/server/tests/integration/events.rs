use crate::common::TestApp;
use serde_json::json;

#[tokio::test]
async fn connecting_joins_the_room_and_broadcasts_player_joined() {
    let app = TestApp::spawn().await;

    let mut stream = app.open_events(1, 2).await;

    let seen = stream.wait_for("PLAYER_JOINED").await;
    assert!(seen.contains("playerId:2,roomId:1"));
}

#[tokio::test]
async fn two_listeners_both_receive_broadcasts() {
    let app = TestApp::spawn().await;

    let mut first = app.open_events(1, 2).await;
    first.wait_for("playerId:2").await;

    let mut second = app.open_events(1, 3).await;
    second.wait_for("playerId:3").await;

    // The earlier listener sees the later join too.
    first.wait_for("playerId:3").await;
}

#[tokio::test]
async fn events_for_unknown_room_return_not_found() {
    let app = TestApp::spawn().await;

    let res = app.get("/events?room_id=999&player_id=1").await;
    assert_eq!(res.status, 404);
    assert_eq!(res.body["error"], json!(true));
}

#[tokio::test]
async fn deleting_a_room_pushes_room_deleted_to_listeners() {
    let app = TestApp::spawn().await;

    let mut stream = app.open_events(3, 1).await;
    stream.wait_for("PLAYER_JOINED").await;

    let res = app.delete("/rooms/3").await;
    assert_eq!(res.status, 200);

    let seen = stream.wait_for("ROOM_DELETED").await;
    assert!(seen.contains("roomId:3"));

    // The room is gone from the repository as well.
    app.wait_until(|| async { app.get("/rooms/3/leaderboard").await.status == 404 })
        .await;
}

#[tokio::test]
async fn isolate_test_broadcasts_compilation_test_frame() {
    let app = TestApp::spawn().await;

    let mut stream = app.open_events(1, 4).await;
    stream.wait_for("PLAYER_JOINED").await;

    let res = app.get("/isolate/test/1").await;
    assert_eq!(res.status, 200);

    stream.wait_for("COMPILATION_TEST").await;
}
