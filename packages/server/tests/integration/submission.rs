use crate::common::TestApp;
use serde_json::json;

#[tokio::test]
async fn successful_submission_scores_and_broadcasts() {
    let app = TestApp::spawn().await;

    // Fresh player in a fresh room keeps the seeded leaderboard out of the
    // picture.
    let player = app
        .post("/players", &json!({"name": "Zoe", "password": "pw123"}))
        .await;
    assert_eq!(player.status, 201);
    let player_id = player.body["data"]["id"].as_i64().unwrap();

    let room = app
        .post("/rooms", &json!({"name": "Finals", "description": "round 1"}))
        .await;
    assert_eq!(room.status, 201);
    let room_id = room.body["data"]["id"].as_i64().unwrap();

    let mut stream = app.open_events(room_id, player_id).await;
    stream.wait_for("PLAYER_JOINED").await;

    let res = app
        .post(
            "/submission",
            &json!({
                "question_id": 2,
                "room_id": room_id,
                "language": "python",
                "code": "print(1)",
                "player_id": player_id,
            }),
        )
        .await;
    assert_eq!(res.status, 202);

    stream.wait_for("CORRECT_SOLUTION_SUBMITTED").await;
    assert!(!stream.saw("WRONG_SOLUTION_SUBMITTED"));

    let leaderboard = app
        .get(&format!("/rooms/{room_id}/leaderboard"))
        .await;
    assert_eq!(leaderboard.status, 200);
    let entries = leaderboard.body["data"]["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["player_name"], json!("Zoe"));
    assert_eq!(entries[0]["score"], json!(50));
    assert_eq!(entries[0]["place"], json!(1));
}

#[tokio::test]
async fn dangerous_code_is_rejected_before_any_event() {
    let app = TestApp::spawn().await;

    let mut stream = app.open_events(1, 2).await;
    stream.wait_for("PLAYER_JOINED").await;

    let res = app
        .post(
            "/submission",
            &json!({
                "question_id": 1,
                "room_id": 1,
                "language": "python",
                "code": "while True:\n os.fork()",
                "player_id": 2,
            }),
        )
        .await;

    assert_eq!(res.status, 400);
    assert_eq!(res.body["error"], json!(true));
    assert_eq!(res.body["data"]["category"], json!("dangerousOperations"));

    // The leaderboard is untouched: the submission never became an event.
    let leaderboard = app.get("/rooms/1/leaderboard").await;
    let entries = leaderboard.body["data"]["entries"].as_array().unwrap();
    let bob = entries
        .iter()
        .find(|e| e["player_name"] == json!("Bob"))
        .unwrap();
    assert_eq!(bob["score"], json!(80));
    assert!(!stream.saw("WRONG_SOLUTION_SUBMITTED"));
    assert!(!stream.saw("CORRECT_SOLUTION_SUBMITTED"));
}

#[tokio::test]
async fn failed_solution_notifies_only_the_submitter() {
    let app = TestApp::spawn().await;

    let mut submitter = app.open_events(1, 2).await;
    submitter.wait_for("playerId:2").await;
    let mut bystander = app.open_events(1, 3).await;
    bystander.wait_for("playerId:3").await;

    let res = app
        .post(
            "/submission",
            &json!({
                "question_id": 1,
                "room_id": 1,
                "language": "python",
                "code": "raise RuntimeError('no')",
                "player_id": 2,
            }),
        )
        .await;
    assert_eq!(res.status, 202);

    let seen = submitter.wait_for("WRONG_SOLUTION_SUBMITTED").await;
    assert!(seen.contains("log:"));

    // A later broadcast proves the bystander's stream is live and skipped
    // the wrong-solution frame.
    app.post(
        "/submission",
        &json!({
            "question_id": 1,
            "room_id": 1,
            "language": "python",
            "code": "print(1)",
            "player_id": 3,
        }),
    )
    .await;

    bystander.wait_for("CORRECT_SOLUTION_SUBMITTED").await;
    assert!(!bystander.saw("WRONG_SOLUTION_SUBMITTED"));
}

#[tokio::test]
async fn submission_to_unknown_room_is_not_found() {
    let app = TestApp::spawn().await;

    let res = app
        .post(
            "/submission",
            &json!({
                "question_id": 1,
                "room_id": 404,
                "language": "python",
                "code": "print(1)",
                "player_id": 1,
            }),
        )
        .await;

    assert_eq!(res.status, 404);
}
