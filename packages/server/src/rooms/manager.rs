//! Per-room event engine: one manager per live room, one single-consumer
//! task draining the room's inbox. Handlers are serialized within a room;
//! managers across rooms run independently.
//!
//! The listener map and the leaderboard recalculation are guarded by
//! separate locks, and neither is held across a repository call.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, error, info, warn};

use common::JobResult;
use common::events::{
    DomainEvent, SolutionJudged, SolutionSubmitted, SseEvent, SseEventType,
};
use common::language::normalize_language;
use common::repository::{CreateRoomPlayerParams, RepoError, Repository};
use executor::pool::JobExecutor;

/// Buffered capacity of the room inbox. HTTP-side producers use `try_send`,
/// so a full inbox drops the event instead of blocking a handler.
const INBOX_CAPACITY: usize = 10;

/// Buffered capacity of each listener sink. The fan-out never blocks on a
/// full sink; it drops that listener's frame.
const LISTENER_CAPACITY: usize = 8;

/// Fixed score awarded for a successful solution.
pub const CORRECT_SOLUTION_SCORE: u32 = 50;

pub struct RoomManager {
    pub room_id: i64,
    inbox: mpsc::Sender<DomainEvent>,
    listeners: RwLock<HashMap<i64, mpsc::Sender<SseEvent>>>,
    /// Serializes rank recalculation; deliberately distinct from the
    /// listener lock.
    leaderboard_lock: tokio::sync::Mutex<()>,
    repo: Arc<dyn Repository>,
    executor: Arc<dyn JobExecutor>,
}

impl RoomManager {
    /// Creates the manager and spawns its event loop.
    pub fn start(
        room_id: i64,
        repo: Arc<dyn Repository>,
        executor: Arc<dyn JobExecutor>,
    ) -> Arc<Self> {
        let (tx, rx) = mpsc::channel(INBOX_CAPACITY);
        let manager = Arc::new(Self {
            room_id,
            inbox: tx,
            listeners: RwLock::new(HashMap::new()),
            leaderboard_lock: tokio::sync::Mutex::new(()),
            repo,
            executor,
        });

        let looped = manager.clone();
        tokio::spawn(async move { looped.run(rx).await });

        manager
    }

    /// Registers a listener sink for `player_id` and returns its receiving
    /// end. A reconnect replaces the previous sink.
    pub fn subscribe(&self, player_id: i64) -> mpsc::Receiver<SseEvent> {
        let (tx, rx) = mpsc::channel(LISTENER_CAPACITY);
        self.listeners.write().unwrap().insert(player_id, tx);
        rx
    }

    pub fn unsubscribe(&self, player_id: i64) {
        self.listeners.write().unwrap().remove(&player_id);
    }

    pub fn has_listener(&self, player_id: i64) -> bool {
        self.listeners.read().unwrap().contains_key(&player_id)
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().unwrap().len()
    }

    /// Non-blocking enqueue used by HTTP producers. Returns false when the
    /// inbox is full or the loop has stopped; callers log and move on.
    pub fn try_enqueue(&self, event: DomainEvent) -> bool {
        self.inbox.try_send(event).is_ok()
    }

    /// The room's single consumer. A handler failure is logged and never
    /// kills the loop; `RoomDeleted` is the terminal event.
    async fn run(self: Arc<Self>, mut inbox: mpsc::Receiver<DomainEvent>) {
        info!(room_id = self.room_id, "room manager started");

        while let Some(event) = inbox.recv().await {
            match event {
                DomainEvent::SolutionSubmitted(e) => self.clone().process_solution_submitted(e),
                DomainEvent::SolutionJudged(e) => {
                    if let Err(err) = self.process_solution_judged(e).await {
                        error!(room_id = self.room_id, err = %err, "failed to process solution judged event");
                    }
                }
                DomainEvent::PlayerJoined { player_id, .. } => {
                    if let Err(err) = self.process_player_joined(player_id).await {
                        error!(room_id = self.room_id, player_id, err = %err, "failed to process player joined event");
                    }
                }
                DomainEvent::PlayerLeft { player_id, .. } => {
                    if let Err(err) = self.process_player_left(player_id).await {
                        error!(room_id = self.room_id, player_id, err = %err, "failed to process player left event");
                    }
                }
                DomainEvent::RoomDeleted { .. } => {
                    self.process_room_deleted().await;
                    break;
                }
                DomainEvent::CompilationTest => {
                    self.dispatch_all(SseEvent::new(SseEventType::CompilationTest, ""));
                }
            }
        }

        info!(room_id = self.room_id, "room manager stopped");
    }

    /// Hands the solution to the execution pool from a spawned task and
    /// re-injects the judgement into this inbox, so every repository
    /// mutation stays on the loop task and intervening joins/leaves are
    /// observed before the rank update.
    fn process_solution_submitted(self: Arc<Self>, event: SolutionSubmitted) {
        info!(
            room_id = self.room_id,
            player_id = event.player_id,
            language = %event.language,
            "solution submitted"
        );

        let manager = self;
        tokio::spawn(async move {
            let result = match manager
                .repo
                .get_language_by_name(&normalize_language(&event.language))
                .await
            {
                Ok(language) => {
                    manager
                        .executor
                        .execute(language, event.code.clone(), None)
                        .await
                }
                Err(err) => {
                    warn!(
                        room_id = manager.room_id,
                        language = %event.language,
                        err = %err,
                        "submitted solution has no runnable language"
                    );
                    JobResult::failed(
                        String::new(),
                        format!("unsupported language: {}", event.language),
                        0,
                    )
                }
            };

            let judged = DomainEvent::SolutionJudged(SolutionJudged {
                submitted: event,
                result,
            });
            if manager.inbox.send(judged).await.is_err() {
                warn!(room_id = manager.room_id, "room inbox closed, dropping judgement");
            }
        });
    }

    async fn process_solution_judged(&self, event: SolutionJudged) -> Result<(), RepoError> {
        info!(
            room_id = self.room_id,
            player_id = event.submitted.player_id,
            success = event.result.success,
            "solution judged"
        );

        if !event.result.success {
            // Only the submitter learns about a failed solution.
            let sse = SseEvent::new(
                SseEventType::WrongSolutionSubmitted,
                format!("log:{}", event.result.output),
            );
            self.dispatch_one(sse, event.submitted.player_id);
            return Ok(());
        }

        self.repo
            .add_room_player_score(
                self.room_id,
                event.submitted.player_id,
                CORRECT_SOLUTION_SCORE,
            )
            .await?;

        if let Err(err) = self.recalculate_leaderboard().await {
            // Non-fatal, but the ranks are stale until the next event.
            error!(room_id = self.room_id, err = %err, "failed to calculate leaderboard after solution result");
        }

        self.dispatch_all(SseEvent::new(SseEventType::CorrectSolutionSubmitted, ""));
        Ok(())
    }

    async fn process_player_joined(&self, player_id: i64) -> Result<(), RepoError> {
        let player = self.repo.get_player(player_id).await?;

        if self.repo.get_room_player(self.room_id, player_id).await.is_err() {
            info!(
                room_id = self.room_id,
                player = %player.name,
                "player is not in room, adding"
            );
            self.repo
                .create_room_player(CreateRoomPlayerParams {
                    room_id: self.room_id,
                    player_id,
                    score: 0,
                    place: 0,
                })
                .await?;
        }

        if let Err(err) = self.recalculate_leaderboard().await {
            error!(room_id = self.room_id, err = %err, "failed to calculate leaderboard after player joined");
        }

        info!(room_id = self.room_id, player_id, "player joined");
        let data = format!("playerId:{player_id},roomId:{}\n\n", self.room_id);
        self.dispatch_all(SseEvent::new(SseEventType::PlayerJoined, data));

        Ok(())
    }

    async fn process_player_left(&self, player_id: i64) -> Result<(), RepoError> {
        if let Err(err) = self.repo.delete_room_player(self.room_id, player_id).await {
            error!(room_id = self.room_id, player_id, err = %err, "failed to remove player from room");
        }

        if let Err(err) = self.recalculate_leaderboard().await {
            error!(room_id = self.room_id, err = %err, "failed to calculate leaderboard after player left");
        }

        info!(room_id = self.room_id, player_id, "player left");
        let data = format!("playerId:{player_id},roomId:{}\n\n", self.room_id);
        self.dispatch_all(SseEvent::new(SseEventType::PlayerLeft, data));

        Ok(())
    }

    async fn process_room_deleted(&self) {
        if let Err(err) = self.repo.delete_room(self.room_id).await {
            error!(room_id = self.room_id, err = %err, "failed to delete room");
        }

        info!(room_id = self.room_id, "room deleted");
        let data = format!("roomId:{}\n\n", self.room_id);
        self.dispatch_all(SseEvent::new(SseEventType::RoomDeleted, data));
    }

    async fn recalculate_leaderboard(&self) -> Result<(), RepoError> {
        let _guard = self.leaderboard_lock.lock().await;
        info!(room_id = self.room_id, "starting leaderboard calculation");
        self.repo.update_room_player_ranks(self.room_id).await?;
        info!(room_id = self.room_id, "finished leaderboard calculation");
        Ok(())
    }

    /// Broadcast to every current listener. Snapshots the map under the read
    /// lock, then each delivery runs in its own throw-away task doing one
    /// `try_send`: a full or closed sink costs that listener one frame and
    /// never blocks the broadcaster.
    fn dispatch_all(&self, event: SseEvent) {
        let listeners: Vec<(i64, mpsc::Sender<SseEvent>)> = {
            let listeners = self.listeners.read().unwrap();
            listeners.iter().map(|(id, tx)| (*id, tx.clone())).collect()
        };

        info!(
            room_id = self.room_id,
            listeners = listeners.len(),
            event_type = %event.event_type,
            "dispatching event"
        );

        for (player_id, sink) in listeners {
            let event = event.clone();
            let room_id = self.room_id;
            tokio::spawn(async move {
                send_to_listener(room_id, player_id, &sink, event);
            });
        }
    }

    /// Same delivery semantics as `dispatch_all`, for a single player.
    fn dispatch_one(&self, event: SseEvent, player_id: i64) {
        let sink = {
            let listeners = self.listeners.read().unwrap();
            listeners.get(&player_id).cloned()
        };

        let Some(sink) = sink else {
            error!(room_id = self.room_id, player_id, "listener not found");
            return;
        };

        let room_id = self.room_id;
        tokio::spawn(async move {
            send_to_listener(room_id, player_id, &sink, event);
        });
    }
}

fn send_to_listener(
    room_id: i64,
    player_id: i64,
    sink: &mpsc::Sender<SseEvent>,
    event: SseEvent,
) {
    match sink.try_send(event) {
        Ok(()) => debug!(room_id, player_id, "event sent to listener"),
        Err(TrySendError::Full(_)) => {
            warn!(room_id, player_id, "failed to send event to listener - channel full")
        }
        Err(TrySendError::Closed(_)) => {
            warn!(room_id, player_id, "failed to send event to listener - channel closed")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::MemoryRepository;
    use crate::seed::seed_dev_data;
    use async_trait::async_trait;
    use chrono::Utc;
    use common::language::Language;
    use std::time::Duration;
    use tokio::time::timeout;

    /// Deterministic pool stand-in: fails when the code contains "raise",
    /// succeeds otherwise.
    struct StubExecutor;

    #[async_trait]
    impl JobExecutor for StubExecutor {
        async fn execute(
            &self,
            _language: Language,
            code: String,
            _stdin: Option<String>,
        ) -> JobResult {
            if code.contains("raise") {
                JobResult::failed("Traceback: boom\n".to_string(), "exited with code 1", 3)
            } else {
                JobResult::succeeded("ok\n".to_string(), 3)
            }
        }
    }

    fn seeded_repo() -> Arc<MemoryRepository> {
        let repo = Arc::new(MemoryRepository::new());
        seed_dev_data(&repo);
        repo
    }

    fn submission(player_id: i64, room_id: i64, code: &str) -> SolutionSubmitted {
        SolutionSubmitted {
            player_id,
            room_id,
            question_id: 2,
            code: code.to_string(),
            language: "python".to_string(),
            submitted_at: Utc::now(),
        }
    }

    async fn recv_type(
        rx: &mut mpsc::Receiver<SseEvent>,
        expected: SseEventType,
    ) -> SseEvent {
        loop {
            let event = timeout(Duration::from_secs(1), rx.recv())
                .await
                .expect("timed out waiting for event")
                .expect("listener closed");
            if event.event_type == expected {
                return event;
            }
        }
    }

    #[tokio::test]
    async fn player_join_creates_membership_and_broadcasts() {
        let repo = seeded_repo();
        let manager = RoomManager::start(2, repo.clone(), Arc::new(StubExecutor));

        let mut rx = manager.subscribe(1);
        assert!(manager.has_listener(1));
        assert!(manager.try_enqueue(DomainEvent::PlayerJoined { player_id: 1, room_id: 2 }));

        let event = recv_type(&mut rx, SseEventType::PlayerJoined).await;
        assert_eq!(event.data, "playerId:1,roomId:2\n\n");

        let membership = repo.get_room_player(2, 1).await.unwrap();
        assert_eq!(membership.score, 0);
        assert_eq!(membership.place, 1);
    }

    #[tokio::test]
    async fn join_of_unknown_player_is_ignored() {
        let repo = seeded_repo();
        let manager = RoomManager::start(2, repo.clone(), Arc::new(StubExecutor));

        let mut rx = manager.subscribe(1);
        manager.try_enqueue(DomainEvent::PlayerJoined { player_id: 999, room_id: 2 });
        // The loop must survive and keep serving later events.
        manager.try_enqueue(DomainEvent::PlayerJoined { player_id: 1, room_id: 2 });

        recv_type(&mut rx, SseEventType::PlayerJoined).await;
        assert!(repo.get_room_player(2, 999).await.is_err());
    }

    #[tokio::test]
    async fn correct_solution_adds_fixed_score_and_reranks() {
        let repo = seeded_repo();
        let manager = RoomManager::start(1, repo.clone(), Arc::new(StubExecutor));
        let mut rx = manager.subscribe(5);

        // Player 5 starts last in room 1 with 20 points.
        manager.try_enqueue(DomainEvent::SolutionSubmitted(submission(5, 1, "print(1)")));

        recv_type(&mut rx, SseEventType::CorrectSolutionSubmitted).await;

        let membership = repo.get_room_player(1, 5).await.unwrap();
        assert_eq!(membership.score, 70);
        assert_eq!(membership.place, 3);

        // Places stay a permutation of 1..=N.
        let mut places: Vec<u32> = repo
            .leaderboard(1)
            .await
            .unwrap()
            .iter()
            .map(|e| e.place)
            .collect();
        places.sort_unstable();
        assert_eq!(places, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn failed_solution_reaches_only_the_submitter() {
        let repo = seeded_repo();
        let manager = RoomManager::start(1, repo.clone(), Arc::new(StubExecutor));
        let mut submitter = manager.subscribe(2);
        let mut bystander = manager.subscribe(3);

        manager.try_enqueue(DomainEvent::SolutionSubmitted(submission(2, 1, "raise Boom")));

        let event = recv_type(&mut submitter, SseEventType::WrongSolutionSubmitted).await;
        assert!(event.data.starts_with("log:"));
        assert!(event.data.contains("Traceback"));

        // Scores are untouched by a failed judgement.
        assert_eq!(repo.get_room_player(1, 2).await.unwrap().score, 80);

        // The bystander sees the next broadcast but never the wrong-solution
        // frame.
        manager.try_enqueue(DomainEvent::SolutionSubmitted(submission(3, 1, "print(1)")));
        let next = recv_type(&mut bystander, SseEventType::CorrectSolutionSubmitted).await;
        assert_eq!(next.event_type, SseEventType::CorrectSolutionSubmitted);
    }

    #[tokio::test]
    async fn full_listener_sink_drops_frames_without_blocking() {
        let repo = seeded_repo();
        let manager = RoomManager::start(1, repo.clone(), Arc::new(StubExecutor));

        // Slow listener: subscribed but never read.
        let slow = manager.subscribe(2);
        let mut healthy = manager.subscribe(3);

        // More broadcasts than the sink buffers.
        for _ in 0..(LISTENER_CAPACITY + 4) {
            manager.try_enqueue(DomainEvent::PlayerJoined { player_id: 3, room_id: 1 });
            recv_type(&mut healthy, SseEventType::PlayerJoined).await;
        }

        // The healthy listener saw everything; the slow one simply lost
        // frames past its capacity and nothing deadlocked.
        drop(slow);
    }

    #[tokio::test]
    async fn player_left_removes_membership_and_broadcasts() {
        let repo = seeded_repo();
        let manager = RoomManager::start(1, repo.clone(), Arc::new(StubExecutor));
        let mut rx = manager.subscribe(1);

        manager.try_enqueue(DomainEvent::PlayerLeft { player_id: 5, room_id: 1 });

        let event = recv_type(&mut rx, SseEventType::PlayerLeft).await;
        assert_eq!(event.data, "playerId:5,roomId:1\n\n");
        assert!(repo.get_room_player(1, 5).await.is_err());

        let entries = repo.leaderboard(1).await.unwrap();
        assert_eq!(entries.len(), 4);
        let mut places: Vec<u32> = entries.iter().map(|e| e.place).collect();
        places.sort_unstable();
        assert_eq!(places, vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn room_deleted_broadcasts_and_stops_the_loop() {
        let repo = seeded_repo();
        let manager = RoomManager::start(3, repo.clone(), Arc::new(StubExecutor));
        let mut rx = manager.subscribe(1);

        manager.try_enqueue(DomainEvent::RoomDeleted { room_id: 3 });

        let event = recv_type(&mut rx, SseEventType::RoomDeleted).await;
        assert_eq!(event.data, "roomId:3\n\n");
        assert!(repo.get_room(3).await.is_err());

        // The loop has drained its terminal event; new sends fail once the
        // receiver is gone.
        timeout(Duration::from_secs(1), async {
            while manager.try_enqueue(DomainEvent::CompilationTest) {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("manager loop should stop accepting events");
    }

    #[tokio::test]
    async fn judgement_observes_intervening_membership_changes() {
        let repo = seeded_repo();
        let manager = RoomManager::start(2, repo.clone(), Arc::new(StubExecutor));
        let mut rx = manager.subscribe(1);

        // Join, submit, and have another player join before the judgement
        // lands; the final ranks must include both members.
        manager.try_enqueue(DomainEvent::PlayerJoined { player_id: 1, room_id: 2 });
        recv_type(&mut rx, SseEventType::PlayerJoined).await;

        manager.try_enqueue(DomainEvent::SolutionSubmitted(submission(1, 2, "print(1)")));
        manager.try_enqueue(DomainEvent::PlayerJoined { player_id: 2, room_id: 2 });

        recv_type(&mut rx, SseEventType::CorrectSolutionSubmitted).await;

        assert_eq!(repo.get_room_player(2, 1).await.unwrap().score, 50);
        let entries = repo.leaderboard(2).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].player_name, "Alice");
        assert_eq!(entries[0].place, 1);
    }
}
