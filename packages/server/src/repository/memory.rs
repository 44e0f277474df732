//! In-memory `Repository` implementation. Each table has its own lock; no
//! lock is ever held across an await point.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use common::language::Language;
use common::models::{LeaderboardEntry, Player, Question, Room, RoomMembership, Submission};
use common::repository::{
    CreatePlayerParams, CreateRoomParams, CreateRoomPlayerParams, RepoError, RepoResult,
    Repository,
};

use crate::utils::hash;

#[derive(Default)]
pub struct MemoryRepository {
    players: RwLock<HashMap<i64, Player>>,
    rooms: RwLock<HashMap<i64, Room>>,
    /// room_id → memberships, kept in rank order after every recalculation.
    memberships: RwLock<HashMap<i64, Vec<RoomMembership>>>,
    questions: RwLock<HashMap<i64, Question>>,
    /// Keyed by canonical language name.
    languages: RwLock<HashMap<String, Language>>,
    submissions: RwLock<HashMap<i64, Submission>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    // Seeding hooks; these bypass the public contract on purpose.

    pub fn insert_room(&self, room: Room) {
        self.rooms.write().unwrap().insert(room.id, room);
    }

    pub fn insert_player(&self, player: Player) {
        self.players.write().unwrap().insert(player.id, player);
    }

    pub fn insert_membership(&self, membership: RoomMembership) {
        self.memberships
            .write()
            .unwrap()
            .entry(membership.room_id)
            .or_default()
            .push(membership);
    }

    pub fn insert_question(&self, question: Question) {
        self.questions.write().unwrap().insert(question.id, question);
    }

    pub fn insert_language(&self, language: Language) {
        self.languages
            .write()
            .unwrap()
            .insert(language.name.clone(), language);
    }

    pub fn insert_submission(&self, submission: Submission) {
        self.submissions
            .write()
            .unwrap()
            .insert(submission.id, submission);
    }

    fn next_id<V>(table: &HashMap<i64, V>) -> i64 {
        table.keys().max().copied().unwrap_or(0) + 1
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn get_player(&self, id: i64) -> RepoResult<Player> {
        self.players
            .read()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or(RepoError::NotFound("player"))
    }

    async fn get_player_by_name(&self, name: &str) -> RepoResult<Player> {
        self.players
            .read()
            .unwrap()
            .values()
            .find(|p| p.name == name)
            .cloned()
            .ok_or(RepoError::NotFound("player"))
    }

    async fn create_player(&self, params: CreatePlayerParams) -> RepoResult<Player> {
        let mut players = self.players.write().unwrap();
        if players.values().any(|p| p.name == params.name) {
            return Err(RepoError::Conflict(format!(
                "player name '{}' is already taken",
                params.name
            )));
        }

        let player = Player {
            id: Self::next_id(&players),
            name: params.name,
            password_hash: hash::hash_password(&params.password),
        };
        players.insert(player.id, player.clone());
        Ok(player)
    }

    async fn get_room(&self, id: i64) -> RepoResult<Room> {
        self.rooms
            .read()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or(RepoError::NotFound("room"))
    }

    async fn list_rooms(&self) -> RepoResult<Vec<Room>> {
        let mut rooms: Vec<Room> = self.rooms.read().unwrap().values().cloned().collect();
        rooms.sort_by_key(|r| r.id);
        Ok(rooms)
    }

    async fn create_room(&self, params: CreateRoomParams) -> RepoResult<Room> {
        let mut rooms = self.rooms.write().unwrap();
        let room = Room {
            id: Self::next_id(&rooms),
            name: params.name,
            description: params.description,
        };
        rooms.insert(room.id, room.clone());
        Ok(room)
    }

    async fn delete_room(&self, id: i64) -> RepoResult<()> {
        let removed = self.rooms.write().unwrap().remove(&id);
        self.memberships.write().unwrap().remove(&id);
        if removed.is_none() {
            return Err(RepoError::NotFound("room"));
        }
        Ok(())
    }

    async fn get_room_player(&self, room_id: i64, player_id: i64) -> RepoResult<RoomMembership> {
        self.memberships
            .read()
            .unwrap()
            .get(&room_id)
            .and_then(|members| members.iter().find(|m| m.player_id == player_id))
            .cloned()
            .ok_or(RepoError::NotFound("room membership"))
    }

    async fn create_room_player(
        &self,
        params: CreateRoomPlayerParams,
    ) -> RepoResult<RoomMembership> {
        let mut memberships = self.memberships.write().unwrap();
        let members = memberships.entry(params.room_id).or_default();
        if members.iter().any(|m| m.player_id == params.player_id) {
            return Err(RepoError::Conflict(format!(
                "player {} is already in room {}",
                params.player_id, params.room_id
            )));
        }

        let membership = RoomMembership {
            room_id: params.room_id,
            player_id: params.player_id,
            score: params.score,
            place: params.place,
        };
        members.push(membership.clone());
        Ok(membership)
    }

    async fn delete_room_player(&self, room_id: i64, player_id: i64) -> RepoResult<()> {
        let mut memberships = self.memberships.write().unwrap();
        let Some(members) = memberships.get_mut(&room_id) else {
            return Err(RepoError::NotFound("room membership"));
        };

        let before = members.len();
        members.retain(|m| m.player_id != player_id);
        if members.len() == before {
            return Err(RepoError::NotFound("room membership"));
        }
        Ok(())
    }

    async fn update_room_player_ranks(&self, room_id: i64) -> RepoResult<()> {
        let mut memberships = self.memberships.write().unwrap();
        let Some(members) = memberships.get_mut(&room_id) else {
            // An empty room has a trivially valid leaderboard.
            return Ok(());
        };

        // Stable sort: equal scores keep their previous relative order.
        members.sort_by(|a, b| b.score.cmp(&a.score));
        for (index, member) in members.iter_mut().enumerate() {
            member.place = index as u32 + 1;
        }
        Ok(())
    }

    async fn add_room_player_score(
        &self,
        room_id: i64,
        player_id: i64,
        delta: u32,
    ) -> RepoResult<()> {
        let mut memberships = self.memberships.write().unwrap();
        let member = memberships
            .get_mut(&room_id)
            .and_then(|members| members.iter_mut().find(|m| m.player_id == player_id))
            .ok_or(RepoError::NotFound("room membership"))?;

        member.score += delta;
        Ok(())
    }

    async fn leaderboard(&self, room_id: i64) -> RepoResult<Vec<LeaderboardEntry>> {
        if !self.rooms.read().unwrap().contains_key(&room_id) {
            return Err(RepoError::NotFound("room"));
        }

        let players = self.players.read().unwrap();
        let memberships = self.memberships.read().unwrap();

        let mut entries: Vec<LeaderboardEntry> = memberships
            .get(&room_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
            .iter()
            .filter_map(|m| {
                players.get(&m.player_id).map(|p| LeaderboardEntry {
                    player_name: p.name.clone(),
                    score: m.score,
                    place: m.place,
                })
            })
            .collect();

        entries.sort_by_key(|e| e.place);
        Ok(entries)
    }

    async fn list_questions(&self) -> RepoResult<Vec<Question>> {
        let mut questions: Vec<Question> =
            self.questions.read().unwrap().values().cloned().collect();
        questions.sort_by_key(|q| q.id);
        Ok(questions)
    }

    async fn get_language_by_name(&self, name: &str) -> RepoResult<Language> {
        self.languages
            .read()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or(RepoError::NotFound("language"))
    }

    async fn get_submission(&self, id: i64) -> RepoResult<Submission> {
        self.submissions
            .read()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or(RepoError::NotFound("submission"))
    }

    async fn update_submission(&self, submission: Submission) -> RepoResult<Submission> {
        self.submissions
            .write()
            .unwrap()
            .insert(submission.id, submission.clone());
        Ok(submission)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(room_id: i64, player_id: i64, score: u32) -> RoomMembership {
        RoomMembership {
            room_id,
            player_id,
            score,
            place: 0,
        }
    }

    #[tokio::test]
    async fn ranks_form_a_permutation_ordered_by_score() {
        let repo = MemoryRepository::new();
        repo.insert_membership(member(1, 10, 20));
        repo.insert_membership(member(1, 11, 80));
        repo.insert_membership(member(1, 12, 50));

        repo.update_room_player_ranks(1).await.unwrap();

        let places: Vec<(i64, u32)> = {
            let memberships = repo.memberships.read().unwrap();
            memberships[&1].iter().map(|m| (m.player_id, m.place)).collect()
        };
        assert_eq!(places, vec![(11, 1), (12, 2), (10, 3)]);
    }

    #[tokio::test]
    async fn tied_scores_keep_relative_order() {
        let repo = MemoryRepository::new();
        repo.insert_membership(member(1, 10, 50));
        repo.insert_membership(member(1, 11, 50));
        repo.insert_membership(member(1, 12, 90));

        repo.update_room_player_ranks(1).await.unwrap();
        // 10 was inserted before 11; the tie must not reorder them.
        let memberships = repo.memberships.read().unwrap();
        let order: Vec<i64> = memberships[&1].iter().map(|m| m.player_id).collect();
        assert_eq!(order, vec![12, 10, 11]);
    }

    #[tokio::test]
    async fn score_updates_are_monotone() {
        let repo = MemoryRepository::new();
        repo.insert_membership(member(1, 10, 0));

        repo.add_room_player_score(1, 10, 50).await.unwrap();
        repo.add_room_player_score(1, 10, 50).await.unwrap();

        let membership = repo.get_room_player(1, 10).await.unwrap();
        assert_eq!(membership.score, 100);
    }

    #[tokio::test]
    async fn duplicate_player_names_conflict() {
        let repo = MemoryRepository::new();
        repo.create_player(CreatePlayerParams {
            name: "alice".to_string(),
            password: "pw".to_string(),
        })
        .await
        .unwrap();

        let err = repo
            .create_player(CreatePlayerParams {
                name: "alice".to_string(),
                password: "pw2".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, RepoError::Conflict(_)));
    }

    #[tokio::test]
    async fn deleting_a_room_drops_its_memberships() {
        let repo = MemoryRepository::new();
        repo.insert_room(Room {
            id: 1,
            name: "r".to_string(),
            description: String::new(),
        });
        repo.insert_membership(member(1, 10, 0));

        repo.delete_room(1).await.unwrap();

        assert!(repo.get_room(1).await.is_err());
        assert!(repo.get_room_player(1, 10).await.is_err());
    }
}
