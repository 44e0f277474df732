//! Global map of live room managers. The registry lock is its own lock,
//! never taken together with any manager-internal lock.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::info;

use common::repository::Repository;
use executor::pool::JobExecutor;

use super::manager::RoomManager;

/// Rooms started at boot for development.
const SEED_ROOM_IDS: [i64; 3] = [1, 2, 3];

pub struct GlobalRooms {
    rooms: RwLock<HashMap<i64, Arc<RoomManager>>>,
    repo: Arc<dyn Repository>,
    executor: Arc<dyn JobExecutor>,
}

impl GlobalRooms {
    /// Builds the registry and starts a manager for each seed room.
    pub fn new(repo: Arc<dyn Repository>, executor: Arc<dyn JobExecutor>) -> Self {
        let registry = Self {
            rooms: RwLock::new(HashMap::new()),
            repo,
            executor,
        };

        for room_id in SEED_ROOM_IDS {
            registry.create(room_id);
        }

        registry
    }

    pub fn get_by_id(&self, room_id: i64) -> Option<Arc<RoomManager>> {
        self.rooms.read().unwrap().get(&room_id).cloned()
    }

    /// Constructs a manager for `room_id`, starts its loop, and registers it.
    pub fn create(&self, room_id: i64) -> Arc<RoomManager> {
        let manager = RoomManager::start(room_id, self.repo.clone(), self.executor.clone());
        self.rooms.write().unwrap().insert(room_id, manager.clone());
        info!(room_id, "room manager registered");
        manager
    }

    /// Drops the registry entry. The manager's loop ends on its own once the
    /// terminal `RoomDeleted` event is drained.
    pub fn remove(&self, room_id: i64) {
        self.rooms.write().unwrap().remove(&room_id);
        info!(room_id, "room manager removed");
    }

    pub fn room_count(&self) -> usize {
        self.rooms.read().unwrap().len()
    }
}
