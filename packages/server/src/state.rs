use std::sync::Arc;

use common::repository::Repository;

use crate::config::AppConfig;
use crate::rooms::GlobalRooms;

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn Repository>,
    pub rooms: Arc<GlobalRooms>,
    pub config: AppConfig,
}
