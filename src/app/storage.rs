use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use crate::app::{errors::DbError, redis_client::RedisClient, types::RoomEvent};

pub mod interface;
pub mod models;

pub type StorageResult<T> = Result<T, DbError>;

/// Event channels of the connections attached to this instance of the
/// application.
pub type SessionState = Arc<Mutex<HashMap<String, tokio::sync::mpsc::Sender<RoomEvent>>>>;

/// A store that holds the storage clients for various storage types
#[derive(Clone)]
pub struct Store {
    pub redis_client: RedisClient,
    pub session_state: SessionState,
}

impl Store {
    pub fn new(redis_client: RedisClient) -> Self {
        Self {
            redis_client,
            session_state: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl interface::StorageInterface for Store {}
