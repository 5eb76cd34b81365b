use crate::app::{coordinator::Player, storage::models::Problem};

/// Marker stored for participants who never logged in.
pub const GUEST_USER_ID: &str = "guest";
pub const GUEST_USERNAME: &str = "Guest";

#[derive(serde::Deserialize)]
pub struct ServerConfig {
    pub redis: Option<RedisConfig>,
    pub game: Option<GameConfig>,
}

#[derive(serde::Deserialize, Debug)]
pub struct RedisConfig {
    pub username: Option<String>,
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
}

/// Default impl to connect to redis running locally
impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            username: None,
            host: "127.0.0.1".to_string(),
            port: 6379,
            password: None,
        }
    }
}

#[derive(serde::Deserialize, Clone, Copy, Debug)]
#[serde(default)]
pub struct GameConfig {
    /// Delay between the second join and the game start broadcast.
    pub countdown_ms: u64,
    /// How long a game runs before the timeout winner is picked.
    pub game_duration_ms: u64,
    /// Extra attempts against the problem provider before falling back.
    pub problem_fetch_retries: u32,
    /// How long a finished room stays in memory before eviction.
    pub room_ttl_ms: u64,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            countdown_ms: 60_000,
            game_duration_ms: 30 * 60 * 1000,
            problem_fetch_retries: 2,
            room_ttl_ms: 60_000,
        }
    }
}

#[derive(serde::Deserialize, Clone, Debug)]
pub struct JoinRoomRequest {
    pub room_id: String,
    pub username: String,
    pub user_id: Option<String>,
}

/// Event that can be sent over a connection's session channel.
#[derive(serde::Serialize, Clone, Debug)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RoomEvent {
    MatchFound {
        duration: u64,
        players: Vec<Player>,
    },
    GameStart {
        problem: Problem,
        players: Vec<Player>,
        game_duration: u64,
    },
    GameOver {
        winner_id: String,
        reason: GameOverReason,
    },
    OpponentProgress {
        progress: serde_json::Value,
    },
    Error {
        message: String,
    },
}

#[derive(serde::Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GameOverReason {
    Submission,
    Timeout,
}
