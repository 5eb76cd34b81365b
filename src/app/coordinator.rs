use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use tokio::task::JoinHandle;

use crate::app::{
    errors::{ApiError, ResultExtApp},
    problem::{self, ProblemProvider},
    storage::{
        interface::{
            match_store::{AdmissionOutcome, MatchInterface},
            session::SessionInterface,
        },
        models::{Match, MatchStatus, Problem},
    },
    types::{
        GameConfig, GameOverReason, JoinRoomRequest, RoomEvent, GUEST_USERNAME, GUEST_USER_ID,
    },
    utils,
};

/// Linear lifecycle of an in-memory room; the state never regresses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GameState {
    Waiting,
    Starting,
    Playing,
    Finished,
}

#[derive(serde::Serialize, Clone, Debug)]
pub struct Player {
    pub connection_id: String,
    pub username: String,
    pub user_id: String,
    pub score: u32,
    pub connected: bool,
    pub is_host: bool,
}

struct Room {
    players: Vec<Player>,
    game_state: GameState,
    problem: Option<Problem>,
    start_time: Option<u64>,
    game_start_time: Option<u64>,
    countdown_timer: Option<JoinHandle<()>>,
    game_timer: Option<JoinHandle<()>>,
}

impl Room {
    fn new() -> Self {
        Self {
            players: Vec::new(),
            game_state: GameState::Waiting,
            problem: None,
            start_time: None,
            game_start_time: None,
            countdown_timer: None,
            game_timer: None,
        }
    }

    fn abort_timers(&mut self) {
        if let Some(timer) = self.countdown_timer.take() {
            timer.abort();
        }
        if let Some(timer) = self.game_timer.take() {
            timer.abort();
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JoinOutcome {
    Joined,
    Reconnected,
    /// The connection is already tracked in the room; nothing to do.
    AlreadyJoined,
    /// Room full, either per the store guard or the live roster.
    Rejected,
}

#[derive(serde::Serialize, Clone, Debug)]
pub struct CreatedRoom {
    pub room_id: String,
    #[serde(rename = "match")]
    pub match_record: Match,
}

type Rooms = Arc<Mutex<HashMap<String, Room>>>;

/// Per-room state machine driving waiting -> starting -> playing -> finished.
///
/// Owns the live rosters, the deferred transitions and the problem cache;
/// reconciles with the match store through its atomic operations. All locks
/// here are sync and are never held across an await; any handler resuming
/// after an await re-validates the room before mutating it.
pub struct RoomCoordinator<S, P> {
    store: S,
    provider: Arc<P>,
    rooms: Rooms,
    config: GameConfig,
}

impl<S: Clone, P> Clone for RoomCoordinator<S, P> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            provider: Arc::clone(&self.provider),
            rooms: Arc::clone(&self.rooms),
            config: self.config,
        }
    }
}

impl<S, P> RoomCoordinator<S, P>
where
    S: MatchInterface + SessionInterface + Clone + Send + Sync + 'static,
    P: ProblemProvider + Send + Sync + 'static,
{
    pub fn new(store: S, provider: P, config: GameConfig) -> Self {
        Self {
            store,
            provider: Arc::new(provider),
            rooms: Arc::new(Mutex::new(HashMap::new())),
            config,
        }
    }

    pub fn game_state(&self, room_id: &str) -> Option<GameState> {
        self.rooms
            .lock()
            .unwrap()
            .get(room_id)
            .map(|room| room.game_state)
    }

    pub fn player_count(&self, room_id: &str) -> usize {
        self.rooms
            .lock()
            .unwrap()
            .get(room_id)
            .map(|room| room.players.len())
            .unwrap_or_default()
    }

    pub async fn create_room(&self, user_id: Option<String>) -> Result<CreatedRoom, ApiError> {
        let room_id = utils::generate_room_id();
        let player1 = user_id.unwrap_or_else(|| GUEST_USER_ID.to_string());
        let match_record = self
            .store
            .insert_match(Match::new(room_id.clone(), Some(player1)))
            .await
            .to_internal_api_error()?;
        tracing::info!(%room_id, "created room");
        Ok(CreatedRoom {
            room_id,
            match_record,
        })
    }

    pub async fn join_room(
        &self,
        connection_id: &str,
        request: JoinRoomRequest,
    ) -> Result<JoinOutcome, ApiError> {
        let JoinRoomRequest {
            room_id,
            username,
            user_id,
        } = request;

        let player_id = user_id
            .clone()
            .unwrap_or_else(|| GUEST_USER_ID.to_string());

        // Classify before the store round-trip; reconnects (and repeated
        // joins from a connection already in the room) skip the guard. A
        // connected guest never matches another guest joiner. The registry
        // entry itself is only created once a join is actually proceeding.
        let is_reconnecting = {
            let rooms = self.rooms.lock().unwrap();
            rooms.get(&room_id).is_some_and(|room| {
                room.players
                    .iter()
                    .any(|player| player.connection_id == connection_id)
                    || if username != GUEST_USERNAME {
                        room.players.iter().any(|player| player.username == username)
                    } else {
                        room.players
                            .iter()
                            .any(|player| player.username == GUEST_USERNAME && !player.connected)
                    }
            })
        };

        if !is_reconnecting {
            match self.store.try_admit_player(&room_id, &player_id).await {
                Ok(AdmissionOutcome::Admitted) => {}
                Ok(AdmissionOutcome::RoomFull) => {
                    tracing::info!(%room_id, %username, "blocked join, match record is full");
                    self.send_error(connection_id, &ApiError::RoomFull.to_string())
                        .await;
                    return Ok(JoinOutcome::Rejected);
                }
                Err(db_error) => {
                    // Fail closed: without the guard the two-player invariant
                    // cannot be upheld across instances.
                    tracing::error!(?db_error, %room_id, "admission guard unavailable, rejecting join");
                    self.send_error(connection_id, "Room is unavailable, try again later")
                        .await;
                    return Err(ApiError::InternalServerError);
                }
            }
        }

        enum PostLock {
            AlreadyJoined,
            Reconnected(Option<RoomEvent>),
            MemoryFull,
            Joined { started: bool },
        }

        // Re-validate under the lock; the room may have changed while the
        // guard was running.
        let action = {
            let mut rooms = self.rooms.lock().unwrap();
            let room = rooms.entry(room_id.clone()).or_insert_with(Room::new);

            // Disconnected entries only hold their slot once the game has
            // actually started.
            if room.game_state == GameState::Waiting {
                room.players.retain(|player| player.connected);
            }

            if room
                .players
                .iter()
                .any(|player| player.connection_id == connection_id)
            {
                PostLock::AlreadyJoined
            } else {
                let existing_index = if username != GUEST_USERNAME {
                    room.players
                        .iter()
                        .position(|player| player.username == username)
                } else {
                    room.players
                        .iter()
                        .position(|player| player.username == GUEST_USERNAME && !player.connected)
                };

                match existing_index {
                    Some(index) => {
                        let player = &mut room.players[index];
                        player.connection_id = connection_id.to_string();
                        player.connected = true;
                        if let Some(user_id) = user_id.clone() {
                            player.user_id = user_id;
                        }

                        let catch_up = match room.game_state {
                            GameState::Starting => {
                                let elapsed = utils::now_millis()
                                    .saturating_sub(room.start_time.unwrap_or_default());
                                Some(RoomEvent::MatchFound {
                                    duration: self.config.countdown_ms.saturating_sub(elapsed),
                                    players: room.players.clone(),
                                })
                            }
                            GameState::Playing => room.problem.clone().map(|problem| {
                                let elapsed = utils::now_millis()
                                    .saturating_sub(room.game_start_time.unwrap_or_default());
                                RoomEvent::GameStart {
                                    problem,
                                    players: room.players.clone(),
                                    game_duration: self
                                        .config
                                        .game_duration_ms
                                        .saturating_sub(elapsed),
                                }
                            }),
                            _ => None,
                        };
                        PostLock::Reconnected(catch_up)
                    }
                    None if room.players.len() >= 2 => PostLock::MemoryFull,
                    None => {
                        let is_host = room.players.is_empty();
                        room.players.push(Player {
                            connection_id: connection_id.to_string(),
                            username: username.clone(),
                            user_id: user_id
                                .clone()
                                .unwrap_or_else(|| GUEST_USER_ID.to_string()),
                            score: 0,
                            connected: true,
                            is_host,
                        });

                        let started = room.players.len() == 2
                            && room.game_state == GameState::Waiting;
                        if started {
                            room.game_state = GameState::Starting;
                            room.start_time = Some(utils::now_millis());
                        }
                        PostLock::Joined { started }
                    }
                }
            }
        };

        // A join that passed the guard but then resolved to anything other
        // than a fresh roster entry must give its admission slot back, or the
        // slot leaks and a genuine second player is refused.
        if !is_reconnecting && !matches!(action, PostLock::Joined { .. }) {
            if let Err(db_error) = self.store.release_slot(&room_id, &player_id).await {
                tracing::error!(?db_error, %room_id, "failed to release admission slot");
            }
        }

        match action {
            PostLock::AlreadyJoined => Ok(JoinOutcome::AlreadyJoined),
            PostLock::Reconnected(catch_up) => {
                tracing::info!(%room_id, %username, "player reconnected");
                if let Some(event) = catch_up {
                    self.unicast(connection_id, event).await;
                }
                Ok(JoinOutcome::Reconnected)
            }
            PostLock::MemoryFull => {
                tracing::info!(%room_id, %username, "blocked join, roster is full");
                self.send_error(connection_id, &ApiError::RoomFull.to_string())
                    .await;
                Ok(JoinOutcome::Rejected)
            }
            PostLock::Joined { started } => {
                tracing::info!(%room_id, %username, "player joined");
                if started {
                    tracing::info!(%room_id, "match found, starting countdown");
                    let players = self.roster(&room_id);
                    self.broadcast(
                        &room_id,
                        RoomEvent::MatchFound {
                            duration: self.config.countdown_ms,
                            players,
                        },
                    )
                    .await;
                    self.spawn_problem_resolution(&room_id);
                    self.arm_countdown_timer(&room_id);
                }
                Ok(JoinOutcome::Joined)
            }
        }
    }

    /// Relay a player's progress to the other room member only; never echoed
    /// back, never persisted.
    pub async fn update_progress(
        &self,
        connection_id: &str,
        room_id: &str,
        progress: serde_json::Value,
    ) -> Result<(), ApiError> {
        if self.game_state(room_id).is_none() {
            return Err(ApiError::RoomNotFound {
                room_id: room_id.to_string(),
            });
        }
        let targets = self.connected_targets(room_id, Some(connection_id));
        for target in targets {
            let event = RoomEvent::OpponentProgress {
                progress: progress.clone(),
            };
            if let Err(db_error) = self.store.send_event(&target, event).await {
                tracing::debug!(?db_error, %target, "failed to relay progress");
            }
        }
        Ok(())
    }

    /// A player passed every hidden test case; end the game right away,
    /// preempting the duration timer.
    pub async fn submission_success(&self, connection_id: &str, room_id: &str) {
        let transitioned = {
            let mut rooms = self.rooms.lock().unwrap();
            match rooms.get_mut(room_id) {
                Some(room) if room.game_state != GameState::Finished => {
                    room.game_state = GameState::Finished;
                    // Superseded timers are cancelled outright; their own
                    // state re-check stays as the fallback.
                    room.abort_timers();
                    true
                }
                _ => false,
            }
        };

        if !transitioned {
            return;
        }

        tracing::info!(%room_id, "game over by submission");
        self.broadcast(
            room_id,
            RoomEvent::GameOver {
                winner_id: connection_id.to_string(),
                reason: GameOverReason::Submission,
            },
        )
        .await;
        self.schedule_eviction(room_id);
    }

    /// Mark the connection as gone everywhere it is tracked. A slot is only
    /// freed while the room is still waiting; later disconnects keep the
    /// record so the player can reconnect.
    pub async fn disconnect(&self, connection_id: &str) {
        let released = {
            let mut rooms = self.rooms.lock().unwrap();
            let mut released = Vec::new();
            for (room_id, room) in rooms.iter_mut() {
                if let Some(index) = room
                    .players
                    .iter()
                    .position(|player| player.connection_id == connection_id)
                {
                    room.players[index].connected = false;
                    if room.game_state == GameState::Waiting {
                        let player = room.players.remove(index);
                        tracing::info!(%room_id, "removed waiting player after disconnect");
                        released.push((room_id.clone(), player.user_id));
                    }
                }
            }
            // Emptied lobbies leave the registry with their last player.
            rooms.retain(|_, room| {
                room.game_state != GameState::Waiting || !room.players.is_empty()
            });
            released
        };

        // The admission slot goes back with the roster entry, so a
        // replacement player can still be admitted by the store guard.
        for (room_id, user_id) in released {
            if let Err(db_error) = self.store.release_slot(&room_id, &user_id).await {
                tracing::error!(?db_error, %room_id, "failed to release admission slot");
            }
        }

        let _ = self.store.remove_channel(connection_id);
    }

    /// Re-arm persisted deadlines after a restart. Running games get their
    /// timeout finish re-scheduled store-side (no sockets exist yet to
    /// broadcast to); stale lobbies are aborted rather than resurrected.
    pub async fn resume_pending_matches(&self) -> Result<(), ApiError> {
        let room_ids = self
            .store
            .list_active_rooms()
            .await
            .to_internal_api_error()?;
        let now = utils::now_millis();

        for room_id in room_ids {
            let match_record = match self.store.find_match(&room_id).await {
                Ok(match_record) => match_record,
                Err(db_error) => {
                    tracing::warn!(?db_error, %room_id, "skipping unreadable active match");
                    continue;
                }
            };

            match match_record.status {
                // A restart mid-countdown means nobody ever started playing;
                // there is no game to resume, so the match is abandoned.
                MatchStatus::Playing
                    if match_record
                        .countdown_deadline
                        .is_some_and(|deadline| deadline > now) =>
                {
                    let mut aborted = match_record;
                    aborted.status = MatchStatus::Aborted;
                    if let Err(db_error) = self.store.insert_match(aborted).await {
                        tracing::error!(?db_error, %room_id, "failed to abort interrupted match");
                    } else {
                        tracing::info!(%room_id, "aborted match interrupted mid-countdown");
                    }
                }
                MatchStatus::Playing => {
                    let deadline = match_record.game_end_deadline.unwrap_or(now);
                    let winner = match_record
                        .player1
                        .clone()
                        .unwrap_or_else(|| GUEST_USER_ID.to_string());
                    let delay = Duration::from_millis(deadline.saturating_sub(now));
                    tracing::info!(%room_id, ?delay, "re-armed game deadline for resumed match");

                    let this = self.clone();
                    tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        match this
                            .store
                            .finish_match(&room_id, &winner, utils::now_millis())
                            .await
                        {
                            Ok(true) => {
                                tracing::info!(%room_id, "resumed match finished on timeout")
                            }
                            Ok(false) => {}
                            Err(db_error) => {
                                tracing::error!(?db_error, %room_id, "failed to finish resumed match")
                            }
                        }
                    });
                }
                MatchStatus::Waiting => {
                    if now.saturating_sub(match_record.created_at) > self.config.room_ttl_ms {
                        let mut aborted = match_record;
                        aborted.status = MatchStatus::Aborted;
                        if let Err(db_error) = self.store.insert_match(aborted).await {
                            tracing::error!(?db_error, %room_id, "failed to abort stale match");
                        } else {
                            tracing::info!(%room_id, "aborted stale waiting match");
                        }
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    async fn on_countdown_elapsed(&self, room_id: &str) {
        let event = {
            let mut rooms = self.rooms.lock().unwrap();
            let Some(room) = rooms.get_mut(room_id) else {
                return;
            };
            if room.game_state != GameState::Starting {
                return;
            }
            room.game_state = GameState::Playing;
            room.game_start_time = Some(utils::now_millis());
            let problem = room
                .problem
                .get_or_insert_with(problem::fallback_problem)
                .clone();
            RoomEvent::GameStart {
                problem,
                players: room.players.clone(),
                game_duration: self.config.game_duration_ms,
            }
        };

        tracing::info!(%room_id, "countdown elapsed, game starting");
        self.broadcast(room_id, event).await;
        self.arm_game_timer(room_id);
    }

    async fn on_game_timeout(&self, room_id: &str) {
        let winner = {
            let mut rooms = self.rooms.lock().unwrap();
            let Some(room) = rooms.get_mut(room_id) else {
                return;
            };
            if room.game_state != GameState::Playing {
                return;
            }
            room.game_state = GameState::Finished;
            let host = room
                .players
                .iter()
                .find(|player| player.is_host)
                .or_else(|| room.players.first());
            host.map(|player| (player.connection_id.clone(), player.user_id.clone()))
        };

        let Some((winner_connection, winner_user)) = winner else {
            return;
        };

        tracing::info!(%room_id, "game duration elapsed, host wins by timeout");
        // Best effort; a lost terminal write is logged, not retried.
        if let Err(db_error) = self
            .store
            .finish_match(room_id, &winner_user, utils::now_millis())
            .await
        {
            tracing::error!(?db_error, %room_id, "failed to persist timeout result");
        }
        self.broadcast(
            room_id,
            RoomEvent::GameOver {
                winner_id: winner_connection,
                reason: GameOverReason::Timeout,
            },
        )
        .await;
        self.schedule_eviction(room_id);
    }

    fn spawn_problem_resolution(&self, room_id: &str) {
        let this = self.clone();
        let room_id = room_id.to_string();
        tokio::spawn(async move {
            this.resolve_and_record_problem(&room_id).await;
        });
    }

    /// Resolve the room's problem without blocking the countdown, cache it,
    /// and persist the authoritative test cases on the match record.
    async fn resolve_and_record_problem(&self, room_id: &str) {
        let already_cached = {
            let rooms = self.rooms.lock().unwrap();
            rooms
                .get(room_id)
                .map(|room| room.problem.is_some())
                .unwrap_or(false)
        };
        if already_cached {
            return;
        }

        let fetched =
            problem::resolve_problem(self.provider.as_ref(), self.config.problem_fetch_retries)
                .await;

        // If the countdown already cached the fallback, persist that one so
        // the record matches what the players were shown.
        let snapshot = {
            let mut rooms = self.rooms.lock().unwrap();
            let Some(room) = rooms.get_mut(room_id) else {
                return;
            };
            let problem = room.problem.get_or_insert_with(|| fetched).clone();
            (
                problem,
                room.players.first().cloned(),
                room.players.get(1).cloned(),
                room.start_time,
            )
        };
        let (problem, Some(player1), Some(player2), start_time) = snapshot else {
            return;
        };

        let match_record = match self.store.find_match(room_id).await {
            Ok(match_record) => match_record,
            Err(db_error) => {
                tracing::error!(?db_error, %room_id, "no match record to attach the problem to");
                return;
            }
        };
        // The game may already be over (a very fast win, or a concurrent
        // finisher on another instance); the record is then final.
        if match_record.is_terminal() {
            return;
        }

        let game_start = start_time.unwrap_or_else(utils::now_millis) + self.config.countdown_ms;
        let mut updated = match_record;
        updated.status = MatchStatus::Playing;
        updated.problem_id = Some(problem.problem_id.clone());
        if updated.test_cases.is_empty() {
            updated.test_cases = problem.test_cases.clone();
        }
        updated.player1 = Some(player1.user_id);
        updated.player2 = Some(player2.user_id);
        updated.player1_username = player1.username;
        updated.player2_username = player2.username;
        updated.start_time = Some(game_start);
        updated.countdown_deadline = Some(game_start);
        updated.game_end_deadline = Some(game_start + self.config.game_duration_ms);

        // Guarded write; a finish that lands between the reload above and
        // this point wins and the stale snapshot is discarded.
        match self.store.record_game_start(updated).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!(%room_id, "match finished before the problem was recorded")
            }
            Err(db_error) => {
                tracing::error!(?db_error, %room_id, "failed to record the resolved problem")
            }
        }
    }

    fn arm_countdown_timer(&self, room_id: &str) {
        let this = self.clone();
        let task_room_id = room_id.to_string();
        let delay = Duration::from_millis(self.config.countdown_ms);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            this.on_countdown_elapsed(&task_room_id).await;
        });

        let mut rooms = self.rooms.lock().unwrap();
        match rooms.get_mut(room_id) {
            Some(room) => room.countdown_timer = Some(handle),
            None => handle.abort(),
        }
    }

    fn arm_game_timer(&self, room_id: &str) {
        let this = self.clone();
        let task_room_id = room_id.to_string();
        let delay = Duration::from_millis(self.config.game_duration_ms);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            this.on_game_timeout(&task_room_id).await;
        });

        let mut rooms = self.rooms.lock().unwrap();
        match rooms.get_mut(room_id) {
            Some(room) => room.game_timer = Some(handle),
            None => handle.abort(),
        }
    }

    /// Drop the room from the registry once its TTL after finishing expires.
    fn schedule_eviction(&self, room_id: &str) {
        let this = self.clone();
        let room_id = room_id.to_string();
        let ttl = Duration::from_millis(self.config.room_ttl_ms);
        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            let removed = this.rooms.lock().unwrap().remove(&room_id);
            if let Some(mut room) = removed {
                room.abort_timers();
                tracing::debug!(%room_id, "evicted finished room");
            }
        });
    }

    fn roster(&self, room_id: &str) -> Vec<Player> {
        self.rooms
            .lock()
            .unwrap()
            .get(room_id)
            .map(|room| room.players.clone())
            .unwrap_or_default()
    }

    fn connected_targets(&self, room_id: &str, exclude: Option<&str>) -> Vec<String> {
        self.rooms
            .lock()
            .unwrap()
            .get(room_id)
            .map(|room| {
                room.players
                    .iter()
                    .filter(|player| {
                        player.connected && Some(player.connection_id.as_str()) != exclude
                    })
                    .map(|player| player.connection_id.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    async fn broadcast(&self, room_id: &str, event: RoomEvent) {
        for target in self.connected_targets(room_id, None) {
            if let Err(db_error) = self.store.send_event(&target, event.clone()).await {
                tracing::debug!(?db_error, %target, "failed to deliver event");
            }
        }
    }

    async fn unicast(&self, connection_id: &str, event: RoomEvent) {
        if let Err(db_error) = self.store.send_event(connection_id, event).await {
            tracing::debug!(?db_error, %connection_id, "failed to deliver event");
        }
    }

    async fn send_error(&self, connection_id: &str, message: &str) {
        self.unicast(
            connection_id,
            RoomEvent::Error {
                message: message.to_string(),
            },
        )
        .await;
    }
}
