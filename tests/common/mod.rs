#![allow(dead_code)]

use std::{
    collections::HashMap,
    future::Future,
    sync::{Arc, Mutex},
};

use codeduel::app::{
    errors::DbError,
    executor::{CodeExecutor, Execution, ExecutorError},
    problem::{ProblemProvider, ProviderError},
    storage::{
        interface::{
            match_store::{AdmissionOutcome, MatchInterface},
            session::{SessionChannel, SessionInterface},
            user_store::UserInterface,
        },
        models::{Match, MatchStatus, Problem, Rank, TestCase, User},
        StorageResult,
    },
    types::{RoomEvent, GUEST_USER_ID},
};
use tokio::sync::mpsc;

#[derive(Default)]
struct Inner {
    matches: HashMap<String, Match>,
    admissions: HashMap<String, Vec<String>>,
    finish_tokens: HashMap<String, String>,
    users: HashMap<String, User>,
    histories: HashMap<String, Vec<String>>,
    channels: HashMap<String, SessionChannel>,
    admission_outage: bool,
}

/// In-memory stand-in for the redis-backed store, mirroring its atomicity:
/// one lock guards the whole state, so the admission check-and-claim and the
/// finish token claim are indivisible.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every admission attempt fail as if the store were unreachable.
    pub fn set_admission_outage(&self, outage: bool) {
        self.inner.lock().unwrap().admission_outage = outage;
    }

    pub fn seed_user(&self, user: User) {
        let mut inner = self.inner.lock().unwrap();
        inner.users.insert(user.user_id.clone(), user);
    }

    pub fn stored_match(&self, room_id: &str) -> Option<Match> {
        self.inner.lock().unwrap().matches.get(room_id).cloned()
    }

    pub fn stored_user(&self, user_id: &str) -> Option<User> {
        self.inner.lock().unwrap().users.get(user_id).cloned()
    }
}

impl MatchInterface for MemoryStore {
    async fn insert_match(&self, match_record: Match) -> StorageResult<Match> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .matches
            .insert(match_record.room_id.clone(), match_record.clone());
        Ok(match_record)
    }

    async fn find_match(&self, room_id: &str) -> StorageResult<Match> {
        let inner = self.inner.lock().unwrap();
        inner.matches.get(room_id).cloned().ok_or(DbError::NotFound)
    }

    async fn try_admit_player(
        &self,
        room_id: &str,
        player_id: &str,
    ) -> StorageResult<AdmissionOutcome> {
        // A real guard is a network round-trip; suspend so callers interleave
        // the way they would against redis.
        tokio::task::yield_now().await;
        let mut inner = self.inner.lock().unwrap();
        if inner.admission_outage {
            return Err(DbError::Others(fred::error::RedisError::new(
                fred::error::RedisErrorKind::IO,
                "connection refused",
            )));
        }

        if !inner.matches.contains_key(room_id) {
            inner.matches.insert(
                room_id.to_string(),
                Match::new(room_id.to_string(), None),
            );
        }
        let slots = inner.admissions.entry(room_id.to_string()).or_default();
        if slots.len() >= 2 {
            return Ok(AdmissionOutcome::RoomFull);
        }
        slots.push(player_id.to_string());
        Ok(AdmissionOutcome::Admitted)
    }

    async fn record_game_start(&self, match_record: Match) -> StorageResult<bool> {
        let mut inner = self.inner.lock().unwrap();
        if inner.finish_tokens.contains_key(&match_record.room_id) {
            return Ok(false);
        }
        inner
            .matches
            .insert(match_record.room_id.clone(), match_record);
        Ok(true)
    }

    async fn release_slot(&self, room_id: &str, player_id: &str) -> StorageResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(slots) = inner.admissions.get_mut(room_id) {
            if let Some(index) = slots.iter().position(|slot| slot == player_id) {
                slots.remove(index);
            }
        }
        Ok(())
    }

    async fn finish_match(
        &self,
        room_id: &str,
        winner: &str,
        end_time: u64,
    ) -> StorageResult<bool> {
        let mut inner = self.inner.lock().unwrap();
        if inner.finish_tokens.contains_key(room_id) {
            return Ok(false);
        }
        if !inner.matches.contains_key(room_id) {
            return Err(DbError::NotFound);
        }
        inner
            .finish_tokens
            .insert(room_id.to_string(), winner.to_string());

        let match_record = inner.matches.get_mut(room_id).unwrap();
        match_record.status = MatchStatus::Finished;
        match_record.winner = Some(winner.to_string());
        match_record.end_time = Some(end_time);
        let players: Vec<String> = [&match_record.player1, &match_record.player2]
            .into_iter()
            .flatten()
            .cloned()
            .collect();

        for player in players {
            if player == GUEST_USER_ID || player == "guest_user" {
                continue;
            }
            inner
                .histories
                .entry(player)
                .or_default()
                .insert(0, room_id.to_string());
        }
        Ok(true)
    }

    async fn list_active_rooms(&self) -> StorageResult<Vec<String>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .matches
            .values()
            .filter(|match_record| !match_record.is_terminal())
            .map(|match_record| match_record.room_id.clone())
            .collect())
    }

    async fn find_recent_finished(
        &self,
        user_id: &str,
        limit: usize,
    ) -> StorageResult<Vec<Match>> {
        let inner = self.inner.lock().unwrap();
        let room_ids = inner.histories.get(user_id).cloned().unwrap_or_default();
        let mut matches: Vec<Match> = room_ids
            .iter()
            .filter_map(|room_id| inner.matches.get(room_id))
            .filter(|match_record| match_record.status == MatchStatus::Finished)
            .cloned()
            .collect();
        matches.sort_by(|a, b| b.end_time.cmp(&a.end_time));
        matches.truncate(limit);
        Ok(matches)
    }
}

impl UserInterface for MemoryStore {
    async fn insert_user(&self, user: User) -> StorageResult<User> {
        let mut inner = self.inner.lock().unwrap();
        inner.users.insert(user.user_id.clone(), user.clone());
        Ok(user)
    }

    async fn find_user(&self, user_id: &str) -> StorageResult<User> {
        let inner = self.inner.lock().unwrap();
        inner.users.get(user_id).cloned().ok_or(DbError::NotFound)
    }
}

impl SessionInterface for MemoryStore {
    fn insert_channel(&self, connection_id: &str, channel: SessionChannel) -> StorageResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.channels.insert(connection_id.to_string(), channel);
        Ok(())
    }

    fn remove_channel(&self, connection_id: &str) -> StorageResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.channels.remove(connection_id);
        Ok(())
    }

    fn send_event(
        &self,
        connection_id: &str,
        event: RoomEvent,
    ) -> impl Future<Output = StorageResult<()>> + Send {
        let channel = {
            let inner = self.inner.lock().unwrap();
            inner.channels.get(connection_id).cloned()
        };
        async move {
            let channel = channel.ok_or(DbError::NotFound)?;
            let _ = channel.send(event).await;
            Ok(())
        }
    }
}

/// Register an event channel for a connection and hand back the receiving end.
pub fn register_connection(store: &MemoryStore, connection_id: &str) -> mpsc::Receiver<RoomEvent> {
    let (sender, receiver) = mpsc::channel(32);
    store.insert_channel(connection_id, sender).unwrap();
    receiver
}

pub fn sample_user(user_id: &str, wins: u32) -> User {
    let mut user = User::new(
        user_id.trim_start_matches("user_").to_string(),
        format!("{user_id}@example.com"),
        "hunter2".to_string(),
    );
    user.user_id = user_id.to_string();
    user.wins = wins;
    user.matches_played = wins;
    user.rank = Rank::from_wins(wins);
    user
}

pub fn sample_problem() -> Problem {
    Problem {
        problem_id: "sum-pair".to_string(),
        title: "Sum Pair".to_string(),
        description: "Print the sum of two integers.".to_string(),
        starter_code: HashMap::new(),
        test_cases: vec![
            TestCase {
                input: "1 2".to_string(),
                expected_output: "3".to_string(),
            },
            TestCase {
                input: "10 -4".to_string(),
                expected_output: "6".to_string(),
            },
        ],
    }
}

pub struct StubProvider(pub Problem);

impl ProblemProvider for StubProvider {
    fn fetch_problem(&self) -> impl Future<Output = Result<Problem, ProviderError>> + Send {
        std::future::ready(Ok(self.0.clone()))
    }
}

pub struct FailingProvider;

impl ProblemProvider for FailingProvider {
    fn fetch_problem(&self) -> impl Future<Output = Result<Problem, ProviderError>> + Send {
        std::future::ready(Err(ProviderError {
            message: "provider offline".to_string(),
        }))
    }
}

/// Executor scripted by a plain function of (source, language, input).
pub struct FnExecutor<F>(pub F);

impl<F> CodeExecutor for FnExecutor<F>
where
    F: Fn(&str, &str, &str) -> Result<Execution, ExecutorError> + Send + Sync,
{
    fn execute(
        &self,
        source_code: &str,
        language: &str,
        input: &str,
    ) -> impl Future<Output = Result<Execution, ExecutorError>> + Send {
        std::future::ready((self.0)(source_code, language, input))
    }
}
