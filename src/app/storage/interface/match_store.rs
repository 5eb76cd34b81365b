use std::future::Future;

use crate::app::{
    errors::DbError,
    storage::{models, StorageResult, Store},
    types,
};

const ACTIVE_ROOMS_KEY: &str = "rooms:active";

fn match_key(room_id: &str) -> String {
    format!("match:{room_id}")
}

fn slots_key(room_id: &str) -> String {
    format!("match:{room_id}:slots")
}

fn finish_key(room_id: &str) -> String {
    format!("match:{room_id}:finished")
}

fn history_key(user_id: &str) -> String {
    format!("history:{user_id}")
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AdmissionOutcome {
    Admitted,
    /// The second player slot was already taken.
    RoomFull,
}

pub trait MatchInterface {
    fn insert_match(
        &self,
        match_record: models::Match,
    ) -> impl Future<Output = StorageResult<models::Match>> + Send;

    fn find_match(&self, room_id: &str)
        -> impl Future<Output = StorageResult<models::Match>> + Send;

    /// The admission guard of the room lifecycle: one indivisible conditional
    /// update that admits the joiner only while the second slot is free,
    /// creating the match record if it does not exist yet.
    fn try_admit_player(
        &self,
        room_id: &str,
        player_id: &str,
    ) -> impl Future<Output = StorageResult<AdmissionOutcome>> + Send;

    /// Persist the pre-game mutation of a match (problem, roster, deadlines,
    /// `playing` status), refused once the match has been finished so a stale
    /// snapshot can never undo the terminal transition. Returns whether the
    /// write happened.
    fn record_game_start(
        &self,
        match_record: models::Match,
    ) -> impl Future<Output = StorageResult<bool>> + Send;

    /// Give back an admission slot taken by a player who left while the room
    /// was still waiting.
    fn release_slot(
        &self,
        room_id: &str,
        player_id: &str,
    ) -> impl Future<Output = StorageResult<()>> + Send;

    /// Exclusive terminal transition. Returns true iff this call moved the
    /// match to finished; a concurrent second finisher observes false.
    fn finish_match(
        &self,
        room_id: &str,
        winner: &str,
        end_time: u64,
    ) -> impl Future<Output = StorageResult<bool>> + Send;

    fn list_active_rooms(&self) -> impl Future<Output = StorageResult<Vec<String>>> + Send;

    /// Finished matches involving the user, newest first.
    fn find_recent_finished(
        &self,
        user_id: &str,
        limit: usize,
    ) -> impl Future<Output = StorageResult<Vec<models::Match>>> + Send;
}

impl MatchInterface for Store {
    async fn insert_match(&self, match_record: models::Match) -> StorageResult<models::Match> {
        let key = match_key(&match_record.room_id);
        let match_record = self.redis_client.serialize_and_set(key, match_record).await?;
        if match_record.is_terminal() {
            self.redis_client
                .set_remove(ACTIVE_ROOMS_KEY, &match_record.room_id)
                .await?;
        } else {
            self.redis_client
                .set_add(ACTIVE_ROOMS_KEY, &match_record.room_id)
                .await?;
        }
        Ok(match_record)
    }

    async fn find_match(&self, room_id: &str) -> StorageResult<models::Match> {
        self.redis_client.get_and_deserialize(match_key(room_id)).await
    }

    async fn try_admit_player(
        &self,
        room_id: &str,
        player_id: &str,
    ) -> StorageResult<AdmissionOutcome> {
        let fresh_match = models::Match::new(room_id.to_string(), None);
        let fresh_match_json =
            serde_json::to_string(&fresh_match).map_err(|_| DbError::ParsingFailure)?;

        let admitted = self
            .redis_client
            .admit_player(
                &match_key(room_id),
                &slots_key(room_id),
                ACTIVE_ROOMS_KEY,
                player_id,
                fresh_match_json,
                room_id,
            )
            .await?;

        if admitted {
            Ok(AdmissionOutcome::Admitted)
        } else {
            Ok(AdmissionOutcome::RoomFull)
        }
    }

    async fn record_game_start(&self, match_record: models::Match) -> StorageResult<bool> {
        let room_id = match_record.room_id.clone();
        let match_json =
            serde_json::to_string(&match_record).map_err(|_| DbError::ParsingFailure)?;
        self.redis_client
            .record_game(
                &match_key(&room_id),
                &finish_key(&room_id),
                ACTIVE_ROOMS_KEY,
                match_json,
                &room_id,
            )
            .await
    }

    async fn release_slot(&self, room_id: &str, player_id: &str) -> StorageResult<()> {
        self.redis_client
            .list_remove(&slots_key(room_id), player_id)
            .await
    }

    async fn finish_match(
        &self,
        room_id: &str,
        winner: &str,
        end_time: u64,
    ) -> StorageResult<bool> {
        // The claim token is what makes the transition exclusive; only the
        // claimant mutates the record afterwards.
        if !self
            .redis_client
            .set_if_absent(&finish_key(room_id), winner)
            .await?
        {
            return Ok(false);
        }

        let mut match_record: models::Match = self
            .redis_client
            .get_and_deserialize(match_key(room_id))
            .await?;
        match_record.status = models::MatchStatus::Finished;
        match_record.winner = Some(winner.to_string());
        match_record.end_time = Some(end_time);
        let match_record = self
            .redis_client
            .serialize_and_set(match_key(room_id), match_record)
            .await?;
        self.redis_client
            .set_remove(ACTIVE_ROOMS_KEY, room_id)
            .await?;

        for player in [&match_record.player1, &match_record.player2]
            .into_iter()
            .flatten()
        {
            if player == types::GUEST_USER_ID || player == "guest_user" {
                continue;
            }
            self.redis_client
                .list_push(&history_key(player), room_id)
                .await?;
        }

        Ok(true)
    }

    async fn list_active_rooms(&self) -> StorageResult<Vec<String>> {
        self.redis_client.set_members(ACTIVE_ROOMS_KEY).await
    }

    async fn find_recent_finished(
        &self,
        user_id: &str,
        limit: usize,
    ) -> StorageResult<Vec<models::Match>> {
        let room_ids = self
            .redis_client
            .list_range(&history_key(user_id), 0, limit as i64 - 1)
            .await?;

        let mut matches = Vec::with_capacity(room_ids.len());
        for room_id in room_ids {
            match self
                .redis_client
                .get_and_deserialize::<_, models::Match>(match_key(&room_id))
                .await
            {
                Ok(match_record) if match_record.status == models::MatchStatus::Finished => {
                    matches.push(match_record)
                }
                Ok(_) => {}
                Err(db_error) if db_error.is_not_found() => {}
                Err(db_error) => return Err(db_error),
            }
        }

        matches.sort_by(|a, b| b.end_time.cmp(&a.end_time));
        matches.truncate(limit);
        Ok(matches)
    }
}
