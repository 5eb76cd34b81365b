use std::{collections::HashMap, sync::Mutex};

use crate::app::{
    errors::{ApiError, ResultExtApp},
    executor::{CodeExecutor, Execution},
    storage::{
        interface::{match_store::MatchInterface, user_store::UserInterface},
        models::{Rank, TestCase},
    },
    types::GUEST_USER_ID,
    utils,
};

/// Outcome of a trial run against the first visible test case.
#[derive(serde::Serialize, Clone, Debug)]
#[serde(untagged)]
pub enum RunOutcome {
    Completed {
        passed: bool,
        output: String,
        expected: String,
    },
    RuntimeError {
        error: String,
    },
}

#[derive(serde::Serialize, Clone, Debug)]
pub struct CaseResult {
    pub test_case: usize,
    pub passed: bool,
    pub input: String,
    pub expected: String,
    pub actual: String,
}

#[derive(serde::Serialize, Clone, Debug)]
pub struct SubmitOutcome {
    /// Every hidden test case passed.
    pub success: bool,
    /// Empty when execution aborted with a runtime error.
    pub results: Vec<CaseResult>,
    pub runtime_error: Option<String>,
    /// This submission is the one that ended the game. False for correct
    /// submissions that lost the race against the opponent or the timeout.
    pub newly_finished: bool,
}

/// Judges submissions against the persisted test cases of a match and settles
/// the winner's and loser's profiles.
///
/// The store record is the authoritative source of test cases; resolved sets
/// are cached per room since they never change once the game started.
pub struct SubmissionEvaluator<S, E> {
    store: S,
    executor: E,
    test_case_cache: Mutex<HashMap<String, Vec<TestCase>>>,
}

impl<S, E> SubmissionEvaluator<S, E>
where
    S: MatchInterface + UserInterface + Sync,
    E: CodeExecutor + Sync,
{
    pub fn new(store: S, executor: E) -> Self {
        Self {
            store,
            executor,
            test_case_cache: Mutex::new(HashMap::new()),
        }
    }

    /// Run candidate code against the first test case only; a quick feedback
    /// loop that never affects the match outcome.
    pub async fn run_code(
        &self,
        room_id: &str,
        source_code: &str,
        language: &str,
    ) -> Result<RunOutcome, ApiError> {
        let test_cases = self.resolve_test_cases(room_id).await?;
        let first = test_cases
            .first()
            .ok_or_else(|| ApiError::NoTestCases {
                room_id: room_id.to_string(),
            })?;

        let execution = self
            .executor
            .execute(source_code, language, &first.input)
            .await
            .map_err(|error| {
                tracing::error!(%error, %room_id, "trial run execution failed");
                ApiError::ExecutionFailed
            })?;

        Ok(match execution {
            Execution::Completed { stdout } => {
                let output = stdout.trim().to_string();
                RunOutcome::Completed {
                    passed: output == first.expected_output.trim(),
                    output,
                    expected: first.expected_output.clone(),
                }
            }
            Execution::RuntimeError { error } => RunOutcome::RuntimeError { error },
        })
    }

    /// Judge a submission against every test case. A fully passing submission
    /// finishes the match exclusively and settles both players' stats; the
    /// caller is responsible for the room-side game-over handling.
    pub async fn submit_code(
        &self,
        room_id: &str,
        user_id: &str,
        source_code: &str,
        language: &str,
    ) -> Result<SubmitOutcome, ApiError> {
        let test_cases = self.resolve_test_cases(room_id).await?;

        let mut results = Vec::with_capacity(test_cases.len());
        for (index, test_case) in test_cases.iter().enumerate() {
            let execution = self
                .executor
                .execute(source_code, language, &test_case.input)
                .await
                .map_err(|error| {
                    tracing::error!(%error, %room_id, "submission execution failed");
                    ApiError::ExecutionFailed
                })?;

            match execution {
                Execution::Completed { stdout } => {
                    let actual = stdout.trim().to_string();
                    results.push(CaseResult {
                        test_case: index + 1,
                        passed: actual == test_case.expected_output.trim(),
                        input: test_case.input.clone(),
                        expected: test_case.expected_output.clone(),
                        actual,
                    });
                }
                // A crashing program cannot pass later cases either; stop
                // judging and report the error alone.
                Execution::RuntimeError { error } => {
                    return Ok(SubmitOutcome {
                        success: false,
                        results: Vec::new(),
                        runtime_error: Some(error),
                        newly_finished: false,
                    });
                }
            }
        }

        let success = results.iter().all(|result| result.passed);
        if !success {
            return Ok(SubmitOutcome {
                success,
                results,
                runtime_error: None,
                newly_finished: false,
            });
        }

        let newly_finished = self
            .store
            .finish_match(room_id, user_id, utils::now_millis())
            .await
            .to_not_found(ApiError::MatchNotFound {
                room_id: room_id.to_string(),
            })?;

        if newly_finished {
            tracing::info!(%room_id, %user_id, "submission accepted, match finished");
            self.settle_stats(room_id, user_id).await;
        } else {
            tracing::info!(%room_id, "submission accepted but the match was already over");
        }

        Ok(SubmitOutcome {
            success,
            results,
            runtime_error: None,
            newly_finished,
        })
    }

    async fn resolve_test_cases(&self, room_id: &str) -> Result<Vec<TestCase>, ApiError> {
        if let Some(cached) = self.test_case_cache.lock().unwrap().get(room_id) {
            return Ok(cached.clone());
        }

        let match_record = self
            .store
            .find_match(room_id)
            .await
            .to_not_found(ApiError::MatchNotFound {
                room_id: room_id.to_string(),
            })?;
        if match_record.test_cases.is_empty() {
            return Err(ApiError::NoTestCases {
                room_id: room_id.to_string(),
            });
        }

        let mut cache = self.test_case_cache.lock().unwrap();
        Ok(cache
            .entry(room_id.to_string())
            .or_insert(match_record.test_cases)
            .clone())
    }

    /// Update both players' profiles concurrently. Failures here never fail
    /// the submission; the match result is already recorded.
    async fn settle_stats(&self, room_id: &str, winner_user_id: &str) {
        let match_record = match self.store.find_match(room_id).await {
            Ok(match_record) => match_record,
            Err(db_error) => {
                tracing::error!(?db_error, %room_id, "cannot settle stats without the match record");
                return;
            }
        };

        let player1 = match_record.player1.as_deref();
        let player2 = match_record.player2.as_deref();
        tokio::join!(
            self.update_stats(player1, player1 == Some(winner_user_id)),
            self.update_stats(player2, player2 == Some(winner_user_id)),
        );
    }

    async fn update_stats(&self, user_id: Option<&str>, won: bool) {
        let Some(user_id) = user_id else { return };
        if user_id == GUEST_USER_ID || user_id == "guest_user" {
            return;
        }

        let mut user = match self.store.find_user(user_id).await {
            Ok(user) => user,
            Err(db_error) => {
                tracing::warn!(?db_error, %user_id, "skipping stats update for unknown user");
                return;
            }
        };

        user.matches_played += 1;
        if won {
            user.wins += 1;
        }
        user.rank = Rank::from_wins(user.wins);

        match self.store.insert_user(user).await {
            Ok(user) => {
                tracing::info!(%user_id, wins = user.wins, rank = ?user.rank, "updated player stats")
            }
            Err(db_error) => tracing::error!(?db_error, %user_id, "failed to persist player stats"),
        }
    }
}
