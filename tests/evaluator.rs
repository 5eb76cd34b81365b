mod common;

use codeduel::app::{
    errors::ApiError,
    evaluator::{RunOutcome, SubmissionEvaluator},
    executor::{Execution, ExecutorError},
    storage::{
        interface::match_store::MatchInterface,
        models::{Match, MatchStatus, Rank},
    },
};
use common::{sample_problem, sample_user, FnExecutor, MemoryStore};

const ROOM: &str = "AB12CD";

/// Executor that solves the sample problem, with trailing whitespace to
/// exercise output trimming.
fn solving_executor() -> FnExecutor<impl Fn(&str, &str, &str) -> Result<Execution, ExecutorError>> {
    FnExecutor(|_source: &str, _language: &str, input: &str| {
        let stdout = match input {
            "1 2" => "3\n",
            "10 -4" => "6\n",
            _ => "",
        };
        Ok(Execution::Completed {
            stdout: stdout.to_string(),
        })
    })
}

async fn seed_playing_match(store: &MemoryStore, player1: &str, player2: &str) {
    let mut match_record = Match::new(ROOM.to_string(), Some(player1.to_string()));
    match_record.player2 = Some(player2.to_string());
    match_record.status = MatchStatus::Playing;
    match_record.test_cases = sample_problem().test_cases;
    store.insert_match(match_record).await.unwrap();
}

#[tokio::test]
async fn trial_run_checks_the_first_case_only() {
    let store = MemoryStore::new();
    seed_playing_match(&store, "user_a", "user_b").await;
    let evaluator = SubmissionEvaluator::new(store.clone(), solving_executor());

    let outcome = evaluator.run_code(ROOM, "solution()", "rust").await.unwrap();
    match outcome {
        RunOutcome::Completed {
            passed,
            output,
            expected,
        } => {
            assert!(passed);
            assert_eq!(output, "3");
            assert_eq!(expected, "3");
        }
        RunOutcome::RuntimeError { error } => panic!("unexpected runtime error: {error}"),
    }

    // Trial runs never touch the match record.
    let match_record = store.stored_match(ROOM).unwrap();
    assert_eq!(match_record.status, MatchStatus::Playing);
    assert!(match_record.winner.is_none());
}

#[tokio::test]
async fn trial_run_reports_runtime_errors() {
    let store = MemoryStore::new();
    seed_playing_match(&store, "user_a", "user_b").await;
    let evaluator = SubmissionEvaluator::new(
        store.clone(),
        FnExecutor(|_: &str, _: &str, _: &str| {
            Ok(Execution::RuntimeError {
                error: "segmentation fault".to_string(),
            })
        }),
    );

    let outcome = evaluator.run_code(ROOM, "solution()", "rust").await.unwrap();
    assert!(matches!(outcome, RunOutcome::RuntimeError { .. }));
}

#[tokio::test]
async fn unknown_room_and_missing_test_cases_are_distinct_errors() {
    let store = MemoryStore::new();
    let evaluator = SubmissionEvaluator::new(store.clone(), solving_executor());

    let result = evaluator.run_code("NOPE99", "solution()", "rust").await;
    assert!(matches!(result, Err(ApiError::MatchNotFound { .. })));

    // A match that never got its problem recorded.
    store
        .insert_match(Match::new(ROOM.to_string(), Some("user_a".to_string())))
        .await
        .unwrap();
    let result = evaluator.run_code(ROOM, "solution()", "rust").await;
    assert!(matches!(result, Err(ApiError::NoTestCases { .. })));
}

#[tokio::test]
async fn winning_submission_finishes_the_match_and_settles_stats() {
    let store = MemoryStore::new();
    seed_playing_match(&store, "user_a", "user_b").await;
    // One win away from the next tier.
    store.seed_user(sample_user("user_a", 2));
    store.seed_user(sample_user("user_b", 0));
    let evaluator = SubmissionEvaluator::new(store.clone(), solving_executor());

    let outcome = evaluator
        .submit_code(ROOM, "user_a", "solution()", "rust")
        .await
        .unwrap();
    assert!(outcome.success);
    assert!(outcome.newly_finished);
    assert_eq!(outcome.results.len(), 2);
    assert_eq!(outcome.results[0].test_case, 1);
    assert_eq!(outcome.results[1].test_case, 2);
    assert!(outcome.results.iter().all(|result| result.passed));

    let match_record = store.stored_match(ROOM).unwrap();
    assert_eq!(match_record.status, MatchStatus::Finished);
    assert_eq!(match_record.winner.as_deref(), Some("user_a"));

    let winner = store.stored_user("user_a").unwrap();
    assert_eq!(winner.wins, 3);
    assert_eq!(winner.matches_played, 3);
    assert_eq!(winner.rank, Rank::Apprentice);

    let loser = store.stored_user("user_b").unwrap();
    assert_eq!(loser.wins, 0);
    assert_eq!(loser.matches_played, 1);
    assert_eq!(loser.rank, Rank::Novice);

    // The finished match lands in both players' histories.
    let history = store.find_recent_finished("user_a", 20).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].room_id, ROOM);
}

#[tokio::test]
async fn second_correct_submission_does_not_double_award() {
    let store = MemoryStore::new();
    seed_playing_match(&store, "user_a", "user_b").await;
    store.seed_user(sample_user("user_a", 0));
    store.seed_user(sample_user("user_b", 0));
    let evaluator = SubmissionEvaluator::new(store.clone(), solving_executor());

    let first = evaluator
        .submit_code(ROOM, "user_a", "solution()", "rust")
        .await
        .unwrap();
    assert!(first.newly_finished);

    let second = evaluator
        .submit_code(ROOM, "user_b", "solution()", "rust")
        .await
        .unwrap();
    assert!(second.success);
    assert!(!second.newly_finished);

    let match_record = store.stored_match(ROOM).unwrap();
    assert_eq!(match_record.winner.as_deref(), Some("user_a"));

    // Stats were settled exactly once.
    let user_a = store.stored_user("user_a").unwrap();
    assert_eq!(user_a.wins, 1);
    assert_eq!(user_a.matches_played, 1);
    let user_b = store.stored_user("user_b").unwrap();
    assert_eq!(user_b.wins, 0);
    assert_eq!(user_b.matches_played, 1);
}

#[tokio::test]
async fn wrong_answers_report_per_case_verdicts() {
    let store = MemoryStore::new();
    seed_playing_match(&store, "user_a", "user_b").await;
    let evaluator = SubmissionEvaluator::new(
        store.clone(),
        FnExecutor(|_: &str, _: &str, input: &str| {
            let stdout = if input == "1 2" { "3" } else { "-42" };
            Ok(Execution::Completed {
                stdout: stdout.to_string(),
            })
        }),
    );

    let outcome = evaluator
        .submit_code(ROOM, "user_a", "solution()", "rust")
        .await
        .unwrap();
    assert!(!outcome.success);
    assert!(!outcome.newly_finished);
    assert_eq!(outcome.results.len(), 2);
    assert!(outcome.results[0].passed);
    assert!(!outcome.results[1].passed);
    assert_eq!(outcome.results[1].expected, "6");
    assert_eq!(outcome.results[1].actual, "-42");

    let match_record = store.stored_match(ROOM).unwrap();
    assert_eq!(match_record.status, MatchStatus::Playing);
}

#[tokio::test]
async fn runtime_errors_short_circuit_the_submission() {
    let store = MemoryStore::new();
    seed_playing_match(&store, "user_a", "user_b").await;
    let evaluator = SubmissionEvaluator::new(
        store.clone(),
        FnExecutor(|_: &str, _: &str, input: &str| {
            if input == "1 2" {
                Ok(Execution::Completed {
                    stdout: "3".to_string(),
                })
            } else {
                Ok(Execution::RuntimeError {
                    error: "stack overflow".to_string(),
                })
            }
        }),
    );

    let outcome = evaluator
        .submit_code(ROOM, "user_a", "solution()", "rust")
        .await
        .unwrap();
    assert!(!outcome.success);
    assert!(outcome.results.is_empty());
    assert_eq!(outcome.runtime_error.as_deref(), Some("stack overflow"));

    let match_record = store.stored_match(ROOM).unwrap();
    assert_eq!(match_record.status, MatchStatus::Playing);
}

#[tokio::test]
async fn guest_players_are_skipped_in_stat_updates() {
    let store = MemoryStore::new();
    seed_playing_match(&store, "guest", "user_b").await;
    store.seed_user(sample_user("user_b", 0));
    let evaluator = SubmissionEvaluator::new(store.clone(), solving_executor());

    let outcome = evaluator
        .submit_code(ROOM, "user_b", "solution()", "rust")
        .await
        .unwrap();
    assert!(outcome.newly_finished);

    assert!(store.stored_user("guest").is_none());
    let user_b = store.stored_user("user_b").unwrap();
    assert_eq!(user_b.wins, 1);
    assert_eq!(user_b.matches_played, 1);
}
