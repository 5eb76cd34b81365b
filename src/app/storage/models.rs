use std::collections::HashMap;

use crate::app::{types, utils};

#[derive(serde::Deserialize, serde::Serialize, Clone, Debug, PartialEq, Eq)]
pub struct TestCase {
    pub input: String,
    pub expected_output: String,
}

/// A coding problem with its hidden test cases. Cached on the room once
/// resolved; the test cases are additionally persisted on the match, which is
/// the authoritative copy for submissions.
#[derive(serde::Deserialize, serde::Serialize, Clone, Debug)]
pub struct Problem {
    pub problem_id: String,
    pub title: String,
    pub description: String,
    pub starter_code: HashMap<String, String>,
    pub test_cases: Vec<TestCase>,
}

#[derive(serde::Deserialize, serde::Serialize, Copy, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MatchStatus {
    Waiting,
    Playing,
    Finished,
    Aborted,
}

/// Persistent record of a room. Created on room creation or first admitted
/// join, survives process restarts, never deleted.
#[derive(serde::Deserialize, serde::Serialize, Clone, Debug)]
pub struct Match {
    pub room_id: String,
    pub player1: Option<String>,
    pub player2: Option<String>,
    #[serde(default = "default_username")]
    pub player1_username: String,
    #[serde(default = "default_username")]
    pub player2_username: String,
    pub winner: Option<String>,
    pub problem_id: Option<String>,
    #[serde(default)]
    pub test_cases: Vec<TestCase>,
    pub status: MatchStatus,
    pub start_time: Option<u64>,
    pub end_time: Option<u64>,
    /// Persisted timer deadlines so a restarted process can re-arm the
    /// pending transitions.
    pub countdown_deadline: Option<u64>,
    pub game_end_deadline: Option<u64>,
    pub created_at: u64,
}

fn default_username() -> String {
    types::GUEST_USERNAME.to_string()
}

impl Match {
    pub fn new(room_id: String, player1: Option<String>) -> Self {
        Self {
            room_id,
            player1,
            player2: None,
            player1_username: default_username(),
            player2_username: default_username(),
            winner: None,
            problem_id: None,
            test_cases: Vec::new(),
            status: MatchStatus::Waiting,
            start_time: None,
            end_time: None,
            countdown_deadline: None,
            game_end_deadline: None,
            created_at: utils::now_millis(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.status, MatchStatus::Finished | MatchStatus::Aborted)
    }
}

/// Skill tier derived purely from the cumulative win count.
#[derive(serde::Deserialize, serde::Serialize, Copy, Clone, Debug, PartialEq, Eq)]
pub enum Rank {
    Novice,
    Apprentice,
    Coder,
    Hacker,
    Grandmaster,
}

impl Rank {
    /// Thresholds are evaluated highest-first and are monotonic on wins.
    pub fn from_wins(wins: u32) -> Self {
        if wins >= 50 {
            Rank::Grandmaster
        } else if wins >= 25 {
            Rank::Hacker
        } else if wins >= 10 {
            Rank::Coder
        } else if wins >= 3 {
            Rank::Apprentice
        } else {
            Rank::Novice
        }
    }
}

#[derive(serde::Deserialize, serde::Serialize, Clone, Debug)]
pub struct User {
    pub user_id: String,
    pub username: String,
    pub email: String,
    pub password: String,
    pub age: Option<u32>,
    pub college: Option<String>,
    pub address: Option<String>,
    pub bio: String,
    pub rank: Rank,
    pub wins: u32,
    pub matches_played: u32,
    pub created_at: u64,
}

impl User {
    pub fn new(username: String, email: String, password: String) -> Self {
        Self {
            user_id: utils::generate_time_ordered_id("user"),
            username,
            email,
            password,
            age: None,
            college: None,
            address: None,
            bio: "Coding enthusiast ready to battle!".to_string(),
            rank: Rank::Novice,
            wins: 0,
            matches_played: 0,
            created_at: utils::now_millis(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rank_thresholds() {
        assert_eq!(Rank::from_wins(0), Rank::Novice);
        assert_eq!(Rank::from_wins(2), Rank::Novice);
        assert_eq!(Rank::from_wins(3), Rank::Apprentice);
        assert_eq!(Rank::from_wins(9), Rank::Apprentice);
        assert_eq!(Rank::from_wins(10), Rank::Coder);
        assert_eq!(Rank::from_wins(25), Rank::Hacker);
        assert_eq!(Rank::from_wins(49), Rank::Hacker);
        assert_eq!(Rank::from_wins(50), Rank::Grandmaster);
    }

    #[test]
    fn match_status_serializes_lowercase() {
        let match_record = Match::new("AB12CD".to_string(), Some("user_1".to_string()));
        let serialized = serde_json::to_value(&match_record).unwrap();
        assert_eq!(serialized["status"], "waiting");
        assert_eq!(serialized["player1_username"], "Guest");
    }
}
