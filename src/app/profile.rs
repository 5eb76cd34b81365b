use crate::app::{
    errors::{ApiError, ResultExtApp},
    storage::{
        interface::{match_store::MatchInterface, user_store::UserInterface},
        models::{Match, Rank, User},
    },
};

/// Newest-first window of finished matches shown on a profile.
const MATCH_HISTORY_LIMIT: usize = 20;

/// Public view of a user; everything except the password.
#[derive(serde::Serialize, Clone, Debug)]
pub struct UserProfile {
    pub user_id: String,
    pub username: String,
    pub email: String,
    pub age: Option<u32>,
    pub college: Option<String>,
    pub address: Option<String>,
    pub bio: String,
    pub rank: Rank,
    pub wins: u32,
    pub matches_played: u32,
    pub created_at: u64,
}

impl From<User> for UserProfile {
    fn from(user: User) -> Self {
        Self {
            user_id: user.user_id,
            username: user.username,
            email: user.email,
            age: user.age,
            college: user.college,
            address: user.address,
            bio: user.bio,
            rank: user.rank,
            wins: user.wins,
            matches_played: user.matches_played,
            created_at: user.created_at,
        }
    }
}

#[derive(serde::Serialize, Clone, Debug)]
pub struct ProfileResponse {
    pub user: UserProfile,
    pub match_history: Vec<Match>,
}

#[derive(serde::Deserialize, Clone, Debug, Default)]
pub struct UpdateProfileRequest {
    pub username: Option<String>,
    pub age: Option<u32>,
    pub college: Option<String>,
    pub address: Option<String>,
    pub bio: Option<String>,
}

pub async fn get_user_profile<S>(store: &S, user_id: &str) -> Result<ProfileResponse, ApiError>
where
    S: UserInterface + MatchInterface,
{
    let user = store.find_user(user_id).await.to_not_found(ApiError::UserNotFound {
        user_id: user_id.to_string(),
    })?;
    let match_history = store
        .find_recent_finished(user_id, MATCH_HISTORY_LIMIT)
        .await
        .to_internal_api_error()?;

    Ok(ProfileResponse {
        user: UserProfile::from(user),
        match_history,
    })
}

/// Apply the provided fields only; absent fields keep their current value.
pub async fn update_user_profile<S>(
    store: &S,
    user_id: &str,
    request: UpdateProfileRequest,
) -> Result<UserProfile, ApiError>
where
    S: UserInterface,
{
    let mut user = store.find_user(user_id).await.to_not_found(ApiError::UserNotFound {
        user_id: user_id.to_string(),
    })?;

    if let Some(username) = request.username {
        if username.trim().is_empty() {
            return Err(ApiError::BadRequest {
                message: "Username cannot be empty".to_string(),
            });
        }
        user.username = username;
    }
    if let Some(age) = request.age {
        user.age = Some(age);
    }
    if let Some(college) = request.college {
        user.college = Some(college);
    }
    if let Some(address) = request.address {
        user.address = Some(address);
    }
    if let Some(bio) = request.bio {
        user.bio = bio;
    }

    let user = store.insert_user(user).await.to_internal_api_error()?;
    tracing::info!(%user_id, "updated user profile");
    Ok(UserProfile::from(user))
}
