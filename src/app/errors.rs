use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("The requested resource was not found")]
    NotFound,
    #[error("Failed to parse value")]
    ParsingFailure,
    #[error("Unknown database error")]
    Others(#[from] fred::error::RedisError),
}

impl DbError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, DbError::NotFound)
    }
}

/// Client-safe error taxonomy. Every failure is scoped to one request or one
/// room, nothing here is fatal to the process.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Room is full!")]
    RoomFull,
    #[error("Room {room_id} was not found")]
    RoomNotFound { room_id: String },
    #[error("Game session not found for room {room_id}")]
    MatchNotFound { room_id: String },
    #[error("No test cases found for room {room_id}")]
    NoTestCases { room_id: String },
    #[error("User {user_id} was not found")]
    UserNotFound { user_id: String },
    #[error("{message}")]
    BadRequest { message: String },
    #[error("Execution failed")]
    ExecutionFailed,
    #[error("Internal server error")]
    InternalServerError,
}

pub trait ResultExtApp<T> {
    /// Map a not-found storage error to the given api error; anything else
    /// becomes an internal server error.
    fn to_not_found(self, error: ApiError) -> Result<T, ApiError>;
    fn to_internal_api_error(self) -> Result<T, ApiError>;
}

impl<T> ResultExtApp<T> for Result<T, DbError> {
    fn to_not_found(self, error: ApiError) -> Result<T, ApiError> {
        self.map_err(|db_error| {
            if db_error.is_not_found() {
                error
            } else {
                tracing::error!(?db_error);
                ApiError::InternalServerError
            }
        })
    }

    fn to_internal_api_error(self) -> Result<T, ApiError> {
        self.map_err(|db_error| {
            tracing::error!(?db_error);
            ApiError::InternalServerError
        })
    }
}
