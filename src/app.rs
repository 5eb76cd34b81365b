pub mod coordinator;
pub mod errors;
pub mod evaluator;
pub mod executor;
pub mod problem;
pub mod profile;
pub mod redis_client;
pub mod storage;
pub mod types;
pub mod utils;
