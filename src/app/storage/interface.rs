pub mod match_store;
pub mod session;
pub mod user_store;

pub trait StorageInterface:
    match_store::MatchInterface + user_store::UserInterface + session::SessionInterface
{
}
