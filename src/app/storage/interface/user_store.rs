use std::future::Future;

use crate::app::storage::{models, StorageResult, Store};

fn user_key(user_id: &str) -> String {
    format!("user:{user_id}")
}

pub trait UserInterface {
    fn insert_user(
        &self,
        user: models::User,
    ) -> impl Future<Output = StorageResult<models::User>> + Send;

    fn find_user(&self, user_id: &str) -> impl Future<Output = StorageResult<models::User>> + Send;
}

impl UserInterface for Store {
    async fn insert_user(&self, user: models::User) -> StorageResult<models::User> {
        let key = user_key(&user.user_id);
        self.redis_client.serialize_and_set(key, user).await
    }

    async fn find_user(&self, user_id: &str) -> StorageResult<models::User> {
        self.redis_client.get_and_deserialize(user_key(user_id)).await
    }
}
