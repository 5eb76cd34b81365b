use fred::{
    interfaces::{ClientLike, KeysInterface, ListInterface, LuaInterface, SetsInterface},
    types::SetOptions,
};

use crate::app::{errors, types::RedisConfig};

#[derive(Clone)]
pub struct RedisClient {
    client: fred::clients::RedisClient,
}

impl RedisClient {
    pub fn new(inner_client: fred::clients::RedisClient) -> Self {
        Self {
            client: inner_client,
        }
    }
}

type DbResult<T> = Result<T, errors::DbError>;

/// Admission guard, evaluated server-side so the capacity check and the slot
/// write cannot interleave with another joiner.
///
/// KEYS[1] match document, KEYS[2] admission slots, KEYS[3] active-room index.
/// ARGV[1] joiner id, ARGV[2] serialized fresh match, ARGV[3] room id.
const ADMIT_PLAYER_SCRIPT: &str = r#"
if redis.call('SETNX', KEYS[1], ARGV[2]) == 1 then
    redis.call('SADD', KEYS[3], ARGV[3])
end
if redis.call('LLEN', KEYS[2]) >= 2 then
    return 0
end
redis.call('RPUSH', KEYS[2], ARGV[1])
return 1
"#;

/// Pre-game record write, refused once the finish token exists so a stale
/// snapshot can never overwrite a concluded match.
///
/// KEYS[1] match document, KEYS[2] finish token, KEYS[3] active-room index.
/// ARGV[1] serialized match, ARGV[2] room id.
const RECORD_GAME_SCRIPT: &str = r#"
if redis.call('EXISTS', KEYS[2]) == 1 then
    return 0
end
redis.call('SET', KEYS[1], ARGV[1])
redis.call('SADD', KEYS[3], ARGV[2])
return 1
"#;

impl RedisClient {
    pub async fn get_and_deserialize<
        K: Into<fred::types::RedisKey> + Send,
        V: serde::de::DeserializeOwned,
    >(
        &self,
        key: K,
    ) -> DbResult<V> {
        let get_command_result = self.client.get::<Option<String>, _>(key).await;

        match get_command_result {
            Ok(value_string_optional) => match value_string_optional {
                Some(value_string) => match serde_json::from_str::<V>(&value_string) {
                    Ok(value) => Ok(value),
                    Err(deserialize_error) => {
                        log::error!("{deserialize_error:?}");
                        Err(errors::DbError::ParsingFailure)
                    }
                },
                None => Err(errors::DbError::NotFound),
            },
            Err(error) => Err(errors::DbError::Others(error)),
        }
    }

    pub async fn serialize_and_set<
        K: Into<fred::types::RedisKey> + Send,
        V: serde::Serialize + serde::de::DeserializeOwned,
    >(
        &self,
        key: K,
        value: V,
    ) -> DbResult<V> {
        let serialized_value = serde_json::to_string(&value);

        match serialized_value {
            Ok(serialized_value) => {
                match self
                    .client
                    .set::<String, _, _>(key, serialized_value, None, None, false)
                    .await
                {
                    Ok(_) => Ok(value),
                    Err(error) => Err(errors::DbError::Others(error)),
                }
            }
            Err(serialization_error) => {
                log::error!("serialization_error {serialization_error:?}");
                Err(errors::DbError::ParsingFailure)
            }
        }
    }

    /// Run the admission script. Returns whether the joiner took a slot.
    pub async fn admit_player(
        &self,
        match_key: &str,
        slots_key: &str,
        active_key: &str,
        player_id: &str,
        fresh_match_json: String,
        room_id: &str,
    ) -> DbResult<bool> {
        let admitted: i64 = self
            .client
            .eval(
                ADMIT_PLAYER_SCRIPT,
                vec![
                    match_key.to_string(),
                    slots_key.to_string(),
                    active_key.to_string(),
                ],
                vec![
                    player_id.to_string(),
                    fresh_match_json,
                    room_id.to_string(),
                ],
            )
            .await?;
        Ok(admitted == 1)
    }

    /// Write a match document unless the finish token already exists.
    /// Returns whether the write happened.
    pub async fn record_game(
        &self,
        match_key: &str,
        finish_key: &str,
        active_key: &str,
        match_json: String,
        room_id: &str,
    ) -> DbResult<bool> {
        let written: i64 = self
            .client
            .eval(
                RECORD_GAME_SCRIPT,
                vec![
                    match_key.to_string(),
                    finish_key.to_string(),
                    active_key.to_string(),
                ],
                vec![match_json, room_id.to_string()],
            )
            .await?;
        Ok(written == 1)
    }

    /// SET NX GET: returns true iff this caller claimed the key.
    pub async fn set_if_absent(&self, key: &str, value: &str) -> DbResult<bool> {
        let previous: Option<String> = self
            .client
            .set(key, value.to_string(), None, Some(SetOptions::NX), true)
            .await?;
        Ok(previous.is_none())
    }

    pub async fn list_push(&self, key: &str, value: &str) -> DbResult<()> {
        let _: i64 = self.client.lpush(key, vec![value.to_string()]).await?;
        Ok(())
    }

    pub async fn list_range(&self, key: &str, start: i64, stop: i64) -> DbResult<Vec<String>> {
        Ok(self.client.lrange(key, start, stop).await?)
    }

    /// Remove the first occurrence of the value from the list.
    pub async fn list_remove(&self, key: &str, value: &str) -> DbResult<()> {
        let _: i64 = self.client.lrem(key, 1, value.to_string()).await?;
        Ok(())
    }

    pub async fn set_add(&self, key: &str, member: &str) -> DbResult<()> {
        let _: i64 = self.client.sadd(key, vec![member.to_string()]).await?;
        Ok(())
    }

    pub async fn set_remove(&self, key: &str, member: &str) -> DbResult<()> {
        let _: i64 = self.client.srem(key, vec![member.to_string()]).await?;
        Ok(())
    }

    pub async fn set_members(&self, key: &str) -> DbResult<Vec<String>> {
        Ok(self.client.smembers(key).await?)
    }
}

pub async fn create_redis_client(
    redis_config: RedisConfig,
) -> Result<RedisClient, fred::error::RedisError> {
    let config = fred::types::RedisConfig {
        server: fred::types::ServerConfig::Centralized {
            server: fred::types::Server {
                host: redis_config.host.into(),
                port: redis_config.port,
            },
        },
        username: redis_config.username,
        password: redis_config.password,
        ..fred::types::RedisConfig::default()
    };

    let client = fred::clients::RedisClient::new(config, None, None, None);

    // connect to the server, returning a handle to a task that drives the connection
    client.connect();

    // wait for the client to connect
    let _ = client.wait_for_connect().await;

    Ok(RedisClient::new(client))
}
