use std::future::Future;

use crate::app::{
    errors::DbError,
    storage::{StorageResult, Store},
    types::RoomEvent,
};

pub type SessionChannel = tokio::sync::mpsc::Sender<RoomEvent>;

/// Event channels of the currently attached connections.
///
/// Channels can be inserted and removed for the same connection across
/// reconnects; delivery to a closed channel is not an error, the connection
/// is simply gone.
pub trait SessionInterface {
    fn insert_channel(&self, connection_id: &str, channel: SessionChannel) -> StorageResult<()>;
    fn remove_channel(&self, connection_id: &str) -> StorageResult<()>;
    fn send_event(
        &self,
        connection_id: &str,
        event: RoomEvent,
    ) -> impl Future<Output = StorageResult<()>> + Send;
}

impl SessionInterface for Store {
    fn insert_channel(&self, connection_id: &str, channel: SessionChannel) -> StorageResult<()> {
        let mut connections = self.session_state.lock().unwrap();
        connections.insert(connection_id.to_string(), channel);
        Ok(())
    }

    fn remove_channel(&self, connection_id: &str) -> StorageResult<()> {
        let mut connections = self.session_state.lock().unwrap();
        connections.remove(connection_id);
        Ok(())
    }

    fn send_event(
        &self,
        connection_id: &str,
        event: RoomEvent,
    ) -> impl Future<Output = StorageResult<()>> + Send {
        let channel = {
            let connections = self.session_state.lock().unwrap();
            connections.get(connection_id).cloned()
        };

        async move {
            let channel = channel.ok_or(DbError::NotFound)?;
            if channel.send(event).await.is_err() {
                log::debug!("dropping event, connection channel closed");
            }
            Ok(())
        }
    }
}
