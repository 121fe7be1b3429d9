use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::{fmt, sync::Arc};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct ChatConnection {
    pub id: Uuid,
    pub connected_at: DateTime<Utc>,
    /// Root scope of the connection; cancelling it ends every exchange.
    pub scope: CancellationToken,
}

/// Live chat connections, used for health reporting and shutdown.
#[derive(Clone, Default)]
pub struct ChatConnections {
    connections: Arc<DashMap<Uuid, ChatConnection>>,
}

impl fmt::Debug for ChatConnections {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatConnections")
            .field("connection_count", &self.connections.len())
            .finish()
    }
}

impl ChatConnections {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new connection and return its record.
    pub fn open(&self) -> ChatConnection {
        let connection = ChatConnection {
            id: Uuid::now_v7(),
            connected_at: Utc::now(),
            scope: CancellationToken::new(),
        };
        self.connections.insert(connection.id, connection.clone());
        connection
    }

    /// Cancel and forget a connection. Returns how long it was open.
    pub fn close(&self, id: &Uuid) -> Option<chrono::Duration> {
        let (_, connection) = self.connections.remove(id)?;
        connection.scope.cancel();
        Some(Utc::now() - connection.connected_at)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Cancel every live connection.
    pub fn close_all(&self) {
        for entry in self.connections.iter() {
            entry.value().scope.cancel();
        }
        self.connections.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn close_cancels_connection_scope() {
        let connections = ChatConnections::new();
        let a = connections.open();
        let b = connections.open();
        assert_eq!(connections.len(), 2);

        let open_for = connections.close(&a.id).unwrap();
        assert!(open_for >= chrono::Duration::zero());
        assert!(connections.close(&a.id).is_none());
        assert!(a.scope.is_cancelled());
        assert!(!b.scope.is_cancelled());

        connections.close_all();
        assert!(b.scope.is_cancelled());
        assert!(connections.is_empty());
    }
}
