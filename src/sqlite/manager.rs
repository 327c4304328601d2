use std::future::Future;

use bb8::ManageConnection;

use super::config::ConnectHook;

/// bb8 manager for `rusqlite` connections.
pub struct SqliteManager {
    path: String,
    on_connect: Option<ConnectHook>,
}

impl SqliteManager {
    #[must_use]
    pub fn new(path: String, on_connect: Option<ConnectHook>) -> Self {
        Self { path, on_connect }
    }
}

impl ManageConnection for SqliteManager {
    type Connection = rusqlite::Connection;
    type Error = rusqlite::Error;

    #[allow(clippy::manual_async_fn)]
    fn connect(&self) -> impl Future<Output = Result<Self::Connection, Self::Error>> + Send {
        async move {
            // Default open flags include SQLITE_OPEN_URI, so `file:...?cache=shared` works.
            let mut conn = rusqlite::Connection::open(&self.path)?;
            if let Some(hook) = &self.on_connect {
                hook.run(&mut conn)?;
            }
            tracing::trace!(path = %self.path, "opened sqlite connection");
            Ok(conn)
        }
    }

    #[allow(clippy::manual_async_fn)]
    fn is_valid(
        &self,
        conn: &mut Self::Connection,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send {
        async move { conn.query_row("SELECT 1", [], |_| Ok(())) }
    }

    fn has_broken(&self, _conn: &mut Self::Connection) -> bool {
        false
    }
}
