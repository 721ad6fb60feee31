pub mod filter;
pub mod schema;

use duckdb::Connection;
use parking_lot::Mutex;
use std::sync::Arc;

/// Shared application state: one process-wide DuckDB connection.
///
/// Handlers take the lock inside a blocking task and the guard drops on every
/// exit path, so the connection is always released even when a query errors.
pub struct AppState {
    conn: Arc<Mutex<Connection>>,
}

impl AppState {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    pub fn conn(&self) -> &Arc<Mutex<Connection>> {
        &self.conn
    }
}
