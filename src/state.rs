use std::sync::{Arc, Mutex};

use crate::config::Config;
use crate::db::Database;

/// Shared handle passed into every command and service. Replaces the
/// assorted process-global API clients of the previous setup with one
/// explicit dependency-injected context.
pub struct AppState {
    pub db: Arc<Mutex<Database>>,
    pub config: Config,
    pub http: reqwest::Client,
}

impl AppState {
    pub fn new(db: Database, config: Config) -> Self {
        AppState {
            db: Arc::new(Mutex::new(db)),
            config,
            http: reqwest::Client::new(),
        }
    }
}
