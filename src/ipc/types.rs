use std::path::PathBuf;

use serde::Deserialize;

use crate::config::Config;
use crate::session::Session;
use crate::store::SqliteStore;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub config: Config,
    pub session: Session,
    pub workspace: Option<PathBuf>,
    pub store: Option<SqliteStore>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        AppState {
            config,
            session: Session::default(),
            workspace: None,
            store: None,
        }
    }
}
