use std::collections::HashMap;
use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

use crate::draft::ResultDraft;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    /// Open drafts of this session, keyed by draft id.
    pub drafts: HashMap<String, ResultDraft>,
    pub next_draft_seq: u64,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            workspace: None,
            db: None,
            drafts: HashMap::new(),
            next_draft_seq: 1,
        }
    }
}
