use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, anyhow};

use crate::narrative::GeminiClient;
use crate::rest_store::RestStore;
use crate::sqlite_store::SqliteStore;
use crate::store::RemoteStore;

const DATA_DIR: &str = "coach_portal";
const DB_FILE: &str = "portal.sqlite";
const DEFAULT_MODEL: &str = "gemini-2.5-flash";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    Rest { url: String, key: String },
    Sqlite { path: PathBuf },
}

#[derive(Debug, Clone)]
pub struct PortalConfig {
    pub store: Option<StoreBackend>,
    pub store_error: Option<String>,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub sync_poll: Duration,
}

impl PortalConfig {
    /// Reads settings from the environment. Call `dotenvy` first to pick up `.env` files.
    pub fn from_env() -> Self {
        let (store, store_error) = match store_from_env() {
            Ok(store) => (Some(store), None),
            Err(err) => (None, Some(format!("{err:#}"))),
        };
        let gemini_api_key = non_empty_env("GEMINI_API_KEY");
        let gemini_model = non_empty_env("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let sync_poll = Duration::from_secs(
            env::var("SYNC_POLL_SECS")
                .ok()
                .and_then(|val| val.parse::<u64>().ok())
                .unwrap_or(5)
                .max(2),
        );
        Self {
            store,
            store_error,
            gemini_api_key,
            gemini_model,
            sync_poll,
        }
    }

    /// Builds the configured store. An error here is a configuration failure, not missing data.
    pub fn open_store(&self) -> Result<Arc<dyn RemoteStore>> {
        match &self.store {
            Some(StoreBackend::Rest { url, key }) => Ok(Arc::new(RestStore::new(url, key)?)),
            Some(StoreBackend::Sqlite { path }) => Ok(Arc::new(SqliteStore::open(path)?)),
            None => Err(anyhow!(
                "{}",
                self.store_error
                    .clone()
                    .unwrap_or_else(|| "no store configured".to_string())
            )),
        }
    }

    pub fn narrative_client(&self) -> Option<GeminiClient> {
        self.gemini_api_key
            .as_deref()
            .map(|key| GeminiClient::new(key, &self.gemini_model))
    }
}

fn store_from_env() -> Result<StoreBackend> {
    let kind = env::var("PORTAL_STORE")
        .unwrap_or_else(|_| "rest".to_string())
        .to_lowercase();
    match kind.as_str() {
        "rest" | "supabase" => {
            let url = non_empty_env("SUPABASE_URL").ok_or_else(|| anyhow!("SUPABASE_URL is not set"))?;
            let key = non_empty_env("SUPABASE_ANON_KEY")
                .ok_or_else(|| anyhow!("SUPABASE_ANON_KEY is not set"))?;
            Ok(StoreBackend::Rest { url, key })
        }
        "sqlite" | "local" => {
            let path = non_empty_env("PORTAL_DB_PATH")
                .map(PathBuf::from)
                .or_else(default_db_path)
                .ok_or_else(|| anyhow!("no PORTAL_DB_PATH and no home directory"))?;
            Ok(StoreBackend::Sqlite { path })
        }
        other => Err(anyhow!("unknown PORTAL_STORE: {other}")),
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn default_db_path() -> Option<PathBuf> {
    if let Some(base) = non_empty_env("XDG_DATA_HOME") {
        return Some(PathBuf::from(base).join(DATA_DIR).join(DB_FILE));
    }
    let home = non_empty_env("HOME").or_else(|| non_empty_env("USERPROFILE"))?;
    Some(
        PathBuf::from(home)
            .join(".local")
            .join("share")
            .join(DATA_DIR)
            .join(DB_FILE),
    )
}
