use std::time::Duration;

use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use reqwest::blocking::Client;

const STORE_TIMEOUT_SECS: u64 = 10;
// Text generation regularly takes longer than a table read.
const NARRATIVE_TIMEOUT_SECS: u64 = 60;
const USER_AGENT: &str = concat!("coach_portal/", env!("CARGO_PKG_VERSION"));

static STORE_CLIENT: OnceCell<Client> = OnceCell::new();
static NARRATIVE_CLIENT: OnceCell<Client> = OnceCell::new();

pub fn store_http_client() -> Result<&'static Client> {
    STORE_CLIENT.get_or_try_init(|| build_client(STORE_TIMEOUT_SECS))
}

pub fn narrative_http_client() -> Result<&'static Client> {
    NARRATIVE_CLIENT.get_or_try_init(|| build_client(NARRATIVE_TIMEOUT_SECS))
}

fn build_client(timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .user_agent(USER_AGENT)
        .build()
        .context("failed to build http client")
}
