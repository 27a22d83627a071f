use anyhow::{Context, Result, anyhow};
use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::{Value, json};
use sha2::{Digest, Sha256};

use crate::http_client::store_http_client;
use crate::store::{ChangeCursor, Collection, RemoteStore, WATCHED_COLLECTIONS};

/// Hosted tables behind a PostgREST endpoint (`<url>/rest/v1/<table>`).
pub struct RestStore {
    base_url: String,
    api_key: String,
    client: &'static Client,
}

#[derive(Debug, Deserialize)]
struct EntityRow {
    #[allow(dead_code)]
    id: String,
    data: Value,
}

#[derive(Debug, Deserialize)]
struct SettingRow {
    value: String,
}

impl RestStore {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self> {
        let base_url = base_url.trim().trim_end_matches('/').to_string();
        let api_key = api_key.trim().to_string();
        if base_url.is_empty() || api_key.is_empty() {
            return Err(anyhow!("store url and key are required"));
        }
        Ok(Self {
            base_url,
            api_key,
            client: store_http_client()?,
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn authed(&self, req: RequestBuilder) -> RequestBuilder {
        req.header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }

    fn send(&self, req: RequestBuilder, what: &str) -> Result<String> {
        let resp = self
            .authed(req)
            .send()
            .with_context(|| format!("{what}: request failed"))?;
        let status = resp.status();
        let body = resp
            .text()
            .with_context(|| format!("{what}: failed reading body"))?;
        if !status.is_success() {
            return Err(anyhow!("{what}: http {}: {}", status, body));
        }
        Ok(body)
    }

    fn fetch_raw(&self, collection: Collection) -> Result<String> {
        let req = self
            .client
            .get(self.table_url(collection.table()))
            .query(&[("select", "*")]);
        self.send(req, &format!("fetch {}", collection.table()))
    }
}

impl RemoteStore for RestStore {
    fn check(&self) -> Result<()> {
        let req = self
            .client
            .get(self.table_url("settings"))
            .query(&[("select", "key"), ("limit", "1")]);
        let resp = self
            .authed(req)
            .send()
            .context("store unreachable")?;
        check_status(resp.status())
    }

    fn fetch(&self, collection: Collection) -> Result<Vec<Value>> {
        if collection == Collection::Settings {
            return Err(anyhow!("settings are key/value, not entity rows"));
        }
        let body = self.fetch_raw(collection)?;
        let rows: Vec<EntityRow> = serde_json::from_str(&body)
            .with_context(|| format!("invalid {} rows", collection.table()))?;
        Ok(rows.into_iter().map(|row| row.data).collect())
    }

    fn upsert(&self, collection: Collection, id: &str, data: &Value) -> Result<()> {
        let req = self
            .client
            .post(self.table_url(collection.table()))
            .header("Prefer", "resolution=merge-duplicates")
            .json(&json!({ "id": id, "data": data }));
        self.send(req, &format!("upsert {} {id}", collection.table()))?;
        Ok(())
    }

    fn delete(&self, collection: Collection, id: &str) -> Result<()> {
        let req = self
            .client
            .delete(self.table_url(collection.table()))
            .query(&[("id", format!("eq.{id}"))]);
        self.send(req, &format!("delete {} {id}", collection.table()))?;
        Ok(())
    }

    fn fetch_setting(&self, key: &str) -> Result<Option<String>> {
        let req = self
            .client
            .get(self.table_url("settings"))
            .query(&[("select", "value".to_string()), ("key", format!("eq.{key}"))]);
        let body = self.send(req, &format!("read setting {key}"))?;
        let rows: Vec<SettingRow> =
            serde_json::from_str(&body).context("invalid settings rows")?;
        Ok(rows.into_iter().next().map(|row| row.value))
    }

    fn upsert_setting(&self, key: &str, value: &str) -> Result<()> {
        let req = self
            .client
            .post(self.table_url("settings"))
            .header("Prefer", "resolution=merge-duplicates")
            .json(&json!({ "key": key, "value": value }));
        self.send(req, &format!("write setting {key}"))?;
        Ok(())
    }

    // No push channel here; a table's marker is the hash of its full contents.
    fn poll_changes(&self, cursor: &mut ChangeCursor) -> Result<Vec<Collection>> {
        let first_poll = cursor.markers.is_empty();
        let mut changed = Vec::new();
        for collection in WATCHED_COLLECTIONS {
            let body = self.fetch_raw(collection)?;
            let marker = fingerprint(&body);
            let previous = cursor.markers.insert(collection, marker.clone());
            if !first_poll && previous.as_deref() != Some(marker.as_str()) {
                changed.push(collection);
            }
        }
        Ok(changed)
    }
}

// Only a success status on the settings table counts as configured.
fn check_status(status: StatusCode) -> Result<()> {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Err(anyhow!("store rejected the api key ({status})"))
        }
        StatusCode::NOT_FOUND => Err(anyhow!("store tables are missing")),
        s if !s.is_success() => Err(anyhow!("store check failed: http {status}")),
        _ => Ok(()),
    }
}

pub fn fingerprint(body: &str) -> String {
    let digest = Sha256::digest(body.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}
