use std::fs;

use camino::Utf8Path;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::error::SyncError;
use crate::fs_util;
use crate::webdriver::WebDriverClient;

/// Saved login state. Same layout as a browser-automation `storageState`
/// document, so snapshots from either tool are interchangeable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    #[serde(default)]
    pub cookies: Vec<StoredCookie>,
    #[serde(default)]
    pub origins: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredCookie {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default = "root_path")]
    pub path: String,
    /// Unix seconds; `-1` for a session cookie.
    #[serde(default = "session_expiry")]
    pub expires: f64,
    #[serde(default)]
    pub http_only: bool,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub same_site: Option<String>,
}

fn root_path() -> String {
    "/".to_string()
}

fn session_expiry() -> f64 {
    -1.0
}

impl StoredCookie {
    pub fn to_webdriver(&self) -> Value {
        let mut cookie = Map::new();
        cookie.insert("name".to_string(), json!(self.name));
        cookie.insert("value".to_string(), json!(self.value));
        cookie.insert("path".to_string(), json!(self.path));
        if !self.domain.is_empty() {
            cookie.insert("domain".to_string(), json!(self.domain));
        }
        cookie.insert("secure".to_string(), json!(self.secure));
        cookie.insert("httpOnly".to_string(), json!(self.http_only));
        if self.expires > 0.0 {
            cookie.insert("expiry".to_string(), json!(self.expires as u64));
        }
        if let Some(same_site) = &self.same_site {
            cookie.insert("sameSite".to_string(), json!(same_site));
        }
        Value::Object(cookie)
    }

    pub fn from_webdriver(value: &Value) -> Option<Self> {
        let text = |name: &str| value.get(name).and_then(Value::as_str).map(str::to_string);
        let flag = |name: &str| value.get(name).and_then(Value::as_bool).unwrap_or(false);
        Some(Self {
            name: text("name")?,
            value: text("value")?,
            domain: text("domain").unwrap_or_default(),
            path: text("path").unwrap_or_else(root_path),
            expires: value
                .get("expiry")
                .and_then(Value::as_f64)
                .unwrap_or_else(session_expiry),
            http_only: flag("httpOnly"),
            secure: flag("secure"),
            same_site: text("sameSite"),
        })
    }
}

impl SessionSnapshot {
    pub fn load(path: &Utf8Path) -> Result<Self, SyncError> {
        if !path.as_std_path().exists() {
            return Err(SyncError::MissingSession(path.as_std_path().to_path_buf()));
        }
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|err| SyncError::SessionParse(format!("{path}: {err}")))?;
        serde_json::from_str(&content).map_err(|err| SyncError::SessionParse(err.to_string()))
    }

    pub fn save(&self, path: &Utf8Path) -> Result<(), SyncError> {
        let content = serde_json::to_vec_pretty(self)
            .map_err(|err| SyncError::SessionParse(err.to_string()))?;
        fs_util::write_atomic(path.as_std_path(), &content)
    }

    /// Reads the browser's current cookies.
    pub fn capture(client: &WebDriverClient) -> Result<Self, SyncError> {
        let cookies = client
            .cookies()?
            .iter()
            .filter_map(StoredCookie::from_webdriver)
            .collect();
        Ok(Self {
            cookies,
            origins: Vec::new(),
        })
    }

    /// Loads the cookies into the browser. The browser must already be on
    /// the cookies' site. Returns how many were accepted.
    pub fn restore(&self, client: &WebDriverClient) -> usize {
        let mut restored = 0;
        for cookie in &self.cookies {
            match client.add_cookie(cookie.to_webdriver()) {
                Ok(()) => restored += 1,
                Err(err) => tracing::debug!("cookie {} rejected: {err}", cookie.name),
            }
        }
        restored
    }
}
