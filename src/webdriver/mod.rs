//! Minimal W3C WebDriver client over blocking HTTP.
//!
//! Only the commands the catalog provider needs are covered: sessions,
//! navigation, element lookup and state, clicks, pointer/key actions and
//! cookies. Talks to any W3C driver (geckodriver, chromedriver,
//! safaridriver) or a Selenium grid.

pub mod provider;
pub mod session;

use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use reqwest::Method;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde_json::{Value, json};

use crate::domain::Browser;
use crate::error::SyncError;

pub use provider::{StagedTransfer, WebDriverProvider};
pub use session::{SessionSnapshot, StoredCookie};

const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";
const KEY_ESCAPE: &str = "\u{E00C}";
const POLL_INTERVAL: Duration = Duration::from_millis(100);
const COMMAND_TIMEOUT: Duration = Duration::from_secs(120);

/// Reference to an element in the remote document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebElement(String);

impl WebElement {
    pub fn id(&self) -> &str {
        &self.0
    }

    fn reference(&self) -> Value {
        json!({ ELEMENT_KEY: self.0 })
    }

    fn from_value(value: &Value) -> Option<Self> {
        value
            .get(ELEMENT_KEY)
            .and_then(Value::as_str)
            .map(|id| Self(id.to_string()))
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Locator<'a> {
    Css(&'a str),
    XPath(&'a str),
}

impl Locator<'_> {
    fn to_json(self) -> Value {
        match self {
            Locator::Css(selector) => json!({ "using": "css selector", "value": selector }),
            Locator::XPath(path) => json!({ "using": "xpath", "value": path }),
        }
    }

    fn describe(self) -> String {
        match self {
            Locator::Css(selector) => format!("css `{selector}`"),
            Locator::XPath(path) => format!("xpath `{path}`"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionSettings<'a> {
    pub browser: Browser,
    pub headless: bool,
    /// Absolute directory the browser saves downloads into.
    pub download_dir: Option<&'a Path>,
}

pub struct WebDriverClient {
    client: Client,
    base_url: String,
    session_id: Option<String>,
}

impl WebDriverClient {
    /// Starts a new browser session on the driver at `webdriver_url`.
    pub fn connect(webdriver_url: &str, settings: &SessionSettings<'_>) -> Result<Self, SyncError> {
        let mut driver = Self {
            client: http_client(COMMAND_TIMEOUT)?,
            base_url: webdriver_url.trim_end_matches('/').to_string(),
            session_id: None,
        };
        let url = format!("{}/session", driver.base_url);
        let value = driver.send(Method::POST, &url, Some(capabilities(settings)))?;
        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| SyncError::WebDriverHttp("new session response lacks sessionId".to_string()))?
            .to_string();
        tracing::debug!("started {} session {session_id}", settings.browser);
        driver.session_id = Some(session_id);
        Ok(driver)
    }

    pub fn navigate(&self, url: &str) -> Result<(), SyncError> {
        self.command(Method::POST, "url", Some(json!({ "url": url })))?;
        Ok(())
    }

    pub fn find_elements(&self, locator: Locator<'_>) -> Result<Vec<WebElement>, SyncError> {
        let value = self.command(Method::POST, "elements", Some(locator.to_json()))?;
        Ok(elements_from(&value))
    }

    pub fn find_elements_in(
        &self,
        parent: &WebElement,
        locator: Locator<'_>,
    ) -> Result<Vec<WebElement>, SyncError> {
        let path = format!("element/{}/elements", parent.id());
        let value = self.command(Method::POST, &path, Some(locator.to_json()))?;
        Ok(elements_from(&value))
    }

    pub fn attribute(&self, element: &WebElement, name: &str) -> Result<Option<String>, SyncError> {
        let path = format!("element/{}/attribute/{name}", element.id());
        let value = self.command(Method::GET, &path, None)?;
        Ok(value.as_str().map(str::to_string))
    }

    pub fn property(&self, element: &WebElement, name: &str) -> Result<Option<String>, SyncError> {
        let path = format!("element/{}/property/{name}", element.id());
        let value = self.command(Method::GET, &path, None)?;
        Ok(value.as_str().map(str::to_string))
    }

    pub fn text(&self, element: &WebElement) -> Result<String, SyncError> {
        let path = format!("element/{}/text", element.id());
        let value = self.command(Method::GET, &path, None)?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    pub fn is_displayed(&self, element: &WebElement) -> Result<bool, SyncError> {
        let path = format!("element/{}/displayed", element.id());
        Ok(self.command(Method::GET, &path, None)?.as_bool().unwrap_or(false))
    }

    pub fn is_enabled(&self, element: &WebElement) -> Result<bool, SyncError> {
        let path = format!("element/{}/enabled", element.id());
        Ok(self.command(Method::GET, &path, None)?.as_bool().unwrap_or(false))
    }

    pub fn click(&self, element: &WebElement) -> Result<(), SyncError> {
        let path = format!("element/{}/click", element.id());
        self.command(Method::POST, &path, Some(json!({})))?;
        Ok(())
    }

    pub fn context_click(&self, element: &WebElement) -> Result<(), SyncError> {
        self.pointer_actions(json!([
            { "type": "pointerMove", "origin": element.reference(), "x": 0, "y": 0 },
            { "type": "pointerDown", "button": 2 },
            { "type": "pointerUp", "button": 2 }
        ]))
    }

    pub fn hover(&self, element: &WebElement) -> Result<(), SyncError> {
        self.pointer_actions(json!([
            { "type": "pointerMove", "origin": element.reference(), "x": 0, "y": 0 }
        ]))
    }

    pub fn press_escape(&self) -> Result<(), SyncError> {
        let actions = json!({
            "actions": [{
                "type": "key",
                "id": "keyboard",
                "actions": [
                    { "type": "keyDown", "value": KEY_ESCAPE },
                    { "type": "keyUp", "value": KEY_ESCAPE }
                ]
            }]
        });
        self.command(Method::POST, "actions", Some(actions))?;
        Ok(())
    }

    /// Polls until an element matching `locator` exists (and is displayed
    /// when `visible`), or fails with `AffordanceTimeout`.
    pub fn wait_for(
        &self,
        locator: Locator<'_>,
        timeout: Duration,
        visible: bool,
    ) -> Result<WebElement, SyncError> {
        let deadline = Instant::now() + timeout;
        loop {
            for element in self.find_elements(locator)? {
                if !visible || self.is_displayed(&element).unwrap_or(false) {
                    return Ok(element);
                }
            }
            if Instant::now() >= deadline {
                return Err(SyncError::AffordanceTimeout(format!(
                    "{} after {} ms",
                    locator.describe(),
                    timeout.as_millis()
                )));
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    /// Polls until no displayed element matches `locator`. Returns whether
    /// that happened before `timeout`.
    pub fn wait_until_hidden(&self, locator: Locator<'_>, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            let visible = self
                .find_elements(locator)
                .map(|elements| {
                    elements
                        .iter()
                        .any(|element| self.is_displayed(element).unwrap_or(false))
                })
                .unwrap_or(false);
            if !visible {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    pub fn cookies(&self) -> Result<Vec<Value>, SyncError> {
        let value = self.command(Method::GET, "cookie", None)?;
        Ok(value.as_array().cloned().unwrap_or_default())
    }

    pub fn add_cookie(&self, cookie: Value) -> Result<(), SyncError> {
        self.command(Method::POST, "cookie", Some(json!({ "cookie": cookie })))?;
        Ok(())
    }

    /// Ends the browser session. Safe to call more than once.
    pub fn quit(&mut self) -> Result<(), SyncError> {
        let Some(session_id) = self.session_id.take() else {
            return Ok(());
        };
        let url = format!("{}/session/{session_id}", self.base_url);
        self.send(Method::DELETE, &url, None)?;
        Ok(())
    }

    fn pointer_actions(&self, steps: Value) -> Result<(), SyncError> {
        let actions = json!({
            "actions": [{
                "type": "pointer",
                "id": "mouse",
                "parameters": { "pointerType": "mouse" },
                "actions": steps
            }]
        });
        self.command(Method::POST, "actions", Some(actions))?;
        self.command(Method::DELETE, "actions", None)?;
        Ok(())
    }

    fn command(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value, SyncError> {
        let session_id = self
            .session_id
            .as_deref()
            .ok_or_else(|| SyncError::WebDriverHttp("session already closed".to_string()))?;
        let url = format!("{}/session/{session_id}/{path}", self.base_url);
        self.send(method, &url, body)
    }

    fn send(&self, method: Method, url: &str, body: Option<Value>) -> Result<Value, SyncError> {
        let mut request = self.client.request(method, url);
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request.send().map_err(request_error)?;
        let status = response.status().as_u16();
        let payload: Value = response.json().map_err(request_error)?;
        let value = payload.get("value").cloned().unwrap_or(Value::Null);
        if !(200..300).contains(&status) {
            return Err(status_error(status, &value));
        }
        Ok(value)
    }
}

impl Drop for WebDriverClient {
    fn drop(&mut self) {
        if let Err(err) = self.quit() {
            tracing::debug!("failed to close WebDriver session: {err}");
        }
    }
}

/// New-session payload for the selected engine.
pub fn capabilities(settings: &SessionSettings<'_>) -> Value {
    let download_dir = settings
        .download_dir
        .map(|dir| dir.to_string_lossy().into_owned());
    let always_match = match settings.browser {
        Browser::Firefox => {
            let mut args = Vec::new();
            if settings.headless {
                args.push("-headless");
            }
            let mut prefs = json!({});
            if let Some(dir) = &download_dir {
                prefs = json!({
                    "browser.download.folderList": 2,
                    "browser.download.dir": dir,
                    "browser.download.useDownloadDir": true,
                    "browser.download.manager.showWhenStarting": false,
                    "browser.helperApps.neverAsk.saveToDisk":
                        "audio/mpeg,audio/wav,audio/x-wav,audio/wave,video/mp4,application/octet-stream"
                });
            }
            json!({
                "browserName": "firefox",
                "moz:firefoxOptions": { "args": args, "prefs": prefs }
            })
        }
        Browser::Chromium => {
            let mut args = Vec::new();
            if settings.headless {
                args.push("--headless=new");
            }
            let mut prefs = json!({});
            if let Some(dir) = &download_dir {
                prefs = json!({
                    "download.default_directory": dir,
                    "download.prompt_for_download": false,
                    "download.directory_upgrade": true
                });
            }
            json!({
                "browserName": "chrome",
                "goog:chromeOptions": { "args": args, "prefs": prefs }
            })
        }
        Browser::Webkit => json!({ "browserName": "safari" }),
    };
    json!({ "capabilities": { "alwaysMatch": always_match } })
}

fn http_client(timeout: Duration) -> Result<Client, SyncError> {
    let mut headers = HeaderMap::new();
    headers.insert(
        USER_AGENT,
        HeaderValue::from_str(&format!("suno-sync/{}", env!("CARGO_PKG_VERSION")))
            .map_err(|err| SyncError::WebDriverHttp(err.to_string()))?,
    );
    Client::builder()
        .default_headers(headers)
        .timeout(timeout)
        .build()
        .map_err(|err| SyncError::WebDriverHttp(err.to_string()))
}

/// A command that outlived the client timeout only costs the current item;
/// anything else means the driver is unreachable.
fn request_error(err: reqwest::Error) -> SyncError {
    if err.is_timeout() {
        SyncError::WebDriverTimeout(err.to_string())
    } else {
        SyncError::WebDriverHttp(err.to_string())
    }
}

fn elements_from(value: &Value) -> Vec<WebElement> {
    value
        .as_array()
        .map(|items| items.iter().filter_map(WebElement::from_value).collect())
        .unwrap_or_default()
}

fn status_error(status: u16, value: &Value) -> SyncError {
    let field = |name: &str| {
        value
            .get(name)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };
    SyncError::WebDriverStatus {
        status,
        error: field("error"),
        message: field("message"),
    }
}
