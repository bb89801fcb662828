//! Minimal W3C WebDriver client, enough to drive Firefox through geckodriver.

use std::{
    net::TcpListener,
    process::{Child, Command, Stdio},
    thread::sleep,
    time::{Duration, Instant},
};

use anyhow::{anyhow, bail, Context};
use log::{debug, info, warn};
use reqwest::{blocking::Client, Method};
use serde_json::{json, Value};
use url::Url;

use super::{
    js, parse_selected_option, Action, BrowserError, BrowserKind, BrowserSession, Key, Locator,
    SelectedOption,
};

/// Firefox does not bring an element into view before a synthetic pointer move.
const FIREFOX_REQUIRES_SCROLL_INTO_VIEW: bool = true;

const GECKODRIVER: &str = "geckodriver";
const DRIVER_STARTUP_TIMEOUT: Duration = Duration::from_secs(15);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Key of the element reference object in WebDriver payloads.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";
/// WebDriver code point for the Enter key.
const ENTER: &str = "\u{E007}";

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct WebElement {
    id: String,
    locator: Locator,
}
impl WebElement {
    fn reference(&self) -> Value {
        json!({ ELEMENT_KEY: self.id })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WebDriverError {
    #[error("{error}: {message}")]
    Remote { error: String, message: String },
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("Malformed response: {0}")]
    Malformed(Value),
}
impl WebDriverError {
    fn is_no_such_element(&self) -> bool {
        matches!(self, Self::Remote { error, .. } if error == "no such element")
    }
}

pub struct WebDriverSession {
    client: Client,
    /// `http://host:port/session/{id}/`
    session_url: Url,
    requires_scroll_into_view: bool,
    driver: Option<Child>,
    closed: bool,
}

impl WebDriverSession {
    /// Spawns geckodriver on a free local port and opens a Firefox session through it.
    pub fn launch_firefox() -> Result<Self, BrowserError> {
        let launch_error = |source| BrowserError::Launch {
            browser: BrowserKind::Firefox,
            source,
        };
        let port = free_port().map_err(launch_error)?;
        info!("Starting {GECKODRIVER} on port {port}");
        let driver = Command::new(GECKODRIVER)
            .arg("--port")
            .arg(port.to_string())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("Failed to run {GECKODRIVER}; is it installed and on PATH?"))
            .map_err(launch_error)?;
        let server = Url::parse(&format!("http://127.0.0.1:{port}/"))
            .context("Invalid driver URL")
            .map_err(launch_error)?;
        let capabilities = json!({
            "capabilities": { "alwaysMatch": { "browserName": "firefox" } }
        });
        Self::connect(
            server,
            capabilities,
            Some(driver),
            FIREFOX_REQUIRES_SCROLL_INTO_VIEW,
        )
        .map_err(launch_error)
    }

    /// Opens a session on an already running WebDriver server.
    ///
    /// `driver` is the server process, if this session owns it; it is killed on close.
    pub fn connect(
        server: Url,
        capabilities: Value,
        driver: Option<Child>,
        requires_scroll_into_view: bool,
    ) -> anyhow::Result<Self> {
        // From here on the driver is killed on drop, even if session creation fails.
        let mut session = Self {
            client: Client::builder().timeout(REQUEST_TIMEOUT).build()?,
            session_url: server.clone(),
            requires_scroll_into_view,
            driver,
            closed: true,
        };
        wait_for_ready(&session.client, &server)?;
        let response = send(
            &session.client,
            Method::POST,
            server.join("session")?,
            Some(capabilities),
        )?;
        let id = response
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| WebDriverError::Malformed(response.clone()))?;
        let browser_name = response
            .pointer("/capabilities/browserName")
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        info!("Started WebDriver session {id} ({browser_name})");
        session.session_url = server.join(&format!("session/{id}/"))?;
        session.closed = false;
        Ok(session)
    }

    fn command(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, WebDriverError> {
        let url = self
            .session_url
            .join(path)
            .map_err(|_| WebDriverError::Malformed(Value::String(path.to_owned())))?;
        send(&self.client, method, url, body)
    }

    fn element_command(
        &self,
        method: Method,
        element: &WebElement,
        path: &str,
        body: Option<Value>,
        context: &str,
    ) -> Result<Value, BrowserError> {
        self.command(method, &format!("element/{}/{path}", element.id), body)
            .map_err(|e| BrowserError::Command {
                context: format!("{context} {}", element.locator),
                source: e.into(),
            })
    }

    fn call(&self, element: &WebElement, function: &str) -> Result<Value, BrowserError> {
        let body = json!({
            "script": format!("return ({function}).call(arguments[0]);"),
            "args": [element.reference()],
        });
        self.command(Method::POST, "execute/sync", Some(body))
            .map_err(|e| BrowserError::Command {
                context: format!("evaluate on {}", element.locator),
                source: e.into(),
            })
    }

    fn element_from(&self, response: Value, locator: Locator) -> Result<WebElement, BrowserError> {
        match response.get(ELEMENT_KEY).and_then(Value::as_str) {
            Some(id) => Ok(WebElement {
                id: id.to_owned(),
                locator,
            }),
            None => Err(BrowserError::Command {
                context: format!("find {locator}"),
                source: WebDriverError::Malformed(response).into(),
            }),
        }
    }
}

impl BrowserSession for WebDriverSession {
    type Element = WebElement;

    fn requires_scroll_into_view(&self) -> bool {
        self.requires_scroll_into_view
    }

    fn navigate(&mut self, url: &Url) -> Result<(), BrowserError> {
        debug!("Navigating to {url}");
        self.command(Method::POST, "url", Some(json!({ "url": url.as_str() })))
            .map_err(|e| BrowserError::command(format!("navigate to {url}"))(e.into()))?;
        Ok(())
    }

    fn current_url(&mut self) -> Result<String, BrowserError> {
        let value = self
            .command(Method::GET, "url", None)
            .map_err(|e| BrowserError::command("get current url")(e.into()))?;
        value
            .as_str()
            .map(str::to_owned)
            .ok_or_else(|| BrowserError::command("get current url")(anyhow!("{value}")))
    }

    fn find(&mut self, locator: &Locator) -> Result<WebElement, BrowserError> {
        let body = json!({ "using": "css selector", "value": locator.css() });
        match self.command(Method::POST, "element", Some(body)) {
            Ok(response) => self.element_from(response, locator.clone()),
            Err(e) if e.is_no_such_element() => Err(BrowserError::ElementNotFound(locator.clone())),
            Err(e) => Err(BrowserError::command(format!("find {locator}"))(e.into())),
        }
    }

    fn parent(&mut self, element: &WebElement) -> Result<WebElement, BrowserError> {
        let locator = Locator::Css(format!("parent of {}", element.locator));
        let body = json!({ "using": "xpath", "value": ".." });
        match self.command(
            Method::POST,
            &format!("element/{}/element", element.id),
            Some(body),
        ) {
            Ok(response) => self.element_from(response, locator),
            Err(e) if e.is_no_such_element() => Err(BrowserError::ElementNotFound(locator)),
            Err(e) => Err(BrowserError::command(format!("find {locator}"))(e.into())),
        }
    }

    fn value(&mut self, element: &WebElement) -> Result<Option<String>, BrowserError> {
        Ok(self
            .call(element, js::VALUE)?
            .as_str()
            .map(str::to_owned))
    }

    fn is_visible(&mut self, element: &WebElement) -> Result<bool, BrowserError> {
        Ok(self.call(element, js::IS_VISIBLE)?.as_bool().unwrap_or(false))
    }

    fn is_clickable(&mut self, element: &WebElement) -> Result<bool, BrowserError> {
        Ok(self
            .call(element, js::IS_CLICKABLE)?
            .as_bool()
            .unwrap_or(false))
    }

    fn selected_option(
        &mut self,
        select: &WebElement,
    ) -> Result<Option<SelectedOption>, BrowserError> {
        Ok(parse_selected_option(Some(
            &self.call(select, js::SELECTED_OPTION)?,
        )))
    }

    fn type_into(&mut self, element: &WebElement, text: &str) -> Result<(), BrowserError> {
        let body = json!({ "text": text });
        self.element_command(Method::POST, element, "value", Some(body), "type into")?;
        Ok(())
    }

    fn click(&mut self, element: &WebElement) -> Result<(), BrowserError> {
        self.element_command(Method::POST, element, "click", Some(json!({})), "click")?;
        Ok(())
    }

    fn scroll_into_view(&mut self, element: &WebElement) -> Result<(), BrowserError> {
        self.call(element, js::SCROLL_INTO_VIEW)?;
        Ok(())
    }

    fn perform(&mut self, actions: &[Action<WebElement>]) -> Result<(), BrowserError> {
        self.command(Method::POST, "actions", Some(encode_actions(actions)))
            .map_err(|e| BrowserError::command("perform actions")(e.into()))?;
        Ok(())
    }

    fn close(&mut self) -> Result<(), BrowserError> {
        let res = if self.closed {
            Ok(())
        } else {
            self.closed = true;
            // The session resource itself has no trailing slash.
            Url::parse(self.session_url.as_str().trim_end_matches('/'))
                .map_err(anyhow::Error::new)
                .and_then(|url| Ok(send(&self.client, Method::DELETE, url, None)?))
                .map(|_| ())
                .map_err(BrowserError::command("end session"))
        };
        if let Some(mut driver) = self.driver.take() {
            debug!("Stopping {GECKODRIVER}");
            if let Err(e) = driver.kill().and_then(|()| driver.wait().map(|_| ())) {
                warn!("Failed to stop {GECKODRIVER}: {e}");
            }
        }
        res
    }
}

impl Drop for WebDriverSession {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Failed to close the browser session: {e:#}");
        }
    }
}

fn send(
    client: &Client,
    method: Method,
    url: Url,
    body: Option<Value>,
) -> Result<Value, WebDriverError> {
    let mut request = client.request(method, url);
    if let Some(body) = body {
        request = request.json(&body);
    }
    let mut response: Value = request.send()?.json()?;
    let value = response
        .get_mut("value")
        .map(Value::take)
        .ok_or_else(|| WebDriverError::Malformed(response.clone()))?;
    match value.get("error").and_then(Value::as_str) {
        Some(error) => Err(WebDriverError::Remote {
            error: error.to_owned(),
            message: value
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_owned(),
        }),
        None => Ok(value),
    }
}

fn wait_for_ready(client: &Client, server: &Url) -> anyhow::Result<()> {
    let status = server.join("status")?;
    let start = Instant::now();
    loop {
        match send(client, Method::GET, status.clone(), None) {
            Ok(value) if value.get("ready").and_then(Value::as_bool) == Some(true) => {
                return Ok(())
            }
            Ok(value) => debug!("Driver not ready yet: {value}"),
            Err(e) => debug!("Driver not reachable yet: {e}"),
        }
        if start.elapsed() > DRIVER_STARTUP_TIMEOUT {
            bail!("The WebDriver server at {server} did not become ready");
        }
        sleep(Duration::from_millis(100));
    }
}

fn free_port() -> anyhow::Result<u16> {
    let listener = TcpListener::bind(("127.0.0.1", 0)).context("No free local port")?;
    Ok(listener.local_addr()?.port())
}

/// Encodes an action sequence as one pointer source and one key source.
///
/// Every step becomes the same number of ticks on both sources, so the two
/// stay in lockstep and the steps run strictly in the given order.
fn encode_actions(actions: &[Action<WebElement>]) -> Value {
    let pause = || json!({ "type": "pause", "duration": 0 });
    let mut pointer = vec![];
    let mut keys = vec![];
    for action in actions {
        match action {
            Action::MoveTo(element) => {
                pointer.push(pointer_move(element));
                keys.push(pause());
            }
            Action::Click(element) => {
                pointer.push(pointer_move(element));
                pointer.push(json!({ "type": "pointerDown", "button": 0 }));
                pointer.push(json!({ "type": "pointerUp", "button": 0 }));
                keys.extend([pause(), pause(), pause()]);
            }
            Action::Pause(duration) => {
                let duration = json!({ "type": "pause", "duration": duration.as_millis() as u64 });
                pointer.push(duration.clone());
                keys.push(duration);
            }
            Action::Type(text) => {
                for c in text.chars() {
                    keys.push(json!({ "type": "keyDown", "value": c.to_string() }));
                    keys.push(json!({ "type": "keyUp", "value": c.to_string() }));
                    pointer.extend([pause(), pause()]);
                }
            }
            Action::Press(Key::Enter) => {
                keys.push(json!({ "type": "keyDown", "value": ENTER }));
                keys.push(json!({ "type": "keyUp", "value": ENTER }));
                pointer.extend([pause(), pause()]);
            }
        }
    }
    json!({
        "actions": [
            {
                "type": "pointer",
                "id": "mouse",
                "parameters": { "pointerType": "mouse" },
                "actions": pointer,
            },
            { "type": "key", "id": "keyboard", "actions": keys },
        ]
    })
}

fn pointer_move(element: &WebElement) -> Value {
    json!({
        "type": "pointerMove",
        "duration": 100,
        "origin": element.reference(),
        "x": 0,
        "y": 0,
    })
}
