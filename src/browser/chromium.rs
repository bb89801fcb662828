use std::{
    env,
    ffi::OsString,
    path::PathBuf,
    sync::Arc,
    thread::sleep,
    time::Duration,
};

use anyhow::{anyhow, Context};
use headless_chrome::{
    browser::{default_executable, tab::NoElementFound},
    Browser, Element, LaunchOptions, Tab,
};
use itertools::Itertools;
use log::{debug, info};
use url::Url;

use super::{
    js, parse_selected_option, Action, BrowserError, BrowserKind, BrowserSession, Key, Locator,
    SelectedOption,
};

/// Chromium scrolls the target into view itself before dispatching pointer events.
const REQUIRES_SCROLL_INTO_VIEW: bool = false;

const EDGE_EXECUTABLES: &[&str] = &["msedge", "microsoft-edge", "microsoft-edge-stable"];
const EDGE_INSTALL_PATHS: &[&str] = &[
    r"C:\Program Files (x86)\Microsoft\Edge\Application\msedge.exe",
    r"C:\Program Files\Microsoft\Edge\Application\msedge.exe",
    "/Applications/Microsoft Edge.app/Contents/MacOS/Microsoft Edge",
    "/opt/microsoft/msedge/msedge",
];

/// Elements are addressed by CSS selector and re-resolved on every use.
#[derive(Clone, Debug)]
pub struct ChromiumElement {
    selector: String,
    locator: Locator,
}

/// A visible Chromium-family browser driven through the DevTools protocol.
pub struct ChromiumSession {
    // Dropping the browser kills the process.
    browser: Option<Browser>,
    tab: Arc<Tab>,
}

impl ChromiumSession {
    pub fn launch(kind: BrowserKind) -> Result<Self, BrowserError> {
        let launch_error = |source| BrowserError::Launch {
            browser: kind,
            source,
        };
        let path = match kind {
            BrowserKind::Edge => find_edge().map_err(launch_error)?,
            _ => default_executable().map_err(|e| launch_error(anyhow!(e)))?,
        };
        info!("Starting {kind} from {path:?}");
        let options = LaunchOptions::default_builder()
            .headless(false)
            .path(Some(path))
            .window_size(Some((1280, 1024)))
            .idle_browser_timeout(Duration::from_secs(60 * 60))
            .build()
            .map_err(|e| launch_error(anyhow!("{e}")))?;
        let browser = Browser::new(options).map_err(launch_error)?;
        let tab = browser.new_tab().map_err(launch_error)?;
        Ok(Self {
            browser: Some(browser),
            tab,
        })
    }

    fn resolve(&self, element: &ChromiumElement) -> Result<Element<'_>, BrowserError> {
        self.tab.find_element(&element.selector).map_err(|e| {
            if e.downcast_ref::<NoElementFound>().is_some() {
                BrowserError::ElementNotFound(element.locator.clone())
            } else {
                BrowserError::Command {
                    context: format!("find {}", element.locator),
                    source: e,
                }
            }
        })
    }

    fn call(
        &self,
        element: &ChromiumElement,
        function: &str,
    ) -> Result<Option<serde_json::Value>, BrowserError> {
        let remote = self
            .resolve(element)?
            .call_js_fn(function, vec![], false)
            .map_err(BrowserError::command(format!("evaluate on {}", element.locator)))?;
        Ok(remote.value)
    }

    fn call_bool(&self, element: &ChromiumElement, function: &str) -> Result<bool, BrowserError> {
        Ok(self
            .call(element, function)?
            .and_then(|value| value.as_bool())
            .unwrap_or(false))
    }
}

impl BrowserSession for ChromiumSession {
    type Element = ChromiumElement;

    fn requires_scroll_into_view(&self) -> bool {
        REQUIRES_SCROLL_INTO_VIEW
    }

    fn navigate(&mut self, url: &Url) -> Result<(), BrowserError> {
        debug!("Navigating to {url}");
        self.tab
            .navigate_to(url.as_str())
            .and_then(|tab| tab.wait_until_navigated())
            .map_err(BrowserError::command(format!("navigate to {url}")))?;
        Ok(())
    }

    fn current_url(&mut self) -> Result<String, BrowserError> {
        Ok(self.tab.get_url())
    }

    fn find(&mut self, locator: &Locator) -> Result<ChromiumElement, BrowserError> {
        let element = ChromiumElement {
            selector: locator.css(),
            locator: locator.clone(),
        };
        self.resolve(&element)?;
        Ok(element)
    }

    fn parent(&mut self, element: &ChromiumElement) -> Result<ChromiumElement, BrowserError> {
        let parent = ChromiumElement {
            selector: format!(":has(> {})", element.selector),
            locator: Locator::Css(format!("parent of {}", element.locator)),
        };
        self.resolve(&parent)?;
        Ok(parent)
    }

    fn value(&mut self, element: &ChromiumElement) -> Result<Option<String>, BrowserError> {
        Ok(self
            .call(element, js::VALUE)?
            .and_then(|value| value.as_str().map(str::to_owned)))
    }

    fn is_visible(&mut self, element: &ChromiumElement) -> Result<bool, BrowserError> {
        self.call_bool(element, js::IS_VISIBLE)
    }

    fn is_clickable(&mut self, element: &ChromiumElement) -> Result<bool, BrowserError> {
        self.call_bool(element, js::IS_CLICKABLE)
    }

    fn selected_option(
        &mut self,
        select: &ChromiumElement,
    ) -> Result<Option<SelectedOption>, BrowserError> {
        Ok(parse_selected_option(
            self.call(select, js::SELECTED_OPTION)?.as_ref(),
        ))
    }

    fn type_into(&mut self, element: &ChromiumElement, text: &str) -> Result<(), BrowserError> {
        self.resolve(element)?
            .type_into(text)
            .map_err(BrowserError::command(format!("type into {}", element.locator)))?;
        Ok(())
    }

    fn click(&mut self, element: &ChromiumElement) -> Result<(), BrowserError> {
        self.resolve(element)?
            .click()
            .map_err(BrowserError::command(format!("click {}", element.locator)))?;
        Ok(())
    }

    fn scroll_into_view(&mut self, element: &ChromiumElement) -> Result<(), BrowserError> {
        self.call(element, js::SCROLL_INTO_VIEW)?;
        Ok(())
    }

    fn perform(&mut self, actions: &[Action<ChromiumElement>]) -> Result<(), BrowserError> {
        for action in actions {
            match action {
                Action::MoveTo(element) => {
                    self.resolve(element)?
                        .move_mouse_over()
                        .map_err(BrowserError::command(format!("hover {}", element.locator)))?;
                }
                Action::Click(element) => self.click(element)?,
                Action::Pause(duration) => sleep(*duration),
                Action::Type(text) => {
                    self.tab
                        .type_str(text)
                        .map_err(BrowserError::command("type text"))?;
                }
                Action::Press(Key::Enter) => {
                    self.tab
                        .press_key("Enter")
                        .map_err(BrowserError::command("press Enter"))?;
                }
            }
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), BrowserError> {
        if self.browser.is_none() {
            return Ok(());
        }
        // Closing the last tab can race with the browser exiting; either way it is gone.
        if let Err(e) = self.tab.close(true) {
            debug!("Closing tab failed: {e:#}");
        }
        self.browser = None;
        Ok(())
    }
}

fn find_edge() -> anyhow::Result<PathBuf> {
    edge_candidates(env::var_os("PATH"))
        .find(|path| path.is_file())
        .context("Microsoft Edge was not found on PATH or in the usual install locations")
}

/// Places Edge may live, `PATH` entries first.
fn edge_candidates(path_var: Option<OsString>) -> impl Iterator<Item = PathBuf> {
    let on_path = path_var
        .map(|paths| env::split_paths(&paths).collect::<Vec<_>>())
        .unwrap_or_default();
    EDGE_EXECUTABLES
        .iter()
        .flat_map(|name| [OsString::from(name), OsString::from(format!("{name}.exe"))])
        .cartesian_product(on_path)
        .map(|(name, dir)| dir.join(name))
        .chain(EDGE_INSTALL_PATHS.iter().map(PathBuf::from))
}
