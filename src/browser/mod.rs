//! A small, site-agnostic view of a browser tab: find elements, read their
//! state, click and type.  Two backends implement it: [`chromium`] over the
//! DevTools protocol for Chrome and Edge, and [`webdriver`] over W3C WebDriver
//! (geckodriver) for Firefox.

use std::{
    fmt::{self, Debug, Display},
    ops::{Deref, DerefMut},
    thread::sleep,
    time::{Duration, Instant},
};

use log::{trace, warn};
use strum::{Display as StrumDisplay, EnumString};
use url::Url;

pub mod chromium;
#[cfg(test)]
pub mod fake;
pub mod webdriver;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, EnumString, StrumDisplay)]
#[strum(ascii_case_insensitive)]
pub enum BrowserKind {
    #[default]
    Firefox,
    Chrome,
    Edge,
}
impl BrowserKind {
    /// Parses the configured browser name, falling back to the default for anything unknown.
    pub fn from_config(name: &str) -> Self {
        name.trim().parse().unwrap_or_else(|_| {
            let fallback = Self::default();
            warn!("Unknown browser {name:?}, using {fallback}");
            fallback
        })
    }
}

/// How an element is looked up on the page.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum Locator {
    Id(String),
    Name(String),
    Class(String),
    Css(String),
}
impl Locator {
    pub fn id(id: impl Into<String>) -> Self {
        Self::Id(id.into())
    }

    pub fn name(name: impl Into<String>) -> Self {
        Self::Name(name.into())
    }

    pub fn class(class: impl Into<String>) -> Self {
        Self::Class(class.into())
    }

    /// An `<input>` whose id is exactly `id`.
    pub fn input_with_id(id: &str) -> Self {
        Self::Css(format!(r#"input[id="{}"]"#, css_string(id)))
    }

    pub fn css(&self) -> String {
        match self {
            Self::Id(id) => format!(r#"[id="{}"]"#, css_string(id)),
            Self::Name(name) => format!(r#"[name="{}"]"#, css_string(name)),
            Self::Class(class) => format!(r#"[class~="{}"]"#, css_string(class)),
            Self::Css(css) => css.clone(),
        }
    }
}
impl Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "id={id:?}"),
            Self::Name(name) => write!(f, "name={name:?}"),
            Self::Class(class) => write!(f, "class={class:?}"),
            Self::Css(css) => write!(f, "css={css:?}"),
        }
    }
}

/// Escapes a value for use inside a double-quoted CSS string.
fn css_string(value: &str) -> String {
    value.replace('\\', r"\\").replace('"', r#"\""#)
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Key {
    Enter,
}

/// One step of a simulated input sequence, performed in order.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Action<E> {
    MoveTo(E),
    Click(E),
    Pause(Duration),
    Type(String),
    Press(Key),
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct SelectedOption {
    pub value: String,
    pub label: String,
}

#[derive(Debug, thiserror::Error)]
pub enum BrowserError {
    #[error("No element matches {0}")]
    ElementNotFound(Locator),
    #[error("Timed out after {timeout:?} waiting for {what}")]
    Timeout { what: String, timeout: Duration },
    #[error("Failed to start {browser}")]
    Launch {
        browser: BrowserKind,
        #[source]
        source: anyhow::Error,
    },
    #[error("Browser command failed: {context}")]
    Command {
        context: String,
        #[source]
        source: anyhow::Error,
    },
}
impl BrowserError {
    pub fn command(context: impl Into<String>) -> impl FnOnce(anyhow::Error) -> Self {
        let context = context.into();
        move |source| Self::Command { context, source }
    }
}

pub trait BrowserSession {
    /// Handle to an element found on the current page.
    type Element: Clone + Debug;

    /// Whether pointer interaction needs an explicit scroll to the target first.
    fn requires_scroll_into_view(&self) -> bool;

    fn navigate(&mut self, url: &Url) -> Result<(), BrowserError>;
    fn current_url(&mut self) -> Result<String, BrowserError>;

    /// Fails with [`BrowserError::ElementNotFound`] if nothing matches.
    fn find(&mut self, locator: &Locator) -> Result<Self::Element, BrowserError>;
    fn parent(&mut self, element: &Self::Element) -> Result<Self::Element, BrowserError>;

    /// The live `value` property of a form control.
    fn value(&mut self, element: &Self::Element) -> Result<Option<String>, BrowserError>;
    fn is_visible(&mut self, element: &Self::Element) -> Result<bool, BrowserError>;
    /// Visible and not disabled.
    fn is_clickable(&mut self, element: &Self::Element) -> Result<bool, BrowserError>;
    /// First selected `<option>` of a `<select>`.
    fn selected_option(
        &mut self,
        select: &Self::Element,
    ) -> Result<Option<SelectedOption>, BrowserError>;

    fn type_into(&mut self, element: &Self::Element, text: &str) -> Result<(), BrowserError>;
    fn click(&mut self, element: &Self::Element) -> Result<(), BrowserError>;
    fn scroll_into_view(&mut self, element: &Self::Element) -> Result<(), BrowserError>;
    fn perform(&mut self, actions: &[Action<Self::Element>]) -> Result<(), BrowserError>;

    /// Ends the session and shuts the browser down.  Calling it twice is a no-op.
    fn close(&mut self) -> Result<(), BrowserError>;

    fn find_optional(&mut self, locator: &Locator) -> Result<Option<Self::Element>, BrowserError> {
        match self.find(locator) {
            Ok(element) => Ok(Some(element)),
            Err(BrowserError::ElementNotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Owns a session and closes it when dropped, whichever way the run ends.
pub struct SessionGuard<S: BrowserSession>(S);
impl<S: BrowserSession> SessionGuard<S> {
    pub fn new(session: S) -> Self {
        Self(session)
    }
}
impl<S: BrowserSession> Deref for SessionGuard<S> {
    type Target = S;

    fn deref(&self) -> &S {
        &self.0
    }
}
impl<S: BrowserSession> DerefMut for SessionGuard<S> {
    fn deref_mut(&mut self) -> &mut S {
        &mut self.0
    }
}
impl<S: BrowserSession> Drop for SessionGuard<S> {
    fn drop(&mut self) {
        if let Err(e) = self.0.close() {
            warn!("Failed to close the browser session: {e:#}");
        }
    }
}

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Polls `condition` until it yields a value or `timeout` elapses.
///
/// The condition is always evaluated at least once.
pub fn wait_until<S, T>(
    session: &mut S,
    timeout: Duration,
    what: &str,
    mut condition: impl FnMut(&mut S) -> Result<Option<T>, BrowserError>,
) -> Result<T, BrowserError> {
    let start = Instant::now();
    loop {
        if let Some(res) = condition(session)? {
            return Ok(res);
        }
        let elapsed = start.elapsed();
        if elapsed >= timeout {
            return Err(BrowserError::Timeout {
                what: what.to_owned(),
                timeout,
            });
        }
        trace!("Still waiting for {what}");
        sleep(POLL_INTERVAL.min(timeout - elapsed));
    }
}

/// Function declarations evaluated with the target element bound to `this`.
pub(crate) mod js {
    pub const VALUE: &str =
        "function() { return this.value === undefined || this.value === null ? null : String(this.value); }";
    pub const IS_VISIBLE: &str = "function() {
        const style = window.getComputedStyle(this);
        const rect = this.getBoundingClientRect();
        return style.display !== 'none' && style.visibility !== 'hidden'
            && (rect.width > 0 || rect.height > 0);
    }";
    pub const IS_CLICKABLE: &str = "function() {
        const style = window.getComputedStyle(this);
        const rect = this.getBoundingClientRect();
        return !this.disabled && style.display !== 'none' && style.visibility !== 'hidden'
            && (rect.width > 0 || rect.height > 0);
    }";
    pub const SELECTED_OPTION: &str = "function() {
        const option = this.selectedOptions && this.selectedOptions[0];
        return option ? [option.value, option.text] : null;
    }";
    pub const SCROLL_INTO_VIEW: &str = "function() { this.scrollIntoView(); }";
}

/// Decodes the result of [`js::SELECTED_OPTION`].
pub(crate) fn parse_selected_option(value: Option<&serde_json::Value>) -> Option<SelectedOption> {
    let pair = value?.as_array()?;
    match &pair[..] {
        [value, label] => Some(SelectedOption {
            value: value.as_str()?.to_owned(),
            label: label.as_str()?.to_owned(),
        }),
        _ => None,
    }
}
