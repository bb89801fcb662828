//! The Trail Life Connect site: where its pages live, which elements the
//! automation relies on, and the login flow.

use std::{marker::PhantomData, thread::sleep, time::Duration};

use log::info;
use tlc_attendance_utils::credentials::Credentials;
use url::Url;

use crate::browser::{wait_until, BrowserError, BrowserSession, SessionGuard};

pub mod attendance;

pub use attendance::{AttendanceError, AttendancePage, EventValue, MarkSummary};

/// Element lookups the automation depends on.  Any markup change on the site breaks these.
pub mod dom {
    use crate::{browser::Locator, roster::AttendeeId};

    use super::EventValue;

    /// Value of an unchecked checkbox-like input.
    pub const UNSET: &str = "0";

    pub fn login_button() -> Locator {
        Locator::name("login-button")
    }

    pub fn email_field() -> Locator {
        Locator::id("loginform-email")
    }

    pub fn password_field() -> Locator {
        Locator::id("loginform-password")
    }

    pub fn login_error() -> Locator {
        Locator::class("help-block-error")
    }

    pub fn event_select() -> Locator {
        Locator::id("event-id")
    }

    pub fn event_search() -> Locator {
        Locator::id("select2-event-id-container")
    }

    pub fn lesson_plans() -> Locator {
        Locator::id("use-lesson-plans")
    }

    pub fn attendee_checkbox_id(attendee: &AttendeeId, event: &EventValue) -> String {
        format!("{attendee}-{event}-attended")
    }

    pub fn attendee_checkbox(element_id: &str) -> Locator {
        Locator::input_with_id(element_id)
    }
}

#[derive(Clone, Debug)]
pub struct Endpoints {
    base: Url,
    dashboard: Url,
    attendance: Url,
    logout: Url,
}

impl Endpoints {
    pub fn new(server: &str) -> Result<Self, url::ParseError> {
        let base = Url::parse(&format!("https://{server}/"))?;
        Ok(Self {
            dashboard: base.join("dashboard")?,
            attendance: base.join("attendance")?,
            logout: base.join("logout")?,
            base,
        })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    pub fn dashboard(&self) -> &Url {
        &self.dashboard
    }

    pub fn attendance(&self) -> &Url {
        &self.attendance
    }

    pub fn logout(&self) -> &Url {
        &self.logout
    }
}

/// Fixed pauses and bounded waits used while driving the site.
#[derive(Clone, Debug)]
pub struct Timings {
    /// How long the login page gets to show its form.
    pub initial_wait: Duration,
    /// How long the site gets to answer a login attempt.
    pub login_result: Duration,
    pub after_login: Duration,
    pub page_settle: Duration,
    pub short_pause: Duration,
    pub before_logout: Duration,
}

impl Timings {
    pub fn with_initial_wait(initial_wait: Duration) -> Self {
        Self {
            initial_wait,
            login_result: Duration::from_secs(10),
            after_login: Duration::from_secs(5),
            page_settle: Duration::from_secs(2),
            short_pause: Duration::from_secs(1),
            before_logout: Duration::from_secs(5),
        }
    }

    #[cfg(test)]
    pub fn immediate() -> Self {
        Self {
            initial_wait: Duration::ZERO,
            login_result: Duration::ZERO,
            after_login: Duration::ZERO,
            page_settle: Duration::ZERO,
            short_pause: Duration::ZERO,
            before_logout: Duration::ZERO,
        }
    }
}

pub(crate) fn pause(duration: Duration) {
    if !duration.is_zero() {
        sleep(duration);
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LoginError {
    #[error("Login page did not show the login form {url}")]
    FormNotLoaded { url: String },
    #[error("Login failed {url}")]
    Timeout { url: String },
    #[error("Failed to load dashboard after login {url}")]
    NotDashboard { url: String },
    #[error(transparent)]
    Browser(#[from] BrowserError),
}

pub struct Unauthenticated;
pub struct Authenticated;

/// The site, seen through one browser session.  Only an [`Authenticated`]
/// portal can reach the attendance page.
pub struct Portal<S: BrowserSession, State> {
    session: SessionGuard<S>,
    endpoints: Endpoints,
    timings: Timings,
    _state: PhantomData<fn() -> State>,
}

impl<S: BrowserSession> Portal<S, Unauthenticated> {
    pub fn new(session: S, endpoints: Endpoints, timings: Timings) -> Self {
        Self {
            session: SessionGuard::new(session),
            endpoints,
            timings,
            _state: PhantomData,
        }
    }

    /// Makes a single login attempt.  On failure the session is closed.
    pub fn login(
        mut self,
        credentials: &Credentials,
    ) -> Result<Portal<S, Authenticated>, LoginError> {
        let session = &mut *self.session;
        session.navigate(self.endpoints.base())?;

        let login_button = wait_until(
            session,
            self.timings.initial_wait,
            "the login button",
            |session| match session.find_optional(&dom::login_button())? {
                Some(button) if session.is_clickable(&button)? => Ok(Some(button)),
                _ => Ok(None),
            },
        )
        .map_err(|e| match e {
            BrowserError::Timeout { .. } => match session.current_url() {
                Ok(url) => LoginError::FormNotLoaded { url },
                Err(e) => e.into(),
            },
            e => e.into(),
        })?;

        let email = session.find(&dom::email_field())?;
        session.type_into(&email, credentials.email.as_ref())?;
        let password = session.find(&dom::password_field())?;
        session.type_into(&password, credentials.password.as_ref())?;
        session.click(&login_button)?;

        let dashboard = self.endpoints.dashboard().as_str();
        let settled = wait_until(
            session,
            self.timings.login_result,
            "the dashboard or a login error",
            |session| {
                if session.current_url()? == dashboard {
                    return Ok(Some(()));
                }
                match session.find_optional(&dom::login_error())? {
                    Some(error) if session.is_visible(&error)? => Ok(Some(())),
                    _ => Ok(None),
                }
            },
        );
        let url = session.current_url()?;
        match settled {
            Ok(()) if url == dashboard => {}
            Ok(()) => return Err(LoginError::NotDashboard { url }),
            Err(BrowserError::Timeout { .. }) => return Err(LoginError::Timeout { url }),
            Err(e) => return Err(e.into()),
        }
        info!("Logged in as {}", credentials.email);

        Ok(Portal {
            session: self.session,
            endpoints: self.endpoints,
            timings: self.timings,
            _state: PhantomData,
        })
    }
}

impl<S: BrowserSession> Portal<S, Authenticated> {
    pub fn open_attendance(&mut self) -> Result<AttendancePage<'_, S>, BrowserError> {
        self.session.navigate(self.endpoints.attendance())?;
        pause(self.timings.page_settle);
        Ok(AttendancePage::new(&mut self.session, &self.timings))
    }

    pub fn logout(mut self) -> Result<(), BrowserError> {
        info!("Logging out");
        self.session.navigate(self.endpoints.logout())?;
        self.session.close()
    }
}
