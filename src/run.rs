//! One attendance run from login to logout.

use anyhow::Context;
use log::info;
use tlc_attendance_utils::credentials::Credentials;

use crate::{
    browser::BrowserSession,
    config::Settings,
    portal::{pause, Endpoints, LoginError, MarkSummary, Portal, Timings},
    roster::Roster,
};

#[derive(Debug)]
pub enum Outcome {
    /// The site did not accept the login; nothing was recorded.
    LoginFailed(LoginError),
    Recorded(MarkSummary),
}

/// Logs in, marks every attendee in `roster` as present at `event_name`, and logs out.
///
/// The browser session is closed on every path out of this function.
pub fn record_attendance<S: BrowserSession>(
    session: S,
    settings: &Settings,
    credentials: &Credentials,
    event_name: &str,
    roster: &Roster,
    timings: Timings,
) -> anyhow::Result<Outcome> {
    let endpoints = Endpoints::new(&settings.server)
        .with_context(|| format!("Invalid server name {:?}", settings.server))?;
    info!("Logging in to {}", endpoints.base());

    let after_login = timings.after_login;
    let before_logout = timings.before_logout;
    let mut portal = match Portal::new(session, endpoints, timings).login(credentials) {
        Ok(portal) => portal,
        Err(LoginError::Browser(e)) => return Err(e).context("Browser failed during login"),
        Err(e) => return Ok(Outcome::LoginFailed(e)),
    };
    pause(after_login);

    let summary = {
        let mut page = portal.open_attendance()?;
        let event = page.select_event(event_name)?;
        page.enable_lesson_plans()?;
        page.mark(roster, &event)?
    };
    info!(
        "Marked {} attendees, {} were already marked",
        summary.marked, summary.already_marked
    );

    pause(before_logout);
    portal.logout()?;
    Ok(Outcome::Recorded(summary))
}
