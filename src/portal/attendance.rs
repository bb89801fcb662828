use derive_more::{Display, From};
use log::{debug, warn};

use crate::{
    browser::{Action, BrowserError, BrowserSession, Key},
    roster::{AttendeeId, Roster},
};

use super::{dom, pause, Timings};

/// The portal's internal value for an event, as chosen in the event selector.
#[derive(Clone, PartialEq, Eq, Debug, From, Display)]
pub struct EventValue(String);

#[derive(Clone, Copy, Default, PartialEq, Eq, Debug)]
pub struct MarkSummary {
    /// Checkboxes this run clicked.
    pub marked: usize,
    /// Checkboxes that were already set.
    pub already_marked: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum AttendanceError {
    #[error("No event could be selected for {name:?}")]
    EventNotResolved { name: String },
    #[error(
        "No checkbox {element_id:?} for attendee {attendee} (roster entry {position}); \
         the remaining attendees were not marked"
    )]
    AttendeeNotFound {
        attendee: AttendeeId,
        /// 1-based position in the roster.
        position: usize,
        element_id: String,
        #[source]
        source: BrowserError,
    },
    #[error(transparent)]
    Browser(#[from] BrowserError),
}

/// The attendance page of a logged-in portal.
pub struct AttendancePage<'p, S> {
    session: &'p mut S,
    timings: &'p Timings,
}

impl<'p, S: BrowserSession> AttendancePage<'p, S> {
    pub(super) fn new(session: &'p mut S, timings: &'p Timings) -> Self {
        Self { session, timings }
    }

    /// Searches the event selector for `name` and returns the value it settles on.
    pub fn select_event(&mut self, name: &str) -> Result<EventValue, AttendanceError> {
        say!("Select event: {name}");
        let select = self.session.find(&dom::event_select())?;
        let search = self.session.find(&dom::event_search())?;
        self.session.perform(&[
            Action::Click(search),
            Action::Type(name.to_owned()),
            Action::Pause(self.timings.short_pause),
            Action::Press(Key::Enter),
        ])?;

        let selected = match self.session.selected_option(&select)? {
            Some(option) if !option.value.is_empty() => option,
            _ => {
                return Err(AttendanceError::EventNotResolved {
                    name: name.to_owned(),
                })
            }
        };
        say!("Selected option code: {}", selected.value);
        if !selected
            .label
            .to_lowercase()
            .contains(&name.to_lowercase())
        {
            warn!(
                "Selected event {:?} does not look like the requested {name:?}",
                selected.label
            );
        }
        pause(self.timings.short_pause);
        Ok(selected.value.into())
    }

    /// Turns on "use lesson plans".  Returns whether anything was clicked.
    pub fn enable_lesson_plans(&mut self) -> Result<bool, AttendanceError> {
        say!("Check use lesson plan");
        let input = self.session.find(&dom::lesson_plans())?;
        let value = self.session.value(&input)?;
        say!("Lesson plan checked: {}", value.as_deref().unwrap_or_default());
        if value.as_deref() != Some(dom::UNSET) {
            return Ok(false);
        }
        // The input itself is hidden behind its styled wrapper.
        let wrapper = self.session.parent(&input)?;
        self.session.click(&wrapper)?;
        pause(self.timings.short_pause);
        Ok(true)
    }

    /// Checks every attendee's box for `event`, in roster order.
    ///
    /// Stops at the first attendee without a checkbox on the page.
    pub fn mark(
        &mut self,
        roster: &Roster,
        event: &EventValue,
    ) -> Result<MarkSummary, AttendanceError> {
        let mut summary = MarkSummary::default();
        for (index, attendee) in roster.iter().enumerate() {
            say!("Check attendee: {attendee}");
            let element_id = dom::attendee_checkbox_id(attendee, event);
            debug!("Looking for checkbox {element_id:?}");
            let input = self
                .session
                .find(&dom::attendee_checkbox(&element_id))
                .map_err(|e| match e {
                    e @ BrowserError::ElementNotFound(_) => AttendanceError::AttendeeNotFound {
                        attendee: attendee.clone(),
                        position: index + 1,
                        element_id: element_id.clone(),
                        source: e,
                    },
                    e => e.into(),
                })?;
            let wrapper = self.session.parent(&input)?;

            let value = self.session.value(&input)?;
            debug!("Attendee checkbox value: {value:?}");
            if value.as_deref() == Some(dom::UNSET) {
                if self.session.requires_scroll_into_view() {
                    self.session.scroll_into_view(&wrapper)?;
                }
                self.session.perform(&[
                    Action::MoveTo(wrapper.clone()),
                    Action::Pause(self.timings.short_pause),
                    Action::Click(wrapper),
                ])?;
                summary.marked += 1;
            } else {
                say!("Attendee checkbox already checked");
                summary.already_marked += 1;
            }
        }
        say!(
            "End track attendance ({}, {})",
            summary.marked + summary.already_marked,
            roster.len()
        );
        Ok(summary)
    }
}
