//! Scripted in-memory page for exercising the portal flows.

use std::{cell::RefCell, collections::HashMap, rc::Rc};

use url::Url;

use super::{Action, BrowserError, BrowserSession, Locator, SelectedOption};

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Event {
    Navigate(String),
    TypeInto(usize, String),
    Click(usize),
    Scroll(usize),
    Perform(Vec<Action<usize>>),
    Close,
}

/// What happens when an element is clicked.
#[derive(Clone, Debug)]
pub enum Reaction {
    GoTo(String),
    Reveal(usize),
    SetValue(usize, String),
}

#[derive(Clone, Debug)]
pub struct FakeElement {
    pub value: Option<String>,
    pub visible: bool,
    pub enabled: bool,
    pub parent: Option<usize>,
    pub selected: Option<SelectedOption>,
    pub on_click: Vec<Reaction>,
}
impl Default for FakeElement {
    fn default() -> Self {
        Self {
            value: None,
            visible: true,
            enabled: true,
            parent: None,
            selected: None,
            on_click: vec![],
        }
    }
}

pub struct FakeSession {
    scroll: bool,
    pub url: String,
    pub elements: Vec<FakeElement>,
    locators: HashMap<Locator, usize>,
    log: Rc<RefCell<Vec<Event>>>,
}

impl FakeSession {
    pub fn new(requires_scroll_into_view: bool) -> Self {
        Self {
            scroll: requires_scroll_into_view,
            url: "about:blank".into(),
            elements: vec![],
            locators: HashMap::new(),
            log: Rc::default(),
        }
    }

    pub fn add(&mut self, locator: Option<Locator>, element: FakeElement) -> usize {
        let index = self.elements.len();
        self.elements.push(element);
        if let Some(locator) = locator {
            self.locators.insert(locator, index);
        }
        index
    }

    /// Shared handle to the event log, still readable after the session is dropped.
    pub fn log(&self) -> Rc<RefCell<Vec<Event>>> {
        Rc::clone(&self.log)
    }

    fn record(&self, event: Event) {
        self.log.borrow_mut().push(event);
    }

    fn react(&mut self, element: usize) {
        for reaction in self.elements[element].on_click.clone() {
            match reaction {
                Reaction::GoTo(url) => self.url = url,
                Reaction::Reveal(target) => self.elements[target].visible = true,
                Reaction::SetValue(target, value) => self.elements[target].value = Some(value),
            }
        }
    }
}

impl BrowserSession for FakeSession {
    type Element = usize;

    fn requires_scroll_into_view(&self) -> bool {
        self.scroll
    }

    fn navigate(&mut self, url: &Url) -> Result<(), BrowserError> {
        self.record(Event::Navigate(url.to_string()));
        self.url = url.to_string();
        Ok(())
    }

    fn current_url(&mut self) -> Result<String, BrowserError> {
        Ok(self.url.clone())
    }

    fn find(&mut self, locator: &Locator) -> Result<usize, BrowserError> {
        self.locators
            .get(locator)
            .copied()
            .ok_or_else(|| BrowserError::ElementNotFound(locator.clone()))
    }

    fn parent(&mut self, element: &usize) -> Result<usize, BrowserError> {
        self.elements[*element]
            .parent
            .ok_or_else(|| BrowserError::ElementNotFound(Locator::Css(format!("parent of {element}"))))
    }

    fn value(&mut self, element: &usize) -> Result<Option<String>, BrowserError> {
        Ok(self.elements[*element].value.clone())
    }

    fn is_visible(&mut self, element: &usize) -> Result<bool, BrowserError> {
        Ok(self.elements[*element].visible)
    }

    fn is_clickable(&mut self, element: &usize) -> Result<bool, BrowserError> {
        let element = &self.elements[*element];
        Ok(element.visible && element.enabled)
    }

    fn selected_option(&mut self, select: &usize) -> Result<Option<SelectedOption>, BrowserError> {
        Ok(self.elements[*select].selected.clone())
    }

    fn type_into(&mut self, element: &usize, text: &str) -> Result<(), BrowserError> {
        self.record(Event::TypeInto(*element, text.to_owned()));
        Ok(())
    }

    fn click(&mut self, element: &usize) -> Result<(), BrowserError> {
        self.record(Event::Click(*element));
        self.react(*element);
        Ok(())
    }

    fn scroll_into_view(&mut self, element: &usize) -> Result<(), BrowserError> {
        self.record(Event::Scroll(*element));
        Ok(())
    }

    fn perform(&mut self, actions: &[Action<usize>]) -> Result<(), BrowserError> {
        self.record(Event::Perform(actions.to_vec()));
        for action in actions {
            if let Action::Click(element) = action {
                self.react(*element);
            }
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), BrowserError> {
        self.record(Event::Close);
        Ok(())
    }
}
