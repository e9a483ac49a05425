//! View seam between the widget controller and whatever draws it
//!
//! The controller never touches a UI toolkit. It hands a [`WidgetSnapshot`] to
//! a [`ChatView`] after every state change and asks it to animate the welcome
//! bubbles or move focus. [`HeadlessView`] records those calls for tests and
//! one-shot CLI use.

use std::sync::Mutex;
use std::time::Duration;

use crate::models::ChatMessage;

/// How the welcome bubbles leave the screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Instant,
    Fade(Duration),
}

/// Everything a view needs to draw the widget.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WidgetSnapshot {
    pub is_open: bool,
    /// Input and send control are disabled and the typing indicator shows.
    pub is_loading: bool,
    pub welcome_visible: bool,
    pub welcome_bubbles: Vec<String>,
    pub input: String,
    pub transcript: Vec<ChatMessage>,
}

pub trait ChatView: Send + Sync {
    fn render(&self, snapshot: &WidgetSnapshot);

    fn hide_welcome(&self, transition: Transition);

    fn focus_input(&self);
}

/// One call received by a [`HeadlessView`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewCall {
    Render(WidgetSnapshot),
    HideWelcome(Transition),
    FocusInput,
}

/// A view that draws nothing and remembers every call.
#[derive(Debug, Default)]
pub struct HeadlessView {
    calls: Mutex<Vec<ViewCall>>,
}

impl HeadlessView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<ViewCall> {
        self.lock().clone()
    }

    pub fn last_render(&self) -> Option<WidgetSnapshot> {
        self.lock().iter().rev().find_map(|call| match call {
            ViewCall::Render(snapshot) => Some(snapshot.clone()),
            _ => None,
        })
    }

    pub fn welcome_hides(&self) -> Vec<Transition> {
        self.lock()
            .iter()
            .filter_map(|call| match call {
                ViewCall::HideWelcome(t) => Some(*t),
                _ => None,
            })
            .collect()
    }

    pub fn focus_count(&self) -> usize {
        self.lock()
            .iter()
            .filter(|call| matches!(call, ViewCall::FocusInput))
            .count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<ViewCall>> {
        match self.calls.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl ChatView for HeadlessView {
    fn render(&self, snapshot: &WidgetSnapshot) {
        self.lock().push(ViewCall::Render(snapshot.clone()));
    }

    fn hide_welcome(&self, transition: Transition) {
        self.lock().push(ViewCall::HideWelcome(transition));
    }

    fn focus_input(&self) {
        self.lock().push(ViewCall::FocusInput);
    }
}
