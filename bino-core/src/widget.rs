//! Chat widget controller — open/close state, welcome bubbles, send lifecycle
//!
//! States:
//! - **Closed** → toggle → **OpenIdle**
//! - **OpenIdle** → toggle → **Closed**
//! - **OpenIdle** → send (non-empty input) → **OpenSending**
//! - **OpenSending** → reply or failure → **OpenIdle**
//!
//! All methods take `&self`. State sits behind a mutex that is never held
//! across an `.await`, so the widget can be closed while a send is suspended;
//! the reply still lands in the transcript. Timers run as tokio tasks, so
//! `activate` and `toggle` must be called inside a runtime.

use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::config::{BinoConfig, WidgetConfig};
use crate::error::BinoError;
use crate::models::ChatMessage;
use crate::session::SessionResolver;
use crate::store::{FileStore, KeyValueStore, MemoryStore, StoreKeys};
use crate::view::{ChatView, Transition, WidgetSnapshot};
use crate::webhook::{ConversationEndpoint, SendOutcome, WebhookClient};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WidgetPhase {
    Closed,
    OpenIdle,
    OpenSending,
}

/// Raw UI events a view forwards to the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WidgetEvent {
    ToggleClicked,
    CloseClicked,
    SendClicked,
    KeyPressed { key: String, shift: bool },
    InputChanged(String),
}

/// Listener slots attached by `activate` and removed by `dispose`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Binding {
    Toggle,
    Close,
    SendClick,
    SendOnEnter,
}

const ALL_BINDINGS: [Binding; 4] = [
    Binding::Toggle,
    Binding::Close,
    Binding::SendClick,
    Binding::SendOnEnter,
];

#[derive(Debug, Default)]
struct WidgetState {
    is_open: bool,
    is_loading: bool,
    welcome_visible: bool,
    input: String,
    transcript: Vec<ChatMessage>,
    bindings: Vec<Binding>,
    timers: Vec<JoinHandle<()>>,
}

struct Inner {
    config: WidgetConfig,
    store: Arc<dyn KeyValueStore>,
    keys: StoreKeys,
    session: SessionResolver,
    endpoint: Arc<dyn ConversationEndpoint>,
    view: Arc<dyn ChatView>,
    state: Mutex<WidgetState>,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, WidgetState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn snapshot(&self) -> WidgetSnapshot {
        let state = self.lock();
        WidgetSnapshot {
            is_open: state.is_open,
            is_loading: state.is_loading,
            welcome_visible: state.welcome_visible,
            welcome_bubbles: if state.welcome_visible {
                self.config.welcome_bubbles.clone()
            } else {
                Vec::new()
            },
            input: state.input.clone(),
            transcript: state.transcript.clone(),
        }
    }

    fn render(&self) {
        let snapshot = self.snapshot();
        self.view.render(&snapshot);
    }

    /// Hide the bubbles once. Later calls are no-ops.
    fn hide_welcome(&self, transition: Transition) -> bool {
        {
            let mut state = self.lock();
            if !state.welcome_visible {
                return false;
            }
            state.welcome_visible = false;
        }
        tracing::debug!(?transition, "Hiding welcome bubbles");
        self.view.hide_welcome(transition);
        true
    }

    fn fade(&self) -> Transition {
        Transition::Fade(Duration::from_millis(self.config.welcome_fade_ms))
    }

    fn track_timer(&self, handle: JoinHandle<()>) {
        let mut state = self.lock();
        state.timers.retain(|h| !h.is_finished());
        state.timers.push(handle);
    }
}

/// Clears the loading state on every exit path of a send, including a
/// dropped future.
struct LoadingGuard<'a> {
    inner: &'a Inner,
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.inner.lock().is_loading = false;
        self.inner.render();
        if !self.inner.config.touch_input {
            self.inner.view.focus_input();
        }
    }
}

/// The embeddable chat widget. One instance per mounted widget.
pub struct ChatWidget {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ChatWidget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatWidget")
            .field("phase", &self.phase())
            .field("endpoint", &self.inner.endpoint.name())
            .finish_non_exhaustive()
    }
}

impl ChatWidget {
    pub fn new(
        config: WidgetConfig,
        store: Arc<dyn KeyValueStore>,
        keys: StoreKeys,
        endpoint: Arc<dyn ConversationEndpoint>,
        view: Arc<dyn ChatView>,
    ) -> Self {
        let session = SessionResolver::new(store.clone(), keys.clone());
        Self::with_session(config, store, keys, session, endpoint, view)
    }

    /// Construct with an explicit session resolver (injected clock/random).
    pub fn with_session(
        config: WidgetConfig,
        store: Arc<dyn KeyValueStore>,
        keys: StoreKeys,
        session: SessionResolver,
        endpoint: Arc<dyn ConversationEndpoint>,
        view: Arc<dyn ChatView>,
    ) -> Self {
        let mut transcript = Vec::new();
        if !config.greeting.is_empty() {
            transcript.push(ChatMessage::bot(config.greeting.clone()));
        }

        let state = WidgetState {
            welcome_visible: true,
            transcript,
            ..WidgetState::default()
        };

        Self {
            inner: Arc::new(Inner {
                config,
                store,
                keys,
                session,
                endpoint,
                view,
                state: Mutex::new(state),
            }),
        }
    }

    /// Build a widget backed by the configured file store and webhook.
    ///
    /// A store file that cannot be opened degrades to an in-memory store.
    pub fn from_config(config: &BinoConfig, view: Arc<dyn ChatView>) -> Result<Self, BinoError> {
        let path = config.storage.resolved_path();
        let store: Arc<dyn KeyValueStore> = match FileStore::open(&path) {
            Ok(store) => Arc::new(store),
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Storage unavailable — session and welcome state will not persist"
                );
                Arc::new(MemoryStore::new())
            }
        };

        let endpoint = Arc::new(WebhookClient::new(&config.webhook)?);
        let keys = StoreKeys::with_prefix(&config.storage.key_prefix);

        Ok(Self::new(config.widget.clone(), store, keys, endpoint, view))
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Mount the widget: attach listeners, settle the welcome bubbles and
    /// resolve the session id.
    ///
    /// Activating an already active widget does nothing.
    pub fn activate(&self) {
        {
            let mut state = self.inner.lock();
            if !state.bindings.is_empty() {
                tracing::debug!("Widget already active");
                return;
            }
            state.bindings = ALL_BINDINGS.to_vec();
        }

        let already_shown = match self.inner.store.get(&self.inner.keys.welcome_shown) {
            Ok(value) => value.as_deref() == Some("true"),
            Err(e) => {
                tracing::warn!(error = %e, "Welcome flag unreadable — treating as first visit");
                false
            }
        };

        if already_shown {
            self.inner.hide_welcome(Transition::Instant);
        } else {
            if let Err(e) = self.inner.store.set(&self.inner.keys.welcome_shown, "true") {
                tracing::warn!(error = %e, "Failed to persist welcome flag");
            }
            self.schedule_welcome_hide();
        }

        let session_id = self.inner.session.session_id();
        tracing::info!(session_id = %session_id, first_visit = !already_shown, "Chat widget activated");

        self.inner.render();
    }

    /// Unmount: drop every listener and pending timer.
    ///
    /// A send already in flight still completes and updates the transcript.
    pub fn dispose(&self) {
        let timers = {
            let mut state = self.inner.lock();
            state.bindings.clear();
            std::mem::take(&mut state.timers)
        };
        for timer in &timers {
            timer.abort();
        }
        tracing::debug!(timers = timers.len(), "Chat widget disposed");
    }

    pub fn is_active(&self) -> bool {
        !self.inner.lock().bindings.is_empty()
    }

    fn schedule_welcome_hide(&self) {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let delay = Duration::from_millis(self.inner.config.welcome_auto_hide_ms);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                let fade = inner.fade();
                if inner.hide_welcome(fade) {
                    inner.render();
                }
            }
        });
        self.inner.track_timer(handle);
    }

    fn schedule_focus(&self) {
        if self.inner.config.touch_input {
            return;
        }
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let delay = Duration::from_millis(self.inner.config.focus_delay_ms);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                if inner.lock().is_open {
                    inner.view.focus_input();
                }
            }
        });
        self.inner.track_timer(handle);
    }

    // ========================================================================
    // Operations
    // ========================================================================

    /// Open or close the chat window.
    pub fn toggle(&self) -> WidgetPhase {
        let opened = {
            let mut state = self.inner.lock();
            state.is_open = !state.is_open;
            state.is_open
        };

        if opened {
            let fade = self.inner.fade();
            self.inner.hide_welcome(fade);
            self.schedule_focus();
        }

        self.inner.render();
        let phase = self.phase();
        tracing::debug!(?phase, "Widget toggled");
        phase
    }

    /// Replace the input buffer, as a view does on each keystroke.
    pub fn set_input(&self, text: impl Into<String>) {
        self.inner.lock().input = text.into();
    }

    /// Send the current input to the endpoint.
    ///
    /// Returns `None` without touching the network when the input is blank,
    /// the window is closed, or a send is already in flight.
    pub async fn send_message(&self) -> Option<SendOutcome> {
        let text = {
            let mut state = self.inner.lock();
            if !state.is_open {
                tracing::debug!("Send ignored: widget closed");
                return None;
            }
            if state.is_loading {
                tracing::debug!("Send ignored: request already in flight");
                return None;
            }
            let text = state.input.trim().to_string();
            if text.is_empty() {
                return None;
            }
            state.transcript.push(ChatMessage::user(text.clone()));
            state.input.clear();
            state.is_loading = true;
            text
        };

        let guard = LoadingGuard { inner: &self.inner };
        self.inner.render();

        let session_id = self.inner.session.session_id();
        let outcome = self.inner.endpoint.send(&session_id, &text).await;

        let reply = match &outcome {
            SendOutcome::Reply(text) => text.clone(),
            SendOutcome::EmptyResponse => {
                tracing::warn!(session_id = %session_id, "Webhook reply had no usable text");
                self.inner.config.fallback_reply.clone()
            }
            SendOutcome::TransportError(reason) => {
                tracing::error!(
                    endpoint = self.inner.endpoint.name(),
                    session_id = %session_id,
                    error = %reason,
                    "Chat message delivery failed"
                );
                self.inner.config.error_reply.clone()
            }
        };

        self.inner.lock().transcript.push(ChatMessage::bot(reply));
        drop(guard);

        Some(outcome)
    }

    /// Set the input and send it in one step.
    pub async fn submit(&self, text: impl Into<String>) -> Option<SendOutcome> {
        self.set_input(text);
        self.send_message().await
    }

    /// Route a UI event through the attached listeners.
    ///
    /// Events arriving after `dispose` are dropped.
    pub async fn dispatch(&self, event: WidgetEvent) -> Option<SendOutcome> {
        let bindings = self.inner.lock().bindings.clone();
        let bound = |b: Binding| bindings.contains(&b);

        match event {
            WidgetEvent::ToggleClicked if bound(Binding::Toggle) => {
                self.toggle();
                None
            }
            WidgetEvent::CloseClicked if bound(Binding::Close) => {
                self.toggle();
                None
            }
            WidgetEvent::SendClicked if bound(Binding::SendClick) => self.send_message().await,
            WidgetEvent::KeyPressed { key, shift }
                if key == "Enter" && !shift && bound(Binding::SendOnEnter) =>
            {
                self.send_message().await
            }
            WidgetEvent::InputChanged(text) if !bindings.is_empty() => {
                self.set_input(text);
                None
            }
            other => {
                tracing::trace!(event = ?other, "Unbound widget event ignored");
                None
            }
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn phase(&self) -> WidgetPhase {
        let state = self.inner.lock();
        match (state.is_open, state.is_loading) {
            (false, _) => WidgetPhase::Closed,
            (true, false) => WidgetPhase::OpenIdle,
            (true, true) => WidgetPhase::OpenSending,
        }
    }

    pub fn is_open(&self) -> bool {
        self.inner.lock().is_open
    }

    pub fn is_loading(&self) -> bool {
        self.inner.lock().is_loading
    }

    pub fn welcome_visible(&self) -> bool {
        self.inner.lock().welcome_visible
    }

    pub fn input(&self) -> String {
        self.inner.lock().input.clone()
    }

    pub fn transcript(&self) -> Vec<ChatMessage> {
        self.inner.lock().transcript.clone()
    }

    pub fn session_id(&self) -> String {
        self.inner.session.session_id()
    }

    pub fn snapshot(&self) -> WidgetSnapshot {
        self.inner.snapshot()
    }
}

impl Drop for ChatWidget {
    fn drop(&mut self) {
        for timer in self.inner.lock().timers.drain(..) {
            timer.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view::HeadlessView;
    use async_trait::async_trait;

    struct EchoEndpoint;

    #[async_trait]
    impl ConversationEndpoint for EchoEndpoint {
        async fn send(&self, _session_id: &str, chat_input: &str) -> SendOutcome {
            SendOutcome::Reply(format!("echo: {chat_input}"))
        }

        fn name(&self) -> &str {
            "echo"
        }
    }

    fn widget(config: WidgetConfig) -> (ChatWidget, Arc<HeadlessView>) {
        let view = Arc::new(HeadlessView::new());
        let widget = ChatWidget::new(
            config,
            Arc::new(MemoryStore::new()),
            StoreKeys::with_prefix("binkoo-"),
            Arc::new(EchoEndpoint),
            view.clone(),
        );
        (widget, view)
    }

    #[test]
    fn test_new_widget_starts_closed_with_greeting() {
        let (widget, _) = widget(WidgetConfig::default());

        assert_eq!(widget.phase(), WidgetPhase::Closed);
        assert!(!widget.is_loading());
        let transcript = widget.transcript();
        assert_eq!(transcript.len(), 1);
        assert!(!transcript[0].is_user());
    }

    #[test]
    fn test_empty_greeting_means_empty_transcript() {
        let config = WidgetConfig {
            greeting: String::new(),
            ..WidgetConfig::default()
        };
        let (widget, _) = widget(config);
        assert!(widget.transcript().is_empty());
    }

    #[tokio::test]
    async fn test_send_while_closed_is_ignored() {
        let (widget, _) = widget(WidgetConfig::default());
        widget.activate();

        assert_eq!(widget.submit("hello").await, None);
        assert_eq!(widget.transcript().len(), 1);
        // input is kept for when the window opens
        assert_eq!(widget.input(), "hello");
    }

    #[tokio::test]
    async fn test_send_trims_input_and_clears_it() {
        let (widget, view) = widget(WidgetConfig::default());
        widget.activate();
        widget.toggle();

        let outcome = widget.submit("  bonjour  ").await;

        assert_eq!(outcome, Some(SendOutcome::Reply("echo: bonjour".to_string())));
        let transcript = widget.transcript();
        assert_eq!(transcript[1], ChatMessage::user("bonjour"));
        assert_eq!(transcript[2], ChatMessage::bot("echo: bonjour"));
        assert!(widget.input().is_empty());
        assert_eq!(widget.phase(), WidgetPhase::OpenIdle);

        let rendered = view.last_render().unwrap();
        assert!(!rendered.is_loading);
        assert_eq!(rendered.transcript.len(), 3);
    }

    #[tokio::test]
    async fn test_touch_input_never_focuses() {
        let config = WidgetConfig {
            touch_input: true,
            focus_delay_ms: 0,
            ..WidgetConfig::default()
        };
        let (widget, view) = widget(config);
        widget.activate();
        widget.toggle();
        widget.submit("hi").await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(view.focus_count(), 0);
    }

    #[tokio::test]
    async fn test_activate_twice_is_noop() {
        let (widget, view) = widget(WidgetConfig::default());
        widget.activate();
        let renders = view.calls().len();

        widget.activate();
        assert_eq!(view.calls().len(), renders);
        assert!(widget.is_active());
    }

    #[tokio::test]
    async fn test_dispose_then_reactivate_rebinds() {
        let (widget, _) = widget(WidgetConfig::default());
        widget.activate();
        widget.dispose();
        assert!(!widget.is_active());

        widget.dispatch(WidgetEvent::ToggleClicked).await;
        assert!(!widget.is_open());

        widget.activate();
        widget.dispatch(WidgetEvent::ToggleClicked).await;
        assert!(widget.is_open());
    }
}
