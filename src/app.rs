use ratatui::widgets::ListState;
use tokio::sync::mpsc::UnboundedSender;

use crate::api::{ApiClient, ChatRequest, MemoryHit};
use crate::config::Config;
use crate::model::{ChatModel, CollectionKey};
use crate::playback::{Phase, Playback};
use crate::session::{SelectedTriple, SessionCache, SessionStore};
use crate::stream::StreamEvent;
use crate::tui::AppEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Chat,
    Memories,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Picker {
    User,
    Dog,
    Conversation,
    Model,
    Collection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MemoriesFocus {
    #[default]
    Results,
    Preview,
}

#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    User,
    Assistant,
    Error,
}

pub struct App {
    // Core state
    pub should_quit: bool,
    pub screen: Screen,
    pub input_mode: InputMode,

    // Chat state
    pub query_input: String,
    pub query_cursor: usize, // cursor position in query_input
    pub messages: Vec<ChatMessage>,
    pub loading: bool,
    pub playback: Playback,
    pub chat_scroll: u16,
    pub chat_height: u16, // Height of chat area for scroll calculations
    pub chat_width: u16,  // Width of chat area for wrap calculations
    placeholder_idx: Option<usize>,

    // Memories state
    pub mem_query_input: String,
    pub mem_collection: CollectionKey,
    pub mem_results: Vec<MemoryHit>,
    pub mem_state: ListState,
    pub mem_focus: MemoriesFocus,

    // Identity triple: all three must be bound before a chat request is valid
    pub user_id: Option<String>,
    pub dog_id: Option<String>,
    pub conversation_id: Option<String>,

    // Picker overlay state
    pub picker: Option<Picker>,
    pub picker_items: Vec<String>,
    pub picker_state: ListState,

    // Transient hint shown in the footer
    pub status_line: Option<String>,

    // Animation state
    pub animation_frame: u8, // 0-2 for ellipsis animation

    // Session cache + injected store
    pub cache: SessionCache,
    store: Box<dyn SessionStore>,

    // Backend
    pub api: ApiClient,
    pub model: ChatModel,
    pub assistant_id: String,
    pub limit: u32,
    pub backend_status: Option<String>,

    events_tx: UnboundedSender<AppEvent>,
}

impl App {
    pub fn new(
        config: &Config,
        api: ApiClient,
        store: Box<dyn SessionStore>,
        events_tx: UnboundedSender<AppEvent>,
    ) -> anyhow::Result<Self> {
        let cache = store.load().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "could not load session cache, starting empty");
            SessionCache::default()
        });

        let model = config
            .default_model
            .as_deref()
            .and_then(ChatModel::from_str)
            .unwrap_or(ChatModel::ChatGpt);

        let (user_id, dog_id, conversation_id) = match &cache.last_selected {
            Some(triple) => (
                Some(triple.user_id.clone()),
                Some(triple.dog_id.clone()),
                Some(triple.conversation_id.clone()),
            ),
            None => (None, None, None),
        };

        Ok(Self {
            should_quit: false,
            screen: Screen::Chat,
            input_mode: InputMode::Editing,

            query_input: String::new(),
            query_cursor: 0,
            messages: Vec::new(),
            loading: false,
            playback: Playback::new(),
            chat_scroll: 0,
            chat_height: 0,
            chat_width: 0,
            placeholder_idx: None,

            mem_query_input: String::new(),
            mem_collection: CollectionKey::User,
            mem_results: Vec::new(),
            mem_state: ListState::default(),
            mem_focus: MemoriesFocus::default(),

            user_id,
            dog_id,
            conversation_id,

            picker: None,
            picker_items: Vec::new(),
            picker_state: ListState::default(),

            status_line: None,
            animation_frame: 0,

            cache,
            store,

            api,
            model,
            assistant_id: config.assistant_id(),
            limit: config.limit(),
            backend_status: None,

            events_tx,
        })
    }

    // ---- identity triple ----

    pub fn triple(&self) -> Option<SelectedTriple> {
        Some(SelectedTriple {
            user_id: self.user_id.clone()?,
            dog_id: self.dog_id.clone()?,
            conversation_id: self.conversation_id.clone()?,
        })
    }

    /// Admission control: one request at a time, and only with every subject
    /// identifier bound and a non-empty query.
    pub fn can_submit(&self) -> bool {
        !self.loading && !self.query_input.trim().is_empty() && self.triple().is_some()
    }

    /// Why submit is currently disabled, for the footer hint.
    pub fn submit_blocker(&self) -> Option<&'static str> {
        if self.loading {
            Some("waiting for the current answer")
        } else if self.user_id.is_none() {
            Some("no user selected (press U)")
        } else if self.dog_id.is_none() {
            Some("no dog selected (press D)")
        } else if self.conversation_id.is_none() {
            Some("no conversation selected (press C)")
        } else if self.query_input.trim().is_empty() {
            Some("type a question first")
        } else {
            None
        }
    }

    // ---- chat submission and stream consumption ----

    /// Append the user message and an empty assistant placeholder, then open
    /// the stream. No-op (and no transcript mutation) when preconditions are
    /// unmet.
    pub fn submit_query(&mut self) {
        let Some(triple) = self.triple() else {
            return;
        };
        if !self.can_submit() {
            return;
        }

        let query = self.query_input.trim().to_string();
        self.query_input.clear();
        self.query_cursor = 0;

        self.messages.push(ChatMessage {
            role: ChatRole::User,
            content: query.clone(),
        });
        self.messages.push(ChatMessage {
            role: ChatRole::Assistant,
            content: String::new(),
        });
        self.placeholder_idx = Some(self.messages.len() - 1);

        self.loading = true;
        self.playback.begin();
        self.scroll_chat_to_bottom();

        let request = ChatRequest {
            query,
            user_id: triple.user_id,
            dog_id: triple.dog_id,
            conversation_id: triple.conversation_id,
            assistant_id: self.assistant_id.clone(),
            limit: self.limit,
            model: self.model.as_str().to_string(),
        };

        let api = self.api.clone();
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            api.chat(request, move |event| {
                let _ = tx.send(AppEvent::Stream(event));
            })
            .await;
        });
    }

    pub fn apply_stream_event(&mut self, event: StreamEvent) {
        match event {
            StreamEvent::Delta(chunk) => {
                self.playback.push_chunk(&chunk);
            }
            StreamEvent::Complete(answer) => {
                self.playback.preload(&answer);
            }
            StreamEvent::Done { full_answer } => {
                self.playback.finish(full_answer.as_deref());
            }
            StreamEvent::Failed(message) => {
                self.playback.fail();
                self.discard_placeholder();
                self.messages.push(ChatMessage {
                    role: ChatRole::Error,
                    content: message,
                });
                self.loading = false;
                self.playback.reset();
                self.scroll_chat_to_bottom();
            }
        }
    }

    /// One event-loop tick: advance the spinner and the reveal cycle, and
    /// observe completion. Completion is checked here, not at frame arrival,
    /// so a done frame racing a pending tick is never skipped.
    pub fn on_tick(&mut self) {
        if self.loading {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }

        if self.playback.tick() {
            let revealed = self.playback.revealed().to_string();
            self.set_placeholder(revealed);
            self.scroll_chat_to_bottom();
        }

        if self.playback.phase() == Phase::Done {
            let full = self.playback.full_text().to_string();
            self.set_placeholder(full);
            self.placeholder_idx = None;
            self.loading = false;
            self.playback.reset();
        }
    }

    fn set_placeholder(&mut self, content: String) {
        if let Some(idx) = self.placeholder_idx {
            if let Some(msg) = self.messages.get_mut(idx) {
                msg.content = content;
            }
        }
    }

    fn discard_placeholder(&mut self) {
        if let Some(idx) = self.placeholder_idx.take() {
            if idx < self.messages.len() {
                self.messages.remove(idx);
            }
        }
    }

    // ---- pickers ----

    pub fn open_picker(&mut self, picker: Picker) {
        let (items, current) = match picker {
            Picker::User => (self.cache.users.clone(), self.user_id.clone()),
            Picker::Dog => (self.cache.dogs.clone(), self.dog_id.clone()),
            Picker::Conversation => (
                self.cache
                    .conversations
                    .iter()
                    .map(|c| c.id.clone())
                    .collect(),
                self.conversation_id.clone(),
            ),
            Picker::Model => (
                ChatModel::all().iter().map(|m| m.as_str().to_string()).collect(),
                Some(self.model.as_str().to_string()),
            ),
            Picker::Collection => (
                CollectionKey::all()
                    .iter()
                    .map(|k| k.as_str().to_string())
                    .collect(),
                Some(self.mem_collection.as_str().to_string()),
            ),
        };

        if items.is_empty() {
            self.status_line = Some("nothing to pick yet - press R to refresh lists".to_string());
            return;
        }

        let selected = current
            .and_then(|c| items.iter().position(|i| *i == c))
            .unwrap_or(0);
        self.picker_items = items;
        self.picker_state.select(Some(selected));
        self.picker = Some(picker);
    }

    pub fn picker_nav_down(&mut self) {
        let len = self.picker_items.len();
        if len > 0 {
            let i = self.picker_state.selected().unwrap_or(0);
            self.picker_state.select(Some((i + 1).min(len - 1)));
        }
    }

    pub fn picker_nav_up(&mut self) {
        let i = self.picker_state.selected().unwrap_or(0);
        self.picker_state.select(Some(i.saturating_sub(1)));
    }

    pub fn close_picker(&mut self) {
        self.picker = None;
        self.picker_items.clear();
        self.picker_state.select(None);
    }

    /// Apply the highlighted picker entry.
    pub fn confirm_picker(&mut self) {
        let Some(picker) = self.picker else {
            return;
        };
        let Some(choice) = self
            .picker_state
            .selected()
            .and_then(|i| self.picker_items.get(i).cloned())
        else {
            return;
        };

        match picker {
            Picker::User => {
                self.user_id = Some(choice);
                // The conversation belongs to a (user, dog) pair.
                self.conversation_id = None;
            }
            Picker::Dog => {
                self.dog_id = Some(choice);
                self.conversation_id = None;
            }
            Picker::Conversation => {
                self.conversation_id = Some(choice);
            }
            Picker::Model => {
                if let Some(model) = ChatModel::from_str(&choice) {
                    self.model = model;
                    if let Err(e) = Config::save_default_model(model.as_str()) {
                        tracing::warn!(error = %e, "could not persist default model");
                    }
                }
            }
            Picker::Collection => {
                if let Some(key) = CollectionKey::all()
                    .into_iter()
                    .find(|k| k.as_str() == choice)
                {
                    self.mem_collection = key;
                }
            }
        }
        self.close_picker();
    }

    // ---- backend list refresh ----

    pub async fn refresh_entity_lists(&mut self) {
        match self.api.list_users().await {
            Ok(users) => self.cache.merge_users(&users),
            Err(e) => {
                tracing::warn!(error = %e, "user list refresh failed");
                self.status_line = Some(format!("user refresh failed: {}", e));
            }
        }
        match self.api.list_dogs().await {
            Ok(dogs) => self.cache.merge_dogs(&dogs),
            Err(e) => {
                tracing::warn!(error = %e, "dog list refresh failed");
                self.status_line = Some(format!("dog refresh failed: {}", e));
            }
        }
        if let (Some(user_id), Some(dog_id)) = (self.user_id.clone(), self.dog_id.clone()) {
            match self.api.list_conversations(&user_id, &dog_id).await {
                Ok(convs) => self.cache.merge_conversations(&convs),
                Err(e) => {
                    tracing::warn!(error = %e, "conversation list refresh failed");
                }
            }
        }
        match self.api.health().await {
            Ok(status) => self.backend_status = Some(status),
            Err(_) => self.backend_status = Some("unreachable".to_string()),
        }
    }

    // ---- memories screen ----

    /// The (user_id, assistant_id) pair each collection is indexed by. The
    /// dog collection keys its subject under user_id, and the relationship
    /// and conversation collections pair the user with the dog.
    pub fn search_scope(&self) -> Option<(String, String)> {
        let user = self.user_id.clone()?;
        let dog = self.dog_id.clone()?;
        Some(match self.mem_collection {
            CollectionKey::User => (user, self.assistant_id.clone()),
            CollectionKey::Dog => (dog, self.assistant_id.clone()),
            CollectionKey::Relationship => (user, dog),
            CollectionKey::Conversation => (user, dog),
        })
    }

    pub async fn perform_memory_search(&mut self) {
        if self.mem_query_input.trim().is_empty() {
            return;
        }
        let Some((scope_user, scope_assistant)) = self.search_scope() else {
            self.status_line = Some("select a user and dog first (U / D)".to_string());
            return;
        };
        let query = self.mem_query_input.trim().to_string();
        match self
            .api
            .search_memory(self.mem_collection, &query, &scope_user, &scope_assistant, 20)
            .await
        {
            Ok(hits) => {
                self.mem_results = hits;
                if self.mem_results.is_empty() {
                    self.mem_state.select(None);
                } else {
                    self.mem_state.select(Some(0));
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "memory search failed");
                self.status_line = Some(format!("search failed: {}", e));
            }
        }
    }

    pub fn mem_nav_down(&mut self) {
        let len = self.mem_results.len();
        if len > 0 {
            let i = self.mem_state.selected().unwrap_or(0);
            self.mem_state.select(Some((i + 1).min(len - 1)));
        }
    }

    pub fn mem_nav_up(&mut self) {
        let i = self.mem_state.selected().unwrap_or(0);
        self.mem_state.select(Some(i.saturating_sub(1)));
    }

    pub fn selected_memory(&self) -> Option<&MemoryHit> {
        self.mem_state.selected().and_then(|i| self.mem_results.get(i))
    }

    // ---- scrolling ----

    pub fn scroll_chat_to_bottom(&mut self) {
        let wrap_width = if self.chat_width > 0 {
            self.chat_width as usize
        } else {
            50
        };

        // Accumulated in usize; a long session overflows u16 line counts.
        let mut total_lines: usize = 0;
        for msg in &self.messages {
            total_lines += 1; // Role line
            for line in msg.content.lines() {
                // Character count, not byte length, for proper UTF-8 handling
                let char_count = line.chars().count();
                if char_count == 0 {
                    total_lines += 1;
                } else {
                    total_lines += (char_count / wrap_width) + 1;
                }
            }
            total_lines += 1; // Blank line after message
        }

        if self.loading {
            total_lines += 2; // "Dog:" + "Thinking..."
        }

        let visible_height = if self.chat_height > 0 {
            self.chat_height as usize
        } else {
            20
        };

        if total_lines > visible_height {
            self.chat_scroll = (total_lines - visible_height).min(u16::MAX as usize) as u16;
        }
    }

    // ---- shutdown ----

    /// Persist the session cache and last selection. Called once on quit.
    pub fn save_session(&mut self) {
        self.cache.last_selected = self.triple();
        if let Err(e) = self.store.save(&self.cache) {
            tracing::warn!(error = %e, "could not save session cache");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use std::cell::RefCell;
    use tokio::sync::mpsc;

    struct NullStore {
        saved: RefCell<Option<SessionCache>>,
    }

    impl SessionStore for NullStore {
        fn load(&self) -> Result<SessionCache> {
            Ok(SessionCache::default())
        }
        fn save(&self, cache: &SessionCache) -> Result<()> {
            *self.saved.borrow_mut() = Some(cache.clone());
            Ok(())
        }
    }

    fn test_app() -> (App, mpsc::UnboundedReceiver<AppEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let app = App::new(
            &Config::new(),
            ApiClient::new("http://localhost:8000"),
            Box::new(NullStore {
                saved: RefCell::new(None),
            }),
            tx,
        )
        .unwrap();
        (app, rx)
    }

    fn bind_triple(app: &mut App) {
        app.user_id = Some("user_001".to_string());
        app.dog_id = Some("dog_001".to_string());
        app.conversation_id = Some("conv_001".to_string());
    }

    fn drain_playback(app: &mut App) {
        for _ in 0..10_000 {
            app.on_tick();
            if !app.loading {
                return;
            }
        }
        panic!("playback did not finish");
    }

    #[tokio::test]
    async fn test_submit_without_conversation_mutates_nothing() {
        let (mut app, mut rx) = test_app();
        app.user_id = Some("user_001".to_string());
        app.dog_id = Some("dog_001".to_string());
        app.query_input = "hello".to_string();

        app.submit_query();

        assert!(app.messages.is_empty());
        assert!(!app.loading);
        assert_eq!(app.query_input, "hello");
        // No spawned request means no stream events.
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_stream_flow_reveals_full_answer() {
        let (mut app, _rx) = test_app();
        bind_triple(&mut app);
        app.query_input = "hi there".to_string();
        app.submit_query();

        assert_eq!(app.messages.len(), 2);
        assert_eq!(app.messages[0].role, ChatRole::User);
        assert_eq!(app.messages[1].role, ChatRole::Assistant);
        assert!(app.loading);

        app.apply_stream_event(StreamEvent::Delta("He".to_string()));
        app.apply_stream_event(StreamEvent::Delta("llo".to_string()));
        app.apply_stream_event(StreamEvent::Done { full_answer: None });
        drain_playback(&mut app);

        assert_eq!(app.messages[1].content, "Hello");
        assert!(!app.playback.is_active());
        assert!(!app.loading);
    }

    #[tokio::test]
    async fn test_error_discards_placeholder_and_appends_error() {
        let (mut app, _rx) = test_app();
        bind_triple(&mut app);
        app.query_input = "hi".to_string();
        app.submit_query();

        app.apply_stream_event(StreamEvent::Delta("partial".to_string()));
        app.on_tick();
        app.apply_stream_event(StreamEvent::Failed("backend down".to_string()));

        let roles: Vec<ChatRole> = app.messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![ChatRole::User, ChatRole::Error]);
        assert_eq!(app.messages[1].content, "backend down");
        assert!(!app.loading);

        // A later tick must not resurrect anything.
        app.on_tick();
        assert_eq!(app.messages.len(), 2);
    }

    #[tokio::test]
    async fn test_fallback_body_reveals_exactly_answer() {
        let (mut app, _rx) = test_app();
        bind_triple(&mut app);
        app.query_input = "hi".to_string();
        app.submit_query();

        app.apply_stream_event(StreamEvent::Complete("Hi".to_string()));
        drain_playback(&mut app);

        assert_eq!(app.messages[1].content, "Hi");
        assert!(!app.playback.is_active());
    }

    #[tokio::test]
    async fn test_second_submit_blocked_while_loading() {
        let (mut app, _rx) = test_app();
        bind_triple(&mut app);
        app.query_input = "first".to_string();
        app.submit_query();
        assert_eq!(app.messages.len(), 2);

        app.query_input = "second".to_string();
        assert!(!app.can_submit());
        app.submit_query();
        assert_eq!(app.messages.len(), 2);
    }

    #[tokio::test]
    async fn test_changing_user_unbinds_conversation() {
        let (mut app, _rx) = test_app();
        bind_triple(&mut app);
        app.cache.merge_users(&["user_002".to_string()]);
        app.open_picker(Picker::User);
        app.confirm_picker();
        assert_eq!(app.user_id.as_deref(), Some("user_002"));
        assert!(app.conversation_id.is_none());
        assert!(!app.can_submit());
    }

    #[tokio::test]
    async fn test_submit_blocker_explains_every_disabled_state() {
        let (mut app, _rx) = test_app();
        assert_eq!(app.submit_blocker(), Some("no user selected (press U)"));
        bind_triple(&mut app);
        // Triple bound but nothing typed: still disabled, still explained.
        assert!(!app.can_submit());
        assert_eq!(app.submit_blocker(), Some("type a question first"));
        app.query_input = "hi".to_string();
        assert!(app.can_submit());
        assert_eq!(app.submit_blocker(), None);
    }

    #[tokio::test]
    async fn test_scroll_survives_very_long_transcripts() {
        let (mut app, _rx) = test_app();
        app.chat_width = 10;
        app.chat_height = 5;
        app.messages.push(ChatMessage {
            role: ChatRole::Assistant,
            content: "a\n".repeat(70_000),
        });
        app.scroll_chat_to_bottom();
        assert_eq!(app.chat_scroll, u16::MAX);
    }

    #[tokio::test]
    async fn test_search_scope_follows_collection_convention() {
        let (mut app, _rx) = test_app();
        bind_triple(&mut app);

        app.mem_collection = CollectionKey::User;
        assert_eq!(
            app.search_scope(),
            Some(("user_001".to_string(), "assistant_001".to_string()))
        );
        app.mem_collection = CollectionKey::Dog;
        assert_eq!(
            app.search_scope(),
            Some(("dog_001".to_string(), "assistant_001".to_string()))
        );
        app.mem_collection = CollectionKey::Relationship;
        assert_eq!(
            app.search_scope(),
            Some(("user_001".to_string(), "dog_001".to_string()))
        );
    }
}
