use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::{
    layout::{Constraint, Direction, Layout},
    Frame,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::tui::{
    components::{
        status_bar::Activity, ChatView, Component, ConfirmDialog, Header, HelpPopup, InputBox,
        StatusBar,
    },
    Event, Theme,
};
use omnichat::{
    app::AppConfig,
    chat::{ChatService, ReplyEvent},
    platform::{Dictation, DictationEvent},
};

const CLEAR_PROMPT: &str = "Clear the chat history? (y/n)";
const DICTATION_UNSUPPORTED: &str = "Speech recognition is not supported in this terminal.";

pub struct App {
    // Components
    header: Header,
    chat_view: ChatView,
    input_box: InputBox,
    status_bar: StatusBar,
    help_popup: HelpPopup,
    confirm_clear: ConfirmDialog,

    // State
    theme: Theme,
    should_quit: bool,

    // Backend integration
    service: Arc<ChatService>,
    dictation: Dictation,
    event_sender: mpsc::UnboundedSender<Event>,
}

impl App {
    pub fn new(
        config: &AppConfig,
        service: Arc<ChatService>,
        event_sender: mpsc::UnboundedSender<Event>,
    ) -> Self {
        let persona = &config.persona;
        Self {
            header: Header::new(&persona.name, &persona.tagline),
            chat_view: ChatView::new(&persona.name, &persona.greeting),
            input_box: InputBox::new(&persona.placeholder, &persona.footer),
            status_bar: StatusBar::new(&service.config().model),
            help_popup: HelpPopup::new(),
            confirm_clear: ConfirmDialog::new(CLEAR_PROMPT),
            theme: Theme::from_name(&config.ui.theme),
            should_quit: false,
            service,
            dictation: Dictation::new(&config.dictation),
            event_sender,
        }
    }

    pub fn should_quit(&self) -> bool {
        self.should_quit
    }

    pub fn handle_event(&mut self, event: Event) {
        // Help popup takes priority, then the confirmation dialog
        if self.help_popup.handle_event(&event) {
            return;
        }
        if self.confirm_clear.handle_event(&event) {
            if let Some(confirmed) = self.confirm_clear.take_decision() {
                if confirmed {
                    self.clear_chat();
                } else {
                    self.status_bar.set_status("Ready");
                }
            }
            return;
        }

        match event {
            Event::Key(key) => self.handle_key(key),
            Event::Tick => self.chat_view.update(),
            Event::Resize(_, _) => {}
            Event::ReplyDelta { reply_id, delta } => {
                self.chat_view.state_mut().append_reply(&reply_id, &delta);
            }
            Event::ReplyFailed { reply_id, text } => {
                self.chat_view.state_mut().fail_reply(&reply_id, &text);
                self.status_bar.set_activity(Activity::Error("Request failed".to_string()));
            }
            Event::ReplyFinished { reply_id } => {
                self.chat_view.state_mut().finish_exchange();
                self.input_box.set_disabled(false);
                if self.status_bar.activity() == &Activity::Streaming {
                    self.status_bar.set_activity(self.idle_activity());
                }
                self.status_bar.set_status("Ready");
                debug!("Reply {} finished", reply_id);
            }
            Event::Transcript { session, text } => {
                if session == self.dictation.session() && self.dictation.is_listening() {
                    self.input_box.append_text(&text);
                }
            }
            Event::DictationEnded { session } => {
                if self.dictation.mark_ended(session) {
                    self.status_bar.set_activity(self.idle_activity());
                    self.status_bar.set_status("Stopped listening");
                }
            }
        }
    }

    fn handle_key(&mut self, key: KeyEvent) {
        if self.handle_global_keys(key) {
            return;
        }
        if self.chat_view.handle_event(&Event::Key(key)) {
            return;
        }

        // The composer is locked while a reply is loading
        if self.chat_view.state().is_loading() {
            return;
        }

        if self.input_box.handle_event(&Event::Key(key)) {
            return;
        }

        if key.code == KeyCode::Enter {
            self.submit_input();
        }
    }

    fn handle_global_keys(&mut self, key: KeyEvent) -> bool {
        match (key.code, key.modifiers) {
            (KeyCode::Char('c'), KeyModifiers::CONTROL)
            | (KeyCode::Char('q'), KeyModifiers::CONTROL) => {
                self.dictation.stop();
                self.should_quit = true;
                true
            }
            (KeyCode::F(1), _) => {
                self.help_popup.toggle();
                true
            }
            (KeyCode::Char('l'), KeyModifiers::CONTROL) => {
                self.confirm_clear.show();
                true
            }
            (KeyCode::F(2), _) => {
                self.toggle_dictation();
                true
            }
            _ => false,
        }
    }

    fn submit_input(&mut self) {
        let content = self.input_box.get_content();
        let Some(exchange) = self.chat_view.state_mut().begin_exchange(&content) else {
            return;
        };

        if self.dictation.is_listening() {
            self.dictation.stop();
        }

        self.input_box.clear();
        self.input_box.set_disabled(true);
        self.chat_view.scroll_to_bottom();
        self.status_bar.set_activity(Activity::Streaming);
        self.status_bar.set_status("Sending...");

        let service = Arc::clone(&self.service);
        let sender = self.event_sender.clone();
        tokio::spawn(async move {
            let reply_id = exchange.reply_id;
            service
                .run_exchange(&exchange.user_text, |event| {
                    let reply_id = reply_id.clone();
                    let event = match event {
                        ReplyEvent::Delta(delta) => Event::ReplyDelta { reply_id, delta },
                        ReplyEvent::Failed(text) => Event::ReplyFailed { reply_id, text },
                        ReplyEvent::Finished => Event::ReplyFinished { reply_id },
                    };
                    // The UI may already be gone on quit
                    let _ = sender.send(event);
                })
                .await;
        });
    }

    fn clear_chat(&mut self) {
        self.service.reset_session();
        self.chat_view.state_mut().clear();
        self.chat_view.scroll_to_bottom();
        self.input_box.clear();
        self.status_bar.set_status("Memory wiped");
        info!("Chat history cleared");
    }

    fn toggle_dictation(&mut self) {
        if self.dictation.is_listening() {
            self.dictation.stop();
            if self.status_bar.activity() == &Activity::Listening {
                self.status_bar.set_activity(Activity::Idle);
            }
            self.status_bar.set_status("Stopped listening");
            return;
        }

        if !self.dictation.is_supported() {
            self.status_bar.set_status(DICTATION_UNSUPPORTED);
            return;
        }

        let sender = self.event_sender.clone();
        let result = self.dictation.start(move |event| {
            let event = match event {
                DictationEvent::Transcript { session, text } => Event::Transcript { session, text },
                DictationEvent::Ended { session } => Event::DictationEnded { session },
            };
            let _ = sender.send(event);
        });

        match result {
            Ok(()) => {
                if self.status_bar.activity() != &Activity::Streaming {
                    self.status_bar.set_activity(Activity::Listening);
                }
                self.status_bar.set_status("Listening...");
            }
            Err(e) => {
                warn!("Could not start dictation: {}", e);
                self.status_bar.set_activity(Activity::Error("Dictation failed".to_string()));
                self.status_bar.set_status(e.to_string());
            }
        }
    }

    fn idle_activity(&self) -> Activity {
        if self.dictation.is_listening() {
            Activity::Listening
        } else {
            Activity::Idle
        }
    }

    pub fn render(&mut self, frame: &mut Frame) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(2),                               // Header
                Constraint::Min(3),                                  // Chat view
                Constraint::Length(self.input_box.desired_height()), // Input box
                Constraint::Length(2),                               // Status bar
            ])
            .split(frame.size());

        self.header.render(frame, chunks[0], &self.theme);
        self.chat_view.render(frame, chunks[1], &self.theme);
        self.input_box.render(frame, chunks[2], &self.theme);
        self.status_bar.render(frame, chunks[3], &self.theme);

        // Overlays last
        self.confirm_clear.render(frame, frame.size(), &self.theme);
        self.help_popup.render(frame, frame.size(), &self.theme);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use omnichat::chat::ChatServiceConfig;
    use omnichat::models::{ChatRequest, ChatResponse, ChatStream, ModelProvider};
    use omnichat::{Error, Result};

    struct OfflineProvider;

    #[async_trait]
    impl ModelProvider for OfflineProvider {
        async fn send_message(&self, _request: ChatRequest) -> Result<ChatResponse> {
            Err(Error::model_provider("offline"))
        }

        async fn stream_message(&self, _request: ChatRequest) -> Result<Box<dyn ChatStream>> {
            Err(Error::model_provider("offline"))
        }

        fn supports_streaming(&self) -> bool {
            true
        }

        fn get_provider_name(&self) -> &str {
            "offline"
        }
    }

    fn test_app() -> (App, mpsc::UnboundedReceiver<Event>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let service = Arc::new(ChatService::new(
            Arc::new(OfflineProvider),
            ChatServiceConfig::default(),
        ));
        (App::new(&AppConfig::default(), service, sender), receiver)
    }

    fn press(app: &mut App, code: KeyCode, modifiers: KeyModifiers) {
        app.handle_event(Event::Key(KeyEvent::new(code, modifiers)));
    }

    fn type_text(app: &mut App, text: &str) {
        for c in text.chars() {
            press(app, KeyCode::Char(c), KeyModifiers::NONE);
        }
    }

    fn reply_id(app: &App) -> String {
        app.chat_view.state().last().unwrap().id.clone()
    }

    #[tokio::test]
    async fn test_enter_sends_and_locks_input() {
        let (mut app, _receiver) = test_app();
        type_text(&mut app, "hi");
        press(&mut app, KeyCode::Enter, KeyModifiers::NONE);

        let state = app.chat_view.state();
        assert_eq!(state.messages().len(), 2);
        assert_eq!(state.messages()[0].text, "hi");
        assert!(state.is_loading());
        assert!(app.input_box.is_empty());

        // Typing is ignored while loading
        type_text(&mut app, "more");
        assert!(app.input_box.is_empty());
    }

    #[tokio::test]
    async fn test_blank_input_is_not_sent() {
        let (mut app, _receiver) = test_app();
        type_text(&mut app, "   ");
        press(&mut app, KeyCode::Enter, KeyModifiers::NONE);
        assert!(app.chat_view.state().is_empty());
    }

    #[tokio::test]
    async fn test_reply_events_update_the_placeholder() {
        let (mut app, _receiver) = test_app();
        type_text(&mut app, "hi");
        press(&mut app, KeyCode::Enter, KeyModifiers::NONE);
        let id = reply_id(&app);

        app.handle_event(Event::ReplyDelta { reply_id: id.clone(), delta: "Speak".to_string() });
        app.handle_event(Event::ReplyDelta { reply_id: id.clone(), delta: " up.".to_string() });
        app.handle_event(Event::ReplyFinished { reply_id: id });

        let state = app.chat_view.state();
        assert_eq!(state.last().unwrap().text, "Speak up.");
        assert!(!state.is_loading());
        assert_eq!(app.status_bar.status(), "Ready");
    }

    #[tokio::test]
    async fn test_failed_reply_is_flagged() {
        let (mut app, _receiver) = test_app();
        type_text(&mut app, "hi");
        press(&mut app, KeyCode::Enter, KeyModifiers::NONE);
        let id = reply_id(&app);

        app.handle_event(Event::ReplyDelta { reply_id: id.clone(), delta: "partial".to_string() });
        app.handle_event(Event::ReplyFailed { reply_id: id.clone(), text: "Broken.".to_string() });
        app.handle_event(Event::ReplyFinished { reply_id: id });

        let last = app.chat_view.state().last().unwrap();
        assert_eq!(last.text, "Broken.");
        assert!(last.is_error);
    }

    #[tokio::test]
    async fn test_offline_exchange_reports_error_reply() {
        let (mut app, mut receiver) = test_app();
        type_text(&mut app, "hi");
        press(&mut app, KeyCode::Enter, KeyModifiers::NONE);

        // Drain what the spawned exchange sent back
        while let Some(event) = receiver.recv().await {
            let finished = matches!(event, Event::ReplyFinished { .. });
            app.handle_event(event);
            if finished {
                break;
            }
        }

        let last = app.chat_view.state().last().unwrap();
        assert!(last.is_error);
        assert_eq!(last.text, omnichat::chat::DEFAULT_ERROR_REPLY);
        assert!(!app.chat_view.state().is_loading());
    }

    #[tokio::test]
    async fn test_clear_requires_confirmation() {
        let (mut app, _receiver) = test_app();
        type_text(&mut app, "hi");
        press(&mut app, KeyCode::Enter, KeyModifiers::NONE);
        let id = reply_id(&app);
        app.handle_event(Event::ReplyFinished { reply_id: id });
        type_text(&mut app, "draft");

        press(&mut app, KeyCode::Char('l'), KeyModifiers::CONTROL);
        press(&mut app, KeyCode::Char('n'), KeyModifiers::NONE);
        assert_eq!(app.chat_view.state().messages().len(), 2);
        assert_eq!(app.input_box.get_content(), "draft");

        press(&mut app, KeyCode::Char('l'), KeyModifiers::CONTROL);
        press(&mut app, KeyCode::Char('y'), KeyModifiers::NONE);
        assert!(app.chat_view.state().is_empty());
        assert!(app.input_box.is_empty());
        assert!(!app.service.has_session());
    }

    #[tokio::test]
    async fn test_dictation_unsupported_message() {
        let (mut app, _receiver) = test_app();
        press(&mut app, KeyCode::F(2), KeyModifiers::NONE);
        assert_eq!(app.status_bar.status(), DICTATION_UNSUPPORTED);
    }

    #[tokio::test]
    async fn test_stale_transcript_is_ignored() {
        let (mut app, _receiver) = test_app();
        app.handle_event(Event::Transcript { session: 7, text: "ghost".to_string() });
        assert!(app.input_box.is_empty());
    }

    #[tokio::test]
    async fn test_quit_keys() {
        let (mut app, _receiver) = test_app();
        press(&mut app, KeyCode::Char('q'), KeyModifiers::CONTROL);
        assert!(app.should_quit());
    }
}
