use crossterm::event::{self, Event as CrosstermEvent, KeyEvent, KeyEventKind};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::time::timeout;

#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    /// Terminal tick event
    Tick,
    /// Key press event
    Key(KeyEvent),
    /// Terminal resize event
    Resize(u16, u16),
    /// Streamed reply text for the placeholder `reply_id`
    ReplyDelta { reply_id: String, delta: String },
    ReplyFailed { reply_id: String, text: String },
    ReplyFinished { reply_id: String },
    /// Dictation output
    Transcript { session: u64, text: String },
    DictationEnded { session: u64 },
}

pub struct EventHandler {
    sender: mpsc::UnboundedSender<Event>,
    receiver: mpsc::UnboundedReceiver<Event>,
    last_tick: Instant,
    tick_rate: Duration,
}

impl EventHandler {
    pub fn new(tick_rate: Duration) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender,
            receiver,
            last_tick: Instant::now(),
            tick_rate,
        }
    }

    pub fn sender(&self) -> mpsc::UnboundedSender<Event> {
        self.sender.clone()
    }

    /// Next application or terminal event, or `None` if nothing happened yet.
    pub async fn next(&mut self) -> std::io::Result<Option<Event>> {
        // Application events (stream deltas, transcripts) first
        if let Ok(event) = timeout(Duration::from_millis(10), self.receiver.recv()).await {
            return Ok(event);
        }

        if event::poll(Duration::from_millis(0))? {
            match event::read()? {
                // Windows reports releases too
                CrosstermEvent::Key(key) if key.kind != KeyEventKind::Release => {
                    return Ok(Some(Event::Key(key)));
                }
                CrosstermEvent::Resize(w, h) => return Ok(Some(Event::Resize(w, h))),
                _ => {}
            }
        }

        if self.last_tick.elapsed() >= self.tick_rate {
            self.last_tick = Instant::now();
            return Ok(Some(Event::Tick));
        }

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_application_events_are_delivered() {
        let mut handler = EventHandler::new(Duration::from_secs(3600));
        handler
            .sender()
            .send(Event::ReplyFinished { reply_id: "r1".to_string() })
            .unwrap();

        let event = handler.next().await.unwrap();
        assert_eq!(event, Some(Event::ReplyFinished { reply_id: "r1".to_string() }));
    }
}
