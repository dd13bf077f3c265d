/// A message as seen by the dispatch loop. `content_type`/`subject`/
/// `address`/`body` are the attributes the core reads; senders set
/// `content_type`/`subject`/`body` when constructing an outbound
/// message, leaving `address` to the broker (the queue/topic a
/// received message arrived from, or nothing for one not yet sent).
#[derive(Debug, Clone)]
pub struct Message {
    pub content_type: String,
    pub subject: Option<String>,
    pub address: Option<String>,
    pub body: Vec<u8>,
    /// Opaque delivery tag the broker implementation needs to
    /// ack/reject/release this specific delivery. `None` for a message
    /// that was constructed locally to be sent, not received.
    pub(crate) delivery_tag: Option<u64>,
}

impl Message {
    /// Construct an outbound message.
    pub fn new(content_type: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            content_type: content_type.into(),
            subject: None,
            address: None,
            body,
            delivery_tag: None,
        }
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn length(&self) -> usize {
        self.body.len()
    }
}
