//! The message broker abstraction the dispatch loop consumes from, and
//! an AMQP 0.9.1-backed implementation.

pub mod message;

use std::sync::{Arc, Mutex};

use lapin::options::{BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, BasicRejectOptions};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, Consumer};

pub use message::Message;
use twine_core::error::{Result, TwineError};

/// What the dispatch loop needs from a message broker: receive-side
/// (`next`/`ack`/`reject`/`release`) and send-side (`send`/`deliver`)
/// operations, plus a way to read the last I/O error's text.
///
/// Every operation here is blocking by design: no asynchronous
/// suspension is allowed within a processor, so concrete
/// implementations backed by an async client own their own runtime
/// internally rather than exposing one to callers.
pub trait Broker: Send + Sync {
    fn next(&self) -> Result<Option<Message>>;
    fn ack(&self, msg: &Message) -> Result<()>;
    /// Reject the message outright; the broker does not redeliver it
    /// (the AMQP mapping is `basic.reject` with `requeue = false`).
    fn reject(&self, msg: &Message) -> Result<()>;
    /// Hand the message back to the broker for redelivery ("pass");
    /// `basic.reject` with `requeue = true`.
    fn release(&self, msg: &Message) -> Result<()>;
    fn send(&self, msg: &Message) -> Result<()>;
    /// Flush any outbound messages queued by `send`. A no-op for
    /// brokers that publish synchronously.
    fn deliver(&self) -> Result<()>;
    fn error_text(&self) -> Option<String>;
}

/// AMQP 0.9.1 broker backed by `lapin`. Owns a dedicated single-
/// threaded Tokio runtime so `next`/`ack`/`reject`/`send` can present a
/// blocking API to the dispatch loop, which itself runs no async
/// runtime of its own.
pub struct AmqpBroker {
    runtime: tokio::runtime::Runtime,
    channel: Channel,
    recv_queue: Option<String>,
    send_queue: Option<String>,
    // Lazily established on the first `next()` call and kept open for the
    // broker's lifetime: re-issuing `basic_consume` on every call would
    // either accumulate consumers under the same tag or collide on it.
    consumer: Mutex<Option<Consumer>>,
    last_error: Mutex<Option<String>>,
}

impl AmqpBroker {
    fn connect(uri: &str) -> Result<(tokio::runtime::Runtime, Channel)> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| TwineError::Transient(format!("broker runtime init: {e}")))?;
        let channel = runtime.block_on(async {
            let connection = Connection::connect(uri, ConnectionProperties::default())
                .await
                .map_err(|e| TwineError::Transient(format!("AMQP connect: {e}")))?;
            connection
                .create_channel()
                .await
                .map_err(|e| TwineError::Transient(format!("AMQP channel: {e}")))
        })?;
        Ok((runtime, channel))
    }

    pub fn connect_recv(uri: &str, queue: &str) -> Result<Self> {
        let (runtime, channel) = Self::connect(uri)?;
        runtime
            .block_on(channel.queue_declare(queue, Default::default(), FieldTable::default()))
            .map_err(|e| TwineError::Transient(format!("AMQP queue declare: {e}")))?;
        Ok(Self {
            runtime,
            channel,
            recv_queue: Some(queue.to_string()),
            send_queue: None,
            consumer: Mutex::new(None),
            last_error: Mutex::new(None),
        })
    }

    pub fn connect_send(uri: &str, queue: &str) -> Result<Self> {
        let (runtime, channel) = Self::connect(uri)?;
        Ok(Self {
            runtime,
            channel,
            recv_queue: None,
            send_queue: Some(queue.to_string()),
            consumer: Mutex::new(None),
            last_error: Mutex::new(None),
        })
    }

    fn note_error(&self, text: String) {
        *self.last_error.lock().expect("last_error lock poisoned") = Some(text);
    }
}

impl Broker for AmqpBroker {
    fn next(&self) -> Result<Option<Message>> {
        let queue = self
            .recv_queue
            .as_deref()
            .ok_or_else(|| TwineError::ProtocolViolation("broker not opened for receiving".into()))?;
        let mut guard = self.consumer.lock().expect("consumer lock poisoned");
        // Bounded by a short timeout rather than blocking indefinitely, so
        // the dispatch loop's shutdown flag (checked between `next()`
        // calls) is re-observed even with no messages in flight, instead
        // of relying on signal delivery to interrupt the read.
        let result = self.runtime.block_on(async {
            if guard.is_none() {
                let consumer = self
                    .channel
                    .basic_consume(queue, "twine", BasicConsumeOptions::default(), FieldTable::default())
                    .await?;
                *guard = Some(consumer);
            }
            use futures_lite::StreamExt;
            match tokio::time::timeout(std::time::Duration::from_secs(2), guard.as_mut().expect("just populated above").next()).await {
                Ok(next) => next.transpose(),
                Err(_elapsed) => Ok(None),
            }
        });
        match result {
            Ok(Some(delivery)) => {
                let content_type = delivery
                    .properties
                    .content_type()
                    .as_ref()
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "application/octet-stream".to_string());
                let subject = delivery.properties.correlation_id().as_ref().map(|s| s.to_string());
                Ok(Some(Message {
                    content_type,
                    subject,
                    address: Some(queue.to_string()),
                    body: delivery.data.clone(),
                    delivery_tag: Some(delivery.delivery_tag),
                }))
            }
            Ok(None) => Ok(None),
            Err(e) => {
                self.note_error(e.to_string());
                Err(TwineError::Transient(format!("AMQP receive error: {e}")))
            }
        }
    }

    fn ack(&self, msg: &Message) -> Result<()> {
        let tag = msg
            .delivery_tag
            .ok_or_else(|| TwineError::ProtocolViolation("message has no delivery tag to ack".into()))?;
        self.runtime
            .block_on(self.channel.basic_ack(tag, BasicAckOptions::default()))
            .map_err(|e| TwineError::Transient(format!("AMQP ack: {e}")))
    }

    fn reject(&self, msg: &Message) -> Result<()> {
        let tag = msg
            .delivery_tag
            .ok_or_else(|| TwineError::ProtocolViolation("message has no delivery tag to reject".into()))?;
        self.runtime
            .block_on(self.channel.basic_reject(tag, BasicRejectOptions { requeue: false }))
            .map_err(|e| TwineError::Transient(format!("AMQP reject: {e}")))
    }

    fn release(&self, msg: &Message) -> Result<()> {
        let tag = msg
            .delivery_tag
            .ok_or_else(|| TwineError::ProtocolViolation("message has no delivery tag to release".into()))?;
        self.runtime
            .block_on(self.channel.basic_reject(tag, BasicRejectOptions { requeue: true }))
            .map_err(|e| TwineError::Transient(format!("AMQP release: {e}")))
    }

    fn send(&self, msg: &Message) -> Result<()> {
        let queue = self
            .send_queue
            .as_deref()
            .ok_or_else(|| TwineError::ProtocolViolation("broker not opened for sending".into()))?;
        let mut properties = BasicProperties::default().with_content_type(msg.content_type.clone().into());
        if let Some(subject) = &msg.subject {
            properties = properties.with_correlation_id(subject.clone().into());
        }
        self.runtime
            .block_on(self.channel.basic_publish(
                "",
                queue,
                BasicPublishOptions::default(),
                &msg.body,
                properties,
            ))
            .map_err(|e| TwineError::Transient(format!("AMQP publish: {e}")))?;
        Ok(())
    }

    fn deliver(&self) -> Result<()> {
        Ok(())
    }

    fn error_text(&self) -> Option<String> {
        self.last_error.lock().expect("last_error lock poisoned").clone()
    }
}

/// An in-process broker for tests: `send` pushes onto a shared queue,
/// `next` pops from it. No network, no acknowledgement tracking beyond
/// what the test itself wants to assert.
#[derive(Default)]
pub struct ChannelBroker {
    queue: Arc<Mutex<std::collections::VecDeque<Message>>>,
    acked: Arc<Mutex<Vec<String>>>,
    rejected: Arc<Mutex<Vec<String>>>,
    released: Arc<Mutex<Vec<String>>>,
}

impl ChannelBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, msg: Message) {
        self.queue.lock().expect("queue lock poisoned").push_back(msg);
    }

    pub fn acked(&self) -> Vec<String> {
        self.acked.lock().expect("acked lock poisoned").clone()
    }

    pub fn rejected(&self) -> Vec<String> {
        self.rejected.lock().expect("rejected lock poisoned").clone()
    }

    pub fn released(&self) -> Vec<String> {
        self.released.lock().expect("released lock poisoned").clone()
    }

    fn tag_of(msg: &Message) -> String {
        msg.subject.clone().unwrap_or_else(|| String::from_utf8_lossy(&msg.body).to_string())
    }
}

impl Broker for ChannelBroker {
    fn next(&self) -> Result<Option<Message>> {
        Ok(self.queue.lock().expect("queue lock poisoned").pop_front())
    }

    fn ack(&self, msg: &Message) -> Result<()> {
        self.acked.lock().expect("acked lock poisoned").push(Self::tag_of(msg));
        Ok(())
    }

    fn reject(&self, msg: &Message) -> Result<()> {
        self.rejected.lock().expect("rejected lock poisoned").push(Self::tag_of(msg));
        Ok(())
    }

    fn release(&self, msg: &Message) -> Result<()> {
        self.released.lock().expect("released lock poisoned").push(Self::tag_of(msg));
        self.queue.lock().expect("queue lock poisoned").push_front(msg.clone());
        Ok(())
    }

    fn send(&self, msg: &Message) -> Result<()> {
        self.push(msg.clone());
        Ok(())
    }

    fn deliver(&self) -> Result<()> {
        Ok(())
    }

    fn error_text(&self) -> Option<String> {
        None
    }
}
