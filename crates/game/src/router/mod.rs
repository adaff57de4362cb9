use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};

use serde_json::json;

use crate::net::{Envelope, MessageKind, SystemMessagePayload};

pub type Handler = Box<dyn FnMut(&Envelope) -> anyhow::Result<()> + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Kind(MessageKind),
    Wildcard,
}

impl From<MessageKind> for Topic {
    fn from(kind: MessageKind) -> Self {
        Self::Kind(kind)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    pub failed: usize,
}

struct Subscriber {
    id: SubscriptionId,
    handler: Handler,
}

#[derive(Default)]
pub struct Router {
    topics: HashMap<Topic, Vec<Subscriber>>,
    next_id: u64,
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let counts: HashMap<_, _> = self.topics.iter().map(|(t, s)| (*t, s.len())).collect();
        f.debug_struct("Router").field("topics", &counts).finish()
    }
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&mut self, topic: impl Into<Topic>, handler: F) -> SubscriptionId
    where
        F: FnMut(&Envelope) -> anyhow::Result<()> + Send + 'static,
    {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.topics.entry(topic.into()).or_default().push(Subscriber {
            id,
            handler: Box::new(handler),
        });
        id
    }

    pub fn unsubscribe(&mut self, topic: impl Into<Topic>, id: Option<SubscriptionId>) -> usize {
        let topic = topic.into();
        let Some(subscribers) = self.topics.get_mut(&topic) else {
            return 0;
        };

        let before = subscribers.len();
        match id {
            Some(id) => subscribers.retain(|s| s.id != id),
            None => subscribers.clear(),
        }
        let removed = before - subscribers.len();

        if subscribers.is_empty() {
            self.topics.remove(&topic);
        }
        removed
    }

    pub fn subscriber_count(&self, topic: impl Into<Topic>) -> usize {
        self.topics.get(&topic.into()).map_or(0, Vec::len)
    }

    /// Delivers to `peer_joined` subscribers first when the envelope is a
    /// relay join notice, then to the envelope's own kind, then to wildcard
    /// subscribers.
    pub fn dispatch(&mut self, envelope: &Envelope) -> DispatchReport {
        let mut report = DispatchReport::default();

        if let Some(joined) = peer_joined_notice(envelope) {
            self.deliver(Topic::Kind(MessageKind::PeerJoined), &joined, &mut report);
        }
        self.deliver(Topic::Kind(envelope.kind), envelope, &mut report);
        self.deliver(Topic::Wildcard, envelope, &mut report);

        if report.delivered == 0 && report.failed == 0 {
            log::trace!("No subscribers for {}", envelope.kind);
        }
        report
    }

    fn deliver(&mut self, topic: Topic, envelope: &Envelope, report: &mut DispatchReport) {
        let Some(subscribers) = self.topics.get_mut(&topic) else {
            return;
        };

        for subscriber in subscribers.iter_mut() {
            match catch_unwind(AssertUnwindSafe(|| (subscriber.handler)(envelope))) {
                Ok(Ok(())) => report.delivered += 1,
                Ok(Err(e)) => {
                    report.failed += 1;
                    log::error!("Handler for {:?} failed on {}: {:#}", topic, envelope.kind, e);
                }
                Err(_) => {
                    report.failed += 1;
                    log::error!("Handler for {:?} panicked on {}", topic, envelope.kind);
                }
            }
        }
    }
}

fn peer_joined_notice(envelope: &Envelope) -> Option<Envelope> {
    if envelope.kind != MessageKind::SystemMessage {
        return None;
    }
    let payload: SystemMessagePayload = envelope.payload_as().ok()?;
    if !payload.is_peer_joined() {
        return None;
    }

    let mut data = json!({ "message": payload.message });
    if let Some(role) = payload.mentioned_role() {
        data["role"] = json!(role);
    }

    let mut joined = Envelope::local(MessageKind::PeerJoined, data);
    joined.sender_role = envelope.sender_role;
    joined.sent_at_millis = envelope.sent_at_millis;
    Some(joined)
}
