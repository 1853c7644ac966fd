use crate::retry::MsgRetryCounterCache;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use wabot_core::types::jid::Jid;

/// In-flight on-demand history requests: request id -> chat.
#[derive(Debug, Default)]
pub struct OnDemandRequests {
    pending: DashMap<String, Jid>,
}

impl OnDemandRequests {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, request_id: impl Into<String>, chat: Jid) {
        self.pending.insert(request_id.into(), chat);
    }

    /// Removes and returns the chat a request was made for.
    pub fn complete(&self, request_id: &str) -> Option<Jid> {
        self.pending.remove(request_id).map(|(_, chat)| chat)
    }

    pub fn contains(&self, request_id: &str) -> bool {
        self.pending.contains_key(request_id)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// State that outlives every session: created once at startup, dropped at exit.
#[derive(Clone, Default)]
pub struct ProcessState {
    pub retry_counts: MsgRetryCounterCache,
    pub on_demand: Arc<OnDemandRequests>,
}

impl ProcessState {
    pub fn new(retry_ttl: Option<Duration>) -> Self {
        Self {
            retry_counts: MsgRetryCounterCache::new(retry_ttl),
            on_demand: Arc::new(OnDemandRequests::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn on_demand_requests_complete_once() {
        let requests = OnDemandRequests::new();
        let chat = Jid::user("15551234567");
        requests.insert("REQ1", chat.clone());
        assert!(requests.contains("REQ1"));
        assert_eq!(requests.complete("REQ1"), Some(chat));
        assert_eq!(requests.complete("REQ1"), None);
        assert!(requests.is_empty());
    }
}
