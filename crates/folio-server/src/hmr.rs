//! Live-update context shared by the watcher and socket handlers.
//!
//! Tracks connected clients, the module dependency graph and the last
//! timestamp broadcast for every module id.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::protocol::ServerMessage;

/// Identifier assigned to a connected client.
pub type ClientId = u64;

/// Raised when connecting to a context that has been closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Live-update channel is closed")]
pub struct ChannelClosed;

/// A registered client: its id and the stream of serialized frames.
#[derive(Debug)]
pub struct Subscription {
    pub id: ClientId,
    pub receiver: mpsc::UnboundedReceiver<String>,
}

#[derive(Default)]
struct State {
    clients: HashMap<ClientId, mpsc::UnboundedSender<String>>,
    /// module -> modules that import it
    dependents: HashMap<String, HashSet<String>>,
    last_update: HashMap<String, u64>,
    next_id: ClientId,
    clock: u64,
    closed: bool,
}

/// Broadcast hub for live-update events.
#[derive(Default)]
pub struct LiveUpdateContext {
    state: Mutex<State>,
}

impl LiveUpdateContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new client.
    pub fn connect(&self) -> Result<Subscription, ChannelClosed> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(ChannelClosed);
        }

        let id = state.next_id;
        state.next_id += 1;

        let (tx, receiver) = mpsc::unbounded_channel();
        state.clients.insert(id, tx);
        tracing::debug!("Client {} connected ({} total)", id, state.clients.len());

        Ok(Subscription { id, receiver })
    }

    /// Remove a client. Returns whether it was registered.
    pub fn disconnect(&self, id: ClientId) -> bool {
        let removed = self.state.lock().clients.remove(&id).is_some();
        if removed {
            tracing::debug!("Client {} disconnected", id);
        }
        removed
    }

    pub fn client_count(&self) -> usize {
        self.state.lock().clients.len()
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Send a message to every connected client.
    ///
    /// Clients whose channel has gone away are dropped. Returns the number
    /// of clients the message was delivered to.
    pub fn broadcast(&self, message: &ServerMessage) -> usize {
        let json = match serde_json::to_string(message) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!("Failed to serialize live-update message: {}", e);
                return 0;
            }
        };

        let mut state = self.state.lock();
        if state.closed {
            return 0;
        }

        let timestamp = message.timestamp();
        for subject in message.subjects() {
            state.last_update.insert(subject.to_string(), timestamp);
        }

        let mut failed = Vec::new();
        for (id, tx) in &state.clients {
            if tx.send(json.clone()).is_err() {
                failed.push(*id);
            }
        }
        for id in &failed {
            state.clients.remove(id);
        }

        state.clients.len()
    }

    /// Record that `module` imports `depends_on`.
    pub fn register_dependency(&self, module: impl Into<String>, depends_on: impl Into<String>) {
        self.state
            .lock()
            .dependents
            .entry(depends_on.into())
            .or_default()
            .insert(module.into());
    }

    /// Every module that transitively depends on `module`, excluding itself.
    pub fn collect_dependents(&self, module: &str) -> BTreeSet<String> {
        let state = self.state.lock();
        let mut found = BTreeSet::new();
        let mut visited: HashSet<&str> = HashSet::from([module]);
        let mut queue: VecDeque<&str> = VecDeque::from([module]);

        while let Some(current) = queue.pop_front() {
            let Some(dependents) = state.dependents.get(current) else {
                continue;
            };
            for dependent in dependents {
                if visited.insert(dependent.as_str()) {
                    found.insert(dependent.clone());
                    queue.push_back(dependent.as_str());
                }
            }
        }

        found
    }

    /// Next timestamp for `module`: milliseconds since the epoch, strictly
    /// greater than anything issued before.
    pub fn next_timestamp(&self, module: &str) -> u64 {
        let mut state = self.state.lock();
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();
        let floor = state.last_update.get(module).copied().unwrap_or(0);
        let next = now.max(state.clock + 1).max(floor + 1);
        state.clock = next;
        next
    }

    /// Timestamp of the last update broadcast for `module`.
    pub fn last_update(&self, module: &str) -> Option<u64> {
        self.state.lock().last_update.get(module).copied()
    }

    /// Announce a new version of `module` and of everything depending on it.
    ///
    /// Returns the module ids that were announced, `module` first.
    pub fn notify_update(&self, module: &str) -> Vec<String> {
        let mut announced = vec![module.to_string()];
        announced.extend(self.collect_dependents(module));

        for path in &announced {
            let timestamp = self.next_timestamp(path);
            self.broadcast(&ServerMessage::Update {
                path: path.clone(),
                timestamp,
            });
        }

        announced
    }

    /// Ask clients to swap the given stylesheets in place.
    pub fn style_update(&self, paths: Vec<String>) -> usize {
        if paths.is_empty() {
            return 0;
        }
        let timestamp = self.next_timestamp("");
        self.broadcast(&ServerMessage::StyleUpdate { paths, timestamp })
    }

    /// Ask clients to reload the page.
    pub fn reload(&self) -> usize {
        let timestamp = self.next_timestamp("");
        self.broadcast(&ServerMessage::Reload { timestamp })
    }

    /// Report a processing failure to clients.
    pub fn error(&self, message: impl Into<String>) -> usize {
        let timestamp = self.next_timestamp("");
        self.broadcast(&ServerMessage::Error {
            message: message.into(),
            timestamp,
        })
    }

    /// Close the context and drop every client channel. Idempotent.
    pub fn close(&self) {
        let mut state = self.state.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        let count = state.clients.len();
        state.clients.clear();
        tracing::debug!("Live-update channel closed ({} clients dropped)", count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn recv(sub: &mut Subscription) -> Option<ServerMessage> {
        sub.receiver
            .try_recv()
            .ok()
            .map(|json| serde_json::from_str(&json).unwrap())
    }

    #[test]
    fn broadcasts_to_every_client() {
        let ctx = LiveUpdateContext::new();
        let mut a = ctx.connect().unwrap();
        let mut b = ctx.connect().unwrap();

        let delivered = ctx.reload();

        assert_eq!(delivered, 2);
        assert!(matches!(recv(&mut a), Some(ServerMessage::Reload { .. })));
        assert!(matches!(recv(&mut b), Some(ServerMessage::Reload { .. })));
    }

    #[test]
    fn disconnected_clients_receive_nothing() {
        let ctx = LiveUpdateContext::new();
        let mut a = ctx.connect().unwrap();
        let b = ctx.connect().unwrap();

        assert!(ctx.disconnect(a.id));
        ctx.reload();

        assert!(recv(&mut a).is_none());
        assert_eq!(ctx.client_count(), 1);
        drop(b);
    }

    #[test]
    fn drops_clients_with_closed_channels() {
        let ctx = LiveUpdateContext::new();
        let a = ctx.connect().unwrap();
        let _b = ctx.connect().unwrap();
        drop(a);

        let delivered = ctx.reload();

        assert_eq!(delivered, 1);
        assert_eq!(ctx.client_count(), 1);
    }

    #[test]
    fn collects_transitive_dependents() {
        let ctx = LiveUpdateContext::new();
        ctx.register_dependency("/blog", "/layout.css");
        ctx.register_dependency("/blog/post1", "/blog");
        ctx.register_dependency("/about", "/other");
        // cycle back to the root must not loop
        ctx.register_dependency("/layout.css", "/blog/post1");

        let dependents = ctx.collect_dependents("/layout.css");

        assert_eq!(
            dependents.into_iter().collect::<Vec<_>>(),
            vec!["/blog".to_string(), "/blog/post1".to_string()]
        );
        assert!(ctx.collect_dependents("/nothing").is_empty());
    }

    #[test]
    fn notify_update_reaches_dependents() {
        let ctx = LiveUpdateContext::new();
        ctx.register_dependency("/page", "/partial");
        let mut client = ctx.connect().unwrap();

        let announced = ctx.notify_update("/partial");

        assert_eq!(announced, vec!["/partial".to_string(), "/page".to_string()]);
        let first = recv(&mut client).unwrap();
        let second = recv(&mut client).unwrap();
        assert!(matches!(first, ServerMessage::Update { ref path, .. } if path == "/partial"));
        assert!(matches!(second, ServerMessage::Update { ref path, .. } if path == "/page"));
        assert!(ctx.last_update("/page").is_some());
    }

    #[test]
    fn timestamps_strictly_increase() {
        let ctx = LiveUpdateContext::new();

        let mut last = 0;
        for _ in 0..100 {
            let ts = ctx.next_timestamp("/a");
            assert!(ts > last);
            last = ts;
        }
    }

    #[test]
    fn records_last_update_per_module() {
        let ctx = LiveUpdateContext::new();

        ctx.notify_update("/a");
        let first = ctx.last_update("/a").unwrap();
        ctx.notify_update("/a");

        assert!(ctx.last_update("/a").unwrap() > first);
        assert_eq!(ctx.last_update("/b"), None);
    }

    #[test]
    fn style_update_carries_paths() {
        let ctx = LiveUpdateContext::new();
        let mut client = ctx.connect().unwrap();

        ctx.style_update(vec!["/styles/site.css".into()]);

        match recv(&mut client) {
            Some(ServerMessage::StyleUpdate { paths, .. }) => {
                assert_eq!(paths, vec!["/styles/site.css".to_string()])
            }
            other => panic!("unexpected message: {:?}", other),
        }
        assert_eq!(ctx.style_update(Vec::new()), 0);
    }

    #[test]
    fn close_is_idempotent_and_refuses_new_clients() {
        let ctx = LiveUpdateContext::new();
        let mut client = ctx.connect().unwrap();

        ctx.close();
        ctx.close();

        assert!(ctx.is_closed());
        assert_eq!(ctx.connect().unwrap_err(), ChannelClosed);
        assert_eq!(ctx.reload(), 0);
        // sender dropped, so the stream ends
        assert!(matches!(
            client.receiver.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
    }
}
