//! Chat: the in-memory message store and the sync task that keeps it fresh.
//!
//! The store is an id-deduplicated message list per conversation plus a
//! pending-send index. Sends are optimistic: the message shows up
//! immediately as pending, then is either resolved to the server-assigned
//! [`Message`] or removed (with the composed text handed back to the caller
//! so the input field can be restored).
//!
//! [`MessageSyncTask`] keeps the store in sync with the backend. While a
//! WebSocket subscription is alive, pushed events are applied directly; when
//! there is no socket (or it closes), the task falls back to polling
//! `GET /student/messages` every 3 seconds with an after-id cursor. Poll
//! failures are logged and retried on the next tick, with no backoff.

use std::{
    collections::{btree_map::Entry, BTreeMap},
    sync::Arc,
    time::Duration,
};

use anyhow::Context;
use prepd_api::ws::{WsEvent, WsEvents};
use prepd_api_core::{
    def::StudentChatApi,
    error::BackendApiError,
    models::{GetNewMessages, SendMessageRequest},
    types::{
        chat::{
            Message, MessageId, MessageKind, MessageRequest, MessageRequestId,
        },
        user::UserId,
    },
};
use prepd_std::iter::IteratorExt;
use prepd_tokio::notify_once::NotifyOnce;
use tracing::{debug, info, warn};

/// How often the fallback poll runs when there is no socket.
pub const POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Only fetch at most this many messages per request.
const MESSAGE_BATCH_LIMIT: u16 = 50;

/// The in-memory chat state for one signed-in user.
pub struct MessageStore {
    state: std::sync::Mutex<StoreState>,
}

struct StoreState {
    /// All synced messages, keyed (and therefore sorted) by id.
    messages: BTreeMap<MessageId, Message>,
    /// Optimistic sends not yet acknowledged by the server.
    pending: BTreeMap<u64, PendingSend>,
    /// Pending message requests pushed over the socket or synced via REST.
    requests: BTreeMap<MessageRequestId, MessageRequest>,
    next_client_id: u64,
}

/// An optimistic send awaiting server acknowledgement.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PendingSend {
    /// Client-assigned id, only meaningful on this device.
    pub client_id: u64,
    pub receiver: UserId,
    pub content: String,
}

/// One row of a conversation view: either a server-acknowledged message or
/// an optimistic pending send.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ChatEntry {
    Confirmed(Message),
    Pending(PendingSend),
}

/// A failed optimistic send. Carries the composed text back to the caller so
/// the input field can be restored.
#[derive(Debug)]
pub struct SendFailure {
    pub content: String,
    pub error: BackendApiError,
}

impl MessageStore {
    pub fn new() -> Self {
        Self {
            state: std::sync::Mutex::new(StoreState {
                messages: BTreeMap::new(),
                pending: BTreeMap::new(),
                requests: BTreeMap::new(),
                next_client_id: 1,
            }),
        }
    }

    /// Insert a batch of messages synced from the backend. A message whose
    /// id is already present is skipped: appending a duplicate is a no-op.
    pub fn insert_new_messages(&self, new_messages: Vec<Message>) {
        let mut state = self.state.lock().unwrap();
        for message in new_messages {
            match state.messages.entry(message.id) {
                Entry::Vacant(e) => {
                    e.insert(message);
                }
                Entry::Occupied(_) => {
                    debug!(id = %message.id, "skipping duplicate message");
                }
            }
        }
    }

    /// The newest message id we've synced, used as the poll cursor.
    pub fn latest_message_id(&self) -> Option<MessageId> {
        self.state
            .lock()
            .unwrap()
            .messages
            .last_key_value()
            .map(|(id, _message)| *id)
    }

    pub fn contains(&self, id: MessageId) -> bool {
        self.state.lock().unwrap().messages.contains_key(&id)
    }

    /// Record a pushed message request. Duplicates are no-ops.
    pub fn insert_message_request(&self, request: MessageRequest) {
        let mut state = self.state.lock().unwrap();
        state.requests.entry(request.id).or_insert(request);
    }

    pub fn message_requests(&self) -> Vec<MessageRequest> {
        self.state.lock().unwrap().requests.values().cloned().collect()
    }

    pub fn remove_message_request(&self, id: MessageRequestId) {
        self.state.lock().unwrap().requests.remove(&id);
    }

    /// The conversation with `peer`: confirmed messages in id order,
    /// followed by this device's pending sends to that peer.
    pub fn conversation(&self, me: UserId, peer: UserId) -> Vec<ChatEntry> {
        let state = self.state.lock().unwrap();
        let confirmed = state.messages.values().filter(|m| {
            (m.sender == peer && m.receiver == me)
                || (m.sender == me && m.receiver == peer)
        });
        let pending = state.pending.values().filter(|p| p.receiver == peer);
        confirmed
            .cloned()
            .map(ChatEntry::Confirmed)
            .chain(pending.cloned().map(ChatEntry::Pending))
            .collect()
    }

    // --- Optimistic send plumbing --- //

    fn insert_pending(&self, receiver: UserId, content: String) -> u64 {
        let mut state = self.state.lock().unwrap();
        let client_id = state.next_client_id;
        state.next_client_id += 1;
        state.pending.insert(
            client_id,
            PendingSend {
                client_id,
                receiver,
                content,
            },
        );
        client_id
    }

    /// Resolve a pending send to its server-acknowledged message.
    fn resolve_pending(&self, client_id: u64, message: Message) {
        let mut state = self.state.lock().unwrap();
        let was_pending = state.pending.remove(&client_id).is_some();
        debug_assert!(was_pending, "resolved a send that wasn't pending");
        state.messages.entry(message.id).or_insert(message);
    }

    /// Drop a failed pending send, returning the composed text.
    fn remove_pending(&self, client_id: u64) -> Option<String> {
        let mut state = self.state.lock().unwrap();
        state.pending.remove(&client_id).map(|p| p.content)
    }
}

impl Default for MessageStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Optimistically send a chat message.
///
/// The message is visible as a [`ChatEntry::Pending`] for the duration of
/// the request. On success it becomes [`ChatEntry::Confirmed`] with the
/// server-assigned id; on failure the pending entry is removed and the
/// composed text is returned inside the [`SendFailure`].
pub async fn send_message<A: StudentChatApi>(
    store: &MessageStore,
    api: &A,
    receiver: UserId,
    content: String,
) -> Result<Message, SendFailure> {
    let client_id = store.insert_pending(receiver, content);

    let req = {
        let state = store.state.lock().unwrap();
        SendMessageRequest {
            receiver,
            kind: MessageKind::Text,
            content: state.pending[&client_id].content.clone(),
        }
    };

    match api.send_message(req).await {
        Ok(message) => {
            store.resolve_pending(client_id, message.clone());
            Ok(message)
        }
        Err(error) => {
            let content = store
                .remove_pending(client_id)
                .expect("pending send vanished");
            Err(SendFailure { content, error })
        }
    }
}

/// Keeps a [`MessageStore`] in sync with the backend for one conversation.
pub struct MessageSyncTask<A> {
    api: Arc<A>,
    store: Arc<MessageStore>,
    peer: UserId,
    /// A live socket subscription, if we have one.
    ws_events: Option<WsEvents>,
    shutdown: NotifyOnce,
}

impl<A: StudentChatApi> MessageSyncTask<A> {
    pub fn new(
        api: Arc<A>,
        store: Arc<MessageStore>,
        peer: UserId,
        ws_events: Option<WsEvents>,
        shutdown: NotifyOnce,
    ) -> Self {
        Self {
            api,
            store,
            peer,
            ws_events,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        // Initial catch-up sync, so a fresh screen isn't stale for a full
        // poll interval even when the socket is healthy.
        self.poll_once().await;

        loop {
            match self.ws_events.as_mut() {
                Some(events) => {
                    let event = tokio::select! {
                        () = self.shutdown.recv() => break,
                        event = events.recv() => event,
                    };
                    match event {
                        Some(WsEvent::Message(message)) =>
                            self.store.insert_new_messages(vec![message]),
                        Some(WsEvent::MessageRequest(request)) =>
                            self.store.insert_message_request(request),
                        Some(WsEvent::Closed) | None => {
                            info!(
                                "chat socket closed; falling back to polling"
                            );
                            self.ws_events = None;
                        }
                    }
                }
                None => {
                    let mut interval = tokio::time::interval(POLL_INTERVAL);
                    // consume the immediate first tick
                    interval.tick().await;
                    loop {
                        tokio::select! {
                            () = self.shutdown.recv() => return,
                            _ = interval.tick() => (),
                        }
                        self.poll_once().await;
                    }
                }
            }
        }
    }

    async fn poll_once(&self) {
        if let Err(err) =
            sync_new_messages(&self.api, &self.store, self.peer).await
        {
            // No backoff: the next tick just tries again.
            warn!("chat poll failed: {err:#}");
        }
    }
}

/// Fetch any messages newer than our cursor, in batches, until exhausted.
async fn sync_new_messages<A: StudentChatApi>(
    api: &A,
    store: &MessageStore,
    peer: UserId,
) -> anyhow::Result<()> {
    let mut latest_message_id = store.latest_message_id();

    loop {
        // Remember, the cursor is _exclusive_. The message w/ this id will
        // _NOT_ be included in the response.
        let req = GetNewMessages {
            peer,
            after: latest_message_id,
            limit: Some(MESSAGE_BATCH_LIMIT),
        };
        let resp = api
            .get_new_messages(req)
            .await
            .context("Failed to fetch new messages")?;
        let batch = resp.messages;

        // Sanity check response.
        anyhow::ensure!(
            batch.len() <= usize::from(MESSAGE_BATCH_LIMIT),
            "Server returned too many messages",
        );
        anyhow::ensure!(
            batch.iter().is_strict_total_order_by_key(|m| m.id),
            "Server response is not sorted or contains duplicates",
        );

        // Update the cursor.
        match batch.last() {
            Some(message) => {
                anyhow::ensure!(
                    latest_message_id < Some(message.id),
                    "Server gave us older messages?",
                );
                latest_message_id = Some(message.id);
            }
            // No more messages; we are done syncing.
            None => break,
        }

        let batch_len = batch.len();
        store.insert_new_messages(batch);

        // A short batch means there is nothing more after it.
        if batch_len < usize::from(MESSAGE_BATCH_LIMIT) {
            break;
        }
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use std::sync::{
        atomic::{AtomicBool, Ordering},
        Mutex,
    };

    use prepd_api_core::{
        error::BackendErrorKind,
        models::{MessageRequestAction, VecMessage, VecMessageRequest},
        types::{time::TimestampMs, Empty},
    };
    use tokio::sync::mpsc;

    use super::*;

    const ME: UserId = UserId(1);
    const PEER: UserId = UserId(2);

    fn message(id: i64, sender: UserId, receiver: UserId) -> Message {
        Message {
            id: MessageId(id),
            kind: MessageKind::Text,
            content: format!("msg {id}"),
            read: false,
            sender,
            receiver,
            sent_at: TimestampMs::MIN,
        }
    }

    /// Serves a fixed message log, paged by the after-id cursor.
    struct MockChatApi {
        log: Mutex<Vec<Message>>,
        fail_sends: AtomicBool,
    }

    impl MockChatApi {
        fn new(log: Vec<Message>) -> Self {
            Self {
                log: Mutex::new(log),
                fail_sends: AtomicBool::new(false),
            }
        }
    }

    impl StudentChatApi for MockChatApi {
        async fn get_new_messages(
            &self,
            req: GetNewMessages,
        ) -> Result<VecMessage, BackendApiError> {
            let limit = usize::from(req.limit.unwrap_or(MESSAGE_BATCH_LIMIT));
            let messages = self
                .log
                .lock()
                .unwrap()
                .iter()
                .filter(|m| Some(m.id) > req.after)
                .take(limit)
                .cloned()
                .collect();
            Ok(VecMessage { messages })
        }

        async fn send_message(
            &self,
            req: SendMessageRequest,
        ) -> Result<Message, BackendApiError> {
            if self.fail_sends.load(Ordering::SeqCst) {
                return Err(BackendApiError {
                    kind: BackendErrorKind::Connect,
                    msg: "injected".to_owned(),
                });
            }
            let mut log = self.log.lock().unwrap();
            let id = log.last().map(|m| m.id.0 + 1).unwrap_or(1);
            let mut msg = message(id, ME, req.receiver);
            msg.content = req.content;
            log.push(msg.clone());
            Ok(msg)
        }

        async fn list_message_requests(
            &self,
        ) -> Result<VecMessageRequest, BackendApiError> {
            unimplemented!()
        }

        async fn accept_message_request(
            &self,
            _req: MessageRequestAction,
        ) -> Result<Empty, BackendApiError> {
            unimplemented!()
        }

        async fn reject_message_request(
            &self,
            _req: MessageRequestAction,
        ) -> Result<Empty, BackendApiError> {
            unimplemented!()
        }
    }

    #[test]
    fn duplicate_insert_is_noop() {
        let store = MessageStore::new();
        let mut original = message(7, PEER, ME);
        original.content = "original".to_owned();
        store.insert_new_messages(vec![original.clone()]);

        let mut duplicate = original.clone();
        duplicate.content = "duplicate".to_owned();
        store.insert_new_messages(vec![duplicate]);

        let convo = store.conversation(ME, PEER);
        assert_eq!(convo, vec![ChatEntry::Confirmed(original)]);
    }

    #[tokio::test]
    async fn optimistic_send_success() {
        let api = MockChatApi::new(vec![]);
        let store = MessageStore::new();

        let sent = send_message(&store, &api, PEER, "hi!".to_owned())
            .await
            .unwrap();
        assert_eq!(sent.content, "hi!");

        // Resolved: exactly one confirmed entry, nothing pending.
        let convo = store.conversation(ME, PEER);
        assert_eq!(convo, vec![ChatEntry::Confirmed(sent)]);
    }

    #[tokio::test]
    async fn optimistic_send_failure_restores_input() {
        let api = MockChatApi::new(vec![]);
        api.fail_sends.store(true, Ordering::SeqCst);
        let store = MessageStore::new();

        let failure = send_message(&store, &api, PEER, "hi!".to_owned())
            .await
            .unwrap_err();
        assert_eq!(failure.content, "hi!");
        assert_eq!(failure.error.kind, BackendErrorKind::Connect);

        // The pending entry is gone.
        assert_eq!(store.conversation(ME, PEER), vec![]);
    }

    #[tokio::test]
    async fn sync_pages_through_batches() {
        // 120 messages => three pages (50 + 50 + 20).
        let log =
            (1..=120).map(|id| message(id, PEER, ME)).collect::<Vec<_>>();
        let api = MockChatApi::new(log);
        let store = MessageStore::new();

        sync_new_messages(&api, &store, PEER).await.unwrap();
        assert_eq!(store.conversation(ME, PEER).len(), 120);
        assert_eq!(store.latest_message_id(), Some(MessageId(120)));

        // A second sync from the cursor is a no-op.
        sync_new_messages(&api, &store, PEER).await.unwrap();
        assert_eq!(store.conversation(ME, PEER).len(), 120);
    }

    #[tokio::test(start_paused = true)]
    async fn ws_push_then_fallback_to_polling() {
        let api = Arc::new(MockChatApi::new(vec![message(1, PEER, ME)]));
        let store = Arc::new(MessageStore::new());
        let shutdown = NotifyOnce::new();

        let (event_tx, event_rx) = mpsc::channel(8);
        let task = MessageSyncTask::new(
            api.clone(),
            store.clone(),
            PEER,
            Some(WsEvents::from(event_rx)),
            shutdown.clone(),
        );
        let task = prepd_tokio::task::PdTask::spawn("chat_sync", task.run());

        // The initial catch-up sync picked up the existing message.
        tokio::task::yield_now().await;
        assert!(store.contains(MessageId(1)));

        // Push one message over the "socket", then close it.
        event_tx
            .send(WsEvent::Message(message(2, PEER, ME)))
            .await
            .unwrap();
        event_tx.send(WsEvent::Closed).await.unwrap();
        drop(event_tx);

        // New messages now arrive via polling.
        api.log.lock().unwrap().push(message(3, PEER, ME));
        tokio::time::sleep(POLL_INTERVAL + Duration::from_millis(100)).await;

        assert!(store.contains(MessageId(2)));
        assert!(store.contains(MessageId(3)));

        shutdown.send();
        task.await.unwrap();
    }
}
