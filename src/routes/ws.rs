use std::{collections::HashMap, sync::Arc};

use axum::{
    extract::{ws::{Message as WsMsg, WebSocket, WebSocketUpgrade}, Extension},
    response::IntoResponse,
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::{
    sync::{broadcast::error::RecvError, mpsc},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{
    error::SessionErr,
    session::{ChatIn, Session, Target},
    state::{Hub, Message},
    store::RoomStore,
};

/* ---------------- wire events ---------------- */
#[derive(Debug, Deserialize)]
#[serde(tag = "event", content = "data")]
enum ClientEvent {
    #[serde(rename = "set username")]
    SetUsername(Option<String>),
    #[serde(rename = "join room")]
    JoinRoom(Target),
    #[serde(rename = "chat message")]
    ChatMessage(ChatIn),
}

#[derive(Debug, Serialize)]
#[serde(tag = "event", content = "data")]
enum ServerEvent {
    #[serde(rename = "chat history")]
    History(Vec<Message>),
    #[serde(rename = "chat message")]
    Chat(Message),
    #[serde(rename = "error")]
    Error { reason: String },
}

type Out = mpsc::UnboundedSender<ServerEvent>;

pub fn router() -> Router {
    Router::new().route("/ws", get(ws_handler))
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Extension(store): Extension<Arc<RoomStore>>,
    Extension(hub): Extension<Hub>,
) -> impl IntoResponse {
    ws.on_upgrade(move |s| user_ws(s, store, hub))
}

/* ---------------- per connection ---------------- */
async fn user_ws(sock: WebSocket, store: Arc<RoomStore>, hub: Hub) {
    let (mut sink, mut stream) = sock.split();
    let (out, mut out_rx) = mpsc::unbounded_channel::<ServerEvent>();

    let writer = tokio::spawn(async move {
        while let Some(ev) = out_rx.recv().await {
            let Ok(txt) = serde_json::to_string(&ev) else { continue };
            if sink.send(WsMsg::Text(txt)).await.is_err() { break; }
        }
    });

    let mut conn = Conn::new(store, hub, out);
    info!(conn = %conn.session.id, "user connected");

    while let Some(Ok(frame)) = stream.next().await {
        let raw = match frame {
            WsMsg::Text(t)  => t,
            WsMsg::Close(_) => break,
            _               => continue,
        };
        match serde_json::from_str::<ClientEvent>(&raw) {
            Ok(ev) => conn.on_event(ev).await,
            Err(e) => debug!(conn = %conn.session.id, error = %e, "ignoring unreadable frame"),
        }
    }

    conn.close().await;
    writer.abort();
}

struct Conn {
    session: Session,
    store:   Arc<RoomStore>,
    hub:     Hub,
    out:     Out,
    feeds:   HashMap<String, JoinHandle<()>>,   // room → hub forwarder
}

impl Conn {
    fn new(store: Arc<RoomStore>, hub: Hub, out: Out) -> Self {
        Self { session: Session::new(), store, hub, out, feeds: HashMap::new() }
    }

    fn user(&self) -> &str { self.session.username().unwrap_or("Unknown") }

    async fn on_event(&mut self, ev: ClientEvent) {
        match ev {
            ClientEvent::SetUsername(name) => {
                let name = self.session.set_username(name.as_deref()).to_owned();
                info!(conn = %self.session.id, user = %name, "username set");
            }
            ClientEvent::JoinRoom(target) => {
                match self.session.join(&self.store, &target).await {
                    Ok(j) => {
                        if !self.feeds.contains_key(&j.room) {
                            let rx = self.hub.subscribe(&j.room).await;
                            let feed = forward(rx, self.out.clone(), self.session.id);
                            self.feeds.insert(j.room.clone(), feed);
                        }
                        info!(conn = %self.session.id, user = %self.user(), peer = %j.peer, room = %j.room, "joined room");
                        let _ = self.out.send(ServerEvent::History(j.history));
                    }
                    Err(e) => self.reject("join room", e),
                }
            }
            ClientEvent::ChatMessage(input) => {
                match self.session.send(&self.store, &self.hub, &input).await {
                    Ok((msg, reached)) => {
                        debug!(conn = %self.session.id, room = %msg.room_id, reached, "message relayed");
                    }
                    Err(e) => self.reject("chat message", e),
                }
            }
        }
    }

    /// The request is dropped; the client gets told why.
    fn reject(&self, event: &str, e: SessionErr) {
        debug!(conn = %self.session.id, user = %self.user(), event, error = %e, "request dropped");
        let _ = self.out.send(ServerEvent::Error { reason: e.to_string() });
    }

    async fn close(self) {
        for (room, feed) in self.feeds {
            feed.abort();
            let _ = feed.await;
            self.hub.prune(&room).await;
        }
        let rooms = self.session.rooms().count();
        info!(conn = %self.session.id, user = %self.session.username().unwrap_or("Unknown"), rooms, "user disconnected");
    }
}

fn forward(
    mut rx: tokio::sync::broadcast::Receiver<Message>,
    out: Out,
    conn: uuid::Uuid,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(m) => {
                    if out.send(ServerEvent::Chat(m)).is_err() { break; }
                }
                Err(RecvError::Lagged(n)) => warn!(conn = %conn, skipped = n, "subscriber lagging"),
                Err(RecvError::Closed) => break,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{persist::PersistenceBackend, store::tests::disk_store};
    use tempfile::TempDir;

    fn ev(raw: &str) -> ClientEvent {
        serde_json::from_str(raw).unwrap()
    }

    async fn pair() -> (Conn, mpsc::UnboundedReceiver<ServerEvent>, Conn, mpsc::UnboundedReceiver<ServerEvent>, Arc<crate::persist::JsonDir>, TempDir) {
        let (store, disk, tmp) = disk_store(2000).await;
        let store = Arc::new(store);
        let hub = Hub::default();
        let (a_tx, a_rx) = mpsc::unbounded_channel();
        let (b_tx, b_rx) = mpsc::unbounded_channel();
        (
            Conn::new(store.clone(), hub.clone(), a_tx),
            a_rx,
            Conn::new(store, hub, b_tx),
            b_rx,
            disk,
            tmp,
        )
    }

    #[test]
    fn parses_client_events() {
        assert!(matches!(ev(r#"{"event":"set username","data":"alice"}"#), ClientEvent::SetUsername(Some(_))));
        assert!(matches!(ev(r#"{"event":"set username","data":null}"#), ClientEvent::SetUsername(None)));
        assert!(matches!(ev(r#"{"event":"join room","data":"bob"}"#), ClientEvent::JoinRoom(Target::Token(_))));
        assert!(matches!(ev(r#"{"event":"join room","data":{"peer":"bob"}}"#), ClientEvent::JoinRoom(Target::Peer { .. })));
        assert!(matches!(
            ev(r#"{"event":"chat message","data":{"roomId":"bob","text":"hi"}}"#),
            ClientEvent::ChatMessage(_)
        ));
        assert!(serde_json::from_str::<ClientEvent>(r#"{"event":"shout","data":1}"#).is_err());
    }

    #[test]
    fn server_events_keep_event_names() {
        let v = serde_json::to_value(ServerEvent::History(vec![])).unwrap();
        assert_eq!(v, serde_json::json!({"event": "chat history", "data": []}));
        let v = serde_json::to_value(ServerEvent::Error { reason: "x".into() }).unwrap();
        assert_eq!(v["event"], "error");
        assert_eq!(v["data"]["reason"], "x");
    }

    #[tokio::test]
    async fn dm_round_trip_between_two_connections() {
        let (mut alice, mut a_rx, mut bob, mut b_rx, disk, _t) = pair().await;

        alice.on_event(ev(r#"{"event":"set username","data":"alice"}"#)).await;
        alice.on_event(ev(r#"{"event":"join room","data":"bob"}"#)).await;
        bob.on_event(ev(r#"{"event":"set username","data":"bob"}"#)).await;
        bob.on_event(ev(r#"{"event":"join room","data":"alice_bob"}"#)).await;

        assert!(matches!(a_rx.recv().await, Some(ServerEvent::History(h)) if h.is_empty()));
        assert!(matches!(b_rx.recv().await, Some(ServerEvent::History(h)) if h.is_empty()));

        alice.on_event(ev(r#"{"event":"chat message","data":{"roomId":"bob","text":"hi"}}"#)).await;

        let Some(ServerEvent::Chat(got)) = b_rx.recv().await else { panic!("bob got nothing") };
        assert_eq!((got.username.as_str(), got.text.as_str(), got.room_id.as_str()), ("alice", "hi", "alice_bob"));
        assert!(matches!(a_rx.recv().await, Some(ServerEvent::Chat(_))));
        assert_eq!(disk.load("alice_bob").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn invalid_requests_get_an_error_event() {
        let (mut alice, mut a_rx, _bob, _b_rx, disk, _t) = pair().await;

        alice.on_event(ev(r#"{"event":"join room","data":"bob"}"#)).await;
        assert!(matches!(a_rx.recv().await, Some(ServerEvent::Error { .. })));

        alice.on_event(ev(r#"{"event":"set username","data":"alice"}"#)).await;
        alice.on_event(ev(r#"{"event":"join room","data":"alice"}"#)).await;
        assert!(matches!(a_rx.recv().await, Some(ServerEvent::Error { .. })));
        assert!(alice.feeds.is_empty());
        assert!(disk.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn rejoin_does_not_double_deliver() {
        let (mut alice, mut a_rx, _bob, _b_rx, _disk, _t) = pair().await;
        alice.on_event(ev(r#"{"event":"set username","data":"alice"}"#)).await;
        alice.on_event(ev(r#"{"event":"join room","data":"bob"}"#)).await;
        alice.on_event(ev(r#"{"event":"join room","data":{"peer":"bob"}}"#)).await;
        assert_eq!(alice.feeds.len(), 1);

        alice.on_event(ev(r#"{"event":"chat message","data":{"peer":"bob","text":"once"}}"#)).await;
        let mut chats = 0;
        while let Ok(ev) = tokio::time::timeout(std::time::Duration::from_millis(50), a_rx.recv()).await {
            if matches!(ev, Some(ServerEvent::Chat(_))) { chats += 1; }
        }
        assert_eq!(chats, 1);
    }

    #[tokio::test]
    async fn close_unsubscribes_from_hub() {
        let (mut alice, _a_rx, _bob, _b_rx, _disk, _t) = pair().await;
        let hub = alice.hub.clone();
        alice.on_event(ev(r#"{"event":"set username","data":"alice"}"#)).await;
        alice.on_event(ev(r#"{"event":"join room","data":"bob"}"#)).await;
        assert_eq!(hub.len().await, 1);
        alice.close().await;
        assert_eq!(hub.len().await, 0);
    }
}
