use std::collections::BTreeSet;

use serde::Deserialize;
use uuid::Uuid;

use crate::{
    error::SessionErr,
    room::{derive_peer_and_room, room_for_peer},
    state::{Hub, Message},
    store::RoomStore,
};

pub const HISTORY_REPLAY: usize = 100;
pub const ANONYMOUS: &str = "Anonymous";

/// Where a join or send is aimed: the legacy composite token, or the peer by name.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Target {
    Token(String),
    Peer { peer: String },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatIn {
    #[serde(default)]
    pub room_id: Option<String>,
    #[serde(default)]
    pub peer:    Option<String>,
    #[serde(default)]
    pub text:    Option<String>,
}

impl ChatIn {
    fn target(&self) -> Option<Target> {
        match (&self.peer, &self.room_id) {
            (Some(p), _)    => Some(Target::Peer { peer: p.clone() }),
            (None, Some(t)) => Some(Target::Token(t.clone())),
            (None, None)    => None,
        }
    }
}

#[derive(Debug)]
pub struct Joined {
    pub peer:    String,
    pub room:    String,
    pub history: Vec<Message>,
}

pub struct Session {
    pub id:   Uuid,
    username: Option<String>,
    rooms:    BTreeSet<String>,
}

impl Default for Session {
    fn default() -> Self { Self::new() }
}

impl Session {
    pub fn new() -> Self {
        Self { id: Uuid::new_v4(), username: None, rooms: BTreeSet::new() }
    }

    pub fn username(&self) -> Option<&str> { self.username.as_deref() }

    pub fn rooms(&self) -> impl Iterator<Item = &str> { self.rooms.iter().map(String::as_str) }

    /// Empty or missing names become [`ANONYMOUS`]; anything else is kept
    /// byte for byte, whitespace included. Later calls overwrite.
    pub fn set_username(&mut self, name: Option<&str>) -> &str {
        let name = name.filter(|n| !n.is_empty()).unwrap_or(ANONYMOUS);
        self.username.insert(name.to_owned())
    }

    fn resolve(&self, target: Option<&Target>) -> Result<(String, String), SessionErr> {
        let me = self.username.as_deref().ok_or(SessionErr::NoUsername)?;
        match target {
            None => Err(SessionErr::EmptyToken),
            Some(Target::Token(t)) if t.is_empty() => Err(SessionErr::EmptyToken),
            Some(Target::Token(t)) => derive_peer_and_room(me, t),
            Some(Target::Peer { peer }) => room_for_peer(me, peer),
        }
    }

    /// Resolve the room, load it and hand back the replay tail.
    pub async fn join(&mut self, store: &RoomStore, target: &Target) -> Result<Joined, SessionErr> {
        let (peer, room) = self.resolve(Some(target))?;
        self.rooms.insert(room.clone());
        store.ensure_loaded(&room).await;
        let history = store.get_recent_history(&room, HISTORY_REPLAY).await;
        Ok(Joined { peer, room, history })
    }

    fn compose(&self, input: &ChatIn) -> Result<Message, SessionErr> {
        let (_, room) = self.resolve(input.target().as_ref())?;
        let text = input.text.as_deref().filter(|t| !t.is_empty()).ok_or(SessionErr::EmptyText)?;
        let me = self.username.as_deref().unwrap_or(ANONYMOUS);
        Ok(Message::now(me, text, &room))
    }

    /// Stamp, store and broadcast. The broadcast happens under the room lock,
    /// so subscribers see messages in stored order. Returns the message and
    /// how many subscribers it reached.
    pub async fn send(
        &self,
        store: &RoomStore,
        hub:   &Hub,
        input: &ChatIn,
    ) -> Result<(Message, usize), SessionErr> {
        let msg = self.compose(input)?;
        let tx = hub.sender(&msg.room_id).await;
        let mut reached = 0;
        store
            .append(&msg.room_id, msg.clone(), |m| reached = tx.send(m.clone()).unwrap_or(0))
            .await;
        if reached == 0 {
            hub.prune(&msg.room_id).await;
        }
        Ok((msg, reached))
    }
}
