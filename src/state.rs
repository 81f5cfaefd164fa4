use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, RwLock};

/// One line of a conversation. Never changed after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub username: String,
    pub text:     String,
    pub time:     DateTime<Utc>,
    pub room_id:  String,
}

impl Message {
    pub fn now(username: &str, text: &str, room_id: &str) -> Self {
        Self {
            username: username.to_owned(),
            text:     text.to_owned(),
            time:     Utc::now(),
            room_id:  room_id.to_owned(),
        }
    }
}

pub type Tx = broadcast::Sender<Message>;

const ROOM_CHANNEL_CAP: usize = 100;

/* ------------ live subscribers per room ------------ */
#[derive(Clone, Default)]
pub struct Hub {
    rooms: Arc<RwLock<HashMap<String, Tx>>>,
}

impl Hub {
    pub async fn subscribe(&self, room: &str) -> broadcast::Receiver<Message> {
        let mut m = self.rooms.write().await;
        m.entry(room.to_owned())
            .or_insert_with(|| broadcast::channel(ROOM_CHANNEL_CAP).0)
            .subscribe()
    }

    /// The room's sender, created if nobody has subscribed yet.
    pub async fn sender(&self, room: &str) -> Tx {
        let mut m = self.rooms.write().await;
        m.entry(room.to_owned())
            .or_insert_with(|| broadcast::channel(ROOM_CHANNEL_CAP).0)
            .clone()
    }

    /// Forget a room once nobody listens to it any more.
    pub async fn prune(&self, room: &str) {
        let mut m = self.rooms.write().await;
        if m.get(room).is_some_and(|tx| tx.receiver_count() == 0) {
            m.remove(room);
        }
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.rooms.read().await.len()
    }
}
