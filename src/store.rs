use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
};

use tokio::sync::Mutex;
use tracing::{debug, error, warn};

use crate::{error::StoreErr, persist::PersistenceBackend, state::Message};

/* one lock per room; the map lock only guards slot lookup */
type Slot = Arc<Mutex<Option<VecDeque<Message>>>>;

pub struct RoomStore {
    backend: Arc<dyn PersistenceBackend>,
    max:     usize,
    rooms:   Mutex<HashMap<String, Slot>>,
}

impl RoomStore {
    pub fn new(backend: Arc<dyn PersistenceBackend>, max_messages: usize) -> Self {
        Self { backend, max: max_messages.max(1), rooms: Mutex::default() }
    }

    async fn slot(&self, room: &str) -> Slot {
        let mut m = self.rooms.lock().await;
        m.entry(room.to_owned()).or_default().clone()
    }

    /// Never fails: unreadable logs come back empty.
    async fn read(&self, room: &str) -> VecDeque<Message> {
        match self.backend.load(room).await {
            Ok(msgs) => {
                let mut log = VecDeque::from(msgs);
                if log.len() > self.max {
                    warn!(room = %room, len = log.len(), max = self.max, "stored log over cap, trimming");
                    trim(&mut log, self.max);
                }
                log
            }
            Err(StoreErr::NotFound(_)) => {
                debug!(room = %room, "no stored log, starting empty");
                VecDeque::new()
            }
            Err(e) => {
                error!(room = %room, error = %e, "failed to read room log, starting empty");
                VecDeque::new()
            }
        }
    }

    pub async fn ensure_loaded(&self, room: &str) {
        let slot = self.slot(room).await;
        let mut g = slot.lock().await;
        if g.is_none() {
            *g = Some(self.read(room).await);
        }
    }

    /// Last `limit` messages, oldest first. Empty for rooms not loaded yet.
    pub async fn get_recent_history(&self, room: &str, limit: usize) -> Vec<Message> {
        let Some(slot) = self.rooms.lock().await.get(room).cloned() else {
            return Vec::new();
        };
        let g = slot.lock().await;
        g.as_ref()
            .map(|log| log.iter().skip(log.len().saturating_sub(limit)).cloned().collect())
            .unwrap_or_default()
    }

    /// Push, trim, rewrite the whole log, then run `after` on the new message,
    /// all under the room lock: writes and `after` calls for one room happen
    /// in log order. A failed write is logged and the in-memory append stands.
    pub async fn append<F>(&self, room: &str, msg: Message, after: F)
    where
        F: FnOnce(&Message) + Send,
    {
        let slot = self.slot(room).await;
        let mut g = slot.lock().await;
        if g.is_none() {
            *g = Some(self.read(room).await);
        }
        let Some(log) = g.as_mut() else { return };

        log.push_back(msg);
        trim(log, self.max);

        if let Err(e) = self.backend.save(room, log.make_contiguous()).await {
            error!(room = %room, error = %e, "failed to save room log");
        }
        if let Some(last) = log.back() {
            after(last);
        }
    }

    #[cfg(test)]
    pub async fn is_cached(&self, room: &str) -> bool {
        match self.rooms.lock().await.get(room).cloned() {
            Some(slot) => slot.lock().await.is_some(),
            None => false,
        }
    }
}

fn trim(log: &mut VecDeque<Message>, max: usize) {
    if log.len() > max {
        let excess = log.len() - max;
        log.drain(..excess);
    }
}
