use std::{
    fmt::Write as _,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use tokio::fs;

use crate::{
    error::{StoreErr, StoreResult},
    state::Message,
};

#[async_trait]
pub trait PersistenceBackend: Send + Sync {
    /// `Err(NotFound)` when the room was never stored.
    async fn load(&self, room: &str) -> StoreResult<Vec<Message>>;

    /// Replace the stored log. A concurrent `load` sees the old or the new
    /// log, never a mix.
    async fn save(&self, room: &str, msgs: &[Message]) -> StoreResult<()>;

    async fn list_all(&self) -> StoreResult<Vec<String>>;

    /// Deleting a room that is not stored succeeds.
    async fn delete(&self, room: &str) -> StoreResult<()>;
}

const PREFIX: &str = "room_";
const EXT: &str = ".json";

pub struct JsonDir {
    dir: PathBuf,
}

impl JsonDir {
    /// Creates the directory if needed.
    pub async fn open(dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path { &self.dir }

    fn path_of(&self, room: &str) -> PathBuf {
        self.dir.join(file_name(room))
    }
}

#[async_trait]
impl PersistenceBackend for JsonDir {
    async fn load(&self, room: &str) -> StoreResult<Vec<Message>> {
        let raw = match fs::read(self.path_of(room)).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreErr::NotFound(room.to_owned()))
            }
            Err(e) => return Err(StoreErr::io(room, e)),
        };
        serde_json::from_slice(&raw)
            .map_err(|source| StoreErr::CorruptData { room: room.to_owned(), source })
    }

    async fn save(&self, room: &str, msgs: &[Message]) -> StoreResult<()> {
        let body = serde_json::to_vec_pretty(msgs).map_err(|e| StoreErr::io(room, e.into()))?;
        let path = self.path_of(room);
        let mut tmp = path.clone().into_os_string();
        tmp.push(".tmp");

        fs::write(&tmp, body).await.map_err(|e| StoreErr::io(room, e))?;
        fs::rename(&tmp, &path).await.map_err(|e| StoreErr::io(room, e))
    }

    async fn list_all(&self) -> StoreResult<Vec<String>> {
        let mut rd = fs::read_dir(&self.dir).await.map_err(|e| StoreErr::io("*", e))?;
        let mut out = Vec::new();
        while let Some(ent) = rd.next_entry().await.map_err(|e| StoreErr::io("*", e))? {
            let name = ent.file_name();
            if let Some(room) = name.to_str().and_then(room_of) {
                out.push(room);
            }
        }
        out.sort();
        Ok(out)
    }

    async fn delete(&self, room: &str) -> StoreResult<()> {
        match fs::remove_file(self.path_of(room)).await {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(StoreErr::io(room, e)),
            _ => Ok(()),
        }
    }
}

/* ---------- file names ---------- */

fn safe(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'-'
}

pub fn file_name(room: &str) -> String {
    let mut s = String::with_capacity(PREFIX.len() + room.len() + EXT.len());
    s.push_str(PREFIX);
    for b in room.bytes() {
        if safe(b) {
            s.push(b as char);
        } else {
            let _ = write!(s, "%{b:02X}");
        }
    }
    s.push_str(EXT);
    s
}

/// Inverse of [`file_name`]. Only the exact names `file_name` writes are
/// accepted, so every listed room can be loaded back.
pub fn room_of(file: &str) -> Option<String> {
    let enc = file.strip_prefix(PREFIX)?.strip_suffix(EXT)?;
    let bytes = enc.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = enc.get(i + 1..i + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    let room = String::from_utf8(out).ok()?;
    (file_name(&room) == file).then_some(room)
}
