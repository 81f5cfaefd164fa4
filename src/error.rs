pub type AppResult<T> = Result<T, AppErr>;

/* ── process boundary ── */
#[derive(thiserror::Error, Debug)]
pub enum AppErr {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config: {0}")]
    Config(String),
}

/* ── durable storage ── */
pub type StoreResult<T> = Result<T, StoreErr>;

#[derive(thiserror::Error, Debug)]
pub enum StoreErr {
    #[error("room {0} has no stored log")]
    NotFound(String),

    #[error("stored log for room {room} is corrupt: {source}")]
    CorruptData {
        room: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("IO on room {room}: {source}")]
    Io {
        room: String,
        #[source]
        source: std::io::Error,
    },
}

impl StoreErr {
    pub fn io(room: &str, source: std::io::Error) -> Self {
        StoreErr::Io { room: room.to_owned(), source }
    }
}

/* ── per-connection events ── */
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionErr {
    #[error("set a username first")]
    NoUsername,

    #[error("missing room token")]
    EmptyToken,

    #[error("cannot resolve a peer from room token {0:?}")]
    InvalidRoomToken(String),

    #[error("empty message")]
    EmptyText,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_err_names_the_room() {
        let e = StoreErr::io("alice_bob", std::io::Error::other("disk full"));
        assert!(e.to_string().contains("alice_bob"));
        assert!(e.to_string().contains("disk full"));
    }

    #[test]
    fn io_converts_into_app_err() {
        let e: AppErr = std::io::Error::other("port in use").into();
        assert!(matches!(e, AppErr::Io(_)));
    }
}
