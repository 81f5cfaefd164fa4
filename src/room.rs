use crate::error::SessionErr;

pub const SEP: &str = "_";

/// Both names sorted and joined with [`SEP`].
pub fn canonical_room_id(a: &str, b: &str) -> String {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    format!("{lo}{SEP}{hi}")
}

/// Recover the peer from a client token such as `"bob"` or `"alice_bob"`.
///
/// Older clients send the full room key instead of the peer's name, so the
/// caller's own name and one separator are cut out first (leftmost match of
/// each), then surrounding whitespace.
pub fn derive_peer_and_room(me: &str, token: &str) -> Result<(String, String), SessionErr> {
    let stripped = if me.is_empty() { token.to_owned() } else { token.replacen(me, "", 1) };
    let peer = stripped.replacen(SEP, "", 1).trim().to_owned();
    if peer.is_empty() {
        return Err(SessionErr::InvalidRoomToken(token.to_owned()));
    }
    let room = canonical_room_id(me, &peer);
    Ok((peer, room))
}

/// Redesigned entry point: the client names its peer directly.
pub fn room_for_peer(me: &str, peer: &str) -> Result<(String, String), SessionErr> {
    let peer = peer.trim();
    if peer.is_empty() {
        return Err(SessionErr::InvalidRoomToken(peer.to_owned()));
    }
    Ok((peer.to_owned(), canonical_room_id(me, peer)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_does_not_matter() {
        let pairs = [("alice", "bob"), ("Zed", "amy"), ("x", "x"), ("", "b"), ("ü", "u")];
        for (a, b) in pairs {
            assert_eq!(canonical_room_id(a, b), canonical_room_id(b, a));
        }
        assert_eq!(canonical_room_id("bob", "alice"), "alice_bob");
    }

    #[test]
    fn self_room_does_not_panic() {
        assert_eq!(canonical_room_id("alice", "alice"), "alice_alice");
    }

    #[test]
    fn bare_peer_token() {
        let (peer, room) = derive_peer_and_room("alice", "bob").unwrap();
        assert_eq!(peer, "bob");
        assert_eq!(room, "alice_bob");
    }

    #[test]
    fn composite_token_from_either_side() {
        assert_eq!(derive_peer_and_room("bob", "alice_bob").unwrap().1, "alice_bob");
        assert_eq!(derive_peer_and_room("alice", "alice_bob").unwrap().1, "alice_bob");
        assert_eq!(derive_peer_and_room("bob", "alice_bob").unwrap().0, "alice");
    }

    #[test]
    fn token_of_only_self_is_invalid() {
        assert_eq!(
            derive_peer_and_room("alice", "alice"),
            Err(SessionErr::InvalidRoomToken("alice".into()))
        );
        assert!(derive_peer_and_room("alice", " _ ").is_err());
    }

    #[test]
    fn explicit_peer() {
        assert_eq!(room_for_peer("bob", " alice ").unwrap(), ("alice".into(), "alice_bob".into()));
        assert!(room_for_peer("bob", "   ").is_err());
    }
}
