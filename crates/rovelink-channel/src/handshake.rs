use rovelink_frame::{Message, MessageId, MessageType};

use crate::config::Role;
use crate::error::{ChannelError, Result};

/// The handshake this role sends.
pub fn outbound_kind(role: Role) -> MessageType {
    match role {
        Role::Client => MessageType::ClientHandshake,
        Role::Server => MessageType::ServerHandshake,
    }
}

/// The handshake this role expects from its peer.
pub fn inbound_kind(role: Role) -> MessageType {
    match role {
        Role::Client => MessageType::ServerHandshake,
        Role::Server => MessageType::ClientHandshake,
    }
}

/// Build the handshake a channel of `role` named `name` sends.
pub fn handshake_message(role: Role, id: MessageId, name: &str) -> Message {
    Message::handshake(role == Role::Server, id, name)
}

/// Check a received handshake against the local role and channel name.
pub fn verify_handshake(role: Role, name: &str, msg: &Message) -> Result<()> {
    let expected = inbound_kind(role);
    if msg.kind != expected {
        return Err(ChannelError::HandshakeFailed(format!(
            "expected {expected}, got {}",
            msg.kind
        )));
    }

    if msg.payload.as_ref() != name.as_bytes() {
        return Err(ChannelError::HandshakeFailed(format!(
            "channel name mismatch: peer sent '{}', expected '{name}'",
            String::from_utf8_lossy(&msg.payload)
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    #[test]
    fn client_and_server_pair_up() {
        let hello = handshake_message(Role::Client, 1, "drive");
        verify_handshake(Role::Server, "drive", &hello).unwrap();

        let reply = handshake_message(Role::Server, 1, "drive");
        verify_handshake(Role::Client, "drive", &reply).unwrap();
    }

    #[test]
    fn name_mismatch_is_rejected() {
        let hello = handshake_message(Role::Client, 1, "arm");
        let err = verify_handshake(Role::Server, "drive", &hello).unwrap_err();
        match err {
            ChannelError::HandshakeFailed(msg) => {
                assert!(msg.contains("'arm'"));
                assert!(msg.contains("'drive'"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn prefix_of_name_is_not_a_match() {
        let hello = handshake_message(Role::Client, 1, "driv");
        assert!(verify_handshake(Role::Server, "drive", &hello).is_err());
    }

    #[test]
    fn wrong_direction_is_rejected() {
        let echoed = handshake_message(Role::Client, 1, "drive");
        assert!(verify_handshake(Role::Client, "drive", &echoed).is_err());
    }

    #[test]
    fn non_utf8_name_reported_lossily() {
        let msg = Message::new(
            MessageType::ClientHandshake,
            1,
            Bytes::from_static(&[0xFF, 0xFE]),
        );
        let err = verify_handshake(Role::Server, "drive", &msg).unwrap_err();
        assert!(err.to_string().contains('\u{FFFD}'));
    }
}
