//! Integration tests for the checkers-core codec.
//!
//! These tests replay complete lobby transcripts through the public API:
//! a client's outbound messages are encoded, concatenated the way a single
//! TCP read might deliver them, decoded, and parsed on the other side.

use checkers_core::{
    decode_chunk, ClientBound, InviteCode, Move, PlayerIdentity, ProtocolError, ServerBound,
};

fn parse_server_chunk(chunk: &str) -> Vec<Result<ServerBound, ProtocolError>> {
    decode_chunk(chunk)
        .into_iter()
        .map(ServerBound::from_message)
        .collect()
}

#[test]
fn test_registration_transcript_decodes_in_order() {
    // Arrange
    let me = PlayerIdentity::from_display("nickname", b"img").unwrap();
    let chunk = [
        ServerBound::Config {
            nickname: me.nickname.clone(),
            image: me.profile_image.clone(),
        }
        .encode(),
        ServerBound::GetPlayers.encode(),
    ]
    .concat();

    // Act
    let parsed = parse_server_chunk(&chunk);

    // Assert
    assert_eq!(chunk, "checkers:config bmlja25hbWU= aW1n!checkers:getPlayers!");
    assert_eq!(
        parsed,
        vec![
            Ok(ServerBound::Config {
                nickname: "bmlja25hbWU=".to_string(),
                image: "aW1n".to_string(),
            }),
            Ok(ServerBound::GetPlayers),
        ]
    );
}

#[test]
fn test_bad_message_in_the_middle_does_not_disturb_neighbours() {
    // Arrange
    let chunk = "checkers:getPlayers!checkers:inviteAsk short!checkers:chat hi";

    // Act
    let parsed = parse_server_chunk(chunk);

    // Assert
    assert_eq!(parsed.len(), 3);
    assert_eq!(parsed[0], Ok(ServerBound::GetPlayers));
    assert!(parsed[1].is_err());
    assert_eq!(parsed[2], Ok(ServerBound::Chat("hi".to_string())));
}

#[test]
fn test_forwarded_invite_round_trips_through_the_wire_form() {
    // Arrange
    let code = InviteCode::random();
    let bob = PlayerIdentity::from_display("bob", b"bob-avatar").unwrap();
    let forwarded = ClientBound::InviteAsk {
        nickname: bob.nickname.clone(),
        image: bob.profile_image.clone(),
        code: code.clone(),
    };

    // Act
    let wire = forwarded.encode();
    let messages = decode_chunk(&wire);
    let parsed = ClientBound::from_message(messages[0]).unwrap();

    // Assert
    assert_eq!(parsed, forwarded);
}

#[test]
fn test_move_payload_survives_relay_as_opaque_text() {
    // Arrange
    let mv: Move = "5,0>3,2>1,4".parse().unwrap();
    let outbound = ServerBound::Move(mv.to_sendable()).encode();

    // Act: the relay forwards the payload verbatim to the opponent.
    let relayed = match ServerBound::from_message(decode_chunk(&outbound)[0]).unwrap() {
        ServerBound::Move(payload) => ClientBound::Move(payload),
        other => panic!("unexpected {other:?}"),
    };

    // Assert
    match ClientBound::from_message(decode_chunk(&relayed.encode())[0]).unwrap() {
        ClientBound::Move(payload) => assert_eq!(payload.parse::<Move>().unwrap(), mv),
        other => panic!("unexpected {other:?}"),
    }
}
