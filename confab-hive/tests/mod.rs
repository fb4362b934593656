use confab_hive::meta::{self, CommandFields, MetaCommand, UserAction};
use confab_hive::{ChatIdentity, ChatRoom, HiveEvent, Inbound, Presence, UserRegistry};

fn identity(user: &str, client: &str) -> ChatIdentity {
    ChatIdentity::with_client_id(user, client).unwrap()
}

fn join_json(sender_client: &str, sender: &str) -> String {
    format!(
        r#"{{"sender_client_id":"{}","sender":"{}","recipient_client_id":"","recipient":"","type":"command","content":{{"user":"join","round_table":false,"last_client":null}}}}"#,
        sender_client, sender
    )
}

// ============================================================================
// UserRegistry Tests
// ============================================================================

#[test]
fn test_registry_idempotent_insert() {
    let mut reg = UserRegistry::new();
    assert_eq!(reg.insert("bb", "c1"), Presence::Joined);
    let snapshot = reg.clone();

    assert_eq!(reg.insert("bb", "c1"), Presence::Unchanged);
    assert_eq!(reg, snapshot);
    assert_eq!(reg.len(), 1);
    assert_eq!(reg.users()[0].name, "bb");
    assert!(reg.users()[0].client_ids.contains("c1"));
}

#[test]
fn test_registry_sorted_insert() {
    let mut reg = UserRegistry::new();
    reg.insert("bb", "c1");
    reg.insert("aa", "c2");
    reg.insert("ab", "c3");
    assert_eq!(reg.names(), vec!["aa", "ab", "bb"]);
}

#[test]
fn test_registry_second_client_same_name() {
    let mut reg = UserRegistry::new();
    reg.insert("alice", "c1");
    assert_eq!(reg.insert("alice", "c2"), Presence::ClientAdded);
    assert_eq!(reg.len(), 1);
    assert_eq!(reg.clients_of("alice").unwrap().len(), 2);
}

#[test]
fn test_registry_sort_invariant_after_mixed_ops() {
    let mut reg = UserRegistry::new();
    let ops: &[(&str, &str, bool)] = &[
        ("mike", "1", true),
        ("anna", "2", true),
        ("zoe", "3", true),
        ("mike", "4", true),
        ("anna", "2", false),
        ("bert", "5", true),
        ("mike", "1", false),
        ("carl", "6", true),
        ("zoe", "3", false),
        ("anna", "7", true),
    ];

    for (name, id, add) in ops {
        if *add {
            reg.insert(name, id);
        } else {
            reg.remove(name, id);
        }
        let names = reg.names();
        assert!(names.windows(2).all(|w| w[0] < w[1]), "not sorted: {:?}", names);
    }

    assert_eq!(reg.names(), vec!["anna", "bert", "carl", "mike"]);
}

#[test]
fn test_registry_remove_last_client_drops_entry() {
    let mut reg = UserRegistry::new();
    reg.insert("bob", "c1");
    reg.remove("bob", "c1");
    assert!(!reg.contains("bob"));
    assert!(reg.is_empty());
}

// ============================================================================
// Meta Command Parsing Tests
// ============================================================================

#[test]
fn test_parse_valid_join() {
    let text = format!("#abc/{}", join_json("c9", "carol"));
    let env = meta::parse("abc", &text).unwrap();
    assert_eq!(env.sender, "carol");
    assert_eq!(env.kind, "command");
    assert_eq!(env.content.unwrap().user, Some(UserAction::Join));
}

#[test]
fn test_parse_leading_whitespace_allowed() {
    let text = format!("   \n\t#abc/{}", join_json("c9", "carol"));
    assert!(meta::parse("abc", &text).is_some());
}

#[test]
fn test_parse_wrong_session_rejected() {
    let text = format!("#abd/{}", join_json("c9", "carol"));
    assert!(meta::parse("abc", &text).is_none());
}

#[test]
fn test_parse_session_prefix_not_enough() {
    // "#abcd/" must not match session "abc"
    let text = format!("#abcd/{}", join_json("c9", "carol"));
    assert!(meta::parse("abc", &text).is_none());
}

#[test]
fn test_parse_missing_slash() {
    let text = format!("#abc{}", join_json("c9", "carol"));
    assert!(meta::parse("abc", &text).is_none());
}

#[test]
fn test_parse_malformed_json() {
    assert!(meta::parse("abc", "#abc/{\"sender\": ").is_none());
    assert!(meta::parse("abc", "#abc/not json").is_none());
    assert!(meta::parse("abc", "#abc/").is_none());
}

#[test]
fn test_parse_rejects_non_object() {
    assert!(meta::parse("abc", r#"#abc/["c1","x","","","command"]"#).is_none());
    assert!(meta::parse("abc", "#abc/42").is_none());
}

#[test]
fn test_parse_rejects_trailing_garbage() {
    let text = format!("#abc/{} print('hi')", join_json("c9", "carol"));
    assert!(meta::parse("abc", &text).is_none());
}

#[test]
fn test_parse_plain_code() {
    assert!(meta::parse("abc", "print('hello')").is_none());
    assert!(meta::parse("abc", "# just a comment").is_none());
}

#[test]
fn test_parse_empty_session_never_matches() {
    let text = format!("#/{}", join_json("c9", "carol"));
    assert!(meta::parse("", &text).is_none());
}

#[test]
fn test_parse_null_recipients() {
    let text = r#"#abc/{"sender_client_id":"c1","sender":"x","recipient_client_id":null,"recipient":null,"type":"command","content":{"user":"who"}}"#;
    let env = meta::parse("abc", text).unwrap();
    assert!(env.is_for_everyone());
}

#[test]
fn test_parse_unknown_user_action_rejected() {
    let text = r#"#abc/{"sender_client_id":"c1","sender":"x","type":"command","content":{"user":"dance"}}"#;
    assert!(meta::parse("abc", text).is_none());
}

// ============================================================================
// MetaCommand Dispatch Tests
// ============================================================================

#[test]
fn test_dispatch_requires_command_type() {
    let text = r#"#abc/{"sender_client_id":"c1","sender":"x","type":"message","content":{"user":"join"}}"#;
    let env = meta::parse("abc", text).unwrap();
    assert!(MetaCommand::from_envelope(env, "me", "me").is_none());
}

#[test]
fn test_dispatch_requires_content() {
    let text = r#"#abc/{"sender_client_id":"c1","sender":"x","type":"command"}"#;
    let env = meta::parse("abc", text).unwrap();
    assert!(MetaCommand::from_envelope(env, "me", "me").is_none());
}

#[test]
fn test_dispatch_addressed_to_someone_else() {
    let text = r#"#abc/{"sender_client_id":"c1","sender":"x","recipient_client_id":"c7","recipient":"other","type":"command","content":{"user":"join"}}"#;
    let env = meta::parse("abc", text).unwrap();
    assert!(MetaCommand::from_envelope(env, "me-client", "me").is_none());
}

#[test]
fn test_dispatch_addressed_by_client_id() {
    let text = r#"#abc/{"sender_client_id":"c1","sender":"x","recipient_client_id":"me-client","recipient":"","type":"command","content":{"user":"join"}}"#;
    let env = meta::parse("abc", text).unwrap();
    let cmd = MetaCommand::from_envelope(env, "me-client", "me").unwrap();
    assert!(matches!(cmd, MetaCommand::AddUser(_)));
}

#[test]
fn test_dispatch_addressed_by_user_name() {
    let text = r#"#abc/{"sender_client_id":"c1","sender":"x","recipient_client_id":"","recipient":"me","type":"command","content":{"user":"leave","last_client":true}}"#;
    let env = meta::parse("abc", text).unwrap();
    match MetaCommand::from_envelope(env, "me-client", "me").unwrap() {
        MetaCommand::DropUser(f) => assert_eq!(f.last_client, Some(true)),
        other => panic!("Expected DropUser, got {:?}", other),
    }
}

#[test]
fn test_dispatch_round_table_commands() {
    let start = r#"#abc/{"sender_client_id":"c1","sender":"mod","type":"command","content":{"round_table":true,"restriction":2}}"#;
    let stop = r#"#abc/{"sender_client_id":"c1","sender":"mod","type":"command","content":{"round_table":false}}"#;

    let start = MetaCommand::from_envelope(meta::parse("abc", start).unwrap(), "me", "me").unwrap();
    assert!(matches!(
        start,
        MetaCommand::StartRoundTable { restriction: Some(2), .. }
    ));

    let stop = MetaCommand::from_envelope(meta::parse("abc", stop).unwrap(), "me", "me").unwrap();
    assert!(matches!(stop, MetaCommand::StopRoundTable(_)));
}

#[test]
fn test_wire_encoding_shape() {
    let cmd = MetaCommand::AddUser(CommandFields {
        sender_client_id: "c1".into(),
        sender: "ada".into(),
        ..Default::default()
    });
    let wire = cmd.to_wire("sess").unwrap();
    assert!(wire.starts_with("#sess/{"));

    let json: serde_json::Value = serde_json::from_str(&wire["#sess/".len()..]).unwrap();
    assert_eq!(json["type"], "command");
    assert_eq!(json["content"]["user"], "join");
    assert_eq!(json["content"]["round_table"], false);
    assert!(json["content"].get("last_client").is_none());
    assert!(json["content"].get("restriction").is_none());
}

#[test]
fn test_wire_encoding_keeps_last_client_when_set() {
    let cmd = MetaCommand::DropUser(CommandFields {
        sender_client_id: "c1".into(),
        sender: "ada".into(),
        last_client: Some(false),
        ..Default::default()
    });
    let wire = cmd.to_wire("sess").unwrap();

    let json: serde_json::Value = serde_json::from_str(&wire["#sess/".len()..]).unwrap();
    assert_eq!(json["content"]["user"], "leave");
    assert_eq!(json["content"]["last_client"], false);
}

#[test]
fn test_wire_encoding_parses_back() {
    let cmd = MetaCommand::StartRoundTable {
        fields: CommandFields {
            sender_client_id: "c1".into(),
            sender: "ada".into(),
            round_table: true,
            ..Default::default()
        },
        restriction: Some(3),
    };
    let wire = cmd.to_wire("sess").unwrap();
    let back = MetaCommand::from_envelope(meta::parse("sess", &wire).unwrap(), "c2", "bob");
    assert_eq!(back, Some(cmd));
}

// ============================================================================
// ChatIdentity Tests
// ============================================================================

#[test]
fn test_identity_rejects_empty_name() {
    let result = ChatIdentity::new("   ");
    assert!(result.is_err());
    assert!(result.unwrap_err().to_string().contains("Invalid"));
}

#[test]
fn test_identity_unique_client_ids() {
    let a = ChatIdentity::new("ada").unwrap();
    let b = ChatIdentity::new("ada").unwrap();
    assert_ne!(a.client_id, b.client_id);
}

// ============================================================================
// ChatRoom Tests
// ============================================================================

#[test]
fn test_room_classify() {
    let (room, _rx) = ChatRoom::new(identity("me", "me-client"), "abc");
    assert_eq!(room.classify("x = 1"), Inbound::Plain);

    let foreign = r#"#abc/{"sender_client_id":"c1","sender":"x","recipient":"other","type":"command","content":{"user":"join"}}"#;
    assert_eq!(room.classify(foreign), Inbound::Dropped);

    let join = format!("#abc/{}", join_json("c1", "x"));
    assert!(matches!(room.classify(&join), Inbound::Command(_)));
}

#[test]
fn test_room_join_and_leave_events() {
    let (mut room, mut rx) = ChatRoom::new(identity("me", "me-client"), "abc");

    let join = room.parse(&format!("#abc/{}", join_json("c1", "alice"))).unwrap();
    assert!(room.apply(join.clone()).is_none());
    assert_eq!(room.registry().names(), vec!["alice"]);

    match rx.try_recv().unwrap() {
        HiveEvent::UserJoined { name, new_user, .. } => {
            assert_eq!(name, "alice");
            assert!(new_user);
        }
        other => panic!("Expected UserJoined, got {:?}", other),
    }

    // Duplicate join changes nothing and emits nothing.
    room.apply(join);
    assert!(rx.try_recv().is_err());

    let leave = MetaCommand::DropUser(CommandFields {
        sender_client_id: "c1".into(),
        sender: "alice".into(),
        last_client: Some(true),
        ..Default::default()
    });
    room.apply(leave);
    assert!(room.registry().is_empty());
    assert!(matches!(
        rx.try_recv().unwrap(),
        HiveEvent::UserLeft { last_client: true, .. }
    ));
}

#[test]
fn test_room_answers_who_with_join() {
    let (mut room, _rx) = ChatRoom::new(identity("me", "me-client"), "abc");
    let who = MetaCommand::WhoIsHere(CommandFields {
        sender_client_id: "c5".into(),
        sender: "eve".into(),
        ..Default::default()
    });

    match room.apply(who) {
        Some(MetaCommand::AddUser(f)) => {
            assert_eq!(f.sender, "me");
            assert_eq!(f.sender_client_id, "me-client");
            assert_eq!(f.recipient_client_id, "c5");
            assert_eq!(f.recipient, "eve");
        }
        other => panic!("Expected AddUser reply, got {:?}", other),
    }
}

#[test]
fn test_room_ignores_own_who() {
    let (mut room, _rx) = ChatRoom::new(identity("me", "me-client"), "abc");
    let who = room.who();
    assert!(room.apply(who).is_none());
}

#[test]
fn test_room_round_table_lifecycle() {
    let (mut room, mut rx) = ChatRoom::new(identity("me", "me-client"), "abc");
    room.apply(MetaCommand::StartRoundTable {
        fields: CommandFields {
            sender_client_id: "c1".into(),
            sender: "mod".into(),
            round_table: true,
            ..Default::default()
        },
        restriction: Some(1),
    });

    let rt = room.round_table().unwrap();
    assert_eq!(rt.moderator, "mod");
    assert_eq!(rt.restriction, Some(1));
    assert!(matches!(rx.try_recv().unwrap(), HiveEvent::RoundTableStarted { .. }));

    room.apply(room.stop_round_table());
    assert!(room.round_table().is_none());
    assert!(matches!(rx.try_recv().unwrap(), HiveEvent::RoundTableStopped { .. }));
}

#[test]
fn test_room_encode_own_join_roundtrip() {
    let (room, _rx) = ChatRoom::new(identity("me", "me-client"), "abc");
    let wire = room.encode(&room.join()).unwrap();
    assert!(wire.starts_with("#abc/"));
    // Our own broadcast is addressed to everyone, so we parse it too.
    assert_eq!(room.parse(&wire), Some(room.join()));
}

// ============================================================================
// HiveEvent Tests
// ============================================================================

#[test]
fn test_hive_event_serialization() {
    let event = HiveEvent::UserLeft {
        name: "bob".into(),
        client_id: "c1".into(),
        last_client: false,
    };
    let json = serde_json::to_string(&event).unwrap();
    let back: HiveEvent = serde_json::from_str(&json).unwrap();
    assert_eq!(back, event);
}
