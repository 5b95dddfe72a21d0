use bytes::Bytes;
use test_log::test;

use super::{
    completion_value, input_entry_message, start_message, start_message_with_state,
    EngineTestCase,
};
use crate::bridge::AwaitError;
use crate::engine::errors::codes;
use crate::protocol::messages::{
    get_state_entry_message, get_state_keys_entry_message, ClearAllStateEntryMessage,
    ClearStateEntryMessage, ErrorMessage, GetStateEntryMessage, GetStateKeysEntryMessage,
    SetStateEntryMessage, SuspensionMessage,
};

#[test]
fn eager_hit_returns_cached_value_without_suspending() {
    let mut output = EngineTestCase::new()
        .input(start_message_with_state(1, false, vec![("STATE", "hello")]))
        .input(input_entry_message(b"req"))
        .run_bridge(|h| {
            h.input().unwrap();
            assert_eq!(h.get("STATE").unwrap(), Some(Bytes::from_static(b"hello")));
        });

    assert_eq!(
        output.next_decoded::<GetStateEntryMessage>().unwrap(),
        GetStateEntryMessage {
            key: Bytes::from_static(b"STATE"),
            name: String::new(),
            result: Some(get_state_entry_message::Result::Value(Bytes::from_static(
                b"hello"
            ))),
        }
    );
    assert_eq!(output.next_ty(), None);
}

#[test]
fn miss_without_partial_state_resolves_empty() {
    let mut output = EngineTestCase::new()
        .input(start_message(1))
        .input(input_entry_message(b"req"))
        .run_bridge(|h| {
            h.input().unwrap();
            assert_eq!(h.get("STATE").unwrap(), None);
        });

    assert_eq!(
        output.next_decoded::<GetStateEntryMessage>().unwrap().result,
        Some(get_state_entry_message::Result::Empty(Default::default()))
    );
    assert_eq!(output.next_ty(), None);
}

#[test]
fn miss_with_partial_state_suspends() {
    let mut output = EngineTestCase::new()
        .input(start_message_with_state(1, true, vec![]))
        .input(input_entry_message(b"req"))
        .run_bridge(|h| {
            h.input().unwrap();
            assert_eq!(h.get("STATE"), Err(AwaitError::Suspended));
        });

    assert_eq!(
        output.next_decoded::<GetStateEntryMessage>().unwrap(),
        GetStateEntryMessage {
            key: Bytes::from_static(b"STATE"),
            name: String::new(),
            result: None,
        }
    );
    assert_eq!(
        output.next_decoded::<SuspensionMessage>().unwrap(),
        SuspensionMessage {
            entry_indexes: vec![1]
        }
    );
    assert_eq!(output.next_ty(), None);
}

#[test]
fn set_then_get_sees_local_eager_cache_update() {
    let mut output = EngineTestCase::new()
        .input(start_message(1))
        .input(input_entry_message(b"req"))
        .run_bridge(|h| {
            h.input().unwrap();
            h.set("STATE", "new-value").unwrap();
            assert_eq!(h.get("STATE").unwrap(), Some(Bytes::from_static(b"new-value")));
        });

    assert_eq!(
        output.next_decoded::<SetStateEntryMessage>().unwrap(),
        SetStateEntryMessage {
            key: Bytes::from_static(b"STATE"),
            value: Bytes::from_static(b"new-value"),
            name: String::new(),
        }
    );
    assert_eq!(
        output.next_decoded::<GetStateEntryMessage>().unwrap().result,
        Some(get_state_entry_message::Result::Value(Bytes::from_static(
            b"new-value"
        )))
    );
    assert_eq!(output.next_ty(), None);
}

#[test]
fn clear_removes_key_from_eager_cache() {
    let mut output = EngineTestCase::new()
        .input(start_message_with_state(1, false, vec![("STATE", "hello")]))
        .input(input_entry_message(b"req"))
        .run_bridge(|h| {
            h.input().unwrap();
            h.clear("STATE").unwrap();
            assert_eq!(h.get("STATE").unwrap(), None);
        });

    assert_eq!(
        output.next_decoded::<ClearStateEntryMessage>().unwrap(),
        ClearStateEntryMessage {
            key: Bytes::from_static(b"STATE"),
            name: String::new(),
        }
    );
    assert_eq!(
        output.next_decoded::<GetStateEntryMessage>().unwrap().result,
        Some(get_state_entry_message::Result::Empty(Default::default()))
    );
    assert_eq!(output.next_ty(), None);
}

#[test]
fn clear_all_drops_every_key_and_partial_flag() {
    let mut output = EngineTestCase::new()
        .input(start_message_with_state(
            1,
            true,
            vec![("A", "1"), ("B", "2")],
        ))
        .input(input_entry_message(b"req"))
        .run_bridge(|h| {
            h.input().unwrap();
            h.clear_all().unwrap();
            // Partial flag is cleared too, so an unseen key now resolves
            // Empty instead of suspending.
            assert_eq!(h.get("A").unwrap(), None);
        });

    assert_eq!(
        output.next_decoded::<ClearAllStateEntryMessage>().unwrap(),
        ClearAllStateEntryMessage {
            name: String::new()
        }
    );
    assert_eq!(
        output.next_decoded::<GetStateEntryMessage>().unwrap().result,
        Some(get_state_entry_message::Result::Empty(Default::default()))
    );
    assert_eq!(output.next_ty(), None);
}

#[test]
fn get_keys_returns_sorted_keys_when_not_partial() {
    let mut output = EngineTestCase::new()
        .input(start_message_with_state(
            1,
            false,
            vec![("b", "2"), ("a", "1")],
        ))
        .input(input_entry_message(b"req"))
        .run_bridge(|h| {
            h.input().unwrap();
            assert_eq!(h.get_keys().unwrap(), vec!["a".to_string(), "b".to_string()]);
        });

    assert_eq!(
        output.next_decoded::<GetStateKeysEntryMessage>().unwrap(),
        GetStateKeysEntryMessage {
            name: String::new(),
            result: Some(get_state_keys_entry_message::Result::Value(
                get_state_keys_entry_message::StateKeys {
                    keys: vec![Bytes::from_static(b"a"), Bytes::from_static(b"b")],
                }
            )),
        }
    );
    assert_eq!(output.next_ty(), None);
}

#[test]
fn get_keys_suspends_when_partial() {
    let mut output = EngineTestCase::new()
        .input(start_message_with_state(1, true, vec![]))
        .input(input_entry_message(b"req"))
        .run_bridge(|h| {
            h.input().unwrap();
            assert_eq!(h.get_keys(), Err(AwaitError::Suspended));
        });

    assert_eq!(
        output.next_decoded::<GetStateKeysEntryMessage>().unwrap().result,
        None
    );
    assert_eq!(
        output.next_decoded::<SuspensionMessage>().unwrap(),
        SuspensionMessage {
            entry_indexes: vec![1]
        }
    );
    assert_eq!(output.next_ty(), None);
}

#[test]
fn replay_reuses_recorded_value_without_new_output() {
    let mut output = EngineTestCase::new()
        .input(start_message(2))
        .input(input_entry_message(b"req"))
        .input(GetStateEntryMessage {
            key: Bytes::from_static(b"STATE"),
            name: String::new(),
            result: Some(get_state_entry_message::Result::Value(Bytes::from_static(
                b"cached",
            ))),
        })
        .run_bridge(|h| {
            h.input().unwrap();
            assert_eq!(h.get("STATE").unwrap(), Some(Bytes::from_static(b"cached")));
        });

    assert_eq!(output.next_ty(), None);
}

#[test]
fn replay_mismatch_on_key_fails_with_journal_mismatch() {
    let mut output = EngineTestCase::new()
        .input(start_message(2))
        .input(input_entry_message(b"req"))
        .input(GetStateEntryMessage {
            key: Bytes::from_static(b"other"),
            name: String::new(),
            result: None,
        })
        .run_bridge(|h| {
            h.input().unwrap();
            match h.get("STATE") {
                Err(AwaitError::VM(e)) => assert_eq!(e.code(), codes::JOURNAL_MISMATCH.code()),
                other => panic!("expected journal mismatch, got {other:?}"),
            }
        });

    let err = output.next_decoded::<ErrorMessage>().unwrap();
    assert_eq!(err.code, codes::JOURNAL_MISMATCH.code() as u32);
    assert_eq!(output.next_ty(), None);
}

#[test]
fn replay_completion_waiting_for_runtime_resolves_via_side_channel() {
    // The second input isn't a recorded entry with an inline result; it's
    // still a pending replayed entry. The subsequent CompletionMessage
    // resolves it out of band, same as a live completion arriving mid-replay.
    let mut output = EngineTestCase::new()
        .input(start_message(2))
        .input(input_entry_message(b"req"))
        .input(GetStateEntryMessage {
            key: Bytes::from_static(b"STATE"),
            name: String::new(),
            result: None,
        })
        .input(completion_value(1, b"late"))
        .run_bridge(|h| {
            h.input().unwrap();
            assert_eq!(h.get("STATE").unwrap(), Some(Bytes::from_static(b"late")));
        });

    assert_eq!(output.next_ty(), None);
}
