//! End-to-end walk-throughs of the handful of canonical request/response
//! shapes an adapter is expected to drive the engine through.

use bytes::Bytes;
use test_log::test;

use super::{input_entry_message, start_message, start_message_with_state, EngineTestCase};
use crate::engine::errors::codes;
use crate::protocol::messages::{
    get_state_entry_message, sleep_entry_message, ClearStateEntryMessage, Empty, ErrorMessage,
    GetStateEntryMessage, OutputEntryMessage, RunEntryMessage, SleepEntryMessage, SuspensionMessage,
};
use crate::TerminalFailure;

/// Reset counter: a handler that clears state and returns an empty output.
#[test]
fn reset_clears_state_and_returns_empty_output() {
    let mut output = EngineTestCase::new()
        .input(start_message(1))
        .input(input_entry_message(b"c"))
        .run(|engine| {
            engine.sys_input().unwrap();
            engine.sys_state_clear("total").unwrap();
            engine.sys_write_output(Ok(Bytes::new())).unwrap();
        });

    assert_eq!(
        output.next_decoded::<ClearStateEntryMessage>().unwrap(),
        ClearStateEntryMessage {
            key: Bytes::from_static(b"total"),
            name: String::new(),
        }
    );
    assert_eq!(
        output.next_decoded::<OutputEntryMessage>().unwrap().result,
        Some(crate::protocol::messages::output_entry_message::Result::Value(
            Bytes::new()
        ))
    );
    assert_eq!(output.next_ty(), None);
}

/// A `get` against a key already present in the eagerly-sent state map is
/// served straight from the cache, with no suspension.
#[test]
fn get_with_an_eager_cache_hit_never_suspends() {
    let mut output = EngineTestCase::new()
        .input(start_message_with_state(1, false, vec![("STATE", "hello")]))
        .input(input_entry_message(b"greeting-request"))
        .run_bridge(|h| {
            h.input().unwrap();
            let value = h.get("STATE").unwrap();
            h.write_output(Ok(value.unwrap())).unwrap();
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
    assert_eq!(
        output.next_decoded::<OutputEntryMessage>().unwrap().result,
        Some(crate::protocol::messages::output_entry_message::Result::Value(
            Bytes::from_static(b"hello")
        ))
    );
    assert_eq!(output.next_ty(), None);
}

/// Sleeping suspends the first time the handler runs; on the re-invocation
/// that replays the elapsed sleep, the handler completes straight through.
#[test]
fn sleep_suspends_then_completes_on_the_replayed_re_invocation() {
    let mut first_run = EngineTestCase::new()
        .input(start_message(1))
        .input(input_entry_message(b"req"))
        .run_bridge(|h| {
            h.input().unwrap();
            assert_eq!(
                h.sleep(std::time::Duration::from_millis(100)),
                Err(crate::bridge::AwaitError::Suspended)
            );
        });
    assert_eq!(
        first_run.next_decoded::<SleepEntryMessage>().unwrap().result,
        None
    );
    assert_eq!(
        first_run.next_decoded::<SuspensionMessage>().unwrap(),
        SuspensionMessage {
            entry_indexes: vec![1]
        }
    );
    assert_eq!(first_run.next_ty(), None);

    let mut second_run = EngineTestCase::new()
        .input(start_message(2))
        .input(input_entry_message(b"req"))
        .input(SleepEntryMessage {
            wake_up_time: 100,
            name: String::new(),
            result: Some(sleep_entry_message::Result::Empty(Empty {})),
        })
        .run(|engine| {
            engine.sys_input().unwrap();
            let handle = engine.sys_sleep(100).unwrap();
            assert_eq!(
                engine.take_async_result(handle).unwrap().unwrap(),
                crate::Value::Void
            );
            engine.sys_write_output(Ok(Bytes::new())).unwrap();
        });
    second_run.next_decoded::<OutputEntryMessage>().unwrap();
    assert_eq!(second_run.next_ty(), None);
}

/// A side-effect closure that itself issues another journalled operation is
/// rejected rather than silently nesting two entries.
#[test]
fn a_side_effect_cannot_fire_a_one_way_call_from_inside_its_closure() {
    let mut output = EngineTestCase::new()
        .input(start_message(1))
        .input(input_entry_message(b"req"))
        .run(|engine| {
            engine.sys_input().unwrap();
            engine.sys_run_enter("effect").unwrap();
            let err = engine
                .sys_one_way_call(
                    crate::Target {
                        service: "other".to_owned(),
                        handler: "h".to_owned(),
                        key: None,
                    },
                    Bytes::new(),
                    vec![],
                )
                .unwrap_err();
            assert_eq!(err.code(), codes::PROTOCOL_VIOLATION.code());
            assert!(err.message().contains("side effect"));
        });

    // Neither a RunEntryMessage nor a OneWayCallEntryMessage was ever sent:
    // the guard trips before the nested call is journalled.
    assert_eq!(output.next_ty(), None);
}

/// A journal replay mismatch (the recorded entry doesn't match what the
/// user code is actually asking for this time) closes the invocation.
#[test]
fn a_journal_entry_that_no_longer_matches_the_code_is_a_hard_error() {
    let mut output = EngineTestCase::new()
        .input(start_message(2))
        .input(input_entry_message(b"req"))
        .input(GetStateEntryMessage {
            key: Bytes::from_static(b"other"),
            name: String::new(),
            result: None,
        })
        .run(|engine| {
            engine.sys_input().unwrap();
            let err = engine.sys_state_get("STATE").unwrap_err();
            assert_eq!(err.code(), codes::JOURNAL_MISMATCH.code());
        });

    output.next_decoded::<ErrorMessage>().unwrap();
    assert_eq!(output.next_ty(), None);
}

/// A terminal failure is a normal (if unsuccessful) outcome: it closes the
/// invocation through the Output entry, not through an ErrorMessage.
#[test]
fn a_terminal_failure_closes_through_the_output_entry() {
    let mut output = EngineTestCase::new()
        .input(start_message(1))
        .input(input_entry_message(b"req"))
        .run(|engine| {
            engine.sys_input().unwrap();
            engine
                .sys_write_output(Err(TerminalFailure::new(500, "x")))
                .unwrap();
        });

    assert_eq!(
        output.next_decoded::<OutputEntryMessage>().unwrap().result,
        Some(crate::protocol::messages::output_entry_message::Result::Failure(
            crate::protocol::messages::Failure {
                code: 500,
                message: "x".to_owned(),
            }
        ))
    );
    assert_eq!(output.next_ty(), None);
}

/// A non-terminal, protocol-level failure closes through an ErrorMessage
/// instead, distinct from a terminal failure's Output entry.
#[test]
fn a_non_terminal_throw_closes_through_an_error_message() {
    let mut output = EngineTestCase::new()
        .input(start_message(1))
        .input(input_entry_message(b"req"))
        .run(|engine| {
            engine.sys_input().unwrap();
            let err = engine.sys_hit_error(crate::Error::internal("IllegalStateException: x"));
            assert_eq!(err.code(), codes::INTERNAL.code());
        });

    let err = output.next_decoded::<ErrorMessage>().unwrap();
    assert_eq!(err.code, codes::INTERNAL.code() as u32);
    assert!(err.message.contains("IllegalStateException"));
    assert_eq!(output.next_ty(), None);
}
