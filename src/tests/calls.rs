use bytes::Bytes;
use test_log::test;

use super::{input_entry_message, start_message, EngineTestCase};
use crate::bridge::AwaitError;
use crate::engine::errors::codes;
use crate::protocol::messages::{call_entry_message, CallEntryMessage, OneWayCallEntryMessage, SuspensionMessage};
use crate::Target;

fn greeter() -> Target {
    Target {
        service: "greeter".to_owned(),
        handler: "greet".to_owned(),
        key: Some("my-key".to_owned()),
    }
}

#[test]
fn fresh_call_suspends_pending_a_completion() {
    let mut output = EngineTestCase::new()
        .input(start_message(1))
        .input(input_entry_message(b"req"))
        .run_bridge(|h| {
            h.input().unwrap();
            assert_eq!(h.call(greeter(), Bytes::from_static(b"hi"), vec![]), Err(AwaitError::Suspended));
        });

    assert_eq!(
        output.next_decoded::<CallEntryMessage>().unwrap(),
        CallEntryMessage {
            service_name: "greeter".to_owned(),
            handler_name: "greet".to_owned(),
            parameter: Bytes::from_static(b"hi"),
            headers: vec![],
            key: "my-key".to_owned(),
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
fn replay_reuses_recorded_response() {
    let mut output = EngineTestCase::new()
        .input(start_message(2))
        .input(input_entry_message(b"req"))
        .input(CallEntryMessage {
            service_name: "greeter".to_owned(),
            handler_name: "greet".to_owned(),
            parameter: Bytes::from_static(b"hi"),
            headers: vec![],
            key: "my-key".to_owned(),
            name: String::new(),
            result: Some(call_entry_message::Result::Value(Bytes::from_static(b"hello back"))),
        })
        .run_bridge(|h| {
            h.input().unwrap();
            assert_eq!(h.call(greeter(), Bytes::from_static(b"hi"), vec![]).unwrap(), Bytes::from_static(b"hello back"));
        });

    assert_eq!(output.next_ty(), None);
}

#[test]
fn replay_mismatch_on_parameter_is_a_journal_mismatch() {
    let mut output = EngineTestCase::new()
        .input(start_message(2))
        .input(input_entry_message(b"req"))
        .input(CallEntryMessage {
            service_name: "greeter".to_owned(),
            handler_name: "greet".to_owned(),
            parameter: Bytes::from_static(b"different"),
            headers: vec![],
            key: "my-key".to_owned(),
            name: String::new(),
            result: None,
        })
        .run_bridge(|h| {
            h.input().unwrap();
            match h.call(greeter(), Bytes::from_static(b"hi"), vec![]) {
                Err(AwaitError::VM(e)) => assert_eq!(e.code(), codes::JOURNAL_MISMATCH.code()),
                other => panic!("expected journal mismatch, got {other:?}"),
            }
        });

    assert_eq!(output.next_decoded::<crate::protocol::messages::ErrorMessage>().unwrap().code, codes::JOURNAL_MISMATCH.code() as u32);
}

#[test]
fn one_way_call_does_not_block() {
    let mut output = EngineTestCase::new()
        .input(start_message(1))
        .input(input_entry_message(b"req"))
        .run_bridge(|h| {
            h.input().unwrap();
            h.one_way_call(greeter(), Bytes::from_static(b"fire"), vec![]).unwrap();
        });

    assert_eq!(
        output.next_decoded::<OneWayCallEntryMessage>().unwrap(),
        OneWayCallEntryMessage {
            service_name: "greeter".to_owned(),
            handler_name: "greet".to_owned(),
            parameter: Bytes::from_static(b"fire"),
            invoke_time: 0,
            headers: vec![],
            key: "my-key".to_owned(),
            name: String::new(),
        }
    );
    assert_eq!(output.next_ty(), None);
}

#[test]
fn delayed_call_carries_the_invoke_time() {
    let mut output = EngineTestCase::new()
        .input(start_message(1))
        .input(input_entry_message(b"req"))
        .run_bridge(|h| {
            h.input().unwrap();
            h.delayed_call(greeter(), Bytes::from_static(b"later"), vec![], std::time::Duration::from_millis(5000))
                .unwrap();
        });

    assert_eq!(
        output.next_decoded::<OneWayCallEntryMessage>().unwrap().invoke_time,
        5000
    );
    assert_eq!(output.next_ty(), None);
}
