use bytes::Bytes;

use crate::engine::{decode_err, errors, CoreEngine};
use crate::protocol::messages::{
    awakeable_entry_message, call_entry_message, complete_awakeable_entry_message,
    complete_promise_entry_message, get_promise_entry_message, get_state_entry_message,
    get_state_keys_entry_message, peek_promise_entry_message, sleep_entry_message,
    AwakeableEntryMessage, CallEntryMessage, ClearAllStateEntryMessage, ClearStateEntryMessage,
    CompleteAwakeableEntryMessage, CompletePromiseEntryMessage, CompletionParsingHint, Empty,
    EntryMessageHeaderEq, Failure, GetPromiseEntryMessage, GetStateEntryMessage,
    GetStateKeysEntryMessage, OneWayCallEntryMessage, PeekPromiseEntryMessage, RestateMessage,
    SetStateEntryMessage, SleepEntryMessage,
};
use crate::{
    AsyncResultHandle, Header, TerminalFailure, Value, VMResult,
};

use super::super::context::EagerGetState;

/// Replays `candidate` against the next pending journal entry, failing with
/// `JOURNAL_MISMATCH` if the entry kind or essential fields differ.
pub(crate) fn check_header_match<M>(engine: &mut CoreEngine, candidate: &M) -> VMResult<M>
where
    M: RestateMessage + EntryMessageHeaderEq,
{
    engine.context.journal.set_current(M::ty(), None);
    let raw = engine.pop_replay_entry()?;
    if raw.ty() != M::ty() {
        let index = engine.context.journal.index();
        let actual = format!("{:?}", raw.ty());
        let expected = format!("{:?}", M::ty());
        return Err(engine.fail(errors::journal_mismatch(index, &actual, &expected)));
    }
    let decoded: M = raw.decode_to().map_err(|e| engine.fail(decode_err(e)))?;
    if !candidate.header_eq(&decoded) {
        let index = engine.context.journal.index();
        return Err(engine.fail(errors::journal_mismatch(
            index,
            "entry with different essential fields",
            "current user operation",
        )));
    }
    Ok(decoded)
}

fn service_headers(headers: Vec<Header>) -> Vec<crate::protocol::messages::Header> {
    headers
        .into_iter()
        .map(|h| crate::protocol::messages::Header {
            key: h.key.into_owned(),
            value: h.value.into_owned(),
        })
        .collect()
}

impl CoreEngine {
    pub fn sys_state_get(&mut self, key: impl Into<Bytes>) -> VMResult<AsyncResultHandle> {
        self.check_not_terminated()?;
        let key: Bytes = key.into();

        if self.in_replay() {
            let candidate = GetStateEntryMessage {
                key: key.clone(),
                name: String::new(),
                result: None,
            };
            let decoded = check_header_match(self, &candidate)?;
            let index = self.advance_journal();
            if let Some(result) = decoded.result {
                let parsed: Result<Value, TerminalFailure> = result.try_into();
                let _ = self.context.async_results.insert_ready_result(index, parsed);
            } else {
                self.context
                    .async_results
                    .insert_completion_parsing_hint(index, CompletionParsingHint::EmptyOrSuccessOrValue);
            }
            return Ok(AsyncResultHandle::new(index));
        }

        let key_str = String::from_utf8_lossy(&key).into_owned();
        let index = self.advance_journal();
        match self.context.eager_state.get(&key_str) {
            EagerGetState::Value(v) => {
                let msg = GetStateEntryMessage {
                    key,
                    name: String::new(),
                    result: Some(get_state_entry_message::Result::Value(v.clone())),
                };
                self.context.output.send(&msg);
                let _ = self
                    .context
                    .async_results
                    .insert_ready_result(index, Ok(Value::Success(v)));
            }
            EagerGetState::Empty => {
                let msg = GetStateEntryMessage {
                    key,
                    name: String::new(),
                    result: Some(get_state_entry_message::Result::Empty(Empty {})),
                };
                self.context.output.send(&msg);
                let _ = self
                    .context
                    .async_results
                    .insert_ready_result(index, Ok(Value::Void));
            }
            EagerGetState::Unknown => {
                let msg = GetStateEntryMessage {
                    key,
                    name: String::new(),
                    result: None,
                };
                self.context.output.send(&msg);
                self.context
                    .async_results
                    .insert_completion_parsing_hint(index, CompletionParsingHint::EmptyOrSuccessOrValue);
            }
        }
        Ok(AsyncResultHandle::new(index))
    }

    pub fn sys_state_get_keys(&mut self) -> VMResult<AsyncResultHandle> {
        self.check_not_terminated()?;

        if self.in_replay() {
            let candidate = GetStateKeysEntryMessage {
                name: String::new(),
                result: None,
            };
            let decoded = check_header_match(self, &candidate)?;
            let index = self.advance_journal();
            if let Some(result) = decoded.result {
                let parsed: Result<Value, TerminalFailure> = result.try_into();
                let _ = self.context.async_results.insert_ready_result(index, parsed);
            } else {
                self.context
                    .async_results
                    .insert_completion_parsing_hint(index, CompletionParsingHint::StateKeys);
            }
            return Ok(AsyncResultHandle::new(index));
        }

        let index = self.advance_journal();
        match self.context.eager_state.get_keys() {
            Some(keys) => {
                let msg = GetStateKeysEntryMessage {
                    name: String::new(),
                    result: Some(get_state_keys_entry_message::Result::Value(
                        get_state_keys_entry_message::StateKeys {
                            keys: keys.iter().map(|k| Bytes::from(k.clone().into_bytes())).collect(),
                        },
                    )),
                };
                self.context.output.send(&msg);
                let _ = self
                    .context
                    .async_results
                    .insert_ready_result(index, Ok(Value::StateKeys(keys)));
            }
            None => {
                let msg = GetStateKeysEntryMessage {
                    name: String::new(),
                    result: None,
                };
                self.context.output.send(&msg);
                self.context
                    .async_results
                    .insert_completion_parsing_hint(index, CompletionParsingHint::StateKeys);
            }
        }
        Ok(AsyncResultHandle::new(index))
    }

    pub fn sys_state_set(&mut self, key: impl Into<Bytes>, value: impl Into<Bytes>) -> VMResult<()> {
        self.check_not_terminated()?;
        let key: Bytes = key.into();
        let value: Bytes = value.into();

        if self.in_replay() {
            let candidate = SetStateEntryMessage {
                key: key.clone(),
                value: value.clone(),
                name: String::new(),
            };
            check_header_match(self, &candidate)?;
            self.advance_journal();
        } else {
            let msg = SetStateEntryMessage {
                key: key.clone(),
                value: value.clone(),
                name: String::new(),
            };
            self.context.output.send(&msg);
            self.advance_journal();
        }
        self.context
            .eager_state
            .set(String::from_utf8_lossy(&key).into_owned(), value);
        Ok(())
    }

    pub fn sys_state_clear(&mut self, key: impl Into<Bytes>) -> VMResult<()> {
        self.check_not_terminated()?;
        let key: Bytes = key.into();

        if self.in_replay() {
            let candidate = ClearStateEntryMessage {
                key: key.clone(),
                name: String::new(),
            };
            check_header_match(self, &candidate)?;
            self.advance_journal();
        } else {
            let msg = ClearStateEntryMessage {
                key: key.clone(),
                name: String::new(),
            };
            self.context.output.send(&msg);
            self.advance_journal();
        }
        self.context
            .eager_state
            .clear(&String::from_utf8_lossy(&key));
        Ok(())
    }

    pub fn sys_state_clear_all(&mut self) -> VMResult<()> {
        self.check_not_terminated()?;

        if self.in_replay() {
            let candidate = ClearAllStateEntryMessage {
                name: String::new(),
            };
            check_header_match(self, &candidate)?;
            self.advance_journal();
        } else {
            self.context.output.send(&ClearAllStateEntryMessage {
                name: String::new(),
            });
            self.advance_journal();
        }
        self.context.eager_state.clear_all();
        Ok(())
    }

    pub fn sys_sleep(&mut self, wake_up_time_millis: u64) -> VMResult<AsyncResultHandle> {
        self.check_not_terminated()?;

        if self.in_replay() {
            let candidate = SleepEntryMessage {
                wake_up_time: wake_up_time_millis,
                name: String::new(),
                result: None,
            };
            let decoded = check_header_match(self, &candidate)?;
            let index = self.advance_journal();
            if let Some(result) = decoded.result {
                let parsed: Result<Value, TerminalFailure> = result.try_into();
                let _ = self.context.async_results.insert_ready_result(index, parsed);
            }
            return Ok(AsyncResultHandle::new(index));
        }

        let index = self.advance_journal();
        self.context.output.send(&SleepEntryMessage {
            wake_up_time: wake_up_time_millis,
            name: String::new(),
            result: None,
        });
        Ok(AsyncResultHandle::new(index))
    }

    pub fn sys_call(
        &mut self,
        target: crate::Target,
        parameter: impl Into<Bytes>,
        headers: Vec<Header>,
    ) -> VMResult<AsyncResultHandle> {
        self.check_not_terminated()?;
        let parameter = parameter.into();

        if self.in_replay() {
            let candidate = CallEntryMessage {
                service_name: target.service.clone(),
                handler_name: target.handler.clone(),
                parameter: parameter.clone(),
                headers: service_headers(headers.clone()),
                key: target.key.clone().unwrap_or_default(),
                name: String::new(),
                result: None,
            };
            let decoded = check_header_match(self, &candidate)?;
            let index = self.advance_journal();
            if let Some(result) = decoded.result {
                let parsed: Result<Value, TerminalFailure> = result.try_into();
                let _ = self.context.async_results.insert_ready_result(index, parsed);
            }
            return Ok(AsyncResultHandle::new(index));
        }

        let index = self.advance_journal();
        self.context.output.send(&CallEntryMessage {
            service_name: target.service,
            handler_name: target.handler,
            parameter,
            headers: service_headers(headers),
            key: target.key.unwrap_or_default(),
            name: String::new(),
            result: None,
        });
        Ok(AsyncResultHandle::new(index))
    }

    pub fn sys_one_way_call(
        &mut self,
        target: crate::Target,
        parameter: impl Into<Bytes>,
        headers: Vec<Header>,
        delay_millis: u64,
    ) -> VMResult<()> {
        self.check_not_terminated()?;
        let parameter = parameter.into();

        if self.in_replay() {
            let candidate = OneWayCallEntryMessage {
                service_name: target.service.clone(),
                handler_name: target.handler.clone(),
                parameter: parameter.clone(),
                invoke_time: delay_millis,
                headers: service_headers(headers.clone()),
                key: target.key.clone().unwrap_or_default(),
                name: String::new(),
            };
            check_header_match(self, &candidate)?;
            self.advance_journal();
            return Ok(());
        }

        self.context.output.send(&OneWayCallEntryMessage {
            service_name: target.service,
            handler_name: target.handler,
            parameter,
            invoke_time: delay_millis,
            headers: service_headers(headers),
            key: target.key.unwrap_or_default(),
            name: String::new(),
        });
        self.advance_journal();
        Ok(())
    }

    pub fn sys_awakeable(&mut self) -> VMResult<(String, AsyncResultHandle)> {
        self.check_not_terminated()?;

        if self.in_replay() {
            let candidate = AwakeableEntryMessage {
                name: String::new(),
                result: None,
            };
            let decoded = check_header_match(self, &candidate)?;
            let index = self.advance_journal();
            if let Some(result) = decoded.result {
                let parsed: Result<Value, TerminalFailure> = result.try_into();
                let _ = self.context.async_results.insert_ready_result(index, parsed);
            }
            let id = Self::awakeable_id(
                &self
                    .context
                    .start_info
                    .as_ref()
                    .map(|s| s.id.clone())
                    .unwrap_or_default(),
                index,
            );
            return Ok((id, AsyncResultHandle::new(index)));
        }

        let index = self.advance_journal();
        self.context.output.send(&AwakeableEntryMessage {
            name: String::new(),
            result: None,
        });
        let id = Self::awakeable_id(
            &self
                .context
                .start_info
                .as_ref()
                .map(|s| s.id.clone())
                .unwrap_or_default(),
            index,
        );
        Ok((id, AsyncResultHandle::new(index)))
    }

    pub fn sys_complete_awakeable(
        &mut self,
        id: String,
        result: Result<Bytes, TerminalFailure>,
    ) -> VMResult<()> {
        self.check_not_terminated()?;
        let result = match result {
            Ok(b) => complete_awakeable_entry_message::Result::Value(b),
            Err(f) => complete_awakeable_entry_message::Result::Failure(Failure::from(f)),
        };

        if self.in_replay() {
            let candidate = CompleteAwakeableEntryMessage {
                id: id.clone(),
                name: String::new(),
                result: Some(result),
            };
            check_header_match(self, &candidate)?;
            self.advance_journal();
            return Ok(());
        }

        self.context.output.send(&CompleteAwakeableEntryMessage {
            id,
            name: String::new(),
            result: Some(result),
        });
        self.advance_journal();
        Ok(())
    }

    pub fn sys_get_promise(&mut self, key: String) -> VMResult<AsyncResultHandle> {
        self.check_not_terminated()?;

        if self.in_replay() {
            let candidate = GetPromiseEntryMessage {
                key: key.clone(),
                name: String::new(),
                result: None,
            };
            let decoded = check_header_match(self, &candidate)?;
            let index = self.advance_journal();
            if let Some(result) = decoded.result {
                let parsed: Result<Value, TerminalFailure> = result.try_into();
                let _ = self.context.async_results.insert_ready_result(index, parsed);
            }
            return Ok(AsyncResultHandle::new(index));
        }

        let index = self.advance_journal();
        self.context.output.send(&GetPromiseEntryMessage {
            key,
            name: String::new(),
            result: None,
        });
        Ok(AsyncResultHandle::new(index))
    }

    pub fn sys_peek_promise(&mut self, key: String) -> VMResult<AsyncResultHandle> {
        self.check_not_terminated()?;

        if self.in_replay() {
            let candidate = PeekPromiseEntryMessage {
                key: key.clone(),
                name: String::new(),
                result: None,
            };
            let decoded = check_header_match(self, &candidate)?;
            let index = self.advance_journal();
            if let Some(result) = decoded.result {
                let parsed: Result<Value, TerminalFailure> = result.try_into();
                let _ = self.context.async_results.insert_ready_result(index, parsed);
            }
            return Ok(AsyncResultHandle::new(index));
        }

        let index = self.advance_journal();
        self.context.output.send(&PeekPromiseEntryMessage {
            key,
            name: String::new(),
            result: None,
        });
        Ok(AsyncResultHandle::new(index))
    }

    pub fn sys_complete_promise(
        &mut self,
        key: String,
        completion: Result<Bytes, TerminalFailure>,
    ) -> VMResult<AsyncResultHandle> {
        self.check_not_terminated()?;
        let completion = match completion {
            Ok(b) => complete_promise_entry_message::Completion::CompletionValue(b),
            Err(f) => complete_promise_entry_message::Completion::CompletionFailure(Failure::from(f)),
        };

        if self.in_replay() {
            let candidate = CompletePromiseEntryMessage {
                key: key.clone(),
                completion: Some(completion),
                name: String::new(),
                result: None,
            };
            let decoded = check_header_match(self, &candidate)?;
            let index = self.advance_journal();
            if let Some(result) = decoded.result {
                let parsed: Result<Value, TerminalFailure> = match result {
                    complete_promise_entry_message::Result::Empty(_) => Ok(Value::Void),
                    complete_promise_entry_message::Result::Failure(f) => Err(f.into()),
                };
                let _ = self.context.async_results.insert_ready_result(index, parsed);
            }
            return Ok(AsyncResultHandle::new(index));
        }

        let index = self.advance_journal();
        self.context.output.send(&CompletePromiseEntryMessage {
            key,
            completion: Some(completion),
            name: String::new(),
            result: None,
        });
        Ok(AsyncResultHandle::new(index))
    }
}
