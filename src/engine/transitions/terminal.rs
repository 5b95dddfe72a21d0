use bytes::Bytes;

use super::check_header_match;
use crate::engine::{CoreEngine, State};
use crate::protocol::messages::{output_entry_message, Failure, OutputEntryMessage};
use crate::{TerminalFailure, VMResult};

impl CoreEngine {
    /// Appends the (at most one) Output entry and closes the invocation.
    /// Idempotent against replay: on replay this matches the previously
    /// recorded Output entry and simply closes without re-emitting it.
    pub fn sys_write_output(&mut self, result: Result<Bytes, TerminalFailure>) -> VMResult<()> {
        self.check_not_terminated()?;

        let oneof = match result {
            Ok(b) => output_entry_message::Result::Value(b),
            Err(f) => output_entry_message::Result::Failure(Failure::from(f)),
        };

        if self.in_replay() {
            let candidate = OutputEntryMessage {
                name: String::new(),
                result: Some(oneof),
            };
            check_header_match(self, &candidate)?;
            self.advance_journal();
        } else {
            self.context.output.send(&OutputEntryMessage {
                name: String::new(),
                result: Some(oneof),
            });
            self.advance_journal();
        }

        self.context.output.send_eof();
        self.state = State::Closed;
        Ok(())
    }

    /// Hard error path: a fatal condition the caller detected itself (a
    /// non-terminal exception escaping user code, a serialization failure
    /// mid-replay, etc). Always closes.
    pub fn sys_hit_error(&mut self, err: crate::Error) -> crate::Error {
        self.fail(err)
    }
}
