use crate::engine::{decode_err, errors, CoreEngine};
use crate::protocol::messages::{InputEntryMessage, RestateMessage};
use crate::{Header, Input, VMResult};

impl CoreEngine {
    /// Consumes the invocation's Input entry, always journal index 0.
    pub fn sys_input(&mut self) -> VMResult<Input> {
        self.check_not_terminated()?;

        self.context.journal.set_current(InputEntryMessage::ty(), None);
        let raw = self.pop_replay_entry()?;
        if raw.ty() != InputEntryMessage::ty() {
            let index = self.context.journal.index();
            let actual = format!("{:?}", raw.ty());
            return Err(self.fail(errors::journal_mismatch(index, &actual, "InputEntry")));
        }
        let decoded: InputEntryMessage = raw.decode_to().map_err(|e| self.fail(decode_err(e)))?;
        self.advance_journal();

        let start_info = self.context.expect_start_info()?.clone();
        Ok(Input {
            invocation_id: start_info.id,
            random_seed: start_info.random_seed,
            key: start_info.key,
            headers: decoded
                .headers
                .into_iter()
                .map(|h| Header {
                    key: h.key.into(),
                    value: h.value.into(),
                })
                .collect(),
            input: decoded.value,
        })
    }
}
