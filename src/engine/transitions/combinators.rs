use crate::engine::{decode_err, errors, CoreEngine};
use crate::protocol::messages::{CombinatorEntryMessage, RestateMessage};
use crate::{AsyncResultAccessTracker, AsyncResultCombinator, AsyncResultHandle, VMResult};

impl CoreEngine {
    /// Drives one `all`/`any` combinator to resolution.
    ///
    /// In processing mode, queries `combinator.try_complete` against live
    /// access tracking; once it resolves, records a `CombinatorEntry`
    /// capturing the child resolution order so replay reproduces the same
    /// winner regardless of actual arrival order, and returns a handle to
    /// that entry (not the order itself) — the order becomes available via
    /// `take_async_result`/`await_one` only once the entry is acked, same as
    /// a `RunEntry`. In replay mode the entry is already durable, so the
    /// order is ready immediately.
    pub fn sys_try_complete_combinator<C: AsyncResultCombinator>(
        &mut self,
        combinator: &C,
    ) -> VMResult<Option<AsyncResultHandle>> {
        self.check_not_terminated()?;

        if self.in_replay() {
            self.context.journal.set_current(CombinatorEntryMessage::ty(), None);
            let raw = self.pop_replay_entry()?;
            if raw.ty() != CombinatorEntryMessage::ty() {
                let index = self.context.journal.index();
                let actual = format!("{:?}", raw.ty());
                return Err(self.fail(errors::journal_mismatch(index, &actual, "CombinatorEntry")));
            }
            let decoded: CombinatorEntryMessage = raw.decode_to().map_err(|e| self.fail(decode_err(e)))?;
            let index = self.advance_journal();
            let order = decoded
                .completed_entries_order
                .into_iter()
                .map(AsyncResultHandle::new)
                .collect();
            let _ = self
                .context
                .async_results
                .insert_ready_result(index, Ok(crate::Value::CombinatorOrder(order)));
            return Ok(Some(AsyncResultHandle::new(index)));
        }

        let snapshot = self.context.async_results.get_ready_results_state(combinator.children());
        let mut tracker = AsyncResultAccessTracker::from_snapshot(snapshot);
        match combinator.try_complete(&mut tracker) {
            Some(order) => {
                let index = self.advance_journal();
                self.context.output.send(&CombinatorEntryMessage {
                    completed_entries_order: order.iter().map(|h| h.index()).collect(),
                });
                self.context
                    .async_results
                    .insert_waiting_ack_result(index, Ok(crate::Value::CombinatorOrder(order)));
                Ok(Some(AsyncResultHandle::new(index)))
            }
            None => Ok(None),
        }
    }
}
