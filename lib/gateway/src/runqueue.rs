// SPDX-FileCopyrightText: Copyright (c) 2024-2025 Archway Contributors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Phase-ordered deferred execution.
//!
//! The gateway moves through coarse lifecycle phases; work submitted for a
//! phase that has not run yet is queued, work submitted for a phase already
//! executed runs inline. This decouples service registration (any time) from
//! service wiring (Setup).

use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::{error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    Init,
    Setup,
}

type Task = Box<dyn FnOnce() -> Result<()> + Send>;

#[derive(Default)]
pub struct RunQueue {
    cur: Option<Phase>,
    init: Vec<Task>,
    setup: Vec<Task>,
}

impl RunQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// The most recently executed phase, if any.
    pub fn current(&self) -> Option<Phase> {
        self.cur
    }

    /// Submit `task` for `phase`. Runs inline when the phase has already
    /// been executed; queued otherwise.
    pub fn call(&mut self, phase: Phase, task: impl FnOnce() -> Result<()> + Send + 'static) -> Result<()> {
        if self.cur >= Some(phase) {
            return shielded(Box::new(task));
        }
        self.queue_for(phase).push(Box::new(task));
        Ok(())
    }

    /// Advance the cursor to `phase` and drain every queued task for phases
    /// up to and including it, in submission order. The first error aborts
    /// the drain and is returned; remaining tasks stay queued.
    pub fn advance(&mut self, phase: Phase) -> Result<()> {
        self.cur = Some(phase);

        for p in [Phase::Init, Phase::Setup] {
            if p > phase {
                break;
            }
            let tasks = std::mem::take(self.queue_for(p));
            let mut iter = tasks.into_iter();
            for task in iter.by_ref() {
                if let Err(err) = shielded(task) {
                    // put the unexecuted remainder back
                    self.queue_for(p).extend(iter);
                    return Err(err);
                }
            }
        }

        Ok(())
    }

    fn queue_for(&mut self, phase: Phase) -> &mut Vec<Task> {
        match phase {
            Phase::Init => &mut self.init,
            Phase::Setup => &mut self.setup,
        }
    }
}

/// Run a task converting panics into errors; the blast radius of a bad task
/// is the task, not the process.
fn shielded(task: Task) -> Result<()> {
    match catch_unwind(AssertUnwindSafe(task)) {
        Ok(result) => result,
        Err(panic) => {
            let msg = panic_message(&panic);
            Err(error!("task panicked: {msg}"))
        }
    }
}

pub(crate) fn panic_message(panic: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_queued_until_phase_runs() {
        let mut rq = RunQueue::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let h = hits.clone();
        rq.call(Phase::Setup, move || {
            h.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        rq.advance(Phase::Init).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        rq.advance(Phase::Setup).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_inline_after_phase() {
        let mut rq = RunQueue::new();
        rq.advance(Phase::Setup).unwrap();

        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        rq.call(Phase::Init, move || {
            h.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        let h = hits.clone();
        rq.call(Phase::Setup, move || {
            h.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_submission_order() {
        let mut rq = RunQueue::new();
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));

        for i in 0..3 {
            let order = order.clone();
            rq.call(Phase::Setup, move || {
                order.lock().unwrap().push(i);
                Ok(())
            })
            .unwrap();
        }

        rq.advance(Phase::Setup).unwrap();
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn test_panic_becomes_error() {
        let mut rq = RunQueue::new();
        rq.call(Phase::Init, || panic!("boom")).unwrap();

        let err = rq.advance(Phase::Init).unwrap_err();
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn test_first_error_aborts_drain() {
        let mut rq = RunQueue::new();
        let hits = Arc::new(AtomicUsize::new(0));

        rq.call(Phase::Setup, || Err(crate::error!("first failure")))
            .unwrap();
        let h = hits.clone();
        rq.call(Phase::Setup, move || {
            h.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();

        assert!(rq.advance(Phase::Setup).is_err());
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }
}
