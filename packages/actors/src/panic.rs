//! Panic isolation for task execution.
//!
//! A process-wide panic hook records the backtrace of panics raised while a
//! task is being polled. The backtrace has to be taken inside the hook:
//! by the time `catch_unwind` returns, the panicking frames are gone.

use std::backtrace::Backtrace;
use std::cell::{Cell, RefCell};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Once;
use std::task::Poll;

use futures_util::FutureExt;

use crate::TaskResult;
use crate::messages::TaskOutcome;

thread_local! {
    static CAPTURING: Cell<bool> = const { Cell::new(false) };
    static LAST_BACKTRACE: RefCell<Option<String>> = const { RefCell::new(None) };
}

static HOOK: Once = Once::new();

fn install_hook() {
    HOOK.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            if CAPTURING.with(Cell::get) {
                let trace = format!("{info}\n{}", Backtrace::force_capture());
                LAST_BACKTRACE.with(|slot| *slot.borrow_mut() = Some(trace));
            } else {
                previous(info);
            }
        }));
    });
}

struct CaptureGuard;

impl CaptureGuard {
    fn enter() -> Self {
        CAPTURING.with(|c| c.set(true));
        CaptureGuard
    }
}

impl Drop for CaptureGuard {
    fn drop(&mut self) {
        CAPTURING.with(|c| c.set(false));
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Drive a task future to completion, turning a panic into
/// [`TaskOutcome::Panicked`].
pub(crate) async fn run_guarded<F>(fut: F) -> TaskOutcome
where
    F: Future<Output = TaskResult> + Send,
{
    install_hook();
    let mut fut = Box::pin(fut);
    let polled = futures_util::future::poll_fn(move |cx| -> Poll<TaskResult> {
        let _capture = CaptureGuard::enter();
        fut.as_mut().poll(cx)
    });

    match AssertUnwindSafe(polled).catch_unwind().await {
        Ok(Ok(())) => TaskOutcome::Completed,
        Ok(Err(e)) => TaskOutcome::Errored(e.to_string()),
        Err(payload) => {
            let backtrace = LAST_BACKTRACE
                .with(|slot| slot.borrow_mut().take())
                .unwrap_or_else(|| "<no backtrace captured>".to_string());
            TaskOutcome::Panicked {
                message: panic_message(payload.as_ref()),
                backtrace,
            }
        }
    }
}
