//! Thread-local context tracking for crash reports.
//!
//! Each thread (including rayon workers) records which file it is
//! instrumenting and in which phase. Global progress is kept in atomic
//! counters. Guards restore the previous context on drop.

use std::cell::RefCell;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

static FILES_PROCESSED: AtomicUsize = AtomicUsize::new(0);
static FILES_TOTAL: AtomicUsize = AtomicUsize::new(0);

thread_local! {
    static CURRENT_CONTEXT: RefCell<InstrumentContext> = const { RefCell::new(InstrumentContext::new()) };
}

/// What this thread was doing.
#[derive(Debug, Clone, Default)]
pub struct InstrumentContext {
    pub phase: Option<InstrumentPhase>,
    pub current_file: Option<PathBuf>,
}

impl InstrumentContext {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            phase: None,
            current_file: None,
        }
    }
}

/// Stages of the per-file pipeline plus the final compile step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstrumentPhase {
    Reading,
    CacheCheck,
    Parsing,
    Finding,
    Rewriting,
    Writing,
    Compiling,
}

impl std::fmt::Display for InstrumentPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Reading => write!(f, "reading"),
            Self::CacheCheck => write!(f, "cache_check"),
            Self::Parsing => write!(f, "parsing"),
            Self::Finding => write!(f, "finding"),
            Self::Rewriting => write!(f, "rewriting"),
            Self::Writing => write!(f, "writing"),
            Self::Compiling => write!(f, "compiling"),
        }
    }
}

/// Restores the previous context when dropped.
pub struct ContextGuard {
    previous: InstrumentContext,
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        CURRENT_CONTEXT.with(|ctx| {
            *ctx.borrow_mut() = self.previous.clone();
        });
    }
}

#[must_use]
pub fn set_phase(phase: InstrumentPhase) -> ContextGuard {
    CURRENT_CONTEXT.with(|ctx| {
        let previous = ctx.borrow().clone();
        ctx.borrow_mut().phase = Some(phase);
        ContextGuard { previous }
    })
}

#[must_use]
pub fn set_current_file(path: impl Into<PathBuf>) -> ContextGuard {
    CURRENT_CONTEXT.with(|ctx| {
        let previous = ctx.borrow().clone();
        ctx.borrow_mut().current_file = Some(path.into());
        ContextGuard { previous }
    })
}

pub fn set_progress(processed: usize, total: usize) {
    FILES_PROCESSED.store(processed, Ordering::Relaxed);
    FILES_TOTAL.store(total, Ordering::Relaxed);
}

pub fn increment_processed() {
    FILES_PROCESSED.fetch_add(1, Ordering::Relaxed);
}

#[must_use]
pub fn get_current_context() -> InstrumentContext {
    CURRENT_CONTEXT.with(|ctx| ctx.borrow().clone())
}

/// (processed, total)
#[must_use]
pub fn get_progress() -> (usize, usize) {
    (
        FILES_PROCESSED.load(Ordering::Relaxed),
        FILES_TOTAL.load(Ordering::Relaxed),
    )
}

pub fn reset_context() {
    CURRENT_CONTEXT.with(|ctx| {
        *ctx.borrow_mut() = InstrumentContext::new();
    });
}
