//! # Module Module
//!
//! Shared plumbing for every pipeline component.
//!
//! ## Overview
//!
//! Fetchers, extractors and processors all carry the same bookkeeping: an
//! identity ([`Mid`]), four usage counters and a score used by the registry to
//! balance load. That bookkeeping lives in [`ModuleBase`], which concrete
//! modules hold as a field and expose through the [`Module`] trait.
//!
//! Counters are plain atomics so a single module instance can be driven by
//! several pipeline tasks at once.

mod data;
mod mid;

pub use data::{Data, Item, Request, Response};
pub use mid::{Mid, ModuleKind, SerialGenerator};

use crate::error::Result;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Usage counters of a module.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counts {
    /// Times the module was invoked.
    pub called: u64,
    /// Invocations whose input passed validation.
    pub accepted: u64,
    /// Invocations that finished without error.
    pub completed: u64,
    /// Invocations currently in progress.
    pub handling: u64,
}

/// Computes a score from counts. Lower scores are preferred by the registry.
pub type ScoreFn = Arc<dyn Fn(&Counts) -> Result<u64> + Send + Sync>;

/// Default scorer: arithmetic mean of the four counters.
pub fn mean_score(counts: &Counts) -> Result<u64> {
    let sum = u128::from(counts.called)
        + u128::from(counts.accepted)
        + u128::from(counts.completed)
        + u128::from(counts.handling);
    Ok((sum / 4) as u64)
}

/// Point-in-time summary of a module.
#[derive(Debug, Clone, Serialize)]
pub struct ModuleSummary {
    pub id: Mid,
    #[serde(flatten)]
    pub counts: Counts,
}

/// Identity, counters and score shared by every module.
pub struct ModuleBase {
    mid: Mid,
    scorer: Option<ScoreFn>,
    score: AtomicU64,
    called: AtomicU64,
    accepted: AtomicU64,
    completed: AtomicU64,
    handling: AtomicU64,
}

impl ModuleBase {
    pub fn new(mid: Mid) -> Self {
        Self {
            mid,
            scorer: None,
            score: AtomicU64::new(0),
            called: AtomicU64::new(0),
            accepted: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            handling: AtomicU64::new(0),
        }
    }

    /// Replaces the default mean scorer.
    pub fn with_scorer(mut self, scorer: ScoreFn) -> Self {
        self.scorer = Some(scorer);
        self
    }

    pub fn id(&self) -> &Mid {
        &self.mid
    }

    pub fn score(&self) -> u64 {
        self.score.load(Ordering::SeqCst)
    }

    pub fn set_score(&self, score: u64) {
        self.score.store(score, Ordering::SeqCst);
    }

    /// Recomputes the score from the current counts and stores it.
    pub fn refresh_score(&self) -> Result<u64> {
        let counts = self.counts();
        let score = match &self.scorer {
            Some(scorer) => scorer(&counts)?,
            None => mean_score(&counts)?,
        };
        self.set_score(score);
        Ok(score)
    }

    pub fn counts(&self) -> Counts {
        Counts {
            called: self.called.load(Ordering::SeqCst),
            accepted: self.accepted.load(Ordering::SeqCst),
            completed: self.completed.load(Ordering::SeqCst),
            handling: self.handling.load(Ordering::SeqCst),
        }
    }

    pub fn incr_called(&self) {
        self.called.fetch_add(1, Ordering::SeqCst);
    }

    pub fn incr_accepted(&self) {
        self.accepted.fetch_add(1, Ordering::SeqCst);
    }

    pub fn incr_completed(&self) {
        self.completed.fetch_add(1, Ordering::SeqCst);
    }

    pub fn incr_handling(&self) {
        self.handling.fetch_add(1, Ordering::SeqCst);
    }

    pub fn decr_handling(&self) {
        // Never wraps below zero, even if a caller pairs these up wrongly.
        let _ = self
            .handling
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
    }

    /// Counts one in-progress invocation until the guard is dropped.
    pub fn handling_guard(&self) -> HandlingGuard<'_> {
        self.incr_handling();
        HandlingGuard { base: self }
    }

    pub fn clear(&self) {
        self.called.store(0, Ordering::SeqCst);
        self.accepted.store(0, Ordering::SeqCst);
        self.completed.store(0, Ordering::SeqCst);
        self.handling.store(0, Ordering::SeqCst);
        self.score.store(0, Ordering::SeqCst);
    }

    pub fn summary(&self) -> ModuleSummary {
        ModuleSummary {
            id: self.mid.clone(),
            counts: self.counts(),
        }
    }
}

impl fmt::Debug for ModuleBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleBase")
            .field("mid", &self.mid)
            .field("custom_scorer", &self.scorer.is_some())
            .field("counts", &self.counts())
            .finish()
    }
}

/// Decrements the handling counter on drop.
pub struct HandlingGuard<'a> {
    base: &'a ModuleBase,
}

impl Drop for HandlingGuard<'_> {
    fn drop(&mut self) {
        self.base.decr_handling();
    }
}

/// Capability shared by all pipeline components.
///
/// Implementors only provide [`base`](Module::base); everything else is
/// derived from it.
pub trait Module: Send + Sync + 'static {
    fn base(&self) -> &ModuleBase;

    fn id(&self) -> &Mid {
        self.base().id()
    }

    fn score(&self) -> u64 {
        self.base().score()
    }

    fn counts(&self) -> Counts {
        self.base().counts()
    }

    fn handling(&self) -> u64 {
        self.base().counts().handling
    }

    fn summary(&self) -> ModuleSummary {
        self.base().summary()
    }

    fn clear(&self) {
        self.base().clear()
    }
}
