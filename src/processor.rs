//! # Processor Module
//!
//! The terminal stage of the pipeline.
//!
//! A [`Processor`] consumes an [`Item`] and reports the errors it ran into.
//! [`ItemPipeline`] threads the item through an ordered list of steps; with
//! `fail_fast` set it stops at the first failing step, otherwise it keeps
//! going with the item as the failing step left it.

use crate::error::{Result, SpiderError};
use crate::module::{Item, Mid, Module, ModuleBase, ModuleKind, ScoreFn};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::trace;

#[async_trait]
pub trait Processor: Module {
    /// Processes `item`, returning every error encountered.
    async fn send(&self, item: Item) -> Vec<SpiderError>;

    /// Whether processing stops at the first error.
    fn fail_fast(&self) -> bool;
}

/// One step of an item pipeline.
pub type ItemStep = Arc<dyn Fn(&mut Item) -> Result<()> + Send + Sync>;

pub struct ItemPipeline {
    base: ModuleBase,
    steps: Vec<ItemStep>,
    fail_fast: AtomicBool,
}

impl ItemPipeline {
    pub fn new(mid: Mid, steps: Vec<ItemStep>, fail_fast: bool) -> Result<Self> {
        if mid.kind() != ModuleKind::Processor {
            return Err(SpiderError::illegal_parameter(format!(
                "mid {} does not identify a processor",
                mid
            )));
        }
        if steps.is_empty() {
            return Err(SpiderError::illegal_parameter("item pipeline needs at least one step"));
        }
        Ok(Self {
            base: ModuleBase::new(mid),
            steps,
            fail_fast: AtomicBool::new(fail_fast),
        })
    }

    pub fn with_scorer(mut self, scorer: ScoreFn) -> Self {
        self.base = self.base.with_scorer(scorer);
        self
    }

    pub fn steps(&self) -> &[ItemStep] {
        &self.steps
    }

    pub fn set_fail_fast(&self, fail_fast: bool) {
        self.fail_fast.store(fail_fast, Ordering::SeqCst);
    }
}

impl Module for ItemPipeline {
    fn base(&self) -> &ModuleBase {
        &self.base
    }
}

#[async_trait]
impl Processor for ItemPipeline {
    async fn send(&self, item: Item) -> Vec<SpiderError> {
        let _handling = self.base.handling_guard();
        self.base.incr_called();
        if item.is_empty() {
            return vec![SpiderError::illegal_parameter("empty item")];
        }
        self.base.incr_accepted();

        let mut item = item;
        let mut errors = Vec::new();
        for (idx, step) in self.steps.iter().enumerate() {
            trace!("Processing item through step {} of {}", idx + 1, self.steps.len());
            if let Err(e) = step(&mut item) {
                errors.push(e);
                if self.fail_fast() {
                    break;
                }
            }
        }

        if errors.is_empty() {
            self.base.incr_completed();
        }
        errors
    }

    fn fail_fast(&self) -> bool {
        self.fail_fast.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for ItemPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ItemPipeline")
            .field("base", &self.base)
            .field("steps", &self.steps.len())
            .field("fail_fast", &self.fail_fast())
            .finish()
    }
}
