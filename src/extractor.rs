//! # Extractor Module
//!
//! The analysis stage of the pipeline.
//!
//! An [`Extractor`] turns a [`Response`] into [`Data`]: follow-up requests that
//! go back through admission control, and items for the processors. Errors are
//! returned alongside the data rather than instead of it, so a partially
//! successful extraction still feeds the pipeline.
//!
//! [`ParserExtractor`] runs an ordered list of parser functions against the
//! same response; the body is buffered, so every parser reads it from the
//! start.

use crate::error::{Result, SpiderError};
use crate::module::{Data, Mid, Module, ModuleBase, ModuleKind, Response, ScoreFn};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

#[async_trait]
pub trait Extractor: Module {
    async fn analyze(&self, response: Response) -> (Vec<Data>, Vec<SpiderError>);
}

/// A user-supplied parser.
pub type ParseFn = Arc<dyn Fn(&Response) -> (Vec<Data>, Vec<SpiderError>) + Send + Sync>;

pub struct ParserExtractor {
    base: ModuleBase,
    parsers: Vec<ParseFn>,
}

impl ParserExtractor {
    pub fn new(mid: Mid, parsers: Vec<ParseFn>) -> Result<Self> {
        if mid.kind() != ModuleKind::Extractor {
            return Err(SpiderError::illegal_parameter(format!(
                "mid {} does not identify an extractor",
                mid
            )));
        }
        if parsers.is_empty() {
            return Err(SpiderError::illegal_parameter("extractor needs at least one parser"));
        }
        Ok(Self {
            base: ModuleBase::new(mid),
            parsers,
        })
    }

    pub fn with_scorer(mut self, scorer: ScoreFn) -> Self {
        self.base = self.base.with_scorer(scorer);
        self
    }

    pub fn parsers(&self) -> &[ParseFn] {
        &self.parsers
    }
}

impl Module for ParserExtractor {
    fn base(&self) -> &ModuleBase {
        &self.base
    }
}

#[async_trait]
impl Extractor for ParserExtractor {
    async fn analyze(&self, response: Response) -> (Vec<Data>, Vec<SpiderError>) {
        let _handling = self.base.handling_guard();
        self.base.incr_called();
        self.base.incr_accepted();
        debug!("Parsing response {} at depth {}", response.url(), response.depth());

        let mut data = Vec::new();
        let mut errors = Vec::new();
        for parser in &self.parsers {
            let (parsed, failed) = parser(&response);
            data.extend(parsed);
            errors.extend(failed);
        }

        if errors.is_empty() {
            self.base.incr_completed();
        }
        (data, errors)
    }
}

impl fmt::Debug for ParserExtractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParserExtractor")
            .field("base", &self.base)
            .field("parsers", &self.parsers.len())
            .finish()
    }
}
