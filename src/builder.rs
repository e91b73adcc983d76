//! # Builder Module
//!
//! Provides the `SchedulerBuilder`, a fluent API for assembling a ready to
//! start [`Scheduler`].
//!
//! ## Overview
//!
//! The builder collects the three argument groups accepted by
//! [`Scheduler::init`] (admission rules, pool sizes and modules) together with
//! an optional statistics sink, then initializes the scheduler in one step.
//!
//! ## Key Features
//!
//! - **Admission Configuration**: accepted domains and maximum depth
//! - **Pool Sizing**: per-pool buffer capacity and maximum buffer count,
//!   defaulting to [`DataArgs::default`]
//! - **Module Registration**: fetchers, extractors and processors
//! - **Statistics Integration**: share a `StatCollector` with the caller
//!
//! ## Example
//!
//! ```rust,ignore
//! use spider_engine::SchedulerBuilder;
//!
//! let scheduler = SchedulerBuilder::new()
//!     .accepted_domains(["example.com", "www.example.com"])
//!     .max_depth(3)
//!     .request_pool(64, 4)
//!     .add_fetcher(HttpFetcher::new(fetcher_mid, reqwest::Client::new())?)
//!     .add_extractor(ParserExtractor::new(extractor_mid, parsers)?)
//!     .add_processor(ItemPipeline::new(processor_mid, steps, false)?)
//!     .build()?;
//! ```

use crate::error::Result;
use crate::extractor::Extractor;
use crate::fetcher::Fetcher;
use crate::processor::Processor;
use crate::scheduler::{DataArgs, ModuleArgs, PoolArgs, RequestArgs, Scheduler};
use crate::stats::StatCollector;
use std::sync::Arc;
use tracing::debug;

/// Depth used when the builder is not given one.
const DEFAULT_MAX_DEPTH: u32 = 3;

pub struct SchedulerBuilder {
    request_args: RequestArgs,
    data_args: DataArgs,
    module_args: ModuleArgs,
    stats: Option<Arc<StatCollector>>,
}

impl Default for SchedulerBuilder {
    fn default() -> Self {
        Self {
            request_args: RequestArgs::new(Vec::<String>::new(), DEFAULT_MAX_DEPTH),
            data_args: DataArgs::default(),
            module_args: ModuleArgs::default(),
            stats: None,
        }
    }
}

impl SchedulerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one accepted domain.
    pub fn accepted_domain(mut self, domain: impl Into<String>) -> Self {
        self.request_args.accepted_domains.push(domain.into());
        self
    }

    /// Adds several accepted domains.
    pub fn accepted_domains<I, S>(mut self, domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.request_args
            .accepted_domains
            .extend(domains.into_iter().map(Into::into));
        self
    }

    /// Sets the deepest request depth that is admitted.
    pub fn max_depth(mut self, depth: u32) -> Self {
        self.request_args.max_depth = depth;
        self
    }

    /// Replaces the admission rules wholesale, e.g. with values loaded from JSON.
    pub fn request_args(mut self, args: RequestArgs) -> Self {
        self.request_args = args;
        self
    }

    /// Replaces all pool sizes wholesale.
    pub fn data_args(mut self, args: DataArgs) -> Self {
        self.data_args = args;
        self
    }

    pub fn request_pool(mut self, buffer_cap: u32, max_buffer_num: u32) -> Self {
        self.data_args.requests = PoolArgs::new(buffer_cap, max_buffer_num);
        self
    }

    pub fn response_pool(mut self, buffer_cap: u32, max_buffer_num: u32) -> Self {
        self.data_args.responses = PoolArgs::new(buffer_cap, max_buffer_num);
        self
    }

    pub fn item_pool(mut self, buffer_cap: u32, max_buffer_num: u32) -> Self {
        self.data_args.items = PoolArgs::new(buffer_cap, max_buffer_num);
        self
    }

    pub fn error_pool(mut self, buffer_cap: u32, max_buffer_num: u32) -> Self {
        self.data_args.errors = PoolArgs::new(buffer_cap, max_buffer_num);
        self
    }

    pub fn add_fetcher<F>(mut self, fetcher: F) -> Self
    where
        F: Fetcher,
    {
        self.module_args.fetchers.push(Arc::new(fetcher));
        self
    }

    pub fn add_extractor<E>(mut self, extractor: E) -> Self
    where
        E: Extractor,
    {
        self.module_args.extractors.push(Arc::new(extractor));
        self
    }

    pub fn add_processor<P>(mut self, processor: P) -> Self
    where
        P: Processor,
    {
        self.module_args.processors.push(Arc::new(processor));
        self
    }

    /// Adds an already shared module set, e.g. to keep handles for inspection.
    pub fn modules(mut self, modules: ModuleArgs) -> Self {
        self.module_args.fetchers.extend(modules.fetchers);
        self.module_args.extractors.extend(modules.extractors);
        self.module_args.processors.extend(modules.processors);
        self
    }

    /// Reports statistics into `stats` instead of a private collector.
    pub fn with_stats(mut self, stats: Arc<StatCollector>) -> Self {
        self.stats = Some(stats);
        self
    }

    /// Builds and initializes the `Scheduler`.
    pub fn build(self) -> Result<Scheduler> {
        let scheduler = match self.stats {
            Some(stats) => Scheduler::with_stats(stats),
            None => Scheduler::new(),
        };
        debug!(
            "Building scheduler with {:?} and {:?}",
            self.request_args, self.data_args
        );
        scheduler.init(self.request_args, self.data_args, self.module_args)?;
        Ok(scheduler)
    }
}
