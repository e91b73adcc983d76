//! A "prelude" for users of the `spider-engine` crate.
//!
//! This prelude re-exports the most commonly used traits, structs, and macros
//! so that they can be easily imported.
//!
//! # Example
//!
//! ```
//! use spider_engine::prelude::*;
//! ```

pub use crate::{
    // Core structs
    Scheduler,
    SchedulerBuilder,
    StatCollector,
    // Core traits
    Extractor,
    Fetcher,
    Module,
    Processor,
    // Built-in modules
    ItemPipeline,
    ParserExtractor,
    // Data model
    Data,
    Item,
    Mid,
    ModuleBase,
    ModuleKind,
    Request,
    Response,
    SerialGenerator,
    // Module plumbing
    ItemStep,
    ParseFn,
    // Errors
    SpiderError,
    // Essential re-exports for trait implementation
    async_trait,
};

#[cfg(feature = "http")]
pub use crate::HttpFetcher;
