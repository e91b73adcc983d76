//! # spider-engine
//!
//! A concurrent crawl engine built from three pluggable stages.
//!
//! Requests are downloaded by [`Fetcher`]s, responses are turned into new
//! requests and items by [`Extractor`]s, and items are consumed by
//! [`Processor`]s. The [`Scheduler`] connects the stages through elastic
//! [`Pool`]s, picks the least loaded module for every work item, filters
//! requests by scheme, domain, depth and history, and reports every module
//! error, tagged with the stage it came from, through a single channel.
//!
//! ## Example
//!
//! ```rust,ignore
//! use spider_engine::prelude::*;
//! use std::sync::Arc;
//!
//! async fn crawl() -> Result<(), SpiderError> {
//!     let serials = SerialGenerator::default();
//!     let titles: ParseFn = Arc::new(|response: &Response| {
//!         let item = Item::new().with("url", response.url().as_str());
//!         (vec![Data::Item(item)], Vec::new())
//!     });
//!     let print: ItemStep = Arc::new(|item: &mut Item| {
//!         println!("{:?}", item);
//!         Ok(())
//!     });
//!
//!     let scheduler = SchedulerBuilder::new()
//!         .accepted_domain("example.com")
//!         .max_depth(2)
//!         .add_fetcher(HttpFetcher::new(
//!             Mid::generate(ModuleKind::Fetcher, &serials, None),
//!             reqwest::Client::new(),
//!         )?)
//!         .add_extractor(ParserExtractor::new(
//!             Mid::generate(ModuleKind::Extractor, &serials, None),
//!             vec![titles],
//!         )?)
//!         .add_processor(ItemPipeline::new(
//!             Mid::generate(ModuleKind::Processor, &serials, None),
//!             vec![print],
//!             false,
//!         )?)
//!         .build()?;
//!
//!     scheduler.start(Request::parse("https://example.com/", 0)?).await?;
//!     while !scheduler.idle() {
//!         tokio::time::sleep(std::time::Duration::from_millis(100)).await;
//!     }
//!     scheduler.stop().await
//! }
//! ```

pub mod builder;
pub mod error;
pub mod extractor;
pub mod fetcher;
pub mod module;
pub mod pool;
pub mod prelude;
pub mod processor;
pub mod registry;
pub mod scheduler;
pub mod stats;
pub mod telemetry;

#[cfg(test)]
mod test_support;

pub use builder::SchedulerBuilder;
pub use error::{ErrorKind, Result, SpiderError};
pub use extractor::{Extractor, ParseFn, ParserExtractor};
#[cfg(feature = "http")]
pub use fetcher::HttpFetcher;
pub use fetcher::Fetcher;
pub use module::{
    Counts, Data, Item, Mid, Module, ModuleBase, ModuleKind, ModuleSummary, Request, Response,
    ScoreFn, SerialGenerator,
};
pub use pool::{Buffer, Pool, PoolStats};
pub use processor::{ItemPipeline, ItemStep, Processor};
pub use registry::{Component, Registry};
pub use scheduler::{
    Args, DataArgs, ModuleArgs, PoolArgs, RequestArgs, Scheduler, SchedulerSummary, Status,
};
pub use stats::StatCollector;

pub use async_trait::async_trait;
pub use tokio;
