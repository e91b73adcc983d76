//! # Scheduler Module
//!
//! Drives the fetch, extract and process stages.
//!
//! ## Overview
//!
//! The `Scheduler` owns the runtime built by [`init`](Scheduler::init): the
//! module registry, the four pools (requests, responses, items, errors), the
//! admission sets and a cancellation token. [`start`](Scheduler::start) admits
//! a seed request and launches one loop per stage; [`stop`](Scheduler::stop)
//! cancels the loops, closes the pools and waits for the loops to finish.
//!
//! ## Lifecycle
//!
//! ```text
//! Uninitialized -> Initializing -> Initialized -> Starting -> Started -> Stopping -> Stopped
//! ```
//!
//! Each operation first moves into its in-progress state and then settles,
//! either forward on success or back to where it began on failure. A call that
//! is not allowed from the current state fails with
//! [`SpiderError::StatusChange`] and leaves the state alone. A stopped
//! scheduler is restarted by calling `init` again.
//!
//! ## Admission
//!
//! Requests enter the request pool only if they are http(s), have not been
//! fetched yet, target an accepted host and are no deeper than the configured
//! maximum. The seed's host is accepted automatically.
//!
//! ## Example
//!
//! ```rust,ignore
//! use spider_engine::prelude::*;
//!
//! let scheduler = SchedulerBuilder::new()
//!     .accepted_domains(["example.com"])
//!     .max_depth(3)
//!     .add_fetcher(fetcher)
//!     .add_extractor(extractor)
//!     .add_processor(pipeline)
//!     .build()?;
//!
//! let errors = scheduler.error_chan()?;
//! scheduler.start(Request::parse("https://example.com/", 0)?).await?;
//! while let Ok(err) = errors.recv().await {
//!     eprintln!("{}", err);
//! }
//! ```

mod args;
mod context;
mod status;
mod summary;
mod workers;

pub use args::{Args, DataArgs, ModuleArgs, PoolArgs, RequestArgs};
pub use status::{Status, check_transition};
pub use summary::{PoolsSummary, SchedulerSummary};

use crate::error::{ErrorKind, Result, SpiderError};
use crate::module::{ModuleKind, ModuleSummary, Request};
use crate::registry::Registry;
use crate::stats::StatCollector;
use context::Context;
use futures_util::FutureExt;
use futures_util::future::join_all;
use kanal::AsyncReceiver;
use parking_lot::{Mutex, RwLock};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

/// Upper bound on waiting for the loops to exit during `stop`.
const STOP_TIMEOUT: Duration = Duration::from_secs(30);

pub struct Scheduler {
    status: RwLock<Status>,
    context: RwLock<Option<Arc<Context>>>,
    args: RwLock<Option<(RequestArgs, DataArgs)>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    stats: Arc<StatCollector>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::with_stats(Arc::new(StatCollector::new()))
    }

    /// Creates a scheduler reporting into `stats`.
    pub fn with_stats(stats: Arc<StatCollector>) -> Self {
        Self {
            status: RwLock::new(Status::Uninitialized),
            context: RwLock::new(None),
            args: RwLock::new(None),
            workers: Mutex::new(Vec::new()),
            stats,
        }
    }

    pub fn status(&self) -> Status {
        *self.status.read()
    }

    pub fn stats(&self) -> Arc<StatCollector> {
        Arc::clone(&self.stats)
    }

    /// Validates the arguments and builds a fresh runtime.
    ///
    /// Any previous runtime is discarded. On failure the scheduler returns to
    /// the state it was in before the call.
    pub fn init(
        &self,
        request_args: RequestArgs,
        data_args: DataArgs,
        module_args: ModuleArgs,
    ) -> Result<()> {
        let old = self.begin(Status::Initializing)?;
        info!("Initializing scheduler");

        let result = self.build_context(&request_args, &data_args, &module_args);
        let result = result.map(|ctx| {
            if let Some(previous) = self.context.write().replace(Arc::new(ctx)) {
                previous.cancel.cancel();
                previous.close_pools();
            }
            *self.args.write() = Some((request_args, data_args));
        });

        match &result {
            Ok(()) => info!("Scheduler initialized"),
            Err(e) => error!("Scheduler initialization failed: {}", e),
        }
        self.finish(old, Status::Initializing, result.is_ok());
        result
    }

    fn build_context(
        &self,
        request_args: &RequestArgs,
        data_args: &DataArgs,
        module_args: &ModuleArgs,
    ) -> Result<Context> {
        request_args.check()?;
        data_args.check()?;
        module_args.check()?;

        let registry = Registry::new();
        for fetcher in &module_args.fetchers {
            register(&registry, Arc::clone(fetcher))?;
        }
        for extractor in &module_args.extractors {
            register(&registry, Arc::clone(extractor))?;
        }
        for processor in &module_args.processors {
            register(&registry, Arc::clone(processor))?;
        }
        debug!("Registered {} modules", registry.len());

        Context::new(request_args, data_args, registry, Arc::clone(&self.stats))
    }

    /// Admits `seed` and launches the pipeline loops.
    pub async fn start(&self, seed: Request) -> Result<()> {
        let old = self.begin(Status::Starting)?;
        info!("Starting scheduler from {}", seed.url());

        let result = match AssertUnwindSafe(self.launch(seed)).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => Err(panic_error("start", panic)),
        };

        match &result {
            Ok(()) => info!("Scheduler started"),
            Err(e) => error!("Scheduler start failed: {}", e),
        }
        self.finish(old, Status::Starting, result.is_ok());
        result
    }

    async fn launch(&self, seed: Request) -> Result<()> {
        let ctx = self.context()?;

        match seed.url().scheme() {
            "http" | "https" => {}
            scheme => {
                return Err(SpiderError::illegal_parameter(format!(
                    "unsupported seed scheme {:?}",
                    scheme
                )));
            }
        }
        let host = seed
            .host()
            .ok_or_else(|| SpiderError::illegal_parameter("seed request has no host"))?;
        ctx.check_pools()?;
        ctx.admit_seed(&seed).map_err(|reason| {
            SpiderError::illegal_parameter(format!("seed {} rejected: {}", seed.url(), reason))
        })?;
        ctx.accept_domain(host);

        trace!("Spawning pipeline loops");
        let handles = vec![
            workers::spawn_download_loop(Arc::clone(&ctx)),
            workers::spawn_analyze_loop(Arc::clone(&ctx)),
            workers::spawn_process_loop(Arc::clone(&ctx)),
        ];
        self.workers.lock().extend(handles);

        ctx.send_req(seed);
        Ok(())
    }

    /// Cancels the loops, closes the pools and waits for the loops to exit.
    pub async fn stop(&self) -> Result<()> {
        let old = self.begin(Status::Stopping)?;
        info!("Stopping scheduler");

        let result = match AssertUnwindSafe(self.shutdown()).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => Err(panic_error("stop", panic)),
        };

        match &result {
            Ok(()) => info!("Scheduler stopped"),
            Err(e) => error!("Scheduler stop failed: {}", e),
        }
        self.finish(old, Status::Stopping, result.is_ok());
        result
    }

    async fn shutdown(&self) -> Result<()> {
        let ctx = self.context()?;
        ctx.cancel.cancel();
        ctx.close_pools();

        let handles = std::mem::take(&mut *self.workers.lock());
        let aborts: Vec<_> = handles.iter().map(JoinHandle::abort_handle).collect();
        match tokio::time::timeout(STOP_TIMEOUT, join_all(handles)).await {
            Ok(results) => {
                for result in results {
                    if let Err(e) = result {
                        error!("Pipeline loop failed during shutdown: {}", e);
                    }
                }
                trace!("All pipeline loops exited");
            }
            Err(_) => {
                warn!(
                    "Pipeline loops did not exit within {}s, aborting them",
                    STOP_TIMEOUT.as_secs()
                );
                for abort in aborts {
                    abort.abort();
                }
            }
        }
        Ok(())
    }

    /// Returns a channel that yields every classified error.
    ///
    /// The channel is fed by a background task and closes once the scheduler
    /// is stopped or re-initialized. Must be called from within a Tokio
    /// runtime.
    pub fn error_chan(&self) -> Result<AsyncReceiver<SpiderError>> {
        let ctx = self.context()?;
        let (tx, rx) = kanal::bounded_async(ctx.errors.buffer_cap() as usize);

        tokio::spawn(async move {
            loop {
                let error = tokio::select! {
                    biased;
                    _ = ctx.cancel.cancelled() => break,
                    result = ctx.errors.get() => match result {
                        Ok(error) => error,
                        Err(_) => break,
                    }
                };
                tokio::select! {
                    biased;
                    _ = ctx.cancel.cancelled() => break,
                    sent = tx.send(error) => {
                        if sent.is_err() {
                            trace!("Error channel receiver dropped");
                            break;
                        }
                    }
                }
            }
            trace!("Error channel closed");
        });

        Ok(rx)
    }

    /// Whether no registered module is currently working on anything.
    pub fn idle(&self) -> bool {
        match self.context.read().as_ref() {
            Some(ctx) => ctx.registry.handling() == 0,
            None => true,
        }
    }

    pub fn summary(&self) -> SchedulerSummary {
        let ctx = self.context.read().clone();
        let args = self.args.read().clone();
        let modules = |kind: ModuleKind| -> Vec<ModuleSummary> {
            ctx.as_ref()
                .map(|ctx| {
                    ctx.registry
                        .get_all_by_kind(kind)
                        .values()
                        .map(|component| component.summary())
                        .collect()
                })
                .unwrap_or_default()
        };

        SchedulerSummary {
            status: self.status(),
            request_args: args.as_ref().map(|(request_args, _)| request_args.clone()),
            data_args: args.map(|(_, data_args)| data_args),
            fetchers: modules(ModuleKind::Fetcher),
            extractors: modules(ModuleKind::Extractor),
            processors: modules(ModuleKind::Processor),
            seen_urls: ctx.as_ref().map(|ctx| ctx.seen_count()).unwrap_or(0),
            pools: ctx.as_ref().map(|ctx| ctx.pools_summary()),
        }
    }

    fn context(&self) -> Result<Arc<Context>> {
        self.context
            .read()
            .clone()
            .ok_or_else(|| SpiderError::configuration("the scheduler has not been initialized"))
    }

    /// Moves into the in-progress state `wanted`, returning the state left.
    fn begin(&self, wanted: Status) -> Result<Status> {
        let mut status = self.status.write();
        check_transition(*status, wanted)?;
        let old = *status;
        *status = wanted;
        trace!("Scheduler status {} -> {}", old, wanted);
        Ok(old)
    }

    /// Settles the transition started by `begin`.
    fn finish(&self, old: Status, wanted: Status, succeeded: bool) {
        let settled = if succeeded {
            wanted.settled().unwrap_or(old)
        } else {
            old
        };
        *self.status.write() = settled;
        trace!("Scheduler status {} -> {}", wanted, settled);
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("status", &self.status())
            .field("idle", &self.idle())
            .finish()
    }
}

fn register(registry: &Registry, component: impl Into<crate::registry::Component>) -> Result<()> {
    let component = component.into();
    let mid = component.id().clone();
    if !registry.register(component)? {
        return Err(SpiderError::illegal_parameter(format!(
            "module {} is registered twice",
            mid
        )));
    }
    Ok(())
}

fn panic_error(operation: &str, panic: Box<dyn Any + Send>) -> SpiderError {
    let message = if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    };
    SpiderError::classified(
        ErrorKind::Scheduler,
        format!("panic during {}: {}", operation, message),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::{Extractor, ParseFn, ParserExtractor};
    use crate::fetcher::Fetcher;
    use crate::module::Module;
    use crate::module::{Counts, Data, Item, ModuleBase, Response, ScoreFn};
    use crate::stats::Stage;
    use crate::processor::{ItemPipeline, ItemStep, Processor};
    use crate::test_support::{StubFetcher, mid};
    use std::sync::atomic::Ordering;
    use url::Url;

    fn data_args() -> DataArgs {
        DataArgs {
            requests: PoolArgs::new(8, 2),
            responses: PoolArgs::new(8, 2),
            items: PoolArgs::new(8, 2),
            errors: PoolArgs::new(8, 2),
        }
    }

    /// Emits `/child` and one item recording the page URL for every response.
    fn link_parser() -> ParseFn {
        Arc::new(|response: &Response| -> (Vec<Data>, Vec<SpiderError>) {
            let child = response.follow(Url::parse("http://example.com/child").unwrap());
            let item = Item::new().with("url", response.url().as_str());
            (vec![Data::Request(child), Data::Item(item)], Vec::new())
        })
    }

    fn collecting_pipeline(items: Arc<Mutex<Vec<Item>>>) -> Arc<dyn Processor> {
        let step: ItemStep = Arc::new(move |item: &mut Item| -> Result<()> {
            items.lock().push(item.clone());
            Ok(())
        });
        Arc::new(ItemPipeline::new(mid(ModuleKind::Processor, 1), vec![step], false).unwrap())
    }

    fn modules(
        fetcher: Arc<dyn Fetcher>,
        parser: ParseFn,
        processor: Arc<dyn Processor>,
    ) -> ModuleArgs {
        let extractor: Arc<dyn Extractor> =
            Arc::new(ParserExtractor::new(mid(ModuleKind::Extractor, 1), vec![parser]).unwrap());
        ModuleArgs {
            fetchers: vec![fetcher],
            extractors: vec![extractor],
            processors: vec![processor],
        }
    }

    fn seed() -> Request {
        Request::parse("http://example.com/", 0).unwrap()
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[tokio::test]
    async fn lifecycle_guards() {
        let scheduler = Scheduler::new();
        assert_eq!(scheduler.status(), Status::Uninitialized);
        assert!(matches!(scheduler.stop().await, Err(SpiderError::StatusChange(_))));
        assert!(matches!(scheduler.start(seed()).await, Err(SpiderError::StatusChange(_))));
        assert_eq!(scheduler.status(), Status::Uninitialized);
        assert!(scheduler.error_chan().is_err());
        assert!(scheduler.idle());

        let items = Arc::new(Mutex::new(Vec::new()));
        let fetcher: Arc<dyn Fetcher> = Arc::new(StubFetcher::new(mid(ModuleKind::Fetcher, 1)));
        scheduler
            .init(
                RequestArgs::new(["example.com"], 2),
                data_args(),
                modules(fetcher, link_parser(), collecting_pipeline(items)),
            )
            .unwrap();
        assert_eq!(scheduler.status(), Status::Initialized);
        assert!(matches!(scheduler.stop().await, Err(SpiderError::StatusChange(_))));
        assert_eq!(scheduler.status(), Status::Initialized);
    }

    #[tokio::test]
    async fn failed_init_rolls_back() {
        let scheduler = Scheduler::new();
        let fetcher: Arc<dyn Fetcher> = Arc::new(StubFetcher::new(mid(ModuleKind::Fetcher, 1)));
        let items = Arc::new(Mutex::new(Vec::new()));
        let args = modules(fetcher, link_parser(), collecting_pipeline(items));

        let err = scheduler
            .init(RequestArgs::new(["example.com"], 1), data_args(), args.clone())
            .unwrap_err();
        assert!(matches!(err, SpiderError::IllegalParameter(_)));
        assert_eq!(scheduler.status(), Status::Uninitialized);

        let mut duplicated = args.clone();
        duplicated.fetchers.push(Arc::clone(&duplicated.fetchers[0]));
        assert!(scheduler
            .init(RequestArgs::new(["example.com"], 2), data_args(), duplicated)
            .is_err());
        assert_eq!(scheduler.status(), Status::Uninitialized);

        let mut bad_pools = data_args();
        bad_pools.errors.buffer_cap = 0;
        assert!(scheduler
            .init(RequestArgs::new(["example.com"], 2), bad_pools, args)
            .is_err());
        assert_eq!(scheduler.status(), Status::Uninitialized);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn crawls_from_seed_to_processed_items() {
        let items = Arc::new(Mutex::new(Vec::new()));
        let fetcher = Arc::new(StubFetcher::new(mid(ModuleKind::Fetcher, 1)));
        let stats = Arc::new(StatCollector::new());
        let scheduler = Scheduler::with_stats(Arc::clone(&stats));
        scheduler
            .init(
                RequestArgs::new(["example.com"], 2),
                data_args(),
                modules(
                    Arc::clone(&fetcher) as Arc<dyn Fetcher>,
                    link_parser(),
                    collecting_pipeline(Arc::clone(&items)),
                ),
            )
            .unwrap();

        scheduler.start(seed()).await.unwrap();
        assert_eq!(scheduler.status(), Status::Started);

        wait_until(|| items.lock().len() == 2).await;
        wait_until(|| stats.requests_rejected.load(Ordering::SeqCst) == 1).await;
        wait_until(|| stats.items_processed.load(Ordering::SeqCst) == 2).await;
        wait_until(|| scheduler.idle()).await;

        let mut fetched = fetcher.fetched();
        fetched.sort();
        assert_eq!(fetched, vec!["http://example.com/", "http://example.com/child"]);
        assert_eq!(stats.requests_admitted.load(Ordering::SeqCst), 2);

        let summary = scheduler.summary();
        assert_eq!(summary.status, Status::Started);
        assert_eq!(summary.seen_urls, 2);
        assert_eq!(summary.fetchers[0].counts.completed, 2);
        assert_eq!(summary.processors[0].counts.completed, 2);
        assert!(summary.to_string().contains("seen urls: 2"));

        scheduler.stop().await.unwrap();
        assert_eq!(scheduler.status(), Status::Stopped);
        assert!(scheduler.summary().pools.unwrap().requests.closed);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn module_errors_reach_the_error_channel() {
        let failing: ParseFn = Arc::new(|_: &Response| -> (Vec<Data>, Vec<SpiderError>) {
            (Vec::new(), vec![SpiderError::from(anyhow::anyhow!("bad markup"))])
        });
        let items = Arc::new(Mutex::new(Vec::new()));
        let fetcher: Arc<dyn Fetcher> = Arc::new(StubFetcher::new(mid(ModuleKind::Fetcher, 1)));
        let scheduler = Scheduler::new();
        scheduler
            .init(
                RequestArgs::new(["example.com"], 2),
                data_args(),
                modules(fetcher, failing, collecting_pipeline(items)),
            )
            .unwrap();

        let errors = scheduler.error_chan().unwrap();
        scheduler.start(seed()).await.unwrap();

        let error = tokio::time::timeout(Duration::from_secs(5), errors.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(error.kind(), Some(ErrorKind::Extractor));
        assert!(error.to_string().contains("bad markup"));
        assert_eq!(scheduler.stats().errors_of(ErrorKind::Extractor), 1);

        scheduler.stop().await.unwrap();
        let closed = tokio::time::timeout(Duration::from_secs(5), errors.recv())
            .await
            .unwrap();
        assert!(closed.is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn fetch_failures_are_classified_as_fetcher_errors() {
        let items = Arc::new(Mutex::new(Vec::new()));
        let fetcher: Arc<dyn Fetcher> =
            Arc::new(StubFetcher::failing(mid(ModuleKind::Fetcher, 7)));
        let scheduler = Scheduler::new();
        scheduler
            .init(
                RequestArgs::new(["example.com"], 2),
                data_args(),
                modules(fetcher, link_parser(), collecting_pipeline(Arc::clone(&items))),
            )
            .unwrap();
        let errors = scheduler.error_chan().unwrap();
        scheduler.start(seed()).await.unwrap();

        let error = tokio::time::timeout(Duration::from_secs(5), errors.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(error.kind(), Some(ErrorKind::Fetcher));
        assert!(items.lock().is_empty());
        assert_eq!(scheduler.summary().seen_urls, 0);
        scheduler.stop().await.unwrap();
    }

    #[tokio::test]
    async fn bad_seeds_roll_back_to_initialized() {
        let items = Arc::new(Mutex::new(Vec::new()));
        let fetcher: Arc<dyn Fetcher> = Arc::new(StubFetcher::new(mid(ModuleKind::Fetcher, 1)));
        let scheduler = Scheduler::new();
        scheduler
            .init(
                RequestArgs::new(["example.com"], 2),
                data_args(),
                modules(fetcher, link_parser(), collecting_pipeline(items)),
            )
            .unwrap();

        let err = scheduler
            .start(Request::parse("ftp://example.com/", 0).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, SpiderError::IllegalParameter(_)));
        assert_eq!(scheduler.status(), Status::Initialized);

        let too_deep = Request::parse("http://example.com/deep", 5).unwrap();
        assert!(scheduler.start(too_deep).await.is_err());
        assert_eq!(scheduler.status(), Status::Initialized);

        let foreign = Request::parse("http://other.org/deep", 5).unwrap();
        assert!(scheduler.start(foreign).await.is_err());
        let ctx = scheduler.context().unwrap();
        assert_eq!(
            ctx.admit(&Request::parse("http://other.org/", 0).unwrap()),
            Err(super::context::Rejection::Domain("other.org".to_string()))
        );
    }

    fn unscorable() -> ScoreFn {
        Arc::new(|_: &Counts| -> Result<u64> { Err(SpiderError::illegal_parameter("no score")) })
    }

    async fn first_error(errors: &AsyncReceiver<SpiderError>) -> SpiderError {
        tokio::time::timeout(Duration::from_secs(5), errors.recv())
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn unselectable_fetchers_requeue_requests() {
        let items = Arc::new(Mutex::new(Vec::new()));
        let fetcher = Arc::new(StubFetcher::with_base(
            ModuleBase::new(mid(ModuleKind::Fetcher, 1)).with_scorer(unscorable()),
        ));
        let stats = Arc::new(StatCollector::new());
        let scheduler = Scheduler::with_stats(Arc::clone(&stats));
        scheduler
            .init(
                RequestArgs::new(["example.com"], 2),
                data_args(),
                modules(
                    Arc::clone(&fetcher) as Arc<dyn Fetcher>,
                    link_parser(),
                    collecting_pipeline(items),
                ),
            )
            .unwrap();
        let errors = scheduler.error_chan().unwrap();
        scheduler.start(seed()).await.unwrap();

        let error = first_error(&errors).await;
        assert_eq!(error.kind(), Some(ErrorKind::Scheduler));
        assert!(error.to_string().contains("no score"));

        wait_until(|| stats.requeued(Stage::Request) >= 2).await;
        assert_eq!(stats.requests_admitted.load(Ordering::SeqCst), 1);
        assert_eq!(stats.dropped(Stage::Request), 0);
        assert!(fetcher.fetched().is_empty());
        assert_eq!(scheduler.summary().seen_urls, 0);
        scheduler.stop().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn unselectable_extractors_requeue_responses() {
        let items = Arc::new(Mutex::new(Vec::new()));
        let fetcher: Arc<dyn Fetcher> = Arc::new(StubFetcher::new(mid(ModuleKind::Fetcher, 1)));
        let extractor: Arc<dyn Extractor> = Arc::new(
            ParserExtractor::new(mid(ModuleKind::Extractor, 1), vec![link_parser()])
                .unwrap()
                .with_scorer(unscorable()),
        );
        let stats = Arc::new(StatCollector::new());
        let scheduler = Scheduler::with_stats(Arc::clone(&stats));
        scheduler
            .init(
                RequestArgs::new(["example.com"], 2),
                data_args(),
                ModuleArgs {
                    fetchers: vec![fetcher],
                    extractors: vec![extractor],
                    processors: vec![collecting_pipeline(Arc::clone(&items))],
                },
            )
            .unwrap();
        let errors = scheduler.error_chan().unwrap();
        scheduler.start(seed()).await.unwrap();

        assert_eq!(first_error(&errors).await.kind(), Some(ErrorKind::Scheduler));
        wait_until(|| stats.requeued(Stage::Response) >= 2).await;
        assert_eq!(stats.responses_fetched.load(Ordering::SeqCst), 1);
        assert_eq!(stats.responses_analyzed.load(Ordering::SeqCst), 0);
        assert!(items.lock().is_empty());
        scheduler.stop().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn unselectable_processors_requeue_items() {
        let items = Arc::new(Mutex::new(Vec::new()));
        let step_items = Arc::clone(&items);
        let step: ItemStep = Arc::new(move |item: &mut Item| -> Result<()> {
            step_items.lock().push(item.clone());
            Ok(())
        });
        let processor: Arc<dyn Processor> = Arc::new(
            ItemPipeline::new(mid(ModuleKind::Processor, 1), vec![step], false)
                .unwrap()
                .with_scorer(unscorable()),
        );
        let fetcher: Arc<dyn Fetcher> = Arc::new(StubFetcher::new(mid(ModuleKind::Fetcher, 1)));
        let stats = Arc::new(StatCollector::new());
        let scheduler = Scheduler::with_stats(Arc::clone(&stats));
        scheduler
            .init(
                RequestArgs::new(["example.com"], 2),
                data_args(),
                modules(fetcher, link_parser(), processor),
            )
            .unwrap();
        let errors = scheduler.error_chan().unwrap();
        scheduler.start(seed()).await.unwrap();

        assert_eq!(first_error(&errors).await.kind(), Some(ErrorKind::Scheduler));
        wait_until(|| stats.requeued(Stage::Item) >= 2).await;
        assert!(stats.items_produced.load(Ordering::SeqCst) >= 1);
        assert_eq!(stats.items_processed.load(Ordering::SeqCst), 0);
        assert!(items.lock().is_empty());
        scheduler.stop().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn stopped_scheduler_restarts_after_init() {
        let items = Arc::new(Mutex::new(Vec::new()));
        let fetcher: Arc<dyn Fetcher> = Arc::new(StubFetcher::new(mid(ModuleKind::Fetcher, 1)));
        let args = modules(fetcher, link_parser(), collecting_pipeline(Arc::clone(&items)));
        let scheduler = Scheduler::new();
        scheduler
            .init(RequestArgs::new(["example.com"], 2), data_args(), args.clone())
            .unwrap();
        scheduler.start(seed()).await.unwrap();
        assert!(matches!(scheduler.start(seed()).await, Err(SpiderError::StatusChange(_))));
        scheduler.stop().await.unwrap();

        // The pools are closed, so starting again needs a fresh runtime.
        assert!(matches!(scheduler.start(seed()).await, Err(SpiderError::Configuration(_))));
        assert_eq!(scheduler.status(), Status::Stopped);

        scheduler
            .init(RequestArgs::new(["example.com"], 2), data_args(), args)
            .unwrap();
        scheduler.start(seed()).await.unwrap();
        assert_eq!(scheduler.status(), Status::Started);
        scheduler.stop().await.unwrap();
    }

    #[test]
    fn panic_payloads_become_scheduler_errors() {
        let err = panic_error("start", Box::new("boom"));
        assert_eq!(err.kind(), Some(ErrorKind::Scheduler));
        assert_eq!(err.to_string(), "scheduler error: panic during start: boom");
    }
}
