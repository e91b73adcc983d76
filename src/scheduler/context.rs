//! State shared by the pipeline loops between `init` and the next `init`.

use super::args::{DataArgs, RequestArgs};
use super::summary::PoolsSummary;
use crate::error::{Result, SpiderError};
use crate::module::{Item, Mid, Request, Response};
use crate::pool::Pool;
use crate::registry::Registry;
use crate::stats::{Stage, StatCollector};
use dashmap::DashSet;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::trace;
use url::Url;

/// Why a request was refused admission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Rejection {
    Scheme(String),
    Seen,
    MissingHost,
    Domain(String),
    TooDeep { depth: u32, max: u32 },
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::Scheme(scheme) => write!(f, "unsupported scheme {:?}", scheme),
            Rejection::Seen => f.write_str("already fetched"),
            Rejection::MissingHost => f.write_str("no host"),
            Rejection::Domain(host) => write!(f, "host {} is not accepted", host),
            Rejection::TooDeep { depth, max } => write!(f, "depth {} exceeds {}", depth, max),
        }
    }
}

pub(crate) struct Context {
    pub(crate) registry: Registry,
    pub(crate) requests: Arc<Pool<Request>>,
    pub(crate) responses: Arc<Pool<Response>>,
    pub(crate) items: Arc<Pool<Item>>,
    pub(crate) errors: Arc<Pool<SpiderError>>,
    pub(crate) cancel: CancellationToken,
    pub(crate) stats: Arc<StatCollector>,
    accepted_domains: DashSet<String>,
    seen_urls: DashSet<String>,
    max_depth: u32,
}

impl Context {
    pub(crate) fn new(
        request_args: &RequestArgs,
        data_args: &DataArgs,
        registry: Registry,
        stats: Arc<StatCollector>,
    ) -> Result<Self> {
        let accepted_domains = DashSet::new();
        for domain in &request_args.accepted_domains {
            accepted_domains.insert(domain.trim().to_ascii_lowercase());
        }
        Ok(Self {
            registry,
            requests: Arc::new(Pool::new(
                data_args.requests.buffer_cap,
                data_args.requests.max_buffer_num,
            )?),
            responses: Arc::new(Pool::new(
                data_args.responses.buffer_cap,
                data_args.responses.max_buffer_num,
            )?),
            items: Arc::new(Pool::new(data_args.items.buffer_cap, data_args.items.max_buffer_num)?),
            errors: Arc::new(Pool::new(
                data_args.errors.buffer_cap,
                data_args.errors.max_buffer_num,
            )?),
            cancel: CancellationToken::new(),
            stats,
            accepted_domains,
            seen_urls: DashSet::new(),
            max_depth: request_args.max_depth,
        })
    }

    pub(crate) fn canceled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub(crate) fn accept_domain(&self, host: &str) {
        self.accepted_domains.insert(host.to_ascii_lowercase());
    }

    pub(crate) fn mark_seen(&self, url: &Url) {
        self.seen_urls.insert(url.as_str().to_string());
    }

    pub(crate) fn seen_count(&self) -> usize {
        self.seen_urls.len()
    }

    /// Decides whether `request` may enter the request pool.
    pub(crate) fn admit(&self, request: &Request) -> std::result::Result<(), Rejection> {
        self.check_admission(request, false)
    }

    /// Like [`Context::admit`], but treats the seed's own host as accepted
    /// without adding it to the accepted set.
    pub(crate) fn admit_seed(&self, seed: &Request) -> std::result::Result<(), Rejection> {
        self.check_admission(seed, true)
    }

    fn check_admission(
        &self,
        request: &Request,
        own_host_accepted: bool,
    ) -> std::result::Result<(), Rejection> {
        let url = request.url();
        match url.scheme() {
            "http" | "https" => {}
            scheme => return Err(Rejection::Scheme(scheme.to_string())),
        }
        if self.seen_urls.contains(url.as_str()) {
            return Err(Rejection::Seen);
        }
        let host = request.host().ok_or(Rejection::MissingHost)?;
        if !own_host_accepted && !self.accepted_domains.contains(host) {
            return Err(Rejection::Domain(host.to_string()));
        }
        if request.depth() > self.max_depth {
            return Err(Rejection::TooDeep {
                depth: request.depth(),
                max: self.max_depth,
            });
        }
        Ok(())
    }

    /// Admits `request` and enqueues it in the background.
    pub(crate) fn send_req(&self, request: Request) -> bool {
        if let Err(reason) = self.admit(&request) {
            trace!("Ignoring request {}: {}", request.url(), reason);
            self.stats.increment_requests_rejected();
            return false;
        }
        self.stats.increment_requests_admitted();
        self.hand_off(&self.requests, request, Stage::Request);
        true
    }

    /// Puts an already admitted request back without admitting it again.
    pub(crate) fn requeue_req(&self, request: Request) {
        self.stats.record_requeued(Stage::Request);
        self.hand_off(&self.requests, request, Stage::Request);
    }

    pub(crate) fn requeue_resp(&self, response: Response) {
        self.stats.record_requeued(Stage::Response);
        self.hand_off(&self.responses, response, Stage::Response);
    }

    pub(crate) fn requeue_item(&self, item: Item) {
        self.stats.record_requeued(Stage::Item);
        self.hand_off(&self.items, item, Stage::Item);
    }

    pub(crate) fn send_resp(&self, response: Response) {
        self.hand_off(&self.responses, response, Stage::Response);
    }

    pub(crate) fn send_item(&self, item: Item) {
        self.hand_off(&self.items, item, Stage::Item);
    }

    /// Classifies `error` by the module that raised it and enqueues it.
    pub(crate) fn send_error(&self, error: SpiderError, origin: Option<&Mid>) {
        let origin = origin.map(ToString::to_string);
        let error = error.classify(origin.as_deref());
        if let Some(kind) = error.kind() {
            self.stats.record_error(kind);
        }
        self.hand_off(&self.errors, error, Stage::Error);
    }

    fn hand_off<T: Send + 'static>(&self, pool: &Arc<Pool<T>>, value: T, stage: Stage) {
        let pool = Arc::clone(pool);
        let stats = Arc::clone(&self.stats);
        tokio::spawn(async move {
            if let Err(e) = pool.put(value).await {
                trace!("Dropped {:?} hand-off: {}", stage, e);
                stats.record_dropped(stage);
            }
        });
    }

    /// Fails unless every pool is open and can hold at least one buffer.
    pub(crate) fn check_pools(&self) -> Result<()> {
        let pools = [
            ("request", self.requests.closed(), self.requests.max_buffer_num()),
            ("response", self.responses.closed(), self.responses.max_buffer_num()),
            ("item", self.items.closed(), self.items.max_buffer_num()),
            ("error", self.errors.closed(), self.errors.max_buffer_num()),
        ];
        for (name, closed, max_buffer_num) in pools {
            if closed {
                return Err(SpiderError::configuration(format!(
                    "the {} pool is closed; initialize the scheduler again",
                    name
                )));
            }
            if max_buffer_num == 0 {
                return Err(SpiderError::configuration(format!(
                    "the {} pool cannot hold any buffer",
                    name
                )));
            }
        }
        Ok(())
    }

    pub(crate) fn close_pools(&self) {
        self.requests.close();
        self.responses.close();
        self.items.close();
        self.errors.close();
    }

    pub(crate) fn pools_summary(&self) -> PoolsSummary {
        PoolsSummary {
            requests: self.requests.stats(),
            responses: self.responses.stats(),
            items: self.items.stats(),
            errors: self.errors.stats(),
        }
    }
}
