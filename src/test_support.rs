//! Stub modules shared by the unit tests.

use crate::error::Result;
use crate::fetcher::Fetcher;
use crate::module::{Mid, Module, ModuleBase, ModuleKind, Request, Response};
use async_trait::async_trait;
use parking_lot::Mutex;

pub(crate) fn mid(kind: ModuleKind, serial: u64) -> Mid {
    Mid::new(kind, serial, None)
}

/// Fetcher that answers every request with a fixed body, or fails every
/// request when built with [`StubFetcher::failing`].
pub(crate) struct StubFetcher {
    base: ModuleBase,
    body: &'static str,
    fail: bool,
    fetched: Mutex<Vec<String>>,
}

impl StubFetcher {
    pub(crate) fn new(mid: Mid) -> Self {
        Self::with_base(ModuleBase::new(mid))
    }

    pub(crate) fn with_base(base: ModuleBase) -> Self {
        Self {
            base,
            body: "<html></html>",
            fail: false,
            fetched: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn failing(mid: Mid) -> Self {
        Self {
            fail: true,
            ..Self::new(mid)
        }
    }

    pub(crate) fn fetched(&self) -> Vec<String> {
        self.fetched.lock().clone()
    }
}

impl Module for StubFetcher {
    fn base(&self) -> &ModuleBase {
        &self.base
    }
}

#[async_trait]
impl Fetcher for StubFetcher {
    async fn download(&self, request: &Request) -> Result<Response> {
        let _handling = self.base.handling_guard();
        self.base.incr_called();
        self.base.incr_accepted();
        if self.fail {
            return Err(anyhow::anyhow!("connection refused: {}", request.url()).into());
        }
        self.fetched.lock().push(request.url().to_string());
        self.base.incr_completed();
        Ok(Response::for_request(request, self.body))
    }
}
