//! # Fetcher Module
//!
//! The download stage of the pipeline.
//!
//! A [`Fetcher`] turns a [`Request`] into a [`Response`]. Implementations must
//! be safe to call concurrently and keep their own counters up to date through
//! their [`ModuleBase`]. With the `http` feature the crate ships
//! [`HttpFetcher`], backed by a shared `reqwest` client.

use crate::error::Result;
use crate::module::{Module, Request, Response};
use async_trait::async_trait;

#[cfg(feature = "http")]
pub use http_fetcher::HttpFetcher;

#[async_trait]
pub trait Fetcher: Module {
    /// Downloads `request`.
    async fn download(&self, request: &Request) -> Result<Response>;
}

#[cfg(feature = "http")]
mod http_fetcher {
    use super::Fetcher;
    use crate::error::{Result, SpiderError};
    use crate::module::{Mid, Module, ModuleBase, ModuleKind, Request, Response, ScoreFn};
    use async_trait::async_trait;
    use tracing::{debug, trace};

    /// Fetcher that performs real HTTP requests with `reqwest`.
    #[derive(Debug)]
    pub struct HttpFetcher {
        base: ModuleBase,
        client: reqwest::Client,
    }

    impl HttpFetcher {
        pub fn new(mid: Mid, client: reqwest::Client) -> Result<Self> {
            if mid.kind() != ModuleKind::Fetcher {
                return Err(SpiderError::illegal_parameter(format!(
                    "mid {} does not identify a fetcher",
                    mid
                )));
            }
            Ok(Self {
                base: ModuleBase::new(mid),
                client,
            })
        }

        pub fn with_scorer(mut self, scorer: ScoreFn) -> Self {
            self.base = self.base.with_scorer(scorer);
            self
        }
    }

    impl Module for HttpFetcher {
        fn base(&self) -> &ModuleBase {
            &self.base
        }
    }

    #[async_trait]
    impl Fetcher for HttpFetcher {
        async fn download(&self, request: &Request) -> Result<Response> {
            let _handling = self.base.handling_guard();
            self.base.incr_called();
            match request.url().scheme() {
                "http" | "https" => {}
                scheme => {
                    return Err(SpiderError::illegal_parameter(format!(
                        "unsupported scheme {:?} for {}",
                        scheme,
                        request.url()
                    )));
                }
            }
            self.base.incr_accepted();

            debug!("Downloading {} at depth {}", request.url(), request.depth());
            let response = self
                .client
                .request(request.method().clone(), request.url().clone())
                .headers(request.headers().clone())
                .send()
                .await?;

            let url = response.url().clone();
            let status = response.status();
            let headers = response.headers().clone();
            let body = response.bytes().await?;
            trace!("Downloaded {} ({} bytes, status {})", url, body.len(), status);

            self.base.incr_completed();
            Ok(Response::new(url, status, headers, body, request.depth()))
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn rejects_non_fetcher_identity() {
            let mid = Mid::new(ModuleKind::Extractor, 1, None);
            assert!(HttpFetcher::new(mid, reqwest::Client::new()).is_err());
        }

        #[tokio::test]
        async fn refuses_non_http_schemes() {
            let fetcher =
                HttpFetcher::new(Mid::new(ModuleKind::Fetcher, 1, None), reqwest::Client::new())
                    .unwrap();
            let request = Request::parse("ftp://example.com/file", 0).unwrap();

            assert!(fetcher.download(&request).await.is_err());
            let counts = fetcher.counts();
            assert_eq!(counts.called, 1);
            assert_eq!(counts.accepted, 0);
            assert_eq!(counts.handling, 0);
        }
    }
}
