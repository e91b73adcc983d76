//! Arguments accepted by [`Scheduler::init`](super::Scheduler::init).
//!
//! `RequestArgs` and `DataArgs` are plain data and can be loaded from JSON;
//! `ModuleArgs` carries the module instances themselves.

use crate::error::{Result, SpiderError};
use crate::extractor::Extractor;
use crate::fetcher::Fetcher;
use crate::module::{Module, ModuleKind};
use crate::processor::Processor;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Validation shared by every argument group.
pub trait Args {
    fn check(&self) -> Result<()>;
}

/// Admission rules for requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestArgs {
    /// Hosts requests may target. The seed's host is added on start.
    pub accepted_domains: Vec<String>,
    /// Deepest request depth admitted; the seed has depth 0.
    pub max_depth: u32,
}

impl RequestArgs {
    pub fn new<I, S>(accepted_domains: I, max_depth: u32) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            accepted_domains: accepted_domains.into_iter().map(Into::into).collect(),
            max_depth,
        }
    }
}

impl Args for RequestArgs {
    fn check(&self) -> Result<()> {
        if self.accepted_domains.is_empty() {
            return Err(SpiderError::illegal_parameter("no accepted domains"));
        }
        if let Some(domain) = self.accepted_domains.iter().find(|d| d.trim().is_empty()) {
            return Err(SpiderError::illegal_parameter(format!(
                "invalid accepted domain {:?}",
                domain
            )));
        }
        if self.max_depth <= 1 {
            return Err(SpiderError::illegal_parameter(format!(
                "max depth must be greater than 1, got {}",
                self.max_depth
            )));
        }
        Ok(())
    }
}

/// Sizing of one pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolArgs {
    pub buffer_cap: u32,
    pub max_buffer_num: u32,
}

impl PoolArgs {
    pub fn new(buffer_cap: u32, max_buffer_num: u32) -> Self {
        Self {
            buffer_cap,
            max_buffer_num,
        }
    }

    fn check_named(&self, name: &str) -> Result<()> {
        if self.buffer_cap == 0 {
            return Err(SpiderError::illegal_parameter(format!(
                "{} buffer capacity must be at least 1",
                name
            )));
        }
        if self.max_buffer_num == 0 {
            return Err(SpiderError::illegal_parameter(format!(
                "{} max buffer number must be at least 1",
                name
            )));
        }
        Ok(())
    }
}

impl Args for PoolArgs {
    fn check(&self) -> Result<()> {
        self.check_named("pool")
    }
}

/// Sizing of the four pools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataArgs {
    pub requests: PoolArgs,
    pub responses: PoolArgs,
    pub items: PoolArgs,
    pub errors: PoolArgs,
}

impl Default for DataArgs {
    fn default() -> Self {
        let buffers = num_cpus::get().clamp(2, 16) as u32;
        DataArgs {
            requests: PoolArgs::new(64, buffers),
            responses: PoolArgs::new(32, buffers),
            items: PoolArgs::new(128, buffers),
            errors: PoolArgs::new(32, 2),
        }
    }
}

impl Args for DataArgs {
    fn check(&self) -> Result<()> {
        self.requests.check_named("request")?;
        self.responses.check_named("response")?;
        self.items.check_named("item")?;
        self.errors.check_named("error")
    }
}

/// The modules to register.
#[derive(Clone, Default)]
pub struct ModuleArgs {
    pub fetchers: Vec<Arc<dyn Fetcher>>,
    pub extractors: Vec<Arc<dyn Extractor>>,
    pub processors: Vec<Arc<dyn Processor>>,
}

impl ModuleArgs {
    pub fn len(&self, kind: ModuleKind) -> usize {
        match kind {
            ModuleKind::Fetcher => self.fetchers.len(),
            ModuleKind::Extractor => self.extractors.len(),
            ModuleKind::Processor => self.processors.len(),
        }
    }
}

impl Args for ModuleArgs {
    fn check(&self) -> Result<()> {
        for kind in ModuleKind::ALL {
            if self.len(kind) == 0 {
                return Err(SpiderError::illegal_parameter(format!("no {} given", kind)));
            }
        }
        Ok(())
    }
}

impl fmt::Debug for ModuleArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ids = |modules: Vec<String>| modules.join(", ");
        f.debug_struct("ModuleArgs")
            .field("fetchers", &ids(self.fetchers.iter().map(|m| m.id().to_string()).collect()))
            .field("extractors", &ids(self.extractors.iter().map(|m| m.id().to_string()).collect()))
            .field("processors", &ids(self.processors.iter().map(|m| m.id().to_string()).collect()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{StubFetcher, mid};

    #[test]
    fn request_args_rules() {
        assert!(RequestArgs::new(["example.com"], 2).check().is_ok());
        assert!(RequestArgs::new(Vec::<String>::new(), 3).check().is_err());
        assert!(RequestArgs::new(["example.com", " "], 3).check().is_err());
        assert!(RequestArgs::new(["example.com"], 1).check().is_err());
    }

    #[test]
    fn data_args_reject_zero_sizes() {
        let mut args = DataArgs::default();
        assert!(args.check().is_ok());
        args.items.max_buffer_num = 0;
        let err = args.check().unwrap_err();
        assert!(err.to_string().contains("item max buffer number"));
    }

    #[test]
    fn data_args_load_from_json() {
        let args: DataArgs = serde_json::from_str(
            r#"{
                "requests": {"bufferCap": 10, "maxBufferNum": 2},
                "responses": {"bufferCap": 5, "maxBufferNum": 1},
                "items": {"bufferCap": 8, "maxBufferNum": 4},
                "errors": {"bufferCap": 1, "maxBufferNum": 1}
            }"#,
        )
        .unwrap();
        assert_eq!(args.items, PoolArgs::new(8, 4));
        assert!(args.check().is_ok());
    }

    #[test]
    fn module_args_need_every_kind() {
        let mut args = ModuleArgs::default();
        args.fetchers.push(Arc::new(StubFetcher::new(mid(ModuleKind::Fetcher, 1))));
        let err = args.check().unwrap_err();
        assert!(err.to_string().contains("no extractor given"));
    }
}
