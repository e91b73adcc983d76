//! Point-in-time description of a scheduler.

use super::args::{DataArgs, RequestArgs};
use super::status::Status;
use crate::error::Result;
use crate::module::ModuleSummary;
use crate::pool::PoolStats;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolsSummary {
    pub requests: PoolStats,
    pub responses: PoolStats,
    pub items: PoolStats,
    pub errors: PoolStats,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerSummary {
    pub status: Status,
    pub request_args: Option<RequestArgs>,
    pub data_args: Option<DataArgs>,
    pub fetchers: Vec<ModuleSummary>,
    pub extractors: Vec<ModuleSummary>,
    pub processors: Vec<ModuleSummary>,
    pub seen_urls: usize,
    pub pools: Option<PoolsSummary>,
}

impl SchedulerSummary {
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn to_json_string_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

fn write_modules(f: &mut fmt::Formatter<'_>, title: &str, modules: &[ModuleSummary]) -> fmt::Result {
    writeln!(f, "  {} ({}):", title, modules.len())?;
    for module in modules {
        writeln!(
            f,
            "    {} called: {}, accepted: {}, completed: {}, handling: {}",
            module.id,
            module.counts.called,
            module.counts.accepted,
            module.counts.completed,
            module.counts.handling
        )?;
    }
    Ok(())
}

fn write_pool(f: &mut fmt::Formatter<'_>, name: &str, pool: &PoolStats) -> fmt::Result {
    writeln!(
        f,
        "    {:<9} buffers: {}/{} x {}, total: {}{}",
        name,
        pool.buffer_num,
        pool.max_buffer_num,
        pool.buffer_cap,
        pool.total,
        if pool.closed { ", closed" } else { "" }
    )
}

impl fmt::Display for SchedulerSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Scheduler ({})", self.status)?;
        if let Some(args) = &self.request_args {
            writeln!(
                f,
                "  accepted domains: {}, max depth: {}",
                args.accepted_domains.join(", "),
                args.max_depth
            )?;
        }
        write_modules(f, "fetchers", &self.fetchers)?;
        write_modules(f, "extractors", &self.extractors)?;
        write_modules(f, "processors", &self.processors)?;
        writeln!(f, "  seen urls: {}", self.seen_urls)?;
        if let Some(pools) = &self.pools {
            writeln!(f, "  pools:")?;
            write_pool(f, "requests", &pools.requests)?;
            write_pool(f, "responses", &pools.responses)?;
            write_pool(f, "items", &pools.items)?;
            write_pool(f, "errors", &pools.errors)?;
        }
        Ok(())
    }
}
