//! The three pipeline loops.
//!
//! Each loop pulls one work item at a time from its pool, picks the least
//! loaded module of the matching kind and hands the results on:
//!
//! - download: request pool -> fetcher -> response pool
//! - analyze: response pool -> extractor -> request pool (through admission) and item pool
//! - process: item pool -> processor
//!
//! Every error goes to the error pool, classified by the module it came from.
//! A loop exits when the cancellation token fires or its pool is closed.

use super::context::Context;
use crate::module::{Data, Item, Module, Request, Response};
use crate::pool::Pool;
use log::{debug, trace, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Pause after a failed module selection before the item is picked up again.
const RESELECT_PAUSE: Duration = Duration::from_millis(10);

pub(crate) fn spawn_download_loop(ctx: Arc<Context>) -> JoinHandle<()> {
    tokio::spawn(async move {
        trace!("Download loop started");
        while let Some(request) = next_from(&ctx, &ctx.requests, "request").await {
            if ctx.canceled() {
                break;
            }
            download_one(&ctx, request).await;
        }
        trace!("Download loop exited");
    })
}

pub(crate) fn spawn_analyze_loop(ctx: Arc<Context>) -> JoinHandle<()> {
    tokio::spawn(async move {
        trace!("Analyze loop started");
        while let Some(response) = next_from(&ctx, &ctx.responses, "response").await {
            if ctx.canceled() {
                break;
            }
            analyze_one(&ctx, response).await;
        }
        trace!("Analyze loop exited");
    })
}

pub(crate) fn spawn_process_loop(ctx: Arc<Context>) -> JoinHandle<()> {
    tokio::spawn(async move {
        trace!("Process loop started");
        while let Some(item) = next_from(&ctx, &ctx.items, "item").await {
            if ctx.canceled() {
                break;
            }
            process_one(&ctx, item).await;
        }
        trace!("Process loop exited");
    })
}

/// Waits for the next value in `pool`, or `None` once the loop should stop.
async fn next_from<T: Send + 'static>(ctx: &Context, pool: &Pool<T>, name: &str) -> Option<T> {
    if ctx.canceled() {
        trace!("Cancellation detected before reading the {} pool", name);
        return None;
    }
    tokio::select! {
        biased;
        _ = ctx.cancel.cancelled() => {
            trace!("Cancellation detected while waiting on the {} pool", name);
            None
        }
        result = pool.get() => match result {
            Ok(value) => Some(value),
            Err(e) => {
                debug!("The {} pool is unavailable: {}", name, e);
                None
            }
        }
    }
}

async fn download_one(ctx: &Context, request: Request) {
    let fetcher = match ctx.registry.get_fetcher() {
        Ok(fetcher) => fetcher,
        Err(e) => {
            warn!("No fetcher for {}: {}", request.url(), e);
            ctx.send_error(e, None);
            tokio::time::sleep(RESELECT_PAUSE).await;
            ctx.requeue_req(request);
            return;
        }
    };

    trace!("Fetching {} with {}", request.url(), fetcher.id());
    match fetcher.download(&request).await {
        Ok(response) => {
            // Recorded before the response moves on so the extractor's own
            // links to this URL are already rejected.
            ctx.mark_seen(request.url());
            ctx.stats.increment_responses_fetched();
            ctx.stats.add_bytes_downloaded(response.body().len());
            ctx.send_resp(response);
        }
        Err(e) => {
            debug!("Fetching {} failed: {}", request.url(), e);
            ctx.send_error(e, Some(fetcher.id()));
        }
    }
}

async fn analyze_one(ctx: &Context, response: Response) {
    let extractor = match ctx.registry.get_extractor() {
        Ok(extractor) => extractor,
        Err(e) => {
            warn!("No extractor for {}: {}", response.url(), e);
            ctx.send_error(e, None);
            tokio::time::sleep(RESELECT_PAUSE).await;
            ctx.requeue_resp(response);
            return;
        }
    };

    trace!("Analyzing {} with {}", response.url(), extractor.id());
    let (data, errors) = extractor.analyze(response).await;
    ctx.stats.increment_responses_analyzed();

    for value in data {
        match value {
            Data::Request(request) => {
                ctx.send_req(request);
            }
            Data::Item(item) => {
                ctx.stats.increment_items_produced();
                ctx.send_item(item);
            }
        }
    }
    for error in errors {
        ctx.send_error(error, Some(extractor.id()));
    }
}

async fn process_one(ctx: &Context, item: Item) {
    let processor = match ctx.registry.get_processor() {
        Ok(processor) => processor,
        Err(e) => {
            warn!("No processor for item: {}", e);
            ctx.send_error(e, None);
            tokio::time::sleep(RESELECT_PAUSE).await;
            ctx.requeue_item(item);
            return;
        }
    };

    trace!("Processing item with {}", processor.id());
    let errors = processor.send(item).await;
    ctx.stats.increment_items_processed();
    for error in errors {
        ctx.send_error(error, Some(processor.id()));
    }
}
