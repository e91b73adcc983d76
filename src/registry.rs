//! # Registry Module
//!
//! Keeps track of every registered module and picks one per work item.
//!
//! ## Overview
//!
//! Modules are stored per [`ModuleKind`] and keyed by their [`Mid`]. Selection
//! refreshes every candidate's score and hands out the lowest one; when two
//! candidates tie, the one with the smaller `Mid` wins, so selection is
//! deterministic for a given set of counters.

use crate::error::{Result, SpiderError};
use crate::extractor::Extractor;
use crate::fetcher::Fetcher;
use crate::module::{Mid, Module, ModuleBase, ModuleKind, ModuleSummary};
use crate::processor::Processor;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};

/// A registered module of any kind.
#[derive(Clone)]
pub enum Component {
    Fetcher(Arc<dyn Fetcher>),
    Extractor(Arc<dyn Extractor>),
    Processor(Arc<dyn Processor>),
}

impl Component {
    /// The kind this component is registered as.
    pub fn kind(&self) -> ModuleKind {
        match self {
            Component::Fetcher(_) => ModuleKind::Fetcher,
            Component::Extractor(_) => ModuleKind::Extractor,
            Component::Processor(_) => ModuleKind::Processor,
        }
    }

    pub fn base(&self) -> &ModuleBase {
        match self {
            Component::Fetcher(module) => module.base(),
            Component::Extractor(module) => module.base(),
            Component::Processor(module) => module.base(),
        }
    }

    pub fn id(&self) -> &Mid {
        self.base().id()
    }

    pub fn summary(&self) -> ModuleSummary {
        self.base().summary()
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Component").field(self.base()).finish()
    }
}

impl From<Arc<dyn Fetcher>> for Component {
    fn from(module: Arc<dyn Fetcher>) -> Self {
        Component::Fetcher(module)
    }
}

impl From<Arc<dyn Extractor>> for Component {
    fn from(module: Arc<dyn Extractor>) -> Self {
        Component::Extractor(module)
    }
}

impl From<Arc<dyn Processor>> for Component {
    fn from(module: Arc<dyn Processor>) -> Self {
        Component::Processor(module)
    }
}

#[derive(Default)]
pub struct Registry {
    modules: RwLock<BTreeMap<ModuleKind, BTreeMap<Mid, Component>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `component`.
    ///
    /// Returns `Ok(false)` without replacing anything when a module with the
    /// same identity is already registered.
    pub fn register(&self, component: impl Into<Component>) -> Result<bool> {
        let component = component.into();
        let mid = component.id().clone();
        if mid.kind() != component.kind() {
            return Err(SpiderError::illegal_parameter(format!(
                "mid {} does not match module kind {}",
                mid,
                component.kind()
            )));
        }

        let mut modules = self.modules.write();
        let by_kind = modules.entry(mid.kind()).or_default();
        if by_kind.contains_key(&mid) {
            debug!("Module {} is already registered", mid);
            return Ok(false);
        }
        by_kind.insert(mid.clone(), component);
        debug!("Registered module {}", mid);
        Ok(true)
    }

    /// Removes the module with identity `mid`. Returns whether it was present.
    pub fn unregister(&self, mid: &Mid) -> Result<bool> {
        let mut modules = self.modules.write();
        let removed = modules
            .get_mut(&mid.kind())
            .and_then(|by_kind| by_kind.remove(mid))
            .is_some();
        if removed {
            debug!("Unregistered module {}", mid);
        }
        Ok(removed)
    }

    /// Selects the least loaded module of `kind`.
    pub fn get(&self, kind: ModuleKind) -> Result<Component> {
        let modules = self.modules.read();
        let candidates = modules
            .get(&kind)
            .filter(|by_kind| !by_kind.is_empty())
            .ok_or_else(|| SpiderError::configuration(format!("no {} registered", kind)))?;

        let mut selected: Option<(u64, &Component)> = None;
        for component in candidates.values() {
            let score = component.base().refresh_score()?;
            if selected.map_or(true, |(best, _)| score < best) {
                selected = Some((score, component));
            }
        }

        let (score, component) = selected
            .ok_or_else(|| SpiderError::configuration(format!("no {} registered", kind)))?;
        trace!("Selected {} with score {}", component.id(), score);
        Ok(component.clone())
    }

    pub fn get_fetcher(&self) -> Result<Arc<dyn Fetcher>> {
        match self.get(ModuleKind::Fetcher)? {
            Component::Fetcher(module) => Ok(module),
            other => Err(mismatch(ModuleKind::Fetcher, &other)),
        }
    }

    pub fn get_extractor(&self) -> Result<Arc<dyn Extractor>> {
        match self.get(ModuleKind::Extractor)? {
            Component::Extractor(module) => Ok(module),
            other => Err(mismatch(ModuleKind::Extractor, &other)),
        }
    }

    pub fn get_processor(&self) -> Result<Arc<dyn Processor>> {
        match self.get(ModuleKind::Processor)? {
            Component::Processor(module) => Ok(module),
            other => Err(mismatch(ModuleKind::Processor, &other)),
        }
    }

    pub fn get_all_by_kind(&self, kind: ModuleKind) -> BTreeMap<Mid, Component> {
        self.modules.read().get(&kind).cloned().unwrap_or_default()
    }

    pub fn get_all(&self) -> BTreeMap<Mid, Component> {
        self.modules
            .read()
            .values()
            .flat_map(|by_kind| by_kind.iter().map(|(mid, c)| (mid.clone(), c.clone())))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.modules.read().values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.modules.write().clear();
    }

    /// Total in-progress invocations across every registered module.
    pub fn handling(&self) -> u64 {
        self.modules
            .read()
            .values()
            .flat_map(BTreeMap::values)
            .map(|c| c.base().counts().handling)
            .sum()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry").field("modules", &self.len()).finish()
    }
}

fn mismatch(expected: ModuleKind, found: &Component) -> SpiderError {
    SpiderError::configuration(format!(
        "expected a {} but {} is a {}",
        expected,
        found.id(),
        found.kind()
    ))
}
