//! Static route table resolved once at startup.

use std::collections::BTreeMap;
use std::sync::Arc;

use ferry_core::{Route, Sink, Source};

use crate::error::{WorkerError, WorkerResult};

/// Adapter pair executing one route.
#[derive(Clone)]
pub struct RoutePair {
    /// Fetches into staging.
    pub source: Arc<dyn Source>,
    /// Publishes from staging.
    pub sink: Arc<dyn Sink>,
}

/// Lookup from route to its adapter pair.
#[derive(Clone, Default)]
pub struct RouteTable {
    entries: BTreeMap<Route, RoutePair>,
}

impl RouteTable {
    /// Empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the adapters for `route`, replacing any previous pair.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::AdapterMismatch`] when either adapter serves a
    /// different endpoint class than the route names.
    pub fn insert(
        &mut self,
        route: Route,
        source: Arc<dyn Source>,
        sink: Arc<dyn Sink>,
    ) -> WorkerResult<()> {
        for (expected, actual) in [
            (route.source(), source.kind()),
            (route.destination(), sink.kind()),
        ] {
            if expected != actual {
                return Err(WorkerError::AdapterMismatch {
                    route,
                    expected,
                    actual,
                });
            }
        }
        self.entries.insert(route, RoutePair { source, sink });
        Ok(())
    }

    /// Builder-style [`RouteTable::insert`].
    ///
    /// # Errors
    ///
    /// See [`RouteTable::insert`].
    pub fn with(
        mut self,
        route: Route,
        source: Arc<dyn Source>,
        sink: Arc<dyn Sink>,
    ) -> WorkerResult<Self> {
        self.insert(route, source, sink)?;
        Ok(self)
    }

    /// Adapter pair for `route`.
    #[must_use]
    pub fn get(&self, route: Route) -> Option<&RoutePair> {
        self.entries.get(&route)
    }

    /// Routes with registered adapters, in stable order.
    #[must_use]
    pub fn routes(&self) -> Vec<Route> {
        self.entries.keys().copied().collect()
    }

    /// Restrict the table to the routes accepted by `keep`.
    #[must_use]
    pub fn filtered(&self, keep: impl Fn(Route) -> bool) -> Self {
        Self {
            entries: self
                .entries
                .iter()
                .filter(|(route, _)| keep(**route))
                .map(|(route, pair)| (*route, pair.clone()))
                .collect(),
        }
    }

    /// Whether no route is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
