//! Shared handler state.

use ferry_config::AppMode;
use ferry_links::DirectLinkRegistry;
use ferry_telemetry::Metrics;

/// Dependencies handed to every handler.
pub(crate) struct ApiState {
    pub(crate) registry: DirectLinkRegistry,
    pub(crate) metrics: Metrics,
    pub(crate) mode: AppMode,
}
