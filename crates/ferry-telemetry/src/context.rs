//! Process-level span context.

use tracing::{Span, span::Entered};

use crate::init::build_sha;

/// Keeps the `app` span entered for the lifetime of the process.
pub struct GlobalContextGuard {
    _guard: Entered<'static>,
}

impl GlobalContextGuard {
    /// Enter the `app` span tagged with `mode` and the build SHA.
    #[must_use]
    pub fn new(mode: impl Into<String>) -> Self {
        let mode = mode.into();
        let span: &'static Span = Box::leak(Box::new(tracing::info_span!(
            "app",
            mode = %mode,
            build_sha = %build_sha()
        )));
        Self {
            _guard: span.enter(),
        }
    }
}

/// Record the current application mode on the active span.
pub fn record_app_mode(mode: &str) {
    Span::current().record("mode", tracing::field::display(mode));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_can_be_entered_and_dropped() {
        let guard = GlobalContextGuard::new("worker");
        record_app_mode("janitor");
        drop(guard);
    }
}
