//! Shared router state.

use crate::config::ServiceConfig;
use crate::convert::{ConversionEngine, ConversionLimiter, DocumentConverter};
use crate::progress::{ExportObserver, TracingObserver};
use std::sync::Arc;

/// Everything a handler needs. Built once at startup and cloned per request.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServiceConfig>,
    pub engine: Arc<dyn ConversionEngine>,
    pub limiter: ConversionLimiter,
    pub observer: Arc<dyn ExportObserver>,
}

impl AppState {
    /// State with the built-in [`DocumentConverter`] and a tracing observer.
    pub fn new(config: ServiceConfig) -> Self {
        let engine = Arc::new(DocumentConverter::from_config(&config));
        Self::with_engine(config, engine)
    }

    /// State around a caller-supplied engine.
    pub fn with_engine(config: ServiceConfig, engine: Arc<dyn ConversionEngine>) -> Self {
        Self {
            limiter: ConversionLimiter::from_config(&config),
            config: Arc::new(config),
            engine,
            observer: Arc::new(TracingObserver),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn ExportObserver>) -> Self {
        self.observer = observer;
        self
    }
}
