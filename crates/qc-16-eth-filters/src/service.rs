//! Filter service - wires the registry, the aggregator and the filter manager
//! to the event bus.

use crate::domain::aggregator::ReceiptAggregator;
use crate::domain::config::FilterConfig;
use crate::domain::error::PipelineError;
use crate::domain::manager::FilterManager;
use crate::domain::registry::{spawn_eviction, FilterRegistry};
use crate::ipc::bus_adapter::{
    aggregator_filter, manager_filter, AggregatorWorker, FilterManagerWorker,
};
use crate::ports::LogBackend;
use crate::rpc::FilterApi;
use shared_bus::InMemoryEventBus;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

/// Filter subsystem service state
pub struct FilterService {
    config: FilterConfig,
    bus: Arc<InMemoryEventBus>,
    registry: Arc<FilterRegistry>,
    api: FilterApi,
    tasks: Vec<JoinHandle<()>>,
}

impl FilterService {
    /// Create a new filter service on an existing bus
    pub fn new(
        config: FilterConfig,
        bus: Arc<InMemoryEventBus>,
        backend: Arc<dyn LogBackend>,
    ) -> Result<Self, PipelineError> {
        config.validate()?;

        let registry = Arc::new(FilterRegistry::new(
            config.filter_timeout,
            config.broadcast_workers,
        )?);
        let api = FilterApi::new(Arc::clone(&registry), backend);

        Ok(Self {
            config,
            bus,
            registry,
            api,
            tasks: Vec::new(),
        })
    }

    /// Create a filter service with its own bus sized by `bus_capacity`
    pub fn standalone(
        config: FilterConfig,
        backend: Arc<dyn LogBackend>,
    ) -> Result<Self, PipelineError> {
        let bus = Arc::new(InMemoryEventBus::with_capacity(config.bus_capacity));
        Self::new(config, bus, backend)
    }

    /// Subscribe to the bus and spawn the background tasks.
    ///
    /// Must be called from within a Tokio runtime. Subscriptions are taken
    /// before this returns, so events published afterwards are not missed.
    pub fn start(&mut self) -> Result<(), PipelineError> {
        if !self.tasks.is_empty() {
            return Err(PipelineError::AlreadyStarted);
        }

        let manager = FilterManager::new(
            Arc::clone(&self.registry),
            self.config.finalize_workers,
            self.config.max_pending_heights,
        )?;
        let aggregator = ReceiptAggregator::new(self.config.max_deferred_events);

        let aggregator_worker = AggregatorWorker::new(
            self.bus.subscribe(aggregator_filter()),
            self.bus.clone(),
            aggregator,
        );
        let manager_worker =
            FilterManagerWorker::new(self.bus.subscribe(manager_filter()), manager);

        self.tasks.push(spawn_eviction(
            &self.registry,
            self.config.sweep_interval(),
        ));
        self.tasks.push(tokio::spawn(aggregator_worker.run()));
        self.tasks.push(tokio::spawn(manager_worker.run()));

        info!(
            filter_timeout = ?self.config.filter_timeout,
            sweep_interval = ?self.config.sweep_interval(),
            broadcast_workers = self.config.broadcast_workers,
            finalize_workers = self.config.finalize_workers,
            "Filter service started"
        );
        Ok(())
    }

    /// Stop all background tasks
    pub fn shutdown(&mut self) {
        if self.tasks.is_empty() {
            return;
        }
        for task in self.tasks.drain(..) {
            task.abort();
        }
        info!("Filter service stopped");
    }

    pub fn is_running(&self) -> bool {
        !self.tasks.is_empty()
    }

    pub fn api(&self) -> &FilterApi {
        &self.api
    }

    pub fn registry(&self) -> &Arc<FilterRegistry> {
        &self.registry
    }

    pub fn bus(&self) -> &Arc<InMemoryEventBus> {
        &self.bus
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }
}

impl Drop for FilterService {
    fn drop(&mut self) {
        self.shutdown();
    }
}
