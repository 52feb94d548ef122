//! Main application entry point for Quarry.

use crate::core::{Config, QuarryError, Result};
use crate::index::{DriverRegistry, IndexSink, PathIndex};
use crate::monitoring::{IntakeStats, Monitor};
use crate::receiver::{Intake, Receiver};
use crate::storage::{MemoryStore, PointSink};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Wires configuration, the path index, the point store and the receivers.
pub struct Application {
    config: Config,
    registry: DriverRegistry,
}

impl Application {
    /// Create an application with the built-in index drivers.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            registry: DriverRegistry::builtin(),
        })
    }

    /// Replace the driver registry.
    pub fn with_registry(mut self, registry: DriverRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Connect the index, bind both listeners and start serving.
    ///
    /// Fails if the index backend cannot be initialised or a port is taken.
    pub async fn start(self) -> Result<RunningApplication> {
        let index = Arc::new(PathIndex::connect(&self.registry, &self.config.index).await?);
        let store = Arc::new(MemoryStore::from_config(&self.config.storage));
        let stats = Arc::new(IntakeStats::new());

        let intake = Intake::new(
            Arc::clone(&store) as Arc<dyn PointSink>,
            Arc::clone(&index) as Arc<dyn IndexSink>,
            Arc::clone(&stats),
        );
        let receiver = Receiver::bind(&self.config, intake).await?;
        let plaintext_addr = receiver.plaintext_addr()?;
        let pickle_addr = receiver.pickle_addr()?;

        let monitor = Monitor::new(Arc::clone(&stats), self.config.monitoring.stats_interval);
        let monitor_handle = monitor.start();

        let (shutdown, signal) = watch::channel(false);
        let receiver_handle = tokio::spawn(receiver.run(signal));

        tracing::info!(
            plaintext = %plaintext_addr,
            pickle = %pickle_addr,
            index = index.driver_name(),
            max_connections = self.config.server.max_connections,
            "Quarry started"
        );

        Ok(RunningApplication {
            shutdown,
            receiver: receiver_handle,
            monitor,
            monitor_handle,
            index,
            store,
            plaintext_addr,
            pickle_addr,
        })
    }

    /// Serve until Ctrl-C, then drain and shut down.
    pub async fn run(self) -> Result<()> {
        let running = self.start().await?;

        tokio::signal::ctrl_c().await?;
        tracing::info!("Received shutdown signal, draining connections");

        running.shutdown().await
    }
}

/// Handle to a started application.
pub struct RunningApplication {
    shutdown: watch::Sender<bool>,
    receiver: JoinHandle<Result<()>>,
    monitor: Monitor,
    monitor_handle: JoinHandle<()>,
    index: Arc<PathIndex>,
    store: Arc<MemoryStore>,
    plaintext_addr: SocketAddr,
    pickle_addr: SocketAddr,
}

impl RunningApplication {
    /// Bound plaintext listener address.
    pub fn plaintext_addr(&self) -> SocketAddr {
        self.plaintext_addr
    }

    /// Bound pickle listener address.
    pub fn pickle_addr(&self) -> SocketAddr {
        self.pickle_addr
    }

    /// The path index.
    pub fn index(&self) -> &Arc<PathIndex> {
        &self.index
    }

    /// The bundled point store.
    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }

    /// Intake counters.
    pub fn stats(&self) -> &Arc<IntakeStats> {
        self.monitor.stats()
    }

    /// Stop accepting, drain connections and close the index.
    pub async fn shutdown(self) -> Result<()> {
        // The receiver may already have exited; a closed channel is fine.
        let _ = self.shutdown.send(true);
        let served = self.receiver.await.map_err(QuarryError::from)?;

        self.monitor.stop();
        self.monitor_handle.abort();

        if let Err(error) = self.index.close().await {
            tracing::warn!(%error, "Failed to close path index");
        }

        let stats = self.monitor.stats().snapshot();
        tracing::info!(
            points = stats.points(),
            connections = stats.connections_accepted,
            "Quarry stopped"
        );
        served
    }
}
