//! TCP intake for the Graphite plaintext and pickle protocols.
//!
//! [`Receiver`] owns both listeners and runs one task per accepted
//! connection. A shared semaphore caps concurrent connections across both
//! protocols; a `watch` signal stops accepting and drains in-flight
//! handlers.

pub mod pickle;
pub mod plaintext;

use crate::core::{Config, MetricPoint, Protocol, QuarryError, Result};
use crate::index::IndexSink;
use crate::monitoring::IntakeStats;
use crate::storage::PointSink;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, info_span, warn, Instrument};

/// Collaborators every connection handler writes to.
#[derive(Clone)]
pub struct Intake {
    /// Destination for decoded points
    pub points: Arc<dyn PointSink>,
    /// Destination for seen paths
    pub index: Arc<dyn IndexSink>,
    /// Shared counters
    pub stats: Arc<IntakeStats>,
}

impl Intake {
    /// Bundle the collaborators.
    pub fn new(
        points: Arc<dyn PointSink>,
        index: Arc<dyn IndexSink>,
        stats: Arc<IntakeStats>,
    ) -> Self {
        Self {
            points,
            index,
            stats,
        }
    }

    /// Hand one point to the sink, then announce its path to the index.
    ///
    /// A sink failure ends the connection. Index failures are counted and
    /// the point still counts as delivered.
    pub async fn forward(&self, point: &MetricPoint) -> Result<()> {
        if let Err(error) = self.points.set(point).await {
            self.stats.record_sink_error();
            return Err(error);
        }

        if let Err(error) = self.index.update(&point.path).await {
            self.stats.record_index_error();
            debug!(path = %point.path, %error, "Dropped index update");
        }
        Ok(())
    }
}

/// Per-connection limits.
#[derive(Debug, Clone)]
pub struct ConnectionLimits {
    /// Longest wait for the next read
    pub idle_timeout: Duration,
    /// Longest plaintext token
    pub max_token_bytes: usize,
    /// Largest pickle frame
    pub max_batch_bytes: usize,
}

impl ConnectionLimits {
    /// Limits taken from configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            idle_timeout: config.server.connection_timeout,
            max_token_bytes: config.ingest.max_token_bytes,
            max_batch_bytes: config.ingest.max_batch_bytes,
        }
    }
}

/// Await a socket read, failing with [`QuarryError::Timeout`] if the peer
/// stays silent for `timeout`.
pub(crate) async fn idle<F, T>(timeout: Duration, read: F) -> Result<T>
where
    F: Future<Output = std::io::Result<T>>,
{
    match tokio::time::timeout(timeout, read).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(QuarryError::Timeout {
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        }),
    }
}

/// Spawns handlers for accepted connections.
struct Dispatcher {
    intake: Intake,
    limits: ConnectionLimits,
    permits: Arc<Semaphore>,
}

impl Dispatcher {
    fn dispatch(
        &self,
        handlers: &mut JoinSet<()>,
        protocol: Protocol,
        accepted: std::io::Result<(TcpStream, SocketAddr)>,
    ) {
        let (stream, peer) = match accepted {
            Ok(accepted) => accepted,
            Err(error) => {
                warn!(%protocol, %error, "Failed to accept connection");
                return;
            },
        };

        let Ok(permit) = Arc::clone(&self.permits).try_acquire_owned() else {
            self.intake.stats.connection_rejected();
            warn!(%protocol, %peer, "Connection limit reached, closing connection");
            return;
        };

        let intake = self.intake.clone();
        let limits = self.limits.clone();
        let span = info_span!("connection", %protocol, %peer);

        handlers.spawn(
            async move { serve(protocol, stream, &intake, &limits, permit).await }.instrument(span),
        );
    }
}

async fn serve(
    protocol: Protocol,
    stream: TcpStream,
    intake: &Intake,
    limits: &ConnectionLimits,
    permit: OwnedSemaphorePermit,
) {
    intake.stats.connection_opened();
    debug!("Connection opened");

    let result = match protocol {
        Protocol::Plaintext => plaintext::handle(stream, intake, limits).await,
        Protocol::Pickle => pickle::handle(stream, intake, limits).await,
    };

    match result {
        Ok(points) => debug!(points, "Connection closed"),
        Err(QuarryError::Timeout { timeout_ms }) => {
            debug!(timeout_ms, "Closing idle connection");
        },
        Err(error) => {
            intake.stats.record_error(&error);
            warn!(%error, category = error.category(), "Closing connection");
        },
    }

    // Free the slot before the connection stops counting as active.
    drop(permit);
    intake.stats.connection_closed();
}

/// Bound plaintext and pickle listeners.
pub struct Receiver {
    plaintext: TcpListener,
    pickle: TcpListener,
    dispatcher: Dispatcher,
    drain_timeout: Duration,
}

impl Receiver {
    /// Bind both listeners. Port 0 picks a free port; see
    /// [`Receiver::plaintext_addr`] and [`Receiver::pickle_addr`].
    pub async fn bind(config: &Config, intake: Intake) -> Result<Self> {
        let plaintext = bind_listener(config.plaintext_addr(), Protocol::Plaintext).await?;
        let pickle = bind_listener(config.pickle_addr(), Protocol::Pickle).await?;

        Ok(Self {
            plaintext,
            pickle,
            dispatcher: Dispatcher {
                intake,
                limits: ConnectionLimits::from_config(config),
                permits: Arc::new(Semaphore::new(config.server.max_connections)),
            },
            drain_timeout: config.server.drain_timeout,
        })
    }

    /// Local address of the plaintext listener.
    pub fn plaintext_addr(&self) -> Result<SocketAddr> {
        Ok(self.plaintext.local_addr()?)
    }

    /// Local address of the pickle listener.
    pub fn pickle_addr(&self) -> Result<SocketAddr> {
        Ok(self.pickle.local_addr()?)
    }

    /// Accept connections until `shutdown` turns true or its sender is
    /// dropped, then drain in-flight handlers.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let Receiver {
            plaintext,
            pickle,
            dispatcher,
            drain_timeout,
        } = self;
        let mut handlers = JoinSet::new();

        while !*shutdown.borrow() {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                accepted = plaintext.accept() => {
                    dispatcher.dispatch(&mut handlers, Protocol::Plaintext, accepted);
                }
                accepted = pickle.accept() => {
                    dispatcher.dispatch(&mut handlers, Protocol::Pickle, accepted);
                }
                Some(joined) = handlers.join_next(), if !handlers.is_empty() => {
                    log_join(joined);
                }
            }
        }

        drop(plaintext);
        drop(pickle);
        drain(handlers, drain_timeout).await;
        Ok(())
    }
}

async fn bind_listener(addr: SocketAddr, protocol: Protocol) -> Result<TcpListener> {
    let listener = TcpListener::bind(addr).await.map_err(|e| {
        QuarryError::network(format!("failed to bind {} listener on {}: {}", protocol, addr, e))
    })?;
    info!(%protocol, addr = %listener.local_addr()?, "Listening");
    Ok(listener)
}

async fn drain(mut handlers: JoinSet<()>, timeout: Duration) {
    if handlers.is_empty() {
        return;
    }

    info!(in_flight = handlers.len(), "Draining connections");
    let drained = tokio::time::timeout(timeout, async {
        while let Some(joined) = handlers.join_next().await {
            log_join(joined);
        }
    })
    .await;

    if drained.is_err() {
        warn!(remaining = handlers.len(), "Drain timeout reached, aborting connections");
        handlers.abort_all();
        while handlers.join_next().await.is_some() {}
    }
}

fn log_join(joined: std::result::Result<(), tokio::task::JoinError>) {
    if let Err(error) = joined {
        if error.is_panic() {
            tracing::error!(%error, "Connection handler panicked");
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Recording collaborators for handler tests.

    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    pub(crate) struct Recorder {
        points: Mutex<Vec<MetricPoint>>,
        paths: Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl PointSink for Recorder {
        async fn set(&self, point: &MetricPoint) -> Result<()> {
            self.points.lock().push(point.clone());
            Ok(())
        }
    }

    #[async_trait::async_trait]
    impl IndexSink for Recorder {
        async fn update(&self, path: &str) -> Result<()> {
            self.paths.lock().push(path.to_string());
            Ok(())
        }
    }

    pub(crate) struct RecordingIntake {
        pub(crate) intake: Intake,
        recorder: Arc<Recorder>,
    }

    impl RecordingIntake {
        pub(crate) fn new() -> Self {
            let recorder = Arc::new(Recorder::default());
            let intake = Intake::new(
                Arc::clone(&recorder) as Arc<dyn PointSink>,
                Arc::clone(&recorder) as Arc<dyn IndexSink>,
                Arc::new(IntakeStats::new()),
            );
            Self { intake, recorder }
        }

        pub(crate) fn points(&self) -> Vec<MetricPoint> {
            self.recorder.points.lock().clone()
        }

        pub(crate) fn paths(&self) -> Vec<String> {
            self.recorder.paths.lock().clone()
        }
    }

    pub(crate) fn limits() -> ConnectionLimits {
        ConnectionLimits {
            idle_timeout: Duration::from_secs(5),
            max_token_bytes: 1024,
            max_batch_bytes: 64 * 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::Recorder;
    use super::*;
    use crate::core::ConfigBuilder;
    use tokio::io::AsyncWriteExt;

    struct FailingSink;

    #[async_trait::async_trait]
    impl PointSink for FailingSink {
        async fn set(&self, _point: &MetricPoint) -> Result<()> {
            Err(QuarryError::storage("disk full"))
        }
    }

    #[async_trait::async_trait]
    impl IndexSink for FailingSink {
        async fn update(&self, _path: &str) -> Result<()> {
            Err(QuarryError::index("backend down"))
        }
    }

    #[tokio::test]
    async fn test_index_failure_does_not_drop_point() {
        let recorder = Arc::new(Recorder::default());
        let stats = Arc::new(IntakeStats::new());
        let intake = Intake::new(recorder, Arc::new(FailingSink), Arc::clone(&stats));

        intake.forward(&MetricPoint::new("a", 1.0, 1)).await.unwrap();
        assert_eq!(stats.snapshot().index_errors, 1);
    }

    #[tokio::test]
    async fn test_sink_failure_ends_connection() {
        let recorder = Arc::new(Recorder::default());
        let stats = Arc::new(IntakeStats::new());
        let intake = Intake::new(Arc::new(FailingSink), recorder, Arc::clone(&stats));

        assert!(intake.forward(&MetricPoint::new("a", 1.0, 1)).await.is_err());
        assert_eq!(stats.snapshot().sink_errors, 1);
    }

    #[tokio::test]
    async fn test_idle_timeout() {
        let (_client, server) = tokio::io::duplex(64);
        let limits = ConnectionLimits {
            idle_timeout: Duration::from_millis(20),
            ..testing::limits()
        };
        let intake = testing::RecordingIntake::new();
        let err = plaintext::handle(server, &intake.intake, &limits).await.unwrap_err();
        assert!(matches!(err, QuarryError::Timeout { timeout_ms: 20 }));
    }

    #[tokio::test]
    async fn test_shutdown_stops_accepting() {
        let config = ConfigBuilder::new()
            .bind_address([127, 0, 0, 1].into())
            .plaintext_port(0)
            .pickle_port(0)
            .build()
            .unwrap();
        let intake = testing::RecordingIntake::new();
        let receiver = Receiver::bind(&config, intake.intake.clone()).await.unwrap();
        let addr = receiver.plaintext_addr().unwrap();

        let (tx, rx) = watch::channel(false);
        let server = tokio::spawn(receiver.run(rx));

        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(b"a.b 1 100\n").await.unwrap();
        client.shutdown().await.unwrap();

        tx.send(true).unwrap();
        server.await.unwrap().unwrap();
        assert!(TcpStream::connect(addr).await.is_err());
    }
}
