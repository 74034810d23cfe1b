//! Diagnostic entry point.

use crate::detector::ProblemDetector;
use crate::session::{DiagnosticClient, Toolkit};
use metacheck_commons::{DiagnosticOptions, Problem};
use metacheck_configs::{MetacheckConfig, TimeoutSettings};
use metacheck_fork::ChopsticksEngine;
use metacheck_link::LinkTimeouts;
use metacheck_live::{SimulationEngine, SubscriptionMultiplexer};
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;

/// Runs metadata diagnostics against forks of live chains.
///
/// ```rust,no_run
/// use metacheck_commons::DiagnosticOptions;
/// use metacheck_configs::MetacheckConfig;
/// use metacheck_core::{Diagnostics, Toolkit};
/// # async fn example(toolkit: Toolkit) -> anyhow::Result<()> {
/// let config = MetacheckConfig::load_or_default("metacheck.toml")?;
/// let diagnostics = Diagnostics::from_config(&config, toolkit);
/// let problems = diagnostics
///     .get_problems("wss://rpc.example.org", DiagnosticOptions::default())
///     .await;
/// for problem in problems {
///     println!("{}", problem);
/// }
/// # Ok(())
/// # }
/// ```
pub struct Diagnostics {
    engine: Arc<dyn SimulationEngine>,
    toolkit: Toolkit,
    timeouts: TimeoutSettings,
}

impl Diagnostics {
    pub fn new(engine: Arc<dyn SimulationEngine>, toolkit: Toolkit, timeouts: TimeoutSettings) -> Self {
        Self {
            engine,
            toolkit,
            timeouts,
        }
    }

    /// Diagnostics backed by Chopsticks workers launched per `config.worker`.
    pub fn from_config(config: &MetacheckConfig, toolkit: Toolkit) -> Self {
        Self::new(
            Arc::new(ChopsticksEngine::from_config(config)),
            toolkit,
            config.timeouts.clone(),
        )
    }

    fn link_timeouts(&self) -> LinkTimeouts {
        LinkTimeouts::builder()
            .request_timeout(self.timeouts.request_timeout())
            .follow_timeout(self.timeouts.follow_timeout())
            .build()
    }

    /// Fork `endpoint` and report its metadata problems in detection order.
    /// An empty list means none were found. Never fails: a chain that cannot
    /// be forked, queried or decoded is reported as
    /// [`Problem::AncientMetadata`].
    pub async fn get_problems(&self, endpoint: &str, options: DiagnosticOptions) -> Vec<Problem> {
        let span = tracing::info_span!("diagnostic", endpoint = %endpoint);
        self.run(endpoint, options).instrument(span).await
    }

    async fn run(&self, endpoint: &str, options: DiagnosticOptions) -> Vec<Problem> {
        let started = Instant::now();
        log::info!("[metacheck-core] Diagnosing {} with {:?}", endpoint, options);

        let multiplexer =
            SubscriptionMultiplexer::new(Arc::clone(&self.engine), options.fork_params(endpoint));
        let session = match DiagnosticClient::open(&multiplexer, &self.toolkit, self.link_timeouts()).await {
            Ok(session) => session,
            Err(e) => {
                log::info!("[metacheck-core] {}: session setup failed: {}", Problem::AncientMetadata, e);
                return vec![Problem::AncientMetadata];
            },
        };

        let problems = ProblemDetector::new(&session, &self.toolkit, self.timeouts.broadcast_timeout())
            .run(options.token.as_ref())
            .await;
        session.destroy().await;

        log::info!(
            "[metacheck-core] {} finished in {:?} with {} problem(s): {:?}",
            endpoint,
            started.elapsed(),
            problems.len(),
            problems
        );
        problems
    }
}
