//! HAFLEET Simulator
//!
//! Runs an in-process fleet of simulated sessions with a health-check peer
//! that answers every ding with a dong. Selected nodes go silent after a
//! delay; a forced reset brings them back.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use clap::Parser;
use hafleet::{
    ConnectionState, FailoverCoordinator, HaConfig, HaError, InboundMessage, Interval,
    NodeEvent, NodeId, NodeTransport,
};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

/// HAFLEET simulator - watch ding/dong failover on a fake fleet
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Number of nodes
    #[arg(short, long, default_value_t = 4)]
    nodes: usize,

    /// Number of HA clusters the nodes are spread across
    #[arg(short, long, default_value_t = 2)]
    clusters: usize,

    /// Ding period in seconds
    #[arg(long, default_value_t = 6)]
    probe_secs: u64,

    /// Reset period in seconds
    #[arg(long, default_value_t = 30)]
    reset_secs: u64,

    /// Seconds between background messages on healthy nodes
    #[arg(long, default_value_t = 2)]
    chatter_secs: u64,

    /// Node indices that go silent
    #[arg(long, value_delimiter = ',', default_value = "0")]
    silence: Vec<usize>,

    /// Seconds before silenced nodes stop receiving
    #[arg(long, default_value_t = 10)]
    silence_after: u64,

    /// Total run time in seconds
    #[arg(short, long, default_value_t = 90)]
    duration: u64,
}

/// Simulated session: delivers messages into the fleet unless silent
struct SimNode {
    id: NodeId,
    peer: String,
    logged_in: AtomicBool,
    silent: AtomicBool,
    inbox: mpsc::UnboundedSender<InboundMessage>,
}

impl SimNode {
    fn deliver(&self, text: &str) {
        if self.silent.load(Ordering::Relaxed) || !self.logged_in.load(Ordering::Relaxed) {
            return;
        }
        let _ = self.inbox.send(InboundMessage::text(self.id.clone(), text));
    }
}

#[async_trait]
impl NodeTransport for SimNode {
    fn id(&self) -> &NodeId {
        &self.id
    }

    fn connection_state(&self) -> ConnectionState {
        ConnectionState::from_logged_in(self.logged_in.load(Ordering::Relaxed))
    }

    async fn send_text(&self, to: &str, text: &str) -> hafleet::Result<()> {
        if !self.logged_in.load(Ordering::Relaxed) {
            return Err(HaError::transport(&self.id, "not logged in"));
        }
        if to == self.peer && text == "ding" {
            // peer replies through the node under test
            self.deliver("dong");
        }
        Ok(())
    }

    async fn say(&self, text: &str) -> hafleet::Result<()> {
        info!(node = %self.id, text, "say");
        Ok(())
    }

    async fn reset(&self, reason: &str) -> hafleet::Result<()> {
        warn!(node = %self.id, reason, "Session reset, traffic restored");
        self.silent.store(false, Ordering::Relaxed);
        Ok(())
    }

    async fn logout(&self) -> hafleet::Result<()> {
        self.logged_in.store(false, Ordering::Relaxed);
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("hafleet=info".parse()?))
        .init();

    let args = Args::parse();
    if args.clusters == 0 {
        anyhow::bail!("--clusters must be at least 1");
    }

    let config = HaConfig::default()
        .with_probe(Interval::around_secs(args.probe_secs))
        .with_reset(Interval::around_secs(args.reset_secs));
    let peer = config.health_check_peer.clone();

    let ha: Arc<FailoverCoordinator> = Arc::new(FailoverCoordinator::new(config)?);
    let (inbox_tx, mut inbox_rx) = mpsc::unbounded_channel::<InboundMessage>();

    let mut sims = Vec::with_capacity(args.nodes);
    for i in 0..args.nodes {
        let sim = Arc::new(SimNode {
            id: NodeId::from(format!("bot-{}", i)),
            peer: peer.clone(),
            logged_in: AtomicBool::new(true),
            silent: AtomicBool::new(false),
            inbox: inbox_tx.clone(),
        });
        ha.add_node(sim.clone(), format!("ha-{}", i % args.clusters))?;
        sims.push(sim);
    }

    ha.start()?;
    info!(fleet = %ha.name(), "Simulation started");

    // transport → fleet
    let ingest = {
        let ha = ha.clone();
        tokio::spawn(async move {
            while let Some(message) = inbox_rx.recv().await {
                ha.ingest_message(&message);
            }
        })
    };

    // observers
    let observer = {
        let mut events = ha.subscribe();
        tokio::spawn(async move {
            while let Ok(event) = events.recv().await {
                info!(at = %event.at, notification = ?event.notification, "Fleet event");
            }
        })
    };

    // background chatter
    let chatter = {
        let sims = sims.clone();
        let period = Duration::from_secs(args.chatter_secs.max(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                for sim in &sims {
                    sim.deliver("hello");
                }
            }
        })
    };

    // fail-silent injection
    {
        let sims = sims.clone();
        let silence = args.silence.clone();
        let after = Duration::from_secs(args.silence_after);
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            for i in silence {
                if let Some(sim) = sims.get(i) {
                    warn!(node = %sim.id, "Node going silent");
                    sim.silent.store(true, Ordering::Relaxed);
                }
            }
        });
    }

    tokio::time::sleep(Duration::from_secs(args.duration)).await;

    let live = ha.router().live().len();
    info!(live, "Broadcasting farewell");
    ha.say("simulation finished").await;

    for sim in &sims {
        ha.ingest(NodeEvent::Logout(sim.id.clone()));
    }
    ha.logout().await;
    ha.stop().await?;

    chatter.abort();
    ingest.abort();
    observer.abort();

    println!("{}", ha.health().to_json());
    println!("{}", ha.metrics().summary());
    Ok(())
}
