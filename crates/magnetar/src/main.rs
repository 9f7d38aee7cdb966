use async_trait::async_trait;
use clap::{Parser, Subcommand};
use magnetar_core::{from_yaml, Node, Pod, PodRef};
use magnetar_framework::{
    BindingSink, Profile, Registry, RequeueSink, Scheduler, SchedulerConfig,
};
use magnetar_plugins::{default_profile, register_builtins};
use std::cmp::Ordering;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "magnetar", about = "Magnetar Scheduling Pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a snapshot of pods and nodes through the full pipeline and
    /// report the decisions without persisting anything
    DryRun {
        /// YAML file with a list of pods
        #[arg(long)]
        pods: PathBuf,
        /// YAML file with a list of nodes
        #[arg(long)]
        nodes: PathBuf,
        /// Scheduling profile YAML; the built-in default profile when omitted
        #[arg(long)]
        profile: Option<PathBuf>,
    },
    /// Print the built-in default scheduling profile as YAML
    Profile,
}

/// Records decisions in memory; the dry-run stand-in for the binding API
#[derive(Default)]
struct MemoryBindingSink {
    bound: Mutex<Vec<(PodRef, String)>>,
}

#[async_trait]
impl BindingSink for MemoryBindingSink {
    async fn bind(
        &self,
        pod: &Pod,
        node: &str,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.bound
            .lock()
            .await
            .push((PodRef::from_pod(pod), node.to_string()));
        Ok(())
    }
}

struct LogRequeueSink;

#[async_trait]
impl RequeueSink for LogRequeueSink {
    async fn requeue(&self, pod: &Pod, reason: &str) {
        warn!(pod = %PodRef::from_pod(pod), "pod returned for a fresh attempt: {}", reason);
    }
}

#[tokio::main]
async fn main() -> miette::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::DryRun {
            pods,
            nodes,
            profile,
        } => run_dry_run(&pods, &nodes, profile).await,
        Commands::Profile => {
            let yaml = magnetar_core::to_yaml(&default_profile())
                .map_err(|e| miette::miette!("Failed to render profile: {}", e))?;
            println!("{}", yaml);
            Ok(())
        }
    }
}

async fn run_dry_run(
    pods_path: &PathBuf,
    nodes_path: &PathBuf,
    profile_path: Option<PathBuf>,
) -> miette::Result<()> {
    let pods: Vec<Pod> = load_yaml(pods_path)?;
    let nodes: Vec<Node> = load_yaml(nodes_path)?;

    let profile: Profile = match &profile_path {
        Some(path) => load_yaml(path)?,
        None => default_profile(),
    };

    let sink = Arc::new(MemoryBindingSink::default());

    let mut registry = Registry::new();
    register_builtins(&mut registry, sink.clone())
        .map_err(|e| miette::miette!("Failed to register plugins: {}", e))?;
    let framework = registry
        .build(&profile)
        .map_err(|e| miette::miette!("Failed to build framework: {}", e))?;

    let scheduler = Scheduler::new(Arc::new(framework), SchedulerConfig::default())
        .with_requeue_sink(Arc::new(LogRequeueSink));

    // Only pods still awaiting placement, in queue order
    let mut pending: Vec<Pod> = pods
        .into_iter()
        .filter(|p| {
            p.spec
                .as_ref()
                .map(|s| s.node_name.is_none())
                .unwrap_or(true)
        })
        .collect();
    if let Some(queue_sort) = scheduler.framework().queue_sort() {
        pending.sort_by(|a, b| {
            if queue_sort.less(a, b) {
                Ordering::Less
            } else if queue_sort.less(b, a) {
                Ordering::Greater
            } else {
                Ordering::Equal
            }
        });
    }

    info!(
        pods = pending.len(),
        nodes = nodes.len(),
        "starting dry run"
    );

    let cancel = CancellationToken::new();
    let mut scheduled = 0usize;
    let mut unschedulable = 0usize;
    let mut failed = 0usize;

    for pod in &pending {
        let pod_ref = PodRef::from_pod(pod);
        match scheduler.schedule_one(pod, &nodes, &cancel).await {
            Ok(decision) => {
                scheduled += 1;
                info!(
                    pod = %pod_ref,
                    node = %decision.node,
                    score = decision.score,
                    "scheduled"
                );
            }
            Err(e) if e.is_unschedulable() => {
                unschedulable += 1;
                warn!(pod = %pod_ref, "unschedulable: {}", e);
            }
            Err(e) => {
                failed += 1;
                warn!(pod = %pod_ref, "scheduling failed: {}", e);
            }
        }
    }

    info!(scheduled, unschedulable, failed, "dry run complete");

    for (pod, node) in sink.bound.lock().await.iter() {
        println!("{} -> {}", pod, node);
    }

    Ok(())
}

fn load_yaml<T: for<'de> serde::Deserialize<'de>>(path: &PathBuf) -> miette::Result<T> {
    let data = std::fs::read_to_string(path)
        .map_err(|e| miette::miette!("Failed to read {}: {}", path.display(), e))?;
    from_yaml(&data).map_err(|e| miette::miette!("Failed to parse {}: {}", path.display(), e))
}
