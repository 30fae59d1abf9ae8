//! CLI entry point wiring the coordination engine to the command surface
//! (C8). Each invocation is a fresh process: persistence across
//! invocations relies on `--state-file`/`--audit-file` flags, mirroring the
//! snapshot-on-change / durable-audit story in spec §4.4/§4.6.

use std::time::Duration;

use clap::{Parser, Subcommand};
use serde_json::Value as JsonValue;

use sagaflow_broker::{topic_for, EventBus};
use sagaflow_core::{CorrelationId, CoordinatorConfig, FsyncPolicy, PartnerId, SagaId};
use sagaflow_events::EventType;
use sagaflow_store::ListFilters;

use sagaflow::{Commands, Runtime};

#[derive(Parser)]
#[command(name = "sagaflow")]
#[command(author, version, about = "Partner-onboarding saga coordinator", long_about = None)]
struct Cli {
    /// Path to the snapshot file sagas are persisted to and rehydrated from.
    #[arg(long, global = true)]
    state_file: Option<String>,

    /// Path to the durable audit trail file.
    #[arg(long, global = true)]
    audit_file: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start a new partner-onboarding saga.
    Start {
        /// JSON payload handed to the first step and carried as
        /// `initial_payload` for the saga's lifetime.
        #[arg(long)]
        payload: String,
        #[arg(long)]
        correlation_id: Option<String>,
        #[arg(long)]
        partner_id: Option<String>,
    },
    /// Print a saga's current state.
    Status { saga_id: String },
    /// Request manual compensation of an in-progress saga.
    Compensate {
        saga_id: String,
        #[arg(long, default_value = "operator requested")]
        reason: String,
    },
    /// Print a saga's audit timeline.
    Timeline { saga_id: String },
    /// List sagas matching filters.
    List {
        #[arg(long)]
        saga_type: Option<String>,
        #[arg(long)]
        partner_id: Option<String>,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Run a scripted end-to-end saga against the in-memory broker, acting
    /// as every external service so the full happy path is observable
    /// without a real transport plugged into `EventBus`.
    Demo,
}

fn main() -> anyhow::Result<()> {
    sagaflow_observability::init();

    let cli = Cli::parse();
    let mut config = CoordinatorConfig::default();
    config.state_snapshot_path = cli.state_file.clone();
    config.audit.file_path = cli.audit_file.clone();
    config.audit.fsync_policy = FsyncPolicy::Batched;

    let runtime = Runtime::start(config)?;
    let commands = Commands::new(&runtime.coordinator);

    match cli.command {
        Command::Start { payload, correlation_id, partner_id } => {
            let payload: JsonValue = serde_json::from_str(&payload)?;
            let correlation_id = correlation_id.map(CorrelationId::new);
            let partner_id = partner_id.map(|s| s.parse::<PartnerId>()).transpose()?;
            let saga_id = commands.start("partner-onboarding", payload, correlation_id, partner_id)?;
            println!("{saga_id}");
        }
        Command::Status { saga_id } => {
            let saga_id: SagaId = saga_id.parse()?;
            match commands.status(saga_id) {
                Some(instance) => println!("{}", serde_json::to_string_pretty(&instance)?),
                None => anyhow::bail!("no such saga: {saga_id}"),
            }
        }
        Command::Compensate { saga_id, reason } => {
            let saga_id: SagaId = saga_id.parse()?;
            commands.compensate(saga_id, reason)?;
            println!("compensation requested for {saga_id}");
        }
        Command::Timeline { saga_id } => {
            let saga_id: SagaId = saga_id.parse()?;
            match commands.timeline(saga_id) {
                Some(timeline) => println!("{}", serde_json::to_string_pretty(&timeline)?),
                None => anyhow::bail!("no such saga: {saga_id}"),
            }
        }
        Command::List { saga_type, partner_id, limit } => {
            let filters = ListFilters {
                saga_type,
                partner_id: partner_id.map(|s| s.parse::<PartnerId>()).transpose()?,
                limit,
                ..Default::default()
            };
            for instance in commands.list(&filters) {
                println!("{}  {}  {:?}", instance.saga_id, instance.saga_type, instance.status);
            }
        }
        Command::Demo => run_demo(&runtime, &commands)?,
    }

    Ok(())
}

/// Plays both sides of the wire: starts a saga, then answers each trigger
/// event with the success event the real partner-registration, contract,
/// document, campaign, and recruitment services would publish.
fn run_demo(runtime: &Runtime, commands: &Commands) -> anyhow::Result<()> {
    let payload = serde_json::json!({
        "legal_name": "Acme Logistics",
        "contact_email": "ops@acme.example",
    });

    let saga_id = commands.start("partner-onboarding", payload, None, Some(PartnerId::new()))?;
    println!("started saga {saga_id}");

    let responses = [
        EventType::PartnerRegistrationCompleted,
        EventType::ContractCreated,
        EventType::DocumentsVerified,
        EventType::CampaignsEnabled,
        EventType::RecruitmentSetupCompleted,
    ];

    for response in responses {
        wait_until_awaiting(commands, saga_id, Duration::from_secs(2));
        let correlation_id = commands
            .status(saga_id)
            .map(|s| s.correlation_id)
            .ok_or_else(|| anyhow::anyhow!("saga disappeared mid-demo"))?;
        let envelope = sagaflow_events::Envelope::initiating(
            response,
            saga_id,
            correlation_id,
            "demo-external-service",
            serde_json::json!({}),
            chrono::Utc::now(),
        );
        runtime.bus.publish(topic_for(response), envelope)?;
        std::thread::sleep(Duration::from_millis(50));
    }

    wait_until_terminal(commands, saga_id, Duration::from_secs(2));
    let timeline = commands.timeline(saga_id).expect("saga has a timeline once started");
    println!("{}", serde_json::to_string_pretty(&timeline)?);
    Ok(())
}

fn wait_until_awaiting(commands: &Commands, saga_id: SagaId, timeout: Duration) {
    let deadline = std::time::Instant::now() + timeout;
    while std::time::Instant::now() < deadline {
        if let Some(saga) = commands.status(saga_id) {
            if matches!(saga.status, sagaflow_store::SagaStatus::AwaitingStep(_)) {
                return;
            }
        }
        std::thread::sleep(Duration::from_millis(10));
    }
}

fn wait_until_terminal(commands: &Commands, saga_id: SagaId, timeout: Duration) {
    let deadline = std::time::Instant::now() + timeout;
    while std::time::Instant::now() < deadline {
        if let Some(saga) = commands.status(saga_id) {
            use sagaflow_store::SagaStatus::*;
            if matches!(saga.status, Completed | Failed | Compensated) {
                return;
            }
        }
        std::thread::sleep(Duration::from_millis(10));
    }
}
