use billing_integration::application::orchestrator::TransactionOrchestrator;
use billing_integration::domain::events::{IntegrationEvent, OrderId, Topic};
use billing_integration::domain::ports::MessageBus;
use billing_integration::infrastructure::in_memory_billing::InMemoryLedger;
use billing_integration::infrastructure::in_memory_bus::{BusConfig, InMemoryBus};
use billing_integration::interfaces::jsonl::event_reader::EventReader;
use clap::Parser;
use miette::{IntoDiagnostic, Result};
use serde::Serialize;
use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// JSON-lines file of integration events to replay
    input: PathBuf,

    /// Card number the billing side should decline (repeatable)
    #[arg(long = "decline-card")]
    decline_cards: Vec<String>,

    /// Deliveries per subscriber before an event is dead-lettered
    #[arg(long, default_value_t = 3)]
    max_delivery_attempts: u32,

    /// Pause between redeliveries, in milliseconds
    #[arg(long, default_value_t = 50)]
    redelivery_delay_ms: u64,
}

#[derive(Serialize)]
#[serde(tag = "type")]
enum Outcome {
    Reply {
        order_id: OrderId,
        valid: bool,
        errors: Vec<String>,
    },
    Published {
        event: IntegrationEvent,
    },
    DeadLetter {
        topic: Topic,
        order_id: OrderId,
        attempts: u32,
        error: String,
    },
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(io::stderr))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,billing_integration=info")),
        )
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let bus = Arc::new(InMemoryBus::new(BusConfig {
        max_delivery_attempts: cli.max_delivery_attempts,
        redelivery_delay: Duration::from_millis(cli.redelivery_delay_ms),
    }));
    let ledger = InMemoryLedger::with_declined_cards(cli.decline_cards);
    let orchestrator = TransactionOrchestrator::new(bus.clone(), ledger.factory());

    let bindings = orchestrator.start().into_diagnostic()?;
    let (stop, shutdown) = watch::channel(false);
    let serving = tokio::spawn(async move { orchestrator.serve(bindings, shutdown).await });

    let mut outcomes = Vec::new();
    let file = File::open(cli.input).into_diagnostic()?;
    for event in EventReader::new(file).events() {
        let event = match event {
            Ok(event) => event,
            Err(e) => {
                eprintln!("Error reading event: {}", e);
                continue;
            }
        };

        match event {
            IntegrationEvent::OrderInitiated(request) => {
                let order_id = request.order_id;
                match bus.request(request).await {
                    Ok(reply) => outcomes.push(Outcome::Reply {
                        order_id,
                        valid: reply.is_valid(),
                        errors: reply.validation_result.errors,
                    }),
                    Err(e) => eprintln!("Error handling request for order {}: {}", order_id, e),
                }
            }
            IntegrationEvent::OrderPaid(paid) => {
                eprintln!(
                    "Skipping OrderPaid for order {}: only the service publishes it",
                    paid.order_id
                );
            }
            other => {
                if let Err(e) = bus.publish(other).await {
                    eprintln!("Error publishing event: {}", e);
                }
            }
        }
    }

    bus.drain().await;
    stop.send(true).into_diagnostic()?;
    serving.await.into_diagnostic()?;

    // Input OrderPaid lines are never published, so every one here came from a capture.
    for event in bus.published().await {
        if matches!(event, IntegrationEvent::OrderPaid(_)) {
            outcomes.push(Outcome::Published { event });
        }
    }
    for dead_letter in bus.dead_letters().await {
        outcomes.push(Outcome::DeadLetter {
            topic: dead_letter.topic,
            order_id: dead_letter.event.order_id(),
            attempts: dead_letter.attempts,
            error: dead_letter.error,
        });
    }

    let stdout = io::stdout();
    let mut out = stdout.lock();
    for outcome in &outcomes {
        serde_json::to_writer(&mut out, outcome).into_diagnostic()?;
        writeln!(out).into_diagnostic()?;
    }

    Ok(())
}
