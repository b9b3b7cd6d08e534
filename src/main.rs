//! CLI for mom
//!
//! Subcommands:
//! - `broker`: run the broker
//! - `produce`: publish one message and wait for the broker's ack
//! - `consume`: subscribe and print every received message

use std::sync::{Arc, Mutex};

use clap::Parser;
use mom::broker::{Broker, Properties};
use mom::client::{Consumer, Producer};
use mom::config::load_config;
use mom::transport::start_server;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "mom")]
enum Command {
    /// Run the broker until interrupted
    Broker,
    /// Publish a single message
    Produce {
        #[arg(long)]
        topic: String,
        #[arg(long)]
        payload: String,
        /// Message property as key=value; may be repeated
        #[arg(long = "property")]
        properties: Vec<String>,
    },
    /// Subscribe and print messages until interrupted
    Consume {
        #[arg(long)]
        topic: String,
        /// Filter expression such as region=EU; empty matches everything
        #[arg(long, default_value = "")]
        filter: String,
    },
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    mom::utils::logging::init("info");

    let cmd = Command::parse();
    let result = match cmd {
        Command::Broker => run_broker().await,
        Command::Produce {
            topic,
            payload,
            properties,
        } => run_produce(topic, payload, properties).await,
        Command::Consume { topic, filter } => run_consume(topic, filter).await,
    };

    if let Err(e) = result {
        error!("{e}");
        std::process::exit(1);
    }
}

async fn run_broker() -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    let broker = Arc::new(Mutex::new(Broker::open(&config.broker)?));

    tokio::select! {
        res = start_server(broker, config) => {
            res?;
            error!("Broker server exited unexpectedly.");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received. Exiting gracefully.");
        }
    }
    Ok(())
}

async fn run_produce(
    topic: String,
    payload: String,
    properties: Vec<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    let mut props = Properties::new();
    for pair in &properties {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| format!("property '{pair}' is not key=value"))?;
        props.insert(key.to_string(), value.to_string());
    }

    let producer = Producer::connect(&config.client).await?;
    let result = producer.send(topic, payload, props).await;
    match result.msg_id {
        Some(id) => println!("{:?} (msgId {id})", result.status),
        None => println!("{:?}", result.status),
    }
    Ok(())
}

async fn run_consume(topic: String, filter: String) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    let _consumer = Consumer::subscribe(&config.client, &topic, &filter, |record: mom::broker::Record| {
        let id = record.msg_id.map(|id| id.to_string()).unwrap_or_default();
        println!("#{id} {}", String::from_utf8_lossy(&record.body));
    })
    .await?;

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received. Exiting gracefully.");
    Ok(())
}
