use std::time::Duration;

use clap::{Parser, Subcommand};
use itouch::{Client, ClientConfig, ClientError, Payload};
use serde_json::{Map, Value};

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("--params must be a JSON object")]
    ParamsNotObject,
    #[error("failed to wait for Ctrl-C: {0}")]
    Signal(#[from] std::io::Error),
}

#[derive(Parser, Debug)]
#[command(name = "itouch-cli", about = "iTouch device server RPC client")]
struct Cli {
    #[arg(long, env = "ITOUCH_HOST", default_value = "127.0.0.1")]
    host: String,

    #[arg(long, env = "ITOUCH_PORT", default_value_t = 23188)]
    port: u16,

    /// Do not retry after the connection drops.
    #[arg(long)]
    no_reconnect: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Call one command and print its reply.
    Invoke {
        kind: String,
        #[arg(long)]
        params: Option<String>,
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// Print pushed events until the time is up or Ctrl-C.
    Listen {
        #[arg(required = true)]
        events: Vec<String>,
        #[arg(long)]
        seconds: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = ClientConfig {
        host: cli.host,
        port: cli.port,
        auto_reconnect: !cli.no_reconnect,
        ..ClientConfig::from_env()
    };
    let client = Client::new(config);

    let result = match cli.command {
        Command::Invoke {
            kind,
            params,
            timeout,
        } => run_invoke(&client, &kind, params.as_deref(), timeout).await,
        Command::Listen { events, seconds } => run_listen(&client, &events, seconds).await,
    };
    client.destroy();
    result
}

async fn run_invoke(
    client: &Client,
    kind: &str,
    params: Option<&str>,
    timeout: Option<u64>,
) -> Result<(), CliError> {
    let params = match params {
        Some(raw) => match serde_json::from_str::<Value>(raw)? {
            Value::Object(map) => map,
            _ => return Err(CliError::ParamsNotObject),
        },
        None => Map::new(),
    };
    let timeout = timeout.unwrap_or(client.config().default_timeout_secs);

    client.connect().await?;
    let reply = client.invoke_with_timeout(kind, &params, timeout).await?;
    println!("{}", render(&reply)?);
    Ok(())
}

async fn run_listen(
    client: &Client,
    events: &[String],
    seconds: Option<u64>,
) -> Result<(), CliError> {
    for event in events {
        let name = event.clone();
        client.subscribe(event, move |payload| match render(payload) {
            Ok(rendered) => println!("{name}: {rendered}"),
            Err(error) => eprintln!("{name}: {error}"),
        });
    }
    // Subscribe first: the server may push right after the handshake.
    client.connect().await?;

    match seconds {
        Some(seconds) => {
            tokio::select! {
                () = tokio::time::sleep(Duration::from_secs(seconds)) => {}
                signal = tokio::signal::ctrl_c() => signal?,
            }
        }
        None => tokio::signal::ctrl_c().await?,
    }
    Ok(())
}

fn render(payload: &Payload) -> Result<String, serde_json::Error> {
    match payload {
        Payload::Json(value) => serde_json::to_string_pretty(value),
        Payload::Binary(bytes) => Ok(format!("<{} bytes>", bytes.len())),
    }
}
