use std::net::SocketAddr;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{fmt, EnvFilter};

use routine_assist::bridge::PresentationBridge;
use routine_assist::catalog::{CatalogSource, HttpCatalog, JsonFileCatalog};
use routine_assist::completion::RelayClient;
use routine_assist::relay::{self, RelayState};
use routine_assist::session::{ChatParams, ChatSession};
use routine_assist::settings::{ClientSettings, CompletionParams, RelaySettings};
use routine_assist::storage::{DurableStorage, SqliteStorage};
use routine_assist::terminal::{ChatCommand, HELP, TerminalBridge, parse_command};

#[derive(Debug, Parser)]
#[command(name = "routine_assist")]
#[command(about = "Product selection chat assistant and completion relay", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the completion relay.
    Relay {
        #[arg(long, default_value = "127.0.0.1:8787")]
        listen: String,
        /// Serve Prometheus metrics on this address.
        #[arg(long)]
        metrics_listen: Option<String>,
        #[arg(long, env = "RELAY_DEFAULT_MODEL")]
        default_model: Option<String>,
        #[arg(long, env = "RELAY_DEFAULT_MAX_TOKENS")]
        default_max_tokens: Option<u32>,
    },
    /// Start an interactive chat session.
    Chat {
        #[arg(long, env = "ROUTINE_RELAY_URL", default_value = "http://127.0.0.1:8787/")]
        relay_url: url::Url,
        /// Path or http(s) URL of the products document.
        #[arg(long, env = "ROUTINE_CATALOG", default_value = "data/products.json")]
        catalog: String,
        #[arg(long, env = "ROUTINE_DATABASE_URL")]
        database_url: Option<String>,
        /// Category filter to show on start.
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        model: Option<String>,
        #[arg(long)]
        max_tokens: Option<u32>,
        #[arg(long)]
        temperature: Option<f64>,
    },
}

fn catalog_source(location: &str) -> anyhow::Result<Arc<dyn CatalogSource>> {
    if location.starts_with("http://") || location.starts_with("https://") {
        Ok(Arc::new(HttpCatalog::new(url::Url::parse(location)?)))
    } else {
        Ok(Arc::new(JsonFileCatalog::new(location)))
    }
}

async fn run_chat<S: DurableStorage>(mut session: ChatSession<S>) -> anyhow::Result<()> {
    if let Err(e) = session.start().await {
        eprintln!("! catalog unavailable: {}", e);
    }
    println!("{}", HELP);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let result = match parse_command(&line) {
            ChatCommand::Quit => break,
            ChatCommand::Help => {
                println!("{}", HELP);
                Ok(())
            }
            ChatCommand::Invalid(msg) => {
                println!("! {}", msg);
                Ok(())
            }
            ChatCommand::Category(c) => session.select_category(&c).await,
            ChatCommand::Toggle(id) => session.toggle_product(id).await,
            ChatCommand::Remove(id) => session.remove_product(id).await,
            ChatCommand::Clear => session.request_clear().await.map(|_| ()),
            ChatCommand::Routine => {
                session.generate_routine().await;
                Ok(())
            }
            ChatCommand::Say(text) => {
                session.send_message(&text).await;
                Ok(())
            }
        };
        if let Err(e) = result {
            eprintln!("! catalog unavailable: {}", e);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Relay { listen, metrics_listen, default_model, default_max_tokens } => {
            let addr: SocketAddr = listen.parse()?;
            if let Some(m) = metrics_listen {
                let maddr: SocketAddr = m.parse()?;
                metrics_exporter_prometheus::PrometheusBuilder::new()
                    .with_http_listener(maddr)
                    .install()?;
            }
            let mut settings = RelaySettings::from_env();
            settings.defaults = CompletionParams {
                model: default_model,
                max_tokens: default_max_tokens,
                temperature: None,
            };
            relay::serve(addr, RelayState::new(settings)).await?;
        }
        Commands::Chat {
            relay_url,
            catalog,
            database_url,
            category,
            model,
            max_tokens,
            temperature,
        } => {
            let overrides = CompletionParams { model, max_tokens, temperature };
            let settings = ClientSettings::with_params(relay_url, &overrides);
            let storage = SqliteStorage::initialize(database_url).await?;
            let client = Arc::new(RelayClient::new(
                settings.relay_url.clone(),
                settings.params.model.clone(),
            ));
            let bridge: Arc<dyn PresentationBridge> = Arc::new(TerminalBridge::stdout());
            let params = ChatParams {
                max_tokens: settings.params.max_tokens,
                temperature: settings.params.temperature,
            };
            let session = ChatSession::new(storage, catalog_source(&catalog)?, client, bridge, params)
                .with_category(category);
            run_chat(session).await?;
        }
    }
    Ok(())
}
