use actix::prelude::*;
use actix_session::SessionMiddleware;
use actix_session::config::PersistentSession;
use actix_web::cookie::{Key, SameSite};
use actix_web::{App, HttpServer, web};
use anyhow::Context;
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

mod actors;
mod completion;
mod config;
mod errors;
mod generation;
mod logger;
mod quota;
mod routing;
mod session;
mod templates;
mod tools;

use actors::health::HealthActor;
use actors::registry::SessionRegistryActor;
use completion::{CompletionClient, OpenAiClient};
use config::{Config, SessionBackend};
use generation::{CopilotSession, GenerationSettings};
use tools::{TEMPLATES, Tool};

#[derive(Parser)]
#[command(name = "devops-copilot")]
#[command(about = "Generates DevOps code from natural-language prompts.", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
    /// Path to the YAML configuration file
    #[clap(long, global = true, default_value = "config.yaml")]
    config: PathBuf,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Runs the web server
    Serve,
    /// Generates code once and prints it
    Generate {
        #[clap(long, default_value = "terraform")]
        tool: String,
        /// Write the result to this file instead of stdout
        #[clap(long)]
        output: Option<PathBuf>,
        /// Prompt text; the tool's default prompt is used when omitted
        prompt: Option<String>,
    },
    /// Lists the available tools
    Tools,
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::from_file(&cli.config)?;

    match cli.command {
        Some(Commands::Serve) | None => run_server(config).await,
        Some(Commands::Generate { tool, output, prompt }) => {
            run_generate(&config, &tool, prompt, output.as_deref()).await
        }
        Some(Commands::Tools) => {
            list_tools();
            Ok(())
        }
    }
}

fn list_tools() {
    for template in TEMPLATES.iter() {
        println!("{:<16} {:<24} {}", template.id, template.label, template.download_filename());
    }
}

async fn run_generate(config: &Config, tool_id: &str, prompt: Option<String>, output: Option<&Path>) -> anyhow::Result<()> {
    logger::init_logger(config.log_level.as_deref().unwrap_or("warn"));

    let tool = Tool::from_id(tool_id).ok_or_else(|| errors::GenerateError::UnknownTool(tool_id.to_string()))?;
    let client = OpenAiClient::from_config(&config.completion)?;
    let settings = GenerationSettings::from_config(config);

    let mut session = CopilotSession::new(tool, settings.max_requests);
    if let Some(prompt) = prompt {
        session.set_prompt(prompt);
    }
    let code = session.generate(&client, &settings).await?;

    match output {
        Some(path) => {
            std::fs::write(path, &code).with_context(|| format!("Could not write {}", path.display()))?;
            println!("Wrote {} code to {}", tool, path.display());
        }
        None => println!("{}", code),
    }
    Ok(())
}

async fn run_server(config: Config) -> anyhow::Result<()> {
    logger::init_logger(config.log_level.as_deref().unwrap_or("info"));

    let client = OpenAiClient::from_config(&config.completion)?;
    if !client.has_api_key() {
        log::warn!(
            "No API key found. Set `{}` or `completion.api_key` in the config; generation will fail until then.",
            config.completion.api_key_env
        );
    }
    let client: Arc<dyn CompletionClient> = Arc::new(client);
    let settings = Arc::new(GenerationSettings::from_config(&config));
    let idle_timeout = Duration::from_secs(config.session.idle_timeout_secs);

    let health_actor_addr = HealthActor::new().start();
    let registry_addr =
        SessionRegistryActor::new(client, settings, Some(health_actor_addr.clone()), idle_timeout).start();

    let secret_key = match &config.session.secret_key {
        Some(secret) => Key::try_from(secret.as_bytes()).map_err(|e| {
            anyhow::anyhow!("Your session `secret_key` is not long enough. It needs to be at least 64 bytes long. Details: {}", e)
        })?,
        None => {
            log::warn!("Heads up! No session `secret_key` was configured. Sessions will not survive a restart.");
            Key::generate()
        }
    };
    let store = match config.session.backend {
        SessionBackend::Cookie => session::RuntimeSessionStore::new_cookie(),
        SessionBackend::Memory => session::RuntimeSessionStore::new_inmemory(),
    };

    let workers = config.workers.unwrap_or_else(num_cpus::get).max(1);
    log::debug!("Starting {} web workers", workers);

    let session_config = config.session.clone();
    let server = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(registry_addr.clone()))
            .app_data(web::Data::new(health_actor_addr.clone()))
            .configure(routing::configure)
            .wrap(
                SessionMiddleware::builder(store.clone(), secret_key.clone())
                    .cookie_name(session_config.cookie_name.clone())
                    .cookie_secure(session_config.cookie_secure)
                    .cookie_http_only(true)
                    .cookie_same_site(SameSite::Lax)
                    .session_lifecycle(PersistentSession::default().session_ttl(
                        actix_web::cookie::time::Duration::seconds(session_config.session_ttl_secs()),
                    ))
                    .build(),
            )
    })
    .workers(workers)
    .keep_alive(Duration::from_secs(30))
    .bind((config.host.as_str(), config.port))
    .map_err(|e| {
        if e.kind() == std::io::ErrorKind::AddrInUse {
            anyhow::anyhow!(
                "The port {} is already in use. Stop the other application or choose a different port.",
                config.port
            )
        } else {
            anyhow::Error::new(e)
        }
    })?;

    logger::print_banner(&config.host, config.port);

    server.run().await?;
    Ok(())
}
