mod api;
mod config;
mod device;
mod error;
mod generation;
mod model;
mod sampling;
mod service;
mod tokenizer;

#[cfg(test)]
mod testing;

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::api::AppState;
use crate::config::Args;
use crate::service::ModelService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            "llm_web_chat=info,tower_http=debug".into()
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    println!("Loading model...");
    let service = ModelService::load(&args)?;
    println!("Model loaded successfully!");

    if let Some(prompt) = &args.prompt {
        run_single_prompt(&service, prompt)
    } else {
        run_server(service, &args).await
    }
}

fn run_single_prompt(service: &ModelService, prompt: &str) -> anyhow::Result<()> {
    println!("\nPrompt: {}", prompt);
    println!("{}", "─".repeat(60));
    println!("{}", service.reply(prompt)?);
    println!("{}", "─".repeat(60));
    Ok(())
}

async fn run_server(service: ModelService, args: &Args) -> anyhow::Result<()> {
    let state = Arc::new(AppState {
        service: Arc::new(service),
        redact_errors: args.redact_errors,
    });

    let app = api::create_router(state);
    let addr = SocketAddr::new(args.host.parse()?, args.port);

    println!(
        r#"
Serving {} on http://{}
   ├─ GET  /            - Home page
   ├─ GET  /about       - About page
   ├─ GET  /chat        - Chat page
   ├─ GET  /api/data    - Demo payload
   └─ POST /api/chat    - Generate a reply

Press Ctrl+C to stop the server.
"#,
        args.model, addr
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on {}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}
