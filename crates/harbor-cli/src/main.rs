use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use harbor_core::config::HarborConfig;
use harbor_core::domain::{InstallerMetadata, PublicPort};
use harbor_core::impls::{
    BroadcastPublisher, MemoryResources, MemoryRuntime, MemoryStore, StaticAppStore,
    StaticCapabilities,
};
use harbor_core::workflows::CreateAppRequest;
use harbor_core::PlatformBuilder;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Dev-mode runner: wires the in-memory collaborators, creates and starts a
/// demo app, prints the resulting tasks and status.
///
/// Usage: `harbor-cli [config.toml] [--serve]`
#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let serve = args.iter().any(|a| a == "--serve");
    let config = match args.iter().find(|a| !a.starts_with("--")) {
        Some(path) => HarborConfig::load(path)?,
        None => HarborConfig {
            dev_mode: true,
            ..HarborConfig::default()
        },
    };
    info!(instance = %config.instance.name, network = %config.instance.network, "starting");

    // (A) in-memory collaborators
    let runtime = Arc::new(MemoryRuntime::new());
    let app_store = Arc::new(
        StaticAppStore::new()
            .with_runtime(runtime.clone())
            .with_download_delay(Duration::from_millis(200)),
    );
    let notes = InstallerMetadata::new("registry.local/notes:1.2")
        .with_persistence()
        .with_public_port(PublicPort::tcp(8080))
        .with_capability("resource.dns");
    app_store.add_installer("notes", "1.2", notes).await;

    let platform = PlatformBuilder::new(config)
        .store(Arc::new(MemoryStore::new()))
        .publisher(Arc::new(BroadcastPublisher::default()))
        .runtime(runtime.clone())
        .capabilities(Arc::new(StaticCapabilities::builtin()))
        .app_store(app_store)
        .resources(Arc::new(MemoryResources::new()))
        .build()?;
    platform.restore().await?;
    let refresh = platform.spawn_refresh_loop();

    // (B) create + start through a task (image download runs as a child task)
    let req = CreateAppRequest::new("notes", "1.2", "notes").and_start();
    let task = platform.registry().create_async(req).await;
    info!(task = %task.id(), "create submitted");
    if let Err(e) = task.wait().await {
        info!(error = %e, "create failed");
    }

    // (C) what happened
    for view in platform.engine().get_last().await {
        println!("{}", serde_json::to_string(&view)?);
    }
    for app in platform.registry().copy_all().await? {
        println!("{}", serde_json::to_string(&app)?);
    }
    println!("{}", serde_json::to_string_pretty(&platform.status().await?)?);

    // (D) keep reconciling until Ctrl-C
    if serve {
        info!("serving; press Ctrl-C to stop");
        tokio::select! {
            signal = tokio::signal::ctrl_c() => signal?,
            failure = platform.engine().persistence_failure() => {
                refresh.shutdown_and_join().await;
                return Err(failure.into());
            }
        }
    }
    refresh.shutdown_and_join().await;
    Ok(())
}
