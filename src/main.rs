use std::{process, sync::Arc};

use serde::Serialize;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;
use vitrina::{
    cache::{
        CacheConfig, CacheInvalidationService, CacheManager, ChangeType, InvalidationPlan,
        InvalidationRequest, MemoryCacheStore,
    },
    config::{self, Command, PlanArgs, Settings, SyncTarget},
    error::AppError,
    infra::{error::InfraError, storage::FsObjectStore, telemetry},
    sync::{
        StandardAssetProcessor, SyncConfig, SyncError, SyncOptions, TemplateDevSynchronizer,
        is_safe_path,
    },
};

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(error.exit_code());
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;

    telemetry::init(&settings.logging)?;

    match cli_args.command {
        Command::Watch(args) => run_watch(settings, args.target, args.sync_all).await,
        Command::Sync(args) => run_sync(settings, args.target).await,
        Command::Plan(args) => run_plan(args),
    }
}

async fn run_watch(settings: Settings, target: SyncTarget, sync_all: bool) -> Result<(), AppError> {
    ensure_storage_outside(&settings, &target)?;
    let synchronizer = build_synchronizer(&settings)?;
    synchronizer.on_changes(|changes| {
        if let Some(latest) = changes.last() {
            info!(
                path = %latest.path,
                event = %latest.event,
                recent = changes.len(),
                "Template change mirrored"
            );
        }
    });

    synchronizer.start(sync_options(target)).await?;
    if sync_all {
        let files = synchronizer.sync_all().await?;
        info!(files, "Initial resync complete");
    }

    info!("Watching for template changes; press Ctrl-C to stop");
    let signal = tokio::signal::ctrl_c().await.map_err(InfraError::from);
    synchronizer.stop().await;
    signal?;
    Ok(())
}

async fn run_sync(settings: Settings, target: SyncTarget) -> Result<(), AppError> {
    ensure_storage_outside(&settings, &target)?;
    let synchronizer = build_synchronizer(&settings)?;
    synchronizer.start(sync_options(target)).await?;

    let result = synchronizer.sync_all().await;
    synchronizer.stop().await;

    let files = result?;
    let changes = synchronizer.recent_changes();
    info!(files, recent = changes.len(), "Template directory mirrored");
    Ok(())
}

#[derive(Serialize)]
struct PlanOutput<'a> {
    change_type: &'a str,
    store_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    entity_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<&'a str>,
    plan: InvalidationPlan,
}

fn run_plan(args: PlanArgs) -> Result<(), AppError> {
    let plan = match args.change_type.parse::<ChangeType>() {
        Ok(change) => {
            let request = InvalidationRequest::new(change, &args.store_id)
                .with_entity(args.entity_id.as_deref())
                .with_path(args.path.as_deref());
            InvalidationPlan::for_request(&request)
        }
        Err(err) => {
            warn!(change_type = %args.change_type, error = %err, "Ignoring unknown change type");
            InvalidationPlan::default()
        }
    };

    let output = PlanOutput {
        change_type: &args.change_type,
        store_id: &args.store_id,
        entity_id: args.entity_id.as_deref(),
        path: args.path.as_deref(),
        plan,
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn build_synchronizer(settings: &Settings) -> Result<TemplateDevSynchronizer, AppError> {
    let cache_config = CacheConfig::from(&settings.cache);
    let cache = Arc::new(CacheManager::new(
        &cache_config,
        Arc::new(MemoryCacheStore::new(&cache_config)),
    ));
    let invalidation = Arc::new(CacheInvalidationService::new(Arc::clone(&cache)));
    let storage = FsObjectStore::new(settings.storage.root.clone()).map_err(InfraError::from)?;

    Ok(TemplateDevSynchronizer::new(
        SyncConfig::from(&settings.sync),
        Arc::new(storage),
        cache,
        invalidation,
        Arc::new(StandardAssetProcessor::new()),
    ))
}

/// Objects written under the watched tree would be mirrored again.
fn ensure_storage_outside(settings: &Settings, target: &SyncTarget) -> Result<(), SyncError> {
    if is_safe_path(&settings.storage.root, &target.dir) {
        return Err(SyncError::configuration(format!(
            "storage root `{}` must not be inside the synchronized directory",
            settings.storage.root.display()
        )));
    }
    Ok(())
}

fn sync_options(target: SyncTarget) -> SyncOptions {
    SyncOptions {
        local_dir: target.dir,
        store_id: target.store_id,
        bucket_name: target.bucket,
        region: target.region,
    }
}
