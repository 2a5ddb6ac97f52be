use std::{process, sync::Arc};

use orderloom::{
    application::{
        audit::{AuditConfig, AuditLogWriter},
        error::AppError,
        repos::CollectionStore,
    },
    cache::InvalidationKeyResolver,
    config,
    domain::audit::AuditLogEntryInput,
    infra::{db::PostgresRepositories, error::InfraError, telemetry},
};
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
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
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match cli_args.command {
        config::Command::Resolve(args) => run_resolve(&args),
        config::Command::Audit(args) => run_audit(settings, args).await,
        config::Command::Migrate => run_migrate(settings).await,
    }
}

fn run_resolve(args: &config::ResolveArgs) -> Result<(), AppError> {
    let keys = InvalidationKeyResolver::new().resolve_named(&args.event)?;
    let rendered = serde_json::to_string_pretty(&keys)
        .map_err(|err| AppError::unexpected(format!("failed to render keys: {err}")))?;
    println!("{rendered}");
    Ok(())
}

async fn run_audit(settings: config::Settings, args: config::AuditArgs) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let store: Arc<dyn CollectionStore> = repositories;
    let writer = AuditLogWriter::new(store, AuditConfig::from(&settings.audit));

    match args.command {
        config::AuditCommand::Append(append) => {
            let entry = writer.append(append_input(append)).await?;
            info!(
                target = "orderloom::audit",
                entry_id = %entry.id,
                order_id = %entry.order_id,
                action = %entry.action,
                "Audit entry appended"
            );
            print_json(&entry)
        }
        config::AuditCommand::List(list) => {
            let entries = writer.list_for_order(list.order_id).await?;
            for entry in &entries {
                print_json(entry)?;
            }
            info!(
                target = "orderloom::audit",
                order_id = %list.order_id,
                count = entries.len(),
                "Audit entries listed"
            );
            Ok(())
        }
    }
}

fn append_input(args: config::AuditAppendArgs) -> AuditLogEntryInput {
    let mut input = AuditLogEntryInput::with_raw_action(args.order_id, args.action, args.entity_type);
    if let Some(summary) = args.summary {
        input = input.summary(summary);
    }
    if let Some(user_id) = args.user_id {
        input = input.by_user(user_id);
    }
    if let Some(entity_id) = args.entity_id {
        input = input.on_entity(entity_id);
    }
    if let Some(field) = args.field {
        input = input.field_change(field, args.old, args.new);
    } else {
        input.old_value = args.old;
        input.new_value = args.new;
    }
    input
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), AppError> {
    let line = serde_json::to_string(value)
        .map_err(|err| AppError::unexpected(format!("failed to render output: {err}")))?;
    println!("{line}");
    Ok(())
}

async fn run_migrate(settings: config::Settings) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    repositories
        .health_check()
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;
    info!(target = "orderloom::migrate", "Migrations applied");
    Ok(())
}

async fn init_repositories(
    settings: &config::Settings,
) -> Result<Arc<PostgresRepositories>, AppError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))
        .map_err(AppError::from)?;

    let pool = PostgresRepositories::connect(database_url, settings.database.max_connections.get())
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    Ok(Arc::new(PostgresRepositories::new(pool)))
}
