use std::{
    process,
    sync::{Arc, Mutex},
};

use sqlx::postgres::PgPoolOptions;
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;
use userstats::{
    application::{
        display::{DisplayRecord, SearchLinks, TemplateSink},
        error::AppError,
        listener::UserStatsListener,
        repos::UsersRepo,
        stats::{StatsError, UserStatsService},
    },
    cache::{CacheConfig, CacheInvalidator, TableNames},
    config,
    domain::{error::DomainError, users::SessionUser},
    events::{EventDispatcher, EventName, HostEvent, PageRender},
    infra::{cache::open_query_cache, db::PostgresRepositories, error::InfraError, telemetry},
};

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    let report = error.report();
    if dispatcher::has_been_set() {
        error!(error = %report.chain(), source = report.source, "application error");
        return;
    }

    let subscriber = tracing_fmt()
        .with_writer(std::io::stderr)
        .with_max_level(Level::ERROR)
        .finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %report.chain(), source = report.source, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match cli_args.command {
        config::Command::Show(args) => run_show(&settings, args.user_id).await,
        config::Command::Invalidate(args) => run_invalidate(&settings, args.event.into()).await,
        config::Command::Migrate(_) => run_migrate(&settings).await,
    }
}

async fn run_show(settings: &config::Settings, user_id: i64) -> Result<(), AppError> {
    let repositories = init_repositories(settings).await?;
    let dispatcher = build_dispatcher(repositories.clone(), settings)?;

    let record = repositories
        .find_user(user_id)
        .await
        .map_err(StatsError::from)?
        .ok_or_else(|| DomainError::not_found("user"))?;
    let user = SessionUser::from_record(
        record,
        settings.board.default_timezone,
        &settings.board.default_date_format,
    );

    let sink = Arc::new(CapturingSink::default());
    let event = HostEvent::IndexModifyPageTitle(PageRender {
        user: Arc::new(user),
        template: sink.clone(),
    });
    dispatcher.dispatch(&event).await?;

    match sink.take() {
        Some(record) => {
            let json = serde_json::to_string_pretty(&record)
                .map_err(|err| AppError::unexpected(format!("failed to encode record: {err}")))?;
            println!("{json}");
        }
        None => info!(user_id, "User is not a registered member; nothing to show"),
    }
    Ok(())
}

async fn run_invalidate(settings: &config::Settings, event: EventName) -> Result<(), AppError> {
    require_shared_cache(&settings.cache)?;
    let repositories = init_lazy_repositories(settings)?;
    let dispatcher = build_dispatcher(repositories, settings)?;

    let host_event = match event {
        EventName::SubmitPostEnd => HostEvent::SubmitPostEnd,
        EventName::DeleteTopicsAfterQuery => HostEvent::DeleteTopicsAfterQuery,
        EventName::IndexModifyPageTitle => {
            return Err(AppError::validation("render events cannot be fired from the CLI"));
        }
    };

    let handled = dispatcher.dispatch(&host_event).await?;
    info!(event = %event, handled, "Dispatched mutation event");
    Ok(())
}

async fn run_migrate(settings: &config::Settings) -> Result<(), AppError> {
    let repositories = init_repositories(settings).await?;
    PostgresRepositories::run_migrations(repositories.pool())
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;
    info!("Database migrations applied");
    Ok(())
}

// A memory cache lives and dies with this process, so evicting it from a
// one-shot command cannot affect any renderer.
fn require_shared_cache(cache: &config::CacheSettings) -> Result<(), AppError> {
    if cache.backend.is_process_shared() {
        return Ok(());
    }
    Err(AppError::validation(format!(
        "the `{}` cache backend is private to one process; use `file` to invalidate from the CLI",
        cache.backend
    )))
}

fn database_url(settings: &config::Settings) -> Result<&str, AppError> {
    settings
        .database
        .url
        .as_deref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))
        .map_err(AppError::from)
}

async fn init_repositories(
    settings: &config::Settings,
) -> Result<Arc<PostgresRepositories>, AppError> {
    let pool = PostgresRepositories::connect(
        database_url(settings)?,
        settings.database.max_connections.get(),
    )
    .await
    .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    Ok(Arc::new(PostgresRepositories::new(
        pool,
        TableNames::new(settings.database.table_prefix.clone()),
    )))
}

// Mutation events never query the database, so the pool only connects on demand.
fn init_lazy_repositories(
    settings: &config::Settings,
) -> Result<Arc<PostgresRepositories>, AppError> {
    let pool = PgPoolOptions::new()
        .max_connections(settings.database.max_connections.get())
        .connect_lazy(database_url(settings)?)
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    Ok(Arc::new(PostgresRepositories::new(
        pool,
        TableNames::new(settings.database.table_prefix.clone()),
    )))
}

fn build_dispatcher(
    repositories: Arc<PostgresRepositories>,
    settings: &config::Settings,
) -> Result<EventDispatcher, AppError> {
    let tables = repositories.tables().clone();
    let cache = open_query_cache(&CacheConfig::from(&settings.cache))?;

    let stats = UserStatsService::new(
        repositories.clone(),
        repositories,
        cache.clone(),
        tables.clone(),
        SearchLinks::new(
            settings.board.root_path.clone(),
            settings.board.php_ext.clone(),
        ),
    )
    .with_board_version(settings.board.version);
    let listener = Arc::new(UserStatsListener::new(
        stats,
        CacheInvalidator::new(cache, &tables),
    ));

    let mut dispatcher = EventDispatcher::new();
    listener.subscribe(&mut dispatcher);
    Ok(dispatcher)
}

/// Holds the record assigned during a render so it can be printed afterwards.
#[derive(Default)]
struct CapturingSink {
    record: Mutex<Option<DisplayRecord>>,
}

impl CapturingSink {
    fn take(&self) -> Option<DisplayRecord> {
        match self.record.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
    }
}

impl TemplateSink for CapturingSink {
    fn assign_vars(&self, vars: DisplayRecord) {
        match self.record.lock() {
            Ok(mut guard) => *guard = Some(vars),
            Err(poisoned) => *poisoned.into_inner() = Some(vars),
        }
    }
}
