use actix_web::middleware::{Logger, NormalizePath};
use actix_web::{web, App, HttpServer};
use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use dotenv::dotenv;
use log::{info, warn};

use staffroll::admin::{self, AdminError, CollectionStatus};
use staffroll::config::{Config, StartupSchema};
use staffroll::handlers;
use staffroll::schema::registry;
use staffroll::services::{EmployeeService, UserService};
use staffroll::store::{self, DocumentStore, SharedStore, StoreError};
use staffroll::utils::jwt::JwtKeys;

#[derive(Parser)]
#[command(name = "staffroll", about = "Employee records API and schema administration")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API (default).
    Serve,
    /// Apply schema validation rules to collections.
    ApplySchema {
        #[arg(long, value_enum, default_value_t = Target::All)]
        collection: Target,
        /// Audit existing documents first and apply in warn mode.
        #[arg(long)]
        validate_existing: bool,
    },
    /// Show the validation rule of every collection.
    SchemaStatus,
    /// Insert probe documents to confirm validation behaviour.
    TestSchema {
        #[arg(long, value_enum, default_value_t = Probe::Employees)]
        collection: Probe,
    },
    /// Create the employee collection indexes.
    CreateIndexes,
}

#[derive(Clone, Copy, ValueEnum)]
enum Target {
    Employees,
    Users,
    All,
}

#[derive(Clone, Copy, ValueEnum)]
enum Probe {
    Employees,
    Users,
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = Config::from_env().context("invalid configuration")?;
    let store = store::connect(&config.database_url, config.max_connections)
        .await
        .context("failed to connect to the document store")?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config, store).await,
        Command::ApplySchema {
            collection,
            validate_existing,
        } => apply_schema(&store, collection, validate_existing).await,
        Command::SchemaStatus => schema_status(&store).await,
        Command::TestSchema { collection } => {
            let collection = match collection {
                Probe::Employees => registry::EMPLOYEES,
                Probe::Users => registry::USERS,
            };
            test_schema(&store, collection).await
        }
        Command::CreateIndexes => create_indexes(&store).await,
    }
}

async fn serve(config: Config, store: SharedStore) -> anyhow::Result<()> {
    match config.schema_on_startup {
        StartupSchema::Apply(mode) => admin::bootstrap(&store, mode)
            .await
            .context("failed to apply schema rules on startup")?,
        StartupSchema::Off => warn!("Schema validation on startup is disabled"),
    }

    let employees = web::Data::new(EmployeeService::new(store.clone()));
    let users = web::Data::new(UserService::new(store));
    let keys = web::Data::new(JwtKeys::new(&config.jwt_secret, config.token_ttl_days));

    info!("Starting server at {}", config.bind_addr);

    HttpServer::new(move || {
        App::new()
            .wrap(NormalizePath::trim())
            .wrap(Logger::default())
            .app_data(employees.clone())
            .app_data(users.clone())
            .app_data(keys.clone())
            .configure(handlers::configure)
    })
    .bind(&config.bind_addr)?
    .run()
    .await?;
    Ok(())
}

async fn apply_schema(
    store: &SharedStore,
    target: Target,
    validate_existing: bool,
) -> anyhow::Result<()> {
    let collections: Vec<&str> = match target {
        Target::Employees => vec![registry::EMPLOYEES],
        Target::Users => vec![registry::USERS],
        Target::All => registry::collections().to_vec(),
    };

    for collection in collections {
        match admin::apply_registry_rule(store.as_ref(), collection, validate_existing).await {
            Ok(outcome) => {
                if let Some(audit) = &outcome.audit {
                    println!(
                        "{}: {} documents, {} examined, {} potentially invalid",
                        audit.collection, audit.total, audit.examined, audit.suspect
                    );
                    if !audit.sample_ids.is_empty() {
                        println!("  sample ids: {}", audit.sample_ids.join(", "));
                    }
                }
                println!(
                    "Applied schema validation to {} (mode: {})",
                    outcome.collection, outcome.mode
                );
                if let Some(summary) = &outcome.summary {
                    println!("{}", summary);
                }
            }
            Err(AdminError::Store(StoreError::CollectionNotFound(name))) => {
                warn!("Collection {} does not exist, skipping", name);
                println!("Collection {} does not exist, skipping", name);
            }
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to apply schema to {}", collection))
            }
        }
    }
    Ok(())
}

async fn schema_status(store: &SharedStore) -> anyhow::Result<()> {
    let statuses = admin::validation_status(store.as_ref()).await?;
    if statuses.is_empty() {
        println!("No collections found");
    }
    for status in &statuses {
        println!("{}", status);
    }
    let enabled = statuses
        .iter()
        .filter(|s| matches!(s, CollectionStatus::Enabled(_)))
        .count();
    println!("{} of {} collections have schema validation", enabled, statuses.len());
    Ok(())
}

async fn test_schema(store: &SharedStore, collection: &str) -> anyhow::Result<()> {
    println!("Testing {} schema validation", collection);
    let outcomes = admin::run_probe(store.as_ref(), collection).await?;
    for outcome in &outcomes {
        println!("{}", outcome);
    }
    let failed = outcomes.iter().filter(|o| !o.passed()).count();
    if failed > 0 {
        anyhow::bail!("{} of {} probes did not behave as expected", failed, outcomes.len());
    }
    Ok(())
}

async fn create_indexes(store: &SharedStore) -> anyhow::Result<()> {
    admin::create_employee_indexes(store.as_ref()).await?;
    for index in store.list_indexes(registry::EMPLOYEES).await? {
        let kind = if index.unique { "unique" } else { "secondary" };
        println!("{} ({}) on {}", index.name(registry::EMPLOYEES), kind, index.field);
    }
    Ok(())
}
