//! registrar: operator CLI for user provisioning and bulk table maintenance
//!
//! ## Commands
//! - `create-user`: provision a Cognito user and its profile item
//! - `delete-user`: remove a profile item and its Cognito user
//! - `load`: bulk put a JSON array of items into a table
//! - `purge`: scan a table and bulk delete every item
//! - `seed-users`: create Cognito users from a seed file, only into an empty pool
//! - `backfill`: write a profile for every Cognito user, only into an empty table
//! - `purge-users`: delete every Cognito user
//!
//! Only the stores a command touches are configured and connected; `load`
//! and `purge` need no user pool.
//!
//! ## Configuration
//! - `registrar.yaml`, `--config` or REGISTRAR_CONFIG for file-based settings
//! - REGISTRAR__SECTION__KEY environment overrides
//! - REGISTRAR_LOG for the log filter (default: info)
//!
//! Results are printed to stdout as JSON. The process exits non-zero when a
//! saga fails or a batch finishes with unprocessed items.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use tracing::info;

use registrar::batch::{BatchOutcome, BatchWriter};
use registrar::bulk::BulkProvisioner;
use registrar::config::{Config, ConfigError, StorageConfig};
use registrar::identity::{
    CognitoIdentityStore, IdentityStore, MemoryIdentityStore, PrincipalSpec,
};
use registrar::profile::{ProfileDraft, ProfileKey};
use registrar::saga::{ProfileSaga, SagaError};
use registrar::storage::{
    DocumentStore, DynamoDocumentStore, Item, KeySchema, MemoryDocumentStore,
};
use registrar::utils::bootstrap::init_tracing;

#[derive(Parser)]
#[command(name = "registrar")]
#[command(about = "Provision users and maintain profile tables")]
struct Cli {
    /// Configuration file (YAML)
    #[arg(long, global = true)]
    config: Option<String>,

    /// Run against in-memory stores instead of AWS
    #[arg(long, global = true)]
    dry_run: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a user and its profile
    CreateUser {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        phone_number: Option<String>,
        /// Profile attribute as key=value; repeatable
        #[arg(long = "attr", value_parser = parse_attribute)]
        attributes: Vec<(String, String)>,
    },
    /// Delete a user and its profile
    DeleteUser { principal_id: String },
    /// Bulk put items from a JSON array file
    Load {
        file: PathBuf,
        #[command(flatten)]
        target: TableArgs,
    },
    /// Delete every item of a table
    Purge {
        #[command(flatten)]
        target: TableArgs,
    },
    /// Create users from a JSON array of seed entries, without invitations
    SeedUsers { file: PathBuf },
    /// Write a profile for every user, filled from matching seed entries
    Backfill {
        /// Seed entries matched to users by email
        #[arg(long)]
        seed: Option<PathBuf>,
    },
    /// Delete every user in the pool
    PurgeUsers,
}

#[derive(clap::Args)]
struct TableArgs {
    /// Target table (default: the profile table)
    #[arg(long)]
    table: Option<String>,
    /// Partition key attribute of the target table
    #[arg(long)]
    partition_key: Option<String>,
    /// Sort key attribute of the target table
    #[arg(long)]
    sort_key: Option<String>,
}

impl TableArgs {
    fn resolve(&self, storage: &StorageConfig) -> (String, KeySchema) {
        let table = self
            .table
            .clone()
            .unwrap_or_else(|| storage.profile_table.clone());
        let schema = match &self.partition_key {
            Some(partition_key) => {
                let schema = KeySchema::new(partition_key.clone());
                match &self.sort_key {
                    Some(sort_key) => schema.with_sort_key(sort_key.clone()),
                    None => schema,
                }
            }
            None => storage.key_schema(),
        };
        (table, schema)
    }
}

fn parse_attribute(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(name, value)| (name.trim().to_string(), value.to_string()))
        .filter(|(name, _)| !name.is_empty())
        .ok_or_else(|| format!("expected key=value, got '{}'", raw))
}

async fn connect_identity(
    config: &Config,
    dry_run: bool,
) -> Result<Arc<dyn IdentityStore>, ConfigError> {
    if dry_run {
        info!("Dry run: using in-memory identity store");
        return Ok(Arc::new(MemoryIdentityStore::new()));
    }

    config.identity.validate()?;
    Ok(Arc::new(CognitoIdentityStore::new(&config.identity).await))
}

async fn connect_documents(
    config: &Config,
    dry_run: bool,
    tables: &[(String, KeySchema)],
) -> Arc<dyn DocumentStore> {
    if dry_run {
        info!("Dry run: using in-memory document store");
        let documents = MemoryDocumentStore::new();
        for (table, schema) in tables {
            documents.create_table(table.clone(), schema.clone()).await;
        }
        return Arc::new(documents);
    }

    Arc::new(DynamoDocumentStore::new(&config.storage).await)
}

fn print_json(value: &Value) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn saga_failure(error: &SagaError) -> Value {
    json!({
        "reason": error.reason(),
        "status": error.status_code(),
        "message": error.to_string(),
    })
}

fn exit_code(success: bool) -> ExitCode {
    if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn batch_exit(outcome: &BatchOutcome) -> Result<ExitCode, Box<dyn std::error::Error>> {
    print_json(&serde_json::to_value(outcome)?)?;
    Ok(exit_code(outcome.success))
}

async fn provisioner(
    config: &Config,
    dry_run: bool,
    profile_table: (String, KeySchema),
) -> Result<BulkProvisioner, ConfigError> {
    let identity = connect_identity(config, dry_run).await?;
    let documents = connect_documents(config, dry_run, &[profile_table]).await;
    BulkProvisioner::new(
        identity,
        documents,
        config.storage.clone(),
        &config.identity,
        config.batch.clone(),
    )
}

fn read_items(file: &Path) -> Result<Vec<Item>, Box<dyn std::error::Error>> {
    let raw = std::fs::read_to_string(file)?;
    let values: Vec<Value> = serde_json::from_str(&raw)?;

    let mut items = Vec::with_capacity(values.len());
    for (index, value) in values.into_iter().enumerate() {
        match value {
            Value::Object(item) => items.push(item),
            other => return Err(format!("entry {} is not an object: {}", index, other).into()),
        }
    }
    Ok(items)
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    init_tracing();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;
    config.validate_documents()?;

    let profile_table = (
        config.storage.profile_table.clone(),
        config.storage.key_schema(),
    );

    match cli.command {
        Command::CreateUser {
            username,
            email,
            phone_number,
            attributes,
        } => {
            let identity = connect_identity(&config, cli.dry_run).await?;
            let documents = connect_documents(&config, cli.dry_run, &[profile_table]).await;
            let saga = ProfileSaga::new(identity, documents, config.storage.clone());

            let mut spec = PrincipalSpec::new(username.clone())
                .with_delivery_mediums(config.identity.delivery_mediums.clone());
            let mut draft = ProfileDraft::new(username);
            if let Some(email) = email {
                spec = spec.with_attribute("email", email.clone());
                draft = draft.with_attribute("email", email);
            }
            if let Some(phone_number) = phone_number {
                spec = spec.with_attribute("phone_number", phone_number.clone());
                draft = draft.with_attribute("phoneNumber", phone_number);
            }
            for (name, value) in attributes {
                draft = draft.with_attribute(name, value);
            }

            match saga
                .create_with_compensation(&spec, |principal_id| draft.build(principal_id))
                .await
            {
                Ok(record) => {
                    print_json(&Value::Object(record.to_item(&config.storage)))?;
                    Ok(ExitCode::SUCCESS)
                }
                Err(e) => {
                    print_json(&saga_failure(&e))?;
                    Ok(ExitCode::FAILURE)
                }
            }
        }
        Command::DeleteUser { principal_id } => {
            let identity = connect_identity(&config, cli.dry_run).await?;
            let documents = connect_documents(&config, cli.dry_run, &[profile_table]).await;
            let saga = ProfileSaga::new(identity, documents, config.storage.clone());

            match saga.delete_with_restore(&ProfileKey::new(principal_id)).await {
                Ok(removed) => {
                    print_json(&Value::Object(removed))?;
                    Ok(ExitCode::SUCCESS)
                }
                Err(e) => {
                    print_json(&saga_failure(&e))?;
                    Ok(ExitCode::FAILURE)
                }
            }
        }
        Command::Load { file, target } => {
            let (table, schema) = target.resolve(&config.storage);
            let items = read_items(&file)?;
            let documents =
                connect_documents(&config, cli.dry_run, &[(table.clone(), schema)]).await;
            let writer = BatchWriter::new(documents, config.batch.clone())?;

            info!(table = %table, count = items.len(), "Loading items");
            let outcome = writer.batch_put(&table, items).await?;
            batch_exit(&outcome)
        }
        Command::Purge { target } => {
            let (table, schema) = target.resolve(&config.storage);
            let documents =
                connect_documents(&config, cli.dry_run, &[(table.clone(), schema.clone())]).await;

            let keys = documents
                .scan(&table)
                .await?
                .iter()
                .map(|item| schema.key_of(item))
                .collect::<Result<Vec<_>, _>>()?;

            info!(table = %table, count = keys.len(), "Purging items");
            let writer = BatchWriter::new(documents, config.batch.clone())?;
            let outcome = writer.batch_delete(&table, keys).await?;
            batch_exit(&outcome)
        }
        Command::SeedUsers { file } => {
            let entries = read_items(&file)?;
            let bulk = provisioner(&config, cli.dry_run, profile_table).await?;

            let outcome = bulk.seed_principals(&entries).await?;
            print_json(&serde_json::to_value(&outcome)?)?;
            Ok(exit_code(outcome.success()))
        }
        Command::Backfill { seed } => {
            let entries = match seed {
                Some(file) => read_items(&file)?,
                None => Vec::new(),
            };
            let bulk = provisioner(&config, cli.dry_run, profile_table).await?;

            let outcome = bulk.backfill_profiles(&entries).await?;
            print_json(&serde_json::to_value(&outcome)?)?;
            Ok(exit_code(outcome.success()))
        }
        Command::PurgeUsers => {
            let bulk = provisioner(&config, cli.dry_run, profile_table).await?;

            let outcome = bulk.purge_principals().await?;
            print_json(&serde_json::to_value(&outcome)?)?;
            Ok(exit_code(outcome.success()))
        }
    }
}
