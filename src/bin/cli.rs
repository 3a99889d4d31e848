//! confstore CLI
//!
//! Operator command-line interface. Opens the durable backend in the given
//! data directory, runs one command through the service facade and prints
//! the status and JSON body.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args as ClapArgs, Parser, Subcommand};
use serde_json::json;
use tracing_subscriber::{fmt, EnvFilter};

use confstore::config::WalSyncStrategy;
use confstore::model::{NewConfig, NewGroup, NewGroupMember};
use confstore::{Config, Context, DurableBackend, Request, Response, Service, StoreError};

/// confstore CLI
#[derive(Parser, Debug)]
#[command(name = "confstore")]
#[command(about = "Versioned configuration and config-group store")]
#[command(version)]
struct Args {
    /// Data directory
    #[arg(short, long, default_value = "./confstore_data")]
    data_dir: String,

    /// fsync the WAL after every write instead of every 100 entries
    #[arg(long)]
    sync_every_write: bool,

    /// WAL entries before the key table is snapshotted (0 disables)
    #[arg(long, default_value = "10000")]
    compaction_threshold: usize,

    /// Request timeout in milliseconds (0 = no deadline)
    #[arg(short, long, default_value = "0")]
    timeout_ms: u64,

    /// Seconds a completed idempotency record is replayed (0 = forever)
    #[arg(long, default_value = "86400")]
    idempotency_ttl_secs: u64,

    /// Seconds before an unfinished idempotency claim may be taken over
    #[arg(long, default_value = "30")]
    pending_timeout_secs: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Single versioned configs
    #[command(subcommand)]
    Config(ConfigCommand),

    /// Label-partitioned config groups
    #[command(subcommand)]
    Group(GroupCommand),

    /// Snapshot the key table and truncate the WAL
    Compact,

    /// Delete expired idempotency records
    PurgeIdempotency,
}

#[derive(ClapArgs, Debug)]
struct IdempotencyArg {
    /// Idempotency key; writes without one are rejected. Reuse the same key
    /// when retrying a command to replay its first result
    #[arg(short = 'k', long)]
    idempotency_key: Option<String>,
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Create a new config
    Create {
        #[arg(long)]
        key: String,
        #[arg(long)]
        value: String,
        #[arg(long)]
        version: String,
        #[command(flatten)]
        idempotency: IdempotencyArg,
    },

    /// Add a version to an existing config
    Version {
        id: String,
        #[arg(long)]
        key: String,
        #[arg(long)]
        value: String,
        #[arg(long)]
        version: String,
        #[command(flatten)]
        idempotency: IdempotencyArg,
    },

    /// Read one config version
    Get { id: String, version: String },

    /// Delete one config version
    Delete {
        id: String,
        version: String,
        #[command(flatten)]
        idempotency: IdempotencyArg,
    },

    /// List the versions stored under a config
    Versions { id: String },
}

#[derive(Subcommand, Debug)]
enum GroupCommand {
    /// Create a new group; members are a JSON array of {key, value, labels}
    Create {
        #[arg(long)]
        version: String,
        #[arg(long)]
        members: String,
        #[command(flatten)]
        idempotency: IdempotencyArg,
    },

    /// Add a version to an existing group
    Version {
        id: String,
        #[arg(long)]
        version: String,
        #[arg(long)]
        members: String,
        #[command(flatten)]
        idempotency: IdempotencyArg,
    },

    /// Read the members matching a label selector
    Get {
        id: String,
        version: String,
        /// Label as key=value (repeatable)
        #[arg(short, long = "label")]
        labels: Vec<String>,
    },

    /// Add one member ({key, value, labels} JSON) to a group version
    Add {
        id: String,
        version: String,
        #[arg(long)]
        member: String,
        #[command(flatten)]
        idempotency: IdempotencyArg,
    },

    /// Delete a whole group version
    Delete {
        id: String,
        version: String,
        #[command(flatten)]
        idempotency: IdempotencyArg,
    },

    /// List every member of a version with its labels and entry id
    Members { id: String, version: String },
}

fn main() -> ExitCode {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,confstore=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = backend_config(&args);

    // Open backend
    let backend = match DurableBackend::open(config.clone()) {
        Ok(b) => Arc::new(b),
        Err(e) => {
            tracing::error!("Failed to open backend: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let ctx = if args.timeout_ms > 0 {
        Context::with_timeout(Duration::from_millis(args.timeout_ms))
    } else {
        Context::background()
    };

    let service = Service::new(Arc::clone(&backend), &config);
    let response = run(&service, &backend, &ctx, args.command);

    // Release the service's handles so the backend can be closed
    drop(service);
    if let Ok(backend) = Arc::try_unwrap(backend) {
        if let Err(e) = backend.close() {
            tracing::error!("Failed to close backend: {}", e);
        }
    }

    print_response(&response);
    if response.status.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn backend_config(args: &Args) -> Config {
    let sync = if args.sync_every_write {
        WalSyncStrategy::EveryWrite
    } else {
        WalSyncStrategy::EveryNEntries { count: 100 }
    };
    Config::builder()
        .data_dir(&args.data_dir)
        .wal_sync_strategy(sync)
        .compaction_threshold(args.compaction_threshold)
        .idempotency_ttl(match args.idempotency_ttl_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        })
        .idempotency_pending_timeout(Duration::from_secs(args.pending_timeout_secs))
        .build()
}

fn run(
    service: &Service<DurableBackend>,
    backend: &DurableBackend,
    ctx: &Context,
    command: Commands,
) -> Response {
    let request = match command {
        Commands::Config(cmd) => match config_request(service, ctx, cmd) {
            Ok(request) => request,
            Err(response) => return response,
        },
        Commands::Group(cmd) => match group_request(service, ctx, cmd) {
            Ok(request) => request,
            Err(response) => return response,
        },
        Commands::Compact => {
            return match backend.compact() {
                Ok(meta) => Response::ok(json!({
                    "entries": meta.entry_count,
                    "last_lsn": meta.last_lsn,
                    "bytes": meta.file_size,
                })),
                Err(e) => Response::error(&StoreError::from(e)),
            };
        }
        Commands::PurgeIdempotency => {
            return match service.idempotency().purge_expired(ctx) {
                Ok(removed) => Response::ok(json!({ "removed": removed })),
                Err(e) => Response::error(&e),
            };
        }
    };

    service.handle(ctx, request)
}

/// Build a config request; `versions` is answered directly through `Err`
fn config_request(
    service: &Service<DurableBackend>,
    ctx: &Context,
    cmd: ConfigCommand,
) -> Result<Request, Response> {
    let request = match cmd {
        ConfigCommand::Create {
            key,
            value,
            version,
            idempotency,
        } => Request::CreateConfig {
            idempotency_key: idempotency.idempotency_key,
            config: NewConfig::new(key, value, version),
        },
        ConfigCommand::Version {
            id,
            key,
            value,
            version,
            idempotency,
        } => Request::CreateConfigVersion {
            idempotency_key: idempotency.idempotency_key,
            id,
            config: NewConfig::new(key, value, version),
        },
        ConfigCommand::Get { id, version } => Request::GetConfig { id, version },
        ConfigCommand::Delete {
            id,
            version,
            idempotency,
        } => Request::DeleteConfig {
            idempotency_key: idempotency.idempotency_key,
            id,
            version,
        },
        ConfigCommand::Versions { id } => {
            let id = parse_id(&id)?;
            return Err(match service.configs().list_versions(ctx, &id) {
                Ok(versions) => Response::ok(json!({ "id": id, "versions": versions })),
                Err(e) => Response::error(&e),
            });
        }
    };
    Ok(request)
}

fn group_request(
    service: &Service<DurableBackend>,
    ctx: &Context,
    cmd: GroupCommand,
) -> Result<Request, Response> {
    let request = match cmd {
        GroupCommand::Create {
            version,
            members,
            idempotency,
        } => Request::CreateGroup {
            idempotency_key: idempotency.idempotency_key,
            group: NewGroup::new(version, parse_json::<Vec<NewGroupMember>>(&members)?),
        },
        GroupCommand::Version {
            id,
            version,
            members,
            idempotency,
        } => Request::CreateGroupVersion {
            idempotency_key: idempotency.idempotency_key,
            id,
            group: NewGroup::new(version, parse_json::<Vec<NewGroupMember>>(&members)?),
        },
        GroupCommand::Get { id, version, labels } => Request::GetGroup {
            id,
            version,
            labels: labels
                .iter()
                .map(|label| parse_label(label))
                .collect::<Result<_, _>>()?,
        },
        GroupCommand::Add {
            id,
            version,
            member,
            idempotency,
        } => Request::AddConfigToGroup {
            idempotency_key: idempotency.idempotency_key,
            id,
            version,
            member: parse_json(&member)?,
        },
        GroupCommand::Delete {
            id,
            version,
            idempotency,
        } => Request::DeleteGroup {
            idempotency_key: idempotency.idempotency_key,
            id,
            version,
        },
        GroupCommand::Members { id, version } => {
            let id = parse_id(&id)?;
            return Err(match service.groups().members(ctx, &id, &version) {
                Ok(members) => match serde_json::to_value(members) {
                    Ok(body) => Response::ok(body),
                    Err(e) => Response::error(&StoreError::from(e)),
                },
                Err(e) => Response::error(&e),
            });
        }
    };
    Ok(request)
}

// =============================================================================
// Argument Parsing Helpers
// =============================================================================

fn bad_request(message: String) -> Response {
    Response::error(&StoreError::BadRequest(message))
}

fn parse_id(raw: &str) -> Result<uuid::Uuid, Response> {
    uuid::Uuid::parse_str(raw).map_err(|_| bad_request(format!("invalid id '{}'", raw)))
}

fn parse_json<T: serde::de::DeserializeOwned>(raw: &str) -> Result<T, Response> {
    serde_json::from_str(raw).map_err(|e| bad_request(format!("invalid JSON body: {}", e)))
}

fn parse_label(raw: &str) -> Result<(String, String), Response> {
    raw.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| bad_request(format!("label '{}' must be key=value", raw)))
}

fn print_response(response: &Response) {
    let body = serde_json::to_string_pretty(&response.body)
        .unwrap_or_else(|_| response.body.to_string());
    if response.status.is_success() {
        println!("{}", response.status.code());
        println!("{}", body);
    } else {
        eprintln!("{}", response.status.code());
        eprintln!("{}", body);
    }
}
