//! Contract - client for contexts, contract families and guardians
//!
//! Every command loads the client configuration, loads the context file for
//! `--prefix`, runs, and writes the context file back.

use anyhow::{anyhow, bail, Context as _};
use clap::{Parser, Subcommand};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use contract_guardian::client::HttpGuardianConnector;
use contract_guardian::config::ClientConfig;
use contract_guardian::context::{
    initialize_context, load_context_file, save_context_file, State, TemplateRegistry,
};
use contract_guardian::contract::commands;
use contract_guardian::contract::{
    export_bundle, import_bundle, CommandEnv, ContractPlatform, HttpPlatform, MemoryPlatform, ObjectType,
};

#[derive(Parser, Debug)]
#[command(name = "contract")]
#[command(about = "Create and drive contract objects described by contexts")]
struct Cli {
    /// Client configuration file
    #[arg(long, short = 'c', env = "CONTRACT_CONFIG", default_value = "contract.toml")]
    config: PathBuf,

    /// Context file holding the prefix
    #[arg(long, env = "CONTRACT_CONTEXT_FILE", default_value = "context.toml")]
    context_file: PathBuf,

    /// Context prefix, e.g. `token.t1`
    #[arg(long, short = 'p')]
    prefix: String,

    /// Run against an in-process platform instead of the gateway
    #[arg(long, default_value = "false")]
    dry_run: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Instantiate templates under the prefix
    Init {
        /// Templates to instantiate
        #[arg(long, short = 't', value_delimiter = ',', required = true)]
        templates: Vec<String>,

        #[arg(long, short = 'i')]
        identity: Option<String>,

        /// `key=value` overrides applied after initialization
        #[arg(long = "set", value_name = "KEY=VALUE")]
        overrides: Vec<String>,
    },

    /// Create an object and everything it depends on
    Create {
        /// Object type, e.g. `token_object`
        object: String,

        /// Context path below the prefix, defaults to the object's template key
        #[arg(long)]
        path: Option<String>,
    },

    /// Mint token objects until the issuer's count is reached
    Mint {
        #[arg(long, default_value = "token_object")]
        path: String,
    },

    /// Relay an echo capability through the token object's guardian
    Echo {
        /// Minted token context, e.g. `token_object.token_1`
        #[arg(long)]
        path: String,

        #[arg(long, short = 'm')]
        message: String,
    },

    /// Invoke a named operation on a created object
    Op {
        object: String,
        operation: String,

        #[arg(long)]
        path: Option<String>,

        /// `key=value` parameters; values are read as JSON, else as strings
        #[arg(long = "param", value_name = "KEY=VALUE")]
        parameters: Vec<String>,
    },

    /// Export contexts and their save files to a bundle
    Export {
        #[arg(long, value_delimiter = ',', required = true)]
        paths: Vec<String>,

        #[arg(long, short = 'o')]
        archive: PathBuf,
    },

    /// Import a bundle under the prefix
    Import {
        #[arg(long)]
        archive: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("contract_guardian={},contract={},warn", cli.log_level, cli.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let state = load_state(&cli.config)?;
    if let Err(e) = load_context_file(&state, &cli.context_file, &cli.prefix) {
        warn!(file = %cli.context_file.display(), error = %e, "No context loaded");
    }

    let result = run(&cli, &state).await;
    save_context_file(&state, &cli.context_file, &cli.prefix)
        .with_context(|| format!("unable to save {}", cli.context_file.display()))?;

    let output = result?;
    if !output.is_null() {
        println!("{}", serde_json::to_string_pretty(&output)?);
    }
    Ok(())
}

fn load_state(config: &Path) -> anyhow::Result<State> {
    if config.is_file() {
        return Ok(State::from_config_file(config)?);
    }
    info!(config = %config.display(), "No configuration file, using defaults");
    Ok(State::new(ClientConfig::default()))
}

async fn run(cli: &Cli, state: &State) -> anyhow::Result<Value> {
    let context = state.context(&cli.prefix);

    match &cli.command {
        Command::Init {
            templates,
            identity,
            overrides,
        } => {
            let registry = TemplateRegistry::builtin()?;
            let templates: Vec<&str> = templates.iter().map(String::as_str).collect();
            let mut values = overrides
                .iter()
                .map(|o| parse_override(o))
                .collect::<anyhow::Result<Vec<_>>>()?;
            if let Some(identity) = identity {
                values.push(("identity".to_string(), toml::Value::from(identity.as_str())));
            }
            initialize_context(state, None, &cli.prefix, &registry, &templates, values)?;
            Ok(Value::Null)
        }

        Command::Create { object, path } => {
            let object_type = object_type(object)?;
            let target = context.get_context(path.as_deref().unwrap_or(object_type.template_key()))?;
            let env = command_env(cli, state)?;
            let save_file = commands::ensure_created(&env, object_type, &target).await?;
            Ok(Value::String(save_file))
        }

        Command::Mint { path } => {
            let env = command_env(cli, state)?;
            let minted = commands::mint_tokens(&env, &context.get_context(path)?).await?;
            Ok(serde_json::to_value(minted)?)
        }

        Command::Echo { path, message } => {
            let env = command_env(cli, state)?;
            Ok(commands::echo(&env, &context.get_context(path)?, message).await?)
        }

        Command::Op {
            object,
            operation,
            path,
            parameters,
        } => {
            let object_type = object_type(object)?;
            let target = context.get_context(path.as_deref().unwrap_or(object_type.template_key()))?;
            let parameters = parameters
                .iter()
                .map(|p| parse_parameter(p))
                .collect::<anyhow::Result<Map<String, Value>>>()?;
            let env = command_env(cli, state)?;
            Ok(env.invoke(object_type, &target, operation, parameters).await?)
        }

        Command::Export { paths, archive } => {
            let paths: Vec<&str> = paths.iter().map(String::as_str).collect();
            export_bundle(state, &cli.prefix, &paths, archive)?;
            Ok(Value::Null)
        }

        Command::Import { archive } => {
            let imported_file = cli.context_file.with_extension("imported.toml");
            let table = import_bundle(state, archive, &imported_file)?;
            state.merge_at(context.segments(), toml::Value::Table(table))?;
            Ok(Value::Null)
        }
    }
}

fn command_env(cli: &Cli, state: &State) -> anyhow::Result<CommandEnv> {
    let config = state.config();
    let platform: Arc<dyn ContractPlatform> = if cli.dry_run {
        let platform = MemoryPlatform::new()?.with_cache_dir(state.contract_cache_dir());
        platform.simulate_token_contracts();
        Arc::new(platform)
    } else {
        let url = config
            .platform_url
            .as_deref()
            .ok_or_else(|| anyhow!("platform_url is not configured"))?;
        Arc::new(
            HttpPlatform::new(
                url,
                Duration::from_secs(config.request_timeout_secs),
                state.contract_cache_dir(),
            )?
            .with_source_dirs(source_dirs(state)?),
        )
    };

    let guardians = Arc::new(HttpGuardianConnector::new(Duration::from_secs(
        config.guardian_timeout_secs,
    )));
    Ok(CommandEnv::new(state.clone(), platform, guardians).with_checkpoint(&cli.context_file, &cli.prefix))
}

/// Directories searched for contract sources, `Contract.SourceSearchPath`
fn source_dirs(state: &State) -> anyhow::Result<Vec<PathBuf>> {
    Ok(state
        .get("Contract.SourceSearchPath")?
        .map(|value| value.try_into())
        .transpose()?
        .unwrap_or_else(|| vec![PathBuf::from(".")]))
}

fn object_type(name: &str) -> anyhow::Result<ObjectType> {
    ObjectType::parse(name).ok_or_else(|| {
        let known: Vec<&str> = ObjectType::ALL.iter().map(|t| t.template_key()).collect();
        anyhow!("unknown object type {}, expected one of {}", name, known.join(", "))
    })
}

fn split_assignment(text: &str) -> anyhow::Result<(&str, &str)> {
    match text.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key, value)),
        _ => bail!("expected KEY=VALUE, got {}", text),
    }
}

/// TOML scalar when the value parses as one, otherwise a plain string
fn parse_override(text: &str) -> anyhow::Result<(String, toml::Value)> {
    let (key, value) = split_assignment(text)?;
    let parsed = toml::from_str::<toml::Table>(&format!("v = {}", value))
        .ok()
        .and_then(|mut table| table.remove("v"))
        .unwrap_or_else(|| toml::Value::from(value));
    Ok((key.to_string(), parsed))
}

fn parse_parameter(text: &str) -> anyhow::Result<(String, Value)> {
    let (key, value) = split_assignment(text)?;
    let parsed = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), parsed))
}
