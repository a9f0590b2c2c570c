use anyhow::Result;
use clap::{error::ErrorKind, ArgAction, Args, Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod credentials;
mod error;
mod exit_codes;
mod output;
mod progress;
mod shape;
mod warehouse;

use commands::{Runtime, SetOptions};
use config::ConfigPaths;
use error::Error;
use output::{ErrorResponse, Output, OutputFormat};
use warehouse::{setup_ctrlc_handler, SnowflakeClient, TimeoutConfig, WarehouseError};

/// Version from Cargo.toml
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "snowctl")]
#[command(version = VERSION)]
#[command(about = "Snowflake companion CLI", long_about = None)]
#[command(subcommand_required = true, arg_required_else_help = true)]
struct Cli {
    /// Connection to use instead of the current one
    #[arg(short = 'c', long = "connection", global = true)]
    connection: Option<String>,

    /// Output format: json, yaml, csv, tsv
    #[arg(short = 'o', long = "output", global = true, default_value = "json")]
    output: String,

    /// Warehouse request timeout (e.g., "30s", "2m"). Default: 30s
    #[arg(long = "timeout", global = true, value_name = "DURATION")]
    timeout: Option<String>,

    /// Suppress progress and diagnostics on stderr
    #[arg(long, global = true)]
    quiet: bool,

    /// More diagnostics (-v info, -vv debug, -vvv trace)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage saved connection profiles
    #[command(visible_alias = "conn")]
    Connection {
        #[command(subcommand)]
        command: ConnectionCommands,
    },
    /// Execute SQL against the active connection
    Sql {
        /// Statement to run (read from stdin when omitted)
        #[arg(short = 'q', long = "query", visible_alias = "text")]
        query: Option<String>,
    },
    /// Report on the account behind the active connection
    Show {
        #[command(subcommand)]
        command: ShowCommands,
    },
}

#[derive(Subcommand)]
enum ShowCommands {
    /// User profile, logins, query activity and warehouse usage
    Account {
        /// User to summarize (default: the connection's user)
        #[arg(long)]
        user: Option<String>,
        /// Lookback window in days
        #[arg(long, value_name = "DAYS", default_value_t = commands::DEFAULT_WINDOW_DAYS)]
        window: i64,
    },
}

#[derive(Subcommand)]
enum ConnectionCommands {
    /// Create or update a connection
    Set(SetArgs),
    /// List saved connections
    #[command(visible_alias = "ls")]
    List,
    /// Switch the current connection
    #[command(visible_alias = "activate")]
    Use { name: String },
    /// Delete a saved connection
    #[command(visible_aliases = ["rm", "delete"])]
    Remove { name: String },
    /// Set the default connection
    SetDefault { name: String },
    /// Log in with a saved connection and report the server time
    Test {
        name: Option<String>,
        /// Make the connection current after a successful test
        #[arg(long)]
        set_current: bool,
    },
}

#[derive(Args)]
struct SetArgs {
    /// Connection name (prompted when omitted)
    name: Option<String>,
    /// Account locator (e.g., xy12345.us-east-1)
    #[arg(long)]
    account: Option<String>,
    /// Account URL (overrides the locator-derived host)
    #[arg(long)]
    account_url: Option<String>,
    #[arg(long)]
    user: Option<String>,
    /// Default role to assume
    #[arg(long)]
    role: Option<String>,
    #[arg(long)]
    warehouse: Option<String>,
    #[arg(long)]
    database: Option<String>,
    #[arg(long)]
    schema: Option<String>,
    #[arg(long)]
    description: Option<String>,
    /// password or pat
    #[arg(long, value_name = "METHOD")]
    auth_method: Option<String>,
    /// Switch to this connection after saving
    #[arg(long)]
    make_current: bool,
    /// Never prompt; every required value must come from flags or env
    #[arg(long)]
    no_prompt: bool,
    /// Save the secret in the config file (plain text)
    #[arg(long)]
    store_secret: bool,
    /// Save without logging in first
    #[arg(long)]
    skip_test: bool,
}

impl From<SetArgs> for SetOptions {
    fn from(args: SetArgs) -> Self {
        SetOptions {
            name: args.name,
            account: args.account,
            account_url: args.account_url,
            user: args.user,
            role: args.role,
            warehouse: args.warehouse,
            database: args.database,
            schema: args.schema,
            description: args.description,
            auth_method: args.auth_method,
            make_current: args.make_current,
            no_prompt: args.no_prompt,
            store_secret: args.store_secret,
            skip_test: args.skip_test,
        }
    }
}

/// Output format named on the command line, checked before clap has run so
/// usage errors can be reported in the same encoding.
fn requested_format(args: &[String]) -> String {
    let mut format = "json".to_string();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "-o" || arg == "--output" {
            if let Some(value) = iter.next() {
                format = value.clone();
            }
        } else if let Some(value) = arg.strip_prefix("--output=") {
            format = value.to_string();
        } else if let Some(value) = arg.strip_prefix("-o").filter(|v| !v.is_empty()) {
            format = value.trim_start_matches('=').to_string();
        }
    }
    format
}

fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with_writer(std::io::stderr)
        .init();
}

/// Parse CLI timeout option into a TimeoutConfig.
fn parse_timeout_config(cli: &Cli) -> Result<TimeoutConfig, Error> {
    let request_timeout = cli
        .timeout
        .as_deref()
        .map(warehouse::parse_duration)
        .transpose()
        .map_err(|e| Error::Validation(format!("invalid --timeout: {e:#}")))?;
    Ok(TimeoutConfig::new(request_timeout))
}

/// Suggested next step for well-known failures.
fn hint_for(err: &anyhow::Error) -> Option<String> {
    for cause in err.chain() {
        if let Some(e) = cause.downcast_ref::<Error>() {
            return match e {
                Error::NotFound(_) => {
                    Some("Run 'snowctl connection list' to see saved connections".to_string())
                }
                Error::UnsupportedFormat(_) => Some(format!(
                    "Supported formats: {}",
                    OutputFormat::SUPPORTED.join(", ")
                )),
                Error::Parse { .. } => Some(format!(
                    "Fix or remove the config file under {}",
                    ConfigPaths::discover()
                        .map(|p| p.dir().display().to_string())
                        .unwrap_or_else(|_| "~/.snowctl".to_string())
                )),
                _ => None,
            };
        }
        if let Some(WarehouseError::Login(_)) = cause.downcast_ref::<WarehouseError>() {
            return Some(
                "Check the user name and SNOWFLAKE_PASSWORD / SNOWFLAKE_PAT for this connection"
                    .to_string(),
            );
        }
    }
    None
}

fn report_error(err: &anyhow::Error, json: bool) {
    if json {
        ErrorResponse::new(format!("{err:#}"), hint_for(err)).print();
    } else {
        eprintln!("{} {err:#}", "Error:".red());
        if let Some(hint) = hint_for(err) {
            eprintln!("{} {}", "hint:".cyan(), hint);
        }
    }
}

#[tokio::main]
async fn main() {
    // Load .env file if present (before parsing CLI so env vars are available)
    let _ = dotenvy::dotenv();

    let args: Vec<String> = std::env::args().collect();
    let json_mode = matches!(requested_format(&args).parse::<OutputFormat>(), Ok(OutputFormat::Json));

    let cli = match Cli::try_parse_from(&args) {
        Ok(cli) => cli,
        Err(e) => match e.kind() {
            ErrorKind::DisplayHelp
            | ErrorKind::DisplayVersion
            | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => e.exit(),
            _ if json_mode => {
                ErrorResponse::new(e.to_string().trim_end(), None).print();
                std::process::exit(exit_codes::USAGE);
            }
            _ => e.exit(),
        },
    };

    init_tracing(cli.verbose);
    setup_ctrlc_handler();

    if let Err(e) = run(cli).await {
        report_error(&e, json_mode);
        std::process::exit(exit_codes::for_error(&e));
    }
}

async fn run(cli: Cli) -> Result<()> {
    let format: OutputFormat = cli.output.parse()?;
    let output = Output::new(format, cli.quiet, cli.verbose > 0);
    let timeouts = parse_timeout_config(&cli)?;
    let paths = ConfigPaths::discover()?;
    tracing::debug!(dir = %paths.dir().display(), "config directory");

    let rt = Runtime::new(paths, output, cli.connection, timeouts);

    match cli.command {
        Commands::Connection { command } => match command {
            ConnectionCommands::Set(args) => {
                let client = SnowflakeClient::new(&rt.timeouts)?;
                commands::connection_set(&rt, &client, args.into()).await?;
            }
            ConnectionCommands::List => commands::connection_list(&rt)?,
            ConnectionCommands::Use { name } => commands::connection_use(&rt, &name)?,
            ConnectionCommands::Remove { name } => commands::connection_remove(&rt, &name)?,
            ConnectionCommands::SetDefault { name } => {
                commands::connection_set_default(&rt, &name)?
            }
            ConnectionCommands::Test { name, set_current } => {
                let client = SnowflakeClient::new(&rt.timeouts)?;
                commands::connection_test(&rt, &client, name.as_deref(), set_current).await?;
            }
        },
        Commands::Sql { query } => {
            let client = SnowflakeClient::new(&rt.timeouts)?;
            commands::sql(&rt, &client, query.as_deref()).await?;
        }
        Commands::Show { command } => match command {
            ShowCommands::Account { user, window } => {
                let client = SnowflakeClient::new(&rt.timeouts)?;
                commands::show_account(&rt, &client, user.as_deref(), window).await?;
            }
        },
    }

    Ok(())
}
