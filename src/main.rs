use clap::{ArgAction, Parser};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use etl_coordinator::client::CoordinationClient;
use etl_coordinator::config::{parse_env_pair, CommandConfig, CoordinatorConfig, RendererConfig};
use etl_coordinator::coordinator::Coordinator;
use etl_coordinator::protocol::{catalogue, is_known_message};
use etl_coordinator::shutdown::install_shutdown_handler;

#[derive(Parser, Debug)]
#[command(name = "etl-coordinator")]
#[command(version)]
#[command(about = "Coordinates scheduled ETL jobs and reports")]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Start the coordination server
    Server(ServerArgs),

    /// Send one message to a running server and print the response
    Message(MessageArgs),
}

// =============================================================================
// Server Arguments
// =============================================================================

#[derive(Parser, Debug)]
struct ServerArgs {
    /// Port to listen on
    #[arg(long, env = "COORDINATOR_PORT", default_value = "9000")]
    port: u16,

    /// Folder holding the job definition documents
    #[arg(long, env = "COORDINATOR_JOBS_DIR", default_value = "jobs")]
    jobs_dir: PathBuf,

    /// Folder holding the report definition documents
    #[arg(long, env = "COORDINATOR_REPORTS_DIR", default_value = "reports")]
    reports_dir: PathBuf,

    /// Folder receiving one log file per run
    #[arg(long, env = "COORDINATOR_LOGS_DIR", default_value = "logs")]
    logs_dir: PathBuf,

    /// Program running ETL job scripts
    #[arg(long, default_value = "kitchen.sh")]
    script_runner: PathBuf,

    /// Leading argument for the script runner (repeatable)
    #[arg(long = "script-runner-arg", allow_hyphen_values = true)]
    script_runner_args: Vec<String>,

    /// Program rendering reports from their request URL
    #[arg(long, default_value = "wget")]
    render_command: PathBuf,

    /// Leading argument for the render command (repeatable)
    #[arg(long = "render-command-arg", allow_hyphen_values = true)]
    render_command_args: Vec<String>,

    /// User passed to the report renderer
    #[arg(long, env = "COORDINATOR_RENDERER_USER")]
    renderer_user: Option<String>,

    /// Password passed to the report renderer
    #[arg(long, env = "COORDINATOR_RENDERER_PASSWORD", hide_env_values = true)]
    renderer_password: Option<String>,

    /// Environment variable for job processes, as KEY=VALUE (repeatable)
    #[arg(long = "env", value_parser = parse_env_arg)]
    env: Vec<(String, String)>,
}

fn parse_env_arg(value: &str) -> Result<(String, String), String> {
    parse_env_pair(value).ok_or_else(|| format!("expected KEY=VALUE, got [{}]", value))
}

// =============================================================================
// Message Arguments
// =============================================================================

#[derive(Parser, Debug)]
#[command(disable_help_flag = true)]
struct MessageArgs {
    /// Server host
    #[arg(short = 'h', long, default_value = "localhost")]
    host: String,

    /// Server port
    #[arg(short = 'p', long, default_value = "9000")]
    port: u16,

    /// Message to send, e.g. "jobstartstatus:load_sales"
    #[arg(short = 'm', long)]
    message: String,

    /// Print help
    #[arg(long, action = ArgAction::Help)]
    help: Option<bool>,
}

// =============================================================================
// Commands
// =============================================================================

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}

async fn run_server(args: ServerArgs) -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let listen_addr: SocketAddr = format!("0.0.0.0:{}", args.port).parse()?;
    let config = CoordinatorConfig {
        listen_addr,
        jobs_dir: args.jobs_dir,
        reports_dir: args.reports_dir,
        logs_dir: args.logs_dir,
        script_runner: CommandConfig {
            program: args.script_runner,
            args: args.script_runner_args,
        },
        renderer: RendererConfig {
            command: CommandConfig {
                program: args.render_command,
                args: args.render_command_args,
            },
            user: args.renderer_user,
            password: args.renderer_password,
        },
        environment: args.env.into_iter().collect(),
    };

    tracing::info!(
        listen_addr = %config.listen_addr,
        jobs_dir = %config.jobs_dir.display(),
        reports_dir = %config.reports_dir.display(),
        logs_dir = %config.logs_dir.display(),
        env = ?config.environment.keys().collect::<Vec<_>>(),
        "Starting etl-coordinator"
    );

    let shutdown = install_shutdown_handler();
    Coordinator::new(config).run(shutdown).await?;
    Ok(())
}

async fn send_message(args: MessageArgs) -> Result<(), Box<dyn std::error::Error>> {
    if !is_known_message(&args.message) {
        eprintln!(
            "error: the message provided is invalid. possible messages are: [{}]",
            catalogue().join(", ")
        );
        std::process::exit(1);
    }

    let mut client = CoordinationClient::connect((args.host.as_str(), args.port)).await?;
    let response = client.send(&args.message).await?;
    println!("{}", response);
    client.close().await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    match args.command {
        Commands::Server(args) => run_server(args).await,
        Commands::Message(args) => send_message(args).await,
    }
}
