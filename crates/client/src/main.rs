//! rangectl - manage blueprints, ranges and jobs on a rangeforge server.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use colored::Colorize;
use rangeforge_client::render;
use rangeforge_client::{ApiClient, ClientConfig, ClientError, JobTracker, TrackError};
use rangeforge_core::blueprint::CreateBlueprint;
use rangeforge_core::job::{DeployRequest, JobHandle, JobListQuery, JobLookup, JobStatus};
use rangeforge_core::types::{BlueprintId, JobId, RangeId};

#[derive(Parser)]
#[command(name = "rangectl")]
#[command(about = "Deploy and manage cyber ranges")]
#[command(version)]
struct Cli {
    /// API server URL (overrides RANGEFORGE_URL)
    #[arg(long, global = true)]
    url: Option<String>,

    /// Act as this user (overrides RANGEFORGE_USER)
    #[arg(long, global = true)]
    user: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage blueprints
    #[command(subcommand)]
    Blueprint(BlueprintCommand),
    /// Deploy, inspect and destroy ranges
    #[command(subcommand)]
    Range(RangeCommand),
    /// Inspect jobs
    #[command(subcommand)]
    Job(JobCommand),
}

#[derive(Subcommand)]
enum BlueprintCommand {
    /// Create a blueprint from a JSON file ("-" reads stdin)
    Create { file: PathBuf },
    /// List your blueprints
    List,
    /// Show one blueprint
    Get { id: BlueprintId },
    /// Delete a blueprint
    Delete { id: BlueprintId },
}

#[derive(Subcommand)]
enum RangeCommand {
    /// Deploy a range from a blueprint
    Deploy {
        /// Blueprint to deploy
        #[arg(short, long)]
        blueprint: BlueprintId,
        /// Range name, unique among your ranges
        #[arg(short, long)]
        name: String,
        /// Target region, e.g. us-east-1
        #[arg(short, long)]
        region: String,
        #[arg(short, long)]
        description: Option<String>,
        #[command(flatten)]
        wait: WaitArgs,
    },
    /// Destroy a range
    Destroy {
        id: RangeId,
        #[command(flatten)]
        wait: WaitArgs,
    },
    /// List your ranges
    List,
    /// Show one range and its hosts
    Get { id: RangeId },
}

#[derive(Subcommand)]
enum JobCommand {
    /// Show one job
    Get { id: JobId },
    /// List your jobs, newest first
    List {
        /// queued, in_progress, complete or failed
        #[arg(long)]
        status: Option<JobStatus>,
        #[arg(long)]
        limit: Option<i64>,
        #[arg(long)]
        offset: Option<i64>,
    },
    /// Wait for a job to finish
    Wait {
        id: JobId,
        /// Seconds to wait before giving up (the job keeps running)
        #[arg(long)]
        timeout: Option<u64>,
    },
}

#[derive(clap::Args)]
struct WaitArgs {
    /// Wait for the job to finish
    #[arg(short, long)]
    wait: bool,
    /// Seconds to wait before giving up (the job keeps running)
    #[arg(long, requires = "wait")]
    timeout: Option<u64>,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("{} {e:#}", "Error:".red().bold());
        if let Some(ClientError::Api { violations, .. }) = e.downcast_ref::<ClientError>() {
            for v in violations {
                eprintln!("  {} {}", v.path.bold(), v.message);
            }
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = ClientConfig::from_env()?.with_overrides(cli.url, cli.user);
    let client = ApiClient::new(&config);

    match cli.command {
        Commands::Blueprint(cmd) => blueprint(&client, cmd).await,
        Commands::Range(cmd) => range(&client, &config, cmd).await,
        Commands::Job(cmd) => job(client, &config, cmd).await,
    }
}

async fn blueprint(client: &ApiClient, cmd: BlueprintCommand) -> anyhow::Result<()> {
    match cmd {
        BlueprintCommand::Create { file } => {
            let raw = if file.as_os_str() == "-" {
                std::io::read_to_string(std::io::stdin()).context("Failed to read stdin")?
            } else {
                std::fs::read_to_string(&file)
                    .with_context(|| format!("Failed to read {}", file.display()))?
            };
            let input: CreateBlueprint =
                serde_json::from_str(&raw).context("Blueprint is not valid JSON")?;
            let created = client.create_blueprint(&input).await?;
            print!("{}", render::detail(&created));
        }
        BlueprintCommand::List => print!("{}", render::table(&client.list_blueprints().await?)),
        BlueprintCommand::Get { id } => print!("{}", render::detail(&client.get_blueprint(id).await?)),
        BlueprintCommand::Delete { id } => {
            client.delete_blueprint(id).await?;
            println!("Deleted blueprint {id}");
        }
    }
    Ok(())
}

async fn range(client: &ApiClient, config: &ClientConfig, cmd: RangeCommand) -> anyhow::Result<()> {
    match cmd {
        RangeCommand::Deploy {
            blueprint,
            name,
            region,
            description,
            wait,
        } => {
            let request = DeployRequest {
                blueprint_id: blueprint,
                name: name.clone(),
                region,
                description,
            };
            let handle = client.deploy(&request).await?;
            report_submitted(&handle, "Deploy");
            if wait.wait {
                let result = wait_for(client, config, handle.job_id, &format!("Deploying {name}"), wait.timeout).await?;
                match result.get("range_id").and_then(|v| v.as_str()) {
                    Some(range_id) => println!("Range {} is {}", range_id, render::status("ready")),
                    None => println!("Deploy complete"),
                }
            }
        }
        RangeCommand::Destroy { id, wait } => {
            let handle = client.destroy(id).await?;
            report_submitted(&handle, "Destroy");
            if wait.wait {
                wait_for(client, config, handle.job_id, &format!("Destroying {id}"), wait.timeout).await?;
                println!("Range {id} destroyed");
            }
        }
        RangeCommand::List => print!("{}", render::table(&client.list_ranges().await?)),
        RangeCommand::Get { id } => {
            let range = client.get_range(id).await?;
            print!("{}", render::detail(&range));
            for vpc in &range.vpcs {
                for subnet in &vpc.subnets {
                    println!("\n{} {} / {} ({})", "Subnet".bold(), vpc.name, subnet.name, subnet.cidr);
                    print!("{}", render::table(&subnet.hosts));
                }
            }
        }
    }
    Ok(())
}

async fn job(client: ApiClient, config: &ClientConfig, cmd: JobCommand) -> anyhow::Result<()> {
    match cmd {
        JobCommand::Get { id } => {
            let lookup = client.get_job(id).await?;
            print!("{}", render::detail(&lookup));
            if let JobLookup::NotFound(_) = lookup {
                anyhow::bail!("job {id} not found");
            }
        }
        JobCommand::List {
            status,
            limit,
            offset,
        } => {
            let query = JobListQuery {
                status,
                limit,
                offset,
            };
            print!("{}", render::table(&client.list_jobs(&query).await?));
        }
        JobCommand::Wait { id, timeout } => {
            let result = wait_for(&client, config, id, &format!("Waiting for {id}"), timeout).await?;
            println!("Job {id} {}: {result}", render::status("complete"));
        }
    }
    Ok(())
}

fn report_submitted(handle: &JobHandle, what: &str) {
    println!(
        "{what} job {} {}",
        handle.job_id,
        render::status(handle.status.as_str())
    );
}

async fn wait_for(
    client: &ApiClient,
    config: &ClientConfig,
    job_id: JobId,
    message: &str,
    timeout_secs: Option<u64>,
) -> anyhow::Result<serde_json::Value> {
    let timeout = timeout_secs.map_or(config.timeout, Duration::from_secs);
    let tracker = JobTracker::new(client, config.poll_interval);

    match tracker.track(job_id, message, timeout).await {
        Ok(result) => Ok(result),
        Err(TrackError::Timeout { .. }) => {
            anyhow::bail!(
                "timed out after {}s; job {job_id} is still running on the server \
                 (check with `rangectl job get {job_id}`)",
                timeout.as_secs()
            )
        }
        Err(e) => Err(e.into()),
    }
}
