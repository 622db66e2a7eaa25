//! smcp CLI: prompt, resource, and tool registry with semantic search
//!
//! Commands: serve, add, get, list, update, rm, search, reindex, status

use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use rmcp::ServiceExt;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use smcp_core::{
    EntityKind, PromptCreate, PromptRole, PromptUpdate, ResourceCreate, ResourceUpdate, Settings,
    SmcpError, ToolCreate, ToolUpdate,
};
use smcp_mcp::SmcpMcpService;
use smcp_search::EntityService;

#[derive(Parser)]
#[command(name = "smcp")]
#[command(version)]
#[command(about = "Prompt, resource, and tool registry with semantic search for MCP clients")]
struct Cli {
    /// TOML settings file (MCP_* environment variables still apply on top)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the MCP server over stdio
    Serve,
    /// Create a prompt, resource, or tool
    #[command(subcommand)]
    Add(AddCommand),
    /// Print one entity
    Get { kind: EntityKind, id: String },
    /// Print every entity of one kind
    #[command(alias = "ls")]
    List { kind: EntityKind },
    /// Change fields of an existing entity
    #[command(subcommand)]
    Update(UpdateCommand),
    /// Delete an entity (idempotent)
    Rm { kind: EntityKind, id: String },
    /// Merged semantic and keyword search
    #[command(alias = "s")]
    Search {
        query: String,
        /// Restrict results to one kind
        #[arg(long)]
        target: Option<EntityKind>,
        /// Maximum results (default: top_k from settings)
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Rebuild the vector index from stored resources and tools
    Reindex,
    /// Entity counts and index health
    Status,
}

#[derive(Subcommand)]
enum AddCommand {
    Prompt {
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "user")]
        role: PromptRole,
        #[arg(long)]
        content: String,
        #[command(flatten)]
        tags: TagArgs,
    },
    Resource {
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long)]
        content: String,
        #[arg(long, default_value = "general")]
        category: String,
        #[command(flatten)]
        tags: TagArgs,
    },
    Tool {
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long)]
        code: String,
        #[command(flatten)]
        tags: TagArgs,
    },
}

#[derive(Subcommand)]
enum UpdateCommand {
    Prompt {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        role: Option<PromptRole>,
        #[arg(long)]
        content: Option<String>,
        #[arg(long, value_delimiter = ',')]
        tags: Option<Vec<String>>,
    },
    Resource {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        content: Option<String>,
        #[arg(long)]
        category: Option<String>,
        #[arg(long, value_delimiter = ',')]
        tags: Option<Vec<String>>,
    },
    Tool {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        code: Option<String>,
        #[arg(long, value_delimiter = ',')]
        tags: Option<Vec<String>>,
    },
}

#[derive(Args)]
struct TagArgs {
    /// Comma-separated tags
    #[arg(long, value_delimiter = ',')]
    tags: Vec<String>,
}

fn not_found(kind: EntityKind, id: &str) -> SmcpError {
    SmcpError::NotFound(format!("{kind} '{id}'"))
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Logs go to stderr so stdout stays clean for JSON output and the MCP stream.
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("smcp=info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let settings = Settings::load(cli.config.as_deref()).context("failed to load settings")?;
    let mut service = EntityService::open(&settings).context("failed to open entity service")?;

    match cli.command {
        Commands::Serve => serve(service).await?,
        Commands::Add(cmd) => add(&mut service, cmd)?,
        Commands::Get { kind, id } => {
            let item = service
                .get(kind, &id)?
                .ok_or_else(|| not_found(kind, &id))?;
            print_json(&item)?;
        }
        Commands::List { kind } => print_json(&service.list(kind)?)?,
        Commands::Update(cmd) => update(&mut service, cmd)?,
        Commands::Rm { kind, id } => {
            let deleted = service.delete(kind, &id)?;
            print_json(&serde_json::json!({ "type": kind, "id": id, "deleted": deleted }))?;
        }
        Commands::Search {
            query,
            target,
            limit,
        } => print_json(&service.search(&query, target, limit)?)?,
        Commands::Reindex => print_json(&service.reindex()?)?,
        Commands::Status => print_json(&service.status()?)?,
    }
    Ok(())
}

async fn serve(service: EntityService) -> anyhow::Result<()> {
    tracing::info!("starting MCP server on stdio");
    let server = SmcpMcpService::new(service)
        .serve(rmcp::transport::stdio())
        .await?;
    server.waiting().await?;
    tracing::info!("MCP server stopped");
    Ok(())
}

fn add(service: &mut EntityService, cmd: AddCommand) -> anyhow::Result<()> {
    match cmd {
        AddCommand::Prompt {
            name,
            role,
            content,
            tags,
        } => print_json(&service.create_prompt(PromptCreate {
            name,
            role,
            content,
            tags: tags.tags,
        })?),
        AddCommand::Resource {
            name,
            description,
            content,
            category,
            tags,
        } => print_json(&service.create_resource(ResourceCreate {
            name,
            description,
            content,
            category,
            tags: tags.tags,
        })?),
        AddCommand::Tool {
            name,
            description,
            code,
            tags,
        } => print_json(&service.create_tool(ToolCreate {
            name,
            description,
            code,
            tags: tags.tags,
        })?),
    }
}

fn update(service: &mut EntityService, cmd: UpdateCommand) -> anyhow::Result<()> {
    match cmd {
        UpdateCommand::Prompt {
            id,
            name,
            role,
            content,
            tags,
        } => {
            let changes = PromptUpdate {
                name,
                role,
                content,
                tags,
            };
            let prompt = service
                .update_prompt(&id, changes)?
                .ok_or_else(|| not_found(EntityKind::Prompt, &id))?;
            print_json(&prompt)
        }
        UpdateCommand::Resource {
            id,
            name,
            description,
            content,
            category,
            tags,
        } => {
            let changes = ResourceUpdate {
                name,
                description,
                content,
                category,
                tags,
            };
            let resource = service
                .update_resource(&id, changes)?
                .ok_or_else(|| not_found(EntityKind::Resource, &id))?;
            print_json(&resource)
        }
        UpdateCommand::Tool {
            id,
            name,
            description,
            code,
            tags,
        } => {
            let changes = ToolUpdate {
                name,
                description,
                code,
                tags,
            };
            let tool = service
                .update_tool(&id, changes)?
                .ok_or_else(|| not_found(EntityKind::Tool, &id))?;
            print_json(&tool)
        }
    }
}
