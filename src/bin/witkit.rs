use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::json;

use witkit::config::{Config, ConnectionArgs};
use witkit::logging::{init_logging, parse_early_log_config};
use witkit::query::member;
use witkit::relations::RelationLink;
use witkit::utils::parse_since_date;
use witkit::{DynWorkItem, Relationship, WorkItem, WorkItemService};

/// Read and query Azure DevOps work items
#[derive(Parser, Debug)]
#[command(name = "witkit", version, about)]
struct Cli {
    #[command(flatten)]
    connection: ConnectionArgs,

    /// Create a sample configuration file and exit
    #[arg(long)]
    create_config: bool,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text, global = true, help_heading = "Output Options")]
    output: OutputFormat,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, help_heading = "Logging")]
    log_level: Option<String>,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true, help_heading = "Logging")]
    log_file: Option<String>,

    /// Log format (text, json)
    #[arg(long, global = true, help_heading = "Logging")]
    log_format: Option<String>,

    /// Shorthand for --log-level debug
    #[arg(short, long, global = true, help_heading = "Logging")]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show work items by id
    Get {
        #[arg(required = true)]
        ids: Vec<i32>,
    },
    /// Find work items with simple filters
    Query {
        /// Work item type, e.g. "Bug" or "User Story"
        #[arg(long = "type")]
        work_item_type: Option<String>,
        #[arg(long)]
        state: Option<String>,
        #[arg(long)]
        title_contains: Option<String>,
        /// Changed since a date ("2025-07-01") or a relative span ("2w", "3d", "1mo")
        #[arg(long)]
        changed_since: Option<String>,
        /// Order by this property, e.g. "priority" or "changed_date"
        #[arg(long)]
        order_by: Option<String>,
        #[arg(long)]
        descending: bool,
        #[arg(long)]
        top: Option<usize>,
        /// Print the composed WIQL instead of running it
        #[arg(long)]
        show_wiql: bool,
    },
    /// Run a raw WIQL query
    Wiql {
        query: String,
        #[arg(long)]
        top: Option<i32>,
    },
    /// Show the children of a work item
    Children { id: i32 },
    /// Show the relation links of a work item
    Links {
        id: i32,
        #[arg(long, value_enum, default_value_t = RelationshipArg::All)]
        relationship: RelationshipArg,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum RelationshipArg {
    All,
    Parent,
    Child,
    Related,
    Dependency,
    Duplicate,
    DuplicateOf,
    Hyperlink,
    ArtifactLink,
}

impl From<RelationshipArg> for Relationship {
    fn from(arg: RelationshipArg) -> Self {
        match arg {
            RelationshipArg::All => Relationship::All,
            RelationshipArg::Parent => Relationship::Parent,
            RelationshipArg::Child => Relationship::Child,
            RelationshipArg::Related => Relationship::Related,
            RelationshipArg::Dependency => Relationship::Dependency,
            RelationshipArg::Duplicate => Relationship::Duplicate,
            RelationshipArg::DuplicateOf => Relationship::DuplicateOf,
            RelationshipArg::Hyperlink => Relationship::Hyperlink,
            RelationshipArg::ArtifactLink => Relationship::ArtifactLink,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let raw_args: Vec<String> = std::env::args().collect();
    let _log_guard = init_logging(parse_early_log_config(&raw_args));

    let cli = Cli::parse();

    if cli.create_config {
        let path = Config::create_sample_config()?;
        println!("Sample config at: {}", path.display());
        return Ok(());
    }
    let Some(command) = cli.command else {
        bail!("no command given; run `witkit --help` for usage");
    };

    let settings = Config::load_from_file()?
        .merge(Config::load_from_env())
        .merge(Config::from_args(&cli.connection))
        .resolve()?;
    let service = WorkItemService::with_standard_types(settings.client()?);

    match command {
        Command::Get { ids } => {
            let items = service.get_many_dyn(&ids).await?;
            print_items(&items, cli.output)?;
        }
        Command::Query {
            work_item_type,
            state,
            title_contains,
            changed_since,
            order_by,
            descending,
            top,
            show_wiql,
        } => {
            let mut query = service.queryable::<WorkItem>();
            if let Some(work_item_type) = work_item_type {
                query = query.filter(member("work_item_type").equals(work_item_type));
            }
            if let Some(state) = state {
                query = query.filter(member("state").equals(state));
            }
            if let Some(text) = title_contains {
                query = query.filter(member("title").contains(text));
            }
            if let Some(since) = changed_since {
                let since = parse_since_date(&since)
                    .with_context(|| format!("Invalid --changed-since value '{since}'"))?;
                query = query.filter(member("changed_date").ge(since));
            }
            if let Some(property) = order_by {
                query = if descending {
                    query.order_by_descending(property)
                } else {
                    query.order_by(property)
                };
            }
            if let Some(top) = top {
                query = query.take(top);
            }

            if show_wiql {
                if let Some(plan) = query.plan()? {
                    println!("{}", plan.wiql);
                }
                return Ok(());
            }
            let items = query.to_list().await?;
            let items: Vec<Box<dyn DynWorkItem>> = items
                .into_iter()
                .map(|item| Box::new(item) as Box<dyn DynWorkItem>)
                .collect();
            print_items(&items, cli.output)?;
        }
        Command::Wiql { query, top } => {
            let items = service.query(&query, top).await?;
            print_items(&items, cli.output)?;
        }
        Command::Children { id } => {
            let items = service.get_children(id).await?;
            print_items(&items, cli.output)?;
        }
        Command::Links { id, relationship } => {
            let links = service
                .get_relationship_links(id, relationship.into(), None)
                .await?;
            print_links(&links, cli.output)?;
        }
    }

    Ok(())
}

fn print_items(items: &[Box<dyn DynWorkItem>], output: OutputFormat) -> Result<()> {
    match output {
        OutputFormat::Text => {
            if items.is_empty() {
                println!("No work items found.");
            }
            for item in items {
                let work_item = item.work_item();
                println!("{work_item} [{}]", work_item.state);
            }
        }
        OutputFormat::Json => {
            let snapshots: Vec<_> = items
                .iter()
                .filter_map(|item| item.work_item().snapshot())
                .collect();
            println!("{}", serde_json::to_string_pretty(&snapshots)?);
        }
    }
    Ok(())
}

fn print_links(links: &[RelationLink], output: OutputFormat) -> Result<()> {
    match output {
        OutputFormat::Text => {
            if links.is_empty() {
                println!("No links found.");
            }
            for link in links {
                println!("{link}");
            }
        }
        OutputFormat::Json => {
            let rows: Vec<_> = links
                .iter()
                .map(|link| {
                    json!({
                        "kind": link.kind.to_string(),
                        "rel": link.raw_type,
                        "id": link.related_id,
                        "url": link.url,
                        "attributes": link.attributes,
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
    }
    Ok(())
}
