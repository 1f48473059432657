use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use marks::ai::HttpEnrichmentClient;
use marks::enrichment::{EnrichmentOutcome, enrichment_pool};
use marks::utils::{ensure_database_directory, parse_tags};
use marks::{
    Action, Bookmark, BookmarkDraft, BookmarkFilter, BookmarkId, BookmarkService, ConditionLogic,
    Config, Database, Enricher, Folder, FolderId, FolderStore, KeywordField, ListOptions, MatchMode,
    TagOptimizer, Trigger, WorkflowDraft, WorkflowEngine, WorkflowId,
};

/// How long `add` waits for queued enrichment before the process exits.
const ENRICHMENT_WAIT: Duration = Duration::from_secs(90);

/// marks - bookmark manager with workflow rules and tag optimization
#[derive(Parser)]
#[command(name = "marks")]
#[command(about = "A bookmark manager with workflow rules and tag optimization")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Available commands
#[derive(Subcommand)]
enum Commands {
    /// Save a bookmark, or update the one with the same URL
    Add(AddCommand),
    /// List bookmarks, newest first
    List(ListCommand),
    /// Delete a bookmark
    Delete {
        #[arg(value_name = "ID")]
        id: i64,
    },
    /// Enrich a bookmark's title, description and tags with AI now
    Enrich {
        #[arg(value_name = "ID")]
        id: i64,
    },
    /// Merge similar tags and promote frequently used ones
    Optimize(OptimizeCommand),
    /// Show tag statistics
    Stats,
    /// Manage workflow rules
    #[command(subcommand)]
    Workflow(WorkflowCommand),
    /// Manage folders
    #[command(subcommand)]
    Folder(FolderCommand),
}

#[derive(Args)]
struct AddCommand {
    #[arg(value_name = "URL")]
    url: String,

    #[arg(short = 'T', long)]
    title: Option<String>,

    #[arg(short, long)]
    description: Option<String>,

    #[arg(short, long)]
    notes: Option<String>,

    /// Comma-separated tags
    #[arg(short, long, value_name = "TAGS")]
    tags: Option<String>,

    #[arg(long)]
    unread: bool,

    #[arg(long)]
    shared: bool,
}

#[derive(Args)]
struct ListCommand {
    #[arg(short, long, default_value_t = marks::service::DEFAULT_LIST_LIMIT)]
    limit: usize,

    #[arg(long, default_value_t = 0)]
    offset: usize,

    /// Substring matched against title, description and URL
    #[arg(short, long)]
    query: Option<String>,

    #[arg(long)]
    unread: Option<bool>,

    #[arg(long)]
    shared: Option<bool>,

    /// Only bookmarks carrying this exact tag
    #[arg(short, long)]
    tag: Option<String>,

    /// Only bookmarks in this folder
    #[arg(long, value_name = "FOLDER_ID")]
    folder: Option<i64>,
}

#[derive(Args)]
struct OptimizeCommand {
    /// Write the changes; without this flag only a preview is printed
    #[arg(long)]
    apply: bool,

    #[arg(long)]
    no_merge: bool,

    #[arg(long)]
    no_promote: bool,
}

#[derive(Subcommand)]
enum WorkflowCommand {
    /// List workflows in priority order
    List,
    /// Create a workflow
    Add(WorkflowAddCommand),
    /// Enable or disable a workflow
    Toggle {
        #[arg(value_name = "ID")]
        id: i64,
    },
    /// Delete a workflow
    Delete {
        #[arg(value_name = "ID")]
        id: i64,
    },
    /// Run workflows against stored bookmarks
    Apply {
        /// Workflow ids; defaults to every enabled workflow
        #[arg(short, long = "workflow", value_name = "ID")]
        workflows: Vec<i64>,

        /// Bookmark ids; defaults to every bookmark
        #[arg(short, long = "bookmark", value_name = "ID")]
        bookmarks: Vec<i64>,
    },
}

#[derive(Args)]
struct WorkflowAddCommand {
    #[arg(value_name = "NAME")]
    name: String,

    #[arg(short, long)]
    description: Option<String>,

    /// URL contains this text
    #[arg(long = "url", value_name = "TEXT")]
    url_contains: Vec<String>,

    /// URL matches this regular expression
    #[arg(long, value_name = "PATTERN")]
    url_regex: Vec<String>,

    /// Title or description contains this text (case-insensitive)
    #[arg(long, value_name = "TEXT")]
    keyword: Vec<String>,

    /// Move matching bookmarks into this folder
    #[arg(long = "folder", value_name = "FOLDER_ID")]
    folders: Vec<i64>,

    /// Require every trigger to match instead of any
    #[arg(long)]
    match_all: bool,

    #[arg(long)]
    disabled: bool,

    /// Full workflow definition as JSON; replaces the other options
    #[arg(long, value_name = "JSON", conflicts_with_all = ["url_contains", "url_regex", "keyword", "folders"])]
    json: Option<String>,
}

#[derive(Subcommand)]
enum FolderCommand {
    /// List folders
    List,
    /// Create a folder
    Add {
        #[arg(value_name = "NAME")]
        name: String,
    },
    /// Show a folder and the bookmarks in it
    Show {
        #[arg(value_name = "ID")]
        id: i64,

        #[arg(short, long, default_value_t = marks::service::DEFAULT_LIST_LIMIT)]
        limit: usize,

        #[arg(long, default_value_t = 0)]
        offset: usize,
    },
    /// Rename a folder
    Rename {
        #[arg(value_name = "ID")]
        id: i64,

        #[arg(value_name = "NAME")]
        name: String,
    },
    /// Delete a folder; its bookmarks are kept
    Delete {
        #[arg(value_name = "ID")]
        id: i64,
    },
}

#[derive(Serialize)]
struct FolderContents {
    #[serde(flatten)]
    folder: Folder,
    total: usize,
    bookmarks: Vec<Bookmark>,
}

fn main() {
    init_tracing();
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        let exit_code = if is_user_error(&e) { 1 } else { 2 };
        eprintln!("Error: {e:#}");
        std::process::exit(exit_code);
    }
}

/// Logs go to stderr so stdout stays parseable JSON.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("marks=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Determines if an error is a user error (vs internal error).
///
/// User errors are validation failures and references to missing records.
/// Everything else, including database and network failures, is internal.
fn is_user_error(error: &anyhow::Error) -> bool {
    error
        .chain()
        .any(|cause| cause.downcast_ref::<marks::Error>().is_some_and(marks::Error::is_user_error))
}

fn run(cli: Cli) -> Result<()> {
    let config = Config::from_env();
    config.validate()?;

    let db_path = config.database_path()?;
    ensure_database_directory(&db_path)?;
    let db = Arc::new(Database::open(&db_path).context("Failed to open database")?);

    match cli.command {
        Commands::Add(cmd) => handle_add(cmd, &config, db),
        Commands::List(cmd) => handle_list(cmd, db),
        Commands::Delete { id } => {
            service(db).delete(BookmarkId::new(id))?;
            print_json(&serde_json::json!({ "deleted": id }))
        }
        Commands::Enrich { id } => handle_enrich(BookmarkId::new(id), &config, db),
        Commands::Optimize(cmd) => {
            let result = TagOptimizer::new(db).optimize(!cmd.apply, !cmd.no_merge, !cmd.no_promote)?;
            print_json(&result)
        }
        Commands::Stats => print_json(&TagOptimizer::new(db).stats()?),
        Commands::Workflow(cmd) => handle_workflow(cmd, db),
        Commands::Folder(cmd) => handle_folder(cmd, db),
    }
}

fn engine(db: Arc<Database>) -> WorkflowEngine {
    WorkflowEngine::new(db.clone(), db.clone(), db)
}

fn service(db: Arc<Database>) -> BookmarkService {
    BookmarkService::new(db.clone(), engine(db))
}

fn handle_add(cmd: AddCommand, config: &Config, db: Arc<Database>) -> Result<()> {
    let mut draft = BookmarkDraft::new(cmd.url)
        .title(cmd.title.unwrap_or_default())
        .description(cmd.description.unwrap_or_default())
        .notes(cmd.notes.unwrap_or_default())
        .unread(cmd.unread)
        .shared(cmd.shared);
    if let Some(tags) = cmd.tags {
        draft = draft.tags(parse_tags(&tags));
    }

    let mut bookmarks = service(db.clone());
    let mut pool = None;
    if config.enrichment_enabled() {
        match HttpEnrichmentClient::from_config(config) {
            Ok(client) => {
                let p = Arc::new(enrichment_pool(config, Enricher::new(db, Arc::new(client))));
                p.start();
                bookmarks = bookmarks.with_enrichment(p.clone(), true);
                pool = Some(p);
            }
            Err(e) => warn!(error = %e, "Enrichment unavailable"),
        }
    }

    let bookmark = bookmarks.create(draft)?;

    if let Some(pool) = pool {
        if !pool.wait_idle(ENRICHMENT_WAIT) {
            warn!("Enrichment still running at exit, result discarded");
        }
        pool.stop();
        let refreshed = bookmarks.get(bookmark.id)?;
        return print_json(&refreshed);
    }
    print_json(&bookmark)
}

fn handle_list(cmd: ListCommand, db: Arc<Database>) -> Result<()> {
    let options = ListOptions {
        limit: cmd.limit,
        offset: cmd.offset,
        filter: BookmarkFilter {
            query: cmd.query,
            unread: cmd.unread,
            shared: cmd.shared,
            tag: cmd.tag,
            folder: cmd.folder.map(FolderId::new),
        },
    };
    print_json(&service(db).list(&options)?)
}

fn handle_enrich(id: BookmarkId, config: &Config, db: Arc<Database>) -> Result<()> {
    let client = HttpEnrichmentClient::from_config(config)
        .map_err(marks::Error::from)
        .context("AI enrichment requires AI_ENABLED=true and AI_API_KEY")?;
    let enricher = Enricher::new(db, Arc::new(client));

    match enricher.enrich(id)? {
        EnrichmentOutcome::Updated(bookmark) => print_json(&bookmark),
        EnrichmentOutcome::Unchanged => print_json(&serde_json::json!({ "id": id, "changed": false })),
    }
}

fn handle_workflow(cmd: WorkflowCommand, db: Arc<Database>) -> Result<()> {
    let engine = engine(db);
    match cmd {
        WorkflowCommand::List => print_json(&engine.list()?),
        WorkflowCommand::Add(cmd) => {
            let draft = workflow_draft(cmd)?;
            print_json(&engine.create(&draft)?)
        }
        WorkflowCommand::Toggle { id } => print_json(&engine.toggle(WorkflowId::new(id))?),
        WorkflowCommand::Delete { id } => {
            engine.delete(WorkflowId::new(id))?;
            print_json(&serde_json::json!({ "deleted": id }))
        }
        WorkflowCommand::Apply {
            workflows,
            bookmarks,
        } => {
            let workflows: Vec<WorkflowId> = workflows.into_iter().map(WorkflowId::new).collect();
            let bookmarks: Vec<BookmarkId> = bookmarks.into_iter().map(BookmarkId::new).collect();
            print_json(&engine.apply_workflows_to_bookmarks(&workflows, &bookmarks)?)
        }
    }
}

fn workflow_draft(cmd: WorkflowAddCommand) -> Result<WorkflowDraft> {
    if let Some(json) = cmd.json {
        let mut draft: WorkflowDraft = serde_json::from_str(&json)
            .map_err(|e| marks::Error::validation(format!("invalid workflow JSON: {e}")))?;
        draft.name = cmd.name;
        return Ok(draft);
    }

    let mut draft = WorkflowDraft::new(cmd.name)
        .enabled(!cmd.disabled)
        .logic(if cmd.match_all {
            ConditionLogic::And
        } else {
            ConditionLogic::Or
        });
    draft.description = cmd.description.unwrap_or_default();

    for text in cmd.url_contains {
        draft = draft.trigger(Trigger::url(MatchMode::Contains, text));
    }
    for pattern in cmd.url_regex {
        draft = draft.trigger(Trigger::url(MatchMode::Regex, pattern));
    }
    for text in cmd.keyword {
        draft = draft.trigger(Trigger::keyword(KeywordField::Both, MatchMode::Contains, text));
    }
    for folder in cmd.folders {
        draft = draft.action(Action::MoveToFolder {
            folder_id: FolderId::new(folder),
        });
    }
    Ok(draft)
}

fn handle_folder(cmd: FolderCommand, db: Arc<Database>) -> Result<()> {
    match cmd {
        FolderCommand::List => print_json(&db.list_folders()?),
        FolderCommand::Add { name } => {
            if name.trim().is_empty() {
                return Err(marks::Error::validation("folder name cannot be empty").into());
            }
            print_json(&db.create_folder(name.trim())?)
        }
        FolderCommand::Show { id, limit, offset } => {
            let id = FolderId::new(id);
            let folder = db.get_folder(id)?.ok_or(marks::Error::NotFound {
                entity: "folder",
                id: id.get(),
            })?;
            let (bookmarks, total) = db.bookmarks_in_folder(id, limit, offset)?;
            print_json(&FolderContents {
                folder,
                total,
                bookmarks,
            })
        }
        FolderCommand::Rename { id, name } => {
            print_json(&db.rename_folder(FolderId::new(id), &name)?)
        }
        FolderCommand::Delete { id } => {
            db.delete_folder(FolderId::new(id))?;
            print_json(&serde_json::json!({ "deleted": id }))
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let out = serde_json::to_string_pretty(value).context("Failed to encode output")?;
    println!("{out}");
    Ok(())
}
