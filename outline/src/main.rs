use std::{
    fs,
    io::{self, Read},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use outline::core::{Document, NodeId, NumberedOutlineNode, Outline};
use outline::format::render_plain;
use outline::reconcile::Reconciliation;
use outline::settings::SyncSettings;
use outline::{
    document_from_json, document_to_json, extract_outline_with, parse_outline_text_with,
    reconcile_with_settings, serialize_outline_with,
};
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, prelude::*};

#[derive(Debug, Parser)]
#[command(
    name = "outline",
    about = "Keep a chapter outline and an editor document in sync",
    version
)]
struct Cli {
    /// Enable verbose logging for debugging.
    #[arg(long, global = true)]
    verbose: bool,
    /// JSON settings file (max level, heading ranks, placeholder titles).
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Parse numbered outline text (e.g. an AI reply) into outline JSON.
    Parse(ParseArgs),

    /// Print the numbered display view of an outline.
    Number(NumberArgs),

    /// Materialize an outline as a fresh editor document.
    Serialize(SerializeArgs),

    /// Rewrite a document to match an outline, keeping prose by heading id.
    Reconcile(ReconcileArgs),

    /// Derive the outline from an editor document's headings.
    Extract(ExtractArgs),

    /// Add a placeholder chapter, or a subchapter under --parent.
    Add(AddArgs),

    /// Rename an outline node.
    Rename(RenameArgs),

    /// Delete an outline node and its subtree.
    Delete(DeleteArgs),

    /// Check outline invariants, optionally repairing them.
    Validate(ValidateArgs),
}

#[derive(Debug, Args)]
struct ParseArgs {
    /// Text file to parse, or `-` for stdin.
    input: PathBuf,
    /// Print numbered titles instead of JSON.
    #[arg(long)]
    numbered: bool,
}

#[derive(Debug, Args)]
struct NumberArgs {
    /// Outline JSON file.
    outline: PathBuf,
    /// Emit JSON instead of an indented list.
    #[arg(long)]
    json: bool,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum DocumentFormat {
    Json,
    Plain,
}

#[derive(Debug, Args)]
struct SerializeArgs {
    /// Outline JSON file.
    outline: PathBuf,
    /// Write the document to this path instead of stdout.
    #[arg(long)]
    output: Option<PathBuf>,
    #[arg(long, value_enum, default_value_t = DocumentFormat::Json)]
    emit: DocumentFormat,
}

#[derive(Debug, Args)]
struct ReconcileArgs {
    /// Editor document JSON holding the current prose.
    #[arg(long)]
    document: PathBuf,
    /// Outline JSON the document should follow.
    #[arg(long)]
    outline: PathBuf,
    /// Write the document to this path instead of stdout.
    #[arg(long, conflicts_with = "in_place")]
    output: Option<PathBuf>,
    /// Overwrite the document file.
    #[arg(long)]
    in_place: bool,
    #[arg(long, value_enum, default_value_t = DocumentFormat::Json)]
    emit: DocumentFormat,
    /// Print the reconcile report as JSON on stderr.
    #[arg(long)]
    report: bool,
}

#[derive(Debug, Args)]
struct ExtractArgs {
    /// Editor document JSON.
    document: PathBuf,
    /// Write the id-stamped document to this path.
    #[arg(long)]
    stamped: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct AddArgs {
    /// Outline JSON file.
    outline: PathBuf,
    /// Parent node id; omit to add a top-level chapter.
    #[arg(long)]
    parent: Option<String>,
    /// Overwrite the outline file instead of printing to stdout.
    #[arg(long)]
    in_place: bool,
}

#[derive(Debug, Args)]
struct RenameArgs {
    /// Outline JSON file.
    outline: PathBuf,
    id: String,
    title: String,
    /// Overwrite the outline file instead of printing to stdout.
    #[arg(long)]
    in_place: bool,
}

#[derive(Debug, Args)]
struct DeleteArgs {
    /// Outline JSON file.
    outline: PathBuf,
    id: String,
    /// Overwrite the outline file instead of printing to stdout.
    #[arg(long)]
    in_place: bool,
}

#[derive(Debug, Args)]
struct ValidateArgs {
    /// Outline JSON file.
    outline: PathBuf,
    /// Write a repaired outline back to the file.
    #[arg(long)]
    fix: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let settings = match &cli.config {
        Some(path) => SyncSettings::load(path)?,
        None => SyncSettings::default(),
    };
    match cli.command {
        Commands::Parse(args) => handle_parse(args, &settings),
        Commands::Number(args) => handle_number(args),
        Commands::Serialize(args) => handle_serialize(args, &settings),
        Commands::Reconcile(args) => handle_reconcile(args, &settings),
        Commands::Extract(args) => handle_extract(args, &settings),
        Commands::Add(args) => handle_add(args, &settings),
        Commands::Rename(args) => handle_rename(args),
        Commands::Delete(args) => handle_delete(args),
        Commands::Validate(args) => handle_validate(args, &settings),
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "outline=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

fn handle_parse(args: ParseArgs, settings: &SyncSettings) -> Result<()> {
    let ParseArgs { input, numbered } = args;
    let text = read_input(&input)?;
    let parsed = parse_outline_text_with(&text, settings);
    if parsed.is_empty() {
        anyhow::bail!("no numbered outline lines found in {:?}", input);
    }
    if numbered {
        print!("{}", render_numbered(&parsed.number_for_display()));
    } else {
        println!("{}", serde_json::to_string_pretty(&parsed)?);
    }
    Ok(())
}

fn handle_number(args: NumberArgs) -> Result<()> {
    let tree = load_outline(&args.outline)?;
    let numbered = tree.number_for_display();
    if args.json {
        println!("{}", serde_json::to_string_pretty(&numbered)?);
    } else {
        print!("{}", render_numbered(&numbered));
    }
    Ok(())
}

fn handle_serialize(args: SerializeArgs, settings: &SyncSettings) -> Result<()> {
    let tree = load_outline(&args.outline)?;
    let document = serialize_outline_with(&tree, settings);
    write_output(args.output.as_deref(), &emit_document(&document, args.emit)?)
}

fn handle_reconcile(args: ReconcileArgs, settings: &SyncSettings) -> Result<()> {
    let previous = load_document(&args.document)?;
    let tree = load_outline(&args.outline)?;
    let Reconciliation { document, report } = reconcile_with_settings(&previous, &tree, settings);
    info!(
        headings = report.headings,
        preserved = report.preserved_sections,
        placeholders = report.placeholders,
        discarded = report.discarded_blocks,
        "reconciled {:?}",
        args.document
    );
    if args.report {
        eprintln!("{}", serde_json::to_string_pretty(&report)?);
    }
    let target = if args.in_place {
        Some(args.document.as_path())
    } else {
        args.output.as_deref()
    };
    write_output(target, &emit_document(&document, args.emit)?)
}

fn handle_extract(args: ExtractArgs, settings: &SyncSettings) -> Result<()> {
    let document = load_document(&args.document)?;
    let extraction = extract_outline_with(&document, settings);
    if !extraction.assigned_ids.is_empty() {
        debug!(
            count = extraction.assigned_ids.len(),
            "assigned ids to headings without one"
        );
    }
    if let Some(path) = &args.stamped {
        write_output(Some(path.as_path()), &document_to_json(&extraction.document)?)?;
    }
    println!("{}", serde_json::to_string_pretty(&extraction.outline)?);
    Ok(())
}

fn handle_add(args: AddArgs, settings: &SyncSettings) -> Result<()> {
    let mut tree = load_outline(&args.outline)?;
    let parent = args.parent.map(NodeId::from);
    let Some(id) = tree.insert_node(parent.as_ref(), settings) else {
        anyhow::bail!(
            "no node with id {} in {:?}",
            parent.map(|p| p.0).unwrap_or_default(),
            args.outline
        );
    };
    eprintln!("added {}", id);
    store_outline(&args.outline, &tree, args.in_place)
}

fn handle_rename(args: RenameArgs) -> Result<()> {
    let mut tree = load_outline(&args.outline)?;
    if !tree.set_title(&NodeId::from(args.id.as_str()), &args.title) {
        anyhow::bail!("no node with id {} in {:?}", args.id, args.outline);
    }
    store_outline(&args.outline, &tree, args.in_place)
}

fn handle_delete(args: DeleteArgs) -> Result<()> {
    let mut tree = load_outline(&args.outline)?;
    if !tree.remove(&NodeId::from(args.id.as_str())) {
        anyhow::bail!("no node with id {} in {:?}", args.id, args.outline);
    }
    store_outline(&args.outline, &tree, args.in_place)
}

fn handle_validate(args: ValidateArgs, settings: &SyncSettings) -> Result<()> {
    let tree = load_outline(&args.outline)?;
    match tree.validate(settings) {
        Ok(()) => {
            println!("ok: {} nodes", tree.node_count());
            Ok(())
        }
        Err(err) if args.fix => {
            let fixed = tree.normalized(settings);
            store_outline(&args.outline, &fixed, true)?;
            println!("fixed: {}", err);
            Ok(())
        }
        Err(err) => Err(err).with_context(|| format!("validating {:?}", args.outline)),
    }
}

fn render_numbered(nodes: &[NumberedOutlineNode]) -> String {
    let mut flat = Vec::new();
    for node in nodes {
        node.walk(&mut flat);
    }
    flat.iter()
        .map(|n| {
            format!(
                "{}{}\n",
                "  ".repeat(n.level.saturating_sub(1) as usize),
                n.numbered_title
            )
        })
        .collect()
}

fn emit_document(document: &Document, format: DocumentFormat) -> Result<String> {
    Ok(match format {
        DocumentFormat::Json => document_to_json(document)?,
        DocumentFormat::Plain => render_plain(document),
    })
}

fn read_input(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .context("reading stdin")?;
        return Ok(buf);
    }
    fs::read_to_string(path).with_context(|| format!("reading {:?}", path))
}

fn load_outline(path: &Path) -> Result<Outline> {
    let text = read_input(path)?;
    serde_json::from_str(&text).with_context(|| format!("parsing outline JSON in {:?}", path))
}

fn load_document(path: &Path) -> Result<Document> {
    let text = read_input(path)?;
    document_from_json(&text).with_context(|| format!("parsing editor document in {:?}", path))
}

fn store_outline(path: &Path, tree: &Outline, in_place: bool) -> Result<()> {
    let json = serde_json::to_string_pretty(tree)?;
    write_output(in_place.then_some(path), &json)
}

fn write_output(path: Option<&Path>, text: &str) -> Result<()> {
    match path {
        Some(path) => {
            let mut body = text.to_string();
            if !body.ends_with('\n') {
                body.push('\n');
            }
            fs::write(path, body).with_context(|| format!("writing {:?}", path))
        }
        None => {
            print!("{}", text);
            if !text.ends_with('\n') {
                println!();
            }
            Ok(())
        }
    }
}
