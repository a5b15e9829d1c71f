//! Binary entry point for the topograph command-line tool.
#![forbid(unsafe_code)]

mod ui;

use std::collections::BTreeMap;
use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use topograph::config::{OutputFormat, TopoConfig, CONFIG_ENV};
use topograph::{
    init_logging, Graph, GraphOptions, GraphView, MetricStore, QueryErrorWithCode, ResultSet,
    TopoError, TopologyDocument, TraversalEngine,
};

use crate::ui::{format_duration, Theme, Ui};

#[derive(Parser, Debug)]
#[command(
    name = "topograph",
    version,
    about = "Query network topology snapshots with Gremlin-style traversals",
    disable_help_subcommand = true
)]
struct Cli {
    #[arg(
        long,
        global = true,
        env = CONFIG_ENV,
        value_name = "PATH",
        help = "Configuration file (defaults to the platform config dir)"
    )]
    config: Option<PathBuf>,

    #[arg(long, global = true, value_enum, help = "Output format override")]
    format: Option<FormatArg>,

    #[arg(
        long,
        global = true,
        env = "TOPOGRAPH_LOG",
        value_name = "FILTER",
        help = "tracing filter directive, overrides [log] filter"
    )]
    log: Option<String>,

    #[arg(long, global = true, help = "Disable colors and spinners")]
    plain: bool,

    #[arg(short, long, global = true, help = "Only print results")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load a topology document and run one query against it.
    Query {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(value_name = "QUERY")]
        query: String,
    },
    /// Summarize a topology document.
    Stats {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Inspect or initialize the configuration file.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the effective configuration.
    Show,
    /// Print the configuration file location.
    Path,
    /// Write the effective configuration to its file.
    Init,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum FormatArg {
    Text,
    Json,
}

impl From<FormatArg> for OutputFormat {
    fn from(value: FormatArg) -> Self {
        match value {
            FormatArg::Text => OutputFormat::Text,
            FormatArg::Json => OutputFormat::Json,
        }
    }
}

fn main() {
    let cli = Cli::parse();
    let theme = if cli.plain { Theme::Plain } else { Theme::Auto };
    let ui = Ui::new(theme, cli.quiet);
    if let Err(err) = run(cli, &ui) {
        ui.warn(&describe(err.as_ref()));
        std::process::exit(1);
    }
}

fn run(cli: Cli, ui: &Ui) -> Result<(), Box<dyn Error>> {
    let config = TopoConfig::load(cli.config.clone())?;
    let filter = cli.log.clone().unwrap_or_else(|| config.log.filter.clone());
    init_logging(&filter)?;
    let format = cli
        .format
        .map(OutputFormat::from)
        .unwrap_or(config.query.default_format);

    match cli.command {
        Command::Query { file, query } => {
            let (engine, _) = load(&config, &file, ui)?;
            let task = ui.task("evaluating query");
            let result = engine.execute(&query)?;
            let elapsed = task.finish();
            emit(format, &result, || print_result(ui, &result))?;
            ui.success(&format!(
                "{} result(s) in {}",
                result.len(),
                format_duration(elapsed)
            ));
        }
        Command::Stats { file } => {
            let (engine, store) = load(&config, &file, ui)?;
            let stats = collect_stats(engine.graph(), &store);
            emit(format, &stats, || print_stats(ui, &stats))?;
        }
        Command::Config { action } => match action {
            ConfigAction::Show => print!("{}", config.to_toml()?),
            ConfigAction::Path => match config.path() {
                Some(path) => println!("{}", path.display()),
                None => return Err(Box::new(topograph::config::ConfigError::NoConfigPath)),
            },
            ConfigAction::Init => {
                let path = config.persist()?;
                ui.success(&format!("wrote {}", path.display()));
            }
        },
    }
    Ok(())
}

fn load(
    config: &TopoConfig,
    file: &Path,
    ui: &Ui,
) -> Result<(TraversalEngine, Arc<MetricStore>), Box<dyn Error>> {
    let mut options = GraphOptions::default();
    if let Some(host) = &config.graph.default_host {
        options = options.default_host(host.clone());
    }
    let graph = Graph::new(options);
    let store = Arc::new(MetricStore::new());
    let task = ui.task(format!("loading {}", file.display()));
    let document = TopologyDocument::read(file)?;
    document.load_into(&graph, &store)?;
    task.finish();
    if let Some(retention) = config.graph.history_retention_ms {
        let pruned = graph.prune_history(graph.now().saturating_sub(retention));
        tracing::debug!(pruned, retention_ms = retention, "history.pruned");
    }
    let engine =
        TraversalEngine::new(graph, Arc::clone(&store)).with_options(config.engine_options());
    Ok((engine, store))
}

#[derive(serde::Serialize)]
struct Stats {
    nodes: usize,
    edges: usize,
    history: usize,
    series: usize,
    records: usize,
    node_types: BTreeMap<String, usize>,
    relation_types: BTreeMap<String, usize>,
}

fn collect_stats(graph: &Graph, store: &MetricStore) -> Stats {
    let reader = graph.read();
    let view: &dyn GraphView = &*reader;
    let mut node_types = BTreeMap::new();
    for node in view.nodes() {
        let kind = node.node_type().unwrap_or("(none)").to_string();
        *node_types.entry(kind).or_insert(0) += 1;
    }
    let mut relation_types = BTreeMap::new();
    for edge in view.edges() {
        let kind = edge.relation_type().unwrap_or("(none)").to_string();
        *relation_types.entry(kind).or_insert(0) += 1;
    }
    Stats {
        nodes: reader.node_count(),
        edges: reader.edge_count(),
        history: reader.history().len(),
        series: store.series_count(),
        records: store.total_records(),
        node_types,
        relation_types,
    }
}

fn emit<T, F>(format: OutputFormat, value: &T, printer: F) -> Result<(), Box<dyn Error>>
where
    T: serde::Serialize,
    F: FnOnce(),
{
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
        OutputFormat::Text => printer(),
    }
    Ok(())
}

fn print_result(ui: &Ui, result: &ResultSet) {
    match result {
        ResultSet::Nodes(nodes) => ui.nodes(nodes),
        ResultSet::Edges(edges) => ui.edges(edges),
        ResultSet::Metrics(set) => {
            for (node, records) in set {
                for record in records {
                    ui.metric(node, record);
                }
            }
        }
        ResultSet::Metric(Some(metric)) => ui.metric("sum", metric),
        ResultSet::Metric(None) => println!("no metrics"),
        ResultSet::Count(count) => println!("{count}"),
    }
}

fn print_stats(ui: &Ui, stats: &Stats) {
    ui.section(
        "graph",
        [
            ("nodes", stats.nodes),
            ("edges", stats.edges),
            ("history", stats.history),
            ("series", stats.series),
            ("records", stats.records),
        ],
    );
    ui.section(
        "node types",
        stats.node_types.iter().map(|(k, v)| (k.as_str(), *v)),
    );
    ui.section(
        "relation types",
        stats.relation_types.iter().map(|(k, v)| (k.as_str(), *v)),
    );
}

fn describe(err: &(dyn Error + 'static)) -> String {
    match err.downcast_ref::<TopoError>() {
        Some(TopoError::Query(query)) => QueryErrorWithCode(query).to_string(),
        _ => err.to_string(),
    }
}
