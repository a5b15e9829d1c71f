use std::fmt::Display;
use std::io::IsTerminal;
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};
use nu_ansi_term::{Color, Style};
use topograph::{Edge, InterfaceMetric, Node};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Theme {
    Auto,
    Plain,
}

pub struct Ui {
    palette: Palette,
    paint: bool,
    quiet: bool,
    spinner_style: ProgressStyle,
}

impl Ui {
    pub fn new(theme: Theme, quiet: bool) -> Self {
        let paint = theme == Theme::Auto && std::io::stdout().is_terminal() && !quiet;
        let palette = if paint {
            Palette::colored()
        } else {
            Palette::plain()
        };
        let spinner_style = ProgressStyle::with_template("{spinner} {msg}")
            .map(|style| style.tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"))
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        Self {
            palette,
            paint,
            quiet,
            spinner_style,
        }
    }

    pub fn section<'a, I, V>(&self, title: &str, rows: I)
    where
        I: IntoIterator<Item = (&'a str, V)>,
        V: Display,
    {
        let rows: Vec<(&str, String)> = rows
            .into_iter()
            .map(|(key, value)| (key, value.to_string()))
            .collect();
        if rows.is_empty() {
            return;
        }
        self.heading(title);
        let width = rows.iter().map(|(k, _)| k.len()).max().unwrap_or(0);
        for (key, value) in rows {
            println!(
                "  {} {}",
                self.palette.key.paint(format!("{key:>width$}:")),
                self.palette.value.paint(value)
            );
        }
    }

    pub fn nodes(&self, nodes: &[std::sync::Arc<Node>]) {
        self.heading(&format!("{} node(s)", nodes.len()));
        for node in nodes {
            let kind = node.node_type().unwrap_or("-");
            let name = node.name().unwrap_or("");
            println!(
                "  {} {} {} {}",
                self.palette.bullet.paint("•"),
                self.palette.key.paint(node.id.as_str()),
                self.palette.value.paint(format!("[{kind}] {name}")),
                self.palette.dim.paint(format!("host={} rev={}", node.host, node.revision)),
            );
        }
    }

    pub fn edges(&self, edges: &[std::sync::Arc<Edge>]) {
        self.heading(&format!("{} edge(s)", edges.len()));
        for edge in edges {
            let relation = edge.relation_type().unwrap_or("-");
            println!(
                "  {} {} {} -> {} {}",
                self.palette.bullet.paint("•"),
                self.palette.key.paint(edge.id.as_str()),
                edge.parent,
                edge.child,
                self.palette.dim.paint(format!("({relation})")),
            );
        }
    }

    pub fn metric(&self, title: &str, metric: &InterfaceMetric) {
        self.section(
            title,
            [
                ("start", metric.start),
                ("last", metric.last),
                ("rx_packets", metric.rx_packets),
                ("tx_packets", metric.tx_packets),
                ("rx_bytes", metric.rx_bytes),
                ("tx_bytes", metric.tx_bytes),
                ("rx_errors", metric.rx_errors),
                ("tx_errors", metric.tx_errors),
                ("rx_dropped", metric.rx_dropped),
                ("tx_dropped", metric.tx_dropped),
            ],
        );
    }

    pub fn success(&self, message: &str) {
        if self.quiet {
            return;
        }
        println!("{} {message}", self.palette.success.paint(SUCCESS_ICON));
    }

    pub fn warn(&self, message: &str) {
        let prefix = if self.quiet { "error:" } else { WARNING_ICON };
        eprintln!("{} {message}", self.palette.warn.paint(prefix));
    }

    pub fn task(&self, label: impl Into<String>) -> TaskGuard<'_> {
        let label = label.into();
        let pb = (self.paint && !self.quiet).then(|| {
            let pb = ProgressBar::new_spinner();
            pb.set_style(self.spinner_style.clone());
            pb.set_message(label.clone());
            pb.enable_steady_tick(Duration::from_millis(120));
            pb
        });
        TaskGuard {
            ui: self,
            label,
            start: Instant::now(),
            finished: false,
            pb,
        }
    }

    fn heading(&self, title: &str) {
        if self.quiet {
            return;
        }
        println!("{}", self.palette.heading.paint(format!("{HEADING_ICON} {title}")));
    }
}

pub struct TaskGuard<'a> {
    ui: &'a Ui,
    label: String,
    start: Instant,
    finished: bool,
    pb: Option<ProgressBar>,
}

impl TaskGuard<'_> {
    pub fn finish(mut self) -> Duration {
        self.finished = true;
        if let Some(pb) = self.pb.take() {
            pb.finish_and_clear();
        }
        self.start.elapsed()
    }
}

impl Drop for TaskGuard<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let message = format!(
            "{} interrupted after {}",
            self.label,
            format_duration(self.start.elapsed())
        );
        match self.pb.take() {
            Some(pb) => pb.abandon_with_message(message),
            None => self.ui.warn(&message),
        }
    }
}

pub fn format_duration(duration: Duration) -> String {
    if duration.as_secs_f64() >= 1.0 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        format!("{:.0}ms", duration.as_secs_f64() * 1_000.0)
    }
}

struct Palette {
    heading: Style,
    key: Style,
    value: Style,
    dim: Style,
    bullet: Style,
    success: Style,
    warn: Style,
}

impl Palette {
    fn colored() -> Self {
        Self {
            heading: Style::new().fg(Color::Purple).bold(),
            key: Style::new().fg(Color::LightBlue).bold(),
            value: Style::new().fg(Color::White),
            dim: Style::new().fg(Color::DarkGray),
            bullet: Style::new().fg(Color::LightBlue),
            success: Style::new().fg(Color::LightGreen).bold(),
            warn: Style::new().fg(Color::Yellow).bold(),
        }
    }

    fn plain() -> Self {
        Self {
            heading: Style::new(),
            key: Style::new(),
            value: Style::new(),
            dim: Style::new(),
            bullet: Style::new(),
            success: Style::new(),
            warn: Style::new(),
        }
    }
}

const HEADING_ICON: &str = "▸";
const SUCCESS_ICON: &str = "✔";
const WARNING_ICON: &str = "⚠";
