//! Progress reporting and terminal reports
//!
//! Provides a live spinner fed from the pipeline counters, plus the header,
//! summary and namespace tree printed around a CLI run.

use crate::config::AnalysisConfig;
use crate::pipeline::{AnalysisProgress, AnalysisSummary};
use crate::tree::{KeyspaceForest, NamespaceTree, Node};
use console::style;
use humansize::{format_size, BINARY};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Progress reporter that displays analysis status
pub struct ProgressReporter {
    bar: ProgressBar,
}

impl ProgressReporter {
    /// Create a new progress reporter
    pub fn new() -> Self {
        let bar = ProgressBar::new_spinner();

        bar.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {msg}")
                .expect("Invalid progress template")
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
        );

        bar.enable_steady_tick(Duration::from_millis(100));

        Self { bar }
    }

    /// Update the progress display
    pub fn update(&self, progress: &AnalysisProgress) {
        let msg = format!(
            "Scanned: {} | Typed: {} | Sized: {} | Est: {} | Rate: {:.0}/s",
            format_number(progress.keys_scanned),
            format_number(progress.keys_classified),
            format_number(progress.keys_sized),
            format_bytes(progress.bytes_estimated),
            progress.keys_per_second(),
        );

        self.bar.set_message(msg);
    }

    /// Set a status message
    pub fn set_status(&self, status: &str) {
        self.bar.set_message(status.to_string());
    }

    /// Finish the progress display with a final message
    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }

    /// Finish and clear the progress display
    pub fn finish_and_clear(&self) {
        self.bar.finish_and_clear();
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

/// Format a number with thousands separators
pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let bytes: Vec<_> = s.bytes().rev().collect();

    let chunks: Vec<String> = bytes
        .chunks(3)
        .map(|chunk| chunk.iter().rev().map(|&b| b as char).collect::<String>())
        .collect();

    chunks.into_iter().rev().collect::<Vec<_>>().join(",")
}

/// Human-readable byte count; estimates are never negative in practice
pub fn format_bytes(bytes: i64) -> String {
    format_size(bytes.max(0) as u64, BINARY)
}

/// Print a header at the start of the analysis
pub fn print_header(config: &AnalysisConfig) {
    let types: Vec<&str> = config.types.admitted().iter().map(|t| t.as_str()).collect();
    let separators: String = config
        .separators
        .bytes()
        .into_iter()
        .map(char::from)
        .collect();

    println!();
    println!(
        "{} {}",
        style("keyspace-analyzer").cyan().bold(),
        env!("CARGO_PKG_VERSION")
    );
    println!("{}", style("─".repeat(50)).dim());
    println!("  {} {}", style("Target:").bold(), config.target);
    println!("  {} {}", style("Match:").bold(), config.pattern);
    println!("  {} {}", style("Types:").bold(), types.join(","));
    println!("  {} {:?}", style("Separators:").bold(), separators);
    println!(
        "  {} {} (batch {}, limit {}, pause {}ms)",
        style("Sizing:").bold(),
        config.sizing,
        format_number(config.batch_size as u64),
        format_number(config.key_limit),
        config.pause.as_millis()
    );
    println!();
}

/// Print a summary of the analysis results
pub fn print_summary(summary: &AnalysisSummary, forest: &KeyspaceForest) {
    let rate = if summary.duration_secs > 0.0 {
        summary.keys_aggregated as f64 / summary.duration_secs
    } else {
        0.0
    };

    println!();
    if summary.completed {
        println!("{}", style("Analysis Complete").green().bold());
    } else {
        println!("{}", style("Analysis Interrupted").yellow().bold());
    }
    println!("{}", style("─".repeat(50)).dim());
    println!(
        "  {} {}",
        style("Keys scanned:").bold(),
        format_number(summary.keys_scanned)
    );
    println!(
        "  {} {}",
        style("Keys analyzed:").bold(),
        format_number(summary.keys_aggregated)
    );
    if summary.keys_dropped > 0 {
        println!(
            "  {} {}",
            style("Other types:").bold(),
            format_number(summary.keys_dropped)
        );
    }
    if summary.keys_skipped > 0 {
        println!(
            "  {} {}",
            style("Non UTF-8 keys:").yellow().bold(),
            format_number(summary.keys_skipped)
        );
    }
    println!(
        "  {} {}",
        style("Estimated size:").bold(),
        format_bytes(summary.total_size)
    );
    println!(
        "  {} {:.1}s ({:.0} keys/sec)",
        style("Duration:").bold(),
        summary.duration_secs,
        rate
    );
    if summary.limit_reached {
        println!(
            "  {}",
            style("Key limit reached; results cover a sample of the keyspace").dim()
        );
    }
    println!();

    for totals in forest.totals().iter().filter(|t| t.key_count > 0) {
        println!(
            "  {:<8} {:>12} keys {:>12}",
            style(totals.value_type).cyan(),
            format_number(totals.key_count),
            format_bytes(totals.size)
        );
    }
    println!();
}

/// Print every non-empty tree, `depth` levels deep, `top` children per node
pub fn print_forest(forest: &KeyspaceForest, depth: usize, top: usize) {
    for value_type in forest.types_present() {
        if let Some(tree) = forest.tree(value_type) {
            print!("{}", render_tree(tree, depth, top));
            println!();
        }
    }
}

/// Render one tree as indented text, largest children first
pub fn render_tree(tree: &NamespaceTree, depth: usize, top: usize) -> String {
    let mut out = String::new();
    let root = tree.root();
    out.push_str(&format!(
        "{} ({} keys, {})\n",
        root.segment(),
        format_number(root.key_count()),
        format_bytes(root.size())
    ));
    render_children(root, "", 1, depth, top, &mut out);
    out
}

fn render_children(node: &Node, path: &str, level: usize, depth: usize, top: usize, out: &mut String) {
    if level > depth {
        return;
    }

    let mut children = node.sorted_children();
    children.sort_by(|a, b| b.size().cmp(&a.size()));
    let hidden = children.len().saturating_sub(top);

    for child in children.into_iter().take(top) {
        let full = format!("{path}{}", child.segment());
        out.push_str(&format!(
            "{}{} ({} keys, {})\n",
            "  ".repeat(level),
            full,
            format_number(child.key_count()),
            format_bytes(child.size())
        ));
        render_children(child, &full, level + 1, depth, top, out);
    }

    if hidden > 0 {
        out.push_str(&format!("{}... {} more\n", "  ".repeat(level), hidden));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::Separators;

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1234567), "1,234,567");
        assert_eq!(format_number(1234567890), "1,234,567,890");
    }

    #[test]
    fn test_format_bytes_clamps() {
        assert_eq!(format_bytes(-5), format_bytes(0));
    }

    #[test]
    fn test_render_tree_order_and_depth() {
        let mut tree = NamespaceTree::new("string", Separators::new(b":"));
        tree.add_key("small:a", 1);
        tree.add_key("big:a:x", 50);
        tree.add_key("big:b", 10);
        tree.add_key("mid", 20);

        let text = render_tree(&tree, 1, 2);
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].starts_with("string (4 keys"));
        assert!(lines[1].starts_with("  big: (2 keys"));
        assert!(lines[2].starts_with("  mid (1 keys"));
        assert_eq!(lines[3], "  ... 1 more");
        assert_eq!(lines.len(), 4);

        let deep = render_tree(&tree, 2, 10);
        assert!(deep.contains("    big:a: (1 keys"));
    }
}
