//! History inspection commands.

use std::io::{self, Write};

use console::style;

use crate::config::Settings;
use crate::history::HistoryStore;

use super::helpers::resolve_fingerprint;

pub fn cmd_history_list(settings: &Settings, limit: usize) -> anyhow::Result<()> {
    let history = HistoryStore::new(&settings.history_path).load()?;
    if history.is_empty() {
        println!("{} No queries recorded yet", style("!").yellow());
        return Ok(());
    }

    let mut entries: Vec<_> = history.iter().collect();
    entries.sort_by(|a, b| b.1.date.cmp(&a.1.date));
    let shown = if limit == 0 { entries.len() } else { limit };

    println!(
        "{:<14} {:<17} {:<10} {:>9} {:>9} {:>6}",
        style("FINGERPRINT").bold(),
        style("DATE").bold(),
        style("TYPE").bold(),
        style("INSERTED").bold(),
        style("EXPECTED").bold(),
        style("PAGES").bold()
    );
    for (fingerprint, entry) in entries.iter().take(shown) {
        println!(
            "{:<14} {:<17} {:<10} {:>9} {:>9} {:>6}",
            fingerprint.short(),
            entry.date.format("%Y-%m-%d %H:%M"),
            entry.job_type,
            entry.stats.inserted,
            entry.stats.expected,
            entry.stats.pages_fetched
        );
    }
    if entries.len() > shown {
        println!(
            "  {} {} more (use --limit 0 to show all)",
            style("→").dim(),
            entries.len() - shown
        );
    }
    Ok(())
}

pub fn cmd_history_show(settings: &Settings, prefix: &str) -> anyhow::Result<()> {
    let history = HistoryStore::new(&settings.history_path).load()?;
    let fingerprint = resolve_fingerprint(&history, prefix)?;
    if let Some(entry) = history.get(&fingerprint) {
        println!("{}", style(&fingerprint).bold());
        println!("{}", serde_json::to_string_pretty(entry)?);
    }
    Ok(())
}

pub fn cmd_history_forget(settings: &Settings, prefix: &str) -> anyhow::Result<()> {
    let store = HistoryStore::new(&settings.history_path);
    let fingerprint = resolve_fingerprint(&store.load()?, prefix)?;
    store.forget(&fingerprint)?;
    println!(
        "{} Forgot {}; the query will run again next time",
        style("✓").green(),
        fingerprint.short()
    );
    Ok(())
}

pub fn cmd_history_clear(settings: &Settings, yes: bool) -> anyhow::Result<()> {
    let store = HistoryStore::new(&settings.history_path);

    if !yes {
        print!(
            "Remove all history from {}? [y/N] ",
            store.path().display()
        );
        io::stdout().flush()?;
        let mut answer = String::new();
        io::stdin().read_line(&mut answer)?;
        if !matches!(answer.trim(), "y" | "Y" | "yes") {
            println!("Aborted");
            return Ok(());
        }
    }

    let removed = store.clear()?;
    println!("{} Removed {} history entries", style("✓").green(), removed);
    Ok(())
}
