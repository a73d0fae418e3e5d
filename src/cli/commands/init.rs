//! Initialize command.

use console::style;

use crate::config::Settings;
use crate::history::HistoryStore;
use crate::repository::open_repository;

/// Initialize the data directory and check the configured backends.
pub async fn cmd_init(settings: &Settings) -> anyhow::Result<()> {
    settings.ensure_directories()?;

    // Opening the repository creates the local schema when SQLite is used.
    open_repository(settings)?;

    let history = HistoryStore::new(&settings.history_path).load()?;

    println!(
        "{} Initialized leadscout in {}",
        style("✓").green(),
        settings.data_dir.display()
    );
    println!(
        "  {} History: {} ({} entries)",
        style("→").dim(),
        settings.history_path.display(),
        history.len()
    );
    println!(
        "  {} Reports: {}",
        style("→").dim(),
        settings.reports_dir.display()
    );

    if settings.organization_id.is_empty() {
        println!("{} ORGANIZATION_ID is not set", style("!").yellow());
    }
    if settings.people_search_url().is_none() {
        println!(
            "{} No search endpoint configured (set SUPABASE_URL)",
            style("!").yellow()
        );
    }
    if settings.login_url.is_none() {
        println!(
            "{} LOGIN_URL is not set; `watch` needs --login-url",
            style("!").yellow()
        );
    }

    Ok(())
}
