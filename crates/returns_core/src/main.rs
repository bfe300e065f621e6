use anyhow::Context;
use contracts::domain::a025_mp_returns::FilterPatch;
use returns_core::domain::a025_mp_returns::{HttpReturnsApi, LoadPhase, ReturnsController};
use returns_core::shared::clock::system_clock;
use returns_core::shared::config;
use returns_core::shared::storage::FileStore;
use returns_core::system;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Аргументы: список id аккаунтов и необязательный `--search TEXT`
fn parse_args() -> anyhow::Result<(Vec<String>, Option<String>)> {
    let mut accounts = Vec::new();
    let mut search = None;
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--search" {
            search = Some(args.next().context("--search requires a value")?);
        } else {
            accounts.push(arg);
        }
    }
    Ok((accounts, search))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    system::tracing::initialize()?;

    let config = config::load_config()?;
    let (accounts, search) = parse_args()?;
    tracing::info!("Returns endpoint: {}", config.api.returns_url());

    let api = HttpReturnsApi::new(&config.api)?;
    let store = FileStore::open(config::get_storage_dir(&config))?;
    let controller = ReturnsController::new(
        Arc::new(api),
        Arc::new(store),
        system_clock(),
        &config.fetch,
    );

    let restored = controller.view();
    if restored.restored_from_snapshot {
        println!(
            "Из снимка: {} групп, {} без группы",
            restored.groups.len(),
            restored.independents.len()
        );
    }

    if !accounts.is_empty() {
        controller.set_account_selection(accounts);
    }
    if let Some(text) = search {
        controller.set_filters(FilterPatch::search(text));
        controller.flush_filters();
    }
    controller.start();

    let key = controller.query().cache_key();
    let expected = controller
        .subscribe()
        .wait_for(|v| {
            v.key.as_ref() == Some(&key) && matches!(v.phase, LoadPhase::Success | LoadPhase::Error)
        })
        .await
        .context("returns controller stopped")?
        .clone();

    if let Some(error) = &expected.error {
        tracing::error!("Returns load failed: {}", error);
    }

    println!(
        "Возвратов: {} (страница {}, показано {})",
        expected.total,
        expected.page,
        expected.record_count()
    );
    let mut marked: BTreeMap<&str, usize> = BTreeMap::new();
    for status in expected.annotations.values() {
        *marked.entry(status.display_name()).or_insert(0) += 1;
    }
    for (name, count) in &marked {
        println!("  пометка «{}»: {}", name, count);
    }

    for group in &expected.groups {
        println!(
            "  {:<24} {:>4} шт. {:>12.2}  {}",
            group.base_key, group.total_count, group.total_value, group.representative_title
        );
    }
    for record in &expected.independents {
        println!(
            "  {:<24} {:>4} шт. {:>12.2}  {}",
            record.raw_sku().unwrap_or("-"),
            record.quantity(),
            record.value(),
            record.title().unwrap_or(&record.id)
        );
    }

    Ok(())
}
