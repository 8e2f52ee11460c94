use dotenv::dotenv;
use ledger_insights::*;
use std::error::Error;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv().ok();
    let config = LedgerConfig::from_env()?;
    let user = std::env::var("LEDGER_USER").unwrap_or_else(|_| "report@localhost".to_string());
    let previous: usize = std::env::var("LEDGER_PREVIOUS_PERIODS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(2);

    println!("📒 Connecting to {}...\n", config.service.endpoint);

    let client = GraphQlLedgerClient::new(&config.service)?;
    let cache = Arc::new(RowCache::new(config.report.cache_ttl()));
    let mut session = LedgerSession::sign_in(client, cache, user, config.report.clone())?;

    let rows = session.load().await?.len();
    println!("✅ Loaded {} ledger rows.", rows);

    let catalog = session.catalog()?;
    let base = catalog
        .newest_first()
        .first()
        .map(|p| p.label.clone())
        .ok_or("ledger has no readable periods")?;

    let scope = session.trailing_scope(&base, previous)?;
    let insights = session.insights(&scope)?;

    if !insights.excluded_ids.is_empty() {
        println!(
            "⚠️  {} rows skipped (no usable year/month).",
            insights.excluded_ids.len()
        );
    }

    if let Some(headline) = insights.headline() {
        println!("\n📊 {}", headline.period);
        println!("   Revenue:       {:>14.2}", headline.revenue);
        println!("   Expenses:      {:>14.2}", headline.expenses);
        println!("   Net profit:    {:>14.2}", headline.profit);
        println!("   Margin:        {:>13.2}%", headline.margin);
        println!("   Expense ratio: {:>13.2}%", headline.expense_ratio());
    }

    println!("\n📈 Net balance trend");
    for (period, net) in insights.trend.iter().rev() {
        println!("   {:<16} {:>14.2}", period, net);
    }

    println!("\n{}", to_markdown(&insights.hierarchy));

    if let Ok(path) = std::env::var("LEDGER_CSV_OUT") {
        std::fs::write(&path, to_csv(&insights.hierarchy))?;
        println!("💾 Wrote {}", path);
    }

    session.sign_out();
    Ok(())
}
