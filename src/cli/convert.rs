use super::ui;
use crate::core::currency::normalize_code;
use crate::engine::{ConversionEngine, DisplayRow, FetchOutcome};
use anyhow::{Result, bail};
use chrono::{DateTime, Local, Utc};
use comfy_table::Cell;
use tracing::debug;

pub fn render_table(rows: &[DisplayRow], editing_code: Option<&str>, base_currency: &str) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Code"),
        ui::header_cell("Currency"),
        ui::header_cell("Amount"),
        ui::header_cell(&format!("Rate ({base_currency})")),
    ]);

    for row in rows {
        let class = row.currency.class;
        let highlighted = editing_code == Some(row.currency.code.as_str());
        table.add_row(vec![
            Cell::new(&row.currency.code),
            Cell::new(&row.currency.name),
            ui::amount_cell(ui::format_amount(row.amount, class), highlighted),
            ui::format_optional_cell(row.rate, |r| ui::format_amount(r, class)),
        ]);
    }

    table.to_string()
}

fn render_footer(last_fetched_at: Option<DateTime<Utc>>, error_message: Option<&str>) -> String {
    let mut footer = match last_fetched_at {
        Some(at) => {
            let local: DateTime<Local> = at.into();
            ui::style_text(
                &format!("Rates updated {}", local.format("%Y-%m-%d %H:%M")),
                ui::StyleType::Subtle,
            )
        }
        None => ui::style_text("Rates never updated", ui::StyleType::Subtle),
    };
    if let Some(message) = error_message {
        footer.push('\n');
        footer.push_str(&ui::style_text(message, ui::StyleType::Error));
    }
    footer
}

async fn refresh_with_spinner(engine: &ConversionEngine, force: bool) -> Option<FetchOutcome> {
    let pb = ui::new_spinner("Fetching rates...");
    let outcome = if force {
        Some(engine.fetch_rates().await)
    } else {
        engine.fetch_rates_if_needed().await
    };
    pb.finish_and_clear();
    debug!(?outcome, "Refresh finished");
    outcome
}

/// Converts `amount` of `code` (the base currency when omitted) into every
/// selected currency and prints the result.
pub async fn show(
    engine: &ConversionEngine,
    amount: Option<f64>,
    code: Option<&str>,
    force_refresh: bool,
) -> Result<()> {
    refresh_with_spinner(engine, force_refresh).await;

    if let Some(amount) = amount {
        let code = code.map_or_else(|| engine.base_currency().to_string(), normalize_code);
        if engine.rate(&code).is_none() {
            bail!("No rate available for {code}");
        }
        engine.update_amount(amount, &code);
    }

    let rows = engine.display_rows();
    if rows.is_empty() {
        println!(
            "{}",
            ui::style_text("No currencies selected. Use `xcur add CODE`.", ui::StyleType::Subtle)
        );
        return Ok(());
    }

    println!(
        "{}\n",
        ui::style_text("Currency Converter", ui::StyleType::Title)
    );
    let conversion = engine.conversion_state();
    println!(
        "{}",
        render_table(
            &rows,
            conversion.editing_code.as_deref(),
            engine.base_currency()
        )
    );
    println!(
        "\n{}",
        render_footer(engine.last_fetched_at(), engine.error_message().as_deref())
    );
    Ok(())
}

/// Forces a fetch and reports how it went.
pub async fn refresh(engine: &ConversionEngine) -> Result<()> {
    match refresh_with_spinner(engine, true).await {
        Some(FetchOutcome::Fetched { missing }) => {
            println!(
                "{}",
                ui::style_text(
                    &format!("Fetched {} rates", engine.rates().len()),
                    ui::StyleType::Highlight
                )
            );
            if !missing.is_empty() {
                println!(
                    "{}",
                    ui::style_text(
                        &format!("No rate returned for: {}", missing.join(", ")),
                        ui::StyleType::Subtle
                    )
                );
            }
            Ok(())
        }
        Some(FetchOutcome::FromCache) => {
            println!(
                "{}",
                ui::style_text(
                    "Rate sources unavailable, using cached rates",
                    ui::StyleType::Subtle
                )
            );
            Ok(())
        }
        Some(FetchOutcome::Failed(e)) => bail!("Failed to fetch rates: {e}"),
        Some(FetchOutcome::AlreadyInFlight) | None => Ok(()),
    }
}
