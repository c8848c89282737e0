use super::ui;
use crate::core::currency::{find_currency, normalize_code};
use crate::engine::ConversionEngine;
use anyhow::{Context, Result, bail};

pub async fn add(engine: &ConversionEngine, code: &str) -> Result<()> {
    let currency = find_currency(code).with_context(|| format!("Unknown currency: {code}"))?;
    let label = currency.to_string();

    if engine.add_currency(currency).await? {
        println!(
            "Added {}",
            ui::style_text(&label, ui::StyleType::Highlight)
        );
    } else {
        println!(
            "{}",
            ui::style_text(&format!("{label} is already selected"), ui::StyleType::Subtle)
        );
    }
    Ok(())
}

pub async fn remove(engine: &ConversionEngine, code: &str) -> Result<()> {
    let code = normalize_code(code);
    if !engine.selected_currencies().iter().any(|c| c.code == code) {
        bail!("{code} is not selected");
    }
    if !engine.can_remove_more() {
        bail!("At least one currency must stay selected");
    }

    engine.remove_currency(&code).await;
    println!("Removed {}", ui::style_text(&code, ui::StyleType::Highlight));
    Ok(())
}

/// Positions are 1-based, as listed by `show`.
pub async fn move_to(engine: &ConversionEngine, from: usize, to: usize) -> Result<()> {
    let len = engine.selected_currencies().len();
    if from == 0 || to == 0 || from > len || to > len {
        bail!("Positions must be between 1 and {len}");
    }

    engine.move_currency(from - 1, to - 1).await;
    let order: Vec<String> = engine
        .selected_currencies()
        .into_iter()
        .map(|c| c.code)
        .collect();
    println!("{}", order.join(" "));
    Ok(())
}
