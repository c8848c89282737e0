use super::ui;
use crate::core::currency::{Currency, CurrencyClass, search};
use comfy_table::Cell;

pub fn render_catalog(currencies: &[Currency], selected: &[Currency]) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Code"),
        ui::header_cell("Name"),
        ui::header_cell("Type"),
        ui::header_cell("Selected"),
    ]);

    for currency in currencies {
        let marker = if selected.contains(currency) { "*" } else { "" };
        table.add_row(vec![
            Cell::new(&currency.code),
            Cell::new(&currency.name),
            Cell::new(currency.class.to_string()),
            Cell::new(marker),
        ]);
    }
    table.to_string()
}

/// Prints catalog entries matching `query`, optionally of one class.
pub fn run(query: &str, class: Option<CurrencyClass>, selected: &[Currency]) {
    let matches = search(query, class);
    if matches.is_empty() {
        println!(
            "{}",
            ui::style_text(&format!("No currencies match \"{query}\""), ui::StyleType::Subtle)
        );
        return;
    }
    println!("{}", render_catalog(&matches, selected));
}
