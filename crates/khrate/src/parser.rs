use std::sync::LazyLock;

use chrono::{Datelike, NaiveDate};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use crate::recipe::{NbcRecipe, NssfRecipe, RecipeError, TaxRecipe, parse_selector};
use crate::types::{CurrentExchangeRate, ExchangeRateRow, NssfRate, TaxExchangeRate, TaxRateEntry};
use crate::utils::{elem_text, inner_text, normalize_whitespace};

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("Element not found: {0}")]
    MissingElement(String),
    #[error("Row {row} has no cell at position {column}")]
    MissingCell { row: usize, column: usize },
    #[error("No token at position {index} in '{text}'")]
    MissingToken { index: usize, text: String },
    #[error("Failed to parse date: {0}")]
    DateParse(String),
    #[error(transparent)]
    Recipe(#[from] RecipeError),
}

// A run of digits, optionally grouped by thousands separators ("4,100").
static RE_RATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d{1,3}(?:,\d{3})+|\d+").expect("invalid regex: rate"));

static TD: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("td").expect("invalid selector: td"));

fn select_first<'a>(
    document: &'a Html,
    field: &'static str,
    selector: &str,
) -> Result<ElementRef<'a>, ExtractError> {
    let sel = parse_selector(field, selector)?;
    document
        .select(&sel)
        .next()
        .ok_or_else(|| ExtractError::MissingElement(selector.to_string()))
}

/// Parses the central bank's rate table, skipping the header row, and the
/// official KHR/USD rate printed next to it.
pub fn parse_nbc_rates(
    html: &str,
    recipe: &NbcRecipe,
) -> Result<(Vec<ExchangeRateRow>, Option<u64>), ExtractError> {
    let document = Html::parse_document(html);
    let row_sel = parse_selector("nbc.row_selector", &recipe.row_selector)?;
    let columns = &recipe.columns;

    let rows = document
        .select(&row_sel)
        .skip(1)
        .map(|row| {
            let cells: Vec<ElementRef> = row.select(&TD).collect();
            let cell = |i: usize| {
                cells
                    .get(i)
                    .map(|c| elem_text(*c).trim().to_string())
                    .unwrap_or_default()
            };
            ExchangeRateRow {
                currency: cell(columns.currency),
                symbol: cell(columns.symbol),
                unit: cell(columns.unit),
                bid: cell(columns.bid),
                ask: cell(columns.ask),
            }
        })
        .collect::<Vec<_>>();

    log::debug!("Parsed {} NBC rate row(s)", rows.len());

    Ok((
        rows,
        parse_official_rate(&document, &recipe.official_rate_label),
    ))
}

fn parse_official_rate(document: &Html, label: &str) -> Option<u64> {
    // Innermost cell only, so a layout table wrapping the label does not
    // contribute its other numbers.
    let cell = document.select(&TD).find(|td| {
        elem_text(*td).contains(label) && !td.select(&TD).any(|inner| elem_text(inner).contains(label))
    })?;
    let text = elem_text(cell);
    let rate = RE_RATE.find(&text)?;
    rate.as_str().replace(',', "").parse().ok()
}

fn month_number(name: &str) -> Result<u32, ExtractError> {
    let name = name.trim_matches(|c: char| !c.is_alphabetic());
    NaiveDate::parse_from_str(&format!("1 {} 2000", name), "%d %B %Y")
        .map(|date| date.month())
        .map_err(|_| ExtractError::DateParse(format!("Unknown month: {}", name)))
}

/// Cuts the monthly rate out of the NSSF announcement sentence, e.g.
/// "Exchange rate for January 2024 is 4100 Riel".
pub fn parse_nssf_rate(html: &str, recipe: &NssfRecipe) -> Result<NssfRate, ExtractError> {
    let document = Html::parse_document(html);
    let link = select_first(&document, "nssf.link_selector", &recipe.link_selector)?;
    let raw = inner_text(link);
    let text = normalize_whitespace(&raw);
    let tokens: Vec<&str> = text.split(' ').collect();

    let token = |index: usize| {
        tokens
            .get(index)
            .copied()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ExtractError::MissingToken {
                index,
                text: text.clone(),
            })
    };

    let rate_index = tokens
        .len()
        .checked_sub(recipe.rate_token_from_end)
        .ok_or_else(|| ExtractError::MissingToken {
            index: recipe.rate_token_from_end,
            text: text.clone(),
        })?;
    let exchange_rate = token(rate_index)?.to_string();
    let month = month_number(token(recipe.month_token)?)?;
    let exchange_month = format!("{}-{}", token(recipe.year_token)?, month);

    Ok(NssfRate {
        exchange_month,
        exchange_rate,
        data: raw,
    })
}

pub fn parse_tax_rates(html: &str, recipe: &TaxRecipe) -> Result<TaxExchangeRate, ExtractError> {
    let document = Html::parse_document(html);

    let date = select_first(
        &document,
        "tax.current_date_selector",
        &recipe.current_date_selector,
    )?;
    let rate = select_first(
        &document,
        "tax.current_rate_selector",
        &recipe.current_rate_selector,
    )?;
    let current_exchange_rate = CurrentExchangeRate {
        exchange_date: normalize_whitespace(&inner_text(date)),
        exchange_rate: inner_text(rate)
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_string(),
    };

    let row_sel = parse_selector("tax.history_row_selector", &recipe.history_row_selector)?;
    let mut exchange_lists = Vec::new();
    for (index, row) in document.select(&row_sel).enumerate() {
        let cells: Vec<ElementRef> = row.select(&TD).collect();
        if cells.is_empty() {
            continue;
        }
        let cell = |column: usize| {
            cells
                .get(column)
                .map(|c| inner_text(*c))
                .ok_or(ExtractError::MissingCell { row: index, column })
        };

        let date_text = cell(recipe.date_column)?;
        exchange_lists.push(TaxRateEntry {
            exchange_date: date_text.split('\n').next().unwrap_or_default().trim().to_string(),
            exchange_symbol: normalize_whitespace(&cell(recipe.symbol_column)?),
            exchange_rate: normalize_whitespace(&cell(recipe.rate_column)?),
        });
    }

    log::debug!("Parsed {} tax rate history row(s)", exchange_lists.len());

    Ok(TaxExchangeRate {
        current_exchange_rate,
        exchange_lists,
    })
}
