//! Per-site extraction recipes.
//!
//! Everything that ties the scrapers to the current markup of the three
//! sites (URLs, selectors, cell and token positions) lives here as plain
//! data. A JSON file can override any subset of it without a rebuild.

use std::path::Path;

use scraper::Selector;
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum RecipeError {
    #[error("Failed to read recipe file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse recipe file: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid selector '{selector}' in {field}: {reason}")]
    Selector {
        field: &'static str,
        selector: String,
        reason: String,
    },
    #[error("Invalid value for {field}: {reason}")]
    Invalid {
        field: &'static str,
        reason: &'static str,
    },
}

const DESKTOP_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/95.0.4638.69 Safari/537.36";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NbcColumns {
    pub currency: usize,
    pub symbol: usize,
    pub unit: usize,
    pub bid: usize,
    pub ask: usize,
}

impl Default for NbcColumns {
    fn default() -> Self {
        Self {
            currency: 0,
            symbol: 1,
            unit: 2,
            bid: 3,
            ask: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NbcRecipe {
    pub url: String,
    pub user_agent: Option<String>,
    /// Date input that receives the `YYYY-MM-DD` filter.
    pub date_input: String,
    pub submit: String,
    pub ready_selector: String,
    /// Rows of the rate table, header row included.
    pub row_selector: String,
    pub columns: NbcColumns,
    pub official_rate_label: String,
}

impl Default for NbcRecipe {
    fn default() -> Self {
        Self {
            url: "https://www.nbc.gov.kh/english/economic_research/exchange_rate.php".into(),
            user_agent: Some(DESKTOP_USER_AGENT.into()),
            date_input: "#datepicker".into(),
            submit: r#"input[name="view"]"#.into(),
            ready_selector: "table.tbl-responsive".into(),
            row_selector: "table.tbl-responsive tr".into(),
            columns: NbcColumns::default(),
            official_rate_label: "Official Exchange Rate".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NssfRecipe {
    pub url: String,
    pub ready_selector: String,
    pub link_selector: String,
    pub month_token: usize,
    pub year_token: usize,
    /// Position of the rate counted from the end of the sentence, 1 being
    /// the last word.
    pub rate_token_from_end: usize,
}

impl Default for NssfRecipe {
    fn default() -> Self {
        let link_selector =
            "div.nssf-blockcontent > div > ul > li:nth-child(1) > a:nth-child(3)".to_string();
        Self {
            url: "https://www.nssf.gov.kh/language/en".into(),
            ready_selector: link_selector.clone(),
            link_selector,
            month_token: 2,
            year_token: 3,
            rate_token_from_end: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaxRecipe {
    pub url: String,
    pub ready_selector: String,
    pub current_date_selector: String,
    pub current_rate_selector: String,
    pub history_row_selector: String,
    pub date_column: usize,
    pub symbol_column: usize,
    pub rate_column: usize,
}

impl Default for TaxRecipe {
    fn default() -> Self {
        Self {
            url: "https://www.tax.gov.kh/en/exchange-rate".into(),
            ready_selector: ".moul".into(),
            current_date_selector: ".current-date".into(),
            current_rate_selector: ".moul".into(),
            history_row_selector: "#data-container tr".into(),
            date_column: 0,
            symbol_column: 1,
            rate_column: 2,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Recipes {
    pub nbc: NbcRecipe,
    pub nssf: NssfRecipe,
    pub tax: TaxRecipe,
}

impl Recipes {
    pub fn from_json(json: &str) -> Result<Self, RecipeError> {
        let recipes: Recipes = serde_json::from_str(json)?;
        recipes.validate()
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, RecipeError> {
        let path = path.as_ref();
        log::info!("Loading extraction recipes from {}", path.display());
        let json = std::fs::read_to_string(path).map_err(|source| RecipeError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&json)
    }

    /// Checks every selector up front so a bad override fails at start-up
    /// instead of on the first request.
    pub fn validate(self) -> Result<Self, RecipeError> {
        let selectors: [(&'static str, &str); 10] = [
            ("nbc.date_input", &self.nbc.date_input),
            ("nbc.submit", &self.nbc.submit),
            ("nbc.ready_selector", &self.nbc.ready_selector),
            ("nbc.row_selector", &self.nbc.row_selector),
            ("nssf.ready_selector", &self.nssf.ready_selector),
            ("nssf.link_selector", &self.nssf.link_selector),
            ("tax.ready_selector", &self.tax.ready_selector),
            ("tax.current_date_selector", &self.tax.current_date_selector),
            ("tax.current_rate_selector", &self.tax.current_rate_selector),
            ("tax.history_row_selector", &self.tax.history_row_selector),
        ];
        for (field, selector) in selectors {
            parse_selector(field, selector)?;
        }
        if self.nssf.rate_token_from_end == 0 {
            return Err(RecipeError::Invalid {
                field: "nssf.rate_token_from_end",
                reason: "must be at least 1",
            });
        }
        Ok(self)
    }
}

pub(crate) fn parse_selector(field: &'static str, selector: &str) -> Result<Selector, RecipeError> {
    Selector::parse(selector).map_err(|e| RecipeError::Selector {
        field,
        selector: selector.to_string(),
        reason: e.to_string(),
    })
}
