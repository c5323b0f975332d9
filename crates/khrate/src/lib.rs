pub mod browser;
mod parser;
pub mod recipe;
pub mod scraper;
pub mod types;
pub mod utils;

pub use parser::ExtractError;
pub use recipe::Recipes;
pub use scraper::{RateScraper, ScraperError, ScraperSettings};
