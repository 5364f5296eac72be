pub mod career_page;
pub mod rules;

pub use career_page::{BrowserFetcher, CareerPage, PageFetcher, USER_AGENT};
