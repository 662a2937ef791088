//! Candidate URI sources
//!
//! URIs come from two places: fixed banks of public subscription URLs
//! fetched over HTTP, and messaging channels pulled through the host's
//! gateway.

mod banks;
mod channels;
mod fetcher;

pub use banks::{
    random_user_agent, Bank, ANTI_CENSORSHIP_BANK, GENERAL_BANK, REGION_PRIORITY_BANK,
    SUBSCRIPTION_BANK,
};
pub use channels::ChannelScraper;
pub use fetcher::SourceFetcher;
