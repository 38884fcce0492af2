//! Page scrapers shared by every configured source.
//!
//! Scraping follows the same two phases for each source:
//!
//! 1. **Indexing**: [`index::find_latest_article`] picks the newest article
//!    link from the source's index page
//! 2. **Fetching**: [`article::fetch_article`] downloads that article and
//!    extracts its title and body
//!
//! Both are driven by ordered selector chains from [`crate::selectors`], so a
//! new site is a configuration entry rather than a new module. A chain that
//! finds nothing yields `Ok(None)`; only transport failures are errors.

pub mod article;
pub mod index;
