//! Finding the items of a listing page.
//!
//! Each [`SelectorStrategy`] is a pure extractor over the page HTML. All of
//! them run against the same document and the largest deduplicated result
//! wins, so no single layout has to be right.

use crate::error::{HarvestError, Interrupted, Result};
use crate::state::Item;
use crate::walker::Worker;
use gleaner_browser::{ContextHandle, Extraction};
use gleaner_core::{HarvestConfig, ListingSelector, SelectorConfig};
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use std::time::Duration;
use url::Url;

/// Display name used when no name selector matches.
pub const UNKNOWN_NAME: &str = "Unknown";

fn parse_selector(selector: &str) -> Result<Selector> {
    Selector::parse(selector).map_err(|e| HarvestError::InvalidSelector {
        selector: selector.to_string(),
        reason: e.to_string(),
    })
}

/// Resolve `href` against `base`, keeping only http(s) targets.
pub fn resolve_link(base: &Url, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }
    let mut url = base.join(href).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    url.set_fragment(None);
    Some(url.into())
}

/// One ranked way of locating items: an item selector plus the selector of
/// the item's link inside it.
#[derive(Debug, Clone)]
pub struct SelectorStrategy {
    item: Selector,
    link: Selector,
}

impl SelectorStrategy {
    pub fn parse(definition: &ListingSelector) -> Result<Self> {
        Ok(Self {
            item: parse_selector(&definition.item)?,
            link: parse_selector(&definition.link)?,
        })
    }

    /// Items found by this strategy, deduplicated by URL in document order.
    pub fn candidates(&self, document: &Html, base: &Url, names: &[Selector], page: u32) -> Vec<Item> {
        let mut seen = HashSet::new();
        let mut items = Vec::new();

        for element in document.select(&self.item) {
            let Some(url) = element
                .select(&self.link)
                .filter_map(|anchor| anchor.value().attr("href"))
                .find_map(|href| resolve_link(base, href))
            else {
                continue;
            };
            if !seen.insert(url.clone()) {
                continue;
            }
            items.push(Item::new(url, extract_name(&element, names), page));
        }

        items
    }
}

fn extract_name(element: &ElementRef<'_>, names: &[Selector]) -> String {
    names
        .iter()
        .filter_map(|selector| element.select(selector).next())
        .map(|el| el.text().collect::<String>().trim().to_string())
        .find(|name| !name.is_empty())
        .unwrap_or_else(|| UNKNOWN_NAME.to_string())
}

/// Ranked structural heuristics for listing and profile pages.
#[derive(Debug, Clone)]
pub struct Discovery {
    strategies: Vec<SelectorStrategy>,
    names: Vec<Selector>,
    document_links: Vec<Selector>,
    expected_page_size: usize,
    max_escalation_rounds: u32,
    escalation_settle: Duration,
}

impl Discovery {
    pub fn new(selectors: &SelectorConfig, harvest: &HarvestConfig) -> Result<Self> {
        let strategies = selectors
            .listing
            .iter()
            .map(SelectorStrategy::parse)
            .collect::<Result<Vec<_>>>()?;
        let names = selectors
            .name
            .iter()
            .map(|s| parse_selector(s))
            .collect::<Result<Vec<_>>>()?;
        let document_links = selectors
            .document_link
            .iter()
            .map(|s| parse_selector(s))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            strategies,
            names,
            document_links,
            expected_page_size: harvest.expected_page_size,
            max_escalation_rounds: harvest.max_escalation_rounds,
            escalation_settle: harvest.escalation_settle(),
        })
    }

    /// Best-effort item set of a listing page.
    ///
    /// The strategy yielding the most distinct URLs wins; earlier strategies
    /// win ties.
    pub fn extract(&self, html: &str, base: &Url, page: u32) -> Vec<Item> {
        let document = Html::parse_document(html);
        let mut best: Vec<Item> = Vec::new();
        for (rank, strategy) in self.strategies.iter().enumerate() {
            let candidates = strategy.candidates(&document, base, &self.names, page);
            tracing::trace!(rank, found = candidates.len(), "Listing strategy evaluated");
            if candidates.len() > best.len() {
                best = candidates;
            }
        }
        best
    }

    /// First document link found by the ranked selectors on a profile page.
    pub fn find_document_link(&self, html: &str, base: &Url) -> Option<String> {
        let document = Html::parse_document(html);
        self.document_links.iter().find_map(|selector| {
            document
                .select(selector)
                .filter_map(|anchor| anchor.value().attr("href"))
                .find_map(|href| resolve_link(base, href))
        })
    }

    /// Whether `count` items is fewer than a full page is expected to hold.
    pub fn is_short(&self, count: usize) -> bool {
        count < self.expected_page_size
    }
}

impl Worker {
    /// Items of the page loaded in `listing`, escalating with scrolls while
    /// the page looks short.
    ///
    /// Never fails: a page that cannot be read yields no items.
    pub(crate) async fn discover(
        &self,
        listing: &ContextHandle,
        page_url: &Url,
        page: u32,
    ) -> std::result::Result<Vec<Item>, Interrupted> {
        let mut best = self.scan_listing(listing, page_url, page).await?;
        let scroll = Extraction::ScrollToEnd;

        let mut round = 0;
        while self.discovery.is_short(best.len()) && round < self.discovery.max_escalation_rounds {
            round += 1;
            tracing::debug!(page, round, found = best.len(), "Page looks short; scrolling for more");

            let scrolled = self
                .retrier
                .with_retry(&self.guard, "scroll listing", || {
                    self.contexts.run_extraction(listing, &scroll)
                })
                .await;
            self.guard.checkpoint().await?;
            if scrolled.is_none() {
                break;
            }
            self.guard.sleep(self.discovery.escalation_settle).await?;

            let again = self.scan_listing(listing, page_url, page).await?;
            if again.len() > best.len() {
                best = again;
            }
        }

        tracing::info!(page, found = best.len(), "Discovery finished");
        Ok(best)
    }

    async fn scan_listing(
        &self,
        listing: &ContextHandle,
        page_url: &Url,
        page: u32,
    ) -> std::result::Result<Vec<Item>, Interrupted> {
        let content = Extraction::PageContent;
        let html = self
            .retrier
            .with_retry(&self.guard, "read listing page", || async {
                self.contexts
                    .run_extraction(listing, &content)
                    .await?
                    .into_html()
            })
            .await;
        self.guard.checkpoint().await?;

        Ok(html
            .map(|html| self.discovery.extract(&html, page_url, page))
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://www.linkedin.com/hiring/jobs/1/applicants/?start=0").unwrap()
    }

    fn discovery() -> Discovery {
        Discovery::new(&SelectorConfig::default(), &HarvestConfig::default()).unwrap()
    }

    fn listing(items: &[(&str, Option<&str>)]) -> String {
        let body: String = items
            .iter()
            .map(|(href, name)| {
                let name = name
                    .map(|n| format!("<span class=\"artdeco-entity-lockup__title\">{n}</span>"))
                    .unwrap_or_default();
                format!("<li class=\"hiring-applicants__list-item\"><a href=\"{href}\">{name}</a></li>")
            })
            .collect();
        format!("<html><body><ul>{body}</ul></body></html>")
    }

    #[test]
    fn test_extracts_items_with_names() {
        let html = listing(&[
            ("/hiring/applicants/1/detail/", Some("Ada Lovelace")),
            ("/hiring/applicants/2/detail/", Some("  Grace Hopper ")),
        ]);

        let items = discovery().extract(&html, &base(), 1);

        assert_eq!(items.len(), 2);
        assert_eq!(
            items[0].url,
            "https://www.linkedin.com/hiring/applicants/1/detail/"
        );
        assert_eq!(items[0].display_name, "Ada Lovelace");
        assert_eq!(items[1].display_name, "Grace Hopper");
        assert_eq!(items[1].discovered_on_page, 1);
    }

    #[test]
    fn test_missing_name_uses_sentinel() {
        let html = listing(&[("/hiring/applicants/1/detail/", None)]);
        let items = discovery().extract(&html, &base(), 3);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].display_name, UNKNOWN_NAME);
    }

    #[test]
    fn test_duplicates_and_non_http_links_are_dropped() {
        let html = listing(&[
            ("/hiring/applicants/1/detail/", Some("A")),
            ("/hiring/applicants/1/detail/#top", Some("A again")),
            ("javascript:void(0)", Some("B")),
            ("mailto:someone@example.com", Some("C")),
        ]);
        let items = discovery().extract(&html, &base(), 1);
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn test_largest_strategy_wins() {
        let selectors = SelectorConfig {
            listing: vec![
                ListingSelector::new(".first", "a"),
                ListingSelector::new(".second", "a"),
            ],
            ..SelectorConfig::default()
        };
        let discovery = Discovery::new(&selectors, &HarvestConfig::default()).unwrap();
        let html = r#"
            <div class="first"><a href="/p/1">one</a></div>
            <div class="second"><a href="/p/2">two</a></div>
            <div class="second"><a href="/p/3">three</a></div>
        "#;

        let items = discovery.extract(html, &base(), 1);
        let urls: Vec<_> = items.iter().map(|i| i.url.as_str()).collect();
        assert_eq!(
            urls,
            vec!["https://www.linkedin.com/p/2", "https://www.linkedin.com/p/3"]
        );
    }

    #[test]
    fn test_earlier_strategy_wins_ties() {
        let selectors = SelectorConfig {
            listing: vec![
                ListingSelector::new(".first", "a"),
                ListingSelector::new(".second", "a"),
            ],
            ..SelectorConfig::default()
        };
        let discovery = Discovery::new(&selectors, &HarvestConfig::default()).unwrap();
        let html = r#"
            <div class="first"><a href="/p/1">one</a></div>
            <div class="second"><a href="/p/2">two</a></div>
        "#;

        let items = discovery.extract(html, &base(), 1);
        assert_eq!(items[0].url, "https://www.linkedin.com/p/1");
    }

    #[test]
    fn test_empty_document_yields_nothing() {
        assert!(discovery().extract("<html></html>", &base(), 1).is_empty());
    }

    #[test]
    fn test_finds_document_link_by_rank() {
        let html = r#"
            <a download href="/fallback.pdf">fallback</a>
            <div class="hiring-resume-viewer__resume-wrapper"><a href="/ambry/resume-1">Resume</a></div>
        "#;
        let profile = Url::parse("https://www.linkedin.com/hiring/applicants/1/detail/").unwrap();

        let link = discovery().find_document_link(html, &profile);
        assert_eq!(link.as_deref(), Some("https://www.linkedin.com/ambry/resume-1"));
    }

    #[test]
    fn test_no_document_link() {
        let profile = Url::parse("https://www.linkedin.com/hiring/applicants/1/detail/").unwrap();
        assert!(discovery()
            .find_document_link("<p>No resume</p>", &profile)
            .is_none());
    }

    #[test]
    fn test_invalid_selector_is_rejected() {
        let selectors = SelectorConfig {
            name: vec!["[[".to_string()],
            ..SelectorConfig::default()
        };
        let err = Discovery::new(&selectors, &HarvestConfig::default()).unwrap_err();
        assert!(matches!(err, HarvestError::InvalidSelector { .. }));
    }

    #[test]
    fn test_is_short() {
        let discovery = discovery();
        assert!(discovery.is_short(24));
        assert!(!discovery.is_short(25));
    }
}
