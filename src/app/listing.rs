//! Remote archive listing
//!
//! Reads the origin's index page to find out which daily archives actually
//! exist and roughly how large they are. Fetched through the paced client,
//! so it obeys the same pacing and backoff as archive downloads.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info};
use url::Url;

use crate::app::client::PacedClient;
use crate::app::models::{parse_archive_file_name, TransferTask};
use crate::constants::origin;
use crate::errors::{ListingError, ListingResult, TransferError};

const LINK_SELECTOR: &str = "a[href]";

/// One archive advertised by the index page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteListing {
    /// File name, e.g. `2021-01-01sgfs.tar.bz2`
    pub name: String,
    /// Date parsed from the name, if it follows the usual pattern
    pub date: Option<NaiveDate>,
    pub url: Url,
    /// Size advertised next to the link, e.g. `[12M]`
    pub size_hint: Option<u64>,
}

/// Fetch and parse the index page under the client's origin
pub async fn fetch_listing(client: &mut PacedClient) -> ListingResult<Vec<RemoteListing>> {
    let base_url = client.base_url().clone();
    let index_url = base_url
        .join(origin::INDEX_PAGE)
        .map_err(|e| TransferError::InvalidUrl {
            url: format!("{}{}", base_url, origin::INDEX_PAGE),
            error: e.to_string(),
        })?;

    info!("Fetching archive index {}", index_url);
    let html = client.fetch_text(&index_url).await?;
    let listings = parse_index(&html, &base_url)?;
    info!("Origin lists {} archives", listings.len());
    Ok(listings)
}

/// Extract archive links from an index page, sorted by name
pub fn parse_index(html: &str, base_url: &Url) -> ListingResult<Vec<RemoteListing>> {
    let document = Html::parse_document(html);
    let selector = Selector::parse(LINK_SELECTOR).map_err(|_| ListingError::InvalidSelector {
        selector: LINK_SELECTOR.to_string(),
    })?;

    let mut by_name = BTreeMap::new();
    for element in document.select(&selector) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        if !href.ends_with(".tar.bz2") || !href.contains("sgfs") {
            continue;
        }

        let name = href.rsplit('/').next().unwrap_or(href).to_string();
        let Ok(url) = base_url.join(href) else {
            debug!("Skipping unresolvable link {}", href);
            continue;
        };

        by_name.entry(name.clone()).or_insert_with(|| RemoteListing {
            date: parse_archive_file_name(&name),
            size_hint: size_hint_before(element).and_then(|s| parse_size(&s)),
            name,
            url,
        });
    }

    Ok(by_name.into_values().collect())
}

/// Bracketed text immediately preceding a link
fn size_hint_before(element: ElementRef<'_>) -> Option<String> {
    let sibling = element.prev_sibling()?;
    let text = match sibling.value().as_text() {
        Some(text) => text.to_string(),
        None => ElementRef::wrap(sibling)?.text().collect::<String>(),
    };

    let open = text.find('[')?;
    let close = open + text[open..].find(']')?;
    Some(text[open + 1..close].to_string())
}

/// Parse a human size such as `12M`, `850K` or `1.5G` into bytes
pub fn parse_size(value: &str) -> Option<u64> {
    let cleaned = value
        .replace("&nbsp;", "")
        .replace('\u{a0}', "")
        .trim()
        .to_uppercase();
    let cleaned = cleaned.strip_suffix('B').unwrap_or(&cleaned);

    let (number, multiplier) = match cleaned.chars().last()? {
        'G' => (&cleaned[..cleaned.len() - 1], 1024.0 * 1024.0 * 1024.0),
        'M' => (&cleaned[..cleaned.len() - 1], 1024.0 * 1024.0),
        'K' => (&cleaned[..cleaned.len() - 1], 1024.0),
        _ => (cleaned, 1.0),
    };

    let number: f64 = number.trim().parse().ok()?;
    if !number.is_finite() || number < 0.0 {
        return None;
    }
    Some((number * multiplier).round() as u64)
}

/// Dates the origin advertises
pub fn listed_dates(listings: &[RemoteListing]) -> BTreeSet<NaiveDate> {
    listings.iter().filter_map(|l| l.date).collect()
}

/// Drop tasks whose archive the origin does not list
pub fn retain_listed(tasks: Vec<TransferTask>, listings: &[RemoteListing]) -> Vec<TransferTask> {
    let dates = listed_dates(listings);
    let before = tasks.len();
    let kept: Vec<TransferTask> = tasks
        .into_iter()
        .filter(|t| dates.contains(&t.date))
        .collect();
    if kept.len() < before {
        info!(
            "Skipping {} dates the origin does not list",
            before - kept.len()
        );
    }
    kept
}

/// Sum of advertised sizes
pub fn total_size_hint(listings: &[RemoteListing]) -> u64 {
    listings.iter().filter_map(|l| l.size_hint).sum()
}
