//! Polls aggregator RSS feeds and scrapes the cluster ("all sources") pages
//! they lead to, yielding one [`ClusterBatch`] per distinct event.

use std::io::Cursor;

use chrono::NaiveDate;
use scraper::{Html, Selector};
use tracing::{debug, error, info, warn};
use url::Url;

use super::client::{create_http_client, fetch_text, retry_on_block};
use super::{ClusterBatch, FeedConfig, FeedError};
use crate::dates::parse_published;
use crate::model::RawItem;
use crate::TARGET_WEB_REQUEST;

/// Anchor text that marks the link from a single article to the page
/// listing every publisher covering the same event.
const ALL_SOURCES_MARKER: &str = "All sources";

const HEADLINE_SELECTOR: &str = "h1.story-head";
const TOPIC_SELECTOR: &str = "li.tab-active";
const ITEM_SELECTOR: &str = "div.story-doc";
const ITEM_TITLE_SELECTOR: &str = "h2.doc-title";
const ITEM_TEXT_SELECTOR: &str = "div.doc-content";
const ITEM_PUBLISHER_SELECTOR: &str = "div.doc-agency";
const ITEM_TIME_SELECTOR: &str = "div.doc-time";

pub struct RssFeedSource {
    client: reqwest::Client,
    config: FeedConfig,
}

impl RssFeedSource {
    pub fn new(config: FeedConfig) -> Result<Self, FeedError> {
        let client = create_http_client(&config.fetch)?;
        Ok(RssFeedSource { client, config })
    }

    /// Run one polling pass over every configured feed. A failing feed is
    /// logged and skipped; one bad feed must not starve the rest.
    pub async fn poll(&self) -> Vec<ClusterBatch> {
        let mut batches = Vec::new();
        for feed_url in &self.config.feeds {
            info!(target: TARGET_WEB_REQUEST, "Polling feed {}", feed_url);
            match self.poll_feed(feed_url).await {
                Ok(mut found) => {
                    info!(
                        target: TARGET_WEB_REQUEST,
                        "Feed {} yielded {} cluster batches", feed_url, found.len()
                    );
                    batches.append(&mut found);
                }
                Err(err) => {
                    error!(target: TARGET_WEB_REQUEST, "Feed {} failed: {}", feed_url, err);
                }
            }
        }
        batches
    }

    async fn poll_feed(&self, feed_url: &str) -> Result<Vec<ClusterBatch>, FeedError> {
        let body = fetch_text(&self.client, &self.config.fetch, feed_url).await?;
        let feed = feed_rs::parser::parse(Cursor::new(body.into_bytes()))?;

        let mut batches = Vec::new();
        for entry in feed.entries {
            let Some(link) = entry.links.first() else {
                continue;
            };
            let article_url = link.href.clone();
            if Url::parse(&article_url).is_err() {
                debug!(target: TARGET_WEB_REQUEST, "Skipping invalid entry link: {}", article_url);
                continue;
            }
            match self.scrape_cluster(&article_url).await {
                Ok(Some(batch)) => batches.push(batch),
                Ok(None) => {}
                Err(err) => {
                    warn!(
                        target: TARGET_WEB_REQUEST,
                        "Skipping entry {}: {}", article_url, err
                    );
                }
            }
        }
        Ok(batches)
    }

    /// Follow one feed entry to its article page, then on to the cluster
    /// page, and scrape that into a batch.
    async fn scrape_cluster(&self, article_url: &str) -> Result<Option<ClusterBatch>, FeedError> {
        let fetch = &self.config.fetch;
        let article_html = retry_on_block(fetch, || {
            fetch_text(&self.client, fetch, article_url)
        })
        .await?;

        let Some(href) = find_cluster_link(&article_html) else {
            warn!(
                target: TARGET_WEB_REQUEST,
                "No '{}' link on {}", ALL_SOURCES_MARKER, article_url
            );
            return Ok(None);
        };
        let cluster_url = match Url::parse(article_url).and_then(|base| base.join(&href)) {
            Ok(resolved) => resolved.to_string(),
            Err(err) => {
                warn!(
                    target: TARGET_WEB_REQUEST,
                    "Unresolvable cluster link '{}' on {}: {}", href, article_url, err
                );
                return Ok(None);
            }
        };

        let cluster_html = retry_on_block(fetch, || {
            fetch_text(&self.client, fetch, &cluster_url)
        })
        .await?;

        let today = chrono::Local::now().date_naive();
        Ok(parse_cluster_page(&cluster_html, today))
    }
}

fn element_text(el: scraper::ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

/// Locate the href of the "all sources" link on a single-article page.
pub(crate) fn find_cluster_link(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let anchors = Selector::parse("a").unwrap();
    document
        .select(&anchors)
        .find(|a| element_text(*a).contains(ALL_SOURCES_MARKER))
        .and_then(|a| a.value().attr("href").map(str::to_string))
}

/// Scrape a cluster page into a batch: the headline becomes the proposed
/// label, each publisher block one raw item. Blocks missing a title or text
/// are dropped with a warning; a page without a headline yields nothing.
pub(crate) fn parse_cluster_page(html: &str, today: NaiveDate) -> Option<ClusterBatch> {
    let document = Html::parse_document(html);
    let headline_sel = Selector::parse(HEADLINE_SELECTOR).unwrap();
    let topic_sel = Selector::parse(TOPIC_SELECTOR).unwrap();
    let item_sel = Selector::parse(ITEM_SELECTOR).unwrap();
    let title_sel = Selector::parse(ITEM_TITLE_SELECTOR).unwrap();
    let text_sel = Selector::parse(ITEM_TEXT_SELECTOR).unwrap();
    let publisher_sel = Selector::parse(ITEM_PUBLISHER_SELECTOR).unwrap();
    let time_sel = Selector::parse(ITEM_TIME_SELECTOR).unwrap();

    let label = document.select(&headline_sel).next().map(element_text)?;
    if label.is_empty() {
        return None;
    }
    let topic = document
        .select(&topic_sel)
        .next()
        .map(element_text)
        .filter(|t| !t.is_empty());

    let mut items = Vec::new();
    for block in document.select(&item_sel) {
        let title = block.select(&title_sel).next().map(element_text);
        let text = block.select(&text_sel).next().map(element_text);
        let (Some(title), Some(text)) = (title, text) else {
            warn!(target: TARGET_WEB_REQUEST, "Malformed item block under '{}', ignoring", label);
            continue;
        };
        if title.is_empty() || text.is_empty() {
            warn!(target: TARGET_WEB_REQUEST, "Empty item block under '{}', ignoring", label);
            continue;
        }

        let published_at = block
            .select(&time_sel)
            .next()
            .map(element_text)
            .and_then(|stamp| parse_published(&stamp, today));
        let publisher = block
            .select(&publisher_sel)
            .next()
            .map(element_text)
            .filter(|p| !p.is_empty());

        items.push(RawItem {
            title,
            text,
            topic: topic.clone(),
            published_at,
            publisher,
        });
    }

    Some(ClusterBatch { label, items })
}
