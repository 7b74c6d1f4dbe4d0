use scraper::{ElementRef, Html, Selector};
use url::Url;

use super::{ApiError, endpoint};

/// Results kept per search.
pub const MAX_RESULTS: usize = 5;

/// One organic web result.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SearchResult {
    /// The page title.
    pub title: String,
    /// The snippet shown under the title.
    pub body: String,
    /// The target URL.
    pub href: String,
}

/// Keyless web search through the DuckDuckGo HTML endpoint.
#[derive(Clone, Debug)]
pub struct DuckDuckGo {
    client: reqwest::Client,
    base_url: String,
}

impl DuckDuckGo {
    /// Creates a client for the HTML endpoint at `base_url`.
    pub fn new(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.to_owned(),
        }
    }

    /// Returns at most [`MAX_RESULTS`] results for `query`.
    pub async fn search(&self, query: &str) -> Result<Vec<SearchResult>, ApiError> {
        let url = endpoint(&self.base_url, "/html/", &[("q", query)])?;
        debug!("searching the web for {query:?}");
        let html = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok(parse_results(&html, MAX_RESULTS))
    }
}

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("selector literal is valid")
}

pub(crate) fn parse_results(html: &str, max: usize) -> Vec<SearchResult> {
    let document = Html::parse_document(html);
    let result = selector("div.result:not(.result--ad)");
    let title = selector("a.result__a");
    let snippet = selector(".result__snippet");

    document
        .select(&result)
        .filter_map(|element| {
            let link = element.select(&title).next()?;
            let href = decode_href(link.value().attr("href")?);
            let body = element
                .select(&snippet)
                .next()
                .map(|s| squash_text(&s))
                .unwrap_or_default();
            Some(SearchResult {
                title: squash_text(&link),
                body,
                href,
            })
        })
        .take(max)
        .collect()
}

fn squash_text(element: &ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(|text| text.split_whitespace())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Unwraps `//duckduckgo.com/l/?uddg=<target>` redirect links.
fn decode_href(href: &str) -> String {
    let absolute = if href.starts_with("//") {
        format!("https:{href}")
    } else {
        href.to_owned()
    };
    let Ok(url) = Url::parse(&absolute) else {
        return href.to_owned();
    };
    url.query_pairs()
        .find(|(key, _)| key == "uddg")
        .map(|(_, target)| target.into_owned())
        .unwrap_or(absolute)
}
