//! Lookup of the developer in open sources to give the model more context.
use crate::http::HttpClientError;
use crate::prelude::*;
use async_trait::async_trait;
use lazy_regex::regex;
use scraper::{Html, Selector};
use serde::Deserialize;

/// Replaces the lookup result when anything goes wrong with it
pub(crate) const LOOKUP_UNAVAILABLE: &str = "Сведения о бенефициаре недоступны";

#[derive(Deserialize, Clone, Debug)]
pub(crate) struct LookupConfig {
    #[serde(default)]
    pub(crate) enabled: bool,

    #[serde(default = "default_search_url")]
    pub(crate) search_url: url::Url,

    #[serde(default = "default_max_chars")]
    pub(crate) max_chars: usize,
}

fn default_search_url() -> url::Url {
    "https://html.duckduckgo.com/html/"
        .parse()
        .expect("BUG: invalid default search URL")
}

fn default_max_chars() -> usize {
    4000
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum LookupError {
    #[error("No identifier could be extracted from the developer info")]
    NoIdentifier,

    #[error("Search returned no results for `{query}`")]
    NoResults { query: String },

    #[error("Search result has no text")]
    EmptyPage,

    #[error("Search result URL is invalid: {href}")]
    InvalidResultUrl { href: String },

    #[error(transparent)]
    Http {
        #[from]
        source: HttpClientError,
    },
}

/// What identifies the developer, most specific first
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Identifier {
    /// Taxpayer id, 10 digits for companies, 12 for individuals
    Inn(String),
    /// State registration number, 13 digits for companies, 15 for individuals
    Ogrn(String),
    Name(String),
}

impl Identifier {
    pub(crate) fn search_query(&self) -> String {
        match self {
            Self::Inn(inn) => format!("ИНН {inn}"),
            Self::Ogrn(ogrn) => format!("ОГРН {ogrn}"),
            Self::Name(name) => name.clone(),
        }
    }
}

pub(crate) fn extract_identifier(developer: &str) -> Option<Identifier> {
    let inn = regex!(r"(?i)инн\D{0,3}(\d{12}|\d{10})(?:\D|$)");
    if let Some(captures) = inn.captures(developer) {
        return Some(Identifier::Inn(captures[1].to_owned()));
    }

    let ogrn = regex!(r"(?i)огрн(?:ип)?\D{0,3}(\d{15}|\d{13})(?:\D|$)");
    if let Some(captures) = ogrn.captures(developer) {
        return Some(Identifier::Ogrn(captures[1].to_owned()));
    }

    let name = developer
        .split(|c| c == '(' || c == ',')
        .next()
        .unwrap_or_default()
        .trim();

    (!name.is_empty()).then(|| Identifier::Name(name.to_owned()))
}

#[async_trait]
pub(crate) trait BeneficiaryLookup: Send + Sync {
    /// Plain text about the developer, at most the configured number of chars
    async fn lookup(&self, developer: &str) -> Result<String, LookupError>;
}

/// Searches the web through an HTML search page and reads the first result.
pub(crate) struct WebLookup {
    http: crate::http::Client,
    search_url: url::Url,
    max_chars: usize,
}

impl WebLookup {
    pub(crate) fn new(http: crate::http::Client, config: &LookupConfig) -> Self {
        Self {
            http,
            search_url: config.search_url.clone(),
            max_chars: config.max_chars,
        }
    }
}

#[async_trait]
impl BeneficiaryLookup for WebLookup {
    #[instrument(skip_all)]
    async fn lookup(&self, developer: &str) -> Result<String, LookupError> {
        let query = extract_identifier(developer)
            .ok_or(LookupError::NoIdentifier)?
            .search_query();

        let search_page = self
            .http
            .get(self.search_url.clone())
            .query(&[("q", query.as_str())])
            .read_text()
            .await?;

        let href = first_result_href(&search_page)
            .ok_or_else(|| LookupError::NoResults { query: query.clone() })?;

        let url = resolve_result_url(&href)?;

        debug!(%query, %url, "Reading the top search result");

        let page = self.http.get(url).read_text().await?;

        let text = html_to_text(&page);
        if text.is_empty() {
            return Err(LookupError::EmptyPage);
        }

        Ok(text.truncate_chars(self.max_chars).to_owned())
    }
}

fn first_result_href(search_page: &str) -> Option<String> {
    let selector = Selector::parse("a.result__a").expect("BUG: invalid result selector");
    Html::parse_document(search_page)
        .select(&selector)
        .find_map(|link| link.value().attr("href").map(ToOwned::to_owned))
}

/// Search result links are redirects with the real URL in the `uddg` param
fn resolve_result_url(href: &str) -> Result<url::Url, LookupError> {
    let invalid = || LookupError::InvalidResultUrl {
        href: href.to_owned(),
    };

    let absolute = if href.starts_with("//") {
        format!("https:{href}")
    } else {
        href.to_owned()
    };

    let url = url::Url::parse(&absolute).map_err(|_| invalid())?;

    let target = url
        .query_pairs()
        .find(|(key, _)| key == "uddg")
        .map(|(_, value)| value.into_owned());

    match target {
        Some(target) => url::Url::parse(&target).map_err(|_| invalid()),
        None => Ok(url),
    }
}

/// Visible text of the page with whitespace collapsed
pub(crate) fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);

    let words: Vec<&str> = document
        .root_element()
        .descendants()
        .filter_map(|node| {
            let text = node.value().as_text()?;
            let hidden = node.ancestors().any(|ancestor| {
                ancestor.value().as_element().map_or(false, |element| {
                    matches!(element.name(), "script" | "style" | "noscript" | "head")
                })
            });
            (!hidden).then_some(&**text)
        })
        .flat_map(str::split_whitespace)
        .collect();

    words.join(" ")
}
