//! Collect-and-summarize consumer: crawl GitHub trending, then summarize it.

use super::llm::LanguageModel;
use crate::core::Message;
use crate::errors::{PipelineValidationError, Result, StageError, SubflowError};
use crate::pipeline::{OrderedPipeline, PipelineBuilder};
use crate::stages::{InputMode, Stage};
use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Placeholder for stars or forks that could not be read.
pub const NOT_AVAILABLE: &str = "N/A";

/// Prompt used by [`SummarizeTrendingStage`]. `{trending}` is replaced by the
/// repository listing.
pub const TRENDING_ANALYSIS_PROMPT: &str = r"# Requirements
You are a GitHub Trending Analyst, aiming to provide users with insightful and personalized recommendations based on the latest
GitHub Trends. Based on the context, fill in the following missing information, generate engaging and informative titles,
ensuring users discover repositories aligned with their interests.

# The title about Today's GitHub Trending
## Today's Trends: Uncover the Hottest GitHub Projects Today! Explore the trending programming languages and discover key domains capturing developers' attention. From ** to **, witness the top projects like never before.
## The Trends Categories: Dive into Today's GitHub Trending Domains! Explore featured projects in domains such as ** and **. Get a quick overview of each project, including programming languages, stars, and more.
## Highlights of the List: Spotlight noteworthy projects on GitHub Trending, including new tools, innovative projects, and rapidly gaining popularity, focusing on delivering distinctive and attention-grabbing content for users.
---
# Format Example


# [Title]

## Today's Trends
Today, ** and ** continue to dominate as the most popular programming languages. Key areas of interest include **, ** and **.
The top popular projects are Project1 and Project2.

## The Trends Categories
1. Generative AI
    - [Project1](https://github/xx/project1): [detail of the project, such as star total and today, language, ...]
    - [Project2](https://github/xx/project2): ...
...

## Highlights of the List
1. [Project1](https://github/xx/project1): [provide specific reasons why this project is recommended].
...

---
# Github Trending
{trending}
";

/// One entry of the trending page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrendingRepository {
    /// `owner/name`.
    pub name: String,
    /// Absolute repository URL.
    pub url: String,
    /// Repository description.
    pub description: Option<String>,
    /// Primary language.
    pub language: Option<String>,
    /// Total stars as displayed, or `N/A`.
    pub stars: String,
    /// Total forks as displayed, or `N/A`.
    pub forks: String,
    /// Stars gained today, as displayed.
    pub today_stars: Option<String>,
}

struct TrendingSelectors {
    article: Selector,
    title: Selector,
    description: Selector,
    language: Selector,
    muted_link: Selector,
    today_stars: Selector,
}

impl TrendingSelectors {
    fn new() -> std::result::Result<Self, StageError> {
        Ok(Self {
            article: selector("article.Box-row")?,
            title: selector("h2 a")?,
            description: selector("p")?,
            language: selector(r#"span[itemprop="programmingLanguage"]"#)?,
            muted_link: selector("a.Link--muted")?,
            today_stars: selector("span.d-inline-block.float-sm-right")?,
        })
    }
}

fn selector(css: &str) -> std::result::Result<Selector, StageError> {
    Selector::parse(css).map_err(|e| StageError::new("crawl_trending", format!("bad selector {css}: {e}")))
}

fn text_of(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

/// Parses the repository list out of a GitHub trending page.
///
/// Articles without a title link are skipped.
///
/// # Errors
///
/// Only fails if a built-in selector does not parse.
pub fn parse_trending(html: &str) -> std::result::Result<Vec<TrendingRepository>, StageError> {
    let selectors = TrendingSelectors::new()?;
    let document = Html::parse_document(html);

    let repositories = document
        .select(&selectors.article)
        .filter_map(|article| {
            let title = article.select(&selectors.title).next()?;
            let name: String = title.text().collect::<String>().split_whitespace().collect();
            let href = title.value().attr("href").unwrap_or_default().trim();

            let muted: Vec<String> = article.select(&selectors.muted_link).map(text_of).collect();
            let (stars, forks) = match muted.as_slice() {
                [stars, forks, ..] => (stars.clone(), forks.clone()),
                _ => (NOT_AVAILABLE.to_string(), NOT_AVAILABLE.to_string()),
            };

            Some(TrendingRepository {
                name,
                url: format!("https://github.com{href}"),
                description: article.select(&selectors.description).next().map(text_of),
                language: article.select(&selectors.language).next().map(text_of),
                stars,
                forks,
                today_stars: article.select(&selectors.today_stars).next().map(text_of),
            })
        })
        .collect();

    Ok(repositories)
}

/// Retrieves a web page as text.
#[async_trait]
pub trait HtmlFetcher: Send + Sync + Debug {
    /// Fetches `url`.
    ///
    /// # Errors
    ///
    /// Returns a [`StageError`] on transport failures and non-success status.
    async fn fetch(&self, url: &str) -> std::result::Result<String, StageError>;
}

/// HTTP settings for [`HttpFetcher`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Page to crawl.
    #[serde(default = "default_url")]
    pub url: String,
    /// Optional proxy for all requests.
    #[serde(default)]
    pub proxy: Option<String>,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: f64,
    /// User agent string.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_url() -> String {
    "https://github.com/trending".to_string()
}

fn default_timeout() -> f64 {
    30.0
}

fn default_user_agent() -> String {
    concat!("subflow/", env!("CARGO_PKG_VERSION")).to_string()
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            proxy: None,
            timeout_seconds: default_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

impl FetchConfig {
    /// Sets the proxy.
    #[must_use]
    pub fn with_proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    /// Sets the page to crawl.
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }
}

/// [`HtmlFetcher`] backed by reqwest.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Builds the HTTP client.
    ///
    /// # Errors
    ///
    /// Returns [`SubflowError::Config`] for an invalid proxy or timeout.
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let timeout = Duration::try_from_secs_f64(config.timeout_seconds)
            .map_err(|e| SubflowError::Config(format!("timeout_seconds: {e}")))?;
        let mut builder = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(config.user_agent.clone());
        if let Some(proxy) = &config.proxy {
            let proxy = reqwest::Proxy::all(proxy)
                .map_err(|e| SubflowError::Config(format!("proxy {proxy}: {e}")))?;
            builder = builder.proxy(proxy);
        }
        let client = builder
            .build()
            .map_err(|e| SubflowError::Config(format!("http client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HtmlFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> std::result::Result<String, StageError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| StageError::from_error("crawl_trending", e))?;
        response
            .text()
            .await
            .map_err(|e| StageError::from_error("crawl_trending", e))
    }
}

/// Fetches the trending page and outputs the repository list as JSON.
///
/// Runs detached: it ignores the item that triggered the run.
#[derive(Debug, Clone)]
pub struct CrawlTrendingStage {
    fetcher: Arc<dyn HtmlFetcher>,
    url: String,
}

impl CrawlTrendingStage {
    /// Crawls the default trending URL.
    #[must_use]
    pub fn new(fetcher: Arc<dyn HtmlFetcher>) -> Self {
        Self {
            fetcher,
            url: default_url(),
        }
    }

    /// Crawls another URL.
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }
}

#[async_trait]
impl Stage for CrawlTrendingStage {
    fn name(&self) -> &str {
        "crawl_trending"
    }

    fn input_mode(&self) -> InputMode {
        InputMode::Detached
    }

    async fn process(&self, _input: &Message) -> std::result::Result<serde_json::Value, StageError> {
        let html = self.fetcher.fetch(&self.url).await?;
        let repositories = parse_trending(&html)?;
        info!(url = %self.url, repositories = repositories.len(), "crawled trending page");
        serde_json::to_value(repositories).map_err(|e| StageError::from_error(self.name(), e))
    }
}

/// Asks the model for a report on the repository list it receives.
#[derive(Debug, Clone)]
pub struct SummarizeTrendingStage {
    model: Arc<dyn LanguageModel>,
    template: String,
}

impl SummarizeTrendingStage {
    /// Creates the stage with the default analysis prompt.
    #[must_use]
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self {
            model,
            template: TRENDING_ANALYSIS_PROMPT.to_string(),
        }
    }

    /// Replaces the prompt template.
    #[must_use]
    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = template.into();
        self
    }
}

#[async_trait]
impl Stage for SummarizeTrendingStage {
    fn name(&self) -> &str {
        "summarize_trending"
    }

    async fn process(&self, input: &Message) -> std::result::Result<serde_json::Value, StageError> {
        let prompt = self.template.replace("{trending}", &input.as_text());
        let report = self.model.ask(&prompt).await?;
        Ok(serde_json::Value::String(report))
    }
}

/// Builds the two-stage crawl-then-summarize pipeline.
///
/// # Errors
///
/// Never fails in practice; the error type comes from pipeline validation.
pub fn trending_watcher(
    fetcher: Arc<dyn HtmlFetcher>,
    model: Arc<dyn LanguageModel>,
) -> std::result::Result<OrderedPipeline, PipelineValidationError> {
    PipelineBuilder::new("oss_watcher")
        .then(CrawlTrendingStage::new(fetcher))
        .then(SummarizeTrendingStage::new(model))
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockLanguageModel;
    use pretty_assertions::assert_eq;

    const PAGE: &str = r#"
        <html><body>
        <article class="Box-row">
          <h2 class="h3 lh-condensed">
            <a href="/tokio-rs/tokio">
              tokio-rs /
              tokio
            </a>
          </h2>
          <p class="col-9 color-fg-muted my-1 pr-4">
            A runtime for writing reliable asynchronous applications with Rust.
          </p>
          <div class="f6 color-fg-muted mt-2">
            <span itemprop="programmingLanguage">Rust</span>
            <a class="Link--muted d-inline-block mr-3" href="/tokio-rs/tokio/stargazers"> 27,001</a>
            <a class="Link--muted d-inline-block mr-3" href="/tokio-rs/tokio/forks"> 2,480</a>
            <span class="d-inline-block float-sm-right">120 stars today</span>
          </div>
        </article>
        <article class="Box-row">
          <h2><a href="/someone/bare">someone / bare</a></h2>
        </article>
        <article class="Box-row"><h2>no link</h2></article>
        </body></html>
    "#;

    #[derive(Debug)]
    struct StaticFetcher(String);

    #[async_trait]
    impl HtmlFetcher for StaticFetcher {
        async fn fetch(&self, _url: &str) -> std::result::Result<String, StageError> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_parse_full_entry() {
        let repos = parse_trending(PAGE).unwrap();
        assert_eq!(repos.len(), 2);
        assert_eq!(
            repos[0],
            TrendingRepository {
                name: "tokio-rs/tokio".to_string(),
                url: "https://github.com/tokio-rs/tokio".to_string(),
                description: Some(
                    "A runtime for writing reliable asynchronous applications with Rust.".to_string()
                ),
                language: Some("Rust".to_string()),
                stars: "27,001".to_string(),
                forks: "2,480".to_string(),
                today_stars: Some("120 stars today".to_string()),
            }
        );
    }

    #[test]
    fn test_parse_missing_fields() {
        let repos = parse_trending(PAGE).unwrap();
        let bare = &repos[1];
        assert_eq!(bare.name, "someone/bare");
        assert_eq!(bare.description, None);
        assert_eq!(bare.language, None);
        assert_eq!(bare.stars, NOT_AVAILABLE);
        assert_eq!(bare.forks, NOT_AVAILABLE);
        assert_eq!(bare.today_stars, None);
    }

    #[test]
    fn test_parse_empty_page() {
        assert!(parse_trending("<html></html>").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_crawl_stage_is_detached() {
        let stage = CrawlTrendingStage::new(Arc::new(StaticFetcher(PAGE.to_string())));
        assert_eq!(stage.input_mode(), InputMode::Detached);

        let out = stage.process(&Message::empty()).await.unwrap();
        assert_eq!(out.as_array().map(Vec::len), Some(2));
        assert_eq!(out[0]["name"], "tokio-rs/tokio");
    }

    #[tokio::test]
    async fn test_watcher_summarizes_crawled_listing() {
        let model = Arc::new(MockLanguageModel::new(["# Today's Trends"]));
        let pipeline = trending_watcher(Arc::new(StaticFetcher(PAGE.to_string())), model.clone()).unwrap();
        assert_eq!(pipeline.stage_names(), vec!["crawl_trending", "summarize_trending"]);

        let outcome = pipeline
            .run(Message::text("the latest news about OpenAI"))
            .await
            .unwrap();
        assert_eq!(outcome.output.as_text(), "# Today's Trends");

        let prompts = model.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].starts_with("# Requirements"));
        assert!(prompts[0].contains("tokio-rs/tokio"));
        assert!(!prompts[0].contains("{trending}"));
    }

    #[test]
    fn test_fetch_config_defaults_and_proxy() {
        let config: FetchConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.url, "https://github.com/trending");
        assert!(HttpFetcher::new(&config).is_ok());

        let bad = FetchConfig::default().with_proxy("not a url");
        assert!(HttpFetcher::new(&bad).is_err());
    }
}
