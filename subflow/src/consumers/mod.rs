//! Ready-made consumer pipelines.
//!
//! Both consumers are ordinary [`OrderedPipeline`](crate::pipeline::OrderedPipeline)s
//! built from stages that call out to a language model, a subprocess or a
//! web page:
//!
//! - [`coder::runnable_coder`]: write code for an instruction, then run it.
//! - [`trending::trending_watcher`]: crawl GitHub trending, then summarize it.

pub mod coder;
pub mod llm;
pub mod trending;

pub use coder::{extract_code, runnable_coder, RunCodeStage, WriteCodeStage};
pub use llm::{LanguageModel, LlmConfig, OpenAiChatModel};
pub use trending::{
    parse_trending, trending_watcher, CrawlTrendingStage, FetchConfig, HtmlFetcher, HttpFetcher,
    SummarizeTrendingStage, TrendingRepository,
};
