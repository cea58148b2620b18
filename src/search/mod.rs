use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;
use log::{debug, info, warn};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::config::SearchConfig;

/// Phrases that suggest a query wants current information from the web.
pub const DEFAULT_TRIGGER_PHRASES: &[&str] = &[
    "what is",
    "who is",
    "when",
    "where",
    "why",
    "how",
    "which",
    "news",
    "latest",
    "current",
    "recent",
    "today",
    "update",
    "explain",
    "difference between",
    "compare",
    "best",
    "definition",
    "define",
];

/// Decides whether a query should be grounded with live search results.
pub trait SearchTrigger: Send + Sync {
    fn needs_search(&self, query: &str) -> bool;
}

/// Case-insensitive substring match against a fixed phrase list.
#[derive(Debug, Clone)]
pub struct KeywordTrigger {
    phrases: Vec<String>,
}

impl KeywordTrigger {
    pub fn new<I, S>(phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            phrases: phrases
                .into_iter()
                .map(|p| p.into().to_lowercase())
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }

    pub fn phrases(&self) -> &[String] {
        &self.phrases
    }
}

impl Default for KeywordTrigger {
    fn default() -> Self {
        Self::new(DEFAULT_TRIGGER_PHRASES.iter().copied())
    }
}

impl SearchTrigger for KeywordTrigger {
    fn needs_search(&self, query: &str) -> bool {
        let lowered = query.to_lowercase();
        self.phrases.iter().any(|phrase| lowered.contains(phrase.as_str()))
    }
}

/// [`SearchTrigger::needs_search`] with the built-in phrase list.
pub fn needs_search(query: &str) -> bool {
    KeywordTrigger::default().needs_search(query)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrganicResult {
    pub title: String,
    pub link: String,
    pub snippet: String,
    pub source: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeGraph {
    pub title: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
    pub attributes: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnswerBox {
    pub title: String,
    pub answer: String,
    pub source: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelatedQuestion {
    pub question: String,
    pub answer: String,
    pub source: String,
}

/// Normalized search results for one query. Built fresh per turn and never cached.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResultBundle {
    pub query: String,
    pub organic_results: Vec<OrganicResult>,
    pub knowledge_graph: Option<KnowledgeGraph>,
    pub answer_box: Option<AnswerBox>,
    pub related_questions: Vec<RelatedQuestion>,
}

impl SearchResultBundle {
    pub fn is_empty(&self) -> bool {
        self.organic_results.is_empty()
            && self.knowledge_graph.is_none()
            && self.answer_box.is_none()
            && self.related_questions.is_empty()
    }
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("search API key is not configured")]
    MissingApiKey,
    #[error("search request failed: {0}")]
    Transport(String),
    #[error("{0}")]
    Provider(String),
    #[error("malformed search response: {0}")]
    Malformed(String),
}

#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(
        &self,
        query: &str,
        result_count: usize,
    ) -> Result<SearchResultBundle, SearchError>;
}

/// Client for a SerpAPI-compatible `search.json` endpoint.
pub struct SerpApiClient {
    base_url: String,
    api_key: Option<String>,
    engine: String,
    client: Client,
}

impl SerpApiClient {
    pub fn new(config: &SearchConfig) -> Result<Self> {
        info!("Using search provider at: {}", config.base_url);
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            engine: config.engine.clone(),
            client,
        })
    }
}

#[async_trait]
impl SearchProvider for SerpApiClient {
    async fn search(
        &self,
        query: &str,
        result_count: usize,
    ) -> Result<SearchResultBundle, SearchError> {
        let api_key = self.api_key.as_deref().ok_or(SearchError::MissingApiKey)?;

        info!("Searching the web ({} results) for: {}", result_count, query);
        let url = format!("{}/search.json", self.base_url);
        let num = result_count.to_string();

        let response = self
            .client
            .get(&url)
            .query(&[
                ("engine", self.engine.as_str()),
                ("q", query),
                ("num", num.as_str()),
                ("api_key", api_key),
            ])
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(transport_error)?;
        debug!("Search response ({}): {}", status, text);

        let raw: Value = match serde_json::from_str(&text) {
            Ok(raw) => raw,
            Err(e) if status.is_success() => return Err(SearchError::Malformed(e.to_string())),
            Err(_) => {
                return Err(SearchError::Provider(format!("HTTP {}: {}", status, text.trim())))
            }
        };

        if let Some(error) = raw.get("error").and_then(Value::as_str) {
            warn!("Search provider reported an error: {}", error);
            return Err(SearchError::Provider(error.to_string()));
        }
        if !status.is_success() {
            return Err(SearchError::Provider(format!("HTTP {}", status)));
        }
        if !raw.is_object() {
            return Err(SearchError::Malformed("expected a JSON object".to_string()));
        }

        let bundle = normalize(query, &raw, result_count);
        info!(
            "Search returned {} organic results, {} related questions",
            bundle.organic_results.len(),
            bundle.related_questions.len()
        );
        Ok(bundle)
    }
}

/// Maps a raw provider response onto [`SearchResultBundle`].
///
/// Fields with an unexpected shape are treated as absent.
pub fn normalize(query: &str, raw: &Value, result_count: usize) -> SearchResultBundle {
    let organic_results = raw
        .get("organic_results")
        .and_then(Value::as_array)
        .map(|results| {
            results
                .iter()
                .filter(|r| r.is_object())
                .take(result_count)
                .map(|r| OrganicResult {
                    title: str_field(r, "title"),
                    link: str_field(r, "link"),
                    snippet: str_field(r, "snippet"),
                    source: str_field(r, "source"),
                })
                .collect()
        })
        .unwrap_or_default();

    let knowledge_graph = raw
        .get("knowledge_graph")
        .filter(|kg| kg.is_object())
        .map(|kg| KnowledgeGraph {
            title: str_field(kg, "title"),
            kind: str_field(kg, "type"),
            description: str_field(kg, "description"),
            attributes: kg
                .get("attributes")
                .and_then(Value::as_object)
                .map(|attrs| {
                    attrs
                        .iter()
                        .map(|(k, v)| {
                            let value = match v {
                                Value::String(s) => s.clone(),
                                other => other.to_string(),
                            };
                            (k.clone(), value)
                        })
                        .collect()
                })
                .unwrap_or_default(),
        });

    let answer_box = raw
        .get("answer_box")
        .filter(|ab| ab.is_object())
        .map(|ab| AnswerBox {
            title: str_field(ab, "title"),
            answer: ab
                .get("answer")
                .and_then(Value::as_str)
                .or_else(|| ab.get("snippet").and_then(Value::as_str))
                .unwrap_or_default()
                .to_string(),
            source: str_field(ab, "source"),
        });

    let related_questions = raw
        .get("related_questions")
        .and_then(Value::as_array)
        .map(|questions| {
            questions
                .iter()
                .filter(|q| q.is_object())
                .map(|q| RelatedQuestion {
                    question: str_field(q, "question"),
                    answer: str_field(q, "answer"),
                    source: match q.get("source") {
                        Some(Value::String(name)) => name.clone(),
                        Some(source) => str_field(source, "name"),
                        None => String::new(),
                    },
                })
                .collect()
        })
        .unwrap_or_default();

    SearchResultBundle {
        query: query.to_string(),
        organic_results,
        knowledge_graph,
        answer_box,
        related_questions,
    }
}

// The request URL carries the API key, so it never goes into the error text.
fn transport_error(err: reqwest::Error) -> SearchError {
    SearchError::Transport(err.without_url().to_string())
}

fn str_field(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}
