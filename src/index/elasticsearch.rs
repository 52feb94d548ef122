//! Elasticsearch index driver.
//!
//! Addressed as `es://host:port/index` or `elasticsearch://host:port/index`.
//! Nodes are stored one document per key, with the key as document id:
//!
//! ```json
//! {"key": "servers.web1.load", "depth": 2, "leaf": true}
//! ```
//!
//! Branch nodes are written with the bulk `create` action so an existing
//! leaf document with the same key is never downgraded.

use super::driver::{IndexDriver, NodeFilter};
use super::node::{depth_of, PathNode};
use crate::core::config::IndexConfig;
use crate::core::{QuarryError, Result};
use crate::query::{Atom, Query};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as Json};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};
use url::Url;

const DEFAULT_PORT: u16 = 9200;
const DEFAULT_INDEX: &str = "graphite";

/// Driver talking to the Elasticsearch REST API.
#[derive(Debug, Clone)]
pub struct ElasticsearchDriver {
    client: Client,
    index: String,
    index_url: Url,
    bulk_url: Url,
    search_url: Url,
}

impl ElasticsearchDriver {
    /// Build a driver from an `es://` URL.
    pub fn from_url(url: &Url, config: &IndexConfig) -> Result<Self> {
        let host = url
            .host_str()
            .ok_or_else(|| QuarryError::config(format!("index url {} has no host", url)))?;
        let port = url.port().unwrap_or(DEFAULT_PORT);

        let index = match url.path().trim_matches('/') {
            "" => DEFAULT_INDEX.to_string(),
            name => name.to_string(),
        };

        let base = Url::parse(&format!("http://{}:{}/", host, port))
            .map_err(|e| QuarryError::config(format!("invalid index host {}: {}", host, e)))?;
        let join = |path: &str| {
            base.join(path)
                .map_err(|e| QuarryError::config(format!("invalid index path {}: {}", path, e)))
        };
        let index_url = join(&index)?;
        let bulk_url = join("_bulk")?;
        let search_url = join(&format!("{}/_search", index))?;

        let client = Client::builder().timeout(config.request_timeout).build()?;

        Ok(Self {
            client,
            index,
            index_url,
            bulk_url,
            search_url,
        })
    }

    /// Registry factory for `es://` and `elasticsearch://` URLs.
    pub fn factory(url: &Url, config: &IndexConfig) -> Result<Arc<dyn IndexDriver>> {
        Ok(Arc::new(Self::from_url(url, config)?))
    }

    /// Target index name.
    pub fn index_name(&self) -> &str {
        &self.index
    }

    async fn create_index(&self) -> Result<()> {
        let mapping = json!({
            "mappings": {
                "properties": {
                    "key": {"type": "keyword"},
                    "depth": {"type": "integer"},
                    "leaf": {"type": "boolean"}
                }
            }
        });

        let response = self.client.put(self.index_url.clone()).json(&mapping).send().await?;
        match response.status() {
            status if status.is_success() => {
                info!(index = %self.index, "Created path index");
                Ok(())
            },
            // Another instance created it first.
            StatusCode::BAD_REQUEST => {
                let body = response.text().await.unwrap_or_default();
                if body.contains("resource_already_exists_exception") {
                    Ok(())
                } else {
                    Err(QuarryError::index(format!("index creation rejected: {}", body)))
                }
            },
            _ => Err(response.error_for_status().err().map_or_else(
                || QuarryError::index("unexpected index creation response"),
                QuarryError::from,
            )),
        }
    }
}

#[async_trait::async_trait]
impl IndexDriver for ElasticsearchDriver {
    fn name(&self) -> &'static str {
        "elasticsearch"
    }

    async fn init(&self) -> Result<()> {
        let response = self.client.head(self.index_url.clone()).send().await?;
        match response.status() {
            StatusCode::NOT_FOUND => self.create_index().await,
            _ => {
                response.error_for_status()?;
                debug!(index = %self.index, "Path index exists");
                Ok(())
            },
        }
    }

    async fn update(&self, nodes: &[PathNode]) -> Result<()> {
        if nodes.is_empty() {
            return Ok(());
        }

        let body = bulk_body(&self.index, nodes)?;
        let response: BulkResponse = self
            .client
            .post(self.bulk_url.clone())
            .header(reqwest::header::CONTENT_TYPE, "application/x-ndjson")
            .body(body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if !response.errors {
            return Ok(());
        }

        let rejected: Vec<&BulkItem> = response
            .items
            .iter()
            .flat_map(HashMap::values)
            .filter(|item| item.is_rejection())
            .collect();

        match rejected.first() {
            None => Ok(()),
            Some(first) => Err(QuarryError::index(format!(
                "{} of {} nodes rejected, first: {}",
                rejected.len(),
                nodes.len(),
                first.error.as_ref().map_or_else(|| first.status.to_string(), Json::to_string)
            ))),
        }
    }

    async fn query(&self, filter: &NodeFilter, limit: usize) -> Result<Vec<PathNode>> {
        let response: SearchResponse = self
            .client
            .post(self.search_url.clone())
            .json(&search_body(filter, limit))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(response.hits.hits.into_iter().map(|hit| hit.source).collect())
    }

    async fn ping(&self) -> Result<()> {
        self.client
            .head(self.index_url.clone())
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        debug!(index = %self.index, "Closing elasticsearch driver");
        Ok(())
    }
}

#[derive(Serialize)]
#[serde(rename_all = "lowercase")]
enum BulkAction<'a> {
    Index(BulkTarget<'a>),
    Create(BulkTarget<'a>),
}

#[derive(Serialize)]
struct BulkTarget<'a> {
    #[serde(rename = "_index")]
    index: &'a str,
    #[serde(rename = "_id")]
    id: &'a str,
}

#[derive(Deserialize)]
struct BulkResponse {
    errors: bool,
    #[serde(default)]
    items: Vec<HashMap<String, BulkItem>>,
}

#[derive(Deserialize)]
struct BulkItem {
    status: u16,
    #[serde(default)]
    error: Option<Json>,
}

impl BulkItem {
    /// Conflicts come from `create` on an existing key and are expected.
    fn is_rejection(&self) -> bool {
        self.status >= 300 && self.status != StatusCode::CONFLICT.as_u16()
    }
}

#[derive(Deserialize)]
struct SearchResponse {
    hits: SearchHits,
}

#[derive(Deserialize)]
struct SearchHits {
    #[serde(default)]
    hits: Vec<SearchHit>,
}

#[derive(Deserialize)]
struct SearchHit {
    #[serde(rename = "_source")]
    source: PathNode,
}

fn bulk_body(index: &str, nodes: &[PathNode]) -> Result<String> {
    let mut body = String::with_capacity(nodes.len() * 96);
    for node in nodes {
        let target = BulkTarget {
            index,
            id: &node.key,
        };
        let action = if node.leaf {
            BulkAction::Index(target)
        } else {
            BulkAction::Create(target)
        };
        body.push_str(&serde_json::to_string(&action)?);
        body.push('\n');
        body.push_str(&serde_json::to_string(node)?);
        body.push('\n');
    }
    Ok(body)
}

fn search_body(filter: &NodeFilter, limit: usize) -> Json {
    let clauses = match filter {
        NodeFilter::Children { parent } if parent.is_empty() => {
            vec![json!({"term": {"depth": 0}})]
        },
        NodeFilter::Children { parent } => vec![
            json!({"prefix": {"key": format!("{}.", parent)}}),
            json!({"term": {"depth": depth_of(parent) + 1}}),
        ],
        NodeFilter::Leaves(query) => {
            let key = match query.literal_path() {
                Some(path) => json!({"term": {"key": path}}),
                None => json!({"regexp": {"key": {"value": lucene_regex(query)}}}),
            };
            vec![
                key,
                json!({"term": {"leaf": true}}),
                json!({"term": {"depth": query.depth()}}),
            ]
        },
    };

    json!({
        "size": limit,
        "sort": [{"key": "asc"}],
        "query": {"bool": {"filter": clauses}}
    })
}

/// Translate a compiled glob into an anchored Lucene regular expression.
pub fn lucene_regex(query: &Query) -> String {
    let segments: Vec<String> = query
        .segments()
        .iter()
        .map(|atoms| {
            let mut out = String::new();
            for atom in atoms {
                match atom {
                    Atom::Literal(text) => push_escaped(&mut out, text),
                    Atom::AnySegment => out.push_str("[^.]+"),
                    Atom::AnyChar => out.push_str("[^.]"),
                    Atom::Range(lo, hi) => {
                        out.push('[');
                        push_escaped_char(&mut out, *lo);
                        out.push('-');
                        push_escaped_char(&mut out, *hi);
                        out.push(']');
                    },
                    Atom::Alternation(alternatives) => {
                        out.push('(');
                        for (i, alternative) in alternatives.iter().enumerate() {
                            if i > 0 {
                                out.push('|');
                            }
                            push_escaped(&mut out, alternative);
                        }
                        out.push(')');
                    },
                }
            }
            out
        })
        .collect();
    segments.join("\\.")
}

fn push_escaped(out: &mut String, text: &str) {
    for c in text.chars() {
        push_escaped_char(out, c);
    }
}

fn push_escaped_char(out: &mut String, c: char) {
    if matches!(
        c,
        '.' | '?' | '+' | '*' | '|' | '{' | '}' | '[' | ']' | '(' | ')' | '"' | '\\' | '#' | '@'
            | '&' | '<' | '>' | '~' | '^' | '-'
    ) {
        out.push('\\');
    }
    out.push(c);
}
