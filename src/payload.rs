use std::path::Path;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use serde_json::{json, Value};

/// Request shape accepted by a serving backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PayloadFormat {
    /// `{"pairs": [[query, doc], ...]}` for a custom inference handler.
    Pairs,
    /// `{"inputs": [{"text": query, "text_pair": doc}, ...]}` for a
    /// text-classification pipeline.
    TextPairs,
    /// `{"query": query, "texts": [...]}` for a dedicated rerank server.
    Rerank,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct RerankRequest {
    pub query: String,
    pub documents: Vec<String>,
}

impl RerankRequest {
    pub fn new(query: impl Into<String>, documents: Vec<String>) -> Self {
        Self {
            query: query.into(),
            documents,
        }
    }

    /// Loads `{"query": ..., "documents": [...]}` from a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("unable to read {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("{} is not a valid rerank request", path.display()))
    }

    pub fn to_payload(&self, format: PayloadFormat) -> Result<Value> {
        if self.query.trim().is_empty() {
            return Err(anyhow!("rerank query must not be empty"));
        }
        if self.documents.is_empty() {
            return Err(anyhow!("rerank request needs at least one document"));
        }

        let payload = match format {
            PayloadFormat::Pairs => {
                let pairs: Vec<[&str; 2]> = self
                    .documents
                    .iter()
                    .map(|doc| [self.query.as_str(), doc.as_str()])
                    .collect();
                json!({ "pairs": pairs })
            }
            PayloadFormat::TextPairs => {
                let inputs: Vec<Value> = self
                    .documents
                    .iter()
                    .map(|doc| json!({ "text": self.query, "text_pair": doc }))
                    .collect();
                json!({ "inputs": inputs })
            }
            PayloadFormat::Rerank => json!({
                "query": self.query,
                "texts": self.documents,
                "raw_scores": false,
            }),
        };

        Ok(payload)
    }
}
