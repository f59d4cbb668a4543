//! Deterministic stand-ins shared by unit tests.

use anyhow::Result;
use async_trait::async_trait;

use crate::embedding::EmbeddingProvider;
use crate::models::EmailRecord;

/// Embedder that derives a stable vector from the text's bytes. Identical
/// texts embed identically, distinct texts almost always differ, and no
/// network is involved.
pub struct FakeEmbedder {
    dims: usize,
}

impl FakeEmbedder {
    pub fn new(dims: usize) -> Self {
        Self { dims }
    }

    pub fn vector_for(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dims];
        for (i, b) in text.bytes().enumerate() {
            v[i % self.dims] += f32::from(b) / 255.0;
        }
        v
    }
}

#[async_trait]
impl EmbeddingProvider for FakeEmbedder {
    fn model_name(&self) -> &str {
        "fake"
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.vector_for(t)).collect())
    }
}

/// Build records from (id, subject, body) triples.
pub fn records(specs: &[(i64, &str, &str)]) -> Vec<EmailRecord> {
    specs
        .iter()
        .map(|&(id, subject, body)| EmailRecord {
            id,
            message_id: format!("msg-{id}"),
            thread_id: format!("thread-{id}"),
            from_address: "sender@example.com".to_string(),
            to_addresses: "me@example.com".to_string(),
            cc_addresses: None,
            bcc_addresses: None,
            subject: subject.to_string(),
            raw_html: String::new(),
            plain_text: body.to_string(),
            summary: None,
            date: 1_700_000_000 + id,
            created_at: 1_700_000_000,
            updated_at: 1_700_000_000,
        })
        .collect()
}
