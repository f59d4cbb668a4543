//! Email draft generation.
//!
//! Drafting optionally pulls context from the archive: when the caller
//! names a related topic, the top semantic matches ride along with the
//! instruction so the model can reference real threads.

use anyhow::Result;
use std::sync::Arc;

use crate::llm::GenerativeClient;
use crate::retrieval::SearchService;

/// How many related emails accompany a drafting request.
const DRAFT_CONTEXT_K: usize = 5;

/// Generate email drafts, optionally grounded in a related search.
pub struct DraftingService {
    search: Arc<SearchService>,
    generator: Arc<dyn GenerativeClient>,
}

impl DraftingService {
    pub fn new(search: Arc<SearchService>, generator: Arc<dyn GenerativeClient>) -> Self {
        Self { search, generator }
    }

    /// Draft an email for `instruction`. When `related_query` is given, the
    /// closest matching emails are provided to the model as context.
    pub async fn draft_email(
        &self,
        instruction: &str,
        related_query: Option<&str>,
    ) -> Result<String> {
        let context = match related_query {
            Some(query) if !query.trim().is_empty() => {
                self.search.search_semantic(query, DRAFT_CONTEXT_K).await?
            }
            _ => Vec::new(),
        };

        self.generator.draft(instruction, &context).await
    }
}
