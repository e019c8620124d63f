//! Natural language to SQL translation.
//!
//! The model's output format is not guaranteed: it is usually bare SQL, but is
//! sometimes wrapped in Markdown code fences with a `sql` language tag.
//! [`normalize`] strips those artifacts and is idempotent.

use crate::llm::client::LanguageModel;
use crate::types::{InsightError, NormalizedQuery, Result};
use regex::Regex;
use std::sync::{Arc, LazyLock};

static FENCE_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"```+").unwrap());

static LANGUAGE_TAG_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^sql(?:\s+|$)").unwrap());

/// Strip formatting artifacts from raw model output.
///
/// Removes every code-fence marker, then a leading case-insensitive `sql`
/// language tag, then surrounding whitespace. Steps repeat until nothing
/// changes, so `normalize(normalize(x)) == normalize(x)` for every input.
///
/// # Examples
///
/// ```
/// use percolate_insight::llm::normalize;
///
/// assert_eq!(normalize("```sql\nSELECT * FROM sales\n```"), "SELECT * FROM sales");
/// assert_eq!(normalize("SELECT 1"), "SELECT 1");
/// ```
pub fn normalize(raw: &str) -> String {
    let mut current = raw.trim().to_string();
    loop {
        let unfenced = FENCE_REGEX.replace_all(&current, "");
        let untagged = LANGUAGE_TAG_REGEX.replace(unfenced.trim(), "");
        let next = untagged.trim().to_string();

        if next == current {
            return next;
        }
        current = next;
    }
}

/// Turns a question into an executable query via a language model.
pub struct QueryTranslator {
    model: Arc<dyn LanguageModel>,
}

impl QueryTranslator {
    /// Create a translator over any model.
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }

    /// Model identifier, for logging.
    pub fn model_name(&self) -> &str {
        self.model.model_name()
    }

    /// Translate a question into a normalized query.
    ///
    /// # Arguments
    ///
    /// * `prompt` - Instruction from [`crate::llm::PromptBuilder`]
    /// * `question` - User's natural language question
    ///
    /// # Returns
    ///
    /// Normalized, non-empty query text
    ///
    /// # Errors
    ///
    /// Returns `InsightError::TranslationError` if the model call fails or the
    /// response is empty after normalization
    #[tracing::instrument(skip(self, prompt), fields(model = %self.model.model_name()))]
    pub async fn translate(&self, prompt: &str, question: &str) -> Result<NormalizedQuery> {
        let raw = self.model.generate(prompt, question).await.map_err(|e| match e {
            InsightError::TranslationError(_) => e,
            other => InsightError::translation(other.to_string()),
        })?;

        let query = normalize(&raw);
        if query.is_empty() {
            tracing::warn!(raw_len = raw.len(), "model response empty after normalization");
        }

        let query = NormalizedQuery::new(query)?;
        tracing::info!(query = %query, "question translated");
        Ok(query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use proptest::prelude::*;

    struct FixedModel(std::result::Result<String, String>);

    #[async_trait]
    impl LanguageModel for FixedModel {
        async fn generate(&self, _instruction: &str, _question: &str) -> Result<String> {
            self.0.clone().map_err(InsightError::translation)
        }

        fn model_name(&self) -> &str {
            "fixed"
        }
    }

    fn translator(response: std::result::Result<&str, &str>) -> QueryTranslator {
        let owned = response.map(str::to_string).map_err(str::to_string);
        QueryTranslator::new(Arc::new(FixedModel(owned)))
    }

    #[test]
    fn test_normalize_fenced_sql() {
        assert_eq!(normalize("```sql\nSELECT * FROM sales\n```"), "SELECT * FROM sales");
        assert_eq!(normalize("```SQL\nSELECT 1\n```"), "SELECT 1");
        assert_eq!(normalize("```\nSELECT 1;\n```\n"), "SELECT 1;");
    }

    #[test]
    fn test_normalize_leaves_clean_sql_alone() {
        let clean = "SELECT region, SUM(revenue) FROM sales GROUP BY region";
        assert_eq!(normalize(clean), clean);
    }

    #[test]
    fn test_normalize_does_not_eat_identifiers() {
        assert_eq!(
            normalize("sqlite_version_check"),
            "sqlite_version_check"
        );
    }

    #[test]
    fn test_normalize_repeated_tags() {
        assert_eq!(normalize("```sql\nsql\nSELECT 1```"), "SELECT 1");
        assert_eq!(normalize("sql"), "");
        assert_eq!(normalize("```"), "");
    }

    proptest! {
        #[test]
        fn prop_normalize_is_idempotent(raw in "(```|sql|SQL| |\n|SELECT|\\*|FROM t|;){0,12}") {
            let once = normalize(&raw);
            prop_assert_eq!(normalize(&once), once);
        }

        #[test]
        fn prop_normalize_is_idempotent_any_text(raw in ".{0,64}") {
            let once = normalize(&raw);
            prop_assert_eq!(normalize(&once), once);
        }
    }

    #[tokio::test]
    async fn test_translate_strips_fences() {
        let t = translator(Ok("```sql\nSELECT * FROM sales\n```"));
        let query = t.translate("prompt", "everything").await.unwrap();
        assert_eq!(query.as_str(), "SELECT * FROM sales");
    }

    #[tokio::test]
    async fn test_translate_empty_output_fails() {
        let t = translator(Ok("```sql\n```"));
        let result = t.translate("prompt", "anything").await;
        assert!(matches!(result, Err(InsightError::TranslationError(_))));
    }

    #[tokio::test]
    async fn test_translate_service_failure() {
        let t = translator(Err("quota exceeded"));
        let result = t.translate("prompt", "anything").await;
        assert!(matches!(result, Err(InsightError::TranslationError(_))));
    }
}
