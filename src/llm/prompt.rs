//! Instruction prompt for natural-language-to-SQL translation.

/// Builds the instruction text sent alongside the user's question.
///
/// Pure string templating: no I/O, cannot fail. An empty attribute list still
/// yields a well-formed prompt; whatever the model makes of it is caught
/// downstream by normalization or execution.
#[derive(Debug, Clone, Default)]
pub struct PromptBuilder {
    dialect: Option<String>,
}

impl PromptBuilder {
    /// Builder with no dialect hint.
    pub fn new() -> Self {
        Self::default()
    }

    /// Name the SQL dialect the query will run against (e.g. "SQLite").
    pub fn with_dialect(mut self, dialect: impl Into<String>) -> Self {
        self.dialect = Some(dialect.into());
        self
    }

    /// Compose the instruction for one relation.
    ///
    /// # Arguments
    ///
    /// * `relation` - Relation the query must target
    /// * `attributes` - Attribute names, in declaration order
    ///
    /// # Returns
    ///
    /// Prompt text; identical inputs always give identical output
    pub fn build(&self, relation: &str, attributes: &[String]) -> String {
        let columns = if attributes.is_empty() {
            "(none)".to_string()
        } else {
            attributes.join(", ")
        };

        let dialect_line = match &self.dialect {
            Some(d) => format!("The database engine is {}.\n", d),
            None => String::new(),
        };

        format!(
            "You are an expert in converting English text to SQL query.\n\
             I have a database with table named {relation} & have columns {columns}.\n\
             {dialect_line}\
             Use only the table {relation} and only those columns.\n\
             Please help me with this task. Provide only the SQL query without any additional text or formatting.\n"
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_embeds_relation_and_columns() {
        let attrs = vec!["region".to_string(), "revenue".to_string()];
        let prompt = PromptBuilder::new().build("sales", &attrs);

        assert!(prompt.contains("table named sales"));
        assert!(prompt.contains("columns region, revenue"));
        assert!(prompt.contains("only the SQL query"));
    }

    #[test]
    fn test_prompt_is_deterministic() {
        let attrs = vec!["a".to_string()];
        let builder = PromptBuilder::new().with_dialect("SQLite");
        assert_eq!(builder.build("t", &attrs), builder.build("t", &attrs));
        assert!(builder.build("t", &attrs).contains("SQLite"));
    }

    #[test]
    fn test_empty_attributes_still_builds() {
        let prompt = PromptBuilder::new().build("empty", &[]);
        assert!(prompt.contains("table named empty"));
        assert!(prompt.contains("(none)"));
    }
}
