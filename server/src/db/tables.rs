use curator_engine::RefCollection;

/// Host table names, derived from the configured prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tables {
    prefix: String,
}

impl Tables {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// The records table.
    pub fn contents(&self) -> String {
        format!("{}contents", self.prefix)
    }

    /// The table holding rows of `collection`.
    pub fn references(&self, collection: RefCollection) -> String {
        format!("{}{}", self.prefix, collection.table_suffix())
    }
}

impl Default for Tables {
    fn default() -> Self {
        Self::new("typecho_")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_follow_prefix() {
        let tables = Tables::default();
        assert_eq!(tables.contents(), "typecho_contents");
        assert_eq!(tables.references(RefCollection::Fields), "typecho_fields");

        let tables = Tables::new("blog_");
        assert_eq!(tables.references(RefCollection::Relationships), "blog_relationships");
    }
}
