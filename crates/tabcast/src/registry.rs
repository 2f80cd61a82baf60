use rowset::ColumnType;
use shape::{Node, Shape};
use std::collections::BTreeMap;

/// One streamable endpoint: a shape descriptor plus the query feeding it.
#[derive(Debug, Clone)]
pub struct StreamDef {
    pub shape: Shape,
    pub query: String,
}

/// ShapeRegistry maps endpoint names to stream definitions. It is built at
/// startup and immutable afterwards.
#[derive(Debug, Default)]
pub struct ShapeRegistry {
    streams: BTreeMap<String, StreamDef>,
}

impl ShapeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, def: StreamDef) {
        self.streams.insert(name.into(), def);
    }

    pub fn get(&self, name: &str) -> Option<&StreamDef> {
        self.streams.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.streams.keys().map(String::as_str)
    }

    /// The registry served out of the box: the illustrative mortgage
    /// `documents` shape over the bootstrap table. The engine itself is
    /// domain-agnostic; nothing here is privileged.
    pub fn demo() -> Self {
        let shape = Shape::new(
            "documents",
            vec![
                Node::field("id", "Id", ColumnType::Int64),
                Node::field("loanNumber", "LoanNumber", ColumnType::String),
                Node::object(
                    "borrower",
                    vec![Node::field("name", "BorrowerName", ColumnType::String)],
                ),
                Node::flatten(vec![
                    Node::field("documentType", "DocumentType", ColumnType::String),
                    Node::field("pageCount", "PageCount", ColumnType::Int32),
                ]),
                Node::field("amount", "Amount", ColumnType::Decimal),
                Node::field("isArchived", "IsArchived", ColumnType::Bool),
                Node::field("externalRef", "ExternalRef", ColumnType::Uuid),
                Node::field("uploadedAt", "UploadedAt", ColumnType::Timestamp),
                Node::array_pattern("tags", "Tag_"),
                Node::array_pattern("comments", "Comment_"),
            ],
        )
        .expect("demo shape is valid");

        let mut registry = Self::new();
        registry.insert(
            "documents",
            StreamDef {
                shape,
                query: r#"SELECT * FROM documents ORDER BY "Id""#.to_string(),
            },
        );
        registry
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;
    use projection::{compile, CompileOptions, EventCategory, MemorySink};
    use rowset::{Column, Schema};

    /// The cursor schema the bootstrap `documents` table produces.
    fn bootstrap_schema() -> Schema {
        let mut columns = vec![
            Column::new("Id", ColumnType::Int64),
            Column::new("LoanNumber", ColumnType::String),
            Column::new("BorrowerName", ColumnType::String),
            Column::new("DocumentType", ColumnType::String),
            Column::new("PageCount", ColumnType::Int32),
            Column::new("Amount", ColumnType::Decimal),
            Column::new("IsArchived", ColumnType::Bool),
            Column::new("ExternalRef", ColumnType::Uuid),
            Column::new("UploadedAt", ColumnType::Timestamp),
        ];
        for n in 1..=tabcast_sql::bootstrap::TAG_COLUMNS {
            columns.push(Column::new(format!("Tag_{n:02}"), ColumnType::String));
        }
        for n in 1..=tabcast_sql::bootstrap::COMMENT_COLUMNS {
            columns.push(Column::new(format!("Comment_{n:02}"), ColumnType::String));
        }
        Schema::new(columns)
    }

    #[test]
    fn test_demo_shape_matches_bootstrap_table() {
        let registry = ShapeRegistry::demo();
        let def = registry.get("documents").unwrap();

        let sink = MemorySink::new();
        let plan = compile(
            &def.shape,
            &bootstrap_schema(),
            &CompileOptions::default(),
            &sink,
            "test",
        )
        .unwrap();

        // Every declared field resolves, and both pattern groups expand.
        assert_eq!(sink.count(EventCategory::ColumnNotFound), 0);
        assert_eq!(sink.count(EventCategory::UnsupportedType), 0);
        assert_eq!(sink.count(EventCategory::EmptyArrayPattern), 0);
        assert_eq!(
            plan.slot_count() as u32,
            9 + tabcast_sql::bootstrap::TAG_COLUMNS + tabcast_sql::bootstrap::COMMENT_COLUMNS
        );
    }

    #[test]
    fn test_registry_lookup() {
        let registry = ShapeRegistry::demo();
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["documents"]);
        assert!(registry.get("documents").is_some());
        assert!(registry.get("missing").is_none());
    }
}
