use rowset::ColumnType;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// The deepest object nesting a shape may declare. Shapes are value trees
/// and cannot cycle; the cap bounds writer state and guards against
/// programmatically-generated runaway descriptors.
pub const MAX_DEPTH: usize = 32;

/// ShapeId names a shape. It is opaque to the engine and keys the plan
/// cache together with the cursor schema fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct ShapeId(String);

impl ShapeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ShapeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ShapeId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Node is one declaration of a shape descriptor.
///
/// A shape is a finite tree of nodes. Fields bind JSON properties to cursor
/// columns; objects nest; flattens splice their children into the enclosing
/// object; array patterns collapse a prefix-matched column group into a
/// JSON array of primitives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum Node {
    /// # Bind a primitive JSON property to a single cursor column.
    #[serde(rename_all = "camelCase")]
    Field {
        /// # JSON property name.
        name: String,
        /// # Cursor column name, matched exactly.
        column: String,
        /// # Declared primitive type of the column.
        /// The cursor's reported type wins if the two disagree.
        ty: ColumnType,
    },
    /// # A nested JSON object.
    #[serde(rename_all = "camelCase")]
    Object {
        /// # JSON property name of the nested object.
        name: String,
        children: Vec<Node>,
    },
    /// # Children are spliced into the enclosing object.
    /// No `{}` or property name of its own is emitted.
    #[serde(rename_all = "camelCase")]
    Flatten { children: Vec<Node> },
    /// # Collapse every column whose name starts with `prefix` into a JSON
    /// array of primitives, in ascending column-ordinal order.
    #[serde(rename_all = "camelCase")]
    ArrayPattern {
        /// # JSON property name of the array.
        name: String,
        /// # Column-name prefix to match.
        prefix: String,
    },
}

impl Node {
    pub fn field(name: impl Into<String>, column: impl Into<String>, ty: ColumnType) -> Node {
        Node::Field {
            name: name.into(),
            column: column.into(),
            ty,
        }
    }

    pub fn object(name: impl Into<String>, children: Vec<Node>) -> Node {
        Node::Object {
            name: name.into(),
            children,
        }
    }

    pub fn flatten(children: Vec<Node>) -> Node {
        Node::Flatten { children }
    }

    pub fn array_pattern(name: impl Into<String>, prefix: impl Into<String>) -> Node {
        Node::ArrayPattern {
            name: name.into(),
            prefix: prefix.into(),
        }
    }
}

/// Shape is a complete descriptor: the root is an implicit flatten whose
/// children form the body of each per-row JSON object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct Shape {
    pub id: ShapeId,
    pub root: Vec<Node>,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ShapeError {
    #[error("node at {path:?} has an empty JSON name")]
    EmptyJsonName { path: String },
    #[error("field {path:?} has an empty column name")]
    EmptyColumnName { path: String },
    #[error("array pattern {path:?} has an empty column prefix")]
    EmptyPrefix { path: String },
    #[error("shape nests deeper than the supported maximum at {path:?}")]
    TooDeep { path: String },
}

impl Shape {
    /// Build a validated Shape. Shapes deserialized from configuration
    /// bypass this constructor; the plan compiler re-validates on ingestion.
    pub fn new(id: impl Into<ShapeId>, root: Vec<Node>) -> Result<Self, ShapeError> {
        let shape = Self {
            id: id.into(),
            root,
        };
        shape.validate()?;
        Ok(shape)
    }

    pub fn validate(&self) -> Result<(), ShapeError> {
        validate_nodes(&self.root, &mut Vec::new(), 1)
    }
}

fn validate_nodes(
    nodes: &[Node],
    scope: &mut Vec<String>,
    depth: usize,
) -> Result<(), ShapeError> {
    let path = |scope: &[String], leaf: &str| -> String {
        let mut path = scope.join("/");
        if !path.is_empty() {
            path.push('/');
        }
        path.push_str(leaf);
        path
    };

    for node in nodes {
        match node {
            Node::Field { name, column, .. } => {
                if name.is_empty() {
                    return Err(ShapeError::EmptyJsonName {
                        path: path(scope, "<field>"),
                    });
                }
                if column.is_empty() {
                    return Err(ShapeError::EmptyColumnName {
                        path: path(scope, name),
                    });
                }
            }
            Node::Object { name, children } => {
                if name.is_empty() {
                    return Err(ShapeError::EmptyJsonName {
                        path: path(scope, "<object>"),
                    });
                }
                if depth + 1 > MAX_DEPTH {
                    return Err(ShapeError::TooDeep {
                        path: path(scope, name),
                    });
                }
                scope.push(name.clone());
                validate_nodes(children, scope, depth + 1)?;
                scope.pop();
            }
            Node::Flatten { children } => {
                // Flattens add no JSON nesting and no depth.
                validate_nodes(children, scope, depth)?;
            }
            Node::ArrayPattern { name, prefix } => {
                if name.is_empty() {
                    return Err(ShapeError::EmptyJsonName {
                        path: path(scope, "<arrayPattern>"),
                    });
                }
                if prefix.is_empty() {
                    return Err(ShapeError::EmptyPrefix {
                        path: path(scope, name),
                    });
                }
            }
        }
    }
    Ok(())
}
