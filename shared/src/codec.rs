//! JSON text codec: parsing, serialization and an incremental document builder.

use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("malformed JSON at line {line}, column {column}: {message}")]
    Malformed {
        line: usize,
        column: usize,
        message: String,
    },
    #[error("invalid document construction: {0}")]
    Builder(&'static str),
}

/// Parses a text frame into a document.
pub fn parse(text: &str) -> Result<Value, CodecError> {
    serde_json::from_str(text).map_err(|e| CodecError::Malformed {
        line: e.line(),
        column: e.column(),
        message: e.to_string(),
    })
}

/// Serializes a document into compact text.
pub fn to_text(document: &Value) -> String {
    document.to_string()
}

#[derive(Debug)]
enum Open {
    Object {
        key: Option<String>,
        members: Map<String, Value>,
    },
    Array {
        key: Option<String>,
        items: Vec<Value>,
    },
}

/// Builds a document one object, array or value at a time.
///
/// Misuse (unbalanced begin/end, unnamed object members, named array items,
/// a second root value) is recorded and reported by [`JsonBuilder::finish`],
/// so calls can be chained without checking each step.
///
/// ```
/// use shared::JsonBuilder;
///
/// let mut builder = JsonBuilder::new();
/// builder
///     .begin_object()
///     .named_value("success", true)
///     .begin_named_array("ids")
///     .value(1)
///     .value(2)
///     .end_array()
///     .end_object();
/// let document = builder.finish().unwrap();
/// assert_eq!(document["ids"][1], 2);
/// ```
#[derive(Debug, Default)]
pub struct JsonBuilder {
    stack: Vec<Open>,
    root: Option<Value>,
    error: Option<CodecError>,
}

impl JsonBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin_object(&mut self) -> &mut Self {
        self.open(None, false)
    }

    pub fn begin_named_object(&mut self, key: &str) -> &mut Self {
        self.open(Some(key), false)
    }

    pub fn end_object(&mut self) -> &mut Self {
        match self.stack.pop() {
            Some(Open::Object { key, members }) => self.place(key, Value::Object(members)),
            Some(other) => {
                self.stack.push(other);
                self.fail("end_object closes an array");
            }
            None => self.fail("end_object without begin_object"),
        }
        self
    }

    pub fn begin_array(&mut self) -> &mut Self {
        self.open(None, true)
    }

    pub fn begin_named_array(&mut self, key: &str) -> &mut Self {
        self.open(Some(key), true)
    }

    pub fn end_array(&mut self) -> &mut Self {
        match self.stack.pop() {
            Some(Open::Array { key, items }) => self.place(key, Value::Array(items)),
            Some(other) => {
                self.stack.push(other);
                self.fail("end_array closes an object");
            }
            None => self.fail("end_array without begin_array"),
        }
        self
    }

    /// Appends an unnamed value: an array item or the document root.
    pub fn value(&mut self, value: impl Into<Value>) -> &mut Self {
        if self.check_slot(None) {
            self.place(None, value.into());
        }
        self
    }

    /// Adds a named member to the innermost object.
    pub fn named_value(&mut self, key: &str, value: impl Into<Value>) -> &mut Self {
        if self.check_slot(Some(key)) {
            self.place(Some(key.to_string()), value.into());
        }
        self
    }

    /// Returns the finished document and resets the builder for reuse.
    pub fn finish(&mut self) -> Result<Value, CodecError> {
        let builder = std::mem::take(self);
        if let Some(error) = builder.error {
            return Err(error);
        }
        if !builder.stack.is_empty() {
            return Err(CodecError::Builder("unclosed object or array"));
        }
        builder.root.ok_or(CodecError::Builder("empty document"))
    }

    /// Like [`JsonBuilder::finish`] but renders the document as text.
    pub fn finish_text(&mut self) -> Result<String, CodecError> {
        self.finish().map(|document| to_text(&document))
    }

    fn open(&mut self, key: Option<&str>, array: bool) -> &mut Self {
        if self.check_slot(key) {
            let key = key.map(str::to_string);
            self.stack.push(if array {
                Open::Array {
                    key,
                    items: Vec::new(),
                }
            } else {
                Open::Object {
                    key,
                    members: Map::new(),
                }
            });
        }
        self
    }

    fn check_slot(&mut self, key: Option<&str>) -> bool {
        if self.error.is_some() {
            return false;
        }
        let problem = match (self.stack.last(), key) {
            (None, None) if self.root.is_none() => None,
            (None, None) => Some("document already has a root value"),
            (None, Some(_)) => Some("named value outside of an object"),
            (Some(Open::Object { .. }), Some(_)) | (Some(Open::Array { .. }), None) => None,
            (Some(Open::Object { .. }), None) => Some("object members need a name"),
            (Some(Open::Array { .. }), Some(_)) => Some("array items cannot be named"),
        };
        match problem {
            Some(problem) => {
                self.fail(problem);
                false
            }
            None => true,
        }
    }

    fn place(&mut self, key: Option<String>, value: Value) {
        match self.stack.last_mut() {
            None => self.root = Some(value),
            Some(Open::Object { members, .. }) => {
                if let Some(key) = key {
                    members.insert(key, value);
                }
            }
            Some(Open::Array { items, .. }) => items.push(value),
        }
    }

    fn fail(&mut self, problem: &'static str) {
        if self.error.is_none() {
            self.error = Some(CodecError::Builder(problem));
        }
    }
}
