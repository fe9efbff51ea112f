//! Per-request context store.
//!
//! A [`Context`] maps a small set of keys (`resource`, `userInfo`,
//! `request`, ...) to independent JSON documents and answers dotted path
//! queries such as `resource.spec.containers[0].name`. The first path
//! segment selects the document.
//!
//! A context is built once per admission request and then only read, so
//! queries take `&self` and may run from several rule evaluations at once.

use admiral_core::{AdmissionRequest, RequestInfo};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;

use crate::error::ContextError;

/// Key holding the resource under admission.
pub const RESOURCE: &str = "resource";
/// Key holding the requester's [`RequestInfo`].
pub const USER_INFO: &str = "userInfo";
/// Key holding the admission request (`operation`, `object`, `oldObject`).
pub const REQUEST: &str = "request";

/// Layered document store for variable resolution.
#[derive(Debug, Clone, Default)]
pub struct Context {
    documents: HashMap<String, Value>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the standard context for an admission request.
    pub fn for_admission(request: &AdmissionRequest) -> Result<Self, ContextError> {
        let mut ctx = Self::new();
        ctx.add_value(RESOURCE, request.resource.clone())?;
        ctx.add_request_info(&request.request_info)?;

        let mut req = Map::new();
        req.insert(
            "operation".to_string(),
            Value::String(request.operation.to_string()),
        );
        req.insert("object".to_string(), request.resource.clone());
        if let Some(old) = &request.old_resource {
            req.insert("oldObject".to_string(), old.clone());
        }
        ctx.add_value(REQUEST, Value::Object(req))?;
        Ok(ctx)
    }

    /// Parse `raw` as JSON and store it under `key`.
    pub fn add(&mut self, key: &str, raw: &[u8]) -> Result<(), ContextError> {
        let value = parse_document(key, raw)?;
        self.add_value(key, value)
    }

    /// Store an already parsed document under `key`.
    pub fn add_value(&mut self, key: &str, value: Value) -> Result<(), ContextError> {
        if self.documents.contains_key(key) {
            return Err(ContextError::DuplicateKey(key.to_string()));
        }
        self.documents.insert(key.to_string(), value);
        Ok(())
    }

    /// Parse `raw` and merge it into the document under `key` using JSON
    /// merge-patch semantics. Stores it as-is when the key is empty.
    pub fn merge(&mut self, key: &str, raw: &[u8]) -> Result<(), ContextError> {
        let value = parse_document(key, raw)?;
        match self.documents.get_mut(key) {
            Some(existing) => json_patch::merge(existing, &value),
            None => {
                self.documents.insert(key.to_string(), value);
            }
        }
        Ok(())
    }

    /// Store the requester identity under [`USER_INFO`].
    pub fn add_request_info(&mut self, info: &RequestInfo) -> Result<(), ContextError> {
        let value = serde_json::to_value(info).map_err(|e| ContextError::InvalidDocument {
            key: USER_INFO.to_string(),
            message: e.to_string(),
        })?;
        self.add_value(USER_INFO, value)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.documents.contains_key(key)
    }

    /// Resolve a path such as `resource.metadata.labels.app` or
    /// `resource.spec.containers[0].name`. Field names containing dots can
    /// be quoted: `resource.metadata.labels["app.kubernetes.io/name"]`.
    pub fn query(&self, path: &str) -> Result<&Value, ContextError> {
        let segments = parse_path(path)?;
        let mut iter = segments.iter();

        let root = match iter.next() {
            Some(Segment::Field(key)) => key,
            _ => {
                return Err(ContextError::InvalidPath {
                    path: path.to_string(),
                    reason: "path must start with a context key".to_string(),
                });
            }
        };
        let mut current = self
            .documents
            .get(root.as_str())
            .ok_or_else(|| ContextError::NotFound {
                path: path.to_string(),
                segment: root.clone(),
            })?;

        for segment in iter {
            current = match (segment, current) {
                (Segment::Field(name), Value::Object(map)) => {
                    map.get(name.as_str()).ok_or_else(|| ContextError::NotFound {
                        path: path.to_string(),
                        segment: segment.to_string(),
                    })?
                }
                (Segment::Index(idx), Value::Array(items)) => {
                    items.get(*idx).ok_or_else(|| ContextError::NotFound {
                        path: path.to_string(),
                        segment: segment.to_string(),
                    })?
                }
                (Segment::Field(_), _) => {
                    return Err(ContextError::TypeMismatch {
                        path: path.to_string(),
                        segment: segment.to_string(),
                        expected: "object",
                    });
                }
                (Segment::Index(_), _) => {
                    return Err(ContextError::TypeMismatch {
                        path: path.to_string(),
                        segment: segment.to_string(),
                        expected: "array",
                    });
                }
            };
        }

        Ok(current)
    }
}

fn parse_document(key: &str, raw: &[u8]) -> Result<Value, ContextError> {
    serde_json::from_slice(raw).map_err(|e| ContextError::InvalidDocument {
        key: key.to_string(),
        message: e.to_string(),
    })
}

/// One step of a query path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Field(String),
    Index(usize),
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Field(name) => write!(f, "{}", name),
            Segment::Index(idx) => write!(f, "[{}]", idx),
        }
    }
}

/// Split a query path into segments.
pub fn parse_path(path: &str) -> Result<Vec<Segment>, ContextError> {
    let invalid = |reason: &str| ContextError::InvalidPath {
        path: path.to_string(),
        reason: reason.to_string(),
    };

    let mut segments = Vec::new();
    let mut field = String::new();
    // Set after `]` so that `a[0].b` does not see an empty field before `.`.
    let mut after_bracket = false;
    let mut chars = path.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '.' => {
                if field.is_empty() && !after_bracket {
                    return Err(invalid("empty field name"));
                }
                if !field.is_empty() {
                    segments.push(Segment::Field(std::mem::take(&mut field)));
                }
                after_bracket = false;
                if chars.peek().is_none() {
                    return Err(invalid("path ends with '.'"));
                }
            }
            '[' => {
                if !field.is_empty() {
                    segments.push(Segment::Field(std::mem::take(&mut field)));
                } else if segments.is_empty() {
                    return Err(invalid("path must start with a field name"));
                }

                let mut inner = String::new();
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == ']' {
                        closed = true;
                        break;
                    }
                    inner.push(c);
                }
                if !closed {
                    return Err(invalid("unterminated '['"));
                }

                let inner = inner.trim();
                let quoted = inner
                    .strip_prefix('"')
                    .and_then(|s| s.strip_suffix('"'))
                    .or_else(|| inner.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')));
                match quoted {
                    Some(name) => segments.push(Segment::Field(name.to_string())),
                    None => {
                        let idx = inner
                            .parse::<usize>()
                            .map_err(|_| invalid("array index must be a non-negative integer"))?;
                        segments.push(Segment::Index(idx));
                    }
                }

                after_bracket = true;
                if let Some(next) = chars.peek() {
                    if *next != '.' && *next != '[' {
                        return Err(invalid("expected '.' or '[' after ']'"));
                    }
                }
            }
            ']' => return Err(invalid("unexpected ']'")),
            other => {
                if after_bracket {
                    return Err(invalid("expected '.' or '[' after ']'"));
                }
                field.push(other);
            }
        }
    }

    if !field.is_empty() {
        segments.push(Segment::Field(field));
    }
    if segments.is_empty() {
        return Err(invalid("empty path"));
    }
    Ok(segments)
}
