#![forbid(unsafe_code)]

//! Path store: copy-on-write access into the nested form data object.
//!
//! Paths are JSON pointers (RFC 6901): `""` addresses the root, every other
//! path is a sequence of `/`-prefixed tokens with `~1` standing for `/` and
//! `~0` for `~`. Array elements are addressed by decimal index; `-` on
//! [`set`] appends.
//!
//! Readers ([`has`], [`get`]) are total and treat a malformed path as absent.
//! Mutators ([`set`], [`remove`]) never touch their input; they return a new
//! root for the caller to commit to the owning observable.

use serde_json::{Map, Value};

use crate::error::PathError;

/// Split a path into unescaped tokens.
pub fn parse(path: &str) -> Result<Vec<String>, PathError> {
    if path.is_empty() {
        return Ok(Vec::new());
    }
    let Some(rest) = path.strip_prefix('/') else {
        return Err(PathError::MissingSlash {
            path: path.to_string(),
        });
    };
    Ok(rest.split('/').map(unescape).collect())
}

/// Build a path from raw tokens.
#[must_use]
pub fn compile<S: AsRef<str>>(tokens: &[S]) -> String {
    tokens
        .iter()
        .map(|token| format!("/{}", escape(token.as_ref())))
        .collect()
}

/// Escape a single token for embedding in a path.
#[must_use]
pub fn escape(token: &str) -> String {
    token.replace('~', "~0").replace('/', "~1")
}

fn unescape(token: &str) -> String {
    token.replace("~1", "/").replace("~0", "~")
}

/// First token of `path`, if it has one.
#[must_use]
pub fn top_level_token(path: &str) -> Option<String> {
    parse(path).ok()?.into_iter().next()
}

/// Whether `path` resolves inside `obj`.
#[must_use]
pub fn has(obj: &Value, path: &str) -> bool {
    get(obj, path).is_some()
}

/// Value at `path`, or `None` when the path does not resolve.
#[must_use]
pub fn get<'a>(obj: &'a Value, path: &str) -> Option<&'a Value> {
    obj.pointer(path)
}

/// Return a copy of `obj` with `value` stored at `path`.
///
/// Missing intermediate containers are created: an array when the following
/// token is an index or `-`, an object otherwise. A `null` intermediate (a
/// reserved but empty slot) is replaced the same way.
pub fn set(obj: &Value, path: &str, value: Value) -> Result<Value, PathError> {
    let tokens = parse(path)?;
    let Some((last, parents)) = tokens.split_last() else {
        return Ok(value);
    };

    let mut root = obj.clone();
    let mut node = &mut root;
    for (depth, token) in parents.iter().enumerate() {
        let next = tokens[depth + 1].as_str();
        if node.is_null() {
            *node = Value::Object(Map::new());
        }
        node = match node {
            Value::Object(map) => {
                let child = map
                    .entry(token.clone())
                    .or_insert_with(|| empty_container_for(next));
                if child.is_null() {
                    *child = empty_container_for(next);
                }
                child
            }
            Value::Array(items) => {
                let idx = insertion_index(path, token, items.len())?;
                if idx == items.len() {
                    items.push(empty_container_for(next));
                }
                let child = &mut items[idx];
                if child.is_null() {
                    *child = empty_container_for(next);
                }
                child
            }
            _ => {
                return Err(PathError::NotAContainer {
                    path: path.to_string(),
                    token: token.clone(),
                });
            }
        };
    }

    if node.is_null() {
        *node = Value::Object(Map::new());
    }
    match node {
        Value::Object(map) => {
            map.insert(last.clone(), value);
        }
        Value::Array(items) => {
            let idx = insertion_index(path, last, items.len())?;
            if idx == items.len() {
                items.push(value);
            } else {
                items[idx] = value;
            }
        }
        _ => {
            return Err(PathError::NotAContainer {
                path: path.to_string(),
                token: last.clone(),
            });
        }
    }
    Ok(root)
}

/// Return a copy of `obj` without the entry at `path`.
///
/// Removing a path that does not resolve returns an unchanged copy. Array
/// elements after a removed index shift down.
pub fn remove(obj: &Value, path: &str) -> Result<Value, PathError> {
    let tokens = parse(path)?;
    let Some((last, parents)) = tokens.split_last() else {
        return Err(PathError::RootRemoval);
    };
    if !has(obj, path) {
        return Ok(obj.clone());
    }

    let mut root = obj.clone();
    match root.pointer_mut(&compile(parents)) {
        Some(Value::Object(map)) => {
            map.remove(last);
        }
        Some(Value::Array(items)) => {
            if let Some(idx) = array_index(last).filter(|idx| *idx < items.len()) {
                items.remove(idx);
            }
        }
        _ => {}
    }
    Ok(root)
}

fn array_index(token: &str) -> Option<usize> {
    if token.is_empty() || (token.len() > 1 && token.starts_with('0')) {
        return None;
    }
    if !token.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    token.parse().ok()
}

fn insertion_index(path: &str, token: &str, len: usize) -> Result<usize, PathError> {
    if token == "-" {
        return Ok(len);
    }
    match array_index(token) {
        Some(idx) if idx <= len => Ok(idx),
        _ => Err(PathError::BadIndex {
            path: path.to_string(),
            token: token.to_string(),
        }),
    }
}

fn empty_container_for(next_token: &str) -> Value {
    if next_token == "-" || array_index(next_token).is_some() {
        Value::Array(Vec::new())
    } else {
        Value::Object(Map::new())
    }
}
