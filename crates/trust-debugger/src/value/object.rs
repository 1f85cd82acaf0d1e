//! Lazily populated value tree nodes.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use parking_lot::{Mutex, RwLock};
use smol_str::SmolStr;

use crate::config::DEFAULT_ARRAY_FETCH_CHUNK;
use crate::error::{EvalResult, ValueError};

/// Which part of a node's children to fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildRange {
    All,
    Range { start: usize, count: usize },
}

/// Pull-based child provider behind a node.
pub trait ObjectValueSource: Send + Sync {
    fn children(&self, path: &ObjectPath, range: ChildRange) -> EvalResult<Vec<ObjectValue>>;

    /// Write `value` and return the canonical text of what was stored.
    fn set_value(&self, path: &ObjectPath, value: &str) -> EvalResult<String>;
}

/// Name segments from the root expression to a node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ObjectPath(Vec<SmolStr>);

impl ObjectPath {
    #[must_use]
    pub fn new(name: impl Into<SmolStr>) -> Self {
        Self(vec![name.into()])
    }

    #[must_use]
    pub fn append(&self, name: impl Into<SmolStr>) -> Self {
        let mut segments = self.0.clone();
        segments.push(name.into());
        Self(segments)
    }

    #[must_use]
    pub fn last(&self) -> &str {
        self.0.last().map_or("", SmolStr::as_str)
    }

    #[must_use]
    pub fn segments(&self) -> &[SmolStr] {
        &self.0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for ObjectPath {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for ObjectPath {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

impl fmt::Display for ObjectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, segment) in self.0.iter().enumerate() {
            if index > 0 {
                f.write_str("/")?;
            }
            f.write_str(segment)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectValueKind {
    Object,
    Array,
    Primitive,
    Error,
    Unknown,
    /// The evaluator does not support the expression.
    NotSupported,
    /// Evaluation outran its timeout; see [`ObjectValue::wait_for_result`].
    Evaluating,
}

struct Node {
    kind: ObjectValueKind,
    path: ObjectPath,
    type_name: SmolStr,
    value: RwLock<String>,
    editable: bool,
    is_null: bool,
    source: Option<Arc<dyn ObjectValueSource>>,
    /// Absent until first access.
    children: Mutex<Option<Vec<ObjectValue>>>,
    array_len: usize,
    fetch_chunk: AtomicUsize,
    /// Delivers the final node of an `Evaluating` placeholder.
    pending: Option<Receiver<ObjectValue>>,
    resolved: Mutex<Option<ObjectValue>>,
}

/// One node of the inspection tree.
///
/// Clones share the node, including its children cache.
#[derive(Clone)]
pub struct ObjectValue {
    node: Arc<Node>,
}

impl ObjectValue {
    fn build(
        kind: ObjectValueKind,
        source: Option<Arc<dyn ObjectValueSource>>,
        path: ObjectPath,
        type_name: &str,
        value: String,
    ) -> Node {
        Node {
            kind,
            path,
            type_name: type_name.into(),
            value: RwLock::new(value),
            editable: false,
            is_null: false,
            source,
            children: Mutex::new(None),
            array_len: 0,
            fetch_chunk: AtomicUsize::new(DEFAULT_ARRAY_FETCH_CHUNK),
            pending: None,
            resolved: Mutex::new(None),
        }
    }

    fn wrap(node: Node) -> Self {
        Self {
            node: Arc::new(node),
        }
    }

    #[must_use]
    pub fn object(
        source: Option<Arc<dyn ObjectValueSource>>,
        path: ObjectPath,
        type_name: &str,
        value: impl Into<String>,
        children: Option<Vec<ObjectValue>>,
    ) -> Self {
        let node = Self::build(ObjectValueKind::Object, source, path, type_name, value.into());
        *node.children.lock() = children;
        Self::wrap(node)
    }

    /// Leaf object standing for a null reference.
    #[must_use]
    pub fn null_object(name: &str, type_name: &str) -> Self {
        let mut node = Self::build(
            ObjectValueKind::Object,
            None,
            ObjectPath::new(name),
            type_name,
            "(null)".to_string(),
        );
        node.is_null = true;
        Self::wrap(node)
    }

    #[must_use]
    pub fn primitive(
        source: Option<Arc<dyn ObjectValueSource>>,
        path: ObjectPath,
        type_name: &str,
        value: impl Into<String>,
        editable: bool,
    ) -> Self {
        let mut node = Self::build(
            ObjectValueKind::Primitive,
            source,
            path,
            type_name,
            value.into(),
        );
        node.editable = editable;
        Self::wrap(node)
    }

    #[must_use]
    pub fn array(
        source: Option<Arc<dyn ObjectValueSource>>,
        path: ObjectPath,
        type_name: &str,
        len: usize,
        children: Option<Vec<ObjectValue>>,
    ) -> Self {
        let mut node = Self::build(
            ObjectValueKind::Array,
            source,
            path,
            type_name,
            format!("[{len}]"),
        );
        node.array_len = len;
        *node.children.lock() = children;
        Self::wrap(node)
    }

    #[must_use]
    pub fn unknown(name: &str) -> Self {
        Self::wrap(Self::build(
            ObjectValueKind::Unknown,
            None,
            ObjectPath::new(name),
            "",
            String::new(),
        ))
    }

    /// Leaf carrying an evaluation failure message.
    #[must_use]
    pub fn error(name: &str, message: impl Into<String>) -> Self {
        Self::wrap(Self::build(
            ObjectValueKind::Error,
            None,
            ObjectPath::new(name),
            "",
            message.into(),
        ))
    }

    #[must_use]
    pub fn not_supported(name: &str, message: impl Into<String>) -> Self {
        Self::wrap(Self::build(
            ObjectValueKind::NotSupported,
            None,
            ObjectPath::new(name),
            "",
            message.into(),
        ))
    }

    /// Placeholder for an evaluation that is still running.
    #[must_use]
    pub fn evaluating(name: &str, result: Receiver<ObjectValue>) -> Self {
        let mut node = Self::build(
            ObjectValueKind::Evaluating,
            None,
            ObjectPath::new(name),
            "",
            "Evaluating...".to_string(),
        );
        node.pending = Some(result);
        Self::wrap(node)
    }

    /// Override the array batch size. Values below 1 are clamped.
    #[must_use]
    pub fn with_fetch_chunk(self, chunk: usize) -> Self {
        self.node.fetch_chunk.store(chunk.max(1), Ordering::Relaxed);
        self
    }

    #[must_use]
    pub fn kind(&self) -> ObjectValueKind {
        self.node.kind
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.node.path.last()
    }

    #[must_use]
    pub fn path(&self) -> &ObjectPath {
        &self.node.path
    }

    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.node.type_name
    }

    /// Display text; for error nodes, the message.
    #[must_use]
    pub fn display_value(&self) -> String {
        self.node.value.read().clone()
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        self.node.is_null
    }

    #[must_use]
    pub fn is_array(&self) -> bool {
        self.node.kind == ObjectValueKind::Array
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        self.node.kind == ObjectValueKind::Error
    }

    #[must_use]
    pub fn is_evaluating(&self) -> bool {
        self.node.kind == ObjectValueKind::Evaluating
    }

    /// The final node behind an `Evaluating` placeholder, waiting up to `wait`.
    ///
    /// Any other node is its own result. `None` means the evaluation is still
    /// running; an evaluation that died resolves to an unknown node.
    #[must_use]
    pub fn wait_for_result(&self, wait: Duration) -> Option<ObjectValue> {
        let Some(pending) = self.node.pending.as_ref() else {
            return Some(self.clone());
        };
        let mut resolved = self.node.resolved.lock();
        if let Some(value) = resolved.as_ref() {
            return Some(value.clone());
        }
        let value = match pending.recv_timeout(wait) {
            Ok(value) => value,
            Err(RecvTimeoutError::Timeout) => return None,
            Err(RecvTimeoutError::Disconnected) => ObjectValue::unknown(self.name()),
        };
        *resolved = Some(value.clone());
        Some(value)
    }

    #[must_use]
    pub fn is_editable(&self) -> bool {
        self.node.editable && self.node.source.is_some()
    }

    pub fn array_len(&self) -> Result<usize, ValueError> {
        if !self.is_array() {
            return Err(ValueError::NotAnArray);
        }
        Ok(self.node.array_len)
    }

    #[must_use]
    pub fn has_children(&self) -> bool {
        if self.node.source.is_none() {
            return self
                .node
                .children
                .lock()
                .as_ref()
                .is_some_and(|children| !children.is_empty());
        }
        match self.node.kind {
            ObjectValueKind::Array => self.node.array_len > 0,
            ObjectValueKind::Object => !self.node.is_null,
            _ => false,
        }
    }

    /// Number of children materialized so far.
    #[must_use]
    pub fn cached_child_count(&self) -> usize {
        self.node.children.lock().as_ref().map_or(0, Vec::len)
    }

    /// Child by name. Fetches the full child set on first use.
    ///
    /// A fetch failure yields an error node and leaves the cache empty so a
    /// later call retries.
    pub fn get_child(&self, name: &str) -> Result<Option<ObjectValue>, ValueError> {
        if self.is_array() {
            return Err(ValueError::IsAnArray);
        }
        let mut children = self.node.children.lock();
        if children.is_none() {
            match self.fetch(ChildRange::All) {
                Ok(fetched) => *children = Some(fetched),
                Err(message) => return Ok(Some(ObjectValue::error("", message))),
            }
        }
        Ok(children
            .as_ref()
            .and_then(|children| children.iter().find(|child| child.name() == name))
            .cloned())
    }

    /// Every child. Arrays are materialized up to their last element.
    #[must_use]
    pub fn get_all_children(&self) -> Vec<ObjectValue> {
        if self.is_array() {
            if let Some(last) = self.node.array_len.checked_sub(1) {
                let item = self.get_array_item(last);
                if let Ok(item) = item.as_ref() {
                    if item.is_error() && self.cached_child_count() <= last {
                        return vec![item.clone()];
                    }
                }
            }
            return self.node.children.lock().clone().unwrap_or_default();
        }
        let mut children = self.node.children.lock();
        let cached = children.get_or_insert_with(|| match self.fetch(ChildRange::All) {
            Ok(fetched) => fetched,
            Err(message) => vec![ObjectValue::error("", message)],
        });
        cached.clone()
    }

    /// Array element `index`, fetching up to one chunk past it when missing.
    pub fn get_array_item(&self, index: usize) -> Result<ObjectValue, ValueError> {
        if !self.is_array() {
            return Err(ValueError::NotAnArray);
        }
        let len = self.node.array_len;
        if index >= len {
            return Err(ValueError::IndexOutOfRange { index, len });
        }
        let mut guard = self.node.children.lock();
        let cached = guard.get_or_insert_with(Vec::new);
        if index < cached.len() {
            return Ok(cached[index].clone());
        }
        let chunk = self.node.fetch_chunk.load(Ordering::Relaxed);
        let start = cached.len();
        let end = index.saturating_add(chunk).min(len);
        let name = format!("[{index}]");
        match self.fetch(ChildRange::Range {
            start,
            count: end - start,
        }) {
            Ok(mut items) => {
                items.truncate(end - start);
                cached.extend(items);
                Ok(cached.get(index).cloned().unwrap_or_else(|| {
                    ObjectValue::error(&name, "The debugger returned fewer array elements than requested")
                }))
            }
            Err(message) => Ok(ObjectValue::error(&name, message)),
        }
    }

    /// Assign through the source; the cached display text becomes the canonical form.
    pub fn set_value(&self, value: &str) -> Result<(), ValueError> {
        if !self.node.editable {
            return Err(ValueError::NotEditable);
        }
        let source = self.node.source.as_ref().ok_or(ValueError::NotEditable)?;
        let canonical = source.set_value(&self.node.path, value)?;
        *self.node.value.write() = canonical;
        Ok(())
    }

    fn fetch(&self, range: ChildRange) -> Result<Vec<ObjectValue>, String> {
        let Some(source) = self.node.source.as_ref() else {
            return Ok(Vec::new());
        };
        source
            .children(&self.node.path, range)
            .map_err(|err| err.to_string())
    }
}

impl fmt::Debug for ObjectValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectValue")
            .field("kind", &self.node.kind)
            .field("path", &self.node.path)
            .field("type_name", &self.node.type_name)
            .field("value", &*self.node.value.read())
            .finish_non_exhaustive()
    }
}
