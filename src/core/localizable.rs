//! Strings that may be produced lazily from a resource
//!
//! Descriptor titles and messages can come from analyzer-supplied resource
//! lookups that fail long after the descriptor was handed to the engine.
//! Subscribed exception handlers are told about every such failure so it can
//! be reported against the analyzer that owns the string.

use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Callback notified when a resource string fails to produce its value
pub type LocalizableErrorHandler = Arc<dyn Fn(&anyhow::Error) + Send + Sync>;

type Producer = Box<dyn Fn() -> anyhow::Result<String> + Send + Sync>;

/// A lazily evaluated resource string
pub struct ResourceString {
    name: String,
    producer: Producer,
    handlers: Mutex<Vec<(u64, LocalizableErrorHandler)>>,
    next_handler_id: AtomicU64,
}

impl ResourceString {
    fn evaluate(&self) -> anyhow::Result<String> {
        let result = (self.producer)();
        if let Err(err) = &result {
            // Clone the handlers out so a handler can unsubscribe itself.
            let handlers: Vec<_> = self.handlers.lock().iter().map(|(_, h)| h.clone()).collect();
            for handler in handlers {
                handler(err);
            }
        }
        result
    }
}

/// Either a fixed string or a resource evaluated on demand
#[derive(Clone)]
pub enum LocalizableString {
    Fixed(Arc<str>),
    Resource(Arc<ResourceString>),
}

impl LocalizableString {
    pub fn fixed(value: impl Into<Arc<str>>) -> Self {
        LocalizableString::Fixed(value.into())
    }

    /// A string produced by `producer` each time it is formatted
    pub fn resource<F>(name: impl Into<String>, producer: F) -> Self
    where
        F: Fn() -> anyhow::Result<String> + Send + Sync + 'static,
    {
        LocalizableString::Resource(Arc::new(ResourceString {
            name: name.into(),
            producer: Box::new(producer),
            handlers: Mutex::new(Vec::new()),
            next_handler_id: AtomicU64::new(0),
        }))
    }

    pub fn is_localizable(&self) -> bool {
        matches!(self, LocalizableString::Resource(_))
    }

    /// Evaluate the string, surfacing producer failures
    pub fn to_string_checked(&self) -> anyhow::Result<String> {
        match self {
            LocalizableString::Fixed(value) => Ok(value.to_string()),
            LocalizableString::Resource(resource) => resource.evaluate(),
        }
    }

    /// Subscribe `handler` to evaluation failures
    ///
    /// Returns `None` for fixed strings, which cannot fail.
    pub fn add_exception_handler(&self, handler: LocalizableErrorHandler) -> Option<u64> {
        match self {
            LocalizableString::Fixed(_) => None,
            LocalizableString::Resource(resource) => {
                let id = resource.next_handler_id.fetch_add(1, Ordering::Relaxed);
                resource.handlers.lock().push((id, handler));
                Some(id)
            }
        }
    }

    pub fn remove_exception_handler(&self, id: u64) {
        if let LocalizableString::Resource(resource) = self {
            resource.handlers.lock().retain(|(handler_id, _)| *handler_id != id);
        }
    }

    pub fn exception_handler_count(&self) -> usize {
        match self {
            LocalizableString::Fixed(_) => 0,
            LocalizableString::Resource(resource) => resource.handlers.lock().len(),
        }
    }
}

impl Default for LocalizableString {
    fn default() -> Self {
        LocalizableString::Fixed(Arc::from(""))
    }
}

impl From<&str> for LocalizableString {
    fn from(value: &str) -> Self {
        LocalizableString::fixed(value)
    }
}

impl From<String> for LocalizableString {
    fn from(value: String) -> Self {
        LocalizableString::fixed(value)
    }
}

/// Formats the value, or nothing if the resource fails
impl fmt::Display for LocalizableString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_string_checked() {
            Ok(value) => f.write_str(&value),
            Err(_) => Ok(()),
        }
    }
}

impl fmt::Debug for LocalizableString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocalizableString::Fixed(value) => write!(f, "{:?}", value),
            LocalizableString::Resource(resource) => write!(f, "Resource({})", resource.name),
        }
    }
}

impl PartialEq for LocalizableString {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (LocalizableString::Fixed(a), LocalizableString::Fixed(b)) => a == b,
            (LocalizableString::Resource(a), LocalizableString::Resource(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}
