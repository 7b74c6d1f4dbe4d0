use std::any::Any;
use std::fmt::{self, Debug, Formatter};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// A history item owned by the provider that produced it.
///
/// Providers often need more than the assistant text to continue a
/// conversation: a tool-calling turn must be replayed with its call ids,
/// some reasoning models want their reasoning back. The provider wraps
/// its native message in an `OpaqueMessage`, the agent stores it in the
/// checkpointed conversation untouched, and the provider unwraps it again
/// when serializing the next request.
///
/// Two opaque messages are equal when their ids are equal.
pub struct OpaqueMessage(Arc<dyn Payload>);

impl OpaqueMessage {
    /// Wraps `value` under `id`, which must be unique within a thread.
    #[inline]
    pub fn new<ID: Into<String>, T: Send + Sync + 'static>(
        id: ID,
        value: T,
    ) -> Self {
        Self(Arc::new(Entry {
            id: id.into(),
            value,
        }))
    }

    /// Returns the id this message was created with.
    #[inline]
    pub fn id(&self) -> &str {
        self.0.id()
    }

    /// Returns the wrapped value if it is a `T`.
    #[inline]
    pub fn to_raw<T: 'static>(&self) -> Option<&T> {
        self.0.as_any().downcast_ref()
    }
}

impl Clone for OpaqueMessage {
    #[inline]
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl Debug for OpaqueMessage {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_tuple("OpaqueMessage").field(&self.id()).finish()
    }
}

impl PartialEq for OpaqueMessage {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for OpaqueMessage {}

impl Hash for OpaqueMessage {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

trait Payload: Send + Sync {
    fn id(&self) -> &str;
    fn as_any(&self) -> &dyn Any;
}

struct Entry<T> {
    id: String,
    value: T,
}

impl<T: Send + Sync + 'static> Payload for Entry<T> {
    fn id(&self) -> &str {
        &self.id
    }

    fn as_any(&self) -> &dyn Any {
        &self.value
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[derive(Clone, Debug, PartialEq)]
    struct NativeAssistantMessage {
        content: String,
        call_ids: Vec<String>,
    }

    #[test]
    fn test_unwrap_native_message() {
        let native = NativeAssistantMessage {
            content: "Je regarde la houle.".to_owned(),
            call_ids: vec!["call_0".to_owned()],
        };
        let opaque = OpaqueMessage::new("chatcmpl-1", native.clone());
        assert_eq!(opaque.id(), "chatcmpl-1");
        assert_eq!(opaque.to_raw::<NativeAssistantMessage>(), Some(&native));
        assert!(opaque.to_raw::<String>().is_none());
    }

    #[test]
    fn test_identity_is_the_id() {
        let first = OpaqueMessage::new("a", 1u32);
        let same_id = OpaqueMessage::new("a", 2u32);
        let other = OpaqueMessage::new("b", 1u32);

        assert_eq!(first, same_id);
        assert_ne!(first, other);

        let set: HashSet<_> = [first.clone(), same_id, other].into_iter().collect();
        assert_eq!(set.len(), 2);
        assert!(set.contains(&first));
    }
}
