//! Format tag to handler resolution.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use courier_core::{ConfigurationError, FormatTag};
use lazy_static::lazy_static;
use tracing::debug;

use super::{
    ByteFormat, FormatHandler, ImageFormat, JsonFormat, JsonHalFormat, MultipartFormat,
    TextFormat, XmlFormat,
};

/// Builds a handler for one envelope.
///
/// Stateless formats hand out a shared instance; per-call formats such as
/// multipart build a new one each time.
pub type HandlerFactory = Arc<dyn Fn() -> Arc<dyn FormatHandler> + Send + Sync>;

lazy_static! {
    static ref DEFAULT_REGISTRY: FormatRegistry = FormatRegistry::with_builtin();
}

/// Maps format tags to handler factories.
///
/// ```
/// use courier_core::FormatTag;
/// use courier_format::FormatRegistry;
///
/// let registry = FormatRegistry::default();
/// let handler = registry.resolve(FormatTag::Json).unwrap();
/// assert_eq!(handler.accept_value(), Some("application/json"));
///
/// assert!(FormatRegistry::empty().resolve(FormatTag::Json).is_err());
/// ```
#[derive(Clone)]
pub struct FormatRegistry {
    factories: HashMap<FormatTag, HandlerFactory>,
}

impl FormatRegistry {
    /// Registry with no handlers.
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Shared registry with every built-in handler.
    pub fn global() -> &'static FormatRegistry {
        &DEFAULT_REGISTRY
    }

    fn with_builtin() -> Self {
        Self::empty()
            .with_shared(Arc::new(JsonFormat))
            .with_shared(Arc::new(JsonHalFormat))
            .with_shared(Arc::new(XmlFormat))
            .with_shared(Arc::new(TextFormat))
            .with_shared(Arc::new(ByteFormat))
            .with_shared(Arc::new(ImageFormat))
            .with_factory(FormatTag::Multipart, || {
                Arc::new(MultipartFormat::new()) as Arc<dyn FormatHandler>
            })
    }

    /// Registers a factory, replacing any previous one for the tag.
    pub fn register(&mut self, tag: FormatTag, factory: HandlerFactory) {
        if self.factories.insert(tag, factory).is_some() {
            debug!(tag = tag.name(), "Replaced format handler");
        }
    }

    /// Builder-style [`register`](Self::register).
    pub fn with_factory<F>(mut self, tag: FormatTag, factory: F) -> Self
    where
        F: Fn() -> Arc<dyn FormatHandler> + Send + Sync + 'static,
    {
        self.register(tag, Arc::new(factory));
        self
    }

    /// Registers a stateless handler under its own tag.
    pub fn with_shared(self, handler: Arc<dyn FormatHandler>) -> Self {
        let tag = handler.tag();
        self.with_factory(tag, move || Arc::clone(&handler))
    }

    /// Whether a handler is registered for the tag.
    pub fn contains(&self, tag: FormatTag) -> bool {
        self.factories.contains_key(&tag)
    }

    /// Resolves a handler.
    ///
    /// An unregistered tag is a configuration error; envelopes surface it
    /// at construction.
    pub fn resolve(&self, tag: FormatTag) -> Result<Arc<dyn FormatHandler>, ConfigurationError> {
        self.factories
            .get(&tag)
            .map(|factory| factory())
            .ok_or(ConfigurationError::UnregisteredFormat(tag))
    }
}

impl Default for FormatRegistry {
    fn default() -> Self {
        Self::global().clone()
    }
}

impl fmt::Debug for FormatRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tags: Vec<_> = self.factories.keys().map(FormatTag::name).collect();
        tags.sort_unstable();
        f.debug_struct("FormatRegistry").field("tags", &tags).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::{Charset, FormatError, Headers, Payload};

    #[derive(Debug)]
    struct Shouting;

    impl FormatHandler for Shouting {
        fn tag(&self) -> FormatTag {
            FormatTag::Text
        }

        fn content_type(&self, _charset: Charset) -> String {
            "text/shouting".into()
        }

        fn serialize_body(
            &self,
            _body: &dyn erased_serde::Serialize,
            _charset: Charset,
        ) -> Result<bytes::Bytes, FormatError> {
            Ok(bytes::Bytes::from_static(b"HEY"))
        }

        fn deserialize(
            &self,
            raw: &[u8],
            _status: u16,
            _headers: &Headers,
        ) -> Result<Payload, FormatError> {
            Ok(Payload::Text(String::from_utf8_lossy(raw).to_uppercase()))
        }
    }

    #[test]
    fn test_every_builtin_tag_resolves() {
        let registry = FormatRegistry::default();
        for tag in FormatTag::ALL {
            assert_eq!(registry.resolve(tag).unwrap().tag(), tag);
        }
    }

    #[test]
    fn test_unregistered_tag_is_a_configuration_error() {
        let error = FormatRegistry::empty().resolve(FormatTag::Xml).unwrap_err();
        assert!(matches!(
            error,
            ConfigurationError::UnregisteredFormat(FormatTag::Xml)
        ));
    }

    #[test]
    fn test_register_overrides_builtin() {
        let registry = FormatRegistry::default().with_shared(Arc::new(Shouting));
        let handler = registry.resolve(FormatTag::Text).unwrap();
        assert_eq!(handler.content_type(Charset::Utf8), "text/shouting");
    }

    #[test]
    fn test_multipart_is_built_per_call() {
        let registry = FormatRegistry::default();
        let first = registry.resolve(FormatTag::Multipart).unwrap();
        let second = registry.resolve(FormatTag::Multipart).unwrap();
        assert_ne!(
            first.content_type(Charset::Utf8),
            second.content_type(Charset::Utf8)
        );
    }
}
