//! Model identifiers and where their shape is resolved from.

use std::fmt;
use std::str::FromStr;

/// A model to estimate, tagged by the source its shape comes from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ModelRef {
    /// Repository on the remote model-hosting store (`org/name`).
    Remote(String),

    /// Model already known to the local model server (`llama3:8b`).
    Local {
        name: String,
        /// Layer count supplied by the caller; the server may not report it.
        layers: Option<u32>,
    },
}

impl ModelRef {
    /// Parse a user-supplied identifier.
    ///
    /// `hf:` and `ollama:` prefixes force a source. Otherwise an identifier
    /// with a `:tag` is local and anything else is a remote repository.
    pub fn parse(id: &str) -> Self {
        let id = id.trim();
        if let Some(rest) = id.strip_prefix("hf:") {
            return ModelRef::Remote(rest.to_string());
        }
        if let Some(rest) = id.strip_prefix("ollama:") {
            return ModelRef::local(rest);
        }
        if id.contains(':') {
            ModelRef::local(id)
        } else {
            ModelRef::Remote(id.to_string())
        }
    }

    pub fn remote(id: impl Into<String>) -> Self {
        ModelRef::Remote(id.into())
    }

    pub fn local(name: impl Into<String>) -> Self {
        ModelRef::Local {
            name: name.into(),
            layers: None,
        }
    }

    /// Attach a caller-supplied layer count (local models only).
    pub fn with_layers(self, n: u32) -> Self {
        match self {
            ModelRef::Local { name, .. } => ModelRef::Local {
                name,
                layers: Some(n),
            },
            remote => remote,
        }
    }

    /// The bare identifier, without source prefix.
    pub fn id(&self) -> &str {
        match self {
            ModelRef::Remote(id) => id,
            ModelRef::Local { name, .. } => name,
        }
    }

    /// In-memory cache key; distinct sources never share an entry.
    pub fn cache_key(&self) -> String {
        match self {
            ModelRef::Remote(id) => format!("hf:{id}"),
            ModelRef::Local { name, .. } => format!("ollama:{name}"),
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, ModelRef::Local { .. })
    }
}

impl fmt::Display for ModelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for ModelRef {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(ModelRef::parse(s))
    }
}
