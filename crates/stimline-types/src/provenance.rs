use std::fmt;
use std::sync::Arc;

/// One link in the append-only history of a derived stimulus or result.
///
/// Records which transformer, with which parameters, produced an output.
/// Links are shared `Arc`s and never mutated after creation; deriving a new
/// output extends the chain with a fresh head.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Provenance {
    transformer: String,
    params: String,
    parent: Option<Arc<Provenance>>,
}

impl Provenance {
    pub fn new(transformer: impl Into<String>, params: impl Into<String>) -> Self {
        Self {
            transformer: transformer.into(),
            params: params.into(),
            parent: None,
        }
    }

    pub fn derived(
        transformer: impl Into<String>,
        params: impl Into<String>,
        parent: Arc<Provenance>,
    ) -> Self {
        Self {
            transformer: transformer.into(),
            params: params.into(),
            parent: Some(parent),
        }
    }

    pub fn transformer(&self) -> &str {
        &self.transformer
    }

    pub fn params(&self) -> &str {
        &self.params
    }

    pub fn parent(&self) -> Option<&Arc<Provenance>> {
        self.parent.as_ref()
    }

    /// The chain from this link back to the root, newest first.
    pub fn chain(&self) -> impl Iterator<Item = &Provenance> {
        std::iter::successors(Some(self), |link| link.parent().map(Arc::as_ref))
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, link) in self.chain().enumerate() {
            if idx > 0 {
                f.write_str(" <- ")?;
            }
            if link.params.is_empty() {
                write!(f, "{}", link.transformer)?;
            } else {
                write!(f, "{}({})", link.transformer, link.params)?;
            }
        }
        Ok(())
    }
}
