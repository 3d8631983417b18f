//! Template rendering into a bounded payload buffer.
//!
//! Templates are plain text with `${name}` markers, each replaced by the
//! current value of the named variable. `$$` produces a literal `$`. Unknown
//! variables render as nothing; an unterminated marker is copied verbatim.

use std::path::Path;
use std::sync::Arc;

use tracing::trace;

use crate::error::RenderError;
use crate::network::MAX_DATAGRAM_SIZE;
use crate::store::Store;

/// Staging buffer for one rendered datagram.
///
/// Allocated once, up front, and reused for every render. Holds the content
/// only: it can never contain a NUL byte and never exceeds
/// [`MAX_DATAGRAM_SIZE`].
#[derive(Debug)]
pub struct Payload {
    buf: Vec<u8>,
}

impl Payload {
    /// Allocates the staging buffer.
    ///
    /// # Errors
    /// Returns [`RenderError::Alloc`] if the memory cannot be reserved.
    pub fn new() -> Result<Self, RenderError> {
        let mut buf = Vec::new();
        buf.try_reserve_exact(MAX_DATAGRAM_SIZE)?;
        Ok(Self { buf })
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// Appends rendered bytes, enforcing the size and NUL constraints.
    pub fn push(&mut self, bytes: &[u8]) -> Result<(), RenderError> {
        if bytes.contains(&0) {
            return Err(RenderError::EmbeddedNul);
        }
        if self.buf.len() + bytes.len() > MAX_DATAGRAM_SIZE {
            return Err(RenderError::TooLarge {
                limit: MAX_DATAGRAM_SIZE,
            });
        }
        self.buf.extend_from_slice(bytes);
        Ok(())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

/// Renders a template file into a payload.
pub trait Render: Send + Sync {
    /// Renders the template at `path` into `out`, which the caller has cleared.
    fn render(&self, path: &Path, out: &mut Payload) -> Result<(), RenderError>;
}

/// [`Render`] implementation that resolves markers against a [`Store`].
pub struct TemplateRenderer {
    store: Arc<dyn Store>,
}

impl TemplateRenderer {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    fn lookup(&self, name: &str) -> Option<String> {
        let (handle, _) = self.store.find(name)?;
        self.store.get(handle).ok().map(|value| value.to_string())
    }
}

impl Render for TemplateRenderer {
    fn render(&self, path: &Path, out: &mut Payload) -> Result<(), RenderError> {
        let template = std::fs::read(path).map_err(|source| RenderError::Open {
            path: path.to_path_buf(),
            source,
        })?;

        let mut rest = template.as_slice();
        while let Some(pos) = rest.iter().position(|&b| b == b'$') {
            out.push(&rest[..pos])?;
            rest = &rest[pos..];
            match rest.get(1) {
                Some(b'$') => {
                    out.push(b"$")?;
                    rest = &rest[2..];
                }
                Some(b'{') => match rest.iter().position(|&b| b == b'}') {
                    Some(end) => {
                        let name = String::from_utf8_lossy(&rest[2..end]);
                        match self.lookup(&name) {
                            Some(value) => out.push(value.as_bytes())?,
                            None => trace!("Template references unknown variable {}", name),
                        }
                        rest = &rest[end + 1..];
                    }
                    None => {
                        out.push(rest)?;
                        rest = &[];
                    }
                },
                _ => {
                    out.push(b"$")?;
                    rest = &rest[1..];
                }
            }
        }
        out.push(rest)
    }
}
