//! Selection capability
//!
//! Resolution logic never talks to a console directly; when a hint is
//! ambiguous it asks an injected `SelectionProvider`. The CLI renders a
//! numbered menu, tests return a fixed index.

use crate::error::Result;
use async_trait::async_trait;

#[async_trait]
pub trait SelectionProvider: Send + Sync {
    /// Present `items` under `prompt` and return the chosen 0-based index.
    async fn choose(&self, prompt: &str, items: &[String]) -> Result<usize>;
}
