//! Named content blocks sent to a backend.

use serde::{Deserialize, Serialize};

/// One named piece of payload text, typically a file.
///
/// Lower `priority` values are dropped first when a payload must be trimmed.
/// Pinned blocks are never dropped.
///
/// # Examples
///
/// ```
/// use switchboard_core::ContentBlock;
///
/// let block = ContentBlock::new("main.rs", "fn main() {}")
///     .with_priority(5)
///     .with_pinned(true);
///
/// assert_eq!(block.chars(), 12);
/// assert!(*block.pinned());
/// ```
#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    derive_getters::Getters,
    derive_setters::Setters,
)]
#[setters(prefix = "with_")]
pub struct ContentBlock {
    /// Display name, usually a file path.
    #[setters(skip)]
    name: String,
    /// Block text.
    #[setters(skip)]
    content: String,
    /// Trim priority; lower is dropped first.
    #[serde(default)]
    priority: u32,
    /// Never dropped when set.
    #[serde(default)]
    pinned: bool,
}

impl ContentBlock {
    /// Create an unpinned block with priority 0.
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
            priority: 0,
            pinned: false,
        }
    }

    /// Size of the block in characters.
    pub fn chars(&self) -> usize {
        self.content.chars().count()
    }
}

/// Ordered collection of content blocks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PayloadSet {
    blocks: Vec<ContentBlock>,
}

impl PayloadSet {
    /// Create an empty payload set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a block, keeping insertion order.
    pub fn push(&mut self, block: ContentBlock) {
        self.blocks.push(block);
    }

    /// Builder-style [`push`](Self::push).
    pub fn with_block(mut self, block: ContentBlock) -> Self {
        self.push(block);
        self
    }

    /// Blocks in order.
    pub fn blocks(&self) -> &[ContentBlock] {
        &self.blocks
    }

    /// Iterate over blocks in order.
    pub fn iter(&self) -> std::slice::Iter<'_, ContentBlock> {
        self.blocks.iter()
    }

    /// Number of blocks.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Check if the set holds no blocks.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Total size in characters.
    pub fn total_chars(&self) -> usize {
        self.blocks.iter().map(ContentBlock::chars).sum()
    }

    /// Names of all blocks, in order.
    pub fn names(&self) -> Vec<&str> {
        self.blocks.iter().map(|b| b.name.as_str()).collect()
    }
}

impl FromIterator<ContentBlock> for PayloadSet {
    fn from_iter<I: IntoIterator<Item = ContentBlock>>(iter: I) -> Self {
        Self {
            blocks: iter.into_iter().collect(),
        }
    }
}

impl From<Vec<ContentBlock>> for PayloadSet {
    fn from(blocks: Vec<ContentBlock>) -> Self {
        Self { blocks }
    }
}

impl<'a> IntoIterator for &'a PayloadSet {
    type Item = &'a ContentBlock;
    type IntoIter = std::slice::Iter<'a, ContentBlock>;

    fn into_iter(self) -> Self::IntoIter {
        self.blocks.iter()
    }
}
