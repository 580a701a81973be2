//! Fragment batching.
//!
//! Groups an ordered fragment sequence into contiguous [`Batch`]es whose
//! cumulative character length reaches a configured threshold. The final
//! remainder is always emitted, however short, so no fragment is ever
//! dropped. Lazy: batches are produced on demand.

/// A contiguous run of fragments submitted together for rewriting.
/// Borrowed from the per-file fragment list; consumed by one rewrite cycle.
#[derive(Debug, Clone, Copy)]
pub struct Batch<'a> {
    pub fragments: &'a [String],
}

impl<'a> Batch<'a> {
    /// The concatenated input string sent to the rewrite provider,
    /// fragments in original order.
    pub fn concat(&self) -> String {
        self.fragments.concat()
    }

    /// Total character count in Unicode scalar values, not bytes; CJK
    /// captions would otherwise triple-count.
    pub fn char_len(&self) -> usize {
        self.fragments.iter().map(|f| f.chars().count()).sum()
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }
}

/// Iterate `fragments` as batches of at least `context_len` characters
/// (except possibly the last).
pub fn batches(fragments: &[String], context_len: usize) -> Batches<'_> {
    Batches {
        fragments,
        context_len,
        pos: 0,
    }
}

pub struct Batches<'a> {
    fragments: &'a [String],
    context_len: usize,
    pos: usize,
}

impl<'a> Iterator for Batches<'a> {
    type Item = Batch<'a>;

    fn next(&mut self) -> Option<Batch<'a>> {
        if self.pos >= self.fragments.len() {
            return None;
        }

        let start = self.pos;
        let mut chars = 0usize;
        while self.pos < self.fragments.len() {
            chars += self.fragments[self.pos].chars().count();
            self.pos += 1;
            if chars >= self.context_len {
                break;
            }
        }

        Some(Batch {
            fragments: &self.fragments[start..self.pos],
        })
    }
}

/// Number of batches the iterator will yield, without consuming it.
/// Used for progress totals and dry-run estimates.
pub fn batch_count(fragments: &[String], context_len: usize) -> usize {
    batches(fragments, context_len).count()
}
