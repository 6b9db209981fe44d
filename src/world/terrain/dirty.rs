use std::collections::BTreeSet;
use std::ops::Range;

/// Vertex indices touched by an edit, coalesced into contiguous runs when
/// the GPU copy is brought back in sync.
#[derive(Debug, Default, Clone)]
pub struct DirtyRanges {
    indices: BTreeSet<usize>,
}

impl DirtyRanges {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark(&mut self, index: usize) {
        self.indices.insert(index);
    }

    pub fn mark_range(&mut self, range: Range<usize>) {
        self.indices.extend(range);
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn contains(&self, index: usize) -> bool {
        self.indices.contains(&index)
    }

    /// Ascending, non-overlapping, non-adjacent runs.
    pub fn runs(&self) -> Vec<Range<usize>> {
        let mut runs: Vec<Range<usize>> = Vec::new();
        for &index in &self.indices {
            match runs.last_mut() {
                Some(run) if run.end == index => run.end += 1,
                _ => runs.push(index..index + 1),
            }
        }
        runs
    }

    pub fn clear(&mut self) {
        self.indices.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runs_coalesce_adjacent_indices() {
        let mut dirty = DirtyRanges::new();
        for i in [7, 3, 4, 5, 12, 8, 4] {
            dirty.mark(i);
        }
        assert_eq!(dirty.len(), 6);
        assert_eq!(dirty.runs(), vec![3..6, 7..9, 12..13]);
    }

    #[test]
    fn test_mark_range_and_clear() {
        let mut dirty = DirtyRanges::new();
        dirty.mark_range(10..14);
        dirty.mark(14);
        assert_eq!(dirty.runs(), vec![10..15]);
        dirty.clear();
        assert!(dirty.is_empty());
        assert!(dirty.runs().is_empty());
    }
}
