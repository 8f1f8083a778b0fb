//! Multi-pattern matcher (spec §4.3, component C3).
//!
//! Built on the `aho-corasick` crate rather than a hand-rolled trie: the
//! crate already builds goto/failure/output tables and supports overlapping
//! matches via its `Standard` match kind, which is exactly the contract
//! spec §4.3 wants. This module narrows that general-purpose API down to
//! the specific one the carver needs: caller-assigned pattern ids, a
//! two-phase build/search lifecycle that fails closed (`InvalidState`) if
//! `search` is called too early, and `InvalidArgument` on an empty pattern.

use crate::error::{Error, Result};
use aho_corasick::{AhoCorasick, AhoCorasickBuilder, MatchKind};

enum State {
    Building { patterns: Vec<(u32, Vec<u8>)> },
    Built { ac: AhoCorasick, ids: Vec<u32> },
}

/// A multi-pattern byte matcher: register patterns with [`add_pattern`],
/// finalize with [`build`], then run repeated [`search`] passes.
///
/// [`add_pattern`]: PatternMatcher::add_pattern
/// [`build`]: PatternMatcher::build
/// [`search`]: PatternMatcher::search
pub struct PatternMatcher {
    state: State,
}

/// One occurrence: the caller-assigned pattern id and its absolute position
/// in the scanned stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hit {
    pub pattern_id: u32,
    pub position: u64,
}

impl Default for PatternMatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl PatternMatcher {
    pub fn new() -> Self {
        PatternMatcher {
            state: State::Building {
                patterns: Vec::new(),
            },
        }
    }

    /// Registers a pattern under construction. Patterns are kept in
    /// registration order, which fixes the tie-break order `search` reports
    /// hits in at the same offset (spec §4.5, "Determinism").
    pub fn add_pattern(&mut self, id: u32, bytes: &[u8]) -> Result<()> {
        match &mut self.state {
            State::Building { patterns } => {
                if bytes.is_empty() {
                    return Err(Error::invalid_argument("pattern bytes must not be empty"));
                }
                patterns.push((id, bytes.to_vec()));
                Ok(())
            }
            State::Built { .. } => Err(Error::invalid_argument(
                "cannot add a pattern after build() has been called",
            )),
        }
    }

    /// Finalizes the goto/failure/output tables. No-op (idempotent) if
    /// already built.
    pub fn build(&mut self) -> Result<()> {
        if let State::Building { patterns } = &self.state {
            let ids: Vec<u32> = patterns.iter().map(|(id, _)| *id).collect();
            let byte_patterns: Vec<&[u8]> = patterns.iter().map(|(_, b)| b.as_slice()).collect();
            let ac = AhoCorasickBuilder::new()
                .match_kind(MatchKind::Standard)
                .build(&byte_patterns)
                .map_err(|e| Error::invalid_argument(format!("failed to build matcher: {e}")))?;
            self.state = State::Built { ac, ids };
        }
        Ok(())
    }

    /// Returns every occurrence (including overlaps) of any registered
    /// pattern in `haystack`, in input order, with positions offset by
    /// `base_offset` so callers can scan a dump in chunks. Fails with
    /// `InvalidState` (modeled as `InvalidArgument` here, since this crate
    /// has no separate state-machine error kind) if called before `build`.
    pub fn search(&self, haystack: &[u8], base_offset: u64) -> Result<Vec<Hit>> {
        match &self.state {
            State::Built { ac, ids } => {
                let mut hits = Vec::new();
                let mut it = ac.find_overlapping_iter(haystack);
                while let Some(m) = it.next() {
                    hits.push(Hit {
                        pattern_id: ids[m.pattern().as_usize()],
                        position: base_offset + m.start() as u64,
                    });
                }
                Ok(hits)
            }
            State::Building { .. } => Err(Error::invalid_argument(
                "search() called before build(): matcher is not in a built state",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_pattern_rejected() {
        let mut m = PatternMatcher::new();
        assert!(m.add_pattern(0, b"").is_err());
    }

    #[test]
    fn search_before_build_fails() {
        let mut m = PatternMatcher::new();
        m.add_pattern(0, b"DDS ").unwrap();
        assert!(m.search(b"DDS ", 0).is_err());
    }

    #[test]
    fn finds_all_occurrences_in_order() {
        let mut m = PatternMatcher::new();
        m.add_pattern(1, &[0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a, 0x1a, 0x0a]).unwrap();
        m.build().unwrap();

        let mut haystack = vec![0u8; 5000];
        let png_magic = [0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a, 0x1a, 0x0a];
        haystack[5..13].copy_from_slice(&png_magic);
        haystack[4992..5000].copy_from_slice(&png_magic);

        let hits = m.search(&haystack, 0).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0], Hit { pattern_id: 1, position: 5 });
        assert_eq!(hits[1], Hit { pattern_id: 1, position: 4992 });
    }

    #[test]
    fn overlapping_hits_are_reported() {
        let mut m = PatternMatcher::new();
        m.add_pattern(1, b"aa").unwrap();
        m.build().unwrap();
        let hits = m.search(b"aaaa", 0).unwrap();
        assert_eq!(hits.len(), 3);
        assert_eq!(hits.iter().map(|h| h.position).collect::<Vec<_>>(), vec![0, 1, 2]);
    }

    #[test]
    fn base_offset_shifts_positions() {
        let mut m = PatternMatcher::new();
        m.add_pattern(7, b"DDS ").unwrap();
        m.build().unwrap();
        let hits = m.search(b"xxxDDS ", 0x1000).unwrap();
        assert_eq!(hits[0].position, 0x1003);
    }
}
