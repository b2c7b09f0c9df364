// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Per-drawable occlusion-query bookkeeping.
//!
//! Query results arrive a few frames late. Each drawable cycles through a small ring of
//! query slots; a slot is read back just before it is re-issued, so the result used in
//! a frame belongs to a query issued [`OCCLUSION_QUERY_RING`] frames earlier.

use penumbra_core::renderer::QueryId;

/// Query slots per drawable. A drawable is occluded after more consecutive occluded
/// frames than this.
pub const OCCLUSION_QUERY_RING: usize = 3;

/// The query ring and the occluded-frame counter of one drawable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OcclusionState {
    queries: [Option<QueryId>; OCCLUSION_QUERY_RING],
    issued: [bool; OCCLUSION_QUERY_RING],
    current: usize,
    consecutive_occluded_frames: u32,
}

impl OcclusionState {
    /// Moves to the next slot of the ring and returns its index.
    pub fn advance(&mut self) -> usize {
        self.current = (self.current + 1) % OCCLUSION_QUERY_RING;
        self.current
    }

    /// The slot used this frame.
    pub fn current_slot(&self) -> usize {
        self.current
    }

    /// The query object of the current slot, if one was created.
    pub fn current_query(&self) -> Option<QueryId> {
        self.queries[self.current]
    }

    /// Stores a lazily created query object in the current slot.
    pub fn set_current_query(&mut self, query: QueryId) {
        self.queries[self.current] = Some(query);
    }

    /// Returns the query of the current slot if it was issued in an earlier frame and
    /// not read back since. The slot is considered consumed afterwards.
    pub fn take_pending(&mut self) -> Option<QueryId> {
        if std::mem::replace(&mut self.issued[self.current], false) {
            self.queries[self.current]
        } else {
            None
        }
    }

    /// Marks the current slot as issued this frame.
    pub fn mark_issued(&mut self) {
        self.issued[self.current] = true;
    }

    /// Folds a query result into the counter.
    ///
    /// Zero samples counts as one more occluded frame. Any sample, or a result that
    /// is not available yet, resets the counter.
    pub fn record_result(&mut self, samples: Option<u64>) {
        match samples {
            Some(0) => {
                self.consecutive_occluded_frames =
                    self.consecutive_occluded_frames.saturating_add(1)
            }
            _ => self.consecutive_occluded_frames = 0,
        }
    }

    /// Forgets every pending result and reports the drawable visible.
    pub fn suspend(&mut self) {
        self.issued = [false; OCCLUSION_QUERY_RING];
        self.consecutive_occluded_frames = 0;
    }

    /// Number of consecutive frames the drawable was reported occluded.
    pub fn consecutive_occluded_frames(&self) -> u32 {
        self.consecutive_occluded_frames
    }

    /// Returns `true` once the drawable has been occluded for more than
    /// [`OCCLUSION_QUERY_RING`] consecutive frames.
    pub fn is_occluded(&self) -> bool {
        self.consecutive_occluded_frames > OCCLUSION_QUERY_RING as u32
    }

    /// Removes and returns every query object so the caller can destroy them.
    pub fn take_queries(&mut self) -> impl Iterator<Item = QueryId> {
        self.issued = [false; OCCLUSION_QUERY_RING];
        std::mem::take(&mut self.queries).into_iter().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_is_monotonic_and_resets() {
        let mut state = OcclusionState::default();
        for expected in 1..=5 {
            state.record_result(Some(0));
            assert_eq!(state.consecutive_occluded_frames(), expected);
        }
        state.record_result(Some(12));
        assert_eq!(state.consecutive_occluded_frames(), 0);
    }

    #[test]
    fn test_occluded_only_after_more_than_ring_frames() {
        let mut state = OcclusionState::default();
        for _ in 0..OCCLUSION_QUERY_RING {
            state.record_result(Some(0));
            assert!(!state.is_occluded());
        }
        state.record_result(Some(0));
        assert!(state.is_occluded());
    }

    #[test]
    fn test_unresolved_result_is_visible() {
        let mut state = OcclusionState::default();
        state.record_result(Some(0));
        state.record_result(None);
        assert_eq!(state.consecutive_occluded_frames(), 0);
    }

    #[test]
    fn test_ring_wraps() {
        let mut state = OcclusionState::default();
        let slots: Vec<_> = (0..4).map(|_| state.advance()).collect();
        assert_eq!(slots, vec![1, 2, 0, 1]);
    }

    #[test]
    fn test_issue_flags() {
        let mut state = OcclusionState::default();
        state.advance();
        assert_eq!(state.take_pending(), None);
        state.set_current_query(QueryId(7));
        state.mark_issued();
        assert_eq!(state.take_pending(), Some(QueryId(7)));
        assert_eq!(state.take_pending(), None, "a result is consumed once");

        state.mark_issued();
        state.suspend();
        assert_eq!(state.take_pending(), None);
        assert_eq!(state.take_queries().collect::<Vec<_>>(), vec![QueryId(7)]);
        assert_eq!(state.current_query(), None);
    }
}
