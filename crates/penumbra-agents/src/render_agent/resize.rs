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

//! Window-size changes, delivered from any thread and applied between frames.

use crossbeam_channel::Receiver;

/// A request to render at a new output size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResizeEvent {
    /// New width in pixels.
    pub width: u32,
    /// New height in pixels.
    pub height: u32,
}

impl ResizeEvent {
    /// A resize to `width` x `height`.
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// A minimised window reports a zero extent.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Drains every pending event and returns the size to switch to, if any.
///
/// Only the most recent non-empty event counts. `None` when nothing is pending,
/// when every pending event is empty, or when the last size equals `current`.
pub fn coalesce_resizes(events: &Receiver<ResizeEvent>, current: (u32, u32)) -> Option<(u32, u32)> {
    let last = events.try_iter().filter(|e| !e.is_empty()).last()?;
    let size = (last.width, last.height);
    (size != current).then_some(size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;

    #[test]
    fn test_last_event_wins() {
        let (tx, rx) = unbounded();
        tx.send(ResizeEvent::new(800, 600)).unwrap();
        tx.send(ResizeEvent::new(1024, 768)).unwrap();
        tx.send(ResizeEvent::new(1280, 720)).unwrap();
        assert_eq!(coalesce_resizes(&rx, (640, 480)), Some((1280, 720)));
        assert!(rx.is_empty());
    }

    #[test]
    fn test_empty_and_unchanged_sizes_are_ignored() {
        let (tx, rx) = unbounded();
        assert_eq!(coalesce_resizes(&rx, (640, 480)), None);

        tx.send(ResizeEvent::new(0, 480)).unwrap();
        tx.send(ResizeEvent::new(640, 0)).unwrap();
        assert_eq!(coalesce_resizes(&rx, (640, 480)), None);

        tx.send(ResizeEvent::new(1024, 768)).unwrap();
        tx.send(ResizeEvent::new(0, 0)).unwrap();
        assert_eq!(coalesce_resizes(&rx, (640, 480)), Some((1024, 768)));

        tx.send(ResizeEvent::new(640, 480)).unwrap();
        assert_eq!(coalesce_resizes(&rx, (640, 480)), None);
    }
}
