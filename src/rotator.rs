use std::time::Duration;

use crate::banner::{Banner, BannerId};

pub const DEFAULT_ROTATION_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RotationState {
    Empty,
    Showing(usize),
}

/// Cycles through the eligible banners of one slot.
#[derive(Clone, Debug)]
pub struct Rotator {
    candidates: Vec<Banner>,
    state: RotationState,
}

impl Rotator {
    pub fn new(candidates: Vec<Banner>) -> Rotator {
        let state = if candidates.is_empty() {
            RotationState::Empty
        } else {
            RotationState::Showing(0)
        };

        Rotator { candidates, state }
    }

    pub fn state(&self) -> RotationState {
        self.state
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn candidates(&self) -> &[Banner] {
        &self.candidates
    }

    pub fn current(&self) -> Option<&Banner> {
        match self.state {
            RotationState::Empty => None,
            RotationState::Showing(cursor) => self.candidates.get(cursor),
        }
    }

    /// Moves to the next banner. Returns the banner that became current, or
    /// `None` when there is nothing to rotate between.
    pub fn advance(&mut self) -> Option<&Banner> {
        let cursor = match self.state {
            RotationState::Showing(cursor) if self.candidates.len() > 1 => cursor,
            _ => return None,
        };

        let next = (cursor + 1) % self.candidates.len();
        self.state = RotationState::Showing(next);
        self.candidates.get(next)
    }

    /// Swaps in a fresh candidate list and starts over from the first one.
    /// Returns the new current banner if it is a different banner than before.
    pub fn replace(&mut self, candidates: Vec<Banner>) -> Option<&Banner> {
        let previous: Option<BannerId> = self.current().map(|banner| banner.id);
        *self = Rotator::new(candidates);

        match self.current() {
            Some(banner) if Some(banner.id) != previous => Some(banner),
            _ => None,
        }
    }
}
