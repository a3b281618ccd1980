use std::ops::{Index, IndexMut};
use crate::renderer::config::MAX_FRAMES_IN_FLIGHT;

/// Identifies one of the parallel copies of every per-frame resource
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameSlot(usize);

impl FrameSlot {
    pub fn new(index: usize) -> Self {
        Self(index % MAX_FRAMES_IN_FLIGHT)
    }

    pub fn index(self) -> usize {
        self.0
    }

    pub fn next(self) -> Self {
        Self((self.0 + 1) % MAX_FRAMES_IN_FLIGHT)
    }

    pub fn all() -> impl Iterator<Item = FrameSlot> {
        (0..MAX_FRAMES_IN_FLIGHT).map(FrameSlot)
    }
}

/// One value per frame slot, indexed by `FrameSlot`
#[derive(Debug, Clone)]
pub struct PerFrame<T> {
    items: Vec<T>,
}

impl<T> PerFrame<T> {
    pub fn try_from_fn<E>(
        mut f: impl FnMut(FrameSlot) -> Result<T, E>,
    ) -> Result<Self, E> {
        let mut items = Vec::with_capacity(MAX_FRAMES_IN_FLIGHT);
        for slot in FrameSlot::all() {
            items.push(f(slot)?);
        }
        Ok(Self { items })
    }

    pub fn from_fn(mut f: impl FnMut(FrameSlot) -> T) -> Self {
        Self {
            items: FrameSlot::all().map(&mut f).collect(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.items.iter_mut()
    }
}

impl<T> Index<FrameSlot> for PerFrame<T> {
    type Output = T;

    fn index(&self, slot: FrameSlot) -> &T {
        &self.items[slot.0]
    }
}

impl<T> IndexMut<FrameSlot> for PerFrame<T> {
    fn index_mut(&mut self, slot: FrameSlot) -> &mut T {
        &mut self.items[slot.0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slots_wrap_around() {
        let mut slot = FrameSlot::default();
        for k in 0..10 {
            assert_eq!(slot.index(), k % MAX_FRAMES_IN_FLIGHT);
            slot = slot.next();
        }
    }

    #[test]
    fn per_frame_holds_one_value_per_slot() {
        let values = PerFrame::from_fn(|slot| slot.index() * 10);
        assert_eq!(values.iter().count(), MAX_FRAMES_IN_FLIGHT);
        for slot in FrameSlot::all() {
            assert_eq!(values[slot], slot.index() * 10);
        }
    }

    #[test]
    fn per_frame_construction_stops_at_first_error() {
        let mut calls = 0;
        let result: Result<PerFrame<u32>, &str> = PerFrame::try_from_fn(|_| {
            calls += 1;
            Err("boom")
        });
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }
}
