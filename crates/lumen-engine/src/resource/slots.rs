//! Generational slot storage backing every engine handle.

/// Index + generation. A freed slot bumps its generation, so ids issued
/// before the free no longer resolve.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotId {
    index: u32,
    generation: u32,
}

impl SlotId {
    pub fn index(self) -> u32 {
        self.index
    }

    pub fn generation(self) -> u32 {
        self.generation
    }
}

#[derive(Debug, Clone)]
struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Dense storage with index recycling through a free list.
#[derive(Debug, Clone)]
pub struct Slots<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    len: usize,
}

impl<T> Default for Slots<T> {
    fn default() -> Self {
        Self { slots: Vec::new(), free: Vec::new(), len: 0 }
    }
}

impl<T> Slots<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, value: T) -> SlotId {
        self.len += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.generation += 1;
            slot.value = Some(value);
            SlotId { index, generation: slot.generation }
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Slot { generation: 0, value: Some(value) });
            SlotId { index, generation: 0 }
        }
    }

    pub fn get(&self, id: SlotId) -> Option<&T> {
        self.slots
            .get(id.index as usize)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.value.as_ref())
    }

    pub fn get_mut(&mut self, id: SlotId) -> Option<&mut T> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.value.as_mut())
    }

    pub fn contains(&self, id: SlotId) -> bool {
        self.get(id).is_some()
    }

    pub fn remove(&mut self, id: SlotId) -> Option<T> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        let value = slot.value.take()?;
        self.free.push(id.index);
        self.len -= 1;
        Some(value)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Live ids in slot order.
    pub fn ids(&self) -> Vec<SlotId> {
        self.iter().map(|(id, _)| id).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (SlotId, &T)> {
        self.slots.iter().enumerate().filter_map(|(i, s)| {
            s.value
                .as_ref()
                .map(|v| (SlotId { index: i as u32, generation: s.generation }, v))
        })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (SlotId, &mut T)> {
        self.slots.iter_mut().enumerate().filter_map(|(i, s)| {
            let generation = s.generation;
            s.value
                .as_mut()
                .map(move |v| (SlotId { index: i as u32, generation }, v))
        })
    }

    /// Removes every value, keeping generations so old ids stay stale.
    pub fn drain(&mut self) -> Vec<T> {
        let mut out = Vec::with_capacity(self.len);
        for (i, slot) in self.slots.iter_mut().enumerate() {
            if let Some(v) = slot.value.take() {
                out.push(v);
                self.free.push(i as u32);
            }
        }
        self.len = 0;
        out
    }
}

/// Declares a `Copy` handle newtype over [`SlotId`].
macro_rules! slot_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub(crate) $crate::resource::slots::SlotId);

        impl $name {
            pub fn slot(self) -> $crate::resource::slots::SlotId {
                self.0
            }
        }
    };
}

pub(crate) use slot_handle;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removed_id_is_stale_after_reuse() {
        let mut s = Slots::new();
        let a = s.insert("a");
        assert_eq!(s.remove(a), Some("a"));
        let b = s.insert("b");
        assert_eq!(a.index(), b.index());
        assert_ne!(a, b);
        assert_eq!(s.get(a), None);
        assert_eq!(s.get(b), Some(&"b"));
    }

    #[test]
    fn double_remove_is_none() {
        let mut s = Slots::new();
        let a = s.insert(1);
        assert!(s.remove(a).is_some());
        assert!(s.remove(a).is_none());
        assert!(s.is_empty());
    }

    #[test]
    fn drain_keeps_generations() {
        let mut s = Slots::new();
        let a = s.insert(1);
        let _ = s.insert(2);
        assert_eq!(s.drain().len(), 2);
        assert!(s.get(a).is_none());
        let c = s.insert(3);
        assert_ne!(c, a);
    }

    #[test]
    fn iter_yields_live_values() {
        let mut s = Slots::new();
        let a = s.insert(1);
        let b = s.insert(2);
        s.remove(a);
        let ids = s.ids();
        assert_eq!(ids, vec![b]);
        for (_, v) in s.iter_mut() {
            *v += 10;
        }
        assert_eq!(s.get(b), Some(&12));
    }
}
