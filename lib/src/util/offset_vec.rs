use std::fmt::{Debug, Error, Formatter};

/// Elements that occupy one or more consecutive offsets
pub trait Width {
    fn width(&self) -> usize;
}

/// Offset into an `OffsetVec`
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct Offset(pub usize);

/// Vector addressed by offsets, where each element claims as many offsets as its width
///
/// This is how the constant pool of a class file is indexed: most entries have width 1, but
/// `long` and `double` constants take up two indices and the second one is unusable. Lookups go
/// through a table with one slot per offset, so they take constant time.
#[derive(Clone)]
pub struct OffsetVec<T> {
    entries: Vec<T>,

    /// Index into `entries` for each offset, or `None` when the offset is the tail of a wide entry
    slots: Vec<Option<usize>>,

    /// Offset of the first element
    start: usize,
}

#[derive(Debug, PartialEq)]
pub enum OffsetResult<'a, T> {
    /// Element was accessed (along with its index)
    Ok(usize, &'a T),

    /// Offset falls in the middle of the element at this index
    InvalidOffset(usize),

    /// Offset is before the first element
    TooSmall,

    /// Offset is past the last element
    TooLarge,
}

impl<T: Width> OffsetVec<T> {
    pub fn new_starting_at(start: Offset) -> OffsetVec<T> {
        OffsetVec {
            entries: vec![],
            slots: vec![],
            start: start.0,
        }
    }

    /// Offset the next element will get
    pub fn offset_len(&self) -> Offset {
        Offset(self.start + self.slots.len())
    }

    /// Add an element to the back, returning its offset
    pub fn push(&mut self, entry: T) -> Offset {
        let offset = self.offset_len();
        let index = self.entries.len();
        self.slots.push(Some(index));
        for _ in 1..entry.width() {
            self.slots.push(None);
        }
        self.entries.push(entry);
        offset
    }

    pub fn get_offset(&self, offset: Offset) -> OffsetResult<'_, T> {
        if offset.0 < self.start {
            return OffsetResult::TooSmall;
        }
        match self.slots.get(offset.0 - self.start) {
            None => OffsetResult::TooLarge,
            Some(Some(index)) => OffsetResult::Ok(*index, &self.entries[*index]),
            Some(None) => {
                // Walk back to the head of the wide entry
                let head = self.slots[..offset.0 - self.start]
                    .iter()
                    .rev()
                    .find_map(|slot| *slot)
                    .unwrap_or(0);
                OffsetResult::InvalidOffset(head)
            }
        }
    }
}

impl<T: PartialEq> PartialEq for OffsetVec<T> {
    fn eq(&self, other: &Self) -> bool {
        self.start == other.start && self.entries == other.entries
    }
}

impl<T: Debug> Debug for OffsetVec<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        let mut list = f.debug_list();
        for (offset, slot) in self.slots.iter().enumerate() {
            if let Some(index) = slot {
                list.entry(&format_args!(
                    "#{} = {:?}",
                    self.start + offset,
                    self.entries[*index]
                ));
            }
        }
        list.finish()
    }
}
