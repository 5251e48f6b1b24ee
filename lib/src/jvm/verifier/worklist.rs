use super::Frame;
use std::collections::{HashMap, VecDeque};

/// Branch target that still has to be (re-)verified
#[derive(Debug, Clone)]
pub struct WorklistItem {
    pub bci: usize,
    pub frame: Frame,

    /// Has the superclass constructor been called on every path reaching this item?
    pub constructor_called: bool,
}

/// Queue of pending branch targets, coalescing repeated entries for the same offset
///
/// When a target is queued again before it got processed, the queued frame is just replaced by
/// the newer (more general) one and the target keeps its position in the queue.
#[derive(Debug, Default)]
pub struct Worklist {
    order: VecDeque<usize>,
    pending: HashMap<usize, WorklistItem>,
}

impl Worklist {
    pub fn new() -> Worklist {
        Worklist::default()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn push(&mut self, item: WorklistItem) {
        match self.pending.get_mut(&item.bci) {
            Some(queued) => {
                queued.frame = item.frame;
                queued.constructor_called &= item.constructor_called;
            }
            None => {
                self.order.push_back(item.bci);
                self.pending.insert(item.bci, item);
            }
        }
    }

    pub fn pop(&mut self) -> Option<WorklistItem> {
        while let Some(bci) = self.order.pop_front() {
            if let Some(item) = self.pending.remove(&bci) {
                return Some(item);
            }
        }
        None
    }
}
