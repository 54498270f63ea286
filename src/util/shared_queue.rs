//! Append-only fact queues with detachable readers.
//!
//! The solver communicates newly discovered facts (reachable methods,
//! allocation facts, edges that need flushing) through these queues: a
//! producer keeps pushing while a consumer holds a [`QueueReader`] that can
//! be resumed after more elements have been appended. Facts are never
//! removed, so a reader is nothing but a cursor into the shared storage;
//! the `Rc<RefCell<..>>` indirection lets the reader live next to the queue
//! inside the same solver struct without borrowing it.

use std::cell::RefCell;
use std::fmt;
use std::fmt::Debug;
use std::rc::Rc;

pub struct SharedQueue<T> {
    elems: Rc<RefCell<Vec<T>>>,
}

impl<T> SharedQueue<T> {
    /// Creates an empty queue.
    pub fn new() -> Self {
        SharedQueue {
            elems: Rc::new(RefCell::new(Vec::new())),
        }
    }

    /// Returns the number of facts pushed so far.
    pub fn len(&self) -> usize {
        self.elems.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.elems.borrow().is_empty()
    }

    /// Appends a fact to the back of the queue.
    pub fn push(&mut self, elem: T) {
        self.elems.borrow_mut().push(elem);
    }
}

impl<T: Copy> SharedQueue<T> {
    /// Creates a reader positioned at the front of the queue.
    pub fn reader(&self) -> QueueReader<T> {
        QueueReader {
            elems: Rc::clone(&self.elems),
            pos: 0,
        }
    }
}

impl<T> Default for SharedQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Debug> Debug for SharedQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.elems.borrow().iter()).finish()
    }
}

/// A cursor over a [`SharedQueue`]. Yields `None` once it has caught up
/// with the producer; a later call can yield again after the queue grew.
/// Cloning a reader forks its position.
pub struct QueueReader<T> {
    elems: Rc<RefCell<Vec<T>>>,
    pos: usize,
}

impl<T> Clone for QueueReader<T> {
    fn clone(&self) -> Self {
        QueueReader {
            elems: Rc::clone(&self.elems),
            pos: self.pos,
        }
    }
}

impl<T: Copy> Iterator for QueueReader<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        let elem = self.elems.borrow().get(self.pos).copied()?;
        self.pos += 1;
        Some(elem)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn reader_resumes_after_growth() {
        let mut queue = SharedQueue::new();
        let mut reader = queue.reader();
        for i in 0..10 {
            queue.push(i);
        }
        let first: Vec<u32> = reader.by_ref().collect();
        assert_eq!(first, (0..10).collect::<Vec<_>>());
        assert_eq!(reader.next(), None);

        // Push more and resume the same reader; a forked reader keeps its
        // own position.
        let mut fork = reader.clone();
        for i in 10..200 {
            queue.push(i);
        }
        let rest: Vec<u32> = reader.collect();
        assert_eq!(rest, (10..200).collect::<Vec<_>>());
        assert_eq!(fork.next(), Some(10));
        assert_eq!(queue.len(), 200);
    }
}
