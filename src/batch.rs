//! Fixed-size grouping of a lazy stream.

/// Iterator returned by [`chunk`].
pub struct Chunks<I> {
    iter: I,
    size: usize,
    done: bool,
}

/// Group `stream` into `Vec`s of `size` items (the last may be shorter).
///
/// Only one group is held at a time, and iteration stops at the first empty group,
/// so no trailing empty batch is ever produced. A `size` of 0 is treated as 1.
pub fn chunk<I: IntoIterator>(stream: I, size: usize) -> Chunks<I::IntoIter> {
    Chunks { iter: stream.into_iter(), size: size.max(1), done: false }
}

impl<I: Iterator> Iterator for Chunks<I> {
    type Item = Vec<I::Item>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let group: Vec<I::Item> = self.iter.by_ref().take(self.size).collect();
        if group.is_empty() {
            self.done = true;
            return None;
        }
        Some(group)
    }
}

impl<I: Iterator> std::iter::FusedIterator for Chunks<I> {}
