//! Fixed-size batching of record sequences

use std::iter::Fuse;
use std::num::NonZeroUsize;

/// Lazy iterator of batches over an underlying record iterator
///
/// Every batch holds exactly `size` records except possibly the last, which
/// holds the remainder. Order is preserved and nothing is dropped. The source
/// is consumed once.
#[derive(Debug)]
pub struct Batches<I: Iterator> {
    source: Fuse<I>,
    size: NonZeroUsize,
}

/// Split `records` into batches of `size`
pub fn batches<I>(records: I, size: NonZeroUsize) -> Batches<I::IntoIter>
where
    I: IntoIterator,
{
    Batches {
        source: records.into_iter().fuse(),
        size,
    }
}

impl<I: Iterator> Iterator for Batches<I> {
    type Item = Vec<I::Item>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut batch = Vec::with_capacity(self.size.get().min(4096));
        batch.extend(self.source.by_ref().take(self.size.get()));
        if batch.is_empty() {
            None
        } else {
            Some(batch)
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let (lo, hi) = self.source.size_hint();
        let size = self.size.get();
        (lo.div_ceil(size), hi.map(|hi| hi.div_ceil(size)))
    }
}

/// Number of batches `len` records split into
pub fn batch_count(len: usize, size: NonZeroUsize) -> usize {
    len.div_ceil(size.get())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn size(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    #[test]
    fn test_remainder_goes_in_last_batch() {
        let out: Vec<Vec<u32>> = batches(1..=7, size(3)).collect();
        assert_eq!(out, vec![vec![1, 2, 3], vec![4, 5, 6], vec![7]]);
    }

    #[test]
    fn test_empty_source_yields_nothing() {
        let mut it = batches(Vec::<u32>::new(), size(5));
        assert!(it.next().is_none());
        assert!(it.next().is_none());
    }

    #[test]
    fn test_is_lazy() {
        let mut pulled = 0;
        let source = (0..100).inspect(|_| pulled += 1);
        let first = batches(source, size(10)).next().unwrap();
        assert_eq!(first.len(), 10);
        assert_eq!(pulled, 10);
    }

    proptest! {
        #[test]
        fn prop_batches_preserve_every_record_in_order(
            n in 0usize..2000,
            b in 1usize..300,
        ) {
            let out: Vec<Vec<usize>> = batches(0..n, size(b)).collect();

            prop_assert_eq!(out.len(), batch_count(n, size(b)));
            for (i, batch) in out.iter().enumerate() {
                prop_assert!(!batch.is_empty());
                prop_assert!(batch.len() <= b);
                if i + 1 < out.len() {
                    prop_assert_eq!(batch.len(), b);
                }
            }
            let flat: Vec<usize> = out.into_iter().flatten().collect();
            prop_assert_eq!(flat, (0..n).collect::<Vec<_>>());
        }
    }
}
