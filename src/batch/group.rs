//! Grouping of contiguous runs in a key-sorted stream.

/// Iterator adapter yielding `(key, items)` for each run of equal keys.
///
/// Input must be grouped by key upstream; a key that reappears after a
/// different one starts a new group.
pub struct GroupContiguous<I, K, V>
where
    I: Iterator<Item = (K, V)>,
{
    iter: I,
    pending: Option<(K, V)>,
}

pub fn group_contiguous<I, K, V>(iter: I) -> GroupContiguous<I::IntoIter, K, V>
where
    I: IntoIterator<Item = (K, V)>,
    K: PartialEq,
{
    GroupContiguous {
        iter: iter.into_iter(),
        pending: None,
    }
}

impl<I, K, V> Iterator for GroupContiguous<I, K, V>
where
    I: Iterator<Item = (K, V)>,
    K: PartialEq,
{
    type Item = (K, Vec<V>);

    fn next(&mut self) -> Option<Self::Item> {
        let (key, first) = self.pending.take().or_else(|| self.iter.next())?;
        let mut items = vec![first];

        for (k, v) in self.iter.by_ref() {
            if k == key {
                items.push(v);
            } else {
                self.pending = Some((k, v));
                break;
            }
        }

        Some((key, items))
    }
}

/// Like [`GroupContiguous`] over fallible items.
///
/// An error discards the group being collected, so a run cut short by a read
/// failure is never yielded as complete. Nothing is yielded after an error.
pub struct TryGroupContiguous<I, K, V> {
    iter: I,
    pending: Option<(K, V)>,
    failed: bool,
}

pub fn try_group_contiguous<I, K, V, E>(iter: I) -> TryGroupContiguous<I::IntoIter, K, V>
where
    I: IntoIterator<Item = Result<(K, V), E>>,
    K: PartialEq,
{
    TryGroupContiguous {
        iter: iter.into_iter(),
        pending: None,
        failed: false,
    }
}

impl<I, K, V, E> Iterator for TryGroupContiguous<I, K, V>
where
    I: Iterator<Item = Result<(K, V), E>>,
    K: PartialEq,
{
    type Item = Result<(K, Vec<V>), E>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }

        let (key, first) = match self.pending.take() {
            Some(pending) => pending,
            None => match self.iter.next()? {
                Ok(item) => item,
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e));
                }
            },
        };
        let mut items = vec![first];

        for item in self.iter.by_ref() {
            match item {
                Ok((k, v)) if k == key => items.push(v),
                Ok((k, v)) => {
                    self.pending = Some((k, v));
                    return Some(Ok((key, items)));
                }
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e));
                }
            }
        }

        Some(Ok((key, items)))
    }
}

/// Split an iterator into vectors of at most `size` items.
pub(crate) fn chunked<I: Iterator>(mut iter: I, size: usize) -> impl Iterator<Item = Vec<I::Item>> {
    let size = size.max(1);
    std::iter::from_fn(move || {
        let chunk: Vec<I::Item> = iter.by_ref().take(size).collect();
        (!chunk.is_empty()).then_some(chunk)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_groups_contiguous_keys() {
        let rows = vec![("a", 1), ("a", 2), ("b", 3), ("c", 4), ("c", 5), ("c", 6)];
        let groups: Vec<_> = group_contiguous(rows).collect();
        assert_eq!(
            groups,
            vec![("a", vec![1, 2]), ("b", vec![3]), ("c", vec![4, 5, 6])]
        );
    }

    #[test]
    fn test_reappearing_key_starts_new_group() {
        let rows = vec![("a", 1), ("b", 2), ("a", 3)];
        let groups: Vec<_> = group_contiguous(rows).collect();
        assert_eq!(groups, vec![("a", vec![1]), ("b", vec![2]), ("a", vec![3])]);
    }

    #[test]
    fn test_empty_stream() {
        let rows: Vec<(String, u32)> = Vec::new();
        assert_eq!(group_contiguous(rows).count(), 0);
    }

    #[test]
    fn test_error_discards_open_group() {
        let rows: Vec<Result<(&str, u32), &str>> =
            vec![Ok(("a", 1)), Ok(("a", 2)), Ok(("b", 3)), Err("read failed"), Ok(("b", 4))];
        let groups: Vec<_> = try_group_contiguous(rows).collect();
        assert_eq!(groups, vec![Ok(("a", vec![1, 2])), Err("read failed")]);
    }

    #[test]
    fn test_fallible_grouping_without_errors() {
        let rows: Vec<Result<(&str, u32), &str>> = vec![Ok(("a", 1)), Ok(("b", 2)), Ok(("b", 3))];
        let groups: Vec<_> = try_group_contiguous(rows).collect();
        assert_eq!(groups, vec![Ok(("a", vec![1])), Ok(("b", vec![2, 3]))]);
    }

    #[test]
    fn test_chunked() {
        let chunks: Vec<Vec<u32>> = chunked(1..=7, 3).collect();
        assert_eq!(chunks, vec![vec![1, 2, 3], vec![4, 5, 6], vec![7]]);
        assert_eq!(chunked(std::iter::empty::<u32>(), 3).count(), 0);
    }
}
