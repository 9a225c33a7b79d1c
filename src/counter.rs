//! Odometer-style enumeration of multi-dimensional indices

use std::iter::FusedIterator;

#[derive(Debug, Clone, PartialEq, Eq)]
enum CounterState {
    /// Index vector to hand out on the next call
    Pending(Vec<usize>),
    Exhausted,
}

/// Enumerates every index vector of an n-dimensional box
///
/// Dimension `i` takes the values `0..=maxim[i]`. Enumeration starts at the
/// all-zero vector; each step increments the last dimension that is still
/// below its maximum and resets every dimension after it, so the last
/// dimension varies fastest.
///
/// ```
/// use orthoconv::counter::MultiDimCounter;
///
/// let indices: Vec<Vec<usize>> = MultiDimCounter::new(vec![1, 2]).collect();
/// assert_eq!(indices.len(), 6);
/// assert_eq!(indices[3], vec![1, 0]);
/// ```
#[derive(Debug, Clone)]
pub struct MultiDimCounter {
    maxim: Vec<usize>,
    state: CounterState,
}

impl MultiDimCounter {
    /// Count over `0..=maxim[i]` in every dimension
    pub fn new(maxim: Vec<usize>) -> Self {
        let start = vec![0; maxim.len()];
        MultiDimCounter {
            maxim,
            state: CounterState::Pending(start),
        }
    }

    /// Count over `0..extents[i]` in every dimension
    ///
    /// Any zero extent makes the box empty and the counter starts exhausted.
    pub fn over_extents(extents: &[usize]) -> Self {
        if extents.iter().any(|&e| e == 0) {
            return MultiDimCounter {
                maxim: extents.to_vec(),
                state: CounterState::Exhausted,
            };
        }
        Self::new(extents.iter().map(|&e| e - 1).collect())
    }

    pub fn maxim(&self) -> &[usize] {
        &self.maxim
    }

    pub fn is_exhausted(&self) -> bool {
        self.state == CounterState::Exhausted
    }

    fn successor(&self, current: &[usize]) -> Option<Vec<usize>> {
        let pos = current
            .iter()
            .zip(&self.maxim)
            .rposition(|(count, max)| count < max)?;
        let mut next = current.to_vec();
        next[pos] += 1;
        for count in &mut next[pos + 1..] {
            *count = 0;
        }
        Some(next)
    }

    /// Number of vectors not yet produced, if it fits in a `usize`
    fn remaining(&self) -> Option<usize> {
        let current = match &self.state {
            CounterState::Pending(current) => current,
            CounterState::Exhausted => return Some(0),
        };

        let mut total = 1usize;
        let mut consumed = 0usize;
        for (&count, &max) in current.iter().zip(&self.maxim) {
            let radix = max.checked_add(1)?;
            total = total.checked_mul(radix)?;
            consumed = consumed.checked_mul(radix)?.checked_add(count)?;
        }
        Some(total - consumed)
    }
}

impl Iterator for MultiDimCounter {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Self::Item> {
        let current = match std::mem::replace(&mut self.state, CounterState::Exhausted) {
            CounterState::Pending(current) => current,
            CounterState::Exhausted => return None,
        };
        if let Some(next) = self.successor(&current) {
            self.state = CounterState::Pending(next);
        }
        Some(current)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match self.remaining() {
            Some(n) => (n, Some(n)),
            None => (usize::MAX, None),
        }
    }
}

impl FusedIterator for MultiDimCounter {}
