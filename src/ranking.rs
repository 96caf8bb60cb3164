use std::cmp::Ordering;

use serde::{Serialize, Serializer};

use crate::record::StudentRecord;

/// Anything that can take part in a class ranking.
pub trait Rankable {
    /// `None` (or a non-finite value) means the entry is not ranked.
    fn rank_mean(&self) -> Option<f64>;
}

impl Rankable for StudentRecord {
    fn rank_mean(&self) -> Option<f64> {
        self.mean()
    }
}

impl<T: Rankable + ?Sized> Rankable for &T {
    fn rank_mean(&self) -> Option<f64> {
        (**self).rank_mean()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    Ranked(u32),
    Unranked,
}

impl Position {
    pub fn ordinal(self) -> Option<u32> {
        match self {
            Position::Ranked(n) => Some(n),
            Position::Unranked => None,
        }
    }
}

impl Serialize for Position {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        match self {
            Position::Ranked(n) => s.serialize_u32(*n),
            Position::Unranked => s.serialize_str("unranked"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ranked<T> {
    pub position: Position,
    pub item: T,
}

fn valid_mean<T: Rankable>(item: &T) -> Option<f64> {
    item.rank_mean().filter(|m| m.is_finite())
}

/// Order by mean, highest first, and number the ranked entries 1..=K.
///
/// Entries with equal means keep their input order (the sort is stable and
/// has no secondary key). Entries without a valid mean are marked
/// `Unranked`, consume no position and follow the ranked block in input
/// order.
pub fn rank<T: Rankable>(items: Vec<T>) -> Vec<Ranked<T>> {
    let (mut with_mean, without_mean): (Vec<(f64, T)>, Vec<T>) = {
        let mut a = Vec::new();
        let mut b = Vec::new();
        for item in items {
            match valid_mean(&item) {
                Some(m) => a.push((m, item)),
                None => b.push(item),
            }
        }
        (a, b)
    };

    with_mean.sort_by(|(a, _), (b, _)| b.partial_cmp(a).unwrap_or(Ordering::Equal));

    let mut out = Vec::with_capacity(with_mean.len() + without_mean.len());
    for (i, (_, item)) in with_mean.into_iter().enumerate() {
        out.push(Ranked {
            position: Position::Ranked(i as u32 + 1),
            item,
        });
    }
    out.extend(without_mean.into_iter().map(|item| Ranked {
        position: Position::Unranked,
        item,
    }));
    out
}

/// Position of one entry within its group, without reordering anything.
pub fn position_of<T: Rankable>(items: &[T], index: usize) -> Position {
    let Some(target) = items.get(index).and_then(valid_mean) else {
        return Position::Unranked;
    };
    let mut pos = 1_u32;
    for (i, other) in items.iter().enumerate() {
        let Some(m) = valid_mean(other) else {
            continue;
        };
        if m > target || (m == target && i < index) {
            pos += 1;
        }
    }
    Position::Ranked(pos)
}

/// Mean of the valid means, or 0 when nobody has one.
pub fn class_average<T: Rankable>(items: &[T]) -> f64 {
    let means: Vec<f64> = items.iter().filter_map(valid_mean).collect();
    crate::scoring::compute_mean(&means)
}
