/// Launch geometry: how many workers a dispatch runs and how they group.
///
/// One global worker per output column. The group size is the greatest
/// common divisor of the column count and the device capability hint, so it
/// always divides the global size exactly and the strided staging loops
/// tile with no remainder branch.
use std::fmt;

fn gcd(mut x: usize, mut y: usize) -> usize {
    while y != 0 {
        let z = x % y;
        x = y;
        y = z;
    }
    x
}

/// Largest group size that divides `n` evenly and respects the device
/// hint. A hint of zero degrades to fully serialized groups of one.
pub fn group_size(n: usize, hint: usize) -> usize {
    gcd(n, hint.max(1))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchGeometry {
    /// Total workers, one per output column.
    pub global: usize,
    /// Workers per cooperating group; always divides `global`.
    pub group: usize,
}

impl LaunchGeometry {
    /// Geometry for an `n`-column dispatch on a device whose capability
    /// hint is `hint`.
    pub fn for_columns(n: usize, hint: usize) -> LaunchGeometry {
        LaunchGeometry { global: n, group: group_size(n, hint) }
    }

    pub fn num_groups(&self) -> usize {
        self.global / self.group
    }
}

impl fmt::Display for LaunchGeometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "global={} group={}", self.global, self.group)
    }
}
