//! N-dimensional index space shared by the input bits and the columns.
//!
//! Converts between flat indices and coordinates, and enumerates the neighborhood of an index
//! within a radius. Potential pools are sampled from input neighborhoods, local inhibition
//! compares each column with its column neighborhood.

use serde::{Deserialize, Serialize};

/// Shape of an N-dimensional space with row-major strides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topology {
    dims: Vec<usize>,
    strides: Vec<usize>,
}

impl Topology {
    pub fn new(dims: &[usize]) -> Self {
        let mut strides = vec![1; dims.len()];
        for i in (0..dims.len().saturating_sub(1)).rev() {
            strides[i] = strides[i + 1] * dims[i + 1];
        }

        Self {
            dims: dims.to_vec(),
            strides,
        }
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// Total number of indices in the space.
    pub fn len(&self) -> usize {
        self.dims.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Coordinates of a flat index, one per dimension.
    pub fn coordinates(&self, index: usize) -> Vec<usize> {
        self.strides
            .iter()
            .zip(&self.dims)
            .map(|(&stride, &dim)| (index / stride) % dim)
            .collect()
    }

    /// Flat index of a coordinate tuple.
    pub fn index(&self, coords: &[usize]) -> usize {
        coords.iter().zip(&self.strides).map(|(c, s)| c * s).sum()
    }

    /// Iterates all indices within `radius` of `center` along every dimension.
    ///
    /// With `wrap` the space is a torus and each index appears at most once; without it the
    /// neighborhood is clipped at the borders.
    pub fn neighborhood(&self, center: usize, radius: usize, wrap: bool) -> Neighborhood<'_> {
        let spans = self
            .coordinates(center)
            .into_iter()
            .zip(&self.dims)
            .map(|(c, &dim)| {
                let (c, dim, r) = (c as isize, dim as isize, radius as isize);
                if wrap {
                    let low = c - r;
                    (low, (c + r + 1).min(low + dim))
                } else {
                    ((c - r).max(0), (c + r + 1).min(dim))
                }
            })
            .collect::<Vec<_>>();

        let cursor = spans.iter().map(|&(low, _)| low).collect();
        let remaining = spans
            .iter()
            .map(|&(low, high)| (high - low).max(0) as usize)
            .product();

        Neighborhood {
            topology: self,
            spans,
            cursor: Some(cursor),
            remaining,
        }
    }
}

/// Iterator over the indices of a neighborhood, produced by `Topology::neighborhood`.
pub struct Neighborhood<'a> {
    topology: &'a Topology,
    spans: Vec<(isize, isize)>,
    cursor: Option<Vec<isize>>,
    remaining: usize,
}

impl Iterator for Neighborhood<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.remaining == 0 {
            return None;
        }
        let cursor = self.cursor.as_mut()?;
        self.remaining -= 1;

        let index = cursor
            .iter()
            .zip(&self.topology.dims)
            .zip(&self.topology.strides)
            .map(|((&c, &dim), &stride)| c.rem_euclid(dim as isize) as usize * stride)
            .sum();

        // Odometer step, last dimension fastest.
        let mut advanced = false;
        for d in (0..cursor.len()).rev() {
            cursor[d] += 1;
            if cursor[d] < self.spans[d].1 {
                advanced = true;
                break;
            }
            cursor[d] = self.spans[d].0;
        }
        if !advanced {
            self.cursor = None;
        }

        Some(index)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coordinates_round_trip_in_two_dims() {
        let topology = Topology::new(&[4, 5]);
        assert_eq!(topology.coordinates(13), vec![2, 3]);
        assert_eq!(topology.index(&[2, 3]), 13);
        assert_eq!(topology.len(), 20);
    }

    #[test]
    fn clipped_neighborhood_stops_at_borders() {
        let topology = Topology::new(&[10]);
        let hood: Vec<_> = topology.neighborhood(1, 2, false).collect();
        assert_eq!(hood, vec![0, 1, 2, 3]);
    }

    #[test]
    fn wrapped_neighborhood_crosses_borders() {
        let topology = Topology::new(&[10]);
        let hood: Vec<_> = topology.neighborhood(1, 2, true).collect();
        assert_eq!(hood, vec![9, 0, 1, 2, 3]);
    }

    #[test]
    fn wrapped_neighborhood_never_repeats() {
        let topology = Topology::new(&[5]);
        let mut hood: Vec<_> = topology.neighborhood(2, 10, true).collect();
        hood.sort_unstable();
        assert_eq!(hood, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn two_dimensional_neighborhood() {
        let topology = Topology::new(&[3, 3]);
        let hood: Vec<_> = topology.neighborhood(0, 1, false).collect();
        assert_eq!(hood, vec![0, 1, 3, 4]);
        assert_eq!(topology.neighborhood(4, 1, false).size_hint().0, 9);
    }
}
