//! Neighbour curation, used for PSMs grouped by precursor charge

use super::{CategoryKey, Redirect, SpecificMap, Stage};

/// PSM maps, one per identified precursor charge
pub type PsmSpecificMap = SpecificMap<u8>;

impl<K: CategoryKey> SpecificMap<K> {
    /// Merge weak categories into the nearest category with enough data.
    ///
    /// Categories are visited in ascending key order, carrying forward the
    /// last reliable category as reference. Weak categories preceding the
    /// first reliable one join it; if no category is reliable, everything is
    /// merged into the lowest key. A no-op once curated.
    pub fn cure(&mut self) {
        if self.stage != Stage::Accumulating {
            return;
        }
        self.stage = Stage::Curated;

        let keys = self.keys();
        if keys.len() < 2 {
            return;
        }

        let fdr = self.parameters.minimal_fdr;
        let reliable = keys
            .iter()
            .map(|key| {
                self.maps
                    .get(key)
                    .map(|map| !map.suspicious_input(fdr))
                    .unwrap_or(false)
            })
            .collect::<Vec<_>>();

        let mut reference: Option<K> = None;
        let mut pending: Vec<K> = Vec::new();
        for (key, reliable) in keys.into_iter().zip(reliable) {
            if reliable {
                for weak in pending.drain(..) {
                    self.merge(&weak, Redirect::Category(key.clone()));
                }
                reference = Some(key);
            } else if let Some(reference) = &reference {
                self.merge(&key, Redirect::Category(reference.clone()));
            } else {
                // no reference yet: held until the next reliable key
                pending.push(key);
            }
        }

        // Nothing reliable: keep a single category
        let mut pending = pending.into_iter();
        if let Some(first) = pending.next() {
            for weak in pending {
                self.merge(&weak, Redirect::Category(first.clone()));
            }
        }

        log::trace!(
            "cured categories: {} kept, {} merged",
            self.maps.len(),
            self.grouping.len()
        );
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::specific::test::category;

    #[test]
    fn merge_into_previous_reference() {
        let mut map = PsmSpecificMap::default();
        category(&map, 2, 300);
        category(&map, 3, 200);
        category(&map, 4, 5);
        category(&map, 5, 7);
        let total = map.n_observations();

        map.cure();
        assert_eq!(map.keys(), vec![2, 3]);
        assert_eq!(
            map.grouping(),
            vec![
                (4, Redirect::Category(3)),
                (5, Redirect::Category(3)),
            ]
        );
        assert_eq!(map.n_observations(), total);
        assert_eq!(map.with_map(&5, |m| m.n_target()), Ok(3 * 1000 + 212));
    }

    #[test]
    fn leading_weak_joins_next_reliable() {
        let mut map = PsmSpecificMap::default();
        category(&map, 1, 5);
        category(&map, 2, 300);
        category(&map, 3, 200);
        map.cure();
        assert_eq!(map.keys(), vec![2, 3]);
        assert!(map.is_grouped(&1));
        assert_eq!(map.with_map(&1, |m| m.n_target()), Ok(2000 + 305));
    }

    #[test]
    fn nothing_reliable() {
        let mut map = PsmSpecificMap::default();
        category(&map, 2, 5);
        category(&map, 3, 6);
        category(&map, 4, 7);
        let total = map.n_observations();
        map.cure();
        assert_eq!(map.keys(), vec![2]);
        assert_eq!(map.n_observations(), total);
        assert_eq!(map.with_map(&4, |m| m.n_target()), Ok(3018));

        // idempotent
        map.cure();
        assert_eq!(map.keys(), vec![2]);
        assert_eq!(map.grouping().len(), 2);
    }

    #[test]
    fn single_category_untouched() {
        let mut map = PsmSpecificMap::default();
        category(&map, 2, 5);
        map.cure();
        assert_eq!(map.keys(), vec![2]);
        assert!(map.grouping().is_empty());
    }
}
