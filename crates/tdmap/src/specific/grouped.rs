//! Dustbin curation, used when categories have no natural ordering

use super::{CategoryKey, Redirect, SpecificMap, Stage};

/// Maps keyed by file, search engine group or any other free-form label
pub type SimpleSpecificMap = SpecificMap<String>;

/// Site localization maps, one per modification name
pub type ModificationSpecificMap = SpecificMap<String>;

impl<K: CategoryKey> SpecificMap<K> {
    /// Move every category that cannot reach `minimal_fdr` (or has too small
    /// an Nmax) into a shared dustbin. If the dustbin is itself too weak, it
    /// is folded into the most populated surviving category.
    pub fn clean(&mut self, minimal_fdr: f64) {
        self.clean_with_catch_all(minimal_fdr, None)
    }

    /// Same as [`SpecificMap::clean`], but `catch_all` is never sent to the
    /// dustbin, and receives the dustbin first when it is too weak.
    pub(crate) fn clean_with_catch_all(&mut self, minimal_fdr: f64, catch_all: Option<&K>) {
        if self.stage != Stage::Accumulating {
            return;
        }
        self.stage = Stage::Curated;

        let keys = self.keys();
        if keys.len() < 2 {
            return;
        }

        let weak = keys
            .into_iter()
            .filter(|key| Some(key) != catch_all)
            .filter(|key| {
                self.maps
                    .get(key)
                    .map(|map| map.suspicious_input(minimal_fdr))
                    .unwrap_or(false)
            })
            .collect::<Vec<_>>();
        for key in &weak {
            self.merge(key, Redirect::Dustbin);
        }

        let dustbin_weak = self
            .dustbin
            .as_ref()
            .map(|dustbin| dustbin.suspicious_input(minimal_fdr))
            .unwrap_or(false);

        if dustbin_weak {
            let target = match catch_all.filter(|key| self.maps.contains_key(*key)) {
                Some(key) => Some(key.clone()),
                None => self.largest_category(),
            };
            match target {
                Some(key) => {
                    log::trace!("dustbin too small, merged into {}", key);
                    self.empty_dustbin(&key);
                }
                None => log::warn!(
                    "no category can absorb the {} dustbin, statistics will be unreliable",
                    Redirect::<K>::Dustbin
                ),
            }
        }

        log::trace!(
            "cleaned categories: {} kept, {} grouped, dustbin: {}",
            self.maps.len(),
            self.grouping.len(),
            self.dustbin.is_some()
        );
    }

    /// Surviving category with the largest Nmax, lowest key on ties
    fn largest_category(&self) -> Option<K> {
        self.maps
            .iter()
            .map(|entry| (entry.nmax(), entry.key().clone()))
            .max_by(|a, b| a.0.cmp(&b.0).then_with(|| b.1.cmp(&a.1)))
            .map(|(_, key)| key)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::specific::test::category;

    #[test]
    fn weak_category_folded() {
        let mut map = SimpleSpecificMap::default();
        category(&map, "a".into(), 5);
        category(&map, "b".into(), 200);
        category(&map, "c".into(), 300);
        let total = map.n_observations();

        map.clean(0.01);
        assert_eq!(map.keys(), vec!["b".to_string(), "c".to_string()]);
        assert!(map.is_grouped(&"a".into()));
        assert_eq!(map.n_observations(), total);

        // the dustbin was too weak, so it went to the largest category
        assert!(map.dustbin().is_none());
        assert_eq!(
            map.grouping(),
            vec![("a".to_string(), Redirect::Category("c".to_string()))]
        );
        assert_eq!(map.with_map(&"a".into(), |m| m.n_target()), Ok(2305));
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn dustbin_survives() {
        let mut map = SimpleSpecificMap::default();
        category(&map, "a".into(), 60);
        category(&map, "b".into(), 60);
        category(&map, "c".into(), 300);
        let total = map.n_observations();

        map.clean(0.01);
        assert_eq!(map.keys(), vec!["c".to_string()]);
        assert_eq!(map.len(), 2);
        assert_eq!(map.n_observations(), total);
        assert_eq!(map.dustbin().map(|m| m.nmax()), Some(120));
        assert_eq!(
            map.grouping(),
            vec![
                ("a".to_string(), Redirect::Dustbin),
                ("b".to_string(), Redirect::Dustbin),
            ]
        );
        assert_eq!(map.with_map(&"b".into(), |m| m.n_target()), Ok(2120));
        assert!(!map.suspicious_input());
    }

    #[test]
    fn ties_go_to_lowest_key() {
        let mut map = SimpleSpecificMap::default();
        category(&map, "a".into(), 5);
        category(&map, "b".into(), 200);
        category(&map, "c".into(), 200);
        map.clean(0.01);
        assert_eq!(
            map.grouping(),
            vec![("a".to_string(), Redirect::Category("b".to_string()))]
        );
    }

    #[test]
    fn nothing_survives() {
        let mut map = SimpleSpecificMap::default();
        category(&map, "a".into(), 5);
        category(&map, "b".into(), 6);
        let total = map.n_observations();
        map.clean(0.01);
        assert!(map.keys().is_empty());
        assert_eq!(map.len(), 1);
        assert_eq!(map.n_observations(), total);
        assert!(map.suspicious_input());

        // estimation and lookups still go through the dustbin
        assert!(map.estimate_probabilities(&()).is_complete());
        assert!(map.probability(&"a".into(), 0.001).is_ok());
    }
}
