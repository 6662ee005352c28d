use serde::{Deserialize, Serialize};

/// Target and decoy hits observed at exactly one score value
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TargetDecoyPoint {
    pub n_target: usize,
    pub n_decoy: usize,
    /// Posterior error probability, `None` until estimated
    pub p: Option<f64>,
}

impl TargetDecoyPoint {
    pub fn add(&mut self, decoy: bool) {
        match decoy {
            true => self.n_decoy += 1,
            false => self.n_target += 1,
        }
    }

    /// Remove one hit. The caller is responsible for discarding the point
    /// once [`TargetDecoyPoint::is_empty`] returns true.
    ///
    /// # Panics
    /// * if no hit of the requested kind is recorded at this point
    pub fn remove(&mut self, decoy: bool) {
        let counter = match decoy {
            true => &mut self.n_decoy,
            false => &mut self.n_target,
        };
        assert!(*counter > 0, "removing a hit from an empty counter");
        *counter -= 1;
    }

    pub fn is_empty(&self) -> bool {
        self.n_target == 0 && self.n_decoy == 0
    }

    pub fn count(&self, decoy: bool) -> usize {
        match decoy {
            true => self.n_decoy,
            false => self.n_target,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn add_remove() {
        let mut point = TargetDecoyPoint::default();
        point.add(false);
        point.add(true);
        point.add(true);
        assert_eq!((point.n_target, point.n_decoy), (1, 2));

        point.remove(true);
        point.remove(false);
        assert!(!point.is_empty());
        point.remove(true);
        assert!(point.is_empty());
        assert_eq!(point.p, None);
    }

    #[test]
    #[should_panic]
    fn remove_from_zero() {
        let mut point = TargetDecoyPoint::default();
        point.add(true);
        point.remove(false);
    }
}
