use repodata_types::ShardKey;

/// Splits work across `n_ranks` cooperating processes. Two layers, per
/// the two partitioning schemes seen in the corpus: an outer layer that
/// assigns whole `(label, subdir)` loop iterations to a rank
/// (`anaconda_sync.py::update_shards`'s `loop_index % n_ranks`), and an
/// inner layer that assigns individual packages to a rank
/// (the per-package `sha1(subdir/package) % n_ranks` scheme).
#[derive(Debug, Clone, Copy)]
pub struct Rank {
    pub index: u32,
    pub total: u32,
}

impl Rank {
    pub fn new(index: u32, total: u32) -> Rank {
        Rank { index, total: total.max(1) }
    }

    pub fn solo() -> Rank {
        Rank::new(0, 1)
    }

    pub fn owns_loop_index(&self, loop_index: usize) -> bool {
        (loop_index as u32) % self.total == self.index
    }

    pub fn owns_package(&self, key: &ShardKey) -> bool {
        key.rank(self.total) == self.index
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use repodata_types::Subdir;

    #[test]
    fn solo_rank_owns_everything() {
        let rank = Rank::solo();
        assert!(rank.owns_loop_index(0));
        assert!(rank.owns_loop_index(41));
        let key = ShardKey::new(&Subdir::new("linux-64"), "foo-1.0.tar.bz2");
        assert!(rank.owns_package(&key));
    }

    #[test]
    fn ranks_partition_loop_indices_disjointly() {
        let ranks: Vec<_> = (0..4).map(|i| Rank::new(i, 4)).collect();
        for loop_index in 0..40usize {
            let owners: Vec<_> = ranks.iter().filter(|r| r.owns_loop_index(loop_index)).collect();
            assert_eq!(owners.len(), 1);
        }
    }
}
