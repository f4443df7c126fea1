use std::{
    cmp::Reverse,
    collections::{BTreeMap, BinaryHeap},
    sync::Arc,
    time::Instant,
};

use log::trace;

use super::{MetadataBlock, METADATA_CACHE_ENTRIES};

/// Decompressed metadata blocks keyed by their image offset
#[derive(Debug, Default)]
pub struct Cache {
    pub(super) blocks: BTreeMap<u64, CacheLine>,
}

#[derive(Debug)]
pub struct CacheLine {
    pub(super) value: Arc<MetadataBlock>,
    pub(super) atime: Instant,
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
struct LruLine(Reverse<Instant>, u64);

impl Cache {
    /// Keep only the most recently used lines
    pub fn prune(&mut self) {
        if self.blocks.len() <= METADATA_CACHE_ENTRIES {
            return;
        }
        let lru: BinaryHeap<LruLine> = self
            .blocks
            .iter()
            .map(|(start, line)| LruLine(Reverse(line.atime), *start))
            .collect();
        lru.into_sorted_vec()
            .iter()
            .skip(METADATA_CACHE_ENTRIES)
            .for_each(|LruLine(_, start)| {
                trace!("Evict metadata block {start:#x}");
                _ = self.blocks.remove(start);
            });
    }

    pub fn get(&mut self, start: u64) -> Option<Arc<MetadataBlock>> {
        self.blocks.get_mut(&start).map(CacheLine::get)
    }

    pub fn set(&mut self, start: u64, block: Arc<MetadataBlock>) {
        self.blocks.insert(start, CacheLine::new(block));
        self.prune();
    }
}

impl CacheLine {
    pub fn new(value: Arc<MetadataBlock>) -> Self {
        Self {
            value,
            atime: Instant::now(),
        }
    }

    pub fn get(&mut self) -> Arc<MetadataBlock> {
        self.atime = Instant::now();
        self.value.clone()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::Cache;
    use crate::filesystem::{MetadataBlock, METADATA_CACHE_ENTRIES};

    fn block(byte: u8) -> Arc<MetadataBlock> {
        Arc::new(MetadataBlock {
            data: vec![byte; 4],
            disk_length: 6,
        })
    }

    #[test]
    fn hit_and_miss() {
        let mut cache = Cache::default();
        cache.set(0x80, block(1));
        assert_eq!(cache.get(0x80).unwrap().data, [1; 4]);
        assert!(cache.get(0x86).is_none());
    }

    #[test]
    fn prune_keeps_recent_lines() {
        let mut cache = Cache::default();
        for start in 0..METADATA_CACHE_ENTRIES as u64 {
            cache.set(start, block(0));
        }
        // refresh the first line so the second one is least recently used
        std::thread::sleep(std::time::Duration::from_millis(2));
        assert!(cache.get(0).is_some());
        cache.set(u64::MAX, block(2));
        assert_eq!(cache.blocks.len(), METADATA_CACHE_ENTRIES);
        assert!(cache.get(0).is_some());
        assert!(cache.get(u64::MAX).is_some());
    }
}
