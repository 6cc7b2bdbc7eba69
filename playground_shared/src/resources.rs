//! Resource-collection field.
//!
//! A shared map of collectible items plus per-participant inventories, kept
//! by the store. Claims are first-writer-wins per item; there is no lock, so
//! two clients may both believe they collected an item until the next
//! snapshot arrives. A janitor pass, run on its own timer, brings collected
//! items back after the respawn interval and tops the field up to its target
//! size.

use std::collections::BTreeMap;
use std::fmt;

use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::ResourceConfig;
use crate::math::Vec2;
use crate::store::ParticipantId;

/// Item identifier, unique within one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub u32);

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "item_{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Stone,
    Wood,
    Metal,
    Crystal,
}

impl ItemKind {
    pub const ALL: [ItemKind; 4] = [
        ItemKind::Stone,
        ItemKind::Wood,
        ItemKind::Metal,
        ItemKind::Crystal,
    ];

    /// Relative spawn weight.
    pub fn weight(self) -> u32 {
        match self {
            ItemKind::Stone => 40,
            ItemKind::Wood => 35,
            ItemKind::Metal => 20,
            ItemKind::Crystal => 5,
        }
    }

    pub fn color(self) -> &'static str {
        match self {
            ItemKind::Stone => "#888888",
            ItemKind::Wood => "#8B4513",
            ItemKind::Metal => "#C0C0C0",
            ItemKind::Crystal => "#a855f7",
        }
    }

    /// Weighted random kind.
    pub fn pick<R: Rng + ?Sized>(rng: &mut R) -> Self {
        match WeightedIndex::new(Self::ALL.iter().map(|k| k.weight())) {
            Ok(dist) => Self::ALL[dist.sample(rng)],
            Err(_) => ItemKind::Stone,
        }
    }
}

/// One collectible.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub x: f32,
    pub y: f32,
    pub kind: ItemKind,
    pub collected: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collected_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collector: Option<ParticipantId>,
}

impl Item {
    pub fn position(&self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }
}

/// Per-participant counts by kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Inventory {
    pub stone: u32,
    pub wood: u32,
    pub metal: u32,
    pub crystal: u32,
}

impl Inventory {
    pub fn add(&mut self, kind: ItemKind) {
        match kind {
            ItemKind::Stone => self.stone += 1,
            ItemKind::Wood => self.wood += 1,
            ItemKind::Metal => self.metal += 1,
            ItemKind::Crystal => self.crystal += 1,
        }
    }

    pub fn count(&self, kind: ItemKind) -> u32 {
        match kind {
            ItemKind::Stone => self.stone,
            ItemKind::Wood => self.wood,
            ItemKind::Metal => self.metal,
            ItemKind::Crystal => self.crystal,
        }
    }

    pub fn total(&self) -> u32 {
        self.stone + self.wood + self.metal + self.crystal
    }
}

/// Items and inventories as pushed to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ResourceSnapshot {
    pub items: BTreeMap<ItemId, Item>,
    pub inventories: BTreeMap<ParticipantId, Inventory>,
}

impl ResourceSnapshot {
    /// Uncollected item within `radius` of `pos`, nearest first.
    pub fn nearest_uncollected(&self, pos: Vec2, radius: f32) -> Option<ItemId> {
        self.items
            .values()
            .filter(|item| !item.collected)
            .map(|item| (item.id, item.position().distance(pos)))
            .filter(|&(_, d)| d < radius)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(id, _)| id)
    }
}

/// Why a claim did not go through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimError {
    UnknownItem(ItemId),
    AlreadyCollected {
        item: ItemId,
        by: Option<ParticipantId>,
    },
}

impl fmt::Display for ClaimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClaimError::UnknownItem(id) => write!(f, "unknown {id}"),
            ClaimError::AlreadyCollected { item, by: Some(by) } => {
                write!(f, "{item} already collected by {by}")
            }
            ClaimError::AlreadyCollected { item, by: None } => {
                write!(f, "{item} already collected")
            }
        }
    }
}

impl std::error::Error for ClaimError {}

/// What one janitor pass changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct JanitorReport {
    pub respawned: usize,
    pub spawned: usize,
    /// Collected items dropped because the field was already at its target.
    pub pruned: usize,
}

impl JanitorReport {
    pub fn changed(&self) -> bool {
        self.respawned + self.spawned + self.pruned > 0
    }
}

/// Authoritative copy of the resource collections.
#[derive(Debug, Clone)]
pub struct ResourceField {
    cfg: ResourceConfig,
    items: BTreeMap<ItemId, Item>,
    inventories: BTreeMap<ParticipantId, Inventory>,
    next_id: u32,
}

impl ResourceField {
    pub fn new(cfg: ResourceConfig) -> Self {
        Self {
            cfg,
            items: BTreeMap::new(),
            inventories: BTreeMap::new(),
            next_id: 0,
        }
    }

    pub fn items(&self) -> &BTreeMap<ItemId, Item> {
        &self.items
    }

    pub fn inventory(&self, id: &ParticipantId) -> Inventory {
        self.inventories.get(id).copied().unwrap_or_default()
    }

    pub fn active_count(&self) -> usize {
        self.items.values().filter(|i| !i.collected).count()
    }

    pub fn snapshot(&self) -> ResourceSnapshot {
        ResourceSnapshot {
            items: self.items.clone(),
            inventories: self.inventories.clone(),
        }
    }

    /// Places a new item of a weighted random kind somewhere in the field.
    pub fn spawn_random<R: Rng + ?Sized>(&mut self, rng: &mut R) -> ItemId {
        let margin = 50.0_f32.min(self.cfg.width / 4.0).min(self.cfg.height / 4.0);
        let x = rng.gen_range(margin..=(self.cfg.width - margin).max(margin));
        let y = rng.gen_range(margin..=(self.cfg.height - margin).max(margin));
        self.insert(Vec2::new(x, y), ItemKind::pick(rng))
    }

    /// Places an item at a fixed position.
    pub fn insert(&mut self, pos: Vec2, kind: ItemKind) -> ItemId {
        let id = ItemId(self.next_id);
        self.next_id += 1;
        self.items.insert(
            id,
            Item {
                id,
                x: pos.x.round(),
                y: pos.y.round(),
                kind,
                collected: false,
                collected_at: None,
                collector: None,
            },
        );
        id
    }

    /// First writer wins: the item must exist and not be collected yet.
    pub fn claim(
        &mut self,
        item: ItemId,
        collector: &ParticipantId,
        now_ms: i64,
    ) -> Result<ItemKind, ClaimError> {
        let entry = self
            .items
            .get_mut(&item)
            .ok_or(ClaimError::UnknownItem(item))?;
        if entry.collected {
            return Err(ClaimError::AlreadyCollected {
                item,
                by: entry.collector.clone(),
            });
        }
        entry.collected = true;
        entry.collected_at = Some(now_ms);
        entry.collector = Some(collector.clone());
        let kind = entry.kind;
        self.inventories
            .entry(collector.clone())
            .or_default()
            .add(kind);
        Ok(kind)
    }

    /// Brings items collected at least `respawn_ms` ago back while the field
    /// is below `item_count` active items and prunes them once it is not,
    /// then spawns fresh items until `item_count` are active.
    pub fn janitor<R: Rng + ?Sized>(&mut self, now_ms: i64, rng: &mut R) -> JanitorReport {
        let mut report = JanitorReport::default();
        let target = self.cfg.item_count;
        let respawn_ms = self.cfg.respawn_ms;
        let due: Vec<ItemId> = self
            .items
            .values()
            .filter(|i| i.collected && i.collected_at.is_some_and(|at| now_ms - at >= respawn_ms))
            .map(|i| i.id)
            .collect();
        let mut active = self.active_count();
        for id in due {
            if active < target {
                if let Some(item) = self.items.get_mut(&id) {
                    item.collected = false;
                    item.collected_at = None;
                    item.collector = None;
                    active += 1;
                    report.respawned += 1;
                }
            } else if self.items.remove(&id).is_some() {
                report.pruned += 1;
            }
        }
        while active < target {
            self.spawn_random(rng);
            active += 1;
            report.spawned += 1;
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn field(count: usize) -> ResourceField {
        ResourceField::new(ResourceConfig {
            item_count: count,
            ..ResourceConfig::default()
        })
    }

    #[test]
    fn first_claim_wins() {
        let mut f = field(0);
        let item = f.insert(Vec2::new(10.0, 10.0), ItemKind::Metal);
        let a = ParticipantId::new("a");
        let b = ParticipantId::new("b");
        assert_eq!(f.claim(item, &a, 1_000), Ok(ItemKind::Metal));
        assert_eq!(
            f.claim(item, &b, 1_001),
            Err(ClaimError::AlreadyCollected {
                item,
                by: Some(a.clone())
            })
        );
        assert_eq!(f.inventory(&a).metal, 1);
        assert_eq!(f.inventory(&b).total(), 0);
    }

    #[test]
    fn unknown_item_is_rejected() {
        let mut f = field(0);
        let a = ParticipantId::new("a");
        assert_eq!(f.claim(ItemId(9), &a, 0), Err(ClaimError::UnknownItem(ItemId(9))));
    }

    #[test]
    fn janitor_respawns_after_interval() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut f = field(2);
        let keep = f.insert(Vec2::new(10.0, 10.0), ItemKind::Wood);
        let item = f.insert(Vec2::new(20.0, 10.0), ItemKind::Stone);
        f.claim(item, &ParticipantId::new("a"), 0).unwrap();
        f.claim(keep, &ParticipantId::new("a"), 29_000).unwrap();
        // Only `item` is due; it comes back instead of a fresh spawn.
        let due = f.janitor(30_000, &mut rng);
        assert_eq!(due.respawned, 1);
        assert_eq!(due.spawned, 1);
        assert_eq!(f.active_count(), 2);
        assert!(f.items()[&item].collector.is_none());
        assert!(f.items()[&keep].collected);
    }

    #[test]
    fn janitor_refills_before_respawn_and_prunes_after() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut f = field(3);
        f.janitor(0, &mut rng);
        let first: Vec<ItemId> = f.items().keys().copied().collect();
        for id in &first {
            f.claim(*id, &ParticipantId::new("a"), 1_000).unwrap();
        }
        assert_eq!(f.active_count(), 0);

        let early = f.janitor(1_500, &mut rng);
        assert_eq!(early.spawned, 3);
        assert_eq!(early.respawned, 0);
        assert_eq!(f.active_count(), 3);
        assert!(f.items().keys().any(|id| !first.contains(id)));

        // The field is full, so the collected originals are dropped, not revived.
        let late = f.janitor(31_000, &mut rng);
        assert_eq!(late.pruned, 3);
        assert_eq!(late.respawned + late.spawned, 0);
        assert_eq!(f.active_count(), 3);
        assert_eq!(f.items().len(), 3);
        assert!(first.iter().all(|id| !f.items().contains_key(id)));
    }

    #[test]
    fn janitor_tops_up_to_target() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut f = field(50);
        let report = f.janitor(0, &mut rng);
        assert_eq!(report.spawned, 50);
        assert_eq!(f.active_count(), 50);
        for item in f.items().values() {
            assert!(item.x >= 0.0 && item.x <= 2000.0);
            assert!(item.y >= 0.0 && item.y <= 2000.0);
        }
        assert!(!f.janitor(0, &mut rng).changed());
    }

    #[test]
    fn weighted_pick_favours_common_kinds() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut stone = 0;
        let mut crystal = 0;
        for _ in 0..2_000 {
            match ItemKind::pick(&mut rng) {
                ItemKind::Stone => stone += 1,
                ItemKind::Crystal => crystal += 1,
                _ => {}
            }
        }
        assert!(stone > crystal * 3);
    }

    #[test]
    fn nearest_uncollected_skips_collected() {
        let mut f = field(0);
        let near = f.insert(Vec2::new(0.0, 0.0), ItemKind::Stone);
        let far = f.insert(Vec2::new(20.0, 0.0), ItemKind::Stone);
        f.claim(near, &ParticipantId::new("a"), 0).unwrap();
        let snap = f.snapshot();
        assert_eq!(snap.nearest_uncollected(Vec2::new(1.0, 0.0), 30.0), Some(far));
        assert_eq!(snap.nearest_uncollected(Vec2::new(1.0, 0.0), 10.0), None);
    }
}
