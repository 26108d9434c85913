//! Authoritative entity state and the per-tick apply step.
//!
//! The world is owned exclusively by the simulation task. Connection tasks
//! never touch it directly; they enqueue [`WorldCommand`]s on an unbounded
//! channel and the tick drains that channel once per period. Single writer,
//! so no locking is needed around entity state.

use log::{debug, info, warn};
use shared::{EntityState, Point};
use std::collections::{BTreeMap, HashMap};

/// A client's request to move its entity, queued between ticks.
///
/// `sequence` is the client-assigned reconciliation counter. The server does
/// not validate monotonicity; it only remembers the latest value it applied.
#[derive(Debug, Clone)]
pub struct PositionIntent {
    pub entity_id: u32,
    pub sequence: u32,
    pub position: Point,
}

/// Work item on the channel from connection tasks to the simulation task.
/// Lifecycle events ride the same queue as intents, so a spawn is always
/// applied before any intent the same connection enqueued after it.
#[derive(Debug)]
pub enum WorldCommand {
    Spawn { id: u32 },
    Despawn { id: u32 },
    Intent(PositionIntent),
}

/// Server-authoritative representation of one connected actor.
#[derive(Debug, Clone)]
pub struct Entity {
    pub id: u32,
    pub position: Point,
}

impl Entity {
    /// New entities always start at the origin.
    pub fn new(id: u32) -> Self {
        Self {
            id,
            position: Point::default(),
        }
    }
}

/// Entity store plus the acknowledgment table.
///
/// An entity exists exactly while its connection is registered: spawned on
/// connect, despawned on disconnect. Positions change only through
/// [`World::apply`] on the simulation task.
#[derive(Debug, Default)]
pub struct World {
    entities: HashMap<u32, Entity>,
    last_processed_input: HashMap<u32, u32>,
}

impl World {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one drained command.
    pub fn apply(&mut self, command: WorldCommand) {
        match command {
            WorldCommand::Spawn { id } => self.spawn(id),
            WorldCommand::Despawn { id } => self.despawn(id),
            WorldCommand::Intent(intent) => self.apply_intent(intent),
        }
    }

    /// Runs one tick's apply phase and returns the snapshot to broadcast,
    /// or `None` while the world is empty (no broadcast while no one is
    /// connected).
    pub fn step(&mut self, commands: Vec<WorldCommand>) -> Option<BTreeMap<u32, EntityState>> {
        for command in commands {
            self.apply(command);
        }

        if self.entities.is_empty() {
            return None;
        }

        Some(self.snapshot())
    }

    /// Inserts a new entity at the origin. A duplicate id means connection
    /// bookkeeping went wrong somewhere; the entity is overwritten with a
    /// warning rather than treated as recoverable.
    fn spawn(&mut self, id: u32) {
        if self.entities.insert(id, Entity::new(id)).is_some() {
            warn!("Entity {} already existed, overwriting", id);
        }
        // A reused id starts reconciliation from scratch.
        self.last_processed_input.remove(&id);
        info!("Spawned entity {}", id);
    }

    /// Removes an entity and prunes its acknowledgment entry. A missing id
    /// is a no-op; disconnect races are expected.
    fn despawn(&mut self, id: u32) {
        if self.entities.remove(&id).is_some() {
            info!("Despawned entity {}", id);
        } else {
            debug!("Despawn for unknown entity {}", id);
        }
        self.last_processed_input.remove(&id);
    }

    /// Overwrites the target entity's position and records the intent's
    /// sequence number. Intents for entities that disconnected mid-flight
    /// are dropped silently.
    fn apply_intent(&mut self, intent: PositionIntent) {
        match self.entities.get_mut(&intent.entity_id) {
            Some(entity) => {
                entity.position = intent.position;
                self.last_processed_input
                    .insert(intent.entity_id, intent.sequence);
            }
            None => {
                debug!("Dropping intent for departed entity {}", intent.entity_id);
            }
        }
    }

    /// Point-in-time copy of every live entity, ordered by id, with the
    /// last acknowledged sequence per entity (absent if never applied).
    pub fn snapshot(&self) -> BTreeMap<u32, EntityState> {
        self.entities
            .values()
            .map(|entity| {
                (
                    entity.id,
                    EntityState {
                        id: entity.id,
                        position: entity.position,
                        last_processed_input: self.last_processed_input.get(&entity.id).copied(),
                    },
                )
            })
            .collect()
    }

    pub fn entity(&self, id: u32) -> Option<&Entity> {
        self.entities.get(&id)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn intent(entity_id: u32, sequence: u32, x: f32, y: f32) -> WorldCommand {
        WorldCommand::Intent(PositionIntent {
            entity_id,
            sequence,
            position: Point::new(x, y),
        })
    }

    #[test]
    fn spawn_creates_entity_at_origin() {
        let mut world = World::new();
        world.apply(WorldCommand::Spawn { id: 1 });

        let entity = world.entity(1).unwrap();
        assert_approx_eq!(entity.position.x, 0.0);
        assert_approx_eq!(entity.position.y, 0.0);
        assert_eq!(world.len(), 1);
    }

    #[test]
    fn intent_overwrites_position_and_records_sequence() {
        let mut world = World::new();
        world.apply(WorldCommand::Spawn { id: 1 });
        world.apply(intent(1, 1, 5.0, 3.0));

        let snapshot = world.snapshot();
        let state = &snapshot[&1];
        assert_approx_eq!(state.position.x, 5.0);
        assert_approx_eq!(state.position.y, 3.0);
        assert_eq!(state.last_processed_input, Some(1));
    }

    #[test]
    fn last_write_wins_within_a_tick() {
        let mut world = World::new();
        let snapshot = world
            .step(vec![
                WorldCommand::Spawn { id: 1 },
                intent(1, 1, 1.0, 1.0),
                intent(1, 2, 2.0, 2.0),
                intent(1, 3, 9.0, 7.0),
            ])
            .unwrap();

        let state = &snapshot[&1];
        assert_approx_eq!(state.position.x, 9.0);
        assert_approx_eq!(state.position.y, 7.0);
        assert_eq!(state.last_processed_input, Some(3));
    }

    #[test]
    fn acknowledgment_stores_latest_observed_not_max() {
        // The server does not validate sequence monotonicity.
        let mut world = World::new();
        world.apply(WorldCommand::Spawn { id: 1 });
        world.apply(intent(1, 5, 1.0, 1.0));
        world.apply(intent(1, 3, 2.0, 2.0));

        let snapshot = world.snapshot();
        assert_eq!(snapshot[&1].last_processed_input, Some(3));
    }

    #[test]
    fn never_applied_entity_has_absent_ack() {
        let mut world = World::new();
        world.apply(WorldCommand::Spawn { id: 1 });

        let snapshot = world.snapshot();
        assert_eq!(snapshot[&1].last_processed_input, None);
    }

    #[test]
    fn intent_for_departed_entity_is_dropped() {
        let mut world = World::new();
        world.apply(WorldCommand::Spawn { id: 1 });
        world.apply(WorldCommand::Despawn { id: 1 });
        world.apply(intent(1, 1, 4.0, 4.0));

        // Dropped without error and without resurrecting the entity.
        assert!(world.is_empty());
        assert!(world.snapshot().is_empty());
    }

    #[test]
    fn despawn_prunes_acknowledgment_entry() {
        let mut world = World::new();
        world.apply(WorldCommand::Spawn { id: 1 });
        world.apply(intent(1, 7, 1.0, 1.0));
        world.apply(WorldCommand::Despawn { id: 1 });

        // Reconnecting with the same id starts over with a null ack.
        world.apply(WorldCommand::Spawn { id: 1 });
        let snapshot = world.snapshot();
        assert_eq!(snapshot[&1].last_processed_input, None);
        assert_approx_eq!(snapshot[&1].position.x, 0.0);
    }

    #[test]
    fn despawn_of_unknown_entity_is_a_noop() {
        let mut world = World::new();
        world.apply(WorldCommand::Despawn { id: 42 });
        assert!(world.is_empty());
    }

    #[test]
    fn duplicate_spawn_overwrites_and_resets() {
        let mut world = World::new();
        world.apply(WorldCommand::Spawn { id: 1 });
        world.apply(intent(1, 2, 3.0, 3.0));
        world.apply(WorldCommand::Spawn { id: 1 });

        let snapshot = world.snapshot();
        assert_approx_eq!(snapshot[&1].position.x, 0.0);
        assert_eq!(snapshot[&1].last_processed_input, None);
        assert_eq!(world.len(), 1);
    }

    #[test]
    fn step_skips_broadcast_for_empty_world() {
        let mut world = World::new();
        assert!(world.step(Vec::new()).is_none());

        // Still empty after commands that net out to nothing.
        assert!(world
            .step(vec![
                WorldCommand::Spawn { id: 1 },
                WorldCommand::Despawn { id: 1 },
            ])
            .is_none());
    }

    #[test]
    fn snapshot_is_ordered_by_id() {
        let mut world = World::new();
        for id in [5, 1, 3] {
            world.apply(WorldCommand::Spawn { id });
        }

        let ids: Vec<u32> = world.snapshot().keys().copied().collect();
        assert_eq!(ids, vec![1, 3, 5]);
    }

    #[test]
    fn intents_only_touch_their_target() {
        let mut world = World::new();
        world.apply(WorldCommand::Spawn { id: 1 });
        world.apply(WorldCommand::Spawn { id: 2 });
        world.apply(intent(1, 1, 5.0, 3.0));

        let snapshot = world.snapshot();
        assert_approx_eq!(snapshot[&2].position.x, 0.0);
        assert_eq!(snapshot[&2].last_processed_input, None);
        assert_eq!(snapshot[&1].last_processed_input, Some(1));
    }
}
