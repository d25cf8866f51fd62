//! The game state one peer holds: a registry of entities plus the ruleset
//! and the bookkeeping the server needs to replicate changes.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use warroom_protocol::PlayerSlot;
use warroom_world::{EntityId, EntityModel, EntityRegistry, IdPool, Inspection, Kind, TypeRegistry};

use crate::config::{Ruleset, ScenarioConfig, UnitType};
use crate::entities::{Card, Entity, EntityKind, Faction, MatchState, Tile, Unit, custom};
use crate::{GameError, GamePhase};

/// Id of the one match entity.
pub const MATCH_ID: EntityId = EntityId(0);

/// A pending replication message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    /// Push the entity's full state, scoped per receiving player.
    FullState { kind: EntityKind, id: EntityId },
    /// Send the same delta to everyone.
    Custom {
        kind: EntityKind,
        id: EntityId,
        sub_header: u8,
        payload: Vec<u8>,
    },
}

/// A peer's view of the game.
///
/// The server holds the authoritative one and mutates it only through
/// actions. Every mutating accessor records a [`Change`] so the server can
/// replicate exactly what was touched. Clients hold a replica built with
/// [`GameState::replica`] and feed it from the wire; their change log is
/// never drained.
#[derive(Debug)]
pub struct GameState {
    registry: EntityRegistry<Entity>,
    ruleset: Arc<Ruleset>,
    unit_ids: IdPool,
    changes: Vec<Change>,
    /// Factions still to fire at the current initiative level. Server only.
    pub(crate) firing_queue: VecDeque<PlayerSlot>,
}

impl GameState {
    /// The authoritative state for a new match, with the match entity in
    /// place and every array sized from `scenario`.
    pub fn new(
        types: Arc<TypeRegistry<EntityKind>>,
        ruleset: Arc<Ruleset>,
        scenario: ScenarioConfig,
    ) -> Result<Self, GameError> {
        // Tile ids travel as u16 in MOVE updates and neighbour lists.
        if scenario.tiles > u32::from(u16::MAX) {
            return Err(GameError::ScenarioTooLarge {
                kind: "tile",
                requested: scenario.tiles,
                max: u32::from(u16::MAX),
            });
        }
        let mut registry = EntityRegistry::new(types);
        registry.register_kind(EntityKind::Card, scenario.cards)?;
        registry.register_kind(EntityKind::Faction, u32::from(scenario.factions))?;
        registry.register_kind(EntityKind::Match, 1)?;
        registry.register_kind(EntityKind::Tile, scenario.tiles)?;
        registry.register_kind(EntityKind::Unit, scenario.units)?;
        registry.spawn(MATCH_ID, Entity::Match(MatchState::default()))?;

        Ok(Self {
            registry,
            ruleset,
            unit_ids: IdPool::new(scenario.units),
            changes: Vec::new(),
            firing_queue: VecDeque::new(),
        })
    }

    /// An empty client replica. Its shape arrives with the first resync.
    pub fn replica(types: Arc<TypeRegistry<EntityKind>>, ruleset: Arc<Ruleset>) -> Self {
        Self {
            registry: EntityRegistry::new(types),
            ruleset,
            unit_ids: IdPool::new(0),
            changes: Vec::new(),
            firing_queue: VecDeque::new(),
        }
    }

    pub fn registry(&self) -> &EntityRegistry<Entity> {
        &self.registry
    }

    /// Raw registry access for replication. Bypasses change tracking.
    pub fn registry_mut(&mut self) -> &mut EntityRegistry<Entity> {
        &mut self.registry
    }

    pub fn ruleset(&self) -> &Ruleset {
        &self.ruleset
    }

    // -----------------------------------------------------------------------
    // Change log
    // -----------------------------------------------------------------------

    /// Drains the change log.
    ///
    /// Repeated full states of one entity collapse into the last one; a
    /// later full state supersedes anything an earlier one said.
    pub fn take_changes(&mut self) -> Vec<Change> {
        let mut seen = HashSet::new();
        let mut out: Vec<Change> = std::mem::take(&mut self.changes)
            .into_iter()
            .rev()
            .filter(|c| match c {
                Change::FullState { kind, id } => seen.insert((*kind, *id)),
                Change::Custom { .. } => true,
            })
            .collect();
        out.reverse();
        out
    }

    pub fn has_changes(&self) -> bool {
        !self.changes.is_empty()
    }

    fn push_custom(&mut self, kind: EntityKind, id: EntityId, sub_header: u8, payload: Vec<u8>) {
        self.changes.push(Change::Custom {
            kind,
            id,
            sub_header,
            payload,
        });
    }

    // -----------------------------------------------------------------------
    // Typed access
    // -----------------------------------------------------------------------

    fn entity(&self, kind: EntityKind, id: EntityId) -> Option<&Entity> {
        self.registry
            .get(kind, id)
            .filter(|r| r.active)
            .map(|r| &r.entity)
    }

    /// Mutable access to an active entity; marks it for a full-state push.
    fn entity_mut(&mut self, kind: EntityKind, id: EntityId) -> Result<&mut Entity, GameError> {
        let record = self
            .registry
            .get_mut(kind, id)
            .filter(|r| r.active)
            .ok_or(GameError::MissingEntity {
                kind: kind.name(),
                id,
            })?;
        self.changes.push(Change::FullState { kind, id });
        Ok(&mut record.entity)
    }

    pub fn match_state(&self) -> Result<&MatchState, GameError> {
        match self.entity(EntityKind::Match, MATCH_ID) {
            Some(Entity::Match(m)) => Ok(m),
            _ => Err(GameError::NoMatch),
        }
    }

    pub fn match_state_mut(&mut self) -> Result<&mut MatchState, GameError> {
        match self.entity_mut(EntityKind::Match, MATCH_ID) {
            Ok(Entity::Match(m)) => Ok(m),
            _ => Err(GameError::NoMatch),
        }
    }

    /// Current phase. A replica that has not synced yet reports `Setup`.
    pub fn phase(&self) -> GamePhase {
        self.match_state().map_or(GamePhase::Setup, |m| m.phase)
    }

    pub fn unit(&self, id: EntityId) -> Option<&Unit> {
        match self.entity(EntityKind::Unit, id) {
            Some(Entity::Unit(u)) => Some(u),
            _ => None,
        }
    }

    pub fn unit_mut(&mut self, id: EntityId) -> Result<&mut Unit, GameError> {
        match self.entity_mut(EntityKind::Unit, id)? {
            Entity::Unit(u) => Ok(u),
            _ => Err(GameError::MissingEntity { kind: "unit", id }),
        }
    }

    pub fn tile(&self, id: EntityId) -> Option<&Tile> {
        match self.entity(EntityKind::Tile, id) {
            Some(Entity::Tile(t)) => Some(t),
            _ => None,
        }
    }

    pub fn tile_mut(&mut self, id: EntityId) -> Result<&mut Tile, GameError> {
        match self.entity_mut(EntityKind::Tile, id)? {
            Entity::Tile(t) => Ok(t),
            _ => Err(GameError::MissingEntity { kind: "tile", id }),
        }
    }

    pub fn faction(&self, slot: PlayerSlot) -> Option<&Faction> {
        match self.entity(EntityKind::Faction, faction_id(slot)) {
            Some(Entity::Faction(f)) => Some(f),
            _ => None,
        }
    }

    pub fn faction_mut(&mut self, slot: PlayerSlot) -> Result<&mut Faction, GameError> {
        let id = faction_id(slot);
        match self.entity_mut(EntityKind::Faction, id)? {
            Entity::Faction(f) => Ok(f),
            _ => Err(GameError::MissingEntity { kind: "faction", id }),
        }
    }

    pub fn card(&self, id: EntityId) -> Option<&Card> {
        match self.entity(EntityKind::Card, id) {
            Some(Entity::Card(c)) => Some(c),
            _ => None,
        }
    }

    /// Active cards, in id order.
    pub fn cards(&self) -> impl Iterator<Item = (EntityId, &Card)> + '_ {
        self.registry
            .records_of(EntityKind::Card)
            .filter(|r| r.active)
            .filter_map(|r| match &r.entity {
                Entity::Card(c) => Some((r.id, c)),
                _ => None,
            })
    }

    /// Cards nobody holds, in id order.
    pub fn deck(&self) -> Vec<EntityId> {
        self.cards()
            .filter(|(_, c)| c.holder.is_none())
            .map(|(id, _)| id)
            .collect()
    }

    /// How many more units can exist at once.
    pub fn free_unit_slots(&self) -> usize {
        usize::try_from(self.unit_ids.capacity())
            .unwrap_or(usize::MAX)
            .saturating_sub(self.unit_ids.live())
    }

    /// Active units, in id order.
    pub fn units(&self) -> impl Iterator<Item = (EntityId, &Unit)> + '_ {
        self.registry
            .records_of(EntityKind::Unit)
            .filter(|r| r.active)
            .filter_map(|r| match &r.entity {
                Entity::Unit(u) => Some((r.id, u)),
                _ => None,
            })
    }

    /// Active factions, in slot order.
    pub fn factions(&self) -> impl Iterator<Item = (PlayerSlot, &Faction)> + '_ {
        self.registry
            .records_of(EntityKind::Faction)
            .filter(|r| r.active)
            .filter_map(|r| match &r.entity {
                Entity::Faction(f) => Some((PlayerSlot(r.id.0 as u8), f)),
                _ => None,
            })
    }

    /// `unit`'s type with its faction's techs applied.
    ///
    /// # Errors
    /// [`GameError::UnknownUnitType`] if the type index is not in the
    /// ruleset, which is also what a replica gets for a hidden unit.
    pub fn effective_type(&self, unit: &Unit) -> Result<UnitType, GameError> {
        let base = self
            .ruleset
            .unit_type(unit.unit_type)
            .ok_or(GameError::UnknownUnitType(unit.unit_type))?;
        Ok(match unit.faction.and_then(|f| self.faction(f)) {
            Some(faction) => base.modified_for(&faction.techs),
            None => base.clone(),
        })
    }

    // -----------------------------------------------------------------------
    // Setup
    // -----------------------------------------------------------------------

    /// Adds the next faction. Its slot is its id.
    pub fn add_faction(&mut self, faction: Faction) -> Result<PlayerSlot, GameError> {
        let id = self.next_free_id(EntityKind::Faction)?;
        self.registry.spawn(id, Entity::Faction(faction))?;
        self.changes.push(Change::FullState {
            kind: EntityKind::Faction,
            id,
        });
        Ok(PlayerSlot(id.0 as u8))
    }

    pub fn add_tile(&mut self, tile: Tile) -> Result<EntityId, GameError> {
        let id = self.next_free_id(EntityKind::Tile)?;
        self.registry.spawn(id, Entity::Tile(tile))?;
        self.changes.push(Change::FullState {
            kind: EntityKind::Tile,
            id,
        });
        Ok(id)
    }

    pub fn add_card(&mut self, card: Card) -> Result<EntityId, GameError> {
        let id = self.next_free_id(EntityKind::Card)?;
        self.registry.spawn(id, Entity::Card(card))?;
        self.changes.push(Change::FullState {
            kind: EntityKind::Card,
            id,
        });
        Ok(id)
    }

    fn next_free_id(&self, kind: EntityKind) -> Result<EntityId, GameError> {
        let capacity = self.registry.capacity(kind).unwrap_or(0);
        let used = self.registry.records_of(kind).count();
        if used >= capacity {
            return Err(GameError::CapacityExhausted(capacity));
        }
        Ok(EntityId(used as u32))
    }

    /// Creates a unit, reusing a freed unit id when there is one.
    pub fn create_unit(
        &mut self,
        faction: PlayerSlot,
        unit_type: i32,
        tile: EntityId,
        strength: i16,
    ) -> Result<EntityId, GameError> {
        if self.ruleset.unit_type(unit_type).is_none() {
            return Err(GameError::UnknownUnitType(unit_type));
        }
        let id = self
            .unit_ids
            .allocate()
            .ok_or(GameError::CapacityExhausted(self.unit_ids.capacity() as usize))?;
        let unit = Unit {
            unit_type,
            strength,
            max_strength: strength,
            faction: Some(faction),
            tile: Some(tile),
            revealed: false,
        };
        self.registry.spawn(id, Entity::Unit(unit))?;
        self.changes.push(Change::FullState {
            kind: EntityKind::Unit,
            id,
        });
        tracing::debug!(%id, %faction, unit_type, "unit created");
        Ok(id)
    }

    /// Deactivates a unit and returns its id to the free list.
    pub fn kill_unit(&mut self, id: EntityId) -> Result<(), GameError> {
        let record = self
            .registry
            .get_mut(EntityKind::Unit, id)
            .filter(|r| r.active)
            .ok_or(GameError::MissingEntity { kind: "unit", id })?;
        record.active = false;
        if let Entity::Unit(unit) = &mut record.entity {
            unit.strength = 0;
        }
        self.changes.push(Change::FullState {
            kind: EntityKind::Unit,
            id,
        });
        self.unit_ids.release(id);
        tracing::debug!(%id, "unit destroyed");
        Ok(())
    }

    /// Moves a unit along `path`, replicating the move as a custom update.
    pub fn move_unit(&mut self, id: EntityId, path: &[EntityId]) -> Result<(), GameError> {
        let Some(&last) = path.last() else {
            return Ok(());
        };
        let payload = Unit::encode_move(path)?;
        let record = self
            .registry
            .get_mut(EntityKind::Unit, id)
            .filter(|r| r.active)
            .ok_or(GameError::MissingEntity { kind: "unit", id })?;
        if let Entity::Unit(unit) = &mut record.entity {
            unit.tile = Some(last);
        }
        self.push_custom(EntityKind::Unit, id, custom::UNIT_MOVE, payload);
        Ok(())
    }

    /// Hands a card to `holder` (`None` returns it to the deck).
    ///
    /// Emits the holder change for everyone, then a full state that reveals
    /// the contents to the new holder only.
    pub fn transfer_card(&mut self, id: EntityId, holder: Option<PlayerSlot>) -> Result<(), GameError> {
        let record = self
            .registry
            .get_mut(EntityKind::Card, id)
            .filter(|r| r.active)
            .ok_or(GameError::MissingEntity { kind: "card", id })?;
        if let Entity::Card(card) = &mut record.entity {
            card.holder = holder;
        }
        self.push_custom(EntityKind::Card, id, custom::CARD_HOLDER, Card::encode_holder(holder));
        self.changes.push(Change::FullState {
            kind: EntityKind::Card,
            id,
        });
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Match flow
    // -----------------------------------------------------------------------

    /// Leaves `Setup`: fixes the turn order and hands out commands.
    pub fn start_game(&mut self) -> Result<(), GameError> {
        if self.phase() != GamePhase::Setup {
            return Err(GameError::Rejected("game already started".into()));
        }
        let order: Vec<PlayerSlot> = self.factions().map(|(slot, _)| slot).collect();
        {
            let m = self.match_state_mut()?;
            m.turn_order = order;
            m.turn_position = 0;
            m.round = 1;
            m.phase = GamePhase::GiveCommands;
        }
        self.refill_budgets()?;
        tracing::info!("game started");
        Ok(())
    }

    /// Tops every faction up to a full round of commands and production.
    fn refill_budgets(&mut self) -> Result<(), GameError> {
        let per_round = self.ruleset.commands_per_round;
        let slots: Vec<PlayerSlot> = self.factions().map(|(slot, _)| slot).collect();
        for slot in slots {
            let faction = self.faction_mut(slot)?;
            faction.commands = per_round;
            faction.production = faction.industry;
        }
        Ok(())
    }

    /// Passes the turn. After the last faction, moves to the next phase.
    pub fn end_turn(&mut self) -> Result<(), GameError> {
        let (wrapped, phase, pending) = {
            let m = self.match_state_mut()?;
            let next = usize::from(m.turn_position) + 1;
            let wrapped = next >= m.turn_order.len();
            m.turn_position = if wrapped { 0 } else { next as u8 };
            (wrapped, m.phase, !m.committed_combats.is_empty())
        };
        if wrapped {
            self.enter_phase_after(phase, pending)?;
        }
        Ok(())
    }

    /// Called when a combat ends: picks the next combat or starts a round.
    pub fn finish_combat(&mut self) -> Result<(), GameError> {
        if self.surviving_factions() <= 1 {
            self.match_state_mut()?.phase = GamePhase::Finished;
            tracing::info!("game finished");
            return Ok(());
        }
        let pending = !self.match_state()?.committed_combats.is_empty();
        self.enter_phase_after(GamePhase::Combat, pending)
    }

    fn enter_phase_after(&mut self, phase: GamePhase, pending: bool) -> Result<(), GameError> {
        let Some(next) = phase.after_round(pending) else {
            return Ok(());
        };
        let new_round = next == GamePhase::GiveCommands;
        {
            let m = self.match_state_mut()?;
            m.phase = next;
            m.turn_position = 0;
            if new_round {
                m.round = m.round.saturating_add(1);
            }
        }
        if new_round {
            self.refill_budgets()?;
        }
        tracing::debug!(phase = %next, "phase changed");
        Ok(())
    }

    fn surviving_factions(&self) -> usize {
        let alive: HashSet<PlayerSlot> = self
            .units()
            .filter(|(_, u)| u.is_alive())
            .filter_map(|(_, u)| u.faction)
            .collect();
        alive.len()
    }

    // -----------------------------------------------------------------------
    // Inspection
    // -----------------------------------------------------------------------

    /// Field dump of every active entity, in kind then id order.
    pub fn inspect_all(&self) -> Vec<(EntityKind, EntityId, Inspection)> {
        self.registry
            .records()
            .filter(|(_, r)| r.active)
            .map(|(_, r)| (r.entity.kind(), r.id, r.entity.inspect()))
            .collect()
    }
}

/// Faction entity id for a slot.
pub fn faction_id(slot: PlayerSlot) -> EntityId {
    EntityId(u32::from(slot.0))
}
