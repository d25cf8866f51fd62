//! Combat resolution.
//!
//! A combat runs initiative level by initiative level. At each level the
//! factions with units there fire in turn, and each one first decides how
//! to spread its dice over the target categories. That decision is the
//! only point where the resolver waits:
//!
//! ```text
//! Idle → ResolvingInitiative(level) → AwaitingDiceChoice(faction)
//!          ↑                               │ resolve_volley
//!          └── next faction / next level ──┘
//!                                          … → Ended
//! ```
//!
//! Everything the resolver knows lives on the match entity
//! ([`CombatState`]), so clients see the same combat the server runs,
//! except the firing queue, which only the server needs.

use std::cmp::Reverse;
use std::collections::BTreeMap;

use rand::{Rng, RngCore};
use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};
use warroom_protocol::{ByteReader, ByteWriter, PlayerSlot, ProtocolError};
use warroom_world::EntityId;

use crate::config::{DamageRule, UnitCategory, UnitType};
use crate::entities::{CombatOption, Unit, read_id, read_ids, read_required_slot, read_slot, write_id, write_ids, write_slot};
use crate::{GameError, GameState, Rejection};

// ---------------------------------------------------------------------------
// Data
// ---------------------------------------------------------------------------

/// Dice per target category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiceAllocation {
    pub ground: i16,
    pub air: i16,
    pub sea: i16,
    pub sub: i16,
}

impl DiceAllocation {
    /// All `n` dice on one category.
    pub fn all_on(category: UnitCategory, n: i16) -> Self {
        let mut out = Self::default();
        *out.get_mut(category) = n;
        out
    }

    pub fn get(&self, category: UnitCategory) -> i16 {
        match category {
            UnitCategory::Ground => self.ground,
            UnitCategory::Air => self.air,
            UnitCategory::Sea => self.sea,
            UnitCategory::Sub => self.sub,
        }
    }

    pub fn get_mut(&mut self, category: UnitCategory) -> &mut i16 {
        match category {
            UnitCategory::Ground => &mut self.ground,
            UnitCategory::Air => &mut self.air,
            UnitCategory::Sea => &mut self.sea,
            UnitCategory::Sub => &mut self.sub,
        }
    }

    pub fn total(&self) -> i32 {
        UnitCategory::ALL.iter().map(|c| i32::from(self.get(*c))).sum()
    }

    pub(crate) fn write(&self, w: &mut ByteWriter) {
        for c in UnitCategory::ALL {
            w.write_i16(self.get(c));
        }
    }

    pub(crate) fn read(r: &mut ByteReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            ground: r.read_i16()?,
            air: r.read_i16()?,
            sea: r.read_i16()?,
            sub: r.read_i16()?,
        })
    }
}

/// One die rolled in combat. Never changed once recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CombatRoll {
    pub unique_id: i32,
    pub shooter: EntityId,
    /// `None` when every unit of the targeted category was already gone.
    pub target: Option<EntityId>,
    pub die_value: u8,
    pub is_hit: bool,
}

/// The active combat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CombatState {
    pub combat_id: i32,
    pub attacker: PlayerSlot,
    pub defender: PlayerSlot,
    pub tile: EntityId,
    /// `None` until the first level with participants is found.
    pub initiative_level: Option<u8>,
    pub phasing_faction: Option<PlayerSlot>,
    pub dice_available: i16,
    /// Bumped every time a faction is asked for dice.
    pub stage_counter: i32,
    pub pending_dice_choice: bool,
    pub supporting_units: Vec<EntityId>,
    pub rolls: Vec<CombatRoll>,
}

impl CombatState {
    pub(crate) fn write(&self, w: &mut ByteWriter) -> Result<(), ProtocolError> {
        w.write_i32(self.combat_id);
        write_slot(w, Some(self.attacker));
        write_slot(w, Some(self.defender));
        write_id(w, self.tile);
        w.write_u8(self.initiative_level.unwrap_or(u8::MAX));
        write_slot(w, self.phasing_faction);
        w.write_i16(self.dice_available);
        w.write_i32(self.stage_counter);
        w.write_bool(self.pending_dice_choice);
        write_ids(w, &self.supporting_units)?;
        w.write_len(self.rolls.len())?;
        for roll in &self.rolls {
            w.write_i32(roll.unique_id);
            write_id(w, roll.shooter);
            w.write_i32(roll.target.map_or(-1, EntityId::to_wire));
            w.write_u8(roll.die_value);
            w.write_bool(roll.is_hit);
        }
        Ok(())
    }

    pub(crate) fn read(r: &mut ByteReader<'_>) -> Result<Self, ProtocolError> {
        let combat_id = r.read_i32()?;
        let attacker = read_required_slot(r)?;
        let defender = read_required_slot(r)?;
        let tile = read_id(r)?;
        let initiative_level = match r.read_u8()? {
            u8::MAX => None,
            level => Some(level),
        };
        let phasing_faction = read_slot(r)?;
        let dice_available = r.read_i16()?;
        let stage_counter = r.read_i32()?;
        let pending_dice_choice = r.read_bool()?;
        let supporting_units = read_ids(r)?;
        let n = r.read_u16()?;
        let mut rolls = Vec::with_capacity(usize::from(n));
        for _ in 0..n {
            rolls.push(CombatRoll {
                unique_id: r.read_i32()?,
                shooter: read_id(r)?,
                target: EntityId::from_wire(r.read_i32()?),
                die_value: r.read_u8()?,
                is_hit: r.read_bool()?,
            });
        }
        Ok(Self {
            combat_id,
            attacker,
            defender,
            tile,
            initiative_level,
            phasing_faction,
            dice_available,
            stage_counter,
            pending_dice_choice,
            supporting_units,
            rolls,
        })
    }

    pub(crate) fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "combat_id": self.combat_id,
            "attacker": self.attacker.0,
            "defender": self.defender.0,
            "tile": self.tile.0,
            "initiative_level": self.initiative_level,
            "phasing_faction": self.phasing_faction.map(|s| s.0),
            "dice_available": self.dice_available,
            "stage_counter": self.stage_counter,
            "pending_dice_choice": self.pending_dice_choice,
            "rolls": self.rolls.len(),
        })
    }

    fn opponent_of(&self, faction: PlayerSlot) -> PlayerSlot {
        if faction == self.attacker {
            self.defender
        } else {
            self.attacker
        }
    }
}

/// Where the resolver stands after an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CombatStage {
    Idle,
    ResolvingInitiative(u8),
    AwaitingDiceChoice(PlayerSlot),
    Ended,
}

/// Reads the resolver's stage off the match entity.
pub fn combat_stage(state: &GameState) -> CombatStage {
    match state.match_state().ok().and_then(|m| m.combat.as_ref()) {
        None => CombatStage::Idle,
        Some(c) => match (c.pending_dice_choice, c.phasing_faction, c.initiative_level) {
            (true, Some(faction), _) => CombatStage::AwaitingDiceChoice(faction),
            (_, _, Some(level)) => CombatStage::ResolvingInitiative(level),
            _ => CombatStage::Idle,
        },
    }
}

// ---------------------------------------------------------------------------
// Participants
// ---------------------------------------------------------------------------

/// A unit in the fight, with its faction's modifiers applied.
#[derive(Debug, Clone)]
struct Combatant {
    id: EntityId,
    faction: PlayerSlot,
    strength: i16,
    effective: UnitType,
}

/// Live units in the combat: both sides' units on the tile plus the
/// supporting units, in id order.
fn combatants(state: &GameState, combat: &CombatState) -> Result<Vec<Combatant>, GameError> {
    let sides = [combat.attacker, combat.defender];
    let mut found: BTreeMap<EntityId, &Unit> = state
        .units()
        .filter(|(_, u)| u.tile == Some(combat.tile))
        .collect();
    for id in &combat.supporting_units {
        if let Some(unit) = state.unit(*id) {
            found.insert(*id, unit);
        }
    }

    let mut out = Vec::with_capacity(found.len());
    for (id, unit) in found {
        let Some(faction) = unit.faction.filter(|f| sides.contains(f)) else {
            continue;
        };
        if !unit.is_alive() {
            continue;
        }
        out.push(Combatant {
            id,
            faction,
            strength: unit.strength,
            effective: state.effective_type(unit)?,
        });
    }
    Ok(out)
}

/// A candidate target as the damage rules see it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetCandidate {
    pub id: EntityId,
    pub strength: i16,
    pub initiative: u8,
}

/// Picks who a die hits among `candidates` (all of one category, all
/// alive). `None` if there are none.
pub fn pick_target(
    rule: DamageRule,
    candidates: &[TargetCandidate],
    rng: &mut dyn RngCore,
) -> Option<EntityId> {
    match rule {
        DamageRule::HighestStrengthLowestInitiative => candidates
            .iter()
            .min_by_key(|c| (Reverse(c.strength), c.initiative, c.id))
            .map(|c| c.id),
        DamageRule::RandomAmongStrongest => {
            let top = candidates.iter().map(|c| c.strength).max()?;
            let strongest: Vec<EntityId> = candidates
                .iter()
                .filter(|c| c.strength == top)
                .map(|c| c.id)
                .collect();
            strongest.choose(rng).copied()
        }
        DamageRule::FullRandom => candidates.choose(rng).map(|c| c.id),
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Checks a dice decision against the active combat. Pure.
///
/// Accepted only when the actor is the phasing faction, the dice add up to
/// exactly `dice_available`, and every category with dice on it has at
/// least one opposing unit present. Categories with no dice are never
/// checked.
pub fn validate_decision(
    state: &GameState,
    actor: PlayerSlot,
    dice: &DiceAllocation,
) -> Result<(), Rejection> {
    let combat = state
        .match_state()
        .ok()
        .and_then(|m| m.combat.as_ref())
        .filter(|c| c.pending_dice_choice)
        .ok_or_else(|| Rejection::new("No combat ongoing"))?;

    if combat.phasing_faction != Some(actor) {
        return Err(Rejection::new("You are not the phasing faction in combat"));
    }
    if UnitCategory::ALL.iter().any(|c| dice.get(*c) < 0) {
        return Err(Rejection::new("Dice counts cannot be negative"));
    }

    let available = i32::from(combat.dice_available);
    if dice.total() < available {
        return Err(Rejection::new("Not enough dice assigned"));
    }
    if dice.total() > available {
        return Err(Rejection::new("Too many dice assigned"));
    }

    let present = opposing_categories(state, combat, actor)
        .map_err(|_| Rejection::new("Opposing units are not known"))?;
    let unmatched = UnitCategory::ALL
        .iter()
        .any(|c| dice.get(*c) > 0 && !present.contains(c));
    if unmatched {
        return Err(Rejection::new(
            "Some dice are set to target unit types which are not present",
        ));
    }
    Ok(())
}

fn opposing_categories(
    state: &GameState,
    combat: &CombatState,
    faction: PlayerSlot,
) -> Result<Vec<UnitCategory>, GameError> {
    let opponent = combat.opponent_of(faction);
    let mut cats: Vec<UnitCategory> = combatants(state, combat)?
        .into_iter()
        .filter(|c| c.faction == opponent)
        .map(|c| c.effective.category)
        .collect();
    cats.sort();
    cats.dedup();
    Ok(cats)
}

/// What the server submits for a faction that ran out of time: every die
/// on the first category that has targets.
pub fn default_allocation(state: &GameState) -> Option<(PlayerSlot, DiceAllocation)> {
    let combat = state.match_state().ok()?.combat.as_ref()?;
    if !combat.pending_dice_choice {
        return None;
    }
    let faction = combat.phasing_faction?;
    let category = *opposing_categories(state, combat, faction).ok()?.first()?;
    Some((faction, DiceAllocation::all_on(category, combat.dice_available)))
}

// ---------------------------------------------------------------------------
// Resolver
// ---------------------------------------------------------------------------

/// Drives the active combat on the authoritative state.
///
/// Borrowed for one operation at a time; all state lives in the
/// [`GameState`].
pub struct CombatResolver<'a> {
    state: &'a mut GameState,
}

impl<'a> CombatResolver<'a> {
    pub fn new(state: &'a mut GameState) -> Self {
        Self { state }
    }

    /// Starts a combat for `option` and runs it to the first decision.
    ///
    /// Participants are revealed to everyone.
    ///
    /// # Errors
    /// [`GameError::CombatInProgress`] if a combat is already active.
    pub fn start(&mut self, option: CombatOption) -> Result<CombatStage, GameError> {
        let combat_id = {
            let m = self.state.match_state_mut()?;
            if m.combat.is_some() {
                return Err(GameError::CombatInProgress);
            }
            let id = m.next_combat_id;
            m.next_combat_id = m.next_combat_id.wrapping_add(1);
            m.combat = Some(CombatState {
                combat_id: id,
                attacker: option.attacker,
                defender: option.defender,
                tile: option.tile,
                initiative_level: None,
                phasing_faction: None,
                dice_available: 0,
                stage_counter: 0,
                pending_dice_choice: false,
                supporting_units: option.supporting_units,
                rolls: Vec::new(),
            });
            id
        };
        self.state.firing_queue.clear();

        let combat = self.combat()?.clone();
        for c in combatants(self.state, &combat)? {
            self.state.unit_mut(c.id)?.revealed = true;
        }

        tracing::info!(
            combat_id,
            attacker = %combat.attacker,
            defender = %combat.defender,
            tile = %combat.tile,
            "combat started"
        );
        self.next_decision()
    }

    fn combat(&self) -> Result<&CombatState, GameError> {
        self.state.match_state()?.combat.as_ref().ok_or(GameError::NoCombat)
    }

    fn combat_mut(&mut self) -> Result<&mut CombatState, GameError> {
        self.state.match_state_mut()?.combat.as_mut().ok_or(GameError::NoCombat)
    }

    /// Fires `faction`'s units at the current level with `dice`, then moves
    /// on to the next decision or to the end.
    ///
    /// `dice` must already have passed [`validate_decision`].
    ///
    /// # Errors
    /// [`GameError::CombatContract`] if it did not: wrong faction, wrong
    /// total, or dice on a category with nothing to shoot at.
    pub fn resolve_volley(
        &mut self,
        faction: PlayerSlot,
        dice: DiceAllocation,
        rng: &mut dyn RngCore,
    ) -> Result<CombatStage, GameError> {
        let combat = self.combat()?.clone();
        if !combat.pending_dice_choice || combat.phasing_faction != Some(faction) {
            return Err(GameError::CombatContract(format!(
                "{faction} is not awaited for dice"
            )));
        }
        if dice.total() != i32::from(combat.dice_available) {
            return Err(GameError::CombatContract(format!(
                "{} dice allocated, {} available",
                dice.total(),
                combat.dice_available
            )));
        }
        let level = combat
            .initiative_level
            .ok_or_else(|| GameError::CombatContract("no initiative level".into()))?;

        let everyone = combatants(self.state, &combat)?;
        let opponent = combat.opponent_of(faction);
        let shooters: Vec<&Combatant> = everyone
            .iter()
            .filter(|c| c.faction == faction && c.effective.initiative == level)
            .collect();
        let mut targets: BTreeMap<UnitCategory, Vec<EntityId>> = BTreeMap::new();
        for c in everyone.iter().filter(|c| c.faction == opponent) {
            targets.entry(c.effective.category).or_default().push(c.id);
        }
        for category in UnitCategory::ALL {
            if dice.get(category) > 0 && !targets.contains_key(&category) {
                return Err(GameError::CombatContract(format!(
                    "dice on {} with no target",
                    category.name()
                )));
            }
        }

        let rule = self.state.ruleset().damage_rule;
        let mut remaining = dice;
        let mut rolls = Vec::new();
        for shooter in shooters {
            for _ in 0..shooter.strength {
                let Some(category) = UnitCategory::ALL
                    .into_iter()
                    .find(|c| remaining.get(*c) > 0)
                else {
                    break;
                };
                *remaining.get_mut(category) -= 1;

                let candidates = self.live_candidates(targets.get(&category).map_or(&[][..], Vec::as_slice));
                let target = pick_target(rule, &candidates, rng);
                let die_value: u8 = rng.random_range(1..=6);
                let is_hit = i16::from(die_value) <= shooter.effective.attack.against(category);
                if let Some(target) = target.filter(|_| is_hit) {
                    self.state.unit_mut(target)?.strength -= 1;
                }

                let unique_id = {
                    let m = self.state.match_state_mut()?;
                    let id = m.next_roll_id;
                    m.next_roll_id = m.next_roll_id.wrapping_add(1);
                    id
                };
                rolls.push(CombatRoll {
                    unique_id,
                    shooter: shooter.id,
                    target,
                    die_value,
                    is_hit,
                });
            }
        }

        let hits = rolls.iter().filter(|r| r.is_hit && r.target.is_some()).count();
        tracing::debug!(%faction, level, dice = rolls.len(), hits, "volley resolved");
        let combat = self.combat_mut()?;
        combat.rolls.extend(rolls);
        combat.pending_dice_choice = false;
        self.next_decision()
    }

    fn live_candidates(&self, ids: &[EntityId]) -> Vec<TargetCandidate> {
        ids.iter()
            .filter_map(|id| {
                let unit = self.state.unit(*id).filter(|u| u.is_alive())?;
                let initiative = self.state.effective_type(unit).ok()?.initiative;
                Some(TargetCandidate {
                    id: *id,
                    strength: unit.strength,
                    initiative,
                })
            })
            .collect()
    }

    /// Solicits the next faction with dice, walking up initiative levels as
    /// firing queues empty. Ends the combat when a side is wiped out or no
    /// level is left.
    fn next_decision(&mut self) -> Result<CombatStage, GameError> {
        loop {
            let combat = self.combat()?.clone();
            let everyone = combatants(self.state, &combat)?;
            let side_present = |f: PlayerSlot| everyone.iter().any(|c| c.faction == f);
            if !side_present(combat.attacker) || !side_present(combat.defender) {
                return self.end();
            }

            if let Some(faction) = self.state.firing_queue.pop_front() {
                let Some(level) = combat.initiative_level else {
                    continue;
                };
                let dice: i16 = everyone
                    .iter()
                    .filter(|c| c.faction == faction && c.effective.initiative == level)
                    .map(|c| c.strength)
                    .sum();
                if dice <= 0 {
                    continue;
                }
                let c = self.combat_mut()?;
                c.phasing_faction = Some(faction);
                c.dice_available = dice;
                c.pending_dice_choice = true;
                c.stage_counter += 1;
                tracing::debug!(%faction, level, dice, "awaiting dice choice");
                return Ok(CombatStage::AwaitingDiceChoice(faction));
            }

            let next_level = self
                .state
                .ruleset()
                .initiative_levels()
                .into_iter()
                .filter(|l| combat.initiative_level.is_none_or(|current| *l > current))
                .find(|l| everyone.iter().any(|c| c.effective.initiative == *l));
            let Some(level) = next_level else {
                return self.end();
            };

            let at_level = |f: PlayerSlot| {
                everyone
                    .iter()
                    .filter(|c| c.faction == f && c.effective.initiative == level)
                    .collect::<Vec<_>>()
            };
            let attacker_units = at_level(combat.attacker);
            let defender_units = at_level(combat.defender);
            let first_fire = |units: &[&Combatant]| units.iter().any(|c| c.effective.first_fire);
            let order = if first_fire(attacker_units.as_slice()) && !first_fire(defender_units.as_slice()) {
                [(combat.attacker, &attacker_units), (combat.defender, &defender_units)]
            } else {
                [(combat.defender, &defender_units), (combat.attacker, &attacker_units)]
            };

            self.state.firing_queue.clear();
            for (faction, units) in order {
                if !units.is_empty() {
                    self.state.firing_queue.push_back(faction);
                }
            }
            let c = self.combat_mut()?;
            c.initiative_level = Some(level);
            c.phasing_faction = None;
            tracing::debug!(level, queue = ?self.state.firing_queue, "resolving initiative");
        }
    }

    /// Removes destroyed participants and clears the active combat.
    fn end(&mut self) -> Result<CombatStage, GameError> {
        let combat = self.combat()?.clone();
        let mut ids: Vec<EntityId> = self
            .state
            .units()
            .filter(|(_, u)| u.tile == Some(combat.tile))
            .map(|(id, _)| id)
            .chain(combat.supporting_units.iter().copied())
            .collect();
        ids.sort();
        ids.dedup();

        let mut destroyed = 0;
        for id in ids {
            if self.state.unit(id).is_some_and(|u| !u.is_alive()) {
                self.state.kill_unit(id)?;
                destroyed += 1;
            }
        }

        self.state.match_state_mut()?.combat = None;
        self.state.firing_queue.clear();
        tracing::info!(
            combat_id = combat.combat_id,
            rolls = combat.rolls.len(),
            destroyed,
            "combat ended"
        );
        Ok(CombatStage::Ended)
    }
}
