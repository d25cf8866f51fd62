//! Ruleset and scenario configuration.
//!
//! A [`Ruleset`] is pure data: the unit kinds, their initiative and attack
//! values, and the tech modifiers that improve them. It deserializes from
//! JSON so scenarios can ship their own, and [`Ruleset::standard`] provides
//! a built-in one.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::GameError;

// ---------------------------------------------------------------------------
// Unit categories and attack values
// ---------------------------------------------------------------------------

/// What a unit is, for targeting purposes.
///
/// Declaration order is the order dice are consumed in a volley.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum UnitCategory {
    Ground,
    Air,
    Sea,
    Sub,
}

impl UnitCategory {
    pub const ALL: [UnitCategory; 4] = [Self::Ground, Self::Air, Self::Sea, Self::Sub];

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(b: u8) -> Option<Self> {
        Self::ALL.get(usize::from(b)).copied()
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Ground => "ground",
            Self::Air => "air",
            Self::Sea => "sea",
            Self::Sub => "sub",
        }
    }
}

/// Hit thresholds against each category. A die hits on a roll ≤ the value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttackValues {
    #[serde(default)]
    pub ground: i16,
    #[serde(default)]
    pub air: i16,
    #[serde(default)]
    pub sea: i16,
    #[serde(default)]
    pub sub: i16,
}

impl AttackValues {
    pub fn against(&self, category: UnitCategory) -> i16 {
        match category {
            UnitCategory::Ground => self.ground,
            UnitCategory::Air => self.air,
            UnitCategory::Sea => self.sea,
            UnitCategory::Sub => self.sub,
        }
    }
}

// ---------------------------------------------------------------------------
// Tech modifiers
// ---------------------------------------------------------------------------

/// One improvement a tech grants to a unit kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModifierEffect {
    FirstFire,
    GroundAttack,
    AirAttack,
    SeaAttack,
    SubAttack,
    Movement,
}

/// Effects applied to a unit kind when its faction holds `tech`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TechModifier {
    pub tech: u16,
    pub effects: Vec<ModifierEffect>,
}

// ---------------------------------------------------------------------------
// UnitType
// ---------------------------------------------------------------------------

/// A unit kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitType {
    pub name: String,
    /// Firing-order rank. Lower fires earlier; several kinds may share one.
    pub initiative: u8,
    pub category: UnitCategory,
    pub attack: AttackValues,
    #[serde(default)]
    pub first_fire: bool,
    #[serde(default = "default_movement")]
    pub movement: u8,
    #[serde(default)]
    pub modifiers: Vec<TechModifier>,
}

fn default_movement() -> u8 {
    1
}

impl UnitType {
    /// This kind with every modifier unlocked by `techs` applied.
    ///
    /// Each attack or movement effect adds one.
    pub fn modified_for(&self, techs: &BTreeSet<u16>) -> UnitType {
        let mut out = self.clone();
        for modifier in self.modifiers.iter().filter(|m| techs.contains(&m.tech)) {
            for effect in &modifier.effects {
                match effect {
                    ModifierEffect::FirstFire => out.first_fire = true,
                    ModifierEffect::GroundAttack => out.attack.ground += 1,
                    ModifierEffect::AirAttack => out.attack.air += 1,
                    ModifierEffect::SeaAttack => out.attack.sea += 1,
                    ModifierEffect::SubAttack => out.attack.sub += 1,
                    ModifierEffect::Movement => out.movement = out.movement.saturating_add(1),
                }
            }
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Ruleset
// ---------------------------------------------------------------------------

/// How a die that hits picks its victim among the opposing units of the
/// targeted category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DamageRule {
    /// Highest remaining strength; ties go to the lowest initiative.
    #[default]
    HighestStrengthLowestInitiative,
    /// Uniformly among the units tied for highest remaining strength.
    RandomAmongStrongest,
    /// Uniformly among all candidates.
    FullRandom,
}

/// Everything about the game that is data rather than code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ruleset {
    /// Unit kinds. A unit's `unit_type` field indexes this list.
    pub unit_types: Vec<UnitType>,
    #[serde(default)]
    pub damage_rule: DamageRule,
    #[serde(default = "default_commands_per_round")]
    pub commands_per_round: i16,
    /// Strength a unit can be reinforced up to.
    #[serde(default = "default_max_strength")]
    pub max_strength: i16,
}

fn default_commands_per_round() -> i16 {
    3
}

fn default_max_strength() -> i16 {
    4
}

impl Ruleset {
    /// Parses a ruleset from JSON.
    ///
    /// # Errors
    /// [`GameError::Ruleset`] if the JSON is malformed or misses fields.
    pub fn from_json(json: &str) -> Result<Self, GameError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn unit_type(&self, index: i32) -> Option<&UnitType> {
        usize::try_from(index).ok().and_then(|i| self.unit_types.get(i))
    }

    /// Distinct initiative values in firing order.
    pub fn initiative_levels(&self) -> Vec<u8> {
        let levels: BTreeSet<u8> = self.unit_types.iter().map(|t| t.initiative).collect();
        levels.into_iter().collect()
    }

    /// The built-in ruleset.
    ///
    /// | # | kind      | init | cat    | G | A | S | Sub |
    /// |---|-----------|------|--------|---|---|---|-----|
    /// | 0 | fortress  | 0    | ground | 3 | 2 | 3 | 2   |
    /// | 1 | air force | 1    | air    | 1 | 3 | 1 | 1   |
    /// | 2 | carrier   | 2    | sea    | 1 | 2 | 2 | 2   |
    /// | 3 | submarine | 2    | sub    | 0 | 0 | 1 | 0   |
    /// | 4 | fleet     | 2    | sea    | 1 | 1 | 3 | 2   |
    /// | 5 | tank      | 3    | ground | 2 | 0 | 0 | 0   |
    /// | 6 | infantry  | 4    | ground | 3 | 1 | 1 | 0   |
    pub fn standard() -> Self {
        fn kind(
            name: &str,
            initiative: u8,
            category: UnitCategory,
            [ground, air, sea, sub]: [i16; 4],
            movement: u8,
        ) -> UnitType {
            UnitType {
                name: name.into(),
                initiative,
                category,
                attack: AttackValues { ground, air, sea, sub },
                first_fire: false,
                movement,
                modifiers: Vec::new(),
            }
        }

        let mut fortress = kind("Fortress", 0, UnitCategory::Ground, [3, 2, 3, 2], 0);
        fortress.first_fire = true;

        let mut air = kind("AirForce", 1, UnitCategory::Air, [1, 3, 1, 1], 2);
        air.modifiers.push(TechModifier {
            tech: tech::RADAR,
            effects: vec![ModifierEffect::FirstFire],
        });

        let carrier = kind("Carrier", 2, UnitCategory::Sea, [1, 2, 2, 2], 3);
        let submarine = kind("Submarine", 2, UnitCategory::Sub, [0, 0, 1, 0], 2);

        let mut fleet = kind("Fleet", 2, UnitCategory::Sea, [1, 1, 3, 2], 3);
        fleet.modifiers.push(TechModifier {
            tech: tech::SONAR,
            effects: vec![ModifierEffect::SubAttack],
        });

        let mut tank = kind("Tank", 3, UnitCategory::Ground, [2, 0, 0, 0], 2);
        tank.modifiers.push(TechModifier {
            tech: tech::HEAVY_TANKS,
            effects: vec![ModifierEffect::GroundAttack, ModifierEffect::FirstFire],
        });

        let mut infantry = kind("Infantry", 4, UnitCategory::Ground, [3, 1, 1, 0], 1);
        infantry.modifiers.push(TechModifier {
            tech: tech::MOTORIZED,
            effects: vec![ModifierEffect::Movement],
        });

        Self {
            unit_types: vec![fortress, air, carrier, submarine, fleet, tank, infantry],
            damage_rule: DamageRule::default(),
            commands_per_round: default_commands_per_round(),
            max_strength: default_max_strength(),
        }
    }
}

/// Tech ids used by [`Ruleset::standard`].
pub mod tech {
    pub const RADAR: u16 = 1;
    pub const SONAR: u16 = 2;
    pub const HEAVY_TANKS: u16 = 3;
    pub const MOTORIZED: u16 = 4;
}

/// Unit-type indices in [`Ruleset::standard`].
pub mod standard_units {
    pub const FORTRESS: i32 = 0;
    pub const AIR_FORCE: i32 = 1;
    pub const CARRIER: i32 = 2;
    pub const SUBMARINE: i32 = 3;
    pub const FLEET: i32 = 4;
    pub const TANK: i32 = 5;
    pub const INFANTRY: i32 = 6;
}

// ---------------------------------------------------------------------------
// Scenario capacities
// ---------------------------------------------------------------------------

/// Array capacities for one match. Fixed before any client connects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioConfig {
    pub factions: u8,
    pub tiles: u32,
    pub units: u32,
    pub cards: u32,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            factions: 3,
            tiles: 64,
            units: 300,
            cards: 110,
        }
    }
}
