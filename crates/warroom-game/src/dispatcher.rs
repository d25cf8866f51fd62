//! Server-side action dispatch.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;
use warroom_protocol::{CorrelationToken, PlayerSlot, ServerMessage};
use warroom_world::{Kind, TypeRegistry};

use crate::actions::{ActionKind, PlayerAction, Rejection};
use crate::{GameError, GameState};

/// Decodes, validates and executes actions against the authoritative
/// state, and builds the reply for each one.
///
/// Owns the dice RNG so every roll in a match comes from one stream. Seed
/// it to replay a match.
#[derive(Debug)]
pub struct ActionDispatcher {
    actions: Arc<TypeRegistry<ActionKind>>,
    rng: StdRng,
}

impl ActionDispatcher {
    pub fn new(actions: Arc<TypeRegistry<ActionKind>>, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self { actions, rng }
    }

    /// Handles one action envelope from `actor`.
    ///
    /// Always answers with an [`ServerMessage::ActionReply`] carrying
    /// `token`, except when the payload does not decode: that is a broken
    /// peer, and the error is fatal for the connection.
    pub fn dispatch(
        &mut self,
        state: &mut GameState,
        actor: PlayerSlot,
        kind_id: u8,
        token: CorrelationToken,
        payload: &[u8],
    ) -> Result<ServerMessage, GameError> {
        let Ok(kind) = self.actions.kind_of(kind_id) else {
            tracing::warn!(kind_id, %actor, %token, "unknown action kind");
            return Ok(reply(token, Err(format!("Unknown action kind {kind_id}"))));
        };
        let action = PlayerAction::decode(kind, payload)?;
        let outcome = self.submit(state, actor, action)?;
        Ok(reply(token, outcome.map_err(Rejection::into_reason)))
    }

    /// Validates and, if valid, executes `action` as `actor`.
    ///
    /// The inner result is the validation outcome. The outer error means
    /// execution itself failed after validation passed.
    pub fn submit(
        &mut self,
        state: &mut GameState,
        actor: PlayerSlot,
        action: PlayerAction,
    ) -> Result<Result<(), Rejection>, GameError> {
        let kind = action.kind();
        if let Err(rejection) = action.validate(state, actor) {
            tracing::debug!(action = kind.name(), %actor, reason = %rejection, "action rejected");
            return Ok(Err(rejection));
        }
        action.execute(state, actor, &mut self.rng)?;
        tracing::debug!(action = kind.name(), %actor, "action executed");
        Ok(Ok(()))
    }

    /// The `(kind_id, payload)` pair a client sends for `action`.
    pub fn encode_request(
        actions: &TypeRegistry<ActionKind>,
        action: &PlayerAction,
    ) -> Result<(u8, Vec<u8>), GameError> {
        Ok((actions.id_of(action.kind())?, action.payload()?))
    }
}

fn reply(token: CorrelationToken, outcome: Result<(), String>) -> ServerMessage {
    ServerMessage::ActionReply { token, outcome }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Catalog;
    use crate::actions::{EndTurn, MoveUnit};
    use crate::testing::{ATTACKER, DEFENDER, commands_state};
    use warroom_world::EntityId;

    fn dispatcher() -> (ActionDispatcher, Arc<TypeRegistry<ActionKind>>) {
        let catalog = Catalog::new().unwrap();
        (
            ActionDispatcher::new(Arc::clone(&catalog.actions), Some(1)),
            catalog.actions,
        )
    }

    #[test]
    fn test_dispatch_executes_valid_action() {
        let (mut dispatcher, actions) = dispatcher();
        let mut state = commands_state();
        let action: PlayerAction = MoveUnit {
            unit: EntityId(0),
            path: vec![EntityId(1)],
        }
        .into();
        let (kind_id, payload) = ActionDispatcher::encode_request(&actions, &action).unwrap();

        let msg = dispatcher
            .dispatch(&mut state, ATTACKER, kind_id, CorrelationToken(7), &payload)
            .unwrap();
        assert_eq!(
            msg,
            ServerMessage::ActionReply {
                token: CorrelationToken(7),
                outcome: Ok(())
            }
        );
        assert_eq!(state.unit(EntityId(0)).unwrap().tile, Some(EntityId(1)));
    }

    #[test]
    fn test_dispatch_rejection_leaves_state_untouched() {
        let (mut dispatcher, actions) = dispatcher();
        let mut state = commands_state();
        state.take_changes();
        let (kind_id, payload) = ActionDispatcher::encode_request(&actions, &EndTurn.into()).unwrap();

        let msg = dispatcher
            .dispatch(&mut state, DEFENDER, kind_id, CorrelationToken(3), &payload)
            .unwrap();
        assert_eq!(
            msg,
            ServerMessage::ActionReply {
                token: CorrelationToken(3),
                outcome: Err("It is not your turn".into())
            }
        );
        assert!(!state.has_changes());
    }

    #[test]
    fn test_dispatch_unknown_kind_is_a_failed_reply() {
        let (mut dispatcher, _) = dispatcher();
        let mut state = commands_state();
        let msg = dispatcher
            .dispatch(&mut state, ATTACKER, 42, CorrelationToken(1), &[])
            .unwrap();
        assert!(matches!(
            msg,
            ServerMessage::ActionReply { outcome: Err(_), .. }
        ));
    }

    #[test]
    fn test_dispatch_garbled_payload_is_fatal() {
        let (mut dispatcher, actions) = dispatcher();
        let mut state = commands_state();
        let kind_id = actions.id_of(ActionKind::MoveUnit).unwrap();
        let err = dispatcher
            .dispatch(&mut state, ATTACKER, kind_id, CorrelationToken(1), &[1, 2])
            .unwrap_err();
        assert!(err.is_fatal());
    }
}
