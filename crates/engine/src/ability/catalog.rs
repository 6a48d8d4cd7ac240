use std::collections::BTreeMap;

use tracing::error;

use super::kinds;
use super::{
    AbilityInstance, AbilityKind, AbilityOutcome, AbilityParams, AbilityRequest, AbilityState,
    Channel, ExecutionPhase, Legality,
};
use crate::sim::{SimContext, SimError};
use crate::world::{Entity, EntityId, World};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AbilityDescriptor {
    pub kind: AbilityKind,
    pub phase: ExecutionPhase,
    pub channels: &'static [Channel],
    pub cancelable: bool,
}

/// Data-driven definition of one ability kind.
pub trait AbilityBehavior: Send + Sync {
    fn descriptor(&self) -> AbilityDescriptor;

    fn legality(&self, ctx: &SimContext<'_>, ability: &AbilityInstance) -> Legality;

    fn perform(&self, ctx: &mut SimContext<'_>, ability: &mut AbilityInstance) -> AbilityOutcome;

    /// Runs once when the instance is canceled. The default refunds what was paid up front.
    fn on_cancel(&self, ctx: &mut SimContext<'_>, ability: &AbilityInstance) {
        if ability.paid_cost == 0 {
            return;
        }
        if let Some(team) = ctx.world.entity(ability.performer).map(|e| e.team) {
            ctx.world.treasury.deposit(team, ability.paid_cost);
        }
    }

    fn cost(&self, _performer: &Entity, _params: &AbilityParams) -> u32 {
        0
    }

    /// Parameters for an attempt as the performer's default ability; `None` skips it.
    fn default_params(&self, _world: &World, _performer: EntityId) -> Option<AbilityParams> {
        None
    }

    fn cooldown_ticks(&self, performer: &Entity) -> u32;
}

pub struct AbilityCatalog {
    behaviors: BTreeMap<AbilityKind, Box<dyn AbilityBehavior>>,
}

impl AbilityCatalog {
    pub fn empty() -> Self {
        Self {
            behaviors: BTreeMap::new(),
        }
    }

    pub fn standard() -> Self {
        let mut catalog = Self::empty();
        catalog.register(Box::new(kinds::MoveBehavior));
        catalog.register(Box::new(kinds::AttackMoveBehavior));
        catalog.register(Box::new(kinds::ChargeBehavior));
        catalog.register(Box::new(kinds::HoldPositionBehavior));
        catalog.register(Box::new(kinds::ParadeBehavior));
        catalog.register(Box::new(kinds::AttackBehavior));
        catalog.register(Box::new(kinds::SiegeBehavior));
        catalog.register(Box::new(kinds::HealBehavior));
        catalog.register(Box::new(kinds::BuildBehavior));
        catalog.register(Box::new(kinds::RallyBehavior));
        catalog.register(Box::new(kinds::IncomeBehavior));
        catalog.register(Box::new(kinds::PickupBehavior));
        catalog
    }

    /// Replaces any behavior already registered for the same kind.
    pub fn register(&mut self, behavior: Box<dyn AbilityBehavior>) {
        self.behaviors.insert(behavior.descriptor().kind, behavior);
    }

    pub fn behavior(&self, kind: AbilityKind) -> Result<&dyn AbilityBehavior, SimError> {
        match self.behaviors.get(&kind) {
            Some(behavior) => Ok(behavior.as_ref()),
            None => {
                error!(kind = kind.name(), "ability_kind_unknown");
                Err(SimError::UnknownAbilityKind(kind))
            }
        }
    }

    pub fn descriptor(&self, kind: AbilityKind) -> Result<AbilityDescriptor, SimError> {
        self.behavior(kind).map(|behavior| behavior.descriptor())
    }

    pub fn kinds(&self) -> impl Iterator<Item = AbilityKind> + '_ {
        self.behaviors.keys().copied()
    }

    pub fn instantiate(
        &self,
        request: &AbilityRequest,
        performer: &Entity,
    ) -> Result<AbilityInstance, SimError> {
        let behavior = self.behavior(request.kind)?;
        let descriptor = behavior.descriptor();
        Ok(AbilityInstance {
            id: request.id,
            kind: request.kind,
            params: request.params.clone(),
            performer: request.performer,
            phase: descriptor.phase,
            channels: descriptor.channels,
            wait_until_legal: request.wait_until_legal,
            cooldown_ticks: behavior.cooldown_ticks(performer),
            state: AbilityState::Queued,
            progress: 0,
            paid_cost: 0,
        })
    }
}

impl Default for AbilityCatalog {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::{EntityData, TeamId};

    #[test]
    fn standard_catalog_covers_every_kind_with_a_matching_descriptor() {
        let catalog = AbilityCatalog::standard();
        for kind in AbilityKind::ALL {
            let descriptor = catalog.descriptor(kind).expect("registered");
            assert_eq!(descriptor.kind, kind);
            assert!(!descriptor.channels.is_empty());
        }
        assert_eq!(catalog.kinds().count(), AbilityKind::ALL.len());
    }

    #[test]
    fn missing_kind_is_fatal() {
        let catalog = AbilityCatalog::empty();
        assert!(matches!(
            catalog.behavior(AbilityKind::Heal),
            Err(SimError::UnknownAbilityKind(AbilityKind::Heal))
        ));
    }

    #[test]
    fn phases_follow_the_grid_interaction_split() {
        let catalog = AbilityCatalog::standard();
        let phase = |kind| catalog.descriptor(kind).expect("registered").phase;
        assert_eq!(phase(AbilityKind::Move), ExecutionPhase::PreInteractionGridUpdate);
        assert_eq!(phase(AbilityKind::Attack), ExecutionPhase::Interaction);
        assert_eq!(phase(AbilityKind::Build), ExecutionPhase::PostInteractionGridUpdate);
        assert!(!catalog
            .descriptor(AbilityKind::Income)
            .expect("registered")
            .cancelable);
    }

    #[test]
    fn instantiate_copies_request_and_descriptor() {
        let catalog = AbilityCatalog::standard();
        let performer = Entity::new(EntityId(1), TeamId(1), EntityData::soldier());
        let request = AbilityRequest::new(
            EntityId(1),
            AbilityKind::Attack,
            AbilityParams::Target {
                entity: EntityId(2),
            },
        )
        .waiting_until_legal();
        let instance = catalog.instantiate(&request, &performer).expect("known");
        assert_eq!(instance.phase, ExecutionPhase::Interaction);
        assert_eq!(instance.channels, &[Channel::Attack]);
        assert_eq!(instance.cooldown_ticks, 2);
        assert!(instance.wait_until_legal);
        assert_eq!(instance.state, AbilityState::Queued);
    }
}
