use std::collections::BTreeMap;

use super::TeamId;

/// Gold held per team.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Treasury {
    gold_by_team: BTreeMap<TeamId, u32>,
}

impl Treasury {
    pub fn seeded(teams: &[TeamId], starting_gold: u32) -> Self {
        Self {
            gold_by_team: teams.iter().map(|team| (*team, starting_gold)).collect(),
        }
    }

    pub fn gold(&self, team: TeamId) -> u32 {
        self.gold_by_team.get(&team).copied().unwrap_or(0)
    }

    pub fn can_afford(&self, team: TeamId, amount: u32) -> bool {
        self.gold(team) >= amount
    }

    /// Leaves the balance untouched when it cannot cover `amount`.
    pub fn try_spend(&mut self, team: TeamId, amount: u32) -> bool {
        if amount == 0 {
            return true;
        }
        let Some(balance) = self.gold_by_team.get_mut(&team) else {
            return false;
        };
        if *balance < amount {
            return false;
        }
        *balance -= amount;
        true
    }

    pub fn deposit(&mut self, team: TeamId, amount: u32) {
        let balance = self.gold_by_team.entry(team).or_insert(0);
        *balance = balance.saturating_add(amount);
    }
}
