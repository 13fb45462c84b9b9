//! Progression rules: click yield, upgrades and prestige resets.
//!
//! Everything here is pure over a `UserAccount` and the current bonus flag.
//! Callers are responsible for applying these under the record's lock.

use crate::core::error::GameError;
use crate::models::user::UserAccount;

pub const BASE_COINS_PER_CLICK: f64 = 1.0;
pub const EQUIPMENT_MULTIPLIER: f64 = 1.2;
pub const UPGRADE_COST_BASE: f64 = 100.0;
pub const UPGRADE_COST_EXPONENT: f64 = 1.1;
pub const BONUS_MULTIPLIER: f64 = 2.0;
pub const RESET_THRESHOLD: u64 = 1_000_000;
pub const RESET_BONUS_INCREASE: f64 = 1.1;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UpgradeOutcome {
    pub cost: u64,
    pub coins: u64,
    pub equipment_level: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResetOutcome {
    pub coins: u64,
    pub equipment_level: u32,
    pub resets: u32,
    pub reset_bonus_multiplier: f64,
}

fn level_exponent(equipment_level: u32) -> f64 {
    f64::from(equipment_level.saturating_sub(1))
}

/// Coins granted by one click. Truncates toward zero; `as` saturates on overflow.
pub fn compute_click_yield(user: &UserAccount, bonus_active: bool) -> u64 {
    let mut per_click = BASE_COINS_PER_CLICK
        * EQUIPMENT_MULTIPLIER.powf(level_exponent(user.equipment_level))
        * user.reset_bonus_multiplier;

    if bonus_active {
        per_click *= BONUS_MULTIPLIER;
    }

    per_click as u64
}

/// Adds one click's yield to the balance and returns the yield.
pub fn apply_click(user: &mut UserAccount, bonus_active: bool) -> u64 {
    let earned = compute_click_yield(user, bonus_active);
    user.coins = user.coins.saturating_add(earned);
    earned
}

pub fn compute_upgrade_cost(equipment_level: u32) -> u64 {
    (UPGRADE_COST_BASE * UPGRADE_COST_EXPONENT.powf(level_exponent(equipment_level))) as u64
}

pub fn apply_upgrade(user: &mut UserAccount) -> Result<UpgradeOutcome, GameError> {
    let cost = compute_upgrade_cost(user.equipment_level);

    let remaining = user
        .coins
        .checked_sub(cost)
        .ok_or(GameError::InsufficientFunds {
            cost,
            coins: user.coins,
        })?;

    user.coins = remaining;
    user.equipment_level = user.equipment_level.saturating_add(1);

    Ok(UpgradeOutcome {
        cost,
        coins: user.coins,
        equipment_level: user.equipment_level,
    })
}

pub fn can_reset(user: &UserAccount) -> bool {
    user.coins >= RESET_THRESHOLD
}

/// Prestige: wipe coins and equipment in exchange for a permanent multiplier.
pub fn apply_reset(user: &mut UserAccount) -> Result<ResetOutcome, GameError> {
    if !can_reset(user) {
        return Err(GameError::ThresholdNotMet {
            threshold: RESET_THRESHOLD,
            coins: user.coins,
        });
    }

    user.coins = 0;
    user.equipment_level = 1;
    user.resets = user.resets.saturating_add(1);
    user.reset_bonus_multiplier *= RESET_BONUS_INCREASE;

    Ok(ResetOutcome {
        coins: user.coins,
        equipment_level: user.equipment_level,
        resets: user.resets,
        reset_bonus_multiplier: user.reset_bonus_multiplier,
    })
}
