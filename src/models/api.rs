use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize)]
pub struct RegisterForm {
    pub username: String,
    pub password: String,
    pub confirm_password: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ClickResponse {
    pub coins: u64,
    pub equipment_level: u32,
    pub reset_bonus_multiplier: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UpgradeResponse {
    pub success: bool,
    pub coins: u64,
    pub equipment_level: u32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ResetResponse {
    pub success: bool,
    pub coins: u64,
    pub equipment_level: u32,
    pub resets: u32,
    pub reset_bonus_multiplier: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BonusStatusResponse {
    pub bonus_active: bool,
}

/// Everything the game screen needs in one payload
#[derive(Debug, Serialize, Deserialize)]
pub struct ProfileResponse {
    pub username: String,
    pub coins: u64,
    pub equipment_level: u32,
    pub resets: u32,
    pub reset_bonus_multiplier: f64,
    pub click_yield: u64,
    pub upgrade_cost: u64,
    pub can_reset: bool,
    pub bonus_active: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
}
