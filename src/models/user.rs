/// A registered player and their progression
#[derive(Clone, Debug, PartialEq)]
pub struct UserAccount {
    /// Generated account ID
    pub id: u64,
    /// Unique login name, immutable after creation
    pub username: String,
    /// Argon2 PHC string (salted)
    pub password_hash: String,
    /// Currency balance
    pub coins: u64,
    /// Current upgrade tier, starts at 1
    pub equipment_level: u32,
    /// Number of completed prestige cycles
    pub resets: u32,
    /// Permanent yield multiplier, only grows through resets
    pub reset_bonus_multiplier: f64,
}

impl UserAccount {
    pub fn new(id: u64, username: String, password_hash: String) -> Self {
        Self {
            id,
            username,
            password_hash,
            coins: 0,
            equipment_level: 1,
            resets: 0,
            reset_bonus_multiplier: 1.0,
        }
    }
}
