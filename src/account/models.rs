//! Table names, logical statement keys and small domain types.

/// Opaque account identifier (`users.id`).
pub type AccountId = String;

pub mod tables {
    pub const USERS: &str = "users";
    pub const USER_ACCESSES: &str = "user_accesses";
    pub const USER_CURRENCIES: &str = "user_currencies";
    pub const CHARACTERS: &str = "characters";
    pub const SERVER_STATISTIC: &str = "server_statistic";
}

/// Logical keys: one per distinct statement shape.
pub mod keys {
    pub const VALIDATE_USER_LOGIN: &str = "VALIDATE_USER_LOGIN";
    pub const VALIDATE_ACCESS_TOKEN: &str = "VALIDATE_ACCESS_TOKEN";
    pub const UPDATE_ACCESS_TOKEN: &str = "UPDATE_ACCESS_TOKEN";
    pub const GET_USER_LEVEL: &str = "GET_USER_LEVEL";
    pub const GET_USER_UNBAN_TIME: &str = "GET_USER_UNBAN_TIME";
    pub const COUNT_USER_CURRENCIES: &str = "COUNT_USER_CURRENCIES";
    pub const CREATE_USER_CURRENCIES: &str = "CREATE_USER_CURRENCIES";
    pub const GET_GOLD: &str = "GET_GOLD";
    pub const GET_CASH: &str = "GET_CASH";
    pub const CHANGE_GOLD: &str = "CHANGE_GOLD";
    pub const CHANGE_CASH: &str = "CHANGE_CASH";
    pub const CREATE_USER_LOGIN_USERS: &str = "CREATE_USER_LOGIN_USERS";
    pub const CREATE_USER_LOGIN_ACCESSES: &str = "CREATE_USER_LOGIN_ACCESSES";
    pub const CREATE_USER_LOGIN_CURRENCIES: &str = "CREATE_USER_LOGIN_CURRENCIES";
    pub const FIND_USERNAME: &str = "FIND_USERNAME";
    pub const FIND_EMAIL: &str = "FIND_EMAIL";
    pub const RESOLVE_CHARACTER_OWNER: &str = "RESOLVE_CHARACTER_OWNER";
    pub const SET_USER_UNBAN_TIME: &str = "SET_USER_UNBAN_TIME";
    pub const SET_CHARACTER_UNMUTE_TIME_BY_NAME: &str = "SET_CHARACTER_UNMUTE_TIME_BY_NAME";
    pub const VALIDATE_EMAIL_VERIFICATION: &str = "VALIDATE_EMAIL_VERIFICATION";
    pub const UPDATE_USER_COUNT: &str = "UPDATE_USER_COUNT";
}

/// Fixed key of the single `server_statistic` row.
pub const SERVER_STATISTIC_ID: i32 = 1;

/// Balances kept in the currency ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Currency {
    Gold,
    Cash,
}

impl Currency {
    pub fn column(self) -> &'static str {
        match self {
            Currency::Gold => "gold",
            Currency::Cash => "cash",
        }
    }

    pub(crate) fn get_key(self) -> &'static str {
        match self {
            Currency::Gold => keys::GET_GOLD,
            Currency::Cash => keys::GET_CASH,
        }
    }

    pub(crate) fn change_key(self) -> &'static str {
        match self {
            Currency::Gold => keys::CHANGE_GOLD,
            Currency::Cash => keys::CHANGE_CASH,
        }
    }
}
