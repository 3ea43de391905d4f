use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Internal, store-assigned account identifier.
///
/// Ordering on this type is the lock order: any unit of work that locks more
/// than one account locks them in ascending `AccountId`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AccountId(pub i64);

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A named account holding a balance in minor currency units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    /// Unique business key.
    pub account_number: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    /// Never negative.
    pub balance: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    pub fn can_cover(&self, amount: i64) -> bool {
        self.balance >= amount
    }
}

/// Input for creating an account through the CRUD collaborator.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewAccount {
    pub account_number: String,
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub balance: i64,
}

impl NewAccount {
    pub fn new(account_number: impl Into<String>, balance: i64) -> Self {
        let account_number = account_number.into();
        Self {
            name: account_number.clone(),
            account_number,
            email: String::new(),
            phone: String::new(),
            balance,
        }
    }

    pub(crate) fn into_account(self, id: AccountId, now: DateTime<Utc>) -> Account {
        Account {
            id,
            account_number: self.account_number,
            name: self.name,
            email: self.email,
            phone: self.phone,
            balance: self.balance,
            created_at: now,
            updated_at: now,
        }
    }
}
