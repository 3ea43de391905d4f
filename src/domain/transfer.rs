use super::account::AccountId;
use super::ledger::RequestId;
use crate::error::ValidationError;
use serde::{Deserialize, Serialize};

/// A positive amount in minor currency units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Amount(i64);

impl Amount {
    pub fn new(value: i64) -> Result<Self, ValidationError> {
        if value > 0 {
            Ok(Self(value))
        } else {
            Err(ValidationError::NonPositiveAmount(value))
        }
    }

    pub fn value(&self) -> i64 {
        self.0
    }
}

impl TryFrom<i64> for Amount {
    type Error = ValidationError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

/// One requested money movement. Lives only in memory: from intake until a
/// worker (or the synchronous caller) hands it to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TransferRequest {
    pub request_id: RequestId,
    pub from: String,
    pub to: String,
    pub amount: i64,
}

impl TransferRequest {
    pub fn new(
        request_id: impl Into<RequestId>,
        from: impl Into<String>,
        to: impl Into<String>,
        amount: i64,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            from: from.into(),
            to: to.into(),
            amount,
        }
    }

    /// Checks that need no store access: positive amount, non-empty and distinct accounts.
    pub fn validate(&self) -> Result<Amount, ValidationError> {
        let amount = Amount::new(self.amount)?;
        if self.from.is_empty() || self.to.is_empty() {
            return Err(ValidationError::EmptyAccountNumber);
        }
        if self.from == self.to {
            return Err(ValidationError::SameAccount);
        }
        Ok(amount)
    }
}

/// What a successful transfer returns to its caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransferReceipt {
    pub request_id: RequestId,
    pub entry_id: i64,
    pub from_account: AccountId,
    pub to_account: AccountId,
    pub amount: i64,
    /// True when the request id was already committed and no money moved this time.
    pub replayed: bool,
}

/// How the engine treats a request id that has been seen before.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum DuplicatePolicy {
    /// Execute again and record a second entry.
    Reexecute,
    /// Return the outcome recorded by the first attempt. Provisional default,
    /// pending a product decision on duplicate handling.
    #[default]
    ReturnPrior,
    /// Refuse the request outright.
    Reject,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_amount_validation() {
        assert!(Amount::new(1).is_ok());
        assert_eq!(Amount::new(0), Err(ValidationError::NonPositiveAmount(0)));
        assert_eq!(
            Amount::try_from(-5),
            Err(ValidationError::NonPositiveAmount(-5))
        );
    }

    #[test]
    fn test_request_validation() {
        assert_eq!(
            TransferRequest::new("r", "A", "B", 10).validate().map(|a| a.value()),
            Ok(10)
        );
        assert_eq!(
            TransferRequest::new("r", "A", "A", 10).validate(),
            Err(ValidationError::SameAccount)
        );
        assert_eq!(
            TransferRequest::new("r", "", "B", 10).validate(),
            Err(ValidationError::EmptyAccountNumber)
        );
        // amount is checked first
        assert_eq!(
            TransferRequest::new("r", "A", "A", 0).validate(),
            Err(ValidationError::NonPositiveAmount(0))
        );
    }
}
