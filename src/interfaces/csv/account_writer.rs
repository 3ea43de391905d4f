use crate::domain::account::Account;
use crate::error::CsvError;
use serde::Serialize;
use std::io::Write;

#[derive(Serialize)]
struct BalanceRow<'a> {
    account_number: &'a str,
    balance: i64,
}

/// Writes final account balances as `account_number,balance` CSV.
pub struct AccountWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> AccountWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_accounts<'a>(
        &mut self,
        accounts: impl IntoIterator<Item = &'a Account>,
    ) -> Result<(), CsvError> {
        let mut written = 0usize;
        for account in accounts {
            self.writer.serialize(BalanceRow {
                account_number: &account.account_number,
                balance: account.balance,
            })?;
            written += 1;
        }
        if written == 0 {
            self.writer.write_record(["account_number", "balance"])?;
        }
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::account::{AccountId, NewAccount};
    use chrono::Utc;

    #[test]
    fn test_writes_header_and_rows() {
        let accounts = vec![
            NewAccount::new("A", 500).into_account(AccountId(1), Utc::now()),
            NewAccount::new("B", 0).into_account(AccountId(2), Utc::now()),
        ];
        let mut out = Vec::new();
        AccountWriter::new(&mut out).write_accounts(&accounts).unwrap();

        let text = String::from_utf8(out).unwrap();
        assert_eq!(text, "account_number,balance\nA,500\nB,0\n");
    }

    #[test]
    fn test_no_accounts_still_has_header() {
        let mut out = Vec::new();
        AccountWriter::new(&mut out)
            .write_accounts(&Vec::<Account>::new())
            .unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "account_number,balance\n");
    }
}
