use crate::domain::account::NewAccount;
use crate::error::CsvError;
use std::io::Read;

/// Reads accounts to seed from a CSV source.
///
/// Expected header: `account_number,name,email,phone,balance`; only
/// `account_number` and `name` are required.
pub struct AccountReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> AccountReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    pub fn accounts(self) -> impl Iterator<Item = Result<NewAccount, CsvError>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(CsvError::from))
    }
}
