use crate::domain::ledger::LedgerRecord;
use crate::error::CsvError;
use std::io::Write;

/// Writes ledger history as CSV:
/// `id,from_account,to_account,amount,status,request_id,created_at`.
pub struct LedgerWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> LedgerWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_records(&mut self, records: &[LedgerRecord]) -> Result<(), CsvError> {
        if records.is_empty() {
            self.writer.write_record([
                "id",
                "from_account",
                "to_account",
                "amount",
                "status",
                "request_id",
                "created_at",
            ])?;
        }
        for record in records {
            self.writer.serialize(record)?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
