use crate::application::intake::IntakeRequest;
use crate::error::CsvError;
use std::io::Read;

/// Reads transfer requests from a CSV source.
///
/// Expected header: `request_id,from,to,amount`. An empty `request_id` leaves the
/// id to be generated at intake. Whitespace is trimmed and short records are
/// accepted, so a trailing empty column may be omitted.
pub struct TransferReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> TransferReader<R> {
    /// Creates a new `TransferReader` from any `Read` source (e.g., File, Stdin).
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Returns an iterator that lazily reads and deserializes requests.
    ///
    /// A malformed row yields an error for that row only; the rest still stream.
    pub fn requests(self) -> impl Iterator<Item = Result<IntakeRequest, CsvError>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(CsvError::from))
    }
}
