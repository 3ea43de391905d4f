//! Domain model: accounts, ledger entries, transfer requests and the storage ports.

pub mod account;
pub mod ledger;
pub mod ports;
pub mod transfer;
