mod common;
mod ledger;
mod persistence;
