pub mod clock;
pub mod db;
pub mod domain;
pub mod error;
pub mod ledger;
pub mod store;
pub mod validate;
