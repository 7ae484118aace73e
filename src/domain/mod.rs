pub mod intent;
pub mod loan;
pub mod money;
pub mod phone;
pub mod ports;
pub mod queue;
pub mod sms;
pub mod transaction;
pub mod wallet;
