pub mod transaction_reader;
