//! CSV batch surface: payment requests in, outcomes out.

pub mod outcome_writer;
pub mod request_reader;
