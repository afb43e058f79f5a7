use crate::application::gateway::PaymentOutcome;
use crate::error::Result;
use serde::Serialize;
use std::io::Write;

#[derive(Serialize)]
struct OutcomeRow<'a> {
    transaction_id: String,
    request_id: &'a str,
    method: &'a str,
    state: &'a str,
    attempts: u32,
    reason: &'a str,
}

impl<'a> From<&'a PaymentOutcome> for OutcomeRow<'a> {
    fn from(outcome: &'a PaymentOutcome) -> Self {
        Self {
            transaction_id: outcome.transaction_id.to_string(),
            request_id: outcome.request_id.as_str(),
            method: outcome.method.as_str(),
            state: outcome.final_state.as_str(),
            attempts: outcome.attempts,
            reason: outcome.reason.as_deref().unwrap_or_default(),
        }
    }
}

/// Writes payment outcomes as CSV, one row per request.
pub struct OutcomeWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> OutcomeWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_outcome(&mut self, outcome: &PaymentOutcome) -> Result<()> {
        self.writer.serialize(OutcomeRow::from(outcome))?;
        Ok(())
    }

    pub fn write_outcomes<'a, I>(&mut self, outcomes: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a PaymentOutcome>,
    {
        for outcome in outcomes {
            self.write_outcome(outcome)?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
