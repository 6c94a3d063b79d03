//! Console output: pretty text or JSON lines

use anyhow::Result;
use chrono::{DateTime, Utc};
use kwb_decoder::{DataRecord, DecodedSignal, Message, MessageKind};
use serde::Serialize;
use std::io::{self, Write};

/// JSON view of a message and its decoded signals
#[derive(Debug, Serialize)]
struct MessageLine<'a> {
    message_id: u8,
    kind: MessageKind,
    counter: u8,
    received_at: DateTime<Utc>,
    payload: &'a [u8],
    signals: &'a [DecodedSignal],
}

pub struct Printer {
    json: bool,
}

impl Printer {
    pub fn new(json: bool) -> Self {
        Self { json }
    }

    pub fn message(&self, message: &Message, signals: &[DecodedSignal]) -> Result<()> {
        let mut out = io::stdout().lock();
        if self.json {
            let line = MessageLine {
                message_id: message.message_id(),
                kind: message.kind(),
                counter: message.counter(),
                received_at: message.received_at(),
                payload: message.payload(),
                signals,
            };
            writeln!(out, "{}", serde_json::to_string(&line)?)?;
            return Ok(());
        }

        writeln!(
            out,
            "════ Message {} ({}, counter {}) at {} ════",
            message.message_id(),
            message.kind(),
            message.counter(),
            message.received_at().format("%Y-%m-%d %H:%M:%S%.3f")
        )?;
        writeln!(out, "  payload: {}", hex(message.payload()))?;
        for signal in signals {
            writeln!(out, "  {}", signal)?;
        }
        Ok(())
    }

    pub fn record(&self, record: &DataRecord) -> Result<()> {
        let mut out = io::stdout().lock();
        if self.json {
            writeln!(out, "{}", serde_json::to_string(record)?)?;
            return Ok(());
        }

        writeln!(out, "════ Data after message {} ════", record.message_id)?;
        for signal in record.signals.values() {
            writeln!(out, "  {}", signal)?;
        }
        writeln!(out, "  boiler_on: {}", record.boiler_on)?;
        writeln!(out, "  run_time: {:.0} s", record.run_time_sec)?;
        writeln!(out, "  energy: {:.3} kWh", record.energy_kwh)?;
        writeln!(out, "  pellet_consumption: {:.3} kg", record.pellet_consumption_kg)?;
        Ok(())
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}
