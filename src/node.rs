//! Bar chart node
//!
//! [`BarChartNode`] ties the pieces together: it decodes an inbound event,
//! dispatches the command and builds the outbound message. It owns its
//! store, and every mutating call takes `&mut self`, so one node is one
//! writer. Hosts that deliver events concurrently must serialize access
//! (e.g. behind a `Mutex`).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::command::{Command, InboundEvent};
use crate::config::ChartConfig;
use crate::correction;
use crate::engine::AggregationEngine;
use crate::error::{ChartError, Result, Warning};
use crate::kv::KeyValueStore;
use crate::meter::MeterProcessor;
use crate::output::OutputBuilder;
use crate::snapshot::{ChartMessage, Settings};
use crate::store::AggregationStore;
use crate::timekey::{now_ms, wall_clock};
use crate::window::Window;

/// Informational reply without chart data (clear, set meter value)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notice {
    pub topic: String,
    /// Always an empty object
    pub payload: Map<String, Value>,
    pub info: String,
}

impl Notice {
    pub fn new(topic: &str, info: String) -> Self {
        Self {
            topic: topic.to_string(),
            payload: Map::new(),
            info,
        }
    }
}

/// Message emitted for one inbound event
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum OutboundMessage {
    Chart(Box<ChartMessage>),
    Notice(Notice),
}

impl OutboundMessage {
    pub fn as_chart(&self) -> Option<&ChartMessage> {
        match self {
            OutboundMessage::Chart(chart) => Some(chart),
            OutboundMessage::Notice(_) => None,
        }
    }

    pub fn info(&self) -> Option<&str> {
        match self {
            OutboundMessage::Chart(chart) => chart.info.as_deref(),
            OutboundMessage::Notice(notice) => Some(&notice.info),
        }
    }
}

/// Result of handling one event
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub message: OutboundMessage,
    /// Non-fatal conditions, e.g. a clamped meter delta
    pub warnings: Vec<Warning>,
}

impl Outcome {
    fn chart(chart: ChartMessage, warnings: Vec<Warning>) -> Self {
        Self {
            message: OutboundMessage::Chart(Box::new(chart)),
            warnings,
        }
    }

    fn notice(topic: &str, info: String) -> Self {
        Self {
            message: OutboundMessage::Notice(Notice::new(topic, info)),
            warnings: Vec::new(),
        }
    }
}

/// One configured chart over an injected key-value store
#[derive(Debug)]
pub struct BarChartNode<S> {
    config: ChartConfig,
    engine: AggregationEngine,
    meter: Option<MeterProcessor>,
    output: OutputBuilder,
    store: AggregationStore<S>,
}

impl<S: KeyValueStore> BarChartNode<S> {
    /// Create a node; fails if the configuration is invalid
    pub fn new(config: ChartConfig, kv: S) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            engine: AggregationEngine::from_config(&config),
            meter: config
                .is_meter_reading
                .then(|| MeterProcessor::new(config.prevent_negative)),
            output: OutputBuilder::new(config.precision),
            store: AggregationStore::new(kv),
            config,
        })
    }

    pub fn config(&self) -> &ChartConfig {
        &self.config
    }

    pub fn store(&self) -> &AggregationStore<S> {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut AggregationStore<S> {
        &mut self.store
    }

    pub fn into_store(self) -> S {
        self.store.into_inner()
    }

    /// Handle a raw JSON event
    pub fn handle_json(&mut self, value: Value) -> Result<Outcome> {
        let event: InboundEvent = serde_json::from_value(value)
            .map_err(|e| ChartError::MalformedEvent(e.to_string()))?;
        self.handle(&event)
    }

    /// Handle one inbound event
    pub fn handle(&mut self, event: &InboundEvent) -> Result<Outcome> {
        let command = Command::decode(event)?;
        let at_ms = event.timestamp_ms()?.unwrap_or_else(now_ms);
        debug!(topic = %event.topic, command = command.name(), at_ms, "event decoded");
        self.dispatch(&event.topic, command, at_ms)
    }

    /// Execute a decoded command at `at_ms` (epoch milliseconds)
    pub fn dispatch(&mut self, topic: &str, command: Command, at_ms: i64) -> Result<Outcome> {
        match command {
            Command::Clear => {
                let info = correction::clear(&mut self.store, topic);
                Ok(Outcome::notice(topic, info))
            }
            Command::SetMeterValue { value } => {
                let info = correction::set_meter_value(&mut self.store, topic, value)?;
                Ok(Outcome::notice(topic, info))
            }
            Command::Overwrite {
                index,
                new_value,
                new_meter_value,
            } => {
                // Resolve the chart window first so a bad timestamp writes nothing
                let at = wall_clock(at_ms, self.config.time_zone)?;
                let window = self.engine.window(at)?;
                correction::overwrite_value(
                    &mut self.store,
                    topic,
                    index,
                    new_value,
                    new_meter_value,
                    self.config.is_meter_reading,
                )?;
                let chart = self.capture(&window, topic);
                Ok(Outcome::chart(chart, Vec::new()))
            }
            Command::Restore(snapshot) => {
                let at = wall_clock(at_ms, self.config.time_zone)?;
                let window = self.engine.window(at)?;
                snapshot.restore(&mut self.store);
                let chart = self.capture(&window, topic).with_info("data restored");
                Ok(Outcome::chart(chart, Vec::new()))
            }
            Command::Reading { value } => self.record(topic, value, at_ms),
        }
    }

    /// Fold a reading (absolute in meter mode) into `topic` at `at_ms`
    pub fn record(&mut self, topic: &str, reading: f64, at_ms: i64) -> Result<Outcome> {
        if !reading.is_finite() {
            return Err(ChartError::InvalidReading {
                topic: topic.to_string(),
                payload: reading.to_string(),
            });
        }
        let at = wall_clock(at_ms, self.config.time_zone)?;
        let window = self.engine.window(at)?;

        let mut warnings = Vec::new();
        let value = match &self.meter {
            Some(meter) => {
                let delta = meter.to_delta(&self.store, topic, reading);
                warnings.extend(delta.warning);
                delta.delta
            }
            None => reading,
        };

        self.engine.apply(&mut self.store, topic, value, at)?;
        if let Some(meter) = &self.meter {
            meter.commit(&mut self.store, topic, reading);
        }
        let chart = self.capture(&window, topic);
        Ok(Outcome::chart(chart, warnings))
    }

    /// Current chart for the window ending at `at_ms`, without mutating state
    pub fn chart(&self, topic: &str, at_ms: i64) -> Result<ChartMessage> {
        let at = wall_clock(at_ms, self.config.time_zone)?;
        let window = self.engine.window(at)?;
        Ok(self.capture(&window, topic))
    }

    fn capture(&self, window: &Window, topic: &str) -> ChartMessage {
        let output = self.output.build(&self.store, window);
        ChartMessage::capture(
            &self.store,
            window,
            output,
            Settings::from(&self.config),
            topic,
        )
    }
}
