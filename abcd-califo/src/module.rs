// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The califo module: calibration wired to the bus.
//!
//! Phase 1 (accumulate) only republishes rescaled events and snapshots
//! spectra; once the warm-up window has passed, phase 2 (normal)
//! periodically runs a fit cycle per channel before each publication.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::{json, Value};

use abcd_common::machine::State;
use abcd_common::message::{arguments_of, command_of, compose_error, compose_event, compose_status};
use abcd_common::{should_terminate, topics};
use abcd_events::{decode_psd_events, encode_psd_events, PsdEvent};
use abcd_transport::framing::{receive_framed, receive_json, send_framed, send_json};
use abcd_transport::{data_topic, socket, versioned_topic};

use crate::calibration::{CalibratedChannel, FitOutcome};
use crate::config::CalifoConfig;

const MODULE: &str = "califo";

pub struct CalifoStatus {
    pub config: CalifoConfig,
    context: Option<zmq::Context>,
    status_socket: Option<zmq::Socket>,
    data_socket: Option<zmq::Socket>,
    commands_socket: Option<zmq::Socket>,
    abcd_data_socket: Option<zmq::Socket>,
    status_msg_id: u64,
    system_start: Instant,
    last_publication: Instant,
    channels: BTreeMap<u8, CalibratedChannel>,
    rng: StdRng,
    last_error: String,
}

impl CalifoStatus {
    pub fn new(config: CalifoConfig) -> Self {
        CalifoStatus {
            config,
            context: None,
            status_socket: None,
            data_socket: None,
            commands_socket: None,
            abcd_data_socket: None,
            status_msg_id: 0,
            system_start: Instant::now(),
            last_publication: Instant::now(),
            channels: BTreeMap::new(),
            rng: StdRng::from_entropy(),
            last_error: String::new(),
        }
    }

    pub fn context(&self) -> Option<&zmq::Context> {
        self.context.as_ref()
    }

    pub fn channel(&self, id: u8) -> Option<&CalibratedChannel> {
        self.channels.get(&id)
    }

    fn publish_period(&self) -> Duration {
        Duration::from_secs(self.config.publish_period_secs)
    }

    fn accumulation_window(&self) -> Duration {
        Duration::from_secs(self.config.accumulation_time_secs)
    }

    fn publish_message(&mut self, topic: &str, message: &Value) {
        if let Some(socket) = &self.status_socket {
            if let Err(err) = send_json(socket, &versioned_topic(topic), message) {
                tracing::error!(%err, topic, "unable to publish message");
            }
        }
        self.status_msg_id += 1;
    }

    fn publish_event(&mut self, text: &str) {
        let message = compose_event(MODULE, self.status_msg_id, text);
        self.publish_message(topics::EVENTS_CALIFO, &message);
    }

    fn publish_error_text(&mut self, text: &str) {
        let message = compose_error(MODULE, self.status_msg_id, text);
        self.publish_message(topics::EVENTS_CALIFO, &message);
    }

    fn publish_error(&mut self) {
        let text = std::mem::take(&mut self.last_error);
        self.publish_error_text(&text);
    }

    fn rebuild_channels(&mut self) {
        let expiration = Duration::from_secs(self.config.expiration_time_secs());
        let mut channels = BTreeMap::new();
        for channel_config in &self.config.channels {
            if !channel_config.enable {
                continue;
            }
            match CalibratedChannel::new(channel_config.clone(), expiration) {
                Some(channel) => {
                    channels.insert(channel_config.id, channel);
                }
                None => {
                    tracing::warn!(
                        channel = channel_config.id,
                        "invalid spectrum shape, channel not calibrated"
                    );
                }
            }
        }
        self.channels = channels;
    }

    /// Handle one events payload: accumulate, rescale, snapshot,
    /// republish.
    fn process_events_payload(&mut self, payload: &[u8]) {
        let events = decode_psd_events(payload);

        for channel in self.channels.values_mut() {
            channel.begin_batch();
        }

        let mut rescaled: Vec<PsdEvent> = Vec::with_capacity(events.len());
        for event in &events {
            if let Some(channel) = self.channels.get_mut(&event.channel) {
                let smear = self.rng.gen::<f64>();
                rescaled.push(channel.accumulate(event, smear));
            }
        }

        for channel in self.channels.values_mut() {
            channel.push_snapshot();
        }

        if !rescaled.is_empty() {
            let payload = encode_psd_events(&rescaled);
            let topic = data_topic(topics::DATA_ABCD_EVENTS, payload.len());
            if let Some(socket) = &self.data_socket {
                if let Err(err) = send_framed(socket, &topic, &payload) {
                    tracing::error!(%err, "unable to republish events");
                }
            }
        }
    }

    fn publish_fit_outcome(&mut self, outcome: &FitOutcome) {
        if !outcome.accepted {
            self.publish_error_text("Peak too far");
        }
        if self.config.publish_fit_events {
            let mut message =
                compose_event(MODULE, self.status_msg_id, &format!("Fit on channel {}", outcome.channel));
            message["channel"] = json!(outcome.channel);
            message["accepted"] = json!(outcome.accepted);
            message["scale_factor"] = json!(outcome.scale_factor);
            message["raw_data"] = json!(outcome.summed);
            if let Some(background) = &outcome.background {
                message["background"] = json!(background);
            }
            message["fit"] = json!(outcome.fit_curve);
            message["peak"] = json!({
                "amplitude": outcome.fitted.amplitude,
                "mu": outcome.fitted.mu,
                "sigma": outcome.fitted.sigma,
                "background": outcome.fitted.background,
                "alpha": outcome.fitted.alpha,
            });
            self.publish_message(topics::EVENTS_CALIFO, &message);
        }
    }
}

pub mod states {
    use super::*;

    pub const START: State<CalifoStatus> = State {
        id: 100,
        description: "start",
        action: actions::start,
    };
    pub const CREATE_CONTEXT: State<CalifoStatus> = State {
        id: 110,
        description: "create context",
        action: actions::create_context,
    };
    pub const CREATE_SOCKETS: State<CalifoStatus> = State {
        id: 120,
        description: "create sockets",
        action: actions::create_sockets,
    };
    pub const APPLY_CONFIG: State<CalifoStatus> = State {
        id: 130,
        description: "apply config",
        action: actions::apply_config,
    };

    // Accumulation phase
    pub const ACCUMULATE_PUBLISH_STATUS: State<CalifoStatus> = State {
        id: 200,
        description: "accumulate publish status",
        action: actions::accumulate_publish_status,
    };
    pub const ACCUMULATE_RECEIVE_COMMANDS: State<CalifoStatus> = State {
        id: 210,
        description: "accumulate receive commands",
        action: actions::accumulate_receive_commands,
    };
    pub const ACCUMULATE_READ_SOCKET: State<CalifoStatus> = State {
        id: 220,
        description: "accumulate read socket",
        action: actions::accumulate_read_socket,
    };

    // Normal phase
    pub const NORMAL_FIT_PEAK: State<CalifoStatus> = State {
        id: 300,
        description: "normal fit peak",
        action: actions::normal_fit_peak,
    };
    pub const NORMAL_PUBLISH_STATUS: State<CalifoStatus> = State {
        id: 310,
        description: "normal publish status",
        action: actions::normal_publish_status,
    };
    pub const NORMAL_RECEIVE_COMMANDS: State<CalifoStatus> = State {
        id: 320,
        description: "normal receive commands",
        action: actions::normal_receive_commands,
    };
    pub const NORMAL_READ_SOCKET: State<CalifoStatus> = State {
        id: 330,
        description: "normal read socket",
        action: actions::normal_read_socket,
    };

    pub const CLOSE_SOCKETS: State<CalifoStatus> = State {
        id: 800,
        description: "close sockets",
        action: actions::close_sockets,
    };
    pub const DESTROY_CONTEXT: State<CalifoStatus> = State {
        id: 810,
        description: "destroy context",
        action: actions::destroy_context,
    };
    pub const STOP: State<CalifoStatus> = State {
        id: 899,
        description: "stop",
        action: actions::stop,
    };
    pub const COMMUNICATION_ERROR: State<CalifoStatus> = State {
        id: 900,
        description: "communication error",
        action: actions::communication_error,
    };
    pub const PARSE_ERROR: State<CalifoStatus> = State {
        id: 910,
        description: "parse error",
        action: actions::parse_error,
    };
}

mod actions {
    use super::*;

    pub fn start(_status: &mut CalifoStatus) -> State<CalifoStatus> {
        states::CREATE_CONTEXT
    }

    pub fn create_context(status: &mut CalifoStatus) -> State<CalifoStatus> {
        status.context = Some(zmq::Context::new());
        states::CREATE_SOCKETS
    }

    pub fn create_sockets(status: &mut CalifoStatus) -> State<CalifoStatus> {
        let Some(context) = status.context.clone() else {
            status.last_error = "no transport context".to_string();
            return states::COMMUNICATION_ERROR;
        };

        let sockets = (|| -> Result<_, abcd_transport::TransportError> {
            let status_socket = socket::publisher(&context, &status.config.status_address)?;
            let data_socket = socket::publisher(&context, &status.config.data_address)?;
            let commands_socket = socket::puller(&context, &status.config.commands_address)?;
            let abcd_data_socket = socket::subscriber(
                &context,
                &status.config.abcd_data_address,
                &[topics::DATA_ABCD_EVENTS],
            )?;
            Ok((status_socket, data_socket, commands_socket, abcd_data_socket))
        })();

        match sockets {
            Ok((status_socket, data_socket, commands_socket, abcd_data_socket)) => {
                status.status_socket = Some(status_socket);
                status.data_socket = Some(data_socket);
                status.commands_socket = Some(commands_socket);
                status.abcd_data_socket = Some(abcd_data_socket);
                states::APPLY_CONFIG
            }
            Err(err) => {
                status.last_error = format!("socket creation: {err}");
                states::COMMUNICATION_ERROR
            }
        }
    }

    pub fn apply_config(status: &mut CalifoStatus) -> State<CalifoStatus> {
        status.rebuild_channels();
        status.system_start = Instant::now();
        status.publish_event("Configuration applied");
        states::ACCUMULATE_PUBLISH_STATUS
    }

    fn publish_status_message(status: &mut CalifoStatus, phase: &str) {
        let mut channels = Vec::new();
        for (&id, channel) in &status.channels {
            channels.push(json!({
                "id": id,
                "enabled": true,
                "scale_factor": channel.scale_factor(),
                "peak": {
                    "position": channel.config().peak.position,
                    "tolerance": channel.config().peak.tolerance,
                    "mu": channel.last_fit().mu,
                    "sigma": channel.last_fit().sigma,
                },
            }));
        }

        let mut message = compose_status(MODULE, status.status_msg_id);
        message["phase"] = json!(phase);
        message["channels"] = json!(channels);
        status.publish_message(topics::STATUS_CALIFO, &message);
        status.last_publication = Instant::now();
    }

    pub fn accumulate_publish_status(status: &mut CalifoStatus) -> State<CalifoStatus> {
        publish_status_message(status, "accumulate");
        states::ACCUMULATE_RECEIVE_COMMANDS
    }

    fn handle_commands(status: &mut CalifoStatus, read_state: State<CalifoStatus>) -> State<CalifoStatus> {
        if should_terminate() {
            return states::CLOSE_SOCKETS;
        }

        let Some(socket) = &status.commands_socket else {
            status.last_error = "no commands socket".to_string();
            return states::COMMUNICATION_ERROR;
        };

        let message = match receive_json(socket) {
            Ok(message) => message,
            Err(err) => {
                status.last_error = format!("command: {err}");
                return states::PARSE_ERROR;
            }
        };

        match command_of(&message) {
            Some("reconfigure") => {
                let config = arguments_of(&message).and_then(|arguments| arguments.get("config"));
                match config.map(|config| serde_json::from_value(config.clone())) {
                    Some(Ok(config)) => {
                        status.config = config;
                        status.publish_event("Special command: reconfigure");
                        states::APPLY_CONFIG
                    }
                    _ => {
                        status.last_error = "invalid reconfigure arguments".to_string();
                        states::PARSE_ERROR
                    }
                }
            }
            Some("quit") => {
                status.publish_event("Quitting");
                states::CLOSE_SOCKETS
            }
            _ => read_state,
        }
    }

    pub fn accumulate_receive_commands(status: &mut CalifoStatus) -> State<CalifoStatus> {
        handle_commands(status, states::ACCUMULATE_READ_SOCKET)
    }

    pub fn normal_receive_commands(status: &mut CalifoStatus) -> State<CalifoStatus> {
        handle_commands(status, states::NORMAL_READ_SOCKET)
    }

    fn drain_events(status: &mut CalifoStatus) -> Result<(), String> {
        let Some(socket) = status.abcd_data_socket.take() else {
            return Err("no data socket".to_string());
        };

        let mut result = Ok(());
        loop {
            match receive_framed(&socket, true) {
                Ok(Some(frame)) => {
                    let topic = frame.topic.as_deref().unwrap_or_default();
                    if topic.starts_with(topics::DATA_ABCD_EVENTS) {
                        status.process_events_payload(&frame.payload);
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    result = Err(format!("data receive: {err}"));
                    break;
                }
            }
        }

        status.abcd_data_socket = Some(socket);
        result
    }

    pub fn accumulate_read_socket(status: &mut CalifoStatus) -> State<CalifoStatus> {
        if let Err(text) = drain_events(status) {
            status.last_error = text;
            return states::COMMUNICATION_ERROR;
        }

        if status.last_publication.elapsed() > status.publish_period() {
            states::ACCUMULATE_PUBLISH_STATUS
        } else if status.system_start.elapsed() > status.accumulation_window() {
            states::NORMAL_FIT_PEAK
        } else {
            states::ACCUMULATE_RECEIVE_COMMANDS
        }
    }

    pub fn normal_fit_peak(status: &mut CalifoStatus) -> State<CalifoStatus> {
        let window = status.accumulation_window();
        let ids: Vec<u8> = status.channels.keys().copied().collect();
        for id in ids {
            let outcome = {
                let Some(channel) = status.channels.get_mut(&id) else {
                    continue;
                };
                channel.fit_cycle(window)
            };
            tracing::debug!(
                channel = id,
                accepted = outcome.accepted,
                mu = outcome.fitted.mu,
                scale_factor = outcome.scale_factor,
                "fit cycle"
            );
            status.publish_fit_outcome(&outcome);
        }
        states::NORMAL_PUBLISH_STATUS
    }

    pub fn normal_publish_status(status: &mut CalifoStatus) -> State<CalifoStatus> {
        publish_status_message(status, "normal");
        states::NORMAL_RECEIVE_COMMANDS
    }

    pub fn normal_read_socket(status: &mut CalifoStatus) -> State<CalifoStatus> {
        if let Err(text) = drain_events(status) {
            status.last_error = text;
            return states::COMMUNICATION_ERROR;
        }

        if status.last_publication.elapsed() > status.publish_period() {
            states::NORMAL_FIT_PEAK
        } else {
            states::NORMAL_RECEIVE_COMMANDS
        }
    }

    pub fn close_sockets(status: &mut CalifoStatus) -> State<CalifoStatus> {
        status.publish_event("Closing the sockets");
        status.status_socket = None;
        status.data_socket = None;
        status.commands_socket = None;
        status.abcd_data_socket = None;
        states::DESTROY_CONTEXT
    }

    pub fn destroy_context(status: &mut CalifoStatus) -> State<CalifoStatus> {
        status.context = None;
        states::STOP
    }

    pub fn stop(_status: &mut CalifoStatus) -> State<CalifoStatus> {
        states::STOP
    }

    pub fn communication_error(status: &mut CalifoStatus) -> State<CalifoStatus> {
        tracing::error!(error = %status.last_error, "communication error");
        status.publish_error();
        states::CLOSE_SOCKETS
    }

    pub fn parse_error(status: &mut CalifoStatus) -> State<CalifoStatus> {
        tracing::warn!(error = %status.last_error, "parse error");
        status.publish_error();
        states::ACCUMULATE_RECEIVE_COMMANDS
    }
}

/// Drive the module until its terminal state.
pub fn run(config: CalifoConfig, base_period: Duration) -> u32 {
    if let Err(err) = abcd_common::install_signal_handlers() {
        tracing::error!(%err, "unable to install the signal handlers");
    }
    let mut status = CalifoStatus::new(config);
    abcd_common::run_machine(&mut status, states::START, states::STOP.id, base_period)
}

#[cfg(test)]
mod tests {
    use super::*;
    use abcd_histogram::HistogramConfig;
    use crate::config::{CalifoChannelConfig, PeakConfig};

    fn inproc_config(tag: &str) -> CalifoConfig {
        CalifoConfig {
            status_address: format!("inproc://{tag}-status"),
            data_address: format!("inproc://{tag}-data"),
            commands_address: format!("inproc://{tag}-commands"),
            abcd_data_address: format!("inproc://{tag}-abcd"),
            accumulation_time_secs: 3600,
            publish_period_secs: 3600,
            publish_fit_events: false,
            channels: vec![CalifoChannelConfig {
                id: 0,
                enable: true,
                energy: HistogramConfig {
                    bins: 128,
                    min: 0.0,
                    max: 1024.0,
                },
                peak: PeakConfig {
                    position: 600.0,
                    tolerance: 50.0,
                    amplitude: 100.0,
                    sigma: 20.0,
                    background: 0.0,
                    alpha: 0.001,
                },
                background_estimate: Default::default(),
            }],
        }
    }

    fn step(status: &mut CalifoStatus, state: State<CalifoStatus>) -> State<CalifoStatus> {
        (state.action)(status)
    }

    fn bring_up(status: &mut CalifoStatus) {
        let mut state = states::START;
        while state != states::ACCUMULATE_PUBLISH_STATUS {
            state = step(status, state);
        }
    }

    #[test]
    fn initialization_builds_the_channels() {
        let mut status = CalifoStatus::new(inproc_config("califo-init"));
        bring_up(&mut status);
        assert!(status.channel(0).is_some());
        assert_eq!(status.channel(0).unwrap().scale_factor(), 1.0);
    }

    #[test]
    fn events_are_rescaled_and_republished() {
        let mut status = CalifoStatus::new(inproc_config("califo-flow"));
        bring_up(&mut status);

        let context = status.context().unwrap().clone();
        let republished = context.socket(zmq::SUB).unwrap();
        republished.connect(&status.config.data_address).unwrap();
        republished.set_subscribe(b"data_abcd_events").unwrap();
        let feeder = context.socket(zmq::PUB).unwrap();
        feeder.bind(&status.config.abcd_data_address).unwrap();
        std::thread::sleep(Duration::from_millis(50));

        let events = vec![
            PsdEvent {
                timestamp: 1,
                qshort: 100,
                qlong: 200,
                baseline: 5,
                channel: 0,
                pur: 0,
            },
            // An unconfigured channel: dropped from the republication.
            PsdEvent {
                timestamp: 2,
                qshort: 1,
                qlong: 2,
                baseline: 0,
                channel: 9,
                pur: 0,
            },
        ];
        let payload = encode_psd_events(&events);
        let topic = data_topic(topics::DATA_ABCD_EVENTS, payload.len());
        abcd_transport::send_framed(&feeder, &topic, &payload).unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        let frame = loop {
            step(&mut status, states::ACCUMULATE_READ_SOCKET);
            if let Some(frame) = receive_framed(&republished, true).unwrap() {
                break frame;
            }
            assert!(Instant::now() < deadline, "nothing republished");
            std::thread::sleep(Duration::from_millis(1));
        };

        let rescaled = decode_psd_events(&frame.payload);
        assert_eq!(rescaled.len(), 1);
        assert_eq!(rescaled[0].channel, 0);
        // Unit scale factor: the smear moves the charge by at most one.
        assert!(rescaled[0].qlong == 200 || rescaled[0].qlong == 201);
        assert_eq!(rescaled[0].baseline, 5);

        // The batch left a snapshot behind.
        let channel = status.channel(0).unwrap();
        assert_eq!(channel.scale_factor(), 1.0);
    }

    #[test]
    fn warm_up_expiry_switches_to_the_fit_phase() {
        let mut config = inproc_config("califo-phase");
        config.accumulation_time_secs = 0;
        let mut status = CalifoStatus::new(config);
        bring_up(&mut status);

        // With a zero warm-up the read action leaves the accumulation
        // phase immediately.
        std::thread::sleep(Duration::from_millis(5));
        let next = step(&mut status, states::ACCUMULATE_READ_SOCKET);
        assert_eq!(next, states::NORMAL_FIT_PEAK);

        // The fit cycle on an empty spectrum rejects and keeps the unit
        // scale factor.
        let next = step(&mut status, states::NORMAL_FIT_PEAK);
        assert_eq!(next, states::NORMAL_PUBLISH_STATUS);
        assert_eq!(status.channel(0).unwrap().scale_factor(), 1.0);
    }

    #[test]
    fn quit_command_shuts_the_module_down() {
        let mut status = CalifoStatus::new(inproc_config("califo-quit"));
        bring_up(&mut status);

        let context = status.context().unwrap().clone();
        let commander = context.socket(zmq::PUSH).unwrap();
        commander.connect(&status.config.commands_address).unwrap();
        commander
            .send(
                serde_json::to_vec(&json!({"msg_ID": 1, "command": "quit"})).unwrap(),
                0,
            )
            .unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            if step(&mut status, states::ACCUMULATE_RECEIVE_COMMANDS) == states::CLOSE_SOCKETS {
                break;
            }
            assert!(Instant::now() < deadline, "quit was not honored");
            std::thread::sleep(Duration::from_millis(1));
        }
    }
}
