// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The tofcalc module: the coincidence matcher wired to the bus.

use std::time::{Duration, Instant};

use serde_json::{json, Value};

use abcd_common::machine::State;
use abcd_common::message::{arguments_of, command_of, compose_error, compose_event, compose_status};
use abcd_common::{should_terminate, topics};
use abcd_events::decode_psd_events;
use abcd_transport::framing::{receive_framed, receive_json, send_json};
use abcd_transport::{socket, versioned_topic};

use crate::config::TofCalcConfig;
use crate::matcher::CoincidenceMatcher;

const MODULE: &str = "tofcalc";

pub struct TofCalcStatus {
    pub config: TofCalcConfig,
    context: Option<zmq::Context>,
    status_socket: Option<zmq::Socket>,
    data_socket: Option<zmq::Socket>,
    commands_socket: Option<zmq::Socket>,
    abcd_data_socket: Option<zmq::Socket>,
    status_msg_id: u64,
    data_msg_id: u64,
    last_publication: Instant,
    matcher: CoincidenceMatcher,
    last_error: String,
}

impl TofCalcStatus {
    pub fn new(config: TofCalcConfig) -> Self {
        let matcher = CoincidenceMatcher::new(
            config.ns_per_sample,
            config.reference_channels.iter().copied(),
        );
        TofCalcStatus {
            config,
            context: None,
            status_socket: None,
            data_socket: None,
            commands_socket: None,
            abcd_data_socket: None,
            status_msg_id: 0,
            data_msg_id: 0,
            last_publication: Instant::now(),
            matcher,
            last_error: String::new(),
        }
    }

    pub fn matcher(&self) -> &CoincidenceMatcher {
        &self.matcher
    }

    pub fn context(&self) -> Option<&zmq::Context> {
        self.context.as_ref()
    }

    fn publish_period(&self) -> Duration {
        Duration::from_secs(self.config.publish_period_secs)
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
        self.publish_message(topics::EVENTS_TOFCALC, &message);
    }

    fn publish_error(&mut self) {
        let text = std::mem::take(&mut self.last_error);
        let message = compose_error(MODULE, self.status_msg_id, &text);
        self.publish_message(topics::EVENTS_TOFCALC, &message);
    }

    fn rebuild_matcher(&mut self) -> Result<(), abcd_histogram::HistogramError> {
        let mut matcher = CoincidenceMatcher::new(
            self.config.ns_per_sample,
            self.config.reference_channels.iter().copied(),
        );
        for channel in &self.config.channels {
            if channel.enable {
                matcher.add_channel(channel)?;
            }
        }
        self.matcher = matcher;
        Ok(())
    }
}

pub mod states {
    use super::*;

    pub const START: State<TofCalcStatus> = State {
        id: 100,
        description: "start",
        action: actions::start,
    };
    pub const CREATE_CONTEXT: State<TofCalcStatus> = State {
        id: 110,
        description: "create context",
        action: actions::create_context,
    };
    pub const CREATE_SOCKETS: State<TofCalcStatus> = State {
        id: 120,
        description: "create sockets",
        action: actions::create_sockets,
    };
    pub const APPLY_CONFIG: State<TofCalcStatus> = State {
        id: 130,
        description: "apply config",
        action: actions::apply_config,
    };
    pub const PUBLISH_STATUS: State<TofCalcStatus> = State {
        id: 200,
        description: "publish status",
        action: actions::publish_status,
    };
    pub const PUBLISH_DATA: State<TofCalcStatus> = State {
        id: 210,
        description: "publish data",
        action: actions::publish_data,
    };
    pub const RECEIVE_COMMANDS: State<TofCalcStatus> = State {
        id: 220,
        description: "receive commands",
        action: actions::receive_commands,
    };
    pub const READ_SOCKET: State<TofCalcStatus> = State {
        id: 230,
        description: "read socket",
        action: actions::read_socket,
    };
    pub const CLOSE_SOCKETS: State<TofCalcStatus> = State {
        id: 800,
        description: "close sockets",
        action: actions::close_sockets,
    };
    pub const DESTROY_CONTEXT: State<TofCalcStatus> = State {
        id: 810,
        description: "destroy context",
        action: actions::destroy_context,
    };
    pub const STOP: State<TofCalcStatus> = State {
        id: 899,
        description: "stop",
        action: actions::stop,
    };
    pub const COMMUNICATION_ERROR: State<TofCalcStatus> = State {
        id: 900,
        description: "communication error",
        action: actions::communication_error,
    };
    pub const PARSE_ERROR: State<TofCalcStatus> = State {
        id: 910,
        description: "parse error",
        action: actions::parse_error,
    };
    pub const CONFIGURE_ERROR: State<TofCalcStatus> = State {
        id: 920,
        description: "configure error",
        action: actions::configure_error,
    };
}

mod actions {
    use super::*;

    pub fn start(_status: &mut TofCalcStatus) -> State<TofCalcStatus> {
        states::CREATE_CONTEXT
    }

    pub fn create_context(status: &mut TofCalcStatus) -> State<TofCalcStatus> {
        status.context = Some(zmq::Context::new());
        states::CREATE_SOCKETS
    }

    pub fn create_sockets(status: &mut TofCalcStatus) -> State<TofCalcStatus> {
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

    pub fn apply_config(status: &mut TofCalcStatus) -> State<TofCalcStatus> {
        match status.rebuild_matcher() {
            Ok(()) => {
                status.publish_event("Configuration applied");
                states::PUBLISH_STATUS
            }
            Err(err) => {
                status.last_error = format!("configuration: {err}");
                states::CONFIGURE_ERROR
            }
        }
    }

    pub fn publish_status(status: &mut TofCalcStatus) -> State<TofCalcStatus> {
        let elapsed = status.last_publication.elapsed().as_secs_f64();

        let mut statuses = Vec::new();
        let mut active_channels = Vec::new();
        for (id, channel) in status.matcher.channels() {
            statuses.push(json!({
                "id": id,
                "enabled": true,
                "rate": channel.counts_partial as f64 / elapsed,
                "counts": channel.counts_total,
            }));
            active_channels.push(id);
        }

        let mut message = compose_status(MODULE, status.status_msg_id);
        message["statuses"] = json!(statuses);
        message["active_channels"] = json!(active_channels);
        message["reference_channels"] =
            json!(status.matcher.reference_channels().collect::<Vec<_>>());

        status.publish_message(topics::STATUS_TOFCALC, &message);
        status.matcher.reset_partial_counts();

        states::PUBLISH_DATA
    }

    pub fn publish_data(status: &mut TofCalcStatus) -> State<TofCalcStatus> {
        let mut channels_data = Vec::new();
        for (id, channel) in status.matcher.channels() {
            channels_data.push(json!({
                "id": id,
                "enabled": true,
                "reference": false,
                "counts": channel.counts_total,
                "ToF": channel.tof.to_json(),
                "energy": channel.energy.to_json(),
                "EvsToF": channel.energy_vs_tof.to_json(),
                "EvsE": channel.energy_vs_energy.to_json(),
            }));
        }

        let mut message = compose_status(MODULE, status.data_msg_id);
        message["channels"] = json!(channels_data);
        message["reference_channels"] =
            json!(status.matcher.reference_channels().collect::<Vec<_>>());
        status.data_msg_id += 1;

        if let Some(socket) = &status.data_socket {
            if let Err(err) = send_json(socket, &versioned_topic(topics::DATA_TOFCALC_HISTOGRAMS), &message) {
                tracing::error!(%err, "unable to publish histograms");
            }
        }

        status.last_publication = Instant::now();
        states::RECEIVE_COMMANDS
    }

    pub fn receive_commands(status: &mut TofCalcStatus) -> State<TofCalcStatus> {
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
            Some("reset") => {
                let channel = arguments_of(&message).and_then(|arguments| arguments.get("channel"));
                match channel {
                    Some(Value::Number(number)) => {
                        let id = number.as_u64().unwrap_or(u64::from(u8::MAX) + 1);
                        if id <= u64::from(u8::MAX) {
                            status.matcher.reset(Some(id as u8));
                            status.publish_event(&format!("Reset of channel {id}"));
                        }
                    }
                    _ => {
                        status.matcher.reset(None);
                        status.publish_event("Reset of all channels");
                    }
                }
                states::READ_SOCKET
            }
            Some("reconfigure") => {
                let config = arguments_of(&message).and_then(|arguments| arguments.get("config"));
                match config.map(|config| serde_json::from_value(config.clone())) {
                    Some(Ok(config)) => {
                        status.config = config;
                        status.publish_event("Special command: reconfigure");
                        states::APPLY_CONFIG
                    }
                    Some(Err(err)) => {
                        status.last_error = format!("reconfigure: {err}");
                        states::PARSE_ERROR
                    }
                    None => {
                        status.last_error = "reconfigure without a config".to_string();
                        states::PARSE_ERROR
                    }
                }
            }
            Some("quit") => {
                status.publish_event("Quitting");
                states::CLOSE_SOCKETS
            }
            _ => states::READ_SOCKET,
        }
    }

    pub fn read_socket(status: &mut TofCalcStatus) -> State<TofCalcStatus> {
        let Some(socket) = status.abcd_data_socket.take() else {
            status.last_error = "no data socket".to_string();
            return states::COMMUNICATION_ERROR;
        };

        loop {
            match receive_framed(&socket, true) {
                Ok(Some(frame)) => {
                    let topic = frame.topic.as_deref().unwrap_or_default();
                    if topic.starts_with(topics::DATA_ABCD_EVENTS) {
                        let mut events = decode_psd_events(&frame.payload);
                        let found = status.matcher.process(&mut events);
                        tracing::debug!(
                            events = events.len(),
                            coincidences = found,
                            "processed batch"
                        );
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    status.abcd_data_socket = Some(socket);
                    status.last_error = format!("data receive: {err}");
                    return states::COMMUNICATION_ERROR;
                }
            }
        }

        status.abcd_data_socket = Some(socket);

        if status.last_publication.elapsed() > status.publish_period() {
            states::PUBLISH_STATUS
        } else {
            states::RECEIVE_COMMANDS
        }
    }

    pub fn close_sockets(status: &mut TofCalcStatus) -> State<TofCalcStatus> {
        status.publish_event("Closing the sockets");
        status.status_socket = None;
        status.data_socket = None;
        status.commands_socket = None;
        status.abcd_data_socket = None;
        states::DESTROY_CONTEXT
    }

    pub fn destroy_context(status: &mut TofCalcStatus) -> State<TofCalcStatus> {
        status.context = None;
        states::STOP
    }

    pub fn stop(_status: &mut TofCalcStatus) -> State<TofCalcStatus> {
        states::STOP
    }

    pub fn communication_error(status: &mut TofCalcStatus) -> State<TofCalcStatus> {
        tracing::error!(error = %status.last_error, "communication error");
        status.publish_error();
        states::CLOSE_SOCKETS
    }

    pub fn parse_error(status: &mut TofCalcStatus) -> State<TofCalcStatus> {
        tracing::warn!(error = %status.last_error, "parse error");
        status.publish_error();
        states::READ_SOCKET
    }

    pub fn configure_error(status: &mut TofCalcStatus) -> State<TofCalcStatus> {
        tracing::warn!(error = %status.last_error, "configure error");
        status.publish_error();
        states::RECEIVE_COMMANDS
    }
}

/// Drive the module until its terminal state.
pub fn run(config: TofCalcConfig, base_period: Duration) -> u32 {
    if let Err(err) = abcd_common::install_signal_handlers() {
        tracing::error!(%err, "unable to install the signal handlers");
    }
    let mut status = TofCalcStatus::new(config);
    abcd_common::run_machine(&mut status, states::START, states::STOP.id, base_period)
}

#[cfg(test)]
mod tests {
    use super::*;
    use abcd_histogram::HistogramConfig;
    use crate::config::TofChannelConfig;

    fn inproc_config(tag: &str) -> TofCalcConfig {
        TofCalcConfig {
            status_address: format!("inproc://{tag}-status"),
            data_address: format!("inproc://{tag}-data"),
            commands_address: format!("inproc://{tag}-commands"),
            abcd_data_address: format!("inproc://{tag}-abcd"),
            ns_per_sample: 1.0,
            reference_channels: vec![0],
            channels: vec![TofChannelConfig {
                id: 1,
                enable: true,
                tof: HistogramConfig {
                    bins: 100,
                    min: -10.0,
                    max: 10.0,
                },
                ..Default::default()
            }],
            publish_period_secs: 3600,
        }
    }

    fn step(status: &mut TofCalcStatus, state: State<TofCalcStatus>) -> State<TofCalcStatus> {
        (state.action)(status)
    }

    #[test]
    fn initialization_reaches_the_normal_loop() {
        let mut status = TofCalcStatus::new(inproc_config("tofcalc-init"));
        let mut state = states::START;
        for _ in 0..8 {
            if state == states::PUBLISH_STATUS {
                break;
            }
            state = step(&mut status, state);
        }
        assert_eq!(state, states::PUBLISH_STATUS);
        assert!(status.context().is_some());
    }

    #[test]
    fn events_flow_into_the_matcher() {
        let mut status = TofCalcStatus::new(inproc_config("tofcalc-flow"));
        let mut state = states::START;
        while state != states::PUBLISH_STATUS {
            state = step(&mut status, state);
        }

        // Feed one batch through a same-context publisher. The subscriber
        // connects to the module's bound address, so the publisher binds.
        let context = status.context().unwrap().clone();
        let feeder = context.socket(zmq::PUB).unwrap();
        feeder.bind(&status.config.abcd_data_address).unwrap();
        std::thread::sleep(Duration::from_millis(50));

        let events = vec![
            abcd_events::PsdEvent {
                timestamp: 100,
                qshort: 10,
                qlong: 20,
                baseline: 0,
                channel: 0,
                pur: 0,
            },
            abcd_events::PsdEvent {
                timestamp: 103,
                qshort: 20,
                qlong: 50,
                baseline: 0,
                channel: 1,
                pur: 0,
            },
        ];
        let payload = abcd_events::encode_psd_events(&events);
        let topic = abcd_transport::data_topic(topics::DATA_ABCD_EVENTS, payload.len());
        abcd_transport::send_framed(&feeder, &topic, &payload).unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        while status.matcher().channel(1).unwrap().counts_total == 0 {
            assert!(Instant::now() < deadline, "no coincidence recorded");
            step(&mut status, states::READ_SOCKET);
            std::thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(status.matcher().channel(1).unwrap().counts_total, 1);
    }

    #[test]
    fn quit_routes_to_shutdown() {
        let mut status = TofCalcStatus::new(inproc_config("tofcalc-quit"));
        let mut state = states::START;
        while state != states::PUBLISH_STATUS {
            state = step(&mut status, state);
        }

        let context = status.context().unwrap().clone();
        let commander = context.socket(zmq::PUSH).unwrap();
        commander.connect(&status.config.commands_address).unwrap();
        commander
            .send(
                serde_json::to_vec(&serde_json::json!({"msg_ID": 1, "command": "quit"})).unwrap(),
                0,
            )
            .unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            let next = step(&mut status, states::RECEIVE_COMMANDS);
            if next == states::CLOSE_SOCKETS {
                break;
            }
            assert!(Instant::now() < deadline, "quit was not honored");
            std::thread::sleep(Duration::from_millis(1));
        }

        let mut state = states::CLOSE_SOCKETS;
        while state != states::STOP {
            state = step(&mut status, state);
        }
        assert!(status.context().is_none());
    }

    #[test]
    fn reset_command_clears_the_spectra() {
        let mut status = TofCalcStatus::new(inproc_config("tofcalc-reset"));
        let mut state = states::START;
        while state != states::PUBLISH_STATUS {
            state = step(&mut status, state);
        }

        // Fill directly through the matcher, then reset via command.
        let mut events = vec![
            abcd_events::PsdEvent {
                timestamp: 100,
                qshort: 0,
                qlong: 30,
                baseline: 0,
                channel: 0,
                pur: 0,
            },
            abcd_events::PsdEvent {
                timestamp: 101,
                qshort: 0,
                qlong: 40,
                baseline: 0,
                channel: 1,
                pur: 0,
            },
        ];
        status.matcher.process(&mut events);
        assert_eq!(status.matcher().channel(1).unwrap().counts_total, 1);

        let context = status.context().unwrap().clone();
        let commander = context.socket(zmq::PUSH).unwrap();
        commander.connect(&status.config.commands_address).unwrap();
        commander
            .send(
                serde_json::to_vec(&serde_json::json!({
                    "msg_ID": 2,
                    "command": "reset",
                    "arguments": {"channel": "all"},
                }))
                .unwrap(),
                0,
            )
            .unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        while status.matcher().channel(1).unwrap().counts_total != 0 {
            assert!(Instant::now() < deadline, "reset was not honored");
            step(&mut status, states::RECEIVE_COMMANDS);
            std::thread::sleep(Duration::from_millis(1));
        }
    }
}
