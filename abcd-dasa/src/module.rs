// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The recorder module: run files wired to the bus.

use std::time::{Duration, Instant};

use serde_json::{json, Value};

use abcd_common::machine::State;
use abcd_common::message::{arguments_of, command_of, compose_error, compose_event, compose_status};
use abcd_common::{should_terminate, topics};
use abcd_transport::framing::{receive_framed, receive_json, send_json};
use abcd_transport::{socket, versioned_topic};

use crate::config::DasaConfig;
use crate::recorder::{RecordingEnable, RecordingFiles};

const MODULE: &str = "lmno";

pub struct DasaStatus {
    pub config: DasaConfig,
    context: Option<zmq::Context>,
    status_socket: Option<zmq::Socket>,
    commands_socket: Option<zmq::Socket>,
    abcd_data_socket: Option<zmq::Socket>,
    abcd_status_socket: Option<zmq::Socket>,
    analyzer_status_socket: Option<zmq::Socket>,
    status_msg_id: u64,
    last_publication: Instant,
    files: Option<RecordingFiles>,
    last_error: String,
}

impl DasaStatus {
    pub fn new(config: DasaConfig) -> Self {
        DasaStatus {
            config,
            context: None,
            status_socket: None,
            commands_socket: None,
            abcd_data_socket: None,
            abcd_status_socket: None,
            analyzer_status_socket: None,
            status_msg_id: 0,
            last_publication: Instant::now(),
            files: None,
            last_error: String::new(),
        }
    }

    pub fn context(&self) -> Option<&zmq::Context> {
        self.context.as_ref()
    }

    pub fn recording(&self) -> bool {
        self.files.as_ref().is_some_and(RecordingFiles::is_open)
    }

    pub fn files(&self) -> Option<&RecordingFiles> {
        self.files.as_ref()
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
        self.publish_message(topics::EVENTS_LMNO, &message);
    }

    fn publish_error(&mut self) {
        let text = std::mem::take(&mut self.last_error);
        let message = compose_error(MODULE, self.status_msg_id, &text);
        self.publish_message(topics::EVENTS_LMNO, &message);
    }

    fn close_files(&mut self) {
        if let Some(files) = self.files.take() {
            match files.close() {
                Ok(sizes) => {
                    let text = format!(
                        "Closed files; events: {} bytes, waveforms: {} bytes, raw: {} bytes",
                        sizes.events, sizes.waveforms, sizes.raw
                    );
                    self.publish_event(&text);
                }
                Err(err) => {
                    tracing::error!(%err, "unable to close the run files");
                    self.last_error = format!("file close: {err}");
                    self.publish_error();
                }
            }
        }
    }

    /// Drain one subscription, routing frames to the open files.
    fn drain_subscription(
        socket: &zmq::Socket,
        files: &mut Option<RecordingFiles>,
    ) -> Result<(), String> {
        loop {
            match receive_framed(socket, true) {
                Ok(Some(frame)) => {
                    if let Some(files) = files {
                        let topic = frame.topic.as_deref().unwrap_or_default();
                        files
                            .route_frame(topic, &frame.payload)
                            .map_err(|err| format!("file write: {err}"))?;
                    }
                }
                Ok(None) => return Ok(()),
                Err(err) => return Err(format!("data receive: {err}")),
            }
        }
    }
}

pub mod states {
    use super::*;

    pub const START: State<DasaStatus> = State {
        id: 100,
        description: "start",
        action: actions::start,
    };
    pub const CREATE_CONTEXT: State<DasaStatus> = State {
        id: 110,
        description: "create context",
        action: actions::create_context,
    };
    pub const CREATE_SOCKETS: State<DasaStatus> = State {
        id: 120,
        description: "create sockets",
        action: actions::create_sockets,
    };
    pub const PUBLISH_STATUS: State<DasaStatus> = State {
        id: 200,
        description: "publish status",
        action: actions::publish_status,
    };
    pub const RECEIVE_COMMANDS: State<DasaStatus> = State {
        id: 210,
        description: "receive commands",
        action: actions::receive_commands,
    };
    pub const READ_SOCKETS: State<DasaStatus> = State {
        id: 220,
        description: "read sockets",
        action: actions::read_sockets,
    };
    pub const FLUSH_FILES: State<DasaStatus> = State {
        id: 230,
        description: "flush files",
        action: actions::flush_files,
    };
    pub const CLOSE_FILES: State<DasaStatus> = State {
        id: 800,
        description: "close files",
        action: actions::close_files,
    };
    pub const CLOSE_SOCKETS: State<DasaStatus> = State {
        id: 810,
        description: "close sockets",
        action: actions::close_sockets,
    };
    pub const DESTROY_CONTEXT: State<DasaStatus> = State {
        id: 820,
        description: "destroy context",
        action: actions::destroy_context,
    };
    pub const STOP: State<DasaStatus> = State {
        id: 899,
        description: "stop",
        action: actions::stop,
    };
    pub const COMMUNICATION_ERROR: State<DasaStatus> = State {
        id: 900,
        description: "communication error",
        action: actions::communication_error,
    };
    pub const PARSE_ERROR: State<DasaStatus> = State {
        id: 910,
        description: "parse error",
        action: actions::parse_error,
    };
    pub const FILE_ERROR: State<DasaStatus> = State {
        id: 920,
        description: "file error",
        action: actions::file_error,
    };
}

mod actions {
    use super::*;

    pub fn start(_status: &mut DasaStatus) -> State<DasaStatus> {
        states::CREATE_CONTEXT
    }

    pub fn create_context(status: &mut DasaStatus) -> State<DasaStatus> {
        status.context = Some(zmq::Context::new());
        states::CREATE_SOCKETS
    }

    pub fn create_sockets(status: &mut DasaStatus) -> State<DasaStatus> {
        let Some(context) = status.context.clone() else {
            status.last_error = "no transport context".to_string();
            return states::COMMUNICATION_ERROR;
        };

        let sockets = (|| -> Result<_, abcd_transport::TransportError> {
            let status_socket = socket::publisher(&context, &status.config.status_address)?;
            let commands_socket = socket::puller(&context, &status.config.commands_address)?;
            // The data subscription covers both events and waveforms.
            let abcd_data_socket =
                socket::subscriber(&context, &status.config.abcd_data_address, &["data_abcd"])?;
            let abcd_status_socket =
                socket::subscriber(&context, &status.config.abcd_status_address, &[])?;
            let analyzer_status_socket =
                socket::subscriber(&context, &status.config.analyzer_status_address, &[])?;
            Ok((
                status_socket,
                commands_socket,
                abcd_data_socket,
                abcd_status_socket,
                analyzer_status_socket,
            ))
        })();

        match sockets {
            Ok((
                status_socket,
                commands_socket,
                abcd_data_socket,
                abcd_status_socket,
                analyzer_status_socket,
            )) => {
                status.status_socket = Some(status_socket);
                status.commands_socket = Some(commands_socket);
                status.abcd_data_socket = Some(abcd_data_socket);
                status.abcd_status_socket = Some(abcd_status_socket);
                status.analyzer_status_socket = Some(analyzer_status_socket);
                states::PUBLISH_STATUS
            }
            Err(err) => {
                status.last_error = format!("socket creation: {err}");
                states::COMMUNICATION_ERROR
            }
        }
    }

    pub fn publish_status(status: &mut DasaStatus) -> State<DasaStatus> {
        let mut message = compose_status(MODULE, status.status_msg_id);

        let names = status.files.as_ref().map(RecordingFiles::names).unwrap_or_default();
        message["run_active"] = json!(status.recording());
        message["events_file_opened"] = json!(names.iter().any(|name| name.contains("_events.")));
        message["waveforms_file_opened"] =
            json!(names.iter().any(|name| name.contains("_waveforms.")));
        message["raw_file_opened"] = json!(names.iter().any(|name| name.contains("_raw.")));
        if let Some(sizes) = status.files.as_ref().map(RecordingFiles::sizes) {
            message["events_file_size"] = json!(sizes.events);
            message["waveforms_file_size"] = json!(sizes.waveforms);
            message["raw_file_size"] = json!(sizes.raw);
        }

        status.publish_message(topics::STATUS_LMNO, &message);
        status.last_publication = Instant::now();

        if status.recording() {
            states::FLUSH_FILES
        } else {
            states::RECEIVE_COMMANDS
        }
    }

    pub fn receive_commands(status: &mut DasaStatus) -> State<DasaStatus> {
        if should_terminate() {
            return states::CLOSE_FILES;
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
            Some("start") if !status.recording() => {
                let arguments = arguments_of(&message).cloned().unwrap_or(Value::Null);
                let Some(file_name) = arguments.get("file_name").and_then(Value::as_str) else {
                    status.last_error = "start without a file_name".to_string();
                    return states::PARSE_ERROR;
                };
                let enable: RecordingEnable = arguments
                    .get("enable")
                    .cloned()
                    .map(serde_json::from_value)
                    .and_then(Result::ok)
                    .unwrap_or_default();

                if !enable.any() {
                    status.last_error = "start enables no file".to_string();
                    return states::PARSE_ERROR;
                }

                match RecordingFiles::open(file_name, enable) {
                    Ok(files) => {
                        let names = files.names().join(", ");
                        status.files = Some(files);
                        status.publish_event(&format!("Opened files: {names}"));
                        states::READ_SOCKETS
                    }
                    Err(err) => {
                        status.last_error = format!("file open: {err}");
                        states::FILE_ERROR
                    }
                }
            }
            Some("stop") => {
                status.close_files();
                states::READ_SOCKETS
            }
            Some("quit") => {
                status.publish_event("Quitting");
                states::CLOSE_FILES
            }
            _ => states::READ_SOCKETS,
        }
    }

    pub fn read_sockets(status: &mut DasaStatus) -> State<DasaStatus> {
        // The sockets move out so routing can borrow the files mutably.
        let data_socket = status.abcd_data_socket.take();
        let abcd_status_socket = status.abcd_status_socket.take();
        let analyzer_status_socket = status.analyzer_status_socket.take();

        let mut result = Ok(());
        for socket in [&data_socket, &abcd_status_socket, &analyzer_status_socket]
            .into_iter()
            .flatten()
        {
            result = DasaStatus::drain_subscription(socket, &mut status.files);
            if result.is_err() {
                break;
            }
        }

        status.abcd_data_socket = data_socket;
        status.abcd_status_socket = abcd_status_socket;
        status.analyzer_status_socket = analyzer_status_socket;

        if let Err(text) = result {
            status.last_error = text;
            return if status.last_error.starts_with("file") {
                states::FILE_ERROR
            } else {
                states::COMMUNICATION_ERROR
            };
        }

        if status.last_publication.elapsed() > status.publish_period() {
            states::PUBLISH_STATUS
        } else {
            states::RECEIVE_COMMANDS
        }
    }

    pub fn flush_files(status: &mut DasaStatus) -> State<DasaStatus> {
        if let Some(files) = &mut status.files {
            if let Err(err) = files.flush() {
                status.last_error = format!("file flush: {err}");
                return states::FILE_ERROR;
            }
        }
        states::RECEIVE_COMMANDS
    }

    pub fn close_files(status: &mut DasaStatus) -> State<DasaStatus> {
        status.close_files();
        states::CLOSE_SOCKETS
    }

    pub fn close_sockets(status: &mut DasaStatus) -> State<DasaStatus> {
        status.publish_event("Closing the sockets");
        status.status_socket = None;
        status.commands_socket = None;
        status.abcd_data_socket = None;
        status.abcd_status_socket = None;
        status.analyzer_status_socket = None;
        states::DESTROY_CONTEXT
    }

    pub fn destroy_context(status: &mut DasaStatus) -> State<DasaStatus> {
        status.context = None;
        states::STOP
    }

    pub fn stop(_status: &mut DasaStatus) -> State<DasaStatus> {
        states::STOP
    }

    pub fn communication_error(status: &mut DasaStatus) -> State<DasaStatus> {
        tracing::error!(error = %status.last_error, "communication error");
        status.publish_error();
        states::CLOSE_FILES
    }

    pub fn parse_error(status: &mut DasaStatus) -> State<DasaStatus> {
        tracing::warn!(error = %status.last_error, "parse error");
        status.publish_error();
        states::READ_SOCKETS
    }

    pub fn file_error(status: &mut DasaStatus) -> State<DasaStatus> {
        tracing::error!(error = %status.last_error, "file error");
        status.publish_error();
        // The recording cannot continue, the process can.
        status.close_files();
        states::RECEIVE_COMMANDS
    }
}

/// Drive the module until its terminal state.
pub fn run(config: DasaConfig, base_period: Duration) -> u32 {
    if let Err(err) = abcd_common::install_signal_handlers() {
        tracing::error!(%err, "unable to install the signal handlers");
    }
    let mut status = DasaStatus::new(config);
    abcd_common::run_machine(&mut status, states::START, states::STOP.id, base_period)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inproc_config(tag: &str) -> DasaConfig {
        DasaConfig {
            status_address: format!("inproc://{tag}-status"),
            commands_address: format!("inproc://{tag}-commands"),
            abcd_data_address: format!("inproc://{tag}-abcd-data"),
            abcd_status_address: format!("inproc://{tag}-abcd-status"),
            analyzer_status_address: format!("inproc://{tag}-analyzer"),
            publish_period_secs: 3600,
        }
    }

    fn step(status: &mut DasaStatus, state: State<DasaStatus>) -> State<DasaStatus> {
        (state.action)(status)
    }

    fn bring_up(status: &mut DasaStatus) {
        let mut state = states::START;
        while state != states::PUBLISH_STATUS {
            state = step(status, state);
        }
    }

    fn send_command(context: &zmq::Context, address: &str, command: Value) -> zmq::Socket {
        let commander = context.socket(zmq::PUSH).unwrap();
        commander.connect(address).unwrap();
        commander
            .send(serde_json::to_vec(&command).unwrap(), 0)
            .unwrap();
        commander
    }

    fn wait_for(
        status: &mut DasaStatus,
        state: State<DasaStatus>,
        expected: State<DasaStatus>,
    ) -> State<DasaStatus> {
        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            let next = step(status, state);
            if next == expected {
                return next;
            }
            assert!(Instant::now() < deadline, "never reached {expected:?}");
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn start_stop_cycle_routes_frames() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("run-zero").display().to_string();

        let mut status = DasaStatus::new(inproc_config("dasa-cycle"));
        bring_up(&mut status);
        let context = status.context().unwrap().clone();

        // Start a recording with every file enabled.
        let _commander = send_command(
            &context,
            &status.config.commands_address,
            json!({
                "msg_ID": 1,
                "command": "start",
                "arguments": {
                    "file_name": base,
                    "enable": {"events": true, "waveforms": true, "raw": true},
                },
            }),
        );
        let deadline = Instant::now() + Duration::from_secs(2);
        while !status.recording() {
            step(&mut status, states::RECEIVE_COMMANDS);
            assert!(Instant::now() < deadline, "recording never started");
            std::thread::sleep(Duration::from_millis(1));
        }

        // Feed one events frame and one waveforms frame.
        let feeder = context.socket(zmq::PUB).unwrap();
        feeder.bind(&status.config.abcd_data_address).unwrap();
        std::thread::sleep(Duration::from_millis(50));
        abcd_transport::send_framed(&feeder, "data_abcd_events_v0_s16", &[0xAB; 16]).unwrap();
        abcd_transport::send_framed(&feeder, "data_abcd_waveforms_v0_s40", &[0xCD; 40]).unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            step(&mut status, states::READ_SOCKETS);
            let sizes = status.files().unwrap().sizes();
            if sizes.events == 16 && sizes.waveforms == 40 {
                let raw_expected =
                    ("data_abcd_events_v0_s16 ".len() + 16) + ("data_abcd_waveforms_v0_s40 ".len() + 40);
                assert_eq!(sizes.raw, raw_expected as u64);
                break;
            }
            assert!(Instant::now() < deadline, "frames were not routed");
            std::thread::sleep(Duration::from_millis(1));
        }

        // Stop: the files close and land on disk with exact sizes.
        let _stopper = send_command(
            &context,
            &status.config.commands_address,
            json!({"msg_ID": 2, "command": "stop"}),
        );
        let deadline = Instant::now() + Duration::from_secs(2);
        while status.recording() {
            step(&mut status, states::RECEIVE_COMMANDS);
            assert!(Instant::now() < deadline, "recording never stopped");
            std::thread::sleep(Duration::from_millis(1));
        }

        assert_eq!(
            std::fs::read(format!("{base}_events.ade")).unwrap(),
            vec![0xAB; 16]
        );
        assert_eq!(
            std::fs::read(format!("{base}_waveforms.adw")).unwrap().len(),
            40
        );
    }

    #[test]
    fn start_without_enabled_files_is_a_parse_error() {
        let mut status = DasaStatus::new(inproc_config("dasa-badstart"));
        bring_up(&mut status);
        let context = status.context().unwrap().clone();

        let _commander = send_command(
            &context,
            &status.config.commands_address,
            json!({
                "msg_ID": 1,
                "command": "start",
                "arguments": {"file_name": "nowhere", "enable": {}},
            }),
        );
        wait_for(&mut status, states::RECEIVE_COMMANDS, states::PARSE_ERROR);
        assert!(!status.recording());
    }

    #[test]
    fn quit_closes_files_then_sockets() {
        let mut status = DasaStatus::new(inproc_config("dasa-quit"));
        bring_up(&mut status);
        let context = status.context().unwrap().clone();

        let _commander = send_command(
            &context,
            &status.config.commands_address,
            json!({"msg_ID": 1, "command": "quit"}),
        );
        wait_for(&mut status, states::RECEIVE_COMMANDS, states::CLOSE_FILES);

        let mut state = states::CLOSE_FILES;
        while state != states::STOP {
            state = step(&mut status, state);
        }
        assert!(status.context().is_none());
    }
}
