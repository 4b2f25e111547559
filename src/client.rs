// SPDX-FileCopyrightText: 2025 Greenbone AG
//
// SPDX-License-Identifier: GPL-2.0-or-later WITH x11vnc-openssl-exception

//! The public client surface: authentication plus one method per
//! protocol command family. Every method is thin glue over the generic
//! get/list/create/modify/delete helpers at the bottom of this module.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::TcpStream;

use base64::{engine::general_purpose, Engine as _};
use rustls::{ClientConnection, StreamOwned};

use crate::codec::{decode_body, BoolFormat, Codec, Value};
use crate::connection::{Connection, TlsMode};
use crate::error::Error;
use crate::response::Response;
use crate::xml::Element;

/// Default OMP port of the manager daemon. Deployments that override it
/// (for instance through `OPENVASMD_PORT`) resolve that before building
/// a [`Config`].
pub const DEFAULT_PORT: u16 = 9390;

/// Scanner name used when a task does not name one.
pub const DEFAULT_SCANNER_NAME: &str = "OpenVAS Default";

/// Connection parameters for one manager.
#[derive(Debug, Clone)]
pub struct Config {
    /// Manager hostname or address.
    pub host: String,
    /// Manager port.
    pub port: u16,
    /// Username for the authenticate exchange.
    pub username: String,
    /// Password for the authenticate exchange.
    pub password: String,
}

impl Config {
    /// Creates a config for `host` on the default port.
    pub fn new(
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            username: username.into(),
            password: password.into(),
        }
    }

    /// Overrides the port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }
}

/// Fields of a `create_target` command.
#[derive(Debug, Clone)]
pub struct TargetSpec {
    /// Target name, unique on the manager.
    pub name: String,
    /// Comma-separated hosts.
    pub hosts: String,
    /// Optional comment; the wire always carries the element, empty if
    /// unset.
    pub comment: Option<String>,
    /// Port list reference by id.
    pub port_list: Option<String>,
    /// SSH credential reference by id.
    pub ssh_credential: Option<String>,
    /// Alive test method name.
    pub alive_tests: Option<String>,
}

impl TargetSpec {
    /// A target with just a name and hosts.
    pub fn new(name: impl Into<String>, hosts: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            hosts: hosts.into(),
            comment: None,
            port_list: None,
            ssh_credential: None,
            alive_tests: None,
        }
    }

    fn to_value(&self) -> Value {
        let mut entries = vec![
            ("name".to_string(), Value::from(self.name.as_str())),
            ("hosts".to_string(), Value::from(self.hosts.as_str())),
            (
                "comment".to_string(),
                Value::from(self.comment.as_deref().unwrap_or_default()),
            ),
        ];
        if let Some(id) = &self.port_list {
            entries.push(("port_list".to_string(), Value::attrs([("id", id.as_str())])));
        }
        if let Some(tests) = &self.alive_tests {
            entries.push(("alive_tests".to_string(), Value::from(tests.as_str())));
        }
        if let Some(id) = &self.ssh_credential {
            entries.push((
                "ssh_credential".to_string(),
                Value::attrs([("id", id.as_str())]),
            ));
        }
        Value::Map(entries)
    }
}

/// Fields of a `create_task` command.
#[derive(Debug, Clone)]
pub struct TaskSpec {
    /// Task name.
    pub name: String,
    /// Scan config id.
    pub config: String,
    /// Target id.
    pub target: String,
    /// Scanner id; when unset the scanner named
    /// [`DEFAULT_SCANNER_NAME`] is looked up on the manager.
    pub scanner: Option<String>,
    /// Schedule id.
    pub schedule: Option<String>,
    /// Optional comment.
    pub comment: Option<String>,
}

impl TaskSpec {
    /// A task from the three mandatory references.
    pub fn new(
        name: impl Into<String>,
        config: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            config: config.into(),
            target: target.into(),
            scanner: None,
            schedule: None,
            comment: None,
        }
    }
}

/// Fields of a `create_schedule` command. `duration` and `period` are
/// written as their numeric value with a nested `<unit>` child, the
/// shape the manager expects.
#[derive(Debug, Clone, Default)]
pub struct ScheduleSpec {
    /// Schedule name.
    pub name: String,
    /// Optional comment.
    pub comment: Option<String>,
    /// Id of a schedule to copy.
    pub copy: Option<String>,
    /// First run time, preformatted.
    pub first_time: Option<String>,
    /// Run duration as (value, unit).
    pub duration: Option<(i64, String)>,
    /// Repeat period as (value, unit).
    pub period: Option<(i64, String)>,
    /// Timezone name.
    pub timezone: Option<String>,
}

impl ScheduleSpec {
    /// A schedule with just a name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    fn to_value(&self) -> Value {
        let mut entries = vec![("name".to_string(), Value::from(self.name.as_str()))];
        if let Some(copy) = &self.copy {
            entries.push(("copy".to_string(), Value::from(copy.as_str())));
        }
        if let Some(first_time) = &self.first_time {
            entries.push(("first_time".to_string(), Value::from(first_time.as_str())));
        }
        if let Some((value, unit)) = &self.duration {
            entries.push(("duration".to_string(), timed_value(*value, unit)));
        }
        if let Some((value, unit)) = &self.period {
            entries.push(("period".to_string(), timed_value(*value, unit)));
        }
        if let Some(comment) = &self.comment {
            entries.push(("comment".to_string(), Value::from(comment.as_str())));
        }
        if let Some(timezone) = &self.timezone {
            entries.push(("timezone".to_string(), Value::from(timezone.as_str())));
        }
        Value::Map(entries)
    }
}

fn timed_value(value: i64, unit: &str) -> Value {
    Value::map([
        ("#text", Value::Int(value)),
        ("unit", Value::from(unit)),
    ])
}

/// Detail switches of a `get_configs` request for a single config.
#[derive(Debug, Clone, Copy, Default)]
pub struct GetConfigOpts {
    /// Include families, preferences, NVT selectors and tasks.
    pub details: bool,
    /// Include families when `details` is off.
    pub families: bool,
    /// Include preferences when `details` is off.
    pub preferences: bool,
    /// Include tasks using the config when `details` is off.
    pub tasks: bool,
}

/// One NVT as listed by `get_nvts` with details.
#[derive(Debug, Clone)]
pub struct NvtEntry {
    /// The NVT's oid.
    pub oid: String,
    /// Human-readable NVT name.
    pub name: String,
    /// Name of the family the NVT belongs to.
    pub family: String,
}

/// Contents of a downloaded report.
#[derive(Debug, Clone)]
pub enum ReportContent {
    /// The report element itself, for XML report formats.
    Xml(Element),
    /// Decoded bytes of a base64-transported binary format.
    Bytes(Vec<u8>),
}

/// An OMP client over a TLS socket.
pub type TlsClient = Client<StreamOwned<ClientConnection, TcpStream>>;

/// OpenVAS OMP client.
///
/// Owns exactly one session at a time; commands are strictly
/// request-then-full-response on one socket, so a client must not be
/// shared between concurrent logical calls.
#[derive(Debug)]
pub struct Client<S: Read + Write> {
    config: Config,
    codec: Codec,
    connection: Option<Connection<S>>,
}

impl TlsClient {
    /// Opens the socket, performs the TLS handshake and authenticates
    /// with the configured credentials.
    pub fn connect(config: Config, tls: &TlsMode) -> Result<Self, Error> {
        let connection = Connection::connect(&config.host, config.port, tls)?;
        let mut client = Client::from_connection(config, connection);
        let username = client.config.username.clone();
        let password = client.config.password.clone();
        client.authenticate(&username, &password)?;
        Ok(client)
    }

    /// The scoped session form: connect, run `f`, close regardless of
    /// the outcome.
    pub fn with_session<T>(
        config: Config,
        tls: &TlsMode,
        f: impl FnOnce(&mut Self) -> Result<T, Error>,
    ) -> Result<T, Error> {
        let mut client = Self::connect(config, tls)?;
        let result = f(&mut client);
        client.close();
        result
    }
}

impl<S: Read + Write> Client<S> {
    /// Builds a client over an already-established connection without
    /// authenticating.
    pub fn from_connection(config: Config, connection: Connection<S>) -> Self {
        Self {
            config,
            codec: Codec::default(),
            connection: Some(connection),
        }
    }

    /// Selects the wire rendering of boolean scalars; managers disagree
    /// across protocol versions.
    pub fn set_bool_format(&mut self, format: BoolFormat) {
        self.codec = Codec::new(format);
    }

    /// Sends `authenticate` with the given credentials.
    ///
    /// A client-class failure on this specific exchange becomes
    /// [`Error::Authentication`] so callers can prompt for new
    /// credentials instead of treating it like any other 4xx.
    pub fn authenticate(&mut self, username: &str, password: &str) -> Result<Response, Error> {
        let body = Value::map([(
            "credentials",
            Value::map([
                ("username", Value::from(username)),
                ("password", Value::from(password)),
            ]),
        )]);
        let request = self.codec.encode("authenticate", &body)?;
        match self.request(request) {
            Err(err) if err.is_client_error() => {
                let status_text = match &err {
                    Error::ElementExists { status_text, .. }
                    | Error::ElementNotFound { status_text, .. }
                    | Error::InvalidArgument { status_text, .. }
                    | Error::Client { status_text, .. } => status_text.clone(),
                    _ => String::new(),
                };
                Err(Error::Authentication {
                    username: username.to_string(),
                    status_text,
                })
            }
            other => other,
        }
    }

    /// Closes the session. Further commands fail with
    /// [`Error::SessionClosed`].
    pub fn close(&mut self) {
        if let Some(connection) = self.connection.take() {
            connection.close();
        }
    }

    /// Sends a prebuilt request element and returns the validated
    /// response. The escape hatch for commands this client has no
    /// method for.
    pub fn request(&mut self, request: Element) -> Result<Response, Error> {
        let connection = self.connection.as_mut().ok_or(Error::SessionClosed)?;
        tracing::debug!(command = request.name(), "sending command");
        let xml = connection.send_request(&request)?;
        let response = Response::new(request, xml)?;
        response.check_status()?;
        Ok(response)
    }

    /// Sends pre-encoded request bytes. The response's command name is
    /// taken from the response element itself.
    pub fn request_raw(&mut self, payload: &[u8]) -> Result<Response, Error> {
        let connection = self.connection.as_mut().ok_or(Error::SessionClosed)?;
        tracing::debug!(bytes = payload.len(), "sending raw command");
        let xml = connection.send_raw(payload)?;
        let command = xml.name().strip_suffix("_response").unwrap_or(xml.name());
        let response = Response::new(Element::new(command.to_string()), xml)?;
        response.check_status()?;
        Ok(response)
    }

    // targets

    /// Lists targets, optionally filtered.
    pub fn list_targets(&mut self, filters: &[(&str, &str)]) -> Result<Vec<Value>, Error> {
        self.list_elements("target", filters)
    }

    /// Returns a single target by id.
    pub fn get_target(&mut self, uuid: &str) -> Result<Value, Error> {
        self.get_element("target", uuid)
    }

    /// Creates a target; the response carries the new `@id`.
    pub fn create_target(&mut self, spec: &TargetSpec) -> Result<Response, Error> {
        self.create_element("create_target", &spec.to_value())
    }

    /// Updates target fields.
    pub fn modify_target(&mut self, uuid: &str, fields: Value) -> Result<Response, Error> {
        self.modify_element("target", uuid, &fields)
    }

    /// Deletes a target.
    pub fn delete_target(&mut self, uuid: &str) -> Result<Response, Error> {
        self.delete_element("target", uuid)
    }

    // port lists

    /// Lists port lists, optionally filtered.
    pub fn list_port_lists(&mut self, filters: &[(&str, &str)]) -> Result<Vec<Value>, Error> {
        self.list_elements("port_list", filters)
    }

    /// Returns a single port list by id.
    pub fn get_port_list(&mut self, uuid: &str) -> Result<Value, Error> {
        self.get_element("port_list", uuid)
    }

    /// Creates a port list from a range expression such as `T:1-1024`.
    pub fn create_port_list(
        &mut self,
        name: &str,
        port_range: &str,
        comment: Option<&str>,
    ) -> Result<Response, Error> {
        let body = Value::map([
            ("name", Value::from(name)),
            ("port_range", Value::from(port_range)),
            ("comment", Value::from(comment.unwrap_or_default())),
        ]);
        self.create_element("create_port_list", &body)
    }

    /// Deletes a port list.
    pub fn delete_port_list(&mut self, uuid: &str) -> Result<Response, Error> {
        self.delete_element("port_list", uuid)
    }

    // scan configs

    /// Lists scan configs, optionally filtered.
    pub fn list_configs(&mut self, filters: &[(&str, &str)]) -> Result<Vec<Value>, Error> {
        self.list_elements("config", filters)
    }

    /// Returns a single scan config by id, with the requested detail
    /// switches.
    pub fn get_config(&mut self, uuid: &str, opts: &GetConfigOpts) -> Result<Value, Error> {
        let flag = |on: bool| if on { "1" } else { "0" };
        let mut request = Element::new("get_configs");
        request.set_attr("config_id", uuid);
        request.set_attr("details", flag(opts.details));
        request.set_attr("families", flag(opts.families));
        request.set_attr("preferences", flag(opts.preferences));
        request.set_attr("tasks", flag(opts.tasks));
        let response = self.request(request)?;
        extract_child(&response, "config")
    }

    /// Resolves a config name to its id.
    pub fn find_config_id(&mut self, name: &str) -> Result<String, Error> {
        self.find_id("config", name)
    }

    /// Returns a single scan config by name.
    pub fn get_config_by_name(&mut self, name: &str, opts: &GetConfigOpts) -> Result<Value, Error> {
        let uuid = self.find_config_id(name)?;
        self.get_config(&uuid, opts)
    }

    /// Lists the names of the NVT families a config selects.
    pub fn list_config_families(&mut self, uuid: &str) -> Result<Vec<String>, Error> {
        let opts = GetConfigOpts {
            families: true,
            ..Default::default()
        };
        let config = self.get_config(uuid, &opts)?;
        let mut names = Vec::new();
        if let Some(families) = config.get("families").and_then(|f| f.get("family")) {
            for family in list_view(families) {
                if let Some(name) = family.get("name").and_then(Value::as_str) {
                    if !name.is_empty() {
                        names.push(name.to_string());
                    }
                }
            }
        }
        Ok(names)
    }

    /// Lists the oids of the NVTs a config selects individually
    /// (selector type 2). With `families` the NVTs of every selected
    /// family are included as well.
    pub fn list_config_nvts(&mut self, uuid: &str, families: bool) -> Result<Vec<String>, Error> {
        let opts = GetConfigOpts {
            details: true,
            ..Default::default()
        };
        let config = self.get_config(uuid, &opts)?;
        let mut oids = Vec::new();
        if let Some(selectors) = config
            .get("nvt_selectors")
            .and_then(|s| s.get("nvt_selector"))
        {
            for selector in list_view(selectors) {
                if selector.get("type").and_then(Value::as_str) != Some("2") {
                    continue;
                }
                if let Some(oid) = selector.get("family_or_nvt").and_then(Value::as_str) {
                    oids.push(oid.to_string());
                }
            }
        }
        if families {
            let by_family = self.map_nvts()?;
            for family in self.list_config_families(uuid)? {
                if let Some(entries) = by_family.get(&family) {
                    oids.extend(entries.iter().map(|nvt| nvt.oid.clone()));
                }
            }
        }
        Ok(oids)
    }

    /// Creates a config, optionally copying an existing one.
    pub fn create_config(&mut self, name: &str, copy: Option<&str>) -> Result<Response, Error> {
        let mut entries = vec![("name".to_string(), Value::from(name))];
        if let Some(copy) = copy {
            entries.push(("copy".to_string(), Value::from(copy)));
        }
        self.create_element("create_config", &Value::Map(entries))
    }

    /// Creates a config by copying an existing one referred to by name.
    pub fn copy_config_by_name(&mut self, original: &str, copy: &str) -> Result<Response, Error> {
        let uuid = self.find_config_id(original)?;
        self.create_config(copy, Some(&uuid))
    }

    /// Copies the config named `original` into a new config named `copy`
    /// carrying all of the original's NVTs except the blacklisted oids.
    ///
    /// The copy starts from the config named `empty` and is filled with
    /// one `nvt_selection` per surviving family. Returns the new
    /// config's id.
    pub fn copy_config_with_blacklist_by_name(
        &mut self,
        original: &str,
        copy: &str,
        blacklist: &[&str],
    ) -> Result<String, Error> {
        let original_id = self.find_config_id(original)?;
        let nvts = self.list_config_nvts(&original_id, true)?;
        let families = self.map_nvts_to_families()?;
        let mut grouped: Vec<(String, Vec<String>)> = Vec::new();
        for oid in nvts {
            if blacklist.contains(&oid.as_str()) {
                continue;
            }
            let family = match families.get(&oid) {
                Some(family) => family.clone(),
                None => continue,
            };
            match grouped.iter_mut().find(|(f, _)| *f == family) {
                Some((_, oids)) => {
                    if !oids.contains(&oid) {
                        oids.push(oid);
                    }
                }
                None => grouped.push((family, vec![oid])),
            }
        }
        self.copy_config_by_name("empty", copy)?;
        let copy_id = self.find_config_id(copy)?;
        for (family, oids) in grouped {
            self.modify_config(&copy_id, nvt_selection(&family, &oids))?;
        }
        Ok(copy_id)
    }

    /// Updates config fields, for instance an `nvt_selection` or
    /// `family_selection` batch.
    pub fn modify_config(&mut self, uuid: &str, fields: Value) -> Result<Response, Error> {
        self.modify_element("config", uuid, &fields)
    }

    /// Removes a single NVT from a config.
    ///
    /// The NVT's family is detached from the growing selection first,
    /// then re-selected with every NVT of that family the config held
    /// except the removed one.
    pub fn config_remove_nvt(&mut self, uuid: &str, oid: &str) -> Result<Response, Error> {
        let families = self.map_nvts_to_families()?;
        let family = families
            .get(oid)
            .cloned()
            .ok_or_else(|| Error::ElementNotFound {
                command: "get_nvts".to_string(),
                status: 404,
                status_text: format!("failed to find family of NVT {oid:?}"),
            })?;
        let keep: Vec<String> = self
            .list_config_nvts(uuid, false)?
            .into_iter()
            .filter(|n| families.get(n.as_str()) == Some(&family) && n != oid)
            .collect();
        let detach = Value::map([(
            "family_selection",
            Value::map([
                ("growing", Value::from("1")),
                (
                    "family",
                    Value::map([
                        ("name", Value::from(family.as_str())),
                        ("all", Value::from("0")),
                        ("growing", Value::from("0")),
                    ]),
                ),
            ]),
        )]);
        self.modify_config(uuid, detach)?;
        self.modify_config(uuid, nvt_selection(&family, &keep))
    }

    /// Deletes a config.
    pub fn delete_config(&mut self, uuid: &str) -> Result<Response, Error> {
        self.delete_element("config", uuid)
    }

    /// Deletes a config referred to by name.
    pub fn delete_config_by_name(&mut self, name: &str) -> Result<Response, Error> {
        let uuid = self.find_config_id(name)?;
        self.delete_config(&uuid)
    }

    // scanners

    /// Lists scanners, optionally filtered.
    pub fn list_scanners(&mut self, filters: &[(&str, &str)]) -> Result<Vec<Value>, Error> {
        self.list_elements("scanner", filters)
    }

    /// Returns a single scanner by id.
    pub fn get_scanner(&mut self, uuid: &str) -> Result<Value, Error> {
        self.get_element("scanner", uuid)
    }

    // report formats

    /// Lists report formats, optionally filtered.
    pub fn list_report_formats(&mut self, filters: &[(&str, &str)]) -> Result<Vec<Value>, Error> {
        self.list_elements("report_format", filters)
    }

    /// Returns a single report format by id.
    pub fn get_report_format(&mut self, uuid: &str) -> Result<Value, Error> {
        self.get_element("report_format", uuid)
    }

    // credentials

    /// Creates a username/password credential.
    pub fn create_credential(
        &mut self,
        name: &str,
        login: &str,
        password: &str,
    ) -> Result<Response, Error> {
        let body = Value::map([
            ("name", Value::from(name)),
            ("login", Value::from(login)),
            ("password", Value::from(password)),
        ]);
        self.create_element("create_credential", &body)
    }

    // tasks

    /// Lists tasks, optionally filtered.
    pub fn list_tasks(&mut self, filters: &[(&str, &str)]) -> Result<Vec<Value>, Error> {
        self.list_elements("task", filters)
    }

    /// Returns a single task by id.
    pub fn get_task(&mut self, uuid: &str) -> Result<Value, Error> {
        self.get_element("task", uuid)
    }

    /// Resolves a task name to its id.
    pub fn find_task_id(&mut self, name: &str) -> Result<String, Error> {
        self.find_id("task", name)
    }

    /// Creates a task. When no scanner is given, the manager's scanner
    /// named [`DEFAULT_SCANNER_NAME`] is looked up and used.
    pub fn create_task(&mut self, spec: &TaskSpec) -> Result<Response, Error> {
        let scanner = match &spec.scanner {
            Some(id) => id.clone(),
            None => self.find_id("scanner", DEFAULT_SCANNER_NAME)?,
        };
        let mut entries = vec![
            ("name".to_string(), Value::from(spec.name.as_str())),
            (
                "config".to_string(),
                Value::attrs([("id", spec.config.as_str())]),
            ),
            (
                "target".to_string(),
                Value::attrs([("id", spec.target.as_str())]),
            ),
            ("scanner".to_string(), Value::attrs([("id", scanner)])),
        ];
        if let Some(id) = &spec.schedule {
            entries.push(("schedule".to_string(), Value::attrs([("id", id.as_str())])));
        }
        if let Some(comment) = &spec.comment {
            entries.push(("comment".to_string(), Value::from(comment.as_str())));
        }
        self.create_element("create_task", &Value::Map(entries))
    }

    /// Starts a task.
    pub fn start_task(&mut self, uuid: &str) -> Result<Response, Error> {
        self.task_action("start_task", uuid)
    }

    /// Stops a running task.
    pub fn stop_task(&mut self, uuid: &str) -> Result<Response, Error> {
        self.task_action("stop_task", uuid)
    }

    /// Resumes a stopped task.
    pub fn resume_task(&mut self, uuid: &str) -> Result<Response, Error> {
        self.task_action("resume_task", uuid)
    }

    /// Deletes a task.
    pub fn delete_task(&mut self, uuid: &str) -> Result<Response, Error> {
        self.delete_element("task", uuid)
    }

    // reports

    /// Lists reports, optionally filtered.
    pub fn list_reports(&mut self, filters: &[(&str, &str)]) -> Result<Vec<Value>, Error> {
        self.list_elements("report", filters)
    }

    /// Returns a single report by id.
    pub fn get_report(&mut self, uuid: &str) -> Result<Value, Error> {
        self.get_element("report", uuid)
    }

    /// Deletes a report.
    pub fn delete_report(&mut self, uuid: &str) -> Result<Response, Error> {
        self.delete_element("report", uuid)
    }

    /// Downloads report contents in the given format.
    ///
    /// XML formats (or `as_xml`) return the report element itself;
    /// everything else is transported base64-encoded in the element's
    /// text and returned decoded.
    pub fn download_report(
        &mut self,
        uuid: &str,
        format_id: Option<&str>,
        as_xml: bool,
        filters: &[(&str, &str)],
    ) -> Result<ReportContent, Error> {
        let mut request = Element::new("get_reports");
        request.set_attr("report_id", uuid);
        if let Some(format_id) = format_id {
            request.set_attr("format_id", format_id);
        }
        apply_filters(&mut request, filters);
        let response = self.request(request)?;
        let report = response
            .xml()
            .find("report")
            .ok_or_else(|| Error::Decode("response has no <report> element".to_string()))?;
        if as_xml || report.attr("content_type") == Some("text/xml") {
            return Ok(ReportContent::Xml(report.clone()));
        }
        let text = report
            .text()
            .ok_or_else(|| Error::Decode("report element carries no content".to_string()))?;
        let bytes = general_purpose::STANDARD
            .decode(text.trim())
            .map_err(|e| Error::Decode(format!("report content is not valid base64: {e}")))?;
        Ok(ReportContent::Bytes(bytes))
    }

    // schedules

    /// Lists schedules, optionally filtered.
    pub fn list_schedules(&mut self, filters: &[(&str, &str)]) -> Result<Vec<Value>, Error> {
        self.list_elements("schedule", filters)
    }

    /// Returns a single schedule by id.
    pub fn get_schedule(&mut self, uuid: &str) -> Result<Value, Error> {
        self.get_element("schedule", uuid)
    }

    /// Creates a task schedule.
    pub fn create_schedule(&mut self, spec: &ScheduleSpec) -> Result<Response, Error> {
        self.create_element("create_schedule", &spec.to_value())
    }

    /// Updates schedule fields.
    pub fn modify_schedule(&mut self, uuid: &str, fields: Value) -> Result<Response, Error> {
        self.modify_element("schedule", uuid, &fields)
    }

    /// Deletes a schedule.
    pub fn delete_schedule(&mut self, uuid: &str) -> Result<Response, Error> {
        self.delete_element("schedule", uuid)
    }

    // NVTs and results

    /// Lists NVTs, with or without details. Returned as a whole response
    /// because NVT listings are large and callers usually stream over
    /// `response.xml()`.
    pub fn list_nvts(&mut self, details: bool) -> Result<Response, Error> {
        let mut request = Element::new("get_nvts");
        if details {
            request.set_attr("details", "1");
        }
        self.request(request)
    }

    /// Returns a single NVT by oid.
    pub fn get_nvt(&mut self, oid: &str) -> Result<Value, Error> {
        self.get_element("nvt", oid)
    }

    /// Maps every NVT family to the NVTs it contains. One `get_nvts`
    /// round trip with details.
    pub fn map_nvts(&mut self) -> Result<HashMap<String, Vec<NvtEntry>>, Error> {
        let mut by_family: HashMap<String, Vec<NvtEntry>> = HashMap::new();
        for entry in self.nvt_entries()? {
            by_family.entry(entry.family.clone()).or_default().push(entry);
        }
        Ok(by_family)
    }

    /// Maps every NVT oid to the name of its family.
    pub fn map_nvts_to_families(&mut self) -> Result<HashMap<String, String>, Error> {
        Ok(self
            .nvt_entries()?
            .into_iter()
            .map(|entry| (entry.oid, entry.family))
            .collect())
    }

    /// The name of the family an NVT belongs to.
    pub fn get_nvt_family(&mut self, oid: &str) -> Result<String, Error> {
        self.map_nvts_to_families()?
            .remove(oid)
            .ok_or_else(|| Error::ElementNotFound {
                command: "get_nvts".to_string(),
                status: 404,
                status_text: format!("failed to find family of NVT {oid:?}"),
            })
    }

    fn nvt_entries(&mut self) -> Result<Vec<NvtEntry>, Error> {
        let response = self.list_nvts(true)?;
        let mut entries = Vec::new();
        for nvt in response.xml().find_all("nvt") {
            entries.push(NvtEntry {
                oid: nvt.attr("oid").unwrap_or_default().to_string(),
                name: nvt
                    .find("name")
                    .and_then(|n| n.text())
                    .unwrap_or_default()
                    .to_string(),
                family: nvt
                    .find("family")
                    .and_then(|f| f.text())
                    .unwrap_or_default()
                    .to_string(),
            });
        }
        Ok(entries)
    }

    /// Lists the NVT family names.
    pub fn list_nvt_families(&mut self) -> Result<Vec<Value>, Error> {
        let response = self.request(Element::new("get_nvt_families"))?;
        let families = response
            .xml()
            .find("families")
            .ok_or_else(|| Error::Decode("response has no <families> element".to_string()))?;
        Ok(families.find_all("family").map(decode_body).collect())
    }

    /// Lists scan results, optionally filtered.
    pub fn list_results(&mut self, filters: &[(&str, &str)]) -> Result<Vec<Value>, Error> {
        self.list_elements("result", filters)
    }

    /// Returns a single scan result by id.
    pub fn get_result(&mut self, uuid: &str) -> Result<Value, Error> {
        self.get_element("result", uuid)
    }

    // generic command helpers

    fn get_element(&mut self, kind: &str, uuid: &str) -> Result<Value, Error> {
        let mut request = Element::new(format!("get_{}", plural(kind)));
        request.set_attr(format!("{kind}_id"), uuid);
        let response = self.request(request)?;
        extract_child(&response, kind)
    }

    fn list_elements(
        &mut self,
        kind: &str,
        filters: &[(&str, &str)],
    ) -> Result<Vec<Value>, Error> {
        let mut request = Element::new(format!("get_{}", plural(kind)));
        apply_filters(&mut request, filters);
        let response = self.request(request)?;
        Ok(response.xml().find_all(kind).map(decode_body).collect())
    }

    fn create_element(&mut self, tag: &str, body: &Value) -> Result<Response, Error> {
        let request = self.codec.encode(tag, body)?;
        self.request(request)
    }

    fn modify_element(&mut self, kind: &str, uuid: &str, fields: &Value) -> Result<Response, Error> {
        let mut request = self.codec.encode(&format!("modify_{kind}"), fields)?;
        request.set_attr(format!("{kind}_id"), uuid);
        self.request(request)
    }

    fn delete_element(&mut self, kind: &str, uuid: &str) -> Result<Response, Error> {
        let mut request = Element::new(format!("delete_{kind}"));
        request.set_attr(format!("{kind}_id"), uuid);
        self.request(request)
    }

    fn task_action(&mut self, action: &str, uuid: &str) -> Result<Response, Error> {
        let mut request = Element::new(action);
        request.set_attr("task_id", uuid);
        self.request(request)
    }

    fn find_id(&mut self, kind: &str, name: &str) -> Result<String, Error> {
        let items = self.list_elements(kind, &[("name", name)])?;
        items
            .first()
            .and_then(|item| item.get("@id"))
            .and_then(|id| id.as_str())
            .map(str::to_string)
            .ok_or_else(|| Error::ElementNotFound {
                command: format!("get_{}", plural(kind)),
                status: 404,
                status_text: format!("failed to find {kind} named {name:?}"),
            })
    }
}

/// Plural command stem; the protocol pluralizes `nvt_family` as
/// `nvt_families`.
fn plural(kind: &str) -> String {
    match kind {
        "nvt_family" => "nvt_families".to_string(),
        other => format!("{other}s"),
    }
}

fn apply_filters(request: &mut Element, filters: &[(&str, &str)]) {
    if filters.is_empty() {
        return;
    }
    let filter = filters
        .iter()
        .map(|(k, v)| format!("{k}=\"{v}\""))
        .collect::<Vec<_>>()
        .join(" ");
    request.set_attr("filter", filter);
}

/// Views a decoded value as a sequence; a single element decodes to a
/// bare value instead of a one-item list.
fn list_view(value: &Value) -> Vec<&Value> {
    match value {
        Value::List(items) => items.iter().collect(),
        other => vec![other],
    }
}

/// An `nvt_selection` batch: the family name plus one `<nvt>` reference
/// per oid.
fn nvt_selection(family: &str, oids: &[String]) -> Value {
    let mut entries = vec![("family".to_string(), Value::from(family))];
    for oid in oids {
        entries.push(("nvt".to_string(), Value::attrs([("oid", oid.as_str())])));
    }
    Value::map([("nvt_selection", Value::Map(entries))])
}

fn extract_child(response: &Response, kind: &str) -> Result<Value, Error> {
    response
        .xml()
        .find(kind)
        .map(decode_body)
        .ok_or_else(|| Error::Decode(format!("response has no <{kind}> element")))
}
