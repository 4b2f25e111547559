// SPDX-FileCopyrightText: 2025 Greenbone AG
//
// SPDX-License-Identifier: GPL-2.0-or-later WITH x11vnc-openssl-exception

//! End-to-end exchanges against a scripted in-memory stream.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex};

use omp::{
    Client, Config, Connection, Error, ReportContent, TargetSpec, TaskSpec, Value,
};

/// Plays one scripted response per read call and records everything
/// written, so each request/response exchange sees exactly one document.
struct ScriptedStream {
    responses: VecDeque<Vec<u8>>,
    written: Arc<Mutex<Vec<u8>>>,
}

impl ScriptedStream {
    fn new<const N: usize>(responses: [&str; N]) -> (Self, Arc<Mutex<Vec<u8>>>) {
        let written = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                responses: responses.iter().map(|r| r.as_bytes().to_vec()).collect(),
                written: written.clone(),
            },
            written,
        )
    }
}

impl Read for ScriptedStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.responses.pop_front() {
            Some(response) => {
                assert!(response.len() <= buf.len(), "scripted response too large");
                buf[..response.len()].copy_from_slice(&response);
                Ok(response.len())
            }
            None => Ok(0),
        }
    }
}

impl Write for ScriptedStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.written.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn client<const N: usize>(
    responses: [&str; N],
) -> (Client<ScriptedStream>, Arc<Mutex<Vec<u8>>>) {
    let (stream, written) = ScriptedStream::new(responses);
    let config = Config::new("manager.example", "admin", "secret");
    (
        Client::from_connection(config, Connection::new(stream)),
        written,
    )
}

#[test]
fn create_target_end_to_end() {
    let (mut cli, written) = client(
        [r#"<create_target_response status="201" status_text="OK, resource created" id="abc-123"/>"#],
    );
    let response = cli
        .create_target(&TargetSpec::new("t1", "127.0.0.1"))
        .unwrap();

    assert_eq!(
        String::from_utf8(written.lock().unwrap().clone()).unwrap(),
        "<create_target><name>t1</name><hosts>127.0.0.1</hosts><comment></comment></create_target>"
    );
    assert!(response.ok());
    assert_eq!(response.status_code(), 201);
    assert_eq!(response["@id"], Value::from("abc-123"));
}

#[test]
fn authenticate_sends_credentials() {
    let (mut cli, written) =
        client([r#"<authenticate_response status="200" status_text="OK"/>"#]);
    let response = cli.authenticate("admin", "secret").unwrap();
    assert!(response.ok());
    assert_eq!(
        String::from_utf8(written.lock().unwrap().clone()).unwrap(),
        "<authenticate><credentials><username>admin</username><password>secret</password></credentials></authenticate>"
    );
}

#[test]
fn rejected_credentials_become_authentication_error() {
    let (mut cli, _) = client(
        [r#"<authenticate_response status="400" status_text="Authentication failed"/>"#],
    );
    match cli.authenticate("admin", "wrong") {
        Err(Error::Authentication {
            username,
            status_text,
        }) => {
            assert_eq!(username, "admin");
            assert_eq!(status_text, "Authentication failed");
        }
        other => panic!("expected Authentication error, got {other:?}"),
    }
}

#[test]
fn server_errors_keep_their_own_class() {
    let (mut cli, _) = client(
        [r#"<authenticate_response status="500" status_text="Internal error"/>"#],
    );
    assert!(matches!(
        cli.authenticate("admin", "secret"),
        Err(Error::Server { .. })
    ));
}

#[test]
fn list_targets_collects_repeated_siblings() {
    let (mut cli, written) = client([concat!(
        r#"<get_targets_response status="200" status_text="OK">"#,
        r#"<target id="t-1"><name>a</name></target>"#,
        r#"<target id="t-2"><name>b</name></target>"#,
        r#"<target id="t-3"><name>c</name></target>"#,
        r#"</get_targets_response>"#
    )]);
    let targets = cli.list_targets(&[("name", "a")]).unwrap();
    assert_eq!(
        String::from_utf8(written.lock().unwrap().clone()).unwrap(),
        r#"<get_targets filter="name=&quot;a&quot;"></get_targets>"#
    );
    assert_eq!(targets.len(), 3);
    assert_eq!(targets[0]["@id"], Value::from("t-1"));
    assert_eq!(targets[2]["name"], Value::from("c"));
}

#[test]
fn get_target_returns_the_inner_element() {
    let (mut cli, written) = client([concat!(
        r#"<get_targets_response status="200" status_text="OK">"#,
        r#"<target id="t-1"><name>Localhost</name><hosts>127.0.0.1</hosts></target>"#,
        r#"</get_targets_response>"#
    )]);
    let target = cli.get_target("t-1").unwrap();
    assert_eq!(
        String::from_utf8(written.lock().unwrap().clone()).unwrap(),
        r#"<get_targets target_id="t-1"></get_targets>"#
    );
    // scalar collapse: nested <name> is a bare string
    assert_eq!(target["name"], Value::from("Localhost"));
    assert_eq!(target["@id"], Value::from("t-1"));
}

#[test]
fn missing_element_in_get_is_a_decode_error() {
    let (mut cli, _) =
        client([r#"<get_targets_response status="200" status_text="OK"/>"#]);
    assert!(matches!(cli.get_target("t-1"), Err(Error::Decode(_))));
}

#[test]
fn create_task_writes_id_references() {
    let (mut cli, written) = client(
        [r#"<create_task_response status="201" status_text="OK, resource created" id="task-9"/>"#],
    );
    let mut spec = TaskSpec::new("weekly", "cfg-1", "t-1");
    spec.scanner = Some("scn-1".to_string());
    let response = cli.create_task(&spec).unwrap();
    assert_eq!(response["@id"], Value::from("task-9"));
    assert_eq!(
        String::from_utf8(written.lock().unwrap().clone()).unwrap(),
        concat!(
            r#"<create_task><name>weekly</name><config id="cfg-1"></config>"#,
            r#"<target id="t-1"></target><scanner id="scn-1"></scanner></create_task>"#
        )
    );
}

#[test]
fn create_task_looks_up_the_default_scanner() {
    let (mut cli, _) = client([
        concat!(
            r#"<get_scanners_response status="200" status_text="OK">"#,
            r#"<scanner id="scn-default"><name>OpenVAS Default</name></scanner>"#,
            r#"</get_scanners_response>"#
        ),
        r#"<create_task_response status="201" status_text="OK, resource created" id="task-1"/>"#,
    ]);
    let response = cli.create_task(&TaskSpec::new("t", "cfg-1", "tgt-1")).unwrap();
    assert_eq!(response["@id"], Value::from("task-1"));
}

#[test]
fn missing_default_scanner_is_element_not_found() {
    let (mut cli, _) =
        client([r#"<get_scanners_response status="200" status_text="OK"/>"#]);
    assert!(matches!(
        cli.create_task(&TaskSpec::new("t", "cfg-1", "tgt-1")),
        Err(Error::ElementNotFound { .. })
    ));
}

#[test]
fn start_task_sets_the_id_attribute() {
    let (mut cli, written) =
        client([r#"<start_task_response status="202" status_text="OK, request submitted"/>"#]);
    cli.start_task("task-9").unwrap();
    assert_eq!(
        String::from_utf8(written.lock().unwrap().clone()).unwrap(),
        r#"<start_task task_id="task-9"></start_task>"#
    );
}

#[test]
fn get_config_renders_detail_flags_as_attributes() {
    let (mut cli, written) = client([concat!(
        r#"<get_configs_response status="200" status_text="OK">"#,
        r#"<config id="cfg-1"><name>Full and fast</name></config>"#,
        r#"</get_configs_response>"#
    )]);
    let mut opts = omp::GetConfigOpts::default();
    opts.families = true;
    opts.preferences = true;
    let config = cli.get_config("cfg-1", &opts).unwrap();
    assert_eq!(
        String::from_utf8(written.lock().unwrap().clone()).unwrap(),
        concat!(
            r#"<get_configs config_id="cfg-1" details="0" families="1" "#,
            r#"preferences="1" tasks="0"></get_configs>"#
        )
    );
    assert_eq!(config["name"], Value::from("Full and fast"));
}

#[test]
fn list_config_families_skips_unnamed_entries() {
    let (mut cli, written) = client([concat!(
        r#"<get_configs_response status="200" status_text="OK">"#,
        r#"<config id="cfg-1"><families>"#,
        r#"<family><name>Web Servers</name></family>"#,
        r#"<family><name></name></family>"#,
        r#"<family><name>Port scanners</name></family>"#,
        r#"</families></config>"#,
        r#"</get_configs_response>"#
    )]);
    let families = cli.list_config_families("cfg-1").unwrap();
    assert_eq!(
        String::from_utf8(written.lock().unwrap().clone()).unwrap(),
        concat!(
            r#"<get_configs config_id="cfg-1" details="0" families="1" "#,
            r#"preferences="0" tasks="0"></get_configs>"#
        )
    );
    assert_eq!(families, ["Web Servers", "Port scanners"]);
}

#[test]
fn list_config_nvts_picks_single_nvt_selectors() {
    let (mut cli, _) = client([concat!(
        r#"<get_configs_response status="200" status_text="OK">"#,
        r#"<config id="cfg-1"><nvt_selectors>"#,
        r#"<nvt_selector><type>2</type><family_or_nvt>1.3.1</family_or_nvt></nvt_selector>"#,
        r#"<nvt_selector><type>1</type><family_or_nvt>Web Servers</family_or_nvt></nvt_selector>"#,
        r#"<nvt_selector><type>2</type><family_or_nvt>1.3.2</family_or_nvt></nvt_selector>"#,
        r#"</nvt_selectors></config>"#,
        r#"</get_configs_response>"#
    )]);
    let oids = cli.list_config_nvts("cfg-1", false).unwrap();
    assert_eq!(oids, ["1.3.1", "1.3.2"]);
}

#[test]
fn get_nvt_family_resolves_the_oid() {
    let nvts = concat!(
        r#"<get_nvts_response status="200" status_text="OK">"#,
        r#"<nvt oid="1.3.1"><name>a</name><family>Web Servers</family></nvt>"#,
        r#"<nvt oid="1.3.2"><name>b</name><family>Port scanners</family></nvt>"#,
        r#"</get_nvts_response>"#
    );
    let (mut cli, written) = client([nvts, nvts]);
    assert_eq!(cli.get_nvt_family("1.3.2").unwrap(), "Port scanners");
    assert_eq!(
        String::from_utf8(written.lock().unwrap().clone()).unwrap(),
        r#"<get_nvts details="1"></get_nvts>"#
    );
    assert!(matches!(
        cli.get_nvt_family("9.9.9"),
        Err(Error::ElementNotFound { .. })
    ));
}

#[test]
fn config_remove_nvt_reselects_the_family_without_it() {
    let (mut cli, written) = client([
        // family lookup
        concat!(
            r#"<get_nvts_response status="200" status_text="OK">"#,
            r#"<nvt oid="1.1"><name>a</name><family>Web Servers</family></nvt>"#,
            r#"<nvt oid="1.2"><name>b</name><family>Web Servers</family></nvt>"#,
            r#"</get_nvts_response>"#
        ),
        // the config's own NVT selection
        concat!(
            r#"<get_configs_response status="200" status_text="OK">"#,
            r#"<config id="cfg-1"><nvt_selectors>"#,
            r#"<nvt_selector><type>2</type><family_or_nvt>1.1</family_or_nvt></nvt_selector>"#,
            r#"<nvt_selector><type>2</type><family_or_nvt>1.2</family_or_nvt></nvt_selector>"#,
            r#"</nvt_selectors></config>"#,
            r#"</get_configs_response>"#
        ),
        r#"<modify_config_response status="200" status_text="OK"/>"#,
        r#"<modify_config_response status="200" status_text="OK"/>"#,
    ]);
    cli.config_remove_nvt("cfg-1", "1.1").unwrap();
    let sent = String::from_utf8(written.lock().unwrap().clone()).unwrap();
    assert!(sent.contains(concat!(
        r#"<modify_config config_id="cfg-1"><family_selection>"#,
        r#"<growing>1</growing>"#,
        r#"<family><name>Web Servers</name><all>0</all><growing>0</growing></family>"#,
        r#"</family_selection></modify_config>"#
    )));
    assert!(sent.contains(concat!(
        r#"<modify_config config_id="cfg-1"><nvt_selection>"#,
        r#"<family>Web Servers</family><nvt oid="1.2"></nvt>"#,
        r#"</nvt_selection></modify_config>"#
    )));
}

#[test]
fn copy_config_with_blacklist_drops_the_listed_oids() {
    let nvts = concat!(
        r#"<get_nvts_response status="200" status_text="OK">"#,
        r#"<nvt oid="1.1"><name>a</name><family>Web Servers</family></nvt>"#,
        r#"<nvt oid="1.2"><name>b</name><family>Web Servers</family></nvt>"#,
        r#"</get_nvts_response>"#
    );
    let (mut cli, written) = client([
        // resolve the original's id
        concat!(
            r#"<get_configs_response status="200" status_text="OK">"#,
            r#"<config id="orig-1"><name>orig</name></config>"#,
            r#"</get_configs_response>"#
        ),
        // the original's NVT selection
        concat!(
            r#"<get_configs_response status="200" status_text="OK">"#,
            r#"<config id="orig-1"><nvt_selectors>"#,
            r#"<nvt_selector><type>2</type><family_or_nvt>1.1</family_or_nvt></nvt_selector>"#,
            r#"<nvt_selector><type>2</type><family_or_nvt>1.2</family_or_nvt></nvt_selector>"#,
            r#"</nvt_selectors></config>"#,
            r#"</get_configs_response>"#
        ),
        // family expansion finds nothing extra
        nvts,
        concat!(
            r#"<get_configs_response status="200" status_text="OK">"#,
            r#"<config id="orig-1"><families/></config>"#,
            r#"</get_configs_response>"#
        ),
        // oid to family mapping
        nvts,
        // copy the config named "empty"
        concat!(
            r#"<get_configs_response status="200" status_text="OK">"#,
            r#"<config id="empty-1"><name>empty</name></config>"#,
            r#"</get_configs_response>"#
        ),
        r#"<create_config_response status="201" status_text="OK, resource created" id="copy-1"/>"#,
        // resolve the copy's id
        concat!(
            r#"<get_configs_response status="200" status_text="OK">"#,
            r#"<config id="copy-1"><name>thin</name></config>"#,
            r#"</get_configs_response>"#
        ),
        r#"<modify_config_response status="200" status_text="OK"/>"#,
    ]);
    let copy_id = cli
        .copy_config_with_blacklist_by_name("orig", "thin", &["1.2"])
        .unwrap();
    assert_eq!(copy_id, "copy-1");
    let sent = String::from_utf8(written.lock().unwrap().clone()).unwrap();
    assert!(sent.contains(
        r#"<create_config><name>thin</name><copy>empty-1</copy></create_config>"#
    ));
    assert!(sent.contains(concat!(
        r#"<modify_config config_id="copy-1"><nvt_selection>"#,
        r#"<family>Web Servers</family><nvt oid="1.1"></nvt>"#,
        r#"</nvt_selection></modify_config>"#
    )));
    assert!(!sent.contains(r#"oid="1.2""#));
}

#[test]
fn element_exists_is_subclassified() {
    let (mut cli, _) = client(
        [r#"<create_target_response status="400" status_text="Target exists already"/>"#],
    );
    assert!(matches!(
        cli.create_target(&TargetSpec::new("t1", "127.0.0.1")),
        Err(Error::ElementExists { .. })
    ));
}

#[test]
fn download_report_decodes_base64_content() {
    let (mut cli, _) = client([concat!(
        r#"<get_reports_response status="200" status_text="OK">"#,
        r#"<report content_type="application/pdf">aGVsbG8gd29ybGQ=</report>"#,
        r#"</get_reports_response>"#
    )]);
    match cli.download_report("r-1", Some("fmt-pdf"), false, &[]).unwrap() {
        ReportContent::Bytes(bytes) => assert_eq!(bytes, b"hello world"),
        other => panic!("expected bytes, got {other:?}"),
    }
}

#[test]
fn download_report_keeps_xml_reports_as_elements() {
    let (mut cli, _) = client([concat!(
        r#"<get_reports_response status="200" status_text="OK">"#,
        r#"<report content_type="text/xml"><results/></report>"#,
        r#"</get_reports_response>"#
    )]);
    match cli.download_report("r-1", None, false, &[]).unwrap() {
        ReportContent::Xml(report) => {
            assert!(report.find("results").is_some());
        }
        other => panic!("expected xml, got {other:?}"),
    }
}

#[test]
fn commands_after_close_fail_with_session_closed() {
    let (mut cli, _) = client([r#"<get_tasks_response status="200" status_text="OK"/>"#]);
    cli.close();
    assert!(matches!(
        cli.list_tasks(&[]),
        Err(Error::SessionClosed)
    ));
}

#[test]
fn malformed_status_surfaces_as_result_error() {
    let (mut cli, _) =
        client([r#"<get_tasks_response status_text="no status here"/>"#]);
    assert!(matches!(cli.list_tasks(&[]), Err(Error::Result { .. })));
}

#[test]
fn list_nvt_families_uses_the_quirky_plural() {
    let (mut cli, written) = client([concat!(
        r#"<get_nvt_families_response status="200" status_text="OK">"#,
        r#"<families><family><name>Port scanners</name><max_nvt_count>9</max_nvt_count></family>"#,
        r#"<family><name>Web Servers</name><max_nvt_count>42</max_nvt_count></family></families>"#,
        r#"</get_nvt_families_response>"#
    )]);
    let families = cli.list_nvt_families().unwrap();
    assert_eq!(
        String::from_utf8(written.lock().unwrap().clone()).unwrap(),
        "<get_nvt_families></get_nvt_families>"
    );
    assert_eq!(families.len(), 2);
    assert_eq!(families[0]["name"], Value::from("Port scanners"));
}

#[test]
fn modify_schedule_carries_the_id_and_fields() {
    let (mut cli, written) =
        client([r#"<modify_schedule_response status="200" status_text="OK"/>"#]);
    cli.modify_schedule(
        "sch-1",
        Value::map([("timezone", Value::from("UTC"))]),
    )
    .unwrap();
    assert_eq!(
        String::from_utf8(written.lock().unwrap().clone()).unwrap(),
        r#"<modify_schedule schedule_id="sch-1"><timezone>UTC</timezone></modify_schedule>"#
    );
}

#[test]
fn raw_requests_take_their_command_from_the_response() {
    let (mut cli, _) =
        client([r#"<get_version_response status="200" status_text="OK"><version>7.0</version></get_version_response>"#]);
    let response = cli.request_raw(b"<get_version/>").unwrap();
    assert_eq!(response.command(), "get_version");
    assert_eq!(response["version"], Value::from("7.0"));
}
