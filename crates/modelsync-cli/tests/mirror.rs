use std::fs;
use std::panic;
use std::path::Path;

use assert_cmd::cargo::cargo_bin_cmd;
use httptest::{matchers::*, responders::*, Expectation, Server};
use serde_json::{json, Value};

const WEIGHTS: &[u8] = b"lora weights used by the cli tests";

fn start_server() -> Option<Server> {
    match panic::catch_unwind(Server::run) {
        Ok(server) => Some(server),
        Err(_) => {
            eprintln!("skipping cli mirror test (httptest server unavailable)");
            None
        }
    }
}

#[allow(clippy::cast_precision_loss)]
fn lora_document(server: &Server, kind: &str) -> Value {
    json!({
        "id": 88,
        "name": "Paper Cut Style",
        "type": kind,
        "modelVersions": [{
            "id": 880,
            "name": "v1.0",
            "files": [{
                "name": "paperCut.safetensors",
                "sizeKB": WEIGHTS.len() as f64 / 1024.0,
                "downloadUrl": server.url_str("/files/paperCut"),
                "hashes": {"BLAKE3": blake3_hex(WEIGHTS)},
                "pickleScanResult": "Success",
                "virusScanResult": "Success"
            }],
            "images": [{"url": server.url_str("/images/1.jpeg"), "hash": "LEHV6nWB2y", "meta": null}]
        }]
    })
}

fn blake3_hex(body: &[u8]) -> String {
    blake3::hash(body).to_hex().to_string()
}

fn modelsync(root: &Path, server: &Server) -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("modelsync");
    cmd.env("MODELSYNC_PROGRESS", "0")
        .env("MODELSYNC_KEEP_PROXIES", "0")
        .env("NO_COLOR", "1")
        .env_remove("MODELSYNC_ROOT")
        .args(["--root"])
        .arg(root)
        .args(["--api-base", &server.url_str("/")]);
    cmd
}

#[test]
fn invalid_url_exits_with_user_error() {
    let temp = tempfile::tempdir().expect("tempdir");
    cargo_bin_cmd!("modelsync")
        .env("NO_COLOR", "1")
        .args(["--root"])
        .arg(temp.path())
        .args(["--json", "https://example.com/models/88/paper-cut"])
        .assert()
        .code(1);
    assert_eq!(fs::read_dir(temp.path()).expect("read root").count(), 0);
}

#[test]
fn mirrors_a_lora_and_reports_json() {
    let Some(server) = start_server() else {
        return;
    };
    let document = lora_document(&server, "LORA");
    server.expect(
        Expectation::matching(request::method_path("GET", "/api/v1/models/88"))
            .times(2)
            .respond_with(json_encoded(document)),
    );
    server.expect(
        Expectation::matching(request::method_path("GET", "/files/paperCut"))
            .times(1)
            .respond_with(status_code(200).body(WEIGHTS)),
    );
    server.expect(
        Expectation::matching(request::method_path("GET", "/images/1.jpeg"))
            .times(1)
            .respond_with(status_code(200).body("jpeg")),
    );

    let temp = tempfile::tempdir().expect("tempdir");
    let url = "https://civitai.com/models/88/paper-cut-style";
    let assert = modelsync(temp.path(), &server)
        .args(["--json", url])
        .assert()
        .success();
    let payload: Value =
        serde_json::from_slice(&assert.get_output().stdout).expect("json envelope");
    assert_eq!(payload["status"], "ok");
    assert_eq!(payload["details"]["summary"]["files_fetched"], 1);
    assert_eq!(payload["details"]["summary"]["samples_fetched"], 1);

    let model_dir = temp
        .path()
        .join("models")
        .join("LoRA")
        .join("88_Paper_Cut_Style");
    let version = model_dir.join("v1.0");
    assert_eq!(
        fs::read(version.join("paperCut.safetensors")).expect("weights"),
        WEIGHTS
    );
    assert!(version.join("samples").join("1.jpg").is_file());
    assert_eq!(
        fs::read_to_string(version.join("samples").join("1.meta")).expect("meta"),
        "null"
    );

    // Second run: size matches, the existing file is verified and not refetched.
    let assert = modelsync(temp.path(), &server)
        .args(["--json", url])
        .assert()
        .success();
    let payload: Value =
        serde_json::from_slice(&assert.get_output().stdout).expect("json envelope");
    assert_eq!(payload["details"]["summary"]["files_fetched"], 0);
    assert_eq!(payload["details"]["summary"]["files_up_to_date"], 1);
    assert_eq!(payload["details"]["summary"]["samples_fetched"], 0);
    assert!(model_dir.join("civitai_model.json").is_file());
}

#[test]
fn dry_run_writes_nothing() {
    let Some(server) = start_server() else {
        return;
    };
    server.expect(
        Expectation::matching(request::method_path("GET", "/api/v1/models/88"))
            .respond_with(json_encoded(lora_document(&server, "LORA"))),
    );

    let temp = tempfile::tempdir().expect("tempdir");
    let assert = modelsync(temp.path(), &server)
        .args(["--dry-run", "https://civitai.com/models/88/paper-cut-style"])
        .assert()
        .success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).expect("utf8");
    assert!(stdout.contains("dry run"), "{stdout}");
    assert!(stdout.contains("would fetch"), "{stdout}");
    assert_eq!(fs::read_dir(temp.path()).expect("read root").count(), 0);
}

#[test]
fn unsupported_model_type_exits_with_user_error() {
    let Some(server) = start_server() else {
        return;
    };
    server.expect(
        Expectation::matching(request::method_path("GET", "/api/v1/models/88"))
            .respond_with(json_encoded(lora_document(&server, "Poses"))),
    );

    let temp = tempfile::tempdir().expect("tempdir");
    let assert = modelsync(temp.path(), &server)
        .args(["--json", "https://civitai.com/models/88/paper-cut-style"])
        .assert()
        .code(1);
    let payload: Value =
        serde_json::from_slice(&assert.get_output().stdout).expect("json envelope");
    assert_eq!(payload["status"], "user-error");
    assert_eq!(payload["details"]["kind"], "unsupported-model-type");
    assert_eq!(fs::read_dir(temp.path()).expect("read root").count(), 0);
}

#[test]
fn catalog_error_exits_with_failure() {
    let Some(server) = start_server() else {
        return;
    };
    server.expect(
        Expectation::matching(request::method_path("GET", "/api/v1/models/88"))
            .respond_with(status_code(500)),
    );

    let temp = tempfile::tempdir().expect("tempdir");
    modelsync(temp.path(), &server)
        .arg("https://civitai.com/models/88/paper-cut-style")
        .assert()
        .code(2);
}
