//! Pull against a local HTTP stub speaking just enough of the registry API.

#![allow(clippy::expect_used, clippy::unwrap_used, missing_docs)]

use std::collections::HashMap;
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;

use husk_common::config::RegistryConfig;
use husk_common::error::{HuskError, RegistryStep};
use husk_image::digest::sha256_digest;
use husk_image::reference::ImageReference;
use husk_image::registry::{HttpRegistry, RegistryApi, pull_layers};

const TOKEN: &str = "stub-token";

type Routes = HashMap<String, (u16, Vec<u8>)>;

struct Stub {
    base: String,
    requests: Arc<Mutex<Vec<(String, Option<String>)>>>,
}

/// Serves `routes` (path without query -> (status, body)) until the test ends.
fn serve(routes: Routes) -> Stub {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let base = format!("http://{}", listener.local_addr().expect("addr"));
    let requests = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&requests);

    let _ = thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(stream) = stream else { break };
            handle(stream, &routes, &seen);
        }
    });
    Stub { base, requests }
}

fn handle(mut stream: TcpStream, routes: &Routes, seen: &Mutex<Vec<(String, Option<String>)>>) {
    let mut reader = BufReader::new(stream.try_clone().expect("clone"));
    let mut request_line = String::new();
    if reader.read_line(&mut request_line).is_err() {
        return;
    }
    let target = request_line.split_whitespace().nth(1).unwrap_or("/").to_string();

    let mut authorization = None;
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).is_err() || line == "\r\n" || line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            if name.eq_ignore_ascii_case("authorization") {
                authorization = Some(value.trim().to_string());
            }
        }
    }
    seen.lock().expect("lock").push((target.clone(), authorization));

    let path = target.split('?').next().unwrap_or_default();
    let (status, body) = routes.get(path).cloned().unwrap_or((404, b"{}".to_vec()));
    let head = format!(
        "HTTP/1.1 {status} STUB\r\n\
         Content-Length: {}\r\n\
         Content-Type: application/json\r\n\
         Connection: close\r\n\r\n",
        body.len()
    );
    let _ = stream.write_all(head.as_bytes());
    let _ = stream.write_all(&body);
}

fn layer(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (name, data) in files {
        let mut header = tar::Header::new_gnu();
        header.set_mode(0o644);
        header.set_size(data.len() as u64);
        builder.append_data(&mut header, name, *data).expect("append");
    }
    let tar = builder.into_inner().expect("tar");
    let mut gz = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    gz.write_all(&tar).expect("gzip");
    gz.finish().expect("gzip finish")
}

fn manifest_for(layers: &[&[u8]]) -> Vec<u8> {
    let entries: Vec<serde_json::Value> = layers
        .iter()
        .map(|l| {
            serde_json::json!({
                "mediaType": "application/vnd.docker.image.rootfs.diff.tar.gzip",
                "digest": sha256_digest(l),
                "size": l.len(),
            })
        })
        .collect();
    serde_json::json!({
        "schemaVersion": 2,
        "mediaType": "application/vnd.docker.distribution.manifest.v2+json",
        "layers": entries,
    })
    .to_string()
    .into_bytes()
}

fn registry_for(stub: &Stub) -> HttpRegistry {
    HttpRegistry::new(RegistryConfig {
        registry_url: stub.base.clone(),
        auth_url: format!("{}/token", stub.base),
        auth_service: "stub.registry".into(),
        request_timeout_secs: Some(10),
    })
    .expect("client")
}

fn token_route() -> (u16, Vec<u8>) {
    (200, format!(r#"{{"token":"{TOKEN}"}}"#).into_bytes())
}

fn image_routes(lower: &[u8], upper: &[u8]) -> Routes {
    let mut routes = HashMap::new();
    let _ = routes.insert("/token".to_string(), token_route());
    let _ = routes.insert(
        "/v2/library/stubimage/manifests/latest".to_string(),
        (200, manifest_for(&[lower, upper])),
    );
    for blob in [lower, upper] {
        let path = format!("/v2/library/stubimage/blobs/{}", sha256_digest(blob));
        let _ = routes.insert(path, (200, blob.to_vec()));
    }
    routes
}

#[test]
fn pull_over_http_stacks_layers_and_sends_bearer_token() {
    let lower = layer(&[("etc/motd", &b"lower"[..]), ("bin/hello", &b"#!/bin/sh\n"[..])]);
    let upper = layer(&[("etc/motd", &b"upper"[..])]);
    let stub = serve(image_routes(&lower, &upper));
    let dest = tempfile::tempdir().expect("tempdir");
    let reference = ImageReference::parse("stubimage").expect("reference");

    let summary = pull_layers(&registry_for(&stub), &reference, dest.path()).expect("pull");
    assert_eq!(summary.layers, 2);
    assert_eq!(std::fs::read(dest.path().join("etc/motd")).expect("motd"), b"upper");
    assert!(dest.path().join("bin/hello").is_file());

    let requests = stub.requests.lock().expect("lock");
    let (token_target, token_auth) = &requests[0];
    assert!(token_target.starts_with("/token?"));
    assert!(token_target.contains("service=stub.registry"));
    assert!(token_target.contains("scope=repository%3Alibrary%2Fstubimage%3Apull"));
    assert!(token_auth.is_none());
    for (target, auth) in &requests[1..] {
        assert_eq!(auth.as_deref(), Some(format!("Bearer {TOKEN}").as_str()), "{target}");
    }
}

#[test]
fn access_token_field_is_accepted() {
    let mut routes = HashMap::new();
    let _ = routes.insert("/token".to_string(), (200, br#"{"access_token":"alt"}"#.to_vec()));
    let stub = serve(routes);
    let reference = ImageReference::parse("stubimage").expect("reference");

    let token = registry_for(&stub).authenticate(&reference).expect("token");
    assert_eq!(token.as_str(), "alt");
}

#[test]
fn token_endpoint_rejection_is_auth_error() {
    let mut routes = HashMap::new();
    let _ = routes.insert("/token".to_string(), (401, br#"{"errors":[]}"#.to_vec()));
    let stub = serve(routes);
    let reference = ImageReference::parse("stubimage").expect("reference");

    let err = registry_for(&stub).authenticate(&reference).unwrap_err();
    assert!(
        matches!(err, HuskError::Auth { ref repository, .. } if repository == "library/stubimage")
    );
}

#[test]
fn unknown_image_is_manifest_error() {
    let mut routes = HashMap::new();
    let _ = routes.insert("/token".to_string(), token_route());
    let stub = serve(routes);
    let dest = tempfile::tempdir().expect("tempdir");
    let reference = ImageReference::parse("nonexistentimage:1").expect("reference");

    let err = pull_layers(&registry_for(&stub), &reference, dest.path()).unwrap_err();
    assert!(matches!(err, HuskError::Manifest { .. }), "{err}");
}

#[test]
fn corrupted_blob_is_digest_mismatch() {
    let lower = layer(&[("etc/motd", &b"lower"[..])]);
    let upper = layer(&[("etc/motd", &b"upper"[..])]);
    let mut routes = image_routes(&lower, &upper);
    let key = format!("/v2/library/stubimage/blobs/{}", sha256_digest(&upper));
    let _ = routes.insert(key, (200, layer(&[("etc/motd", &b"tampered"[..])])));
    let stub = serve(routes);
    let dest = tempfile::tempdir().expect("tempdir");
    let reference = ImageReference::parse("stubimage").expect("reference");

    let err = pull_layers(&registry_for(&stub), &reference, dest.path()).unwrap_err();
    assert!(matches!(err, HuskError::DigestMismatch { .. }), "{err}");
}

#[test]
fn missing_blob_is_fetch_layer_network_error() {
    let lower = layer(&[("etc/motd", &b"lower"[..])]);
    let upper = layer(&[("etc/motd", &b"upper"[..])]);
    let mut routes = image_routes(&lower, &upper);
    let _ = routes.remove(&format!("/v2/library/stubimage/blobs/{}", sha256_digest(&lower)));
    let stub = serve(routes);
    let dest = tempfile::tempdir().expect("tempdir");
    let reference = ImageReference::parse("stubimage").expect("reference");

    let err = pull_layers(&registry_for(&stub), &reference, dest.path()).unwrap_err();
    assert!(matches!(err, HuskError::Network { step: RegistryStep::FetchLayer, .. }), "{err}");
    assert!(!dest.path().join("etc/motd").exists());
}
