//! Tests for launching provider plugins as child processes

#![cfg(unix)]
#![allow(clippy::disallowed_methods)] // Allow unwrap() in tests for clarity

use async_trait::async_trait;
use lumiplug::{
    Context, FieldKind, HostConfig, Id, LumiplugError, Package, PluginHost, PropertyMap,
    ProviderError, ResourceOps, ResourceProvider, ResourceSchema, SchemaRegistry, Type,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

const NOTE: &str = "demo:index/note:Note";

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct Note {
    name: String,
}

struct NoteOps;

#[async_trait]
impl ResourceOps for NoteOps {
    type Resource = Note;

    async fn create(&self, _ctx: Context, note: Note) -> Result<Id, ProviderError> {
        Ok(Id::new(format!("note-{}", note.name)))
    }

    async fn get(&self, _ctx: Context, id: Id) -> Result<Note, ProviderError> {
        Ok(Note {
            name: id.as_str().trim_start_matches("note-").to_string(),
        })
    }

    async fn update(
        &self,
        _ctx: Context,
        _id: Id,
        _old: Note,
        _new: Note,
        _diff: lumiplug::ObjectDiff,
    ) -> Result<(), ProviderError> {
        Ok(())
    }

    async fn delete(&self, _ctx: Context, _id: Id) -> Result<(), ProviderError> {
        Ok(())
    }
}

fn schema() -> ResourceSchema {
    ResourceSchema::builder(Type::new(NOTE).unwrap())
        .required_replace("name", FieldKind::String)
        .build()
}

fn write_plugin(dir: &Path, name: &str, body: &str) {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
}

/// Serves the note provider in-process; the plugin script only announces it
async fn serve_notes() -> (String, oneshot::Sender<()>) {
    let provider = ResourceProvider::new(Package::new("demo").unwrap())
        .register(schema(), NoteOps)
        .unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (stop, stopped) = oneshot::channel::<()>();
    tokio::spawn(lumiplug::serve_on(listener, provider, async move {
        let _ = stopped.await;
    }));
    (lumiplug::server::handshake_line(addr), stop)
}

fn host_for(dir: &TempDir) -> PluginHost {
    let config = HostConfig::default()
        .with_search_path(vec![dir.path().to_path_buf()])
        .with_install_root(dir.path())
        .with_handshake_timeout(Duration::from_secs(5));
    let mut schemas = SchemaRegistry::new();
    schemas.register(schema()).unwrap();
    PluginHost::new(config).with_schemas(Arc::new(schemas))
}

#[tokio::test]
async fn host_launches_plugin_once_and_closes_it() {
    let dir = tempfile::tempdir().unwrap();
    let (handshake, _stop) = serve_notes().await;
    write_plugin(
        dir.path(),
        "lumi-resource-demo",
        &format!("echo 'plugin starting' >&2\necho '{}'\nexec sleep 30", handshake),
    );

    let host = host_for(&dir);
    let ty = Type::new(NOTE).unwrap();
    let client = host.provider_for(&ty).await.unwrap();
    let again = host.provider(&Package::new("demo").unwrap()).await.unwrap();
    assert!(Arc::ptr_eq(&client, &again));
    assert!(client.plugin().is_some());

    let ctx = Context::new().with_timeout(Duration::from_secs(10));
    let (id, _) = client
        .create(&ctx, &ty, &PropertyMap::new().with("name", "todo"))
        .await
        .unwrap();
    assert_eq!(id.as_str(), "note-todo");

    let mut props = PropertyMap::new();
    client.get(&ctx, &id, &ty, &mut props).await.unwrap();
    assert_eq!(props.get("name").and_then(|v| v.as_str()), Some("todo"));

    assert_eq!(host.packages().await, vec![Package::new("demo").unwrap()]);
    host.close().await.unwrap();
    assert!(host.packages().await.is_empty());

    // Closing twice is harmless.
    client.close().await.unwrap();
}

#[tokio::test]
async fn plugin_exiting_before_handshake_fails_to_start() {
    let dir = tempfile::tempdir().unwrap();
    write_plugin(dir.path(), "lumi-resource-demo", "echo 'boom' >&2\nexit 3");

    let host = host_for(&dir);
    let err = host
        .provider(&Package::new("demo").unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, LumiplugError::PluginStart { .. }), "{}", err);
    assert!(host.packages().await.is_empty());
}

#[tokio::test]
async fn plugin_that_already_exited_closes_cleanly() {
    let dir = tempfile::tempdir().unwrap();
    let (handshake, _stop) = serve_notes().await;
    write_plugin(dir.path(), "lumi-resource-demo", &format!("echo '{}'", handshake));

    let host = host_for(&dir);
    let client = host.provider(&Package::new("demo").unwrap()).await.unwrap();
    assert!(client.plugin().is_some());
    tokio::time::sleep(Duration::from_millis(200)).await;

    client.close().await.unwrap();
    client.close().await.unwrap();
    host.close().await.unwrap();
    assert!(host.packages().await.is_empty());
}

#[tokio::test]
async fn slow_launch_does_not_block_other_packages() {
    let dir = tempfile::tempdir().unwrap();
    // Never prints a handshake; the launch waits on it until the script ends.
    write_plugin(dir.path(), "lumi-resource-slow", "exec sleep 3");

    let host = Arc::new(host_for(&dir));
    let slow = tokio::spawn({
        let host = Arc::clone(&host);
        async move { host.provider(&Package::new("slow").unwrap()).await }
    });
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!slow.is_finished());

    let started = tokio::time::Instant::now();
    let err = host
        .provider(&Package::new("absent").unwrap())
        .await
        .unwrap_err();
    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(matches!(err, LumiplugError::PluginNotFound { .. }), "{}", err);

    slow.abort();
}

#[tokio::test]
async fn missing_plugin_is_reported_with_search_locations() {
    let dir = tempfile::tempdir().unwrap();
    let host = host_for(&dir);

    let err = host
        .provider(&Package::new("absent").unwrap())
        .await
        .unwrap_err();
    match err {
        LumiplugError::PluginNotFound { package, searched } => {
            assert_eq!(package.as_str(), "absent");
            assert!(searched.iter().all(|p| p.ends_with("lumi-resource-absent")));
        }
        other => panic!("unexpected error: {}", other),
    }
}
