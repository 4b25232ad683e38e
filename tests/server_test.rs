mod common;

use std::time::Duration;

use axum::body::Bytes;
use reqwest::multipart::{Form, Part};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use dagrelay::content::{END, START};
use dagrelay::controller::{Action, Controller};
use dagrelay::server::{process_return_background, serve, submit_task_background};

use common::{BLOB, Fixture, Hop, LOCAL, diamond_dag, linear_dag, park_unmergeable_branch, shortcut_dag};

#[tokio::test]
async fn submitted_blob_is_saved_and_kept_while_executing() {
    let fixture = Fixture::new(LOCAL);
    let task = fixture.root_task(linear_dag(LOCAL)).fork_task("A");
    std::fs::remove_file(fixture.dir.path().join(BLOB)).unwrap();
    let state = fixture.app_state(true);

    let action = submit_task_background(&state, task, Some(Bytes::from_static(b"frame"))).await;

    assert_eq!(action, Some(Action::Execute));
    assert!(fixture.blob_exists());
}

#[tokio::test]
async fn transmitted_blob_is_removed() {
    let fixture = Fixture::new(LOCAL);
    let task = fixture.root_task(linear_dag(LOCAL)).fork_task(END);
    let state = fixture.app_state(true);

    let action = submit_task_background(&state, task, None).await;

    assert_eq!(action, Some(Action::Transmit));
    assert!(!fixture.blob_exists());
}

#[tokio::test]
async fn blob_survives_when_deletion_is_disabled() {
    let fixture = Fixture::new(LOCAL);
    let task = fixture.root_task(linear_dag(LOCAL)).fork_task(END);
    let state = fixture.app_state(false);

    submit_task_background(&state, task, None).await;

    assert!(fixture.blob_exists());
}

#[tokio::test]
async fn waiting_branch_keeps_the_blob_until_the_join_fires() {
    let fixture = Fixture::new(LOCAL);
    let mut dag = diamond_dag(LOCAL);
    dag.service_mut("D").unwrap().set_execute_device("cloud");
    let a = fixture.root_task(dag).fork_task("A");
    let state = fixture.app_state(true);

    let actions = process_return_background(&state, a.fork_task("B")).await;
    assert_eq!(actions, Some(vec![Action::Wait]));
    assert!(fixture.blob_exists());

    let actions = process_return_background(&state, a.fork_task("C")).await;
    assert_eq!(actions, Some(vec![Action::Transmit]));
    assert!(!fixture.blob_exists());
}

#[tokio::test]
async fn returned_task_records_its_execute_time() {
    let fixture = Fixture::new(LOCAL);
    let mut task = fixture.root_task(linear_dag(LOCAL)).fork_task("A");
    Controller::record_execute_ts(&mut task, false);
    let state = fixture.app_state(true);

    process_return_background(&state, task).await;

    match &fixture.transport.hops()[0] {
        Hop::Local { service, task } => {
            assert_eq!(service, "B");
            assert!(!task.tmp_data().keys().any(|k| k.ends_with(":execute_time_A")));
        }
        other => panic!("expected B to run locally, got {other:?}"),
    }
}

#[tokio::test]
async fn http_endpoints_accept_multipart_tasks() {
    let fixture = Fixture::new(LOCAL);
    let task = fixture.root_task(linear_dag(LOCAL)).fork_task("A");
    std::fs::remove_file(fixture.dir.path().join(BLOB)).unwrap();
    let state = fixture.app_state(true);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (stop, stopped) = oneshot::channel::<()>();
    let server = tokio::spawn(serve(listener, state, async move {
        let _ = stopped.await;
    }));

    let client = reqwest::Client::new();
    let form = Form::new()
        .text("data", task.serialize().unwrap())
        .part("file", Part::bytes(b"frame".to_vec()).file_name(BLOB));
    let response = client
        .post(format!("http://{addr}/submit_task"))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());

    let mut waited = Duration::ZERO;
    while fixture.transport.hops().is_empty() && waited < Duration::from_secs(5) {
        tokio::time::sleep(Duration::from_millis(20)).await;
        waited += Duration::from_millis(20);
    }
    assert_eq!(fixture.transport.hops().len(), 1);
    assert!(fixture.blob_exists());

    let malformed = Form::new().text("data", "{not json");
    let response = client
        .post(format!("http://{addr}/process_return"))
        .multipart(malformed)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);

    let missing = Form::new().text("other", "x");
    let response = client
        .post(format!("http://{addr}/submit_task"))
        .multipart(missing)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);

    stop.send(()).unwrap();
    server.await.unwrap().unwrap();
}

#[tokio::test]
async fn blob_survives_a_failed_merge_while_another_branch_executes() {
    let fixture = Fixture::new(LOCAL);
    let state = fixture.app_state(true);
    let root = fixture.root_task(shortcut_dag(LOCAL));
    let parked = park_unmergeable_branch(&root);
    fixture.controller.coordinator().store_task_data(&parked, "D").await.unwrap();

    let actions = process_return_background(&state, root.fork_task("A")).await;

    assert_eq!(actions, Some(vec![Action::Execute, Action::Dropped]));
    assert!(fixture.blob_exists());
}

#[tokio::test]
async fn injected_root_is_routed_without_closing_a_ticket() {
    let fixture = Fixture::new(LOCAL);
    let root = fixture.root_task(linear_dag(LOCAL));
    let state = fixture.app_state(true);

    let action = submit_task_background(&state, root, None).await;

    assert_eq!(action, Some(Action::Execute));
    match &fixture.transport.hops()[0] {
        Hop::Local { service, task } => {
            assert_eq!(service, "A");
            assert_eq!(task.require_dag().unwrap().service(START).unwrap().transmit_time(), 0.0);
            assert!(task.tmp_data().keys().all(|tag| tag.ends_with("_time_A")));
        }
        other => panic!("expected A on the local processor, got {other:?}"),
    }
    assert!(fixture.blob_exists());
}
