//! Client and dispatcher talking over an in-process broker.

use std::sync::Arc;
use std::time::Duration;

use molrpc::bridge::protocol::response_channel;
use molrpc::structure::{Atom, Chain, Complex, Molecule, Residue, Workspace};
use molrpc::{
    CallError, ClientConfig, Dispatcher, DispatcherConfig, ErrorKind, InMemoryWorkspace,
    LocalBroker, NotificationKind, PubSub, Request, Response, StreamType, WorkspaceClient,
};
use serde_json::json;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const SERVICE: &str = "workspace-service";

struct Harness {
    broker: LocalBroker,
    workspace: Arc<InMemoryWorkspace>,
    client: WorkspaceClient,
    shutdown: CancellationToken,
    loop_task: JoinHandle<()>,
}

impl Harness {
    async fn start(workspace: Workspace) -> Self {
        let broker = LocalBroker::new();
        let memory = Arc::new(InMemoryWorkspace::new(workspace).expect("workspace indices"));
        let dispatcher = Dispatcher::new(
            Arc::new(broker.clone()),
            memory.clone(),
            DispatcherConfig::new(SERVICE),
        );
        let shutdown = CancellationToken::new();
        let token = shutdown.clone();
        let loop_task = tokio::spawn(async move {
            dispatcher.run(token).await.expect("dispatcher loop failed");
        });
        while broker.subscriber_count(SERVICE) == 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        let client = WorkspaceClient::new(
            Arc::new(broker.clone()),
            ClientConfig::new(SERVICE).with_call_timeout(Duration::from_secs(5)),
        );
        Self {
            broker,
            workspace: memory,
            client,
            shutdown,
            loop_task,
        }
    }

    async fn stop(self) {
        self.shutdown.cancel();
        self.loop_task.await.unwrap();
    }
}

fn protein(index: i64, name: &str, atom_indices: &[i64]) -> Complex {
    let mut residue = Residue::new(index * 100);
    for (i, atom) in atom_indices.iter().enumerate() {
        let symbol = if i % 2 == 0 { "C" } else { "N" };
        residue.add_atom(Atom::new(*atom).with_symbol(symbol));
    }
    let mut chain = Chain::new(index * 100 + 1);
    chain.add_residue(residue);
    let mut molecule = Molecule::new(index * 100 + 2);
    molecule.add_chain(chain);
    let mut complex = Complex::named(index, name);
    complex.add_molecule(molecule);
    complex
}

fn two_proteins() -> Workspace {
    let mut ws = Workspace::new();
    ws.add_complex(protein(1, "1tyl", &[1, 2, 3]));
    ws.add_complex(protein(2, "4hhb", &[4, 5]));
    ws
}

#[tokio::test]
async fn complex_list_then_fetch_then_shallow_update() -> anyhow::Result<()> {
    let h = Harness::start(two_proteins()).await;

    let list = h.client.request_complex_list().await?;
    let names: Vec<&str> = list.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, ["1tyl", "4hhb"]);
    assert!(list.iter().all(|c| c.molecules().is_empty()));

    let mut fetched = h.client.request_complexes(&[list[0].index]).await?;
    assert_eq!(fetched.len(), 1);
    let complex = &mut fetched[0];
    assert!(complex.atoms().count() > 0);
    let molecule = &complex.molecules()[0];
    assert_eq!(molecule.parent(), Some(complex.instance_id()));

    complex.boxed = !complex.boxed;
    h.client
        .update_structures_shallow(std::slice::from_ref(complex))
        .await?;

    let stored = h.workspace.workspace()?;
    assert!(stored.complex(1).unwrap().boxed);
    assert_eq!(stored.complex(1).unwrap().atoms().count(), 3);
    h.stop().await;
    Ok(())
}

#[tokio::test]
async fn writing_stream_lifecycle() {
    let h = Harness::start(two_proteins()).await;

    let stream = h
        .client
        .create_writing_stream(&[1, 2, 3], StreamType::Color)
        .await
        .unwrap();
    assert!(stream.is_open());
    assert_eq!(stream.error_code(), 0);
    assert_eq!(h.broker.channel_count(), 1);

    let rgba: Vec<f64> = [255.0, 0.0, 0.0, 255.0].repeat(3);
    stream.update(&rgba).await.unwrap();
    let stored = h.workspace.workspace().unwrap();
    assert!(
        stored
            .complex(1)
            .unwrap()
            .atoms()
            .all(|a| a.atom_color.to_hex() == "#FF0000FF")
    );

    stream.destroy().await.unwrap();
    let err = stream.update(&rgba).await.unwrap_err();
    assert_eq!(err.remote_kind(), Some(ErrorKind::Lookup));

    let second = h
        .client
        .create_writing_stream(&[4], StreamType::Scale)
        .await
        .unwrap();
    assert_ne!(second.id(), stream.id());
    h.stop().await;
}

#[tokio::test]
async fn refused_stream_fails_locally() {
    let h = Harness::start(two_proteins()).await;

    let stream = h
        .client
        .create_writing_stream(&[1, 999], StreamType::Color)
        .await
        .unwrap();
    assert!(!stream.is_open());
    assert_eq!(stream.id(), -1);
    assert!(matches!(
        stream.update(&[0.0; 8]).await,
        Err(CallError::StreamNotOpened { error: 1 })
    ));
    h.stop().await;
}

#[tokio::test]
async fn concurrent_calls_get_their_own_responses() {
    let h = Harness::start(two_proteins()).await;

    let calls = (0..16).map(|i| {
        let client = h.client.clone();
        let index = 1 + (i % 2);
        tokio::spawn(async move { (index, client.request_complexes(&[index]).await) })
    });
    for call in futures::future::join_all(calls).await {
        let (index, result) = call.unwrap();
        let complexes = result.unwrap();
        assert_eq!(complexes.len(), 1);
        assert_eq!(complexes[0].index, index);
    }
    h.stop().await;
}

#[tokio::test]
async fn out_of_order_replies_reach_the_right_caller() {
    let broker = LocalBroker::new();
    let client = WorkspaceClient::new(Arc::new(broker.clone()), ClientConfig::new(SERVICE));

    let responder = {
        let broker = broker.clone();
        let mut requests = broker.subscribe(SERVICE).await.unwrap();
        tokio::spawn(async move {
            let mut pending = Vec::new();
            while pending.len() < 2 {
                let text = requests.next_message().await.unwrap();
                pending.push(serde_json::from_str::<Request>(&text).unwrap());
            }
            // Answer the second request first.
            for request in pending.iter().rev() {
                let echoed = request.args[0].clone();
                let name = format!("c{}", echoed[0]);
                let reply = Response::ok(json!([{ "index": echoed[0], "name": name }]));
                broker
                    .publish(&request.response_channel, serde_json::to_string(&reply).unwrap())
                    .await
                    .unwrap();
            }
        })
    };

    let (first, second) = tokio::join!(
        client.request_complexes(&[10]),
        client.request_complexes(&[20])
    );
    assert_eq!(first.unwrap()[0].name, "c10");
    assert_eq!(second.unwrap()[0].name, "c20");
    responder.await.unwrap();
}

#[tokio::test]
async fn malformed_envelope_does_not_stop_the_loop() {
    let h = Harness::start(two_proteins()).await;

    h.broker
        .publish(SERVICE, "{not json".to_string())
        .await
        .unwrap();
    h.broker
        .publish(SERVICE, json!({"function": "request_workspace"}).to_string())
        .await
        .unwrap();

    let ws = h.client.request_workspace().await.unwrap();
    assert_eq!(ws.complexes().len(), 2);
    assert_eq!(
        h.workspace.notifications(),
        [
            (NotificationKind::Error, "JSON Decode Failure".to_string()),
            (NotificationKind::Error, "JSON Decode Failure".to_string()),
        ]
    );
    h.stop().await;
}

#[tokio::test]
async fn remote_failures_are_reported_on_the_response_channel() {
    let h = Harness::start(two_proteins()).await;

    let err = h
        .client
        .update_structures_deep(&[protein(9, "ghost", &[])])
        .await
        .unwrap_err();
    assert_eq!(err.remote_kind(), Some(ErrorKind::RemoteExecution));
    assert!(err.to_string().contains("no complex with index 9"), "{err}");

    let raw = Request::new("no_such_operation", vec![], response_channel());
    let mut replies = h.broker.subscribe(&raw.response_channel).await.unwrap();
    h.broker
        .publish(SERVICE, serde_json::to_string(&raw).unwrap())
        .await
        .unwrap();
    let reply: Response = serde_json::from_str(&replies.next_message().await.unwrap()).unwrap();
    assert!(matches!(
        reply,
        Response::Error {
            kind: ErrorKind::UnknownOperation,
            ..
        }
    ));
    h.stop().await;
}

#[tokio::test]
async fn failed_request_leaves_the_workspace_usable() -> anyhow::Result<()> {
    let h = Harness::start(two_proteins()).await;

    let err = h
        .client
        .add_to_workspace(&[Complex::new(i64::MAX)])
        .await
        .unwrap_err();
    assert_eq!(err.remote_kind(), Some(ErrorKind::RemoteExecution));
    assert!(err.to_string().contains("leaves no room"), "{err}");

    let list = h.client.request_complex_list().await?;
    assert_eq!(list.len(), 2);
    h.stop().await;
    Ok(())
}

#[tokio::test]
async fn workspace_round_trip_assigns_indices() -> anyhow::Result<()> {
    let h = Harness::start(Workspace::new()).await;

    let added = h
        .client
        .add_to_workspace(&[protein(-1, "new", &[-1, -1])])
        .await?;
    assert!(added[0].index >= 0);
    assert!(added[0].atoms().all(|a| a.index >= 0));

    let ws = h.client.request_workspace().await?;
    assert_eq!(ws.complexes().len(), 1);
    assert_eq!(ws.complexes()[0].parent(), Some(ws.instance_id()));

    h.client.zoom_on_structures(&[added[0].index]).await?;
    h.client
        .send_notification(NotificationKind::Success, "loaded")
        .await?;
    let shapes = h
        .client
        .upload_shapes(json!([{ "shape_type": "sphere" }]))
        .await?;
    assert_eq!(shapes[0]["index"], 0);

    h.client.remove_from_workspace(&added).await?;
    assert!(h.client.request_workspace().await?.complexes().is_empty());
    h.stop().await;
    Ok(())
}
