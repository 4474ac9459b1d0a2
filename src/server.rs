//! TCP server: ties the wire codec, the dispatcher, persistence, and
//! replication together, and owns the background tasks (expiration sweep,
//! persistence ticker) that run alongside the connection-accept loop.
use crate::{
    config::Config,
    db::{Db, DEFAULT_VECTOR_DIM},
    db::expiration,
    dispatcher::{dispatch, ServerContext},
    error::Error,
    persistence::Persistence,
    replication::Replication,
    value::Value,
    wire::RequestDecoder,
};
use bytes::Bytes;
use log::{info, trace, warn};
use std::{collections::VecDeque, sync::Arc, time::Duration};
use tokio::{io::AsyncWriteExt, net::TcpListener};
use tokio_stream::StreamExt;
use tokio_util::codec::FramedRead;

const EXPIRATION_SWEEP_INTERVAL: Duration = Duration::from_millis(100);
const PERSISTENCE_TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Runs one client connection until it disconnects or a fatal I/O error
/// occurs: decode a request, dispatch it, encode and send the response.
async fn handle_connection(mut socket: tokio::net::TcpStream, ctx: Arc<ServerContext>) {
    let (read_half, mut write_half) = socket.split();
    let mut incoming = FramedRead::new(read_half, RequestDecoder);
    loop {
        match incoming.next().await {
            Some(Ok(request)) => {
                let mut request: VecDeque<Bytes> = request.into();
                let Some(verb) = request.pop_front() else {
                    continue;
                };
                let response = match dispatch(&ctx, &verb, request) {
                    Ok(value) => value,
                    Err(e) => Value::from(e),
                };
                if matches!(response, Value::Ignore) {
                    continue;
                }
                let bytes: Vec<u8> = response.into();
                if write_half.write_all(&bytes).await.is_err() {
                    break;
                }
            }
            Some(Err(e)) => {
                warn!("connection read error: {}", e);
                break;
            }
            None => break,
        }
    }
}

async fn serve_tcp(listener: TcpListener, ctx: Arc<ServerContext>) -> Result<(), Error> {
    loop {
        match listener.accept().await {
            Ok((socket, addr)) => {
                trace!("accepted connection from {}", addr);
                let ctx = ctx.clone();
                tokio::spawn(handle_connection(socket, ctx));
            }
            Err(e) => warn!("accept failed: {}", e),
        }
    }
}

/// Builds the keyspace, persistence, and replication state from `config`,
/// then runs every server task (client accept loop, replica accept/apply
/// loop, expiration sweeper, persistence ticker) until the process exits.
/// Never returns under normal operation.
pub async fn serve(config: Config) -> Result<(), Error> {
    let db = Arc::new(Db::new(config.stripes, config.vector_dim.max(DEFAULT_VECTOR_DIM)));
    let persistence = Arc::new(Persistence::bootstrap(&config, db.clone())?);
    let ctx = Arc::new(ServerContext::new(db.clone()));
    ctx.register_sink(persistence.as_sink());

    let repl = Arc::new(Replication::new());
    ctx.register_sink(repl.clone());

    let (host, port) = config.bind_addr()?;
    let listener = TcpListener::bind((host, port)).await?;
    info!("listening on {}:{}", host, port);

    let mut tasks: Vec<tokio::task::JoinHandle<()>> = Vec::new();

    let client_ctx = ctx.clone();
    tasks.push(tokio::spawn(async move {
        if let Err(e) = serve_tcp(listener, client_ctx).await {
            warn!("client accept loop exited: {}", e);
        }
    }));

    tasks.push(tokio::spawn(expiration::run(db.clone(), EXPIRATION_SWEEP_INTERVAL)));

    tasks.push(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(PERSISTENCE_TICK_INTERVAL);
        loop {
            ticker.tick().await;
            persistence.tick();
        }
    }));

    match config.replica_of() {
        Some((replica_host, replica_port)) => {
            tasks.push(tokio::spawn(crate::replication::run_replica(replica_host, replica_port, ctx.clone(), repl)));
        }
        None => {
            let replica_port = port.checked_add(10000).unwrap_or(port);
            let replica_listener = TcpListener::bind((host, replica_port)).await?;
            info!("listening for replicas on {}:{}", host, replica_port);
            let replica_ctx = ctx.clone();
            tasks.push(tokio::spawn(async move {
                if let Err(e) = crate::replication::serve_primary(replica_listener, replica_ctx, repl).await {
                    warn!("replica accept loop exited: {}", e);
                }
            }));
        }
    }

    for task in tasks {
        let _ = task.await;
    }
    Ok(())
}
