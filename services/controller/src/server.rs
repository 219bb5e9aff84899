//! TCP accept loop and per-connection reader tasks

use crate::error::ControllerResult;
use crate::manager::ConnectionManager;
use crate::switch::{SwitchConnection, TaskHandle, TaskKind};
use network::{SwitchStream, TcpServer};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Pause after a failed accept (e.g. file descriptor exhaustion)
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Accept switches until `shutdown` fires
pub async fn serve(
    manager: ConnectionManager,
    server: TcpServer,
    shutdown: CancellationToken,
) -> ControllerResult<()> {
    info!("🚀 Accepting switch connections on {}", server.local_addr()?);

    loop {
        let accepted = tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = server.accept() => accepted,
        };
        match accepted {
            Ok(stream) => {
                info!(peer = %stream.peer, "Switch connected");
                attach_stream(&manager, stream);
            }
            Err(e) => {
                warn!(error = %e, category = e.category(), "Accept failed");
                tokio::time::sleep(ACCEPT_BACKOFF).await;
            }
        }
    }

    info!("Listener stopped");
    Ok(())
}

/// Register an accepted stream and start its reader task
///
/// The reader pushes every frame onto the ingestion queue and finishes with
/// a `Closed` marker for this connection, whatever ended it.
pub fn attach_stream(manager: &ConnectionManager, stream: SwitchStream) -> Arc<SwitchConnection> {
    let SwitchStream {
        peer,
        mut reader,
        writer,
        ..
    } = stream;
    let switch = manager.add_switch(peer, Arc::new(writer));

    let cancel = switch.child_token();
    let token = cancel.clone();
    let ingest = manager.clone();
    let connection = Arc::clone(&switch);

    let join = tokio::spawn(async move {
        loop {
            let next = tokio::select! {
                _ = token.cancelled() => break,
                next = reader.next_frame() => next,
            };
            match next {
                Ok(Some(frame)) => {
                    if !ingest.enqueue_frame(peer, frame) {
                        break;
                    }
                }
                Ok(None) => {
                    debug!(peer = %peer, "Switch closed the connection");
                    break;
                }
                Err(e) if e.is_disconnect() => {
                    debug!(peer = %peer, error = %e, "Connection lost");
                    break;
                }
                Err(e) => {
                    warn!(
                        peer = %peer,
                        error = %e,
                        category = e.category(),
                        "Read failed, closing connection"
                    );
                    break;
                }
            }
        }
        ingest.enqueue_closed(&connection);
    });

    switch.attach_task(TaskHandle::new(TaskKind::Reader, cancel, join));
    switch
}
