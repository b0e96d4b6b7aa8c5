//! App-level ping/pong heartbeat for connection liveness.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time;
use tracing::{debug, warn};

use pulse_core::config::realtime::RealtimeConfig;
use pulse_core::events::ServerEvent;

use super::handle::ConnectionHandle;

/// Runs the heartbeat loop for one connection.
///
/// Sends periodic pings and checks for pong responses. Returns once the
/// connection misses the pong deadline or dies, at which point the socket
/// task tears the connection down.
pub async fn run_heartbeat(handle: Arc<ConnectionHandle>, config: RealtimeConfig) {
    let mut interval = time::interval(Duration::from_secs(config.ping_interval_seconds));
    let timeout = Duration::from_secs(config.ping_timeout_seconds);

    loop {
        interval.tick().await;

        if !handle.is_alive() {
            break;
        }

        let last_pong = *handle.last_pong.read().await;
        let elapsed = Utc::now() - last_pong;

        if let Ok(elapsed_std) = elapsed.to_std() {
            if elapsed_std > timeout {
                warn!(
                    conn_id = %handle.id,
                    elapsed = ?elapsed_std,
                    "Heartbeat timeout, marking connection dead"
                );
                handle.mark_dead();
                break;
            }
        }

        if !handle.send(ServerEvent::Ping) {
            debug!(conn_id = %handle.id, "Ping send failed, marking connection dead");
            handle.mark_dead();
            break;
        }
    }

    debug!(conn_id = %handle.id, "Heartbeat loop ended");
}
