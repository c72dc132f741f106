//! Periodic status sampling for the shell's progress display.

use std::time::Duration;

use async_channel::Receiver;
use tokio::time::MissedTickBehavior;

use super::client::SlaveClient;

/// One poll tick's worth of player state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerStatus {
  pub position_secs: f64,
  pub percent: i64,
  pub paused: bool,
}

/// Spawn the polling task.
///
/// Every `interval` the task queries position and progress through the
/// regular coordinator, taking the session lock like any other caller, and
/// sends one [`PlayerStatus`] sample. A failed tick sends nothing, so the
/// shell keeps showing its previous value. The task ends when the session
/// stops running or every receiver is gone.
pub fn spawn_status_poller(client: SlaveClient, interval: Duration) -> Receiver<PlayerStatus> {
  let (tx, rx) = async_channel::unbounded();

  tokio::spawn(async move {
    log::info!("status poller started ({}ms tick)", interval.as_millis());
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
      ticker.tick().await;
      if !client.is_running() {
        break;
      }

      let position = client.get_time_pos().await;
      let percent = client.get_percent_pos().await;
      let sample = match (position, percent) {
        (Ok(position_secs), Ok(percent)) => PlayerStatus {
          position_secs,
          percent,
          paused: client.is_paused(),
        },
        (position, percent) => {
          log::debug!(
            "poll tick skipped: {:?} / {:?}",
            position.err(),
            percent.err()
          );
          continue;
        }
      };

      if tx.send(sample).await.is_err() {
        break;
      }
    }
    log::info!("status poller stopped");
  });

  rx
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::mplayer::ipc::SlaveIpc;
  use tokio::io::{duplex, AsyncBufReadExt, AsyncWriteExt, BufReader};

  #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
  async fn test_poller_emits_samples_then_stops_on_exit() {
    let (stdout_theirs, stdout_ours) = duplex(4096);
    let (cmd_ours, cmd_theirs) = duplex(4096);
    let client = SlaveClient::connected_to(SlaveIpc::new(stdout_ours, cmd_ours)).await;

    tokio::spawn(async move {
      let mut lines = BufReader::new(cmd_theirs).lines();
      let mut stdout = stdout_theirs;
      while let Ok(Some(line)) = lines.next_line().await {
        let answer = match line.as_str() {
          "get_time_pos" => "ANS_TIME_POSITION=12.5\n",
          "get_percent_pos" => "ANS_PERCENT_POSITION=25\n",
          other => panic!("unexpected command {:?}", other),
        };
        stdout.write_all(answer.as_bytes()).await.unwrap();
      }
    });

    let status_rx = spawn_status_poller(client.clone(), Duration::from_millis(10));

    let sample = status_rx.recv().await.unwrap();
    assert_eq!(
      sample,
      PlayerStatus {
        position_secs: 12.5,
        percent: 25,
        paused: false,
      }
    );

    // Once the session ends the poller shuts the channel.
    client.mark_exited();
    while status_rx.recv().await.is_ok() {}
    assert!(status_rx.is_closed());
  }
}
