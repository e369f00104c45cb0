// Newline-delimited JSON over any async byte stream
//
// One request per line in, one JSON object per line out. The runtime serves
// this on stdin/stdout for a host attached over USB serial.

use std::io;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::{sleep_until, Instant};
use tracing::{info, warn};

use super::{dispatch, parse_request, Outcome};
use crate::control::ControlManager;
use crate::messages::Reply;

/// Serve requests until the reader reaches EOF
pub async fn serve_lines<R, W>(manager: ControlManager, reader: R, mut writer: W) -> io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    let mut auto_period: Option<Duration> = None;
    let mut next_publish = Instant::now();

    loop {
        let deadline = next_publish;
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    info!("Line transport closed");
                    return Ok(());
                };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let request = match parse_request(line.as_bytes()) {
                    Ok(request) => request,
                    Err(e) => {
                        warn!("Unparsable request {:?}: {}", line, e);
                        write_reply(&mut writer, &Reply::error(e.to_string())).await?;
                        continue;
                    }
                };

                match dispatch(&manager, request).await {
                    Outcome::Done => {}
                    Outcome::Reply(reply) => write_reply(&mut writer, &reply).await?,
                    Outcome::AutoInterval(0) => {
                        info!("Auto status disabled");
                        auto_period = None;
                    }
                    Outcome::AutoInterval(ms) => {
                        info!("Auto status every {} ms", ms);
                        let period = Duration::from_millis(ms);
                        auto_period = Some(period);
                        next_publish = Instant::now() + period;
                    }
                }
            }
            _ = sleep_until(deadline), if auto_period.is_some() => {
                let state = manager.car_state().await;
                write_reply(&mut writer, &Reply::Status(state)).await?;
                if let Some(period) = auto_period {
                    next_publish = Instant::now() + period;
                }
            }
        }
    }
}

async fn write_reply<W: AsyncWrite + Unpin>(writer: &mut W, reply: &Reply) -> io::Result<()> {
    let mut json = serde_json::to_vec(reply)?;
    json.push(b'\n');
    writer.write_all(&json).await?;
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::{Chassis, CommandKind, ManagerConfig};
    use crate::motor::CarState;
    use serde_json::Value;
    use tokio::io::{BufReader, DuplexStream, Lines, ReadHalf, WriteHalf};

    struct Idle;

    impl Chassis for Idle {
        fn set_speed(&mut self, _: f32, _: f32, _: f32, _: f32) -> bool {
            true
        }

        fn move_distance(&mut self, _: f32, _: f32, _: f32, _: f32, _: u16, _: Option<f32>) -> bool {
            true
        }

        fn stop(&mut self) -> bool {
            true
        }

        fn car_state(&mut self) -> CarState {
            CarState::default()
        }
    }

    struct Client {
        replies: Lines<BufReader<ReadHalf<DuplexStream>>>,
        requests: WriteHalf<DuplexStream>,
    }

    impl Client {
        async fn send(&mut self, line: &str) {
            self.requests.write_all(line.as_bytes()).await.unwrap();
            self.requests.write_all(b"\n").await.unwrap();
        }

        async fn reply(&mut self) -> Value {
            let line = tokio::time::timeout(Duration::from_secs(2), self.replies.next_line())
                .await
                .expect("no reply in time")
                .unwrap()
                .expect("stream closed");
            serde_json::from_str(&line).unwrap()
        }
    }

    fn start() -> (ControlManager, Client, tokio::task::JoinHandle<io::Result<()>>) {
        let (manager, _coordinator) = ControlManager::new(Idle, ManagerConfig::default());
        let (client, server) = tokio::io::duplex(4096);
        let (server_read, server_write) = tokio::io::split(server);
        let task = tokio::spawn(serve_lines(
            manager.clone(),
            BufReader::new(server_read),
            server_write,
        ));

        let (client_read, client_write) = tokio::io::split(client);
        let client = Client {
            replies: BufReader::new(client_read).lines(),
            requests: client_write,
        };
        (manager, client, task)
    }

    #[tokio::test]
    async fn test_requests_reach_the_queue() {
        let (manager, mut client, _task) = start();
        client.send(r#"{"command":"move","dx":0.5}"#).await;
        client.send(r#"{"command":"speed","vx":0.2}"#).await;
        // Requests are handled in order, so the status reply follows both
        client.send(r#"{"command":"status"}"#).await;

        let status = client.reply().await;
        assert_eq!(status["wheelSpeeds"], serde_json::json!([0, 0, 0, 0]));
        assert_eq!(
            manager.pending(),
            vec![CommandKind::Move, CommandKind::Speed, CommandKind::GetStatus]
        );
    }

    #[tokio::test]
    async fn test_bad_json_gets_error_reply() {
        let (manager, mut client, _task) = start();
        client.send("not json").await;
        client.send(r#"{"command":"jump"}"#).await;
        client.send("").await;

        assert!(client.reply().await["error"].is_string());
        assert!(client.reply().await["error"].is_string());
        assert!(manager.pending().is_empty());
    }

    #[tokio::test]
    async fn test_odometry_and_interval_requests() {
        let (manager, mut client, _task) = start();
        client.send(r#"{"command":"set_status_interval","interval_ms":20}"#).await;
        client.send(r#"{"command":"odometry"}"#).await;

        let odom = client.reply().await;
        assert_eq!(odom["x"], 0.0);
        assert_eq!(odom["theta"], 0.0);
        assert_eq!(manager.status_interval(), Duration::from_millis(20));
    }

    #[tokio::test]
    async fn test_auto_status_publishes_until_disabled() {
        let (_manager, mut client, task) = start();
        client.send(r#"{"command":"auto","interval":10}"#).await;
        for _ in 0..3 {
            let status = client.reply().await;
            assert!(status.get("vx").is_some());
        }

        client.send(r#"{"command":"auto","interval":0}"#).await;
        client.requests.shutdown().await.unwrap();
        task.await.unwrap().unwrap();
    }
}
